#![cfg(unix)]

use std::collections::BTreeMap;
use std::error::Error;

use taskdeck::exec::{OutputStream, ProcessBackend, ProcessEvent, RealProcessBackend, SpawnRequest};
use taskdeck_test_utils::{init_tracing, with_timeout};

fn shell(script: &str) -> SpawnRequest {
    SpawnRequest {
        command: script.to_string(),
        args: Vec::new(),
        cwd: None,
        env: BTreeMap::from([("GREETING".to_string(), "hello".to_string())]),
        shell: true,
    }
}

async fn collect(request: SpawnRequest) -> Result<Vec<ProcessEvent>, Box<dyn Error>> {
    let backend = RealProcessBackend::new();
    let mut handle = backend.spawn(request).await?;
    let mut events = Vec::new();
    while let Some(event) = handle.events.recv().await {
        let done = matches!(event, ProcessEvent::Exited { .. });
        events.push(event);
        if done {
            break;
        }
    }
    Ok(events)
}

#[tokio::test]
async fn shell_output_env_and_exit_code_are_reported() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let events = with_timeout(collect(shell("echo $GREETING; echo oops >&2; exit 3"))).await?;

    assert!(events.contains(&ProcessEvent::Line {
        stream: OutputStream::Stdout,
        text: "hello".into()
    }));
    assert!(events.contains(&ProcessEvent::Line {
        stream: OutputStream::Stderr,
        text: "oops".into()
    }));
    assert_eq!(events.last(), Some(&ProcessEvent::Exited { code: Some(3) }));
    Ok(())
}

#[tokio::test]
async fn terminate_stops_a_long_running_process() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let backend = RealProcessBackend::new();
    let mut handle = backend.spawn(shell("echo ready; sleep 30")).await?;

    let first = with_timeout(handle.events.recv()).await;
    assert!(matches!(first, Some(ProcessEvent::Line { ref text, .. }) if text == "ready"));

    handle.terminator.terminate();
    let last = with_timeout(async {
        let mut last = None;
        while let Some(event) = handle.events.recv().await {
            last = Some(event);
        }
        last
    })
    .await;
    assert!(matches!(last, Some(ProcessEvent::Exited { .. })));
    Ok(())
}

#[tokio::test]
async fn missing_program_fails_to_spawn() {
    init_tracing();
    let backend = RealProcessBackend::new();
    let request = SpawnRequest {
        command: "definitely-not-a-real-program-xyz".into(),
        args: Vec::new(),
        cwd: None,
        env: BTreeMap::new(),
        shell: false,
    };
    assert!(backend.spawn(request).await.is_err());
}
