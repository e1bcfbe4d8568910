mod common;
use crate::common::{TSC_ERROR, TSC_WATCH_BEGIN, TSC_WATCH_CLEAN, TSC_WATCH_FAILED, TestResult, harness};

use taskdeck::engine::{BackgroundStatus, RunHandle, RunStatus};
use taskdeck_test_utils::{Script, TaskConfigBuilder, with_timeout};

fn watcher() -> Vec<taskdeck::config::TaskConfig> {
    vec![
        TaskConfigBuilder::new("tsc-watch")
            .background()
            .matcher("$tsc-watch")
            .build(),
    ]
}

async fn reach(handle: &RunHandle, status: BackgroundStatus) {
    with_timeout(handle.wait_until(|r| r.background_status == Some(status))).await;
}

#[tokio::test]
async fn watch_mode_cycles_through_compile_states() -> TestResult {
    let h = harness(watcher());
    h.backend.script("tsc-watch", Script::Manual);

    let handle = h.scheduler.run("tsc-watch")?;
    let control = with_timeout(h.backend.control("tsc-watch")).await;
    reach(&handle, BackgroundStatus::Watching).await;

    control.line(TSC_WATCH_BEGIN).await;
    reach(&handle, BackgroundStatus::Compiling).await;

    control.line(TSC_ERROR).await;
    control.line(TSC_WATCH_FAILED).await;
    reach(&handle, BackgroundStatus::Error).await;
    let errored = handle.snapshot();
    assert!(errored.last_compile_end.is_some());
    assert_eq!(errored.status, RunStatus::Running);

    control.line(TSC_WATCH_BEGIN).await;
    reach(&handle, BackgroundStatus::Compiling).await;
    control.line(TSC_WATCH_CLEAN).await;
    reach(&handle, BackgroundStatus::Watching).await;

    let diagnostics = h.scheduler.diagnostics(handle.id())?;
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].source, "$tsc-watch");
    Ok(())
}

#[tokio::test]
async fn stopping_a_watcher_leaves_it_idle_and_cancelled() -> TestResult {
    let h = harness(watcher());
    h.backend.script("tsc-watch", Script::Manual);

    let handle = h.scheduler.run("tsc-watch")?;
    reach(&handle, BackgroundStatus::Watching).await;

    h.scheduler.cancel(handle.id())?;
    let run = with_timeout(handle.wait()).await;
    assert_eq!(run.status, RunStatus::Cancelled);
    assert_eq!(run.background_status, Some(BackgroundStatus::Idle));
    with_timeout(h.backend.wait_terminated("tsc-watch")).await;
    Ok(())
}

#[tokio::test]
async fn watcher_exiting_on_its_own_is_an_error() -> TestResult {
    let h = harness(watcher());
    h.backend.script("tsc-watch", Script::Manual);

    let handle = h.scheduler.run("tsc-watch")?;
    let control = with_timeout(h.backend.control("tsc-watch")).await;
    control.line(TSC_WATCH_BEGIN).await;
    control.exit(Some(1)).await;

    let run = with_timeout(handle.wait()).await;
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.exit_code, Some(1));
    assert_eq!(run.background_status, Some(BackgroundStatus::Error));
    Ok(())
}

#[tokio::test]
async fn run_background_forces_watch_mode() -> TestResult {
    let h = harness(vec![TaskConfigBuilder::new("serve").build()]);
    h.backend.script("serve", Script::Hang { lines: vec![] });

    let handle = h.scheduler.run_background("serve")?;
    let run = with_timeout(handle.wait_until(|r| r.status == RunStatus::Running)).await;
    assert!(run.config.is_background);
    assert_eq!(run.background_status, Some(BackgroundStatus::Watching));

    // The registered definition is untouched.
    assert!(!h.registry.read().unwrap().get("serve").unwrap().is_background);
    h.scheduler.cancel(handle.id())?;
    Ok(())
}

#[tokio::test]
async fn plain_tasks_have_no_background_status() -> TestResult {
    let h = harness(vec![TaskConfigBuilder::new("build").build()]);
    let run = with_timeout(h.scheduler.run("build")?.wait()).await;
    assert_eq!(run.background_status, None);
    assert_eq!(run.status, RunStatus::Completed);
    Ok(())
}
