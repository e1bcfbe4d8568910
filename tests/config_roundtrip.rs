mod common;
use crate::common::TestResult;

use std::fs;

use taskdeck::config::{load_and_validate, parse_str, save_to_path};
use taskdeck::errors::TaskdeckError;
use taskdeck::registry::TaskRegistry;
use taskdeck::types::{TaskGroup, TaskKind, TaskSource};
use taskdeck_test_utils::{DocumentBuilder, TaskConfigBuilder};

#[test]
fn saved_document_loads_back_unchanged() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested/Tasks.toml");

    let build = TaskConfigBuilder::new("build")
        .command("cargo")
        .arg("build")
        .kind(TaskKind::Process)
        .group(TaskGroup::Build, true)
        .matcher("$rustc")
        .env("RUST_LOG", "debug")
        .build();
    let watch = TaskConfigBuilder::new("watch")
        .command("tsc")
        .arg("-w")
        .background()
        .matcher("$tsc-watch")
        .depends_on("build")
        .run_on_folder_open()
        .build();
    let detected = TaskConfigBuilder::new("npm: test")
        .source(TaskSource::AutoDetected)
        .build();

    let doc = DocumentBuilder::new()
        .with_task(build.clone())
        .with_task(watch.clone())
        .with_task(detected)
        .with_rule("rs", "build", "src/**/*.rs", 750)
        .with_history_limit(25)
        .build();

    save_to_path(&doc, &path)?;
    let loaded = load_and_validate(&path)?;

    assert_eq!(loaded.tasks, vec![build, watch]);
    assert_eq!(loaded.run_on_save, doc.run_on_save);
    assert_eq!(loaded.settings.history_limit, 25);
    Ok(())
}

#[test]
fn missing_and_malformed_files_are_errors() -> TestResult {
    let dir = tempfile::tempdir()?;

    let missing = load_and_validate(dir.path().join("nope.toml"));
    assert!(matches!(missing, Err(TaskdeckError::IoError(_))));

    let bad = dir.path().join("bad.toml");
    fs::write(&bad, "[[task]]\nlabel = 3\n")?;
    assert!(matches!(load_and_validate(&bad), Err(TaskdeckError::TomlError(_))));
    Ok(())
}

#[test]
fn registry_built_from_a_document() -> TestResult {
    let doc = parse_str(
        r#"
[[task]]
label = "build"
command = "make"
group = { kind = "build", isDefault = true }

[[task]]
label = "test"
command = "make"
args = ["test"]
group = "test"
dependsOn = ["build"]
"#,
    )?;

    let registry = TaskRegistry::from_document(&doc)?;
    assert_eq!(
        registry.default_task(TaskGroup::Build).map(|t| t.label),
        Some("build".to_string())
    );
    assert_eq!(registry.get("test").map(|t| t.depends_on.clone()), Some(vec!["build".to_string()]));
    assert!(registry.get("deploy").is_none());
    Ok(())
}
