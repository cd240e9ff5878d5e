//! Local driver integration tests
//!
//! Drives a temporary directory tree end to end the way the CLI does: load
//! a config file, open the configured driver, run commands, close.

use gridlink::{
    backend::open_driver,
    config::{DriverKind, GridConfig},
    ops::{ListFilter, OpContext},
    Command, CommandOutcome, GridError, Session,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_config(dir: &Path, root: &Path) -> std::path::PathBuf {
    let path = dir.join("gridlink.toml");
    let contents = format!(
        r#"
log_level = "debug"

[account]
host = "grid.example.org"
username = "rods"
home = "/home/rods"

[driver]
kind = "local"
root = "{}"

[transfer]
chunk_size = 1024
error_mode = "skip"
overwrite = "always"
"#,
        root.display().to_string().replace('\\', "\\\\")
    );
    fs::write(&path, contents).unwrap();
    path
}

fn open(root: &TempDir, scratch: &TempDir) -> (Session, OpContext) {
    let config = GridConfig::from_file(&write_config(scratch.path(), root.path())).unwrap();
    assert_eq!(config.driver.kind, DriverKind::Local);

    let driver = open_driver(&config.driver).unwrap();
    let session = Session::new(driver, config.account.clone());
    (session, OpContext::from_config(&config.transfer))
}

#[test]
fn test_namespace_round_trip() {
    let root = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    fs::create_dir_all(root.path().join("home/rods")).unwrap();
    let (mut session, mut ctx) = open(&root, &scratch);

    let outcome = Command::Mkdir {
        paths: vec![session.resolve("runs/2024/q1")],
        parents: true,
    }
    .run(&mut session, &mut ctx)
    .unwrap();
    assert_eq!(outcome.exit_code(), 0);
    assert!(root.path().join("home/rods/runs/2024/q1").is_dir());

    let upload = scratch.path().join("result.csv");
    fs::write(&upload, b"t,v\n0,1\n").unwrap();
    let outcome = Command::Put {
        sources: vec![upload],
        dest: session.resolve("runs/2024/q1"),
    }
    .run(&mut session, &mut ctx)
    .unwrap();
    match outcome {
        CommandOutcome::Batch(report) => {
            assert_eq!(report.outputs(), ["/home/rods/runs/2024/q1/result.csv"])
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let outcome = Command::Move {
        sources: vec!["/home/rods/runs/2024/q1/result.csv".to_string()],
        dest: "/home/rods/final.csv".to_string(),
    }
    .run(&mut session, &mut ctx)
    .unwrap();
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(
        fs::read(root.path().join("home/rods/final.csv")).unwrap(),
        b"t,v\n0,1\n"
    );

    let outcome = Command::List {
        path: "/home/rods".to_string(),
        filter: ListFilter::Files,
    }
    .run(&mut session, &mut ctx)
    .unwrap();
    match outcome {
        CommandOutcome::Listing(entries) => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].name, "final.csv");
            assert_eq!(entries[0].metadata.size, 8);
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let outcome = Command::Remove {
        paths: vec!["/home/rods/runs".to_string()],
        recursive: true,
    }
    .run(&mut session, &mut ctx)
    .unwrap();
    assert_eq!(outcome.exit_code(), 0);
    assert!(!root.path().join("home/rods/runs").exists());

    session.close();
    assert!(session.is_closed());
}

#[test]
fn test_get_preserves_content() {
    let root = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    fs::create_dir_all(root.path().join("data")).unwrap();
    fs::write(root.path().join("data/blob.bin"), &payload).unwrap();
    let (mut session, mut ctx) = open(&root, &scratch);

    let dest = scratch.path().join("blob.bin");
    let outcome = Command::Get {
        sources: vec!["/data/blob.bin".to_string()],
        dest: dest.clone(),
    }
    .run(&mut session, &mut ctx)
    .unwrap();
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(fs::read(&dest).unwrap(), payload);
}

#[test]
fn test_rmdir_non_empty_is_item_failure() {
    let root = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    fs::create_dir_all(root.path().join("full")).unwrap();
    fs::write(root.path().join("full/keep.txt"), b"x").unwrap();
    fs::create_dir_all(root.path().join("empty")).unwrap();
    let (mut session, mut ctx) = open(&root, &scratch);

    let outcome = Command::Rmdir {
        paths: vec!["/full".to_string(), "/empty".to_string()],
    }
    .run(&mut session, &mut ctx)
    .unwrap();
    match outcome {
        CommandOutcome::Batch(report) => {
            assert_eq!(report.outputs(), ["/empty"]);
            assert_eq!(report.failure_count(), 1);
            assert!(report.exit_message().starts_with("/full: "));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(root.path().join("full/keep.txt").exists());
}

#[test]
fn test_paths_cannot_escape_root() {
    let root = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let (mut session, mut ctx) = open(&root, &scratch);

    let outcome = Command::List {
        path: "/../..".to_string(),
        filter: ListFilter::All,
    }
    .run(&mut session, &mut ctx)
    .unwrap();
    match outcome {
        CommandOutcome::Listing(entries) => assert!(entries.is_empty()),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[cfg(unix)]
#[test]
fn test_exec_runs_in_root() {
    let root = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    fs::write(root.path().join("marker"), b"").unwrap();
    let (mut session, mut ctx) = open(&root, &scratch);

    let outcome = Command::Exec {
        command: "ls".to_string(),
        args: vec![],
    }
    .run(&mut session, &mut ctx)
    .unwrap();
    match outcome {
        CommandOutcome::Output(output) => {
            assert!(output.success());
            assert!(output.stdout.contains("marker"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let outcome = Command::Exec {
        command: "sh".to_string(),
        args: vec!["-c".to_string(), "exit 3".to_string()],
    }
    .run(&mut session, &mut ctx)
    .unwrap();
    assert_eq!(outcome.exit_code(), 1);
}

#[test]
fn test_missing_root_is_connection_error() {
    let scratch = TempDir::new().unwrap();
    let gone = scratch.path().join("not-there");
    let config_path = write_config(scratch.path(), &gone);
    let config = GridConfig::from_file(&config_path).unwrap();

    let mut session = Session::new(open_driver(&config.driver).unwrap(), config.account);
    let err = session.ensure_live().err().unwrap();
    assert!(matches!(err, GridError::Connection(_)));
}
