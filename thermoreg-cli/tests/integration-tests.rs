use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::{CommandCargoExt, OutputAssertExt};
use predicates::prelude::predicate;

fn asset(name: &str) -> PathBuf {
    let mut path = project_root::get_project_root().unwrap();
    path.push(Path::new("thermoreg-cli/tests/assets"));
    path.push(name);
    let path = path.canonicalize().unwrap();
    assert!(path.exists());
    path
}

#[test]
fn test_that_cli_app_produces_summary() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("thermoreg-cli")?;
    let schedule = asset("neutral.yaml");
    cmd.args([
        "--schedule-file",
        schedule.to_str().unwrap(),
        "--sub-steps",
        "3",
    ]);
    cmd.assert()
        .success()
        .stdout(predicate::str::starts_with("time_s,activity,pmv,ppd,sensation"))
        .stdout(predicate::str::contains("1800.0"));

    Ok(())
}

#[test]
fn test_that_cli_app_writes_json_trace() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let out = dir.path().join("trace.json");
    let mut cmd = Command::cargo_bin("thermoreg-cli")?;
    cmd.args([
        "--schedule-resource",
        "schedules/neutral_office.yaml",
        "--height",
        "1.65",
        "--weight",
        "60",
        "--gender",
        "female",
        "--sub-steps",
        "2",
        "--out-file",
        out.to_str().unwrap(),
    ]);
    cmd.assert().success();
    let trace = std::fs::read_to_string(out)?;
    assert!(trace.contains("\"status\":\"completed\""));

    Ok(())
}

#[test]
fn test_that_cli_app_rejects_bad_anthropometrics() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("thermoreg-cli")?;
    let schedule = asset("neutral.yaml");
    cmd.args([
        "--schedule-file",
        schedule.to_str().unwrap(),
        "--height",
        "7.0",
    ]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("configuration error"));

    Ok(())
}

#[test]
fn test_that_cli_app_requires_a_schedule() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("thermoreg-cli")?;
    cmd.assert().failure();

    Ok(())
}
