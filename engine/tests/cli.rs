use assert_cmd::Command;
use predicates::str::contains;

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("substrate")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("auto"))
        .stdout(contains("adapters"));
}

#[test]
fn adapters_without_health_flag_prints_usage_hint() {
    Command::cargo_bin("substrate")
        .unwrap()
        .arg("adapters")
        .assert()
        .success()
        .stdout(contains("--health"));
}

#[test]
fn auto_status_on_unknown_run_fails() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("substrate")
        .unwrap()
        .current_dir(dir.path())
        .args(["auto", "status", "--run-id", "does-not-exist"])
        .assert()
        .failure();
}
