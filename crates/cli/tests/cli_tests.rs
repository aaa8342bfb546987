use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn run_reports_missing_directory() {
  let mut cmd = Command::cargo_bin("lattice").unwrap();
  cmd.args(["run", "does-not-exist"]);
  cmd
    .assert()
    .failure()
    .stderr(predicate::str::contains("not a project directory"));
}

#[test]
fn run_executes_entry_points() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(
    dir.path().join("main.client.lua"),
    "print('hello from entry')\n",
  )
  .unwrap();

  let mut cmd = Command::cargo_bin("lattice").unwrap();
  cmd.arg("run").arg(dir.path());
  cmd
    .assert()
    .success()
    .stdout(predicate::str::contains("hello from entry"))
    .stderr(predicate::str::contains("1 script(s) finished"));
}

#[test]
fn tree_prints_the_reified_tree() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(dir.path().join("util.lua"), "return {}\n").unwrap();

  let mut cmd = Command::cargo_bin("lattice").unwrap();
  cmd.arg("tree").arg(dir.path());
  cmd
    .assert()
    .success()
    .stdout(predicate::str::contains("util").and(predicate::str::contains("ModuleScript")));
}

#[test]
fn fetch_rejects_bad_slugs() {
  let mut cmd = Command::cargo_bin("lattice").unwrap();
  cmd.args(["fetch", "nonsense"]);
  cmd
    .assert()
    .failure()
    .stderr(predicate::str::contains("owner/repo"));
}
