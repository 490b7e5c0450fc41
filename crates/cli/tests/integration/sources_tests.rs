use predicates::prelude::*;

use super::common::{TestEnv, json_stdout};

#[test]
fn diff_sources_agree_on_flat_layout() {
  let env = TestEnv::crosslink();

  env
    .zbuild_cmd()
    .arg("diff-sources")
    .assert()
    .success()
    .stdout(predicate::str::contains("agree"));

  assert_eq!(env.entries("diff").len(), 1);
}

#[test]
fn diff_sources_reports_nested_divergence() {
  let env = TestEnv::crosslink();
  env.write_file("vendor/crosslink-test-data/extra.bin", "x");
  env.write_file("zebra-crosslink/docker/build.rs", "fn main() {}\n");

  env
    .zbuild_cmd()
    .arg("diff-sources")
    .assert()
    .failure()
    .stdout(predicate::str::contains("- vendor/crosslink-test-data/extra.bin"))
    .stdout(predicate::str::contains("+ zebra-crosslink/docker/build.rs"))
    .stderr(predicate::str::contains("diverge on 2 file(s)"));
}

#[test]
fn selection_check_fails_on_divergence() {
  let env = TestEnv::crosslink();
  env.write_file("vendor/crosslink-test-data/extra.bin", "x");

  env
    .zbuild_cmd()
    .arg("check")
    .assert()
    .failure()
    .stderr(predicate::str::contains("check:selection failed"))
    .stderr(predicate::str::contains("vendor/crosslink-test-data/extra.bin"));
}

#[test]
fn classify_shows_both_strategies() {
  let env = TestEnv::crosslink();

  let report = json_stdout(env.zbuild_cmd().args([
    "-o",
    "json",
    "classify",
    "docker/Dockerfile",
    "crosslink-test-data/seed.bin",
    "vendor/crosslink-test-data/extra.bin",
    "README.md",
  ]));
  let rows = report.as_array().unwrap();

  assert_eq!(rows[0]["legacy"]["region"], "pruned");
  assert_eq!(rows[0]["fileset"]["region"], "pruned");
  assert_eq!(rows[1]["fileset"]["selected"], true);
  assert_eq!(rows[2]["legacy"]["region"], "included");
  assert_eq!(rows[2]["fileset"]["region"], "default");
  assert_eq!(rows[2]["fileset"]["selected"], false);
  assert_eq!(rows[3]["legacy"]["selected"], false);
}

#[test]
fn classify_rejects_paths_outside_root() {
  let env = TestEnv::crosslink();

  env
    .zbuild_cmd()
    .args(["classify", "../elsewhere"])
    .assert()
    .failure();
}
