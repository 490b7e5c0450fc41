use std::path::PathBuf;

use predicates::prelude::*;

use super::common::{TestEnv, is_link_to, json_stdout};

#[test]
fn build_links_outputs_and_creates_result() {
  let env = TestEnv::crosslink();

  env
    .zbuild_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Build complete"));

  let result = env.root().join("result");
  assert_eq!(std::fs::read_to_string(result.join("bin/zebrad")).unwrap(), "elf");
  assert_eq!(std::fs::read_to_string(result.join("book/index.html")).unwrap(), "<html>");
  assert!(result.join("source-diff").exists());
  assert!(std::fs::symlink_metadata(result.join("bin/zebrad")).unwrap().file_type().is_symlink());
}

#[test]
fn second_build_is_cached() {
  let env = TestEnv::crosslink();
  env.zbuild_cmd().arg("build").assert().success();

  let report = json_stdout(env.zbuild_cmd().args(["-o", "json", "build"]));

  let realized = report["run"]["realized"].as_array().unwrap();
  assert!(!realized.is_empty());
  // The toolchain probe runs on every build; everything else is a store hit.
  for stage in realized.iter().filter(|s| s["stage"] != "toolchain") {
    assert_eq!(stage["cached"], true, "{} rebuilt", stage["stage"]);
  }
  assert_eq!(env.entries("deps").len(), 1);
}

#[test]
fn custom_out_link_and_no_link() {
  let env = TestEnv::crosslink();

  let report = json_stdout(env.zbuild_cmd().args(["-o", "json", "build", "--out-link", "out/zebra"]));
  let linked = PathBuf::from(report["result"].as_str().unwrap());
  assert!(is_link_to(&env.root().join("out/zebra"), &linked));

  let report = json_stdout(env.zbuild_cmd().args(["-o", "json", "build", "--no-link"]));
  assert!(report["out_link"].is_null());
  assert!(!env.root().join("result").exists());
}

#[test]
fn build_input_change_rebuilds_dependency_set() {
  let env = TestEnv::crosslink();
  env.zbuild_cmd().arg("build").assert().success();

  env.write_file("zebra-crosslink/src/lib.rs", "pub fn crosslink() { todo!() }\n");
  env.zbuild_cmd().arg("build").assert().success();

  assert_eq!(env.entries("deps").len(), 2);
  assert_eq!(env.entries("source").len(), 3);
}

#[test]
fn pruned_paths_do_not_rebuild() {
  let env = TestEnv::crosslink();
  env.zbuild_cmd().arg("build").assert().success();

  env.write_file("docker/Dockerfile", "FROM alpine\n");
  env.write_file("README.md", "# changed\n");
  env.zbuild_cmd().arg("build").assert().success();

  assert_eq!(env.entries("deps").len(), 1);
}

#[test]
fn check_runs_every_check() {
  let env = TestEnv::crosslink();

  env
    .zbuild_cmd()
    .arg("check")
    .assert()
    .success()
    .stdout(predicate::str::contains("check:clippy"))
    .stdout(predicate::str::contains("check:selection"))
    .stdout(predicate::str::contains("All checks passed"));

  assert_eq!(env.entries("check").len(), 4);
}

#[test]
fn failing_check_is_named_and_outputs_still_build() {
  let env = TestEnv::with_clippy("echo 'warning: unused variable' >&2; exit 1");

  env
    .zbuild_cmd()
    .arg("check")
    .assert()
    .failure()
    .stderr(predicate::str::contains("check:clippy failed"))
    .stderr(predicate::str::contains("unused variable"));

  assert_eq!(env.entries("target").len(), 1);
  assert_eq!(env.entries("result").len(), 1);
}

#[test]
fn failed_dependency_set_skips_consumers() {
  let env = TestEnv::crosslink();
  env.write_file(
    "build.lua",
    &super::common::PROJECT.replace("deps = [[", "deps = [[exit 3; "),
  );

  let output = env.zbuild_cmd().args(["-o", "json", "check"]).output().unwrap();
  assert!(!output.status.success());
  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();

  let failed: Vec<&str> = report["failed"]
    .as_array()
    .unwrap()
    .iter()
    .map(|f| f["stage"].as_str().unwrap())
    .collect();
  assert_eq!(failed, vec!["deps"]);
  let skipped = report["skipped"].as_array().unwrap();
  assert!(skipped.iter().any(|s| s["stage"] == "target:zebrad" && s["cause"] == "deps"));
  assert!(
    report["realized"]
      .as_array()
      .unwrap()
      .iter()
      .any(|r| r["stage"] == "book")
  );
}

#[test]
fn plan_reports_cache_status() {
  let env = TestEnv::crosslink();

  let before = json_stdout(env.zbuild_cmd().args(["-o", "json", "plan"]));
  let status = |plan: &serde_json::Value, stage: &str| {
    plan
      .as_array()
      .unwrap()
      .iter()
      .find(|s| s["stage"] == stage)
      .map(|s| s["status"].as_str().unwrap().to_string())
      .unwrap()
  };
  assert_eq!(status(&before, "source:build"), "evaluated");
  assert_eq!(status(&before, "deps"), "build");
  assert!(env.entries("deps").is_empty());

  env.zbuild_cmd().arg("build").assert().success();
  let after = json_stdout(env.zbuild_cmd().args(["-o", "json", "plan"]));
  assert_eq!(status(&after, "deps"), "cached");
  assert_eq!(status(&after, "target:zebrad"), "cached");
  assert_eq!(status(&after, "check:fmt"), "build");
}

#[test]
fn shell_runs_command_with_build_environment() {
  let env = TestEnv::crosslink();

  env
    .zbuild_cmd()
    .args(["shell", "--", "sh", "-c", "echo $RUSTUP_TOOLCHAIN $LIBCLANG_PATH"])
    .assert()
    .success()
    .stdout(predicate::str::contains("1.85.0"))
    .stdout(predicate::str::contains("/clang"));
}

#[test]
fn shell_propagates_exit_code() {
  let env = TestEnv::crosslink();

  env
    .zbuild_cmd()
    .args(["shell", "--", "sh", "-c", "exit 7"])
    .assert()
    .code(7);
}
