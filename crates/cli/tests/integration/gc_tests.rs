use predicates::prelude::*;

use super::common::{TestEnv, json_stdout};

#[test]
fn gc_keeps_entries_of_the_last_build() {
  let env = TestEnv::crosslink();
  env.zbuild_cmd().arg("build").assert().success();
  let targets = env.entries("target");

  let report = json_stdout(env.zbuild_cmd().args(["-o", "json", "gc"]));

  assert_eq!(report["stats"]["entries_deleted"], 0);
  assert_eq!(env.entries("target"), targets);
  assert!(env.root().join("result/bin/zebrad").exists());
}

#[test]
fn gc_removes_entries_of_replaced_builds() {
  let env = TestEnv::crosslink();
  env.zbuild_cmd().arg("build").assert().success();
  let old_target = env.entries("target");

  env.write_file("zebra-crosslink/src/lib.rs", "pub fn crosslink() { todo!() }\n");
  env.zbuild_cmd().arg("build").assert().success();
  assert_eq!(env.entries("target").len(), 2);

  env.zbuild_cmd().arg("gc").assert().success();

  let targets = env.entries("target");
  assert_eq!(targets.len(), 1);
  assert!(!targets.contains(&old_target[0]));
  assert_eq!(env.entries("deps").len(), 1);
}

#[test]
fn gc_removes_everything_once_result_link_is_gone() {
  let env = TestEnv::crosslink();
  env.zbuild_cmd().arg("build").assert().success();
  std::fs::remove_file(env.root().join("result")).unwrap();

  env
    .zbuild_cmd()
    .arg("gc")
    .assert()
    .success()
    .stdout(predicate::str::contains("Records pruned: 1"));

  assert!(env.entries("target").is_empty());
  assert!(env.entries("result").is_empty());
}

#[test]
fn gc_dry_run_lists_without_deleting() {
  let env = TestEnv::crosslink();
  env.zbuild_cmd().args(["build", "--no-link"]).assert().success();
  env.write_file("zebra-crosslink/src/lib.rs", "pub fn crosslink() { todo!() }\n");
  env.zbuild_cmd().arg("plan").assert().success();
  assert_eq!(env.entries("source").len(), 3);

  let report = json_stdout(env.zbuild_cmd().args(["-o", "json", "gc", "--dry-run"]));

  assert_eq!(report["deleted_paths"].as_array().unwrap().len(), 1);
  assert_eq!(env.entries("source").len(), 3);
}
