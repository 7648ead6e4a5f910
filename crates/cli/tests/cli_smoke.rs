//! CLI smoke tests for fnrtctl.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;

fn fnrtctl() -> Command {
    let mut cmd = cargo_bin_cmd!("fnrtctl");
    for var in ["FNRT_FOR", "FNRT_OWNS", "FNRT_WATCH"] {
        cmd.env_remove(var);
    }
    cmd
}

const PACKAGE: &str = r#"
apiVersion: config.kubernetes.io/v1
kind: ResourceList
items:
- apiVersion: kpt.dev/v1
  kind: Kptfile
  metadata:
    name: upf
    annotations:
      internal.config.kubernetes.io/path: Kptfile
  status:
    conditions:
    - type: infra.nephio.org/v1alpha1.WorkloadCluster.edge
      status: "True"
- apiVersion: infra.nephio.org/v1alpha1
  kind: WorkloadCluster
  metadata:
    name: edge
- apiVersion: req.nephio.org/v1alpha1
  kind: Interface
  metadata:
    name: n3
functionConfig:
  apiVersion: v1
  kind: ConfigMap
  metadata:
    name: fn-config
  data:
    for: req.nephio.org/v1alpha1/Interface
    watch: infra.nephio.org/v1alpha1/WorkloadCluster
"#;

#[test]
fn help_lists_commands() {
    fnrtctl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("inspect").and(predicate::str::contains("run")));
}

#[test]
fn inspect_prints_inventory_as_json() {
    fnrtctl()
        .args(["-o", "json", "inspect"])
        .write_stdin(PACKAGE)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ready\": true"))
        .stdout(predicate::str::contains("WorkloadCluster"));
}

#[test]
fn run_marks_the_governed_object_done() {
    fnrtctl()
        .arg("run")
        .write_stdin(PACKAGE)
        .assert()
        .success()
        .stdout(predicate::str::contains("fnruntime.nephio.org/owner: req.nephio.org/v1alpha1.Interface.n3"))
        .stdout(predicate::str::contains("message: done"));
}

#[test]
fn run_rejects_owned_kinds() {
    fnrtctl()
        .args(["--owns", "ipam.nephio.org/v1alpha1/IPAllocation", "run"])
        .write_stdin(PACKAGE)
        .assert()
        .failure()
        .stderr(predicate::str::contains("condition-terminal"));
}

#[test]
fn missing_manifest_fails_the_run() {
    let input = "apiVersion: config.kubernetes.io/v1\nkind: ResourceList\nitems:\n- apiVersion: v1\n  kind: ConfigMap\n  metadata:\n    name: x\n";
    fnrtctl()
        .args(["--for", "v1/ConfigMap", "run"])
        .write_stdin(input)
        .assert()
        .failure()
        .stdout(predicate::str::contains("severity: error"));
}
