// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 climprep contributors

//! Command-line behaviour against temporary recipe, raw and save directories

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const RECIPE: &str = "
name: GPCP
prepare:
  precip:
    uses:
      monthly: [precip]
    apply:
      - convert_units: {multiply: 86400, units: mm/day}
  annual.precip:
    uses:
      prepared: [precip]
    apply:
      - coarsen: {dim: time, window: 2}
";

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(recipe: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("config/prepare_data");
        let raw = dir.path().join("data/raw/GPCP");
        fs::create_dir_all(&config).unwrap();
        fs::create_dir_all(&raw).unwrap();

        fs::write(config.join("GPCP.yaml"), recipe).unwrap();
        fs::write(
            raw.join("monthly.json"),
            r#"{
                "dims": {"time": 4},
                "coords": {"time": {"dims": ["time"], "values": [0, 1, 2, 3]}},
                "data_vars": {"precip": {"dims": ["time"], "values": [1e-5, 2e-5, 3e-5, 4e-5]}}
            }"#,
        )
        .unwrap();

        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn climprep(&self) -> Command {
        let mut cmd = Command::cargo_bin("climprep").unwrap();
        cmd.current_dir(self.path())
            .env("NO_COLOR", "1")
            .env_remove("CLIMPREP_CONFIG_DIR")
            .env_remove("CLIMPREP_RAW_DIR")
            .env_remove("CLIMPREP_SAVE_DIR");
        cmd
    }
}

#[test]
fn transforms_lists_builtins() {
    let ws = Workspace::new(RECIPE);
    ws.climprep()
        .arg("transforms")
        .assert()
        .success()
        .stdout(predicate::str::contains("rechunk"))
        .stdout(predicate::str::contains("anomalise"));
}

#[test]
fn prepare_builds_then_reports_present() {
    let ws = Workspace::new(RECIPE);

    ws.climprep()
        .args(["prepare", "GPCP"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 built"))
        .stdout(predicate::str::contains("Succeeded processing all targets"));

    let processed = ws.path().join("data/processed");
    assert!(processed.join("GPCP.precip.json").is_file());
    assert!(processed.join("GPCP.annual.precip.json").is_file());

    ws.climprep()
        .args(["prepare", "GPCP"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already present"))
        .stdout(predicate::str::contains("0 built, 2 already present"));
}

#[test]
fn prepare_dry_run_writes_nothing() {
    let ws = Workspace::new(RECIPE);

    ws.climprep()
        .args(["prepare", "GPCP", "--dry-run", "-t", "annual.precip"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Build plan (2 targets)"))
        .stdout(predicate::str::contains("[depends: precip]"));

    assert!(!ws.path().join("data/processed/GPCP.precip.json").exists());
}

#[test]
fn prepare_missing_recipe_fails() {
    let ws = Workspace::new(RECIPE);
    ws.climprep()
        .args(["prepare", "ERA5"])
        .assert()
        .failure();
}

#[test]
fn prepare_reports_failed_target() {
    let ws = Workspace::new(
        "
name: GPCP
prepare:
  precip:
    uses:
      monthly: [precip]
    apply: [no_such_step]
  annual.precip:
    uses:
      prepared: [precip]
",
    );

    ws.climprep()
        .args(["prepare", "GPCP"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("skipped: depends on failed 'precip'"));

    assert!(!ws.path().join("data/processed/GPCP.precip.json").exists());
}

#[test]
fn validate_rejects_unknown_transform() {
    let ws = Workspace::new(
        "
name: GPCP
prepare:
  precip:
    uses: [precip]
    apply: [no_such_step]
",
    );

    ws.climprep()
        .args(["validate", "GPCP"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("unknown transform 'no_such_step'"));
}

#[test]
fn validate_accepts_good_recipe() {
    let ws = Workspace::new(RECIPE);
    ws.climprep()
        .args(["validate", "GPCP"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Recipe is valid"));
}

#[test]
fn graph_prints_build_order() {
    let ws = Workspace::new(RECIPE);
    ws.climprep()
        .args(["graph", "GPCP"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "1. precip\n2. annual.precip [depends: precip]",
        ));
}

#[test]
fn store_list_after_prepare() {
    let ws = Workspace::new(RECIPE);
    ws.climprep().args(["prepare", "GPCP"]).assert().success();

    ws.climprep()
        .args(["store", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("GPCP.annual.precip"));
}
