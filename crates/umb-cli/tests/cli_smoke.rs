use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::tempdir;

const CONFIG: &str = r#"
axes:
  - name: psi
    grid_size: 2
  - name: phi
    grid_size: 2
protocol:
  minimize_calls: 1
  minimize_iterations: 5
  equilibration_steps: 10
  production_samples: 3
  steps_per_sample: 4
"#;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../umb-system/fixtures")
        .join(name)
}

fn umbrella(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_umbrella"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("spawn umbrella")
}

fn write_config(dir: &Path, text: &str) -> String {
    let path = dir.join("run.yaml");
    fs::write(&path, text).unwrap();
    path.display().to_string()
}

#[test]
fn plan_prints_window_table() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), CONFIG);
    let output = umbrella(&["plan", "--config", &config]);
    assert!(output.status.success());
    let table: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(table["windows"], 4);
    assert_eq!(table["entries"][1]["file_stem"], "traj_psi_0_phi_1");
    assert_eq!(table["total_engine_steps"], 4 * (1 + 10 + 3 * 4));
}

#[test]
fn run_then_verify() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), CONFIG);
    let out = dir.path().join("out");
    let out_arg = out.display().to_string();
    let system = fixture("pentane.json").display().to_string();
    let coords = fixture("pentane.pdb").display().to_string();

    let output = umbrella(&[
        "run",
        "--config",
        &config,
        "--system",
        &system,
        "--coords",
        &coords,
        "--out",
        &out_arg,
        "--workers",
        "2",
        "--no-progress",
    ]);
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(out.join("traj/traj_psi_1_phi_1.dcd").exists());
    assert!(out.join("windows.csv").exists());
    let manifest: Value =
        serde_json::from_str(&fs::read_to_string(out.join("manifest.json")).unwrap()).unwrap();
    assert_eq!(manifest["counts"]["complete"], 4);

    let output = umbrella(&[
        "verify", "--config", &config, "--out", &out_arg, "--system", &system,
    ]);
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["ok"], 4);
    assert_eq!(report["checks"][0]["frames"], 3);
    assert_eq!(report["checks"][0]["atoms"], 5);

    fs::write(out.join("traj/traj_psi_0_phi_1.dcd"), b"garbage").unwrap();
    let output = umbrella(&["verify", "--config", &config, "--out", &out_arg]);
    assert!(!output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["ok"], 3);
    assert_eq!(report["checks"][1]["status"], "corrupt");
}

#[test]
fn verify_flags_missing_trajectories() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), CONFIG);
    fs::create_dir_all(dir.path().join("traj")).unwrap();
    let out_arg = dir.path().display().to_string();
    let output = umbrella(&["verify", "--config", &config, "--out", &out_arg]);
    assert!(!output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["ok"], 0);
    assert_eq!(report["checks"][3]["status"], "missing");
}

#[test]
fn unknown_axis_fails_before_any_output() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), "axes:\n  - name: chi\n    grid_size: 2\n");
    let out = dir.path().join("out");
    let output = umbrella(&[
        "run",
        "--config",
        &config,
        "--system",
        &fixture("pentane.json").display().to_string(),
        "--coords",
        &fixture("pentane.pdb").display().to_string(),
        "--out",
        &out.display().to_string(),
        "--no-progress",
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown-parameter"));
    assert!(!out.exists());
}
