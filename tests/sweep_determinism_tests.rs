// tests/sweep_determinism_tests.rs
//
// Determinism and isolation tests for the training sweep.
//
// These tests verify that:
// 1. The same sweep run with 1 thread and with 4 threads produces an identical
//    sweep_summary.json and identical table / reward artifacts
// 2. A run whose workout cannot be simulated, or whose athlete / workout
//    record is invalid, is recorded as failed while its siblings complete
// 3. A sweep cancelled up front writes a summary but no run artifacts
// 4. The CLI `train` command honours --threads without changing results

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::AtomicBool;

use tempfile::tempdir;

use smartpacer::sweep::{summary_path, Q_TABLE_DIR, REWARDS_DIR};
use smartpacer::{run_sweep, RunStatus, SweepInputs, SweepSpec};

const ATHLETES: &str = r#"{
  "elite":   {"HR_rest": 42, "HR_max": 192, "FTP": 320, "weight_kg": 68},
  "amateur": {"HR_rest": 62, "HR_max": 178, "FTP": 190, "weight_kg": 80}
}"#;

const WORKOUTS: &str = r#"{
  "fartlek": {
    "name": "fartlek",
    "duration": 2,
    "segments": [
      {"duration_min": 1, "phase": "warmup", "target_hr_zone": "Z2", "target_power_zone": "Z2"},
      {"duration_min": 1, "phase": "push", "target_hr_zone": "Z4", "target_power_zone": "Z4"}
    ]
  },
  "recovery": {
    "name": "recovery",
    "duration": 1,
    "segments": [
      {"duration_min": 1, "phase": "recover", "target_hr_zone": "Z2", "target_power_zone": "Z1"}
    ]
  },
  "broken": {
    "name": "broken",
    "duration": 1,
    "segments": []
  }
}"#;

fn sweep_yaml(out_dir: &str, workouts: &str) -> String {
    format!(
        r#"sweep_id: determinism
athletes: athletes.json
workouts: workouts.json
workout_filter: {workouts}
hyperparams:
  - alpha: 0.1
    gamma: 0.95
    initial_epsilon: 0.2
    min_epsilon: 0.01
    decay_rate: 0.99
  - alpha: 0.2
    gamma: 0.9
    initial_epsilon: 0.3
    min_epsilon: 0.05
    decay_rate: 0.98
    athletes: [amateur]
episodes: 25
base_seed: 4242
out_dir: {out_dir}
"#
    )
}

/// Write the fixture files and return the loaded spec.
fn setup(dir: &Path, out_dir: &str, workouts: &str) -> SweepSpec {
    fs::write(dir.join("athletes.json"), ATHLETES).unwrap();
    fs::write(dir.join("workouts.json"), WORKOUTS).unwrap();
    let spec_path = dir.join("sweep.yaml");
    fs::write(&spec_path, sweep_yaml(out_dir, workouts)).unwrap();
    SweepSpec::from_yaml_file(&spec_path).unwrap()
}

/// Compare two JSON files structurally.
fn json_files_equal(a: &Path, b: &Path) -> bool {
    let ja: serde_json::Value = serde_json::from_str(&fs::read_to_string(a).unwrap()).unwrap();
    let jb: serde_json::Value = serde_json::from_str(&fs::read_to_string(b).unwrap()).unwrap();
    ja == jb
}

fn sorted_file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_threaded_determinism_summary_identical() {
    let dir = tempdir().unwrap();
    let spec_1 = setup(dir.path(), "out_1", "[fartlek, recovery]");
    let spec_4 = SweepSpec {
        out_dir: dir.path().join("out_4"),
        ..spec_1.clone()
    };
    let inputs = SweepInputs::load(&spec_1).unwrap();
    let cancel = AtomicBool::new(false);

    let s1 = run_sweep(&spec_1, &inputs, 1, &cancel).unwrap();
    let s4 = run_sweep(&spec_4, &inputs, 4, &cancel).unwrap();

    // 2 athletes x 2 workouts for the shared set, 1 x 2 for the restricted set
    assert_eq!(s1.total_runs, 6);
    assert_eq!(s1.completed, 6);
    assert_eq!(s1, s4);

    assert!(json_files_equal(
        &summary_path(&spec_1.out_dir),
        &summary_path(&spec_4.out_dir)
    ));

    for sub in [Q_TABLE_DIR, REWARDS_DIR] {
        let names_1 = sorted_file_names(&spec_1.out_dir.join(sub));
        let names_4 = sorted_file_names(&spec_4.out_dir.join(sub));
        assert_eq!(names_1, names_4);
        assert_eq!(names_1.len(), 6);
        for name in &names_1 {
            let a = fs::read(spec_1.out_dir.join(sub).join(name)).unwrap();
            let b = fs::read(spec_4.out_dir.join(sub).join(name)).unwrap();
            assert_eq!(a, b, "{sub}/{name} differs between thread counts");
        }
    }
}

#[test]
fn test_summary_follows_plan_order_and_labels_are_unique() {
    let dir = tempdir().unwrap();
    let spec = setup(dir.path(), "out", "[fartlek, recovery]");
    let inputs = SweepInputs::load(&spec).unwrap();
    let summary = run_sweep(&spec, &inputs, 3, &AtomicBool::new(false)).unwrap();

    let labels: Vec<&str> = summary.runs.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            "amateur_fartlek_a10_g95_e20_m10_d990",
            "amateur_recovery_a10_g95_e20_m10_d990",
            "elite_fartlek_a10_g95_e20_m10_d990",
            "elite_recovery_a10_g95_e20_m10_d990",
            "amateur_fartlek_a20_g90_e30_m50_d980",
            "amateur_recovery_a20_g90_e30_m50_d980",
        ]
    );
    let mut seeds: Vec<u64> = summary.runs.iter().map(|r| r.seed).collect();
    seeds.sort_unstable();
    seeds.dedup();
    assert_eq!(seeds.len(), labels.len());

    for run in &summary.runs {
        assert_eq!(run.episodes_completed, 25);
        let table = run.q_table_path.as_ref().unwrap();
        assert!(spec.out_dir.join(table).is_file());
        let rewards: Vec<f64> = serde_json::from_str(
            &fs::read_to_string(spec.out_dir.join(run.rewards_path.as_ref().unwrap())).unwrap(),
        )
        .unwrap();
        assert_eq!(rewards.len(), 25);
    }
}

#[test]
fn test_failed_run_does_not_abort_siblings() {
    let dir = tempdir().unwrap();
    let spec = setup(dir.path(), "out", "[broken, recovery]");
    let inputs = SweepInputs::load(&spec).unwrap();
    let summary = run_sweep(&spec, &inputs, 2, &AtomicBool::new(false)).unwrap();

    assert_eq!(summary.total_runs, 6);
    assert_eq!(summary.failed, 3);
    assert_eq!(summary.completed, 3);
    for run in &summary.runs {
        if run.workout == "broken" {
            assert_eq!(run.status, RunStatus::Failed);
            assert!(run.error.is_some());
            assert!(run.q_table_path.is_none());
        } else {
            assert_eq!(run.status, RunStatus::Completed);
            assert!(run.table_sha256.is_some());
        }
    }
    assert!(summary_path(&spec.out_dir).is_file());
}

#[test]
fn test_invalid_records_fail_only_their_own_runs() {
    let dir = tempdir().unwrap();
    let spec = setup(dir.path(), "out", "[nodur, recovery]");

    fs::write(
        dir.path().join("athletes.json"),
        r#"{
  "amateur": {"HR_rest": 62, "HR_max": 178, "FTP": 190, "weight_kg": 80},
  "bad":     {"HR_rest": 50, "HR_max": 180, "weight_kg": 70}
}"#,
    )
    .unwrap();
    let mut workouts: serde_json::Value = serde_json::from_str(WORKOUTS).unwrap();
    workouts["nodur"] = serde_json::json!({
        "name": "nodur",
        "duration": 1,
        "segments": [{"phase": "warmup", "target_hr_zone": "Z1", "target_power_zone": "Z1"}]
    });
    fs::write(dir.path().join("workouts.json"), workouts.to_string()).unwrap();

    let inputs = SweepInputs::load(&spec).unwrap();
    assert!(inputs.rejected_athletes.contains_key("bad"));
    assert!(inputs.rejected_workouts.contains_key("nodur"));

    let summary = run_sweep(&spec, &inputs, 2, &AtomicBool::new(false)).unwrap();

    // 2 athletes x 2 workouts for the shared set, amateur x 2 for the restricted set
    assert_eq!(summary.total_runs, 6);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 4);
    for run in &summary.runs {
        if run.athlete == "amateur" && run.workout == "recovery" {
            assert_eq!(run.status, RunStatus::Completed);
            assert_eq!(run.episodes_completed, 25);
            assert!(spec.out_dir.join(run.q_table_path.as_ref().unwrap()).is_file());
        } else {
            assert_eq!(run.status, RunStatus::Failed, "{}", run.label);
            assert!(run.q_table_path.is_none());
            let error = run.error.as_deref().unwrap();
            if run.athlete == "bad" {
                assert!(error.contains("athletes.bad.FTP"), "{error}");
            } else {
                assert!(error.contains("workouts.nodur.segments[0].duration_min"), "{error}");
            }
        }
    }
    assert_eq!(sorted_file_names(&spec.out_dir.join(Q_TABLE_DIR)).len(), 2);
}

#[test]
fn test_cancelled_sweep_writes_no_artifacts() {
    let dir = tempdir().unwrap();
    let spec = setup(dir.path(), "out", "[fartlek]");
    let inputs = SweepInputs::load(&spec).unwrap();
    let summary = run_sweep(&spec, &inputs, 2, &AtomicBool::new(true)).unwrap();

    assert_eq!(summary.cancelled, summary.total_runs);
    assert!(summary.runs.iter().all(|r| r.episodes_completed == 0));
    assert!(sorted_file_names(&spec.out_dir.join(Q_TABLE_DIR)).is_empty());
    assert!(sorted_file_names(&spec.out_dir.join(REWARDS_DIR)).is_empty());
    assert!(summary_path(&spec.out_dir).is_file());
}

#[test]
fn test_unknown_filter_label_is_rejected() {
    let dir = tempdir().unwrap();
    let spec = setup(dir.path(), "out", "[tempo]");
    let inputs = SweepInputs::load(&spec).unwrap();
    let err = run_sweep(&spec, &inputs, 1, &AtomicBool::new(false)).unwrap_err();
    assert!(err.is_configuration());
    assert!(!summary_path(&spec.out_dir).exists());
}

#[test]
fn test_cli_train_threads_do_not_change_results() {
    let dir = tempdir().unwrap();
    let spec = setup(dir.path(), "cli_out", "[recovery]");
    let spec_path = dir.path().join("sweep.yaml");

    let run = |threads: &str, out: &Path| {
        let status = Command::new(env!("CARGO_BIN_EXE_smartpacer"))
            .args(["train", "--spec"])
            .arg(&spec_path)
            .args(["--threads", threads, "--out-dir"])
            .arg(out)
            .env_remove("SMARTPACER_THREADS")
            .env("RUST_LOG", "warn")
            .status()
            .expect("failed to spawn smartpacer");
        assert!(status.success());
    };
    let out_1 = dir.path().join("cli_1");
    let out_4 = dir.path().join("cli_4");
    run("1", &out_1);
    run("4", &out_4);

    assert!(json_files_equal(&summary_path(&out_1), &summary_path(&out_4)));
    // the sweep file's own out_dir is untouched when overridden
    assert!(!spec.out_dir.exists());
}
