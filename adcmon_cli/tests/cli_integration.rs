use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Minimal valid TOML config pointing every output into the temp dir.
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = format!(
        r#"
[timing]
spi_settle_us = 1
poll_limit = 100
poll_interval_us = 1

[snapshot]
dump_path = "{dump}"

[calibration]
file = "{cal}"
"#,
        dump = dir.path().join("snap.txt").display(),
        cal = dir.path().join("cal.txt").display(),
    );
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn adcmon(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("adcmon").unwrap();
    cmd.arg("--config").arg(cfg);
    cmd
}

#[rstest]
#[case(&["--help"], "Usage:")]
#[case(&["self-check"], "ok")]
fn cli_smoke_cases(#[case] args: &[&str], #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let mut cmd = adcmon(&cfg);
    for a in args {
        cmd.arg(a);
    }
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(needle));
}

#[test]
fn snapshot_writes_one_sample_per_line() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    adcmon(&cfg)
        .args(["snapshot", "--zdok", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("16384 samples"));

    let dump = fs::read_to_string(dir.path().join("snap_zdok0.txt")).unwrap();
    assert_eq!(dump.lines().count(), 16384);
    assert!(dump.lines().all(|l| l.parse::<i8>().is_ok()));
}

#[test]
fn snapshot_rejects_bad_selector() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    adcmon(&cfg)
        .args(["snapshot", "--zdok", "9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("zdok selector"));
}

#[test]
fn measure_creates_the_calibration_file() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    adcmon(&cfg)
        .args(["measure", "--zdok", "2", "--repeat", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("record written"));

    let cal = fs::read_to_string(dir.path().join("cal.txt")).unwrap();
    assert_eq!(cal.lines().count(), 28);
}

#[test]
fn measure_rejects_out_of_range_repeat() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    adcmon(&cfg)
        .args(["measure", "--repeat", "2001"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("repeat"));
}

#[test]
fn measure_emits_json_when_asked() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let output = adcmon(&cfg)
        .args(["--json", "measure", "--zdok", "0", "--repeat", "1"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let line = stdout
        .lines()
        .find(|l| l.starts_with('{'))
        .expect("a JSON line");
    let v: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(v["event"], "measure");
    assert_eq!(v["zdok"], 0);
    assert!(v["offs"].as_array().unwrap().len() == 4);
}

#[test]
fn ogp_roundtrips_a_bank_file() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let bank = dir.path().join("ogp.txt");
    fs::write(&bank, "10\n-3\n1\n-10\n3\n-1\n25\n0\n7\n-25\n12\n-7\n").unwrap();

    adcmon(&cfg)
        .args(["ogp", "--zdok", "0", "--load"])
        .arg(&bank)
        .assert()
        .success()
        .stdout(predicate::str::contains("applied"));
}

#[test]
fn ogp_read_prints_all_four_cores() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    adcmon(&cfg)
        .args(["ogp", "--zdok", "1"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("core A")
                .and(predicate::str::contains("core D"))
                .and(predicate::str::contains("phase")),
        );
}

#[test]
fn invalid_config_fails_fast() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[timing]\npoll_limit = 0\n").unwrap();

    Command::cargo_bin("adcmon")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .arg("self-check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("poll_limit"));
}
