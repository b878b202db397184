use adcmon_config::from_str;
use rstest::rstest;

#[test]
fn rejects_zero_poll_limit() {
    let toml = r#"
[timing]
spi_settle_us = 1000
poll_limit = 0
poll_interval_us = 100
"#;
    let err = from_str(toml).expect_err("should reject poll_limit=0");
    assert!(format!("{err}").contains("poll_limit must be >= 1"));
}

#[test]
fn rejects_zero_monitor_period() {
    let toml = r#"
[monitor]
period_ms = 0
hist_publish_every = 60
"#;
    let err = from_str(toml).expect_err("should reject period_ms=0");
    assert!(format!("{err}").contains("period_ms must be >= 1"));
}

#[test]
fn rejects_zero_hist_cadence() {
    let toml = r#"
[monitor]
hist_publish_every = 0
"#;
    let err = from_str(toml).expect_err("should reject hist_publish_every=0");
    assert!(format!("{err}").contains("hist_publish_every"));
}

#[rstest]
#[case("never")]
#[case("daily")]
#[case("hourly")]
fn accepts_known_rotation_policies(#[case] rotation: &str) {
    let toml = format!(
        r#"
[logging]
rotation = "{rotation}"
"#
    );
    from_str(&toml).expect("valid rotation");
}

#[test]
fn rejects_unknown_rotation_policy() {
    let toml = r#"
[logging]
rotation = "weekly"
"#;
    let err = from_str(toml).expect_err("should reject unknown rotation");
    assert!(format!("{err}").contains("rotation"));
}

#[test]
fn empty_document_yields_validated_defaults() {
    let cfg = from_str("").expect("empty config uses defaults");
    assert_eq!(cfg.timing.poll_limit, 100);
    assert_eq!(cfg.dispatch.cmd_gap_ms, 1_000);
    assert_eq!(cfg.snapshot.dump_path, "adc_snapshot.txt");
}

#[test]
fn hardware_section_parses_register_table() {
    let toml = r#"
[hardware]
map_path = "/dev/roach_mem"

[hardware.registers]
adc5g_controller = 0
scope_snap0_ctrl = 256
scope_snap0_status = 260
scope_snap0_bram = 4096
"#;
    let cfg = from_str(toml).expect("parse hardware section");
    assert_eq!(cfg.hardware.map_path.as_deref(), Some("/dev/roach_mem"));
    assert_eq!(cfg.hardware.registers["scope_snap0_bram"], 4096);
}

#[test]
fn load_reads_from_disk() {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(file, "[monitor]\nperiod_ms = 250").expect("write");
    let cfg = adcmon_config::load(file.path()).expect("load");
    assert_eq!(cfg.monitor.period_ms, 250);
}
