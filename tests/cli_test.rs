use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

#[test]
fn test_cli_batch_ranks_exceptions() -> Result<(), Box<dyn std::error::Error>> {
    let output = Command::new(cargo_bin!("reconcile-engine"))
        .arg("batch")
        .arg("tests/fixtures/source_a.csv")
        .arg("tests/fixtures/source_b.csv")
        .output()?;
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout)?;
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines[0],
        "txn_ref_id,source_system,amount,exception_code,severity,risk_score,anomaly_score,description,suggested_resolution,trace_id"
    );
    assert_eq!(lines.len(), 4);
    // Highest risk first
    assert!(lines[1].starts_with("INV-1004,SOURCE_A,100000.00,MISSING_IN_SOURCE_B,HIGH,150.0,"));
    assert!(lines[2].starts_with("BNK-9001,SOURCE_B,310.00,MISSING_IN_SOURCE_A,HIGH,50.31,"));
    assert!(lines[3].starts_with("INV-1005,SOURCE_A,5000.00,AMOUNT_MISMATCH,LOW,25.0,"));
    Ok(())
}

#[test]
fn test_cli_batch_writes_out_dir() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    Command::new(cargo_bin!("reconcile-engine"))
        .arg("batch")
        .arg("tests/fixtures/source_a.csv")
        .arg("tests/fixtures/source_b.csv")
        .arg("--out-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let matches = std::fs::read_to_string(dir.path().join("matches.csv"))?;
    assert!(matches.contains("INV-1001,INV-1001,SOURCE_A,SOURCE_B,EXACT,AUTO_RECONCILED,100.0"));
    assert!(matches.contains("INV-1002,INV-1002,SOURCE_A,SOURCE_B,TOLERANCE,OPS_REVIEW,100.0"));
    assert!(matches.contains("INV-1003,INV1003,SOURCE_A,SOURCE_B,FUZZY_ID,OPS_REVIEW,87.5"));

    let exceptions = std::fs::read_to_string(dir.path().join("exceptions.csv"))?;
    assert_eq!(exceptions.lines().count(), 4);
    Ok(())
}

#[test]
fn test_cli_config_override() {
    // Tighter tolerance and fuzzy threshold: the jittered and the renamed
    // pairs both fall through to exceptions.
    Command::new(cargo_bin!("reconcile-engine"))
        .arg("--config")
        .arg("tests/fixtures/tight.toml")
        .arg("batch")
        .arg("tests/fixtures/source_a.csv")
        .arg("tests/fixtures/source_b.csv")
        .assert()
        .success()
        .stdout(predicate::str::contains("INV-1002,SOURCE_A,1200.00,AMOUNT_MISMATCH"))
        .stdout(predicate::str::contains("INV-1003,SOURCE_A,75.50,MISSING_IN_SOURCE_B"))
        .stdout(predicate::str::contains("INV1003,SOURCE_B,75.50,MISSING_IN_SOURCE_A"));
}

#[test]
fn test_cli_stream_drains_pending() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let audit_log = dir.path().join("audit.jsonl");
    Command::new(cargo_bin!("reconcile-engine"))
        .arg("--audit-log")
        .arg(&audit_log)
        .arg("stream")
        .arg("tests/fixtures/source_a.csv")
        .arg("tests/fixtures/source_b.csv")
        .arg("--out-dir")
        .arg(dir.path())
        .assert()
        .success();

    let matches = std::fs::read_to_string(dir.path().join("matches.csv"))?;
    assert!(matches.contains("INV-1001,INV-1001,SOURCE_B,SOURCE_A,HYBRID_ML,AUTO_RECONCILED"));
    assert!(matches.contains("INV-1002,INV-1002,SOURCE_B,SOURCE_A,HYBRID_ML,OPS_REVIEW"));

    let exceptions = std::fs::read_to_string(dir.path().join("exceptions.csv"))?;
    assert!(exceptions.contains(
        "INV-1004,SOURCE_A,100000.00,MISSING_IN_SOURCE_B,HIGH,150.0,,Pending event never matched (time-out)"
    ));
    assert!(exceptions.contains("BNK-9001,SOURCE_B,310.00,MISSING_IN_SOURCE_A,HIGH"));

    let audit = std::fs::read_to_string(&audit_log)?;
    let actions: Vec<String> = audit
        .lines()
        .map(|line| {
            let entry: serde_json::Value = serde_json::from_str(line).unwrap();
            entry["action"].as_str().unwrap().to_string()
        })
        .collect();
    assert!(actions.iter().any(|a| a == "MATCH"));
    assert!(actions.iter().any(|a| a == "DRAIN"));
    Ok(())
}

#[test]
fn test_cli_stress_reports_flips() {
    Command::new(cargo_bin!("reconcile-engine"))
        .arg("stress")
        .arg("tests/fixtures/source_a.csv")
        .arg("tests/fixtures/source_b.csv")
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "scenario,txn_ref_id,baseline_status,scenario_status,stability,scenario_score",
        ))
        .stdout(predicate::str::contains(
            "HIGH_VOLATILITY_TIGHT_TOLERANCE,INV-1001,AUTO_RECONCILED,AUTO_RECONCILED,STABLE",
        ))
        .stdout(predicate::str::contains(
            "HIGH_VOLATILITY_TIGHT_TOLERANCE,INV-1002,OPS_REVIEW,OPS_REVIEW,STABLE",
        ))
        .stdout(predicate::str::contains(
            "OPS_OVERLOAD_STRICT_REVIEW,INV-1002,OPS_REVIEW,UNMATCHED,FLIPPED",
        ));
}

#[test]
fn test_cli_missing_column_is_fatal() {
    Command::new(cargo_bin!("reconcile-engine"))
        .arg("batch")
        .arg("tests/fixtures/missing_column.csv")
        .arg("tests/fixtures/source_b.csv")
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing required column 'value_date'"));
}

#[test]
fn test_cli_malformed_rows_are_skipped() {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "txn_ref_id,value_date,amount,currency").unwrap();
    writeln!(csv, "INV-1001,2024-05-01,250.00,USD").unwrap();
    writeln!(csv, "INV-2001,not-a-date,10.00,USD").unwrap();
    writeln!(csv, "INV-2002,2024-05-01,,USD").unwrap();

    Command::new(cargo_bin!("reconcile-engine"))
        .arg("batch")
        .arg(csv.path())
        .arg("tests/fixtures/source_b.csv")
        .assert()
        .success()
        .stderr(predicate::str::contains("Error reading event"))
        .stderr(predicate::str::contains("Skipping event INV-2002: missing required field(s): amount"))
        .stdout(predicate::str::contains("INV-2001").not());
}
