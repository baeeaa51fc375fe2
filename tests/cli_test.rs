// SPDX-License-Identifier: Apache-2.0

use std::process::Command;

fn bitheap_gen() -> Command {
    Command::new(env!("CARGO_BIN_EXE_bitheap-gen"))
}

#[test]
fn mult_emits_verilog_module() {
    let output = bitheap_gen()
        .args(["mult", "--width-x=6", "--width-y=5"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("module IntMultiplier_6x5_11("), "{}", stdout);
    assert!(stdout.contains("input wire [5:0] X"));
    assert!(stdout.contains("input wire [4:0] Y"));
    assert!(stdout.contains("output wire [10:0] R"));
    assert!(stdout.trim_end().ends_with("endmodule"));
}

#[test]
fn multi_add_json_and_self_check() {
    let output = bitheap_gen()
        .args([
            "--output=json",
            "--fabric=stratixv",
            "--check-samples=64",
            "--seed=5",
            "multi-add",
            "--width=7",
            "--count=6",
            "--signed",
        ])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["operator"], "IntMultiAdder_s_6x7");
    assert_eq!(report["output_width"], 10);
    assert_eq!(report["result"]["width"], 10);
    assert!(report["schedule"]["events"].as_array().is_some_and(|e| !e.is_empty()));
}

#[test]
fn parandeh_afshar_strategy_self_check() {
    let output = bitheap_gen()
        .args([
            "--strategy=parandeh-afshar",
            "--check-samples=128",
            "--seed=11",
            "mult",
            "--width-x=9",
            "--width-y=7",
        ])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("module IntMultiplier_9x7_16("), "{}", stdout);
}

#[test]
fn stats_output_with_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("bitheap.toml");
    std::fs::write(
        &config,
        "[bitheap]\nfabric_preset = \"virtex6\"\nwrap_up = \"compressor_row\"\n",
    )
    .unwrap();
    let output = bitheap_gen()
        .arg("--output=stats")
        .arg("--config")
        .arg(&config)
        .args(["mult", "--width-x=8", "--width-y=8", "--output-width=8"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("operator: IntMultiplier_8x8_8"), "{}", stdout);
    assert!(stdout.contains("output: 8 bits from weight 4"), "{}", stdout);
    assert!(stdout.contains("stages: "), "{}", stdout);
}

#[test]
fn invalid_operator_reports_error() {
    let output = bitheap_gen()
        .args(["mult", "--width-x=4", "--width-y=4", "--output-width=12"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("bitheap-gen: mult: "), "{}", stderr);
    assert!(stderr.contains("invalid operator"), "{}", stderr);
}

#[test]
fn unknown_fabric_is_rejected() {
    let output = bitheap_gen()
        .args(["--fabric=cyclone", "multi-add", "--width=4", "--count=3"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown fabric preset"), "{}", stderr);
}
