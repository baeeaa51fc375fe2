// SPDX-License-Identifier: Apache-2.0

use xlsynth_bitheap::adders::AdderMapping;
use xlsynth_bitheap::emit_verilog::emit_verilog;
use xlsynth_bitheap::operators::{MultiAdderConfig, int_multi_adder};
use xlsynth_bitheap::{BitHeapOptions, Fabric};

/// Builds a four-operand signed adder, compresses it and checks it against
/// random samples before printing its Verilog.
fn build_multi_adder() -> Result<String, Box<dyn std::error::Error>> {
    let config = MultiAdderConfig {
        width: 12,
        count: 4,
        signed: true,
        subtract_last: false,
    };
    let mut op = int_multi_adder(0, &config, Fabric::stratix_v(), BitHeapOptions::default())?;
    let width = op.heap.run_compression()?.width;
    log::info!(
        "{}: {} stages, result width {}",
        op.name,
        op.heap.stats().stages,
        width
    );
    if let Some(mismatch) = op.check_random_samples(AdderMapping::BrentKung, 64, 0)? {
        return Err(format!("{} is wrong: {}", op.name, mismatch).into());
    }
    Ok(emit_verilog(&op.heap, &op.name)?)
}

fn main() {
    let _ = env_logger::try_init();
    match build_multi_adder() {
        Ok(verilog) => print!("{}", verilog),
        Err(e) => {
            eprintln!("multi-adder generation failed: {}", e);
            std::process::exit(1);
        }
    }
}

#[test]
fn test_build_multi_adder() {
    let _ = env_logger::try_init();
    let verilog = build_multi_adder().expect("generation should succeed");
    assert!(verilog.starts_with("module IntMultiAdder_s_4x12("));
}
