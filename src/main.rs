// SPDX-License-Identifier: Apache-2.0

//! Generates bit-heap based arithmetic operators.
//!
//! ```shell
//! $ bitheap-gen --fabric=stratixv mult --width-x=16 --width-y=16
//! $ bitheap-gen --output=stats --check-samples=1000 \
//!     multi-add --width=12 --count=7 --signed
//! ```

mod report_cli_error;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use report_cli_error::report_cli_error_and_exit;
use serde::Serialize;

use xlsynth_bitheap::adders::AdderMapping;
use xlsynth_bitheap::bit_heap::{CompressionStrategy, WrapUpStrategy};
use xlsynth_bitheap::config::{GeneratorConfig, load_config};
use xlsynth_bitheap::emit_verilog::emit_verilog;
use xlsynth_bitheap::operators::{
    MultiAdderConfig, MultiplierConfig, Operator, OperatorKind, int_multi_adder, int_multiplier,
};
use xlsynth_bitheap::schedule::{CompressionResult, CompressionStats, Schedule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Verilog,
    Json,
    Stats,
}

/// Bit-heap operator generator.
#[derive(Parser, Debug)]
#[command(name = "bitheap-gen")]
struct Args {
    /// TOML file with a `[bitheap]` table.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fabric preset to generate for.
    #[arg(long)]
    fabric: Option<String>,

    #[arg(long)]
    frequency_mhz: Option<f64>,

    /// Whether to insert pipeline registers.
    #[arg(long)]
    #[arg(action = clap::ArgAction::Set)]
    pipelined: Option<bool>,

    /// Whether to chain DSP tiles.
    #[arg(long)]
    #[arg(action = clap::ArgAction::Set)]
    supertiles: Option<bool>,

    #[arg(long, value_enum)]
    wrap_up: Option<WrapUpStrategy>,

    /// How compressors are scheduled.
    #[arg(long, value_enum)]
    strategy: Option<CompressionStrategy>,

    #[arg(long, value_enum)]
    adder_mapping: Option<AdderMapping>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Verilog)]
    output: OutputFormat,

    /// Number of random input samples to check the lowered gates against
    /// (0 disables).
    #[arg(long, default_value_t = 0)]
    check_samples: usize,

    /// Seed for the random samples.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Unsigned integer multiplier.
    Mult {
        #[arg(long)]
        width_x: usize,
        #[arg(long)]
        width_y: usize,
        /// Keep only this many most significant product bits, rounded.
        #[arg(long)]
        output_width: Option<usize>,
        /// Use the fabric's DSP blocks.
        #[arg(long, default_value_t = false)]
        dsp: bool,
    },
    /// Sum of several operands of one width.
    MultiAdd {
        #[arg(long)]
        width: usize,
        #[arg(long)]
        count: usize,
        #[arg(long, default_value_t = false)]
        signed: bool,
        /// Subtract the last operand.
        #[arg(long, default_value_t = false)]
        subtract_last: bool,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Mult { .. } => "mult",
            Command::MultiAdd { .. } => "multi-add",
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    operator: &'a str,
    kind: &'a OperatorKind,
    output_lsb: usize,
    output_width: usize,
    result: &'a CompressionResult,
    stats: &'a CompressionStats,
    schedule: &'a Schedule,
}

fn flag_overrides(args: &Args) -> GeneratorConfig {
    GeneratorConfig {
        fabric_preset: args.fabric.clone(),
        frequency_mhz: args.frequency_mhz,
        pipelined: args.pipelined,
        supertiles: args.supertiles,
        wrap_up: args.wrap_up,
        strategy: args.strategy,
        adder_mapping: args.adder_mapping,
        ..Default::default()
    }
}

fn generate(args: &Args, config: &GeneratorConfig) -> Result<Operator> {
    let fabric = config.fabric()?;
    let options = config.heap_options()?;
    log::info!("generating for fabric {} at {} MHz", fabric.name, fabric.frequency_mhz);
    let mut operator = match &args.command {
        Command::Mult {
            width_x,
            width_y,
            output_width,
            dsp,
        } => {
            let mult = MultiplierConfig {
                width_x: *width_x,
                width_y: *width_y,
                output_width: *output_width,
                use_dsp: *dsp,
            };
            int_multiplier(0, &mult, fabric, options)?
        }
        Command::MultiAdd {
            width,
            count,
            signed,
            subtract_last,
        } => {
            let adder = MultiAdderConfig {
                width: *width,
                count: *count,
                signed: *signed,
                subtract_last: *subtract_last,
            };
            int_multi_adder(0, &adder, fabric, options)?
        }
    };
    operator
        .heap
        .run_compression()
        .with_context(|| format!("compressing the bit heap of {}", operator.name))?;
    Ok(operator)
}

fn print_stats(operator: &Operator) -> Result<()> {
    let heap = &operator.heap;
    let result = heap
        .result()
        .context("compressed heap has no result")?;
    let stats = heap.stats();
    println!("operator: {}", operator.name);
    println!("heap width: {}", result.width);
    println!(
        "output: {} bits from weight {}",
        operator.output_width, operator.output_lsb
    );
    println!("stages: {}", stats.stages);
    for (name, count) in &stats.compressors {
        println!("compressor {}: {}", name, count);
    }
    println!("adders: {}", stats.adders);
    println!("ternary adders: {}", stats.ternary_adders);
    println!("chunks: {}", stats.chunks);
    println!("dsp tiles: {}", stats.tiles);
    if let Some(time) = stats.result_time {
        println!(
            "result time: cycle {} + {:.3} ns",
            time.cycle,
            time.critical_path * 1e9
        );
    }
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    let file_config = match &args.config {
        Some(path) => load_config(path)?,
        None => GeneratorConfig::default(),
    };
    let config = file_config.merged_with(flag_overrides(args));
    let operator = generate(args, &config)?;

    if args.check_samples > 0 {
        let mismatch = operator.check_random_samples(
            config.adder_mapping(),
            args.check_samples,
            args.seed,
        )?;
        if let Some(mismatch) = mismatch {
            bail!("{}: {}", operator.name, mismatch);
        }
        log::info!("{} samples checked", args.check_samples);
    }

    match args.output {
        OutputFormat::Verilog => print!("{}", emit_verilog(&operator.heap, &operator.name)?),
        OutputFormat::Json => {
            let result = operator
                .heap
                .result()
                .context("compressed heap has no result")?;
            let report = JsonReport {
                operator: &operator.name,
                kind: &operator.kind,
                output_lsb: operator.output_lsb,
                output_width: operator.output_width,
                result,
                stats: operator.heap.stats(),
                schedule: operator.heap.schedule(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Stats => print_stats(&operator)?,
    }
    Ok(())
}

fn main() {
    let _ = env_logger::builder().try_init();
    let args = Args::parse();
    if let Err(e) = run(&args) {
        let config = args
            .config
            .as_ref()
            .map_or_else(|| "<none>".to_string(), |p| p.display().to_string());
        let command = format!("{:?}", args.command);
        report_cli_error_and_exit(
            &format!("{:#}", e),
            Some(args.command.name()),
            vec![("command", &command), ("config", &config)],
        );
    }
}
