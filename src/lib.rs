// SPDX-License-Identifier: Apache-2.0

//! Bit heaps: collections of weighted bits, reduced by compressors and
//! carry-propagate adders into a single sum.
//!
//! Producers (see `operators`) add bits, bit vectors, constants and
//! multiplier tiles to a `BitHeap`; `BitHeap::run_compression` schedules
//! their reduction against a fabric's timing model and records every step in
//! a `Schedule`, which `lower` renders to gates and `emit_verilog` to text.

pub mod adders;
pub mod aig;
pub mod bit;
pub mod bit_heap;
mod compression;
pub mod compressor;
pub mod config;
pub mod emit_verilog;
pub mod error;
pub mod fabric;
mod final_assembly;
pub mod lower;
pub mod operators;
mod parandeh_afshar;
pub mod schedule;
pub mod supertile;
mod ternary_chain;

pub use bit::{BitExpr, BitId, BitTime, BitType, BusId, SignalId, WeightedBit};
pub use bit_heap::{
    BitHeap, BitHeapOptions, CompressionStrategy, PipelineClock, WrapUpStrategy,
};
pub use error::BitHeapError;
pub use fabric::{Fabric, TimingOracle};
pub use schedule::{CompressionResult, CompressionStats, ReductionEvent, Schedule};
