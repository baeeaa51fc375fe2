// SPDX-License-Identifier: Apache-2.0

//! And-inverter graph used to check compressed heaps bit-exactly.

pub mod gate;
pub mod gate_builder;
pub mod gate_sim;
pub mod topo;

pub use gate::{AigBitVector, AigNode, AigOperand, AigRef, GateFn, Input, Output};
pub use gate_builder::{GateBuilder, GateBuilderOptions, ReductionKind};
