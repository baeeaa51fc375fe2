// SPDX-License-Identifier: Apache-2.0

//! The reduction schedule: an ordered log of everything the compression
//! engine did to the heap. Emitters (gate lowering, Verilog) render this log;
//! the scheduler itself never produces text.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::bit::{BitId, BitTime, BusId, SignalId};
use crate::compressor::Compressor;

/// A bus declared by a reduction event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalDecl {
    pub name: String,
    pub width: usize,
    /// When the signal's value is available.
    pub time: BitTime,
}

/// Contiguous slice of a declared input bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BusSlice {
    pub bus: BusId,
    pub lsb: usize,
    pub width: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdderRole {
    /// Low-order columns that were almost done, summed before the next stage.
    ShortCircuit,
    /// Three-input adder replacing a run of compressors.
    TernaryChain,
    /// Adder run formed while reducing the last height-3 columns.
    WrapUp,
    /// The last carry-propagate addition.
    Final,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReductionEvent {
    Compressor {
        compressor: Compressor,
        weight: usize,
        stage: i64,
        /// Consumed bits of column `weight` and `weight+1`.
        inputs: [Vec<BitId>; 2],
        output: SignalId,
        /// Heap bits created from the output, `None` where truncated.
        output_bits: Vec<Option<BitId>>,
    },
    Adder {
        role: AdderRole,
        weight: usize,
        /// Two or three operand rows, LSB first, `None` for a zero.
        rows: Vec<Vec<Option<BitId>>>,
        carry_in: Option<BitId>,
        output: SignalId,
        output_bits: Vec<Option<BitId>>,
    },
    /// Finished low-order columns, set aside for the final concatenation.
    Chunk {
        weight: usize,
        bits: Vec<Option<BitId>>,
        output: SignalId,
    },
    /// Product of a multiplier tile, optionally accumulating the upper part of
    /// the previous product of its chain.
    TileProduct {
        tile: usize,
        weight: i64,
        x: BusSlice,
        y: BusSlice,
        accumulate: Option<Accumulate>,
        output: SignalId,
        output_bits: Vec<Option<BitId>>,
    },
}

/// `signal >> shift`, added into a tile product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Accumulate {
    pub signal: SignalId,
    pub shift: usize,
}

impl ReductionEvent {
    pub fn output(&self) -> SignalId {
        match self {
            ReductionEvent::Compressor { output, .. }
            | ReductionEvent::Adder { output, .. }
            | ReductionEvent::Chunk { output, .. }
            | ReductionEvent::TileProduct { output, .. } => *output,
        }
    }

    /// Heap bits read by this event.
    pub fn consumed_bits(&self) -> Vec<BitId> {
        match self {
            ReductionEvent::Compressor { inputs, .. } => {
                inputs.iter().flatten().copied().collect()
            }
            ReductionEvent::Adder { rows, carry_in, .. } => rows
                .iter()
                .flatten()
                .flatten()
                .copied()
                .chain(carry_in.iter().copied())
                .collect(),
            ReductionEvent::Chunk { bits, .. } => bits.iter().flatten().copied().collect(),
            ReductionEvent::TileProduct { .. } => Vec::new(),
        }
    }
}

/// Width of one part of the result, taken from the low bits of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResultPart {
    pub signal: SignalId,
    pub width: usize,
}

/// The final sum: a concatenation of signals, most significant part first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompressionResult {
    pub name: String,
    pub width: usize,
    pub parts: Vec<ResultPart>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompressionStats {
    pub stages: usize,
    /// Applications per compressor name.
    pub compressors: BTreeMap<String, usize>,
    pub adders: usize,
    pub ternary_adders: usize,
    pub chunks: usize,
    pub tiles: usize,
    pub result_time: Option<BitTime>,
}

impl CompressionStats {
    pub fn compressor_count(&self) -> usize {
        self.compressors.values().sum()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Schedule {
    pub signals: Vec<SignalDecl>,
    pub events: Vec<ReductionEvent>,
}

impl Schedule {
    pub fn declare_signal(&mut self, name: String, width: usize, time: BitTime) -> SignalId {
        let id = SignalId(self.signals.len());
        log::trace!("declare {}[{}] at {:?}", name, width, time);
        self.signals.push(SignalDecl { name, width, time });
        id
    }

    pub fn signal(&self, id: SignalId) -> &SignalDecl {
        &self.signals[id.0]
    }

    pub fn push(&mut self, event: ReductionEvent) {
        self.events.push(event);
    }

    /// Index of the event defining each signal.
    pub fn producers(&self) -> BTreeMap<SignalId, usize> {
        self.events
            .iter()
            .enumerate()
            .map(|(i, e)| (e.output(), i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumed_bits_of_adder_skip_zeros() {
        let event = ReductionEvent::Adder {
            role: AdderRole::Final,
            weight: 0,
            rows: vec![vec![Some(BitId(1)), None], vec![None, Some(BitId(4))]],
            carry_in: Some(BitId(7)),
            output: SignalId(0),
            output_bits: vec![],
        };
        assert_eq!(event.consumed_bits(), vec![BitId(1), BitId(4), BitId(7)]);
    }

    #[test]
    fn test_declare_signal_assigns_sequential_ids() {
        let mut schedule = Schedule::default();
        let a = schedule.declare_signal("a".to_string(), 3, BitTime::ZERO);
        let b = schedule.declare_signal("b".to_string(), 1, BitTime::new(1, 0.0));
        assert_eq!(a, SignalId(0));
        assert_eq!(b, SignalId(1));
        assert_eq!(schedule.signal(b).width, 1);
    }
}
