// SPDX-License-Identifier: Apache-2.0

//! Weighted bits: the records held by the bit heap's columns.

use std::cmp::Ordering;

use serde::Serialize;

/// Stable index of a bit in the heap's arena.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize)]
pub struct BitId(pub usize);

/// Index of a declared input bus.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize)]
pub struct BusId(pub usize);

/// Index of a signal declared by a reduction event.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize)]
pub struct SignalId(pub usize);

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BitType {
    External,
    CompressorOutput,
    AdderOutput,
    Constant,
}

/// Simulated hardware time of a bit: the pipeline cycle it belongs to and the
/// combinational delay accumulated within that cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BitTime {
    pub cycle: u32,
    pub critical_path: f64,
}

impl BitTime {
    pub const ZERO: BitTime = BitTime {
        cycle: 0,
        critical_path: 0.0,
    };

    pub fn new(cycle: u32, critical_path: f64) -> Self {
        BitTime {
            cycle,
            critical_path,
        }
    }

    /// Time in seconds since the start of cycle 0.
    pub fn absolute(&self, cycle_period: f64) -> f64 {
        self.cycle as f64 * cycle_period + self.critical_path
    }

    /// Scheduling stage this time falls into.
    pub fn stage(&self, stages_per_cycle: f64, elementary_delay: f64) -> i64 {
        (self.cycle as f64 * stages_per_cycle + self.critical_path / elementary_delay).floor()
            as i64
    }
}

impl Eq for BitTime {}

impl PartialOrd for BitTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BitTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cycle
            .cmp(&other.cycle)
            .then_with(|| self.critical_path.total_cmp(&other.critical_path))
    }
}

/// Expression producing the value of a bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BitExpr {
    Input { bus: BusId, index: usize },
    Literal(bool),
    Not(Box<BitExpr>),
    And(Box<BitExpr>, Box<BitExpr>),
    /// Bit `index` of a signal produced by a reduction event.
    Signal { signal: SignalId, index: usize },
}

impl BitExpr {
    pub fn input(bus: BusId, index: usize) -> Self {
        BitExpr::Input { bus, index }
    }

    #[must_use]
    pub fn negated(self) -> Self {
        match self {
            BitExpr::Not(inner) => *inner,
            BitExpr::Literal(v) => BitExpr::Literal(!v),
            other => BitExpr::Not(Box::new(other)),
        }
    }

    pub fn and(lhs: BitExpr, rhs: BitExpr) -> Self {
        BitExpr::And(Box::new(lhs), Box::new(rhs))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WeightedBit {
    pub id: BitId,
    pub weight: usize,
    /// Unique within the bit's column.
    pub uid: usize,
    pub time: BitTime,
    pub bit_type: BitType,
    pub source: BitExpr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl WeightedBit {
    /// Name of the wire carrying this bit in heap `guid`.
    pub fn name(&self, guid: usize) -> String {
        format!("bh{}_w{}_{}", guid, self.weight, self.uid)
    }
}
