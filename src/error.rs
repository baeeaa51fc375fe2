// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for bit heap construction and compression.
//!
//! Configuration errors (bad weights, impossible removals, an unusable
//! compressor catalog) and internal-consistency errors both abort the
//! generation of the current operator. Truncation of bits above the declared
//! maximum weight is not an error; it is reported on the logging channel.

/// Error type for bit heap operations.
#[derive(Debug, Clone, PartialEq)]
pub enum BitHeapError {
    /// A weight argument was negative.
    NegativeWeight { weight: i64, context: &'static str },
    /// More bits were requested from a column than it holds.
    EmptyColumn {
        weight: usize,
        requested: usize,
        available: usize,
    },
    /// A "latest bit" query covered only empty columns.
    AllColumnsVoid { lsb: usize, msb: usize },
    /// The compressor catalog could not provide a 3:2 compressor.
    MissingFullAdder,
    /// A bit expression referenced a bus or signal the heap does not know.
    UnknownSignal(String),
    /// A multiplier tile description was malformed.
    InvalidTile(String),
    /// An operator was configured with impossible parameters.
    InvalidOperator(String),
    /// The scheduler reached a state its invariants say is impossible.
    Internal(String),
}

impl BitHeapError {
    /// Whether the error indicates an algorithm bug rather than bad input.
    pub fn is_internal(&self) -> bool {
        matches!(self, BitHeapError::Internal(_))
    }
}

impl std::fmt::Display for BitHeapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BitHeapError::NegativeWeight { weight, context } => {
                write!(f, "negative weight ({}) in {}", weight, context)
            }
            BitHeapError::EmptyColumn {
                weight,
                requested,
                available,
            } => write!(
                f,
                "cannot remove {} bit(s) from column {} holding {}",
                requested, weight, available
            ),
            BitHeapError::AllColumnsVoid { lsb, msb } => {
                write!(f, "all columns in [{}, {}] are void", lsb, msb)
            }
            BitHeapError::MissingFullAdder => {
                write!(f, "compressor catalog did not build a full adder")
            }
            BitHeapError::UnknownSignal(name) => write!(f, "unknown signal: {}", name),
            BitHeapError::InvalidTile(msg) => write!(f, "invalid multiplier tile: {}", msg),
            BitHeapError::InvalidOperator(msg) => write!(f, "invalid operator: {}", msg),
            BitHeapError::Internal(msg) => write!(f, "internal bit heap error: {}", msg),
        }
    }
}

impl std::error::Error for BitHeapError {}
