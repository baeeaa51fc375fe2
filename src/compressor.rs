// SPDX-License-Identifier: Apache-2.0

//! Catalog of the fixed-shape reduction primitives available on a fabric.
//!
//! A compressor consumes `heights[0]` bits of weight `w` and `heights[1]`
//! bits of weight `w+1` and produces the unsigned binary sum of those bits on
//! `output_height` wires starting at weight `w`.

use std::cmp::Ordering;

use serde::Serialize;

use crate::error::BitHeapError;

/// Largest number of output bits a generated compressor may have.
const MAX_OUTPUT_BITS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Compressor {
    /// Bits consumed per column, column 0 being the target weight.
    pub heights: [usize; 2],
    pub output_height: usize,
    /// Area in LUT units.
    pub cost: usize,
}

/// Number of bits needed to represent `value`.
fn bits_for(value: usize) -> usize {
    (usize::BITS - value.leading_zeros()) as usize
}

impl Compressor {
    pub fn new(col0: usize, col1: usize) -> Self {
        let output_height = bits_for(col0 + 2 * col1);
        Compressor {
            heights: [col0, col1],
            output_height,
            // One LUT per output bit.
            cost: output_height,
        }
    }

    pub fn full_adder() -> Self {
        Compressor::new(3, 0)
    }

    pub fn half_adder() -> Self {
        Compressor::new(2, 0)
    }

    pub fn input_count(&self) -> usize {
        self.heights[0] + self.heights[1]
    }

    pub fn spans_two_columns(&self) -> bool {
        self.heights[1] != 0
    }

    /// Bits removed from the heap per application.
    pub fn reduction(&self) -> usize {
        self.input_count().saturating_sub(self.output_height)
    }

    /// Short name, e.g. `c51` for the (5,1) compressor.
    pub fn name(&self) -> String {
        format!("c{}{}", self.heights[0], self.heights[1])
    }

    /// Compares by bits removed per unit of cost, higher first.
    fn efficiency_cmp(&self, other: &Self) -> Ordering {
        let lhs = self.reduction() * other.cost;
        let rhs = other.reduction() * self.cost;
        rhs.cmp(&lhs)
    }
}

impl std::fmt::Display for Compressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({},{}:{})",
            self.heights[0], self.heights[1], self.output_height
        )
    }
}

/// Compressors for one fabric, most efficient first.
#[derive(Debug, Clone, Serialize)]
pub struct CompressorCatalog {
    entries: Vec<Compressor>,
    full_adder: usize,
    half_adder: Compressor,
}

impl CompressorCatalog {
    /// Enumerates every two-column shape `(col0, col1)` with `col0 >= 3` that
    /// fits in a primitive of `lut_inputs` inputs and produces at most three
    /// output bits. The full adder is kept apart from the efficiency sort and
    /// placed last so that it is only reached as a fallback.
    pub fn generate(lut_inputs: usize) -> Result<Self, BitHeapError> {
        let mut entries = Vec::new();
        let mut full_adder = None;
        for col0 in (3..=lut_inputs).rev() {
            for col1 in (0..=col0).rev() {
                if col0 + col1 > lut_inputs || bits_for(col0 + 2 * col1) > MAX_OUTPUT_BITS {
                    continue;
                }
                let compressor = Compressor::new(col0, col1);
                if col0 == 3 && col1 == 0 {
                    full_adder = Some(compressor);
                } else {
                    entries.push(compressor);
                }
            }
        }
        let full_adder = full_adder.ok_or(BitHeapError::MissingFullAdder)?;
        entries.sort_by(Compressor::efficiency_cmp);
        entries.push(full_adder);
        let full_adder = entries.len() - 1;
        log::debug!(
            "compressor catalog for {}-input LUTs: {}",
            lut_inputs,
            entries
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        );
        Ok(CompressorCatalog {
            entries,
            full_adder,
            half_adder: Compressor::half_adder(),
        })
    }

    /// Compressors available to the greedy pass, in preference order.
    pub fn entries(&self) -> &[Compressor] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> &Compressor {
        &self.entries[index]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn full_adder(&self) -> &Compressor {
        &self.entries[self.full_adder]
    }

    pub fn half_adder(&self) -> &Compressor {
        &self.half_adder
    }
}
