// SPDX-License-Identifier: Apache-2.0

//! Multiplier tiles and the chains ("supertiles") formed from them.
//!
//! A tile multiplies a slice of one input bus by a slice of another. DSP tiles
//! whose weights differ by exactly the fabric's cascade shift are chained:
//! each link adds the upper part of the previous product into its own, and
//! only the low bits of the intermediate products and the full last product
//! enter the heap.

use serde::Serialize;

use crate::bit::{BitExpr, BitType, SignalId};
use crate::bit_heap::BitHeap;
use crate::error::BitHeapError;
use crate::schedule::{Accumulate, BusSlice, ReductionEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TileShape {
    /// Hard multiplier block with a cascade adder.
    Dsp,
    /// Small product built from logic.
    Lut,
    /// Product whose width is chosen by the tiling rather than the fabric.
    VariableWidth,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiplierTile {
    pub shape: TileShape,
    pub x: BusSlice,
    pub y: BusSlice,
    /// Heap weight of the product's LSB; product bits below weight 0 are
    /// discarded.
    pub weight: i64,
    pub(crate) next: Option<usize>,
    pub(crate) prev: Option<usize>,
}

impl MultiplierTile {
    pub fn new(shape: TileShape, x: BusSlice, y: BusSlice, weight: i64) -> Self {
        MultiplierTile {
            shape,
            x,
            y,
            weight,
            next: None,
            prev: None,
        }
    }

    pub fn product_width(&self) -> usize {
        self.x.width + self.y.width
    }

    pub fn next(&self) -> Option<usize> {
        self.next
    }

    pub fn prev(&self) -> Option<usize> {
        self.prev
    }

    fn can_chain_with(&self, other: &MultiplierTile, shift: usize) -> bool {
        self.shape == TileShape::Dsp
            && other.shape == TileShape::Dsp
            && (self.weight - other.weight).unsigned_abs() as usize == shift
    }
}

impl BitHeap {
    /// Registers a tile; its bits enter the heap when compression starts.
    pub fn add_multiplier_tile(&mut self, tile: MultiplierTile) -> Result<usize, BitHeapError> {
        for (label, slice) in [("x", &tile.x), ("y", &tile.y)] {
            let bus = self.input(slice.bus)?;
            if slice.width == 0 || slice.lsb + slice.width > bus.width {
                return Err(BitHeapError::InvalidTile(format!(
                    "{} slice [{}, +{}) does not fit bus {} of width {}",
                    label, slice.lsb, slice.width, bus.name, bus.width
                )));
            }
        }
        self.tiles.push(tile);
        Ok(self.tiles.len() - 1)
    }

    pub fn tiles(&self) -> &[MultiplierTile] {
        &self.tiles
    }

    /// Links chainable tiles, lower weight first. A tile takes at most one
    /// successor and one predecessor.
    pub(crate) fn build_supertiles(&mut self, shift: usize) {
        let count = self.tiles.len();
        for i in 0..count {
            for j in (i + 1)..count {
                if !self.tiles[i].can_chain_with(&self.tiles[j], shift) {
                    continue;
                }
                let (lo, hi) = if self.tiles[j].weight <= self.tiles[i].weight {
                    (j, i)
                } else {
                    (i, j)
                };
                if self.tiles[lo].next.is_none() && self.tiles[hi].prev.is_none() {
                    log::debug!("bit heap {}: chaining tile {} -> tile {}", self.guid, lo, hi);
                    self.tiles[lo].next = Some(hi);
                    self.tiles[hi].prev = Some(lo);
                }
            }
        }
    }

    fn declare_tile_product(
        &mut self,
        index: usize,
        accumulate: Option<Accumulate>,
        width: usize,
    ) -> SignalId {
        let tile = &self.tiles[index];
        let (x, y, weight) = (tile.x, tile.y, tile.weight);
        let name = format!("DSP_bh{}_t{}", self.guid, index);
        let output = self.schedule.declare_signal(name, width, self.clock.now());
        self.schedule.push(ReductionEvent::TileProduct {
            tile: index,
            weight,
            x,
            y,
            accumulate,
            output,
            output_bits: Vec::new(),
        });
        self.stats.tiles += 1;
        output
    }

    /// Sends bits `0..count` of `signal`, weighted from `weight`, to the heap.
    fn feed_signal_bits(&mut self, signal: SignalId, weight: i64, count: usize) {
        let mut fed = Vec::with_capacity(count);
        for k in 0..count {
            let w = weight + k as i64;
            if w < 0 {
                fed.push(None);
                continue;
            }
            fed.push(self.insert_bit(
                w as usize,
                BitExpr::Signal { signal, index: k },
                None,
                BitType::External,
            ));
        }
        let event = self
            .schedule
            .events
            .iter_mut()
            .rev()
            .find(|e| e.output() == signal);
        if let Some(ReductionEvent::TileProduct { output_bits, .. }) = event {
            output_bits.extend(fed);
        }
    }

    /// Emits the products of every tile chain and feeds their bits into the
    /// heap.
    pub(crate) fn generate_supertiles(&mut self) {
        if self.tiles.is_empty() {
            return;
        }
        let shift = self.oracle.dsp_fixed_shift();
        if self.options.supertiles && self.tiles.len() > 1 {
            self.build_supertiles(shift);
        }
        let multiplier_delay = self.oracle.dsp_multiplier_delay();
        let adder_delay = self.oracle.dsp_adder_delay();
        for root in 0..self.tiles.len() {
            if self.tiles[root].prev.is_some() {
                continue;
            }
            self.clock.set_cycle(0);
            self.clock.advance_critical_path(multiplier_delay);
            let mut current = root;
            let mut width = self.tiles[root].product_width();
            let mut signal = self.declare_tile_product(root, None, width);
            while let Some(next) = self.tiles[current].next {
                let current_weight = self.tiles[current].weight;
                self.feed_signal_bits(signal, current_weight, shift.min(width));
                self.clock.advance_critical_path(adder_delay);
                let carried = width.saturating_sub(shift);
                width = self.tiles[next].product_width().max(carried) + 1;
                signal = self.declare_tile_product(
                    next,
                    Some(Accumulate { signal, shift }),
                    width,
                );
                current = next;
            }
            let last_weight = self.tiles[current].weight;
            self.feed_signal_bits(signal, last_weight, width);
        }
    }
}
