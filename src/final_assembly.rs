// SPDX-License-Identifier: Apache-2.0

//! Finished low-order columns and the last carry-propagate addition.

use crate::bit::BitId;
use crate::bit_heap::{BitHeap, ColumnEnd};
use crate::error::BitHeapError;
use crate::schedule::{AdderRole, CompressionResult, ReductionEvent, ResultPart};

impl BitHeap {
    /// Moves the run of low columns holding at most one bit out of the heap
    /// into a chunk of the result. Empty columns in the run read as zero.
    pub(crate) fn concatenate_lsb_columns(&mut self) -> Result<(), BitHeapError> {
        let lsb = self.min_weight;
        let mut top = lsb;
        while top < self.max_weight && self.column_height(top) <= 1 {
            top += 1;
        }
        if top == lsb {
            return Ok(());
        }
        if let Ok(latest) = self.latest_bit(lsb, top - 1) {
            self.clock.set_time(self.bit(latest).time);
        }
        let mut bits = Vec::with_capacity(top - lsb);
        for w in lsb..top {
            if self.column_height(w) == 1 {
                bits.push(Some(self.remove_bit(w, ColumnEnd::Front)?));
            } else {
                bits.push(None);
            }
        }
        let width = top - lsb;
        let name = format!("tempR_bh{}_{}", self.guid, self.chunks.len());
        let output = self.schedule.declare_signal(name, width, self.clock.now());
        log::debug!(
            "bit heap {}: columns [{}, {}) are final",
            self.guid,
            lsb,
            top
        );
        self.schedule.push(ReductionEvent::Chunk {
            weight: lsb,
            bits,
            output,
        });
        self.chunks.push(ResultPart {
            signal: output,
            width,
        });
        self.stats.chunks += 1;
        self.min_weight = top;
        Ok(())
    }

    /// Sums what is left of the heap and assembles the result: the final
    /// adder's output on top of the chunks.
    pub(crate) fn final_addition(&mut self) -> Result<(), BitHeapError> {
        let height = self.max_height();
        let mut top_part = None;
        if height < 2 {
            self.concatenate_lsb_columns()?;
        } else {
            if height > 3 {
                return Err(BitHeapError::Internal(format!(
                    "final addition over a heap of height {}",
                    height
                )));
            }
            let lsb = self.min_weight;
            let msb = self.max_weight - 1;
            let width = self.max_weight - lsb;
            let latest = self.latest_bit(lsb, msb)?;
            self.clock.set_time(self.bit(latest).time);
            let delay = if height == 3 {
                self.oracle.ternary_adder_delay(width)
            } else {
                self.oracle.adder_delay(width)
            };
            self.clock
                .advance_critical_path(self.oracle.local_wire_delay() + delay);

            let mut rows: Vec<Vec<Option<BitId>>> = vec![vec![None; width]; height];
            for w in lsb..=msb {
                let taken = self.remove_compressed_bits(w, self.column_height(w))?;
                for (row, id) in taken.iter().enumerate() {
                    rows[row][w - lsb] = Some(*id);
                }
            }
            let name = format!("finalAdderOut_bh{}", self.guid);
            let output = self
                .schedule
                .declare_signal(name, width + height - 1, self.clock.now());
            log::debug!(
                "bit heap {}: final {}-row adder over columns [{}, {}]",
                self.guid,
                height,
                lsb,
                msb
            );
            self.schedule.push(ReductionEvent::Adder {
                role: AdderRole::Final,
                weight: lsb,
                rows,
                carry_in: None,
                output,
                output_bits: Vec::new(),
            });
            if height == 3 {
                self.stats.ternary_adders += 1;
            } else {
                self.stats.adders += 1;
            }
            self.min_weight = self.max_weight;
            top_part = Some(ResultPart {
                signal: output,
                width,
            });
        }

        let parts: Vec<ResultPart> = top_part
            .into_iter()
            .chain(self.chunks.iter().rev().copied())
            .collect();
        let width: usize = parts.iter().map(|p| p.width).sum();
        if width != self.max_weight {
            return Err(BitHeapError::Internal(format!(
                "result covers {} of {} columns",
                width, self.max_weight
            )));
        }
        self.stats.result_time = Some(self.clock.now());
        log::info!(
            "bit heap {}: result of width {} in {} parts at {:?}",
            self.guid,
            width,
            parts.len(),
            self.clock.now()
        );
        self.result = Some(CompressionResult {
            name: self.result_signal_name(),
            width,
            parts,
        });
        Ok(())
    }
}
