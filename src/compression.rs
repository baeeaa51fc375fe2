// SPDX-License-Identifier: Apache-2.0

//! The compression scheduler.
//!
//! Compression proceeds in stages. At each stage only the bits whose time
//! falls in the current stage or earlier ("ready" bits) may be combined; their
//! per-column counts are snapshotted on entry and decremented as bits are
//! consumed, so bits produced during a stage never feed another reduction in
//! that same stage. Stages repeat until no column holds more than three bits,
//! then the wrap-up and the final addition finish the job.

use crate::bit::{BitExpr, BitId, BitType};
use crate::bit_heap::{BitHeap, CompressionStrategy, WrapUpStrategy};
use crate::compressor::{Compressor, CompressorCatalog};
use crate::error::BitHeapError;
use crate::schedule::{AdderRole, CompressionResult, ReductionEvent};

/// Ready-bit count of column `i`, zero past the end of the heap.
pub(crate) fn cnt_at(cnt: &[usize], i: usize) -> usize {
    cnt.get(i).copied().unwrap_or(0)
}

impl BitHeap {
    /// Reduces the heap to its final sum. Calling it again returns the
    /// result of the first run.
    pub fn run_compression(&mut self) -> Result<&CompressionResult, BitHeapError> {
        if self.result.is_none() {
            self.compress_all()?;
        }
        self.result
            .as_ref()
            .ok_or_else(|| BitHeapError::Internal("compression produced no result".to_string()))
    }

    fn compress_all(&mut self) -> Result<(), BitHeapError> {
        self.generate_supertiles();
        self.clock.set_cycle(0);
        self.materialize_constant();
        log::info!(
            "bit heap {}: compressing {} bits over {} columns (max height {})",
            self.guid,
            (0..self.max_weight).map(|w| self.column_height(w)).sum::<usize>(),
            self.max_weight,
            self.max_height()
        );
        log::trace!("bit heap {}: {}", self.guid, self.column_summary());

        if self.max_height() <= 1 {
            // Nothing to reduce: every column goes straight to the result.
            return self.final_addition();
        }

        let catalog = CompressorCatalog::generate(self.oracle.lut_inputs())?;
        if self.options.strategy == CompressionStrategy::ParandehAfshar {
            self.compress_planned(&catalog)?;
            return self.final_addition();
        }
        let top = self.max_weight - 1;
        let first = self
            .soonest_bit(self.min_weight, top)
            .ok_or_else(|| BitHeapError::Internal("no soonest bit in a non-empty heap".to_string()))?;
        let first_time = self.bit(first).time;
        self.clock.set_time(first_time);
        let stages_per_cycle = self.oracle.stages_per_cycle();
        let elementary = self.oracle.elementary_delay();
        let mut stage = first_time.stage(stages_per_cycle, elementary);

        while self.max_height() > 3 {
            let did_compress = self.compress(stage, &catalog)?;
            self.stats.stages += 1;
            if !did_compress {
                let latest = self.latest_bit(self.min_weight, top)?;
                if self.bit(latest).time.stage(stages_per_cycle, elementary) <= stage {
                    return Err(BitHeapError::Internal(format!(
                        "stage {} made no progress with every bit ready",
                        stage
                    )));
                }
            }
            stage += 1;
        }

        if self.max_height() > 2 {
            log::debug!("bit heap {}: only three levels left", self.guid);
            if !self.oracle.has_fast_ternary_adders() {
                self.wrap_up(&catalog)?;
                self.concatenate_lsb_columns()?;
            }
        }
        self.final_addition()
    }

    /// One stage of compression. Returns whether anything was reduced.
    pub(crate) fn compress(
        &mut self,
        stage: i64,
        catalog: &CompressorCatalog,
    ) -> Result<bool, BitHeapError> {
        log::debug!(
            "bit heap {}: stage {} heights {}",
            self.guid,
            stage,
            self.column_summary()
        );
        self.concatenate_lsb_columns()?;

        let stages_per_cycle = self.oracle.stages_per_cycle();
        let elementary = self.oracle.elementary_delay();
        let mut cnt = vec![0usize; self.max_weight];
        for (w, count) in cnt.iter_mut().enumerate().skip(self.min_weight) {
            *count = self
                .column(w)
                .iter()
                .filter(|id| self.bit(**id).time.stage(stages_per_cycle, elementary) <= stage)
                .count();
        }

        let mut did_compress = false;
        let mut chain_start = self.min_weight;
        if let Some(adder_max) = self.low_order_short_circuit(&mut cnt)? {
            did_compress = true;
            chain_start = adder_max + 1;
        }

        if self.oracle.has_fast_ternary_adders() {
            did_compress |= self.form_ternary_chains(&mut cnt, chain_start)?;
        }

        did_compress |= self.greedy_compress(&mut cnt, catalog, stage)?;
        Ok(did_compress)
    }

    /// Sums the run of low columns holding one or two ready bits with a
    /// binary adder, when that adder would finish before the next bit of the
    /// run arrives. Returns the top column of the adder, if one was applied.
    fn low_order_short_circuit(&mut self, cnt: &mut [usize]) -> Result<Option<usize>, BitHeapError> {
        let period = self.oracle.cycle_period();
        let min = self.min_weight;
        let mut index = min;
        let mut latest_added = 0.0f64;
        let mut candidate: Option<BitId> = None;
        let mut first_not_added = f64::INFINITY;
        let mut adder_max = min;
        let mut latest_bit: Option<BitId> = None;

        while index + 1 < self.max_weight && (1..=2).contains(&cnt[index]) {
            let column = self.column(index);
            let last_ready = column[cnt[index] - 1];
            let t = self.bit(last_ready).time.absolute(period);
            if candidate.is_none() || latest_added < t {
                latest_added = t;
                candidate = Some(last_ready);
            }
            if let Some(next) = column.get(cnt[index]) {
                first_not_added = first_not_added.min(self.bit(*next).time.absolute(period));
            }
            let delay = self.oracle.adder_delay(index - min + 1);
            if latest_added + delay < first_not_added {
                adder_max = index;
                latest_bit = candidate;
            }
            index += 1;
        }

        if adder_max <= min {
            return Ok(None);
        }
        let latest = latest_bit
            .ok_or_else(|| BitHeapError::Internal("short-circuit adder without bits".to_string()))?;
        self.clock.set_time(self.bit(latest).time);
        self.clock.advance_critical_path(
            self.oracle.local_wire_delay() + self.oracle.adder_delay(adder_max - min + 1),
        );
        self.apply_adder(min, adder_max, cnt, false, AdderRole::ShortCircuit)?;
        Ok(Some(adder_max))
    }

    fn fits(&self, cnt: &[usize], weight: usize, compressor: &Compressor) -> bool {
        if cnt_at(cnt, weight) < compressor.heights[0] {
            return false;
        }
        if !compressor.spans_two_columns() {
            return true;
        }
        weight + 1 < self.max_weight && cnt_at(cnt, weight + 1) >= compressor.heights[1]
    }

    /// Applies, column by column, the best compressor as often as it fits,
    /// then walks down the catalog while the column still holds more than two
    /// ready bits.
    fn greedy_compress(
        &mut self,
        cnt: &mut [usize],
        catalog: &CompressorCatalog,
        stage: i64,
    ) -> Result<bool, BitHeapError> {
        let mut did_compress = false;
        for i in self.min_weight..self.max_weight {
            let mut j = 0;
            while j < catalog.len() && self.fits(cnt, i, catalog.get(j)) {
                self.apply_compressor(i, catalog.get(j), cnt, stage)?;
                did_compress = true;
            }
            j += 1;
            while j < catalog.len() && cnt[i] > 2 {
                let compressor = catalog.get(j);
                if self.fits(cnt, i, compressor) {
                    self.apply_compressor(i, compressor, cnt, stage)?;
                    did_compress = true;
                    // A two-column compressor is retried while it fits.
                    if !compressor.spans_two_columns() {
                        j += 1;
                    }
                } else {
                    j += 1;
                }
            }
        }
        Ok(did_compress)
    }

    /// Replaces the earliest bits of columns `weight` and `weight+1` by the
    /// compressor's outputs.
    pub(crate) fn apply_compressor(
        &mut self,
        weight: usize,
        compressor: &Compressor,
        cnt: &mut [usize],
        stage: i64,
    ) -> Result<(), BitHeapError> {
        let take = [
            compressor.heights[0],
            if compressor.spans_two_columns() {
                compressor.heights[1]
            } else {
                0
            },
        ];
        for (offset, taken) in take.iter().enumerate() {
            if let Some(c) = cnt.get_mut(weight + offset) {
                *c = c.saturating_sub(*taken);
            }
        }
        self.apply_compressor_taking(weight, compressor, take, stage)
    }

    /// Like `apply_compressor`, but consumes only `take[k]` bits of column
    /// `weight + k`; the missing inputs count as zeros.
    pub(crate) fn apply_compressor_taking(
        &mut self,
        weight: usize,
        compressor: &Compressor,
        take: [usize; 2],
        stage: i64,
    ) -> Result<(), BitHeapError> {
        if take[0] > compressor.heights[0] || take[1] > compressor.heights[1] {
            return Err(BitHeapError::Internal(format!(
                "{} cannot take {:?} bits",
                compressor, take
            )));
        }
        let low = self.remove_compressed_bits(weight, take[0])?;
        let high = if take[1] > 0 {
            self.remove_compressed_bits(weight + 1, take[1])?
        } else {
            Vec::new()
        };

        let latest = self
            .latest_of(&low)
            .into_iter()
            .chain(self.latest_of(&high))
            .max()
            .ok_or_else(|| BitHeapError::Internal(format!("{} applied to no bits", compressor)))?;
        self.clock.set_time(latest);
        self.clock
            .advance_critical_path(self.oracle.compressor_delay(compressor));

        let name = format!(
            "CompressorOut_bh{}_{}",
            self.guid,
            self.schedule.signals.len()
        );
        let output = self
            .schedule
            .declare_signal(name, compressor.output_height, self.clock.now());
        let output_bits = (0..compressor.output_height)
            .map(|k| {
                self.insert_bit(
                    weight + k,
                    BitExpr::Signal {
                        signal: output,
                        index: k,
                    },
                    None,
                    BitType::CompressorOutput,
                )
            })
            .collect();
        log::debug!(
            "bit heap {}: stage {} compressor {} at column {}",
            self.guid,
            stage,
            compressor,
            weight
        );
        self.schedule.push(ReductionEvent::Compressor {
            compressor: compressor.clone(),
            weight,
            stage,
            inputs: [low, high],
            output,
            output_bits,
        });
        *self.stats.compressors.entry(compressor.name()).or_insert(0) += 1;
        Ok(())
    }

    /// Sums columns `lsb..=msb` with a binary adder: `cnt[i]` earliest bits
    /// of each column are consumed (at most two, three for `lsb` when it also
    /// provides the carry-in). The `msb - lsb + 2` output bits go back into
    /// the heap. The caller sets the clock.
    pub(crate) fn apply_adder(
        &mut self,
        lsb: usize,
        msb: usize,
        cnt: &mut [usize],
        has_carry_in: bool,
        role: AdderRole,
    ) -> Result<(), BitHeapError> {
        let width = msb - lsb + 1;
        let mut rows = vec![vec![None; width]; 2];
        let mut carry_in = None;
        for i in lsb..=msb {
            let limit = if i == lsb && has_carry_in { 3 } else { 2 };
            let take = cnt_at(cnt, i);
            if take > limit {
                return Err(BitHeapError::Internal(format!(
                    "adder over [{}, {}] given {} bits at column {}",
                    lsb, msb, take, i
                )));
            }
            let taken = self.remove_compressed_bits(i, take)?;
            rows[0][i - lsb] = taken.first().copied();
            rows[1][i - lsb] = taken.get(1).copied();
            if i == lsb && has_carry_in {
                carry_in = taken.get(2).copied();
            }
            cnt[i] = 0;
        }

        let name = format!("outAdder_bh{}_{}", self.guid, self.schedule.signals.len());
        let output = self
            .schedule
            .declare_signal(name, width + 1, self.clock.now());
        let output_bits = (0..=width)
            .map(|k| {
                self.insert_bit(
                    lsb + k,
                    BitExpr::Signal {
                        signal: output,
                        index: k,
                    },
                    None,
                    BitType::AdderOutput,
                )
            })
            .collect();
        log::debug!(
            "bit heap {}: {:?} adder over columns [{}, {}]{}",
            self.guid,
            role,
            lsb,
            msb,
            if carry_in.is_some() { " with carry-in" } else { "" }
        );
        self.schedule.push(ReductionEvent::Adder {
            role,
            weight: lsb,
            rows,
            carry_in,
            output,
            output_bits,
        });
        self.stats.adders += 1;
        Ok(())
    }

    /// Brings every column down to at most two bits once no column holds more
    /// than three.
    fn wrap_up(&mut self, catalog: &CompressorCatalog) -> Result<(), BitHeapError> {
        let mut cnt: Vec<usize> = (0..self.max_weight).map(|w| self.column_height(w)).collect();
        match self.options.wrap_up {
            WrapUpStrategy::CompressorRow => {
                for i in self.min_weight..self.max_weight {
                    let compressor = match cnt[i] {
                        3 => catalog.full_adder(),
                        2 => catalog.half_adder(),
                        _ => continue,
                    };
                    self.reduce_now(i, compressor, &mut cnt)?;
                }
                Ok(())
            }
            WrapUpStrategy::AdderRuns => self.wrap_up_adder_runs(catalog, &mut cnt),
        }
    }

    /// Applies `compressor` at `weight`, timed from its own inputs.
    fn reduce_now(
        &mut self,
        weight: usize,
        compressor: &Compressor,
        cnt: &mut [usize],
    ) -> Result<(), BitHeapError> {
        let stage = self.clock.now().stage(
            self.oracle.stages_per_cycle(),
            self.oracle.elementary_delay(),
        );
        self.apply_compressor(weight, compressor, cnt, stage)
    }

    fn time_adder(&mut self, lsb: usize, msb: usize) -> Result<(), BitHeapError> {
        let latest = self.latest_bit(lsb, msb)?;
        self.clock.set_time(self.bit(latest).time);
        self.clock.advance_critical_path(
            self.oracle.local_wire_delay() + self.oracle.adder_delay(msb - lsb + 1),
        );
        Ok(())
    }

    fn wrap_up_adder_runs(
        &mut self,
        catalog: &CompressorCatalog,
        cnt: &mut [usize],
    ) -> Result<(), BitHeapError> {
        let max = self.max_weight;
        let mut i = self.min_weight;
        while i < max && cnt[i] < 3 {
            i += 1;
        }
        if i >= max {
            return Ok(());
        }
        // Everything below the first height-3 column is added right away.
        if i > self.min_weight {
            let lsb = self.min_weight;
            self.time_adder(lsb, i - 1)?;
            self.apply_adder(lsb, i - 1, cnt, false, AdderRole::WrapUp)?;
            self.concatenate_lsb_columns()?;
        }

        let full_adder = catalog.full_adder();
        while i < max {
            if i == max - 1 {
                if self.column_height(i) >= 3 {
                    self.reduce_now(i, full_adder, cnt)?;
                }
                i += 1;
            } else if matches!(cnt_at(cnt, i + 1), 0 | 1 | 3) {
                if self.column_height(i) >= 3 {
                    self.reduce_now(i, full_adder, cnt)?;
                }
                i += 1;
                while i < max && cnt[i] != 3 {
                    i += 1;
                }
            } else {
                // A run of height-2 columns follows: one adder, with the third
                // bit of column `j` as carry-in.
                let j = i;
                i += 1;
                while i < max && cnt[i] == 2 {
                    i += 1;
                }
                self.time_adder(j, i - 1)?;
                self.apply_adder(j, i - 1, cnt, true, AdderRole::WrapUp)?;
                while i < max && cnt[i] != 3 {
                    i += 1;
                }
            }
        }
        Ok(())
    }
}
