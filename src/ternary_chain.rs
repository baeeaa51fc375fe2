// SPDX-License-Identifier: Apache-2.0

//! Ternary adder chains: on fabrics whose carry chains add three operands at
//! the speed of two, a run of well-filled columns is summed by one three-row
//! adder instead of a layer of compressors.

use crate::bit::{BitExpr, BitId, BitType};
use crate::bit_heap::BitHeap;
use crate::compression::cnt_at;
use crate::error::BitHeapError;
use crate::schedule::{AdderRole, ReductionEvent};

/// Height-at-or-below-two columns may only join a chain when fed from the
/// right: directly by a column of height >= `3`, or through one column of
/// height >= `2` sitting on a column of height >= `3`.
fn fed_by_tall_columns(at: &impl Fn(i64) -> usize, end: i64) -> bool {
    at(end - 1) >= 3 || (at(end - 1) >= 2 && at(end - 2) >= 3)
}

/// Last column of the chain starting at `index`, possibly below `index` when
/// no chain can start there.
fn chain_end(cnt: &[usize], index: usize, max_weight: usize, max_span: usize) -> i64 {
    let at = |k: i64| -> usize {
        if k < 0 {
            0
        } else {
            cnt_at(cnt, k as usize)
        }
    };
    let start = index as i64;
    let max = max_weight as i64;
    let mut end = start;
    while end <= max {
        let extend = match at(end) {
            h if h >= 3 => end < max,
            2 => fed_by_tall_columns(&at, end) && end < max && at(end + 1) >= 2,
            1 => (at(end - 1) >= 2 || at(end - 2) >= 3) && end < max && at(end + 1) >= 2,
            _ => {
                if end == start {
                    return end;
                }
                fed_by_tall_columns(&at, end) && end < max && at(end + 1) >= 2
            }
        };
        if !extend {
            if at(end) < 3 && end > 0 {
                end -= 1;
            }
            break;
        }
        end += 1;
        if end - start == max_span as i64 {
            break;
        }
    }
    // A chain never ends on a column it would leave nearly empty.
    while end > start && at(end) < 2 {
        end -= 1;
    }
    end.min(max - 1)
}

impl BitHeap {
    /// Sweeps the columns from `start` upward, replacing every admissible run
    /// with a ternary adder, until a sweep finds none. Returns whether any
    /// chain was formed.
    pub(crate) fn form_ternary_chains(
        &mut self,
        cnt: &mut [usize],
        start: usize,
    ) -> Result<bool, BitHeapError> {
        let min_span = self.options.ternary_chain_min;
        let max_span = self.options.ternary_chain_max;
        let mut formed_any = false;
        loop {
            let mut formed = false;
            let mut index = start;
            while index < self.max_weight {
                let end = chain_end(cnt, index, self.max_weight, max_span);
                let span = end - index as i64;
                if span > 0 && span >= min_span as i64 && span <= max_span as i64 {
                    let end = end as usize;
                    self.apply_ternary_chain(index, end, cnt)?;
                    formed = true;
                    index = end + 1;
                } else {
                    index += 1;
                }
            }
            if !formed {
                break;
            }
            formed_any = true;
        }
        Ok(formed_any)
    }

    fn apply_ternary_chain(
        &mut self,
        lsb: usize,
        msb: usize,
        cnt: &mut [usize],
    ) -> Result<(), BitHeapError> {
        let width = msb - lsb + 1;
        let mut rows: Vec<Vec<Option<BitId>>> = vec![vec![None; width]; 3];
        let mut consumed = Vec::new();
        for i in lsb..=msb {
            let take = cnt[i].min(3);
            let taken = self.remove_compressed_bits(i, take)?;
            for (row, id) in taken.iter().enumerate() {
                rows[row][i - lsb] = Some(*id);
            }
            consumed.extend(taken);
            cnt[i] -= take;
        }
        if let Some(latest) = self.latest_of(&consumed) {
            self.clock.set_time(latest);
        }
        self.clock.advance_critical_path(
            self.oracle.local_wire_delay() + self.oracle.ternary_adder_delay(width),
        );

        let name = format!("addOutput_bh{}_{}", self.guid, self.schedule.signals.len());
        let output = self
            .schedule
            .declare_signal(name, width + 2, self.clock.now());
        let output_bits = (0..width + 2)
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
            "bit heap {}: ternary adder over columns [{}, {}]",
            self.guid,
            lsb,
            msb
        );
        self.schedule.push(ReductionEvent::Adder {
            role: AdderRole::TernaryChain,
            weight: lsb,
            rows,
            carry_in: None,
            output,
            output_bits,
        });
        self.stats.ternary_adders += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bit_heap::BitHeapOptions;
    use crate::fabric::Fabric;
    use test_case::test_case;

    #[test_case(&[3, 3, 3, 3, 3, 3], 0, 5; "uniform tall run")]
    #[test_case(&[3, 3, 2, 2, 3, 3], 0, 5; "two height-two columns bridged")]
    #[test_case(&[3, 2, 2, 2, 3, 3], 0, 2; "third height-two column ends the run")]
    #[test_case(&[3, 3, 0, 3, 3, 3], 0, 5; "empty column bridged")]
    #[test_case(&[0, 3, 3], 0, 0; "empty first column")]
    #[test_case(&[3, 3, 3, 1, 0, 0], 0, 2; "run ends before a lone bit")]
    #[test_case(&[3, 3, 1, 3, 3, 3], 0, 5; "lone bit bridged")]
    #[test_case(&[3, 3, 3, 3, 0, 2, 0, 0], 0, 3; "trailing empty column dropped")]
    #[test_case(&[3, 3, 3, 3, 1, 0, 0, 0], 0, 3; "trailing lone bit dropped")]
    fn test_chain_end(cnt: &[usize], index: usize, expected: i64) {
        assert_eq!(chain_end(cnt, index, cnt.len(), 32), expected);
    }

    #[test]
    fn test_chain_end_stops_at_max_span() {
        let cnt = vec![3; 10];
        assert_eq!(chain_end(&cnt, 0, 10, 4), 4);
    }

    #[test]
    fn test_form_chain_consumes_three_bits_per_column() {
        let _ = env_logger::try_init();
        let mut heap = BitHeap::new(
            0,
            12,
            Box::new(Fabric::stratix_v()),
            BitHeapOptions::default(),
        );
        let bus = heap.declare_input("x", 40);
        let mut index = 0;
        for w in 0..6 {
            for _ in 0..4 {
                heap.add_bit(w, BitExpr::input(bus, index), None, BitType::External)
                    .unwrap();
                index += 1;
            }
        }
        let mut cnt: Vec<usize> = (0..12).map(|w| heap.column_height(w)).collect();
        assert!(heap.form_ternary_chains(&mut cnt, 0).unwrap());
        assert_eq!(heap.stats().ternary_adders, 1);
        assert_eq!(&cnt[..6], &[1, 1, 1, 1, 1, 1]);
        // One bit left plus one adder output per column, two more on top.
        for w in 0..6 {
            assert_eq!(heap.column_height(w), 2, "column {}", w);
        }
        assert_eq!(heap.column_height(6), 1);
        assert_eq!(heap.column_height(7), 1);
    }

    #[test]
    fn test_short_run_is_not_a_chain() {
        let mut heap = BitHeap::new(
            0,
            8,
            Box::new(Fabric::stratix_v()),
            BitHeapOptions::default(),
        );
        let mut cnt = vec![3, 3, 3, 0, 0, 0, 0, 0];
        assert!(!heap.form_ternary_chains(&mut cnt, 0).unwrap());
    }
}
