// SPDX-License-Identifier: Apache-2.0

//! Parandeh-Afshar compression: every stage is planned on bit counts before
//! any bit is touched.
//!
//! The planner keeps, per stage and column, the number of bits available at
//! that stage. Within a stage it repeatedly visits the tallest column not yet
//! visited and places the compressor with the best ratio of removed bits to
//! cost, either with its low column on the visited one or, for two-column
//! compressors, one column lower. Outputs land in the next stage; whatever is
//! left over moves there too. Planning ends once the next stage holds at most
//! two bits per column and no bit arrives later. The heap then replays the
//! plan, taking the earliest bits of each column.

use crate::bit_heap::BitHeap;
use crate::compressor::{Compressor, CompressorCatalog};
use crate::error::BitHeapError;

/// Efficiencies closer than this are ties.
const TOLERANCE: f64 = 1e-4;

/// One compressor of the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Placement {
    /// Stage offset from the stage of the earliest bit.
    pub stage: usize,
    pub weight: usize,
    /// Index into the catalog.
    pub compressor: usize,
    /// Bits taken from columns `weight` and `weight + 1`.
    pub take: [usize; 2],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Plan {
    pub placements: Vec<Placement>,
    /// Number of planned stages.
    pub stages: usize,
}

fn taken(amounts: &[usize], weight: usize, compressor: &Compressor) -> [usize; 2] {
    let at = |w: usize| amounts.get(w).copied().unwrap_or(0);
    [
        compressor.heights[0].min(at(weight)),
        compressor.heights[1].min(at(weight + 1)),
    ]
}

/// Removed bits per unit of cost when `compressor` sits on `weight`. Outputs
/// at or above the heap width are dropped, so they cost nothing.
fn efficiency(amounts: &[usize], weight: usize, compressor: &Compressor) -> f64 {
    let take = taken(amounts, weight, compressor);
    let inputs = take[0] + take[1];
    let outputs = (0..compressor.output_height)
        .filter(|k| weight + k < amounts.len())
        .count();
    (inputs as f64 - outputs as f64) / compressor.cost.max(1) as f64
}

/// Best placement touching `column`: the catalog index and the weight of the
/// compressor's low column. Low placements win ties.
fn search(amounts: &[usize], column: usize, catalog: &[Compressor]) -> Option<(usize, usize)> {
    let mut best: Option<(f64, usize, usize)> = None;
    for (index, compressor) in catalog.iter().enumerate() {
        let left = efficiency(amounts, column, compressor);
        let right = match column.checked_sub(1) {
            Some(below) if compressor.spans_two_columns() => {
                efficiency(amounts, below, compressor)
            }
            _ => f64::NEG_INFINITY,
        };
        let (value, weight) = if left > TOLERANCE && right <= left + TOLERANCE {
            (left, column)
        } else if right > TOLERANCE {
            (right, column - 1)
        } else {
            continue;
        };
        if best.is_none_or(|(b, _, _)| value > b + TOLERANCE) {
            best = Some((value, index, weight));
        }
    }
    best.map(|(_, index, weight)| (index, weight))
}

/// Plans the compression of `amounts[stage][column]` bits down to two rows.
pub(crate) fn plan(
    mut amounts: Vec<Vec<usize>>,
    catalog: &[Compressor],
) -> Result<Plan, BitHeapError> {
    let width = amounts.first().map_or(0, |a| a.len());
    if width == 0 {
        return Ok(Plan {
            placements: Vec::new(),
            stages: 0,
        });
    }
    let last_arrival = amounts.len() - 1;
    // Every stage past the last arrival either removes a bit or ends the plan.
    let limit = last_arrival + amounts.iter().flatten().sum::<usize>() + 1;
    let mut placements = Vec::new();
    let mut stage = 0;
    loop {
        if stage > limit {
            return Err(BitHeapError::Internal(format!(
                "compression plan did not converge after {} stages",
                stage
            )));
        }
        if amounts.len() < stage + 2 {
            amounts.push(vec![0; width]);
        }
        let (current, rest) = amounts.split_at_mut(stage + 1);
        let current = &mut current[stage];
        let next = &mut rest[0];

        'placing: loop {
            let mut visited = vec![false; width];
            loop {
                let column = (0..width)
                    .filter(|c| !visited[*c] && current[*c] > 0)
                    .max_by_key(|c| (current[*c], std::cmp::Reverse(*c)));
                let Some(column) = column else {
                    break 'placing;
                };
                visited[column] = true;
                if let Some((index, weight)) = search(current, column, catalog) {
                    let compressor = &catalog[index];
                    let take = taken(current, weight, compressor);
                    current[weight] -= take[0];
                    if take[1] > 0 {
                        current[weight + 1] -= take[1];
                    }
                    for k in 0..compressor.output_height {
                        if let Some(h) = next.get_mut(weight + k) {
                            *h += 1;
                        }
                    }
                    placements.push(Placement {
                        stage,
                        weight,
                        compressor: index,
                        take,
                    });
                    continue 'placing;
                }
            }
        }

        for (c, n) in current.iter_mut().zip(next.iter_mut()) {
            *n += std::mem::take(c);
        }
        if stage + 1 >= last_arrival && next.iter().all(|h| *h <= 2) {
            return Ok(Plan {
                placements,
                stages: stage + 1,
            });
        }
        stage += 1;
    }
}

impl BitHeap {
    /// Plans the whole compression on per-stage counts, then replays it.
    /// Leaves at most two bits per column.
    pub(crate) fn compress_planned(
        &mut self,
        catalog: &CompressorCatalog,
    ) -> Result<(), BitHeapError> {
        let stages_per_cycle = self.oracle.stages_per_cycle();
        let elementary = self.oracle.elementary_delay();
        let mut stages = Vec::new();
        for w in self.min_weight..self.max_weight {
            for id in self.column(w) {
                let stage = self.bit(*id).time.stage(stages_per_cycle, elementary);
                stages.push((stage, w));
            }
        }
        let Some(base) = stages.iter().map(|(s, _)| *s).min() else {
            return Ok(());
        };
        let last = stages.iter().map(|(s, _)| *s).max().unwrap_or(base);
        let mut amounts = vec![vec![0usize; self.max_weight]; (last - base) as usize + 1];
        for (stage, w) in stages {
            amounts[(stage - base) as usize][w] += 1;
        }

        let plan = plan(amounts, catalog.entries())?;
        log::debug!(
            "bit heap {}: planned {} compressors over {} stages",
            self.guid,
            plan.placements.len(),
            plan.stages
        );
        for p in &plan.placements {
            self.apply_compressor_taking(
                p.weight,
                catalog.get(p.compressor),
                p.take,
                base + p.stage as i64,
            )?;
        }
        self.stats.stages += plan.stages;
        Ok(())
    }
}
