// SPDX-License-Identifier: Apache-2.0

//! The weighted bit store.
//!
//! A `BitHeap` owns every bit ever offered to it in an arena; columns hold
//! the indices of the bits still awaiting reduction, sorted by time with
//! insertion order breaking ties. Constants are folded into a single integer
//! and only become bits when compression starts.

use num_bigint::BigInt;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};

use crate::bit::{BitExpr, BitId, BitTime, BitType, BusId, WeightedBit};
use crate::error::BitHeapError;
use crate::fabric::TimingOracle;
use crate::schedule::{CompressionResult, CompressionStats, ResultPart, Schedule};
use crate::supertile::MultiplierTile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WrapUpStrategy {
    /// 3:2 compressors on isolated height-3 columns, carry-in adders over the
    /// runs of height-2 columns that follow them.
    AdderRuns,
    /// A full adder on every height-3 column and a half adder on every
    /// height-2 column.
    CompressorRow,
}

/// How compressors are scheduled before the final addition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CompressionStrategy {
    /// Stage by stage on the ready bits, column by column from the least
    /// significant one, with low-order adders, ternary chains and a wrap-up.
    Greedy,
    /// Plans every stage up front on per-stage bit counts, tallest column
    /// first, picking the most efficient compressor placement each time,
    /// until every column holds at most two bits.
    ParandehAfshar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitHeapOptions {
    pub pipelined: bool,
    pub supertiles: bool,
    pub ternary_chain_min: usize,
    pub ternary_chain_max: usize,
    pub wrap_up: WrapUpStrategy,
    pub strategy: CompressionStrategy,
}

impl Default for BitHeapOptions {
    fn default() -> Self {
        BitHeapOptions {
            pipelined: true,
            supertiles: true,
            ternary_chain_min: 4,
            ternary_chain_max: 32,
            wrap_up: WrapUpStrategy::AdderRuns,
            strategy: CompressionStrategy::Greedy,
        }
    }
}

/// Scheduling time cursor used to stamp new bits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineClock {
    cycle: u32,
    critical_path: f64,
    period: f64,
    pipelined: bool,
}

impl PipelineClock {
    pub fn new(period: f64, pipelined: bool) -> Self {
        PipelineClock {
            cycle: 0,
            critical_path: 0.0,
            period,
            pipelined,
        }
    }

    pub fn current_cycle(&self) -> u32 {
        self.cycle
    }

    pub fn current_critical_path(&self) -> f64 {
        self.critical_path
    }

    pub fn now(&self) -> BitTime {
        BitTime::new(self.cycle, self.critical_path)
    }

    /// Moves to the start of `cycle`.
    pub fn set_cycle(&mut self, cycle: u32) {
        self.cycle = cycle;
        self.critical_path = 0.0;
    }

    pub fn set_critical_path(&mut self, critical_path: f64) {
        self.critical_path = critical_path;
    }

    pub fn set_time(&mut self, time: BitTime) {
        self.cycle = time.cycle;
        self.critical_path = time.critical_path;
    }

    /// Accounts for `delay` of combinational logic, inserting a register
    /// stage when the cycle would overflow.
    pub fn advance_critical_path(&mut self, delay: f64) {
        if self.pipelined && self.critical_path + delay > self.period {
            self.cycle += 1;
            self.critical_path = delay;
        } else {
            self.critical_path += delay;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputBus {
    pub name: String,
    pub width: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnEnd {
    Front,
    Back,
}

pub struct BitHeap {
    pub(crate) guid: usize,
    pub(crate) max_weight: usize,
    /// Columns below this weight were already moved into chunks.
    pub(crate) min_weight: usize,
    pub(crate) oracle: Box<dyn TimingOracle>,
    pub(crate) options: BitHeapOptions,
    pub(crate) clock: PipelineClock,
    arena: Vec<WeightedBit>,
    columns: Vec<Vec<BitId>>,
    uid_counters: Vec<usize>,
    constant: BigInt,
    inputs: Vec<InputBus>,
    pub(crate) tiles: Vec<MultiplierTile>,
    pub(crate) schedule: Schedule,
    /// Finished low-order parts, in creation order.
    pub(crate) chunks: Vec<ResultPart>,
    pub(crate) stats: CompressionStats,
    pub(crate) result: Option<CompressionResult>,
}

impl BitHeap {
    pub fn new(
        guid: usize,
        max_weight: usize,
        oracle: Box<dyn TimingOracle>,
        options: BitHeapOptions,
    ) -> Self {
        let clock = PipelineClock::new(oracle.cycle_period(), options.pipelined);
        BitHeap {
            guid,
            max_weight,
            min_weight: 0,
            oracle,
            options,
            clock,
            arena: Vec::new(),
            columns: vec![Vec::new(); max_weight],
            uid_counters: vec![0; max_weight],
            constant: BigInt::zero(),
            inputs: Vec::new(),
            tiles: Vec::new(),
            schedule: Schedule::default(),
            chunks: Vec::new(),
            stats: CompressionStats::default(),
            result: None,
        }
    }

    pub fn guid(&self) -> usize {
        self.guid
    }

    pub fn max_weight(&self) -> usize {
        self.max_weight
    }

    pub fn min_weight(&self) -> usize {
        self.min_weight
    }

    pub fn options(&self) -> &BitHeapOptions {
        &self.options
    }

    pub fn oracle(&self) -> &dyn TimingOracle {
        self.oracle.as_ref()
    }

    pub fn clock(&self) -> &PipelineClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut PipelineClock {
        &mut self.clock
    }

    pub fn declare_input(&mut self, name: &str, width: usize) -> BusId {
        let id = BusId(self.inputs.len());
        self.inputs.push(InputBus {
            name: name.to_string(),
            width,
        });
        id
    }

    pub fn inputs(&self) -> &[InputBus] {
        &self.inputs
    }

    pub fn input(&self, bus: BusId) -> Result<&InputBus, BitHeapError> {
        self.inputs
            .get(bus.0)
            .ok_or_else(|| BitHeapError::UnknownSignal(format!("input bus #{}", bus.0)))
    }

    /// Looks up a bit created by this heap, or `None` for a foreign id.
    pub fn get_bit(&self, id: BitId) -> Option<&WeightedBit> {
        self.arena.get(id.0)
    }

    /// Ids handed out by this heap always index its arena.
    pub(crate) fn bit(&self, id: BitId) -> &WeightedBit {
        &self.arena[id.0]
    }

    /// Every bit ever created, including the ones already consumed.
    pub fn all_bits(&self) -> &[WeightedBit] {
        &self.arena
    }

    pub fn column(&self, weight: usize) -> &[BitId] {
        self.columns.get(weight).map(|c| c.as_slice()).unwrap_or(&[])
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn stats(&self) -> &CompressionStats {
        &self.stats
    }

    pub fn result(&self) -> Option<&CompressionResult> {
        self.result.as_ref()
    }

    /// Name of the concatenated sum.
    pub fn result_signal_name(&self) -> String {
        format!("CompressionResult{}", self.guid)
    }

    pub fn constant(&self) -> &BigInt {
        &self.constant
    }

    fn check_weight(weight: i64, context: &'static str) -> Result<usize, BitHeapError> {
        usize::try_from(weight).map_err(|_| BitHeapError::NegativeWeight { weight, context })
    }

    /// Adds one bit at `weight`, stamped with the clock's current time.
    ///
    /// Bits at or above the maximum weight are dropped with a warning and
    /// `Ok(None)` is returned.
    pub fn add_bit(
        &mut self,
        weight: i64,
        source: BitExpr,
        comment: Option<&str>,
        bit_type: BitType,
    ) -> Result<Option<BitId>, BitHeapError> {
        let weight = Self::check_weight(weight, "add_bit")?;
        Ok(self.insert_bit(weight, source, comment, bit_type))
    }

    pub(crate) fn insert_bit(
        &mut self,
        weight: usize,
        source: BitExpr,
        comment: Option<&str>,
        bit_type: BitType,
    ) -> Option<BitId> {
        if weight >= self.max_weight {
            log::warn!(
                "bit heap {}: dropping bit at weight {} (max weight {})",
                self.guid,
                weight,
                self.max_weight
            );
            return None;
        }
        let id = BitId(self.arena.len());
        let uid = self.uid_counters[weight];
        self.uid_counters[weight] += 1;
        let time = self.clock.now();
        let bit = WeightedBit {
            id,
            weight,
            uid,
            time,
            bit_type,
            source,
            comment: comment.map(|c| c.to_string()),
        };
        log::trace!(
            "bit heap {}: add {} at {:?} ({:?})",
            self.guid,
            bit.name(self.guid),
            time,
            bit_type
        );
        self.arena.push(bit);
        let arena = &self.arena;
        let column = &mut self.columns[weight];
        let position = column
            .iter()
            .position(|b| arena[b.0].time > time)
            .unwrap_or(column.len());
        column.insert(position, id);
        Some(id)
    }

    /// Adds `value << weight` to the constant.
    pub fn add_constant(&mut self, weight: i64, value: impl Into<BigInt>) -> Result<(), BitHeapError> {
        let weight = Self::check_weight(weight, "add_constant")?;
        self.constant += value.into() << weight;
        Ok(())
    }

    pub fn add_constant_one_bit(&mut self, weight: i64) -> Result<(), BitHeapError> {
        let weight = Self::check_weight(weight, "add_constant_one_bit")?;
        self.constant += BigInt::one() << weight;
        Ok(())
    }

    pub fn sub_constant_one_bit(&mut self, weight: i64) -> Result<(), BitHeapError> {
        let weight = Self::check_weight(weight, "sub_constant_one_bit")?;
        self.constant -= BigInt::one() << weight;
        Ok(())
    }

    /// Adds half a unit in the last place of an output truncated at
    /// `output_lsb`, so that truncation rounds to nearest.
    pub fn add_rounding_bit(&mut self, output_lsb: usize) -> Result<(), BitHeapError> {
        if output_lsb == 0 {
            return Ok(());
        }
        self.add_constant_one_bit((output_lsb - 1) as i64)
    }

    fn warn_overflow(&self, context: &str, bus: BusId, weight: usize, size: usize) {
        if weight + size > self.max_weight {
            log::warn!(
                "bit heap {}: {} of bus #{} ({} bits) at weight {} overflows max weight {}",
                self.guid,
                context,
                bus.0,
                size,
                weight,
                self.max_weight
            );
        }
    }

    pub fn add_unsigned_bit_vector(
        &mut self,
        weight: i64,
        bus: BusId,
        size: usize,
    ) -> Result<(), BitHeapError> {
        let weight = Self::check_weight(weight, "add_unsigned_bit_vector")?;
        self.input(bus)?;
        self.warn_overflow("add_unsigned_bit_vector", bus, weight, size);
        for i in 0..size {
            self.insert_bit(weight + i, BitExpr::input(bus, i), None, BitType::External);
        }
        Ok(())
    }

    /// Adds the two's complement of an unsigned vector, modulo the heap's
    /// maximum weight.
    pub fn subtract_unsigned_bit_vector(
        &mut self,
        weight: i64,
        bus: BusId,
        size: usize,
    ) -> Result<(), BitHeapError> {
        let weight = Self::check_weight(weight, "subtract_unsigned_bit_vector")?;
        self.input(bus)?;
        self.warn_overflow("subtract_unsigned_bit_vector", bus, weight, size);
        for i in 0..size {
            self.insert_bit(
                weight + i,
                BitExpr::input(bus, i).negated(),
                None,
                BitType::External,
            );
        }
        self.constant += BigInt::one() << weight;
        for i in (weight + size)..self.max_weight {
            self.constant += BigInt::one() << i;
        }
        Ok(())
    }

    /// Adds a two's complement vector; sign extension is done with constant
    /// ones above the complemented sign bit.
    pub fn add_signed_bit_vector(
        &mut self,
        weight: i64,
        bus: BusId,
        size: usize,
    ) -> Result<(), BitHeapError> {
        let weight = Self::check_weight(weight, "add_signed_bit_vector")?;
        self.input(bus)?;
        if size == 0 {
            return Ok(());
        }
        self.warn_overflow("add_signed_bit_vector", bus, weight, size);
        for i in 0..size {
            let expr = if i == size - 1 {
                BitExpr::input(bus, i).negated()
            } else {
                BitExpr::input(bus, i)
            };
            self.insert_bit(weight + i, expr, None, BitType::External);
        }
        for i in (weight + size - 1)..self.max_weight {
            self.constant += BigInt::one() << i;
        }
        Ok(())
    }

    /// Adds minus a two's complement vector, as the complemented vector plus
    /// one.
    pub fn subtract_signed_bit_vector(
        &mut self,
        weight: i64,
        bus: BusId,
        size: usize,
    ) -> Result<(), BitHeapError> {
        let weight = Self::check_weight(weight, "subtract_signed_bit_vector")?;
        self.input(bus)?;
        if size == 0 {
            return Ok(());
        }
        self.warn_overflow("subtract_signed_bit_vector", bus, weight, size);
        for i in 0..size {
            // The sign bit is complemented twice: once for the negation and
            // once for the sign extension.
            let expr = if i == size - 1 {
                BitExpr::input(bus, i)
            } else {
                BitExpr::input(bus, i).negated()
            };
            self.insert_bit(weight + i, expr, None, BitType::External);
        }
        self.constant += BigInt::one() << weight;
        for i in (weight + size - 1)..self.max_weight {
            self.constant += BigInt::one() << i;
        }
        Ok(())
    }

    /// Materializes the constant as bits, modulo `2^max_weight`.
    pub(crate) fn materialize_constant(&mut self) {
        let modulus = BigInt::one() << self.max_weight;
        let mut value = &self.constant % &modulus;
        if value < BigInt::zero() {
            value += &modulus;
        }
        log::debug!("bit heap {}: constant {} -> {}", self.guid, self.constant, value);
        for w in 0..self.max_weight {
            if value.bit(w as u64) {
                self.insert_bit(w, BitExpr::Literal(true), Some("constant"), BitType::Constant);
            }
        }
    }

    pub fn remove_bit(&mut self, weight: usize, end: ColumnEnd) -> Result<BitId, BitHeapError> {
        let column = self
            .columns
            .get_mut(weight)
            .ok_or(BitHeapError::EmptyColumn {
                weight,
                requested: 1,
                available: 0,
            })?;
        let removed = match end {
            ColumnEnd::Front if !column.is_empty() => Some(column.remove(0)),
            ColumnEnd::Back => column.pop(),
            ColumnEnd::Front => None,
        };
        removed.ok_or(BitHeapError::EmptyColumn {
            weight,
            requested: 1,
            available: 0,
        })
    }

    /// Removes the `count` earliest bits of column `weight`.
    pub fn remove_compressed_bits(
        &mut self,
        weight: usize,
        count: usize,
    ) -> Result<Vec<BitId>, BitHeapError> {
        let available = self.column_height(weight);
        if count > available {
            return Err(BitHeapError::EmptyColumn {
                weight,
                requested: count,
                available,
            });
        }
        Ok(self.columns[weight].drain(..count).collect())
    }

    pub fn column_height(&self, weight: usize) -> usize {
        self.columns.get(weight).map_or(0, |c| c.len())
    }

    pub fn max_height(&self) -> usize {
        self.columns.iter().map(|c| c.len()).max().unwrap_or(0)
    }

    fn bits_in_range(&self, lsb: usize, msb: usize) -> impl Iterator<Item = BitId> + '_ {
        let hi = msb.min(self.max_weight.saturating_sub(1));
        self.columns
            .iter()
            .enumerate()
            .filter(move |(w, _)| *w >= lsb && *w <= hi)
            .flat_map(|(_, c)| c.iter().copied())
    }

    /// The earliest bit in columns `lsb..=msb`, the first inserted on ties.
    pub fn soonest_bit(&self, lsb: usize, msb: usize) -> Option<BitId> {
        let mut best: Option<BitId> = None;
        for id in self.bits_in_range(lsb, msb) {
            if best.is_none_or(|b| self.bit(id).time < self.bit(b).time) {
                best = Some(id);
            }
        }
        best
    }

    /// The latest bit in columns `lsb..=msb`, the first inserted on ties.
    pub fn latest_bit(&self, lsb: usize, msb: usize) -> Result<BitId, BitHeapError> {
        let mut best: Option<BitId> = None;
        for id in self.bits_in_range(lsb, msb) {
            if best.is_none_or(|b| self.bit(id).time > self.bit(b).time) {
                best = Some(id);
            }
        }
        best.ok_or(BitHeapError::AllColumnsVoid { lsb, msb })
    }

    /// Latest of an explicit set of bits.
    pub(crate) fn latest_of(&self, ids: &[BitId]) -> Option<BitTime> {
        ids.iter().map(|id| self.bit(*id).time).max()
    }

    /// Multi-line dump of the column heights, LSB first.
    pub fn column_summary(&self) -> String {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_empty())
            .map(|(w, c)| format!("w{}:{}", w, c.len()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fabric::Fabric;

    fn make_heap(max_weight: usize) -> BitHeap {
        BitHeap::new(
            0,
            max_weight,
            Box::new(Fabric::virtex6()),
            BitHeapOptions::default(),
        )
    }

    fn literal() -> BitExpr {
        BitExpr::Literal(true)
    }

    #[test]
    fn test_negative_weight_is_an_error() {
        let mut heap = make_heap(8);
        assert_eq!(
            heap.add_bit(-1, literal(), None, BitType::External),
            Err(BitHeapError::NegativeWeight {
                weight: -1,
                context: "add_bit"
            })
        );
        assert!(heap.add_constant(-2, 1).is_err());
    }

    #[test]
    fn test_get_bit_rejects_foreign_ids() {
        let mut heap = make_heap(4);
        let id = heap
            .add_bit(2, literal(), None, BitType::External)
            .unwrap()
            .unwrap();
        assert_eq!(heap.get_bit(id).map(|b| b.weight), Some(2));
        assert!(heap.get_bit(BitId(id.0 + 1)).is_none());
        assert!(heap.get_bit(BitId(usize::MAX)).is_none());
    }

    #[test]
    fn test_bit_above_max_weight_is_dropped() {
        let _ = env_logger::try_init();
        let mut heap = make_heap(4);
        assert_eq!(heap.add_bit(4, literal(), None, BitType::External), Ok(None));
        assert_eq!(heap.max_height(), 0);
        assert!(heap.all_bits().is_empty());
    }

    #[test]
    fn test_insertion_is_time_sorted_and_stable() {
        let mut heap = make_heap(4);
        heap.clock_mut().set_critical_path(1.0e-9);
        let late = heap.add_bit(0, literal(), Some("late"), BitType::External).unwrap().unwrap();
        heap.clock_mut().set_critical_path(0.0);
        let a = heap.add_bit(0, literal(), Some("a"), BitType::External).unwrap().unwrap();
        let b = heap.add_bit(0, literal(), Some("b"), BitType::External).unwrap().unwrap();
        assert_eq!(heap.column(0), &[a, b, late]);
        assert_eq!(heap.bit(b).uid, 2);
        assert_eq!(heap.bit(b).name(0), "bh0_w0_2");
    }

    #[test]
    fn test_latest_and_soonest_prefer_first_inserted() {
        let mut heap = make_heap(4);
        let a = heap.add_bit(1, literal(), None, BitType::External).unwrap().unwrap();
        let _b = heap.add_bit(2, literal(), None, BitType::External).unwrap().unwrap();
        assert_eq!(heap.latest_bit(0, 3), Ok(a));
        assert_eq!(heap.soonest_bit(0, 3), Some(a));
        assert_eq!(heap.soonest_bit(3, 3), None);
        assert_eq!(
            heap.latest_bit(3, 3),
            Err(BitHeapError::AllColumnsVoid { lsb: 3, msb: 3 })
        );
    }

    #[test]
    fn test_remove_more_than_present() {
        let mut heap = make_heap(4);
        heap.add_bit(0, literal(), None, BitType::External).unwrap();
        assert_eq!(
            heap.remove_compressed_bits(0, 2),
            Err(BitHeapError::EmptyColumn {
                weight: 0,
                requested: 2,
                available: 1
            })
        );
        assert!(heap.remove_bit(0, ColumnEnd::Back).is_ok());
        assert!(heap.remove_bit(0, ColumnEnd::Front).is_err());
    }

    #[test]
    fn test_constant_add_then_subtract_is_identity() {
        let mut heap = make_heap(8);
        heap.add_constant(3, 5).unwrap();
        heap.add_constant(3, -5).unwrap();
        assert!(heap.constant().is_zero());
        heap.add_constant_one_bit(2).unwrap();
        heap.sub_constant_one_bit(2).unwrap();
        assert!(heap.constant().is_zero());
    }

    #[test]
    fn test_materialize_negative_constant_wraps() {
        let mut heap = make_heap(4);
        heap.sub_constant_one_bit(0).unwrap();
        heap.materialize_constant();
        // -1 mod 16 = 0b1111
        for w in 0..4 {
            assert_eq!(heap.column_height(w), 1);
        }
    }

    #[test]
    fn test_clock_moves_to_next_cycle_on_overflow() {
        let mut clock = PipelineClock::new(2.0e-9, true);
        clock.advance_critical_path(1.5e-9);
        assert_eq!(clock.current_cycle(), 0);
        clock.advance_critical_path(1.0e-9);
        assert_eq!(clock.current_cycle(), 1);
        assert_eq!(clock.current_critical_path(), 1.0e-9);

        let mut flat = PipelineClock::new(2.0e-9, false);
        flat.advance_critical_path(3.0e-9);
        assert_eq!(flat.current_cycle(), 0);
    }
}
