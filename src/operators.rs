// SPDX-License-Identifier: Apache-2.0

//! Arithmetic operators built on a bit heap: an unsigned integer multiplier
//! (logic partial products or DSP tiles, optionally truncated) and a
//! multi-operand adder.
//!
//! Each operator owns its heap. Generating one operator never affects
//! another, so a failure is local to the operator being generated.

use bitvec::vec::BitVec;
use num_bigint::{BigInt, BigUint};
use num_traits::{One, Zero};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::adders::AdderMapping;
use crate::aig::gate_sim::{self, Collect, biguint_from_bits};
use crate::bit::{BitExpr, BitType, BusId};
use crate::bit_heap::{BitHeap, BitHeapOptions};
use crate::error::BitHeapError;
use crate::fabric::Fabric;
use crate::lower::lower_to_gate_fn;
use crate::schedule::BusSlice;
use crate::supertile::{MultiplierTile, TileShape};

/// Number of bits needed to count `n` distinct values.
pub fn ceil_log2(n: usize) -> usize {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiplierConfig {
    pub width_x: usize,
    pub width_y: usize,
    /// Keep only the most significant `output_width` bits of the product,
    /// rounded. `None` keeps the full product.
    pub output_width: Option<usize>,
    pub use_dsp: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiAdderConfig {
    pub width: usize,
    pub count: usize,
    pub signed: bool,
    /// Subtract the last operand instead of adding it.
    pub subtract_last: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperatorKind {
    Multiplier {
        config: MultiplierConfig,
        /// Product bits not delivered by the operator.
        truncated: usize,
    },
    MultiAdder(MultiAdderConfig),
}

/// A generated operator: the heap holding its bits and where its output
/// sits in the heap's result.
pub struct Operator {
    pub name: String,
    pub kind: OperatorKind,
    pub heap: BitHeap,
    pub inputs: Vec<BusId>,
    /// Result bits below this weight are guard bits, not part of the output.
    pub output_lsb: usize,
    pub output_width: usize,
}

/// Input values for which the lowered operator produced a wrong output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleMismatch {
    pub inputs: Vec<BigUint>,
    pub output: BigUint,
}

impl std::fmt::Display for SampleMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inputs: Vec<String> = self.inputs.iter().map(|v| format!("{:#x}", v)).collect();
        write!(f, "inputs [{}] produced {:#x}", inputs.join(", "), self.output)
    }
}

fn mask(width: usize) -> BigUint {
    (BigUint::one() << width) - BigUint::one()
}

impl Operator {
    /// Extracts the operator's output from the heap's full result value.
    pub fn output_from_result(&self, result: &BigUint) -> BigUint {
        (result >> self.output_lsb) & mask(self.output_width)
    }

    /// Whether `output` is a correct output for the given input values,
    /// passed in bus declaration order.
    ///
    /// Full-width operators must be exact modulo `2^output_width`; truncated
    /// multipliers must be faithfully rounded (one of the two neighbours of
    /// the exact value).
    pub fn accepts(&self, inputs: &[BigUint], output: &BigUint) -> bool {
        let m = mask(self.output_width);
        match &self.kind {
            OperatorKind::Multiplier { truncated, .. } => {
                let product: BigUint = inputs.iter().product();
                let floor = &product >> *truncated;
                if *truncated == 0 {
                    return (floor & &m) == *output;
                }
                let ceil = &floor + BigUint::one();
                (floor & &m) == *output || (ceil & &m) == *output
            }
            OperatorKind::MultiAdder(config) => {
                let modulus = BigInt::one() << self.output_width;
                let mut sum = BigInt::zero();
                for (i, value) in inputs.iter().enumerate() {
                    let mut v = BigInt::from(value.clone());
                    if config.signed && config.width > 0 && value.bit(config.width as u64 - 1) {
                        v -= BigInt::one() << config.width;
                    }
                    if config.subtract_last && i + 1 == inputs.len() {
                        sum -= v;
                    } else {
                        sum += v;
                    }
                }
                let mut expected = sum % &modulus;
                if expected < BigInt::zero() {
                    expected += &modulus;
                }
                expected == BigInt::from(output.clone())
            }
        }
    }

    /// Lowers the compressed heap to gates and simulates it on `samples`
    /// random input vectors drawn from `seed`. Returns the first input vector
    /// with a wrong output.
    pub fn check_random_samples(
        &self,
        adder_mapping: AdderMapping,
        samples: usize,
        seed: u64,
    ) -> Result<Option<SampleMismatch>, BitHeapError> {
        let gate_fn = lower_to_gate_fn(&self.heap, &self.name, adder_mapping)?;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        for _ in 0..samples {
            let mut bits = Vec::with_capacity(self.inputs.len());
            for bus in &self.inputs {
                let width = self.heap.input(*bus)?.width;
                bits.push((0..width).map(|_| rng.r#gen::<bool>()).collect::<BitVec>());
            }
            let result = gate_sim::eval(&gate_fn, &bits, Collect::None);
            let output = self.output_from_result(&biguint_from_bits(&result.outputs[0]));
            let inputs: Vec<BigUint> = bits.iter().map(biguint_from_bits).collect();
            if !self.accepts(&inputs, &output) {
                return Ok(Some(SampleMismatch { inputs, output }));
            }
        }
        log::info!("{}: {} random samples agree", self.name, samples);
        Ok(None)
    }
}

fn add_partial_product(
    heap: &mut BitHeap,
    x: BusId,
    y: BusId,
    i: usize,
    j: usize,
    offset: usize,
) -> Result<(), BitHeapError> {
    if i + j < offset {
        return Ok(());
    }
    let expr = BitExpr::and(BitExpr::input(x, i), BitExpr::input(y, j));
    let comment = format!("x{}y{}", i, j);
    heap.add_bit((i + j - offset) as i64, expr, Some(comment.as_str()), BitType::External)?;
    Ok(())
}

/// Unsigned `width_x x width_y` multiplier.
///
/// A truncated multiplier drops `k = width_x + width_y - output_width`
/// product columns. It keeps `g` guard columns below the output, adds half an
/// output ulp for rounding and leaves out every partial product of weight
/// below `k - g`.
pub fn int_multiplier(
    guid: usize,
    config: &MultiplierConfig,
    fabric: Fabric,
    options: BitHeapOptions,
) -> Result<Operator, BitHeapError> {
    let (wx, wy) = (config.width_x, config.width_y);
    if wx == 0 || wy == 0 {
        return Err(BitHeapError::InvalidOperator(format!(
            "multiplier inputs must be at least one bit wide, got {}x{}",
            wx, wy
        )));
    }
    let product_width = wx + wy;
    let output_width = config.output_width.unwrap_or(product_width);
    if output_width == 0 || output_width > product_width {
        return Err(BitHeapError::InvalidOperator(format!(
            "output width {} for a {}-bit product",
            output_width, product_width
        )));
    }
    let truncated = product_width - output_width;
    let guard = truncated.min(ceil_log2(wx.min(wy)) + 1);
    let offset = truncated - guard;

    let (dsp_x, dsp_y) = (
        fabric.dsp_x_inputs.saturating_sub(1),
        fabric.dsp_y_inputs.saturating_sub(1),
    );
    let mut heap = BitHeap::new(guid, output_width + guard, Box::new(fabric), options);
    let x = heap.declare_input("X", wx);
    let y = heap.declare_input("Y", wy);

    // Product columns of full DSP blocks; everything else is partial products.
    let mut covered = vec![vec![false; wy]; wx];
    if config.use_dsp && dsp_x > 0 && dsp_y > 0 {
        for bx in 0..wx / dsp_x {
            for by in 0..wy / dsp_y {
                let (lx, ly) = (bx * dsp_x, by * dsp_y);
                // Tiles reaching below the kept columns stay in logic so that
                // only whole partial products are dropped.
                if lx + ly < offset {
                    continue;
                }
                heap.add_multiplier_tile(MultiplierTile::new(
                    TileShape::Dsp,
                    BusSlice {
                        bus: x,
                        lsb: lx,
                        width: dsp_x,
                    },
                    BusSlice {
                        bus: y,
                        lsb: ly,
                        width: dsp_y,
                    },
                    (lx + ly - offset) as i64,
                ))?;
                for row in covered.iter_mut().skip(lx).take(dsp_x) {
                    for c in row.iter_mut().skip(ly).take(dsp_y) {
                        *c = true;
                    }
                }
            }
        }
    }
    for (i, row) in covered.iter().enumerate() {
        for (j, done) in row.iter().enumerate() {
            if !done {
                add_partial_product(&mut heap, x, y, i, j, offset)?;
            }
        }
    }
    if truncated > 0 {
        heap.add_rounding_bit(guard)?;
    }
    log::info!(
        "multiplier {}x{} -> {}: {} DSP tiles, {} guard bits",
        wx,
        wy,
        output_width,
        heap.tiles().len(),
        guard
    );
    Ok(Operator {
        name: format!("IntMultiplier_{}x{}_{}", wx, wy, output_width),
        kind: OperatorKind::Multiplier {
            config: config.clone(),
            truncated,
        },
        heap,
        inputs: vec![x, y],
        output_lsb: guard,
        output_width,
    })
}

/// Sum of `count` operands of `width` bits, wide enough never to overflow
/// when all operands are added.
pub fn int_multi_adder(
    guid: usize,
    config: &MultiAdderConfig,
    fabric: Fabric,
    options: BitHeapOptions,
) -> Result<Operator, BitHeapError> {
    if config.width == 0 || config.count == 0 {
        return Err(BitHeapError::InvalidOperator(format!(
            "multi-adder of {} operands of {} bits",
            config.count, config.width
        )));
    }
    let output_width = config.width + ceil_log2(config.count);
    let mut heap = BitHeap::new(guid, output_width, Box::new(fabric), options);
    let mut inputs = Vec::with_capacity(config.count);
    for i in 0..config.count {
        let bus = heap.declare_input(&format!("X{}", i), config.width);
        let last = i + 1 == config.count;
        match (config.signed, config.subtract_last && last) {
            (false, false) => heap.add_unsigned_bit_vector(0, bus, config.width)?,
            (false, true) => heap.subtract_unsigned_bit_vector(0, bus, config.width)?,
            (true, false) => heap.add_signed_bit_vector(0, bus, config.width)?,
            (true, true) => heap.subtract_signed_bit_vector(0, bus, config.width)?,
        }
        inputs.push(bus);
    }
    log::info!(
        "multi-adder of {} {} operands of {} bits -> {}",
        config.count,
        if config.signed { "signed" } else { "unsigned" },
        config.width,
        output_width
    );
    Ok(Operator {
        name: format!(
            "IntMultiAdder_{}_{}x{}",
            if config.signed { "s" } else { "u" },
            config.count,
            config.width
        ),
        kind: OperatorKind::MultiAdder(config.clone()),
        heap,
        inputs,
        output_lsb: 0,
        output_width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(1, 0)]
    #[test_case(2, 1)]
    #[test_case(3, 2)]
    #[test_case(4, 2)]
    #[test_case(5, 3)]
    #[test_case(17, 5)]
    fn test_ceil_log2(n: usize, expected: usize) {
        assert_eq!(ceil_log2(n), expected);
    }

    #[test]
    fn test_truncated_multiplier_geometry() {
        let config = MultiplierConfig {
            width_x: 8,
            width_y: 8,
            output_width: Some(8),
            use_dsp: false,
        };
        let op = int_multiplier(0, &config, Fabric::virtex6(), BitHeapOptions::default()).unwrap();
        // k = 8, g = ceil_log2(8) + 1 = 4.
        assert_eq!(op.output_lsb, 4);
        assert_eq!(op.heap.max_weight(), 12);
        // Heap column 0 is product column 4: partial products with i + j = 4.
        assert_eq!(op.heap.column_height(0), 5);
        assert_eq!(op.heap.constant(), &BigInt::from(8));
    }

    #[test]
    fn test_dsp_multiplier_uses_tiles_and_partial_products() {
        let config = MultiplierConfig {
            width_x: 30,
            width_y: 20,
            output_width: None,
            use_dsp: true,
        };
        let op = int_multiplier(0, &config, Fabric::virtex6(), BitHeapOptions::default()).unwrap();
        // One 24x17 block; the rest goes to logic.
        assert_eq!(op.heap.tiles().len(), 1);
        let partial_products = 30 * 20 - 24 * 17;
        assert_eq!(op.heap.all_bits().len(), partial_products);
    }

    #[test]
    fn test_invalid_configurations() {
        let bad = MultiplierConfig {
            width_x: 4,
            width_y: 4,
            output_width: Some(9),
            use_dsp: false,
        };
        assert!(matches!(
            int_multiplier(0, &bad, Fabric::virtex6(), BitHeapOptions::default()),
            Err(BitHeapError::InvalidOperator(_))
        ));
        let empty = MultiAdderConfig {
            width: 8,
            count: 0,
            signed: false,
            subtract_last: false,
        };
        assert!(int_multi_adder(0, &empty, Fabric::virtex6(), BitHeapOptions::default()).is_err());
    }

    #[test]
    fn test_multi_adder_accepts_signed_difference() {
        let config = MultiAdderConfig {
            width: 4,
            count: 3,
            signed: true,
            subtract_last: true,
        };
        let op = int_multi_adder(0, &config, Fabric::virtex6(), BitHeapOptions::default()).unwrap();
        assert_eq!(op.output_width, 6);
        // -1 + 2 - (-8) = 9
        let inputs = [BigUint::from(0b1111u32), BigUint::from(2u32), BigUint::from(0b1000u32)];
        assert!(op.accepts(&inputs, &BigUint::from(9u32)));
        assert!(!op.accepts(&inputs, &BigUint::from(8u32)));
    }
}
