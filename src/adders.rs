// SPDX-License-Identifier: Apache-2.0

//! Gate-level adders used when a schedule is lowered to an AIG.
//!
//! * `gatify_add_ripple_carry`, `gatify_add_kogge_stone`,
//!   `gatify_add_brent_kung`: two-operand carry-propagate adders
//! * `gatify_add_ternary`: three-operand adder, a carry-save row in front of a
//!   two-operand adder
//! * `gatify_weighted_count`: the exact sum of bits spread over columns, the
//!   function of a compressor or of a multiplier tile

use serde::{Deserialize, Serialize};

use crate::aig::gate::{AigBitVector, AigOperand};
use crate::aig::gate_builder::GateBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdderMapping {
    #[default]
    RippleCarry,
    BrentKung,
    KoggeStone,
}

impl std::fmt::Display for AdderMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AdderMapping::RippleCarry => "ripple-carry",
            AdderMapping::BrentKung => "brent-kung",
            AdderMapping::KoggeStone => "kogge-stone",
        };
        write!(f, "{}", name)
    }
}

// Returns `(carry_out, result_gates)` where `result_gates` is the same size as
// the input bit-vectors.
pub fn gatify_add_ripple_carry(
    lhs: &AigBitVector,
    rhs: &AigBitVector,
    mut c_in: AigOperand,
    tag_prefix: Option<&str>,
    gb: &mut GateBuilder,
) -> (AigOperand, AigBitVector) {
    assert_eq!(lhs.get_bit_count(), rhs.get_bit_count());
    let mut gates = Vec::with_capacity(lhs.get_bit_count());
    for i in 0..lhs.get_bit_count() {
        // sum = a ^ b ^ c_in
        // cout = (a & b) | (b & c_in) | (a & c_in)
        let fa = gb.add_full_adder(*lhs.get_lsb(i), *rhs.get_lsb(i), c_in);
        if let Some(tag_prefix) = tag_prefix {
            gb.add_tag(
                fa.carry.node,
                format!(
                    "{}_ripple_carry_adder_{}_count_cout_{}",
                    tag_prefix,
                    lhs.get_bit_count(),
                    i
                ),
            );
        }
        gates.push(fa.sum);
        c_in = fa.carry;
    }
    (c_in, AigBitVector::from_lsb_is_index_0(&gates))
}

fn prefix_update(
    p_i: AigOperand,
    g_i: AigOperand,
    p_k: AigOperand,
    g_k: AigOperand,
    gb: &mut GateBuilder,
) -> (AigOperand, AigOperand) {
    let and = gb.add_and_binary(p_i, g_k);
    let g = gb.add_or_binary(g_i, and);
    let p = gb.add_and_binary(p_i, p_k);
    (p, g)
}

/// Shared tail of the parallel-prefix adders: carries from the group
/// propagate/generate signals, then the sum bits.
fn prefix_sum(
    xor_bits: &[AigOperand],
    p: &[AigOperand],
    g: &[AigOperand],
    c_in: AigOperand,
    tag: Option<(&str, &str)>,
    gb: &mut GateBuilder,
) -> (AigOperand, AigBitVector) {
    let bits = xor_bits.len();
    let mut carries = Vec::with_capacity(bits + 1);
    carries.push(c_in);
    for i in 0..bits {
        let and = gb.add_and_binary(p[i], c_in);
        let carry = gb.add_or_binary(g[i], and);
        carries.push(carry);
    }
    let mut sum = Vec::with_capacity(bits);
    for i in 0..bits {
        let s = gb.add_xor_binary(xor_bits[i], carries[i]);
        if let Some((prefix, kind)) = tag {
            gb.add_tag(
                s.node,
                format!("{}_{}_adder_{}_count_bit_{}", prefix, kind, bits, bits - i - 1),
            );
        }
        sum.push(s);
    }
    (carries[bits], AigBitVector::from_lsb_is_index_0(&sum))
}

pub fn gatify_add_kogge_stone(
    lhs: &AigBitVector,
    rhs: &AigBitVector,
    c_in: AigOperand,
    tag_prefix: Option<&str>,
    gb: &mut GateBuilder,
) -> (AigOperand, AigBitVector) {
    assert_eq!(lhs.get_bit_count(), rhs.get_bit_count());
    let bits = lhs.get_bit_count();
    let xor_bits: Vec<AigOperand> = (0..bits)
        .map(|i| gb.add_xor_binary(*lhs.get_lsb(i), *rhs.get_lsb(i)))
        .collect();
    let mut p = xor_bits.clone();
    let mut g: Vec<AigOperand> = (0..bits)
        .map(|i| gb.add_and_binary(*lhs.get_lsb(i), *rhs.get_lsb(i)))
        .collect();
    let mut step = 1;
    while step < bits {
        // Update from the top down so each step reads the previous level.
        for i in (step..bits).rev() {
            let (p_new, g_new) = prefix_update(p[i], g[i], p[i - step], g[i - step], gb);
            p[i] = p_new;
            g[i] = g_new;
        }
        step *= 2;
    }
    prefix_sum(
        &xor_bits,
        &p,
        &g,
        c_in,
        tag_prefix.map(|t| (t, "kogge_stone")),
        gb,
    )
}

pub fn gatify_add_brent_kung(
    lhs: &AigBitVector,
    rhs: &AigBitVector,
    c_in: AigOperand,
    tag_prefix: Option<&str>,
    gb: &mut GateBuilder,
) -> (AigOperand, AigBitVector) {
    assert_eq!(lhs.get_bit_count(), rhs.get_bit_count());
    let bits = lhs.get_bit_count();
    let xor_bits: Vec<AigOperand> = (0..bits)
        .map(|i| gb.add_xor_binary(*lhs.get_lsb(i), *rhs.get_lsb(i)))
        .collect();
    let mut p = xor_bits.clone();
    let mut g: Vec<AigOperand> = (0..bits)
        .map(|i| gb.add_and_binary(*lhs.get_lsb(i), *rhs.get_lsb(i)))
        .collect();
    let mut step = 1;
    while step < bits {
        let stride = step * 2;
        for i in (stride - 1..bits).step_by(stride) {
            let (p_new, g_new) = prefix_update(p[i], g[i], p[i - step], g[i - step], gb);
            p[i] = p_new;
            g[i] = g_new;
        }
        step = stride;
    }
    step /= 2;
    while step > 0 {
        let stride = step * 2;
        for i in (stride + step - 1..bits).step_by(stride) {
            let (p_new, g_new) = prefix_update(p[i], g[i], p[i - step], g[i - step], gb);
            p[i] = p_new;
            g[i] = g_new;
        }
        step /= 2;
    }
    prefix_sum(
        &xor_bits,
        &p,
        &g,
        c_in,
        tag_prefix.map(|t| (t, "brent_kung")),
        gb,
    )
}

pub fn gatify_add_with_mapping(
    adder_mapping: AdderMapping,
    lhs: &AigBitVector,
    rhs: &AigBitVector,
    c_in: AigOperand,
    tag: Option<&str>,
    gb: &mut GateBuilder,
) -> (AigOperand, AigBitVector) {
    match adder_mapping {
        AdderMapping::RippleCarry => gatify_add_ripple_carry(lhs, rhs, c_in, tag, gb),
        AdderMapping::BrentKung => gatify_add_brent_kung(lhs, rhs, c_in, tag, gb),
        AdderMapping::KoggeStone => gatify_add_kogge_stone(lhs, rhs, c_in, tag, gb),
    }
}

/// Sum of three equal-width operands, `width + 2` bits wide.
pub fn gatify_add_ternary(
    rows: [&AigBitVector; 3],
    adder_mapping: AdderMapping,
    tag: Option<&str>,
    gb: &mut GateBuilder,
) -> AigBitVector {
    let width = rows[0].get_bit_count();
    assert!(rows.iter().all(|r| r.get_bit_count() == width));
    let mut sums = Vec::with_capacity(width + 1);
    let mut carries = Vec::with_capacity(width + 1);
    carries.push(gb.get_false());
    for i in 0..width {
        let fa = gb.add_full_adder(*rows[0].get_lsb(i), *rows[1].get_lsb(i), *rows[2].get_lsb(i));
        sums.push(fa.sum);
        carries.push(fa.carry);
    }
    sums.push(gb.get_false());
    let (c_out, sum) = gatify_add_with_mapping(
        adder_mapping,
        &AigBitVector::from_lsb_is_index_0(&sums),
        &AigBitVector::from_lsb_is_index_0(&carries),
        gb.get_false(),
        tag,
        gb,
    );
    AigBitVector::concat(c_out.into(), sum)
}

/// Exact sum of weighted bits, `columns[i]` holding the bits of weight `i`,
/// reduced with full and half adders. The result has `output_width` bits;
/// carries out of the top are dropped.
pub fn gatify_weighted_count(
    columns: &[Vec<AigOperand>],
    output_width: usize,
    gb: &mut GateBuilder,
) -> AigBitVector {
    let mut columns: Vec<Vec<AigOperand>> = columns.to_vec();
    columns.resize(output_width.max(columns.len()), Vec::new());
    let mut result = Vec::with_capacity(output_width);
    for i in 0..output_width {
        while columns[i].len() > 1 {
            let (sum, carry) = if columns[i].len() >= 3 {
                let c = columns[i].remove(0);
                let b = columns[i].remove(0);
                let a = columns[i].remove(0);
                let fa = gb.add_full_adder(a, b, c);
                (fa.sum, fa.carry)
            } else {
                let b = columns[i].remove(0);
                let a = columns[i].remove(0);
                let ha = gb.add_half_adder(a, b);
                (ha.sum, ha.carry)
            };
            columns[i].push(sum);
            if i + 1 < columns.len() {
                columns[i + 1].push(carry);
            }
        }
        result.push(columns[i].first().copied().unwrap_or_else(|| gb.get_false()));
    }
    AigBitVector::from_lsb_is_index_0(&result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aig::gate::GateFn;
    use crate::aig::gate_builder::GateBuilderOptions;
    use crate::aig::gate_sim::{self, Collect, biguint_from_bits, bits_from_biguint};
    use num_bigint::BigUint;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;
    use test_case::test_case;

    fn make_adder(bits: usize, mapping: AdderMapping) -> GateFn {
        let mut builder = GateBuilder::new(format!("{}", mapping), GateBuilderOptions::no_opt());
        let lhs = builder.add_input("lhs".to_string(), bits);
        let rhs = builder.add_input("rhs".to_string(), bits);
        let c_in = *builder.add_input("c_in".to_string(), 1).get_lsb(0);
        let (c_out, results) =
            gatify_add_with_mapping(mapping, &lhs, &rhs, c_in, Some("t"), &mut builder);
        builder.add_output(
            "sum".to_string(),
            AigBitVector::concat(c_out.into(), results),
        );
        builder.build()
    }

    #[test_case(1, AdderMapping::RippleCarry)]
    #[test_case(5, AdderMapping::RippleCarry)]
    #[test_case(1, AdderMapping::KoggeStone)]
    #[test_case(3, AdderMapping::KoggeStone)]
    #[test_case(6, AdderMapping::KoggeStone)]
    #[test_case(1, AdderMapping::BrentKung)]
    #[test_case(5, AdderMapping::BrentKung)]
    #[test_case(6, AdderMapping::BrentKung)]
    fn test_adder_exhaustive(bits: usize, mapping: AdderMapping) {
        let gate_fn = make_adder(bits, mapping);
        for a in 0..(1u64 << bits) {
            for b in 0..(1u64 << bits) {
                for c in 0..2u64 {
                    let inputs = [
                        bits_from_biguint(&BigUint::from(a), bits),
                        bits_from_biguint(&BigUint::from(b), bits),
                        bits_from_biguint(&BigUint::from(c), 1),
                    ];
                    let got = gate_sim::eval(&gate_fn, &inputs, Collect::None);
                    assert_eq!(
                        biguint_from_bits(&got.outputs[0]),
                        BigUint::from(a + b + c),
                        "{} + {} + {} with {}",
                        a,
                        b,
                        c,
                        mapping
                    );
                }
            }
        }
    }

    #[test]
    fn test_ternary_adder_random() {
        let width = 12;
        let mut gb = GateBuilder::new("ternary".to_string(), GateBuilderOptions::opt());
        let a = gb.add_input("a".to_string(), width);
        let b = gb.add_input("b".to_string(), width);
        let c = gb.add_input("c".to_string(), width);
        let sum = gatify_add_ternary([&a, &b, &c], AdderMapping::KoggeStone, None, &mut gb);
        assert_eq!(sum.get_bit_count(), width + 2);
        gb.add_output("sum".to_string(), sum);
        let gate_fn = gb.build();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        for _ in 0..256 {
            let values: Vec<u64> = (0..3).map(|_| rng.gen_range(0..(1u64 << width))).collect();
            let inputs: Vec<_> = values
                .iter()
                .map(|v| bits_from_biguint(&BigUint::from(*v), width))
                .collect();
            let got = gate_sim::eval(&gate_fn, &inputs, Collect::None);
            assert_eq!(
                biguint_from_bits(&got.outputs[0]),
                BigUint::from(values.iter().sum::<u64>())
            );
        }
    }

    #[test]
    fn test_weighted_count_of_five_one_compressor() {
        // (5,1) compressor: five bits of weight 0 and one of weight 1.
        let mut gb = GateBuilder::new("c51".to_string(), GateBuilderOptions::opt());
        let x = gb.add_input("x".to_string(), 6);
        let columns = vec![
            (0..5).map(|i| *x.get_lsb(i)).collect::<Vec<_>>(),
            vec![*x.get_lsb(5)],
        ];
        let out = gatify_weighted_count(&columns, 3, &mut gb);
        gb.add_output("out".to_string(), out);
        let gate_fn = gb.build();
        for value in 0..64u64 {
            let expected = (value & 0x1f).count_ones() as u64 + 2 * ((value >> 5) & 1);
            let got = gate_sim::eval(
                &gate_fn,
                &[bits_from_biguint(&BigUint::from(value), 6)],
                Collect::None,
            );
            assert_eq!(biguint_from_bits(&got.outputs[0]), BigUint::from(expected));
        }
    }
}
