// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::iter::zip;

use bitvec::vec::BitVec;
use num_bigint::BigUint;

use crate::aig::gate::{AigNode, AigOperand, GateFn};

pub struct GateSimResult {
    pub outputs: Vec<BitVec>,
    pub tagged_values: Option<HashMap<String, bool>>,
    pub all_values: Option<BitVec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collect {
    None,
    Tagged,
    All,
}

/// `width` low bits of `value`, LSB at index 0.
pub fn bits_from_biguint(value: &BigUint, width: usize) -> BitVec {
    (0..width).map(|i| value.bit(i as u64)).collect()
}

pub fn biguint_from_bits(bits: &BitVec) -> BigUint {
    let mut value = BigUint::default();
    for (i, bit) in bits.iter().enumerate() {
        if *bit {
            value.set_bit(i as u64, true);
        }
    }
    value
}

/// Evaluates `gate_fn` on one input vector per function input, each LSB
/// first and exactly as wide as the input.
pub fn eval(gate_fn: &GateFn, inputs: &[BitVec], collect: Collect) -> GateSimResult {
    assert_eq!(inputs.len(), gate_fn.inputs.len());

    // Values of the non-negated nodes, by node id.
    let mut values: BitVec = BitVec::repeat(false, gate_fn.gates.len());
    let mut tagged_values = if collect == Collect::Tagged {
        Some(HashMap::new())
    } else {
        None
    };

    for (input, gate_fn_input) in zip(inputs, gate_fn.inputs.iter()) {
        assert_eq!(
            input.len(),
            gate_fn_input.get_bit_count(),
            "input {} width mismatch",
            gate_fn_input.name
        );
        for (bit_index, operand) in gate_fn_input.bit_vector.iter_lsb_to_msb().enumerate() {
            values.set(operand.node.id, input[bit_index]);
        }
    }

    let read = |values: &BitVec, operand: &AigOperand| values[operand.node.id] ^ operand.negated;

    // Post-order guarantees the operands of an `And2` are computed before it.
    for operand in gate_fn.post_order_operands(true) {
        let value = match gate_fn.get(operand.node) {
            AigNode::Input { .. } => continue,
            AigNode::Literal(value) => *value,
            AigNode::And2 { a, b, tags } => {
                let and_result = read(&values, a) && read(&values, b);
                if let (Some(tags), Some(map)) = (tags, tagged_values.as_mut()) {
                    for tag in tags {
                        map.insert(tag.clone(), and_result);
                    }
                }
                and_result
            }
        };
        values.set(operand.node.id, value);
    }

    let outputs = gate_fn
        .outputs
        .iter()
        .map(|output| {
            output
                .bit_vector
                .iter_lsb_to_msb()
                .map(|bit| read(&values, bit))
                .collect::<BitVec>()
        })
        .collect();
    GateSimResult {
        outputs,
        tagged_values,
        all_values: if collect == Collect::All {
            Some(values)
        } else {
            None
        },
    }
}
