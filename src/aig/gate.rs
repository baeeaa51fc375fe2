// SPDX-License-Identifier: Apache-2.0

use crate::aig::topo::post_order_operands;

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct AigRef {
    pub id: usize,
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct AigOperand {
    pub node: AigRef,
    pub negated: bool,
}

impl AigOperand {
    #[must_use]
    pub fn negate(&self) -> Self {
        Self {
            node: self.node,
            negated: !self.negated,
        }
    }
}

impl From<AigRef> for AigOperand {
    fn from(node: AigRef) -> Self {
        AigOperand {
            node,
            negated: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AigNode {
    Input {
        name: String,
        /// Index where 0 is the least significant bit of the input.
        lsb_index: usize,
    },
    Literal(bool),
    And2 {
        a: AigOperand,
        b: AigOperand,
        tags: Option<Vec<String>>,
    },
}

impl AigNode {
    pub fn get_operands(&self) -> Vec<AigOperand> {
        match self {
            AigNode::Input { .. } | AigNode::Literal(_) => vec![],
            AigNode::And2 { a, b, .. } => vec![*a, *b],
        }
    }

    pub fn add_tag(&mut self, tag: String) {
        if let AigNode::And2 { tags, .. } = self {
            tags.get_or_insert_with(Vec::new).push(tag);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AigBitVector {
    /// In this representation index 0 is the LSb, the last index is the MSb.
    operands: Vec<AigOperand>,
}

impl From<AigOperand> for AigBitVector {
    fn from(operand: AigOperand) -> Self {
        AigBitVector {
            operands: vec![operand],
        }
    }
}

impl AigBitVector {
    pub fn zeros(bit_count: usize) -> Self {
        Self {
            operands: vec![
                AigOperand {
                    node: AigRef { id: 0 },
                    negated: false
                };
                bit_count
            ],
        }
    }

    pub fn concat(msbs: Self, lsbs: Self) -> Self {
        let mut operands = lsbs.operands;
        operands.extend(msbs.operands);
        Self { operands }
    }

    /// Creates a bit vector from a slice where index 0 of the slice is the
    /// least significant bit.
    pub fn from_lsb_is_index_0(operands: &[AigOperand]) -> Self {
        Self {
            operands: operands.to_vec(),
        }
    }

    pub fn get_lsb_slice(&self, start: usize, bit_width: usize) -> Self {
        AigBitVector {
            operands: self
                .operands
                .iter()
                .skip(start)
                .take(bit_width)
                .cloned()
                .collect(),
        }
    }

    pub fn iter_lsb_to_msb(&self) -> impl DoubleEndedIterator<Item = &AigOperand> {
        self.operands.iter()
    }

    pub fn get_lsb(&self, index: usize) -> &AigOperand {
        assert!(
            index < self.operands.len(),
            "index {} is out of bounds for bit vector of length {}",
            index,
            self.operands.len()
        );
        &self.operands[index]
    }

    pub fn get_bit_count(&self) -> usize {
        self.operands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operands.is_empty()
    }
}

/// A named bundle of primary-input gates, e.g. one operand of a multiplier.
#[derive(Debug, Clone)]
pub struct Input {
    pub name: String,
    pub bit_vector: AigBitVector,
}

impl Input {
    pub fn get_bit_count(&self) -> usize {
        self.bit_vector.get_bit_count()
    }
}

/// Similar to inputs, but references from the AIG can be negated.
#[derive(Debug, Clone)]
pub struct Output {
    pub name: String,
    pub bit_vector: AigBitVector,
}

impl Output {
    pub fn get_bit_count(&self) -> usize {
        self.bit_vector.get_bit_count()
    }
}

#[derive(Debug, Clone)]
pub struct GateFn {
    pub name: String,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub gates: Vec<AigNode>,
}

impl GateFn {
    pub fn get(&self, aig_ref: AigRef) -> &AigNode {
        &self.gates[aig_ref.id]
    }

    fn output_operands(&self) -> Vec<AigOperand> {
        self.outputs
            .iter()
            .flat_map(|output| output.bit_vector.iter_lsb_to_msb().copied())
            .collect()
    }

    /// Worklist-based postorder traversal from all outputs (with negation).
    pub fn post_order_operands(&self, discard_inputs: bool) -> Vec<AigOperand> {
        let starts = self.output_operands();
        post_order_operands(&starts, &self.gates, discard_inputs)
    }

    /// Number of `And2` nodes reachable from the outputs.
    pub fn and_count(&self) -> usize {
        let mut seen = std::collections::HashSet::new();
        for operand in self.post_order_operands(true) {
            if matches!(self.get(operand.node), AigNode::And2 { .. }) {
                seen.insert(operand.node);
            }
        }
        seen.len()
    }
}
