// SPDX-License-Identifier: Apache-2.0

//! Incremental construction of a `GateFn`.
//!
//! Lowering a bit heap produces many duplicate partial products and constant
//! operands (zero padding of adder rows, absent carry-ins). With `fold` on,
//! gates with a constant operand collapse; with `hash` on, identical `And2`
//! nodes are shared. `no_opt` keeps every gate, which tests use to count
//! nodes exactly.
//!
//! ```
//! use xlsynth_bitheap::aig::{AigBitVector, GateBuilder, GateBuilderOptions, GateFn};
//!
//! let mut builder = GateBuilder::new("fa".to_string(), GateBuilderOptions::opt());
//! let x = builder.add_input("x".to_string(), 3);
//! let fa = builder.add_full_adder(*x.get_lsb(0), *x.get_lsb(1), *x.get_lsb(2));
//! builder.add_output(
//!     "count".to_string(),
//!     AigBitVector::from_lsb_is_index_0(&[fa.sum, fa.carry]),
//! );
//! let gate_fn: GateFn = builder.build();
//! assert_eq!(gate_fn.outputs[0].get_bit_count(), 2);
//! ```

use std::collections::HashMap;

use crate::aig::gate::{AigBitVector, AigNode, AigOperand, AigRef, GateFn, Input, Output};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionKind {
    Linear,
    Tree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalfAdderOutput {
    pub sum: AigOperand,
    pub carry: AigOperand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullAdderOutput {
    pub sum: AigOperand,
    pub carry: AigOperand,
}

#[derive(Debug, Clone, Copy)]
pub struct GateBuilderOptions {
    pub fold: bool,
    pub hash: bool,
}

impl GateBuilderOptions {
    /// Returns a default "optimizing" `GateBuilderOptions` with folding and
    /// hashing enabled.
    pub fn opt() -> Self {
        Self {
            fold: true,
            hash: true,
        }
    }

    pub fn no_opt() -> Self {
        Self {
            fold: false,
            hash: false,
        }
    }
}

pub struct GateBuilder {
    pub name: String,
    pub gates: Vec<AigNode>,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub options: GateBuilderOptions,
    /// `And2` nodes by their (ordered) operand pair.
    structural: HashMap<(AigOperand, AigOperand), AigRef>,
}

impl GateBuilder {
    pub fn new(name: String, options: GateBuilderOptions) -> Self {
        Self {
            name,
            gates: vec![AigNode::Literal(false)],
            inputs: Vec::new(),
            outputs: Vec::new(),
            options,
            structural: HashMap::new(),
        }
    }

    pub fn build(self) -> GateFn {
        debug_assert!(
            !self.outputs.is_empty(),
            "GateBuilder::build: graph must have at least one output (degenerate/empty graph)"
        );
        GateFn {
            name: self.name,
            inputs: self.inputs,
            outputs: self.outputs,
            gates: self.gates,
        }
    }

    pub fn add_tag(&mut self, aig_ref: AigRef, tag: String) {
        self.gates[aig_ref.id].add_tag(tag)
    }

    pub fn get_false(&self) -> AigOperand {
        AigOperand {
            node: AigRef { id: 0 },
            negated: false,
        }
    }

    pub fn is_known_false(&self, operand: AigOperand) -> bool {
        operand.node.id == 0 && !operand.negated
    }

    pub fn get_true(&self) -> AigOperand {
        AigOperand {
            node: AigRef { id: 0 },
            negated: true,
        }
    }

    pub fn is_known_true(&self, operand: AigOperand) -> bool {
        operand.node.id == 0 && operand.negated
    }

    pub fn add_input(&mut self, name: String, bit_count: usize) -> AigBitVector {
        let mut bits: Vec<AigOperand> = Vec::with_capacity(bit_count);
        for lsb_i in 0..bit_count {
            let gate_ref = AigRef {
                id: self.gates.len(),
            };
            self.gates.push(AigNode::Input {
                name: name.clone(),
                lsb_index: lsb_i,
            });
            bits.push(gate_ref.into());
        }
        let bit_vector = AigBitVector::from_lsb_is_index_0(&bits);
        self.inputs.push(Input {
            name,
            bit_vector: bit_vector.clone(),
        });
        bit_vector
    }

    pub fn add_output(&mut self, name: String, bit_vector: AigBitVector) {
        for bit in bit_vector.iter_lsb_to_msb() {
            debug_assert!(
                bit.node.id < self.gates.len(),
                "add_output: Output node index out of bounds: {} (gates.len() = {})",
                bit.node.id,
                self.gates.len()
            );
        }
        self.outputs.push(Output { name, bit_vector });
    }

    pub fn add_and_binary(&mut self, lhs: AigOperand, rhs: AigOperand) -> AigOperand {
        if self.options.fold {
            if self.is_known_false(lhs) || self.is_known_false(rhs) {
                return self.get_false();
            }
            if self.is_known_true(lhs) {
                return rhs;
            }
            if self.is_known_true(rhs) {
                return lhs;
            }
            if lhs == rhs {
                return lhs;
            }
            if lhs == rhs.negate() {
                return self.get_false();
            }
        }
        let key = if lhs <= rhs { (lhs, rhs) } else { (rhs, lhs) };
        if self.options.hash {
            if let Some(existing) = self.structural.get(&key) {
                return (*existing).into();
            }
        }
        let gate_ref = AigRef {
            id: self.gates.len(),
        };
        self.gates.push(AigNode::And2 {
            a: lhs,
            b: rhs,
            tags: None,
        });
        if self.options.hash {
            self.structural.insert(key, gate_ref);
        }
        gate_ref.into()
    }

    pub fn add_not(&mut self, arg: AigOperand) -> AigOperand {
        arg.negate()
    }

    /// Returns the 3-input majority function (aka the full-adder carry).
    pub fn add_maj3(&mut self, a: AigOperand, b: AigOperand, c: AigOperand) -> AigOperand {
        let ab = self.add_and_binary(a, b);
        let ac = self.add_and_binary(a, c);
        let bc = self.add_and_binary(b, c);
        self.add_or_nary(&[ab, ac, bc], ReductionKind::Linear)
    }

    /// Emits a 1-bit half-adder.
    pub fn add_half_adder(&mut self, a: AigOperand, b: AigOperand) -> HalfAdderOutput {
        let sum = self.add_xor_binary(a, b);
        let carry = self.add_and_binary(a, b);
        HalfAdderOutput { sum, carry }
    }

    /// Emits a 1-bit full-adder.
    pub fn add_full_adder(
        &mut self,
        a: AigOperand,
        b: AigOperand,
        c: AigOperand,
    ) -> FullAdderOutput {
        let sum = self.add_xor_nary(&[a, b, c], ReductionKind::Linear);
        let carry = self.add_maj3(a, b, c);
        FullAdderOutput { sum, carry }
    }

    pub fn add_xor_binary(&mut self, lhs: AigOperand, rhs: AigOperand) -> AigOperand {
        if self.options.fold {
            if self.is_known_false(lhs) {
                return rhs;
            }
            if self.is_known_false(rhs) {
                return lhs;
            }
            if self.is_known_true(lhs) {
                return self.add_not(rhs);
            }
            if self.is_known_true(rhs) {
                return self.add_not(lhs);
            }
        }
        // xor(a, b) = ~(~(~a & b) & ~(a & ~b))
        let not_a = self.add_not(lhs);
        let not_b = self.add_not(rhs);
        let and_lhs = self.add_and_binary(not_a, rhs);
        let and_rhs = self.add_and_binary(lhs, not_b);
        let outer_and = self.add_and_binary(and_lhs.negate(), and_rhs.negate());
        self.add_not(outer_and)
    }

    pub fn add_xor_nary(
        &mut self,
        args: &[AigOperand],
        reduction_kind: ReductionKind,
    ) -> AigOperand {
        self.reduce(args, &GateBuilder::add_xor_binary, reduction_kind)
    }

    pub fn add_or_binary(&mut self, lhs: AigOperand, rhs: AigOperand) -> AigOperand {
        if self.options.fold {
            if self.is_known_true(lhs) || self.is_known_true(rhs) {
                return self.get_true();
            }
            if self.is_known_false(lhs) {
                return rhs;
            }
            if self.is_known_false(rhs) {
                return lhs;
            }
        }
        let and = self.add_and_binary(lhs.negate(), rhs.negate());
        self.add_not(and)
    }

    // Performs an `or` across all the gates given in `args` to produce a single bit
    // output.
    pub fn add_or_nary(
        &mut self,
        args: &[AigOperand],
        reduction_kind: ReductionKind,
    ) -> AigOperand {
        assert!(
            !args.is_empty(),
            "add_or_nary; attempted to reduce an empty list of operands; reduction_kind: {:?}",
            reduction_kind
        );
        self.reduce(args, &GateBuilder::add_or_binary, reduction_kind)
    }

    pub fn linear_reduce<F>(&mut self, args: &[AigOperand], f: &F) -> AigOperand
    where
        F: Fn(&mut Self, AigOperand, AigOperand) -> AigOperand,
    {
        assert!(
            !args.is_empty(),
            "attempted to reduce an empty list of operands"
        );
        let mut accum = args[0];
        for arg in &args[1..] {
            accum = f(self, accum, *arg);
        }
        accum
    }

    pub fn tree_reduce<F>(&mut self, args: &[AigOperand], f: &F) -> AigOperand
    where
        F: Fn(&mut Self, AigOperand, AigOperand) -> AigOperand,
    {
        assert!(
            !args.is_empty(),
            "attempted to reduce an empty list of operands"
        );
        if args.len() == 1 {
            return args[0];
        }
        let halves = args.split_at(args.len() / 2);
        let first_half = self.tree_reduce(halves.0, f);
        let second_half = self.tree_reduce(halves.1, f);
        f(self, first_half, second_half)
    }

    pub fn reduce<F>(
        &mut self,
        args: &[AigOperand],
        f: &F,
        reduction_kind: ReductionKind,
    ) -> AigOperand
    where
        F: Fn(&mut Self, AigOperand, AigOperand) -> AigOperand,
    {
        match reduction_kind {
            ReductionKind::Linear => self.linear_reduce(args, f),
            ReductionKind::Tree => self.tree_reduce(args, f),
        }
    }
}
