// SPDX-License-Identifier: Apache-2.0

//! Lowers a compressed heap to an and-inverter graph.
//!
//! Every reduction event becomes gates computing exactly the value the event
//! stands for: compressors and tile products as weighted counts, adders with
//! the requested carry-propagate mapping, chunks as plain wiring. The
//! resulting `GateFn` has one input per declared bus and a single output,
//! `result`, holding the heap's sum modulo `2^max_weight`.

use crate::adders::{
    AdderMapping, gatify_add_ternary, gatify_add_with_mapping, gatify_weighted_count,
};
use crate::aig::gate::{AigBitVector, AigOperand, GateFn};
use crate::aig::gate_builder::{GateBuilder, GateBuilderOptions};
use crate::bit::{BitExpr, BitId, SignalId};
use crate::bit_heap::BitHeap;
use crate::error::BitHeapError;
use crate::schedule::{Accumulate, BusSlice, ReductionEvent};

struct Lowering<'a> {
    heap: &'a BitHeap,
    gb: GateBuilder,
    inputs: Vec<AigBitVector>,
    signals: Vec<Option<AigBitVector>>,
    adder_mapping: AdderMapping,
}

impl<'a> Lowering<'a> {
    fn signal_bits(&self, signal: SignalId) -> Result<&AigBitVector, BitHeapError> {
        self.signals
            .get(signal.0)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| {
                let name = self
                    .heap
                    .schedule()
                    .signals
                    .get(signal.0)
                    .map_or_else(|| format!("#{}", signal.0), |s| s.name.clone());
                BitHeapError::UnknownSignal(name)
            })
    }

    fn expr(&mut self, expr: &BitExpr) -> Result<AigOperand, BitHeapError> {
        Ok(match expr {
            BitExpr::Input { bus, index } => {
                let bits = self.inputs.get(bus.0).ok_or_else(|| {
                    BitHeapError::UnknownSignal(format!("input bus #{}", bus.0))
                })?;
                if *index >= bits.get_bit_count() {
                    return Err(BitHeapError::UnknownSignal(format!(
                        "bit {} of input bus #{}",
                        index, bus.0
                    )));
                }
                *bits.get_lsb(*index)
            }
            BitExpr::Literal(true) => self.gb.get_true(),
            BitExpr::Literal(false) => self.gb.get_false(),
            BitExpr::Not(inner) => self.expr(inner)?.negate(),
            BitExpr::And(lhs, rhs) => {
                let lhs = self.expr(lhs)?;
                let rhs = self.expr(rhs)?;
                self.gb.add_and_binary(lhs, rhs)
            }
            BitExpr::Signal { signal, index } => {
                let bits = self.signal_bits(*signal)?;
                if *index >= bits.get_bit_count() {
                    return Err(BitHeapError::Internal(format!(
                        "bit {} of a {}-bit signal",
                        index,
                        bits.get_bit_count()
                    )));
                }
                *bits.get_lsb(*index)
            }
        })
    }

    fn bit(&mut self, id: BitId) -> Result<AigOperand, BitHeapError> {
        let heap = self.heap;
        self.expr(&heap.bit(id).source)
    }

    fn row(&mut self, row: &[Option<BitId>]) -> Result<AigBitVector, BitHeapError> {
        let mut operands = Vec::with_capacity(row.len());
        for bit in row {
            operands.push(match bit {
                Some(id) => self.bit(*id)?,
                None => self.gb.get_false(),
            });
        }
        Ok(AigBitVector::from_lsb_is_index_0(&operands))
    }

    fn slice(&self, slice: &BusSlice) -> Result<AigBitVector, BitHeapError> {
        let bits = self
            .inputs
            .get(slice.bus.0)
            .ok_or_else(|| BitHeapError::UnknownSignal(format!("input bus #{}", slice.bus.0)))?;
        Ok(bits.get_lsb_slice(slice.lsb, slice.width))
    }

    fn define(&mut self, signal: SignalId, bits: AigBitVector) -> Result<(), BitHeapError> {
        let decl = self.heap.schedule().signal(signal);
        if bits.get_bit_count() != decl.width {
            return Err(BitHeapError::Internal(format!(
                "{} declared with {} bits, lowered to {}",
                decl.name,
                decl.width,
                bits.get_bit_count()
            )));
        }
        self.signals[signal.0] = Some(bits);
        Ok(())
    }

    fn tile_product(
        &mut self,
        x: &BusSlice,
        y: &BusSlice,
        accumulate: &Option<Accumulate>,
        output: SignalId,
    ) -> Result<AigBitVector, BitHeapError> {
        let x = self.slice(x)?;
        let y = self.slice(y)?;
        let width = self.heap.schedule().signal(output).width;
        let mut columns: Vec<Vec<AigOperand>> = vec![Vec::new(); width];
        for i in 0..x.get_bit_count() {
            for j in 0..y.get_bit_count() {
                if i + j < width {
                    let pp = self.gb.add_and_binary(*x.get_lsb(i), *y.get_lsb(j));
                    columns[i + j].push(pp);
                }
            }
        }
        if let Some(Accumulate { signal, shift }) = accumulate {
            let previous = self.signal_bits(*signal)?.clone();
            for (k, bit) in previous.iter_lsb_to_msb().enumerate().skip(*shift) {
                if k - shift < width {
                    columns[k - shift].push(*bit);
                }
            }
        }
        Ok(gatify_weighted_count(&columns, width, &mut self.gb))
    }

    fn event(&mut self, index: usize, event: &ReductionEvent) -> Result<(), BitHeapError> {
        let tag = format!("bh{}_e{}", self.heap.guid(), index);
        let bits = match event {
            ReductionEvent::Compressor {
                compressor, inputs, ..
            } => {
                let mut columns = Vec::with_capacity(2);
                for column in inputs {
                    let mut operands = Vec::with_capacity(column.len());
                    for id in column {
                        operands.push(self.bit(*id)?);
                    }
                    columns.push(operands);
                }
                gatify_weighted_count(&columns, compressor.output_height, &mut self.gb)
            }
            ReductionEvent::Adder { rows, carry_in, .. } => {
                let mut vectors = Vec::with_capacity(rows.len());
                for row in rows {
                    vectors.push(self.row(row)?);
                }
                match vectors.as_slice() {
                    [lhs, rhs] => {
                        let c_in = match carry_in {
                            Some(id) => self.bit(*id)?,
                            None => self.gb.get_false(),
                        };
                        let (c_out, sum) = gatify_add_with_mapping(
                            self.adder_mapping,
                            lhs,
                            rhs,
                            c_in,
                            Some(tag.as_str()),
                            &mut self.gb,
                        );
                        AigBitVector::concat(c_out.into(), sum)
                    }
                    [a, b, c] if carry_in.is_none() => {
                        gatify_add_ternary(
                            [a, b, c],
                            self.adder_mapping,
                            Some(tag.as_str()),
                            &mut self.gb,
                        )
                    }
                    _ => {
                        return Err(BitHeapError::Internal(format!(
                            "adder with {} rows",
                            vectors.len()
                        )));
                    }
                }
            }
            ReductionEvent::Chunk { bits, .. } => self.row(bits)?,
            ReductionEvent::TileProduct {
                x,
                y,
                accumulate,
                output,
                ..
            } => self.tile_product(x, y, accumulate, *output)?,
        };
        self.define(event.output(), bits)
    }
}

/// Renders the finished heap into a gate function named `name`.
pub fn lower_to_gate_fn(
    heap: &BitHeap,
    name: &str,
    adder_mapping: AdderMapping,
) -> Result<GateFn, BitHeapError> {
    let result = heap
        .result()
        .ok_or_else(|| BitHeapError::Internal("heap has not been compressed".to_string()))?;
    let mut gb = GateBuilder::new(name.to_string(), GateBuilderOptions::opt());
    let inputs = heap
        .inputs()
        .iter()
        .map(|bus| gb.add_input(bus.name.clone(), bus.width))
        .collect();
    let mut lowering = Lowering {
        heap,
        gb,
        inputs,
        signals: vec![None; heap.schedule().signals.len()],
        adder_mapping,
    };
    for (index, event) in heap.schedule().events.iter().enumerate() {
        lowering.event(index, event)?;
    }

    let mut output = AigBitVector::zeros(0);
    for part in &result.parts {
        let bits = lowering.signal_bits(part.signal)?.get_lsb_slice(0, part.width);
        output = AigBitVector::concat(output, bits);
    }
    let mut gb = lowering.gb;
    gb.add_output("result".to_string(), output);
    let gate_fn = gb.build();
    if log::log_enabled!(log::Level::Debug) {
        log::debug!(
            "bit heap {}: lowered {} events to {} and gates",
            heap.guid(),
            heap.schedule().events.len(),
            gate_fn.and_count()
        );
    }
    Ok(gate_fn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aig::gate_sim::{self, Collect, biguint_from_bits, bits_from_biguint};
    use crate::bit::BitType;
    use crate::bit_heap::BitHeapOptions;
    use crate::fabric::Fabric;
    use num_bigint::BigUint;

    #[test]
    fn test_lower_nine_bit_column() {
        let _ = env_logger::try_init();
        let mut heap = BitHeap::new(0, 5, Box::new(Fabric::virtex6()), BitHeapOptions::default());
        let bus = heap.declare_input("x", 9);
        for i in 0..9 {
            heap.add_bit(0, BitExpr::input(bus, i), None, BitType::External)
                .unwrap();
        }
        heap.run_compression().unwrap();
        let gate_fn = lower_to_gate_fn(&heap, "popcount9", AdderMapping::RippleCarry).unwrap();
        assert_eq!(gate_fn.outputs[0].get_bit_count(), 5);
        for value in [0u64, 1, 0b1_0110_1001, 0b1_1111_1111, 0b0_1111_0000] {
            let got = gate_sim::eval(
                &gate_fn,
                &[bits_from_biguint(&BigUint::from(value), 9)],
                Collect::None,
            );
            assert_eq!(
                biguint_from_bits(&got.outputs[0]),
                BigUint::from(value.count_ones())
            );
        }
    }

    #[test]
    fn test_lower_requires_compression() {
        let heap = BitHeap::new(0, 4, Box::new(Fabric::virtex6()), BitHeapOptions::default());
        let err = lower_to_gate_fn(&heap, "f", AdderMapping::RippleCarry).unwrap_err();
        assert!(err.is_internal());
    }
}
