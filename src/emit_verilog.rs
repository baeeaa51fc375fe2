// SPDX-License-Identifier: Apache-2.0

//! Renders a compressed heap as a structural Verilog module.
//!
//! Every heap bit becomes a named wire, every reduction event one continuous
//! assignment. When a value is read in a later pipeline cycle than the one
//! it was produced in, the read goes through a chain of `_dN` registers
//! clocked by `clk`; the `clk` port only exists if at least one such chain
//! does.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::bit::{BitExpr, BitId};
use crate::bit_heap::BitHeap;
use crate::error::BitHeapError;
use crate::schedule::{BusSlice, ReductionEvent};

/// Name of the module's output port.
pub const RESULT_PORT: &str = "R";

struct Emitter<'a> {
    heap: &'a BitHeap,
    /// Deepest register chain needed per delayed name, with the vector width
    /// (`None` for a scalar wire).
    delays: BTreeMap<String, (Option<usize>, u32)>,
}

impl<'a> Emitter<'a> {
    fn delayed(&mut self, name: &str, width: Option<usize>, from: u32, to: u32) -> String {
        if to <= from {
            return name.to_string();
        }
        let depth = to - from;
        let entry = self
            .delays
            .entry(name.to_string())
            .or_insert((width, depth));
        entry.1 = entry.1.max(depth);
        format!("{}_d{}", name, depth)
    }

    fn bus_ref(&mut self, bus: usize, at: u32) -> Result<String, BitHeapError> {
        let input = self
            .heap
            .inputs()
            .get(bus)
            .ok_or_else(|| BitHeapError::UnknownSignal(format!("input bus #{}", bus)))?;
        let (name, width) = (input.name.clone(), input.width);
        Ok(self.delayed(&name, Some(width), 0, at))
    }

    fn signal_ref(&mut self, signal: usize, at: u32) -> Result<String, BitHeapError> {
        let decl = self
            .heap
            .schedule()
            .signals
            .get(signal)
            .ok_or_else(|| BitHeapError::UnknownSignal(format!("#{}", signal)))?;
        let (name, width, cycle) = (decl.name.clone(), decl.width, decl.time.cycle);
        Ok(self.delayed(&name, Some(width), cycle, at))
    }

    fn bit_ref(&mut self, id: BitId, at: u32) -> String {
        let bit = self.heap.bit(id);
        let name = bit.name(self.heap.guid());
        let cycle = bit.time.cycle;
        self.delayed(&name, None, cycle, at)
    }

    fn expr(&mut self, expr: &BitExpr, at: u32) -> Result<String, BitHeapError> {
        Ok(match expr {
            BitExpr::Input { bus, index } => format!("{}[{}]", self.bus_ref(bus.0, at)?, index),
            BitExpr::Literal(true) => "1'b1".to_string(),
            BitExpr::Literal(false) => "1'b0".to_string(),
            BitExpr::Not(inner) => format!("~{}", self.expr(inner, at)?),
            BitExpr::And(lhs, rhs) => {
                format!("({} & {})", self.expr(lhs, at)?, self.expr(rhs, at)?)
            }
            BitExpr::Signal { signal, index } => {
                format!("{}[{}]", self.signal_ref(signal.0, at)?, index)
            }
        })
    }

    /// `{msb, ..., lsb}` with zeros for missing bits.
    fn concat(&mut self, bits: &[Option<BitId>], at: u32) -> String {
        let parts: Vec<String> = bits
            .iter()
            .rev()
            .map(|b| match b {
                Some(id) => self.bit_ref(*id, at),
                None => "1'b0".to_string(),
            })
            .collect();
        format!("{{{}}}", parts.join(", "))
    }

    fn slice(&mut self, slice: &BusSlice, at: u32) -> Result<String, BitHeapError> {
        let bus = self.bus_ref(slice.bus.0, at)?;
        Ok(format!(
            "{}[{}:{}]",
            bus,
            slice.lsb + slice.width - 1,
            slice.lsb
        ))
    }

    fn event(&mut self, event: &ReductionEvent) -> Result<String, BitHeapError> {
        let decl = self.heap.schedule().signal(event.output());
        let (name, at) = (decl.name.clone(), decl.time.cycle);
        let rhs = match event {
            ReductionEvent::Compressor { inputs, .. } => {
                let mut terms = Vec::new();
                for id in &inputs[0] {
                    terms.push(self.bit_ref(*id, at));
                }
                for id in &inputs[1] {
                    terms.push(format!("{{{}, 1'b0}}", self.bit_ref(*id, at)));
                }
                terms.join(" + ")
            }
            ReductionEvent::Adder { rows, carry_in, .. } => {
                let mut terms: Vec<String> = rows.iter().map(|r| self.concat(r, at)).collect();
                if let Some(id) = carry_in {
                    terms.push(self.bit_ref(*id, at));
                }
                terms.join(" + ")
            }
            ReductionEvent::Chunk { bits, .. } => self.concat(bits, at),
            ReductionEvent::TileProduct { x, y, accumulate, .. } => {
                let product = format!("{} * {}", self.slice(x, at)?, self.slice(y, at)?);
                match accumulate {
                    Some(acc) => format!(
                        "{} + ({} >> {})",
                        product,
                        self.signal_ref(acc.signal.0, at)?,
                        acc.shift
                    ),
                    None => product,
                }
            }
        };
        Ok(format!("  assign {} = {};\n", name, rhs))
    }
}

fn range(width: usize) -> String {
    format!("[{}:0]", width.max(1) - 1)
}

/// Writes the module `name` computing the heap's result on port `R`.
pub fn emit_verilog(heap: &BitHeap, name: &str) -> Result<String, BitHeapError> {
    let result = heap
        .result()
        .ok_or_else(|| BitHeapError::Internal("heap has not been compressed".to_string()))?;
    let result_cycle = heap.stats().result_time.map_or(0, |t| t.cycle);
    let mut emitter = Emitter {
        heap,
        delays: BTreeMap::new(),
    };

    let mut assigns = String::new();
    for bit in heap.all_bits() {
        let source = emitter.expr(&bit.source, bit.time.cycle)?;
        assigns.push_str(&format!("  assign {} = {};\n", bit.name(heap.guid()), source));
    }
    for event in &heap.schedule().events {
        assigns.push_str(&emitter.event(event)?);
    }
    let mut parts = Vec::with_capacity(result.parts.len());
    for part in &result.parts {
        let signal = emitter.signal_ref(part.signal.0, result_cycle)?;
        parts.push(format!("{}[{}:0]", signal, part.width - 1));
    }
    assigns.push_str(&format!(
        "  assign {} = {{{}}};\n",
        result.name,
        parts.join(", ")
    ));
    assigns.push_str(&format!("  assign {} = {};\n", RESULT_PORT, result.name));

    render(heap, name, result.name.as_str(), result.width, &emitter, &assigns)
        .map_err(|e| BitHeapError::Internal(format!("formatting Verilog: {}", e)))
}

fn render(
    heap: &BitHeap,
    name: &str,
    result_name: &str,
    result_width: usize,
    emitter: &Emitter,
    assigns: &str,
) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    let mut ports = Vec::new();
    if !emitter.delays.is_empty() {
        ports.push("input wire clk".to_string());
    }
    for input in heap.inputs() {
        ports.push(format!("input wire {} {}", range(input.width), input.name));
    }
    ports.push(format!("output wire {} {}", range(result_width), RESULT_PORT));
    writeln!(out, "module {}(", name)?;
    writeln!(out, "  {}", ports.join(",\n  "))?;
    writeln!(out, ");")?;

    for signal in &heap.schedule().signals {
        writeln!(out, "  wire {} {};", range(signal.width), signal.name)?;
    }
    for bit in heap.all_bits() {
        writeln!(out, "  wire {};", bit.name(heap.guid()))?;
    }
    writeln!(out, "  wire {} {};", range(result_width), result_name)?;
    for (base, (width, depth)) in &emitter.delays {
        let ty = width.map_or_else(|| "reg".to_string(), |w| format!("reg {}", range(w)));
        for d in 1..=*depth {
            writeln!(out, "  {} {}_d{};", ty, base, d)?;
        }
    }

    out.push_str(assigns);

    if !emitter.delays.is_empty() {
        writeln!(out, "  always @(posedge clk) begin")?;
        for (base, (_, depth)) in &emitter.delays {
            writeln!(out, "    {}_d1 <= {};", base, base)?;
            for d in 2..=*depth {
                writeln!(out, "    {}_d{} <= {}_d{};", base, d, base, d - 1)?;
            }
        }
        writeln!(out, "  end")?;
    }
    writeln!(out, "endmodule")?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bit::BitType;
    use crate::bit_heap::BitHeapOptions;
    use crate::fabric::Fabric;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_emit_chunk_only_heap() {
        let mut heap = BitHeap::new(0, 2, Box::new(Fabric::virtex6()), BitHeapOptions::default());
        let x = heap.declare_input("x", 2);
        heap.add_unsigned_bit_vector(0, x, 2).unwrap();
        heap.run_compression().unwrap();
        let text = emit_verilog(&heap, "chunk_only").unwrap();
        assert_eq!(
            text,
            "module chunk_only(
  input wire [1:0] x,
  output wire [1:0] R
);
  wire [1:0] tempR_bh0_0;
  wire bh0_w0_0;
  wire bh0_w1_0;
  wire [1:0] CompressionResult0;
  assign bh0_w0_0 = x[0];
  assign bh0_w1_0 = x[1];
  assign tempR_bh0_0 = {bh0_w1_0, bh0_w0_0};
  assign CompressionResult0 = {tempR_bh0_0[1:0]};
  assign R = CompressionResult0;
endmodule
"
        );
    }

    #[test]
    fn test_emit_compressor_as_sum() {
        let _ = env_logger::try_init();
        let mut heap = BitHeap::new(1, 4, Box::new(Fabric::virtex6()), BitHeapOptions::default());
        let x = heap.declare_input("x", 6);
        for i in 0..6 {
            heap.add_bit(0, BitExpr::input(x, i), None, BitType::External)
                .unwrap();
        }
        heap.run_compression().unwrap();
        let text = emit_verilog(&heap, "popcount6").unwrap();
        assert!(text.contains("assign CompressorOut_bh1_"), "{}", text);
        assert!(text.contains("bh1_w0_0 + bh1_w0_1"), "{}", text);
        assert!(!text.contains("clk"));
        assert!(text.ends_with("endmodule\n"));
    }

    #[test]
    fn test_emit_registers_late_reads() {
        let mut heap = BitHeap::new(2, 4, Box::new(Fabric::virtex6()), BitHeapOptions::default());
        let x = heap.declare_input("x", 4);
        heap.add_bit(0, BitExpr::input(x, 0), None, BitType::External)
            .unwrap();
        heap.add_bit(0, BitExpr::input(x, 1), None, BitType::External)
            .unwrap();
        heap.clock_mut().set_cycle(2);
        heap.add_bit(0, BitExpr::input(x, 2), None, BitType::External)
            .unwrap();
        heap.add_bit(0, BitExpr::input(x, 3), None, BitType::External)
            .unwrap();
        heap.run_compression().unwrap();
        let text = emit_verilog(&heap, "late").unwrap();
        assert!(text.contains("input wire clk,"), "{}", text);
        assert!(text.contains("always @(posedge clk) begin"), "{}", text);
        // Bits read two cycles after they were produced.
        assert!(text.contains("bh2_w0_0_d2"), "{}", text);
        assert!(text.contains("bh2_w0_0_d1 <= bh2_w0_0;"), "{}", text);
    }

    #[test]
    fn test_emit_requires_compression() {
        let heap = BitHeap::new(0, 2, Box::new(Fabric::virtex6()), BitHeapOptions::default());
        assert!(emit_verilog(&heap, "m").unwrap_err().is_internal());
    }
}
