// SPDX-License-Identifier: Apache-2.0

//! Timing/cost model of the target hardware fabric.
//!
//! The compression engine treats the fabric as a numeric oracle: it asks for
//! the delay of a compressor shape, of a carry-propagate adder of a given
//! width, and for the cycle length. All delays are in seconds.

use serde::{Deserialize, Serialize};

use crate::compressor::Compressor;

/// Numeric oracle consumed by the scheduler.
pub trait TimingOracle {
    /// Delay introduced by one application of `compressor`.
    fn compressor_delay(&self, compressor: &Compressor) -> f64;

    /// Delay of a binary carry-propagate adder of `width` bits.
    fn adder_delay(&self, width: usize) -> f64;

    /// Delay of a three-input carry-propagate adder of `width` bits.
    fn ternary_adder_delay(&self, width: usize) -> f64;

    fn lut_delay(&self) -> f64;

    fn local_wire_delay(&self) -> f64;

    /// Length of one clock cycle.
    fn cycle_period(&self) -> f64;

    /// Maximum number of inputs of one logic primitive.
    fn lut_inputs(&self) -> usize;

    fn has_fast_ternary_adders(&self) -> bool;

    fn dsp_multiplier_delay(&self) -> f64;

    fn dsp_adder_delay(&self) -> f64;

    /// Shift the DSP cascade applies to the previous product.
    fn dsp_fixed_shift(&self) -> usize;

    /// Delay of one elementary logic level (a LUT plus its local routing).
    fn elementary_delay(&self) -> f64 {
        self.lut_delay() + self.local_wire_delay()
    }

    /// Number of elementary logic levels that fit in one cycle.
    fn stages_per_cycle(&self) -> f64 {
        (self.cycle_period() / self.elementary_delay()).floor().max(1.0)
    }
}

/// How the fabric's carry chain is timed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CarryChain {
    /// Slice-based chain: a 2-input LUT, the first mux, one mux per further
    /// bit and the final xor.
    Slice {
        lut2: f64,
        mux_s_to_o: f64,
        mux_cin_to_o: f64,
        xor_cin_to_o: f64,
    },
    /// Chain organised in logic array blocks, each propagating two bits per
    /// element.
    LogicArrayBlock {
        elements_per_block: usize,
        fast_carry: f64,
        inter_block_carry: f64,
        carry_in_to_sum_out: f64,
        share_out_to_carry_out: f64,
    },
}

/// Parameters of a hardware fabric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fabric {
    pub name: String,
    pub lut_inputs: usize,
    pub frequency_mhz: f64,
    pub lut_delay: f64,
    pub local_wire_delay: f64,
    pub carry_chain: CarryChain,
    #[serde(default)]
    pub fast_ternary_adders: bool,
    /// Width of the wide DSP multiplier input.
    pub dsp_x_inputs: usize,
    /// Width of the narrow DSP multiplier input.
    pub dsp_y_inputs: usize,
    /// Shift the DSP cascade applies to the previous result.
    pub dsp_fixed_shift: usize,
    pub dsp_multiplier_delay: f64,
    pub dsp_adder_delay: f64,
}

impl Fabric {
    /// Slice-based fabric with 6-input LUTs, 25x18 DSPs and a 17-bit cascade
    /// shift.
    pub fn virtex6() -> Self {
        Fabric {
            name: "virtex6".to_string(),
            lut_inputs: 6,
            frequency_mhz: 400.0,
            lut_delay: 0.086e-9,
            local_wire_delay: 0.436e-9,
            carry_chain: CarryChain::Slice {
                lut2: 0.053e-9,
                mux_s_to_o: 0.219e-9,
                mux_cin_to_o: 0.015e-9,
                xor_cin_to_o: 0.180e-9,
            },
            fast_ternary_adders: false,
            dsp_x_inputs: 25,
            dsp_y_inputs: 18,
            dsp_fixed_shift: 17,
            dsp_multiplier_delay: 1.638e-9,
            dsp_adder_delay: 1.769e-9,
        }
    }

    /// Logic-array-block fabric with fast ternary adders and 27x27 DSPs.
    pub fn stratix_v() -> Self {
        Fabric {
            name: "stratixv".to_string(),
            lut_inputs: 6,
            frequency_mhz: 400.0,
            lut_delay: 0.433e-9,
            local_wire_delay: 0.110e-9,
            carry_chain: CarryChain::LogicArrayBlock {
                elements_per_block: 10,
                fast_carry: 0.022e-9,
                inter_block_carry: 0.231e-9,
                carry_in_to_sum_out: 0.116e-9,
                share_out_to_carry_out: 0.287e-9,
            },
            fast_ternary_adders: true,
            dsp_x_inputs: 27,
            dsp_y_inputs: 27,
            dsp_fixed_shift: 27,
            dsp_multiplier_delay: 1.875e-9,
            dsp_adder_delay: 1.030e-9,
        }
    }

    /// Looks up a named preset.
    pub fn from_preset(name: &str) -> Option<Self> {
        match name {
            "virtex6" => Some(Fabric::virtex6()),
            "stratixv" | "stratix5" => Some(Fabric::stratix_v()),
            _ => None,
        }
    }

    pub fn preset_names() -> &'static [&'static str] {
        &["virtex6", "stratixv"]
    }

    #[must_use]
    pub fn with_frequency_mhz(mut self, frequency_mhz: f64) -> Self {
        self.frequency_mhz = frequency_mhz;
        self
    }

    /// Checks the parameters the timing model divides by or sizes the
    /// compressor catalog from. Returns a description of the first bad one.
    pub fn validate(&self) -> Result<(), String> {
        if self.lut_inputs < 3 {
            return Err(format!(
                "lut_inputs must be at least 3 to fit a full adder, got {}",
                self.lut_inputs
            ));
        }
        if !(self.frequency_mhz.is_finite() && self.frequency_mhz > 0.0) {
            return Err(format!(
                "frequency_mhz must be positive, got {}",
                self.frequency_mhz
            ));
        }
        let mut delays = vec![
            ("lut_delay", self.lut_delay),
            ("local_wire_delay", self.local_wire_delay),
            ("dsp_multiplier_delay", self.dsp_multiplier_delay),
            ("dsp_adder_delay", self.dsp_adder_delay),
        ];
        match &self.carry_chain {
            CarryChain::Slice {
                lut2,
                mux_s_to_o,
                mux_cin_to_o,
                xor_cin_to_o,
            } => delays.extend([
                ("lut2", *lut2),
                ("mux_s_to_o", *mux_s_to_o),
                ("mux_cin_to_o", *mux_cin_to_o),
                ("xor_cin_to_o", *xor_cin_to_o),
            ]),
            CarryChain::LogicArrayBlock {
                elements_per_block,
                fast_carry,
                inter_block_carry,
                carry_in_to_sum_out,
                share_out_to_carry_out,
            } => {
                if *elements_per_block == 0 {
                    return Err("elements_per_block must be nonzero".to_string());
                }
                delays.extend([
                    ("fast_carry", *fast_carry),
                    ("inter_block_carry", *inter_block_carry),
                    ("carry_in_to_sum_out", *carry_in_to_sum_out),
                    ("share_out_to_carry_out", *share_out_to_carry_out),
                ]);
            }
        }
        for (name, delay) in delays {
            if !(delay.is_finite() && delay >= 0.0) {
                return Err(format!("{} must be a non-negative delay, got {}", name, delay));
            }
        }
        if self.elementary_delay() <= 0.0 {
            return Err("lut_delay + local_wire_delay must be positive".to_string());
        }
        Ok(())
    }
}

impl TimingOracle for Fabric {
    fn compressor_delay(&self, _compressor: &Compressor) -> f64 {
        // Every catalog compressor fits in one LUT level.
        self.lut_delay + self.local_wire_delay
    }

    fn adder_delay(&self, width: usize) -> f64 {
        let width = width.max(1);
        match &self.carry_chain {
            CarryChain::Slice {
                lut2,
                mux_s_to_o,
                mux_cin_to_o,
                xor_cin_to_o,
            } => lut2 + mux_s_to_o + (width - 1) as f64 * mux_cin_to_o + xor_cin_to_o,
            CarryChain::LogicArrayBlock {
                elements_per_block,
                fast_carry,
                inter_block_carry,
                carry_in_to_sum_out,
                ..
            } => {
                let blocks = width / (*elements_per_block).max(1);
                let needed_blocks = (blocks as f64 / 2.0).ceil() as usize;
                let needed_blocks = needed_blocks.max(1);
                let intra_block_carries = (width / 2).saturating_sub(needed_blocks - 1);
                self.lut_delay
                    + intra_block_carries as f64 * fast_carry
                    + (needed_blocks - 1) as f64 * inter_block_carry
                    + carry_in_to_sum_out
            }
        }
    }

    fn ternary_adder_delay(&self, width: usize) -> f64 {
        let width = width.max(1);
        match &self.carry_chain {
            CarryChain::LogicArrayBlock {
                elements_per_block,
                fast_carry,
                inter_block_carry,
                carry_in_to_sum_out,
                share_out_to_carry_out,
            } if self.fast_ternary_adders => {
                let crossings = width / (*elements_per_block).max(1);
                let fast = (width / 2).saturating_sub(1 + crossings);
                self.lut_delay
                    + share_out_to_carry_out
                    + fast as f64 * fast_carry
                    + crossings as f64 * inter_block_carry
                    + carry_in_to_sum_out
            }
            // Without native support: a row of 3:2 compressors feeding a
            // binary adder one bit wider.
            _ => self.elementary_delay() + self.adder_delay(width + 1),
        }
    }

    fn lut_delay(&self) -> f64 {
        self.lut_delay
    }

    fn local_wire_delay(&self) -> f64 {
        self.local_wire_delay
    }

    fn cycle_period(&self) -> f64 {
        1.0 / (self.frequency_mhz * 1e6)
    }

    fn lut_inputs(&self) -> usize {
        self.lut_inputs
    }

    fn has_fast_ternary_adders(&self) -> bool {
        self.fast_ternary_adders
    }

    fn dsp_multiplier_delay(&self) -> f64 {
        self.dsp_multiplier_delay
    }

    fn dsp_adder_delay(&self) -> f64 {
        self.dsp_adder_delay
    }

    fn dsp_fixed_shift(&self) -> usize {
        self.dsp_fixed_shift
    }
}
