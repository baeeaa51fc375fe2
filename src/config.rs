// SPDX-License-Identifier: Apache-2.0

//! Generator configuration, read from the `[bitheap]` table of a TOML file.
//!
//! ```toml
//! [bitheap]
//! fabric_preset = "stratixv"
//! frequency_mhz = 300.0
//! wrap_up = "compressor_row"
//! strategy = "parandeh_afshar"
//! adder_mapping = "kogge-stone"
//! ```
//!
//! Every field is optional; command-line flags override file values.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::adders::AdderMapping;
use crate::bit_heap::{BitHeapOptions, CompressionStrategy, WrapUpStrategy};
use crate::fabric::Fabric;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Name of a fabric preset, see `Fabric::preset_names`.
    pub fabric_preset: Option<String>,

    /// Complete fabric description. Takes precedence over `fabric_preset`.
    pub fabric: Option<Fabric>,

    /// Target frequency, overriding the fabric's own.
    pub frequency_mhz: Option<f64>,

    /// Insert register stages when a cycle would overflow.
    pub pipelined: Option<bool>,

    /// Chain DSP tiles through their cascade adders.
    pub supertiles: Option<bool>,

    pub ternary_chain_min: Option<usize>,
    pub ternary_chain_max: Option<usize>,

    /// How the last height-3 columns are reduced on fabrics without fast
    /// ternary adders.
    pub wrap_up: Option<WrapUpStrategy>,

    /// How compressors are scheduled.
    pub strategy: Option<CompressionStrategy>,

    /// Carry-propagate structure used when lowering adders to gates.
    pub adder_mapping: Option<AdderMapping>,
}

#[derive(Deserialize)]
struct BitheapToml {
    bitheap: GeneratorConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Io { path: String, message: String },
    Parse(String),
    UnknownPreset(String),
    InvalidChainBounds { min: usize, max: usize },
    InvalidFabric { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, message } => write!(f, "reading {}: {}", path, message),
            ConfigError::Parse(msg) => write!(f, "parsing configuration: {}", msg),
            ConfigError::UnknownPreset(name) => write!(
                f,
                "unknown fabric preset {:?}; known presets: {}",
                name,
                Fabric::preset_names().join(", ")
            ),
            ConfigError::InvalidChainBounds { min, max } => write!(
                f,
                "ternary chain bounds must satisfy 1 <= min <= max, got min {} max {}",
                min, max
            ),
            ConfigError::InvalidFabric { name, message } => {
                write!(f, "invalid fabric {:?}: {}", name, message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

pub fn parse_config(text: &str) -> Result<GeneratorConfig, ConfigError> {
    let parsed: BitheapToml = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
    Ok(parsed.bitheap)
}

pub fn load_config(path: &Path) -> Result<GeneratorConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let config = parse_config(&text)?;
    log::info!("loaded generator configuration from {}", path.display());
    Ok(config)
}

impl GeneratorConfig {
    /// Field-wise override: values present in `overrides` win.
    #[must_use]
    pub fn merged_with(self, overrides: GeneratorConfig) -> GeneratorConfig {
        GeneratorConfig {
            fabric_preset: overrides.fabric_preset.or(self.fabric_preset),
            fabric: overrides.fabric.or(self.fabric),
            frequency_mhz: overrides.frequency_mhz.or(self.frequency_mhz),
            pipelined: overrides.pipelined.or(self.pipelined),
            supertiles: overrides.supertiles.or(self.supertiles),
            ternary_chain_min: overrides.ternary_chain_min.or(self.ternary_chain_min),
            ternary_chain_max: overrides.ternary_chain_max.or(self.ternary_chain_max),
            wrap_up: overrides.wrap_up.or(self.wrap_up),
            strategy: overrides.strategy.or(self.strategy),
            adder_mapping: overrides.adder_mapping.or(self.adder_mapping),
        }
    }

    /// The fabric to generate for; `virtex6` when nothing is configured.
    pub fn fabric(&self) -> Result<Fabric, ConfigError> {
        let fabric = match (&self.fabric, &self.fabric_preset) {
            (Some(fabric), _) => fabric.clone(),
            (None, Some(name)) => {
                Fabric::from_preset(name).ok_or_else(|| ConfigError::UnknownPreset(name.clone()))?
            }
            (None, None) => Fabric::virtex6(),
        };
        let fabric = match self.frequency_mhz {
            Some(mhz) => fabric.with_frequency_mhz(mhz),
            None => fabric,
        };
        fabric
            .validate()
            .map_err(|message| ConfigError::InvalidFabric {
                name: fabric.name.clone(),
                message,
            })?;
        Ok(fabric)
    }

    pub fn heap_options(&self) -> Result<BitHeapOptions, ConfigError> {
        let defaults = BitHeapOptions::default();
        let options = BitHeapOptions {
            pipelined: self.pipelined.unwrap_or(defaults.pipelined),
            supertiles: self.supertiles.unwrap_or(defaults.supertiles),
            ternary_chain_min: self.ternary_chain_min.unwrap_or(defaults.ternary_chain_min),
            ternary_chain_max: self.ternary_chain_max.unwrap_or(defaults.ternary_chain_max),
            wrap_up: self.wrap_up.unwrap_or(defaults.wrap_up),
            strategy: self.strategy.unwrap_or(defaults.strategy),
        };
        if options.ternary_chain_min == 0 || options.ternary_chain_min > options.ternary_chain_max
        {
            return Err(ConfigError::InvalidChainBounds {
                min: options.ternary_chain_min,
                max: options.ternary_chain_max,
            });
        }
        Ok(options)
    }

    pub fn adder_mapping(&self) -> AdderMapping {
        self.adder_mapping.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_full_table() {
        let config = parse_config(
            r#"
[bitheap]
fabric_preset = "stratixv"
frequency_mhz = 250.0
pipelined = false
ternary_chain_min = 6
wrap_up = "compressor_row"
strategy = "parandeh_afshar"
adder_mapping = "kogge-stone"
"#,
        )
        .unwrap();
        let fabric = config.fabric().unwrap();
        assert_eq!(fabric.name, "stratixv");
        assert_eq!(fabric.frequency_mhz, 250.0);
        let options = config.heap_options().unwrap();
        assert!(!options.pipelined);
        assert_eq!(options.ternary_chain_min, 6);
        assert_eq!(options.ternary_chain_max, 32);
        assert_eq!(options.wrap_up, WrapUpStrategy::CompressorRow);
        assert_eq!(options.strategy, CompressionStrategy::ParandehAfshar);
        assert_eq!(config.adder_mapping(), AdderMapping::KoggeStone);
    }

    #[test]
    fn test_defaults_when_empty() {
        let config = parse_config("[bitheap]\n").unwrap();
        assert_eq!(config, GeneratorConfig::default());
        assert_eq!(config.fabric().unwrap(), Fabric::virtex6());
        assert_eq!(config.heap_options().unwrap(), BitHeapOptions::default());
        assert_eq!(config.adder_mapping(), AdderMapping::RippleCarry);
    }

    #[test]
    fn test_unknown_field_and_preset_are_errors() {
        assert!(matches!(
            parse_config("[bitheap]\nfabirc_preset = \"virtex6\"\n"),
            Err(ConfigError::Parse(_))
        ));
        let config = parse_config("[bitheap]\nfabric_preset = \"cyclone\"\n").unwrap();
        assert_eq!(
            config.fabric(),
            Err(ConfigError::UnknownPreset("cyclone".to_string()))
        );
    }

    #[test]
    fn test_overrides_win() {
        let file = GeneratorConfig {
            fabric_preset: Some("stratixv".to_string()),
            pipelined: Some(true),
            ..Default::default()
        };
        let flags = GeneratorConfig {
            pipelined: Some(false),
            ..Default::default()
        };
        let merged = file.merged_with(flags);
        assert_eq!(merged.fabric_preset.as_deref(), Some("stratixv"));
        assert_eq!(merged.pipelined, Some(false));
    }

    #[test]
    fn test_bad_chain_bounds() {
        let config = GeneratorConfig {
            ternary_chain_min: Some(8),
            ternary_chain_max: Some(4),
            ..Default::default()
        };
        assert_eq!(
            config.heap_options(),
            Err(ConfigError::InvalidChainBounds { min: 8, max: 4 })
        );
    }

    #[test]
    fn test_degenerate_fabric_is_rejected() {
        let config = parse_config(
            r#"
[bitheap.fabric]
name = "tiny"
lut_inputs = 6
frequency_mhz = 300.0
lut_delay = 0.4e-9
local_wire_delay = 0.1e-9
dsp_x_inputs = 18
dsp_y_inputs = 18
dsp_fixed_shift = 18
dsp_multiplier_delay = 1.5e-9
dsp_adder_delay = 1.0e-9

[bitheap.fabric.carry_chain]
kind = "logic_array_block"
elements_per_block = 0
fast_carry = 0.02e-9
inter_block_carry = 0.2e-9
carry_in_to_sum_out = 0.1e-9
share_out_to_carry_out = 0.3e-9
"#,
        )
        .unwrap();
        match config.fabric() {
            Err(ConfigError::InvalidFabric { name, message }) => {
                assert_eq!(name, "tiny");
                assert!(message.contains("elements_per_block"), "{}", message);
            }
            other => panic!("expected an invalid fabric, got {:?}", other),
        }

        let zero_frequency = GeneratorConfig {
            frequency_mhz: Some(0.0),
            ..Default::default()
        };
        assert!(matches!(
            zero_frequency.fabric(),
            Err(ConfigError::InvalidFabric { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bitheap.toml");
        std::fs::write(&path, "[bitheap]\nsupertiles = false\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.supertiles, Some(false));
        assert!(matches!(
            load_config(&dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
