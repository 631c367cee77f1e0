//! Configuration for the branch prediction unit.
//!
//! This module defines all configuration structures and enums used to
//! parameterize the prediction unit. It provides:
//! 1. **Defaults:** Baseline sizes for every predictor structure.
//! 2. **Structures:** Hierarchical config for the unit, direction predictors,
//!    BTB, RAS, and indirect predictor.
//! 3. **Validation:** `BpuConfig::validate` rejects configurations the
//!    structures cannot be built from.
//!
//! Configuration is supplied via JSON or use `BpuConfig::default()`.

use std::fmt;

use serde::Deserialize;

/// Default configuration constants for the prediction unit.
mod defaults {
    /// Default number of hardware threads sharing the unit.
    pub const NUM_THREADS: usize = 1;

    /// Instruction address shift (4-byte instruction granularity).
    ///
    /// Low PC bits below this shift carry no information and are dropped
    /// before any table is indexed.
    pub const INST_SHIFT_AMT: u64 = 2;

    /// Default bimodal counter table size (2048 entries).
    pub const BIMODAL_ENTRIES: usize = 2048;

    /// Default gshare pattern history table size (4096 entries).
    pub const GSHARE_ENTRIES: usize = 4096;

    /// Default Branch Target Buffer size (256 entries).
    pub const BTB_ENTRIES: usize = 256;

    /// Default Return Address Stack depth (8 entries).
    pub const RAS_DEPTH: usize = 8;

    /// Default indirect target table size (256 entries).
    pub const INDIRECT_ENTRIES: usize = 256;
}

/// Direction predictor algorithm types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum DirectionKind {
    /// Per-PC 2-bit saturating counters, no history correlation.
    #[default]
    Bimodal,
    /// Global history XOR-hashed with the PC (gshare algorithm).
    GShare,
}

/// Root configuration for the branch prediction unit.
///
/// # Examples
///
/// Deserializing from JSON:
///
/// ```
/// use bpu_core::config::{BpuConfig, DirectionKind};
///
/// let json = r#"{
///     "num_threads": 2,
///     "direction": "GShare",
///     "ras": { "enabled": true, "depth": 16 },
///     "indirect": { "enabled": true }
/// }"#;
///
/// let config: BpuConfig = serde_json::from_str(json).unwrap();
/// assert_eq!(config.num_threads, 2);
/// assert_eq!(config.direction, DirectionKind::GShare);
/// assert_eq!(config.ras.depth, 16);
/// assert!(config.indirect.enabled);
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct BpuConfig {
    /// Number of hardware threads the unit multiplexes.
    #[serde(default = "BpuConfig::default_num_threads")]
    pub num_threads: usize,

    /// Instruction address shift applied before indexing predictor tables.
    #[serde(default = "BpuConfig::default_inst_shift_amt")]
    pub inst_shift_amt: u64,

    /// Trace every prediction, commit, and squash to stderr.
    #[serde(default)]
    pub trace_branches: bool,

    /// Direction predictor algorithm.
    #[serde(default)]
    pub direction: DirectionKind,

    /// Bimodal direction predictor parameters.
    #[serde(default)]
    pub bimodal: BimodalConfig,

    /// GShare direction predictor parameters.
    #[serde(default)]
    pub gshare: GShareConfig,

    /// Branch Target Buffer parameters.
    #[serde(default)]
    pub btb: BtbConfig,

    /// Return Address Stack parameters.
    #[serde(default)]
    pub ras: RasConfig,

    /// Indirect target predictor parameters.
    #[serde(default)]
    pub indirect: IndirectConfig,
}

impl BpuConfig {
    /// Returns the default thread count.
    fn default_num_threads() -> usize {
        defaults::NUM_THREADS
    }

    /// Returns the default instruction address shift.
    fn default_inst_shift_amt() -> u64 {
        defaults::INST_SHIFT_AMT
    }

    /// Checks that every predictor structure can be built from this config.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the thread count is zero, a table size
    /// is not a power of two, or the RAS is enabled with zero depth.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_threads == 0 {
            return Err(ConfigError::NoThreads);
        }
        let tables = [
            ("bimodal.entries", self.bimodal.entries),
            ("gshare.entries", self.gshare.entries),
            ("btb.entries", self.btb.entries),
            ("indirect.entries", self.indirect.entries),
        ];
        for (name, entries) in tables {
            if !entries.is_power_of_two() {
                return Err(ConfigError::TableNotPowerOfTwo {
                    name,
                    got: entries,
                });
            }
        }
        if self.ras.enabled && self.ras.depth == 0 {
            return Err(ConfigError::ZeroDepthRas);
        }
        Ok(())
    }
}

impl Default for BpuConfig {
    fn default() -> Self {
        Self {
            num_threads: defaults::NUM_THREADS,
            inst_shift_amt: defaults::INST_SHIFT_AMT,
            trace_branches: false,
            direction: DirectionKind::default(),
            bimodal: BimodalConfig::default(),
            gshare: GShareConfig::default(),
            btb: BtbConfig::default(),
            ras: RasConfig::default(),
            indirect: IndirectConfig::default(),
        }
    }
}

/// Bimodal direction predictor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BimodalConfig {
    /// Counter table size; must be a power of two.
    #[serde(default = "BimodalConfig::default_entries")]
    pub entries: usize,
}

impl BimodalConfig {
    fn default_entries() -> usize {
        defaults::BIMODAL_ENTRIES
    }
}

impl Default for BimodalConfig {
    fn default() -> Self {
        Self {
            entries: defaults::BIMODAL_ENTRIES,
        }
    }
}

/// GShare direction predictor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GShareConfig {
    /// Pattern history table size; must be a power of two. The global
    /// history register is masked to the same width.
    #[serde(default = "GShareConfig::default_entries")]
    pub entries: usize,
}

impl GShareConfig {
    fn default_entries() -> usize {
        defaults::GSHARE_ENTRIES
    }
}

impl Default for GShareConfig {
    fn default() -> Self {
        Self {
            entries: defaults::GSHARE_ENTRIES,
        }
    }
}

/// Branch Target Buffer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BtbConfig {
    /// Number of BTB entries; must be a power of two.
    #[serde(default = "BtbConfig::default_entries")]
    pub entries: usize,
}

impl BtbConfig {
    fn default_entries() -> usize {
        defaults::BTB_ENTRIES
    }
}

impl Default for BtbConfig {
    fn default() -> Self {
        Self {
            entries: defaults::BTB_ENTRIES,
        }
    }
}

/// Return Address Stack configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RasConfig {
    /// Attach a RAS to the unit.
    #[serde(default = "RasConfig::default_enabled")]
    pub enabled: bool,

    /// Stack depth per thread.
    #[serde(default = "RasConfig::default_depth")]
    pub depth: usize,
}

impl RasConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_depth() -> usize {
        defaults::RAS_DEPTH
    }
}

impl Default for RasConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            depth: defaults::RAS_DEPTH,
        }
    }
}

/// Indirect target predictor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IndirectConfig {
    /// Attach an indirect target predictor to the unit. When absent,
    /// indirect branches fall back to the BTB.
    #[serde(default)]
    pub enabled: bool,

    /// Target table size; must be a power of two.
    #[serde(default = "IndirectConfig::default_entries")]
    pub entries: usize,
}

impl IndirectConfig {
    fn default_entries() -> usize {
        defaults::INDIRECT_ENTRIES
    }
}

impl Default for IndirectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            entries: defaults::INDIRECT_ENTRIES,
        }
    }
}

/// Reasons a configuration cannot be turned into a prediction unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The unit must serve at least one thread.
    NoThreads,
    /// A predictor table size is not a power of two.
    TableNotPowerOfTwo {
        /// Config field name.
        name: &'static str,
        /// The rejected size.
        got: usize,
    },
    /// The RAS is enabled but has no storage.
    ZeroDepthRas,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoThreads => write!(f, "num_threads must be at least 1"),
            ConfigError::TableNotPowerOfTwo { name, got } => {
                write!(f, "{} must be a power of two, got {}", name, got)
            }
            ConfigError::ZeroDepthRas => write!(f, "ras.depth must be at least 1 when enabled"),
        }
    }
}

impl std::error::Error for ConfigError {}
