//! Engine configuration - process-wide memory toggles
//!
//! Two toggles shape every allocation: whether the arena keeps a tracking
//! table and whether requests are rounded to powers of two. Both are fixed
//! the first time the global engine reads them.

use crate::error::ConfigError;
use crate::logging::warn;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Largest request that is still rounded up when alignment is on (1 GiB)
pub const DEFAULT_MAX_ALIGNED_SIZE: usize = 1 << 30;

static GLOBAL: OnceCell<EngineConfig> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub reclaim: ReclaimConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Keep a per-address table and byte totals
    #[serde(default = "default_true")]
    pub track_allocations: bool,

    /// Round requests up to the next power of two
    #[serde(default = "default_false")]
    pub align_allocations: bool,

    #[serde(default = "default_max_aligned")]
    pub max_aligned_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimConfig {
    /// Name of the background reclamation thread
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
            reclaim: ReclaimConfig::default(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            track_allocations: true,
            align_allocations: false,
            max_aligned_size: DEFAULT_MAX_ALIGNED_SIZE,
        }
    }
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
        }
    }
}

fn default_true() -> bool { true }
fn default_false() -> bool { false }
fn default_max_aligned() -> usize { DEFAULT_MAX_ALIGNED_SIZE }
fn default_thread_name() -> String { "directstats-reclaimer".to_string() }

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Defaults overridden by environment variables
    ///
    /// - `DIRECTSTATS_TRACK_MEM`: `true`/`false`
    /// - `DIRECTSTATS_ALIGN_MEM`: `true`/`false`
    /// - `DIRECTSTATS_MAX_ALIGNED`: bytes
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(track) = env_flag("DIRECTSTATS_TRACK_MEM") {
            config.memory.track_allocations = track;
        }

        if let Some(align) = env_flag("DIRECTSTATS_ALIGN_MEM") {
            config.memory.align_allocations = align;
        }

        if let Ok(max) = std::env::var("DIRECTSTATS_MAX_ALIGNED") {
            match max.trim().parse::<usize>() {
                Ok(bytes) => config.memory.max_aligned_size = bytes,
                Err(_) => warn!(value = %max, "ignoring malformed DIRECTSTATS_MAX_ALIGNED"),
            }
        }

        config
    }

    /// Low-overhead mode: no tracking table, no rounding
    pub fn untracked() -> Self {
        let mut config = Self::default();
        config.memory.track_allocations = false;
        config
    }

    /// Tracking plus power-of-two rounding
    pub fn aligned() -> Self {
        let mut config = Self::default();
        config.memory.align_allocations = true;
        config
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(variable = name, value = %value, "ignoring malformed boolean");
            None
        }
    }
}

/// Fix the process-wide configuration
///
/// Fails if the configuration was already installed or read.
pub fn install(config: EngineConfig) -> Result<(), ConfigError> {
    GLOBAL.set(config).map_err(|_| ConfigError::AlreadyInstalled)
}

/// Process-wide configuration, installing `EngineConfig::from_env()` on first use
pub fn global() -> &'static EngineConfig {
    GLOBAL.get_or_init(EngineConfig::from_env)
}

/// Whether the process-wide configuration has been fixed
pub fn is_installed() -> bool {
    GLOBAL.get().is_some()
}
