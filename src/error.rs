//! Error types for the engine
//!
//! Allocation failure is the only error the hot paths report. Overruns are
//! values, lock contention is resolved by spinning, and cleanup failures stay
//! on the reclaimer thread.

use core::fmt;

/// Result alias defaulting to allocation failure
pub type Result<T, E = ArenaError> = core::result::Result<T, E>;

/// Fatal allocation failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
    /// The system allocator returned null
    OutOfMemory { requested: usize },
    /// Requested size plus header does not form a valid layout
    SizeOverflow { requested: usize },
}

impl ArenaError {
    /// Bytes the caller asked for
    pub fn requested(&self) -> usize {
        match self {
            Self::OutOfMemory { requested } | Self::SizeOverflow { requested } => *requested,
        }
    }
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { requested } => {
                write!(f, "Out of memory: failed to allocate {} bytes", requested)
            }
            Self::SizeOverflow { requested } => {
                write!(f, "Allocation of {} bytes exceeds the addressable layout", requested)
            }
        }
    }
}

impl std::error::Error for ArenaError {}

/// Configuration and construction errors
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
    /// Process-wide toggles were already fixed
    AlreadyInstalled,
    /// Growable buffer geometry rejected at construction
    InvalidBuffer(String),
    /// Background reclamation thread could not be spawned
    Reclaimer(std::io::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Failed to read config: {}", e),
            Self::Parse(msg) => write!(f, "Failed to parse config: {}", msg),
            Self::AlreadyInstalled => {
                write!(f, "Engine configuration is already fixed for this process")
            }
            Self::InvalidBuffer(reason) => write!(f, "Invalid buffer geometry: {}", reason),
            Self::Reclaimer(e) => write!(f, "Failed to start reclaimer thread: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) | Self::Reclaimer(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Parse(e.to_string())
    }
}
