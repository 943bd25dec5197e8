//! DirectStats - off-heap streaming statistics
//!
//! Accumulators (EWMA, interval min/max/mean, growable buffers) live in raw
//! arena blocks guarded by a spin lock or by nothing, chosen per type. Their
//! blocks are released by a background reclaimer once the owning handle is
//! dropped.

pub mod arena;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod reclaim;
pub mod stats;
pub mod sync;

// Re-export core types
pub use arena::{Allocation, Arena, ArenaStats};
pub use config::{EngineConfig, MemoryConfig, ReclaimConfig};
pub use engine::Engine;
pub use error::{ArenaError, ConfigError, Result};
pub use reclaim::{AddressTable, ReclaimGuard, ReclaimStats, Reclaimable, Reclaimer};
pub use stats::{
    Appended, BufferSpec, ConcurrentEwma, ConcurrentIntervalAccumulator, DirectEwma, Ewma,
    GrowableBuffer, Interval, IntervalAccumulator, LongBuffer,
};
pub use sync::{Concurrent, DirectCell, LockPolicy, SpinLock, Unsynchronized};

/// Initialize logging and the process-wide engine
///
/// Uses the installed configuration, or the environment if none was
/// installed. Safe to call more than once.
pub fn init() -> &'static Engine {
    logging::init();
    let config = config::global();
    logging::debug!(?config, "Engine configuration fixed");
    Engine::global()
}
