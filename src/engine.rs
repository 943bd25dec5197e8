//! Engine - one arena plus the reclaimer releasing its blocks
//!
//! The process-wide engine is created at first use from the installed
//! configuration and lives for the rest of the process.

use crate::arena::{Arena, ArenaStats};
use crate::config::{self, EngineConfig};
use crate::error::ConfigError;
use crate::logging::{debug, info};
use crate::reclaim::{ReclaimStats, Reclaimer};
use once_cell::sync::OnceCell;
use std::sync::Arc;

static GLOBAL: OnceCell<Engine> = OnceCell::new();

pub struct Engine {
    config: EngineConfig,
    arena: Arc<Arena>,
    reclaimer: Reclaimer,
}

impl Engine {
    /// Isolated engine with its own arena and reclaimer thread
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        let arena = Arc::new(Arena::new(&config.memory));
        let reclaimer = Reclaimer::start(Arc::clone(&arena), &config.reclaim)?;

        debug!(
            tracking = config.memory.track_allocations,
            aligned = config.memory.align_allocations,
            max_aligned_size = config.memory.max_aligned_size,
            "Engine created"
        );

        Ok(Self {
            config,
            arena,
            reclaimer,
        })
    }

    /// Process-wide engine, created on first call
    pub fn try_global() -> Result<&'static Engine, ConfigError> {
        GLOBAL.get_or_try_init(|| {
            let engine = Engine::new(config::global().clone())?;
            info!(
                tracking = engine.config.memory.track_allocations,
                aligned = engine.config.memory.align_allocations,
                "Process-wide engine initialized"
            );
            Ok(engine)
        })
    }

    /// Process-wide engine, created on first call
    ///
    /// # Panics
    ///
    /// Panics if the reclaimer thread cannot be spawned on first use.
    pub fn global() -> &'static Engine {
        match Self::try_global() {
            Ok(engine) => engine,
            Err(e) => panic!("directstats engine initialization failed: {}", e),
        }
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn arena(&self) -> &Arc<Arena> {
        &self.arena
    }

    #[inline]
    pub fn reclaimer(&self) -> &Reclaimer {
        &self.reclaimer
    }

    /// Arena statistics, `-1` in every field when tracking is off
    pub fn stats(&self) -> ArenaStats {
        self.arena.stats()
    }

    pub fn reclaim_stats(&self) -> ReclaimStats {
        self.reclaimer.stats()
    }

    /// Wait until every owner dropped so far has been released
    pub fn flush(&self) {
        self.reclaimer.flush();
    }
}

impl core::fmt::Debug for Engine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
