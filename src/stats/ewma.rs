//! Exponentially weighted moving average over a time window
//!
//! Each sample decays the running average by `exp(-Δt / window)`, where `Δt`
//! is the time in milliseconds since the previous sample. Minimum, maximum,
//! arithmetic mean, count and an independent error tally ride along.

use super::clock::now_millis;
use crate::engine::Engine;
use crate::error::Result;
use crate::reclaim::{AddressTable, Reclaimable};
use crate::sync::{Concurrent, DirectCell, LockPolicy, Unsynchronized};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Spin-locked EWMA, safe to share between threads
pub type ConcurrentEwma = Ewma<Concurrent>;

/// Unlocked single-writer EWMA
pub type DirectEwma = Ewma<Unsynchronized>;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct EwmaRecord {
    window: u64,
    last_sample: u64,
    average: f64,
    minimum: f64,
    maximum: f64,
    mean: f64,
    count: u64,
    concurrency: i64,
    errors: u64,
}

impl EwmaRecord {
    fn append(&mut self, sample: f64, now: u64) {
        if self.count == 0 {
            self.average = sample;
            self.minimum = sample;
            self.maximum = sample;
            self.mean = sample;
            self.count = 1;
        } else {
            let coeff = decay(now.saturating_sub(self.last_sample), self.window);
            self.average = (1.0 - coeff) * sample + coeff * self.average;
            if sample < self.minimum {
                self.minimum = sample;
            }
            if sample > self.maximum {
                self.maximum = sample;
            }
            self.count = self.count.saturating_add(1);
            self.mean = (self.mean * (self.count - 1) as f64 + sample) / self.count as f64;
        }
        self.last_sample = now;
    }

    fn reset(&mut self) {
        *self = Self {
            window: self.window,
            ..Self::default()
        };
    }
}

/// Weight kept by the previous average after `delta` ms
///
/// A zero window keeps nothing: the average tracks the latest sample.
#[inline]
pub fn decay(delta: u64, window: u64) -> f64 {
    if window == 0 {
        return 0.0;
    }
    (-(delta as f64) / window as f64).exp()
}

/// Point-in-time copy of every EWMA field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EwmaSnapshot {
    pub window: u64,
    pub last_sample: u64,
    pub average: f64,
    pub minimum: f64,
    pub maximum: f64,
    pub mean: f64,
    pub count: u64,
    pub errors: u64,
    pub concurrency: i64,
}

impl From<EwmaRecord> for EwmaSnapshot {
    fn from(r: EwmaRecord) -> Self {
        Self {
            window: r.window,
            last_sample: r.last_sample,
            average: r.average,
            minimum: r.minimum,
            maximum: r.maximum,
            mean: r.mean,
            count: r.count,
            errors: r.errors,
            concurrency: r.concurrency,
        }
    }
}

/// EWMA record in arena memory
///
/// Statistic getters read `0.0` until the first sample.
pub struct Ewma<P: LockPolicy = Concurrent> {
    cell: DirectCell<P, EwmaRecord>,
}

impl<P: LockPolicy> Ewma<P> {
    /// EWMA over `window_ms` on the process-wide engine
    pub fn new(window_ms: u64) -> Result<Self> {
        Self::new_in(Engine::global(), window_ms)
    }

    pub fn new_in(engine: &Engine, window_ms: u64) -> Result<Self> {
        let record = EwmaRecord {
            window: window_ms,
            ..EwmaRecord::default()
        };
        Ok(Self {
            cell: DirectCell::new_in(engine, record)?,
        })
    }

    /// Fold in a sample taken now
    #[inline]
    pub fn append(&self, sample: f64) {
        self.append_at(sample, now_millis());
    }

    /// Fold in a sample taken at `now_ms`
    pub fn append_at(&self, sample: f64, now_ms: u64) {
        self.cell.with(|r| r.append(sample, now_ms));
    }

    /// Count one failed operation
    pub fn error(&self) -> u64 {
        self.cell.with(|r| {
            r.errors = r.errors.saturating_add(1);
            r.errors
        })
    }

    /// Zero every statistic, keeping the window
    pub fn reset(&self) {
        self.cell.with(EwmaRecord::reset);
    }

    /// Mark one operation in flight; returns the new level
    pub fn enter(&self) -> i64 {
        self.cell.with(|r| {
            r.concurrency = r.concurrency.saturating_add(1);
            r.concurrency
        })
    }

    /// Mark one in-flight operation finished; never drops below zero
    pub fn exit(&self) -> i64 {
        self.cell.with(|r| {
            r.concurrency = (r.concurrency - 1).max(0);
            r.concurrency
        })
    }

    pub fn window(&self) -> u64 {
        self.cell.with(|r| r.window)
    }

    /// Timestamp (ms) of the last sample, 0 before any
    pub fn last_sample(&self) -> u64 {
        self.cell.with(|r| r.last_sample)
    }

    pub fn average(&self) -> f64 {
        self.cell.with(|r| r.average)
    }

    pub fn minimum(&self) -> f64 {
        self.cell.with(|r| r.minimum)
    }

    pub fn maximum(&self) -> f64 {
        self.cell.with(|r| r.maximum)
    }

    pub fn mean(&self) -> f64 {
        self.cell.with(|r| r.mean)
    }

    pub fn count(&self) -> u64 {
        self.cell.with(|r| r.count)
    }

    pub fn errors(&self) -> u64 {
        self.cell.with(|r| r.errors)
    }

    pub fn concurrency(&self) -> i64 {
        self.cell.with(|r| r.concurrency)
    }

    /// True until the first sample after creation or reset
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Consistent copy of every field
    pub fn snapshot(&self) -> EwmaSnapshot {
        self.cell.read().into()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.snapshot())
    }

    /// Whether accessors take the spin lock
    pub fn is_concurrent(&self) -> bool {
        P::CONCURRENT
    }
}

impl<P: LockPolicy> Reclaimable for Ewma<P> {
    fn address_table(&self) -> &Arc<AddressTable> {
        self.cell.address_table()
    }
}

impl<P: LockPolicy> core::fmt::Debug for Ewma<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Ewma")
            .field("concurrent", &P::CONCURRENT)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
