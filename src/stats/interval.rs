//! Interval accumulator - count, min, max and running mean per period
//!
//! One record shape serves integer and floating-point streams. The sample
//! type is a type parameter, so only the matching typed accessors exist.

use super::clock::now_millis;
use crate::engine::Engine;
use crate::error::Result;
use crate::reclaim::{AddressTable, Reclaimable};
use crate::sync::{Concurrent, DirectCell, LockPolicy, Unsynchronized};
use num_traits::{Bounded, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// Type tag stored in the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    Long,
    Double,
}

/// Numeric sample types an interval accumulator can hold
pub trait Sample: Copy + PartialOrd + Bounded + ToPrimitive + Debug + Send + Serialize + 'static {
    const KIND: SampleKind;

    #[inline]
    fn as_f64(self) -> f64 {
        self.to_f64().unwrap_or(f64::NAN)
    }
}

impl Sample for i64 {
    const KIND: SampleKind = SampleKind::Long;
}

impl Sample for f64 {
    const KIND: SampleKind = SampleKind::Double;
}

/// Unlocked single-writer accumulator
pub type IntervalAccumulator<N> = Interval<N, Unsynchronized>;

/// Spin-locked accumulator, safe to share between threads
pub type ConcurrentIntervalAccumulator<N> = Interval<N, Concurrent>;

#[derive(Debug, Clone, Copy, PartialEq)]
struct IntervalRecord<N> {
    id: u64,
    last_time: u64,
    /// Samples plus plain increments
    count: u64,
    /// Samples folded into `mean`
    samples: u64,
    min: N,
    max: N,
    mean: f64,
    kind: SampleKind,
}

impl<N: Sample> IntervalRecord<N> {
    fn empty(id: u64, now: u64) -> Self {
        Self {
            id,
            last_time: now,
            count: 0,
            samples: 0,
            min: N::max_value(),
            max: N::min_value(),
            mean: 0.0,
            kind: N::KIND,
        }
    }

    fn append(&mut self, value: N, now: u64) {
        self.count = self.count.saturating_add(1);
        self.samples = self.samples.saturating_add(1);
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
        let n = self.samples as f64;
        self.mean = (self.mean * (n - 1.0) + value.as_f64()) / n;
        self.last_time = now;
    }
}

/// Point-in-time copy of an interval accumulator
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntervalSnapshot<N> {
    pub id: u64,
    pub kind: SampleKind,
    pub last_time: u64,
    pub count: u64,
    pub samples: u64,
    pub min: Option<N>,
    pub max: Option<N>,
    pub mean: f64,
}

/// Interval accumulator record in arena memory
pub struct Interval<N: Sample, P: LockPolicy = Concurrent> {
    cell: DirectCell<P, IntervalRecord<N>>,
}

impl<N: Sample, P: LockPolicy> Interval<N, P> {
    /// Accumulator `id` on the process-wide engine
    pub fn new(id: u64) -> Result<Self> {
        Self::new_in(Engine::global(), id)
    }

    pub fn new_in(engine: &Engine, id: u64) -> Result<Self> {
        Ok(Self {
            cell: DirectCell::new_in(engine, IntervalRecord::empty(id, now_millis()))?,
        })
    }

    /// Fold in a sample taken now
    #[inline]
    pub fn append(&self, value: N) {
        self.append_at(value, now_millis());
    }

    pub fn append_at(&self, value: N, now_ms: u64) {
        self.cell.with(|r| r.append(value, now_ms));
    }

    /// Advance the count by `n` without a sample; returns the new count
    ///
    /// The mean, min and max only reflect appended samples.
    pub fn increment(&self, n: u64) -> u64 {
        let now = now_millis();
        self.cell.with(|r| {
            r.count = r.count.saturating_add(n);
            r.last_time = now;
            r.count
        })
    }

    /// Start a new period
    ///
    /// Min goes to the type's maximum and max to its minimum, so the next
    /// sample wins both comparisons.
    pub fn reset(&self) {
        let now = now_millis();
        self.cell.with(|r| *r = IntervalRecord::empty(r.id, now));
    }

    pub fn id(&self) -> u64 {
        self.cell.with(|r| r.id)
    }

    pub fn kind(&self) -> SampleKind {
        N::KIND
    }

    /// Time (ms) of the last update or reset
    pub fn last_time(&self) -> u64 {
        self.cell.with(|r| r.last_time)
    }

    pub fn count(&self) -> u64 {
        self.cell.with(|r| r.count)
    }

    /// Samples since the last reset
    pub fn samples(&self) -> u64 {
        self.cell.with(|r| r.samples)
    }

    /// Smallest sample this period
    pub fn min(&self) -> Option<N> {
        self.cell.with(|r| (r.samples > 0).then_some(r.min))
    }

    /// Largest sample this period
    pub fn max(&self) -> Option<N> {
        self.cell.with(|r| (r.samples > 0).then_some(r.max))
    }

    /// Arithmetic mean of this period's samples (0.0 before any)
    pub fn mean(&self) -> f64 {
        self.cell.with(|r| r.mean)
    }

    pub fn snapshot(&self) -> IntervalSnapshot<N> {
        let r = self.cell.read();
        let seen = r.samples > 0;
        IntervalSnapshot {
            id: r.id,
            kind: r.kind,
            last_time: r.last_time,
            count: r.count,
            samples: r.samples,
            min: seen.then_some(r.min),
            max: seen.then_some(r.max),
            mean: r.mean,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.snapshot())
    }
}

impl<N: Sample, P: LockPolicy> Reclaimable for Interval<N, P> {
    fn address_table(&self) -> &Arc<AddressTable> {
        self.cell.address_table()
    }
}

impl<N: Sample, P: LockPolicy> core::fmt::Debug for Interval<N, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Interval")
            .field("concurrent", &P::CONCURRENT)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
