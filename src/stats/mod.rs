//! Streaming statistics accumulators backed by arena memory
//!
//! Every accumulator is a record in an arena block, guarded by the lock
//! policy chosen at the type level. Dropping an accumulator hands its blocks
//! to the reclaimer.

mod buffer;
mod clock;
mod ewma;
mod interval;

#[cfg(test)]
mod tests;

pub use buffer::{Appended, BufferSpec, BufferStats, GrowableBuffer, LongBuffer};
pub use clock::now_millis;
pub use ewma::{decay, ConcurrentEwma, DirectEwma, Ewma, EwmaSnapshot};
pub use interval::{
    ConcurrentIntervalAccumulator, Interval, IntervalAccumulator, IntervalSnapshot, Sample,
    SampleKind,
};
