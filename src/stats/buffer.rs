//! Growable raw buffer - fixed-width elements in one arena block
//!
//! The buffer grows by `extend_size` elements when full, up to `max_size`.
//! Once it cannot grow, appends are rejected and counted as overruns.
//!
//! Resetting with `reset_to_initial` shrinks the block back to
//! `initial_size` elements. Elements past that point are discarded: a reset
//! closes a reporting period whose contents have already been consumed.

use super::clock::now_millis;
use crate::arena::{Arena, MIN_ALIGN};
use crate::engine::Engine;
use crate::error::{ArenaError, ConfigError, Result};
use crate::logging::log_overrun;
use crate::reclaim::{AddressTable, Reclaimable};
use crate::sync::{Concurrent, DirectCell, LockPolicy};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;

/// Address-table slot holding the element block
const DATA_SLOT: usize = 1;

/// Spin-locked buffer of `i64`
pub type LongBuffer = GrowableBuffer<i64>;

/// Sizing rules for a growable buffer, in elements
///
/// Only validated geometry can be built, deserialization included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBufferSpec")]
pub struct BufferSpec {
    initial_size: usize,
    extend_size: usize,
    max_size: usize,
    reset_to_initial: bool,
}

#[derive(Deserialize)]
struct RawBufferSpec {
    initial_size: usize,
    #[serde(default)]
    extend_size: usize,
    max_size: usize,
    #[serde(default = "default_reset_to_initial")]
    reset_to_initial: bool,
}

fn default_reset_to_initial() -> bool { true }

impl TryFrom<RawBufferSpec> for BufferSpec {
    type Error = ConfigError;

    fn try_from(raw: RawBufferSpec) -> Result<Self, ConfigError> {
        Self::new(raw.initial_size, raw.extend_size, raw.max_size)
            .map(|spec| spec.with_reset_to_initial(raw.reset_to_initial))
    }
}

impl BufferSpec {
    /// Validated spec; shrinks back to `initial_size` on reset
    pub fn new(initial_size: usize, extend_size: usize, max_size: usize) -> Result<Self, ConfigError> {
        if max_size < initial_size {
            return Err(ConfigError::InvalidBuffer(format!(
                "max_size {} is below initial_size {}",
                max_size, initial_size
            )));
        }
        if extend_size < 1 && max_size != initial_size {
            return Err(ConfigError::InvalidBuffer(format!(
                "extend_size must be at least 1 when max_size ({}) exceeds initial_size ({})",
                max_size, initial_size
            )));
        }
        Ok(Self {
            initial_size,
            extend_size,
            max_size,
            reset_to_initial: true,
        })
    }

    /// Buffer that never grows
    pub fn fixed(size: usize) -> Self {
        Self {
            initial_size: size,
            extend_size: 0,
            max_size: size,
            reset_to_initial: true,
        }
    }

    pub fn with_reset_to_initial(mut self, enabled: bool) -> Self {
        self.reset_to_initial = enabled;
        self
    }

    #[inline]
    pub fn initial_size(&self) -> usize {
        self.initial_size
    }

    #[inline]
    pub fn extend_size(&self) -> usize {
        self.extend_size
    }

    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    #[inline]
    pub fn reset_to_initial(&self) -> bool {
        self.reset_to_initial
    }

    /// Capacity after one extension from `capacity`, if allowed
    pub fn extended(&self, capacity: usize) -> Option<usize> {
        if self.extend_size < 1 {
            return None;
        }
        capacity
            .checked_add(self.extend_size)
            .filter(|&next| next <= self.max_size)
    }

    #[inline]
    pub fn can_grow(&self) -> bool {
        self.extend_size >= 1 && self.max_size > self.initial_size
    }
}

/// Outcome of an append
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appended {
    /// Stored at this index
    Stored(usize),
    /// Full and not extendable; the value was dropped
    Overrun,
}

impl Appended {
    #[inline]
    pub fn index(self) -> Option<usize> {
        match self {
            Appended::Stored(index) => Some(index),
            Appended::Overrun => None,
        }
    }

    #[inline]
    pub fn is_overrun(self) -> bool {
        matches!(self, Appended::Overrun)
    }
}

/// Diagnostic copy of a buffer's bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    pub last_reset: u64,
    pub capacity: usize,
    pub size: usize,
    pub overruns: u64,
    pub spec: BufferSpec,
}

#[derive(Debug, Clone, Copy)]
struct BufferHeader {
    last_reset: u64,
    capacity: usize,
    size: usize,
    overruns: u64,
    spec: BufferSpec,
    /// Element block address, mirrored in `DATA_SLOT`
    data: usize,
}

/// Growable array of `T` in arena memory
///
/// Holds two blocks: the locked header record and the element storage. Both
/// are released together once the buffer is dropped.
pub struct GrowableBuffer<T: Copy + Send + 'static, P: LockPolicy = Concurrent> {
    cell: DirectCell<P, BufferHeader>,
    arena: Arc<Arena>,
    _elements: PhantomData<fn() -> T>,
}

impl<T: Copy + Send + 'static, P: LockPolicy> GrowableBuffer<T, P> {
    const ALIGNED: () = assert!(
        core::mem::align_of::<T>() <= MIN_ALIGN,
        "element alignment exceeds arena block alignment"
    );

    /// Buffer on the process-wide engine
    pub fn new(spec: BufferSpec) -> Result<Self> {
        Self::new_in(Engine::global(), spec)
    }

    pub fn new_in(engine: &Engine, spec: BufferSpec) -> Result<Self> {
        #[allow(clippy::let_unit_value)]
        let () = Self::ALIGNED;

        let header = BufferHeader {
            last_reset: now_millis(),
            capacity: 0,
            size: 0,
            overruns: 0,
            spec,
            data: 0,
        };
        let cell = DirectCell::with_slots(engine, header, 1)?;

        let bytes = Self::bytes(spec.initial_size)?;
        let data = engine.arena().allocate_aligned(bytes)?;
        cell.address_table().set(DATA_SLOT, data.address());
        cell.with(|h| {
            h.data = data.address();
            h.capacity = spec.initial_size;
        });

        Ok(Self {
            cell,
            arena: Arc::clone(engine.arena()),
            _elements: PhantomData,
        })
    }

    #[inline]
    fn bytes(elements: usize) -> Result<usize> {
        elements
            .checked_mul(core::mem::size_of::<T>())
            .ok_or(ArenaError::SizeOverflow { requested: elements })
    }

    /// Move the element block to hold `capacity` elements
    fn resize(&self, h: &mut BufferHeader, capacity: usize) -> Result<()> {
        let bytes = Self::bytes(capacity)?;
        // SAFETY: `h.data` is our live block and we are inside the section
        let moved = unsafe { self.arena.reallocate(h.data, bytes)? };
        self.cell.address_table().set(DATA_SLOT, moved.address());
        h.data = moved.address();
        h.capacity = capacity;
        Ok(())
    }

    /// Store `value` at the end, growing if needed
    ///
    /// Fails only if the arena cannot provide the grown block. The buffer is
    /// unchanged in that case.
    pub fn append(&self, value: T) -> Result<Appended> {
        self.cell.with(|h| -> Result<Appended> {
            if h.size == h.capacity {
                let Some(next) = h.spec.extended(h.capacity) else {
                    h.overruns = h.overruns.saturating_add(1);
                    log_overrun(h.capacity, h.spec.max_size, h.overruns);
                    return Ok(Appended::Overrun);
                };
                self.resize(h, next)?;
            }

            let index = h.size;
            // SAFETY: index < capacity, and the block holds capacity elements
            unsafe { (h.data as *mut T).add(index).write(value) };
            h.size += 1;
            Ok(Appended::Stored(index))
        })
    }

    /// Start a new period
    ///
    /// With `reset_to_initial`, capacity returns to `initial_size` and the
    /// size is truncated to it. Overruns stay cumulative.
    pub fn reset(&self) -> Result<()> {
        self.restart(false)
    }

    /// Reset, then drop every element
    pub fn clear(&self) -> Result<()> {
        self.restart(true)
    }

    fn restart(&self, empty: bool) -> Result<()> {
        let now = now_millis();
        self.cell.with(|h| -> Result<()> {
            if h.spec.reset_to_initial && h.capacity > h.spec.initial_size {
                self.resize(h, h.spec.initial_size)?;
                h.size = h.size.min(h.spec.initial_size);
            }
            if empty {
                h.size = 0;
            }
            h.last_reset = now;
            Ok(())
        })
    }

    /// Element at `index`, if stored
    pub fn get(&self, index: usize) -> Option<T> {
        self.cell.with(|h| {
            // SAFETY: index < size <= capacity
            (index < h.size).then(|| unsafe { (h.data as *const T).add(index).read() })
        })
    }

    /// Copy of the stored elements
    pub fn to_vec(&self) -> Vec<T> {
        self.cell.with(|h| {
            // SAFETY: the first `size` elements are initialized; `data` is
            // non-null and MIN_ALIGN aligned
            unsafe { core::slice::from_raw_parts(h.data as *const T, h.size) }.to_vec()
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cell.with(|h| h.size)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cell.with(|h| h.capacity)
    }

    /// Appends rejected since creation
    pub fn overruns(&self) -> u64 {
        self.cell.with(|h| h.overruns)
    }

    /// Time (ms) of creation or the last reset
    pub fn last_reset(&self) -> u64 {
        self.cell.with(|h| h.last_reset)
    }

    pub fn spec(&self) -> BufferSpec {
        self.cell.with(|h| h.spec)
    }

    pub fn stats(&self) -> BufferStats {
        let h = self.cell.read();
        BufferStats {
            last_reset: h.last_reset,
            capacity: h.capacity,
            size: h.size,
            overruns: h.overruns,
            spec: h.spec,
        }
    }

    /// Address of the element block
    pub fn data_address(&self) -> usize {
        self.cell.with(|h| h.data)
    }
}

impl<T: Copy + Send + 'static, P: LockPolicy> Reclaimable for GrowableBuffer<T, P> {
    fn address_table(&self) -> &Arc<AddressTable> {
        self.cell.address_table()
    }
}

impl<T: Copy + Send + 'static, P: LockPolicy> core::fmt::Debug for GrowableBuffer<T, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GrowableBuffer")
            .field("concurrent", &P::CONCURRENT)
            .field("stats", &self.stats())
            .finish()
    }
}
