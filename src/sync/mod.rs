//! Synchronization primitives for raw records
//!
//! - `SpinLock`: owner-word lock with re-entrancy detection
//! - `LockPolicy`: `Concurrent` vs `Unsynchronized`, picked per accumulator
//! - `DirectCell`: a policy word and a record in one arena block

mod cell;
mod policy;
mod spin;


pub use cell::DirectCell;
pub use policy::{Concurrent, LockPolicy, Unsynchronized};
pub use spin::{current_thread_token, Acquired, SpinGuard, SpinLock, UNLOCKED};
