//! Synchronization primitives for the driver core
//!
//! The descriptor-ring fast path is lock-free. What it does need is a way to
//! hand conditions from interrupt/poll context to the deferred worker
//! ([`AtomicFlags`]) and a record of who currently owns the poll routine
//! ([`Napi`]). Register-level reconfiguration is serialized with a plain
//! `spin::Mutex` held by the device.

pub mod flags;
pub mod napi;

pub use flags::AtomicFlags;
pub use napi::{Napi, NapiDisabled, NapiPoll, RingOwner};
