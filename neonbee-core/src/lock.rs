//! Distributed lock typestate and the lock provider contract.
//!
//! A lock can only be released while it is in the `Acquired` state. Releasing
//! consumes the lock, so a released lock can never be released twice.
//!
//! # State Transition Diagram
//!
//! ```text
//! (unlocked) ─── acquire_lock() ──→ Acquired ─── release() ──→ Released
//!                                       │
//!                                     drop ──→ (unlocked)
//! ```
//!
//! Dropping an acquired lock releases it as well, so every path through an
//! async operation gives the lock back, including early returns via `?`.

use crate::{NeonBeeResult, Timestamp};
use async_trait::async_trait;
use chrono::Utc;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

// ============================================================================
// LOCK DATA (state-independent)
// ============================================================================

/// Bookkeeping for a lock, independent of typestate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockData {
    /// Cluster-wide lock name.
    pub name: String,
    /// When the lock was granted.
    pub acquired_at: Timestamp,
    /// How long the caller waited before the lock was granted.
    pub waited: Duration,
}

impl LockData {
    pub fn new(name: impl Into<String>, waited: Duration) -> Self {
        Self {
            name: name.into(),
            acquired_at: Utc::now(),
            waited,
        }
    }

    /// Duration the lock has been held as of `now`.
    pub fn held_for(&self, now: Timestamp) -> Duration {
        (now - self.acquired_at).to_std().unwrap_or(Duration::ZERO)
    }
}

// ============================================================================
// TYPESTATE MARKERS
// ============================================================================

/// Marker trait for lock states.
pub trait LockState: private::Sealed + Send + Sync {}

/// Lock is currently held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquired;
impl LockState for Acquired {}

/// Lock has been given back; only its bookkeeping remains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Released;
impl LockState for Released {}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Acquired {}
    impl Sealed for super::Released {}
}

// ============================================================================
// LOCK TYPESTATE WRAPPER
// ============================================================================

/// A named lock with compile-time state tracking.
///
/// The provider hands over a guard whose `Drop` gives the lock back. The
/// wrapper owns that guard while `Acquired` and drops it on `release()`.
pub struct Lock<S: LockState> {
    data: LockData,
    guard: Option<Box<dyn Any + Send + Sync>>,
    _state: PhantomData<S>,
}

impl<S: LockState> Lock<S> {
    /// Access the lock bookkeeping.
    pub fn data(&self) -> &LockData {
        &self.data
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn acquired_at(&self) -> Timestamp {
        self.data.acquired_at
    }
}

impl Lock<Acquired> {
    /// Wrap a freshly granted lock.
    ///
    /// Only lock providers should call this; `guard` must release the
    /// underlying lock when dropped.
    pub fn new(data: LockData, guard: impl Send + Sync + 'static) -> Self {
        Lock {
            data,
            guard: Some(Box::new(guard)),
            _state: PhantomData,
        }
    }

    /// Release the lock. Consumes it, preventing a second release.
    pub fn release(mut self) -> Lock<Released> {
        drop(self.guard.take());
        Lock {
            data: self.data,
            guard: None,
            _state: PhantomData,
        }
    }
}

impl Lock<Released> {
    /// Consume the released lock and return its bookkeeping.
    pub fn into_data(self) -> LockData {
        self.data
    }
}

impl<S: LockState> fmt::Debug for Lock<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("data", &self.data)
            .field("held", &self.guard.is_some())
            .finish()
    }
}

// ============================================================================
// LOCK PROVIDER CONTRACT
// ============================================================================

/// Cluster-wide named lock provider.
///
/// Implementations may be backed by a cluster manager or, for a single
/// process, by local mutexes. Acquisition waits at most `timeout`; on expiry
/// the provider returns `SharedDataError::LockTimeout`.
#[async_trait]
pub trait LockProvider: Send + Sync {
    async fn acquire_lock(&self, name: &str, timeout: Duration) -> NeonBeeResult<Lock<Acquired>>;
}
