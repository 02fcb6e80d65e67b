//! Shared tracker state behind a single read-write lock.
//!
//! Readers always observe a complete snapshot; writers publish every field
//! they touch inside one `with_write` scope. `parking_lot`'s lock is
//! writer-preferring so short writes are not starved by readers.

use crate::domain::{EventRecord, SessionCookie, UserState};
use parking_lot::RwLock;

/// Everything guarded by the store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackerState {
    pub user: UserState,
    /// Mutable part of the profile
    pub channel: String,
    /// FIFO of flattened records awaiting flush
    pub events: Vec<EventRecord>,
    pub cookie: SessionCookie,
}

/// What a flush takes out of the store in one step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlushBatch {
    pub events: Vec<EventRecord>,
    pub user: UserState,
    pub cookie: SessionCookie,
}

#[derive(Debug, Default)]
pub struct StateStore {
    inner: RwLock<TrackerState>,
}

impl StateStore {
    pub fn new(state: TrackerState) -> Self {
        Self {
            inner: RwLock::new(state),
        }
    }

    /// Run `f` against a consistent view. Concurrent readers are allowed.
    pub fn with_read<R>(&self, f: impl FnOnce(&TrackerState) -> R) -> R {
        f(&*self.inner.read())
    }

    /// Run `f` with exclusive access. Keep `f` short and free of I/O.
    pub fn with_write<R>(&self, f: impl FnOnce(&mut TrackerState) -> R) -> R {
        f(&mut *self.inner.write())
    }

    pub fn snapshot(&self) -> TrackerState {
        self.with_read(|s| s.clone())
    }

    pub fn user(&self) -> UserState {
        self.with_read(|s| s.user.clone())
    }

    pub fn channel(&self) -> String {
        self.with_read(|s| s.channel.clone())
    }

    pub fn pending_events(&self) -> Vec<EventRecord> {
        self.with_read(|s| s.events.clone())
    }

    pub fn session_cookie(&self) -> SessionCookie {
        self.with_read(|s| s.cookie.clone())
    }

    /// Swap the queue for an empty one, capturing user and cookie alongside.
    pub fn take_batch(&self) -> FlushBatch {
        self.with_write(|s| FlushBatch {
            events: std::mem::take(&mut s.events),
            user: s.user.clone(),
            cookie: s.cookie.clone(),
        })
    }
}
