//! Thread pinning token

use std::cell::Cell;
use std::marker::PhantomData;
use std::thread::{self, ThreadId};

use tether_core::{Error, Result};

thread_local! {
    static PINNED: Cell<bool> = const { Cell::new(false) };
    static QUARANTINED: Cell<bool> = const { Cell::new(false) };
}

/// Exclusive claim on the current OS thread.
///
/// The token is neither `Send` nor `Sync`, so it cannot be held across an
/// `.await` in a task that the runtime is allowed to move between worker
/// threads. It is consumed exactly once: [`ThreadPin::release`] (or drop)
/// unpins, [`ThreadPin::quarantine`] retires the thread for good.
#[derive(Debug)]
pub struct ThreadPin {
    thread: ThreadId,
    _not_send: PhantomData<*const ()>,
}

impl ThreadPin {
    /// Pin the calling OS thread.
    ///
    /// # Errors
    /// Fails if the thread is already pinned or has been quarantined.
    pub fn acquire() -> Result<Self> {
        if QUARANTINED.get() {
            return Err(Error::namespace(format!(
                "thread {:?} is quarantined after a failed namespace restore",
                thread::current().id()
            )));
        }

        if PINNED.replace(true) {
            return Err(Error::namespace("thread is already pinned"));
        }

        Ok(Self {
            thread: thread::current().id(),
            _not_send: PhantomData,
        })
    }

    /// Thread this token pins
    #[must_use]
    pub const fn thread_id(&self) -> ThreadId {
        self.thread
    }

    /// Unpin the thread
    pub fn release(self) {
        drop(self);
    }

    /// Retire the thread: it stays pinned and can never be pinned again.
    pub fn quarantine(self) {
        QUARANTINED.set(true);
        tracing::error!(thread = ?self.thread, "Thread quarantined");
        std::mem::forget(self);
    }
}

impl Drop for ThreadPin {
    fn drop(&mut self) {
        PINNED.set(false);
    }
}

/// Whether the calling thread has been quarantined
#[must_use]
pub fn is_quarantined() -> bool {
    QUARANTINED.get()
}
