//! Cooperative cancellation shared by the pump and the pipeline workers.

use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

struct Inner {
    cancelled: Mutex<bool>,
    notify: Condvar,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn new(cancelled: bool) -> Self {
        Self {
            cancelled: Mutex::new(cancelled),
            notify: Condvar::new(),
            children: Mutex::new(Vec::new()),
        }
    }

    fn cancel(&self) {
        {
            let mut cancelled = self.cancelled.lock().unwrap();
            if *cancelled {
                return;
            }
            *cancelled = true;
        }
        self.notify.notify_all();

        let children = std::mem::take(&mut *self.children.lock().unwrap());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// Cancellation signal with interruptible sleeps.
///
/// Cancelling a signal cancels every child created from it; cancelling a
/// child leaves the parent untouched.
#[derive(Clone)]
pub(crate) struct Cancellation {
    inner: Arc<Inner>,
}

impl Cancellation {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Inner::new(false)),
        }
    }

    /// Create a signal that is cancelled together with `self`.
    pub(crate) fn child(&self) -> Cancellation {
        let parent_cancelled = self.is_cancelled();
        let child = Arc::new(Inner::new(parent_cancelled));
        if !parent_cancelled {
            let mut children = self.inner.children.lock().unwrap();
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child));
        }
        // A cancel racing with registration may have drained the list first.
        if self.is_cancelled() {
            child.cancel();
        }
        Cancellation { inner: child }
    }

    pub(crate) fn cancel(&self) {
        self.inner.cancel();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock().unwrap()
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// Returns `true` when the full duration elapsed and `false` when the
    /// sleep was cut short by cancellation.
    pub(crate) fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut cancelled = self.inner.cancelled.lock().unwrap();
        loop {
            if *cancelled {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let (guard, _) = self
                .inner
                .notify
                .wait_timeout(cancelled, deadline - now)
                .unwrap();
            cancelled = guard;
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}
