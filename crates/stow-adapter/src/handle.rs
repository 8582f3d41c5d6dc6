//! The single lock every adapter puts in front of its physical handle.

use std::time::Duration;

use parking_lot::Mutex;
use tracing::warn;

use crate::error::{AdapterError, AdapterResult};

/// Mutual exclusion around a physical storage handle.
///
/// One outstanding operation at a time, bounded wait, and an explicit closed
/// state. Adapters keep their whole mutable state inside `H` so a single
/// guard covers both the handle and its bookkeeping.
pub struct HandleLock<H> {
    handle: Mutex<Option<H>>,
    timeout: Duration,
}

impl<H> HandleLock<H> {
    pub fn new(handle: H, timeout: Duration) -> Self {
        Self {
            handle: Mutex::new(Some(handle)),
            timeout,
        }
    }

    /// Run `f` with exclusive access to the open handle.
    pub fn with<R>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut H) -> AdapterResult<R>,
    ) -> AdapterResult<R> {
        let mut guard = self.handle.try_lock_for(self.timeout).ok_or_else(|| {
            warn!(op, timeout = ?self.timeout, "storage handle lock timed out");
            AdapterError::Timeout {
                op,
                waited: self.timeout,
            }
        })?;
        let handle = guard.as_mut().ok_or(AdapterError::Closed)?;
        f(handle)
    }

    /// Take the handle out, leaving the lock closed.
    ///
    /// Returns `Ok(None)` if it was already closed.
    pub fn take(&self) -> AdapterResult<Option<H>> {
        let mut guard = self
            .handle
            .try_lock_for(self.timeout)
            .ok_or(AdapterError::Timeout {
                op: "close",
                waited: self.timeout,
            })?;
        Ok(guard.take())
    }

    /// Returns `true` once the handle has been taken. A handle that stays
    /// busy past the timeout is reported as open.
    pub fn is_closed(&self) -> bool {
        self.handle
            .try_lock_for(self.timeout)
            .map(|guard| guard.is_none())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn with_gives_mutable_access() {
        let lock = HandleLock::new(0u32, Duration::from_millis(100));
        lock.with("inc", |n| {
            *n += 1;
            Ok(())
        })
        .unwrap();
        let value = lock.with("read", |n| Ok(*n)).unwrap();
        assert_eq!(value, 1);
    }

    #[test]
    fn closed_handle_rejects_operations() {
        let lock = HandleLock::new(7u32, Duration::from_millis(100));
        assert_eq!(lock.take().unwrap(), Some(7));
        assert!(lock.is_closed());
        let err = lock.with("read", |n| Ok(*n)).unwrap_err();
        assert!(matches!(err, AdapterError::Closed));
        assert_eq!(lock.take().unwrap(), None);
    }

    #[test]
    fn contended_lock_times_out() {
        let lock = Arc::new(HandleLock::new((), Duration::from_millis(20)));
        let holder = Arc::clone(&lock);
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let t = thread::spawn(move || {
            holder
                .with("slow", |_| {
                    started_tx.send(()).unwrap();
                    thread::sleep(Duration::from_millis(200));
                    Ok(())
                })
                .unwrap();
        });
        started_rx.recv().unwrap();
        let err = lock.with("fast", |_| Ok(())).unwrap_err();
        assert!(matches!(err, AdapterError::Timeout { op: "fast", .. }));
        t.join().unwrap();
    }
}
