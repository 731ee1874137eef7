//! # Client Lifecycle
//!
//! Purpose: Make disposal a one-way transition. Calls are admitted only while
//! the client is open; `close` stops admission, waits for admitted calls to
//! finish, then runs the release step exactly once. Every `close` caller
//! returns only after that release has run.
//!
//! ## Ordering
//! A call increments the in-flight count before reading the closed flag, and
//! `close` sets the flag before reading the count. With sequentially
//! consistent operations on both sides, either the call sees the flag and
//! backs out, or `close` sees the call and waits for it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    closed: AtomicBool,
    in_flight: AtomicUsize,
    drained: Notify,
    released: Mutex<bool>,
}

/// Admission ticket for one call; releases its slot on drop.
pub(crate) struct CallGuard<'a> {
    lifecycle: &'a Lifecycle,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.lifecycle.leave();
    }
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Admits a call, or returns `None` once the client is closed.
    pub(crate) fn enter(&self) -> Option<CallGuard<'_>> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            self.leave();
            return None;
        }
        Some(CallGuard { lifecycle: self })
    }

    fn leave(&self) {
        let previous = self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 && self.closed.load(Ordering::SeqCst) {
            self.drained.notify_waiters();
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Closes admission, waits for admitted calls to drain, then runs
    /// `release` unless an earlier caller already has.
    ///
    /// Returns `true` only for the caller whose `release` ran.
    pub(crate) async fn close(&self, release: impl FnOnce()) -> bool {
        self.closed.store(true, Ordering::SeqCst);
        self.drain().await;

        let mut released = self.released.lock();
        if *released {
            return false;
        }
        release();
        *released = true;
        true
    }

    async fn drain(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            // Register before checking so a wakeup between the check and the
            // await is not lost.
            notified.as_mut().enable();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::oneshot;

    #[tokio::test]
    async fn close_transitions_once() {
        let lifecycle = Lifecycle::new();
        let releases = AtomicUsize::new(0);
        let release = || {
            releases.fetch_add(1, Ordering::SeqCst);
        };
        assert!(lifecycle.close(release).await);
        assert!(!lifecycle.close(release).await);
        assert!(lifecycle.is_closed());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn calls_after_close_are_rejected() {
        let lifecycle = Lifecycle::new();
        lifecycle.close(|| ()).await;
        assert!(lifecycle.enter().is_none());
        assert_eq!(lifecycle.in_flight(), 0);
    }

    #[tokio::test]
    async fn close_waits_for_admitted_calls() {
        let lifecycle = Arc::new(Lifecycle::new());
        let (admitted_tx, admitted_rx) = oneshot::channel();

        let worker = lifecycle.clone();
        let call = tokio::spawn(async move {
            let guard = worker.enter().unwrap();
            admitted_tx.send(()).unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
            drop(guard);
        });

        admitted_rx.await.unwrap();
        assert_eq!(lifecycle.in_flight(), 1);
        assert!(lifecycle.close(|| ()).await);
        assert_eq!(lifecycle.in_flight(), 0);
        call.await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_closers_return_after_release() {
        let lifecycle = Arc::new(Lifecycle::new());
        let releases = Arc::new(AtomicUsize::new(0));
        let guard = lifecycle.enter().unwrap();

        let closers: Vec<_> = (0..2)
            .map(|_| {
                let lifecycle = lifecycle.clone();
                let releases = releases.clone();
                tokio::spawn(async move {
                    let ran = lifecycle
                        .close(|| {
                            releases.fetch_add(1, Ordering::SeqCst);
                        })
                        .await;
                    (ran, releases.load(Ordering::SeqCst))
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(closers.iter().all(|closer| !closer.is_finished()));
        drop(guard);

        let mut ran = 0;
        for closer in closers {
            let (did_release, seen) = closer.await.unwrap();
            ran += usize::from(did_release);
            assert_eq!(seen, 1);
        }
        assert_eq!(ran, 1);
    }

    #[tokio::test]
    async fn guard_drop_releases_slot() {
        let lifecycle = Lifecycle::new();
        {
            let _first = lifecycle.enter().unwrap();
            let _second = lifecycle.enter().unwrap();
            assert_eq!(lifecycle.in_flight(), 2);
        }
        assert_eq!(lifecycle.in_flight(), 0);
    }
}
