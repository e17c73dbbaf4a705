// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Drop-one-of-many wait queue.
//!
//! Mirrors uC++'s `uWaitQueue_ISM::drop()`: walk the queue registering a
//! shared one-shot winner latch (`DropClient`, uC++'s semaphore + test-and-
//! set + winner slot) on every entry, short-circuiting if an entry is
//! already available; otherwise block until some entry's `Notify` callback
//! wins the race, then unregister from every entry before returning the
//! winner.

use std::sync::{Arc, Condvar, Mutex};

use crate::future::{EsmServerCancel, EsmSelectee, FutureEsm};
use crate::notify::{Notify, Selectee};

struct DropState {
    /// Test-and-set word (uC++ `DropClient::tst`): the first entry to fire
    /// wins, every later signal is a no-op.
    won: bool,
    winner: Option<usize>,
}

/// One-shot winner latch shared by every entry registered during a single
/// `drop_one()` call.
struct DropClient {
    state: Mutex<DropState>,
    cond: Condvar,
}

impl DropClient {
    fn new() -> Arc<Self> {
        Arc::new(DropClient {
            state: Mutex::new(DropState {
                won: false,
                winner: None,
            }),
            cond: Condvar::new(),
        })
    }

    fn try_win(&self, index: usize) {
        let mut guard = self.state.lock().unwrap();
        if guard.won {
            return;
        }
        guard.won = true;
        guard.winner = Some(index);
        self.cond.notify_one();
    }

    fn wait_for_winner(&self) -> usize {
        let mut guard = self.state.lock().unwrap();
        while guard.winner.is_none() {
            guard = self.cond.wait(guard).unwrap();
        }
        guard.winner.unwrap()
    }
}

/// Forwards one entry's wake-up to the shared `DropClient`, tagged with
/// that entry's position at registration time.
struct EntryNotify {
    client: Arc<DropClient>,
    index: usize,
}

impl Notify for EntryNotify {
    fn signal(&self) {
        self.client.try_win(self.index);
    }
}

/// A queue of `Selectee`s any one of which may satisfy a waiting client
/// Generic over the entry type so a caller can queue
/// `FutureIsm<T>` handles, `Arc<Selector>` trees, or a mix behind
/// `Arc<dyn Selectee>` — whatever single type it settles on.
pub struct WaitQueueIsm<S: Selectee + Clone> {
    entries: Mutex<Vec<S>>,
}

impl<S: Selectee + Clone> WaitQueueIsm<S> {
    pub fn new() -> Self {
        WaitQueueIsm {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, selectee: S) {
        self.entries.lock().unwrap().push(selectee);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    fn remove_by_identity(&self, identity: usize) -> Option<S> {
        let mut guard = self.entries.lock().unwrap();
        let pos = guard.iter().position(|e| e.identity() == identity)?;
        Some(guard.remove(pos))
    }

    /// Blocks until some queued entry becomes available, then removes and
    /// returns it.
    ///
    /// Panics if the queue is empty — the ISM flavor has no client to wait
    /// on behalf of and uC++'s equivalent asserts non-empty; the ESM
    /// flavor (`WaitQueueEsm`) is the one with defined empty-queue
    /// behavior.
    pub fn drop_one(&self) -> S {
        let snapshot: Vec<S> = self.entries.lock().unwrap().clone();
        assert!(!snapshot.is_empty(), "drop_one() called on an empty wait queue");

        let client = DropClient::new();
        let mut registered: Vec<(S, Arc<dyn Notify>)> = Vec::with_capacity(snapshot.len());
        let mut immediate: Option<usize> = None;

        for (index, entry) in snapshot.iter().enumerate() {
            let wrapper: Arc<dyn Notify> = Arc::new(EntryNotify {
                client: client.clone(),
                index,
            });
            let already = entry.add_select(wrapper.clone());
            registered.push((entry.clone(), wrapper));
            if already {
                client.try_win(index);
                immediate = Some(index);
                break;
            }
        }

        let winner_index = if let Some(idx) = immediate {
            idx
        } else {
            client.wait_for_winner()
        };
        #[cfg(feature = "tracing")]
        tracing::trace!(winner_index, "wait queue drop(): winner selected");

        for (entry, wrapper) in &registered {
            entry.remove_select(wrapper);
        }

        let winner_identity = snapshot[winner_index].identity();
        self.remove_by_identity(winner_identity)
            .unwrap_or_else(|| snapshot[winner_index].clone())
    }
}

impl<S: Selectee + Clone> Default for WaitQueueIsm<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// ESM counterpart: identical drop-one algorithm over borrowed futures,
/// except an empty queue resolves to `None` rather than panicking — an
/// explicit, documented difference from uC++'s asymmetric commented-out
/// assertion.
pub struct WaitQueueEsm<'a, T, S: EsmServerCancel> {
    inner: WaitQueueIsm<EsmSelectee<'a, T, S>>,
}

impl<'a, T: Clone + Send + Sync, S: EsmServerCancel> WaitQueueEsm<'a, T, S> {
    pub fn new() -> Self {
        WaitQueueEsm {
            inner: WaitQueueIsm::new(),
        }
    }

    pub fn add(&self, future: &'a FutureEsm<T, S>) {
        self.inner.add(EsmSelectee::new(future));
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn drop_one(&self) -> Option<EsmSelectee<'a, T, S>> {
        if self.inner.is_empty() {
            return None;
        }
        Some(self.inner.drop_one())
    }
}

impl<'a, T: Clone + Send + Sync, S: EsmServerCancel> Default for WaitQueueEsm<'a, T, S> {
    fn default() -> Self {
        Self::new()
    }
}
