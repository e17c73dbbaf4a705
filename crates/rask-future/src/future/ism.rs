// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Internally-storage-managed future: storage is shared via refcounting.
//!
//! Storage lives behind an `Arc`, so any number of client handles and the
//! server can hold a copy; the last drop reclaims the monitor. There is no
//! client/server cancel rendezvous here — `cancel()` is fire-and-forget from
//! the client's perspective and the server learns about it (if at all) only
//! by checking `is_cancelled()` itself, via the optional `ServerCancel`
//! callback.

use std::sync::Arc;

use crate::error::{Cause, FutureError};
use crate::notify::{Notify, Selectee};

use super::base::BaseFuture;

/// Capability the server wires in to be told about a client-side cancel —
/// a virtual callback, unlike ESM's synchronous rendezvous: this one is
/// advisory, the server is not blocked for it and its return value is
/// ignored.
pub trait ServerCancel: Send + Sync {
    fn on_cancel(&self);
}

/// Default `ServerData` for an ISM future whose producer does not care to
/// hear about cancellation.
#[derive(Default, Clone, Copy)]
pub struct NoServerCancel;

impl ServerCancel for NoServerCancel {
    fn on_cancel(&self) {}
}

struct Shared<T, S: ServerCancel> {
    base: BaseFuture<T>,
    server_data: S,
}

/// Ref-counted future handle. Cloning an `FutureIsm` shares the same
/// underlying storage, mirroring uC++'s `Future_ISM::Impl` monitor plus
/// handle-level `refCnt`.
pub struct FutureIsm<T, S: ServerCancel = NoServerCancel> {
    shared: Arc<Shared<T, S>>,
}

impl<T, S: ServerCancel> Clone for FutureIsm<T, S> {
    fn clone(&self) -> Self {
        FutureIsm {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone, S: ServerCancel + Default> FutureIsm<T, S> {
    pub fn new() -> Self {
        FutureIsm {
            shared: Arc::new(Shared {
                base: BaseFuture::new(),
                server_data: S::default(),
            }),
        }
    }
}

impl<T: Clone, S: ServerCancel + Default> Default for FutureIsm<T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone, S: ServerCancel> FutureIsm<T, S> {
    pub fn with_server_data(server_data: S) -> Self {
        FutureIsm {
            shared: Arc::new(Shared {
                base: BaseFuture::new(),
                server_data,
            }),
        }
    }

    pub fn available(&self) -> bool {
        self.shared.base.is_available()
    }

    pub fn cancelled(&self) -> bool {
        self.shared.base.is_cancelled()
    }

    /// Two handles refer to the same storage iff they share the same `Arc`
    /// allocation.
    pub fn equals(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn get(&self) -> Result<T, FutureError> {
        self.shared.base.get()
    }

    pub fn peek(&self) -> Result<T, FutureError> {
        self.shared.base.peek()
    }

    pub fn reset(&self) {
        self.shared.base.reset();
    }

    pub fn deliver(&self, value: T) -> bool {
        self.shared.base.deliver(value)
    }

    pub fn exception(&self, cause: Cause) -> bool {
        self.shared.base.exception(cause)
    }

    /// Fire-and-forget cancel: finalizes the future as cancelled (unless
    /// already resolved) and advises the server, but does not wait for any
    /// acknowledgement.
    ///
    /// The check-then-act used to be two separate lock acquisitions
    /// (`is_available()` then `finalize_cancelled()`), which left a window
    /// for a concurrent `deliver`/`exception` to land in between and get
    /// silently overwritten with `Cancelled`. `finalize_cancelled()` now
    /// does the check-and-set atomically under one lock, the same way
    /// `deliver`/`exception` already do, and `cancel()` just relies on its
    /// return value.
    pub fn cancel(&self) -> bool {
        if !self.shared.base.finalize_cancelled() {
            return false;
        }
        self.shared.server_data.on_cancel();
        true
    }
}

/// Lets an `FutureIsm` register directly in a `WaitQueueIsm` or a
/// `Selector` tree without a borrowed adapter, since its storage is already
/// heap-shared.
impl<T: Clone + Send + Sync, S: ServerCancel> Selectee for FutureIsm<T, S> {
    fn is_available(&self) -> bool {
        self.available()
    }

    fn add_select(&self, target: Arc<dyn Notify>) -> bool {
        self.shared.base.add_select(target)
    }

    fn remove_select(&self, target: &Arc<dyn Notify>) {
        self.shared.base.remove_select(target)
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.shared) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn shared_storage_across_clones() {
        let a: FutureIsm<i32> = FutureIsm::new();
        let b = a.clone();
        assert!(a.equals(&b));
        assert!(b.deliver(5));
        assert_eq!(a.get().unwrap(), 5);
    }

    #[test]
    fn distinct_futures_not_equal() {
        let a: FutureIsm<i32> = FutureIsm::new();
        let b: FutureIsm<i32> = FutureIsm::new();
        assert!(!a.equals(&b));
    }

    #[test]
    fn cancel_advises_server_once() {
        struct Counter(Arc<AtomicBool>);
        impl ServerCancel for Counter {
            fn on_cancel(&self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }
        let notified = Arc::new(AtomicBool::new(false));
        let f: FutureIsm<i32, Counter> =
            FutureIsm::with_server_data(Counter(notified.clone()));
        assert!(f.cancel());
        assert!(notified.load(Ordering::SeqCst));
        assert!(matches!(f.get(), Err(FutureError::Cancelled)));
        // Cancelling an already-resolved future is a no-op.
        let f2: FutureIsm<i32> = FutureIsm::new();
        f2.deliver(1);
        assert!(!f2.cancel());
        assert_eq!(f2.get().unwrap(), 1);
    }

    #[test]
    fn concurrent_cancel_and_deliver_never_clobber_each_other() {
        // Whichever of `cancel()`/`deliver()` wins the race, the other must
        // observe its own call taking no effect, and every subsequent
        // access must see a single, stable outcome.
        for _ in 0..200 {
            let f: FutureIsm<i32> = FutureIsm::new();
            let f2 = f.clone();
            let canceller = thread::spawn(move || f2.cancel());
            let delivered = f.deliver(7);
            let cancelled = canceller.join().unwrap();

            assert_ne!(delivered, cancelled, "exactly one of them must win");
            match f.get() {
                Ok(v) => {
                    assert!(delivered);
                    assert_eq!(v, 7);
                }
                Err(FutureError::Cancelled) => assert!(cancelled),
                Err(other) => panic!("unexpected outcome: {other:?}"),
            }
            // Repeated access agrees with the first.
            assert_eq!(f.get().is_ok(), delivered);
        }
    }

    #[test]
    fn outlives_all_client_handles_until_last_drop() {
        let f: FutureIsm<i32> = FutureIsm::new();
        let producer = {
            let f = f.clone();
            thread::spawn(move || {
                thread::sleep(std::time::Duration::from_millis(5));
                f.deliver(10);
            })
        };
        drop(f.clone());
        assert_eq!(f.get().unwrap(), 10);
        producer.join().unwrap();
    }
}
