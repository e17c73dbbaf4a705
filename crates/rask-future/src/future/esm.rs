// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Externally-storage-managed future: the caller owns the storage.
//!
//! The caller owns the storage (a `FutureEsm` lives on the caller's stack or
//! in a caller-owned struct) and passes it by reference to the server. The
//! distinguishing feature over the ISM flavor is `cancel()`'s client/server
//! rendezvous, which must call out to the server *without* holding the
//! future's monitor — otherwise a server simultaneously trying to `deliver`
//! would deadlock against the cancelling client.

use crate::error::{Cause, FutureError};
use crate::notify::{Notify, Selectee};

use super::base::{BaseFuture, EsmCancelCode};

use std::sync::Arc;

/// Capability the server wires into a `FutureEsm` to support synchronous
/// cancellation.
///
/// `cancel()` is called with no locks held and must return `true` only if
/// the server guarantees no further `deliver`/`exception` will occur for
/// this computation.
pub trait ServerCancel: Send + Sync {
    fn cancel(&self) -> bool;
}

/// Default `ServerData` for a `FutureEsm` whose producer offers no
/// synchronous cancel hook — every `cancel()` call falls through to
/// waiting for the eventual delivery-as-cancellation race.
#[derive(Default, Clone, Copy)]
pub struct NoServerCancel;

impl ServerCancel for NoServerCancel {
    fn cancel(&self) -> bool {
        false
    }
}

/// Caller-owned, single-assignment future with a client-driven cancel
/// protocol.
pub struct FutureEsm<T, S: ServerCancel = NoServerCancel> {
    base: BaseFuture<T>,
    /// Information needed by the server to cancel its computation.
    pub server_data: S,
}

impl<T: Clone, S: ServerCancel + Default> FutureEsm<T, S> {
    pub fn new() -> Self {
        FutureEsm {
            base: BaseFuture::new(),
            server_data: S::default(),
        }
    }
}

impl<T: Clone, S: ServerCancel + Default> Default for FutureEsm<T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone, S: ServerCancel> FutureEsm<T, S> {
    pub fn with_server_data(server_data: S) -> Self {
        FutureEsm {
            base: BaseFuture::new(),
            server_data,
        }
    }

    pub fn available(&self) -> bool {
        self.base.is_available()
    }

    pub fn cancelled(&self) -> bool {
        self.base.is_cancelled()
    }

    /// Blocking access.
    pub fn get(&self) -> Result<T, FutureError> {
        self.base.get()
    }

    /// Post-wait access.
    pub fn peek(&self) -> Result<T, FutureError> {
        self.base.peek()
    }

    /// `reset()` — legal only with no waiters and no registered selectors.
    pub fn reset(&self) {
        self.base.reset();
    }

    /// Make a value available. A racing cancel finalizes as cancelled
    /// instead.
    pub fn deliver(&self, value: T) -> bool {
        self.base.esm_deliver(value)
    }

    /// Install an exception.
    pub fn exception(&self, cause: Cause) -> bool {
        self.base.esm_exception(cause)
    }

    /// Client-initiated cancel.
    ///
    /// Contacts the server outside the future's monitor to avoid deadlock
    /// against a concurrent `deliver`.
    pub fn cancel(&self) {
        match self.base.esm_check_cancel() {
            EsmCancelCode::NoOp => {}
            EsmCancelCode::WaitForOther => self.base.esm_wait_if_in_progress(),
            EsmCancelCode::WeAreFirst => {
                if self.server_data.cancel() {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("esm cancel: client won the race");
                    self.base.esm_finalize_cancel_won();
                } else {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("esm cancel: server refused, waiting for delivery");
                    self.base.esm_wait_if_in_progress();
                }
            }
        }
    }
}

impl<T, S: ServerCancel> Drop for FutureEsm<T, S> {
    fn drop(&mut self) {
        self.base.assert_no_registered_selectors_on_drop();
    }
}

/// Borrowed adapter letting a `&FutureEsm` act as a `Selectee`: the ESM
/// wait queue wraps raw future pointers in a helper that forwards the
/// capability set.
pub struct EsmSelectee<'a, T, S: ServerCancel> {
    future: &'a FutureEsm<T, S>,
}

impl<'a, T, S: ServerCancel> EsmSelectee<'a, T, S> {
    pub fn new(future: &'a FutureEsm<T, S>) -> Self {
        EsmSelectee { future }
    }
}

impl<'a, T, S: ServerCancel> Clone for EsmSelectee<'a, T, S> {
    fn clone(&self) -> Self {
        EsmSelectee {
            future: self.future,
        }
    }
}

impl<'a, T: Clone + Send + Sync, S: ServerCancel> Selectee for EsmSelectee<'a, T, S> {
    fn is_available(&self) -> bool {
        self.future.available()
    }

    fn add_select(&self, target: Arc<dyn Notify>) -> bool {
        self.future.base.add_select(target)
    }

    fn remove_select(&self, target: &Arc<dyn Notify>) {
        self.future.base.remove_select(target)
    }

    fn identity(&self) -> usize {
        self.future as *const FutureEsm<T, S> as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    struct AlwaysCancels;
    impl ServerCancel for AlwaysCancels {
        fn cancel(&self) -> bool {
            true
        }
    }

    struct NeverCancelsSynchronously {
        delivered: Arc<AtomicBool>,
    }
    impl ServerCancel for NeverCancelsSynchronously {
        fn cancel(&self) -> bool {
            false
        }
    }

    #[test]
    fn cancel_before_delivery_wins() {
        let f: FutureEsm<i32, AlwaysCancels> = FutureEsm::with_server_data(AlwaysCancels);
        f.cancel();
        assert!(f.cancelled());
        assert!(matches!(f.get(), Err(FutureError::Cancelled)));
        // A late delivery attempt is simply ignored.
        assert!(!f.deliver(7));
    }

    #[test]
    fn delivery_before_cancel_wins() {
        let f: FutureEsm<i32> = FutureEsm::new();
        assert!(f.deliver(7));
        f.cancel(); // no-op: already available
        assert_eq!(f.get().unwrap(), 7);
    }

    #[test]
    fn cancel_races_delivery_server_loses() {
        // Server reports it could not synchronously stop the computation
        // (`cancel()` returns false), then delivers anyway while the
        // client's cancelInProgress window is open: the delivery must be
        // reinterpreted as cancellation.
        let delivered = Arc::new(AtomicBool::new(false));
        let f = Arc::new(FutureEsm::with_server_data(NeverCancelsSynchronously {
            delivered: delivered.clone(),
        }));

        // Force the "first canceller" path manually via the protocol.
        let f2 = f.clone();
        let server_thread = thread::spawn(move || {
            // Give the cancel() call time to set cancel_in_progress.
            thread::sleep(std::time::Duration::from_millis(10));
            f2.deliver(123);
        });
        f.cancel();
        server_thread.join().unwrap();
        assert!(f.cancelled());
        assert!(matches!(f.get(), Err(FutureError::Cancelled)));
    }

    #[test]
    fn second_canceller_waits_for_first() {
        let f = Arc::new(FutureEsm::<i32, AlwaysCancels>::with_server_data(
            AlwaysCancels,
        ));
        let f2 = f.clone();
        let racer = thread::spawn(move || {
            f2.cancel();
        });
        f.cancel();
        racer.join().unwrap();
        assert!(f.cancelled());
    }
}
