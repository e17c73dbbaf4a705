// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Single-assignment result cell shared by the ESM and ISM future flavors.
//!
//! Phase A: a `std::sync::Mutex` + `std::sync::Condvar` monitor, same shape
//! as `rask-rt::green::scheduler`'s `SharedState` condvar pairs. `available`
//! is additionally mirrored in an `AtomicBool` so `is_available()` can be
//! read without taking the monitor lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::error::{Cause, FutureError};
use crate::notify::Notify;

enum Payload<T> {
    Pending,
    Value(T),
    Exception(Cause),
    Cancelled,
}

struct Monitor<T> {
    payload: Payload<T>,
    select_clients: Vec<Arc<dyn Notify>>,
    /// Only meaningful for the ESM flavor. Lives in the same monitor as
    /// `payload` so the ESM cancel race and a concurrent `deliver`/
    /// `exception` are mutually exclusive, exactly as uC++'s `Future_ESM`
    /// and `uBaseFuture` share one monitor via inheritance.
    cancel_in_progress: bool,
    /// Count of threads currently parked on `delay`. `reset()` must refuse
    /// to run while this is nonzero: flipping the payload back to `Pending`
    /// underneath a blocked `get()` would leave it waiting on a condition
    /// nothing will ever signal for its original call.
    waiters: usize,
}

/// Result of `BaseFuture::esm_check_cancel`.
pub(crate) enum EsmCancelCode {
    /// Already available or already cancelled — nothing to do.
    NoOp,
    /// Another thread is already cancelling; wait for it to finish.
    WaitForOther,
    /// We are the first canceller; contact the server.
    WeAreFirst,
}

/// The monitor-protected core every future flavor embeds.
pub(crate) struct BaseFuture<T> {
    monitor: Mutex<Monitor<T>>,
    delay: Condvar,
    available: AtomicBool,
}

impl<T: Clone> BaseFuture<T> {
    pub(crate) fn new() -> Self {
        BaseFuture {
            monitor: Mutex::new(Monitor {
                payload: Payload::Pending,
                select_clients: Vec::new(),
                cancel_in_progress: false,
                waiters: 0,
            }),
            delay: Condvar::new(),
            available: AtomicBool::new(false),
        }
    }

    /// Lock-free readiness check; safe because `available` only ever
    /// transitions false -> true (except across a `reset()`, which requires
    /// no concurrent access in flight).
    pub(crate) fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        if !self.is_available() {
            return false;
        }
        matches!(self.monitor.lock().unwrap().payload, Payload::Cancelled)
    }

    /// Blocks on `delay` until available, then resolves.
    pub(crate) fn get(&self) -> Result<T, FutureError> {
        let mut guard = self.monitor.lock().unwrap();
        if matches!(guard.payload, Payload::Pending) {
            guard.waiters += 1;
            while matches!(guard.payload, Payload::Pending) {
                guard = self.delay.wait(guard).unwrap();
            }
            guard.waiters -= 1;
        }
        Self::resolve(&guard.payload)
    }

    /// Post-wait access; debug-asserts the future is already available —
    /// calling this before a prior blocking access observed delivery is a
    /// programmer error, not a recoverable condition.
    pub(crate) fn peek(&self) -> Result<T, FutureError> {
        let guard = self.monitor.lock().unwrap();
        debug_assert!(
            !matches!(guard.payload, Payload::Pending),
            "peek() called before a blocking access made the future available"
        );
        Self::resolve(&guard.payload)
    }

    fn resolve(payload: &Payload<T>) -> Result<T, FutureError> {
        match payload {
            Payload::Pending => unreachable!("resolve() called on a pending future"),
            Payload::Value(v) => Ok(v.clone()),
            Payload::Exception(cause) => Err(FutureError::Exception(cause.clone())),
            Payload::Cancelled => Err(FutureError::Cancelled),
        }
    }

    /// Publishes a value. Returns `false` (discarding the value) if the
    /// future is already available or cancelled.
    pub(crate) fn deliver(&self, value: T) -> bool {
        let mut guard = self.monitor.lock().unwrap();
        if !matches!(guard.payload, Payload::Pending) {
            return false;
        }
        guard.payload = Payload::Value(value);
        self.makeavailable(&mut guard);
        true
    }

    /// Installs an exception; ownership of `cause` transfers in. Symmetric
    /// to `deliver`.
    pub(crate) fn exception(&self, cause: Cause) -> bool {
        let mut guard = self.monitor.lock().unwrap();
        if !matches!(guard.payload, Payload::Pending) {
            return false;
        }
        guard.payload = Payload::Exception(cause);
        self.makeavailable(&mut guard);
        true
    }

    /// Used by ISM's `cancel()`: finalize the payload as `Cancelled` the
    /// same check-and-set way `deliver`/`exception` do, so a cancel racing a
    /// concurrent `deliver`/`exception` can't silently clobber whichever one
    /// already won. Returns `false` without mutating anything if the
    /// payload is no longer `Pending`.
    pub(crate) fn finalize_cancelled(&self) -> bool {
        let mut guard = self.monitor.lock().unwrap();
        if !matches!(guard.payload, Payload::Pending) {
            return false;
        }
        guard.payload = Payload::Cancelled;
        self.makeavailable(&mut guard);
        true
    }

    /// Legal only with no blocked waiters and no registered selectors —
    /// resetting out from under either would leave a thread waiting on a
    /// condition nothing will signal, or a selector holding a dangling
    /// registration.
    pub(crate) fn reset(&self) {
        let mut guard = self.monitor.lock().unwrap();
        assert!(
            guard.select_clients.is_empty(),
            "reset() called on a future with registered selectors"
        );
        assert!(
            guard.waiters == 0,
            "reset() called on a future with a blocked get() waiter"
        );
        guard.payload = Payload::Pending;
        self.available.store(false, Ordering::Release);
    }

    /// Registers `target` for one-shot notification. Returns `true` (without
    /// registering) if already available.
    pub(crate) fn add_select(&self, target: Arc<dyn Notify>) -> bool {
        let mut guard = self.monitor.lock().unwrap();
        if !matches!(guard.payload, Payload::Pending) {
            return true;
        }
        guard.select_clients.push(target);
        false
    }

    /// Idempotent unlink by referential identity.
    pub(crate) fn remove_select(&self, target: &Arc<dyn Notify>) {
        let mut guard = self.monitor.lock().unwrap();
        guard
            .select_clients
            .retain(|h| !Arc::ptr_eq(h, target));
    }

    /// Blocks until available without resolving a value — the wait step of
    /// the ESM cancel protocol once a canceller has to wait for an eventual
    /// delivery-as-cancellation.
    pub(crate) fn wait_until_available(&self) {
        let mut guard = self.monitor.lock().unwrap();
        if matches!(guard.payload, Payload::Pending) {
            guard.waiters += 1;
            while matches!(guard.payload, Payload::Pending) {
                guard = self.delay.wait(guard).unwrap();
            }
            guard.waiters -= 1;
        }
    }

    /// Computes the cancel code and, if we are the first canceller, marks
    /// `cancel_in_progress` atomically with the check.
    pub(crate) fn esm_check_cancel(&self) -> EsmCancelCode {
        let mut guard = self.monitor.lock().unwrap();
        if !matches!(guard.payload, Payload::Pending) {
            return EsmCancelCode::NoOp;
        }
        if guard.cancel_in_progress {
            return EsmCancelCode::WaitForOther;
        }
        guard.cancel_in_progress = true;
        EsmCancelCode::WeAreFirst
    }

    /// Re-checks under the monitor before waiting, since the server may
    /// have delivered between the caller's check and now.
    pub(crate) fn esm_wait_if_in_progress(&self) {
        let mut guard = self.monitor.lock().unwrap();
        if guard.cancel_in_progress {
            guard.waiters += 1;
            while matches!(guard.payload, Payload::Pending) {
                guard = self.delay.wait(guard).unwrap();
            }
            guard.waiters -= 1;
        }
    }

    /// The server's synchronous cancel capability confirmed the computation
    /// is cancelled — finalize. Only ever called by the one thread holding
    /// `cancel_in_progress`, so no check-and-set race against a concurrent
    /// `deliver`/`exception` is possible here: those overrides see
    /// `cancel_in_progress` set and defer to it instead of racing it.
    pub(crate) fn esm_finalize_cancel_won(&self) {
        let mut guard = self.monitor.lock().unwrap();
        guard.cancel_in_progress = false;
        guard.payload = Payload::Cancelled;
        self.makeavailable(&mut guard);
    }

    /// ESM `deliver` override: if a cancel is racing us, the server lost —
    /// finalize as cancelled instead of delivering.
    pub(crate) fn esm_deliver(&self, value: T) -> bool {
        let mut guard = self.monitor.lock().unwrap();
        if guard.cancel_in_progress {
            guard.cancel_in_progress = false;
            guard.payload = Payload::Cancelled;
            self.makeavailable(&mut guard);
            return true;
        }
        if !matches!(guard.payload, Payload::Pending) {
            return false;
        }
        guard.payload = Payload::Value(value);
        self.makeavailable(&mut guard);
        true
    }

    /// ESM `exception` override — symmetric to `esm_deliver`.
    pub(crate) fn esm_exception(&self, cause: Cause) -> bool {
        let mut guard = self.monitor.lock().unwrap();
        if guard.cancel_in_progress {
            guard.cancel_in_progress = false;
            guard.payload = Payload::Cancelled;
            self.makeavailable(&mut guard);
            return true;
        }
        if !matches!(guard.payload, Payload::Pending) {
            return false;
        }
        guard.payload = Payload::Exception(cause);
        self.makeavailable(&mut guard);
        true
    }

    /// Drop-time check: a dropped ESM future must not leave dangling
    /// selector registrations. Blocked waiters are already impossible here —
    /// Rust's borrow checker can't let a thread hold `&FutureEsm` past its
    /// own drop.
    pub(crate) fn assert_no_registered_selectors_on_drop(&self) {
        let guard = self.monitor.lock().unwrap();
        assert!(
            guard.select_clients.is_empty(),
            "FutureEsm dropped with selectors still registered"
        );
    }

    /// Sets `available`, broadcasts `delay`, then signals every registered
    /// selector handle. Order of selector signaling is irrelevant — each
    /// handle self-elects at most one winner.
    fn makeavailable(&self, guard: &mut Monitor<T>) {
        self.available.store(true, Ordering::Release);
        self.delay.notify_all();
        for client in guard.select_clients.drain(..) {
            client.signal();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deliver_then_get() {
        let f: BaseFuture<i32> = BaseFuture::new();
        assert!(f.deliver(42));
        assert_eq!(f.get().unwrap(), 42);
        // Second access doesn't block and returns the same value.
        assert_eq!(f.get().unwrap(), 42);
    }

    #[test]
    fn double_deliver_loses() {
        let f: BaseFuture<i32> = BaseFuture::new();
        assert!(f.deliver(1));
        assert!(!f.deliver(2));
        assert_eq!(f.get().unwrap(), 1);
    }

    #[test]
    fn exception_reraised_on_every_access() {
        #[derive(Debug, thiserror::Error, Clone)]
        #[error("boom")]
        struct Boom;

        let f: BaseFuture<i32> = BaseFuture::new();
        assert!(f.exception(Cause::new(Boom)));
        assert!(matches!(f.get(), Err(FutureError::Exception(_))));
        assert!(matches!(f.get(), Err(FutureError::Exception(_))));
        assert!(!f.deliver(7));
    }

    #[test]
    fn reset_allows_reuse() {
        let f: BaseFuture<i32> = BaseFuture::new();
        f.deliver(1);
        f.get().unwrap();
        f.reset();
        assert!(!f.is_available());
        f.deliver(2);
        assert_eq!(f.get().unwrap(), 2);
    }

    #[test]
    #[should_panic(expected = "registered selectors")]
    fn reset_with_registered_selector_panics() {
        struct Dummy;
        impl Notify for Dummy {
            fn signal(&self) {}
        }
        let f: BaseFuture<i32> = BaseFuture::new();
        let handle: Arc<dyn Notify> = Arc::new(Dummy);
        assert!(!f.add_select(handle));
        f.reset();
    }

    #[test]
    fn finalize_cancelled_loses_to_a_prior_deliver() {
        // A cancel racing a delivery that already landed must not clobber
        // the delivered value.
        let f: BaseFuture<i32> = BaseFuture::new();
        assert!(f.deliver(5));
        assert!(!f.finalize_cancelled());
        assert_eq!(f.get().unwrap(), 5);
    }

    #[test]
    #[should_panic(expected = "blocked get() waiter")]
    fn reset_with_blocked_waiter_panics() {
        use std::thread;
        use std::time::Duration;

        let f = Arc::new(BaseFuture::<i32>::new());
        {
            let f = f.clone();
            thread::spawn(move || {
                let _ = f.get();
            });
        }
        // Give the waiter time to park on `delay` before resetting. The
        // waiter thread is left blocked forever on a panic below, which is
        // fine: the test process exits without waiting on it.
        thread::sleep(Duration::from_millis(20));
        f.reset();
    }

    #[test]
    fn concurrent_producer_consumer() {
        use std::thread;
        let f = Arc::new(BaseFuture::<i32>::new());
        let producer = {
            let f = f.clone();
            thread::spawn(move || {
                thread::sleep(std::time::Duration::from_millis(10));
                f.deliver(99);
            })
        };
        assert_eq!(f.get().unwrap(), 99);
        producer.join().unwrap();
    }
}
