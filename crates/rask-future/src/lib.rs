// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Concurrent futures with compositional AND/OR selection and a worker-pool
//! executor, distilled from uC++'s `uFuture.h`/`uExecutor.h` monitor
//! pattern into Rust's `Mutex`/`Condvar` primitives.
//!
//! Phase A (this crate today): every blocking wait is an OS thread parked
//! on a `Condvar`, and the executor is a fixed pool of dedicated OS
//! threads. Phase B would swap both for `rask-rt`'s green-task scheduler
//! without changing any type in this crate's public surface — callers
//! `get()`/`send()` the same way either phase.
//!
//! Three future flavors build on one shared monitor core
//! ([`future::FutureEsm`], [`future::FutureIsm`]); [`selector`] composes any
//! number of them into an AND/OR wait tree; [`wait_queue`] implements the
//! underlying drop-one-of-many primitive both selection and direct
//! multi-future waits are built from; [`executor`] runs work against a
//! fixed worker pool and hands back an [`future::FutureIsm`] for the
//! result.

pub mod error;
pub mod executor;
pub mod future;
pub mod notify;
pub mod selector;
pub mod wait_queue;

pub use error::{Cause, FutureError};
pub use executor::{Cluster, Executor};
pub use future::{EsmServerCancel, FutureEsm, FutureIsm, IsmServerCancel, NoEsmServerCancel, NoIsmServerCancel};
pub use notify::{Notify, Selectee};
pub use selector::{select_all, select_any, Selector};
pub use wait_queue::{WaitQueueEsm, WaitQueueIsm};
