// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Selector registration capability set.
//!
//! `Notify` is the Rust stand-in for uC++'s `BaseFutureDL` — a handle a
//! future's `selectClients` list holds and calls back into when the future
//! becomes available. `Selectee` is the explicit capability set
//! (`{available, addSelect, removeSelect, equals}`): anything a
//! `WaitQueue` or a composite `Selector` can register against. Futures
//! (`FutureIsm`, the ESM reference adapter) and `Selector` trees both
//! implement it, which is what lets a `Selector` nest arbitrarily deep.

use std::sync::Arc;

/// Callback invoked at most once per registration episode when a selectee
/// transitions to available. Implementors must tolerate being signaled
/// after they've already recorded a winner elsewhere — a selector handle
/// must tolerate being signaled after its own root has already been
/// satisfied by another leaf.
pub trait Notify: Send + Sync {
    fn signal(&self);
}

/// Anything that can be waited on: a leaf future or a composite selector
/// tree. Dyn-safe (no `Self`-by-value parameters) so a `Selector::Binary`
/// can hold two heterogeneous children behind `Arc<dyn Selectee>`.
pub trait Selectee: Send + Sync {
    /// Non-blocking readiness check; no mutex required.
    fn is_available(&self) -> bool;

    /// Register `target` for a one-shot notification. Returns `true`
    /// (without registering) if already available, mirroring
    /// `BaseFuture::addSelect`'s contract.
    fn add_select(&self, target: Arc<dyn Notify>) -> bool;

    /// Idempotent unregistration.
    fn remove_select(&self, target: &Arc<dyn Notify>);

    /// Referential identity, standing in for uC++'s pointer-equality
    /// `equals()`-equivalent.
    fn identity(&self) -> usize;
}
