// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The three future flavors: the shared monitor core plus the
//! externally- and internally-storage-managed handles built on top of it.

mod base;
mod esm;
mod ism;

pub use esm::{EsmSelectee, FutureEsm, NoServerCancel as NoEsmServerCancel, ServerCancel as EsmServerCancel};
pub use ism::{FutureIsm, NoServerCancel as NoIsmServerCancel, ServerCancel as IsmServerCancel};
