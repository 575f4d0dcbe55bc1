// Copyright 2024 Datastore Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The storage backend contract.
//!
//! A `Backend` owns durable persistence for exactly one logical store (a
//! flat cell map, or a single opaque document). `SnapshotStore` wraps a
//! `Backend` with a single-writer, many-reader concurrency model.

use crate::error::Result;
use async_trait::async_trait;

/// A pluggable storage backend.
///
/// Implementations own durability. `SnapshotStore` owns concurrency: it
/// never calls `commit` concurrently with itself, so backend authors do not
/// need to guard against concurrent commits, only concurrent reads against
/// whatever `Snapshot` they hand out (which must be safe to read from any
/// number of threads, since `Snapshot: Send + Sync`).
#[async_trait]
pub trait Backend: Send + Sync + 'static {
	/// An immutable, cheaply-cloneable point-in-time view of all state.
	type Snapshot: Send + Sync + 'static;

	/// A mutable draft created from a `Snapshot`, scoped to one batch.
	type Transaction: Send + 'static;

	/// Load the current state from durable storage. A backend MUST NOT
	/// propagate corruption at load time: it returns an empty/default
	/// snapshot instead.
	async fn load(&self) -> Result<Self::Snapshot>;

	/// Begin a mutable draft from the given snapshot. Pure, infallible,
	/// in-memory only — no I/O.
	fn begin(&self, current: &Self::Snapshot) -> Self::Transaction;

	/// Durably persist `transaction` and return the snapshot that
	/// supersedes `current`. On failure, the backend's on-disk state MUST be
	/// unchanged.
	async fn commit(&self, transaction: Self::Transaction) -> Result<Self::Snapshot>;
}
