// Copyright 2024 Datastore Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The public per-preference handle: `get`, `get_blocking`, `set`,
//! `set_blocking`, `update`, `delete`, `reset_to_default`, `as_flow`,
//! `state_in`.

use std::sync::Arc;

use futures_core::Stream;
use tokio::runtime::Handle as RuntimeHandle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::accessor::Accessor;
use crate::backend::Backend;
use crate::error::{DatastoreError, Result};
use crate::stream::HandleStream;
use crate::store::SnapshotStore;

/// A typed preference handle: a `(key, default, codec)` triple bound to
/// one `Accessor`, dispatched through the datastore's background I/O
/// context.
pub struct Handle<B: Backend, A: Accessor<B>> {
	store: Arc<SnapshotStore<B>>,
	dispatcher: RuntimeHandle,
	accessor: Arc<A>,
}

impl<B: Backend, A: Accessor<B>> Handle<B, A> {
	pub(crate) fn new(store: Arc<SnapshotStore<B>>, dispatcher: RuntimeHandle, accessor: A) -> Result<Self> {
		if accessor.key().trim().is_empty() {
			return Err(DatastoreError::InvalidArgument("handle key must not be blank".to_owned()));
		}
		Ok(Self { store, dispatcher, accessor: Arc::new(accessor) })
	}

	/// The handle's own key, mostly useful for diagnostics and the batch
	/// engine's not-supported error messages.
	pub fn key(&self) -> &str {
		self.accessor.key()
	}

	/// The underlying accessor, for use with the batch engine's scopes,
	/// which take `&A` directly rather than `&Handle`.
	pub fn accessor(&self) -> &A {
		&self.accessor
	}

	/// Read the current value. A snapshot read never touches durable
	/// storage (the backend only does I/O in `load`/`commit`), so this
	/// never actually suspends; it stays `async` to keep the handle's
	/// operations uniform with `set`/`update`/`delete`, which do.
	pub async fn get(&self) -> A::Value {
		self.accessor.read(&self.store.current())
	}

	/// Blocking counterpart of [`Handle::get`].
	pub fn get_blocking(&self) -> A::Value {
		self.accessor.read(&self.store.current())
	}

	/// Write a new value, committing a one-handle transaction.
	pub async fn set(&self, value: A::Value) -> Result<()> {
		let accessor = Arc::clone(&self.accessor);
		self.store.commit(move |txn| accessor.write(txn, value)).await
	}

	pub fn set_blocking(&self, value: A::Value) -> Result<()> {
		self.dispatcher.block_on(self.set(value))
	}

	/// Read-modify-write in a single commit: `f` receives the
	/// read-your-writes transactional value.
	pub async fn update(&self, f: impl FnOnce(A::Value) -> A::Value + Send) -> Result<()> {
		let accessor = Arc::clone(&self.accessor);
		self.store
			.commit(move |txn| {
				let current = accessor.read_txn(txn);
				accessor.write(txn, f(current))
			})
			.await
	}

	pub async fn delete(&self) -> Result<()> {
		let accessor = Arc::clone(&self.accessor);
		self.store.commit(move |txn| accessor.remove(txn)).await
	}

	pub async fn reset_to_default(&self) -> Result<()> {
		self.delete().await
	}

	/// Lazy reactive sequence of this handle's value, one item per snapshot
	/// transition, always starting with the current value.
	pub fn as_flow(&self) -> HandleStream<B, A> {
		HandleStream::new(self.store.observe(), Arc::clone(&self.accessor))
	}

	/// Hot variant of [`Handle::as_flow`]: spawns a task on the dispatcher
	/// that forwards the flow into a `watch` channel, so
	/// [`StateHandle::current`] is available synchronously without polling a
	/// future. The spawned task is aborted when the returned handle is
	/// dropped.
	pub fn state_in(&self) -> StateHandle<A::Value> {
		let mut upstream = self.as_flow();
		let initial = self.accessor.read(&self.store.current());
		let (sender, receiver) = watch::channel(initial);
		let task = self.dispatcher.spawn(async move {
			use std::future::poll_fn;
			while let Some(value) = poll_fn(|cx| std::pin::Pin::new(&mut upstream).poll_next(cx)).await {
				if sender.send(value).is_err() {
					break;
				}
			}
		});
		StateHandle { receiver, task }
	}
}

impl<B: Backend, A: Accessor<B>> Clone for Handle<B, A> {
	fn clone(&self) -> Self {
		Self { store: Arc::clone(&self.store), dispatcher: self.dispatcher.clone(), accessor: Arc::clone(&self.accessor) }
	}
}

/// A hot reactive sequence with an always-available current value
/// (`state_in`).
pub struct StateHandle<T> {
	receiver: watch::Receiver<T>,
	task: JoinHandle<()>,
}

impl<T: Clone> StateHandle<T> {
	/// The latest value observed, available synchronously.
	pub fn current(&self) -> T {
		self.receiver.borrow().clone()
	}
}

impl<T> Drop for StateHandle<T> {
	fn drop(&mut self) {
		self.task.abort();
	}
}
