// Copyright 2024 Datastore Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Lazy, restartable reactive sequences over the snapshot store.
//!
//! Hand-rolled `Stream` implementations, in the style of `kvdb-async`
//! (which returns `Pin<Box<dyn Stream<...>>>` from a handwritten `impl`
//! rather than composing `futures` combinators).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;

use crate::accessor::Accessor;
use crate::backend::Backend;

/// An infinite stream of snapshots. A freshly-created `SnapshotStream`
/// always yields the store's current snapshot as its first item, then one
/// item per subsequent commit.
pub struct SnapshotStream<B: Backend> {
	receiver: watch::Receiver<Arc<B::Snapshot>>,
	primed: bool,
}

impl<B: Backend> SnapshotStream<B> {
	pub(crate) fn new(receiver: watch::Receiver<Arc<B::Snapshot>>) -> Self {
		Self { receiver, primed: false }
	}
}

impl<B: Backend> Stream for SnapshotStream<B> {
	type Item = Arc<B::Snapshot>;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		if !self.primed {
			self.primed = true;
			let current = self.receiver.borrow().clone();
			return Poll::Ready(Some(current));
		}

		let poll_result = {
			let changed = self.receiver.changed();
			tokio::pin!(changed);
			changed.poll(cx)
		};
		match poll_result {
			Poll::Ready(Ok(())) => Poll::Ready(Some(self.receiver.borrow_and_update().clone())),
			// The store (and its `watch::Sender`) was dropped; the sequence ends.
			Poll::Ready(Err(_)) => Poll::Ready(None),
			Poll::Pending => Poll::Pending,
		}
	}
}

/// `SnapshotStream` projected through one handle's accessor: the reactive
/// sequence of a single preference's current value.
pub struct HandleStream<B: Backend, A: Accessor<B>> {
	inner: SnapshotStream<B>,
	accessor: Arc<A>,
}

impl<B: Backend, A: Accessor<B>> HandleStream<B, A> {
	pub(crate) fn new(inner: SnapshotStream<B>, accessor: Arc<A>) -> Self {
		Self { inner, accessor }
	}
}

impl<B: Backend, A: Accessor<B>> Stream for HandleStream<B, A> {
	type Item = A::Value;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		// Safety/ergonomics: project the `inner` field without requiring `A`
		// or `B::Snapshot` to be `Unpin`; `SnapshotStream` itself has no
		// self-referential fields so structural pinning is sound here.
		let this = self.get_mut();
		match Pin::new(&mut this.inner).poll_next(cx) {
			Poll::Ready(Some(snapshot)) => Poll::Ready(Some(this.accessor.read(&snapshot))),
			Poll::Ready(None) => Poll::Ready(None),
			Poll::Pending => Poll::Pending,
		}
	}
}
