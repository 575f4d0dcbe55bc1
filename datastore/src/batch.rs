// Copyright 2024 Datastore Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The batch engine: `batchGet`, `batchWrite`, `batchUpdate`, and the
//! `ReadScope` used by `batchReadFlow`.
//!
//! `batchGet` needs no type erasure: it takes one snapshot once, and every
//! subsequent `BatchGetResult::get` simply re-reads that same `Arc`-held
//! snapshot through the caller's statically-typed handle. `AnyAccessor`
//! exists only so a heterogeneous slice of handles can be validated for
//! batch participation in one call with a clear not-supported error.

use std::sync::Arc;

use crate::accessor::Accessor;
use crate::backend::Backend;
use crate::error::{DatastoreError, Result};

/// Object-safe projection of [`Accessor`], used only to validate batch
/// participation across a heterogeneous list of handles.
pub trait AnyAccessor<B: Backend>: Send + Sync {
	fn handle_key(&self) -> &str;
	fn supports_batch(&self) -> bool;
}

impl<B: Backend, A: Accessor<B>> AnyAccessor<B> for A {
	fn handle_key(&self) -> &str {
		self.key()
	}

	fn supports_batch(&self) -> bool {
		Accessor::supports_batch(self)
	}
}

pub(crate) fn require_batch_support<B: Backend>(handle: &dyn AnyAccessor<B>) -> Result<()> {
	if handle.supports_batch() {
		Ok(())
	} else {
		Err(DatastoreError::NotSupported(handle.handle_key().to_owned()))
	}
}

/// The result of `Datastore::batch_get`: one captured snapshot, read
/// per-handle on demand. All reads reflect the same point-in-time snapshot.
pub struct BatchGetResult<B: Backend> {
	snapshot: Arc<B::Snapshot>,
}

impl<B: Backend> BatchGetResult<B> {
	pub(crate) fn new(snapshot: Arc<B::Snapshot>) -> Self {
		Self { snapshot }
	}

	pub fn get<A: Accessor<B>>(&self, handle: &A) -> A::Value {
		handle.read(&self.snapshot)
	}
}

/// Scope passed to `batchWrite`'s block: write-only, no reads.
pub struct WriteScope<'a, B: Backend> {
	transaction: &'a mut B::Transaction,
}

impl<'a, B: Backend> WriteScope<'a, B> {
	pub(crate) fn new(transaction: &'a mut B::Transaction) -> Self {
		Self { transaction }
	}

	pub fn set<A: Accessor<B>>(&mut self, handle: &A, value: A::Value) -> Result<()> {
		require_batch_support(handle)?;
		handle.write(self.transaction, value)
	}

	pub fn delete<A: Accessor<B>>(&mut self, handle: &A) -> Result<()> {
		require_batch_support(handle)?;
		handle.remove(self.transaction)
	}

	pub fn reset_to_default<A: Accessor<B>>(&mut self, handle: &A) -> Result<()> {
		require_batch_support(handle)?;
		handle.remove(self.transaction)
	}
}

/// Scope passed to `batchUpdate`'s block: read-your-writes plus `update`.
pub struct UpdateScope<'a, B: Backend> {
	transaction: &'a mut B::Transaction,
}

impl<'a, B: Backend> UpdateScope<'a, B> {
	pub(crate) fn new(transaction: &'a mut B::Transaction) -> Self {
		Self { transaction }
	}

	pub fn get<A: Accessor<B>>(&self, handle: &A) -> Result<A::Value> {
		require_batch_support(handle)?;
		Ok(handle.read_txn(self.transaction))
	}

	pub fn set<A: Accessor<B>>(&mut self, handle: &A, value: A::Value) -> Result<()> {
		require_batch_support(handle)?;
		handle.write(self.transaction, value)
	}

	pub fn delete<A: Accessor<B>>(&mut self, handle: &A) -> Result<()> {
		require_batch_support(handle)?;
		handle.remove(self.transaction)
	}

	pub fn reset_to_default<A: Accessor<B>>(&mut self, handle: &A) -> Result<()> {
		require_batch_support(handle)?;
		handle.remove(self.transaction)
	}

	pub fn update<A: Accessor<B>>(&mut self, handle: &A, f: impl FnOnce(A::Value) -> A::Value) -> Result<()> {
		require_batch_support(handle)?;
		let current = handle.read_txn(self.transaction);
		handle.write(self.transaction, f(current))
	}
}

/// Scope passed to `batchReadFlow`'s block: read-only over one snapshot,
/// folded once per emitted snapshot.
pub struct ReadScope<B: Backend> {
	snapshot: Arc<B::Snapshot>,
}

impl<B: Backend> ReadScope<B> {
	pub(crate) fn new(snapshot: Arc<B::Snapshot>) -> Self {
		Self { snapshot }
	}

	pub fn get<A: Accessor<B>>(&self, handle: &A) -> A::Value {
		handle.read(&self.snapshot)
	}
}
