// Copyright 2024 Datastore Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The mapped handle: bidirectional transform over any other handle.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::accessor::Accessor;
use crate::backend::Backend;
use crate::error::Result;

/// Wraps a handle `Base` of value type `A`, exposing value type `T` through
/// `convert: A -> T` / `reverse: T -> A`.
///
/// `reverse(convert(a)) == a` is a caller obligation; violating it
/// does not panic here, it just means observed round-trips diverge.
pub struct MappedAccessor<Base, A, T> {
	base: Base,
	convert: Arc<dyn Fn(A) -> T + Send + Sync>,
	reverse: Arc<dyn Fn(T) -> A + Send + Sync>,
	_marker: PhantomData<fn() -> (A, T)>,
}

impl<Base, A, T> MappedAccessor<Base, A, T> {
	pub fn new(
		base: Base,
		convert: impl Fn(A) -> T + Send + Sync + 'static,
		reverse: impl Fn(T) -> A + Send + Sync + 'static,
	) -> Self {
		Self { base, convert: Arc::new(convert), reverse: Arc::new(reverse), _marker: PhantomData }
	}
}

impl<B, Base, A, T> Accessor<B> for MappedAccessor<Base, A, T>
where
	B: Backend,
	Base: Accessor<B, Value = A>,
	A: Clone + Send + Sync + 'static,
	T: Clone + Send + Sync + 'static,
{
	type Value = T;

	fn key(&self) -> &str {
		self.base.key()
	}

	fn default_value(&self) -> Self::Value {
		(self.convert)(self.base.default_value())
	}

	fn read(&self, snapshot: &B::Snapshot) -> Self::Value {
		(self.convert)(self.base.read(snapshot))
	}

	fn read_txn(&self, txn: &B::Transaction) -> Self::Value {
		(self.convert)(self.base.read_txn(txn))
	}

	fn write(&self, txn: &mut B::Transaction, value: Self::Value) -> Result<()> {
		self.base.write(txn, (self.reverse)(value))
	}

	fn remove(&self, txn: &mut B::Transaction) -> Result<()> {
		// Delegates to the base handle, not `write(default_value())`: a mapped
		// handle's own notion of "default" may not round-trip through `reverse`.
		self.base.remove(txn)
	}

	fn supports_batch(&self) -> bool {
		self.base.supports_batch()
	}
}
