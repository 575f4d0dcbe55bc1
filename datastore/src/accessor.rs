// Copyright 2024 Datastore Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The accessor protocol: the uniform contract every handle variant
//! (primitive, codec-backed, document field, mapped) implements against a
//! snapshot or a transaction.

use crate::backend::Backend;
use crate::error::Result;

/// Read/write/remove of one logical preference against a `Backend`'s
/// snapshot and transaction types.
///
/// All handle variants implement it; the batch engine requires nothing more
/// from a handle than this trait (plus object-safe erasure, see
/// [`crate::batch::AnyAccessor`]).
pub trait Accessor<B: Backend>: Send + Sync + 'static {
	/// The logical value type this accessor exposes to callers.
	type Value: Clone + Send + Sync + 'static;

	/// The stable key identifying this accessor's cell (flat backend) or
	/// field (document backend, where it is a descriptive label rather than
	/// a storage address).
	fn key(&self) -> &str;

	/// The value returned when the cell is absent or decoding fails.
	fn default_value(&self) -> Self::Value;

	/// Read the current value out of an immutable snapshot.
	fn read(&self, snapshot: &B::Snapshot) -> Self::Value;

	/// Read the current value out of an in-flight transaction, observing
	/// any writes already performed earlier in the same batch block
	/// (read-your-writes).
	fn read_txn(&self, txn: &B::Transaction) -> Self::Value;

	/// Write a new value into the transaction.
	fn write(&self, txn: &mut B::Transaction, value: Self::Value) -> Result<()>;

	/// Remove this accessor's value from the transaction. For flat-backend
	/// accessors this deletes the cell (subsequent reads see `default_value`
	/// through absence). For document-field accessors, which cannot be
	/// truly absent, this writes `default_value`.
	fn remove(&self, txn: &mut B::Transaction) -> Result<()>;

	/// Whether this accessor may participate in a batch scope. Whole-document
	/// handles over opaque backends, and mapped handles whose base does not
	/// support batching, return `false`.
	fn supports_batch(&self) -> bool {
		true
	}
}
