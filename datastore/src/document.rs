// Copyright 2024 Datastore Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The document backend model: a single opaque value `D` persisted
//! whole, with field handles implemented as pure in-process lenses rather
//! than per-key storage.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::accessor::Accessor;
use crate::backend::Backend;
use crate::error::Result;
use crate::flat::Codec;

/// Read-side view of a document snapshot/transaction: the single value `D`.
pub trait DocumentSource<D> {
	fn document(&self) -> &D;
}

/// Write-side counterpart of [`DocumentSource`], implemented by
/// [`DocTransaction`] so field handles can install a replacement document
/// produced by their updater.
pub trait DocumentSink<D> {
	fn set_document(&mut self, document: D);
}

/// An immutable point-in-time view holding exactly one document.
#[derive(Debug, Clone)]
pub struct DocSnapshot<D> {
	document: Arc<D>,
}

impl<D> DocSnapshot<D> {
	pub fn new(document: D) -> Self {
		Self { document: Arc::new(document) }
	}
}

impl<D> DocumentSource<D> for DocSnapshot<D> {
	fn document(&self) -> &D {
		&self.document
	}
}

/// A mutable draft of a document, scoped to one batch.
pub struct DocTransaction<D> {
	document: D,
}

impl<D: Clone> DocTransaction<D> {
	pub fn from_snapshot(snapshot: &DocSnapshot<D>) -> Self {
		Self { document: (*snapshot.document).clone() }
	}
}

impl<D> DocTransaction<D> {
	pub fn into_document(self) -> D {
		self.document
	}
}

impl<D> DocumentSource<D> for DocTransaction<D> {
	fn document(&self) -> &D {
		&self.document
	}
}

impl<D> DocumentSink<D> for DocTransaction<D> {
	fn set_document(&mut self, document: D) {
		self.document = document;
	}
}

/// Serializes a whole document `D` to and from the bytes a
/// `datastore-proto`-style backend persists. Supplied by the caller at
/// `Datastore` construction time.
pub trait DocumentCodec<D>: Send + Sync + 'static {
	fn encode(&self, document: &D) -> Vec<u8>;
	fn decode(&self, bytes: &[u8]) -> Option<D>;
	fn default_document(&self) -> D;
}

/// A field handle, parameterized by a getter/updater pair rather than a
/// storage key. `read`/`write`/`remove` compose through the lens;
/// `remove` writes `default` since document fields cannot truly be absent.
pub struct FieldAccessor<D, F> {
	name: String,
	getter: Arc<dyn Fn(&D) -> F + Send + Sync>,
	updater: Arc<dyn Fn(&D, F) -> D + Send + Sync>,
	default: F,
}

impl<D, F> FieldAccessor<D, F> {
	pub fn new(
		name: impl Into<String>,
		getter: impl Fn(&D) -> F + Send + Sync + 'static,
		updater: impl Fn(&D, F) -> D + Send + Sync + 'static,
		default: F,
	) -> Self {
		Self { name: name.into(), getter: Arc::new(getter), updater: Arc::new(updater), default }
	}
}

impl<B, D, F> Accessor<B> for FieldAccessor<D, F>
where
	B: Backend,
	B::Snapshot: DocumentSource<D>,
	B::Transaction: DocumentSource<D> + DocumentSink<D>,
	D: Send + Sync + 'static,
	F: Clone + Send + Sync + 'static,
{
	type Value = F;

	fn key(&self) -> &str {
		&self.name
	}

	fn default_value(&self) -> Self::Value {
		self.default.clone()
	}

	fn read(&self, snapshot: &B::Snapshot) -> Self::Value {
		(self.getter)(snapshot.document())
	}

	fn read_txn(&self, txn: &B::Transaction) -> Self::Value {
		(self.getter)(txn.document())
	}

	fn write(&self, txn: &mut B::Transaction, value: Self::Value) -> Result<()> {
		let next = (self.updater)(txn.document(), value);
		txn.set_document(next);
		Ok(())
	}

	fn remove(&self, txn: &mut B::Transaction) -> Result<()> {
		let default = self.default.clone();
		<Self as Accessor<B>>::write(self, txn, default)
	}
}

/// A codec-projected field handle: the stored field is a raw string (e.g. an
/// enum's variant name), decoded to `T` on read and encoded back on write. An
/// empty string, or a decode failure, projects to `default`.
pub struct EnumFieldAccessor<D, C, T> {
	base: FieldAccessor<D, String>,
	codec: C,
	default: T,
	_marker: PhantomData<fn() -> T>,
}

impl<D, C, T> EnumFieldAccessor<D, C, T> {
	pub fn new(base: FieldAccessor<D, String>, codec: C, default: T) -> Self {
		Self { base, codec, default, _marker: PhantomData }
	}
}

impl<B, D, C, T> Accessor<B> for EnumFieldAccessor<D, C, T>
where
	B: Backend,
	B::Snapshot: DocumentSource<D>,
	B::Transaction: DocumentSource<D> + DocumentSink<D>,
	D: Send + Sync + 'static,
	C: Codec<T>,
	T: Clone + Send + Sync + 'static,
{
	type Value = T;

	fn key(&self) -> &str {
		<FieldAccessor<D, String> as Accessor<B>>::key(&self.base)
	}

	fn default_value(&self) -> Self::Value {
		self.default.clone()
	}

	fn read(&self, snapshot: &B::Snapshot) -> Self::Value {
		decode_field(&self.codec, <FieldAccessor<D, String> as Accessor<B>>::read(&self.base, snapshot), &self.default)
	}

	fn read_txn(&self, txn: &B::Transaction) -> Self::Value {
		decode_field(&self.codec, <FieldAccessor<D, String> as Accessor<B>>::read_txn(&self.base, txn), &self.default)
	}

	fn write(&self, txn: &mut B::Transaction, value: Self::Value) -> Result<()> {
		<FieldAccessor<D, String> as Accessor<B>>::write(&self.base, txn, self.codec.encode(&value))
	}

	fn remove(&self, txn: &mut B::Transaction) -> Result<()> {
		<FieldAccessor<D, String> as Accessor<B>>::remove(&self.base, txn)
	}
}

fn decode_field<C: Codec<T>, T: Clone>(codec: &C, raw: String, default: &T) -> T {
	if raw.is_empty() {
		return default.clone();
	}
	codec.decode(&raw).unwrap_or_else(|| default.clone())
}

/// The whole-document handle: reads/writes the entire `D` at once. Does not
/// implement the accessor protocol's batch contract — `supports_batch`
/// returns `false` — since a whole-document write inside a batch would
/// silently clobber any field writes made earlier in the same block.
pub struct WholeDocumentAccessor<D> {
	default: D,
}

impl<D> WholeDocumentAccessor<D> {
	pub fn new(default: D) -> Self {
		Self { default }
	}
}

impl<B, D> Accessor<B> for WholeDocumentAccessor<D>
where
	B: Backend,
	B::Snapshot: DocumentSource<D>,
	B::Transaction: DocumentSource<D> + DocumentSink<D>,
	D: Clone + Send + Sync + 'static,
{
	type Value = D;

	fn key(&self) -> &str {
		"proto_datastore"
	}

	fn default_value(&self) -> Self::Value {
		self.default.clone()
	}

	fn read(&self, snapshot: &B::Snapshot) -> Self::Value {
		snapshot.document().clone()
	}

	fn read_txn(&self, txn: &B::Transaction) -> Self::Value {
		txn.document().clone()
	}

	fn write(&self, txn: &mut B::Transaction, value: Self::Value) -> Result<()> {
		txn.set_document(value);
		Ok(())
	}

	fn remove(&self, txn: &mut B::Transaction) -> Result<()> {
		let default = self.default.clone();
		txn.set_document(default);
		Ok(())
	}

	fn supports_batch(&self) -> bool {
		false
	}
}
