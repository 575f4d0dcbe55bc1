// Copyright 2024 Datastore Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The `Datastore<B>` factory: registers handles, hosts the
//! dispatcher, exposes batch operations and backup import/export.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use futures_core::Stream;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tokio::runtime::{Handle as RuntimeHandle, Runtime};

use crate::accessor::Accessor;
use crate::backend::Backend;
use crate::backup::{self, PreferencesBackup};
use crate::batch::{require_batch_support, AnyAccessor, BatchGetResult, ReadScope, UpdateScope, WriteScope};
use crate::classifier::{KeyClassifier, PrefixKeyClassifier};
use crate::document::{DocSnapshot, DocTransaction, EnumFieldAccessor, FieldAccessor, WholeDocumentAccessor};
use crate::error::{DatastoreError, Result};
use crate::flat::{
	BoolAccessor, CodecAccessor, EnumCodec, F32Accessor, F64Accessor, FlatSnapshot, FlatTransaction, I32Accessor,
	I64Accessor, ListAccessor, NullableCodecAccessor, NullableListAccessor, NullableSetAccessor, OpaqueCodec,
	OptionalStringAccessor, OptionalStringSetAccessor, SetAccessor, StringAccessor, StringSetAccessor, StructuralCodec,
};
use crate::handle::Handle;
use crate::store::SnapshotStore;

/// Registers handles over one `Backend`, hosts the dispatcher every
/// I/O-bearing handle operation runs on, and exposes batch and backup
/// operations.
///
/// Owns a dedicated multi-threaded `tokio` runtime rather than borrowing the
/// caller's: I/O must run on a background context, not the caller's
/// foreground context, and a datastore embedded in a synchronous
/// application (or one built on a different async runtime) still needs
/// somewhere to dispatch onto.
pub struct Datastore<B: Backend> {
	store: Arc<SnapshotStore<B>>,
	runtime: Runtime,
	classifier: Arc<dyn KeyClassifier>,
}

impl<B: Backend> Datastore<B> {
	/// Open `backend` with the default key classifier
	/// ([`PrefixKeyClassifier::default`]).
	pub fn open(backend: B) -> Result<Self> {
		Self::open_with_classifier(backend, Arc::new(PrefixKeyClassifier::default()))
	}

	pub fn open_with_classifier(backend: B, classifier: Arc<dyn KeyClassifier>) -> Result<Self> {
		let runtime = Runtime::new().map_err(DatastoreError::Io)?;
		let store = runtime.block_on(SnapshotStore::open(backend))?;
		Ok(Self { store: Arc::new(store), runtime, classifier })
	}

	fn dispatcher(&self) -> RuntimeHandle {
		self.runtime.handle().clone()
	}

	fn make_handle<A: Accessor<B>>(&self, accessor: A) -> Result<Handle<B, A>> {
		Handle::new(Arc::clone(&self.store), self.dispatcher(), accessor)
	}

	/// The current snapshot, bypassing any handle.
	pub fn current(&self) -> Arc<B::Snapshot> {
		self.store.current()
	}

	/// `batchGet`: one snapshot, read every handle from it.
	pub fn batch_get(&self, handles: &[&dyn AnyAccessor<B>]) -> Result<BatchGetResult<B>> {
		for handle in handles {
			require_batch_support(*handle)?;
		}
		Ok(BatchGetResult::new(self.store.current()))
	}

	/// `batchWrite`: one transaction, write-only, commits atomically.
	pub async fn batch_write(&self, f: impl FnOnce(&mut WriteScope<'_, B>) -> Result<()> + Send) -> Result<()> {
		self.store
			.commit(move |txn| {
				let mut scope = WriteScope::new(txn);
				f(&mut scope)
			})
			.await
	}

	/// `batchUpdate`: one transaction, read-your-writes plus `update`.
	pub async fn batch_update(&self, f: impl FnOnce(&mut UpdateScope<'_, B>) -> Result<()> + Send) -> Result<()> {
		self.store
			.commit(move |txn| {
				let mut scope = UpdateScope::new(txn);
				f(&mut scope)
			})
			.await
	}

	/// `batchReadFlow`: folds each emitted snapshot through `f`.
	pub fn batch_read_flow<R>(&self, f: impl Fn(&ReadScope<B>) -> R + Send + Sync + 'static) -> impl Stream<Item = R>
	where
		R: Send + 'static,
	{
		ReadFlow { inner: self.store.observe(), f: Arc::new(f) }
	}
}

struct ReadFlow<B: Backend, R> {
	inner: crate::stream::SnapshotStream<B>,
	f: Arc<dyn Fn(&ReadScope<B>) -> R + Send + Sync>,
}

impl<B: Backend, R> Stream for ReadFlow<B, R> {
	type Item = R;

	fn poll_next(
		self: std::pin::Pin<&mut Self>,
		cx: &mut std::task::Context<'_>,
	) -> std::task::Poll<Option<Self::Item>> {
		let this = self.get_mut();
		match std::pin::Pin::new(&mut this.inner).poll_next(cx) {
			std::task::Poll::Ready(Some(snapshot)) => {
				let scope = ReadScope::new(snapshot);
				std::task::Poll::Ready(Some((this.f)(&scope)))
			}
			std::task::Poll::Ready(None) => std::task::Poll::Ready(None),
			std::task::Poll::Pending => std::task::Poll::Pending,
		}
	}
}

/// Flat-backend handle constructors and backup operations, available
/// whenever `B`'s associated types are exactly the flat cell model.
impl<B> Datastore<B>
where
	B: Backend<Snapshot = FlatSnapshot, Transaction = FlatTransaction>,
{
	pub fn primitive_bool(&self, key: impl Into<String>, default: bool) -> Result<Handle<B, BoolAccessor>> {
		self.make_handle(BoolAccessor::new(key, default))
	}

	pub fn primitive_i32(&self, key: impl Into<String>, default: i32) -> Result<Handle<B, I32Accessor>> {
		self.make_handle(I32Accessor::new(key, default))
	}

	pub fn primitive_i64(&self, key: impl Into<String>, default: i64) -> Result<Handle<B, I64Accessor>> {
		self.make_handle(I64Accessor::new(key, default))
	}

	pub fn primitive_f32(&self, key: impl Into<String>, default: f32) -> Result<Handle<B, F32Accessor>> {
		self.make_handle(F32Accessor::new(key, default))
	}

	pub fn primitive_f64(&self, key: impl Into<String>, default: f64) -> Result<Handle<B, F64Accessor>> {
		self.make_handle(F64Accessor::new(key, default))
	}

	pub fn primitive_string(&self, key: impl Into<String>, default: impl Into<String>) -> Result<Handle<B, StringAccessor>> {
		self.make_handle(StringAccessor::new(key, default.into()))
	}

	pub fn primitive_string_set(
		&self,
		key: impl Into<String>,
		default: BTreeSet<String>,
	) -> Result<Handle<B, StringSetAccessor>> {
		self.make_handle(StringSetAccessor::new(key, default))
	}

	pub fn enum_<E>(
		&self,
		key: impl Into<String>,
		default: E,
		to_name: fn(&E) -> &'static str,
		from_name: fn(&str) -> Option<E>,
	) -> Result<Handle<B, CodecAccessor<B, OptionalStringAccessor, EnumCodec<E>, E>>>
	where
		E: Clone + Send + Sync + 'static,
	{
		let key = key.into();
		let base = OptionalStringAccessor::new(key);
		self.make_handle(CodecAccessor::new(base, EnumCodec::new(to_name, from_name), default))
	}

	pub fn enum_nullable<E>(
		&self,
		key: impl Into<String>,
		to_name: fn(&E) -> &'static str,
		from_name: fn(&str) -> Option<E>,
	) -> Result<Handle<B, NullableCodecAccessor<B, OptionalStringAccessor, EnumCodec<E>, E>>>
	where
		E: Clone + Send + Sync + 'static,
	{
		let base = OptionalStringAccessor::new(key);
		self.make_handle(NullableCodecAccessor::new(base, EnumCodec::new(to_name, from_name)))
	}

	pub fn structural<T>(
		&self,
		key: impl Into<String>,
		default: T,
	) -> Result<Handle<B, CodecAccessor<B, OptionalStringAccessor, StructuralCodec<T>, T>>>
	where
		T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
	{
		let base = OptionalStringAccessor::new(key);
		self.make_handle(CodecAccessor::new(base, StructuralCodec::new(), default))
	}

	pub fn serialized<T>(
		&self,
		key: impl Into<String>,
		default: T,
		encode: impl Fn(&T) -> String + Send + Sync + 'static,
		decode: impl Fn(&str) -> Option<T> + Send + Sync + 'static,
	) -> Result<Handle<B, CodecAccessor<B, OptionalStringAccessor, OpaqueCodec<T>, T>>>
	where
		T: Clone + Send + Sync + 'static,
	{
		let base = OptionalStringAccessor::new(key);
		self.make_handle(CodecAccessor::new(base, OpaqueCodec::new(encode, decode), default))
	}

	pub fn serialized_list<T>(
		&self,
		key: impl Into<String>,
		default: Vec<T>,
		encode: impl Fn(&T) -> String + Send + Sync + 'static,
		decode: impl Fn(&str) -> Option<T> + Send + Sync + 'static,
	) -> Result<Handle<B, ListAccessor<B, OptionalStringAccessor, OpaqueCodec<T>, T>>>
	where
		T: Clone + Send + Sync + 'static,
	{
		let base = OptionalStringAccessor::new(key);
		self.make_handle(ListAccessor::new(base, OpaqueCodec::new(encode, decode), default))
	}

	pub fn serialized_list_nullable<T>(
		&self,
		key: impl Into<String>,
		encode: impl Fn(&T) -> String + Send + Sync + 'static,
		decode: impl Fn(&str) -> Option<T> + Send + Sync + 'static,
	) -> Result<Handle<B, NullableListAccessor<B, OptionalStringAccessor, OpaqueCodec<T>, T>>>
	where
		T: Clone + Send + Sync + 'static,
	{
		let base = OptionalStringAccessor::new(key);
		self.make_handle(NullableListAccessor::new(base, OpaqueCodec::new(encode, decode)))
	}

	pub fn serialized_set<T>(
		&self,
		key: impl Into<String>,
		default: HashSet<T>,
		encode: impl Fn(&T) -> String + Send + Sync + 'static,
		decode: impl Fn(&str) -> Option<T> + Send + Sync + 'static,
	) -> Result<Handle<B, SetAccessor<B, OptionalStringSetAccessor, OpaqueCodec<T>, T>>>
	where
		T: Clone + Send + Sync + std::hash::Hash + Eq + 'static,
	{
		let base = OptionalStringSetAccessor::new(key);
		self.make_handle(SetAccessor::new(base, OpaqueCodec::new(encode, decode), default))
	}

	pub fn serialized_set_nullable<T>(
		&self,
		key: impl Into<String>,
		encode: impl Fn(&T) -> String + Send + Sync + 'static,
		decode: impl Fn(&str) -> Option<T> + Send + Sync + 'static,
	) -> Result<Handle<B, NullableSetAccessor<B, OptionalStringSetAccessor, OpaqueCodec<T>, T>>>
	where
		T: Clone + Send + Sync + std::hash::Hash + Eq + 'static,
	{
		let base = OptionalStringSetAccessor::new(key);
		self.make_handle(NullableSetAccessor::new(base, OpaqueCodec::new(encode, decode)))
	}

	pub fn export(&self, export_private: bool, export_app_state: bool) -> PreferencesBackup {
		backup::export(&self.store.current(), self.classifier.as_ref(), export_private, export_app_state)
	}

	pub fn export_as_json(&self, export_private: bool, export_app_state: bool) -> Result<String> {
		backup::export_as_json(&self.store.current(), self.classifier.as_ref(), export_private, export_app_state)
	}

	pub async fn import(&self, backup: PreferencesBackup, import_private: bool, import_app_state: bool) -> Result<()> {
		let classifier = Arc::clone(&self.classifier);
		self.store
			.commit(move |txn| {
				backup::import(&backup, txn, classifier.as_ref(), import_private, import_app_state);
				Ok(())
			})
			.await
	}

	pub async fn import_json(&self, json: &str, import_private: bool, import_app_state: bool) -> Result<()> {
		let parsed = backup::parse_json(json)?;
		self.import(parsed, import_private, import_app_state).await
	}

	pub async fn import_map(
		&self,
		map: JsonMap<String, JsonValue>,
		import_private: bool,
		import_app_state: bool,
	) -> Result<()> {
		let classifier = Arc::clone(&self.classifier);
		self.store
			.commit(move |txn| {
				backup::import_map(&map, txn, classifier.as_ref(), import_private, import_app_state);
				Ok(())
			})
			.await
	}
}

/// Document-backend handle constructors, available whenever `B`'s
/// associated types are exactly the single-document model over `D`.
impl<B, D> Datastore<B>
where
	B: Backend<Snapshot = DocSnapshot<D>, Transaction = DocTransaction<D>>,
	D: Clone + Send + Sync + 'static,
{
	pub fn field<F>(
		&self,
		name: impl Into<String>,
		getter: impl Fn(&D) -> F + Send + Sync + 'static,
		updater: impl Fn(&D, F) -> D + Send + Sync + 'static,
		default: F,
	) -> Result<Handle<B, FieldAccessor<D, F>>>
	where
		F: Clone + Send + Sync + 'static,
	{
		self.make_handle(FieldAccessor::new(name, getter, updater, default))
	}

	pub fn enum_field<T>(
		&self,
		name: impl Into<String>,
		getter: impl Fn(&D) -> String + Send + Sync + 'static,
		updater: impl Fn(&D, String) -> D + Send + Sync + 'static,
		to_name: fn(&T) -> &'static str,
		from_name: fn(&str) -> Option<T>,
		default: T,
	) -> Result<Handle<B, EnumFieldAccessor<D, EnumCodec<T>, T>>>
	where
		T: Clone + Send + Sync + 'static,
	{
		let base = FieldAccessor::new(name, getter, updater, String::new());
		self.make_handle(EnumFieldAccessor::new(base, EnumCodec::new(to_name, from_name), default))
	}

	/// The whole-document handle: a single logical key, defaulting to
	/// `proto_datastore`. Does not support batch participation.
	pub fn document(&self, default: D) -> Result<Handle<B, WholeDocumentAccessor<D>>> {
		self.make_handle(WholeDocumentAccessor::new(default))
	}
}
