// Copyright 2024 Datastore Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Codec-backed handles: enums, structs, lists, sets, and their
//! nullable variants, all stored as a string cell (or, for sets, a
//! string-set cell) whose content is the encoded form.

use std::collections::{BTreeSet, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;

use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::accessor::Accessor;
use crate::backend::Backend;
use crate::cell::Cell;
use crate::error::Result;
use crate::flat::{CellSink, CellSource};

/// Encodes/decodes a higher-order type `T` to/from a single string cell.
///
/// `decode` returning `None` models every kind of corruption or decode
/// failure: callers never see an error, the accessor falls back to a
/// default instead.
pub trait Codec<T>: Send + Sync + 'static {
	fn encode(&self, value: &T) -> String;
	fn decode(&self, raw: &str) -> Option<T>;
}

/// The raw string cell underneath every scalar codec-backed handle. Unlike
/// [`crate::flat::StringAccessor`], its `Value` is `Option<String>` so
/// callers can distinguish "absent" from "present and equal to the empty
/// string", which the nullable codec variants need.
pub struct OptionalStringAccessor {
	key: String,
}

impl OptionalStringAccessor {
	pub fn new(key: impl Into<String>) -> Self {
		Self { key: key.into() }
	}
}

impl<B> Accessor<B> for OptionalStringAccessor
where
	B: Backend,
	B::Snapshot: CellSource,
	B::Transaction: CellSource + CellSink,
{
	type Value = Option<String>;

	fn key(&self) -> &str {
		&self.key
	}

	fn default_value(&self) -> Self::Value {
		None
	}

	fn read(&self, snapshot: &B::Snapshot) -> Self::Value {
		match snapshot.get_cell(&self.key) {
			Some(Cell::Str(s)) => Some(s.clone()),
			_ => None,
		}
	}

	fn read_txn(&self, txn: &B::Transaction) -> Self::Value {
		match txn.get_cell(&self.key) {
			Some(Cell::Str(s)) => Some(s.clone()),
			_ => None,
		}
	}

	fn write(&self, txn: &mut B::Transaction, value: Self::Value) -> Result<()> {
		match value {
			Some(s) => txn.put_cell(&self.key, Cell::Str(s)),
			None => txn.delete_cell(&self.key),
		}
		Ok(())
	}

	fn remove(&self, txn: &mut B::Transaction) -> Result<()> {
		txn.delete_cell(&self.key);
		Ok(())
	}
}

/// The raw string-set cell underneath every `Set<T>` handle.
pub struct OptionalStringSetAccessor {
	key: String,
}

impl OptionalStringSetAccessor {
	pub fn new(key: impl Into<String>) -> Self {
		Self { key: key.into() }
	}
}

impl<B> Accessor<B> for OptionalStringSetAccessor
where
	B: Backend,
	B::Snapshot: CellSource,
	B::Transaction: CellSource + CellSink,
{
	type Value = Option<BTreeSet<String>>;

	fn key(&self) -> &str {
		&self.key
	}

	fn default_value(&self) -> Self::Value {
		None
	}

	fn read(&self, snapshot: &B::Snapshot) -> Self::Value {
		match snapshot.get_cell(&self.key) {
			Some(Cell::StrSet(s)) => Some(s.clone()),
			_ => None,
		}
	}

	fn read_txn(&self, txn: &B::Transaction) -> Self::Value {
		match txn.get_cell(&self.key) {
			Some(Cell::StrSet(s)) => Some(s.clone()),
			_ => None,
		}
	}

	fn write(&self, txn: &mut B::Transaction, value: Self::Value) -> Result<()> {
		match value {
			Some(s) => txn.put_cell(&self.key, Cell::StrSet(s)),
			None => txn.delete_cell(&self.key),
		}
		Ok(())
	}

	fn remove(&self, txn: &mut B::Transaction) -> Result<()> {
		txn.delete_cell(&self.key);
		Ok(())
	}
}

/// `Codec` for a Rust `enum` encoded as its symbolic variant name.
///
/// Built from two plain function pointers rather than a derive macro: the
/// mapping is almost always a short `match`, and this keeps the crate free
/// of a proc-macro dependency this workspace doesn't otherwise need for
/// this concern.
pub struct EnumCodec<E> {
	to_name: fn(&E) -> &'static str,
	from_name: fn(&str) -> Option<E>,
}

impl<E> EnumCodec<E> {
	pub fn new(to_name: fn(&E) -> &'static str, from_name: fn(&str) -> Option<E>) -> Self {
		Self { to_name, from_name }
	}
}

impl<E: Send + Sync + 'static> Codec<E> for EnumCodec<E> {
	fn encode(&self, value: &E) -> String {
		(self.to_name)(value).to_owned()
	}

	fn decode(&self, raw: &str) -> Option<E> {
		(self.from_name)(raw)
	}
}

/// `Codec` for a user struct via `serde_json`, the "structural serialization"
/// variant. Unknown fields on decode are ignored by default `serde`
/// behavior (no `#[serde(deny_unknown_fields)]`).
pub struct StructuralCodec<T> {
	_marker: PhantomData<fn() -> T>,
}

impl<T> StructuralCodec<T> {
	pub fn new() -> Self {
		Self { _marker: PhantomData }
	}
}

impl<T> Default for StructuralCodec<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: Serialize + DeserializeOwned + Send + Sync + 'static> Codec<T> for StructuralCodec<T> {
	fn encode(&self, value: &T) -> String {
		serde_json::to_string(value).unwrap_or_default()
	}

	fn decode(&self, raw: &str) -> Option<T> {
		serde_json::from_str(raw).ok()
	}
}

/// `Codec` for a user struct via caller-supplied `encode`/`decode`
/// closures, the "opaque serialization" variant.
pub struct OpaqueCodec<T> {
	encode: Arc<dyn Fn(&T) -> String + Send + Sync>,
	decode: Arc<dyn Fn(&str) -> Option<T> + Send + Sync>,
}

impl<T> OpaqueCodec<T> {
	pub fn new(
		encode: impl Fn(&T) -> String + Send + Sync + 'static,
		decode: impl Fn(&str) -> Option<T> + Send + Sync + 'static,
	) -> Self {
		Self { encode: Arc::new(encode), decode: Arc::new(decode) }
	}
}

impl<T: Send + Sync + 'static> Codec<T> for OpaqueCodec<T> {
	fn encode(&self, value: &T) -> String {
		(self.encode)(value)
	}

	fn decode(&self, raw: &str) -> Option<T> {
		(self.decode)(raw)
	}
}

/// A non-nullable codec-backed handle: `H.get()` always returns a concrete
/// `T`, falling back to `default` on absence or corruption.
pub struct CodecAccessor<B, Base, C, T> {
	base: Base,
	codec: C,
	default: T,
	_marker: PhantomData<fn() -> B>,
}

impl<B, Base, C, T> CodecAccessor<B, Base, C, T> {
	pub fn new(base: Base, codec: C, default: T) -> Self {
		Self { base, codec, default, _marker: PhantomData }
	}
}

impl<B, Base, C, T> Accessor<B> for CodecAccessor<B, Base, C, T>
where
	B: Backend,
	Base: Accessor<B, Value = Option<String>>,
	C: Codec<T>,
	T: Clone + Send + Sync + 'static,
{
	type Value = T;

	fn key(&self) -> &str {
		self.base.key()
	}

	fn default_value(&self) -> Self::Value {
		self.default.clone()
	}

	fn read(&self, snapshot: &B::Snapshot) -> Self::Value {
		decode_or_default(&self.codec, self.base.read(snapshot), &self.default, self.base.key())
	}

	fn read_txn(&self, txn: &B::Transaction) -> Self::Value {
		decode_or_default(&self.codec, self.base.read_txn(txn), &self.default, self.base.key())
	}

	fn write(&self, txn: &mut B::Transaction, value: Self::Value) -> Result<()> {
		self.base.write(txn, Some(self.codec.encode(&value)))
	}

	fn remove(&self, txn: &mut B::Transaction) -> Result<()> {
		self.base.remove(txn)
	}
}

fn decode_or_default<C: Codec<T>, T: Clone>(codec: &C, raw: Option<String>, default: &T, key: &str) -> T {
	match raw {
		None => default.clone(),
		Some(s) => codec.decode(&s).unwrap_or_else(|| {
			warn!("datastore: corrupt codec cell at key `{key}`, falling back to default");
			default.clone()
		}),
	}
}

/// The nullable variant of [`CodecAccessor`]: absence of the cell means
/// `None`, regardless of `T`'s semantics. A present-but-corrupt cell is also
/// treated as `None`; see `DESIGN.md` for the rationale.
pub struct NullableCodecAccessor<B, Base, C, T> {
	base: Base,
	codec: C,
	_marker: PhantomData<fn() -> (B, T)>,
}

impl<B, Base, C, T> NullableCodecAccessor<B, Base, C, T> {
	pub fn new(base: Base, codec: C) -> Self {
		Self { base, codec, _marker: PhantomData }
	}
}

impl<B, Base, C, T> Accessor<B> for NullableCodecAccessor<B, Base, C, T>
where
	B: Backend,
	Base: Accessor<B, Value = Option<String>>,
	C: Codec<T>,
	T: Clone + Send + Sync + 'static,
{
	type Value = Option<T>;

	fn key(&self) -> &str {
		self.base.key()
	}

	fn default_value(&self) -> Self::Value {
		None
	}

	fn read(&self, snapshot: &B::Snapshot) -> Self::Value {
		self.base.read(snapshot).and_then(|s| self.codec.decode(&s))
	}

	fn read_txn(&self, txn: &B::Transaction) -> Self::Value {
		self.base.read_txn(txn).and_then(|s| self.codec.decode(&s))
	}

	fn write(&self, txn: &mut B::Transaction, value: Self::Value) -> Result<()> {
		self.base.write(txn, value.map(|v| self.codec.encode(&v)))
	}

	fn remove(&self, txn: &mut B::Transaction) -> Result<()> {
		self.base.remove(txn)
	}
}

/// `List<T>`: a JSON array of per-element encodings in one string cell.
/// Elements that fail to decode are skipped; a malformed array yields
/// `default`.
pub struct ListAccessor<B, Base, C, T> {
	base: Base,
	codec: C,
	default: Vec<T>,
	_marker: PhantomData<fn() -> B>,
}

impl<B, Base, C, T> ListAccessor<B, Base, C, T> {
	pub fn new(base: Base, codec: C, default: Vec<T>) -> Self {
		Self { base, codec, default, _marker: PhantomData }
	}
}

fn decode_list<C: Codec<T>, T>(codec: &C, raw: &str) -> Option<Vec<T>> {
	let encoded: Vec<String> = serde_json::from_str(raw).ok()?;
	Some(encoded.iter().filter_map(|s| codec.decode(s)).collect())
}

fn encode_list<C: Codec<T>, T>(codec: &C, values: &[T]) -> String {
	let encoded: Vec<String> = values.iter().map(|v| codec.encode(v)).collect();
	serde_json::to_string(&encoded).unwrap_or_else(|_| "[]".to_owned())
}

impl<B, Base, C, T> Accessor<B> for ListAccessor<B, Base, C, T>
where
	B: Backend,
	Base: Accessor<B, Value = Option<String>>,
	C: Codec<T>,
	T: Clone + Send + Sync + 'static,
{
	type Value = Vec<T>;

	fn key(&self) -> &str {
		self.base.key()
	}

	fn default_value(&self) -> Self::Value {
		self.default.clone()
	}

	fn read(&self, snapshot: &B::Snapshot) -> Self::Value {
		match self.base.read(snapshot) {
			None => self.default.clone(),
			Some(raw) => decode_list(&self.codec, &raw).unwrap_or_else(|| self.default.clone()),
		}
	}

	fn read_txn(&self, txn: &B::Transaction) -> Self::Value {
		match self.base.read_txn(txn) {
			None => self.default.clone(),
			Some(raw) => decode_list(&self.codec, &raw).unwrap_or_else(|| self.default.clone()),
		}
	}

	fn write(&self, txn: &mut B::Transaction, value: Self::Value) -> Result<()> {
		self.base.write(txn, Some(encode_list(&self.codec, &value)))
	}

	fn remove(&self, txn: &mut B::Transaction) -> Result<()> {
		self.base.remove(txn)
	}
}

/// The nullable variant of [`ListAccessor`].
pub struct NullableListAccessor<B, Base, C, T> {
	base: Base,
	codec: C,
	_marker: PhantomData<fn() -> (B, T)>,
}

impl<B, Base, C, T> NullableListAccessor<B, Base, C, T> {
	pub fn new(base: Base, codec: C) -> Self {
		Self { base, codec, _marker: PhantomData }
	}
}

impl<B, Base, C, T> Accessor<B> for NullableListAccessor<B, Base, C, T>
where
	B: Backend,
	Base: Accessor<B, Value = Option<String>>,
	C: Codec<T>,
	T: Clone + Send + Sync + 'static,
{
	type Value = Option<Vec<T>>;

	fn key(&self) -> &str {
		self.base.key()
	}

	fn default_value(&self) -> Self::Value {
		None
	}

	fn read(&self, snapshot: &B::Snapshot) -> Self::Value {
		self.base.read(snapshot).map(|raw| decode_list(&self.codec, &raw).unwrap_or_default())
	}

	fn read_txn(&self, txn: &B::Transaction) -> Self::Value {
		self.base.read_txn(txn).map(|raw| decode_list(&self.codec, &raw).unwrap_or_default())
	}

	fn write(&self, txn: &mut B::Transaction, value: Self::Value) -> Result<()> {
		self.base.write(txn, value.map(|v| encode_list(&self.codec, &v)))
	}

	fn remove(&self, txn: &mut B::Transaction) -> Result<()> {
		self.base.remove(txn)
	}
}

/// `Set<T>`: a flat backend string-set cell, each element per-element
/// encoded. Elements that fail to decode are skipped.
pub struct SetAccessor<B, Base, C, T> {
	base: Base,
	codec: C,
	default: HashSet<T>,
	_marker: PhantomData<fn() -> B>,
}

impl<B, Base, C, T> SetAccessor<B, Base, C, T> {
	pub fn new(base: Base, codec: C, default: HashSet<T>) -> Self {
		Self { base, codec, default, _marker: PhantomData }
	}
}

fn decode_set<C: Codec<T>, T: std::hash::Hash + Eq>(codec: &C, raw: &BTreeSet<String>) -> HashSet<T> {
	raw.iter().filter_map(|s| codec.decode(s)).collect()
}

fn encode_set<C: Codec<T>, T>(codec: &C, values: &HashSet<T>) -> BTreeSet<String> {
	values.iter().map(|v| codec.encode(v)).collect()
}

impl<B, Base, C, T> Accessor<B> for SetAccessor<B, Base, C, T>
where
	B: Backend,
	Base: Accessor<B, Value = Option<BTreeSet<String>>>,
	C: Codec<T>,
	T: Clone + Send + Sync + std::hash::Hash + Eq + 'static,
{
	type Value = HashSet<T>;

	fn key(&self) -> &str {
		self.base.key()
	}

	fn default_value(&self) -> Self::Value {
		self.default.clone()
	}

	fn read(&self, snapshot: &B::Snapshot) -> Self::Value {
		match self.base.read(snapshot) {
			None => self.default.clone(),
			Some(raw) => decode_set(&self.codec, &raw),
		}
	}

	fn read_txn(&self, txn: &B::Transaction) -> Self::Value {
		match self.base.read_txn(txn) {
			None => self.default.clone(),
			Some(raw) => decode_set(&self.codec, &raw),
		}
	}

	fn write(&self, txn: &mut B::Transaction, value: Self::Value) -> Result<()> {
		self.base.write(txn, Some(encode_set(&self.codec, &value)))
	}

	fn remove(&self, txn: &mut B::Transaction) -> Result<()> {
		self.base.remove(txn)
	}
}

#[cfg(test)]
mod proptests {
	use super::*;
	use quickcheck::quickcheck;

	struct I32Codec;

	impl Codec<i32> for I32Codec {
		fn encode(&self, value: &i32) -> String {
			value.to_string()
		}

		fn decode(&self, raw: &str) -> Option<i32> {
			raw.parse().ok()
		}
	}

	quickcheck! {
		/// Every list of `i32`s survives an encode/decode round trip intact.
		fn list_round_trips(values: Vec<i32>) -> bool {
			let encoded = encode_list(&I32Codec, &values);
			decode_list(&I32Codec, &encoded) == Some(values)
		}

		/// `decode_list` never panics on arbitrary input: a string that isn't
		/// a JSON array of strings always falls back to `None` rather than a
		/// partial parse.
		fn decode_list_handles_arbitrary_input(raw: String) -> bool {
			let is_array_of_strings = serde_json::from_str::<Vec<String>>(&raw).is_ok();
			match decode_list::<_, i32>(&I32Codec, &raw) {
				Some(_) => is_array_of_strings,
				None => true,
			}
		}

		/// Every set of `i32`s survives an encode/decode round trip intact.
		fn set_round_trips(values: HashSet<i32>) -> bool {
			let encoded = encode_set(&I32Codec, &values);
			decode_set::<_, i32>(&I32Codec, &encoded) == values
		}
	}
}

/// The nullable variant of [`SetAccessor`].
pub struct NullableSetAccessor<B, Base, C, T> {
	base: Base,
	codec: C,
	_marker: PhantomData<fn() -> (B, T)>,
}

impl<B, Base, C, T> NullableSetAccessor<B, Base, C, T> {
	pub fn new(base: Base, codec: C) -> Self {
		Self { base, codec, _marker: PhantomData }
	}
}

impl<B, Base, C, T> Accessor<B> for NullableSetAccessor<B, Base, C, T>
where
	B: Backend,
	Base: Accessor<B, Value = Option<BTreeSet<String>>>,
	C: Codec<T>,
	T: Clone + Send + Sync + std::hash::Hash + Eq + 'static,
{
	type Value = Option<HashSet<T>>;

	fn key(&self) -> &str {
		self.base.key()
	}

	fn default_value(&self) -> Self::Value {
		None
	}

	fn read(&self, snapshot: &B::Snapshot) -> Self::Value {
		self.base.read(snapshot).map(|raw| decode_set(&self.codec, &raw))
	}

	fn read_txn(&self, txn: &B::Transaction) -> Self::Value {
		self.base.read_txn(txn).map(|raw| decode_set(&self.codec, &raw))
	}

	fn write(&self, txn: &mut B::Transaction, value: Self::Value) -> Result<()> {
		self.base.write(txn, value.map(|v| encode_set(&self.codec, &v)))
	}

	fn remove(&self, txn: &mut B::Transaction) -> Result<()> {
		self.base.remove(txn)
	}
}
