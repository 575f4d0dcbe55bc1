// Copyright 2024 Datastore Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The "preferences" flat backend model: a map from key to [`Cell`], and the
//! accessor variants built over it (primitives, codec-backed).

mod codec;
mod primitive;

pub use codec::{
	Codec, CodecAccessor, EnumCodec, ListAccessor, NullableCodecAccessor, NullableListAccessor, NullableSetAccessor,
	OpaqueCodec, OptionalStringAccessor, OptionalStringSetAccessor, SetAccessor, StructuralCodec,
};
pub use primitive::{BoolAccessor, F32Accessor, F64Accessor, I32Accessor, I64Accessor, StringAccessor, StringSetAccessor};

use std::collections::{BTreeMap, HashMap};

use crate::cell::Cell;

/// Read-side view shared by [`FlatSnapshot`] and [`FlatTransaction`] so
/// accessors can be written once and used against either (`read`/`read_txn`).
pub trait CellSource {
	fn get_cell(&self, key: &str) -> Option<&Cell>;
}

/// Write-side counterpart of [`CellSource`], implemented by
/// [`FlatTransaction`] so accessors can mutate any backend built on the flat
/// cell model.
pub trait CellSink {
	fn put_cell(&mut self, key: &str, cell: Cell);
	fn delete_cell(&mut self, key: &str);
}

impl CellSink for FlatTransaction {
	fn put_cell(&mut self, key: &str, cell: Cell) {
		self.put(key, cell)
	}

	fn delete_cell(&mut self, key: &str) {
		self.delete(key)
	}
}

/// An immutable point-in-time view of the flat cell map.
#[derive(Debug, Clone, Default)]
pub struct FlatSnapshot {
	cells: BTreeMap<String, Cell>,
}

impl FlatSnapshot {
	pub fn empty() -> Self {
		Self::default()
	}

	pub fn from_cells(cells: BTreeMap<String, Cell>) -> Self {
		Self { cells }
	}

	pub fn cells(&self) -> &BTreeMap<String, Cell> {
		&self.cells
	}
}

impl CellSource for FlatSnapshot {
	fn get_cell(&self, key: &str) -> Option<&Cell> {
		self.cells.get(key)
	}
}

/// A mutable draft of a [`FlatSnapshot`], scoped to one batch.
///
/// Writes go into `overlay` (`None` means "deleted"); reads check `overlay`
/// first so a block observes its own earlier writes (read-your-writes).
pub struct FlatTransaction {
	base: BTreeMap<String, Cell>,
	overlay: HashMap<String, Option<Cell>>,
}

impl FlatTransaction {
	pub fn from_snapshot(snapshot: &FlatSnapshot) -> Self {
		Self { base: snapshot.cells.clone(), overlay: HashMap::new() }
	}

	pub(crate) fn put(&mut self, key: &str, cell: Cell) {
		self.overlay.insert(key.to_owned(), Some(cell));
	}

	pub(crate) fn delete(&mut self, key: &str) {
		self.overlay.insert(key.to_owned(), None);
	}

	/// Fold the overlay into the base map, producing the cells for the next
	/// durable snapshot.
	pub fn into_cells(self) -> BTreeMap<String, Cell> {
		let mut cells = self.base;
		for (key, value) in self.overlay {
			match value {
				Some(cell) => {
					cells.insert(key, cell);
				}
				None => {
					cells.remove(&key);
				}
			}
		}
		cells
	}
}

impl CellSource for FlatTransaction {
	fn get_cell(&self, key: &str) -> Option<&Cell> {
		match self.overlay.get(key) {
			Some(Some(cell)) => Some(cell),
			Some(None) => None,
			None => self.base.get(key),
		}
	}
}
