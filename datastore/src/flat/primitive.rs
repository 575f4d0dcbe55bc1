// Copyright 2024 Datastore Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Per-type primitive handles over the flat backend.
//!
//! One accessor struct per cell type rather than a single generic one,
//! preferring explicit per-variant code (as `kvdb::DBOp::{Insert,Delete}`
//! does) over a deeply generic abstraction.

use crate::accessor::Accessor;
use crate::backend::Backend;
use crate::cell::Cell;
use crate::error::Result;
use crate::flat::{CellSink, CellSource};

use std::collections::BTreeSet;

macro_rules! primitive_accessor {
	($name:ident, $value:ty, $variant:ident, $doc:literal) => {
		#[doc = $doc]
		pub struct $name {
			key: String,
			default: $value,
		}

		impl $name {
			pub fn new(key: impl Into<String>, default: $value) -> Self {
				Self { key: key.into(), default }
			}
		}

		impl<B> Accessor<B> for $name
		where
			B: Backend,
			B::Snapshot: CellSource,
			B::Transaction: CellSource + CellSink,
		{
			type Value = $value;

			fn key(&self) -> &str {
				&self.key
			}

			fn default_value(&self) -> Self::Value {
				self.default.clone()
			}

			fn read(&self, snapshot: &B::Snapshot) -> Self::Value {
				match snapshot.get_cell(&self.key) {
					Some(Cell::$variant(v)) => v.clone(),
					_ => self.default.clone(),
				}
			}

			fn read_txn(&self, txn: &B::Transaction) -> Self::Value {
				match txn.get_cell(&self.key) {
					Some(Cell::$variant(v)) => v.clone(),
					_ => self.default.clone(),
				}
			}

			fn write(&self, txn: &mut B::Transaction, value: Self::Value) -> Result<()> {
				txn.put_cell(&self.key, Cell::$variant(value));
				Ok(())
			}

			fn remove(&self, txn: &mut B::Transaction) -> Result<()> {
				txn.delete_cell(&self.key);
				Ok(())
			}
		}
	};
}

primitive_accessor!(BoolAccessor, bool, Bool, "A handle over a boolean cell.");
primitive_accessor!(I32Accessor, i32, I32, "A handle over a 32-bit signed integer cell.");
primitive_accessor!(I64Accessor, i64, I64, "A handle over a 64-bit signed integer cell.");
primitive_accessor!(F32Accessor, f32, F32, "A handle over a 32-bit float cell.");
primitive_accessor!(F64Accessor, f64, F64, "A handle over a 64-bit float cell.");
primitive_accessor!(StringAccessor, String, Str, "A handle over a UTF-8 string cell.");
primitive_accessor!(StringSetAccessor, BTreeSet<String>, StrSet, "A handle over an unordered set of UTF-8 strings.");
