// Copyright 2024 Datastore Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The backup engine: tagged-union JSON export/import over the flat
//! backend's primitive cells, plus the free-form `Map<String, Any>` variant.

use std::collections::BTreeSet;

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::cell::Cell;
use crate::classifier::{key_included, KeyClassifier};
use crate::error::{DatastoreError, Result};
use crate::flat::{CellSink, CellSource, FlatSnapshot, FlatTransaction};

/// One exported/imported cell value, tagged with the wire format's stable
/// type names. These names are part of the on-disk backup contract and must
/// not change independently of the cell model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum TaggedValue {
	#[serde(rename = "boolean")]
	Bool(bool),
	#[serde(rename = "int")]
	Int32(i32),
	#[serde(rename = "long")]
	Int64(i64),
	#[serde(rename = "float")]
	F32(f32),
	#[serde(rename = "double")]
	F64(f64),
	#[serde(rename = "string")]
	Str(String),
	#[serde(rename = "stringSet")]
	StringSet(BTreeSet<String>),
}

impl TaggedValue {
	fn from_cell(cell: &Cell) -> Self {
		match cell {
			Cell::Bool(v) => TaggedValue::Bool(*v),
			Cell::I32(v) => TaggedValue::Int32(*v),
			Cell::I64(v) => TaggedValue::Int64(*v),
			Cell::F32(v) => TaggedValue::F32(*v),
			Cell::F64(v) => TaggedValue::F64(*v),
			Cell::Str(v) => TaggedValue::Str(v.clone()),
			Cell::StrSet(v) => TaggedValue::StringSet(v.clone()),
		}
	}

	fn into_cell(self) -> Cell {
		match self {
			TaggedValue::Bool(v) => Cell::Bool(v),
			TaggedValue::Int32(v) => Cell::I32(v),
			TaggedValue::Int64(v) => Cell::I64(v),
			TaggedValue::F32(v) => Cell::F32(v),
			TaggedValue::F64(v) => Cell::F64(v),
			TaggedValue::Str(v) => Cell::Str(v),
			TaggedValue::StringSet(v) => Cell::StrSet(v),
		}
	}
}

/// One `(key, tagged value)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupEntry {
	pub key: String,
	pub value: TaggedValue,
}

/// The top-level export/import payload: `{ "preferences": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferencesBackup {
	pub preferences: Vec<BackupEntry>,
}

/// Export every cell in `snapshot` whose key passes `classifier`'s filter.
/// Key order is preserved from the snapshot's iteration order (a `BTreeMap`,
/// so lexicographic) for stable diffs.
pub fn export(
	snapshot: &FlatSnapshot,
	classifier: &dyn KeyClassifier,
	export_private: bool,
	export_app_state: bool,
) -> PreferencesBackup {
	let preferences = snapshot
		.cells()
		.iter()
		.filter(|(key, _)| key_included(classifier, key, export_private, export_app_state))
		.map(|(key, cell)| BackupEntry { key: key.clone(), value: TaggedValue::from_cell(cell) })
		.collect();
	PreferencesBackup { preferences }
}

pub fn export_as_json(
	snapshot: &FlatSnapshot,
	classifier: &dyn KeyClassifier,
	export_private: bool,
	export_app_state: bool,
) -> Result<String> {
	let backup = export(snapshot, classifier, export_private, export_app_state);
	serde_json::to_string(&backup).map_err(|e| DatastoreError::BackupParse(e.to_string()))
}

/// Parse `json` into a [`PreferencesBackup`]. Parse failure never mutates
/// state — the caller must not call [`import`] if this errors.
pub fn parse_json(json: &str) -> Result<PreferencesBackup> {
	serde_json::from_str(json).map_err(|e| DatastoreError::BackupParse(e.to_string()))
}

/// Write each entry of `backup` whose key passes `classifier`'s filter into
/// `transaction`. Entries whose tag conflicts with an existing cell of a
/// different primitive type are rejected per-entry (logged, skipped); the
/// rest still commit. See `DESIGN.md` for the conflict-resolution rationale
/// (existing-type cells win on conflict, last-writer overwrite is not used).
pub fn import(
	backup: &PreferencesBackup,
	transaction: &mut FlatTransaction,
	classifier: &dyn KeyClassifier,
	import_private: bool,
	import_app_state: bool,
) {
	for entry in &backup.preferences {
		if !key_included(classifier, &entry.key, import_private, import_app_state) {
			continue;
		}
		let incoming = entry.value.clone().into_cell();
		if let Some(existing) = transaction.get_cell(&entry.key) {
			if existing.type_name() != incoming.type_name() {
				warn!(
					"datastore: rejecting backup entry `{}`: existing cell is `{}`, incoming is `{}`",
					entry.key,
					existing.type_name(),
					incoming.type_name()
				);
				continue;
			}
		}
		transaction.put_cell(&entry.key, incoming);
	}
}

/// Infer a [`Cell`] from a free-form JSON value: integers become `int64` if
/// they overflow 32 bits else `int32`, floats become `f64`, strings and
/// bools map directly, a JSON array of strings becomes a string-set, and
/// nested objects/arrays-of-non-strings are skipped (return `None`).
fn infer_cell(value: &JsonValue) -> Option<Cell> {
	match value {
		JsonValue::Bool(b) => Some(Cell::Bool(*b)),
		JsonValue::Number(n) => {
			if let Some(i) = n.as_i64() {
				if let Ok(narrow) = i32::try_from(i) {
					Some(Cell::I32(narrow))
				} else {
					Some(Cell::I64(i))
				}
			} else {
				n.as_f64().map(Cell::F64)
			}
		}
		JsonValue::String(s) => Some(Cell::Str(s.clone())),
		JsonValue::Array(items) => {
			let mut set = BTreeSet::new();
			for item in items {
				match item {
					JsonValue::String(s) => {
						set.insert(s.clone());
					}
					_ => return None,
				}
			}
			Some(Cell::StrSet(set))
		}
		JsonValue::Object(_) | JsonValue::Null => None,
	}
}

/// Import the free-form `Map<String, Any>` variant.
pub fn import_map(
	map: &serde_json::Map<String, JsonValue>,
	transaction: &mut FlatTransaction,
	classifier: &dyn KeyClassifier,
	import_private: bool,
	import_app_state: bool,
) {
	for (key, value) in map {
		if !key_included(classifier, key, import_private, import_app_state) {
			continue;
		}
		let Some(incoming) = infer_cell(value) else {
			warn!("datastore: skipping free-form import entry `{key}`: unsupported JSON shape");
			continue;
		};
		if let Some(existing) = transaction.get_cell(key) {
			if existing.type_name() != incoming.type_name() {
				warn!(
					"datastore: rejecting free-form import entry `{key}`: existing cell is `{}`, incoming is `{}`",
					existing.type_name(),
					incoming.type_name()
				);
				continue;
			}
		}
		transaction.put_cell(key, incoming);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::classifier::PrefixKeyClassifier;
	use std::collections::BTreeMap;

	#[test]
	fn export_filters_private_keys() {
		let mut cells = BTreeMap::new();
		cells.insert("_pref_token".to_owned(), Cell::Str("secret".to_owned()));
		cells.insert("theme".to_owned(), Cell::Str("dark".to_owned()));
		let snapshot = FlatSnapshot::from_cells(cells);
		let classifier = PrefixKeyClassifier::default();

		let backup = export(&snapshot, &classifier, false, true);
		assert_eq!(backup.preferences.len(), 1);
		assert_eq!(backup.preferences[0].key, "theme");
	}

	#[test]
	fn import_rejects_type_conflict_but_commits_survivors() {
		let snapshot = FlatSnapshot::from_cells(BTreeMap::from([("count".to_owned(), Cell::I32(1))]));
		let mut txn = FlatTransaction::from_snapshot(&snapshot);
		let classifier = PrefixKeyClassifier::default();
		let backup = PreferencesBackup {
			preferences: vec![
				BackupEntry { key: "count".to_owned(), value: TaggedValue::Str("oops".to_owned()) },
				BackupEntry { key: "theme".to_owned(), value: TaggedValue::Str("dark".to_owned()) },
			],
		};

		import(&backup, &mut txn, &classifier, true, true);

		assert_eq!(txn.get_cell("count"), Some(&Cell::I32(1)));
		assert_eq!(txn.get_cell("theme"), Some(&Cell::Str("dark".to_owned())));
	}

	#[test]
	fn infer_cell_table() {
		assert_eq!(infer_cell(&serde_json::json!(42)), Some(Cell::I32(42)));
		assert_eq!(infer_cell(&serde_json::json!(9_000_000_000i64)), Some(Cell::I64(9_000_000_000)));
		assert_eq!(infer_cell(&serde_json::json!(1.5)), Some(Cell::F64(1.5)));
		assert_eq!(infer_cell(&serde_json::json!("hi")), Some(Cell::Str("hi".to_owned())));
		assert_eq!(infer_cell(&serde_json::json!(true)), Some(Cell::Bool(true)));
		assert_eq!(
			infer_cell(&serde_json::json!(["a", "b"])),
			Some(Cell::StrSet(BTreeSet::from(["a".to_owned(), "b".to_owned()])))
		);
		assert_eq!(infer_cell(&serde_json::json!({"nested": true})), None);
	}
}
