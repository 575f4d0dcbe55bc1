// Copyright 2024 Datastore Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A durable flat `Backend` persisting its cells as a single JSON file,
//! written via write-to-temp-then-rename so a crash never leaves a partial
//! file behind. A durable analogue of `kvdb-rocksdb`'s role, minus the
//! embedded database engine.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use datastore::cell::Cell;
use datastore::error::{DatastoreError, Result};
use datastore::flat::{FlatSnapshot, FlatTransaction};
use datastore::Backend;
use log::warn;

/// A flat backend durably persisted to `path` as JSON.
pub struct PreferencesBackend {
	path: PathBuf,
}

impl PreferencesBackend {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	fn temp_path(&self) -> PathBuf {
		let mut temp = self.path.clone();
		let file_name = temp.file_name().map(|n| n.to_owned()).unwrap_or_default();
		let mut temp_name = file_name;
		temp_name.push(".tmp");
		temp.set_file_name(temp_name);
		temp
	}
}

async fn ensure_parent_dir(path: &Path) -> Result<()> {
	if let Some(parent) = path.parent() {
		if !parent.as_os_str().is_empty() {
			tokio::fs::create_dir_all(parent).await?;
		}
	}
	Ok(())
}

#[async_trait]
impl Backend for PreferencesBackend {
	type Snapshot = FlatSnapshot;
	type Transaction = FlatTransaction;

	async fn load(&self) -> Result<Self::Snapshot> {
		let bytes = match tokio::fs::read(&self.path).await {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FlatSnapshot::from_cells(BTreeMap::new())),
			Err(e) => return Err(DatastoreError::Io(e)),
		};

		match serde_json::from_slice::<BTreeMap<String, Cell>>(&bytes) {
			Ok(cells) => Ok(FlatSnapshot::from_cells(cells)),
			Err(e) => {
				warn!("datastore-preferences: corrupt store at {:?}, starting empty: {e}", self.path);
				Ok(FlatSnapshot::from_cells(BTreeMap::new()))
			}
		}
	}

	fn begin(&self, current: &Self::Snapshot) -> Self::Transaction {
		FlatTransaction::from_snapshot(current)
	}

	async fn commit(&self, transaction: Self::Transaction) -> Result<Self::Snapshot> {
		let cells = transaction.into_cells();
		let bytes = serde_json::to_vec(&cells).map_err(|e| DatastoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

		ensure_parent_dir(&self.path).await?;
		let temp_path = self.temp_path();
		tokio::fs::write(&temp_path, &bytes).await?;
		tokio::fs::rename(&temp_path, &self.path).await?;

		Ok(FlatSnapshot::from_cells(cells))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use datastore::accessor::Accessor;
	use datastore::flat::StringAccessor;
	use tempfile::tempdir;

	#[tokio::test(flavor = "multi_thread")]
	async fn round_trips_across_reload() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("prefs.json");

		let handle = StringAccessor::new("username", String::new());
		{
			let backend = PreferencesBackend::new(&path);
			let store = datastore::SnapshotStore::open(backend).await.unwrap();
			store
				.commit(|txn| <StringAccessor as Accessor<PreferencesBackend>>::write(&handle, txn, "ada".to_owned()))
				.await
				.unwrap();
		}

		let backend = PreferencesBackend::new(&path);
		let store = datastore::SnapshotStore::open(backend).await.unwrap();
		assert_eq!(<StringAccessor as Accessor<PreferencesBackend>>::read(&handle, &store.current()), "ada");
	}

	#[tokio::test(flavor = "multi_thread")]
	async fn corrupt_file_loads_as_empty() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("prefs.json");
		tokio::fs::write(&path, b"not json").await.unwrap();

		let backend = PreferencesBackend::new(&path);
		let store = datastore::SnapshotStore::open(backend).await.unwrap();
		assert!(store.current().cells().is_empty());
	}

	#[test]
	fn conformance_suite() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("conformance.json");
		let store = datastore::Datastore::open(PreferencesBackend::new(&path)).unwrap();

		let rt = tokio::runtime::Runtime::new().unwrap();
		rt.block_on(async {
			datastore_shared_tests::test_primitive_round_trip(&store).await.unwrap();
			datastore_shared_tests::test_batch_write_is_atomic(&store).await.unwrap();
			datastore_shared_tests::test_backup_round_trips_and_filters_private_keys(&store).await.unwrap();
		});
	}
}
