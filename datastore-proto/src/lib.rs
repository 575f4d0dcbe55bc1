// Copyright 2024 Datastore Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A durable single-document `Backend`, generic over any caller-supplied
//! [`DocumentCodec`]. Persists the whole document under one file, written
//! via write-to-temp-then-rename. Analogous in role to `kvdb-rocksdb` (the
//! durable backend of the pack), but over one opaque value instead of a
//! typed key space.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use datastore::document::{DocSnapshot, DocTransaction, DocumentCodec};
use datastore::error::{DatastoreError, Result};
use datastore::Backend;
use log::warn;

/// A document backend durably persisted to `path`, using `codec` to
/// serialize `D` to and from bytes.
pub struct ProtoBackend<D, C: DocumentCodec<D>> {
	path: PathBuf,
	codec: Arc<C>,
	_marker: std::marker::PhantomData<fn() -> D>,
}

impl<D, C: DocumentCodec<D>> ProtoBackend<D, C> {
	pub fn new(path: impl Into<PathBuf>, codec: C) -> Self {
		Self { path: path.into(), codec: Arc::new(codec), _marker: std::marker::PhantomData }
	}

	fn temp_path(&self) -> PathBuf {
		let mut temp = self.path.clone();
		let mut file_name = temp.file_name().map(|n| n.to_owned()).unwrap_or_default();
		file_name.push(".tmp");
		temp.set_file_name(file_name);
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
impl<D, C> Backend for ProtoBackend<D, C>
where
	D: Send + Sync + Clone + 'static,
	C: DocumentCodec<D>,
{
	type Snapshot = DocSnapshot<D>;
	type Transaction = DocTransaction<D>;

	async fn load(&self) -> Result<Self::Snapshot> {
		let bytes = match tokio::fs::read(&self.path).await {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Ok(DocSnapshot::new(self.codec.default_document()))
			}
			Err(e) => return Err(DatastoreError::Io(e)),
		};

		match self.codec.decode(&bytes) {
			Some(document) => Ok(DocSnapshot::new(document)),
			None => {
				warn!("datastore-proto: corrupt document at {:?}, falling back to default", self.path);
				Ok(DocSnapshot::new(self.codec.default_document()))
			}
		}
	}

	fn begin(&self, current: &Self::Snapshot) -> Self::Transaction {
		DocTransaction::from_snapshot(current)
	}

	async fn commit(&self, transaction: Self::Transaction) -> Result<Self::Snapshot> {
		let document = transaction.into_document();
		let bytes = self.codec.encode(&document);

		ensure_parent_dir(&self.path).await?;
		let temp_path = self.temp_path();
		tokio::fs::write(&temp_path, &bytes).await?;
		tokio::fs::rename(&temp_path, &self.path).await?;

		Ok(DocSnapshot::new(document))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use datastore::accessor::Accessor;
	use datastore::document::FieldAccessor;
	use tempfile::tempdir;

	#[derive(Debug, Clone, PartialEq, Default)]
	struct Profile {
		display_name: String,
	}

	struct ProfileCodec;

	impl DocumentCodec<Profile> for ProfileCodec {
		fn encode(&self, document: &Profile) -> Vec<u8> {
			document.display_name.clone().into_bytes()
		}

		fn decode(&self, bytes: &[u8]) -> Option<Profile> {
			String::from_utf8(bytes.to_vec()).ok().map(|display_name| Profile { display_name })
		}

		fn default_document(&self) -> Profile {
			Profile::default()
		}
	}

	#[tokio::test(flavor = "multi_thread")]
	async fn round_trips_across_reload() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("profile.bin");
		let handle = FieldAccessor::new(
			"display_name",
			|p: &Profile| p.display_name.clone(),
			|p: &Profile, name| Profile { display_name: name, ..p.clone() },
			String::new(),
		);

		{
			let backend = ProtoBackend::new(&path, ProfileCodec);
			let store = datastore::SnapshotStore::open(backend).await.unwrap();
			store
				.commit(|txn| {
					<FieldAccessor<Profile, String> as Accessor<ProtoBackend<Profile, ProfileCodec>>>::write(
						&handle,
						txn,
						"ada".to_owned(),
					)
				})
				.await
				.unwrap();
		}

		let backend = ProtoBackend::new(&path, ProfileCodec);
		let store = datastore::SnapshotStore::open(backend).await.unwrap();
		assert_eq!(
			<FieldAccessor<Profile, String> as Accessor<ProtoBackend<Profile, ProfileCodec>>>::read(
				&handle,
				&store.current(),
			),
			"ada"
		);
	}

	#[test]
	fn whole_document_handle_is_rejected_by_batch() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("conformance.bin");
		let store = datastore::Datastore::open(ProtoBackend::new(&path, ProfileCodec)).unwrap();

		let rt = tokio::runtime::Runtime::new().unwrap();
		rt.block_on(datastore_shared_tests::test_document_handle_rejected_by_batch::<_, Profile>(&store)).unwrap();
	}
}
