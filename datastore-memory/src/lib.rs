// Copyright 2024 Datastore Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! An ephemeral `Backend` fulfilling the `datastore` core's flat cell model,
//! living in memory only. Intended for tests and for applications that want
//! preference semantics without durability — the in-memory analogue of
//! `kvdb-memorydb`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use datastore::error::Result;
use datastore::flat::{FlatSnapshot, FlatTransaction};
use datastore::Backend;

/// A flat backend with no durable storage: `load` always starts empty,
/// `commit` never touches disk.
#[derive(Default)]
pub struct InMemory;

/// Create an in-memory backend.
pub fn create() -> InMemory {
	InMemory
}

#[async_trait]
impl Backend for InMemory {
	type Snapshot = FlatSnapshot;
	type Transaction = FlatTransaction;

	async fn load(&self) -> Result<Self::Snapshot> {
		Ok(FlatSnapshot::from_cells(BTreeMap::new()))
	}

	fn begin(&self, current: &Self::Snapshot) -> Self::Transaction {
		FlatTransaction::from_snapshot(current)
	}

	async fn commit(&self, transaction: Self::Transaction) -> Result<Self::Snapshot> {
		Ok(FlatSnapshot::from_cells(transaction.into_cells()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use datastore::accessor::Accessor;
	use datastore::flat::BoolAccessor;
	use datastore::Datastore;
	use std::sync::Arc;

	#[tokio::test(flavor = "multi_thread")]
	async fn commits_are_visible_after_load() {
		let store = datastore::SnapshotStore::open(create()).await.unwrap();
		let flag = BoolAccessor::new("dark_mode", false);

		assert!(!<BoolAccessor as Accessor<InMemory>>::read(&flag, &store.current()));

		store.commit(|txn| <BoolAccessor as Accessor<InMemory>>::write(&flag, txn, true)).await.unwrap();
		eprintln!("DEBUG cells: {:?}", store.current().cells());
		assert!(<BoolAccessor as Accessor<InMemory>>::read(&flag, &store.current()));
	}

	#[test]
	fn conformance_suite() {
		let store = Datastore::open(create()).unwrap();
		let rt = tokio::runtime::Runtime::new().unwrap();
		rt.block_on(async {
			datastore_shared_tests::test_primitive_round_trip(&store).await.unwrap();
			datastore_shared_tests::test_enum_corruption_falls_back_to_default(&store).await.unwrap();
			datastore_shared_tests::test_nullable_codec_absence_is_none(&store).await.unwrap();
			datastore_shared_tests::test_list_skips_undecodable_elements(&store).await.unwrap();
			datastore_shared_tests::test_mapped_accessor_round_trips_and_delegates_reset(&store).await.unwrap();
			datastore_shared_tests::test_batch_write_is_atomic(&store).await.unwrap();
			datastore_shared_tests::test_batch_update_sees_its_own_writes(&store).await.unwrap();
			datastore_shared_tests::test_flow_primes_with_current_value(&store).await.unwrap();
			datastore_shared_tests::test_state_in_tracks_commits(&store).await.unwrap();
			datastore_shared_tests::test_backup_round_trips_and_filters_private_keys(&store).await.unwrap();
			datastore_shared_tests::test_import_map_infers_types(&store).await.unwrap();
		});

		let store = Arc::new(Datastore::open(create()).unwrap());
		rt.block_on(datastore_shared_tests::test_concurrent_updates_serialize_to_a_total_order(store)).unwrap();

		datastore_shared_tests::test_enum_codec_round_trips_symbolic_names();
	}
}
