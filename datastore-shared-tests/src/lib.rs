// Copyright 2024 Datastore Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Shared conformance tests for `datastore` functionality, to be executed
//! against each concrete backend crate from its own test suite, in the
//! style of `kvdb-shared-tests`.

use std::collections::BTreeSet;
use std::sync::Arc;

use datastore::backend::Backend;
use datastore::document::{DocSnapshot, DocTransaction, WholeDocumentAccessor};
use datastore::flat::{BoolAccessor, EnumCodec, FlatSnapshot, FlatTransaction, I64Accessor, StringAccessor};
use datastore::{Accessor, Datastore, DatastoreError, MappedAccessor, Result};
use tokio_stream::StreamExt;

/// A test for `Handle::get`/`set`/`delete`: a freshly opened datastore
/// yields the default, a write is visible to a later read, and deleting
/// resets the handle to its default.
pub async fn test_primitive_round_trip<B>(store: &Datastore<B>) -> Result<()>
where
	B: Backend<Snapshot = FlatSnapshot, Transaction = FlatTransaction>,
{
	let flag = store.primitive_bool("shared_tests.flag", false)?;
	assert!(!flag.get().await);

	flag.set(true).await?;
	assert!(flag.get().await);

	flag.delete().await?;
	assert!(!flag.get().await);
	Ok(())
}

/// A test for an enum handle's codec-corruption fallback: a cell holding a
/// symbolic name the codec doesn't recognize decodes to the handle's
/// default rather than surfacing an error.
pub async fn test_enum_corruption_falls_back_to_default<B>(store: &Datastore<B>) -> Result<()>
where
	B: Backend<Snapshot = FlatSnapshot, Transaction = FlatTransaction>,
{
	#[derive(Debug, Clone, PartialEq)]
	enum Theme {
		Light,
		Dark,
	}

	fn to_name(t: &Theme) -> &'static str {
		match t {
			Theme::Light => "light",
			Theme::Dark => "dark",
		}
	}

	fn from_name(s: &str) -> Option<Theme> {
		match s {
			"light" => Some(Theme::Light),
			"dark" => Some(Theme::Dark),
			_ => None,
		}
	}

	let theme = store.enum_("shared_tests.theme", Theme::Light, to_name, from_name)?;
	theme.set(Theme::Dark).await?;
	assert_eq!(theme.get().await, Theme::Dark);

	let raw = StringAccessor::new("shared_tests.theme", String::new());
	store.batch_write(|scope| scope.set(&raw, "not-a-theme".to_owned())).await?;
	assert_eq!(theme.get().await, Theme::Light);
	Ok(())
}

/// A test for a nullable codec handle: absence of the underlying cell is
/// `None` regardless of any notion of default, and writing `None` removes
/// the cell rather than storing a sentinel.
pub async fn test_nullable_codec_absence_is_none<B>(store: &Datastore<B>) -> Result<()>
where
	B: Backend<Snapshot = FlatSnapshot, Transaction = FlatTransaction>,
{
	fn to_name(s: &&'static str) -> &'static str {
		*s
	}
	fn from_name(s: &str) -> Option<&'static str> {
		match s {
			"known" => Some("known"),
			_ => None,
		}
	}

	let handle = store.enum_nullable("shared_tests.nullable_enum", to_name, from_name)?;
	assert_eq!(handle.get().await, None);

	handle.set(Some("known")).await?;
	assert_eq!(handle.get().await, Some("known"));

	handle.set(None).await?;
	assert_eq!(handle.get().await, None);
	Ok(())
}

/// A test for `List<T>`'s per-element decode resilience: elements that fail
/// to decode are skipped rather than discarding the whole list, and a
/// malformed (non-array) cell falls back to the handle's default.
pub async fn test_list_skips_undecodable_elements<B>(store: &Datastore<B>) -> Result<()>
where
	B: Backend<Snapshot = FlatSnapshot, Transaction = FlatTransaction>,
{
	let encode = |n: &i32| n.to_string();
	let decode = |s: &str| s.parse::<i32>().ok().filter(|n| *n >= 0);

	let list = store.serialized_list("shared_tests.list", Vec::new(), encode, decode)?;
	list.set(vec![1, 2, 3]).await?;
	assert_eq!(list.get().await, vec![1, 2, 3]);

	let raw = StringAccessor::new("shared_tests.list", String::new());
	store.batch_write(|scope| scope.set(&raw, r#"["1", "-4", "3"]"#.to_owned())).await?;
	assert_eq!(list.get().await, vec![1, 3]);

	store.batch_write(|scope| scope.set(&raw, "not an array".to_owned())).await?;
	assert_eq!(list.get().await, Vec::<i32>::new());
	Ok(())
}

/// A test for `MappedAccessor`: reads and writes go through the conversion
/// functions, and `delete` resets the *source* cell rather than writing the
/// mapped handle's own notion of a default.
pub async fn test_mapped_accessor_round_trips_and_delegates_reset<B>(store: &Datastore<B>) -> Result<()>
where
	B: Backend<Snapshot = FlatSnapshot, Transaction = FlatTransaction>,
{
	let seconds = I64Accessor::new("shared_tests.duration_seconds", 0);
	let minutes = MappedAccessor::new(seconds, |s: i64| s / 60, |m: i64| m * 60);

	store.batch_write(|scope| scope.set(&minutes, 5)).await?;
	let result = store.batch_get(&[&minutes])?;
	assert_eq!(result.get(&minutes), 5);

	let raw_seconds = I64Accessor::new("shared_tests.duration_seconds", 0);
	assert_eq!(store.batch_get(&[&raw_seconds])?.get(&raw_seconds), 300);

	store.batch_write(|scope| scope.delete(&minutes)).await?;
	assert_eq!(store.batch_get(&[&raw_seconds])?.get(&raw_seconds), 0);
	Ok(())
}

/// A test for the batch engine's atomicity: a `batch_write` of several
/// handles is visible as a single all-or-nothing snapshot transition, never
/// a partial write.
pub async fn test_batch_write_is_atomic<B>(store: &Datastore<B>) -> Result<()>
where
	B: Backend<Snapshot = FlatSnapshot, Transaction = FlatTransaction>,
{
	let a = store.primitive_i32("shared_tests.batch_a", 0)?;
	let b = store.primitive_i32("shared_tests.batch_b", 0)?;

	store
		.batch_write(|scope| {
			scope.set(a.accessor(), 1)?;
			scope.set(b.accessor(), 2)?;
			Ok(())
		})
		.await?;

	assert_eq!(a.get().await, 1);
	assert_eq!(b.get().await, 2);
	Ok(())
}

/// A test for `batch_update`'s read-your-writes guarantee: a value set
/// earlier in the same block is visible to a later `get` in that same
/// block, before the transaction commits.
pub async fn test_batch_update_sees_its_own_writes<B>(store: &Datastore<B>) -> Result<()>
where
	B: Backend<Snapshot = FlatSnapshot, Transaction = FlatTransaction>,
{
	let counter = store.primitive_i32("shared_tests.counter", 0)?;

	store
		.batch_update(|scope| {
			scope.set(counter.accessor(), 10)?;
			let seen = scope.get(counter.accessor())?;
			assert_eq!(seen, 10);
			scope.update(counter.accessor(), |n| n + 1)?;
			Ok(())
		})
		.await?;

	assert_eq!(counter.get().await, 11);
	Ok(())
}

/// A test for the whole-document handle's batch exclusion: a handle whose
/// accessor reports `supports_batch() == false` must make `batch_write`
/// fail with `NotSupported` rather than silently skip it.
pub async fn test_document_handle_rejected_by_batch<B, D>(store: &Datastore<B>) -> Result<()>
where
	B: Backend<Snapshot = DocSnapshot<D>, Transaction = DocTransaction<D>>,
	D: Default + Clone + Send + Sync + 'static,
{
	let document = WholeDocumentAccessor::<D>::new(D::default());
	let outcome = store.batch_write(|scope| scope.delete(&document)).await;
	match outcome {
		Err(DatastoreError::NotSupported(_)) => Ok(()),
		Err(other) => panic!("expected NotSupported, got {other:?}"),
		Ok(()) => panic!("expected whole-document batch participation to be rejected"),
	}
}

/// A test for `as_flow`: a freshly subscribed flow's first item is always
/// the current value, even if no write has occurred since subscription.
pub async fn test_flow_primes_with_current_value<B>(store: &Datastore<B>) -> Result<()>
where
	B: Backend<Snapshot = FlatSnapshot, Transaction = FlatTransaction>,
{
	let counter = store.primitive_i32("shared_tests.flow_counter", 7)?;
	let mut flow = counter.as_flow();
	assert_eq!(flow.next().await, Some(7));

	counter.set(8).await?;
	assert_eq!(flow.next().await, Some(8));
	Ok(())
}

/// A test for `state_in`: the hot variant's `current()` always reflects the
/// latest committed value, synchronously.
pub async fn test_state_in_tracks_commits<B>(store: &Datastore<B>) -> Result<()>
where
	B: Backend<Snapshot = FlatSnapshot, Transaction = FlatTransaction>,
{
	let counter = store.primitive_i32("shared_tests.state_counter", 0)?;
	let state = counter.state_in();
	assert_eq!(state.current(), 0);

	counter.set(5).await?;
	tokio::time::sleep(std::time::Duration::from_millis(50)).await;
	assert_eq!(state.current(), 5);
	Ok(())
}

/// A test for the backup engine's export/import round-trip, including the
/// private/app-state filters.
pub async fn test_backup_round_trips_and_filters_private_keys<B>(store: &Datastore<B>) -> Result<()>
where
	B: Backend<Snapshot = FlatSnapshot, Transaction = FlatTransaction>,
{
	let theme = store.primitive_string("shared_tests.backup_theme", "light")?;
	let token = store.primitive_string("_pref_shared_tests.token", "")?;
	theme.set("dark".to_owned()).await?;
	token.set("secret".to_owned()).await?;

	let public_only = store.export(false, true);
	assert!(public_only.preferences.iter().all(|e| e.key != "_pref_shared_tests.token"));

	let everything = store.export(true, true);
	assert!(everything.preferences.iter().any(|e| e.key == "_pref_shared_tests.token"));

	let json = store.export_as_json(true, true)?;
	let other = StringAccessor::new("shared_tests.backup_theme", String::new());
	store.batch_write(|scope| scope.set(&other, String::new())).await?;
	store.import_json(&json, true, true).await?;
	assert_eq!(theme.get().await, "dark");
	Ok(())
}

/// A test for the free-form `Map<String, Any>` import variant: the
/// type-inference table classifies a representative JSON shape per key.
pub async fn test_import_map_infers_types<B>(store: &Datastore<B>) -> Result<()>
where
	B: Backend<Snapshot = FlatSnapshot, Transaction = FlatTransaction>,
{
	let map = serde_json::json!({
		"shared_tests.inferred_bool": true,
		"shared_tests.inferred_set": ["a", "b"],
	});
	let serde_json::Value::Object(map) = map else { unreachable!() };
	store.import_map(map, true, true).await?;

	let flag = BoolAccessor::new("shared_tests.inferred_bool", false);
	assert!(<BoolAccessor as Accessor<B>>::read(&flag, &store.current()));

	let set = store.primitive_string_set("shared_tests.inferred_set", BTreeSet::new())?;
	assert_eq!(set.get().await, BTreeSet::from(["a".to_owned(), "b".to_owned()]));
	Ok(())
}

/// The number of independent concurrent writers exercised by
/// [`test_concurrent_updates_serialize_to_a_total_order`].
pub const CONCURRENT_WRITERS: i32 = 8;

/// A test for the single-writer guarantee: concurrent `update`s against the
/// same counter never lose an increment, i.e. they resolve to some total
/// order rather than a racy read-modify-write.
pub async fn test_concurrent_updates_serialize_to_a_total_order<B>(store: Arc<Datastore<B>>) -> Result<()>
where
	B: Backend<Snapshot = FlatSnapshot, Transaction = FlatTransaction> + 'static,
{
	let counter = store.primitive_i32("shared_tests.concurrent_counter", 0)?;
	let mut tasks = Vec::new();
	for _ in 0..CONCURRENT_WRITERS {
		let counter = counter.clone();
		tasks.push(tokio::spawn(async move { counter.update(|n| n + 1).await }));
	}
	for task in tasks {
		task.await.expect("writer task panicked")?;
	}

	assert_eq!(counter.get().await, CONCURRENT_WRITERS);
	Ok(())
}

/// A test for `EnumCodec` round-tripping via symbolic names, independent of
/// any backend.
pub fn test_enum_codec_round_trips_symbolic_names() {
	#[derive(Debug, Clone, PartialEq)]
	enum Status {
		Active,
		Archived,
	}

	let codec = EnumCodec::new(
		|s: &Status| match s {
			Status::Active => "active",
			Status::Archived => "archived",
		},
		|name: &str| match name {
			"active" => Some(Status::Active),
			"archived" => Some(Status::Archived),
			_ => None,
		},
	);

	use datastore::flat::Codec;
	assert_eq!(codec.decode(&codec.encode(&Status::Active)), Some(Status::Active));
	assert_eq!(codec.decode("unknown"), None);
}
