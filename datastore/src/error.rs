// Copyright 2024 Datastore Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error taxonomy for the datastore core.
//!
//! `CodecCorruption` is intentionally absent: malformed codec bytes are
//! recovered locally (read returns the handle's default) and never
//! surfaced as an error. Corruption is only observable via a `log::warn!`
//! at the point of recovery.

use std::io;

/// Errors the datastore core can report to callers.
#[derive(Debug, thiserror::Error)]
pub enum DatastoreError {
	/// A handle was constructed with a blank key.
	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	/// A handle that does not implement the accessor protocol for batch
	/// participation was passed into a batch scope.
	#[error("handle `{0}` does not support batch operations")]
	NotSupported(String),

	/// A backup record failed to parse, or contained an unrecognized tag.
	#[error("failed to parse backup record: {0}")]
	BackupParse(String),

	/// Durable commit or load failed.
	#[error("storage I/O error: {0}")]
	Io(#[from] io::Error),

	/// The caller's async operation was cancelled before it completed.
	#[error("operation was cancelled")]
	Cancelled,
}

pub type Result<T> = std::result::Result<T, DatastoreError>;
