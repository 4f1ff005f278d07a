//! Typed key helpers (SPEC_FULL.md §2 supplement): a per-logical-key type
//! implements `TuplePack`/`TupleUnpack` for the key bytes and
//! `FormalKey`/`FormalChunkedKey` for the value codec, so call sites read
//! `tx.read::<MyKey>(&key, iso)` instead of juggling raw bytes. Grounded on
//! `LeaseKey`/`TagKey` (plain) and `InputKey`/`InputChunkKey` (chunked) in
//! `chirp-workflow/core/src/db/fdb_sqlite_nats/keys/workflow.rs`.

use crate::range::FdbValue;
use crate::tuple::TuplePack;

/// A key type whose value is serialized/deserialized as a single blob.
/// Implementors typically also implement `TuplePack`/`TupleUnpack` for the
/// key bytes themselves (e.g. `LeaseKey(workflow_id) -> (WORKFLOW, LEASE,
/// workflow_id)`), but that's independent of this trait.
pub trait FormalKey {
	type Value;

	fn deserialize(&self, raw: &[u8]) -> anyhow::Result<Self::Value>;

	fn serialize(&self, value: Self::Value) -> anyhow::Result<Vec<u8>>;
}

/// A key type whose value is too large (or structurally suited) to be
/// stored as a single blob, and is instead split across numbered
/// sub-keys ("chunks") and recombined on read. Grounded on
/// `InputKey`/`InputChunkKey` in `workflow.rs`, which splits oversized
/// workflow input payloads this way.
pub trait FormalChunkedKey {
	/// The per-chunk sub-key type, typically `(ParentTuple…, chunk_index)`.
	type ChunkKey: TuplePack;
	type Value;

	/// The sub-key for chunk number `chunk` (0-indexed).
	fn chunk(&self, chunk: usize) -> Self::ChunkKey;

	/// Recombines chunk values read back in order (chunk 0 first) into the
	/// logical value.
	fn combine(&self, chunks: Vec<FdbValue>) -> anyhow::Result<Self::Value>;

	/// Splits a logical value into the raw bytes of each chunk, in order.
	fn split(&self, value: Self::Value) -> anyhow::Result<Vec<Vec<u8>>>;
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tuple::{PackResult, TupleDepth, TupleUnpack, VersionstampOffset};
	use std::io::Write;

	struct CounterKey(String);

	impl FormalKey for CounterKey {
		type Value = i64;

		fn deserialize(&self, raw: &[u8]) -> anyhow::Result<i64> {
			Ok(serde_json::from_slice(raw)?)
		}

		fn serialize(&self, value: i64) -> anyhow::Result<Vec<u8>> {
			Ok(serde_json::to_vec(&value)?)
		}
	}

	impl TuplePack for CounterKey {
		fn pack<W: Write>(&self, w: &mut W, tuple_depth: TupleDepth) -> std::io::Result<VersionstampOffset> {
			(self.0.as_str(),).pack(w, tuple_depth)
		}
	}

	impl<'de> TupleUnpack<'de> for CounterKey {
		fn unpack(input: &'de [u8], tuple_depth: TupleDepth) -> PackResult<(&'de [u8], Self)> {
			let (rest, (name,)) = <(String,)>::unpack(input, tuple_depth)?;
			Ok((rest, CounterKey(name)))
		}
	}

	#[test]
	fn formal_key_round_trips_through_json() {
		let key = CounterKey("visits".to_string());
		let bytes = key.serialize(42).unwrap();
		assert_eq!(key.deserialize(&bytes).unwrap(), 42);
	}
}
