//! The tuple codec (spec.md §4.1) and the subspace/key-selector layer built
//! on top of it (spec.md §4.2).
//!
//! Element encoding for the primitive types (nil, byte string, text string,
//! signed integer, float/double, bool, UUID, nested tuple) is delegated to
//! `foundationdb-tuple`'s `TuplePack`/`TupleUnpack` traits — the same traits
//! the teacher's own key types (`LeaseKey`, `TagKey`, ... in
//! `chirp-workflow/core/src/db/fdb_sqlite_nats/keys/workflow.rs`) implement
//! directly. `Subspace` and `VersionStamp` are hand-built on top: the
//! subspace needs spec-specific operations (`contains`, `append_bytes`,
//! typed variants, foreign-key detection) the raw crate doesn't carry, and
//! the versionstamp needs the 80/96-bit incomplete/complete protocol and
//! textual round-trip format spec.md §6 spells out in more detail than the
//! crate's own `Versionstamp` type exposes.

pub mod subspace;
pub mod versionstamp;

pub use foundationdb_tuple::{PackError, PackResult, TupleDepth, TuplePack, TupleUnpack, VersionstampOffset};
pub use subspace::{DynamicSubspace, Subspace, TypedSubspace};
pub use versionstamp::VersionStamp;

use crate::error::FdbBindingError;

/// Encodes a tuple (any `TuplePack` value, usually a Rust tuple literal) to
/// its order-preserving byte representation. Contract: `decode(encode(t)) ==
/// t` and `compare(encode(a), encode(b)) == compare(a, b)` (spec.md §4.1).
pub fn pack<T: TuplePack>(value: &T) -> Vec<u8> {
	let mut out = Vec::new();
	value
		.pack(&mut out, TupleDepth::new())
		.expect("in-memory Vec<u8> writes are infallible");
	out
}

/// Encodes `value`, returning the raw bytes plus the byte offset of the
/// incomplete versionstamp within them if one was present. Refuses (spec.md
/// §4.1) unless the caller opted in by actually including a
/// `VersionStamp::incomplete(..)` somewhere in `value` — the codec will not
/// silently emit a stamp-shaped prefix otherwise, since the 0xff type-tag
/// byte it uses is reserved.
pub(crate) fn pack_with_versionstamp_offset<T: TuplePack>(
	value: &T,
) -> Result<(Vec<u8>, u32), FdbBindingError> {
	let mut out = Vec::new();
	let offset = value
		.pack(&mut out, TupleDepth::new())
		.map_err(|e| FdbBindingError::TupleError(e.to_string()))?;
	match offset {
		VersionstampOffset::Some { offset } => Ok((out, offset)),
		VersionstampOffset::None { .. } => Err(FdbBindingError::TupleError(
			"pack_with_versionstamp called on a tuple with no incomplete versionstamp".to_string(),
		)),
	}
}

/// Encodes a tuple that contains exactly one incomplete versionstamp,
/// appending the 4-byte little-endian position suffix the
/// `SetVersionstampedKey`/`SetVersionstampedValue` atomic ops require.
pub fn pack_with_versionstamp<T: TuplePack>(value: &T) -> Result<Vec<u8>, FdbBindingError> {
	let (mut out, offset) = pack_with_versionstamp_offset(value)?;
	out.extend_from_slice(&offset.to_le_bytes());
	Ok(out)
}

/// Decodes a full tuple. Contract: round-trips with `pack`.
pub fn unpack<'de, T: TupleUnpack<'de>>(bytes: &'de [u8]) -> Result<T, FdbBindingError> {
	let (rest, value) =
		T::unpack(bytes, TupleDepth::new()).map_err(|e| FdbBindingError::TupleError(e.to_string()))?;
	if !rest.is_empty() {
		return Err(FdbBindingError::TupleError(format!(
			"{} trailing byte(s) after decoding tuple",
			rest.len()
		)));
	}
	Ok(value)
}

/// Decodes only the first element of a tuple, ignoring the rest (spec.md
/// §4.1's `decode_first`).
pub fn unpack_first<'de, T: TupleUnpack<'de>>(bytes: &'de [u8]) -> Result<T, FdbBindingError> {
	let (_, value) =
		T::unpack(bytes, TupleDepth::new()).map_err(|e| FdbBindingError::TupleError(e.to_string()))?;
	Ok(value)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_heterogeneous_tuple() {
		let t = (1i64, "hello".to_string(), true, 3.5f64);
		let bytes = pack(&t);
		let decoded: (i64, String, bool, f64) = unpack(&bytes).unwrap();
		assert_eq!(t, decoded);
	}

	#[test]
	fn encoding_preserves_order() {
		let a = pack(&(1i64, "a".to_string()));
		let b = pack(&(1i64, "b".to_string()));
		let c = pack(&(2i64, "a".to_string()));
		assert!(a < b);
		assert!(b < c);
	}

	#[test]
	fn nested_tuples_round_trip() {
		let t = (1i64, (2i64, 3i64), "x".to_string());
		let bytes = pack(&t);
		let decoded: (i64, (i64, i64), String) = unpack(&bytes).unwrap();
		assert_eq!(t, decoded);
	}
}
