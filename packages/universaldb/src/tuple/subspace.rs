//! Key subspace: a prefix byte slice plus a policy for constructing child
//! keys (spec.md §3/§4.2). `DynamicSubspace` accepts any tuple; `TypedSubspace`
//! fixes the element type at creation, matching spec.md's requirement that
//! both a dynamic and a typed variant implement the same contract.

use std::marker::PhantomData;

use super::{PackError, TuplePack, TupleUnpack};
use crate::error::FdbBindingError;

/// The default, tuple-agnostic subspace. Referred to as just `Subspace`
/// throughout the rest of the crate and by call sites (`universaldb::tuple::Subspace`,
/// `universaldb::utils::Subspace`), matching the teacher's own naming.
pub type Subspace = DynamicSubspace;

/// A prefix byte slice plus the policy for building keys under it. Appending
/// any tuple (`child`/`subspace`/`pack`) is allowed; nothing about the
/// element types is fixed at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DynamicSubspace {
	prefix: Vec<u8>,
}

impl DynamicSubspace {
	/// An empty-prefix subspace spanning the entire user key-space.
	pub fn all() -> Self {
		DynamicSubspace { prefix: Vec::new() }
	}

	pub fn from_bytes(prefix: impl Into<Vec<u8>>) -> Self {
		DynamicSubspace {
			prefix: prefix.into(),
		}
	}

	pub fn from_tuple<T: TuplePack>(prefix: &T) -> Self {
		DynamicSubspace {
			prefix: super::pack(prefix),
		}
	}

	pub fn prefix(&self) -> &[u8] {
		&self.prefix
	}

	/// Whether `key` starts with this subspace's prefix.
	pub fn contains(&self, key: &[u8]) -> bool {
		key.starts_with(&self.prefix)
	}

	/// A subspace with `slice` appended to the prefix verbatim (not
	/// tuple-encoded) — for callers building a raw byte-string suffix rather
	/// than an additional tuple element.
	pub fn append_bytes(&self, slice: &[u8]) -> Self {
		let mut prefix = self.prefix.clone();
		prefix.extend_from_slice(slice);
		DynamicSubspace { prefix }
	}

	/// A subspace for `prefix() || tuple_encode(item)` (spec.md §4.2:
	/// `child(x).prefix() = prefix() || encode(x)`).
	pub fn child<T: TuplePack>(&self, item: &T) -> Self {
		let mut prefix = self.prefix.clone();
		prefix.extend(super::pack(item));
		DynamicSubspace { prefix }
	}

	/// Alias for [`Self::child`] matching the teacher's dominant calling
	/// convention (`subspace.subspace(&key)`, e.g.
	/// `actor-kv/src/lib.rs`'s `subspace(actor_id).subspace(&KeyWrapper(key))`).
	pub fn subspace<T: TuplePack>(&self, item: &T) -> Self {
		self.child(item)
	}

	/// `prefix() || tuple_encode(item)` (spec.md §4.2's `pack`).
	pub fn pack<T: TuplePack>(&self, item: &T) -> Vec<u8> {
		let mut out = self.prefix.clone();
		out.extend(super::pack(item));
		out
	}

	/// As [`Self::pack`], but `item` must contain exactly one incomplete
	/// versionstamp; returns the key plus trailing 4-byte LE position suffix
	/// `SetVersionstampedKey` needs, with the offset adjusted for this
	/// subspace's prefix length.
	pub fn pack_with_versionstamp<T: TuplePack>(&self, item: &T) -> Result<Vec<u8>, FdbBindingError> {
		let (tail, offset) = super::pack_with_versionstamp_offset(item)?;
		let mut out = self.prefix.clone();
		out.extend(tail);
		let absolute_offset = offset + self.prefix.len() as u32;
		out.extend_from_slice(&absolute_offset.to_le_bytes());
		Ok(out)
	}

	/// Decodes `key` relative to this subspace: strips the prefix, then
	/// tuple-decodes the remainder. Fails with [`FdbBindingError::ForeignKey`]
	/// if `key` does not start with `prefix()` (spec.md §4.2).
	pub fn unpack<'de, T: TupleUnpack<'de>>(&self, key: &'de [u8]) -> Result<T, FdbBindingError> {
		let stripped = self.strip(key)?;
		super::unpack(stripped)
	}

	/// As [`Self::unpack`] but only decodes the first element, discarding
	/// the rest (spec.md §4.1's `decode_first`).
	pub fn unpack_first<'de, T: TupleUnpack<'de>>(&self, key: &'de [u8]) -> Result<T, FdbBindingError> {
		let stripped = self.strip(key)?;
		super::unpack_first(stripped)
	}

	/// Decodes only the last element of the tuple following this subspace's
	/// prefix (spec.md §4.1's `decode_last`): every element is walked so the
	/// final one's byte range can be located, then only that element is
	/// materialized.
	pub fn unpack_last<'de, T: TupleUnpack<'de>>(&self, key: &'de [u8]) -> Result<T, FdbBindingError> {
		let mut stripped = self.strip(key)?;
		loop {
			let rest = skip_one_element(stripped)?;
			if rest.is_empty() {
				break;
			}
			stripped = rest;
		}
		super::unpack(stripped)
	}

	fn strip<'de>(&self, key: &'de [u8]) -> Result<&'de [u8], FdbBindingError> {
		key.strip_prefix(self.prefix.as_slice())
			.ok_or(FdbBindingError::ForeignKey)
	}

	/// `(begin, end)` covering every key with this prefix: `begin` is the
	/// prefix itself, `end` is the prefix with `0xFF` appended (no valid
	/// tuple encoding's first byte at this depth can start a longer key that
	/// would sort at or past that boundary).
	pub fn range(&self) -> (Vec<u8>, Vec<u8>) {
		let begin = self.prefix.clone();
		let mut end = self.prefix.clone();
		end.push(0xff);
		(begin, end)
	}

	/// Narrows to a `TypedSubspace<T>` fixing the element type this
	/// subspace's keys are built from.
	pub fn typed<T>(&self) -> TypedSubspace<T> {
		TypedSubspace {
			inner: self.clone(),
			_marker: PhantomData,
		}
	}
}

impl From<Vec<u8>> for DynamicSubspace {
	fn from(prefix: Vec<u8>) -> Self {
		DynamicSubspace { prefix }
	}
}

/// Walks one tuple element from the front of `input`, returning the
/// remainder. Used by [`DynamicSubspace::unpack_last`] to find where the
/// final element starts without having to know its type — `Element` is
/// `foundationdb-tuple`'s type-erased catch-all, able to decode any single
/// tuple-encoded value regardless of which variant it is.
fn skip_one_element(input: &[u8]) -> Result<&[u8], FdbBindingError> {
	let (rest, _elem) = foundationdb_tuple::Element::unpack(input, super::TupleDepth::new())
		.map_err(|e: PackError| FdbBindingError::TupleError(e.to_string()))?;
	Ok(rest)
}

/// A subspace whose child keys are always built from a fixed element type
/// `T` (spec.md §4.2's typed variant: "compile-time element types and an
/// `operator[](t)` shorthand").
#[derive(Debug, Clone)]
pub struct TypedSubspace<T> {
	inner: DynamicSubspace,
	_marker: PhantomData<T>,
}

impl<T> TypedSubspace<T> {
	pub fn new(prefix: impl Into<Vec<u8>>) -> Self {
		TypedSubspace {
			inner: DynamicSubspace::from_bytes(prefix),
			_marker: PhantomData,
		}
	}

	pub fn prefix(&self) -> &[u8] {
		self.inner.prefix()
	}

	pub fn contains(&self, key: &[u8]) -> bool {
		self.inner.contains(key)
	}

	pub fn range(&self) -> (Vec<u8>, Vec<u8>) {
		self.inner.range()
	}

	pub fn as_dynamic(&self) -> &DynamicSubspace {
		&self.inner
	}
}

impl<T: TuplePack> TypedSubspace<T> {
	pub fn pack(&self, item: &T) -> Vec<u8> {
		self.inner.pack(item)
	}

	/// `operator[](t)` shorthand named in spec.md §4.2.
	pub fn key(&self, item: &T) -> Vec<u8> {
		self.pack(item)
	}
}

impl<'de, T: TupleUnpack<'de>> TypedSubspace<T> {
	pub fn unpack(&self, key: &'de [u8]) -> Result<T, FdbBindingError> {
		self.inner.unpack(key)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn child_prefix_is_parent_plus_tuple_encoding() {
		let root = DynamicSubspace::from_bytes(b"root".to_vec());
		let child = root.child(&(1i64, "a".to_string()));
		let mut expected = b"root".to_vec();
		expected.extend(super::super::pack(&(1i64, "a".to_string())));
		assert_eq!(child.prefix(), expected.as_slice());
	}

	#[test]
	fn pack_then_unpack_round_trips() {
		let s = DynamicSubspace::from_bytes(b"s".to_vec());
		let t = (1i64, "hello".to_string());
		let key = s.pack(&t);
		assert!(key.starts_with(b"s"));
		let decoded: (i64, String) = s.unpack(&key).unwrap();
		assert_eq!(decoded, t);
	}

	#[test]
	fn unpack_rejects_foreign_prefix() {
		let s = DynamicSubspace::from_bytes(b"s".to_vec());
		let other = DynamicSubspace::from_bytes(b"other".to_vec());
		let key = other.pack(&(1i64,));
		let result: Result<(i64,), _> = s.unpack(&key);
		assert!(matches!(result, Err(FdbBindingError::ForeignKey)));
	}

	#[test]
	fn empty_suffix_round_trips_to_same_subspace() {
		let s = DynamicSubspace::from_bytes(b"s".to_vec());
		let child = s.child(&());
		assert_eq!(child.prefix(), s.prefix());
	}

	#[test]
	fn range_covers_every_child_key() {
		let s = DynamicSubspace::from_bytes(b"s".to_vec());
		let (begin, end) = s.range();
		let child_key = s.pack(&(1i64, "z".to_string()));
		assert!(child_key.as_slice() >= begin.as_slice());
		assert!(child_key.as_slice() < end.as_slice());
	}
}
