//! Key selectors (spec.md §3, §4.4): `(reference_key, or_equal, offset)`,
//! resolving to the key that is `offset` keys to the right of the largest
//! key satisfying the reference. Mirrors `NativeKeySelector` one-for-one,
//! adding the four named constructors and integer shifting spec.md names.

use universaldb_driver::NativeKeySelector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySelector {
	pub key: Vec<u8>,
	pub or_equal: bool,
	pub offset: i32,
}

impl KeySelector {
	pub fn new(key: impl Into<Vec<u8>>, or_equal: bool, offset: i32) -> Self {
		KeySelector {
			key: key.into(),
			or_equal,
			offset,
		}
	}

	/// The first key `>= key`.
	pub fn first_greater_or_equal(key: impl Into<Vec<u8>>) -> Self {
		KeySelector::new(key, false, 1)
	}

	/// The first key `> key`.
	pub fn first_greater_than(key: impl Into<Vec<u8>>) -> Self {
		KeySelector::new(key, true, 1)
	}

	/// The last key `<= key`.
	pub fn last_less_or_equal(key: impl Into<Vec<u8>>) -> Self {
		KeySelector::new(key, true, 0)
	}

	/// The last key `< key`.
	pub fn last_less_than(key: impl Into<Vec<u8>>) -> Self {
		KeySelector::new(key, false, 0)
	}

	/// Shifts the selector `n` keys further to the right (negative `n`
	/// shifts left), preserving the reference key and `or_equal` flag.
	pub fn add(&self, n: i32) -> Self {
		KeySelector {
			key: self.key.clone(),
			or_equal: self.or_equal,
			offset: self.offset + n,
		}
	}

	pub fn reference_key(&self) -> &[u8] {
		&self.key
	}

	pub(crate) fn into_native(self) -> NativeKeySelector {
		NativeKeySelector::new(self.key, self.or_equal, self.offset)
	}

	pub(crate) fn to_native(&self) -> NativeKeySelector {
		NativeKeySelector::new(self.key.clone(), self.or_equal, self.offset)
	}
}

impl From<Vec<u8>> for KeySelector {
	/// A bare key defaults to `first_greater_or_equal`, matching the
	/// common `(begin, end).into()` range-construction shorthand.
	fn from(key: Vec<u8>) -> Self {
		KeySelector::first_greater_or_equal(key)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn named_constructors_set_expected_flags() {
		let ge = KeySelector::first_greater_or_equal(b"k".to_vec());
		assert_eq!((ge.or_equal, ge.offset), (false, 1));

		let gt = KeySelector::first_greater_than(b"k".to_vec());
		assert_eq!((gt.or_equal, gt.offset), (true, 1));

		let le = KeySelector::last_less_or_equal(b"k".to_vec());
		assert_eq!((le.or_equal, le.offset), (true, 0));

		let lt = KeySelector::last_less_than(b"k".to_vec());
		assert_eq!((lt.or_equal, lt.offset), (false, 0));
	}

	#[test]
	fn add_shifts_offset_without_touching_key() {
		let s = KeySelector::first_greater_or_equal(b"k".to_vec()).add(3);
		assert_eq!(s.offset, 4);
		assert_eq!(s.key, b"k".to_vec());
	}
}
