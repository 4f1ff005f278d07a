//! The byte-slice primitive (spec.md §3): an owned-or-borrowed contiguous
//! byte buffer, with *nil*, *empty*, and *non-empty* as three distinguished
//! states. Backed by `bytes::Bytes`, whose cheap refcounted slicing covers
//! both the owned and "borrowed from a native future" cases spec.md's
//! design notes (§9) call out — the driver boundary here always hands back
//! owned `Vec<u8>` (see `universaldb_driver::api`), so there is no native
//! future lifetime to tie a borrow to; `Bytes` still gives zero-copy
//! slicing when a value is carved out of a larger buffer (range chunks).

use bytes::Bytes;

/// Reserved sentinel marking the start of the user key-space (spec.md §3).
pub const MIN: &[u8] = &[0x00];
/// Reserved sentinel marking the end of the user key-space; the system
/// key-space begins here and requires an explicit option to read.
pub const MAX: &[u8] = &[0xff];

/// A non-nil byte slice used for keys.
pub type Key = Bytes;

/// The result of a `get`: `None` when the key is absent (*nil*), `Some`
/// (possibly empty) when it has a value. Distinguishing `None` from
/// `Some(empty)` is semantic and observable to callers (spec.md §3, §8).
pub type FdbSlice = Option<Bytes>;

/// Whether `slice` is nil (the key was absent).
pub fn is_nil(slice: &FdbSlice) -> bool {
	slice.is_none()
}

/// Whether `slice` is present but zero-length.
pub fn is_empty(slice: &FdbSlice) -> bool {
	matches!(slice, Some(b) if b.is_empty())
}

/// Whether `slice` is present and non-empty.
pub fn is_non_empty(slice: &FdbSlice) -> bool {
	matches!(slice, Some(b) if !b.is_empty())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn nil_empty_non_empty_are_distinguishable() {
		let nil: FdbSlice = None;
		let empty: FdbSlice = Some(Bytes::new());
		let non_empty: FdbSlice = Some(Bytes::from_static(b"x"));

		assert!(is_nil(&nil) && !is_empty(&nil) && !is_non_empty(&nil));
		assert!(!is_nil(&empty) && is_empty(&empty) && !is_non_empty(&empty));
		assert!(!is_nil(&non_empty) && !is_empty(&non_empty) && is_non_empty(&non_empty));
	}
}
