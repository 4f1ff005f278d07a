//! Atomic mutation application for the in-memory mock store.
//!
//! Mirrors the byte-level semantics of the real atomic ops (little-endian
//! integer arithmetic, bytewise logic, lexicographic byte comparisons)
//! closely enough to exercise the retry-loop and value-check scenarios in
//! spec.md §8. Not a claim of bit-for-bit parity with any real driver.

use crate::api::NativeMutationType;

const MAX_VALUE_SIZE: usize = 100_000;

/// Applies `op` to `existing` (the key's current value, if any) with
/// parameter `param`, returning the new value. `None` means "clear the key".
pub fn apply(existing: Option<&[u8]>, param: &[u8], op: NativeMutationType) -> Option<Vec<u8>> {
	match op {
		NativeMutationType::Add => Some(little_endian_add(existing, param)),
		NativeMutationType::BitAnd => Some(bytewise(existing, param, |a, b| a & b)),
		NativeMutationType::BitOr => Some(bytewise(existing, param, |a, b| a | b)),
		NativeMutationType::BitXor => Some(bytewise(existing, param, |a, b| a ^ b)),
		NativeMutationType::Min => {
			let current = extend_or_truncate(existing, param.len());
			if little_endian_cmp(&current, param) == std::cmp::Ordering::Less {
				Some(current)
			} else {
				Some(param.to_vec())
			}
		}
		NativeMutationType::Max => {
			let current = extend_or_truncate(existing, param.len());
			if little_endian_cmp(&current, param) == std::cmp::Ordering::Greater {
				Some(current)
			} else {
				Some(param.to_vec())
			}
		}
		NativeMutationType::ByteMin => match existing {
			Some(current) if current < param => Some(current.to_vec()),
			Some(_) => Some(param.to_vec()),
			None => Some(param.to_vec()),
		},
		NativeMutationType::ByteMax => match existing {
			Some(current) if current > param => Some(current.to_vec()),
			Some(_) => Some(param.to_vec()),
			None => Some(param.to_vec()),
		},
		NativeMutationType::CompareAndClear => match existing {
			Some(current) if current == param => None,
			Some(current) => Some(current.to_vec()),
			None => None,
		},
		NativeMutationType::AppendIfFits => {
			let mut out = existing.map(|v| v.to_vec()).unwrap_or_default();
			if out.len() + param.len() > MAX_VALUE_SIZE {
				existing.map(|v| v.to_vec())
			} else {
				out.extend_from_slice(param);
				Some(out)
			}
		}
		NativeMutationType::SetVersionstampedKey
		| NativeMutationType::SetVersionstampedValue
		| NativeMutationType::SetVersionstampedKeyFixedVariant => {
			unreachable!("versionstamp mutations are resolved by the commit path, not apply()")
		}
	}
}

fn extend_or_truncate(existing: Option<&[u8]>, len: usize) -> Vec<u8> {
	let mut out = existing.map(|v| v.to_vec()).unwrap_or_default();
	out.resize(len, 0);
	out.truncate(len);
	out
}

fn bytewise(existing: Option<&[u8]>, param: &[u8], f: impl Fn(u8, u8) -> u8) -> Vec<u8> {
	let current = extend_or_truncate(existing, param.len());
	current
		.iter()
		.zip(param.iter())
		.map(|(a, b)| f(*a, *b))
		.collect()
}

fn little_endian_add(existing: Option<&[u8]>, param: &[u8]) -> Vec<u8> {
	let current = extend_or_truncate(existing, param.len());
	let mut out = vec![0u8; param.len()];
	let mut carry: u16 = 0;
	for i in 0..param.len() {
		let sum = current[i] as u16 + param[i] as u16 + carry;
		out[i] = sum as u8;
		carry = sum >> 8;
	}
	out
}

/// Compares two equal-length byte slices as little-endian unsigned integers.
fn little_endian_cmp(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
	for i in (0..a.len().min(b.len())).rev() {
		match a[i].cmp(&b[i]) {
			std::cmp::Ordering::Equal => continue,
			other => return other,
		}
	}
	std::cmp::Ordering::Equal
}
