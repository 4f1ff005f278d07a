//! Shared in-memory keyspace backing every `MockTransaction` created from the
//! same `MockDatabase`. Single global lock, optimistic conflict detection at
//! commit time, `tokio::sync::Notify`-based watch delivery.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::NativeError;

use super::mutate;
use crate::api::NativeMutationType;

pub type KeyRange = (Vec<u8>, Vec<u8>);

#[derive(Debug, Clone)]
pub enum PendingOp {
	Set(Vec<u8>, Vec<u8>),
	Clear(Vec<u8>),
	ClearRange(Vec<u8>, Vec<u8>),
	Atomic(Vec<u8>, Vec<u8>, NativeMutationType),
}

struct CommittedWrite {
	version: i64,
	ranges: Vec<KeyRange>,
}

pub struct Store {
	inner: Mutex<Inner>,
}

struct Inner {
	data: BTreeMap<Vec<u8>, Vec<u8>>,
	committed_version: i64,
	history: Vec<CommittedWrite>,
	watch_generations: HashMap<Vec<u8>, u64>,
	watch_notify: HashMap<Vec<u8>, Arc<Notify>>,
}

/// How far back commit history is kept before being pruned. Generous enough
/// that the short-lived transactions in spec.md §8's scenarios never see a
/// false "too old" classification; a real server prunes based on the oldest
/// live read version instead.
const HISTORY_HORIZON: usize = 10_000;

impl Store {
	pub fn new() -> Self {
		Store {
			inner: Mutex::new(Inner {
				data: BTreeMap::new(),
				committed_version: 0,
				history: Vec::new(),
				watch_generations: HashMap::new(),
				watch_notify: HashMap::new(),
			}),
		}
	}

	pub fn current_version(&self) -> i64 {
		self.inner.lock().committed_version
	}

	pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
		self.inner.lock().data.get(key).cloned()
	}

	pub fn get_range(
		&self,
		begin: &[u8],
		end: &[u8],
		reverse: bool,
		limit: Option<usize>,
	) -> (Vec<(Vec<u8>, Vec<u8>)>, bool) {
		let inner = self.inner.lock();
		let mut pairs: Vec<(Vec<u8>, Vec<u8>)> = inner
			.data
			.range(begin.to_vec()..end.to_vec())
			.map(|(k, v)| (k.clone(), v.clone()))
			.collect();
		if reverse {
			pairs.reverse();
		}
		let more = match limit {
			Some(limit) if pairs.len() > limit => {
				pairs.truncate(limit);
				true
			}
			_ => false,
		};
		(pairs, more)
	}

	/// Resolves a key selector against the current keyspace.
	///
	/// `K0` is the largest key satisfying `or_equal ? key <= reference :
	/// key < reference` (rank -1 if none exists); the selector resolves to
	/// the key at `rank(K0) + offset`. Falling off the front returns an
	/// empty key; falling off the back returns a `0xff 0xff` sentinel — an
	/// approximation of the real driver's keyspace-boundary behavior, not a
	/// claim of byte-exact parity.
	pub fn resolve_key_selector(&self, reference_key: &[u8], or_equal: bool, offset: i32) -> Vec<u8> {
		let inner = self.inner.lock();
		let keys: Vec<&Vec<u8>> = inner.data.keys().collect();
		let base_rank = keys
			.iter()
			.rposition(|k| {
				if or_equal {
					k.as_slice() <= reference_key
				} else {
					k.as_slice() < reference_key
				}
			})
			.map(|idx| idx as i64)
			.unwrap_or(-1);
		let target = base_rank + offset as i64;
		if target < 0 {
			Vec::new()
		} else if target as usize >= keys.len() {
			vec![0xff, 0xff]
		} else {
			keys[target as usize].clone()
		}
	}

	pub fn watch_generation(&self, key: &[u8]) -> u64 {
		self.inner
			.lock()
			.watch_generations
			.get(key)
			.copied()
			.unwrap_or(0)
	}

	pub fn watch_notify_handle(&self, key: &[u8]) -> Arc<Notify> {
		let mut inner = self.inner.lock();
		Arc::clone(
			inner
				.watch_notify
				.entry(key.to_vec())
				.or_insert_with(|| Arc::new(Notify::new())),
		)
	}

	/// Attempts to commit `read_version`/`read_conflicts`/`pending` as one
	/// unit. On success returns the new commit version and the resolved
	/// 10-byte versionstamp.
	pub fn commit(
		&self,
		read_version: i64,
		read_conflicts: &[KeyRange],
		write_conflicts: &[KeyRange],
		pending: &[PendingOp],
	) -> Result<(i64, [u8; 10]), NativeError> {
		let mut inner = self.inner.lock();

		for committed in inner.history.iter().filter(|c| c.version > read_version) {
			if ranges_overlap_any(read_conflicts, &committed.ranges) {
				tracing::debug!(
					read_version,
					conflicting_version = committed.version,
					"commit rejected, read conflict against a newer committed write"
				);
				return Err(NativeError::NotCommitted);
			}
		}

		let new_version = inner.committed_version + 1;
		let stamp = versionstamp_bytes(new_version);

		let resolved = resolve_versionstamps(pending, &stamp);

		let mut changed_keys = Vec::new();
		for op in &resolved {
			match op {
				PendingOp::Set(key, value) => {
					let old = inner.data.get(key).cloned();
					if old.as_deref() != Some(value.as_slice()) {
						changed_keys.push(key.clone());
					}
					inner.data.insert(key.clone(), value.clone());
				}
				PendingOp::Clear(key) => {
					let old = inner.data.remove(key);
					if old.is_some() {
						changed_keys.push(key.clone());
					}
				}
				PendingOp::ClearRange(begin, end) => {
					let keys: Vec<Vec<u8>> = inner
						.data
						.range(begin.clone()..end.clone())
						.map(|(k, _)| k.clone())
						.collect();
					for key in keys {
						inner.data.remove(&key);
						changed_keys.push(key);
					}
				}
				PendingOp::Atomic(key, param, kind) => {
					let existing = inner.data.get(key).cloned();
					let new_value = mutate::apply(existing.as_deref(), param, *kind);
					match new_value {
						Some(value) => {
							if existing.as_deref() != Some(value.as_slice()) {
								changed_keys.push(key.clone());
							}
							inner.data.insert(key.clone(), value);
						}
						None => {
							if inner.data.remove(key).is_some() {
								changed_keys.push(key.clone());
							}
						}
					}
				}
			}
		}

		for key in &changed_keys {
			let gen = inner.watch_generations.entry(key.clone()).or_insert(0);
			*gen += 1;
			if let Some(notify) = inner.watch_notify.get(key) {
				notify.notify_waiters();
			}
		}

		inner.committed_version = new_version;
		inner.history.push(CommittedWrite {
			version: new_version,
			ranges: write_conflicts.to_vec(),
		});
		if inner.history.len() > HISTORY_HORIZON {
			let drop = inner.history.len() - HISTORY_HORIZON;
			inner.history.drain(0..drop);
		}

		Ok((new_version, stamp))
	}
}

fn ranges_overlap_any(a: &[KeyRange], b: &[KeyRange]) -> bool {
	a.iter()
		.any(|lhs| b.iter().any(|rhs| ranges_overlap(lhs, rhs)))
}

fn ranges_overlap(a: &KeyRange, b: &KeyRange) -> bool {
	a.0 < b.1 && b.0 < a.1
}

/// Encodes a commit version as a 10-byte versionstamp: 8-byte big-endian
/// transaction version followed by a 2-byte big-endian in-transaction order
/// (always zero here, since the mock applies a whole transaction as one
/// atomic step rather than ordering multiple commits within it).
fn versionstamp_bytes(version: i64) -> [u8; 10] {
	let mut out = [0u8; 10];
	out[..8].copy_from_slice(&version.to_be_bytes());
	out
}

/// Finds `SetVersionstampedKey`/`SetVersionstampedValue` ops and substitutes
/// the trailing placeholder with the real `stamp`, per the incomplete
/// versionstamp protocol (10 placeholder bytes + 4-byte little-endian
/// position suffix, see spec.md's versionstamp section).
fn resolve_versionstamps(pending: &[PendingOp], stamp: &[u8; 10]) -> Vec<PendingOp> {
	pending
		.iter()
		.map(|op| match op {
			PendingOp::Atomic(key, param, NativeMutationType::SetVersionstampedKey) => {
				let resolved_key = substitute_stamp(key, stamp);
				PendingOp::Set(resolved_key, param.clone())
			}
			PendingOp::Atomic(key, param, NativeMutationType::SetVersionstampedValue) => {
				let resolved_value = substitute_stamp(param, stamp);
				PendingOp::Set(key.clone(), resolved_value)
			}
			PendingOp::Atomic(key, param, NativeMutationType::SetVersionstampedKeyFixedVariant) => {
				let resolved_key = substitute_stamp_fixed_variant(key, stamp);
				PendingOp::Set(resolved_key, param.clone())
			}
			other => other.clone(),
		})
		.collect()
}

fn substitute_stamp(buf: &[u8], stamp: &[u8; 10]) -> Vec<u8> {
	assert!(
		buf.len() >= 14,
		"versionstamped key/value must carry a 10-byte placeholder plus 4-byte position suffix"
	);
	let pos_bytes = &buf[buf.len() - 4..];
	let pos = u32::from_le_bytes([pos_bytes[0], pos_bytes[1], pos_bytes[2], pos_bytes[3]]) as usize;
	let mut out = buf[..buf.len() - 4].to_vec();
	out[pos..pos + 10].copy_from_slice(stamp);
	out
}

/// As `substitute_stamp`, but for the pre-API-520 wire format: a 2-byte
/// little-endian position suffix instead of 4.
fn substitute_stamp_fixed_variant(buf: &[u8], stamp: &[u8; 10]) -> Vec<u8> {
	assert!(
		buf.len() >= 12,
		"versionstamped key must carry a 10-byte placeholder plus 2-byte position suffix"
	);
	let pos_bytes = &buf[buf.len() - 2..];
	let pos = u16::from_le_bytes([pos_bytes[0], pos_bytes[1]]) as usize;
	let mut out = buf[..buf.len() - 2].to_vec();
	out[pos..pos + 10].copy_from_slice(stamp);
	out
}
