use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::api::{
	NativeConflictRangeType, NativeKeySelector, NativeMutationType, NativeRangeResult,
	NativeStreamingMode, NativeTransaction, NativeTransactionOption, NativeWatch,
};
use crate::error::NativeError;

use super::store::{PendingOp, Store};
use super::watch::MockWatch;

/// A point key's conflict range, following the convention that a read/write
/// of key `k` conflicts with `[k, k + 0x00)`.
fn point_range(key: &[u8]) -> (Vec<u8>, Vec<u8>) {
	let mut end = key.to_vec();
	end.push(0x00);
	(key.to_vec(), end)
}

fn is_system_key(key: &[u8]) -> bool {
	key.first() == Some(&0xff)
}

pub struct MockTransaction {
	store: Arc<Store>,
	read_version: AtomicI64,
	pending: Mutex<Vec<PendingOp>>,
	read_conflicts: Mutex<Vec<(Vec<u8>, Vec<u8>)>>,
	write_conflicts: Mutex<Vec<(Vec<u8>, Vec<u8>)>>,
	closed: AtomicBool,
	cancelled: AtomicBool,
	committed_version: AtomicI64,
	versionstamp: Mutex<Option<[u8; 10]>>,
	read_system_keys: AtomicBool,
}

impl MockTransaction {
	pub fn new(store: Arc<Store>) -> Arc<Self> {
		let read_version = store.current_version();
		Arc::new(MockTransaction {
			store,
			read_version: AtomicI64::new(read_version),
			pending: Mutex::new(Vec::new()),
			read_conflicts: Mutex::new(Vec::new()),
			write_conflicts: Mutex::new(Vec::new()),
			closed: AtomicBool::new(false),
			cancelled: AtomicBool::new(false),
			committed_version: AtomicI64::new(-1),
			versionstamp: Mutex::new(None),
			read_system_keys: AtomicBool::new(false),
		})
	}

	fn check_legal_key(&self, key: &[u8]) -> Result<(), NativeError> {
		if is_system_key(key) && !self.read_system_keys.load(Ordering::SeqCst) {
			Err(NativeError::KeyOutsideLegalRange)
		} else {
			Ok(())
		}
	}
}

#[async_trait]
impl NativeTransaction for MockTransaction {
	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	fn close(&self) {
		self.closed.store(true, Ordering::SeqCst);
	}

	async fn call_get(&self, key: &[u8], snapshot: bool) -> Result<Option<Vec<u8>>, NativeError> {
		self.check_legal_key(key)?;
		if !snapshot {
			self.read_conflicts.lock().push(point_range(key));
		}
		Ok(self.store.get(key))
	}

	async fn call_get_key(
		&self,
		selector: NativeKeySelector,
		snapshot: bool,
	) -> Result<Vec<u8>, NativeError> {
		let resolved = self.store.resolve_key_selector(
			&selector.reference_key,
			selector.or_equal,
			selector.offset,
		);
		if !snapshot {
			self.read_conflicts.lock().push(point_range(&resolved));
		}
		Ok(resolved)
	}

	async fn call_get_range(
		&self,
		begin: NativeKeySelector,
		end: NativeKeySelector,
		limit: i32,
		_target_bytes: i32,
		_mode: NativeStreamingMode,
		_iteration: i32,
		snapshot: bool,
		reverse: bool,
	) -> Result<NativeRangeResult, NativeError> {
		let begin_key = self
			.store
			.resolve_key_selector(&begin.reference_key, begin.or_equal, begin.offset);
		let end_key = self
			.store
			.resolve_key_selector(&end.reference_key, end.or_equal, end.offset);
		let (begin_key, end_key) = if begin_key <= end_key {
			(begin_key, end_key)
		} else {
			(begin_key.clone(), begin_key)
		};

		let limit = if limit > 0 { Some(limit as usize) } else { None };
		let (pairs, more) = self.store.get_range(&begin_key, &end_key, reverse, limit);

		if !snapshot {
			// A range read only conflicts with writes that would have changed
			// its result under this limit/direction (spec.md §4.4's conflict
			// rules): if the limit cut the range short, narrow the recorded
			// conflict range to what was actually observed rather than the
			// full logical range, so a write past the last returned key
			// doesn't spuriously conflict.
			let conflict_range = if more {
				if reverse {
					let smallest_returned = pairs
						.last()
						.map(|(k, _)| k.clone())
						.unwrap_or_else(|| begin_key.clone());
					(smallest_returned, end_key.clone())
				} else {
					let mut narrowed_end = pairs
						.last()
						.map(|(k, _)| k.clone())
						.unwrap_or_else(|| begin_key.clone());
					narrowed_end.push(0x00);
					(begin_key.clone(), narrowed_end)
				}
			} else {
				(begin_key.clone(), end_key.clone())
			};
			self.read_conflicts.lock().push(conflict_range);
		}

		Ok(NativeRangeResult { pairs, more })
	}

	fn set(&self, key: &[u8], value: &[u8]) {
		self.pending
			.lock()
			.push(PendingOp::Set(key.to_vec(), value.to_vec()));
		self.write_conflicts.lock().push(point_range(key));
	}

	fn clear(&self, key: &[u8]) {
		self.pending.lock().push(PendingOp::Clear(key.to_vec()));
		self.write_conflicts.lock().push(point_range(key));
	}

	fn clear_range(&self, begin: &[u8], end: &[u8]) {
		self.pending
			.lock()
			.push(PendingOp::ClearRange(begin.to_vec(), end.to_vec()));
		self.write_conflicts
			.lock()
			.push((begin.to_vec(), end.to_vec()));
	}

	fn atomic_op(&self, key: &[u8], param: &[u8], op: NativeMutationType) {
		self.pending
			.lock()
			.push(PendingOp::Atomic(key.to_vec(), param.to_vec(), op));
		// Versionstamped writes are only known to resolve inside the target
		// key/value once committed; add a conflict range at the literal
		// placeholder location since that is the best the mock can do ahead
		// of resolution.
		self.write_conflicts.lock().push(point_range(key));
	}

	fn add_conflict_range(
		&self,
		begin: &[u8],
		end: &[u8],
		kind: NativeConflictRangeType,
	) -> Result<(), NativeError> {
		let range = (begin.to_vec(), end.to_vec());
		match kind {
			NativeConflictRangeType::Read => self.read_conflicts.lock().push(range),
			NativeConflictRangeType::Write => self.write_conflicts.lock().push(range),
		}
		Ok(())
	}

	async fn call_commit(&self) -> Result<(), NativeError> {
		if self.cancelled.load(Ordering::SeqCst) {
			return Err(NativeError::TransactionCancelled);
		}
		if self.is_closed() {
			return Err(NativeError::TransactionCancelled);
		}

		let pending = self.pending.lock().clone();
		let read_conflicts = self.read_conflicts.lock().clone();
		let write_conflicts = self.write_conflicts.lock().clone();
		let read_version = self.read_version.load(Ordering::SeqCst);

		let (version, stamp) =
			self.store
				.commit(read_version, &read_conflicts, &write_conflicts, &pending)?;

		self.committed_version.store(version, Ordering::SeqCst);
		*self.versionstamp.lock() = Some(stamp);
		self.closed.store(true, Ordering::SeqCst);
		Ok(())
	}

	async fn call_on_error(&self, err: NativeError) -> Result<(), NativeError> {
		if err.is_retryable() {
			tracing::debug!(error = ?err, "resetting transaction for retry");
			self.reset();
			Ok(())
		} else {
			tracing::debug!(error = ?err, "error is not retryable");
			Err(err)
		}
	}

	fn reset(&self) {
		self.pending.lock().clear();
		self.read_conflicts.lock().clear();
		self.write_conflicts.lock().clear();
		self.read_version
			.store(self.store.current_version(), Ordering::SeqCst);
		self.closed.store(false, Ordering::SeqCst);
		self.cancelled.store(false, Ordering::SeqCst);
		self.committed_version.store(-1, Ordering::SeqCst);
		*self.versionstamp.lock() = None;
	}

	fn cancel(&self) {
		self.cancelled.store(true, Ordering::SeqCst);
	}

	fn set_read_version(&self, version: i64) {
		self.read_version.store(version, Ordering::SeqCst);
	}

	async fn call_get_read_version(&self) -> Result<i64, NativeError> {
		Ok(self.read_version.load(Ordering::SeqCst))
	}

	fn get_committed_version(&self) -> Result<i64, NativeError> {
		Ok(self.committed_version.load(Ordering::SeqCst))
	}

	async fn call_get_approximate_size(&self) -> Result<i64, NativeError> {
		let pending = self.pending.lock();
		let size: usize = pending
			.iter()
			.map(|op| match op {
				PendingOp::Set(k, v) => k.len() + v.len(),
				PendingOp::Clear(k) => k.len(),
				PendingOp::ClearRange(b, e) => b.len() + e.len(),
				PendingOp::Atomic(k, p, _) => k.len() + p.len(),
			})
			.sum();
		Ok(size as i64)
	}

	async fn call_get_addresses_for_key(&self, _key: &[u8]) -> Result<Vec<String>, NativeError> {
		Ok(vec!["127.0.0.1:4500".to_string()])
	}

	async fn call_get_estimated_range_size(
		&self,
		begin: &[u8],
		end: &[u8],
	) -> Result<i64, NativeError> {
		let (pairs, _) = self.store.get_range(begin, end, false, None);
		let size: usize = pairs.iter().map(|(k, v)| k.len() + v.len()).sum();
		Ok(size as i64)
	}

	async fn call_get_range_split_points(
		&self,
		begin: &[u8],
		end: &[u8],
		chunk_size: i64,
	) -> Result<Vec<Vec<u8>>, NativeError> {
		let (pairs, _) = self.store.get_range(begin, end, false, None);
		let mut points = Vec::new();
		let mut acc: i64 = 0;
		for (k, v) in pairs {
			acc += (k.len() + v.len()) as i64;
			if acc >= chunk_size.max(1) {
				points.push(k);
				acc = 0;
			}
		}
		Ok(points)
	}

	async fn call_get_versionstamp(&self) -> Result<[u8; 10], NativeError> {
		self.versionstamp
			.lock()
			.ok_or(NativeError::Internal(
				"get_versionstamp polled before a successful commit".to_string(),
			))
	}

	fn watch(&self, key: &[u8]) -> Arc<dyn NativeWatch> {
		let baseline = self.store.watch_generation(key);
		MockWatch::new(Arc::clone(&self.store), key.to_vec(), baseline)
	}

	fn set_option(&self, option: NativeTransactionOption) -> Result<(), NativeError> {
		match option {
			NativeTransactionOption::ReadSystemKeys(enabled) => {
				self.read_system_keys.store(enabled, Ordering::SeqCst);
			}
			NativeTransactionOption::SnapshotReadYourWritesDisable(_) => {
				// Read-your-writes is implemented at the `universaldb` layer, not
				// here; the mock has nothing to toggle.
			}
		}
		Ok(())
	}
}
