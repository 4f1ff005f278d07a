//! The transaction object (spec.md §4.4): the caller-facing handle for one
//! attempt. Grounded on the call-site shape observed in
//! `examples/rivet-dev-engine/packages/services/pegboard/src/ops/runner/update_alloc_idx.rs`
//! (`tx.read_opt`/`tx.write`/`tx.add_conflict_key`/`tx.with_subspace`) and
//! `examples/rivet-dev-engine/packages/core/actor-kv/src/lib.rs`
//! (`tx.get_ranges_keyvalues`/`tx.unpack`/`tx.clear_subspace_range`), with
//! the read-your-writes shadowing spec.md §5 assigns to this layer (the
//! native driver boundary explicitly does not implement it — see
//! `universaldb-driver::mock::transaction`'s own note on
//! `SnapshotReadYourWritesDisable`).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use universaldb_driver::{NativeTransaction, NativeTransactionOption, NativeWatch};

use crate::context::TransactionContext;
use crate::database::Database;
use crate::error::FdbBindingError;
use crate::formal_key::{FormalChunkedKey, FormalKey};
use crate::key_selector::KeySelector;
use crate::options::{ConflictRangeType, MutationType, TransactionOption};
use crate::range::{FdbValue, RangeOption, RangeStream};
use crate::slice::FdbSlice;
use crate::tuple::versionstamp::VersionStamp;
use crate::tuple::{Subspace, TuplePack, TupleUnpack};
use crate::utils::{CancellationScope, IsolationLevel};
use crate::value_check::{ValueCheckOutcome, ValueCheckRecord};
use crate::watch::Watch;

/// Prefix of the server-side metadata-version key (spec.md §4.9): an
/// optional cache-invalidation signal directory resolvers may consult.
const METADATA_VERSION_PREFIX: &[u8] = b"\xff/metadataVersion";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
	ReadOnly,
	ReadWrite,
	/// Treated identically to `ReadWrite` for commit semantics in this
	/// async-native binding — see DESIGN.md's Open Question decision on
	/// spec.md §4.7's three named modes.
	ReadWriteAsync,
}

impl TransactionMode {
	pub fn is_read_write(&self) -> bool {
		!matches!(self, TransactionMode::ReadOnly)
	}
}

/// The resolved metadata-version key, distinguishing "touched this attempt"
/// (`Unknown`) from a concrete stamp (spec.md §9: "must return a
/// distinguished *unknown* value ... so that callers do not cache a stale
/// value").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataVersion {
	Unknown,
	Value(VersionStamp),
}

#[derive(Debug, Clone)]
enum LocalOp {
	Set(Vec<u8>, Vec<u8>),
	Clear(Vec<u8>),
	ClearRange(Vec<u8>, Vec<u8>),
	Atomic(Vec<u8>, Vec<u8>, MutationType),
}

fn point_end(key: &[u8]) -> Vec<u8> {
	let mut end = key.to_vec();
	end.push(0x00);
	end
}

fn key_in_range(key: &[u8], begin: &[u8], end: &[u8]) -> bool {
	key >= begin && key < end
}

struct TransactionInner {
	#[allow(dead_code)]
	database: Database,
	native: Arc<dyn NativeTransaction>,
	context: Arc<TransactionContext>,
	mode: TransactionMode,
	read_only: bool,
	has_read: AtomicBool,
	disposed: AtomicBool,
	committed: AtomicBool,
	poisoned: Mutex<Option<FdbBindingError>>,
	write_buffer: Mutex<Vec<LocalOp>>,
	touched_metadata: Mutex<HashSet<Vec<u8>>>,
	location_cache: Mutex<HashMap<Vec<String>, Subspace>>,
	snapshot_once: OnceCell<Snapshot>,
	/// Watches registered this attempt, not yet activated (spec.md §4.8).
	/// Drained and fed a native handle on a successful `commit()`; dropped
	/// unfired on `reset()`/`dispose()` so every `Watch` built from it
	/// observes a closed channel and resolves to a cancellation error —
	/// "if the transaction is discarded uncommitted, every watch it
	/// produced is cancelled."
	pending_watches: Mutex<Vec<(Vec<u8>, tokio::sync::watch::Sender<Option<Arc<dyn NativeWatch>>>)>>,
}

/// One attempt's transaction handle (spec.md §4.4). Cheap to clone — it's
/// an `Arc` around the shared native handle plus whatever subspace
/// `with_subspace` last bound, mirroring how `tx` gets reassigned and
/// reused across a handler body in the teacher's call sites.
#[derive(Clone)]
pub struct Transaction {
	inner: Arc<TransactionInner>,
	subspace: Subspace,
}

impl Transaction {
	pub(crate) fn new(
		database: Database,
		native: Arc<dyn NativeTransaction>,
		context: Arc<TransactionContext>,
		mode: TransactionMode,
	) -> Self {
		let opts = context.options();
		let _ = native.set_option(NativeTransactionOption::ReadSystemKeys(
			opts.read_access_to_system_keys,
		));
		let _ = native.set_option(NativeTransactionOption::SnapshotReadYourWritesDisable(
			opts.snapshot_read_your_writes_disable,
		));
		Transaction {
			inner: Arc::new(TransactionInner {
				database,
				native,
				context,
				mode,
				read_only: matches!(mode, TransactionMode::ReadOnly),
				has_read: AtomicBool::new(false),
				disposed: AtomicBool::new(false),
				committed: AtomicBool::new(false),
				poisoned: Mutex::new(None),
				write_buffer: Mutex::new(Vec::new()),
				touched_metadata: Mutex::new(HashSet::new()),
				location_cache: Mutex::new(HashMap::new()),
				snapshot_once: OnceCell::new(),
				pending_watches: Mutex::new(Vec::new()),
			}),
			subspace: Subspace::all(),
		}
	}

	pub fn mode(&self) -> TransactionMode {
		self.inner.mode
	}

	pub fn is_read_only(&self) -> bool {
		self.inner.read_only
	}

	pub(crate) fn native(&self) -> &Arc<dyn NativeTransaction> {
		&self.inner.native
	}

	pub(crate) fn context(&self) -> &Arc<TransactionContext> {
		&self.inner.context
	}

	pub(crate) fn has_pending_writes(&self) -> bool {
		!self.inner.write_buffer.lock().is_empty()
	}

	pub(crate) fn poisoned_error(&self) -> Option<FdbBindingError> {
		self.inner.poisoned.lock().clone()
	}

	fn mark_read(&self) {
		self.inner.has_read.store(true, Ordering::SeqCst);
	}

	fn ensure_active(&self) -> Result<(), FdbBindingError> {
		if self.inner.disposed.load(Ordering::SeqCst) {
			return Err(FdbBindingError::OperationNotAllowed(
				"transaction has been disposed".to_string(),
			));
		}
		if self.inner.context.cancel_scope().is_cancelled() {
			return Err(FdbBindingError::Cancelled);
		}
		Ok(())
	}

	fn poison(&self, err: FdbBindingError) {
		let mut poisoned = self.inner.poisoned.lock();
		if poisoned.is_none() {
			*poisoned = Some(err);
		}
	}

	/// Infallible writes (spec.md §4.4's `set`/`clear`/`clear_range`/`atomic`)
	/// check this instead of returning a `Result` themselves; a violation
	/// poisons the transaction so `commit()` reports *operation-not-allowed*
	/// without ever reaching the native layer, rather than rejecting the
	/// individual call.
	fn check_writable(&self) -> bool {
		if self.inner.disposed.load(Ordering::SeqCst) || self.inner.read_only {
			self.poison(FdbBindingError::OperationNotAllowed(
				"write on a read-only or disposed transaction".to_string(),
			));
			return false;
		}
		if self.inner.context.cancel_scope().is_cancelled() {
			self.poison(FdbBindingError::Cancelled);
			return false;
		}
		true
	}

	fn mark_metadata_touch(&self, key: &[u8]) {
		if key.starts_with(METADATA_VERSION_PREFIX) {
			self.inner.touched_metadata.lock().insert(key.to_vec());
		}
	}

	fn ryw_enabled(&self, snapshot: bool) -> bool {
		let opts = self.inner.context.options();
		if snapshot {
			!opts.snapshot_read_your_writes_disable
		} else {
			!opts.read_your_writes_disable
		}
	}

	fn local_overlay(&self, key: &[u8]) -> Overlay {
		let buf = self.inner.write_buffer.lock();
		let mut base: Option<Option<Vec<u8>>> = None;
		let mut atomics = Vec::new();
		for op in buf.iter() {
			match op {
				LocalOp::Set(k, v) if k.as_slice() == key => {
					base = Some(Some(v.clone()));
					atomics.clear();
				}
				LocalOp::Clear(k) if k.as_slice() == key => {
					base = Some(None);
					atomics.clear();
				}
				LocalOp::ClearRange(b, e) if key_in_range(key, b, e) => {
					base = Some(None);
					atomics.clear();
				}
				LocalOp::Atomic(k, p, kind) if k.as_slice() == key => {
					atomics.push((p.clone(), *kind));
				}
				_ => {}
			}
		}
		Overlay { base, atomics }
	}

	async fn get_internal(&self, key: &[u8], snapshot: bool) -> Result<FdbSlice, FdbBindingError> {
		self.ensure_active()?;
		self.mark_read();

		if self.ryw_enabled(snapshot) {
			let overlay = self.local_overlay(key);
			if overlay.base.is_some() || !overlay.atomics.is_empty() {
				let mut value = match overlay.base {
					Some(v) => v,
					None => self
						.inner
						.native
						.call_get(key, true)
						.await
						.map_err(FdbBindingError::NativeError)?,
				};
				for (param, kind) in overlay.atomics {
					value = apply_local_atomic(value, &param, kind);
				}
				if !snapshot {
					self.add_conflict_range_raw(key, &point_end(key), ConflictRangeType::Read)?;
				}
				return Ok(value.map(Bytes::from));
			}
		}

		let raw = self
			.inner
			.native
			.call_get(key, snapshot)
			.await
			.map_err(FdbBindingError::NativeError)?;
		Ok(raw.map(Bytes::from))
	}

	// -- Reads (spec.md §4.4) -------------------------------------------

	#[tracing::instrument(skip_all)]
	pub async fn get(&self, key: &[u8], iso: IsolationLevel) -> Result<FdbSlice, FdbBindingError> {
		self.get_internal(key, iso.is_snapshot()).await
	}

	#[tracing::instrument(skip_all)]
	pub async fn get_key(
		&self,
		selector: &KeySelector,
		iso: IsolationLevel,
	) -> Result<Vec<u8>, FdbBindingError> {
		self.ensure_active()?;
		self.mark_read();
		self.inner
			.native
			.call_get_key(selector.to_native(), iso.is_snapshot())
			.await
			.map_err(FdbBindingError::NativeError)
	}

	#[tracing::instrument(skip_all)]
	pub async fn get_values(
		&self,
		keys: &[Vec<u8>],
		iso: IsolationLevel,
	) -> Result<Vec<FdbSlice>, FdbBindingError> {
		futures::future::try_join_all(keys.iter().map(|k| self.get(k, iso))).await
	}

	#[tracing::instrument(skip_all)]
	pub async fn get_keys(
		&self,
		selectors: &[KeySelector],
		iso: IsolationLevel,
	) -> Result<Vec<Vec<u8>>, FdbBindingError> {
		futures::future::try_join_all(selectors.iter().map(|s| self.get_key(s, iso))).await
	}

	/// `get_range(begin-sel, end-sel, options) → stream` (spec.md §4.4).
	pub fn get_range(&self, begin: KeySelector, end: KeySelector, options: RangeOption) -> RangeStream {
		self.get_ranges_keyvalues(
			RangeOption {
				begin,
				end,
				..options
			},
			IsolationLevel::Serializable,
		)
	}

	/// As [`Self::get_range`] but with an explicit isolation level,
	/// matching the teacher's own call-site convention
	/// (`tx.get_ranges_keyvalues(opt, Serializable)`).
	pub fn get_ranges_keyvalues(&self, opt: RangeOption, iso: IsolationLevel) -> RangeStream {
		self.mark_read();
		RangeStream::new(Arc::clone(&self.inner.native), opt, iso.is_snapshot())
	}

	#[tracing::instrument(skip_all)]
	pub async fn get_addresses_for_key(&self, key: &[u8]) -> Result<Vec<String>, FdbBindingError> {
		self.ensure_active()?;
		self.inner
			.native
			.call_get_addresses_for_key(key)
			.await
			.map_err(FdbBindingError::NativeError)
	}

	#[tracing::instrument(skip_all)]
	pub async fn get_estimated_range_size_bytes(
		&self,
		begin: &[u8],
		end: &[u8],
	) -> Result<i64, FdbBindingError> {
		self.ensure_active()?;
		self.inner
			.native
			.call_get_estimated_range_size(begin, end)
			.await
			.map_err(FdbBindingError::NativeError)
	}

	/// As [`Self::get_estimated_range_size_bytes`] but over a whole subspace's
	/// range, the teacher's own subspace-level convenience
	/// (`actor-kv::get_subspace_size`).
	pub async fn get_subspace_size(&self, subspace: &Subspace) -> Result<i64, FdbBindingError> {
		let (begin, end) = subspace.range();
		self.get_estimated_range_size_bytes(&begin, &end).await
	}

	#[tracing::instrument(skip_all)]
	pub async fn get_range_split_points(
		&self,
		begin: &[u8],
		end: &[u8],
		chunk_size: i64,
	) -> Result<Vec<Vec<u8>>, FdbBindingError> {
		self.ensure_active()?;
		self.inner
			.native
			.call_get_range_split_points(begin, end, chunk_size)
			.await
			.map_err(FdbBindingError::NativeError)
	}

	#[tracing::instrument(skip_all)]
	pub async fn get_approximate_size(&self) -> Result<i64, FdbBindingError> {
		self.ensure_active()?;
		self.inner
			.native
			.call_get_approximate_size()
			.await
			.map_err(FdbBindingError::NativeError)
	}

	#[tracing::instrument(skip_all)]
	pub async fn get_read_version(&self) -> Result<i64, FdbBindingError> {
		self.inner
			.native
			.call_get_read_version()
			.await
			.map_err(FdbBindingError::NativeError)
	}

	pub fn set_read_version(&self, version: i64) {
		self.inner.native.set_read_version(version);
	}

	/// `-1` before a successful commit (spec.md §4.4), and — per spec.md §9's
	/// open question — left to the native layer's own observed behavior for
	/// a read-only transaction previously used for a write across `reset()`.
	pub fn get_committed_version(&self) -> Result<i64, FdbBindingError> {
		self.inner
			.native
			.get_committed_version()
			.map_err(FdbBindingError::NativeError)
	}

	/// `get_metadata_version_key([scope]) → stamp` (spec.md §4.4/§4.9).
	/// Transparently grants itself system-key read access for the duration
	/// of this call: the key always lives under `0xff`, and gating it
	/// behind the caller's own `read_access_to_system_keys` option would
	/// make the cache-invalidation signal opt-in for no good reason.
	#[tracing::instrument(skip_all)]
	pub async fn get_metadata_version_key(
		&self,
		scope: Option<&[u8]>,
	) -> Result<MetadataVersion, FdbBindingError> {
		let key = metadata_version_key(scope);
		if self.inner.touched_metadata.lock().contains(&key) {
			tracing::trace!(has_scope = scope.is_some(), "metadata version touched this attempt");
			return Ok(MetadataVersion::Unknown);
		}
		let _ = self
			.inner
			.native
			.set_option(NativeTransactionOption::ReadSystemKeys(true));
		match self.get(&key, IsolationLevel::Serializable).await? {
			None if scope.is_none() => Ok(MetadataVersion::Value(VersionStamp::complete(
				[0u8; 8],
				[0u8; 2],
			))),
			None => Ok(MetadataVersion::Unknown),
			Some(raw) => VersionStamp::from_bytes(&raw)
				.map(MetadataVersion::Value)
				.map_err(|e| FdbBindingError::custom(anyhow::anyhow!(e))),
		}
	}

	#[tracing::instrument(skip_all)]
	pub async fn exists<K: TuplePack>(&self, key: &K, iso: IsolationLevel) -> Result<bool, FdbBindingError> {
		let packed = self.subspace.pack(key);
		Ok(self.get_internal(&packed, iso.is_snapshot()).await?.is_some())
	}

	// -- Writes (spec.md §4.4) ------------------------------------------

	pub fn set(&self, key: &[u8], value: &[u8]) {
		if !self.check_writable() {
			return;
		}
		self.inner.native.set(key, value);
		self.inner
			.write_buffer
			.lock()
			.push(LocalOp::Set(key.to_vec(), value.to_vec()));
		self.mark_metadata_touch(key);
	}

	pub fn clear(&self, key: &[u8]) {
		if !self.check_writable() {
			return;
		}
		self.inner.native.clear(key);
		self.inner.write_buffer.lock().push(LocalOp::Clear(key.to_vec()));
		self.mark_metadata_touch(key);
	}

	pub fn clear_range(&self, begin: &[u8], end: &[u8]) {
		if !self.check_writable() {
			return;
		}
		self.inner.native.clear_range(begin, end);
		self.inner
			.write_buffer
			.lock()
			.push(LocalOp::ClearRange(begin.to_vec(), end.to_vec()));
	}

	pub fn clear_subspace_range(&self, subspace: &Subspace) {
		let (begin, end) = subspace.range();
		self.clear_range(&begin, &end);
	}

	pub fn atomic(&self, key: &[u8], param: &[u8], kind: MutationType) {
		if !self.check_writable() {
			return;
		}
		self.inner.native.atomic_op(key, param, kind.into_native());
		self.inner
			.write_buffer
			.lock()
			.push(LocalOp::Atomic(key.to_vec(), param.to_vec(), kind));
		self.mark_metadata_touch(key);
	}

	// -- Conflict ranges (spec.md §4.4) ----------------------------------

	fn add_conflict_range_raw(
		&self,
		begin: &[u8],
		end: &[u8],
		kind: ConflictRangeType,
	) -> Result<(), FdbBindingError> {
		if self.inner.read_only {
			return Err(FdbBindingError::OperationNotAllowed(
				"conflict range on a read-only transaction".to_string(),
			));
		}
		self.inner
			.native
			.add_conflict_range(begin, end, kind.into())
			.map_err(FdbBindingError::NativeError)
	}

	pub fn add_read_conflict_key(&self, key: &[u8]) -> Result<(), FdbBindingError> {
		self.add_conflict_range_raw(key, &point_end(key), ConflictRangeType::Read)
	}

	pub fn add_write_conflict_key(&self, key: &[u8]) -> Result<(), FdbBindingError> {
		self.add_conflict_range_raw(key, &point_end(key), ConflictRangeType::Write)
	}

	pub fn add_read_conflict_range(&self, begin: &[u8], end: &[u8]) -> Result<(), FdbBindingError> {
		self.add_conflict_range_raw(begin, end, ConflictRangeType::Read)
	}

	pub fn add_write_conflict_range(&self, begin: &[u8], end: &[u8]) -> Result<(), FdbBindingError> {
		self.add_conflict_range_raw(begin, end, ConflictRangeType::Write)
	}

	/// Supplemental combined form matching the teacher's own call sites
	/// (`tx.add_conflict_key(&typed_key, ConflictRangeType::Read)`).
	pub fn add_conflict_key<K: TuplePack>(
		&self,
		key: &K,
		kind: ConflictRangeType,
	) -> Result<(), FdbBindingError> {
		let packed = self.subspace.pack(key);
		self.add_conflict_range_raw(&packed, &point_end(&packed), kind)
	}

	pub fn add_conflict_range(
		&self,
		begin: &[u8],
		end: &[u8],
		kind: ConflictRangeType,
	) -> Result<(), FdbBindingError> {
		self.add_conflict_range_raw(begin, end, kind)
	}

	// -- Options (spec.md §4.4) ------------------------------------------

	pub fn set_option(&self, option: TransactionOption) -> Result<(), FdbBindingError> {
		let mut opts = self.inner.context.options();
		opts.apply(option, self.inner.has_read.load(Ordering::SeqCst))
			.map_err(|e| FdbBindingError::OperationNotAllowed(e.to_string()))?;
		self.inner.context.set_options(opts);
		Ok(())
	}

	// -- Version stamps (spec.md §4.4/§4.9) ------------------------------

	/// `create_version_stamp([user_version]) → incomplete stamp`.
	pub fn create_version_stamp(&self, user_version: Option<u16>) -> VersionStamp {
		let token = self.inner.context.versionstamp_token();
		match user_version {
			Some(uv) => VersionStamp::incomplete_with_user_version(token, uv),
			None => VersionStamp::incomplete(token),
		}
	}

	/// `get_version_stamp() → future<stamp>`: obtained before `commit()`,
	/// resolved after. Since the body only executes once polled, calling
	/// this and awaiting the result post-commit satisfies that ordering
	/// naturally (spec.md §4.4).
	pub fn get_version_stamp(
		&self,
	) -> impl std::future::Future<Output = Result<VersionStamp, FdbBindingError>> + Send + 'static {
		let native = Arc::clone(&self.inner.native);
		async move {
			let raw = native
				.call_get_versionstamp()
				.await
				.map_err(FdbBindingError::NativeError)?;
			let mut tx_version = [0u8; 8];
			tx_version.copy_from_slice(&raw[..8]);
			let mut order = [0u8; 2];
			order.copy_from_slice(&raw[8..10]);
			Ok(VersionStamp::complete(tx_version, order))
		}
	}

	// -- Watches (spec.md §4.8) -------------------------------------------

	/// `watch(key, external-cancellation) → watch-handle` (spec.md §4.8).
	/// The returned [`Watch`] is not yet backed by a native handle — it
	/// only activates once this transaction attempt successfully commits
	/// (see `commit()` below); if this attempt is instead reset, disposed,
	/// or dropped, the watch resolves to a cancellation error.
	pub fn watch(&self, key: &[u8], external: &CancellationScope) -> Result<Watch, FdbBindingError> {
		if external.same_as(self.inner.context.cancel_scope()) {
			return Err(FdbBindingError::OperationNotAllowed(
				"a watch cannot use its own transaction's cancellation scope".to_string(),
			));
		}
		let (tx, rx) = tokio::sync::watch::channel(None);
		self.inner.pending_watches.lock().push((key.to_vec(), tx));
		Ok(Watch::pending(rx, external.clone()))
	}

	// -- Lifecycle (spec.md §4.4) -----------------------------------------

	#[tracing::instrument(skip_all)]
	pub async fn commit(&self) -> Result<(), FdbBindingError> {
		self.ensure_active()?;
		if let Some(poisoned) = self.poisoned_error() {
			tracing::debug!(error = ?poisoned, "commit rejected, transaction already poisoned");
			return Err(poisoned);
		}
		self.inner
			.native
			.call_commit()
			.await
			.map_err(FdbBindingError::NativeError)?;
		self.inner.committed.store(true, Ordering::SeqCst);
		// Activate every watch registered this attempt now that it's
		// durable (spec.md §4.8: "the caller must commit the owning
		// transaction for the watch to become active").
		let pending = std::mem::take(&mut *self.inner.pending_watches.lock());
		tracing::trace!(watch_count = pending.len(), "activating watches registered this attempt");
		for (key, sender) in pending {
			let native_watch = self.inner.native.watch(&key);
			let _ = sender.send(Some(native_watch));
		}
		Ok(())
	}

	pub fn reset(&self) {
		self.inner.native.reset();
		self.inner.write_buffer.lock().clear();
		self.inner.touched_metadata.lock().clear();
		self.inner.location_cache.lock().clear();
		self.inner.has_read.store(false, Ordering::SeqCst);
		self.inner.committed.store(false, Ordering::SeqCst);
		*self.inner.poisoned.lock() = None;
		// Drops every unsent sender, cancelling any watch still pending
		// from the attempt this reset abandons.
		self.inner.pending_watches.lock().clear();
	}

	pub fn cancel(&self) {
		self.inner.native.cancel();
	}

	pub fn dispose(&self) {
		if !self.inner.disposed.swap(true, Ordering::SeqCst) {
			self.inner.native.close();
			self.inner.pending_watches.lock().clear();
		}
	}

	// -- Snapshot projection (spec.md §4.4/§9) ---------------------------

	pub fn snapshot(&self) -> Snapshot {
		self.inner
			.snapshot_once
			.get_or_init(|| Snapshot {
				inner: Arc::clone(&self.inner),
			})
			.clone()
	}

	// -- Subspace-scoped view (SPEC_FULL.md supplement) -------------------

	pub fn with_subspace(&self, subspace: impl Into<Subspace>) -> Transaction {
		Transaction {
			inner: Arc::clone(&self.inner),
			subspace: subspace.into(),
		}
	}

	pub fn subspace(&self) -> &Subspace {
		&self.subspace
	}

	pub fn pack<T: TuplePack>(&self, item: &T) -> Vec<u8> {
		self.subspace.pack(item)
	}

	pub fn unpack<'de, T: TupleUnpack<'de>>(&self, key: &'de [u8]) -> Result<T, FdbBindingError> {
		self.subspace.unpack(key)
	}

	/// `tx.delete(&typed_key)`: clears the key packed under the bound
	/// subspace. Infallible, matching `clear`.
	pub fn delete<K: TuplePack>(&self, key: &K) {
		let packed = self.subspace.pack(key);
		self.clear(&packed);
	}

	/// `tx.read::<K>(&key, iso)`: packs `key` under the bound subspace,
	/// reads it, and deserializes via [`FormalKey`]. Errors if the key is
	/// absent — use [`Self::read_opt`] when that's expected.
	#[tracing::instrument(skip_all)]
	pub async fn read<K>(&self, key: &K, iso: IsolationLevel) -> Result<K::Value, FdbBindingError>
	where
		K: FormalKey + TuplePack,
	{
		let packed = self.subspace.pack(key);
		let raw = self
			.get_internal(&packed, iso.is_snapshot())
			.await?
			.ok_or_else(|| FdbBindingError::custom(anyhow::anyhow!("key not found")))?;
		key.deserialize(&raw).map_err(FdbBindingError::custom)
	}

	#[tracing::instrument(skip_all)]
	pub async fn read_opt<K>(
		&self,
		key: &K,
		iso: IsolationLevel,
	) -> Result<Option<K::Value>, FdbBindingError>
	where
		K: FormalKey + TuplePack,
	{
		let packed = self.subspace.pack(key);
		match self.get_internal(&packed, iso.is_snapshot()).await? {
			Some(raw) => Ok(Some(key.deserialize(&raw).map_err(FdbBindingError::custom)?)),
			None => Ok(None),
		}
	}

	pub fn write<K>(&self, key: &K, value: K::Value) -> Result<(), FdbBindingError>
	where
		K: FormalKey + TuplePack,
	{
		if self.inner.read_only {
			return Err(FdbBindingError::OperationNotAllowed(
				"write on a read-only transaction".to_string(),
			));
		}
		let packed = self.subspace.pack(key);
		let raw = key.serialize(value).map_err(FdbBindingError::custom)?;
		self.set(&packed, &raw);
		Ok(())
	}

	/// Reads every numbered chunk of a [`FormalChunkedKey`] in order until
	/// the first absent chunk, then recombines them.
	#[tracing::instrument(skip_all)]
	pub async fn read_chunked<K>(&self, key: &K, iso: IsolationLevel) -> Result<K::Value, FdbBindingError>
	where
		K: FormalChunkedKey,
	{
		let mut chunks = Vec::new();
		let mut index = 0usize;
		loop {
			let chunk_key = key.chunk(index);
			let packed = self.subspace.pack(&chunk_key);
			match self.get_internal(&packed, iso.is_snapshot()).await? {
				Some(raw) => {
					chunks.push(FdbValue::new(packed, raw));
					index += 1;
				}
				None => break,
			}
		}
		key.combine(chunks).map_err(FdbBindingError::custom)
	}

	pub fn write_chunked<K>(&self, key: &K, value: K::Value) -> Result<(), FdbBindingError>
	where
		K: FormalChunkedKey,
	{
		if self.inner.read_only {
			return Err(FdbBindingError::OperationNotAllowed(
				"write on a read-only transaction".to_string(),
			));
		}
		for (index, raw) in key.split(value).map_err(FdbBindingError::custom)?.into_iter().enumerate() {
			let packed = self.subspace.pack(&key.chunk(index));
			self.set(&packed, &raw);
		}
		Ok(())
	}

	// -- Value-checks (spec.md §4.6) --------------------------------------

	/// Registers a cross-attempt cache-validation assertion for the attempt
	/// in progress. Delegates to the shared [`TransactionContext`] so the
	/// registration survives past this attempt's own lifetime.
	pub fn add_value_check(&self, tag: impl Into<String>, key: &[u8], expected: Option<&[u8]>) {
		self.inner
			.context
			.add_value_check(tag, key.to_vec(), expected.map(|v| v.to_vec()));
	}

	/// The resolved outcome of a tagged check registered by the attempt that
	/// just preceded this one (spec.md §4.6).
	pub fn test_value_check_from_previous_attempt(&self, tag: &str) -> ValueCheckOutcome {
		self.inner.context.test_value_check_from_previous_attempt(tag)
	}

	/// All checks from the previous attempt, optionally filtered by tag
	/// and/or resolved outcome.
	pub fn get_value_checks_from_previous_attempt(
		&self,
		tag: Option<&str>,
		outcome: Option<ValueCheckOutcome>,
	) -> Vec<ValueCheckRecord> {
		self.inner
			.context
			.get_value_checks_from_previous_attempt(tag, outcome)
	}

	/// Number of prior failed attempts of the enclosing retry loop
	/// (spec.md §4.6).
	pub fn retries(&self) -> u32 {
		self.inner.context.retries()
	}

	/// The last observed retryable error code, or `None` on the first
	/// attempt (spec.md §4.6's `previous_error`).
	pub fn previous_error(&self) -> Option<FdbBindingError> {
		self.inner.context.previous_error()
	}

	// -- Directory location cache (spec.md §4.9) ---------------------------

	pub(crate) fn cached_location(&self, path: &[String]) -> Option<Subspace> {
		self.inner.location_cache.lock().get(path).cloned()
	}

	pub(crate) fn cache_location(&self, path: Vec<String>, subspace: Subspace) {
		self.inner.location_cache.lock().insert(path, subspace);
	}
}

fn metadata_version_key(scope: Option<&[u8]>) -> Vec<u8> {
	let mut key = METADATA_VERSION_PREFIX.to_vec();
	if let Some(scope) = scope {
		key.push(b'/');
		key.extend_from_slice(scope);
	}
	key
}

struct Overlay {
	base: Option<Option<Vec<u8>>>,
	atomics: Vec<(Vec<u8>, MutationType)>,
}

/// Applies one atomic op to a locally-shadowed value (read-your-writes
/// emulation). Duplicates `universaldb-driver::mock::mutate::apply`'s
/// byte-level semantics deliberately: that function resolves the *driver's*
/// commit-time application against its own store; this resolves what an
/// in-flight read should observe before any of it has actually committed —
/// a different concern operating on plain `Vec<u8>` rather than the store's
/// internal representation.
fn apply_local_atomic(current: Option<Vec<u8>>, param: &[u8], kind: MutationType) -> Option<Vec<u8>> {
	const MAX_VALUE_SIZE: usize = 100_000;

	match kind {
		MutationType::Add => Some(little_endian_add(current.as_deref(), param)),
		MutationType::BitAnd => Some(bytewise(current.as_deref(), param, |a, b| a & b)),
		MutationType::BitOr => Some(bytewise(current.as_deref(), param, |a, b| a | b)),
		MutationType::BitXor => Some(bytewise(current.as_deref(), param, |a, b| a ^ b)),
		MutationType::Min => {
			let c = extend_or_truncate(current.as_deref(), param.len());
			if little_endian_cmp(&c, param) == std::cmp::Ordering::Less {
				Some(c)
			} else {
				Some(param.to_vec())
			}
		}
		MutationType::Max => {
			let c = extend_or_truncate(current.as_deref(), param.len());
			if little_endian_cmp(&c, param) == std::cmp::Ordering::Greater {
				Some(c)
			} else {
				Some(param.to_vec())
			}
		}
		MutationType::ByteMin => match &current {
			Some(c) if c.as_slice() < param => Some(c.clone()),
			_ => Some(param.to_vec()),
		},
		MutationType::ByteMax => match &current {
			Some(c) if c.as_slice() > param => Some(c.clone()),
			_ => Some(param.to_vec()),
		},
		MutationType::CompareAndClear => match &current {
			Some(c) if c.as_slice() == param => None,
			Some(c) => Some(c.clone()),
			None => None,
		},
		MutationType::AppendIfFits => {
			let mut out = current.clone().unwrap_or_default();
			if out.len() + param.len() > MAX_VALUE_SIZE {
				current
			} else {
				out.extend_from_slice(param);
				Some(out)
			}
		}
		MutationType::SetVersionstampedKey
		| MutationType::SetVersionstampedValue
		| MutationType::SetVersionstampedKeyFixedVariant => current,
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
	current.iter().zip(param.iter()).map(|(a, b)| f(*a, *b)).collect()
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

fn little_endian_cmp(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
	for i in (0..a.len().min(b.len())).rev() {
		match a[i].cmp(&b[i]) {
			std::cmp::Ordering::Equal => continue,
			other => return other,
		}
	}
	std::cmp::Ordering::Equal
}

/// A read-only view over the same native handle (spec.md §9: "Do not
/// represent it as a distinct owned object; return a reference-like view
/// whose operations dispatch to the same handle with a `snapshot` flag").
/// `Transaction::snapshot()` returns the same `Snapshot` on every call.
#[derive(Clone)]
pub struct Snapshot {
	inner: Arc<TransactionInner>,
}

impl Snapshot {
	fn as_transaction(&self) -> Transaction {
		Transaction {
			inner: Arc::clone(&self.inner),
			subspace: Subspace::all(),
		}
	}

	pub async fn get(&self, key: &[u8]) -> Result<FdbSlice, FdbBindingError> {
		self.as_transaction().get(key, IsolationLevel::Snapshot).await
	}

	pub async fn get_key(&self, selector: &KeySelector) -> Result<Vec<u8>, FdbBindingError> {
		self.as_transaction()
			.get_key(selector, IsolationLevel::Snapshot)
			.await
	}

	pub async fn get_values(&self, keys: &[Vec<u8>]) -> Result<Vec<FdbSlice>, FdbBindingError> {
		self.as_transaction()
			.get_values(keys, IsolationLevel::Snapshot)
			.await
	}

	pub fn get_ranges_keyvalues(&self, opt: RangeOption) -> RangeStream {
		self.as_transaction()
			.get_ranges_keyvalues(opt, IsolationLevel::Snapshot)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn apply_local_atomic_add_wraps_like_the_mock_store() {
		let result = apply_local_atomic(Some(vec![0xff, 0xff, 0xff, 0xff]), &1u32.to_le_bytes(), MutationType::Add);
		assert_eq!(result, Some(vec![0, 0, 0, 0]));
	}

	#[test]
	fn apply_local_atomic_add_on_missing_key_uses_zero_base() {
		let result = apply_local_atomic(None, &42u32.to_le_bytes(), MutationType::Add);
		assert_eq!(result, Some(42u32.to_le_bytes().to_vec()));
	}

	#[test]
	fn key_in_range_is_half_open() {
		assert!(key_in_range(b"b", b"a", b"c"));
		assert!(!key_in_range(b"c", b"a", b"c"));
	}
}
