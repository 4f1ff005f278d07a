//! The native driver contract consumed by `universaldb`.
//!
//! spec.md §4.3 asks for a minimal wrapper trait around an opaque native
//! handle (`is_closed`, `close`, `call_*`) that never translates the native
//! error code. This module is that trait, generalized slightly into
//! separate `NativeDatabase` / `NativeTransaction` / `NativeWatch`
//! boundaries so a real C ABI driver (out of scope here, see spec.md §1)
//! could implement it without the core needing to change.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::NativeError;

/// Raw key selector: resolves to the key that is `offset` keys to the right
/// of the largest key `<= reference_key` (or `<` if `or_equal` is false).
#[derive(Debug, Clone)]
pub struct NativeKeySelector {
	pub reference_key: Vec<u8>,
	pub or_equal: bool,
	pub offset: i32,
}

impl NativeKeySelector {
	pub fn new(reference_key: Vec<u8>, or_equal: bool, offset: i32) -> Self {
		NativeKeySelector {
			reference_key,
			or_equal,
			offset,
		}
	}
}

/// Mirrors the subset of FDB's atomic mutation opcodes this core needs.
/// `SetVersionstampedKey`/`SetVersionstampedValue` are resolved against the
/// transaction's own commit version, not applied literally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeMutationType {
	Add,
	BitAnd,
	BitOr,
	BitXor,
	Min,
	Max,
	ByteMin,
	ByteMax,
	CompareAndClear,
	AppendIfFits,
	SetVersionstampedKey,
	SetVersionstampedValue,
	/// As `SetVersionstampedKey`, but the trailing position suffix is a
	/// 2-byte little-endian offset instead of 4 bytes — the pre-API-520 FDB
	/// wire format, kept for callers pinned to an older API version.
	SetVersionstampedKeyFixedVariant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeConflictRangeType {
	Read,
	Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeStreamingMode {
	WantAll,
	Iterator,
	Exact,
	Small,
	Medium,
	Large,
	Serial,
}

/// Raw options the native layer itself must honor (as opposed to options the
/// client core enforces entirely on its own, e.g. `retry_limit`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeTransactionOption {
	ReadSystemKeys(bool),
	SnapshotReadYourWritesDisable(bool),
}

#[derive(Debug, Clone, Default)]
pub struct NativeRangeResult {
	pub pairs: Vec<(Vec<u8>, Vec<u8>)>,
	/// Whether more results exist beyond this chunk under the requested limit.
	pub more: bool,
}

/// A database handle: creates transactions, holds process-wide defaults new
/// transactions inherit at begin time (spec.md §5, "Shared resources").
#[async_trait]
pub trait NativeDatabase: Send + Sync {
	fn create_transaction(&self) -> Result<Arc<dyn NativeTransaction>, NativeError>;

	fn set_option(&self, option: NativeTransactionOption) -> Result<(), NativeError>;
}

/// A long-lived, server-side change notification. Cancelling it never
/// returns an error; waiting on an already-cancelled watch resolves
/// immediately with `OperationCancelled`.
#[async_trait]
pub trait NativeWatch: Send + Sync {
	async fn wait(&self) -> Result<(), NativeError>;

	fn cancel(&self);
}

/// A single attempt's native transaction handle. `&self` receiver throughout
/// (rather than the real driver's ownership-transferring `commit(self)`) so
/// the trait stays object-safe; see DESIGN.md for the tradeoff.
#[async_trait]
pub trait NativeTransaction: Send + Sync {
	fn is_closed(&self) -> bool;

	fn close(&self);

	async fn call_get(&self, key: &[u8], snapshot: bool) -> Result<Option<Vec<u8>>, NativeError>;

	async fn call_get_key(
		&self,
		selector: NativeKeySelector,
		snapshot: bool,
	) -> Result<Vec<u8>, NativeError>;

	async fn call_get_range(
		&self,
		begin: NativeKeySelector,
		end: NativeKeySelector,
		limit: i32,
		target_bytes: i32,
		mode: NativeStreamingMode,
		iteration: i32,
		snapshot: bool,
		reverse: bool,
	) -> Result<NativeRangeResult, NativeError>;

	fn set(&self, key: &[u8], value: &[u8]);

	fn clear(&self, key: &[u8]);

	fn clear_range(&self, begin: &[u8], end: &[u8]);

	fn atomic_op(&self, key: &[u8], param: &[u8], op: NativeMutationType);

	fn add_conflict_range(
		&self,
		begin: &[u8],
		end: &[u8],
		kind: NativeConflictRangeType,
	) -> Result<(), NativeError>;

	async fn call_commit(&self) -> Result<(), NativeError>;

	/// The driver's on-error routine (spec.md §4.7 step e): classifies the
	/// error, sleeps for a backoff if retryable, and resets the transaction
	/// for another attempt. Returns the (possibly capped) error if fatal.
	async fn call_on_error(&self, err: NativeError) -> Result<(), NativeError>;

	fn reset(&self);

	fn cancel(&self);

	fn set_read_version(&self, version: i64);

	async fn call_get_read_version(&self) -> Result<i64, NativeError>;

	/// `-1` before a successful commit (spec.md §4.4).
	fn get_committed_version(&self) -> Result<i64, NativeError>;

	async fn call_get_approximate_size(&self) -> Result<i64, NativeError>;

	async fn call_get_addresses_for_key(&self, key: &[u8]) -> Result<Vec<String>, NativeError>;

	async fn call_get_estimated_range_size(
		&self,
		begin: &[u8],
		end: &[u8],
	) -> Result<i64, NativeError>;

	async fn call_get_range_split_points(
		&self,
		begin: &[u8],
		end: &[u8],
		chunk_size: i64,
	) -> Result<Vec<Vec<u8>>, NativeError>;

	/// Resolves to the 10-byte versionstamp assigned to this commit. Must
	/// only be polled after `call_commit` has resolved successfully.
	async fn call_get_versionstamp(&self) -> Result<[u8; 10], NativeError>;

	fn watch(&self, key: &[u8]) -> Arc<dyn NativeWatch>;

	fn set_option(&self, option: NativeTransactionOption) -> Result<(), NativeError>;
}
