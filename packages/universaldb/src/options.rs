//! Database/transaction option surfaces, streaming modes, and mutation
//! types. Carried over from the native options API almost verbatim: the
//! variants this core actually enforces are active, the rest documented but
//! commented out, same as the teacher's own file — this is the config
//! surface of the binding, not a config-file layer (that belongs to the
//! directory/administration layer, out of scope).

#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum DatabaseOption {
	// /// Max location cache entries
	// LocationCacheSize(i32),
	// /// Max outstanding watches
	// MaxWatches(i32),
	/// value in milliseconds of timeout
	///
	/// Sets the ``timeout`` option of each transaction created by this
	/// database. See the transaction option description for more
	/// information.
	TransactionTimeout(i32),
	/// number of times to retry
	///
	/// Set a maximum number of retries after which additional calls to
	/// ``onError`` will throw the most recently seen error code. This sets
	/// the ``retry_limit`` option of each transaction created by this
	/// database. See the transaction option description for more
	/// information.
	TransactionRetryLimit(i32),
	/// value in milliseconds of maximum delay
	///
	/// Sets the ``max_retry_delay`` option of each transaction created by
	/// this database.
	TransactionMaxRetryDelay(i32),
	// /// value in bytes
	// TransactionSizeLimit(i32),
	// /// The read version will be committed, and usually will be the latest
	// /// committed, but might not be the latest committed in the event of a
	// /// simultaneous fault and misbehaving clock.
	// TransactionCausalReadRisky,
}

#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum TransactionOption {
	// /// The transaction, if not self-conflicting, may be committed a second
	// /// time after commit succeeds, in the event of a fault
	// CausalWriteRisky,
	/// The read version will be committed, and usually will be the latest
	/// committed, but might not be the latest committed in the event of a
	/// simultaneous fault and misbehaving clock.
	CausalReadRisky,
	/// Reads performed by a transaction will not see any prior mutations
	/// that occurred in that transaction, instead seeing the value which
	/// was in the database at the transaction's read version. It is an
	/// error to set this option after performing any reads or writes on the
	/// transaction.
	ReadYourWritesDisable,
	/// Allows this transaction to read and modify system keys (those that
	/// start with the byte 0xFF). Implies raw_access.
	AccessSystemKeys,
	/// Allows this transaction to read system keys (those that start with
	/// the byte 0xFF). Implies raw_access.
	ReadSystemKeys,
	/// String identifier used when tracing or profiling this transaction.
	DebugTransactionIdentifier(String),
	/// value in milliseconds of timeout
	///
	/// Set a timeout in milliseconds which, when elapsed, will cause the
	/// transaction automatically to be cancelled. All pending and any
	/// future uses of the transaction will throw an exception. The
	/// transaction can be used again after it is reset.
	Timeout(i32),
	/// number of times to retry
	///
	/// Set a maximum number of retries after which additional calls to
	/// `on_error` will throw the most recently seen error code. `-1`
	/// disables the retry limit.
	RetryLimit(i32),
	/// value in milliseconds of maximum delay
	///
	/// Set the maximum amount of backoff delay incurred in the call to
	/// `on_error` if the error is retryable. Defaults to 1000 ms.
	MaxRetryDelay(i32),
	// /// value in bytes
	// SizeLimit(i32),
	/// Snapshot read operations will see the results of writes done in the
	/// same transaction. This is the default behavior.
	SnapshotRywEnable,
	/// Snapshot read operations will not see the results of writes done in
	/// the same transaction.
	SnapshotRywDisable,
	// /// The transaction can read and write to locked databases, and is
	// /// responsible for checking that it took the lock.
	// LockAware,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum StreamingMode {
	/// Client intends to consume the entire range and would like it all
	/// transferred as early as possible.
	WantAll,
	/// The default. Small batches at first, growing as the caller keeps
	/// iterating, eventually reaching the same byte limit as `WantAll`.
	Iterator,
	/// A specific row limit was supplied and that many rows should be
	/// delivered in a single batch.
	Exact,
	/// Batches small enough to not be much more expensive than reading
	/// individual rows — minimizes waste if iteration stops early.
	Small,
	/// Batches sized in between `Small` and `Large`.
	Medium,
	/// Batches large enough to be nearly as efficient as possible in a
	/// high-concurrency environment, at the cost of wasted bandwidth if
	/// iteration stops early.
	Large,
	/// Batches large enough that a single client can get reasonable read
	/// bandwidth. Considerable bandwidth may be wasted on early stop.
	Serial,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum MutationType {
	/// Performs an addition of little-endian integers, extending/truncating
	/// the existing value to `param`'s length first.
	Add,
	/// Performs a bitwise `and`.
	BitAnd,
	/// Performs a bitwise `or`.
	BitOr,
	/// Performs a bitwise `xor`.
	BitXor,
	/// Appends `param` to the existing value, only if the result fits under
	/// the maximum value size; silently dropped otherwise.
	AppendIfFits,
	/// Little-endian comparison; the larger value is stored.
	Max,
	/// Little-endian comparison; the smaller value is stored.
	Min,
	/// Transforms `key` using the transaction's versionstamp: the final
	/// four bytes of `key` are a little-endian position `pos`; bytes
	/// `[pos, pos+10)` are replaced with the versionstamp, then the
	/// transformed key is set to `param`.
	SetVersionstampedKey,
	/// Same transform applied to `param` instead of `key`.
	SetVersionstampedValue,
	/// As `SetVersionstampedKey`, but for clients pinned to an API version
	/// older than 520: the position suffix is 2 bytes instead of 4, so `key`
	/// must be at least 12 bytes (10-byte placeholder + 2-byte suffix)
	/// rather than 14.
	SetVersionstampedKeyFixedVariant,
	/// Lexicographic comparison; the smaller value is stored.
	ByteMin,
	/// Lexicographic comparison; the larger value is stored.
	ByteMax,
	/// If the existing value equals `param`, the key is cleared.
	CompareAndClear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConflictRangeType {
	/// Used to add a read conflict range.
	Read,
	/// Used to add a write conflict range.
	Write,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorPredicate {
	/// Whether the error indicates the operation should be retried because
	/// of a transient condition.
	Retryable,
	/// Whether the error indicates the transaction may have succeeded,
	/// though not in a way the system can verify.
	MaybeCommitted,
	/// Whether the error indicates the transaction has not committed, in a
	/// way that can be safely retried.
	RetryableNotCommitted,
}

/// Resolved per-transaction settings (spec.md §4.4 "Options"). Built by
/// folding a sequence of [`TransactionOption`]s via [`TransactionOptions::apply`],
/// starting from the owning [`DatabaseOptions`]' sticky defaults at begin
/// time — mirrors the flat options struct the teacher's own
/// `universaldb::options` groups next to the raw enum (kept alongside it
/// here rather than replacing it, since call sites set options through the
/// enum one at a time).
#[derive(Clone, Debug, Default)]
pub struct TransactionOptions {
	pub timeout: Option<i32>,
	pub retry_limit: Option<i32>,
	pub max_retry_delay: Option<i32>,
	pub tracing: Option<String>,
	pub read_your_writes_disable: bool,
	pub snapshot_read_your_writes_disable: bool,
	pub read_access_to_system_keys: bool,
	pub causal_read_risky: bool,
}

impl TransactionOptions {
	/// Applies a single [`TransactionOption`], as if passed to
	/// `Transaction::set_option`. `already_read` gates
	/// `ReadYourWritesDisable`, which spec.md §4.4 says is an error to set
	/// after any read has occurred.
	pub fn apply(
		&mut self,
		option: TransactionOption,
		already_read: bool,
	) -> Result<(), &'static str> {
		match option {
			TransactionOption::CausalReadRisky => self.causal_read_risky = true,
			TransactionOption::ReadYourWritesDisable => {
				if already_read {
					return Err("cannot disable read-your-writes after a read has occurred");
				}
				self.read_your_writes_disable = true;
			}
			TransactionOption::AccessSystemKeys | TransactionOption::ReadSystemKeys => {
				self.read_access_to_system_keys = true;
			}
			TransactionOption::DebugTransactionIdentifier(id) => self.tracing = Some(id),
			TransactionOption::Timeout(ms) => self.timeout = Some(ms),
			TransactionOption::RetryLimit(n) => self.retry_limit = Some(n),
			TransactionOption::MaxRetryDelay(ms) => self.max_retry_delay = Some(ms),
			TransactionOption::SnapshotRywEnable => self.snapshot_read_your_writes_disable = false,
			TransactionOption::SnapshotRywDisable => self.snapshot_read_your_writes_disable = true,
		}
		Ok(())
	}

	/// The sticky subset of these options a fresh attempt re-applies after a
	/// retry (spec.md §4.7.e): `retry_limit`/`timeout` persist across
	/// attempts within one retry-loop invocation, everything else resets
	/// with the transaction.
	pub fn sticky_for_retry(&self, database_defaults: &DatabaseOptions) -> TransactionOptions {
		TransactionOptions {
			timeout: self.timeout.or(database_defaults.transaction_timeout),
			retry_limit: self.retry_limit.or(database_defaults.transaction_retry_limit),
			max_retry_delay: self
				.max_retry_delay
				.or(database_defaults.transaction_max_retry_delay),
			..Default::default()
		}
	}
}

/// Process-wide defaults new transactions inherit at `begin` time (spec.md
/// §5 "Shared resources"); mutating this after a transaction has already
/// begun does not retroactively affect it.
#[derive(Clone, Debug, Default)]
pub struct DatabaseOptions {
	pub transaction_timeout: Option<i32>,
	pub transaction_retry_limit: Option<i32>,
	pub transaction_max_retry_delay: Option<i32>,
}

impl DatabaseOptions {
	pub fn apply(&mut self, option: DatabaseOption) {
		match option {
			DatabaseOption::TransactionTimeout(ms) => self.transaction_timeout = Some(ms),
			DatabaseOption::TransactionRetryLimit(n) => self.transaction_retry_limit = Some(n),
			DatabaseOption::TransactionMaxRetryDelay(ms) => {
				self.transaction_max_retry_delay = Some(ms)
			}
		}
	}

	/// The options a freshly begun transaction starts from (spec.md §4.7.a:
	/// "apply database-default options").
	pub fn new_transaction_options(&self) -> TransactionOptions {
		TransactionOptions {
			timeout: self.transaction_timeout,
			retry_limit: self.transaction_retry_limit,
			max_retry_delay: self.transaction_max_retry_delay,
			..Default::default()
		}
	}
}

impl From<StreamingMode> for universaldb_driver::NativeStreamingMode {
	fn from(mode: StreamingMode) -> Self {
		use universaldb_driver::NativeStreamingMode as N;
		match mode {
			StreamingMode::WantAll => N::WantAll,
			StreamingMode::Iterator => N::Iterator,
			StreamingMode::Exact => N::Exact,
			StreamingMode::Small => N::Small,
			StreamingMode::Medium => N::Medium,
			StreamingMode::Large => N::Large,
			StreamingMode::Serial => N::Serial,
		}
	}
}

impl MutationType {
	pub(crate) fn into_native(self) -> universaldb_driver::NativeMutationType {
		use universaldb_driver::NativeMutationType as N;
		match self {
			MutationType::Add => N::Add,
			MutationType::BitAnd => N::BitAnd,
			MutationType::BitOr => N::BitOr,
			MutationType::BitXor => N::BitXor,
			MutationType::AppendIfFits => N::AppendIfFits,
			MutationType::Max => N::Max,
			MutationType::Min => N::Min,
			MutationType::SetVersionstampedKey => N::SetVersionstampedKey,
			MutationType::SetVersionstampedValue => N::SetVersionstampedValue,
			MutationType::SetVersionstampedKeyFixedVariant => N::SetVersionstampedKeyFixedVariant,
			MutationType::ByteMin => N::ByteMin,
			MutationType::ByteMax => N::ByteMax,
			MutationType::CompareAndClear => N::CompareAndClear,
		}
	}
}

impl From<ConflictRangeType> for universaldb_driver::NativeConflictRangeType {
	fn from(kind: ConflictRangeType) -> Self {
		match kind {
			ConflictRangeType::Read => universaldb_driver::NativeConflictRangeType::Read,
			ConflictRangeType::Write => universaldb_driver::NativeConflictRangeType::Write,
		}
	}
}
