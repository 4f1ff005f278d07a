//! A transactional, ordered key-value client core atop a pluggable native
//! driver (`universaldb_driver::NativeDatabase`/`NativeTransaction`), in the
//! shape of a high-level FoundationDB-style binding: tuple/subspace codec,
//! key selectors, a lazy range-query stream, atomic mutations, version
//! stamps, watches, and the retry-loop/transaction-context split that keeps
//! per-attempt state (`Transaction`) separate from state that survives
//! across retries (`TransactionContext`). See SPEC_FULL.md for the full
//! module map and DESIGN.md for how each piece is grounded.

pub mod context;
pub mod database;
pub mod directory;
pub mod error;
pub mod formal_key;
pub mod key_selector;
pub mod options;
pub mod range;
pub mod retry;
pub mod slice;
pub mod transaction;
pub mod tuple;
pub mod utils;
pub mod value_check;
pub mod watch;

pub use database::Database;
pub use error::FdbBindingError;
pub use formal_key::{FormalChunkedKey, FormalKey};
pub use key_selector::KeySelector;
pub use range::{FdbValue, RangeOption, RangeStream};
pub use slice::{is_empty, is_nil, is_non_empty, FdbSlice, Key, MAX, MIN};
pub use transaction::{MetadataVersion, Snapshot, Transaction, TransactionMode};
pub use tuple::{pack, unpack, unpack_first, DynamicSubspace, Subspace, TuplePack, TupleUnpack, TypedSubspace, VersionStamp};
pub use utils::{CancellationScope, IsolationLevel};
pub use value_check::{ValueCheckOutcome, ValueCheckRecord};
pub use watch::Watch;

use std::future::Future;

/// Runs `handler` read-only, retrying per [`retry::run`] (spec.md §6).
pub async fn read<F, Fut, T>(
	db: &Database,
	cancel: CancellationScope,
	handler: F,
) -> Result<T, FdbBindingError>
where
	F: Fn(Transaction) -> Fut,
	Fut: Future<Output = Result<T, FdbBindingError>>,
{
	db.read(cancel, handler).await
}

/// Runs `handler` read-write, always committing even if the handler makes
/// no writes (spec.md §6).
pub async fn write<F, Fut, T>(
	db: &Database,
	cancel: CancellationScope,
	handler: F,
) -> Result<T, FdbBindingError>
where
	F: Fn(Transaction) -> Fut,
	Fut: Future<Output = Result<T, FdbBindingError>>,
{
	db.write(cancel, handler).await
}

/// As [`write`], but marks attempts `ReadWriteAsync` (spec.md §6).
pub async fn read_write<F, Fut, T>(
	db: &Database,
	cancel: CancellationScope,
	handler: F,
) -> Result<T, FdbBindingError>
where
	F: Fn(Transaction) -> Fut,
	Fut: Future<Output = Result<T, FdbBindingError>>,
{
	db.read_write(cancel, handler).await
}
