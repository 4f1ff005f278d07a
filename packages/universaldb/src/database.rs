//! The database handle (spec.md §4.4's "Lifecycle", §5 "Shared resources"):
//! a cheap-to-clone wrapper over the native driver's connection plus the
//! process-wide option defaults new transactions inherit at `begin` time.
//! Grounded on the cloneable `db: DatabaseHandle` field threaded through
//! `ActivityCtx` in
//! `examples/rivet-dev-engine/packages/common/chirp-workflow/core/src/ctx/activity.rs`,
//! generalized to the `universaldb_driver::NativeDatabase` boundary.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use universaldb_driver::{NativeDatabase, NativeTransaction};

use crate::error::FdbBindingError;
use crate::options::{DatabaseOption, DatabaseOptions};
use crate::retry;
use crate::transaction::{Transaction, TransactionMode};
use crate::utils::CancellationScope;

struct Inner {
	native: Arc<dyn NativeDatabase>,
	options: Mutex<DatabaseOptions>,
}

/// A database handle. Clones share the same native connection and the same
/// option defaults — setting an option through one clone is visible to
/// every other, matching the teacher's single shared `Database` instance
/// per process.
#[derive(Clone)]
pub struct Database {
	inner: Arc<Inner>,
}

impl Database {
	pub fn new(native: Arc<dyn NativeDatabase>) -> Self {
		Database {
			inner: Arc::new(Inner {
				native,
				options: Mutex::new(DatabaseOptions::default()),
			}),
		}
	}

	/// Sets a process-wide default. Only transactions begun after this call
	/// observe it — it is not retroactive (spec.md §5).
	pub fn set_option(&self, option: DatabaseOption) {
		self.inner.options.lock().apply(option);
	}

	pub(crate) fn options(&self) -> DatabaseOptions {
		self.inner.options.lock().clone()
	}

	pub(crate) fn create_native_transaction(
		&self,
	) -> Result<Arc<dyn NativeTransaction>, FdbBindingError> {
		self.inner
			.native
			.create_transaction()
			.map_err(FdbBindingError::NativeError)
	}

	/// Opens a raw native transaction, bypassing the retry loop entirely.
	/// For integration tests that need two independently-open transactions
	/// at once to exercise conflict-range behavior directly — the retry-loop
	/// wrapped `read`/`write`/`read_write` only ever run one attempt at a
	/// time and can't express that.
	#[doc(hidden)]
	pub fn create_native_transaction_for_test(&self) -> Arc<dyn NativeTransaction> {
		self.create_native_transaction()
			.expect("native driver failed to create a transaction")
	}

	/// Runs `handler` in a read-only transaction, retrying it per the retry
	/// loop in [`crate::retry`] until it succeeds, fails fatally, or the
	/// retry budget is exhausted.
	#[tracing::instrument(skip_all)]
	pub async fn read<F, Fut, T>(
		&self,
		cancel: CancellationScope,
		handler: F,
	) -> Result<T, FdbBindingError>
	where
		F: Fn(Transaction) -> Fut,
		Fut: Future<Output = Result<T, FdbBindingError>>,
	{
		retry::run(self.clone(), TransactionMode::ReadOnly, cancel, handler).await
	}

	/// As [`Self::read`], but in read-write mode: the retry loop commits
	/// even if the handler never wrote anything.
	#[tracing::instrument(skip_all)]
	pub async fn write<F, Fut, T>(
		&self,
		cancel: CancellationScope,
		handler: F,
	) -> Result<T, FdbBindingError>
	where
		F: Fn(Transaction) -> Fut,
		Fut: Future<Output = Result<T, FdbBindingError>>,
	{
		retry::run(self.clone(), TransactionMode::ReadWrite, cancel, handler).await
	}

	/// As [`Self::write`], but marks the attempt `ReadWriteAsync` — see
	/// DESIGN.md's Open Question decision on the three named retry-loop
	/// modes.
	#[tracing::instrument(skip_all)]
	pub async fn read_write<F, Fut, T>(
		&self,
		cancel: CancellationScope,
		handler: F,
	) -> Result<T, FdbBindingError>
	where
		F: Fn(Transaction) -> Fut,
		Fut: Future<Output = Result<T, FdbBindingError>>,
	{
		retry::run(
			self.clone(),
			TransactionMode::ReadWriteAsync,
			cancel,
			handler,
		)
		.await
	}
}
