//! Native error codes and retry classification.
//!
//! These mirror the shape of the FoundationDB C client's error codes without
//! claiming to be that client: the concrete values are ours, chosen to be
//! stable and documented rather than binary-compatible with any real driver.

use thiserror::Error;

/// An error surfaced by the native driver layer.
///
/// This is the boundary spec.md draws between "the native driver itself"
/// (out of scope) and the client core (in scope): the core never invents
/// new codes here, it only reacts to them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NativeError {
	#[error("not committed (conflicting with another transaction) [1020]")]
	NotCommitted,

	#[error("transaction is too old to perform reads or be committed [1007]")]
	TransactionTooOld,

	#[error("operation aborted because the transaction was cancelled [1025]")]
	TransactionCancelled,

	#[error("the result of the commit is unknown [1021]")]
	CommitUnknownResult,

	#[error("the transaction's read version is too new for the cluster to serve [1009]")]
	FutureVersion,

	#[error("operation timed out [1031]")]
	TimedOut,

	#[error("the specified key or range lies outside the legal range of keys [1007]")]
	KeyOutsideLegalRange,

	#[error("unknown or unsupported atomic mutation type for this API level [2007]")]
	InvalidMutationType,

	#[error("the API version has not been set [2200]")]
	ApiVersionNotSet,

	#[error("operation cancelled by the caller's cancellation scope [1101]")]
	OperationCancelled,

	#[error("internal native driver error: {0}")]
	Internal(String),
}

impl NativeError {
	/// Whether the retry loop's `on_error` routine would classify this as
	/// transient (mirrors `ErrorPredicate::Retryable` in the public API).
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			NativeError::NotCommitted
				| NativeError::TransactionTooOld
				| NativeError::FutureVersion
				| NativeError::CommitUnknownResult
		)
	}

	/// Whether the transaction may have actually committed despite the error
	/// (`ErrorPredicate::MaybeCommitted`). Only ever true for
	/// `CommitUnknownResult`; the core defers to this rather than guessing.
	pub fn is_maybe_committed(&self) -> bool {
		matches!(self, NativeError::CommitUnknownResult)
	}

	/// Whether a retry is guaranteed not to observe a partial commit
	/// (`ErrorPredicate::RetryableNotCommitted`).
	pub fn is_retryable_not_committed(&self) -> bool {
		matches!(
			self,
			NativeError::NotCommitted | NativeError::TransactionTooOld | NativeError::FutureVersion
		)
	}

	/// Fatal errors are never retried by the retry loop executor.
	pub fn is_fatal(&self) -> bool {
		!self.is_retryable()
	}
}
