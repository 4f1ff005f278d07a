//! The public error type. Wraps the native driver's error taxonomy plus the
//! invariant-violation and cancellation variants that never reach the
//! native layer (spec.md §7's error table), grounded on
//! `WorkflowError` in
//! `examples/rivet-dev-engine/packages/common/chirp-workflow/core/src/error.rs`.

use std::sync::Arc;

use thiserror::Error;
use universaldb_driver::NativeError;

#[derive(Error, Debug, Clone)]
pub enum FdbBindingError {
	#[error("native driver error: {0}")]
	NativeError(#[from] NativeError),

	/// Write/clear/atomic/conflict-range call on a read-only transaction, or
	/// any call on a disposed transaction.
	#[error("operation not allowed: {0}")]
	OperationNotAllowed(String),

	/// `subspace.unpack(key)` where `key` does not start with the
	/// subspace's prefix.
	#[error("key does not belong to subspace")]
	ForeignKey,

	/// Tuple encode/decode failure.
	#[error("tuple pack/unpack error: {0}")]
	TupleError(String),

	/// A value-check registered in the previous attempt failed; synthesized
	/// by the value-check subsystem into a retryable error for the retry
	/// loop (spec.md §4.6).
	#[error("a value check failed, retrying")]
	ValueCheckFailed { tag: String },

	/// The external cancellation scope for this transaction (or a watch on
	/// it) fired.
	#[error("operation cancelled")]
	Cancelled,

	/// The retry loop's cancellation scope fired, or `retry_limit` was
	/// reached without success.
	#[error("retry loop aborted after {attempts} attempt(s): {source}")]
	RetryLoopAborted {
		attempts: u32,
		#[source]
		source: Box<FdbBindingError>,
	},

	/// An error raised by the caller's handler closure, propagated verbatim
	/// unless the prior attempt had a failed value-check (spec.md §4.7.b).
	#[error("application error: {0:?}")]
	CustomError(Arc<anyhow::Error>),
}

impl FdbBindingError {
	pub fn custom(err: anyhow::Error) -> Self {
		FdbBindingError::CustomError(Arc::new(err))
	}

	/// Mirrors `ErrorPredicate::Retryable` — whether the retry loop should
	/// attempt this transaction again.
	pub fn is_retryable(&self) -> bool {
		match self {
			FdbBindingError::NativeError(e) => e.is_retryable(),
			FdbBindingError::ValueCheckFailed { .. } => true,
			_ => false,
		}
	}

	/// Whether the transaction may have committed despite this error.
	pub fn is_maybe_committed(&self) -> bool {
		matches!(self, FdbBindingError::NativeError(e) if e.is_maybe_committed())
	}

	/// Fatal errors propagate out of the retry loop immediately.
	pub fn is_fatal(&self) -> bool {
		!self.is_retryable()
	}
}
