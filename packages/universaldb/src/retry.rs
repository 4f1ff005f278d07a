//! The retry loop executor (spec.md §4.7): the state machine driving one
//! `Database::run`-style invocation across as many attempts as it takes.
//! Grounded on the attempt loop in
//! `examples/rivet-dev-engine/packages/common/chirp-workflow/core/src/workflow.rs`
//! (`fn run`'s retry-on-`WorkflowError::is_retryable` shape), generalized
//! to the transaction-attempt/value-check semantics this binding adds.

use std::future::Future;

use crate::context::TransactionContext;
use crate::database::Database;
use crate::error::FdbBindingError;
use crate::transaction::{Transaction, TransactionMode};
use crate::utils::CancellationScope;
use crate::value_check::{self, ValueCheck};

/// Evaluates the checks registered during the attempt that just threw an
/// application exception. Spec.md §4.7.b treats such an exception as
/// retryable when "the previous attempt had at least one failed
/// value-check" — concretely, this is the attempt that just registered
/// (but never got to commit) the checks explaining the stale read that
/// caused the exception, so they're evaluated here, before the exception
/// either propagates or gets swallowed.
#[tracing::instrument(skip_all)]
async fn classify_application_exception(
	tx: &Transaction,
	context: &TransactionContext,
	err: FdbBindingError,
) -> FdbBindingError {
	let checks: Vec<ValueCheck> = context.take_current_checks();
	if checks.is_empty() {
		return err;
	}
	match value_check::evaluate_arc(tx.native(), &checks).await {
		Ok(records) => {
			let failed = value_check::any_failed(&records);
			context.record_evaluated_checks(records);
			if failed {
				tracing::debug!("application error reclassified as a failed value check");
				FdbBindingError::ValueCheckFailed {
					tag: "application-error-after-failed-check".to_string(),
				}
			} else {
				err
			}
		}
		Err(eval_err) => eval_err,
	}
}

/// Evaluates any checks registered this attempt immediately before
/// committing (spec.md §4.6): a failure aborts the commit and yields a
/// synthetic retryable error instead.
async fn commit_with_value_checks(
	tx: &Transaction,
	context: &TransactionContext,
) -> Result<(), FdbBindingError> {
	let checks = context.take_current_checks();
	let records = value_check::evaluate_arc(tx.native(), &checks).await?;
	let failed = value_check::any_failed(&records);
	context.record_evaluated_checks(records);
	if failed {
		return Err(FdbBindingError::ValueCheckFailed {
			tag: "value-check".to_string(),
		});
	}
	tx.commit().await
}

/// Runs `handler` to completion, retrying fresh attempts per spec.md §4.7
/// until it returns successfully, fails with a non-retryable error, or the
/// retry budget (`retry_limit`, the cancellation scope) is exhausted.
#[tracing::instrument(skip_all)]
pub async fn run<F, Fut, T>(
	database: Database,
	mode: TransactionMode,
	cancel: CancellationScope,
	handler: F,
) -> Result<T, FdbBindingError>
where
	F: Fn(Transaction) -> Fut,
	Fut: Future<Output = Result<T, FdbBindingError>>,
{
	let context = TransactionContext::new(&database.options(), cancel.clone());
	let context = std::sync::Arc::new(context);

	loop {
		if cancel.is_cancelled() {
			return Err(FdbBindingError::Cancelled);
		}

		tracing::trace!(attempt = context.retries(), "starting transaction attempt");

		let native_tx = database.create_native_transaction()?;
		let tx = Transaction::new(
			database.clone(),
			native_tx,
			std::sync::Arc::clone(&context),
			mode,
		);

		let handler_result = handler(tx.clone()).await;

		let attempt_result: Result<T, FdbBindingError> = match handler_result {
			Ok(value) => {
				if let Some(poisoned) = tx.poisoned_error() {
					Err(poisoned)
				} else if mode.is_read_write() || tx.has_pending_writes() {
					commit_with_value_checks(&tx, &context).await.map(|()| value)
				} else {
					Ok(value)
				}
			}
			Err(err @ FdbBindingError::NativeError(_)) => Err(err),
			Err(app_err) => Err(classify_application_exception(&tx, &context, app_err).await),
		};

		let err = match attempt_result {
			Ok(value) => return Ok(value),
			Err(err) => err,
		};

		if !err.is_retryable() {
			tracing::debug!(error = ?err, "transaction attempt failed with a non-retryable error");
			return Err(err);
		}

		// Only a genuine native error goes through the driver's on_error
		// routine; value-check failures (commit-path or exception-path) are
		// purely client-side and never reached the native layer.
		if let FdbBindingError::NativeError(native_err) = &err {
			if let Err(fatal) = tx.native().call_on_error(native_err.clone()).await {
				tracing::debug!(error = ?fatal, "native on_error escalated to a fatal error");
				return Err(FdbBindingError::NativeError(fatal));
			}
		} else {
			tx.dispose();
		}

		context.record_retry(err.clone());
		tracing::debug!(
			attempt = context.retries(),
			error = ?err,
			"retrying transaction after a retryable error"
		);
		let refreshed = context.options().sticky_for_retry(&database.options());
		context.set_options(refreshed);

		if let Some(limit) = context.options().retry_limit {
			if limit >= 0 && context.retries() as i32 > limit {
				tracing::debug!(attempts = context.retries(), "retry limit exceeded, aborting");
				return Err(FdbBindingError::RetryLoopAborted {
					attempts: context.retries(),
					source: Box::new(err),
				});
			}
		}
	}
}
