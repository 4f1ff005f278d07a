//! The value-check subsystem (spec.md §4.6): client-side cache-validation
//! assertions a handler registers mid-attempt ("I assumed `key` held
//! `expected`") and that get resolved against the live transaction right
//! before the attempt concludes. No direct precedent in the retrieval
//! pack — this is spec-only machinery — so it is built in the idiom of the
//! crate's own retry classification (`FdbBindingError::is_retryable`) and
//! `universaldb-driver`'s `NativeTransaction::call_get`, the two things it
//! sits between.

use std::sync::Arc;

use universaldb_driver::NativeTransaction;

use crate::error::FdbBindingError;

/// The resolved state of one registered check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueCheckOutcome {
	/// Not yet evaluated (e.g. this attempt hasn't concluded).
	Unknown,
	/// The actual value equaled the expected value.
	Success,
	/// The actual value differed (or the key was absent while a value was
	/// expected, or vice versa).
	Failed,
}

/// One registered assertion: "`key` should hold `expected`", tagged so the
/// next attempt can look it up by name.
#[derive(Debug, Clone)]
pub struct ValueCheck {
	pub tag: String,
	pub key: Vec<u8>,
	pub expected: Option<Vec<u8>>,
}

/// A [`ValueCheck`] plus its resolved [`ValueCheckOutcome`], as exposed to
/// the next attempt via `TransactionContext::get_value_checks_from_previous_attempt`.
#[derive(Debug, Clone)]
pub struct ValueCheckRecord {
	pub tag: String,
	pub key: Vec<u8>,
	pub expected: Option<Vec<u8>>,
	pub outcome: ValueCheckOutcome,
}

/// Reads each registered check's key (outside the transaction's own
/// conflict-tracked read path — this is a point-in-time assertion, not
/// itself a serializable read) and compares it against the expected value.
///
/// Spec.md §4.6: "read each registered key; if every actual value equals
/// its expected value, proceed to commit; otherwise, mark outcomes
/// `failed` for the mismatches, `success` for the matches".
#[tracing::instrument(skip_all)]
pub async fn evaluate(
	tx: &dyn NativeTransaction,
	checks: &[ValueCheck],
) -> Result<Vec<ValueCheckRecord>, FdbBindingError> {
	let mut records = Vec::with_capacity(checks.len());
	for check in checks {
		let actual = tx
			.call_get(&check.key, true)
			.await
			.map_err(FdbBindingError::NativeError)?;
		let outcome = if actual == check.expected {
			ValueCheckOutcome::Success
		} else {
			ValueCheckOutcome::Failed
		};
		if outcome == ValueCheckOutcome::Failed {
			tracing::debug!(tag = %check.tag, "value check failed");
		}
		records.push(ValueCheckRecord {
			tag: check.tag.clone(),
			key: check.key.clone(),
			expected: check.expected.clone(),
			outcome,
		});
	}
	Ok(records)
}

/// As [`evaluate`], but against a shared transaction handle — used by the
/// retry loop, which only has an `Arc<dyn NativeTransaction>` on hand.
pub async fn evaluate_arc(
	tx: &Arc<dyn NativeTransaction>,
	checks: &[ValueCheck],
) -> Result<Vec<ValueCheckRecord>, FdbBindingError> {
	evaluate(tx.as_ref(), checks).await
}

pub fn any_failed(records: &[ValueCheckRecord]) -> bool {
	records
		.iter()
		.any(|r| r.outcome == ValueCheckOutcome::Failed)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn any_failed_detects_a_single_mismatch() {
		let records = vec![
			ValueCheckRecord {
				tag: "a".into(),
				key: b"a".to_vec(),
				expected: Some(b"1".to_vec()),
				outcome: ValueCheckOutcome::Success,
			},
			ValueCheckRecord {
				tag: "b".into(),
				key: b"b".to_vec(),
				expected: Some(b"2".to_vec()),
				outcome: ValueCheckOutcome::Failed,
			},
		];
		assert!(any_failed(&records));
	}

	#[test]
	fn any_failed_is_false_when_empty() {
		assert!(!any_failed(&[]));
	}
}
