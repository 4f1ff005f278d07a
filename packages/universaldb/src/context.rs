//! The transaction context (spec.md §4.6): state that survives across
//! every attempt of a single retry-loop invocation, as opposed to
//! `Transaction`, which is rebuilt fresh each attempt. Grounded on the
//! attempt/retry bookkeeping shape of `WorkflowError`'s retry
//! classification in
//! `examples/rivet-dev-engine/packages/common/chirp-workflow/core/src/error.rs`,
//! generalized into its own long-lived object per spec.md's explicit
//! component split.

use parking_lot::Mutex;

use crate::options::{DatabaseOptions, TransactionOptions};
use crate::tuple::versionstamp::VersionStampToken;
use crate::utils::CancellationScope;
use crate::value_check::{ValueCheck, ValueCheckOutcome, ValueCheckRecord};

struct Inner {
	retries: u32,
	previous_error: Option<crate::error::FdbBindingError>,
	previous_checks: Vec<ValueCheckRecord>,
	current_checks: Vec<ValueCheck>,
	options: TransactionOptions,
	versionstamp_token: VersionStampToken,
}

/// Lives across every attempt of one `database.run(...)` invocation. A
/// fresh `Transaction` is built each attempt but all share the same
/// `Arc<TransactionContext>` (spec.md §4.6: "Lives across retries of a
/// single retry-loop invocation").
pub struct TransactionContext {
	inner: Mutex<Inner>,
	cancel: CancellationScope,
}

impl TransactionContext {
	pub fn new(database_defaults: &DatabaseOptions, cancel: CancellationScope) -> Self {
		TransactionContext {
			inner: Mutex::new(Inner {
				retries: 0,
				previous_error: None,
				previous_checks: Vec::new(),
				current_checks: Vec::new(),
				options: database_defaults.new_transaction_options(),
				versionstamp_token: VersionStampToken::generate(),
			}),
			cancel,
		}
	}

	pub fn cancel_scope(&self) -> &CancellationScope {
		&self.cancel
	}

	/// Number of prior failed attempts (spec.md §4.6: "`retries` is the
	/// number of prior failures").
	pub fn retries(&self) -> u32 {
		self.inner.lock().retries
	}

	pub fn previous_error(&self) -> Option<crate::error::FdbBindingError> {
		self.inner.lock().previous_error.clone()
	}

	pub fn versionstamp_token(&self) -> VersionStampToken {
		self.inner.lock().versionstamp_token
	}

	/// The options the next attempt begins from: database defaults folded
	/// with whatever sticky options (`retry_limit`/`timeout`) survived from
	/// the previous attempt (spec.md §4.7.a/e).
	pub fn options(&self) -> TransactionOptions {
		self.inner.lock().options.clone()
	}

	pub fn set_options(&self, options: TransactionOptions) {
		self.inner.lock().options = options;
	}

	/// Registers a value-check for the attempt currently in progress
	/// (`TransactionContext::add_value_check` in spec.md §4.6's API list).
	pub fn add_value_check(&self, tag: impl Into<String>, key: Vec<u8>, expected: Option<Vec<u8>>) {
		self.inner.lock().current_checks.push(ValueCheck {
			tag: tag.into(),
			key,
			expected,
		});
	}

	/// Drains the checks registered during the attempt now concluding, so
	/// they can be evaluated and folded into `previous_checks` for the next
	/// one.
	pub(crate) fn take_current_checks(&self) -> Vec<ValueCheck> {
		std::mem::take(&mut self.inner.lock().current_checks)
	}

	/// `test_value_check_from_previous_attempt(tag) → outcome` (spec.md
	/// §4.6). Only the immediately prior attempt's checks are visible —
	/// older results are discarded the moment a new attempt's checks are
	/// recorded.
	pub fn test_value_check_from_previous_attempt(&self, tag: &str) -> ValueCheckOutcome {
		self.inner
			.lock()
			.previous_checks
			.iter()
			.find(|r| r.tag == tag)
			.map(|r| r.outcome)
			.unwrap_or(ValueCheckOutcome::Unknown)
	}

	/// `get_value_checks_from_previous_attempt(tag?, outcome?) → list`
	/// (spec.md §4.6), filtering by tag and/or outcome when given.
	pub fn get_value_checks_from_previous_attempt(
		&self,
		tag: Option<&str>,
		outcome: Option<ValueCheckOutcome>,
	) -> Vec<ValueCheckRecord> {
		self.inner
			.lock()
			.previous_checks
			.iter()
			.filter(|r| tag.map(|t| t == r.tag).unwrap_or(true))
			.filter(|r| outcome.map(|o| o == r.outcome).unwrap_or(true))
			.cloned()
			.collect()
	}

	/// Folds the just-evaluated checks of the concluding attempt into
	/// `previous_checks`, discarding whatever the attempt before that left
	/// behind (spec.md §4.6: "a new attempt observes only checks from the
	/// *immediately prior* attempt").
	pub(crate) fn record_evaluated_checks(&self, records: Vec<ValueCheckRecord>) {
		self.inner.lock().previous_checks = records;
	}

	/// Bumps the attempt counter and records the error that ended this
	/// attempt, ahead of beginning the next one. Also reseeds the
	/// versionstamp token (spec.md §9: "must be regenerated on `reset()`").
	pub(crate) fn record_retry(&self, error: crate::error::FdbBindingError) {
		let mut inner = self.inner.lock();
		inner.retries += 1;
		inner.previous_error = Some(error);
		inner.versionstamp_token = VersionStampToken::generate();
	}
}
