//! Small cross-cutting helpers.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Re-exported so call sites can write `universaldb::utils::Subspace` as well
/// as `universaldb::tuple::Subspace` — both names resolve to the same type,
/// matching how the teacher's own call sites reach for whichever import is
/// already in scope.
pub use crate::tuple::Subspace;

/// Whether a read registers a conflict range. Threaded through the typed
/// read helpers and the range engine as a call-site parameter
/// (`tx.read_opt(&key, Serializable)`), in addition to the required
/// `snapshot()` projection — both are views over the same underlying flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
	/// Registers a read conflict range; sees only this transaction's read
	/// version, never writes committed by others afterward.
	Serializable,
	/// Does not register a read conflict range.
	Snapshot,
}

impl IsolationLevel {
	pub fn is_snapshot(&self) -> bool {
		matches!(self, IsolationLevel::Snapshot)
	}
}

/// A `tokio_util::sync::CancellationToken` plus an identity tag, so two
/// scopes can be compared for "are these the same scope" (spec.md §4.8:
/// a watch "must use a scope *other than* the transaction's own") — bare
/// `CancellationToken` doesn't implement `PartialEq`, and cloning one
/// preserves the underlying shared state but not a stable handle to compare
/// against.
#[derive(Debug, Clone)]
pub struct CancellationScope {
	id: Uuid,
	token: CancellationToken,
}

impl CancellationScope {
	pub fn new() -> Self {
		CancellationScope {
			id: Uuid::new_v4(),
			token: CancellationToken::new(),
		}
	}

	/// A scope that cancels whenever `self` does, but carries its own
	/// identity (so it is never mistaken for `self` by [`Self::same_as`]).
	pub fn child(&self) -> Self {
		CancellationScope {
			id: Uuid::new_v4(),
			token: self.token.child_token(),
		}
	}

	pub fn cancel(&self) {
		self.token.cancel();
	}

	pub fn is_cancelled(&self) -> bool {
		self.token.is_cancelled()
	}

	pub async fn cancelled(&self) {
		self.token.cancelled().await
	}

	pub fn same_as(&self, other: &CancellationScope) -> bool {
		self.id == other.id
	}
}

impl Default for CancellationScope {
	fn default() -> Self {
		Self::new()
	}
}
