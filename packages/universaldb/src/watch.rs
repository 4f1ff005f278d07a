//! The watch subsystem (spec.md §4.8): a future handed to the caller
//! immediately at registration time that only becomes "live" once the
//! transaction that created it commits. Grounded on
//! `universaldb-driver::mock::watch::MockWatch`'s generation-counter
//! design one layer down; this wraps the native handle with the
//! caller-supplied external cancellation scope spec.md requires.
//!
//! A watch registered mid-attempt is not yet backed by a native handle —
//! the native driver has nothing to notify on until the transaction that
//! asked for it actually commits. `Transaction::watch` hands back a
//! [`Watch`] in the [`WatchState::Pending`] state, fed by a
//! `tokio::sync::watch` channel whose sender lives on the owning
//! `Transaction` and is only ever pushed to on a successful `commit()`
//! (see `transaction.rs`'s `pending_watches`). If the transaction is
//! instead reset, disposed, or simply dropped without committing — "the
//! transaction is discarded uncommitted" in spec.md §4.8 — the sender is
//! dropped unfired, and every pending `Watch` observes the channel close
//! and resolves to a cancellation error the next time it's awaited.

use std::sync::Arc;

use tokio::sync::watch as watch_channel;
use universaldb_driver::NativeWatch;

use crate::error::FdbBindingError;
use crate::utils::CancellationScope;

enum WatchState {
	/// Already backed by a native handle (the owning transaction already
	/// committed by the time this `Watch` was constructed).
	Active(Arc<dyn NativeWatch>),
	/// Waiting for the owning transaction to commit (or be discarded
	/// uncommitted, in which case the channel closes without a value).
	Pending(watch_channel::Receiver<Option<Arc<dyn NativeWatch>>>),
}

/// A registered watch. `wait()` resolves when the server notices the key
/// changed, the external scope cancels it, the cluster loses track of it
/// (a retryable error the caller may re-register against in a new
/// transaction), or the owning transaction was discarded without ever
/// committing.
pub struct Watch {
	state: WatchState,
	external: CancellationScope,
}

impl Watch {
	/// A watch already backed by a native handle (used when the binding
	/// itself needs to hand back a live watch with no commit to wait on,
	/// e.g. in tests driving the native layer directly).
	pub(crate) fn active(native: Arc<dyn NativeWatch>, external: CancellationScope) -> Self {
		Watch {
			state: WatchState::Active(native),
			external,
		}
	}

	/// A watch tied to a transaction attempt that hasn't concluded yet.
	pub(crate) fn pending(
		rx: watch_channel::Receiver<Option<Arc<dyn NativeWatch>>>,
		external: CancellationScope,
	) -> Self {
		Watch {
			state: WatchState::Pending(rx),
			external,
		}
	}

	/// Resolves to the native handle once the owning transaction commits,
	/// or `Err(Cancelled)` if it was instead reset/disposed/dropped first.
	async fn activated(&self) -> Result<Arc<dyn NativeWatch>, FdbBindingError> {
		match &self.state {
			WatchState::Active(native) => Ok(Arc::clone(native)),
			WatchState::Pending(rx) => {
				let mut rx = rx.clone();
				loop {
					if let Some(native) = rx.borrow().clone() {
						return Ok(native);
					}
					if rx.changed().await.is_err() {
						return Err(FdbBindingError::Cancelled);
					}
				}
			}
		}
	}

	/// Waits indefinitely for the watch to fire, be cancelled, or error.
	#[tracing::instrument(skip_all)]
	pub async fn wait(&self) -> Result<(), FdbBindingError> {
		if self.external.is_cancelled() {
			tracing::trace!("watch wait cancelled before activation");
			if let WatchState::Active(native) = &self.state {
				native.cancel();
			}
			return Err(FdbBindingError::Cancelled);
		}
		let native = self.activated().await?;
		tokio::select! {
			result = native.wait() => result.map_err(FdbBindingError::NativeError),
			_ = self.external.cancelled() => {
				native.cancel();
				Err(FdbBindingError::Cancelled)
			}
		}
	}

	/// As [`Self::wait`], but returns `Ok(false)` instead of blocking past
	/// `timeout`, leaving the watch itself still live (spec.md §4.8: "A
	/// timed wait variant returns `true` on fire, `false` on timeout").
	pub async fn wait_timeout(&self, timeout: std::time::Duration) -> Result<bool, FdbBindingError> {
		match tokio::time::timeout(timeout, self.wait()).await {
			Ok(Ok(())) => Ok(true),
			Ok(Err(e)) => Err(e),
			Err(_elapsed) => Ok(false),
		}
	}

	/// Explicitly cancels the watch without waiting for it to fire. A
	/// still-pending watch (its transaction hasn't committed yet) has
	/// nothing native to cancel yet; the external scope remains the only
	/// way to stop waiting on it until activation.
	pub fn cancel(&self) {
		if let WatchState::Active(native) = &self.state {
			native.cancel();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn pending_watch_resolves_to_cancelled_if_sender_dropped_unfired() {
		let (tx, rx) = watch_channel::channel(None);
		let watch = Watch::pending(rx, CancellationScope::new());
		drop(tx);
		let result = watch.wait().await;
		assert!(matches!(result, Err(FdbBindingError::Cancelled)));
	}
}
