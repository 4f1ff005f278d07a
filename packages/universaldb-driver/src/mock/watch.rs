use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::api::NativeWatch;
use crate::error::NativeError;

use super::store::Store;

pub struct MockWatch {
	store: Arc<Store>,
	key: Vec<u8>,
	baseline: u64,
	notify: Arc<Notify>,
	cancelled: AtomicBool,
}

impl MockWatch {
	pub fn new(store: Arc<Store>, key: Vec<u8>, baseline: u64) -> Arc<Self> {
		let notify = store.watch_notify_handle(&key);
		Arc::new(MockWatch {
			store,
			key,
			baseline,
			notify,
			cancelled: AtomicBool::new(false),
		})
	}

	fn fired(&self) -> bool {
		self.store.watch_generation(&self.key) != self.baseline
	}
}

#[async_trait]
impl NativeWatch for MockWatch {
	async fn wait(&self) -> Result<(), NativeError> {
		loop {
			if self.cancelled.load(Ordering::SeqCst) {
				return Err(NativeError::OperationCancelled);
			}
			if self.fired() {
				return Ok(());
			}
			let notified = self.notify.notified();
			tokio::pin!(notified);
			notified.as_mut().await;
		}
	}

	fn cancel(&self) {
		self.cancelled.store(true, Ordering::SeqCst);
		self.notify.notify_waiters();
	}
}
