use std::sync::Arc;

use crate::api::{NativeDatabase, NativeTransaction, NativeTransactionOption};
use crate::error::NativeError;

use super::store::Store;

/// In-memory reference `NativeDatabase`, shared by every transaction created
/// from the same handle. One process may hold several independent
/// `MockDatabase`s (e.g. one per test) without interference.
pub struct MockDatabase {
	store: Arc<Store>,
}

impl MockDatabase {
	pub fn new() -> Arc<Self> {
		Arc::new(MockDatabase {
			store: Arc::new(Store::new()),
		})
	}
}

impl Default for MockDatabase {
	fn default() -> Self {
		MockDatabase {
			store: Arc::new(Store::new()),
		}
	}
}

#[async_trait::async_trait]
impl NativeDatabase for MockDatabase {
	fn create_transaction(&self) -> Result<Arc<dyn NativeTransaction>, NativeError> {
		Ok(super::transaction::MockTransaction::new(Arc::clone(
			&self.store,
		)))
	}

	fn set_option(&self, _option: NativeTransactionOption) -> Result<(), NativeError> {
		// Process-wide transaction option defaults aren't modeled by the mock;
		// every transaction starts from the same blank slate.
		Ok(())
	}
}
