//! The native driver contract `universaldb` is built against, plus an
//! in-memory reference implementation for tests. See spec.md §1/§6: the
//! native driver itself is explicitly out of scope here, so this crate never
//! links against a real client library — it only defines the trait boundary
//! and a mock that honors it.

pub mod api;
pub mod error;
pub mod mock;

pub use api::{
	NativeConflictRangeType, NativeDatabase, NativeKeySelector, NativeMutationType,
	NativeRangeResult, NativeStreamingMode, NativeTransaction, NativeTransactionOption,
	NativeWatch,
};
pub use error::NativeError;
