//! An in-memory, single-process reference implementation of
//! [`crate::api::NativeDatabase`], used by `universaldb`'s own test suite in
//! place of a real native driver. Not exposed as a production backend:
//! conflict detection, versionstamp assignment, and watch delivery are all
//! approximations of what a real multi-node store provides, sufficient to
//! exercise the retry loop, value-check, and watch scenarios but not a
//! performance or durability claim.

mod database;
mod mutate;
mod store;
mod transaction;
mod watch;

#[cfg(test)]
mod tests;

pub use database::MockDatabase;
pub use transaction::MockTransaction;
pub use watch::MockWatch;
