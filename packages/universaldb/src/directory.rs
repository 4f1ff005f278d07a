//! Directory resolution (spec.md §4.9): turning a logical path — a list of
//! string components — into the byte prefix its keys live under, with
//! per-attempt caching so one handler body never pays for the same lookup
//! twice. No directory layer exists in the native driver boundary (that's
//! deliberately out of scope — see `universaldb-driver`'s own doc comment),
//! so this is built entirely at this layer, in the idiom of the typed-key
//! traits in `formal_key.rs` and using the `Transaction::cached_location`/
//! `cache_location` plumbing already carried on `TransactionInner`.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::FdbBindingError;
use crate::transaction::Transaction;
use crate::tuple::{Subspace, TypedSubspace};

/// Resolves a location path's components to the byte prefix its subspace
/// should use. Implementations typically read (and cache, server-side or
/// otherwise) an allocator structure stored under a well-known prefix; this
/// binding only defines the seam, not an allocator.
#[async_trait]
pub trait DirectoryResolver: Send + Sync {
	/// Returns the prefix for `path`, or `None` if no such directory exists.
	async fn resolve(
		&self,
		tx: &Transaction,
		path: &[String],
	) -> Result<Option<Vec<u8>>, FdbBindingError>;
}

/// A logical tuple identifier naming "where" some data lives, resolved
/// against a [`DirectoryResolver`] and cached for the remainder of the
/// attempt that resolves it (spec.md §4.9: "the client never persists
/// resolved prefixes across attempts; it caches them only within a single
/// attempt, since the mapping can change between retries").
#[derive(Clone)]
pub struct LocationPath {
	resolver: Arc<dyn DirectoryResolver>,
	components: Vec<String>,
}

impl LocationPath {
	pub fn new(resolver: Arc<dyn DirectoryResolver>, components: Vec<String>) -> Self {
		LocationPath {
			resolver,
			components,
		}
	}

	pub fn components(&self) -> &[String] {
		&self.components
	}

	/// Resolves this path against `tx`'s per-attempt cache, falling back to
	/// the resolver on a miss.
	pub async fn resolve(&self, tx: &Transaction) -> Result<Subspace, FdbBindingError> {
		if let Some(cached) = tx.cached_location(&self.components) {
			return Ok(cached);
		}
		let prefix = self
			.resolver
			.resolve(tx, &self.components)
			.await?
			.ok_or_else(|| {
				FdbBindingError::custom(anyhow::anyhow!(
					"directory path {:?} did not resolve to a prefix",
					self.components
				))
			})?;
		let subspace = Subspace::from_bytes(prefix);
		tx.cache_location(self.components.clone(), subspace.clone());
		Ok(subspace)
	}

	/// Projects this path onto a typed subspace (SPEC_FULL.md supplement,
	/// mirroring `Subspace::typed`).
	pub fn typed<T>(&self) -> TypedLocationPath<T> {
		TypedLocationPath {
			inner: self.clone(),
			_marker: PhantomData,
		}
	}
}

/// As [`LocationPath`], but resolves to a [`TypedSubspace<T>`] instead of a
/// bare [`Subspace`].
pub struct TypedLocationPath<T> {
	inner: LocationPath,
	_marker: PhantomData<T>,
}

impl<T> TypedLocationPath<T> {
	pub async fn resolve(&self, tx: &Transaction) -> Result<TypedSubspace<T>, FdbBindingError> {
		Ok(self.inner.resolve(tx).await?.typed())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct FixedResolver(Vec<u8>);

	#[async_trait]
	impl DirectoryResolver for FixedResolver {
		async fn resolve(
			&self,
			_tx: &Transaction,
			_path: &[String],
		) -> Result<Option<Vec<u8>>, FdbBindingError> {
			Ok(Some(self.0.clone()))
		}
	}

	#[test]
	fn location_path_carries_its_components() {
		let resolver = Arc::new(FixedResolver(vec![0x01, 0x02]));
		let path = LocationPath::new(resolver, vec!["a".to_string(), "b".to_string()]);
		assert_eq!(path.components(), &["a".to_string(), "b".to_string()]);
	}
}
