//! Thread-safe in-memory [`CredentialStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::CredentialPair,
	store::{CredentialStore, StoreFuture},
};

type Slot = Arc<RwLock<Option<CredentialPair>>>;

/// Storage backend that keeps the pair in-process; contents are lost on restart.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Slot);
impl MemoryStore {
	/// Creates a store seeded with `pair`.
	pub fn with_pair(pair: CredentialPair) -> Self {
		Self(Arc::new(RwLock::new(Some(pair))))
	}

	/// Synchronous snapshot of the stored pair, convenient for assertions.
	pub fn current(&self) -> Option<CredentialPair> {
		self.0.read().clone()
	}
}
impl CredentialStore for MemoryStore {
	fn get(&self) -> StoreFuture<'_, Option<CredentialPair>> {
		let slot = self.0.clone();

		Box::pin(async move { Ok(slot.read().clone()) })
	}

	fn set(&self, pair: CredentialPair) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			*slot.write() = Some(pair);

			Ok(())
		})
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			slot.write().take();

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn set_get_clear_cycle() {
		let store = MemoryStore::default();

		assert!(store.get().await.expect("Empty store fetch should succeed.").is_none());

		store.set(CredentialPair::new("a1", "r1")).await.expect("Set should succeed.");

		let pair = store.get().await.expect("Fetch should succeed.").expect("Pair should exist.");

		assert_eq!(pair.access_token.expose(), "a1");
		assert_eq!(pair.refresh_token.expose(), "r1");

		store.clear().await.expect("Clear should succeed.");
		store.clear().await.expect("Clearing an empty store should succeed.");

		assert!(store.current().is_none());
	}

	#[test]
	fn clones_share_the_same_slot() {
		let store = MemoryStore::with_pair(CredentialPair::new("a1", "r1"));
		let clone = store.clone();

		*clone.0.write() = Some(CredentialPair::new("a2", "r2"));

		assert_eq!(
			store.current().map(|pair| pair.access_token.expose().to_owned()),
			Some("a2".into())
		);
	}
}
