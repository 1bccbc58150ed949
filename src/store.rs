//! Storage contract and built-in implementations for the current credential pair.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::CredentialPair};

/// Boxed future returned by [`CredentialStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Durable holder for the current credential pair.
///
/// Implementations are pure storage: no validation, no expiry logic. A pair is always
/// written or cleared as a whole.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Returns the stored pair, if any.
	fn get(&self) -> StoreFuture<'_, Option<CredentialPair>>;

	/// Persists or replaces the stored pair.
	fn set(&self, pair: CredentialPair) -> StoreFuture<'_, ()>;

	/// Removes the stored pair. Clearing an empty store succeeds.
	fn clear(&self) -> StoreFuture<'_, ()>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
