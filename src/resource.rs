//! Server-owned resources mirrored through an [`OptimisticCache`].

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	cache::{Mutation, OptimisticCache, RollbackPolicy, Snapshot},
	gateway::RequestGateway,
	http::{ApiRequest, ApiTransport},
};

/// A resource (cart, subscription, profile) loaded from and mutated through the gateway.
///
/// Mutation endpoints must answer with the full representation of the resource; the response
/// becomes the confirmed snapshot.
pub struct RemoteResource<T, C>
where
	C: ?Sized + ApiTransport,
{
	gateway: RequestGateway<C>,
	path: String,
	cache: OptimisticCache<T>,
}
impl<T, C> RemoteResource<T, C>
where
	T: 'static + Send + Sync + DeserializeOwned,
	C: ?Sized + ApiTransport,
{
	/// Creates a resource read from `path`, seeded with `initial` until [`Self::load`] runs.
	pub fn new(gateway: RequestGateway<C>, path: impl Into<String>, initial: T) -> Self {
		Self::with_policy(gateway, path, initial, RollbackPolicy::default())
	}

	/// Creates a resource whose cache uses `policy` for overlapping mutations.
	pub fn with_policy(
		gateway: RequestGateway<C>,
		path: impl Into<String>,
		initial: T,
		policy: RollbackPolicy,
	) -> Self {
		Self { gateway, path: path.into(), cache: OptimisticCache::with_policy(initial, policy) }
	}

	/// Path the resource is loaded from.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Underlying cache.
	pub fn cache(&self) -> &OptimisticCache<T> {
		&self.cache
	}

	/// Current snapshot.
	pub fn snapshot(&self) -> Snapshot<T> {
		self.cache.snapshot()
	}

	/// Fetches the authoritative copy and makes it the confirmed snapshot.
	pub async fn load(&self) -> Result<Snapshot<T>> {
		let value = self.gateway.send_json::<T>(ApiRequest::get(self.path.as_str())).await?;

		Ok(self.cache.replace(value))
	}

	/// Applies `mutation` locally and sends `request`; the response replaces the projection.
	///
	/// Any failure, including a conflict or a terminated session, reverts the projection and is
	/// returned as-is.
	pub async fn mutate<M>(&self, mutation: M, request: ApiRequest) -> Result<Snapshot<T>>
	where
		M: 'static + Mutation<T>,
	{
		self.cache.mutate(mutation, || self.gateway.send_json::<T>(request)).await
	}
}
impl<T, C> Debug for RemoteResource<T, C>
where
	T: Debug,
	C: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RemoteResource")
			.field("path", &self.path)
			.field("cache", &self.cache)
			.finish()
	}
}
