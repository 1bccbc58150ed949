//! Optimistic local mutation of a server-owned resource.
//!
//! [`OptimisticCache::mutate`] publishes a locally projected snapshot before the remote call
//! leaves, then settles it: a successful call replaces the projection with the server's
//! authoritative copy, and a failed (or dropped) call reverts it. Every published snapshot is
//! either confirmed by the server or derived from a confirmed one; readers never see a half
//! applied mutation.
//!
//! How overlapping mutations revert is chosen with [`RollbackPolicy`].

// std
use std::ops::Deref;
// crates.io
use tokio::sync::watch;
// self
use crate::{
	_prelude::*,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Local projection of a remote change.
pub trait Mutation<T>
where
	Self: Send + Sync,
{
	/// Returns the value `current` would have once the server accepts the change.
	///
	/// Called without the cache's lock held, so the projection may read the cache itself. It can
	/// run more than once for a single mutation: a projection that raced with another settlement
	/// is recomputed, and [`RollbackPolicy::Rebase`] replays pending mutations on every settle.
	fn apply(&self, current: &T) -> T;
}
impl<T, F> Mutation<T> for F
where
	F: Send + Sync + Fn(&T) -> T,
{
	fn apply(&self, current: &T) -> T {
		self(current)
	}
}

/// Where a snapshot's value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SnapshotOrigin {
	/// Returned by the server (or seeded by the caller).
	Confirmed,
	/// Projected locally while a remote call is outstanding.
	Optimistic,
}

/// Immutable view of the resource at one point in time.
pub struct Snapshot<T> {
	value: Arc<T>,
	version: u64,
	origin: SnapshotOrigin,
}
impl<T> Snapshot<T> {
	/// Shared handle to the value.
	pub fn value(&self) -> &Arc<T> {
		&self.value
	}

	/// Version assigned when the snapshot was created; later snapshots carry larger versions.
	pub fn version(&self) -> u64 {
		self.version
	}

	/// Where the value came from.
	pub fn origin(&self) -> SnapshotOrigin {
		self.origin
	}

	/// Returns `true` while the value is a local projection.
	pub fn is_optimistic(&self) -> bool {
		matches!(self.origin, SnapshotOrigin::Optimistic)
	}
}
impl<T> Clone for Snapshot<T> {
	fn clone(&self) -> Self {
		Self { value: self.value.clone(), version: self.version, origin: self.origin }
	}
}
impl<T> Deref for Snapshot<T> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		&self.value
	}
}
impl<T> Debug for Snapshot<T>
where
	T: Debug,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Snapshot")
			.field("value", &self.value)
			.field("version", &self.version)
			.field("origin", &self.origin)
			.finish()
	}
}

/// How a failed mutation is reverted when other mutations overlap it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPolicy {
	/// Restore the snapshot that was current immediately before the mutation started.
	///
	/// A successful mutation publishes the server copy as-is, dropping the projection of any
	/// mutation still in flight until that one settles. When a server copy was confirmed after
	/// the failed mutation started, that copy is restored instead of the older snapshot.
	#[default]
	RestorePrevious,
	/// Recompute the view from the last confirmed snapshot plus the mutations still pending.
	///
	/// Settling one mutation never discards another one's projection, and a failed mutation
	/// leaves no trace regardless of overlap.
	Rebase,
}
impl RollbackPolicy {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RollbackPolicy::RestorePrevious => "restore_previous",
			RollbackPolicy::Rebase => "rebase",
		}
	}
}

/// Snapshot a reverted mutation left published.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RevertTarget {
	/// The snapshot that was current when the mutation started.
	Previous,
	/// The last confirmed server copy.
	Confirmed,
	/// A projection of the mutations still pending over the confirmed copy.
	Projection,
}
impl RevertTarget {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RevertTarget::Previous => "previous",
			RevertTarget::Confirmed => "confirmed",
			RevertTarget::Projection => "projection",
		}
	}
}

/// Per-mutation command record: the snapshot it replaced and the id of its pending slot.
struct MutationRecord<T> {
	id: u64,
	previous: Snapshot<T>,
}
impl<T> MutationRecord<T> {
	fn open(
		state: &mut CacheState<T>,
		previous: Snapshot<T>,
		mutation: Arc<dyn Mutation<T>>,
		projected: T,
	) -> Self {
		state.next_id += 1;

		let id = state.next_id;

		state.current = state.stamp(Arc::new(projected), SnapshotOrigin::Optimistic);
		state.pending.push(PendingMutation { id, mutation });
		state.revision += 1;

		Self { id, previous }
	}

	fn confirmed(&self, server: T) -> Settlement<T> {
		Settlement::Confirm { id: self.id, server: Arc::new(server) }
	}

	fn rolled_back(&self) -> Settlement<T> {
		Settlement::Rollback { id: self.id, previous: self.previous.clone() }
	}
}

struct PendingMutation<T> {
	id: u64,
	mutation: Arc<dyn Mutation<T>>,
}

/// State transition that ends a mutation or swaps in a fresh server copy.
enum Settlement<T> {
	Confirm { id: u64, server: Arc<T> },
	Rollback { id: u64, previous: Snapshot<T> },
	Replace { server: Arc<T> },
}

/// Pending mutations captured at one revision, replayed without holding the state lock.
struct Replay<T> {
	revision: u64,
	base: Arc<T>,
	mutations: Vec<Arc<dyn Mutation<T>>>,
}
impl<T> Replay<T> {
	/// Applies every captured mutation, in arrival order, over the base value.
	fn project(&self) -> Option<T> {
		let mut projected: Option<T> = None;

		for mutation in &self.mutations {
			let base = projected.as_ref().unwrap_or(&*self.base);

			projected = Some(mutation.apply(base));
		}

		projected
	}
}

struct CacheState<T> {
	current: Snapshot<T>,
	confirmed: Snapshot<T>,
	pending: Vec<PendingMutation<T>>,
	next_version: u64,
	next_id: u64,
	/// Bumped on every committed transition; projections computed at an older revision are stale.
	revision: u64,
}
impl<T> CacheState<T> {
	fn stamp(&mut self, value: Arc<T>, origin: SnapshotOrigin) -> Snapshot<T> {
		self.next_version += 1;

		Snapshot { value, version: self.next_version, origin }
	}

	/// Captures what a rebase after `settlement` has to replay.
	fn replay(&self, settlement: &Settlement<T>) -> Replay<T> {
		let (base, settled) = match settlement {
			Settlement::Confirm { id, server } => (server.clone(), Some(*id)),
			Settlement::Rollback { id, .. } => (self.confirmed.value.clone(), Some(*id)),
			Settlement::Replace { server } => (server.clone(), None),
		};
		let mutations = self
			.pending
			.iter()
			.filter(|pending| Some(pending.id) != settled)
			.map(|pending| pending.mutation.clone())
			.collect();

		Replay { revision: self.revision, base, mutations }
	}

	/// Commits `settlement` and returns the confirmed snapshot plus what is now published.
	///
	/// `projected` is the rebased view computed from [`CacheState::replay`] at the current
	/// revision; it is `None` when nothing is left pending or the policy does not rebase.
	fn settle(
		&mut self,
		settlement: Settlement<T>,
		policy: RollbackPolicy,
		projected: Option<T>,
	) -> (Snapshot<T>, RevertTarget) {
		let previous = match settlement {
			Settlement::Confirm { id, server } => {
				self.pending.retain(|pending| pending.id != id);
				self.confirmed = self.stamp(server, SnapshotOrigin::Confirmed);

				None
			},
			Settlement::Replace { server } => {
				self.confirmed = self.stamp(server, SnapshotOrigin::Confirmed);

				None
			},
			// A server copy confirmed after the mutation started supersedes its previous snapshot.
			Settlement::Rollback { id, previous } => {
				self.pending.retain(|pending| pending.id != id);

				(previous.version >= self.confirmed.version).then_some(previous)
			},
		};
		let target = match (policy, previous, projected) {
			(RollbackPolicy::RestorePrevious, Some(previous), _) => {
				self.current = previous;

				RevertTarget::Previous
			},
			(RollbackPolicy::Rebase, _, Some(value)) => {
				self.current = self.stamp(Arc::new(value), SnapshotOrigin::Optimistic);

				RevertTarget::Projection
			},
			_ => {
				self.current = self.confirmed.clone();

				RevertTarget::Confirmed
			},
		};

		self.revision += 1;

		(self.confirmed.clone(), target)
	}
}

/// Client-held copy of a mutable server resource with optimistic updates.
pub struct OptimisticCache<T> {
	policy: RollbackPolicy,
	state: Mutex<CacheState<T>>,
	publisher: watch::Sender<Snapshot<T>>,
}
impl<T> OptimisticCache<T>
where
	T: 'static + Send + Sync,
{
	/// Creates a cache seeded with a confirmed `initial` value.
	pub fn new(initial: T) -> Self {
		Self::with_policy(initial, RollbackPolicy::default())
	}

	/// Creates a cache with an explicit rollback policy.
	pub fn with_policy(initial: T, policy: RollbackPolicy) -> Self {
		let seed =
			Snapshot { value: Arc::new(initial), version: 0, origin: SnapshotOrigin::Confirmed };
		let (publisher, _) = watch::channel(seed.clone());
		let state = CacheState {
			current: seed.clone(),
			confirmed: seed,
			pending: Vec::new(),
			next_version: 0,
			next_id: 0,
			revision: 0,
		};

		Self { policy, state: Mutex::new(state), publisher }
	}

	/// Active rollback policy.
	pub fn policy(&self) -> RollbackPolicy {
		self.policy
	}

	/// Snapshot consumers should render.
	pub fn snapshot(&self) -> Snapshot<T> {
		self.state.lock().current.clone()
	}

	/// Last snapshot returned by the server.
	pub fn confirmed(&self) -> Snapshot<T> {
		self.state.lock().confirmed.clone()
	}

	/// Number of mutations whose remote call has not settled yet.
	pub fn pending(&self) -> usize {
		self.state.lock().pending.len()
	}

	/// Watches every published snapshot (optimistic, confirmed, or reverted).
	pub fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
		self.publisher.subscribe()
	}

	/// Replaces the confirmed snapshot with a fresh server copy, e.g. after a reload.
	pub fn replace(&self, server: T) -> Snapshot<T> {
		self.settle(Settlement::Replace { server: Arc::new(server) }).0
	}

	/// Applies `mutation` locally, runs `remote`, and settles the cache with its outcome.
	///
	/// `remote` must resolve to the full server representation. On success that value becomes
	/// the confirmed snapshot and is returned; on failure the projection is reverted according
	/// to the cache's [`RollbackPolicy`] and the error is returned untouched. Dropping the
	/// returned future before it completes reverts the projection as well.
	pub async fn mutate<M, F, Fut, E>(&self, mutation: M, remote: F) -> Result<Snapshot<T>, E>
	where
		M: 'static + Mutation<T>,
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T, E>>,
	{
		const KIND: FlowKind = FlowKind::Mutation;

		let span = FlowSpan::new(KIND, "mutate");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		span.instrument(async move {
			let record = self.begin(Arc::new(mutation));
			let in_flight = InFlight { cache: self, record, settled: false };

			match remote().await {
				Ok(server) => {
					let confirmed = in_flight.confirm(server);

					obs::record_flow_outcome(KIND, FlowOutcome::Success);

					Ok(confirmed)
				},
				Err(e) => {
					in_flight.rollback();
					obs::record_flow_outcome(KIND, FlowOutcome::Failure);

					Err(e)
				},
			}
		})
		.await
	}

	/// Projects `mutation` over the current snapshot and publishes it as pending.
	fn begin(&self, mutation: Arc<dyn Mutation<T>>) -> MutationRecord<T> {
		loop {
			let (revision, previous) = {
				let state = self.state.lock();

				(state.revision, state.current.clone())
			};
			let projected = mutation.apply(&previous.value);
			let mut state = self.state.lock();

			if state.revision != revision {
				continue;
			}

			let record = MutationRecord::open(&mut state, previous, mutation, projected);

			self.publish(&state);

			return record;
		}
	}

	/// Commits `settlement`, replaying pending mutations outside the lock under `Rebase`.
	fn settle(&self, settlement: Settlement<T>) -> (Snapshot<T>, RevertTarget) {
		loop {
			let (revision, projected) = match self.policy {
				RollbackPolicy::RestorePrevious => (None, None),
				RollbackPolicy::Rebase => {
					let replay = self.state.lock().replay(&settlement);

					(Some(replay.revision), replay.project())
				},
			};
			let mut state = self.state.lock();

			if revision.is_some_and(|revision| revision != state.revision) {
				continue;
			}

			let settled = state.settle(settlement, self.policy, projected);

			self.publish(&state);

			return settled;
		}
	}

	fn publish(&self, state: &CacheState<T>) {
		// Published under the state lock so subscribers observe snapshots in state order.
		self.publisher.send_replace(state.current.clone());
	}
}
impl<T> Debug for OptimisticCache<T>
where
	T: Debug,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.lock();

		f.debug_struct("OptimisticCache")
			.field("policy", &self.policy)
			.field("current", &state.current)
			.field("pending", &state.pending.len())
			.finish()
	}
}

/// Reverts the mutation if the future driving it is dropped before the remote call settles.
struct InFlight<'a, T>
where
	T: 'static + Send + Sync,
{
	cache: &'a OptimisticCache<T>,
	record: MutationRecord<T>,
	settled: bool,
}
impl<T> InFlight<'_, T>
where
	T: 'static + Send + Sync,
{
	fn confirm(mut self, server: T) -> Snapshot<T> {
		self.settled = true;

		self.cache.settle(self.record.confirmed(server)).0
	}

	fn rollback(mut self) {
		self.settled = true;
		self.revert();
	}

	fn revert(&self) {
		let (_, target) = self.cache.settle(self.record.rolled_back());

		obs::record_flow_outcome(FlowKind::Mutation, FlowOutcome::RolledBack);
		obs::record_rollback(self.cache.policy, target);
	}
}
impl<T> Drop for InFlight<'_, T>
where
	T: 'static + Send + Sync,
{
	fn drop(&mut self) {
		if !self.settled {
			self.revert();
		}
	}
}
