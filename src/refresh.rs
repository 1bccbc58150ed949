//! Single-flight credential renewal.
//!
//! [`RefreshCoordinator::refresh_or_wait`] is called by every request that hit an
//! auth-expired response. The first caller flips the coordinator from [`RefreshState::Idle`]
//! to [`RefreshState::Refreshing`] and performs the renewal; callers arriving while it runs
//! are appended to a FIFO wait list and suspended. When the renewal settles, the state returns
//! to `Idle` and every waiter is released, in arrival order, with the same outcome.
//!
//! Once it owns the `Refreshing` state the initiator re-reads the store: if the stored access
//! token already differs from the one the failing request carried, another caller renewed in
//! the meantime and the stored pair is handed out without a second renewal call.
//!
//! A failed renewal is terminal for the session: the store is cleared and
//! [`SessionEvent::Terminated`] is emitted once, no matter how many callers were queued.
//! Dropping the initiating future before it settles releases the waiters with
//! [`RefreshFailure::Interrupted`] and leaves the stored credential untouched.

mod metrics;
mod renewer;

pub use metrics::RefreshMetrics;
pub use renewer::*;

// std
use std::{collections::VecDeque, mem};
// crates.io
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	auth::CredentialPair,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	session::{SessionEvent, SessionEvents},
	store::CredentialStore,
};

/// Outcome shared by the renewal initiator and every waiter.
pub type RefreshOutcome = Result<CredentialPair, RefreshFailure>;

/// Renewal lifecycle of a coordinator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RefreshState {
	/// No renewal in flight.
	#[default]
	Idle,
	/// A renewal is in flight; new callers queue behind it.
	Refreshing,
}

/// Uniform renewal failure delivered to the initiator and every waiter.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshFailure {
	/// Nothing is stored, so there is no refresh token to present.
	#[error("No credential is stored; login is required.")]
	MissingCredential,
	/// Server refused the renewal or answered with an unusable payload.
	#[error("Renewal was rejected (status {status:?}): {message}.")]
	Rejected {
		/// HTTP status of the renewal response, when one was received.
		status: Option<u16>,
		/// Diagnostic message.
		message: String,
	},
	/// Renewal endpoint could not be reached.
	#[error("Renewal endpoint could not be reached: {message}.")]
	Transport {
		/// Diagnostic message.
		message: String,
	},
	/// Renewal request could not be built from the configuration.
	#[error("Renewal request could not be built: {message}.")]
	Configuration {
		/// Diagnostic message.
		message: String,
	},
	/// Credential store failed while reading or persisting the pair.
	#[error("Credential store failed during renewal: {message}.")]
	Storage {
		/// Diagnostic message.
		message: String,
	},
	/// The initiating caller was dropped before the renewal settled.
	#[error("Renewal was interrupted before it completed.")]
	Interrupted,
}

/// A caller parked behind the in-flight renewal.
struct PendingRequest {
	release: oneshot::Sender<RefreshOutcome>,
}

#[derive(Default)]
struct CoordinatorState {
	state: RefreshState,
	waiters: VecDeque<PendingRequest>,
}

/// Guarantees at most one renewal call in flight and fans its outcome out to every waiter.
///
/// One coordinator is constructed per session and shared (behind `Arc`) by every gateway
/// handle that talks to the same API.
pub struct RefreshCoordinator {
	renewer: Arc<dyn CredentialRenewer>,
	store: Arc<dyn CredentialStore>,
	events: Arc<SessionEvents>,
	metrics: Arc<RefreshMetrics>,
	inner: Mutex<CoordinatorState>,
}
impl RefreshCoordinator {
	/// Creates an idle coordinator.
	pub fn new(
		renewer: Arc<dyn CredentialRenewer>,
		store: Arc<dyn CredentialStore>,
		events: Arc<SessionEvents>,
	) -> Self {
		Self {
			renewer,
			store,
			events,
			metrics: Default::default(),
			inner: Default::default(),
		}
	}

	/// Current renewal state.
	pub fn state(&self) -> RefreshState {
		self.inner.lock().state
	}

	/// Number of callers currently parked behind the in-flight renewal.
	pub fn waiting(&self) -> usize {
		self.inner.lock().waiters.len()
	}

	/// Renewal counters.
	pub fn metrics(&self) -> &Arc<RefreshMetrics> {
		&self.metrics
	}

	/// Session event hub this coordinator reports to.
	pub fn events(&self) -> &Arc<SessionEvents> {
		&self.events
	}

	/// Renews the credential, or waits for the renewal already in flight.
	///
	/// `stale_access` is the access token the failing request carried (`None` if it carried
	/// none); it lets a late caller pick up a pair that was renewed after its request left.
	pub async fn refresh_or_wait(&self, stale_access: Option<&str>) -> RefreshOutcome {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh_or_wait");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.run(stale_access)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn run(&self, stale_access: Option<&str>) -> RefreshOutcome {
		let parked = {
			let mut inner = self.inner.lock();

			match inner.state {
				RefreshState::Idle => {
					inner.state = RefreshState::Refreshing;

					None
				},
				RefreshState::Refreshing => {
					let (release, parked) = oneshot::channel();

					inner.waiters.push_back(PendingRequest { release });

					Some(parked)
				},
			}
		};

		if let Some(parked) = parked {
			self.metrics.record_coalesced();
			obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Coalesced);

			// A dropped sender means the initiator vanished without settling.
			return parked.await.unwrap_or(Err(RefreshFailure::Interrupted));
		}

		let flight = Flight { coordinator: self, settled: false };
		let outcome = self.renew_exclusive(stale_access).await;

		flight.settle(&outcome);

		outcome
	}

	/// Runs while this caller owns the `Refreshing` state.
	async fn renew_exclusive(&self, stale_access: Option<&str>) -> RefreshOutcome {
		let current = match self.store.get().await {
			Ok(current) => current,
			Err(e) => {
				return self.terminate(RefreshFailure::Storage { message: e.to_string() }).await;
			},
		};
		// An empty store means there is no session, or it was already terminated.
		let Some(current) = current else {
			return Err(RefreshFailure::MissingCredential);
		};

		if current.supersedes(stale_access) {
			self.metrics.record_reused();

			return Ok(current);
		}

		self.metrics.record_attempt();

		let renewed = match self.renewer.renew(&current).await {
			Ok(renewed) => renewed,
			Err(failure) => return self.terminate(failure).await,
		};

		if let Err(e) = self.store.set(renewed.clone()).await {
			return self.terminate(RefreshFailure::Storage { message: e.to_string() }).await;
		}

		self.metrics.record_success();
		self.events.emit(SessionEvent::Renewed);

		Ok(renewed)
	}

	async fn terminate(&self, reason: RefreshFailure) -> RefreshOutcome {
		self.metrics.record_failure();

		let reason = match self.store.clear().await {
			Ok(()) => reason,
			// The pair may still be on disk; report that instead of the renewal failure.
			Err(e) => RefreshFailure::Storage { message: e.to_string() },
		};

		obs::record_session_terminated(&reason);
		self.events.emit(SessionEvent::Terminated { reason: reason.clone() });

		Err(reason)
	}

	fn release(&self, outcome: &RefreshOutcome) {
		let waiters = {
			let mut inner = self.inner.lock();

			inner.state = RefreshState::Idle;

			mem::take(&mut inner.waiters)
		};

		for waiter in waiters {
			// A waiter whose caller went away no longer needs the outcome.
			let _ = waiter.release.send(outcome.clone());
		}
	}
}
impl Debug for RefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let inner = self.inner.lock();

		f.debug_struct("RefreshCoordinator")
			.field("state", &inner.state)
			.field("waiting", &inner.waiters.len())
			.field("metrics", &self.metrics)
			.finish()
	}
}

/// Returns the coordinator to `Idle` exactly once, even if the initiating future is dropped.
struct Flight<'a> {
	coordinator: &'a RefreshCoordinator,
	settled: bool,
}
impl Flight<'_> {
	fn settle(mut self, outcome: &RefreshOutcome) {
		self.settled = true;
		self.coordinator.release(outcome);
	}
}
impl Drop for Flight<'_> {
	fn drop(&mut self) {
		if !self.settled {
			self.coordinator.release(&Err(RefreshFailure::Interrupted));
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{
		sync::atomic::{AtomicUsize, Ordering},
		time::Duration as StdDuration,
	};
	// crates.io
	use tokio::{sync::Notify, task::JoinHandle};
	// self
	use super::*;
	use crate::store::MemoryStore;

	struct GatedRenewer {
		calls: AtomicUsize,
		gate: Notify,
		outcome: RefreshOutcome,
	}
	impl GatedRenewer {
		fn new(outcome: RefreshOutcome) -> Arc<Self> {
			Arc::new(Self { calls: AtomicUsize::new(0), gate: Notify::new(), outcome })
		}

		fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}
	}
	impl CredentialRenewer for GatedRenewer {
		fn renew<'a>(&'a self, _current: &'a CredentialPair) -> RenewFuture<'a> {
			Box::pin(async move {
				self.calls.fetch_add(1, Ordering::SeqCst);
				self.gate.notified().await;

				self.outcome.clone()
			})
		}
	}

	fn coordinator(
		renewer: Arc<GatedRenewer>,
		store: &MemoryStore,
	) -> (Arc<RefreshCoordinator>, Arc<SessionEvents>) {
		let events = Arc::new(SessionEvents::default());
		let coordinator = Arc::new(RefreshCoordinator::new(
			renewer,
			Arc::new(store.clone()),
			events.clone(),
		));

		(coordinator, events)
	}

	fn spawn_refresh(
		coordinator: &Arc<RefreshCoordinator>,
		stale: &str,
	) -> JoinHandle<RefreshOutcome> {
		let coordinator = coordinator.clone();
		let stale = stale.to_owned();

		tokio::spawn(async move { coordinator.refresh_or_wait(Some(&stale)).await })
	}

	async fn wait_until(mut condition: impl FnMut() -> bool) {
		for _ in 0..5_000 {
			if condition() {
				return;
			}

			tokio::time::sleep(StdDuration::from_millis(1)).await;
		}

		panic!("Condition was not reached in time.");
	}

	/// Starts one initiator and `waiters` queued callers, all carrying access token `a1`.
	async fn start_flight(
		coordinator: &Arc<RefreshCoordinator>,
		renewer: &Arc<GatedRenewer>,
		waiters: usize,
	) -> Vec<JoinHandle<RefreshOutcome>> {
		let mut handles = vec![spawn_refresh(coordinator, "a1")];

		wait_until(|| renewer.calls() == 1).await;

		for _ in 0..waiters {
			handles.push(spawn_refresh(coordinator, "a1"));
		}

		wait_until(|| coordinator.waiting() == waiters).await;

		handles
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_callers_share_one_successful_renewal() {
		let store = MemoryStore::with_pair(CredentialPair::new("a1", "r1"));
		let renewer = GatedRenewer::new(Ok(CredentialPair::new("a2", "r2")));
		let (coordinator, events) = coordinator(renewer.clone(), &store);
		let mut rx = events.subscribe();
		let handles = start_flight(&coordinator, &renewer, 4).await;

		assert_eq!(coordinator.state(), RefreshState::Refreshing);

		renewer.gate.notify_one();

		for handle in handles {
			let pair = handle
				.await
				.expect("Refresh task should not panic.")
				.expect("Every caller should observe the renewed pair.");

			assert_eq!(pair.access_token.expose(), "a2");
		}

		assert_eq!(renewer.calls(), 1);
		assert_eq!(coordinator.state(), RefreshState::Idle);
		assert_eq!(coordinator.metrics().attempts(), 1);
		assert_eq!(coordinator.metrics().coalesced(), 4);
		assert_eq!(
			store.current().map(|pair| pair.refresh_token.expose().to_owned()),
			Some("r2".into())
		);
		assert_eq!(rx.try_recv(), Ok(SessionEvent::Renewed));
		assert_eq!(events.terminations(), 0);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn failed_renewal_clears_store_and_terminates_once() {
		let store = MemoryStore::with_pair(CredentialPair::new("a1", "r1"));
		let failure = RefreshFailure::Rejected { status: Some(401), message: "expired".into() };
		let renewer = GatedRenewer::new(Err(failure.clone()));
		let (coordinator, events) = coordinator(renewer.clone(), &store);
		let handles = start_flight(&coordinator, &renewer, 4).await;

		renewer.gate.notify_one();

		for handle in handles {
			let outcome = handle.await.expect("Refresh task should not panic.");

			assert_eq!(outcome, Err(failure.clone()));
		}

		assert!(store.current().is_none());
		assert_eq!(events.terminations(), 1);
		assert_eq!(coordinator.metrics().failures(), 1);

		// Late callers find the session gone and must not terminate it again.
		let late = coordinator.refresh_or_wait(Some("a1")).await;

		assert_eq!(late, Err(RefreshFailure::MissingCredential));
		assert_eq!(events.terminations(), 1);
		assert_eq!(renewer.calls(), 1);
	}

	#[tokio::test]
	async fn late_caller_reuses_already_renewed_pair() {
		let store = MemoryStore::with_pair(CredentialPair::new("a2", "r2"));
		let renewer = GatedRenewer::new(Ok(CredentialPair::new("a3", "r3")));
		let (coordinator, _events) = coordinator(renewer.clone(), &store);
		let pair = coordinator
			.refresh_or_wait(Some("a1"))
			.await
			.expect("A newer stored pair should be handed out.");

		assert_eq!(pair.access_token.expose(), "a2");
		assert_eq!(renewer.calls(), 0);
		assert_eq!(coordinator.metrics().reused(), 1);
		assert_eq!(coordinator.state(), RefreshState::Idle);
	}

	#[tokio::test]
	async fn empty_store_fails_without_renewal_or_event() {
		let store = MemoryStore::default();
		let renewer = GatedRenewer::new(Ok(CredentialPair::new("a2", "r2")));
		let (coordinator, events) = coordinator(renewer.clone(), &store);
		let outcome = coordinator.refresh_or_wait(None).await;

		assert_eq!(outcome, Err(RefreshFailure::MissingCredential));
		assert_eq!(renewer.calls(), 0);
		assert_eq!(events.terminations(), 0);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn dropped_initiator_interrupts_waiters_and_keeps_credentials() {
		let store = MemoryStore::with_pair(CredentialPair::new("a1", "r1"));
		let renewer = GatedRenewer::new(Ok(CredentialPair::new("a2", "r2")));
		let (coordinator, events) = coordinator(renewer.clone(), &store);
		let mut handles = start_flight(&coordinator, &renewer, 1).await;
		let waiter = handles.pop().expect("Waiter handle should exist.");
		let initiator = handles.pop().expect("Initiator handle should exist.");

		initiator.abort();

		let outcome = waiter.await.expect("Waiter task should not panic.");

		assert_eq!(outcome, Err(RefreshFailure::Interrupted));
		wait_until(|| coordinator.state() == RefreshState::Idle).await;
		assert_eq!(
			store.current().map(|pair| pair.access_token.expose().to_owned()),
			Some("a1".into())
		);
		assert_eq!(events.terminations(), 0);
	}
}
