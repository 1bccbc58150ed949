//! Auth-aware request dispatch.
//!
//! [`RequestGateway::send`] attaches the stored credential, dispatches the call, and returns
//! every non-401 response verbatim. A 401 on a first attempt is handed to the shared
//! [`RefreshCoordinator`]; when renewal succeeds the original request is re-dispatched exactly
//! once with the new credential, and when it fails the caller receives
//! [`Error::SessionTerminated`]. A 401 on the retry is surfaced as [`Error::AuthExpired`] and
//! never retried again.

// self
use crate::{
	_prelude::*,
	auth::{CredentialPair, TokenGrant},
	config::GatewayConfig,
	http::{ApiRequest, ApiResponse, ApiTransport, Attempt, HttpRequest, ResponseClass},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	refresh::{CredentialRenewer, HttpRenewer, RefreshCoordinator, RefreshMetrics},
	session::{SessionEvent, SessionEvents},
	store::CredentialStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

#[cfg(feature = "reqwest")]
/// Gateway specialized for the crate's default reqwest transport.
pub type ReqwestGateway = RequestGateway<ReqwestTransport>;

/// Wraps every outbound call with credential attachment and single-flight renewal.
///
/// The gateway is cheap to clone; clones share the transport, store, coordinator, and event
/// hub, so every handle observes the same session.
pub struct RequestGateway<T>
where
	T: ?Sized + ApiTransport,
{
	/// Transport used for every outbound request.
	pub transport: Arc<T>,
	/// Base URL, endpoint paths, and header conventions.
	pub config: Arc<GatewayConfig>,
	/// Holder of the current credential pair.
	pub store: Arc<dyn CredentialStore>,
	/// Coordinator that serializes renewals for this session.
	pub coordinator: Arc<RefreshCoordinator>,
	/// Session lifecycle events.
	pub events: Arc<SessionEvents>,
}
impl<T> RequestGateway<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates a gateway that renews credentials through `transport` as well.
	pub fn with_transport(
		config: GatewayConfig,
		store: Arc<dyn CredentialStore>,
		transport: impl Into<Arc<T>>,
	) -> Self {
		let transport = transport.into();
		let config = Arc::new(config);
		let renewer = Arc::new(HttpRenewer::new(transport.clone(), config.clone()));

		Self::with_renewer(config, store, transport, renewer)
	}

	/// Creates a gateway with a caller-provided renewer.
	pub fn with_renewer(
		config: Arc<GatewayConfig>,
		store: Arc<dyn CredentialStore>,
		transport: Arc<T>,
		renewer: Arc<dyn CredentialRenewer>,
	) -> Self {
		let events = Arc::new(SessionEvents::default());
		let coordinator =
			Arc::new(RefreshCoordinator::new(renewer, store.clone(), events.clone()));

		Self { transport, config, store, coordinator, events }
	}

	/// Renewal counters for this session.
	pub fn refresh_metrics(&self) -> &Arc<RefreshMetrics> {
		self.coordinator.metrics()
	}

	/// Returns the stored credential pair, if any.
	pub async fn credential(&self) -> Result<Option<CredentialPair>> {
		Ok(self.store.get().await?)
	}

	/// Dispatches `request`, renewing the credential once if the server reports it expired.
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::new(KIND, "send");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.send_with_renewal(request)).await;

		match &result {
			Ok(response) if response.is_success() =>
				obs::record_flow_outcome(KIND, FlowOutcome::Success),
			_ => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Dispatches `request`, rejects non-`2xx` statuses, and decodes the JSON body.
	pub async fn send_json<R>(&self, request: ApiRequest) -> Result<R>
	where
		R: serde::de::DeserializeOwned,
	{
		let response = self.send(request).await?.error_for_status()?;

		Ok(response.json()?)
	}

	/// Exchanges login `credentials` for a pair and stores it.
	pub async fn login<B>(&self, credentials: &B) -> Result<CredentialPair>
	where
		B: ?Sized + Serialize,
	{
		const KIND: FlowKind = FlowKind::Login;

		let span = FlowSpan::new(KIND, "login");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let request = ApiRequest::post(self.config.login_path.as_str())
					.json(credentials)?
					.without_auth_refresh();
				let response = self.dispatch(&request, None).await?;

				if matches!(response.class(), ResponseClass::AuthExpired) {
					return Err(Error::AuthExpired { status: response.status });
				}

				let grant = response.error_for_status()?.json::<TokenGrant>()?;
				let pair = grant.into_pair(None)?;

				self.establish(pair.clone()).await?;

				Ok(pair)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Stores a pair obtained outside the gateway and announces the new session.
	pub async fn establish(&self, pair: CredentialPair) -> Result<()> {
		self.store.set(pair).await?;
		self.events.emit(SessionEvent::Established);

		Ok(())
	}

	/// Ends the session.
	///
	/// The logout endpoint, when configured, is notified with the current credential first.
	/// The store is cleared and [`SessionEvent::LoggedOut`] emitted regardless of that call's
	/// outcome; a failed notification is still reported to the caller afterwards.
	pub async fn logout(&self) -> Result<()> {
		let notified = match (self.config.logout_path.as_deref(), self.store.get().await?) {
			(Some(path), Some(pair)) => {
				let request = ApiRequest::post(path).without_auth_refresh();

				self.dispatch(&request, Some(&pair))
					.await
					.and_then(|response| Ok(response.error_for_status().map(|_| ())?))
			},
			_ => Ok(()),
		};

		self.store.clear().await?;
		self.events.emit(SessionEvent::LoggedOut);

		notified
	}

	async fn send_with_renewal(&self, mut request: ApiRequest) -> Result<ApiResponse> {
		let credential = self.store.get().await?;
		let response = self.dispatch(&request, credential.as_ref()).await?;

		if !matches!(response.class(), ResponseClass::AuthExpired) {
			return Ok(response);
		}
		if !request.auth_refresh || request.is_auth_retry() {
			return Err(Error::AuthExpired { status: response.status });
		}

		let stale = credential.as_ref().map(|pair| pair.access_token.expose());
		let renewed = self
			.coordinator
			.refresh_or_wait(stale)
			.await
			.map_err(|reason| Error::from_refresh_failure(response.status, reason))?;

		request.attempt = Attempt::AuthRetry;

		let retried = self.dispatch(&request, Some(&renewed)).await?;

		if matches!(retried.class(), ResponseClass::AuthExpired) {
			return Err(Error::AuthExpired { status: retried.status });
		}

		Ok(retried)
	}

	async fn dispatch(
		&self,
		request: &ApiRequest,
		credential: Option<&CredentialPair>,
	) -> Result<ApiResponse> {
		let resolved = HttpRequest::resolve(&self.config, request, credential)?;

		Ok(self.transport.dispatch(resolved).await?)
	}
}
#[cfg(feature = "reqwest")]
impl RequestGateway<ReqwestTransport> {
	/// Creates a gateway backed by a default reqwest client.
	pub fn new(config: GatewayConfig, store: Arc<dyn CredentialStore>) -> Self {
		Self::with_transport(config, store, ReqwestTransport::default())
	}
}
impl<T> Clone for RequestGateway<T>
where
	T: ?Sized + ApiTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			config: self.config.clone(),
			store: self.store.clone(),
			coordinator: self.coordinator.clone(),
			events: self.events.clone(),
		}
	}
}
impl<T> Debug for RequestGateway<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestGateway")
			.field("base_url", &self.config.base_url.as_str())
			.field("coordinator", &self.coordinator)
			.finish()
	}
}
