//! Renewal call contract and the HTTP implementation used by the gateway.

// self
use crate::{
	_prelude::*,
	auth::{CredentialPair, TokenGrant},
	config::GatewayConfig,
	http::{ApiRequest, ApiTransport, HttpRequest},
	refresh::RefreshFailure,
};

/// Boxed future returned by [`CredentialRenewer::renew`].
pub type RenewFuture<'a> =
	Pin<Box<dyn Future<Output = Result<CredentialPair, RefreshFailure>> + 'a + Send>>;

/// Performs the renewal call that trades the stored refresh token for a new pair.
///
/// Implementations only talk to the server; storing the result, clearing credentials, and
/// notifying waiters is the coordinator's job.
pub trait CredentialRenewer
where
	Self: Send + Sync,
{
	/// Exchanges `current.refresh_token` for a new pair.
	fn renew<'a>(&'a self, current: &'a CredentialPair) -> RenewFuture<'a>;
}

#[derive(Serialize)]
struct RenewalBody<'a> {
	refresh_token: &'a str,
}

/// Posts `{"refresh_token": ..}` to the configured renewal endpoint.
pub struct HttpRenewer<T>
where
	T: ?Sized + ApiTransport,
{
	transport: Arc<T>,
	config: Arc<GatewayConfig>,
}
impl<T> HttpRenewer<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates a renewer sharing the gateway's transport and configuration.
	pub fn new(transport: Arc<T>, config: Arc<GatewayConfig>) -> Self {
		Self { transport, config }
	}

	async fn exchange(&self, current: &CredentialPair) -> Result<CredentialPair, RefreshFailure> {
		let body = RenewalBody { refresh_token: current.refresh_token.expose() };
		let request = ApiRequest::post(self.config.renewal_path.as_str())
			.json(&body)
			.and_then(|request| {
				HttpRequest::resolve(&self.config, &request.without_auth_refresh(), None)
			})
			.map_err(|e| RefreshFailure::Configuration { message: e.to_string() })?;
		let response = self
			.transport
			.dispatch(request)
			.await
			.map_err(|e| RefreshFailure::Transport { message: e.to_string() })?;
		let status = response.status;
		let response = response.error_for_status().map_err(|e| RefreshFailure::Rejected {
			status: Some(status),
			message: e.to_string(),
		})?;
		let grant = response
			.json::<TokenGrant>()
			.map_err(|e| RefreshFailure::Rejected { status: Some(status), message: e.to_string() })?;

		grant
			.into_pair(Some(&current.refresh_token))
			.map_err(|e| RefreshFailure::Rejected { status: Some(status), message: e.to_string() })
	}
}
impl<T> CredentialRenewer for HttpRenewer<T>
where
	T: ?Sized + ApiTransport,
{
	fn renew<'a>(&'a self, current: &'a CredentialPair) -> RenewFuture<'a> {
		Box::pin(self.exchange(current))
	}
}
impl<T> Debug for HttpRenewer<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpRenewer").field("renewal_path", &self.config.renewal_path).finish()
	}
}
