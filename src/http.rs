//! Transport primitives for API calls.
//!
//! [`ApiRequest`] is the caller-facing description of a call (method, path, JSON body,
//! per-call headers). The gateway resolves it into a wire-level [`HttpRequest`] carrying the
//! absolute URL and the `Authorization` header, and hands that to an [`ApiTransport`]. The
//! transport returns an [`ApiResponse`] for every status code; only failures to obtain a
//! response at all surface as [`TransportError`].

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use serde::de::DeserializeOwned;
use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	auth::CredentialPair,
	config::GatewayConfig,
	error::{ConfigError, ResponseError, TransportError},
};

const BODY_PREVIEW_LIMIT: usize = 256;

/// Boxed future returned by [`ApiTransport::dispatch`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks able to execute a fully resolved request.
///
/// This trait is the gateway's only dependency on an HTTP client. Implementations must be
/// `Send + Sync + 'static` so one transport can be shared by the gateway and the renewer.
pub trait ApiTransport
where
	Self: 'static + Send + Sync,
{
	/// Executes `request` and returns the response, whatever its status.
	fn dispatch(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// HTTP methods supported by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
}
impl Method {
	/// Returns the canonical method token.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Whether a request is a first attempt or the single retry after a renewal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Attempt {
	/// First dispatch.
	#[default]
	Initial,
	/// Re-dispatch after the credential was renewed.
	AuthRetry,
}

/// Caller-facing description of an API call.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Path (and optional query) resolved against the configured base URL.
	pub path: String,
	/// Optional JSON body.
	pub body: Option<serde_json::Value>,
	/// Per-call headers; these override configured defaults.
	pub headers: BTreeMap<String, String>,
	/// Whether a 401 response may trigger credential renewal.
	pub auth_refresh: bool,
	/// Attempt marker maintained by the gateway.
	pub attempt: Attempt,
}
impl ApiRequest {
	/// Creates a request with the given method and path.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			body: None,
			headers: BTreeMap::new(),
			auth_refresh: true,
			attempt: Attempt::Initial,
		}
	}

	/// Shorthand for a `GET` request.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::Get, path)
	}

	/// Shorthand for a `POST` request.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::Post, path)
	}

	/// Shorthand for a `PUT` request.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::Put, path)
	}

	/// Shorthand for a `PATCH` request.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::Patch, path)
	}

	/// Shorthand for a `DELETE` request.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::Delete, path)
	}

	/// Attaches a pre-built JSON body.
	pub fn with_body(mut self, body: serde_json::Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Serializes `body` as the JSON payload.
	pub fn json<T>(self, body: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		let value = serde_json::to_value(body).map_err(ConfigError::RequestBody)?;

		Ok(self.with_body(value))
	}

	/// Adds a per-call header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into().to_ascii_lowercase(), value.into());

		self
	}

	/// Disables renewal on 401 for this call (login, renewal, and similar endpoints).
	pub fn without_auth_refresh(mut self) -> Self {
		self.auth_refresh = false;

		self
	}

	/// Returns `true` if this is the post-renewal retry.
	pub fn is_auth_retry(&self) -> bool {
		matches!(self.attempt, Attempt::AuthRetry)
	}
}

/// Fully resolved request handed to an [`ApiTransport`].
#[derive(Clone, PartialEq, Eq)]
pub struct HttpRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute target URL.
	pub url: Url,
	/// Lower-cased header names mapped to values.
	pub headers: BTreeMap<String, String>,
	/// Serialized body, if any.
	pub body: Option<Vec<u8>>,
}
impl HttpRequest {
	/// Resolves a caller-facing request against `config`, attaching `credential` when present.
	///
	/// Header precedence, lowest first: configured defaults, JSON content headers, per-call
	/// headers, and finally the `Authorization` header owned by the gateway.
	pub fn resolve(
		config: &GatewayConfig,
		request: &ApiRequest,
		credential: Option<&CredentialPair>,
	) -> Result<Self, ConfigError> {
		let url = config.endpoint(&request.path)?;
		let mut headers = config
			.default_headers
			.iter()
			.map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
			.collect::<BTreeMap<_, _>>();

		headers.entry("accept".into()).or_insert_with(|| "application/json".into());

		let body = match request.body.as_ref() {
			Some(value) => {
				headers.insert("content-type".into(), "application/json".into());

				Some(serde_json::to_vec(value).map_err(ConfigError::RequestBody)?)
			},
			None => None,
		};

		headers.extend(
			request.headers.iter().map(|(name, value)| (name.to_ascii_lowercase(), value.clone())),
		);

		if let Some(pair) = credential {
			headers.insert("authorization".into(), pair.authorization(&config.auth_scheme));
		}

		Ok(Self { method: request.method, url, headers, body })
	}

	/// Returns the header value for `name` (case-insensitive).
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}
}
impl Debug for HttpRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let headers = self
			.headers
			.iter()
			.map(|(name, value)| {
				let value = if name == "authorization" { "<redacted>" } else { value.as_str() };

				(name.as_str(), value)
			})
			.collect::<Vec<_>>();

		f.debug_struct("HttpRequest")
			.field("method", &self.method)
			.field("url", &self.url.as_str())
			.field("headers", &headers)
			.field("body_len", &self.body.as_ref().map(Vec::len))
			.finish()
	}
}

/// Coarse classification the gateway acts on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResponseClass {
	/// `2xx`.
	Success,
	/// `401 Unauthorized`; triggers the renewal path.
	AuthExpired,
	/// Every other status; passed through untouched.
	Failure,
}
impl ResponseClass {
	/// Classifies a status code.
	pub const fn of(status: u16) -> Self {
		match status {
			200..=299 => Self::Success,
			401 => Self::AuthExpired,
			_ => Self::Failure,
		}
	}
}

/// Response returned by an [`ApiTransport`].
#[derive(Clone, PartialEq, Eq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Lower-cased header names mapped to values.
	pub headers: BTreeMap<String, String>,
	/// Raw body bytes.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Creates a response with no headers.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: BTreeMap::new(), body: body.into() }
	}

	/// Adds a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into().to_ascii_lowercase(), value.into());

		self
	}

	/// Classifies the status code.
	pub fn class(&self) -> ResponseClass {
		ResponseClass::of(self.status)
	}

	/// Returns `true` for `2xx` statuses.
	pub fn is_success(&self) -> bool {
		matches!(self.class(), ResponseClass::Success)
	}

	/// Returns the header value for `name` (case-insensitive).
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Leading part of the body as lossy UTF-8, for diagnostics.
	pub fn body_preview(&self) -> String {
		let end = self.body.len().min(BODY_PREVIEW_LIMIT);

		String::from_utf8_lossy(&self.body[..end]).into_owned()
	}

	/// Parses the `Retry-After` header as delta-seconds or an RFC 2822 date.
	pub fn retry_after(&self) -> Option<Duration> {
		let raw = self.header("retry-after")?.trim();

		if let Ok(secs) = raw.parse::<u32>() {
			return Some(Duration::seconds(secs.into()));
		}
		if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
			let delta = moment - OffsetDateTime::now_utc();

			if delta.is_positive() {
				return Some(delta);
			}
		}

		None
	}

	/// Converts non-success statuses into [`ResponseError::Status`].
	pub fn error_for_status(self) -> Result<Self, ResponseError> {
		if self.is_success() {
			Ok(self)
		} else {
			Err(ResponseError::Status {
				status: self.status,
				body_preview: self.body_preview(),
				retry_after: self.retry_after(),
			})
		}
	}

	/// Decodes the body as JSON, reporting the failing path on error.
	pub fn json<T>(&self) -> Result<T, ResponseError>
	where
		T: DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| ResponseError::Parse { source, status: Some(self.status) })
	}
}
impl Debug for ApiResponse {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiResponse")
			.field("status", &self.status)
			.field("headers", &self.headers)
			.field("body_len", &self.body.len())
			.finish()
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	fn method(method: Method) -> reqwest::Method {
		match method {
			Method::Get => reqwest::Method::GET,
			Method::Post => reqwest::Method::POST,
			Method::Put => reqwest::Method::PUT,
			Method::Patch => reqwest::Method::PATCH,
			Method::Delete => reqwest::Method::DELETE,
		}
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl ApiTransport for ReqwestTransport {
	fn dispatch(&self, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let mut builder = self.0.request(Self::method(request.method), request.url);

			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}
			if let Some(body) = request.body {
				builder = builder.body(body);
			}

			let response = builder.send().await?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
				})
				.collect();
			let body = response.bytes().await?.to_vec();

			Ok(ApiResponse { status, headers, body })
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[derive(Debug, Deserialize)]
	struct Cart {
		total: u32,
	}

	#[test]
	fn classification_covers_statuses() {
		assert_eq!(ResponseClass::of(200), ResponseClass::Success);
		assert_eq!(ResponseClass::of(204), ResponseClass::Success);
		assert_eq!(ResponseClass::of(401), ResponseClass::AuthExpired);
		assert_eq!(ResponseClass::of(403), ResponseClass::Failure);
		assert_eq!(ResponseClass::of(409), ResponseClass::Failure);
		assert_eq!(ResponseClass::of(503), ResponseClass::Failure);
	}

	#[test]
	fn request_builders_normalize_headers_and_flags() {
		let request = ApiRequest::post("/cart/items")
			.json(&serde_json::json!({ "sku": "x", "quantity": 2 }))
			.expect("JSON body should serialize.")
			.with_header("X-Trace", "abc")
			.without_auth_refresh();

		assert_eq!(request.method, Method::Post);
		assert_eq!(request.headers.get("x-trace").map(String::as_str), Some("abc"));
		assert!(!request.auth_refresh);
		assert!(!request.is_auth_retry());
		assert_eq!(request.body.as_ref().and_then(|body| body["quantity"].as_u64()), Some(2));
	}

	#[test]
	fn error_for_status_carries_preview_and_retry_after() {
		let err = ApiResponse::new(409, "insufficient stock")
			.with_header("Retry-After", "30")
			.error_for_status()
			.expect_err("Conflicts should surface as status errors.");

		match err {
			ResponseError::Status { status, body_preview, retry_after } => {
				assert_eq!(status, 409);
				assert_eq!(body_preview, "insufficient stock");
				assert_eq!(retry_after, Some(Duration::seconds(30)));
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}

	#[test]
	fn json_reports_failing_path() {
		let cart: Cart = ApiResponse::new(200, r#"{"total":12}"#)
			.json()
			.expect("Well-formed bodies should decode.");

		assert_eq!(cart.total, 12);

		let err = ApiResponse::new(200, r#"{"total":"twelve"}"#)
			.json::<Cart>()
			.expect_err("Mistyped bodies should fail to decode.");

		match err {
			ResponseError::Parse { source, status } => {
				assert_eq!(source.path().to_string(), "total");
				assert_eq!(status, Some(200));
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}

	#[test]
	fn resolve_layers_headers_and_attaches_credential() {
		let config = GatewayConfig::builder(
			Url::parse("https://shop.example.com/api").expect("URL should parse."),
		)
		.default_header("X-Client", "web")
		.default_header("Accept", "application/vnd.shop+json")
		.build()
		.expect("Configuration should validate.");
		let request = ApiRequest::put("/cart/items/1")
			.json(&serde_json::json!({ "quantity": 3 }))
			.expect("JSON body should serialize.")
			.with_header("Authorization", "Bearer caller-supplied");
		let pair = CredentialPair::new("a1", "r1");
		let resolved =
			HttpRequest::resolve(&config, &request, Some(&pair)).expect("Request should resolve.");

		assert_eq!(resolved.url.as_str(), "https://shop.example.com/api/cart/items/1");
		assert_eq!(resolved.header("x-client"), Some("web"));
		assert_eq!(resolved.header("accept"), Some("application/vnd.shop+json"));
		assert_eq!(resolved.header("content-type"), Some("application/json"));
		assert_eq!(resolved.header("authorization"), Some("Bearer a1"));
		assert_eq!(resolved.body.as_deref(), Some(br#"{"quantity":3}"#.as_slice()));

		let anonymous = HttpRequest::resolve(&config, &ApiRequest::get("/products"), None)
			.expect("Anonymous request should resolve.");

		assert_eq!(anonymous.header("authorization"), None);
		assert_eq!(anonymous.header("content-type"), None);
	}

	#[test]
	fn resolve_refuses_foreign_hosts_before_attaching_credential() {
		let config = GatewayConfig::builder(
			Url::parse("https://shop.example.com/api").expect("URL should parse."),
		)
		.build()
		.expect("Configuration should validate.");
		let pair = CredentialPair::new("secret-a1", "r1");
		let err = HttpRequest::resolve(
			&config,
			&ApiRequest::get("https://evil.example.net/steal"),
			Some(&pair),
		)
		.expect_err("Absolute URLs on another host should be refused.");

		assert!(matches!(err, ConfigError::ForeignOrigin { ref path } if path.contains("evil")));
		assert!(!err.to_string().contains("secret-a1"));
	}

	#[test]
	fn request_debug_redacts_authorization() {
		let mut headers = BTreeMap::new();

		headers.insert("authorization".to_owned(), "Bearer secret".to_owned());

		let request = HttpRequest {
			method: Method::Get,
			url: Url::parse("https://shop.example.com/cart").expect("URL should parse."),
			headers,
			body: None,
		};

		assert!(!format!("{request:?}").contains("secret"));
		assert_eq!(request.header("Authorization"), Some("Bearer secret"));
	}
}
