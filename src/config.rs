//! Gateway configuration: API base URL, session endpoints, and header conventions.

// self
use crate::{_prelude::*, error::ConfigError};

/// Errors raised while constructing or validating a [`GatewayConfig`].
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ConfigValidationError {
	/// Base URL must be absolute http(s) and able to carry paths.
	#[error("Base URL `{url}` must be an absolute http(s) URL.")]
	InvalidBaseUrl {
		/// URL that failed validation.
		url: String,
	},
	/// Plain HTTP was supplied without opting in.
	#[error("Base URL must use HTTPS unless insecure HTTP is explicitly allowed: {url}.")]
	InsecureBaseUrl {
		/// URL that failed validation.
		url: String,
	},
	/// Endpoint paths are joined onto the base URL and must be absolute.
	#[error("The {endpoint} path must start with `/`: {path}.")]
	RelativePath {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Path that failed validation.
		path: String,
	},
	/// Authorization scheme must be a printable token.
	#[error("Authorization scheme must be a non-empty printable token.")]
	InvalidAuthScheme,
}

/// Immutable configuration consumed by the gateway and renewer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
	/// Base URL every request path is resolved against.
	pub base_url: Url,
	/// Renewal endpoint receiving `{"refresh_token": ..}`.
	pub renewal_path: String,
	/// Login endpoint returning a credential pair.
	pub login_path: String,
	/// Optional endpoint notified on logout.
	pub logout_path: Option<String>,
	/// Scheme placed before the access token in the `Authorization` header.
	pub auth_scheme: String,
	/// Headers attached to every request (before per-call headers).
	#[serde(default)]
	pub default_headers: BTreeMap<String, String>,
	/// Allows `http://` base URLs; intended for local development only.
	#[serde(default)]
	pub allow_insecure_http: bool,
}
impl GatewayConfig {
	/// Default renewal path.
	pub const DEFAULT_RENEWAL_PATH: &'static str = "/auth/refresh";
	/// Default login path.
	pub const DEFAULT_LOGIN_PATH: &'static str = "/auth/login";
	/// Default authorization scheme.
	pub const DEFAULT_AUTH_SCHEME: &'static str = "Bearer";

	/// Creates a new builder for the provided base URL.
	pub fn builder(base_url: Url) -> GatewayConfigBuilder {
		GatewayConfigBuilder::new(base_url)
	}

	/// Resolves `path` (and any query it carries) against the base URL.
	///
	/// Paths that resolve outside the base URL's origin are rejected.
	pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
		let relative = path.trim_start_matches('/');
		let mut base = self.base_url.clone();

		// Keep the base's own path prefix (e.g. `/api/v1`) when joining.
		if !base.path().ends_with('/') {
			let with_slash = format!("{}/", base.path());

			base.set_path(&with_slash);
		}

		let joined = base
			.join(relative)
			.map_err(|source| ConfigError::InvalidPath { path: path.to_owned(), source })?;

		// Absolute and scheme-relative inputs would carry the credential to another host.
		if joined.origin() != self.base_url.origin() {
			return Err(ConfigError::ForeignOrigin { path: path.to_owned() });
		}

		Ok(joined)
	}

	/// Validates invariants for the configuration.
	pub fn validate(&self) -> Result<(), ConfigValidationError> {
		match self.base_url.scheme() {
			"https" => {},
			"http" if self.allow_insecure_http => {},
			"http" =>
				return Err(ConfigValidationError::InsecureBaseUrl {
					url: self.base_url.to_string(),
				}),
			_ =>
				return Err(ConfigValidationError::InvalidBaseUrl {
					url: self.base_url.to_string(),
				}),
		}

		if self.base_url.cannot_be_a_base() {
			return Err(ConfigValidationError::InvalidBaseUrl { url: self.base_url.to_string() });
		}

		validate_path("renewal", &self.renewal_path)?;
		validate_path("login", &self.login_path)?;

		if let Some(logout) = self.logout_path.as_deref() {
			validate_path("logout", logout)?;
		}
		if self.auth_scheme.is_empty()
			|| !self.auth_scheme.chars().all(|c| c.is_ascii_graphic())
		{
			return Err(ConfigValidationError::InvalidAuthScheme);
		}

		Ok(())
	}
}

/// Builder for [`GatewayConfig`] values.
#[derive(Debug)]
pub struct GatewayConfigBuilder {
	config: GatewayConfig,
}
impl GatewayConfigBuilder {
	/// Creates a new builder seeded with defaults.
	pub fn new(base_url: Url) -> Self {
		Self {
			config: GatewayConfig {
				base_url,
				renewal_path: GatewayConfig::DEFAULT_RENEWAL_PATH.into(),
				login_path: GatewayConfig::DEFAULT_LOGIN_PATH.into(),
				logout_path: None,
				auth_scheme: GatewayConfig::DEFAULT_AUTH_SCHEME.into(),
				default_headers: BTreeMap::new(),
				allow_insecure_http: false,
			},
		}
	}

	/// Overrides the renewal endpoint path.
	pub fn renewal_path(mut self, path: impl Into<String>) -> Self {
		self.config.renewal_path = path.into();

		self
	}

	/// Overrides the login endpoint path.
	pub fn login_path(mut self, path: impl Into<String>) -> Self {
		self.config.login_path = path.into();

		self
	}

	/// Sets the endpoint notified on logout.
	pub fn logout_path(mut self, path: impl Into<String>) -> Self {
		self.config.logout_path = Some(path.into());

		self
	}

	/// Overrides the authorization scheme (defaults to `Bearer`).
	pub fn auth_scheme(mut self, scheme: impl Into<String>) -> Self {
		self.config.auth_scheme = scheme.into();

		self
	}

	/// Adds a header sent with every request.
	pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.config.default_headers.insert(name.into(), value.into());

		self
	}

	/// Permits `http://` base URLs.
	pub fn allow_insecure_http(mut self, allow: bool) -> Self {
		self.config.allow_insecure_http = allow;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<GatewayConfig, ConfigValidationError> {
		self.config.validate()?;

		Ok(self.config)
	}
}

fn validate_path(endpoint: &'static str, path: &str) -> Result<(), ConfigValidationError> {
	if path.starts_with('/') {
		Ok(())
	} else {
		Err(ConfigValidationError::RelativePath { endpoint, path: path.to_owned() })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Failed to parse config test URL.")
	}

	#[test]
	fn defaults_build_for_https_base() {
		let config = GatewayConfig::builder(url("https://shop.example.com/api"))
			.build()
			.expect("Default configuration should validate.");

		assert_eq!(config.renewal_path, "/auth/refresh");
		assert_eq!(config.login_path, "/auth/login");
		assert_eq!(config.auth_scheme, "Bearer");
		assert!(config.logout_path.is_none());
	}

	#[test]
	fn endpoint_keeps_base_path_prefix() {
		let config = GatewayConfig::builder(url("https://shop.example.com/api/v1"))
			.build()
			.expect("Configuration should validate.");

		assert_eq!(
			config.endpoint("/cart/items?sku=x").expect("Path should join.").as_str(),
			"https://shop.example.com/api/v1/cart/items?sku=x"
		);
		assert_eq!(
			config.endpoint("auth/refresh").expect("Path should join.").as_str(),
			"https://shop.example.com/api/v1/auth/refresh"
		);
	}

	#[test]
	fn endpoint_rejects_paths_leaving_the_base_origin() {
		let config = GatewayConfig::builder(url("https://shop.example.com/api"))
			.build()
			.expect("Configuration should validate.");

		for path in [
			"https://evil.example.net/steal",
			"http://shop.example.com/api/cart",
			"https://shop.example.com:8443/api/cart",
			"\\\\evil.example.net/steal",
		] {
			let err = config.endpoint(path).expect_err("Foreign origins should be rejected.");

			assert!(
				matches!(err, ConfigError::ForeignOrigin { .. }),
				"unexpected error for {path}: {err:?}"
			);
		}

		assert_eq!(
			config
				.endpoint("https://shop.example.com/api/cart")
				.expect("Same-origin absolute URLs should join.")
				.as_str(),
			"https://shop.example.com/api/cart"
		);
		assert_eq!(
			config.endpoint("//evil.example.net/x").expect("Leading slashes are trimmed.").as_str(),
			"https://shop.example.com/api/evil.example.net/x"
		);
	}

	#[test]
	fn insecure_and_malformed_settings_are_rejected() {
		let err = GatewayConfig::builder(url("http://localhost:8080"))
			.build()
			.expect_err("Plain HTTP should require an explicit opt-in.");

		assert!(matches!(err, ConfigValidationError::InsecureBaseUrl { .. }));

		GatewayConfig::builder(url("http://localhost:8080"))
			.allow_insecure_http(true)
			.build()
			.expect("Plain HTTP should validate once allowed.");

		let err = GatewayConfig::builder(url("https://shop.example.com"))
			.renewal_path("auth/refresh")
			.build()
			.expect_err("Relative renewal paths should be rejected.");

		assert!(matches!(err, ConfigValidationError::RelativePath { endpoint: "renewal", .. }));

		let err = GatewayConfig::builder(url("https://shop.example.com"))
			.auth_scheme("Bear er")
			.build()
			.expect_err("Schemes with whitespace should be rejected.");

		assert_eq!(err, ConfigValidationError::InvalidAuthScheme);

		let err = GatewayConfig::builder(url("mailto:ops@example.com"))
			.build()
			.expect_err("Non-http schemes should be rejected.");

		assert!(matches!(err, ConfigValidationError::InvalidBaseUrl { .. }));
	}

	#[test]
	fn config_deserializes_with_defaults_for_optional_fields() {
		let config: GatewayConfig = serde_json::from_str(
			r#"{
				"base_url": "https://shop.example.com",
				"renewal_path": "/token/refresh",
				"login_path": "/token",
				"logout_path": null,
				"auth_scheme": "Bearer"
			}"#,
		)
		.expect("Configuration should deserialize from JSON.");

		assert!(config.default_headers.is_empty());
		assert!(!config.allow_insecure_http);
		config.validate().expect("Deserialized configuration should validate.");
	}
}
