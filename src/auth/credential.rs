//! Access/refresh credential pairs and the wire grant they are minted from.

// self
use crate::{_prelude::*, auth::TokenSecret, error::ResponseError};

/// Access and refresh tokens issued together by a login or renewal call.
///
/// Both secrets are always present; a pair is only ever stored or cleared as a whole.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
	/// Access token attached to every outbound call.
	pub access_token: TokenSecret,
	/// Refresh token presented to the renewal endpoint.
	pub refresh_token: TokenSecret,
	/// Instant the pair was issued (or accepted locally).
	pub issued_at: OffsetDateTime,
}
impl CredentialPair {
	/// Creates a pair stamped with the current clock.
	pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: TokenSecret::new(refresh_token),
			issued_at: OffsetDateTime::now_utc(),
		}
	}

	/// Overrides the issued-at instant.
	pub fn with_issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = instant;

		self
	}

	/// Renders the `Authorization` header value for the given scheme.
	pub fn authorization(&self, scheme: &str) -> String {
		format!("{scheme} {}", self.access_token.expose())
	}

	/// Returns `true` if the access token differs from `stale`.
	///
	/// A `None` stale token means the caller sent no credential, so any stored pair is newer.
	pub fn supersedes(&self, stale: Option<&str>) -> bool {
		stale.is_none_or(|stale| self.access_token.expose() != stale)
	}

	/// Time elapsed since the pair was issued.
	pub fn age_at(&self, instant: OffsetDateTime) -> Duration {
		instant - self.issued_at
	}
}
impl Debug for CredentialPair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialPair")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.finish()
	}
}

/// Token payload returned by the login and renewal endpoints.
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
	/// Newly minted access token.
	pub access_token: String,
	/// Rotated refresh token; absent when the server keeps the previous one.
	#[serde(default)]
	pub refresh_token: Option<String>,
}
impl TokenGrant {
	/// Converts the grant into a complete pair.
	///
	/// `previous_refresh` fills in a missing refresh token during renewal. Login responses
	/// pass `None`, so an incomplete grant is rejected rather than persisted as half a pair.
	pub fn into_pair(
		self,
		previous_refresh: Option<&TokenSecret>,
	) -> Result<CredentialPair, ResponseError> {
		if self.access_token.trim().is_empty() {
			return Err(ResponseError::IncompleteCredential { missing: "access_token" });
		}

		let refresh_token = match (self.refresh_token, previous_refresh) {
			(Some(fresh), _) if !fresh.trim().is_empty() => TokenSecret::new(fresh),
			(_, Some(previous)) => previous.clone(),
			_ => return Err(ResponseError::IncompleteCredential { missing: "refresh_token" }),
		};

		Ok(CredentialPair {
			access_token: TokenSecret::new(self.access_token),
			refresh_token,
			issued_at: OffsetDateTime::now_utc(),
		})
	}
}
impl Debug for TokenGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenGrant")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn pair_renders_authorization_and_redacts_debug() {
		let pair = CredentialPair::new("a1", "r1");

		assert_eq!(pair.authorization("Bearer"), "Bearer a1");

		let rendered = format!("{pair:?}");

		assert!(!rendered.contains("a1"));
		assert!(!rendered.contains("r1"));
	}

	#[test]
	fn supersedes_compares_access_tokens() {
		let pair = CredentialPair::new("a2", "r2");

		assert!(pair.supersedes(Some("a1")));
		assert!(pair.supersedes(None));
		assert!(!pair.supersedes(Some("a2")));
	}

	#[test]
	fn age_is_measured_from_issued_at() {
		let pair = CredentialPair::new("a", "r")
			.with_issued_at(macros::datetime!(2025-01-01 00:00 UTC));

		assert_eq!(pair.age_at(macros::datetime!(2025-01-01 00:30 UTC)), Duration::minutes(30));
	}

	#[test]
	fn grant_keeps_previous_refresh_when_not_rotated() {
		let grant: TokenGrant = serde_json::from_str(r#"{"access_token":"a2"}"#)
			.expect("Grant without refresh token should deserialize.");
		let previous = TokenSecret::new("r1");
		let pair = grant.into_pair(Some(&previous)).expect("Renewal grant should build a pair.");

		assert_eq!(pair.access_token.expose(), "a2");
		assert_eq!(pair.refresh_token.expose(), "r1");
	}

	#[test]
	fn grant_rejects_partial_pairs() {
		let grant: TokenGrant = serde_json::from_str(r#"{"access_token":"a2"}"#)
			.expect("Grant without refresh token should deserialize.");
		let err = grant.into_pair(None).expect_err("Login grant must carry a refresh token.");

		assert!(matches!(err, ResponseError::IncompleteCredential { missing: "refresh_token" }));

		let grant: TokenGrant =
			serde_json::from_str(r#"{"access_token":" ","refresh_token":"r2"}"#)
				.expect("Grant with blank access token should deserialize.");
		let err = grant.into_pair(None).expect_err("Blank access tokens must be rejected.");

		assert!(matches!(err, ResponseError::IncompleteCredential { missing: "access_token" }));
	}
}
