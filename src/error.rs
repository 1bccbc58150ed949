//! Gateway-level error types shared across the store, transport, refresh, and cache layers.

// self
use crate::{_prelude::*, refresh::RefreshFailure};

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Credential storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Server answered with a status or body the caller has to handle.
	#[error(transparent)]
	Response(#[from] ResponseError),

	/// Credential was rejected again after a successful renewal, or the request opted out of
	/// renewal.
	#[error("Request was rejected as unauthorized (HTTP {status}).")]
	AuthExpired {
		/// Status code of the rejected response.
		status: u16,
	},
	/// Renewal failed; credentials are cleared and re-authentication is required.
	#[error("Session terminated after HTTP {status}: {reason}")]
	SessionTerminated {
		/// Status of the original auth-expired response.
		status: u16,
		/// Renewal failure shared by every request queued behind it.
		#[source]
		reason: RefreshFailure,
	},
	/// The renewal this request was waiting on was abandoned before it finished.
	#[error("Credential renewal was interrupted before it completed.")]
	RefreshInterrupted,
}
impl Error {
	/// Returns `true` when the caller must send the user back through login.
	pub fn is_session_terminated(&self) -> bool {
		matches!(self, Self::SessionTerminated { .. })
	}

	/// HTTP status attached to the failure, when one is known.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::AuthExpired { status } | Self::SessionTerminated { status, .. } => Some(*status),
			Self::Response(ResponseError::Status { status, .. }) => Some(*status),
			Self::Response(ResponseError::Parse { status, .. }) => *status,
			_ => None,
		}
	}

	/// Maps a renewal failure observed after an auth-expired response with `status`.
	pub fn from_refresh_failure(status: u16, reason: RefreshFailure) -> Self {
		match reason {
			RefreshFailure::Interrupted => Self::RefreshInterrupted,
			reason => Self::SessionTerminated { status, reason },
		}
	}
}

/// Configuration and validation failures raised by the gateway.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Request path cannot be joined onto the base URL.
	#[error("Request path `{path}` cannot be joined onto the base URL.")]
	InvalidPath {
		/// Offending path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request path resolves to a different origin than the base URL.
	#[error("Request path `{path}` leaves the base URL's origin.")]
	ForeignOrigin {
		/// Offending path.
		path: String,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	RequestBody(#[source] serde_json::Error),
	/// Gateway configuration failed validation.
	#[error(transparent)]
	Validation(#[from] crate::config::ConfigValidationError),
}

/// Failures derived from a response the server did deliver.
#[derive(Debug, ThisError)]
pub enum ResponseError {
	/// Non-success status passed through untouched (validation, conflict, server error).
	#[error("Server responded with HTTP {status}: {body_preview}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Leading part of the response body for diagnostics.
		body_preview: String,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Response body could not be decoded into the expected shape.
	#[error("Server returned malformed JSON.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Login or renewal response did not contain a complete credential pair.
	#[error("Credential response is missing `{missing}`.")]
	IncompleteCredential {
		/// Name of the missing field.
		missing: &'static str,
	},
}

/// Transport-level failures.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
