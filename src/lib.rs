//! Client-side session layer: auth-aware request dispatch with single-flight credential renewal,
//! plus optimistic resource caches that stay consistent with the server copy.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod obs;
pub mod refresh;
pub mod resource;
pub mod session;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{config::GatewayConfig, gateway::ReqwestGateway, store::MemoryStore};

	/// Configuration pointing at a mock server; `httpmock` serves plain HTTP, so insecure
	/// base URLs are allowed.
	pub fn test_gateway_config(base_url: &str) -> GatewayConfig {
		let base_url = Url::parse(base_url).expect("Mock server URL should parse.");

		GatewayConfig::builder(base_url)
			.logout_path("/auth/logout")
			.allow_insecure_http(true)
			.build()
			.expect("Test gateway configuration should validate.")
	}

	/// Constructs a reqwest-backed gateway with an in-memory store for integration tests.
	pub fn build_reqwest_test_gateway(base_url: &str) -> (ReqwestGateway, Arc<MemoryStore>) {
		let store = Arc::new(MemoryStore::default());
		let gateway = ReqwestGateway::new(test_gateway_config(base_url), store.clone());

		(gateway, store)
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
