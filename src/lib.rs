//! OpenID Connect Authorization Code + PKCE login bound to server-side sessions: discovery and
//! key-set caches, one-time state binding, code exchange, ID-token verification, and an optional
//! axum surface.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
pub mod flows;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod session;
#[cfg(feature = "web")] pub mod web;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test`
	//! crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		config::{ClientConfig, ClientConfigBuilder},
		flows::ReqwestOidcClient,
		session::{MemorySessionStore, SessionStore},
	};

	/// Seeds a config builder with the redirect URI used across tests.
	pub fn test_config_builder(issuer: &str, client_id: &str) -> ClientConfigBuilder {
		ClientConfig::builder(issuer, client_id).redirect_uri("https://app.example.com/callback")
	}

	/// Constructs a reqwest-backed [`ReqwestOidcClient`] over a fresh in-memory session store.
	pub fn build_reqwest_test_client(
		config: ClientConfig,
	) -> (ReqwestOidcClient, Arc<MemorySessionStore>) {
		let store_backend = Arc::new(MemorySessionStore::default());
		let sessions: Arc<dyn SessionStore> = store_backend.clone();
		let client = ReqwestOidcClient::new(config, sessions)
			.expect("Reqwest client with default timeouts should build.");

		(client, store_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
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
#[cfg(test)]
use {
	color_eyre as _, httpmock as _, tokio as _, tower as _, tracing_subscriber as _,
};
