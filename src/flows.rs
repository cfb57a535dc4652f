//! Login flow orchestration: the [`OidcClient`] and the operations it exposes.
//!
//! `login` builds authorization redirects, `callback` runs the callback state machine,
//! `id_token` verifies ID tokens, and `accessor` reads claims and proxies userinfo.

pub mod accessor;
pub mod callback;
pub mod id_token;
pub mod login;
pub mod pkce;

pub use accessor::*;
pub use callback::*;
pub use id_token::ClaimExpectations;
pub use pkce::{PkceCodeChallengeMethod, derive_challenge};

// self
use crate::{
	_prelude::*,
	config::ClientConfig,
	http::ProviderHttpClient,
	oauth::{ProviderFacade, TransportErrorMapper},
	provider::{DiscoveryCache, KeySetCache, ProviderMetadata},
	session::SessionStore,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport stack.
pub type ReqwestOidcClient = OidcClient<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Relying party bound to one OpenID provider and one session store.
///
/// The client owns the HTTP transport, the session store, and the discovery and key-set
/// caches so handlers only pass the session identifier. Cloning is cheap and clones share
/// the caches.
pub struct OidcClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every outbound provider request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Session store holding pending attempts, tokens, and claims.
	pub sessions: Arc<dyn SessionStore>,
	/// Validated relying-party configuration.
	pub config: Arc<ClientConfig>,
	discovery: Arc<DiscoveryCache>,
	key_set: Arc<KeySetCache>,
}
impl<C, M> OidcClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a client that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		config: ClientConfig,
		sessions: Arc<dyn SessionStore>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			sessions,
			config: Arc::new(config),
			discovery: Default::default(),
			key_set: Default::default(),
		}
	}

	/// Returns the provider metadata, fetching it on first use.
	pub async fn provider_metadata(&self) -> Result<Arc<ProviderMetadata>> {
		self.discovery.metadata(&self.facade(), &self.config).await
	}

	/// Discovery cache shared by clones of this client.
	pub fn discovery(&self) -> &DiscoveryCache {
		&self.discovery
	}

	/// Key-set cache shared by clones of this client.
	pub fn key_set(&self) -> &KeySetCache {
		&self.key_set
	}

	pub(crate) fn facade(&self) -> ProviderFacade<'_, C, M> {
		ProviderFacade::new(self.http_client.as_ref(), self.transport_mapper.as_ref())
	}
}
#[cfg(feature = "reqwest")]
impl OidcClient<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a client with its own reqwest transport honoring `config.timeouts`.
	pub fn new(config: ClientConfig, sessions: Arc<dyn SessionStore>) -> Result<Self> {
		let http_client = ReqwestHttpClient::with_timeouts(&config.timeouts)?;

		Ok(Self::with_http_client(config, sessions, http_client, ReqwestTransportErrorMapper))
	}
}
impl<C, M> Clone for OidcClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			transport_mapper: self.transport_mapper.clone(),
			sessions: self.sessions.clone(),
			config: self.config.clone(),
			discovery: self.discovery.clone(),
			key_set: self.key_set.clone(),
		}
	}
}
impl<C, M> Debug for OidcClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OidcClient")
			.field("issuer", &self.config.issuer)
			.field("client_id", &self.config.client_id)
			.field("client_secret_set", &self.config.is_confidential())
			.field("discovered", &self.discovery.cached().is_some())
			.finish()
	}
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// crates.io
	use httpmock::prelude::*;
	// self
	use crate::{_preludet::*, error::DiscoveryError};

	fn discovery_document(server: &MockServer) -> serde_json::Value {
		serde_json::json!({
			"issuer": server.base_url(),
			"authorization_endpoint": server.url("/authorize"),
			"token_endpoint": server.url("/token"),
			"jwks_uri": server.url("/jwks"),
		})
	}

	#[tokio::test]
	async fn discovery_failures_are_retried_and_successes_memoized() {
		let server = MockServer::start_async().await;
		let (client, _) = build_reqwest_test_client(
			test_config_builder(&server.base_url(), "client-1")
				.build()
				.expect("Config fixture should build."),
		);
		let failing = server
			.mock_async(|when, then| {
				when.method(GET).path("/.well-known/openid-configuration");
				then.status(503);
			})
			.await;
		let err = client.provider_metadata().await.expect_err("503 discovery must fail.");

		assert!(matches!(err, Error::Discovery(DiscoveryError::HttpStatus { status: 503 })));
		assert!(client.discovery().cached().is_none());

		failing.delete_async().await;

		let healthy = server
			.mock_async(|when, then| {
				when.method(GET).path("/.well-known/openid-configuration");
				then.status(200).json_body(discovery_document(&server));
			})
			.await;
		let first = client.provider_metadata().await.expect("Discovery should recover.");
		let second = client.clone().provider_metadata().await.expect("Cached metadata is served.");

		healthy.assert_calls_async(1).await;

		assert!(Arc::ptr_eq(&first, &second));
		assert_eq!(first.token_endpoint.as_str(), server.url("/token"));
		assert!(format!("{client:?}").contains("discovered: true"));
	}
}
