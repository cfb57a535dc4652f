//! Mock OpenID provider shared by the integration suites.

#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use httpmock::{Mock, prelude::*};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use time::OffsetDateTime;
use url::Url;
// self
use oidc_session_broker::{
	config::ClientConfig,
	flows::{CallbackQuery, ReqwestOidcClient},
	session::{MemorySessionStore, SessionStore},
};

pub const CLIENT_ID: &str = "client-it";
pub const CLIENT_SECRET: &str = "secret-it";
pub const REDIRECT_URI: &str = "https://app.example.com/callback";
pub const SIGNING_KID: &str = "signing-key";
pub const ROTATED_KID: &str = "rotated-key";
pub const SIGNING_KEY: &[u8] = include_bytes!("../fixtures/signing-private.pem");
pub const ROTATED_KEY: &[u8] = include_bytes!("../fixtures/rotated-private.pem");
pub const SIGNING_JWKS: &str = include_str!("../fixtures/signing-jwks.json");
pub const ROTATED_JWKS: &str = include_str!("../fixtures/rotated-jwks.json");

pub struct MockProvider {
	pub server: MockServer,
}
impl MockProvider {
	pub async fn start() -> Self {
		Self { server: MockServer::start_async().await }
	}

	pub fn issuer(&self) -> String {
		self.server.base_url()
	}

	pub fn discovery_document(&self) -> Value {
		json!({
			"issuer": self.issuer(),
			"authorization_endpoint": self.server.url("/authorize"),
			"token_endpoint": self.server.url("/token"),
			"userinfo_endpoint": self.server.url("/userinfo"),
			"jwks_uri": self.server.url("/jwks"),
			"code_challenge_methods_supported": ["S256"],
			"id_token_signing_alg_values_supported": ["RS256"],
		})
	}

	pub async fn mock_discovery(&self) -> Mock<'_> {
		let document = self.discovery_document();

		self.server
			.mock_async(|when, then| {
				when.method(GET).path("/.well-known/openid-configuration");
				then.status(200).header("content-type", "application/json").json_body(document);
			})
			.await
	}

	pub async fn mock_jwks(&self, jwks: &str) -> Mock<'_> {
		let jwks = jwks.to_owned();

		self.server
			.mock_async(|when, then| {
				when.method(GET).path("/jwks");
				then.status(200).header("content-type", "application/json").body(jwks);
			})
			.await
	}

	pub async fn mock_token(&self, status: u16, body: Value) -> Mock<'_> {
		self.server
			.mock_async(|when, then| {
				when.method(POST)
					.path("/token")
					.form_urlencoded_tuple("grant_type", "authorization_code");
				then.status(status).header("content-type", "application/json").json_body(body);
			})
			.await
	}

	/// Token endpoint response, optionally carrying `id_token`.
	pub fn token_response(&self, id_token: Option<String>) -> Value {
		let mut body = json!({
			"access_token": "access-it",
			"token_type": "Bearer",
			"expires_in": 3600,
			"refresh_token": "refresh-it",
		});

		if let Some(id_token) = id_token {
			body["id_token"] = Value::String(id_token);
		}

		body
	}

	pub fn claims(&self) -> Value {
		let now = OffsetDateTime::now_utc().unix_timestamp();

		json!({
			"iss": self.issuer(),
			"sub": "u1",
			"aud": CLIENT_ID,
			"exp": now + 300,
			"iat": now,
			"email": "u1@example.com",
		})
	}

	pub fn id_token(&self) -> String {
		sign(&self.claims(), SIGNING_KEY, SIGNING_KID)
	}

	pub fn config(&self) -> ClientConfig {
		ClientConfig::builder(self.issuer(), CLIENT_ID)
			.client_secret(CLIENT_SECRET)
			.redirect_uri(REDIRECT_URI)
			.build()
			.expect("Mock provider config should build.")
	}

	pub fn client(&self) -> (ReqwestOidcClient, Arc<MemorySessionStore>) {
		let store = Arc::new(MemorySessionStore::default());
		let sessions: Arc<dyn SessionStore> = store.clone();
		let client = ReqwestOidcClient::new(self.config(), sessions)
			.expect("Reqwest-backed client should build.");

		(client, store)
	}
}

pub fn sign(claims: &Value, pem: &[u8], kid: &str) -> String {
	let mut header = Header::new(Algorithm::RS256);

	header.kid = Some(kid.to_owned());

	encode(&header, claims, &EncodingKey::from_rsa_pem(pem).expect("Fixture key should load."))
		.expect("ID token should sign.")
}

pub fn query_param(url: &Url, name: &str) -> String {
	url.query_pairs()
		.find(|(key, _)| key == name)
		.map(|(_, value)| value.into_owned())
		.unwrap_or_else(|| panic!("Authorization URL should carry `{name}`."))
}

pub fn callback_query(code: &str, state: &str) -> CallbackQuery {
	CallbackQuery { code: Some(code.into()), state: Some(state.into()), ..Default::default() }
}
