//! Relying-party configuration: provider issuer, client registration, and transport limits.
//!
//! [`ClientConfig`] is deserializable so hosts can load it from any source, and every
//! construction path funnels through [`ClientConfigBuilder::build`] so invariants hold
//! regardless of where the values came from.

// std
use std::time::Duration as StdDuration;
// self
use crate::{_prelude::*, auth::ScopeSet};

/// Parameters that extra authorization parameters may not override.
const RESERVED_AUTHORIZE_PARAMS: &[&str] = &[
	"client_id",
	"response_type",
	"redirect_uri",
	"scope",
	"code_challenge",
	"code_challenge_method",
	"state",
	"audience",
];

/// Client authentication modes for the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
}

/// Upper bounds applied to every provider request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpTimeouts {
	/// Whole-request timeout in seconds.
	pub request_secs: u64,
	/// Connection establishment timeout in seconds.
	pub connect_secs: u64,
}
impl HttpTimeouts {
	/// Whole-request timeout.
	pub fn request(&self) -> StdDuration {
		StdDuration::from_secs(self.request_secs)
	}

	/// Connection establishment timeout.
	pub fn connect(&self) -> StdDuration {
		StdDuration::from_secs(self.connect_secs)
	}
}
impl Default for HttpTimeouts {
	fn default() -> Self {
		Self { request_secs: 10, connect_secs: 5 }
	}
}

/// Errors raised while validating a [`ClientConfig`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ClientConfigError {
	/// Issuer is not an absolute URL.
	#[error("Issuer `{issuer}` is not a valid URL.")]
	InvalidIssuer {
		/// Configured issuer.
		issuer: String,
	},
	/// Issuer carries a query or fragment, which OpenID discovery forbids.
	#[error("Issuer `{issuer}` must not contain a query or fragment.")]
	IssuerHasQuery {
		/// Configured issuer.
		issuer: String,
	},
	/// Endpoint uses plain HTTP on a non-loopback host.
	#[error("The {field} URL must use HTTPS: {url}.")]
	InsecureUrl {
		/// Which URL failed validation.
		field: &'static str,
		/// Offending URL.
		url: String,
	},
	/// Client identifier is empty.
	#[error("Client identifier cannot be empty.")]
	EmptyClientId,
	/// Redirect URI was never supplied.
	#[error("Redirect URI is required.")]
	MissingRedirectUri,
	/// Redirect URI is not an absolute URL.
	#[error("Redirect URI `{uri}` is not a valid URL.")]
	InvalidRedirectUri {
		/// Supplied redirect URI.
		uri: String,
	},
	/// Scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Extra authorization parameter collides with a protocol parameter.
	#[error("Authorization parameter `{name}` is reserved.")]
	ReservedParameter {
		/// Colliding parameter name.
		name: String,
	},
}

/// Validated relying-party configuration consumed by [`OidcClient`](crate::flows::OidcClient).
///
/// `Debug` reports only whether a client secret is set.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawClientConfig", into = "RawClientConfig")]
pub struct ClientConfig {
	/// Issuer identifier exactly as configured; discovery resolves against it.
	pub issuer: String,
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// Client secret; present only for confidential clients.
	pub client_secret: Option<String>,
	/// Token endpoint authentication method for confidential clients.
	pub client_auth_method: ClientAuthMethod,
	/// Redirect URI registered with the provider.
	pub redirect_uri: Url,
	/// Requested scopes; always contains `openid`.
	pub scope: ScopeSet,
	/// Target resource server audience, when the provider needs one.
	pub audience: Option<String>,
	/// Additional static authorization parameters (e.g. `prompt`).
	pub extra_authorize_params: BTreeMap<String, String>,
	/// Clock skew tolerated when checking `exp`/`iat`.
	pub clock_leeway: Duration,
	/// Oldest acceptable `iat` relative to now.
	pub max_id_token_age: Duration,
	/// Oldest pending login attempt a callback may still complete.
	pub pending_attempt_ttl: Duration,
	/// Upper bounds applied to provider requests.
	pub timeouts: HttpTimeouts,
}
impl ClientConfig {
	/// Creates a builder for the provided issuer and client identifier.
	pub fn builder(issuer: impl Into<String>, client_id: impl Into<String>) -> ClientConfigBuilder {
		ClientConfigBuilder::new(issuer, client_id)
	}

	/// Returns true when a client secret is configured.
	pub fn is_confidential(&self) -> bool {
		self.client_secret.is_some()
	}

	/// Location of the provider's discovery document.
	pub fn discovery_url(&self) -> Result<Url, ClientConfigError> {
		let base = self.issuer.trim_end_matches('/');

		Url::parse(&format!("{base}/.well-known/openid-configuration"))
			.map_err(|_| ClientConfigError::InvalidIssuer { issuer: self.issuer.clone() })
	}
}
impl Debug for ClientConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientConfig")
			.field("issuer", &self.issuer)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("client_auth_method", &self.client_auth_method)
			.field("redirect_uri", &self.redirect_uri.as_str())
			.field("scope", &self.scope)
			.field("audience", &self.audience)
			.field("extra_authorize_params", &self.extra_authorize_params)
			.field("clock_leeway", &self.clock_leeway)
			.field("max_id_token_age", &self.max_id_token_age)
			.field("pending_attempt_ttl", &self.pending_attempt_ttl)
			.field("timeouts", &self.timeouts)
			.finish()
	}
}

/// Builder for [`ClientConfig`] values.
pub struct ClientConfigBuilder {
	issuer: String,
	client_id: String,
	client_secret: Option<String>,
	client_auth_method: ClientAuthMethod,
	redirect_uri: Option<String>,
	scopes: Vec<String>,
	audience: Option<String>,
	extra_authorize_params: BTreeMap<String, String>,
	clock_leeway: Duration,
	max_id_token_age: Duration,
	pending_attempt_ttl: Duration,
	timeouts: HttpTimeouts,
}
impl ClientConfigBuilder {
	const DEFAULT_CLOCK_LEEWAY: Duration = Duration::seconds(60);
	const DEFAULT_MAX_ID_TOKEN_AGE: Duration = Duration::hours(24);
	const DEFAULT_PENDING_ATTEMPT_TTL: Duration = Duration::minutes(10);

	/// Creates a builder seeded with the issuer and client identifier.
	pub fn new(issuer: impl Into<String>, client_id: impl Into<String>) -> Self {
		Self {
			issuer: issuer.into(),
			client_id: client_id.into(),
			client_secret: None,
			client_auth_method: ClientAuthMethod::default(),
			redirect_uri: None,
			scopes: vec!["openid".into(), "profile".into(), "email".into()],
			audience: None,
			extra_authorize_params: BTreeMap::new(),
			clock_leeway: Self::DEFAULT_CLOCK_LEEWAY,
			max_id_token_age: Self::DEFAULT_MAX_ID_TOKEN_AGE,
			pending_attempt_ttl: Self::DEFAULT_PENDING_ATTEMPT_TTL,
			timeouts: HttpTimeouts::default(),
		}
	}

	/// Marks the client as confidential with the provided secret.
	pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Overrides the token endpoint authentication method.
	pub fn client_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth_method = method;

		self
	}

	/// Sets the registered redirect URI.
	pub fn redirect_uri(mut self, uri: impl Into<String>) -> Self {
		self.redirect_uri = Some(uri.into());

		self
	}

	/// Replaces the requested scopes; `openid` is added when missing.
	pub fn scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes = scopes.into_iter().map(Into::into).collect();

		self
	}

	/// Requests tokens for a specific resource server.
	pub fn audience(mut self, audience: impl Into<String>) -> Self {
		self.audience = Some(audience.into());

		self
	}

	/// Adds a static authorization parameter.
	pub fn authorize_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.extra_authorize_params.insert(name.into(), value.into());

		self
	}

	/// Overrides the tolerated clock skew.
	pub fn clock_leeway(mut self, leeway: Duration) -> Self {
		self.clock_leeway = if leeway.is_negative() { Duration::ZERO } else { leeway };

		self
	}

	/// Overrides the oldest acceptable ID-token `iat`.
	pub fn max_id_token_age(mut self, age: Duration) -> Self {
		self.max_id_token_age = age;

		self
	}

	/// Overrides how long a pending login attempt stays redeemable.
	pub fn pending_attempt_ttl(mut self, ttl: Duration) -> Self {
		self.pending_attempt_ttl = if ttl.is_negative() { Duration::ZERO } else { ttl };

		self
	}

	/// Overrides provider request timeouts.
	pub fn timeouts(mut self, timeouts: HttpTimeouts) -> Self {
		self.timeouts = timeouts;

		self
	}

	/// Consumes the builder and validates the resulting config.
	pub fn build(self) -> Result<ClientConfig, ClientConfigError> {
		let issuer_url = Url::parse(&self.issuer)
			.map_err(|_| ClientConfigError::InvalidIssuer { issuer: self.issuer.clone() })?;

		if issuer_url.query().is_some() || issuer_url.fragment().is_some() {
			return Err(ClientConfigError::IssuerHasQuery { issuer: self.issuer });
		}
		if !is_secure_or_loopback(&issuer_url) {
			return Err(ClientConfigError::InsecureUrl { field: "issuer", url: self.issuer });
		}
		if self.client_id.trim().is_empty() {
			return Err(ClientConfigError::EmptyClientId);
		}

		let raw_redirect = self.redirect_uri.ok_or(ClientConfigError::MissingRedirectUri)?;
		let redirect_uri = Url::parse(&raw_redirect)
			.map_err(|_| ClientConfigError::InvalidRedirectUri { uri: raw_redirect.clone() })?;
		let scope = ScopeSet::with_openid(self.scopes)?;

		if let Some(name) = self
			.extra_authorize_params
			.keys()
			.find(|name| RESERVED_AUTHORIZE_PARAMS.contains(&name.as_str()))
		{
			return Err(ClientConfigError::ReservedParameter { name: name.clone() });
		}

		Ok(ClientConfig {
			issuer: self.issuer,
			client_id: self.client_id,
			client_secret: self.client_secret.filter(|secret| !secret.is_empty()),
			client_auth_method: self.client_auth_method,
			redirect_uri,
			scope,
			audience: self.audience.filter(|audience| !audience.is_empty()),
			extra_authorize_params: self.extra_authorize_params,
			clock_leeway: self.clock_leeway,
			max_id_token_age: self.max_id_token_age,
			pending_attempt_ttl: self.pending_attempt_ttl,
			timeouts: self.timeouts,
		})
	}
}

/// Accepts HTTPS everywhere and plain HTTP only for loopback hosts.
pub(crate) fn is_secure_or_loopback(url: &Url) -> bool {
	match url.scheme() {
		"https" => true,
		"http" => matches!(
			url.host(),
			Some(url::Host::Domain("localhost"))
				| Some(url::Host::Ipv4(std::net::Ipv4Addr::LOCALHOST))
				| Some(url::Host::Ipv6(std::net::Ipv6Addr::LOCALHOST))
		),
		_ => false,
	}
}

impl Debug for ClientConfigBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientConfigBuilder")
			.field("issuer", &self.issuer)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("redirect_uri", &self.redirect_uri)
			.finish_non_exhaustive()
	}
}

#[derive(Clone, Serialize, Deserialize)]
struct RawClientConfig {
	issuer: String,
	client_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	client_secret: Option<String>,
	#[serde(default)]
	client_auth_method: ClientAuthMethod,
	redirect_uri: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	scopes: Option<Vec<String>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	audience: Option<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	extra_authorize_params: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	clock_leeway_secs: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	max_id_token_age_secs: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pending_attempt_ttl_secs: Option<i64>,
	#[serde(default)]
	timeouts: HttpTimeouts,
}
impl TryFrom<RawClientConfig> for ClientConfig {
	type Error = ClientConfigError;

	fn try_from(raw: RawClientConfig) -> Result<Self, Self::Error> {
		let mut builder = ClientConfig::builder(raw.issuer, raw.client_id)
			.client_auth_method(raw.client_auth_method)
			.redirect_uri(raw.redirect_uri)
			.timeouts(raw.timeouts);

		if let Some(secret) = raw.client_secret {
			builder = builder.client_secret(secret);
		}
		if let Some(scopes) = raw.scopes {
			builder = builder.scopes(scopes);
		}
		if let Some(audience) = raw.audience {
			builder = builder.audience(audience);
		}
		for (name, value) in raw.extra_authorize_params {
			builder = builder.authorize_param(name, value);
		}
		if let Some(secs) = raw.clock_leeway_secs {
			builder = builder.clock_leeway(Duration::seconds(secs));
		}
		if let Some(secs) = raw.max_id_token_age_secs {
			builder = builder.max_id_token_age(Duration::seconds(secs));
		}
		if let Some(secs) = raw.pending_attempt_ttl_secs {
			builder = builder.pending_attempt_ttl(Duration::seconds(secs));
		}

		builder.build()
	}
}
impl From<ClientConfig> for RawClientConfig {
	fn from(config: ClientConfig) -> Self {
		Self {
			issuer: config.issuer,
			client_id: config.client_id,
			client_secret: config.client_secret,
			client_auth_method: config.client_auth_method,
			redirect_uri: config.redirect_uri.to_string(),
			scopes: Some(config.scope.iter().cloned().collect()),
			audience: config.audience,
			extra_authorize_params: config.extra_authorize_params,
			clock_leeway_secs: Some(config.clock_leeway.whole_seconds()),
			max_id_token_age_secs: Some(config.max_id_token_age.whole_seconds()),
			pending_attempt_ttl_secs: Some(config.pending_attempt_ttl.whole_seconds()),
			timeouts: config.timeouts,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn builder() -> ClientConfigBuilder {
		ClientConfig::builder("https://id.example.com", "client-1")
			.redirect_uri("https://app.example.com/callback")
	}

	#[test]
	fn build_adds_openid_scope_and_keeps_issuer_verbatim() {
		let config = builder()
			.scopes(["email"])
			.build()
			.expect("Config with a valid issuer and redirect should build.");

		assert_eq!(config.issuer, "https://id.example.com");
		assert!(config.scope.contains("openid"));
		assert!(config.scope.contains("email"));
		assert!(!config.is_confidential());
		assert_eq!(
			config.discovery_url().expect("Discovery URL should resolve.").as_str(),
			"https://id.example.com/.well-known/openid-configuration"
		);
	}

	#[test]
	fn build_rejects_insecure_and_incomplete_configs() {
		let err = ClientConfig::builder("http://id.example.com", "client-1")
			.redirect_uri("https://app.example.com/callback")
			.build()
			.expect_err("Plain HTTP issuers outside loopback must be rejected.");

		assert!(matches!(err, ClientConfigError::InsecureUrl { field: "issuer", .. }));

		let err = ClientConfig::builder("https://id.example.com", "client-1")
			.build()
			.expect_err("Redirect URI is mandatory.");

		assert_eq!(err, ClientConfigError::MissingRedirectUri);

		let err = ClientConfig::builder("https://id.example.com", " ")
			.redirect_uri("https://app.example.com/callback")
			.build()
			.expect_err("Blank client identifiers must be rejected.");

		assert_eq!(err, ClientConfigError::EmptyClientId);
	}

	#[test]
	fn build_rejects_reserved_authorize_params() {
		let err = builder()
			.authorize_param("state", "fixed")
			.build()
			.expect_err("Protocol parameters cannot be overridden.");

		assert_eq!(err, ClientConfigError::ReservedParameter { name: "state".into() });
		assert!(builder().authorize_param("prompt", "login").build().is_ok());
	}

	#[test]
	fn loopback_http_is_accepted() {
		let config = ClientConfig::builder("http://127.0.0.1:8080/realms/dev/", "client-1")
			.redirect_uri("http://localhost:3000/callback")
			.build()
			.expect("Loopback HTTP issuers should be accepted for local providers.");

		assert_eq!(
			config.discovery_url().expect("Discovery URL should resolve.").as_str(),
			"http://127.0.0.1:8080/realms/dev/.well-known/openid-configuration"
		);
	}

	#[test]
	fn deserialization_runs_builder_validation() {
		let config: ClientConfig = serde_json::from_str(
			r#"{
				"issuer": "https://id.example.com",
				"client_id": "client-1",
				"client_secret": "s3cret",
				"redirect_uri": "https://app.example.com/callback",
				"audience": "https://api.example.com",
				"clock_leeway_secs": 30
			}"#,
		)
		.expect("Valid config JSON should deserialize.");

		assert!(config.is_confidential());
		assert_eq!(config.audience.as_deref(), Some("https://api.example.com"));
		assert_eq!(config.clock_leeway, Duration::seconds(30));
		assert_eq!(config.pending_attempt_ttl, Duration::minutes(10));
		assert!(
			serde_json::from_str::<ClientConfig>(
				r#"{"issuer":"ftp://id.example.com","client_id":"c","redirect_uri":"https://a/cb"}"#
			)
			.is_err()
		);
	}

	#[test]
	fn debug_output_hides_the_client_secret() {
		let builder = builder().client_secret("s3cret-value");

		assert!(!format!("{builder:?}").contains("s3cret-value"));

		let config = builder.build().expect("Confidential config should build.");
		let rendered = format!("{config:?}");

		assert!(config.is_confidential());
		assert!(rendered.contains("client_secret_set: true"));
		assert!(!rendered.contains("s3cret-value"));
	}
}
