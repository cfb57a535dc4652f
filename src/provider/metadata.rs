//! Validated OpenID provider metadata.

// self
use crate::{_prelude::*, config::is_secure_or_loopback, error::DiscoveryError};

/// Immutable provider metadata resolved through discovery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
	/// Issuer identifier exactly as advertised; ID tokens must carry this value.
	pub issuer: String,
	/// Authorization endpoint users are redirected to.
	pub authorization_endpoint: Url,
	/// Token endpoint used for the code exchange.
	pub token_endpoint: Url,
	/// Userinfo endpoint, when the provider offers one.
	pub userinfo_endpoint: Option<Url>,
	/// Location of the provider's JSON Web Key Set.
	pub jwks_uri: Url,
	/// Advertised PKCE challenge methods.
	pub code_challenge_methods_supported: Option<Vec<String>>,
	/// Advertised ID-token signing algorithms.
	pub id_token_signing_alg_values_supported: Option<Vec<String>>,
}
impl ProviderMetadata {
	/// Parses a discovery document and validates it against the configured issuer.
	///
	/// Issuer comparison ignores a single trailing slash on either side; every endpoint must
	/// be HTTPS or loopback HTTP.
	pub fn from_document(body: &[u8], expected_issuer: &str) -> Result<Self, DiscoveryError> {
		let raw: RawProviderMetadata =
			serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(body))
				.map_err(|source| DiscoveryError::Parse { source })?;
		let issuer = raw.issuer.ok_or(DiscoveryError::MissingEndpoint { endpoint: "issuer" })?;

		if issuer.trim_end_matches('/') != expected_issuer.trim_end_matches('/') {
			return Err(DiscoveryError::IssuerMismatch {
				expected: expected_issuer.to_owned(),
				found: issuer,
			});
		}

		let authorization_endpoint =
			required_endpoint("authorization", raw.authorization_endpoint)?;
		let token_endpoint = required_endpoint("token", raw.token_endpoint)?;
		let jwks_uri = required_endpoint("jwks", raw.jwks_uri)?;
		let userinfo_endpoint = raw
			.userinfo_endpoint
			.map(|value| parse_endpoint("userinfo", &value))
			.transpose()?;

		if raw
			.code_challenge_methods_supported
			.as_ref()
			.is_some_and(|methods| !methods.iter().any(|method| method == "S256"))
		{
			return Err(DiscoveryError::PkceUnsupported);
		}

		Ok(Self {
			issuer,
			authorization_endpoint,
			token_endpoint,
			userinfo_endpoint,
			jwks_uri,
			code_challenge_methods_supported: raw.code_challenge_methods_supported,
			id_token_signing_alg_values_supported: raw.id_token_signing_alg_values_supported,
		})
	}

	/// Returns the userinfo endpoint or the error reported when the provider lacks one.
	pub fn require_userinfo_endpoint(&self) -> Result<&Url, DiscoveryError> {
		self.userinfo_endpoint
			.as_ref()
			.ok_or(DiscoveryError::MissingEndpoint { endpoint: "userinfo" })
	}
}

#[derive(Debug, Deserialize)]
struct RawProviderMetadata {
	issuer: Option<String>,
	authorization_endpoint: Option<String>,
	token_endpoint: Option<String>,
	userinfo_endpoint: Option<String>,
	jwks_uri: Option<String>,
	code_challenge_methods_supported: Option<Vec<String>>,
	id_token_signing_alg_values_supported: Option<Vec<String>>,
}

fn required_endpoint(endpoint: &'static str, value: Option<String>) -> Result<Url, DiscoveryError> {
	let value = value.ok_or(DiscoveryError::MissingEndpoint { endpoint })?;

	parse_endpoint(endpoint, &value)
}

fn parse_endpoint(endpoint: &'static str, value: &str) -> Result<Url, DiscoveryError> {
	let url = Url::parse(value)
		.map_err(|source| DiscoveryError::InvalidEndpoint { endpoint, source })?;

	if !is_secure_or_loopback(&url) {
		return Err(DiscoveryError::InsecureEndpoint { endpoint, url: value.to_owned() });
	}

	Ok(url)
}
