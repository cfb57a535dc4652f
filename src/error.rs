//! Crate-level error types shared across flows, providers, and session stores.
//!
//! Every variant maps onto a [`StatusClass`] so HTTP adapters can render request-scoped
//! failures without inspecting individual errors: client/protocol violations are `400`,
//! missing authentication is `401`, provider failures are `502`, and local faults are `500`.

// self
use crate::{_prelude::*, http::ProviderEndpoint};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// HTTP status class used when rendering an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusClass {
	/// Client or protocol violation (`400`).
	BadRequest,
	/// No authenticated session (`401`).
	Unauthorized,
	/// Provider failure (`502`).
	BadGateway,
	/// Local fault (`500`).
	Internal,
}
impl StatusClass {
	/// Returns the canonical HTTP status code for the class.
	pub const fn as_u16(self) -> u16 {
		match self {
			StatusClass::BadRequest => 400,
			StatusClass::Unauthorized => 401,
			StatusClass::BadGateway => 502,
			StatusClass::Internal => 500,
		}
	}
}

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Session store failure.
	#[error("{0}")]
	Session(
		#[from]
		#[source]
		crate::session::SessionStoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeouts).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Provider metadata could not be retrieved or validated.
	#[error(transparent)]
	Discovery(#[from] DiscoveryError),
	/// Callback failed anti-forgery validation.
	#[error(transparent)]
	InvalidState(#[from] InvalidStateError),
	/// Token endpoint rejected the authorization code.
	#[error(transparent)]
	TokenExchange(#[from] TokenExchangeError),
	/// ID token failed verification.
	#[error(transparent)]
	IdTokenVerification(#[from] IdTokenVerificationError),
	/// Userinfo endpoint answered with a non-success status.
	#[error(transparent)]
	Upstream(#[from] UpstreamError),

	/// Session carries no identity or access token.
	#[error("Session is not authenticated.")]
	Unauthenticated,
}
impl Error {
	/// Classifies the error for HTTP rendering.
	pub fn status_class(&self) -> StatusClass {
		match self {
			Error::InvalidState(_) | Error::IdTokenVerification(_) => StatusClass::BadRequest,
			Error::Unauthenticated => StatusClass::Unauthorized,
			Error::Transport(_)
			| Error::Discovery(_)
			| Error::TokenExchange(_)
			| Error::Upstream(_) => StatusClass::BadGateway,
			Error::Session(_) | Error::Config(_) => StatusClass::Internal,
		}
	}
}

/// Configuration and request-construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A configured or discovered URL cannot be used by the OAuth client.
	#[error("The {field} URL is invalid.")]
	InvalidUrl {
		/// Which URL failed validation.
		field: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Client configuration failed validation.
	#[error(transparent)]
	Client(#[from] crate::config::ClientConfigError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO, timeouts).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the {endpoint} endpoint.")]
	Network {
		/// Provider endpoint being called.
		endpoint: ProviderEndpoint,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The request exceeded the configured timeout.
	#[error("Request to the {endpoint} endpoint timed out.")]
	Timeout {
		/// Provider endpoint being called.
		endpoint: ProviderEndpoint,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the {endpoint} endpoint.")]
	Io {
		/// Provider endpoint being called.
		endpoint: ProviderEndpoint,
		/// IO failure.
		#[source]
		source: std::io::Error,
	},
	/// Transport reported a failure without a typed cause.
	#[error("HTTP client error occurred while calling the {endpoint} endpoint: {message}.")]
	Other {
		/// Provider endpoint being called.
		endpoint: ProviderEndpoint,
		/// Transport-supplied message.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		endpoint: ProviderEndpoint,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { endpoint, source: Box::new(src) }
	}
}

/// Provider metadata discovery failures; fatal to the request that needed the metadata.
#[derive(Debug, ThisError)]
pub enum DiscoveryError {
	/// Discovery document could not be fetched.
	#[error("Discovery document is unreachable.")]
	Unreachable {
		/// Transport failure.
		#[source]
		source: TransportError,
	},
	/// Discovery endpoint answered with a non-success status.
	#[error("Discovery endpoint responded with HTTP {status}.")]
	HttpStatus {
		/// HTTP status code.
		status: u16,
	},
	/// Discovery document is not valid JSON or has the wrong shape.
	#[error("Discovery document is malformed.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Advertised issuer differs from the configured issuer.
	#[error("Discovery document advertises issuer `{found}`, expected `{expected}`.")]
	IssuerMismatch {
		/// Configured issuer.
		expected: String,
		/// Advertised issuer.
		found: String,
	},
	/// A required endpoint is absent.
	#[error("Discovery document does not advertise a {endpoint} endpoint.")]
	MissingEndpoint {
		/// Endpoint label.
		endpoint: &'static str,
	},
	/// An endpoint is not a valid absolute URL.
	#[error("Discovery document has an invalid {endpoint} endpoint.")]
	InvalidEndpoint {
		/// Endpoint label.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// An endpoint uses plain HTTP on a non-loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Endpoint label.
		endpoint: &'static str,
		/// Offending URL.
		url: String,
	},
	/// Provider advertises PKCE methods but not `S256`.
	#[error("Provider does not support the S256 PKCE challenge method.")]
	PkceUnsupported,
}

/// Reasons a callback fails anti-forgery validation. No session mutation accompanies these.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum InvalidStateError {
	/// Provider redirected back with an OAuth error.
	#[error("Authorization failed at the provider: {error}.")]
	Provider {
		/// OAuth `error` code.
		error: String,
		/// OAuth `error_description`, when supplied.
		description: Option<String>,
	},
	/// Callback omitted `code`.
	#[error("Callback is missing the authorization code.")]
	MissingCode,
	/// Callback omitted `state`.
	#[error("Callback is missing the state parameter.")]
	MissingState,
	/// Session holds no pending login attempt.
	#[error("No pending login attempt exists for this session.")]
	NoPendingAttempt,
	/// Returned state differs from the stashed state.
	#[error("Callback state does not match the pending login attempt.")]
	StateMismatch,
	/// Pending attempt outlived the configured maximum age; it is consumed on rejection.
	#[error("Pending login attempt has expired.")]
	Expired,
	/// Pending attempt was consumed or replaced while the callback was validated.
	#[error("Pending login attempt was superseded.")]
	Superseded,
}

/// Token endpoint rejected the authorization code or returned an unusable response.
#[derive(Debug, ThisError)]
#[error("Token endpoint rejected the authorization code: {message}.")]
pub struct TokenExchangeError {
	/// Summary of the failure.
	pub message: String,
	/// HTTP status code, when available.
	pub status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Raw provider response body, when available.
	pub body: Option<String>,
}

/// ID-token verification failures. Tokens received alongside the ID token are discarded.
#[derive(Debug, ThisError)]
pub enum IdTokenVerificationError {
	/// Header segment cannot be decoded.
	#[error("ID token header is malformed.")]
	MalformedHeader {
		/// Decoding failure.
		#[source]
		source: jsonwebtoken::errors::Error,
	},
	/// Header names a symmetric or unknown algorithm.
	#[error("ID token uses unsupported algorithm {alg}.")]
	UnsupportedAlgorithm {
		/// Algorithm named in the header.
		alg: String,
	},
	/// Key set could not be retrieved.
	#[error("Provider key set is unavailable.")]
	KeySetUnavailable {
		/// Underlying failure.
		#[source]
		source: BoxError,
	},
	/// No key in the key set matches the header, even after a refetch.
	#[error("No signing key matches key id {kid:?}.")]
	UnknownKey {
		/// Key id named in the header.
		kid: Option<String>,
	},
	/// Matching key cannot be turned into a verification key.
	#[error("Signing key {kid:?} is unusable.")]
	InvalidKey {
		/// Key id named in the header.
		kid: Option<String>,
		/// Conversion failure.
		#[source]
		source: jsonwebtoken::errors::Error,
	},
	/// Signature does not verify.
	#[error("ID token signature is invalid.")]
	InvalidSignature,
	/// Payload is missing required claims or has the wrong shape.
	#[error("ID token claims are invalid.")]
	InvalidClaims {
		/// Decoding failure.
		#[source]
		source: jsonwebtoken::errors::Error,
	},
	/// `iss` differs from the discovered issuer.
	#[error("ID token issuer `{found}` does not match `{expected}`.")]
	IssuerMismatch {
		/// Discovered issuer.
		expected: String,
		/// Issuer carried by the token.
		found: String,
	},
	/// `aud` does not contain the client identifier.
	#[error("ID token audience does not contain `{expected}`.")]
	AudienceMismatch {
		/// Configured client identifier.
		expected: String,
	},
	/// `exp` has passed.
	#[error("ID token expired.")]
	Expired,
	/// `iat` lies in the future.
	#[error("ID token was issued in the future.")]
	IssuedInFuture,
	/// `iat` is older than the accepted maximum age.
	#[error("ID token was issued too long ago.")]
	IssuedTooLongAgo,
	/// `sub` is empty.
	#[error("ID token subject is empty.")]
	EmptySubject,
}

/// Userinfo endpoint answered with a non-success status; carried verbatim to the caller.
#[derive(Clone, Debug, ThisError)]
#[error("Userinfo endpoint responded with HTTP {status}.")]
pub struct UpstreamError {
	/// HTTP status code returned by the provider.
	pub status: u16,
	/// `Content-Type` returned by the provider.
	pub content_type: Option<String>,
	/// Raw response body.
	pub body: Vec<u8>,
}
