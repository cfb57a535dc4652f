//! Provider call facade: authorization-code exchange through the `oauth2` crate plus plain JSON
//! GETs (discovery, key set, userinfo) over the same instrumented transport.

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AsyncHttpClient, AuthType, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet,
	EndpointSet, ExtraTokenFields, HttpClientError, HttpRequest, HttpResponse, PkceCodeVerifier,
	RedirectUrl, RequestTokenError, StandardRevocableToken, StandardTokenResponse, TokenResponse,
	TokenUrl,
	basic::{
		BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
		BasicTokenType,
	},
	http::{Method, header},
};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret, TokenSet},
	config::{ClientAuthMethod, ClientConfig},
	error::{ConfigError, TokenExchangeError, TransportError},
	http::{ProviderEndpoint, ProviderHttpClient, ResponseMetadata, ResponseMetadataSlot},
	session::PendingAuthAttempt,
};

/// Token endpoint response extended with the OpenID Connect `id_token`.
pub type OidcTokenResponse = StandardTokenResponse<OidcTokenFields, BasicTokenType>;

type CodeExchangeClient = oauth2::Client<
	BasicErrorResponse,
	OidcTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Token response fields beyond RFC 6749.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcTokenFields {
	/// Raw ID token, when issued.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<String>,
	/// Any other provider-defined fields.
	#[serde(flatten)]
	pub extra: BTreeMap<String, Value>,
}
impl ExtraTokenFields for OidcTokenFields {}

/// Maps HTTP transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a crate error.
	fn map_transport_error(
		&self,
		endpoint: ProviderEndpoint,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		endpoint: ProviderEndpoint,
		_meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(endpoint, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(source) => TransportError::Io { endpoint, source }.into(),
			HttpClientError::Other(message) => TransportError::Other { endpoint, message }.into(),
			_ => TransportError::Other { endpoint, message: "unrecognized transport failure".into() }
				.into(),
		}
	}
}

/// Response captured verbatim from a provider GET.
#[derive(Clone, Debug)]
pub(crate) struct RawResponse {
	pub(crate) status: u16,
	pub(crate) content_type: Option<String>,
	pub(crate) body: Vec<u8>,
}
impl RawResponse {
	pub(crate) fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// Executes provider calls for one [`OidcClient`](crate::flows::OidcClient).
pub(crate) struct ProviderFacade<'a, C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: &'a C,
	error_mapper: &'a M,
}
impl<'a, C, M> ProviderFacade<'a, C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn new(http_client: &'a C, error_mapper: &'a M) -> Self {
		Self { http_client, error_mapper }
	}

	/// Issues a GET and returns the response whatever its status.
	pub(crate) fn get(
		&self,
		endpoint: ProviderEndpoint,
		url: &Url,
		bearer: Option<&TokenSecret>,
	) -> FacadeFuture<'a, RawResponse> {
		let http_client = self.http_client;
		let error_mapper = self.error_mapper;
		let request = build_get(url, bearer);

		Box::pin(async move {
			let meta = ResponseMetadataSlot::default();
			let handle = http_client.with_metadata(meta.clone());
			let response = handle.call(request?).await.map_err(|err| {
				error_mapper.map_transport_error(endpoint, meta.take().as_ref(), err)
			})?;

			Ok(raw_response(response))
		})
	}

	/// Redeems `code` at `token_endpoint` with the verifier and redirect URI stashed in `attempt`.
	///
	/// The form carries only `grant_type`, `code`, `redirect_uri`, `code_verifier`, and the
	/// client credentials; `audience` belongs to the authorization request alone.
	pub(crate) fn exchange_code(
		&self,
		config: &ClientConfig,
		token_endpoint: &Url,
		code: &str,
		attempt: &PendingAuthAttempt,
	) -> FacadeFuture<'a, TokenSet> {
		let http_client = self.http_client;
		let error_mapper = self.error_mapper;
		let oauth_client = code_exchange_client(config, token_endpoint);
		let code = AuthorizationCode::new(code.to_owned());
		let verifier = PkceCodeVerifier::new(attempt.verifier.expose().to_owned());
		let redirect_url = RedirectUrl::from_url(attempt.redirect_uri.clone());

		Box::pin(async move {
			let meta = ResponseMetadataSlot::default();
			let handle = http_client.with_metadata(meta.clone());
			let response = oauth_client
				.exchange_code(code)
				.set_pkce_verifier(verifier)
				.set_redirect_uri(Cow::Owned(redirect_url))
				.request_async(&handle)
				.await
				.map_err(|err| map_request_error(err, meta.take(), error_mapper))?;

			Ok(token_set_from_response(response))
		})
	}
}

fn code_exchange_client(config: &ClientConfig, token_endpoint: &Url) -> CodeExchangeClient {
	let mut client = oauth2::Client::new(ClientId::new(config.client_id.clone()))
		.set_token_uri(TokenUrl::from_url(token_endpoint.clone()))
		.set_auth_type(match config.client_auth_method {
			ClientAuthMethod::ClientSecretPost => AuthType::RequestBody,
			ClientAuthMethod::ClientSecretBasic => AuthType::BasicAuth,
		});

	if let Some(secret) = &config.client_secret {
		client = client.set_client_secret(ClientSecret::new(secret.clone()));
	}

	client
}

fn build_get(url: &Url, bearer: Option<&TokenSecret>) -> Result<HttpRequest> {
	let mut builder = oauth2::http::Request::builder()
		.method(Method::GET)
		.uri(url.as_str())
		.header(header::ACCEPT, "application/json");

	if let Some(token) = bearer {
		builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token.expose()));
	}

	builder.body(Vec::new()).map_err(|e| ConfigError::from(e).into())
}

fn raw_response(response: HttpResponse) -> RawResponse {
	RawResponse {
		status: response.status().as_u16(),
		content_type: crate::http::content_type(&response),
		body: response.into_body(),
	}
}

fn token_set_from_response(response: OidcTokenResponse) -> TokenSet {
	let issued_at = OffsetDateTime::now_utc();
	let expires_at = response
		.expires_in()
		.and_then(|expires_in| Duration::try_from(expires_in).ok())
		.map(|expires_in| issued_at + expires_in);
	let scope = response.scopes().and_then(|scopes| {
		ScopeSet::new(scopes.iter().map(|scope| scope.as_ref())).ok()
	});
	let fields = response.extra_fields();

	TokenSet {
		access_token: TokenSecret::new(response.access_token().secret().to_owned()),
		token_type: response.token_type().as_ref().to_owned(),
		refresh_token: response
			.refresh_token()
			.map(|token| TokenSecret::new(token.secret().to_owned())),
		id_token: fields.id_token.clone().map(TokenSecret::new),
		scope,
		issued_at,
		expires_at,
		extra: fields.extra.clone(),
	}
}

fn map_request_error<E, M>(
	err: RequestTokenError<HttpClientError<E>, BasicErrorResponse>,
	meta: Option<ResponseMetadata>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let status = meta.as_ref().and_then(|value| value.status);

	match err {
		RequestTokenError::ServerResponse(response) => TokenExchangeError {
			message: response
				.error_description()
				.cloned()
				.unwrap_or_else(|| response.error().as_ref().to_owned()),
			status,
			error: Some(response.error().as_ref().to_owned()),
			error_description: response.error_description().cloned(),
			body: serde_json::to_string(&response).ok(),
		}
		.into(),
		RequestTokenError::Request(error) =>
			mapper.map_transport_error(ProviderEndpoint::Token, meta.as_ref(), error),
		RequestTokenError::Parse(error, body) => TokenExchangeError {
			message: format!("unreadable token response at `{}`", error.path()),
			status,
			error: None,
			error_description: None,
			body: Some(String::from_utf8_lossy(&body).into_owned()),
		}
		.into(),
		RequestTokenError::Other(message) =>
			TokenExchangeError { message, status, error: None, error_description: None, body: None }
				.into(),
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(endpoint: ProviderEndpoint, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransportError::Timeout { endpoint }.into();
	}

	TransportError::network(endpoint, err).into()
}

#[cfg(test)]
mod tests {
	// std
	use std::io::Error as IoError;
	// self
	use super::*;

	type CapturedBody = Arc<Mutex<Option<Vec<u8>>>>;

	/// Records the request body and answers with a fixed token response.
	#[derive(Default)]
	struct CapturingHttpClient {
		body: CapturedBody,
	}
	impl ProviderHttpClient for CapturingHttpClient {
		type Handle = CapturingHandle;
		type TransportError = IoError;

		fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
			CapturingHandle { body: self.body.clone(), slot }
		}
	}

	struct CapturingHandle {
		body: CapturedBody,
		slot: ResponseMetadataSlot,
	}
	impl<'c> AsyncHttpClient<'c> for CapturingHandle {
		type Error = HttpClientError<IoError>;
		type Future =
			Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

		fn call(&'c self, request: HttpRequest) -> Self::Future {
			*self.body.lock() = Some(request.body().clone());

			self.slot.store(ResponseMetadata { status: Some(200) });

			Box::pin(async move {
				oauth2::http::Response::builder()
					.status(200)
					.header(header::CONTENT_TYPE, "application/json")
					.body(br#"{"access_token":"at-1","token_type":"Bearer"}"#.to_vec())
					.map_err(HttpClientError::Http)
			})
		}
	}

	struct PassthroughMapper;
	impl TransportErrorMapper<IoError> for PassthroughMapper {
		fn map_transport_error(
			&self,
			endpoint: ProviderEndpoint,
			_metadata: Option<&ResponseMetadata>,
			error: HttpClientError<IoError>,
		) -> Error {
			TransportError::Other { endpoint, message: error.to_string() }.into()
		}
	}

	fn config(method: ClientAuthMethod, secret: Option<&str>) -> ClientConfig {
		let mut builder = ClientConfig::builder("https://id.example.com", "client-1")
			.redirect_uri("https://app.example.com/callback")
			.client_auth_method(method);

		if let Some(secret) = secret {
			builder = builder.client_secret(secret);
		}

		builder.build().expect("Config fixture should build.")
	}

	#[test]
	fn exchange_client_targets_the_discovered_token_endpoint() {
		let endpoint =
			Url::parse("https://id.example.com/oauth/token").expect("Token URL should parse.");
		let client = code_exchange_client(
			&config(ClientAuthMethod::ClientSecretBasic, Some("s3cret")),
			&endpoint,
		);

		assert_eq!(client.token_uri().url(), &endpoint);
		assert_eq!(client.client_id().as_str(), "client-1");
		assert!(matches!(client.auth_type(), AuthType::BasicAuth));

		let public =
			code_exchange_client(&config(ClientAuthMethod::ClientSecretPost, None), &endpoint);

		assert!(matches!(public.auth_type(), AuthType::RequestBody));
	}

	#[tokio::test]
	async fn code_exchange_form_omits_authorization_only_parameters() {
		let config = ClientConfig::builder("https://id.example.com", "client-1")
			.redirect_uri("https://app.example.com/callback")
			.audience("https://api.example.com")
			.build()
			.expect("Config fixture should build.");
		let endpoint = Url::parse("https://id.example.com/token").expect("Token URL should parse.");
		let attempt = PendingAuthAttempt::generate(config.redirect_uri.clone());
		let http_client = CapturingHttpClient::default();
		let tokens = ProviderFacade::new(&http_client, &PassthroughMapper)
			.exchange_code(&config, &endpoint, "code-1", &attempt)
			.await
			.expect("Exchange against the capturing client should succeed.");

		assert_eq!(tokens.access_token.expose(), "at-1");

		let body = http_client.body.lock().clone().expect("Token request should be captured.");
		let form = url::form_urlencoded::parse(&body)
			.into_owned()
			.collect::<BTreeMap<String, String>>();

		assert_eq!(form.get("grant_type").map(String::as_str), Some("authorization_code"));
		assert_eq!(form.get("code").map(String::as_str), Some("code-1"));
		assert_eq!(form.get("code_verifier").map(String::as_str), Some(attempt.verifier.expose()));
		assert_eq!(
			form.get("redirect_uri").map(String::as_str),
			Some("https://app.example.com/callback")
		);
		assert!(!form.contains_key("audience"));
		assert!(!form.contains_key("scope"));
	}

	#[test]
	fn token_response_keeps_id_token_and_provider_fields() {
		let response: OidcTokenResponse = serde_json::from_value(serde_json::json!({
			"access_token": "at-1",
			"token_type": "Bearer",
			"expires_in": 300,
			"refresh_token": "rt-1",
			"id_token": "header.payload.signature",
			"scope": "openid email",
			"session_state": "abc",
		}))
		.expect("Token response fixture should deserialize.");
		let tokens = token_set_from_response(response);

		assert_eq!(tokens.access_token.expose(), "at-1");
		assert_eq!(tokens.token_type, "bearer");
		assert_eq!(
			tokens.id_token.as_ref().map(TokenSecret::expose),
			Some("header.payload.signature")
		);
		assert_eq!(tokens.refresh_token.as_ref().map(TokenSecret::expose), Some("rt-1"));
		assert_eq!(tokens.extra.get("session_state"), Some(&Value::from("abc")));
		assert_eq!(tokens.expires_at, Some(tokens.issued_at + Duration::seconds(300)));
		assert!(tokens.scope.as_ref().is_some_and(|scope| scope.contains("email")));
	}

	#[test]
	fn get_requests_carry_bearer_and_accept_headers() {
		let url = Url::parse("https://id.example.com/userinfo").expect("Userinfo URL should parse.");
		let request =
			build_get(&url, Some(&TokenSecret::new("at-1"))).expect("GET request should build.");

		assert_eq!(request.method(), Method::GET);
		assert_eq!(request.uri(), "https://id.example.com/userinfo");
		assert_eq!(
			request.headers().get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()),
			Some("Bearer at-1")
		);
		assert_eq!(
			request.headers().get(header::ACCEPT).and_then(|v| v.to_str().ok()),
			Some("application/json")
		);
	}
}
