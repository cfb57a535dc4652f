//! Thin axum adapter exposing `/login`, `/callback`, `/me`, `/userinfo`, and `/logout`.
//!
//! Browser sessions are identified by a signed cookie that carries only the [`SessionId`];
//! everything else lives in the client's [`SessionStore`](crate::session::SessionStore).

// crates.io
use axum::{
	Json, Router,
	extract::{FromRef, Query, State},
	http::{HeaderValue, StatusCode, header},
	response::{IntoResponse, Redirect, Response},
	routing::{get, post},
};
use axum_extra::extract::{
	SignedCookieJar,
	cookie::{Cookie, Key, SameSite},
};
use serde_json::json;
// self
use crate::{
	_prelude::*,
	error::{InvalidStateError, StatusClass, UpstreamError},
	flows::{CallbackQuery, OidcClient},
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	session::SessionId,
};

/// Cookie and redirect settings for the router.
#[derive(Clone)]
pub struct WebSettings {
	/// Name of the session cookie.
	pub cookie_name: String,
	/// Key signing the session cookie.
	pub key: Key,
	/// Whether the cookie carries the `Secure` attribute.
	pub secure: bool,
	/// Location the browser is sent to after a successful callback.
	pub post_login_redirect: String,
}
impl WebSettings {
	/// Default session cookie name.
	pub const DEFAULT_COOKIE_NAME: &'static str = "oidc_session";

	/// Creates settings with a secure `oidc_session` cookie and `/` as post-login redirect.
	pub fn new(key: Key) -> Self {
		Self {
			cookie_name: Self::DEFAULT_COOKIE_NAME.into(),
			key,
			secure: true,
			post_login_redirect: "/".into(),
		}
	}

	/// Overrides the cookie name.
	pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
		self.cookie_name = name.into();

		self
	}

	/// Toggles the `Secure` cookie attribute; disable only for plain-HTTP development.
	pub fn with_secure(mut self, secure: bool) -> Self {
		self.secure = secure;

		self
	}

	/// Overrides the post-login redirect.
	pub fn with_post_login_redirect(mut self, location: impl Into<String>) -> Self {
		self.post_login_redirect = location.into();

		self
	}

	fn session_cookie(&self, id: &SessionId) -> Cookie<'static> {
		Cookie::build((self.cookie_name.clone(), id.as_str().to_owned()))
			.http_only(true)
			.secure(self.secure)
			.same_site(SameSite::Lax)
			.path("/")
			.build()
	}

	fn removal_cookie(&self) -> Cookie<'static> {
		Cookie::build((self.cookie_name.clone(), "")).path("/").build()
	}

	fn session_id(&self, jar: &SignedCookieJar) -> Option<SessionId> {
		jar.get(&self.cookie_name).and_then(|cookie| SessionId::parse(cookie.value()).ok())
	}
}
impl Debug for WebSettings {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("WebSettings")
			.field("cookie_name", &self.cookie_name)
			.field("key", &"<redacted>")
			.field("secure", &self.secure)
			.field("post_login_redirect", &self.post_login_redirect)
			.finish()
	}
}

struct WebState<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	client: Arc<OidcClient<C, M>>,
	settings: Arc<WebSettings>,
}
impl<C, M> Clone for WebState<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self { client: self.client.clone(), settings: self.settings.clone() }
	}
}
impl<C, M> FromRef<WebState<C, M>> for Key
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn from_ref(state: &WebState<C, M>) -> Self {
		state.settings.key.clone()
	}
}

/// Error wrapper rendering crate errors as JSON responses.
#[derive(Debug)]
pub struct WebError(pub Error);
impl From<Error> for WebError {
	fn from(e: Error) -> Self {
		Self(e)
	}
}
impl From<UpstreamError> for WebError {
	fn from(e: UpstreamError) -> Self {
		Self(e.into())
	}
}
impl IntoResponse for WebError {
	fn into_response(self) -> Response {
		if let Error::Upstream(upstream) = self.0 {
			return passthrough(upstream.status, upstream.content_type, upstream.body);
		}

		let status = match self.0.status_class() {
			StatusClass::BadRequest => StatusCode::BAD_REQUEST,
			StatusClass::Unauthorized => StatusCode::UNAUTHORIZED,
			StatusClass::BadGateway => StatusCode::BAD_GATEWAY,
			StatusClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
		};
		let mut body = json!({ "error": error_code(&self.0) });

		match &self.0 {
			Error::Session(_) | Error::Config(_) => {
				tracing::error!(error = %self.0, "Request failed with an internal error.");
			},
			Error::TokenExchange(exchange) => {
				body["error_description"] = json!(self.0.to_string());
				body["provider_status"] = json!(exchange.status);
				body["provider_error"] = json!(exchange.error);
				body["provider_error_description"] = json!(exchange.error_description);
			},
			Error::Unauthenticated => {},
			other => body["error_description"] = json!(other.to_string()),
		}

		(status, Json(body)).into_response()
	}
}

/// Builds the router serving the login endpoints for `client`.
pub fn router<C, M>(client: Arc<OidcClient<C, M>>, settings: WebSettings) -> Router
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	Router::new()
		.route("/login", get(login::<C, M>))
		.route("/callback", get(callback::<C, M>))
		.route("/me", get(me::<C, M>))
		.route("/userinfo", get(userinfo::<C, M>))
		.route("/logout", post(logout::<C, M>))
		.with_state(WebState { client, settings: Arc::new(settings) })
}

async fn login<C, M>(
	State(state): State<WebState<C, M>>,
	jar: SignedCookieJar,
) -> Result<(SignedCookieJar, Redirect), WebError>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let id = state.settings.session_id(&jar).unwrap_or_else(SessionId::generate);
	let url = state.client.begin_login(&id).await?;

	Ok((jar.add(state.settings.session_cookie(&id)), Redirect::to(url.as_str())))
}

async fn callback<C, M>(
	State(state): State<WebState<C, M>>,
	jar: SignedCookieJar,
	Query(query): Query<CallbackQuery>,
) -> Result<Redirect, WebError>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let id = state
		.settings
		.session_id(&jar)
		.ok_or(Error::from(InvalidStateError::NoPendingAttempt))?;
	let outcome = state.client.handle_callback(&id, query).await?;

	tracing::info!(
		subject = outcome.claims.as_ref().map(|claims| claims.sub.as_str()),
		"Login completed."
	);

	Ok(Redirect::to(&state.settings.post_login_redirect))
}

async fn me<C, M>(
	State(state): State<WebState<C, M>>,
	jar: SignedCookieJar,
) -> Result<Json<serde_json::Value>, WebError>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let id = state.settings.session_id(&jar).ok_or(Error::Unauthenticated)?;
	let claims = state.client.claims(&id).await?;

	Ok(Json(json!({ "claims": claims })))
}

async fn userinfo<C, M>(
	State(state): State<WebState<C, M>>,
	jar: SignedCookieJar,
) -> Result<Response, WebError>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let id = state.settings.session_id(&jar).ok_or(Error::Unauthenticated)?;
	let response = state.client.userinfo(&id).await?;

	Ok(passthrough(response.status, response.content_type, response.body))
}

async fn logout<C, M>(
	State(state): State<WebState<C, M>>,
	jar: SignedCookieJar,
) -> Result<(SignedCookieJar, StatusCode), WebError>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	if let Some(id) = state.settings.session_id(&jar) {
		state.client.logout(&id).await?;
	}

	Ok((jar.remove(state.settings.removal_cookie()), StatusCode::NO_CONTENT))
}

fn error_code(error: &Error) -> &'static str {
	match error {
		Error::Unauthenticated => "not_authenticated",
		Error::InvalidState(_) => "invalid_state",
		Error::IdTokenVerification(_) => "invalid_id_token",
		Error::TokenExchange(_) => "token_exchange_failed",
		Error::Discovery(_) => "discovery_failed",
		Error::Transport(_) => "provider_unreachable",
		Error::Upstream(_) => "upstream_error",
		Error::Session(_) | Error::Config(_) => "internal_error",
	}
}

fn passthrough(status: u16, content_type: Option<String>, body: Vec<u8>) -> Response {
	let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
	let mut response = (status, body).into_response();

	match content_type.and_then(|value| HeaderValue::from_str(&value).ok()) {
		Some(value) => {
			response.headers_mut().insert(header::CONTENT_TYPE, value);
		},
		None => {
			response.headers_mut().remove(header::CONTENT_TYPE);
		},
	}

	response
}
