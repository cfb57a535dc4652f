//! Read side of an authenticated session: claims, userinfo passthrough, and logout.

// self
use crate::{
	_prelude::*,
	auth::IdentityClaims,
	error::UpstreamError,
	flows::OidcClient,
	http::{ProviderEndpoint, ProviderHttpClient},
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	session::SessionId,
};

/// Successful userinfo response, relayed without reinterpretation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserinfoResponse {
	/// HTTP status returned by the provider.
	pub status: u16,
	/// `Content-Type` returned by the provider.
	pub content_type: Option<String>,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl UserinfoResponse {
	/// Parses the body as JSON.
	pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
		serde_json::from_slice(&self.body)
	}
}

impl<C, M> OidcClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns the verified claims of `session`.
	///
	/// Fails with [`Error::Unauthenticated`] when the session is unknown or never completed a
	/// login that produced an ID token.
	pub async fn claims(&self, session: &SessionId) -> Result<IdentityClaims> {
		self.sessions
			.load(session)
			.await?
			.and_then(|state| state.claims)
			.ok_or(Error::Unauthenticated)
	}

	/// Calls the provider userinfo endpoint with the session's access token.
	///
	/// Non-success statuses surface as [`UpstreamError`] carrying the provider's status, content
	/// type, and body verbatim.
	pub async fn userinfo(&self, session: &SessionId) -> Result<UserinfoResponse> {
		let span = FlowSpan::new(FlowKind::Userinfo, "userinfo");

		obs::record_flow_outcome(FlowKind::Userinfo, FlowOutcome::Attempt);

		obs::observe(FlowKind::Userinfo, span.instrument(self.userinfo_inner(session)).await)
	}

	async fn userinfo_inner(&self, session: &SessionId) -> Result<UserinfoResponse> {
		let tokens = self
			.sessions
			.load(session)
			.await?
			.and_then(|state| state.tokens)
			.ok_or(Error::Unauthenticated)?;
		let metadata = self.provider_metadata().await?;
		let endpoint = metadata.require_userinfo_endpoint()?;
		let response = self
			.facade()
			.get(ProviderEndpoint::Userinfo, endpoint, Some(&tokens.access_token))
			.await?;

		if !response.is_success() {
			return Err(UpstreamError {
				status: response.status,
				content_type: response.content_type,
				body: response.body,
			}
			.into());
		}

		Ok(UserinfoResponse {
			status: response.status,
			content_type: response.content_type,
			body: response.body,
		})
	}

	/// Destroys the session record; returns whether one existed.
	pub async fn logout(&self, session: &SessionId) -> Result<bool> {
		Ok(self.sessions.destroy(session).await?)
	}
}
