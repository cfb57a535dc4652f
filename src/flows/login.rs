//! Authorization redirect construction for `/login`.

// self
use crate::{
	_prelude::*,
	config::ClientConfig,
	flows::{OidcClient, pkce::PkceCodeChallengeMethod},
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	session::{self, PendingAuthAttempt, SessionId},
};

impl<C, M> OidcClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Starts a login for `session` and returns the provider authorization URL.
	///
	/// A fresh state and verifier are generated and stashed as the session's only pending
	/// attempt, replacing any earlier one; previously issued redirects become unusable. Tokens
	/// and claims from an earlier login are left in place until a callback replaces them.
	pub async fn begin_login(&self, session: &SessionId) -> Result<Url> {
		let span = FlowSpan::new(FlowKind::Login, "begin_login");

		obs::record_flow_outcome(FlowKind::Login, FlowOutcome::Attempt);

		obs::observe(FlowKind::Login, span.instrument(self.begin_login_inner(session)).await)
	}

	async fn begin_login_inner(&self, session: &SessionId) -> Result<Url> {
		let metadata = self.provider_metadata().await?;
		let attempt = PendingAuthAttempt::generate(self.config.redirect_uri.clone());
		let url = authorization_url(&metadata.authorization_endpoint, &self.config, &attempt);

		session::modify_session(self.sessions.as_ref(), session, true, |state| {
			state.pending = Some(attempt.clone());
		})
		.await?;

		Ok(url)
	}
}

/// Appends the authorization request parameters to `endpoint`, keeping any query it already has.
pub(crate) fn authorization_url(
	endpoint: &Url,
	config: &ClientConfig,
	attempt: &PendingAuthAttempt,
) -> Url {
	let mut url = endpoint.clone();

	{
		let mut query = url.query_pairs_mut();

		query
			.append_pair("client_id", &config.client_id)
			.append_pair("response_type", "code")
			.append_pair("redirect_uri", attempt.redirect_uri.as_str())
			.append_pair("scope", &config.scope.normalized())
			.append_pair("code_challenge", &attempt.code_challenge())
			.append_pair("code_challenge_method", PkceCodeChallengeMethod::S256.as_str())
			.append_pair("state", attempt.state.expose());

		if let Some(audience) = &config.audience {
			query.append_pair("audience", audience);
		}
		for (name, value) in &config.extra_authorize_params {
			query.append_pair(name, value);
		}
	}

	url
}
