//! Tokens returned by a successful authorization-code exchange.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
};

/// Token bundle stored on an authenticated session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
	/// Access token presented to the userinfo endpoint.
	pub access_token: TokenSecret,
	/// Token type reported by the provider (normally `Bearer`).
	pub token_type: String,
	/// Refresh token, when the provider issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Raw ID token, when the provider issued one.
	pub id_token: Option<TokenSecret>,
	/// Scopes the provider reports as granted, when it reports them.
	pub scope: Option<ScopeSet>,
	/// Instant the exchange completed.
	pub issued_at: OffsetDateTime,
	/// Access token expiry derived from `expires_in`.
	pub expires_at: Option<OffsetDateTime>,
	/// Provider-defined response fields not modelled above.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub extra: BTreeMap<String, Value>,
}
