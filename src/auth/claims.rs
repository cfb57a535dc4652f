//! Verified identity claims carried by an authenticated session.

// crates.io
use serde_json::Value;
// self
use crate::_prelude::*;

/// `aud` claim, which providers emit either as a string or as an array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
	/// Single audience.
	Single(String),
	/// Multiple audiences.
	Many(Vec<String>),
}
impl Audience {
	/// Returns true when `client_id` is one of the audiences.
	pub fn contains(&self, client_id: &str) -> bool {
		match self {
			Audience::Single(aud) => aud == client_id,
			Audience::Many(auds) => auds.iter().any(|aud| aud == client_id),
		}
	}
}

/// Claims decoded from a verified ID token.
///
/// Registered claims are typed; everything else the provider sent is kept verbatim in
/// [`IdentityClaims::extra`] so it survives the session round trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdentityClaims {
	/// Issuer.
	pub iss: String,
	/// Subject identifier.
	pub sub: String,
	/// Audience.
	pub aud: Audience,
	/// Expiry as seconds since the Unix epoch.
	pub exp: i64,
	/// Issued-at as seconds since the Unix epoch.
	pub iat: i64,
	/// Remaining claims.
	#[serde(flatten)]
	pub extra: BTreeMap<String, Value>,
}
impl IdentityClaims {
	/// Looks up a non-registered claim by name.
	pub fn claim(&self, name: &str) -> Option<&Value> {
		self.extra.get(name)
	}

	/// `email` claim, when present and a string.
	pub fn email(&self) -> Option<&str> {
		self.claim("email").and_then(Value::as_str)
	}
}
