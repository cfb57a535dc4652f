//! Memoized JSON Web Key Set with a single refetch on key-id misses.

// crates.io
use jsonwebtoken::jwk::{Jwk, PublicKeyUse};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	error::{IdTokenVerificationError, TransportError},
	http::{ProviderEndpoint, ProviderHttpClient},
	oauth::{ProviderFacade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Signing keys published by the provider.
///
/// Keys that `jsonwebtoken` cannot model (unknown `kty`, encryption-only parameters) are
/// skipped rather than failing the whole set, as are keys published with `use: "enc"`.
#[derive(Clone, Debug, Default)]
pub struct KeySet(Vec<Jwk>);
impl KeySet {
	/// Parses a JWKS document.
	pub fn from_document(body: &[u8]) -> Result<Self, serde_json::Error> {
		#[derive(Deserialize)]
		struct RawKeySet {
			keys: Vec<Value>,
		}

		let raw: RawKeySet = serde_json::from_slice(body)?;

		Ok(Self(
			raw.keys
				.into_iter()
				.filter_map(|key| serde_json::from_value::<Jwk>(key).ok())
				.filter(|key| !matches!(key.common.public_key_use, Some(PublicKeyUse::Encryption)))
				.collect(),
		))
	}

	/// Finds the key for `kid`; a header without `kid` matches only a single-key set.
	pub fn find(&self, kid: Option<&str>) -> Option<&Jwk> {
		match kid {
			Some(kid) => self.0.iter().find(|key| key.common.key_id.as_deref() == Some(kid)),
			None if self.0.len() == 1 => self.0.first(),
			None => None,
		}
	}

	/// Number of usable keys.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true when no usable key was published.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

/// Memoizes the key set for the lifetime of the owning client.
#[derive(Debug, Default)]
pub struct KeySetCache(RwLock<Option<Arc<KeySet>>>);
impl KeySetCache {
	/// Returns the cached key set without fetching.
	pub fn cached(&self) -> Option<Arc<KeySet>> {
		self.0.read().clone()
	}

	/// Resolves the verification key for `kid`.
	///
	/// A cache hit costs nothing. On a miss (empty cache or unknown `kid`) the key set is
	/// fetched exactly once and replaces the cached copy; a second miss is final.
	pub(crate) async fn find_key<C, M>(
		&self,
		facade: &ProviderFacade<'_, C, M>,
		jwks_uri: &Url,
		kid: Option<&str>,
	) -> Result<Jwk, IdTokenVerificationError>
	where
		C: ?Sized + ProviderHttpClient,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
	{
		if let Some(key) = self.cached().and_then(|keys| keys.find(kid).cloned()) {
			return Ok(key);
		}

		let span = FlowSpan::new(FlowKind::KeySet, "fetch");

		obs::record_flow_outcome(FlowKind::KeySet, FlowOutcome::Attempt);

		let fetched = span.instrument(fetch(facade, jwks_uri)).await;

		obs::record_flow_outcome(
			FlowKind::KeySet,
			if fetched.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure },
		);

		let fresh = Arc::new(fetched?);

		*self.0.write() = Some(fresh.clone());

		fresh
			.find(kid)
			.cloned()
			.ok_or_else(|| IdTokenVerificationError::UnknownKey { kid: kid.map(str::to_owned) })
	}
}

async fn fetch<C, M>(
	facade: &ProviderFacade<'_, C, M>,
	jwks_uri: &Url,
) -> Result<KeySet, IdTokenVerificationError>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let unavailable =
		|source: Box<dyn StdError + Send + Sync>| IdTokenVerificationError::KeySetUnavailable {
			source,
		};
	let response = facade
		.get(ProviderEndpoint::KeySet, jwks_uri, None)
		.await
		.map_err(|e| unavailable(Box::new(e)))?;

	if !response.is_success() {
		return Err(unavailable(Box::new(TransportError::Other {
			endpoint: ProviderEndpoint::KeySet,
			message: format!("HTTP {}", response.status),
		})));
	}

	KeySet::from_document(&response.body).map_err(|e| unavailable(Box::new(e)))
}
