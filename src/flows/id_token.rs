//! ID-token verification: header inspection, JWKS signature check, and claim validation.

// crates.io
use jsonwebtoken::{
	Algorithm, DecodingKey, Header, Validation, decode, decode_header, errors::ErrorKind, jwk::Jwk,
};
// self
use crate::{_prelude::*, auth::IdentityClaims, error::IdTokenVerificationError};

/// Values an ID token must agree with.
#[derive(Clone, Copy, Debug)]
pub struct ClaimExpectations<'a> {
	/// Issuer from the cached discovery document.
	pub issuer: &'a str,
	/// Configured client identifier.
	pub client_id: &'a str,
	/// Tolerated clock skew.
	pub leeway: Duration,
	/// Oldest acceptable `iat`.
	pub max_age: Duration,
}

/// Decodes the header and rejects symmetric or unsigned algorithms.
pub fn inspect_header(token: &str) -> Result<Header, IdTokenVerificationError> {
	let header =
		decode_header(token).map_err(|source| IdTokenVerificationError::MalformedHeader { source })?;

	if !is_asymmetric(header.alg) {
		return Err(IdTokenVerificationError::UnsupportedAlgorithm {
			alg: algorithm_name(header.alg),
		});
	}

	Ok(header)
}

/// JWA name of `alg` (`RS256`, `EdDSA`, ...), as it appears in headers and discovery.
pub fn algorithm_name(alg: Algorithm) -> String {
	serde_json::to_value(alg)
		.ok()
		.and_then(|value| value.as_str().map(str::to_owned))
		.unwrap_or_default()
}

/// Verifies the signature of `token` with `jwk` and validates its claims at `now`.
pub fn verify_signed(
	token: &str,
	header: &Header,
	jwk: &Jwk,
	expectations: &ClaimExpectations,
	now: OffsetDateTime,
) -> Result<IdentityClaims, IdTokenVerificationError> {
	let key = DecodingKey::from_jwk(jwk)
		.map_err(|source| IdTokenVerificationError::InvalidKey { kid: header.kid.clone(), source })?;
	let mut validation = Validation::new(header.alg);

	validation.leeway = u64::try_from(expectations.leeway.whole_seconds()).unwrap_or_default();
	// Audience is checked below against the typed claim so both string and array forms work.
	validation.validate_aud = false;
	validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

	let claims = decode::<IdentityClaims>(token, &key, &validation)
		.map_err(|source| match source.kind() {
			ErrorKind::InvalidSignature => IdTokenVerificationError::InvalidSignature,
			ErrorKind::ExpiredSignature => IdTokenVerificationError::Expired,
			ErrorKind::InvalidAlgorithm | ErrorKind::InvalidKeyFormat | ErrorKind::InvalidRsaKey(_) =>
				IdTokenVerificationError::InvalidKey { kid: header.kid.clone(), source },
			_ => IdTokenVerificationError::InvalidClaims { source },
		})?
		.claims;

	check_claims(&claims, expectations, now)?;

	Ok(claims)
}

/// Checks issuer, audience, expiry, issued-at, and subject.
pub fn check_claims(
	claims: &IdentityClaims,
	expectations: &ClaimExpectations,
	now: OffsetDateTime,
) -> Result<(), IdTokenVerificationError> {
	let now = now.unix_timestamp();
	let leeway = expectations.leeway.whole_seconds();

	if claims.iss != expectations.issuer {
		return Err(IdTokenVerificationError::IssuerMismatch {
			expected: expectations.issuer.to_owned(),
			found: claims.iss.clone(),
		});
	}
	if !claims.aud.contains(expectations.client_id) {
		return Err(IdTokenVerificationError::AudienceMismatch {
			expected: expectations.client_id.to_owned(),
		});
	}
	if claims.exp.saturating_add(leeway) < now {
		return Err(IdTokenVerificationError::Expired);
	}
	if claims.iat.saturating_sub(leeway) > now {
		return Err(IdTokenVerificationError::IssuedInFuture);
	}
	if claims.iat.saturating_add(expectations.max_age.whole_seconds()).saturating_add(leeway) < now
	{
		return Err(IdTokenVerificationError::IssuedTooLongAgo);
	}
	if claims.sub.trim().is_empty() {
		return Err(IdTokenVerificationError::EmptySubject);
	}

	Ok(())
}

fn is_asymmetric(alg: Algorithm) -> bool {
	!matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

#[cfg(test)]
mod tests {
	// crates.io
	use jsonwebtoken::{EncodingKey, encode};
	// self
	use super::*;
	use crate::auth::Audience;

	const SIGNING_KEY: &[u8] = include_bytes!("../../tests/fixtures/signing-private.pem");
	const ROTATED_KEY: &[u8] = include_bytes!("../../tests/fixtures/rotated-private.pem");
	const SIGNING_JWKS: &str = include_str!("../../tests/fixtures/signing-jwks.json");
	const ISSUER: &str = "https://id.example.com";

	fn expectations() -> ClaimExpectations<'static> {
		ClaimExpectations {
			issuer: ISSUER,
			client_id: "client-1",
			leeway: Duration::seconds(60),
			max_age: Duration::hours(24),
		}
	}

	fn signing_jwk() -> Jwk {
		let set: serde_json::Value =
			serde_json::from_str(SIGNING_JWKS).expect("JWKS fixture should parse.");

		serde_json::from_value(set["keys"][0].clone()).expect("JWK fixture should parse.")
	}

	fn claims(now: OffsetDateTime) -> IdentityClaims {
		IdentityClaims {
			iss: ISSUER.into(),
			sub: "u1".into(),
			aud: Audience::Single("client-1".into()),
			exp: now.unix_timestamp() + 300,
			iat: now.unix_timestamp(),
			extra: BTreeMap::new(),
		}
	}

	fn sign(claims: &IdentityClaims, pem: &[u8], kid: &str) -> String {
		let mut header = Header::new(Algorithm::RS256);

		header.kid = Some(kid.into());

		encode(
			&header,
			claims,
			&EncodingKey::from_rsa_pem(pem).expect("Private key fixture should load."),
		)
		.expect("Token should sign.")
	}

	#[test]
	fn valid_token_verifies() {
		let now = OffsetDateTime::now_utc();
		let token = sign(&claims(now), SIGNING_KEY, "signing-key");
		let header = inspect_header(&token).expect("Header should decode.");
		let verified = verify_signed(&token, &header, &signing_jwk(), &expectations(), now)
			.expect("Correctly signed token should verify.");

		assert_eq!(verified.sub, "u1");
		assert_eq!(header.kid.as_deref(), Some("signing-key"));
	}

	#[test]
	fn foreign_signature_is_rejected() {
		let now = OffsetDateTime::now_utc();
		let token = sign(&claims(now), ROTATED_KEY, "signing-key");
		let header = inspect_header(&token).expect("Header should decode.");
		let err = verify_signed(&token, &header, &signing_jwk(), &expectations(), now)
			.expect_err("Token signed by another key must fail.");

		assert!(matches!(err, IdTokenVerificationError::InvalidSignature));
	}

	#[test]
	fn expired_token_is_rejected() {
		let now = OffsetDateTime::now_utc();
		let mut expired = claims(now - Duration::hours(2));

		expired.exp = (now - Duration::hours(1)).unix_timestamp();

		let token = sign(&expired, SIGNING_KEY, "signing-key");
		let header = inspect_header(&token).expect("Header should decode.");
		let err = verify_signed(&token, &header, &signing_jwk(), &expectations(), now)
			.expect_err("Expired token must fail.");

		assert!(matches!(err, IdTokenVerificationError::Expired));
	}

	#[test]
	fn symmetric_algorithms_are_refused() {
		let token = encode(
			&Header::new(Algorithm::HS256),
			&claims(OffsetDateTime::now_utc()),
			&EncodingKey::from_secret(b"client-secret"),
		)
		.expect("HMAC token should sign.");

		assert!(matches!(
			inspect_header(&token),
			Err(IdTokenVerificationError::UnsupportedAlgorithm { ref alg }) if alg == "HS256"
		));
		assert!(matches!(
			inspect_header("not-a-jwt"),
			Err(IdTokenVerificationError::MalformedHeader { .. })
		));
	}

	#[test]
	fn algorithm_names_follow_jwa() {
		assert_eq!(algorithm_name(Algorithm::RS256), "RS256");
		assert_eq!(algorithm_name(Algorithm::PS512), "PS512");
		assert_eq!(algorithm_name(Algorithm::EdDSA), "EdDSA");
	}

	#[test]
	fn claim_checks_cover_issuer_audience_and_timing() {
		let now = OffsetDateTime::now_utc();
		let mut wrong_iss = claims(now);

		wrong_iss.iss = format!("{ISSUER}/");

		assert!(matches!(
			check_claims(&wrong_iss, &expectations(), now),
			Err(IdTokenVerificationError::IssuerMismatch { .. })
		));

		let mut wrong_aud = claims(now);

		wrong_aud.aud = Audience::Many(vec!["other".into(), "api".into()]);

		assert!(matches!(
			check_claims(&wrong_aud, &expectations(), now),
			Err(IdTokenVerificationError::AudienceMismatch { .. })
		));

		let mut future = claims(now);

		future.iat = (now + Duration::minutes(5)).unix_timestamp();

		assert!(matches!(
			check_claims(&future, &expectations(), now),
			Err(IdTokenVerificationError::IssuedInFuture)
		));

		let mut stale = claims(now);

		stale.iat = (now - Duration::days(2)).unix_timestamp();

		assert!(matches!(
			check_claims(&stale, &expectations(), now),
			Err(IdTokenVerificationError::IssuedTooLongAgo)
		));

		let mut skewed = claims(now);

		skewed.iat = (now + Duration::seconds(30)).unix_timestamp();

		assert!(check_claims(&skewed, &expectations(), now).is_ok(), "Skew within leeway passes.");

		let mut anonymous = claims(now);

		anonymous.sub = String::new();

		assert!(matches!(
			check_claims(&anonymous, &expectations(), now),
			Err(IdTokenVerificationError::EmptySubject)
		));
	}
}
