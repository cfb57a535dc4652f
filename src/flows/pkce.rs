//! PKCE verifier/challenge and anti-forgery state generation (RFC 7636, `S256` only).

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::TokenSecret, session::PendingAuthAttempt};

/// Random bytes behind every verifier, state, and session identifier.
pub const RANDOM_TOKEN_BYTES: usize = 32;

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

impl PendingAuthAttempt {
	/// Generates a fresh state/verifier pair bound to `redirect_uri`.
	pub fn generate(redirect_uri: Url) -> Self {
		Self {
			state: TokenSecret::new(random_token()),
			verifier: TokenSecret::new(random_token()),
			redirect_uri,
			created_at: OffsetDateTime::now_utc(),
		}
	}

	/// PKCE challenge for the stashed verifier.
	pub fn code_challenge(&self) -> String {
		derive_challenge(self.verifier.expose())
	}
}

/// `BASE64URL-NOPAD(SHA256(verifier))`.
pub fn derive_challenge(verifier: &str) -> String {
	URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// 32 bytes from the thread-local CSPRNG, base64url without padding.
pub(crate) fn random_token() -> String {
	let mut bytes = [0_u8; RANDOM_TOKEN_BYTES];

	rand::rng().fill(&mut bytes);

	URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::HashSet;
	// self
	use super::*;

	fn attempt() -> PendingAuthAttempt {
		PendingAuthAttempt::generate(
			Url::parse("https://app.example.com/callback").expect("Redirect fixture should parse."),
		)
	}

	#[test]
	fn challenge_matches_rfc_7636_appendix_b() {
		assert_eq!(
			derive_challenge("dBjftJeZ4CVP-1mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
			"E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
		);
	}

	#[test]
	fn generated_attempts_are_url_safe_and_full_entropy() {
		for _ in 0..64 {
			let attempt = attempt();
			let verifier = attempt.verifier.expose();
			let challenge = attempt.code_challenge();

			assert_eq!(
				URL_SAFE_NO_PAD.decode(verifier).expect("Verifier should be base64url.").len(),
				RANDOM_TOKEN_BYTES
			);
			assert_eq!(verifier.len(), 43);
			assert_eq!(attempt.state.expose().len(), 43);
			assert_eq!(challenge, derive_challenge(verifier));

			for value in [verifier, attempt.state.expose(), challenge.as_str()] {
				assert!(!value.contains(['=', '+', '/']), "{value} must be unpadded base64url.");
			}
		}
	}

	#[test]
	fn attempts_do_not_repeat() {
		let states = (0..256).map(|_| attempt().state.expose().to_owned()).collect::<HashSet<_>>();

		assert_eq!(states.len(), 256);
	}

	#[test]
	fn only_s256_is_advertised() {
		assert_eq!(PkceCodeChallengeMethod::S256.as_str(), "S256");
	}
}
