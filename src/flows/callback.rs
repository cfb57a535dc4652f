//! `/callback` handling: a guarded state machine from the provider redirect to committed tokens.
//!
//! The pending attempt is consumed with a compare-and-swap on its state before the code is
//! exchanged, so a replayed or concurrent callback for the same attempt can never reach the
//! token endpoint twice. Tokens and claims are committed together once the ID token verified;
//! every earlier failure leaves the previously committed identity untouched.

// crates.io
use jsonwebtoken::Header;
// self
use crate::{
	_prelude::*,
	auth::{IdentityClaims, TokenSet},
	error::{IdTokenVerificationError, InvalidStateError},
	flows::{
		OidcClient,
		id_token::{self, ClaimExpectations},
	},
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::ProviderMetadata,
	session::{self, CompareAndSwapOutcome, PendingAuthAttempt, SessionId, SessionState},
};

/// Query parameters of the provider redirect.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackQuery {
	/// Authorization code.
	#[serde(default)]
	pub code: Option<String>,
	/// Returned anti-forgery state.
	#[serde(default)]
	pub state: Option<String>,
	/// OAuth error code, when the provider refused the authorization.
	#[serde(default)]
	pub error: Option<String>,
	/// Human-readable OAuth error description.
	#[serde(default)]
	pub error_description: Option<String>,
}

/// Identity committed by a successful callback.
#[derive(Clone, Debug)]
pub struct CallbackOutcome {
	/// Tokens returned by the token endpoint.
	pub tokens: TokenSet,
	/// Verified claims; `None` when the provider issued no ID token.
	pub claims: Option<IdentityClaims>,
}

/// Stages a callback moves through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallbackStage {
	/// Waiting for the provider redirect.
	AwaitingCode,
	/// State matched and the pending attempt was consumed.
	StateValidated,
	/// Token endpoint accepted the code.
	CodeExchanged,
	/// ID token verified.
	IdTokenVerified,
	/// Token response carried no ID token.
	IdTokenAbsent,
	/// Tokens and claims committed to the session.
	Complete,
	/// Callback failed; nothing was committed.
	Rejected,
}
impl CallbackStage {
	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallbackStage::AwaitingCode => "awaiting_code",
			CallbackStage::StateValidated => "state_validated",
			CallbackStage::CodeExchanged => "code_exchanged",
			CallbackStage::IdTokenVerified => "id_token_verified",
			CallbackStage::IdTokenAbsent => "id_token_absent",
			CallbackStage::Complete => "complete",
			CallbackStage::Rejected => "rejected",
		}
	}

	/// Returns true when `next` directly follows `self`.
	pub const fn can_advance_to(self, next: CallbackStage) -> bool {
		match next {
			CallbackStage::AwaitingCode => false,
			CallbackStage::StateValidated => matches!(self, CallbackStage::AwaitingCode),
			CallbackStage::CodeExchanged => matches!(self, CallbackStage::StateValidated),
			CallbackStage::IdTokenVerified | CallbackStage::IdTokenAbsent =>
				matches!(self, CallbackStage::CodeExchanged),
			CallbackStage::Complete =>
				matches!(self, CallbackStage::IdTokenVerified | CallbackStage::IdTokenAbsent),
			CallbackStage::Rejected => !self.is_terminal(),
		}
	}

	/// Returns true for [`CallbackStage::Complete`] and [`CallbackStage::Rejected`].
	pub const fn is_terminal(self) -> bool {
		matches!(self, CallbackStage::Complete | CallbackStage::Rejected)
	}
}
impl Display for CallbackStage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

#[derive(Debug)]
struct CallbackMachine {
	stage: CallbackStage,
}
impl CallbackMachine {
	fn new() -> Self {
		Self { stage: CallbackStage::AwaitingCode }
	}

	fn advance(&mut self, next: CallbackStage) {
		debug_assert!(
			self.stage.can_advance_to(next),
			"illegal callback transition {} -> {next}",
			self.stage
		);

		self.stage = next;

		obs::record_stage(FlowKind::Callback, next.as_str());
	}
}

impl<C, M> OidcClient<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Completes the login started by [`OidcClient::begin_login`].
	///
	/// On success the session's tokens and claims are replaced together. On failure nothing
	/// is committed; the pending attempt survives only input errors that precede state
	/// validation (provider error, missing parameters, state mismatch). An attempt older than
	/// [`ClientConfig::pending_attempt_ttl`](crate::config::ClientConfig::pending_attempt_ttl)
	/// is consumed and rejected.
	pub async fn handle_callback(
		&self,
		session: &SessionId,
		query: CallbackQuery,
	) -> Result<CallbackOutcome> {
		let span = FlowSpan::new(FlowKind::Callback, "handle_callback");

		obs::record_flow_outcome(FlowKind::Callback, FlowOutcome::Attempt);

		let mut machine = CallbackMachine::new();
		let result = span.instrument(self.run_callback(&mut machine, session, query)).await;

		if result.is_err() {
			machine.advance(CallbackStage::Rejected);
		}

		obs::observe(FlowKind::Callback, result)
	}

	async fn run_callback(
		&self,
		machine: &mut CallbackMachine,
		session: &SessionId,
		query: CallbackQuery,
	) -> Result<CallbackOutcome> {
		let (code, state) = callback_parameters(query)?;
		let current = self.sessions.load(session).await?.unwrap_or_default();
		let pending = current.pending.clone().ok_or(InvalidStateError::NoPendingAttempt)?;

		if !pending.state.constant_time_eq(&state) {
			return Err(InvalidStateError::StateMismatch.into());
		}
		if pending.is_expired_at(OffsetDateTime::now_utc(), self.config.pending_attempt_ttl) {
			self.consume_pending(session, &current, &pending).await?;

			return Err(InvalidStateError::Expired.into());
		}

		let metadata = self.provider_metadata().await?;

		self.consume_pending(session, &current, &pending).await?;
		machine.advance(CallbackStage::StateValidated);

		let tokens =
			self.facade().exchange_code(&self.config, &metadata.token_endpoint, &code, &pending).await?;

		machine.advance(CallbackStage::CodeExchanged);

		let claims = match &tokens.id_token {
			Some(id_token) => {
				let claims = self.verify_id_token(id_token.expose(), &metadata).await?;

				machine.advance(CallbackStage::IdTokenVerified);

				Some(claims)
			},
			None => {
				machine.advance(CallbackStage::IdTokenAbsent);

				None
			},
		};
		let committed = session::modify_session(self.sessions.as_ref(), session, false, |state| {
			state.tokens = Some(tokens.clone());
			state.claims = claims.clone();
		})
		.await?;

		if committed.is_none() {
			// Session was destroyed (logout) while the code was being exchanged.
			return Err(InvalidStateError::Superseded.into());
		}

		machine.advance(CallbackStage::Complete);

		Ok(CallbackOutcome { tokens, claims })
	}

	async fn consume_pending(
		&self,
		session: &SessionId,
		current: &SessionState,
		pending: &PendingAuthAttempt,
	) -> Result<()> {
		let replacement = SessionState { pending: None, ..current.clone() };

		match self
			.sessions
			.compare_and_swap(session, Some(pending.state.expose()), replacement)
			.await?
		{
			CompareAndSwapOutcome::Updated => Ok(()),
			CompareAndSwapOutcome::PendingMismatch | CompareAndSwapOutcome::Missing =>
				Err(InvalidStateError::Superseded.into()),
		}
	}

	async fn verify_id_token(
		&self,
		token: &str,
		metadata: &ProviderMetadata,
	) -> Result<IdentityClaims, IdTokenVerificationError> {
		let header = id_token::inspect_header(token)?;

		check_advertised_algorithm(&header, metadata)?;

		let key = self
			.key_set()
			.find_key(&self.facade(), &metadata.jwks_uri, header.kid.as_deref())
			.await?;
		let expectations = ClaimExpectations {
			issuer: &metadata.issuer,
			client_id: &self.config.client_id,
			leeway: self.config.clock_leeway,
			max_age: self.config.max_id_token_age,
		};

		id_token::verify_signed(token, &header, &key, &expectations, OffsetDateTime::now_utc())
	}
}

fn callback_parameters(query: CallbackQuery) -> Result<(String, String), InvalidStateError> {
	if let Some(error) = query.error {
		return Err(InvalidStateError::Provider { error, description: query.error_description });
	}

	let code = query.code.filter(|code| !code.is_empty()).ok_or(InvalidStateError::MissingCode)?;
	let state =
		query.state.filter(|state| !state.is_empty()).ok_or(InvalidStateError::MissingState)?;

	Ok((code, state))
}

fn check_advertised_algorithm(
	header: &Header,
	metadata: &ProviderMetadata,
) -> Result<(), IdTokenVerificationError> {
	let alg = id_token::algorithm_name(header.alg);

	match &metadata.id_token_signing_alg_values_supported {
		Some(advertised) if !advertised.iter().any(|value| *value == alg) =>
			Err(IdTokenVerificationError::UnsupportedAlgorithm { alg }),
		_ => Ok(()),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn stages_only_move_forward() {
		use CallbackStage::*;

		assert!(AwaitingCode.can_advance_to(StateValidated));
		assert!(CodeExchanged.can_advance_to(IdTokenAbsent));
		assert!(IdTokenAbsent.can_advance_to(Complete));
		assert!(StateValidated.can_advance_to(Rejected));
		assert!(!AwaitingCode.can_advance_to(CodeExchanged));
		assert!(!StateValidated.can_advance_to(Complete));
		assert!(!Complete.can_advance_to(Rejected));
		assert!(!Rejected.can_advance_to(StateValidated));
	}

	#[test]
	fn provider_errors_take_precedence_over_parameters() {
		let err = callback_parameters(CallbackQuery {
			code: Some("code".into()),
			state: Some("state".into()),
			error: Some("access_denied".into()),
			error_description: Some("User cancelled.".into()),
		})
		.expect_err("Provider error must short-circuit.");

		assert_eq!(
			err,
			InvalidStateError::Provider {
				error: "access_denied".into(),
				description: Some("User cancelled.".into()),
			}
		);
	}

	#[test]
	fn empty_parameters_count_as_missing() {
		assert_eq!(
			callback_parameters(CallbackQuery {
				code: Some(String::new()),
				state: Some("s".into()),
				..Default::default()
			}),
			Err(InvalidStateError::MissingCode)
		);
		assert_eq!(
			callback_parameters(CallbackQuery { code: Some("c".into()), ..Default::default() }),
			Err(InvalidStateError::MissingState)
		);
		assert_eq!(
			callback_parameters(CallbackQuery {
				code: Some("c".into()),
				state: Some("s".into()),
				..Default::default()
			}),
			Ok(("c".into(), "s".into()))
		);
	}
}
