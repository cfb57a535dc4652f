//! Typed session state and the storage contract that binds login attempts to browser sessions.

pub mod memory;

pub use memory::MemorySessionStore;

// self
use crate::{
	_prelude::*,
	auth::{IdentityClaims, TokenSecret, TokenSet},
	flows::pkce,
};

/// Boxed future returned by [`SessionStore`] operations.
pub type SessionFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, SessionStoreError>> + 'a + Send>>;

/// Compare-and-swap attempts made before a contended update gives up.
const MAX_CAS_ATTEMPTS: usize = 8;

/// Storage backend contract for per-browser session records.
///
/// Records are keyed by [`SessionId`]; the session cookie carries only the identifier.
/// [`SessionStore::compare_and_swap`] is the sole primitive used for updates that must not
/// lose a concurrent login or callback, so backends must implement it atomically.
pub trait SessionStore
where
	Self: Send + Sync,
{
	/// Fetches the record for `id`, if present.
	fn load<'a>(&'a self, id: &'a SessionId) -> SessionFuture<'a, Option<SessionState>>;

	/// Creates or replaces the record for `id` unconditionally.
	fn save<'a>(&'a self, id: &'a SessionId, state: SessionState) -> SessionFuture<'a, ()>;

	/// Replaces the record only if its pending attempt state equals `expected_pending_state`.
	///
	/// `None` expects a record with no pending attempt. Absent records are never created.
	fn compare_and_swap<'a>(
		&'a self,
		id: &'a SessionId,
		expected_pending_state: Option<&'a str>,
		replacement: SessionState,
	) -> SessionFuture<'a, CompareAndSwapOutcome>;

	/// Removes the record; returns whether one existed.
	fn destroy<'a>(&'a self, id: &'a SessionId) -> SessionFuture<'a, bool>;
}

/// Result of a pending-state compare-and-swap attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The pending state matched the expectation and the record was replaced.
	Updated,
	/// The record exists but its pending state differs from the expectation.
	PendingMismatch,
	/// No record exists for the session.
	Missing,
}

/// Error type produced by [`SessionStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum SessionStoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// Concurrent writers kept invalidating the update.
	#[error("Session update lost {attempts} compare-and-swap races.")]
	Contention {
		/// Attempts made before giving up.
		attempts: usize,
	},
}

/// Error returned when a session identifier fails validation.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum SessionIdError {
	/// Identifier has the wrong length.
	#[error("Session identifier must be {expected} characters.")]
	Length {
		/// Required character count.
		expected: usize,
	},
	/// Identifier uses characters outside the URL-safe base64 alphabet.
	#[error("Session identifier contains invalid characters.")]
	Alphabet,
}

/// Opaque session identifier: 32 random bytes, base64url without padding.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);
impl SessionId {
	const LEN: usize = 43;

	/// Generates a fresh identifier from the thread-local CSPRNG.
	pub fn generate() -> Self {
		Self(pkce::random_token())
	}

	/// Parses an identifier received from a cookie.
	pub fn parse(value: impl AsRef<str>) -> Result<Self, SessionIdError> {
		let view = value.as_ref();

		if view.len() != Self::LEN {
			return Err(SessionIdError::Length { expected: Self::LEN });
		}
		if !view.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_') {
			return Err(SessionIdError::Alphabet);
		}

		Ok(Self(view.to_owned()))
	}

	/// Returns the identifier as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for SessionId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl From<SessionId> for String {
	fn from(value: SessionId) -> Self {
		value.0
	}
}
impl TryFrom<String> for SessionId {
	type Error = SessionIdError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::parse(value)
	}
}
impl FromStr for SessionId {
	type Err = SessionIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}
impl Debug for SessionId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		// Only a prefix; the full value is a bearer credential for the session.
		write!(f, "SessionId({}…)", &self.0[..6.min(self.0.len())])
	}
}
impl Display for SessionId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Per-attempt secrets stashed between `/login` and `/callback`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthAttempt {
	/// Anti-forgery state round-tripped through the provider.
	pub state: TokenSecret,
	/// PKCE code verifier; sent only to the token endpoint.
	pub verifier: TokenSecret,
	/// Redirect URI used to start the attempt; reused verbatim in the code exchange.
	pub redirect_uri: Url,
	/// Instant the attempt was created.
	pub created_at: OffsetDateTime,
}
impl PendingAuthAttempt {
	/// Returns true once the attempt is older than `max_age` at `now`.
	pub fn is_expired_at(&self, now: OffsetDateTime, max_age: Duration) -> bool {
		now - self.created_at > max_age
	}
}

/// Typed session record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
	/// Most recent login attempt awaiting its callback.
	pub pending: Option<PendingAuthAttempt>,
	/// Tokens from the last successful login.
	pub tokens: Option<TokenSet>,
	/// Verified identity from the last successful login.
	pub claims: Option<IdentityClaims>,
}
impl SessionState {
	/// State value of the pending attempt, used as the compare-and-swap expectation.
	pub fn pending_state(&self) -> Option<&str> {
		self.pending.as_ref().map(|pending| pending.state.expose())
	}

	/// Returns true when verified claims are attached.
	pub fn is_authenticated(&self) -> bool {
		self.claims.is_some()
	}
}

/// Applies `apply` to the stored record using compare-and-swap on the pending state.
///
/// Missing records are created from [`SessionState::default`] when `create` is set; otherwise
/// `Ok(None)` is returned without writing. The closure may run more than once.
pub(crate) async fn modify_session<F>(
	store: &dyn SessionStore,
	id: &SessionId,
	create: bool,
	mut apply: F,
) -> Result<Option<SessionState>, SessionStoreError>
where
	F: FnMut(&mut SessionState),
{
	for _ in 0..MAX_CAS_ATTEMPTS {
		let Some(current) = store.load(id).await? else {
			if !create {
				return Ok(None);
			}

			let mut next = SessionState::default();

			apply(&mut next);
			store.save(id, next.clone()).await?;

			return Ok(Some(next));
		};
		let mut next = current.clone();

		apply(&mut next);

		match store.compare_and_swap(id, current.pending_state(), next.clone()).await? {
			CompareAndSwapOutcome::Updated => return Ok(Some(next)),
			CompareAndSwapOutcome::PendingMismatch | CompareAndSwapOutcome::Missing => continue,
		}
	}

	Err(SessionStoreError::Contention { attempts: MAX_CAS_ATTEMPTS })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn generated_ids_parse_back() {
		let id = SessionId::generate();

		assert_eq!(SessionId::parse(id.as_str()), Ok(id.clone()));
		assert_ne!(SessionId::generate(), id);
		assert!(!format!("{id:?}").contains(id.as_str()));
	}

	#[test]
	fn pending_attempts_expire_after_max_age() {
		let now = OffsetDateTime::now_utc();
		let attempt = PendingAuthAttempt {
			state: TokenSecret::new("state"),
			verifier: TokenSecret::new("verifier"),
			redirect_uri: Url::parse("https://app.example.com/callback")
				.expect("Redirect fixture should parse."),
			created_at: now - Duration::minutes(11),
		};

		assert!(attempt.is_expired_at(now, Duration::minutes(10)));
		assert!(!attempt.is_expired_at(now, Duration::minutes(15)));
	}

	#[test]
	fn parse_rejects_foreign_values() {
		assert_eq!(SessionId::parse("short"), Err(SessionIdError::Length { expected: 43 }));
		assert_eq!(
			SessionId::parse("a".repeat(42) + "="),
			Err(SessionIdError::Alphabet)
		);
	}

	#[test]
	fn session_error_converts_into_crate_error_with_source() {
		let store_error = SessionStoreError::Backend { message: "database unreachable".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Session(_)));
		assert!(error.to_string().contains("database unreachable"));

		let source = StdError::source(&error).expect("Crate error should expose the store error.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[tokio::test]
	async fn modify_session_creates_only_when_asked() {
		let store = MemorySessionStore::default();
		let id = SessionId::generate();
		let untouched = modify_session(&store, &id, false, |_| {})
			.await
			.expect("Modifying a missing session should not fail.");

		assert!(untouched.is_none());
		assert!(store.load(&id).await.expect("Load should succeed.").is_none());

		let created = modify_session(&store, &id, true, |state| state.claims = None)
			.await
			.expect("Creating a session should succeed.");

		assert_eq!(created, Some(SessionState::default()));
		assert!(store.load(&id).await.expect("Load should succeed.").is_some());
	}
}
