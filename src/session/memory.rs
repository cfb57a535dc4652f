//! Thread-safe in-memory [`SessionStore`] implementation for single-process deployments and tests.

// self
use crate::{
	_prelude::*,
	session::{CompareAndSwapOutcome, SessionFuture, SessionId, SessionState, SessionStore},
};

type SessionMap = Arc<RwLock<HashMap<SessionId, StoredSession>>>;

#[derive(Clone, Debug)]
struct StoredSession {
	state: SessionState,
	written_at: OffsetDateTime,
}

/// Session backend keeping records in-process; records vanish with the process.
///
/// A record not written for longer than the idle TTL reads as absent, and every write prunes
/// such records, so abandoned anonymous sessions do not accumulate.
#[derive(Clone, Debug)]
pub struct MemorySessionStore {
	records: SessionMap,
	idle_ttl: Duration,
}
impl MemorySessionStore {
	/// Idle TTL applied by [`MemorySessionStore::default`].
	pub const DEFAULT_IDLE_TTL: Duration = Duration::hours(24);

	/// Creates a store whose records expire after `idle_ttl` without a write.
	pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
		Self { records: SessionMap::default(), idle_ttl }
	}

	/// Number of live session records.
	pub fn len(&self) -> usize {
		let now = OffsetDateTime::now_utc();

		self.records.read().values().filter(|record| self.is_live(record, now)).count()
	}

	/// Returns true when no live session records exist.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn is_live(&self, record: &StoredSession, now: OffsetDateTime) -> bool {
		now - record.written_at <= self.idle_ttl
	}

	fn prune(&self, records: &mut HashMap<SessionId, StoredSession>, now: OffsetDateTime) {
		records.retain(|_, record| self.is_live(record, now));
	}

	fn cas_now(
		&self,
		id: &SessionId,
		expected_pending_state: Option<&str>,
		replacement: SessionState,
	) -> CompareAndSwapOutcome {
		let now = OffsetDateTime::now_utc();
		let mut guard = self.records.write();

		self.prune(&mut guard, now);

		let outcome = match guard.get(id) {
			Some(existing) if existing.state.pending_state() == expected_pending_state =>
				CompareAndSwapOutcome::Updated,
			Some(_) => CompareAndSwapOutcome::PendingMismatch,
			None => CompareAndSwapOutcome::Missing,
		};

		if matches!(outcome, CompareAndSwapOutcome::Updated) {
			guard.insert(id.to_owned(), StoredSession { state: replacement, written_at: now });
		}

		outcome
	}
}
impl Default for MemorySessionStore {
	fn default() -> Self {
		Self::with_idle_ttl(Self::DEFAULT_IDLE_TTL)
	}
}
impl SessionStore for MemorySessionStore {
	fn load<'a>(&'a self, id: &'a SessionId) -> SessionFuture<'a, Option<SessionState>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();

			Ok(self
				.records
				.read()
				.get(id)
				.filter(|record| self.is_live(record, now))
				.map(|record| record.state.clone()))
		})
	}

	fn save<'a>(&'a self, id: &'a SessionId, state: SessionState) -> SessionFuture<'a, ()> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();
			let mut guard = self.records.write();

			self.prune(&mut guard, now);
			guard.insert(id.to_owned(), StoredSession { state, written_at: now });

			Ok(())
		})
	}

	fn compare_and_swap<'a>(
		&'a self,
		id: &'a SessionId,
		expected_pending_state: Option<&'a str>,
		replacement: SessionState,
	) -> SessionFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move { Ok(self.cas_now(id, expected_pending_state, replacement)) })
	}

	fn destroy<'a>(&'a self, id: &'a SessionId) -> SessionFuture<'a, bool> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();
			let mut guard = self.records.write();
			let existed = guard.remove(id).is_some_and(|record| self.is_live(&record, now));

			self.prune(&mut guard, now);

			Ok(existed)
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{auth::TokenSecret, session::PendingAuthAttempt};

	fn pending(state: &str) -> PendingAuthAttempt {
		PendingAuthAttempt {
			state: TokenSecret::new(state),
			verifier: TokenSecret::new("verifier"),
			redirect_uri: Url::parse("https://app.example.com/callback")
				.expect("Redirect fixture should parse."),
			created_at: OffsetDateTime::now_utc(),
		}
	}

	#[tokio::test]
	async fn compare_and_swap_requires_matching_pending_state() {
		let store = MemorySessionStore::default();
		let id = SessionId::generate();

		assert_eq!(
			store
				.compare_and_swap(&id, None, SessionState::default())
				.await
				.expect("CAS on a missing record should not fail."),
			CompareAndSwapOutcome::Missing
		);

		store
			.save(&id, SessionState { pending: Some(pending("s1")), ..Default::default() })
			.await
			.expect("Saving a session should succeed.");

		assert_eq!(
			store
				.compare_and_swap(&id, Some("other"), SessionState::default())
				.await
				.expect("Mismatched CAS should not fail."),
			CompareAndSwapOutcome::PendingMismatch
		);
		assert_eq!(
			store
				.compare_and_swap(&id, Some("s1"), SessionState::default())
				.await
				.expect("Matching CAS should not fail."),
			CompareAndSwapOutcome::Updated
		);

		let stored = store.load(&id).await.expect("Load should succeed.");

		assert_eq!(stored, Some(SessionState::default()));
	}

	#[tokio::test]
	async fn destroy_reports_whether_a_record_existed() {
		let store = MemorySessionStore::default();
		let id = SessionId::generate();

		store.save(&id, SessionState::default()).await.expect("Saving should succeed.");

		assert_eq!(store.len(), 1);
		assert!(store.destroy(&id).await.expect("Destroy should succeed."));
		assert!(!store.destroy(&id).await.expect("Second destroy should succeed."));
		assert!(store.is_empty());
	}

	#[tokio::test]
	async fn idle_records_read_as_absent_and_are_pruned_on_write() {
		let store = MemorySessionStore::with_idle_ttl(Duration::hours(1));
		let stale = SessionId::generate();
		let fresh = SessionId::generate();

		store
			.save(&stale, SessionState { pending: Some(pending("s1")), ..Default::default() })
			.await
			.expect("Saving a session should succeed.");
		store.save(&fresh, SessionState::default()).await.expect("Saving should succeed.");

		if let Some(record) = store.records.write().get_mut(&stale) {
			record.written_at -= Duration::hours(2);
		}

		assert_eq!(store.len(), 1);
		assert!(store.load(&stale).await.expect("Load should succeed.").is_none());
		assert_eq!(
			store
				.compare_and_swap(&stale, Some("s1"), SessionState::default())
				.await
				.expect("CAS on an idle record should not fail."),
			CompareAndSwapOutcome::Missing
		);
		assert!(!store.records.read().contains_key(&stale), "Writes prune idle records.");
		assert!(store.load(&fresh).await.expect("Load should succeed.").is_some());
	}
}
