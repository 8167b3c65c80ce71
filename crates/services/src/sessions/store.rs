use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use course_core::model::{SessionState, UserId};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Shared handle to one learner's session.
pub type SessionHandle = Arc<AsyncMutex<SessionState>>;

/// In-memory session registry keyed by user.
///
/// Each session sits behind its own async mutex, so events for one user are
/// handled one at a time while different users proceed in parallel.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<UserId, SessionHandle>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn get(&self, user_id: UserId) -> Option<SessionHandle> {
        self.map().get(&user_id).cloned()
    }

    /// Existing session for `user_id`, or a fresh `NotStarted` one.
    #[must_use]
    pub fn get_or_create(&self, user_id: UserId) -> SessionHandle {
        Arc::clone(self.map().entry(user_id).or_default())
    }

    /// Drop the session; the next access starts from scratch.
    ///
    /// Tasks already holding the old handle keep working on the old state, so
    /// only call this when no event for the user can be in flight.
    pub fn delete(&self, user_id: UserId) -> Option<SessionHandle> {
        self.map().remove(&user_id)
    }

    /// Wait for exclusive access to the user's session.
    pub async fn lock(&self, user_id: UserId) -> OwnedMutexGuard<SessionState> {
        self.get_or_create(user_id).lock_owned().await
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{Mode, MessageId};
    use std::time::Duration;

    #[tokio::test]
    async fn get_or_create_returns_the_same_session() {
        let store = SessionStore::new();
        let user = UserId::new(1);

        store.lock(user).await.messages_mut().push(MessageId::new(5));
        let again = store.get_or_create(user);
        assert_eq!(again.lock().await.messages().len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn delete_forgets_the_session() {
        let store = SessionStore::new();
        let user = UserId::new(1);
        store.lock(user).await.messages_mut().push(MessageId::new(5));

        assert!(store.delete(user).is_some());
        assert!(store.get(user).is_none());
        let fresh = store.lock(user).await;
        assert_eq!(fresh.mode(), Mode::NotStarted);
        assert!(fresh.messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn second_locker_waits_for_the_first() {
        let store = Arc::new(SessionStore::new());
        let user = UserId::new(3);
        let guard = store.lock(user).await;

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut state = store.lock(user).await;
                state.messages_mut().push(MessageId::new(2));
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
        assert_eq!(store.lock(user).await.messages().len(), 1);
    }
}
