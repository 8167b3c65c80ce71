//! Tracks the bot messages a learner can see so stale screens can be removed.

use std::sync::Arc;

use course_core::model::{MessageId, SessionState, UserId};

use crate::transport::{DeleteOutcome, Transport};

/// Keeps a session's message history in step with the chat.
///
/// Deletion is best effort: an id leaves the history before the delete is
/// attempted, so a failed delete never resurrects it.
#[derive(Clone)]
pub struct EphemeralMessages {
    transport: Arc<dyn Transport>,
}

impl EphemeralMessages {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Remember a message that was just delivered.
    pub fn record_sent(&self, state: &mut SessionState, message_id: MessageId) {
        state.messages_mut().push(message_id);
    }

    /// Remove the most recent message, if any.
    pub async fn delete_last(
        &self,
        user_id: UserId,
        state: &mut SessionState,
    ) -> Option<MessageId> {
        let message_id = state.messages_mut().pop()?;
        self.delete_quietly(user_id, message_id).await;
        Some(message_id)
    }

    /// Remove every tracked message, oldest first. Returns how many were deleted.
    pub async fn clear_all(&self, user_id: UserId, state: &mut SessionState) -> usize {
        let ids = state.messages_mut().take_all();
        let mut deleted = 0;
        for message_id in ids {
            if self.delete_quietly(user_id, message_id).await {
                deleted += 1;
            }
        }
        deleted
    }

    async fn delete_quietly(&self, user_id: UserId, message_id: MessageId) -> bool {
        match self.transport.delete(user_id, message_id).await {
            Ok(DeleteOutcome::Deleted) => true,
            Ok(DeleteOutcome::NotFound) => {
                tracing::debug!(%user_id, %message_id, "message already gone");
                false
            }
            Err(err) => {
                tracing::warn!(%user_id, %message_id, error = %err, "failed to delete message");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{InMemoryTransport, OutgoingMessage};

    async fn sent(transport: &InMemoryTransport, user: UserId, n: usize) -> Vec<MessageId> {
        let mut ids = Vec::new();
        for i in 0..n {
            let id = transport
                .send(user, &OutgoingMessage::text(format!("m{i}")))
                .await
                .unwrap();
            ids.push(id);
        }
        ids
    }

    #[tokio::test]
    async fn clear_all_empties_history_even_when_some_are_gone() {
        let transport = InMemoryTransport::new();
        let messages = EphemeralMessages::new(Arc::new(transport.clone()));
        let user = UserId::new(1);
        let mut state = SessionState::new();

        let ids = sent(&transport, user, 3).await;
        for id in &ids {
            messages.record_sent(&mut state, *id);
        }
        // Already removed by the user.
        transport.delete(user, ids[1]).await.unwrap();

        assert_eq!(messages.clear_all(user, &mut state).await, 2);
        assert!(state.messages().is_empty());
        assert!(transport.visible_to(user).is_empty());
    }

    #[tokio::test]
    async fn delete_last_pops_only_the_newest() {
        let transport = InMemoryTransport::new();
        let messages = EphemeralMessages::new(Arc::new(transport.clone()));
        let user = UserId::new(1);
        let mut state = SessionState::new();

        let ids = sent(&transport, user, 2).await;
        for id in &ids {
            messages.record_sent(&mut state, *id);
        }

        assert_eq!(messages.delete_last(user, &mut state).await, Some(ids[1]));
        assert_eq!(state.messages().as_slice(), &[ids[0]]);
        assert!(transport.is_deleted(ids[1]));
        assert!(!transport.is_deleted(ids[0]));
    }

    #[tokio::test]
    async fn delete_last_on_empty_history_is_a_no_op() {
        let transport = InMemoryTransport::new();
        let messages = EphemeralMessages::new(Arc::new(transport));
        let mut state = SessionState::new();

        assert_eq!(messages.delete_last(UserId::new(1), &mut state).await, None);
        assert_eq!(messages.clear_all(UserId::new(1), &mut state).await, 0);
    }
}
