//! Outbound chat surface and an in-memory implementation for tests and dry runs.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use course_core::model::{MediaRef, MessageId, UserId};

use crate::error::TransportError;
use crate::events::FlowEvent;

//
// ─── MESSAGES ──────────────────────────────────────────────────────────────────
//

/// A button shown under a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Affordance {
    pub label: String,
    pub event: FlowEvent,
}

impl Affordance {
    #[must_use]
    pub fn new(label: impl Into<String>, event: FlowEvent) -> Self {
        Self {
            label: label.into(),
            event,
        }
    }
}

/// One message to deliver. Affordances are laid out row by row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutgoingMessage {
    pub text: String,
    pub media: Option<MediaRef>,
    pub affordances: Vec<Vec<Affordance>>,
}

impl OutgoingMessage {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_media(mut self, media: MediaRef) -> Self {
        self.media = Some(media);
        self
    }

    #[must_use]
    pub fn with_row(mut self, row: Vec<Affordance>) -> Self {
        if !row.is_empty() {
            self.affordances.push(row);
        }
        self
    }

    /// Every event reachable from this message's buttons.
    pub fn events(&self) -> impl Iterator<Item = FlowEvent> + '_ {
        self.affordances.iter().flatten().map(|a| a.event)
    }
}

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The message was already gone.
    NotFound,
}

//
// ─── TRANSPORT ─────────────────────────────────────────────────────────────────
//

/// Chat platform operations used by the flow.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a message and return its platform id.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` when the platform rejects or cannot receive it.
    async fn send(
        &self,
        user_id: UserId,
        message: &OutgoingMessage,
    ) -> Result<MessageId, TransportError>;

    /// Remove a previously sent message.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` for failures other than the message being gone.
    async fn delete(
        &self,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<DeleteOutcome, TransportError>;

    /// Acknowledge a button press so the client stops its spinner.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the acknowledgement is rejected.
    async fn answer_event(&self, ack: &str) -> Result<(), TransportError>;
}

//
// ─── IN-MEMORY TRANSPORT ───────────────────────────────────────────────────────
//

/// A delivered message as the in-memory transport saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub user_id: UserId,
    pub message_id: MessageId,
    pub message: OutgoingMessage,
}

#[derive(Debug, Default)]
struct Ledger {
    next_id: i64,
    sent: Vec<SentMessage>,
    deleted: HashSet<MessageId>,
    acks: Vec<String>,
    failing_sends: usize,
    reject_media: bool,
    unreachable: HashSet<UserId>,
}

/// Transport that records traffic instead of talking to a platform.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransport {
    inner: Arc<Mutex<Ledger>>,
}

impl InMemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, Ledger> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `count` sends with a connection error.
    pub fn fail_next_sends(&self, count: usize) {
        self.ledger().failing_sends = count;
    }

    /// Reject every message that carries media.
    pub fn reject_media(&self, reject: bool) {
        self.ledger().reject_media = reject;
    }

    /// Treat `user_id` as having blocked the bot.
    pub fn mark_unreachable(&self, user_id: UserId) {
        self.ledger().unreachable.insert(user_id);
    }

    /// Everything delivered to `user_id`, deleted or not.
    #[must_use]
    pub fn sent_to(&self, user_id: UserId) -> Vec<SentMessage> {
        self.ledger()
            .sent
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Messages `user_id` can still see, oldest first.
    #[must_use]
    pub fn visible_to(&self, user_id: UserId) -> Vec<SentMessage> {
        let ledger = self.ledger();
        ledger
            .sent
            .iter()
            .filter(|m| m.user_id == user_id && !ledger.deleted.contains(&m.message_id))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn is_deleted(&self, message_id: MessageId) -> bool {
        self.ledger().deleted.contains(&message_id)
    }

    #[must_use]
    pub fn acks(&self) -> Vec<String> {
        self.ledger().acks.clone()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(
        &self,
        user_id: UserId,
        message: &OutgoingMessage,
    ) -> Result<MessageId, TransportError> {
        let mut ledger = self.ledger();
        if ledger.unreachable.contains(&user_id) {
            return Err(TransportError::Unreachable);
        }
        if ledger.failing_sends > 0 {
            ledger.failing_sends -= 1;
            return Err(TransportError::Connection("simulated outage".into()));
        }
        if ledger.reject_media && message.media.is_some() {
            return Err(TransportError::Media("simulated media rejection".into()));
        }
        ledger.next_id += 1;
        let message_id = MessageId::new(ledger.next_id);
        ledger.sent.push(SentMessage {
            user_id,
            message_id,
            message: message.clone(),
        });
        Ok(message_id)
    }

    async fn delete(
        &self,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<DeleteOutcome, TransportError> {
        let mut ledger = self.ledger();
        let known = ledger
            .sent
            .iter()
            .any(|m| m.user_id == user_id && m.message_id == message_id);
        if !known || !ledger.deleted.insert(message_id) {
            return Ok(DeleteOutcome::NotFound);
        }
        Ok(DeleteOutcome::Deleted)
    }

    async fn answer_event(&self, ack: &str) -> Result<(), TransportError> {
        self.ledger().acks.push(ack.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deleting_twice_reports_not_found() {
        let transport = InMemoryTransport::new();
        let user = UserId::new(7);
        let id = transport
            .send(user, &OutgoingMessage::text("hello"))
            .await
            .unwrap();

        assert_eq!(transport.delete(user, id).await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(transport.delete(user, id).await.unwrap(), DeleteOutcome::NotFound);
        assert!(transport.visible_to(user).is_empty());
        assert_eq!(transport.sent_to(user).len(), 1);
    }

    #[tokio::test]
    async fn another_users_message_cannot_be_deleted() {
        let transport = InMemoryTransport::new();
        let id = transport
            .send(UserId::new(1), &OutgoingMessage::text("mine"))
            .await
            .unwrap();

        let outcome = transport.delete(UserId::new(2), id).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::NotFound);
        assert!(!transport.is_deleted(id));
    }

    #[test]
    fn empty_rows_are_not_added() {
        let message = OutgoingMessage::text("x")
            .with_row(Vec::new())
            .with_row(vec![Affordance::new("Next", FlowEvent::Next)]);
        assert_eq!(message.affordances.len(), 1);
        assert_eq!(message.events().collect::<Vec<_>>(), vec![FlowEvent::Next]);
    }
}
