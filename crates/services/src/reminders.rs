use std::sync::Arc;

use chrono::Duration;
use course_core::Clock;
use storage::repository::UserRecordRepository;

use crate::ephemeral::EphemeralMessages;
use crate::error::{ReminderError, TransportError};
use crate::render;
use crate::sessions::SessionStore;
use crate::transport::Transport;

/// Inactivity, in days, before a learner is nudged.
pub const DEFAULT_INACTIVITY_DAYS: i64 = 3;

/// Summary of one reminder pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReminderReport {
    pub sent: usize,
    pub unreachable: usize,
    pub failed: usize,
}

/// Nudges learners who left the course part-way through.
#[derive(Clone)]
pub struct ReminderService {
    users: Arc<dyn UserRecordRepository>,
    sessions: Arc<SessionStore>,
    transport: Arc<dyn Transport>,
    messages: EphemeralMessages,
    clock: Clock,
    inactivity_days: i64,
}

impl ReminderService {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserRecordRepository>,
        sessions: Arc<SessionStore>,
        transport: Arc<dyn Transport>,
        clock: Clock,
    ) -> Self {
        Self {
            users,
            sessions,
            messages: EphemeralMessages::new(Arc::clone(&transport)),
            transport,
            clock,
            inactivity_days: DEFAULT_INACTIVITY_DAYS,
        }
    }

    #[must_use]
    pub fn with_inactivity_days(mut self, days: i64) -> Self {
        self.inactivity_days = days;
        self
    }

    /// Send one reminder to every learner idle for longer than the threshold.
    ///
    /// When the learner still has a live session the reminder is recorded in
    /// its message history, so the next navigation clears it like any other
    /// prompt. No session is created for learners who have none.
    ///
    /// # Errors
    ///
    /// Returns `ReminderError::Storage` if idle learners cannot be listed.
    pub async fn run_once(&self) -> Result<ReminderReport, ReminderError> {
        let now = self.clock.now();
        let cutoff = now - Duration::days(self.inactivity_days);
        let idle = self.users.inactive_since(cutoff).await?;
        let mut report = ReminderReport::default();

        for record in idle {
            let user_id = record.user_id;
            let days_away = self.clock.days_since(record.last_activity);
            let message = render::reminder(days_away);
            // Offline learners have no session and nothing to track.
            let mut state = match self.sessions.get(user_id) {
                Some(handle) => Some(handle.lock_owned().await),
                None => None,
            };

            match self.transport.send(user_id, &message).await {
                Ok(message_id) => {
                    if let Some(state) = state.as_mut() {
                        self.messages.record_sent(state, message_id);
                    }
                    report.sent += 1;
                }
                Err(TransportError::Unreachable) => {
                    tracing::info!(%user_id, "user blocked the bot; skipping reminder");
                    report.unreachable += 1;
                }
                Err(err) => {
                    tracing::warn!(%user_id, error = %err, "failed to send reminder");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            sent = report.sent,
            unreachable = report.unreachable,
            failed = report.failed,
            "reminder pass finished"
        );
        Ok(report)
    }
}
