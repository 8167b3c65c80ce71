use std::sync::Arc;
use std::time::Duration;

use course_core::model::{Cursor, MessageId, Mode, Sequence, SessionState, UserId};
use course_core::{Clock, ProgressEngine, ProgressError, Step};
use storage::repository::{UserProfile, UserRecordRepository};

use crate::ephemeral::EphemeralMessages;
use crate::error::{FlowError, TransportError};
use crate::events::{FlowEvent, InboundEvent, InboundPayload};
use crate::render::{self, BlockContext};
use crate::sessions::SessionStore;
use crate::transport::{OutgoingMessage, Transport};

/// Pause between quiz feedback and the offer to move on.
pub const DEFAULT_CONTINUE_DELAY: Duration = Duration::from_millis(1500);

/// Minimum absence, in whole days, that earns a welcome-back note.
pub const DEFAULT_WELCOME_BACK_DAYS: i64 = 2;

//
// ─── DEFERRED CONTINUATION ─────────────────────────────────────────────────────
//

/// Snapshot taken when quiz feedback is sent. The continue prompt is only
/// rendered if the session still looks exactly like this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Continuation {
    user_id: UserId,
    mode: Mode,
    cursor: Cursor,
    anchor: MessageId,
}

impl Continuation {
    fn capture(user_id: UserId, state: &SessionState, anchor: MessageId) -> Self {
        Self {
            user_id,
            mode: state.mode(),
            cursor: state.cursor(),
            anchor,
        }
    }

    fn still_current(&self, state: &SessionState) -> bool {
        state.mode() == self.mode
            && state.cursor() == self.cursor
            && state.messages().last() == Some(self.anchor)
    }
}

//
// ─── ORCHESTRATOR ──────────────────────────────────────────────────────────────
//

/// Routes inbound events through the progress engine and keeps the chat in
/// step with the resulting session.
///
/// Every event for a user runs under that user's session lock, including the
/// delayed continuation after a quiz answer.
#[derive(Clone)]
pub struct FlowOrchestrator {
    engine: ProgressEngine,
    sessions: Arc<SessionStore>,
    transport: Arc<dyn Transport>,
    messages: EphemeralMessages,
    users: Arc<dyn UserRecordRepository>,
    clock: Clock,
    continue_delay: Duration,
    welcome_back_days: i64,
}

impl FlowOrchestrator {
    #[must_use]
    pub fn new(
        engine: ProgressEngine,
        sessions: Arc<SessionStore>,
        transport: Arc<dyn Transport>,
        users: Arc<dyn UserRecordRepository>,
        clock: Clock,
    ) -> Self {
        Self {
            engine,
            sessions,
            messages: EphemeralMessages::new(Arc::clone(&transport)),
            transport,
            users,
            clock,
            continue_delay: DEFAULT_CONTINUE_DELAY,
            welcome_back_days: DEFAULT_WELCOME_BACK_DAYS,
        }
    }

    #[must_use]
    pub fn with_continue_delay(mut self, delay: Duration) -> Self {
        self.continue_delay = delay;
        self
    }

    #[must_use]
    pub fn with_welcome_back_days(mut self, days: i64) -> Self {
        self.welcome_back_days = days;
        self
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    #[must_use]
    pub fn engine(&self) -> &ProgressEngine {
        &self.engine
    }

    /// Handle one inbound event to completion. Failures are reported to the
    /// learner or logged, never returned.
    #[tracing::instrument(skip_all, fields(user_id = %event.user_id))]
    pub async fn handle(&self, event: InboundEvent) {
        let InboundEvent {
            user_id,
            profile,
            ack,
            payload,
        } = event;

        if let Some(ack) = ack.as_deref() {
            if let Err(err) = self.transport.answer_event(ack).await {
                tracing::debug!(error = %err, "failed to acknowledge event");
            }
        }

        let mut state = self.sessions.lock(user_id).await;
        let action = match payload {
            InboundPayload::Action(FlowEvent::Reset) => {
                self.reset(user_id, &mut state).await;
                return;
            }
            InboundPayload::Action(action) => action,
            InboundPayload::Unrecognized => {
                self.deliver_or_log(user_id, &mut state, &render::use_buttons())
                    .await;
                return;
            }
        };

        tracing::debug!(%action, mode = ?state.mode(), cursor = ?state.cursor(), "handling event");
        if let Err(err) = self.dispatch(user_id, &profile, action, &mut state).await {
            self.recover(user_id, &mut state, err).await;
        }
    }

    async fn dispatch(
        &self,
        user_id: UserId,
        profile: &UserProfile,
        action: FlowEvent,
        state: &mut SessionState,
    ) -> Result<(), FlowError> {
        match action {
            FlowEvent::Start | FlowEvent::Restart => self.start(user_id, profile, state).await,
            FlowEvent::Next => self.next(user_id, profile, state).await,
            FlowEvent::Prev => self.prev(user_id, state).await,
            FlowEvent::StartFinalTest => self.start_final_test(user_id, state).await,
            FlowEvent::AnswerQuiz {
                question_index,
                option_index,
            } => {
                self.answer(user_id, state, question_index, option_index)
                    .await
            }
            FlowEvent::Reset => Err(ProgressError::BoundaryViolation.into()),
        }
    }

    //
    // ─── ACTIONS ───────────────────────────────────────────────────────────────
    //

    async fn start(
        &self,
        user_id: UserId,
        profile: &UserProfile,
        state: &mut SessionState,
    ) -> Result<(), FlowError> {
        let mut outgoing = self.greeting(user_id, profile).await;
        self.engine.start(state);
        if let Some(presentation) = self.engine.catalog().presentation() {
            outgoing.push(render::presentation(presentation));
        }
        outgoing.extend(self.current_messages(state)?);

        tracing::info!(%user_id, "course started");
        self.show(user_id, state, outgoing).await?;
        self.persist_cursor(user_id, state).await;
        Ok(())
    }

    async fn next(
        &self,
        user_id: UserId,
        profile: &UserProfile,
        state: &mut SessionState,
    ) -> Result<(), FlowError> {
        if state.mode() == Mode::NotStarted {
            return self.resume(user_id, profile, state).await;
        }

        let mut finished = false;
        let outgoing = match self.engine.advance(state)? {
            Step::Block(_) => self.current_messages(state)?,
            Step::CourseCompleted => {
                tracing::info!(%user_id, "course completed");
                vec![render::course_completed(&self.engine.stats(state))]
            }
            Step::FinalTestCompleted => {
                let stats = self.engine.stats(state);
                tracing::info!(
                    %user_id,
                    score = stats.final_score,
                    total = stats.final_total,
                    "final test completed"
                );
                finished = true;
                vec![render::final_results(&stats)]
            }
        };

        self.show(user_id, state, outgoing).await?;
        if finished {
            self.mark_completed(user_id).await;
        } else {
            self.persist_cursor(user_id, state).await;
        }
        Ok(())
    }

    /// Pick up a session lost to a process restart from the stored resume point.
    async fn resume(
        &self,
        user_id: UserId,
        profile: &UserProfile,
        state: &mut SessionState,
    ) -> Result<(), FlowError> {
        let record = match self
            .users
            .get_or_create(user_id, profile, self.clock.now())
            .await
        {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(%user_id, error = %err, "cannot load user record");
                return Err(ProgressError::NoActiveSession.into());
            }
        };
        if record.resume_cursor == 0 {
            return Err(ProgressError::NoActiveSession.into());
        }

        let cursor = usize::try_from(record.resume_cursor).unwrap_or(usize::MAX);
        self.engine.resume(state, cursor);
        let mut outgoing = Vec::new();
        let days_away = self.clock.days_since(record.last_activity);
        if days_away >= self.welcome_back_days {
            outgoing.push(render::welcome_back(days_away));
        }
        outgoing.extend(self.current_messages(state)?);

        tracing::info!(%user_id, cursor, "resumed from stored cursor");
        self.show(user_id, state, outgoing).await
    }

    async fn prev(&self, user_id: UserId, state: &mut SessionState) -> Result<(), FlowError> {
        if state.mode() == Mode::NotStarted {
            return Err(ProgressError::NoActiveSession.into());
        }
        if self.engine.retreat(state).is_none() {
            return Err(ProgressError::BoundaryViolation.into());
        }

        let outgoing = self.current_messages(state)?;
        self.show(user_id, state, outgoing).await?;
        self.persist_cursor(user_id, state).await;
        Ok(())
    }

    async fn start_final_test(
        &self,
        user_id: UserId,
        state: &mut SessionState,
    ) -> Result<(), FlowError> {
        if state.mode() == Mode::NotStarted {
            return Err(ProgressError::NoActiveSession.into());
        }
        if !state.is_course_completed() {
            return Err(ProgressError::BoundaryViolation.into());
        }

        if self.engine.start_final_test(state).is_none() {
            return Err(ProgressError::ContentLookup {
                sequence: Sequence::FinalTest,
                index: 0,
            }
            .into());
        }
        let catalog = self.engine.catalog();
        let mut outgoing = vec![render::final_test_intro(
            catalog.final_test_intro(),
            catalog.final_test().len(),
        )];
        outgoing.extend(self.current_messages(state)?);

        tracing::info!(%user_id, questions = catalog.final_test().len(), "final test started");
        self.show(user_id, state, outgoing).await
    }

    async fn answer(
        &self,
        user_id: UserId,
        state: &mut SessionState,
        question_index: usize,
        option_index: usize,
    ) -> Result<(), FlowError> {
        let outcome = self
            .engine
            .answer_quiz(state, question_index, option_index)?;
        tracing::debug!(%user_id, question_index, correct = outcome.is_correct, "quiz answered");
        let feedback = render::answer_feedback(&outcome);

        // The answered prompt is the newest message.
        self.messages.delete_last(user_id, state).await;
        let anchor = self.deliver(user_id, state, &feedback).await?;
        self.schedule_continuation(Continuation::capture(user_id, state, anchor));
        Ok(())
    }

    /// Wipe the session in place. The store entry stays, so events already
    /// queued on this user's lock see the fresh state.
    async fn reset(&self, user_id: UserId, state: &mut SessionState) {
        self.messages.clear_all(user_id, state).await;
        self.engine.reset(state);

        if let Err(err) = self.users.update_cursor(user_id, 0, self.clock.now()).await {
            tracing::debug!(%user_id, error = %err, "no stored cursor to clear");
        }
        tracing::info!(%user_id, "session reset");

        self.deliver_or_log(user_id, state, &render::reset_done())
            .await;
    }

    //
    // ─── CONTINUATION ──────────────────────────────────────────────────────────
    //

    fn schedule_continuation(&self, pending: Continuation) {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.continue_delay).await;
            this.offer_continue(pending).await;
        });
    }

    async fn offer_continue(&self, pending: Continuation) {
        let mut state = self.sessions.lock(pending.user_id).await;
        if !pending.still_current(&state) {
            tracing::debug!(user_id = %pending.user_id, "session moved on; skipping continue prompt");
            return;
        }
        self.deliver_or_log(pending.user_id, &mut state, &render::continue_prompt())
            .await;
    }

    //
    // ─── RENDERING AND DELIVERY ────────────────────────────────────────────────
    //

    async fn greeting(&self, user_id: UserId, profile: &UserProfile) -> Vec<OutgoingMessage> {
        match self
            .users
            .get_or_create(user_id, profile, self.clock.now())
            .await
        {
            Ok(record) => {
                let days_away = self.clock.days_since(record.last_activity);
                if record.resume_cursor > 0 && days_away >= self.welcome_back_days {
                    vec![render::welcome_back(days_away)]
                } else {
                    Vec::new()
                }
            }
            Err(err) => {
                tracing::warn!(%user_id, error = %err, "cannot load user record");
                Vec::new()
            }
        }
    }

    /// Messages for the block under the cursor.
    fn current_messages(&self, state: &SessionState) -> Result<Vec<OutgoingMessage>, FlowError> {
        let block = self.engine.resolve_current(state)?;
        let sequence = state.mode().active_sequence().unwrap_or(Sequence::Course);
        let index = state.cursor().index().unwrap_or(0);
        let numbering = (sequence == Sequence::FinalTest)
            .then(|| (index + 1, self.engine.catalog().final_test().len()));
        let ctx = BlockContext {
            question_index: self.engine.question_index(sequence, index),
            can_retreat: self.engine.can_retreat(state),
            numbering,
        };
        Ok(render::block(block, ctx))
    }

    /// Replace whatever the learner currently sees with `outgoing`.
    async fn show(
        &self,
        user_id: UserId,
        state: &mut SessionState,
        outgoing: Vec<OutgoingMessage>,
    ) -> Result<(), FlowError> {
        self.messages.clear_all(user_id, state).await;
        for message in &outgoing {
            self.deliver(user_id, state, message).await?;
        }
        Ok(())
    }

    /// Send one message and record it. Rejected media degrades to plain text
    /// with the same buttons.
    async fn deliver(
        &self,
        user_id: UserId,
        state: &mut SessionState,
        message: &OutgoingMessage,
    ) -> Result<MessageId, TransportError> {
        let message_id = match self.transport.send(user_id, message).await {
            Ok(id) => id,
            Err(TransportError::Media(reason)) if message.media.is_some() => {
                tracing::warn!(%user_id, %reason, "media rejected; sending text instead");
                self.transport
                    .send(user_id, &render::media_unavailable(message))
                    .await?
            }
            Err(err) => return Err(err),
        };
        self.messages.record_sent(state, message_id);
        Ok(message_id)
    }

    async fn deliver_or_log(
        &self,
        user_id: UserId,
        state: &mut SessionState,
        message: &OutgoingMessage,
    ) {
        if let Err(err) = self.deliver(user_id, state, message).await {
            tracing::warn!(%user_id, error = %err, "failed to deliver message");
        }
    }

    async fn persist_cursor(&self, user_id: UserId, state: &SessionState) {
        let cursor = match (state.mode(), state.cursor()) {
            (Mode::InCourse, Cursor::At(index)) => index,
            (Mode::InCourse, Cursor::AfterLast) => self.engine.catalog().blocks().len(),
            _ => return,
        };
        let cursor = u32::try_from(cursor).unwrap_or(u32::MAX);
        if let Err(err) = self
            .users
            .update_cursor(user_id, cursor, self.clock.now())
            .await
        {
            tracing::debug!(%user_id, error = %err, "failed to store resume cursor");
        }
    }

    /// Finished learners drop out of inactivity reminders.
    async fn mark_completed(&self, user_id: UserId) {
        if let Err(err) = self.users.mark_completed(user_id, self.clock.now()).await {
            tracing::debug!(%user_id, error = %err, "failed to store completion");
        }
    }

    //
    // ─── RECOVERY ──────────────────────────────────────────────────────────────
    //

    async fn recover(&self, user_id: UserId, state: &mut SessionState, err: FlowError) {
        match err {
            FlowError::Progress(ProgressError::BoundaryViolation | ProgressError::StaleAnswer) => {
                tracing::debug!(%user_id, error = %err, "ignoring event");
            }
            FlowError::Progress(ProgressError::NoActiveSession) => {
                self.deliver_or_log(user_id, state, &render::please_start())
                    .await;
            }
            FlowError::Progress(ref lookup @ ProgressError::ContentLookup { .. }) => {
                tracing::error!(%user_id, error = %lookup, "session out of step with catalog");
                self.messages.clear_all(user_id, state).await;
                self.engine.reset(state);
                self.deliver_or_log(user_id, state, &render::fallback()).await;
            }
            FlowError::Progress(other) => {
                tracing::warn!(%user_id, error = %other, "unexpected progress error");
            }
            FlowError::Transport(TransportError::Unreachable) => {
                tracing::info!(%user_id, "user is unreachable");
            }
            FlowError::Transport(other) => {
                tracing::warn!(%user_id, error = %other, "send failed; offering a restart");
                self.deliver_or_log(user_id, state, &render::fallback()).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuation_is_stale_once_history_moves() {
        let user = UserId::new(1);
        let mut state = SessionState::new();
        state.messages_mut().push(MessageId::new(10));
        let pending = Continuation::capture(user, &state, MessageId::new(10));
        assert!(pending.still_current(&state));

        state.messages_mut().push(MessageId::new(11));
        assert!(!pending.still_current(&state));

        state.messages_mut().pop();
        state.messages_mut().pop();
        assert!(!pending.still_current(&state));
    }
}
