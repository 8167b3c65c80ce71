use crate::model::catalog::Sequence;
use crate::model::ids::{BlockId, MessageId};

/// Where a learner is in the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    NotStarted,
    InCourse,
    InFinalTest,
    Completed,
}

impl Mode {
    /// Sequence the cursor indexes into, if any.
    #[must_use]
    pub fn active_sequence(self) -> Option<Sequence> {
        match self {
            Mode::InCourse => Some(Sequence::Course),
            Mode::InFinalTest | Mode::Completed => Some(Sequence::FinalTest),
            Mode::NotStarted => None,
        }
    }
}

/// Position inside the active sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cursor {
    #[default]
    BeforeFirst,
    At(usize),
    AfterLast,
}

impl Cursor {
    #[must_use]
    pub fn index(self) -> Option<usize> {
        match self {
            Cursor::At(i) => Some(i),
            Cursor::BeforeFirst | Cursor::AfterLast => None,
        }
    }
}

/// Answering state for the quiz block currently under the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizRunState {
    pub quiz_id: BlockId,
    /// Catalog-wide question index carried by the answer buttons.
    pub current_question_index: usize,
    pub score: u32,
}

/// Ordered ids of messages still visible in the chat.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageHistory(Vec<MessageId>);

impl MessageHistory {
    pub fn push(&mut self, id: MessageId) {
        self.0.push(id);
    }

    pub fn pop(&mut self) -> Option<MessageId> {
        self.0.pop()
    }

    /// Removes and returns every id, oldest first.
    pub fn take_all(&mut self) -> Vec<MessageId> {
        std::mem::take(&mut self.0)
    }

    #[must_use]
    pub fn last(&self) -> Option<MessageId> {
        self.0.last().copied()
    }

    #[must_use]
    pub fn contains(&self, id: MessageId) -> bool {
        self.0.contains(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[MessageId] {
        &self.0
    }
}

/// Mutable per-learner progress.
///
/// Blocks are referenced by index into the catalog only; the message history
/// is maintained by the ephemeral message manager and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    pub(crate) mode: Mode,
    pub(crate) cursor: Cursor,
    pub(crate) visited_count: u32,
    pub(crate) correct_count: u32,
    pub(crate) answered_count: u32,
    pub(crate) final_score: u32,
    pub(crate) final_total: u32,
    pub(crate) quiz: Option<QuizRunState>,
    messages: MessageHistory,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    #[must_use]
    pub fn visited_count(&self) -> u32 {
        self.visited_count
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    #[must_use]
    pub fn answered_count(&self) -> u32 {
        self.answered_count
    }

    #[must_use]
    pub fn final_score(&self) -> u32 {
        self.final_score
    }

    #[must_use]
    pub fn final_total(&self) -> u32 {
        self.final_total
    }

    #[must_use]
    pub fn quiz_run(&self) -> Option<&QuizRunState> {
        self.quiz.as_ref()
    }

    /// True once the course sequence has been exhausted and the final test
    /// has not begun.
    #[must_use]
    pub fn is_course_completed(&self) -> bool {
        self.mode == Mode::InCourse && self.cursor == Cursor::AfterLast
    }

    #[must_use]
    pub fn messages(&self) -> &MessageHistory {
        &self.messages
    }

    pub fn messages_mut(&mut self) -> &mut MessageHistory {
        &mut self.messages
    }

    /// Progress fields reset to first-contact values; the message history is kept.
    pub(crate) fn reset_progress(&mut self) {
        let messages = std::mem::take(&mut self.messages);
        *self = Self {
            messages,
            ..Self::default()
        };
    }
}
