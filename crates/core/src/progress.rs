use std::sync::Arc;

use thiserror::Error;

use crate::model::{
    Block, Catalog, Cursor, Mode, QuizBlock, QuizRunState, Sequence, SessionState,
};
use crate::scoring::{Stats, percent};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("no active session")]
    NoActiveSession,

    #[error("already at the boundary of the active sequence")]
    BoundaryViolation,

    #[error("the current block is not a quiz")]
    NotAQuiz,

    #[error("answer does not match the open question")]
    StaleAnswer,

    #[error("no block at {sequence:?}[{index}]")]
    ContentLookup { sequence: Sequence, index: usize },
}

//
// ─── STEP ──────────────────────────────────────────────────────────────────────
//

/// Result of moving forward through the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<'a> {
    Block(&'a Block),
    CourseCompleted,
    FinalTestCompleted,
}

/// Outcome of answering the open quiz question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOutcome<'a> {
    pub quiz: &'a QuizBlock,
    pub chosen: usize,
    pub is_correct: bool,
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

/// Pure state transitions over a `SessionState` for one catalog.
///
/// The engine never performs I/O; the session passed in is the only thing it
/// mutates.
#[derive(Debug, Clone)]
pub struct ProgressEngine {
    catalog: Arc<Catalog>,
}

impl ProgressEngine {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Enter the course at its first block with zeroed counters.
    pub fn start(&self, state: &mut SessionState) {
        state.reset_progress();
        state.mode = Mode::InCourse;
        state.cursor = Cursor::At(0);
        state.visited_count = 1;
        self.sync_quiz_run(state);
    }

    /// Enter the course at a persisted resume point, clamped to the catalog.
    pub fn resume(&self, state: &mut SessionState, cursor: usize) {
        self.start(state);
        let last = self.catalog.blocks().len().saturating_sub(1);
        let index = cursor.min(last);
        state.cursor = Cursor::At(index);
        state.visited_count = to_u32(index + 1);
        self.sync_quiz_run(state);
    }

    /// Discard all progress, returning to first-contact state.
    pub fn reset(&self, state: &mut SessionState) {
        *state = SessionState::new();
    }

    /// Move one block forward in the active sequence.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NoActiveSession` before `start`, and
    /// `ProgressError::BoundaryViolation` once the completion signal for the
    /// active sequence has already been produced.
    pub fn advance(&self, state: &mut SessionState) -> Result<Step<'_>, ProgressError> {
        let sequence = match state.mode {
            Mode::NotStarted => return Err(ProgressError::NoActiveSession),
            Mode::Completed => return Err(ProgressError::BoundaryViolation),
            Mode::InCourse => Sequence::Course,
            Mode::InFinalTest => Sequence::FinalTest,
        };
        let len = self.catalog.sequence(sequence).len();

        let next = match state.cursor {
            Cursor::BeforeFirst => 0,
            Cursor::At(i) => i + 1,
            Cursor::AfterLast => return Err(ProgressError::BoundaryViolation),
        };

        if next < len {
            state.cursor = Cursor::At(next);
            if sequence == Sequence::Course {
                state.visited_count = state.visited_count.max(to_u32(next + 1));
            }
            self.sync_quiz_run(state);
            return self.block_at(sequence, next).map(Step::Block);
        }

        state.cursor = Cursor::AfterLast;
        state.quiz = None;
        match sequence {
            Sequence::Course => {
                state.visited_count = to_u32(len);
                Ok(Step::CourseCompleted)
            }
            Sequence::FinalTest => {
                state.mode = Mode::Completed;
                Ok(Step::FinalTestCompleted)
            }
        }
    }

    /// Whether `retreat` would move the cursor.
    #[must_use]
    pub fn can_retreat(&self, state: &SessionState) -> bool {
        match (state.mode, state.cursor) {
            (Mode::InCourse | Mode::InFinalTest, Cursor::At(i)) => i > 0,
            (Mode::InCourse, Cursor::AfterLast) => !self.catalog.blocks().is_empty(),
            _ => false,
        }
    }

    /// Move one block back within the active sequence.
    ///
    /// Returns `None` without touching the session when already at the first
    /// block or when no sequence is active.
    pub fn retreat(&self, state: &mut SessionState) -> Option<&Block> {
        if !self.can_retreat(state) {
            return None;
        }
        let sequence = state.mode.active_sequence()?;
        let target = match state.cursor {
            Cursor::At(i) => i - 1,
            Cursor::AfterLast => self.catalog.sequence(sequence).len() - 1,
            Cursor::BeforeFirst => return None,
        };
        state.cursor = Cursor::At(target);
        self.sync_quiz_run(state);
        self.catalog.block(sequence, target)
    }

    /// Switch to the final test at its first question.
    ///
    /// Callers gate this on the course-completed signal.
    pub fn start_final_test(&self, state: &mut SessionState) -> Option<&Block> {
        state.mode = Mode::InFinalTest;
        state.cursor = Cursor::At(0);
        state.final_score = 0;
        state.final_total = to_u32(self.catalog.final_test().len());
        self.sync_quiz_run(state);
        self.catalog.block(Sequence::FinalTest, 0)
    }

    /// Count an answer for the quiz under the cursor. The cursor does not move.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NotAQuiz` (state unchanged) when the current
    /// block is not a quiz, or the lookup error for an unresolvable cursor.
    pub fn record_answer(
        &self,
        state: &mut SessionState,
        is_correct: bool,
    ) -> Result<(), ProgressError> {
        if !self.resolve_current(state)?.is_quiz() {
            return Err(ProgressError::NotAQuiz);
        }
        match state.mode {
            Mode::InCourse => {
                state.answered_count += 1;
                if is_correct {
                    state.correct_count += 1;
                }
            }
            Mode::InFinalTest => {
                if is_correct {
                    state.final_score += 1;
                }
            }
            Mode::NotStarted | Mode::Completed => return Err(ProgressError::NoActiveSession),
        }
        Ok(())
    }

    /// Answer the open question identified by `question_index` with `option_index`.
    ///
    /// The quiz run is closed afterwards, so a repeated tap is rejected.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::StaleAnswer` when no question with that index is
    /// open or the option does not exist.
    pub fn answer_quiz(
        &self,
        state: &mut SessionState,
        question_index: usize,
        option_index: usize,
    ) -> Result<AnswerOutcome<'_>, ProgressError> {
        let open = state
            .quiz
            .as_ref()
            .is_some_and(|run| run.current_question_index == question_index);
        if !open {
            return Err(ProgressError::StaleAnswer);
        }

        let quiz = self
            .resolve_current(state)?
            .as_quiz()
            .ok_or(ProgressError::NotAQuiz)?;
        if option_index >= quiz.options.len() {
            return Err(ProgressError::StaleAnswer);
        }

        let is_correct = quiz.is_correct(option_index);
        self.record_answer(state, is_correct)?;
        if let Some(run) = state.quiz.as_mut() {
            run.score += u32::from(is_correct);
        }
        state.quiz = None;

        Ok(AnswerOutcome {
            quiz,
            chosen: option_index,
            is_correct,
        })
    }

    /// Block under the cursor, or `None` when nothing is shown.
    #[must_use]
    pub fn current_block(&self, state: &SessionState) -> Option<&Block> {
        self.resolve_current(state).ok()
    }

    /// Block under the cursor.
    ///
    /// # Errors
    ///
    /// `NoActiveSession` before start, `BoundaryViolation` on a sentinel cursor,
    /// `ContentLookup` if the cursor does not resolve in the catalog.
    pub fn resolve_current(&self, state: &SessionState) -> Result<&Block, ProgressError> {
        let sequence = match state.mode {
            Mode::NotStarted => return Err(ProgressError::NoActiveSession),
            Mode::InCourse => Sequence::Course,
            Mode::InFinalTest | Mode::Completed => Sequence::FinalTest,
        };
        let index = state
            .cursor
            .index()
            .ok_or(ProgressError::BoundaryViolation)?;
        self.block_at(sequence, index)
    }

    /// Catalog-wide index used to bind answer buttons to a question.
    #[must_use]
    pub fn question_index(&self, sequence: Sequence, index: usize) -> usize {
        match sequence {
            Sequence::Course => index,
            Sequence::FinalTest => self.catalog.blocks().len() + index,
        }
    }

    #[must_use]
    pub fn stats(&self, state: &SessionState) -> Stats {
        let total_blocks = to_u32(self.catalog.blocks().len());
        Stats {
            progress_percent: percent(state.visited_count, total_blocks),
            correct_answers: state.correct_count,
            total_quizzes: state.answered_count,
            final_score: state.final_score,
            final_total: state.final_total,
        }
    }

    fn block_at(&self, sequence: Sequence, index: usize) -> Result<&Block, ProgressError> {
        self.catalog
            .block(sequence, index)
            .ok_or(ProgressError::ContentLookup { sequence, index })
    }

    fn sync_quiz_run(&self, state: &mut SessionState) {
        state.quiz = match (state.mode.active_sequence(), state.cursor) {
            (Some(sequence), Cursor::At(index)) => self
                .catalog
                .block(sequence, index)
                .filter(|b| b.is_quiz())
                .map(|b| QuizRunState {
                    quiz_id: b.id().clone(),
                    current_question_index: self.question_index(sequence, index),
                    score: 0,
                }),
            _ => None,
        };
    }
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockDraft, CatalogDraft};

    fn engine(final_questions: usize) -> ProgressEngine {
        let finals = (0..final_questions)
            .map(|i| BlockDraft::quiz(format!("F{i}"), format!("Final {i}"), &["x", "y"], 1))
            .collect();
        let catalog = CatalogDraft::new(
            vec![
                BlockDraft::knowledge("K0", "Intro"),
                BlockDraft::quiz("Quiz1", "Pick b", &["a", "b", "c"], 1),
                BlockDraft::knowledge("K2", "Outro"),
            ],
            finals,
        )
        .validate(None)
        .unwrap();
        ProgressEngine::new(Arc::new(catalog))
    }

    fn id(step: Step<'_>) -> String {
        match step {
            Step::Block(b) => b.id().to_string(),
            other => format!("{other:?}"),
        }
    }

    fn assert_bounds(engine: &ProgressEngine, state: &SessionState) {
        if let (Some(seq), Cursor::At(i)) = (state.mode().active_sequence(), state.cursor()) {
            assert!(i < engine.catalog().sequence(seq).len());
        }
    }

    #[test]
    fn walks_the_course_to_completion() {
        let engine = engine(2);
        let mut state = SessionState::new();

        engine.start(&mut state);
        assert_eq!(engine.current_block(&state).unwrap().id().as_str(), "K0");

        assert_eq!(id(engine.advance(&mut state).unwrap()), "Quiz1");
        engine.record_answer(&mut state, true).unwrap();
        let stats = engine.stats(&state);
        assert_eq!((stats.correct_answers, stats.total_quizzes), (1, 1));

        assert_eq!(id(engine.advance(&mut state).unwrap()), "K2");
        assert_eq!(engine.advance(&mut state).unwrap(), Step::CourseCompleted);
        assert!(state.is_course_completed());
        assert_eq!(engine.stats(&state).progress_percent, 100);
    }

    #[test]
    fn final_test_runs_its_fixed_questions_once() {
        let engine = engine(2);
        let mut state = SessionState::new();
        engine.start(&mut state);
        while engine.advance(&mut state).unwrap() != Step::CourseCompleted {}

        let first = engine.start_final_test(&mut state).unwrap();
        assert_eq!(first.id().as_str(), "F0");
        assert_eq!(state.cursor(), Cursor::At(0));
        assert_eq!(state.mode(), Mode::InFinalTest);

        engine.record_answer(&mut state, true).unwrap();
        assert_eq!(id(engine.advance(&mut state).unwrap()), "F1");
        engine.record_answer(&mut state, false).unwrap();
        assert_eq!(engine.advance(&mut state).unwrap(), Step::FinalTestCompleted);
        assert_eq!(state.mode(), Mode::Completed);
        assert_eq!(
            engine.advance(&mut state),
            Err(ProgressError::BoundaryViolation)
        );

        let stats = engine.stats(&state);
        assert_eq!(stats.final_total, 2);
        assert_eq!(stats.final_score, 1);
        assert_eq!(stats.final_percent(), Some(50));
        assert_eq!(stats.total_quizzes, 0);
    }

    #[test]
    fn retreat_before_start_is_a_silent_noop() {
        let engine = engine(1);
        let mut state = SessionState::new();
        assert!(engine.retreat(&mut state).is_none());
        assert_eq!(state, SessionState::new());
        assert!(engine.current_block(&state).is_none());
    }

    #[test]
    fn retreat_at_first_block_leaves_state_unchanged() {
        let engine = engine(1);
        let mut state = SessionState::new();
        engine.start(&mut state);
        let before = state.clone();

        assert!(!engine.can_retreat(&state));
        assert!(engine.retreat(&mut state).is_none());
        assert_eq!(state, before);
    }

    #[test]
    fn retreat_from_completion_returns_to_last_block_and_never_crosses_into_course() {
        let engine = engine(2);
        let mut state = SessionState::new();
        engine.start(&mut state);
        while engine.advance(&mut state).unwrap() != Step::CourseCompleted {}

        assert_eq!(engine.retreat(&mut state).unwrap().id().as_str(), "K2");
        while engine.advance(&mut state).unwrap() != Step::CourseCompleted {}

        engine.start_final_test(&mut state);
        assert!(engine.retreat(&mut state).is_none());
        assert_eq!(state.mode(), Mode::InFinalTest);
        engine.advance(&mut state).unwrap();
        assert_eq!(engine.retreat(&mut state).unwrap().id().as_str(), "F0");
    }

    #[test]
    fn advance_before_start_fails() {
        let engine = engine(1);
        let mut state = SessionState::new();
        assert_eq!(
            engine.advance(&mut state),
            Err(ProgressError::NoActiveSession)
        );
    }

    #[test]
    fn completion_is_signalled_once() {
        let engine = engine(1);
        let mut state = SessionState::new();
        engine.start(&mut state);
        while engine.advance(&mut state).unwrap() != Step::CourseCompleted {}
        let visited = state.visited_count();

        for _ in 0..3 {
            assert_eq!(
                engine.advance(&mut state),
                Err(ProgressError::BoundaryViolation)
            );
        }
        assert_eq!(state.visited_count(), visited);
    }

    #[test]
    fn record_answer_off_a_quiz_is_rejected_without_change() {
        let engine = engine(1);
        let mut state = SessionState::new();
        engine.start(&mut state);
        let before = state.clone();

        assert_eq!(
            engine.record_answer(&mut state, true),
            Err(ProgressError::NotAQuiz)
        );
        assert_eq!(state, before);
    }

    #[test]
    fn score_bookkeeping_survives_navigation() {
        let engine = engine(1);
        let mut state = SessionState::new();
        engine.start(&mut state);
        engine.advance(&mut state).unwrap();

        let answers = [true, false, true, true, false];
        for (n, correct) in answers.iter().enumerate() {
            engine.record_answer(&mut state, *correct).unwrap();
            if n % 2 == 0 {
                engine.retreat(&mut state);
                engine.advance(&mut state).unwrap();
            }
            assert_bounds(&engine, &state);
        }

        let stats = engine.stats(&state);
        assert_eq!(stats.total_quizzes, 5);
        assert_eq!(stats.correct_answers, 3);
    }

    #[test]
    fn answer_quiz_closes_the_run() {
        let engine = engine(1);
        let mut state = SessionState::new();
        engine.start(&mut state);
        assert!(state.quiz_run().is_none());
        engine.advance(&mut state).unwrap();

        let run = state.quiz_run().unwrap().clone();
        assert_eq!(run.quiz_id.as_str(), "Quiz1");
        assert_eq!(run.current_question_index, 1);

        let outcome = engine.answer_quiz(&mut state, 1, 1).unwrap();
        assert!(outcome.is_correct);
        assert_eq!(outcome.chosen, 1);
        assert!(state.quiz_run().is_none());
        assert_eq!(
            engine.answer_quiz(&mut state, 1, 1),
            Err(ProgressError::StaleAnswer)
        );
        assert_eq!(engine.stats(&state).total_quizzes, 1);
    }

    #[test]
    fn course_answer_buttons_do_not_match_final_questions() {
        let engine = engine(2);
        let mut state = SessionState::new();
        engine.start(&mut state);
        while engine.advance(&mut state).unwrap() != Step::CourseCompleted {}
        engine.start_final_test(&mut state);
        engine.advance(&mut state).unwrap();

        // F1 sits at final index 1, which is course index 1 (Quiz1) as well.
        assert_eq!(
            engine.answer_quiz(&mut state, 1, 1),
            Err(ProgressError::StaleAnswer)
        );
        let q = engine.question_index(Sequence::FinalTest, 1);
        assert!(engine.answer_quiz(&mut state, q, 1).unwrap().is_correct);
    }

    #[test]
    fn reset_then_start_matches_a_fresh_start() {
        let engine = engine(1);
        let mut used = SessionState::new();
        engine.start(&mut used);
        engine.advance(&mut used).unwrap();
        engine.record_answer(&mut used, true).unwrap();
        engine.reset(&mut used);
        engine.start(&mut used);

        let mut fresh = SessionState::new();
        engine.start(&mut fresh);
        assert_eq!(used, fresh);
    }

    #[test]
    fn resume_clamps_to_catalog() {
        let engine = engine(1);
        let mut state = SessionState::new();
        engine.resume(&mut state, 99);
        assert_eq!(state.cursor(), Cursor::At(2));
        assert_eq!(engine.stats(&state).progress_percent, 100);

        engine.resume(&mut state, 1);
        assert!(state.quiz_run().is_some());
        assert_eq!(engine.stats(&state).progress_percent, 67);
    }
}
