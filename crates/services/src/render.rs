//! Turns engine results into chat messages.
//!
//! Every screen that can follow a state change carries at least one button,
//! so the learner is never left without a way forward.

use course_core::model::{Block, BlockKind, KnowledgeBlock, MediaRef, QuizBlock};
use course_core::{AnswerOutcome, Stats, Verdict};

use crate::events::FlowEvent;
use crate::transport::{Affordance, OutgoingMessage};

const LABEL_NEXT: &str = "Next ➡️";
const LABEL_PREV: &str = "⬅️ Back";
const LABEL_START: &str = "▶️ Start";
const LABEL_RESTART: &str = "🔄 Start over";
const LABEL_FINAL_TEST: &str = "📝 Take the final test";
const LABEL_CONTINUE: &str = "▶️ Continue";

/// Context the renderer needs about where a block sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockContext {
    /// Catalog-wide index bound into answer buttons.
    pub question_index: usize,
    pub can_retreat: bool,
    /// One-based position and length, shown as a header in the final test.
    pub numbering: Option<(usize, usize)>,
}

fn nav_row(can_retreat: bool) -> Vec<Affordance> {
    let mut row = Vec::with_capacity(2);
    if can_retreat {
        row.push(Affordance::new(LABEL_PREV, FlowEvent::Prev));
    }
    row.push(Affordance::new(LABEL_NEXT, FlowEvent::Next));
    row
}

fn restart_row() -> Vec<Affordance> {
    vec![Affordance::new(LABEL_RESTART, FlowEvent::Restart)]
}

fn start_row() -> Vec<Affordance> {
    vec![Affordance::new(LABEL_START, FlowEvent::Start)]
}

//
// ─── BLOCKS ────────────────────────────────────────────────────────────────────
//

/// Messages for a block, in send order.
#[must_use]
pub fn block(block: &Block, ctx: BlockContext) -> Vec<OutgoingMessage> {
    match block.kind() {
        BlockKind::Knowledge(knowledge) => knowledge_messages(knowledge, ctx),
        BlockKind::Quiz(quiz) => vec![quiz_message(quiz, ctx)],
    }
}

fn knowledge_messages(knowledge: &KnowledgeBlock, ctx: BlockContext) -> Vec<OutgoingMessage> {
    match &knowledge.media {
        None => vec![OutgoingMessage::text(&knowledge.content).with_row(nav_row(ctx.can_retreat))],
        Some(media) => vec![
            OutgoingMessage::text(&knowledge.content),
            media_message(media).with_row(nav_row(ctx.can_retreat)),
        ],
    }
}

fn media_message(media: &MediaRef) -> OutgoingMessage {
    OutgoingMessage::text(media.caption.clone().unwrap_or_default()).with_media(media.clone())
}

fn quiz_message(quiz: &QuizBlock, ctx: BlockContext) -> OutgoingMessage {
    let text = match ctx.numbering {
        Some((position, total)) => format!("Question {position} of {total}\n\n{}", quiz.question),
        None => format!("❓ {}", quiz.question),
    };
    let mut message = OutgoingMessage::text(text);
    for (option_index, option) in quiz.options.iter().enumerate() {
        message = message.with_row(vec![Affordance::new(
            option.clone(),
            FlowEvent::AnswerQuiz {
                question_index: ctx.question_index,
                option_index,
            },
        )]);
    }
    message.with_row(restart_row())
}

/// Stand-in for a media message the platform refused.
#[must_use]
pub fn media_unavailable(original: &OutgoingMessage) -> OutgoingMessage {
    let text = if original.text.is_empty() {
        "(media unavailable)".to_owned()
    } else {
        format!("{}\n\n(media unavailable)", original.text)
    };
    OutgoingMessage {
        text,
        media: None,
        affordances: original.affordances.clone(),
    }
}

//
// ─── FLOW SCREENS ──────────────────────────────────────────────────────────────
//

#[must_use]
pub fn presentation(text: &str) -> OutgoingMessage {
    OutgoingMessage::text(text)
}

#[must_use]
pub fn welcome_back(days_away: i64) -> OutgoingMessage {
    OutgoingMessage::text(format!(
        "👋 Welcome back! You were away for {days_away} days. Let's pick up the course again."
    ))
}

#[must_use]
pub fn course_completed(stats: &Stats) -> OutgoingMessage {
    let text = format!(
        "🎉 You have finished the course!\n\n\
         Progress: {}%\n\
         Correct answers: {} of {}\n\n\
         Ready to check yourself in the final test?",
        stats.progress_percent, stats.correct_answers, stats.total_quizzes
    );
    OutgoingMessage::text(text)
        .with_row(vec![Affordance::new(LABEL_FINAL_TEST, FlowEvent::StartFinalTest)])
        .with_row(vec![Affordance::new(LABEL_PREV, FlowEvent::Prev)])
}

#[must_use]
pub fn final_test_intro(intro: Option<&str>, questions: usize) -> OutgoingMessage {
    let text = match intro {
        Some(intro) => intro.to_owned(),
        None => format!("📝 Final test: {questions} questions. Good luck!"),
    };
    OutgoingMessage::text(text)
}

#[must_use]
pub fn verdict_text(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Excellent => "🏆 Excellent! You have mastered the material.",
        Verdict::Good => "👍 Good result. A quick review of the weaker topics will help.",
        Verdict::NeedsReview => "📚 We recommend going through the course once more.",
    }
}

#[must_use]
pub fn final_results(stats: &Stats) -> OutgoingMessage {
    let percent = stats.final_percent().unwrap_or(0);
    let text = format!(
        "🏁 Final test complete!\n\n\
         Score: {} of {} ({percent}%)\n\n{}",
        stats.final_score,
        stats.final_total,
        verdict_text(Verdict::from_percent(percent))
    );
    OutgoingMessage::text(text).with_row(restart_row())
}

#[must_use]
pub fn answer_feedback(outcome: &AnswerOutcome<'_>) -> OutgoingMessage {
    let mut text = if outcome.is_correct {
        "✅ Correct!".to_owned()
    } else {
        let correct = outcome
            .quiz
            .options
            .get(outcome.quiz.correct)
            .map_or("", String::as_str);
        format!("❌ Not quite. The correct answer is: {correct}")
    };
    if !outcome.quiz.explanation.is_empty() {
        text.push_str("\n\n");
        text.push_str(&outcome.quiz.explanation);
    }
    OutgoingMessage::text(text)
}

#[must_use]
pub fn continue_prompt() -> OutgoingMessage {
    OutgoingMessage::text("Ready for the next step?")
        .with_row(vec![Affordance::new(LABEL_NEXT, FlowEvent::Next)])
}

//
// ─── RECOVERY AND HINTS ────────────────────────────────────────────────────────
//

#[must_use]
pub fn fallback() -> OutgoingMessage {
    OutgoingMessage::text("⚠️ Something went wrong. Please start over.").with_row(restart_row())
}

#[must_use]
pub fn please_start() -> OutgoingMessage {
    OutgoingMessage::text("Your session has expired. Press Start to begin the course.")
        .with_row(start_row())
}

#[must_use]
pub fn use_buttons() -> OutgoingMessage {
    OutgoingMessage::text("Please use the buttons under the messages to move through the course.")
        .with_row(start_row())
}

#[must_use]
pub fn reset_done() -> OutgoingMessage {
    OutgoingMessage::text("Your progress has been reset. Press Start to begin again.")
        .with_row(start_row())
}

#[must_use]
pub fn reminder(days_away: i64) -> OutgoingMessage {
    OutgoingMessage::text(format!(
        "⏰ You haven't studied for {days_away} days. Your progress is saved, so you can continue where you left off."
    ))
    .with_row(vec![Affordance::new(LABEL_CONTINUE, FlowEvent::Next)])
    .with_row(restart_row())
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{BlockDraft, MediaKind, MediaUri};

    fn ctx(can_retreat: bool) -> BlockContext {
        BlockContext {
            question_index: 4,
            can_retreat,
            numbering: None,
        }
    }

    #[test]
    fn first_knowledge_block_has_no_back_button() {
        let block = BlockDraft::knowledge("k0", "Intro").validate(None).unwrap();
        let messages = super::block(&block, ctx(false));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].events().collect::<Vec<_>>(), vec![FlowEvent::Next]);

        let messages = super::block(&block, ctx(true));
        assert_eq!(
            messages[0].events().collect::<Vec<_>>(),
            vec![FlowEvent::Prev, FlowEvent::Next]
        );
    }

    #[test]
    fn media_message_carries_the_buttons() {
        let media = MediaRef {
            kind: MediaKind::Audio,
            uri: MediaUri::from_url("https://example.org/a.ogg").unwrap(),
            caption: Some("Listen".into()),
        };
        let messages = knowledge_messages(
            &KnowledgeBlock {
                content: "Text".into(),
                media: Some(media),
            },
            ctx(true),
        );
        assert_eq!(messages.len(), 2);
        assert!(messages[0].affordances.is_empty());
        assert_eq!(messages[1].text, "Listen");
        assert!(messages[1].media.is_some());
        assert_eq!(messages[1].affordances.len(), 1);

        let fallback = media_unavailable(&messages[1]);
        assert!(fallback.media.is_none());
        assert_eq!(fallback.affordances, messages[1].affordances);
    }

    #[test]
    fn quiz_buttons_bind_the_question_index() {
        let block = BlockDraft::quiz("q", "Pick", &["a", "b", "c"], 1)
            .validate(None)
            .unwrap();
        let messages = super::block(&block, ctx(false));
        let events: Vec<_> = messages[0].events().collect();
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[2],
            FlowEvent::AnswerQuiz {
                question_index: 4,
                option_index: 2
            }
        );
        assert_eq!(events[3], FlowEvent::Restart);
    }

    #[test]
    fn final_results_use_the_verdict_thresholds() {
        let mut stats = Stats {
            progress_percent: 100,
            correct_answers: 1,
            total_quizzes: 1,
            final_score: 4,
            final_total: 5,
        };
        assert!(final_results(&stats).text.contains("(80%)"));
        assert!(final_results(&stats).text.contains("Excellent"));

        stats.final_score = 3;
        assert!(final_results(&stats).text.contains("Good result"));

        stats.final_score = 2;
        assert!(final_results(&stats).text.contains("once more"));
    }

    #[test]
    fn wrong_answer_feedback_names_the_correct_option() {
        let quiz = QuizBlock {
            question: "2+2?".into(),
            options: vec!["3".into(), "4".into()],
            correct: 1,
            explanation: "Arithmetic.".into(),
        };
        let outcome = AnswerOutcome {
            quiz: &quiz,
            chosen: 0,
            is_correct: false,
        };
        let text = answer_feedback(&outcome).text;
        assert!(text.contains("correct answer is: 4"));
        assert!(text.ends_with("Arithmetic."));
    }
}
