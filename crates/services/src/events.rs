//! Inbound user actions and their compact wire form.

use std::fmt;

use course_core::model::UserId;
use storage::repository::UserProfile;

/// Action a learner can trigger through a button or command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowEvent {
    Start,
    Next,
    Prev,
    Restart,
    /// Discard the whole session, including the resume point.
    Reset,
    StartFinalTest,
    AnswerQuiz {
        question_index: usize,
        option_index: usize,
    },
}

impl FlowEvent {
    /// Callback payload carried by a button.
    #[must_use]
    pub fn encode(self) -> String {
        match self {
            FlowEvent::Start => "start".to_owned(),
            FlowEvent::Next => "next".to_owned(),
            FlowEvent::Prev => "prev".to_owned(),
            FlowEvent::Restart => "restart".to_owned(),
            FlowEvent::Reset => "reset".to_owned(),
            FlowEvent::StartFinalTest => "final".to_owned(),
            FlowEvent::AnswerQuiz {
                question_index,
                option_index,
            } => format!("quiz:{question_index}:{option_index}"),
        }
    }

    /// Parse a callback payload; unknown payloads yield `None`.
    #[must_use]
    pub fn decode(raw: &str) -> Option<Self> {
        match raw {
            "start" => Some(FlowEvent::Start),
            "next" => Some(FlowEvent::Next),
            "prev" => Some(FlowEvent::Prev),
            "restart" => Some(FlowEvent::Restart),
            "reset" => Some(FlowEvent::Reset),
            "final" => Some(FlowEvent::StartFinalTest),
            other => {
                let rest = other.strip_prefix("quiz:")?;
                let (question, option) = rest.split_once(':')?;
                Some(FlowEvent::AnswerQuiz {
                    question_index: question.parse().ok()?,
                    option_index: option.parse().ok()?,
                })
            }
        }
    }

    /// Map a slash command (`/start`, `/reset`, optionally `@botname`-suffixed).
    #[must_use]
    pub fn from_command(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let command = word.strip_prefix('/')?;
        let command = command.split_once('@').map_or(command, |(name, _)| name);
        match command {
            "start" => Some(FlowEvent::Start),
            "reset" => Some(FlowEvent::Reset),
            _ => None,
        }
    }
}

impl fmt::Display for FlowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// What the learner sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundPayload {
    Action(FlowEvent),
    /// Free text or a button payload this build does not understand.
    Unrecognized,
}

/// One inbound event, already stripped of transport specifics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub user_id: UserId,
    pub profile: UserProfile,
    /// Token to acknowledge a button press with, if the event came from one.
    pub ack: Option<String>,
    pub payload: InboundPayload,
}

impl InboundEvent {
    #[must_use]
    pub fn action(user_id: UserId, event: FlowEvent) -> Self {
        Self {
            user_id,
            profile: UserProfile::default(),
            ack: None,
            payload: InboundPayload::Action(event),
        }
    }

    #[must_use]
    pub fn with_ack(mut self, ack: impl Into<String>) -> Self {
        self.ack = Some(ack.into());
        self
    }

    #[must_use]
    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profile = profile;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiz_payload_round_trips() {
        let event = FlowEvent::AnswerQuiz {
            question_index: 12,
            option_index: 3,
        };
        assert_eq!(event.encode(), "quiz:12:3");
        assert_eq!(FlowEvent::decode("quiz:12:3"), Some(event));
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert_eq!(FlowEvent::decode("quiz:1"), None);
        assert_eq!(FlowEvent::decode("quiz:a:b"), None);
        assert_eq!(FlowEvent::decode("quiz:-1:0"), None);
        assert_eq!(FlowEvent::decode("next_step"), None);
        assert_eq!(FlowEvent::decode(""), None);
    }

    #[test]
    fn commands_accept_bot_suffix_and_arguments() {
        assert_eq!(FlowEvent::from_command("/start"), Some(FlowEvent::Start));
        assert_eq!(
            FlowEvent::from_command("/start@course_bot ref42"),
            Some(FlowEvent::Start)
        );
        assert_eq!(FlowEvent::from_command("/reset"), Some(FlowEvent::Reset));
        assert_eq!(FlowEvent::from_command("/help"), None);
        assert_eq!(FlowEvent::from_command("start"), None);
        assert_eq!(FlowEvent::from_command("   "), None);
    }
}
