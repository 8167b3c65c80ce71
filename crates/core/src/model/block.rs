use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::model::content::{MediaDraft, MediaRef, MediaValidationError};
use crate::model::ids::BlockId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BlockError {
    #[error("block id cannot be empty")]
    EmptyId,

    #[error("block `{id}` has empty content")]
    EmptyContent { id: String },

    #[error("quiz `{id}` needs at least two options, got {count}")]
    TooFewOptions { id: String, count: usize },

    #[error("quiz `{id}` marks option {correct} as correct but has {count} options")]
    CorrectOutOfRange {
        id: String,
        correct: usize,
        count: usize,
    },

    #[error("block `{id}` has invalid media: {source}")]
    Media {
        id: String,
        #[source]
        source: MediaValidationError,
    },
}

//
// ─── BLOCK TYPES ───────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBlock {
    pub content: String,
    pub media: Option<MediaRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizBlock {
    pub question: String,
    pub options: Vec<String>,
    pub correct: usize,
    pub explanation: String,
}

impl QuizBlock {
    #[must_use]
    pub fn is_correct(&self, option_index: usize) -> bool {
        option_index == self.correct
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Knowledge(KnowledgeBlock),
    Quiz(QuizBlock),
}

/// One immutable unit of course content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    id: BlockId,
    kind: BlockKind,
}

impl Block {
    #[must_use]
    pub fn id(&self) -> &BlockId {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> &BlockKind {
        &self.kind
    }

    #[must_use]
    pub fn as_quiz(&self) -> Option<&QuizBlock> {
        match &self.kind {
            BlockKind::Quiz(quiz) => Some(quiz),
            BlockKind::Knowledge(_) => None,
        }
    }

    #[must_use]
    pub fn is_quiz(&self) -> bool {
        self.as_quiz().is_some()
    }
}

//
// ─── DRAFT (catalog input) ─────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDraft {
    Knowledge {
        id: String,
        content: String,
        #[serde(default)]
        media: Option<MediaDraft>,
    },
    Quiz {
        id: String,
        question: String,
        options: Vec<String>,
        #[serde(alias = "correct_option_id")]
        correct: usize,
        #[serde(default)]
        explanation: String,
    },
}

impl BlockDraft {
    #[must_use]
    pub fn knowledge(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Knowledge {
            id: id.into(),
            content: content.into(),
            media: None,
        }
    }

    #[must_use]
    pub fn quiz(
        id: impl Into<String>,
        question: impl Into<String>,
        options: &[&str],
        correct: usize,
    ) -> Self {
        Self::Quiz {
            id: id.into(),
            question: question.into(),
            options: options.iter().map(|o| (*o).to_owned()).collect(),
            correct,
            explanation: String::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Knowledge { id, .. } | Self::Quiz { id, .. } => id,
        }
    }

    /// Validate the draft into an immutable `Block`.
    ///
    /// # Errors
    ///
    /// Returns `BlockError` when ids or content are empty, a quiz is malformed,
    /// or attached media cannot be resolved.
    pub fn validate(self, base_dir: Option<&Path>) -> Result<Block, BlockError> {
        let id = self.id().trim().to_owned();
        if id.is_empty() {
            return Err(BlockError::EmptyId);
        }

        let kind = match self {
            Self::Knowledge { content, media, .. } => {
                if content.trim().is_empty() {
                    return Err(BlockError::EmptyContent { id });
                }
                let media = media
                    .map(|m| m.validate(base_dir))
                    .transpose()
                    .map_err(|source| BlockError::Media {
                        id: id.clone(),
                        source,
                    })?;
                BlockKind::Knowledge(KnowledgeBlock { content, media })
            }
            Self::Quiz {
                question,
                options,
                correct,
                explanation,
                ..
            } => {
                if question.trim().is_empty() {
                    return Err(BlockError::EmptyContent { id });
                }
                if options.len() < 2 {
                    return Err(BlockError::TooFewOptions {
                        id,
                        count: options.len(),
                    });
                }
                if correct >= options.len() {
                    return Err(BlockError::CorrectOutOfRange {
                        id,
                        correct,
                        count: options.len(),
                    });
                }
                BlockKind::Quiz(QuizBlock {
                    question,
                    options,
                    correct,
                    explanation,
                })
            }
        };

        Ok(Block {
            id: BlockId::new(id),
            kind,
        })
    }
}
