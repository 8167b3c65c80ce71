mod block;
mod catalog;
pub mod content;
mod ids;
mod session;

pub use content::{MediaDraft, MediaKind, MediaRef, MediaUri, MediaValidationError};
pub use ids::{BlockId, MessageId, ParseIdError, UserId};

pub use block::{Block, BlockDraft, BlockError, BlockKind, KnowledgeBlock, QuizBlock};
pub use catalog::{Catalog, CatalogDraft, CatalogError, Sequence};
pub use session::{Cursor, MessageHistory, Mode, QuizRunState, SessionState};
