pub mod media;

pub use media::{MediaDraft, MediaKind, MediaRef, MediaUri, MediaValidationError};
