#![forbid(unsafe_code)]

pub mod model;
pub mod progress;
pub mod scoring;
pub mod time;

pub use progress::{AnswerOutcome, ProgressEngine, ProgressError, Step};
pub use scoring::{Stats, Verdict};
pub use time::Clock;
