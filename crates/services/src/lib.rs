#![forbid(unsafe_code)]

pub mod ephemeral;
pub mod error;
pub mod events;
pub mod flow;
pub mod reminders;
pub mod render;
pub mod sessions;
pub mod transport;

pub use course_core::Clock;

pub use ephemeral::EphemeralMessages;
pub use error::{FlowError, ReminderError, TransportError};
pub use events::{FlowEvent, InboundEvent, InboundPayload};
pub use flow::FlowOrchestrator;
pub use reminders::{ReminderReport, ReminderService};
pub use sessions::{SessionHandle, SessionStore};
pub use transport::{Affordance, DeleteOutcome, InMemoryTransport, OutgoingMessage, Transport};
