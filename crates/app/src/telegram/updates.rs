//! Incoming Telegram updates and the long-polling loop.

use std::time::Duration;

use course_core::model::UserId;
use serde::Deserialize;
use services::{FlowEvent, FlowOrchestrator, InboundEvent, InboundPayload};
use storage::repository::UserProfile;

use super::TelegramClient;

const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
struct Message {
    #[serde(default)]
    from: Option<User>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CallbackQuery {
    id: String,
    from: User,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct User {
    id: i64,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

impl User {
    fn profile(&self) -> UserProfile {
        UserProfile {
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }
}

impl Update {
    /// Translate into a flow event. Updates without a human sender are dropped.
    #[must_use]
    pub fn into_inbound(self) -> Option<InboundEvent> {
        if let Some(query) = self.callback_query {
            let payload = query
                .data
                .as_deref()
                .and_then(FlowEvent::decode)
                .map_or(InboundPayload::Unrecognized, InboundPayload::Action);
            return Some(InboundEvent {
                user_id: UserId::new(query.from.id),
                profile: query.from.profile(),
                ack: Some(query.id),
                payload,
            });
        }

        let message = self.message?;
        let from = message.from.filter(|user| !user.is_bot)?;
        let payload = message
            .text
            .as_deref()
            .and_then(FlowEvent::from_command)
            .map_or(InboundPayload::Unrecognized, InboundPayload::Action);
        Some(InboundEvent {
            user_id: UserId::new(from.id),
            profile: from.profile(),
            ack: None,
            payload,
        })
    }
}

/// Poll forever, handing each event to the orchestrator on its own task.
pub async fn run_polling(client: TelegramClient, flow: FlowOrchestrator) {
    let mut offset: i64 = 0;
    tracing::info!("polling for updates");

    loop {
        let updates = match client.get_updates(offset).await {
            Ok(updates) => updates,
            Err(err) => {
                tracing::warn!(error = %err, "getUpdates failed; retrying");
                tokio::time::sleep(RETRY_DELAY).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(event) = update.into_inbound() else {
                continue;
            };
            let flow = flow.clone();
            tokio::spawn(async move { flow.handle(event).await });
        }
    }
}
