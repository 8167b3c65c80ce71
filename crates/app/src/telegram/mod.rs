//! Telegram Bot API client used as the chat transport.

pub mod updates;

use std::time::Duration;

use async_trait::async_trait;
use course_core::model::{MediaKind, MediaRef, MediaUri, MessageId, UserId};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use services::transport::{Affordance, DeleteOutcome, OutgoingMessage, Transport};
use services::TransportError;

use self::updates::Update;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Long-poll window requested from `getUpdates`.
pub const POLL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Identity of the bot account behind the token.
#[derive(Debug, Clone, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

fn connection(e: reqwest::Error) -> TransportError {
    TransportError::Connection(e.to_string())
}

fn classify(status: u16, description: String) -> TransportError {
    match status {
        403 => TransportError::Unreachable,
        _ => TransportError::Rejected {
            status,
            description,
        },
    }
}

/// Deletion failures that only mean the message is already gone or too old.
fn is_missing_message(description: &str) -> bool {
    let description = description.to_ascii_lowercase();
    description.contains("message to delete not found")
        || description.contains("message can't be deleted")
}

fn reply_markup(rows: &[Vec<Affordance>]) -> Option<serde_json::Value> {
    if rows.is_empty() {
        return None;
    }
    let keyboard: Vec<Vec<serde_json::Value>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| {
                    serde_json::json!({
                        "text": button.label,
                        "callback_data": button.event.encode(),
                    })
                })
                .collect()
        })
        .collect();
    Some(serde_json::json!({ "inline_keyboard": keyboard }))
}

fn media_method(kind: MediaKind) -> (&'static str, &'static str) {
    match kind {
        MediaKind::Audio => ("sendAudio", "audio"),
        MediaKind::Photo => ("sendPhoto", "photo"),
    }
}

#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    token: String,
    api_base: String,
}

impl TelegramClient {
    /// # Errors
    ///
    /// Returns `TransportError::Connection` if the HTTP client cannot be built.
    pub fn new(token: impl Into<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 15))
            .build()
            .map_err(connection)?;
        Ok(Self {
            client,
            token: token.into(),
            api_base: DEFAULT_API_BASE.to_owned(),
        })
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, TransportError> {
        let resp = request.send().await.map_err(connection)?;
        let status = resp.status().as_u16();
        let body: ApiResponse<T> = resp.json().await.map_err(connection)?;
        match body {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse {
                description,
                error_code,
                ..
            } => Err(classify(
                error_code.unwrap_or(status),
                description.unwrap_or_default(),
            )),
        }
    }

    /// Check the token and fetch the bot's own account.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the API rejects the token or is unreachable.
    pub async fn get_me(&self) -> Result<BotIdentity, TransportError> {
        self.execute(self.client.post(self.api_url("getMe"))).await
    }

    /// Long-poll for updates after `offset`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` when the request fails or is rejected.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TransportError> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": POLL_TIMEOUT_SECS,
            "allowed_updates": ["message", "callback_query"],
        });
        self.execute(self.client.post(self.api_url("getUpdates")).json(&body))
            .await
    }

    async fn send_text(
        &self,
        user_id: UserId,
        message: &OutgoingMessage,
    ) -> Result<SentMessage, TransportError> {
        let mut body = serde_json::json!({
            "chat_id": user_id.value(),
            "text": message.text,
        });
        if let Some(markup) = reply_markup(&message.affordances) {
            body["reply_markup"] = markup;
        }
        self.execute(self.client.post(self.api_url("sendMessage")).json(&body))
            .await
    }

    async fn send_media(
        &self,
        user_id: UserId,
        message: &OutgoingMessage,
        media: &MediaRef,
    ) -> Result<SentMessage, TransportError> {
        let (method, field) = media_method(media.kind);
        let caption = (!message.text.is_empty()).then_some(message.text.as_str());
        let markup = reply_markup(&message.affordances);

        let request = match &media.uri {
            MediaUri::Url(url) => {
                let mut body = serde_json::json!({ "chat_id": user_id.value() });
                body[field] = url.as_str().into();
                if let Some(caption) = caption {
                    body["caption"] = caption.into();
                }
                if let Some(markup) = markup {
                    body["reply_markup"] = markup;
                }
                self.client.post(self.api_url(method)).json(&body)
            }
            MediaUri::FilePath(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| TransportError::Media(format!("{}: {e}", path.display())))?;
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("media")
                    .to_owned();
                let mut form = Form::new()
                    .text("chat_id", user_id.value().to_string())
                    .part(field, Part::bytes(bytes).file_name(file_name));
                if let Some(caption) = caption {
                    form = form.text("caption", caption.to_owned());
                }
                if let Some(markup) = markup {
                    form = form.text("reply_markup", markup.to_string());
                }
                self.client.post(self.api_url(method)).multipart(form)
            }
        };

        self.execute(request).await.map_err(|err| match err {
            TransportError::Rejected {
                status: 400,
                description,
            } => TransportError::Media(description),
            other => other,
        })
    }
}

#[async_trait]
impl Transport for TelegramClient {
    async fn send(
        &self,
        user_id: UserId,
        message: &OutgoingMessage,
    ) -> Result<MessageId, TransportError> {
        let sent = match &message.media {
            Some(media) => self.send_media(user_id, message, media).await?,
            None => self.send_text(user_id, message).await?,
        };
        tracing::debug!(%user_id, message_id = sent.message_id, "message sent");
        Ok(MessageId::new(sent.message_id))
    }

    async fn delete(
        &self,
        user_id: UserId,
        message_id: MessageId,
    ) -> Result<DeleteOutcome, TransportError> {
        let body = serde_json::json!({
            "chat_id": user_id.value(),
            "message_id": message_id.value(),
        });
        let request = self.client.post(self.api_url("deleteMessage")).json(&body);
        match self.execute::<bool>(request).await {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(TransportError::Rejected {
                status: 400,
                description,
            }) if is_missing_message(&description) => Ok(DeleteOutcome::NotFound),
            Err(err) => Err(err),
        }
    }

    async fn answer_event(&self, ack: &str) -> Result<(), TransportError> {
        let body = serde_json::json!({ "callback_query_id": ack });
        let request = self
            .client
            .post(self.api_url("answerCallbackQuery"))
            .json(&body);
        self.execute::<bool>(request).await.map(|_| ())
    }
}
