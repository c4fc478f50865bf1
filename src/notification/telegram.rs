use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{DeliveryError, InboundEvent, NotificationChannel, OutboundMessage};

/// Long-poll window requested from `getUpdates`.
pub const POLL_TIMEOUT_SECS: u64 = 30;

/// Telegram Bot API client: message delivery and update polling.
#[derive(Clone)]
pub struct TelegramBot {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

// ── Bot API payloads ─────────────────────────────────────────

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup>,
}

#[derive(Serialize)]
struct InlineKeyboardMarkup {
    inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Serialize)]
struct InlineKeyboardButton {
    text: String,
    callback_data: String,
}

#[derive(Serialize)]
struct AnswerCallbackQuery<'a> {
    callback_query_id: &'a str,
}

#[derive(Serialize)]
struct GetUpdates {
    offset: i64,
    timeout: u64,
    allowed_updates: [&'static str; 2],
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub data: Option<String>,
    pub message: Option<Message>,
}

impl Update {
    /// Updates without text or callback data (joins, stickers, ...) yield `None`.
    pub fn into_event(self) -> Option<InboundEvent> {
        if let Some(query) = self.callback_query {
            let chat_id = query.message?.chat.id.to_string();
            return Some(InboundEvent::Callback {
                chat_id,
                callback_id: query.id,
                data: query.data?,
            });
        }
        let message = self.message?;
        Some(InboundEvent::Command {
            chat_id: message.chat.id.to_string(),
            text: message.text?,
        })
    }
}

impl TelegramBot {
    pub fn new(api_url: &str, token: &str) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            // must outlive the getUpdates long poll
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 15))
            .connect_timeout(Duration::from_secs(5))
            .user_agent("allowance-relay/0.1")
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    async fn call<B: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T, DeliveryError> {
        // The URL embeds the bot token, so errors are stripped of it.
        let url = format!("{}/bot{}/{}", self.api_url, self.token, method);
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.without_url()))?;
        let status = resp.status();

        let parsed: ApiResponse<T> = match resp.json().await {
            Ok(parsed) => parsed,
            Err(e) if status.is_success() => {
                return Err(DeliveryError::Transport(e.without_url()))
            }
            Err(_) => {
                return Err(DeliveryError::Rejected {
                    status: status.as_u16(),
                    description: status.to_string(),
                })
            }
        };

        match parsed {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            other => Err(DeliveryError::Rejected {
                status: status.as_u16(),
                description: other
                    .description
                    .unwrap_or_else(|| format!("{} failed", method)),
            }),
        }
    }

    /// Fetch pending updates starting at `offset`, waiting up to `timeout_secs`.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, DeliveryError> {
        let body = GetUpdates {
            offset,
            timeout: timeout_secs,
            allowed_updates: ["message", "callback_query"],
        };
        self.call("getUpdates", &body).await
    }
}

#[async_trait]
impl NotificationChannel for TelegramBot {
    async fn notify(&self, chat_id: &str, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let reply_markup = if message.buttons.is_empty() {
            None
        } else {
            Some(InlineKeyboardMarkup {
                inline_keyboard: message
                    .buttons
                    .iter()
                    .map(|b| {
                        vec![InlineKeyboardButton {
                            text: b.label.clone(),
                            callback_data: b.action.encode(),
                        }]
                    })
                    .collect(),
            })
        };

        let body = SendMessage {
            chat_id,
            text: &message.text,
            reply_markup,
        };
        let _: serde_json::Value = self.call("sendMessage", &body).await?;
        tracing::debug!(chat_id, buttons = message.buttons.len(), "telegram message sent");
        Ok(())
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<(), DeliveryError> {
        let body = AnswerCallbackQuery {
            callback_query_id: callback_id,
        };
        let _: bool = self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(json: serde_json::Value) -> Update {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_text_message_becomes_command_event() {
        let event = update(serde_json::json!({
            "update_id": 7,
            "message": { "message_id": 1, "chat": { "id": -100123, "type": "group" }, "text": "/list" }
        }))
        .into_event();

        assert_eq!(
            event,
            Some(InboundEvent::Command {
                chat_id: "-100123".into(),
                text: "/list".into()
            })
        );
    }

    #[test]
    fn test_callback_query_becomes_callback_event() {
        let event = update(serde_json::json!({
            "update_id": 8,
            "callback_query": {
                "id": "cb-1",
                "data": "balance:TAbc",
                "message": { "message_id": 2, "chat": { "id": 42 } }
            }
        }))
        .into_event();

        assert_eq!(
            event,
            Some(InboundEvent::Callback {
                chat_id: "42".into(),
                callback_id: "cb-1".into(),
                data: "balance:TAbc".into()
            })
        );
    }

    #[tokio::test]
    async fn test_transport_errors_do_not_leak_token() {
        let bot = TelegramBot::new("http://127.0.0.1:1", "999:SECRET_BOT_TOKEN").unwrap();
        let message = OutboundMessage::text("hi");

        let err = bot.notify("42", &message).await.unwrap_err();

        assert!(matches!(err, DeliveryError::Transport(_)));
        assert!(!format!("{} {:?}", err, err).contains("SECRET_BOT_TOKEN"));
    }

    #[test]
    fn test_updates_without_text_are_skipped() {
        let event = update(serde_json::json!({
            "update_id": 9,
            "message": { "message_id": 3, "chat": { "id": 42 } }
        }))
        .into_event();
        assert!(event.is_none());
    }
}
