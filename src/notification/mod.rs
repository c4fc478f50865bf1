pub mod action;
pub mod telegram;

use async_trait::async_trait;
use thiserror::Error;

use self::action::Action;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rejected with status {status}: {description}")]
    Rejected { status: u16, description: String },
}

/// A button attached to a message. Pressing it delivers `action` back as a callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Button {
    pub label: String,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutboundMessage {
    pub text: String,
    /// One button per row.
    pub buttons: Vec<Button>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    pub fn with_button(mut self, label: impl Into<String>, action: Action) -> Self {
        self.buttons.push(Button {
            label: label.into(),
            action,
        });
        self
    }
}

/// An operator event received from the messaging transport.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A text message, typically a `/command`.
    Command { chat_id: String, text: String },
    /// A button press carrying an encoded [`Action`] token.
    Callback {
        chat_id: String,
        callback_id: String,
        data: String,
    },
}

impl InboundEvent {
    pub fn chat_id(&self) -> &str {
        match self {
            InboundEvent::Command { chat_id, .. } | InboundEvent::Callback { chat_id, .. } => {
                chat_id
            }
        }
    }
}

/// Outbound side of the operator messaging channel.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn notify(&self, chat_id: &str, message: &OutboundMessage) -> Result<(), DeliveryError>;

    /// Acknowledge a button press so the client stops waiting on it.
    async fn acknowledge(&self, _callback_id: &str) -> Result<(), DeliveryError> {
        Ok(())
    }
}
