use crate::error::Error;
use serde::Serialize;
use serde_json::Value;
use std::sync::Mutex;
use tracing::debug;

/// Message kinds in increasing priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Info,
    Error,
    Connection,
    Diagnostics,
}

/// A user-visible message with optional structured context
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub message: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub icon: Option<String>,
    pub context: Option<Value>,
}

impl Message {
    pub fn info(message: impl Into<String>) -> Self {
        Message {
            message: message.into(),
            message_type: MessageType::Info,
            icon: None,
            context: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Message {
            message_type: MessageType::Error,
            ..Message::info(message)
        }
    }
}

impl From<&Error> for Message {
    fn from(error: &Error) -> Self {
        let message_type = match error {
            Error::Hass(_) => MessageType::Connection,
            _ => MessageType::Error,
        };
        Message {
            message: error.to_string(),
            message_type,
            icon: None,
            context: error.context(),
        }
    }
}

/// Holds the single message currently shown by the card.
///
/// A new message only replaces the current one if its priority is at least as
/// high, so a connection problem is never masked by a routine error.
#[derive(Default)]
pub struct MessageManager {
    current: Mutex<Option<Message>>,
}

impl MessageManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_message(&self) -> bool {
        self.current.lock().map(|m| m.is_some()).unwrap_or(false)
    }

    pub fn get_message(&self) -> Option<Message> {
        self.current.lock().ok().and_then(|m| m.clone())
    }

    pub fn reset(&self) {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
    }

    /// Clear the current message only if it is of the given type.
    pub fn reset_type(&self, message_type: MessageType) {
        if let Ok(mut current) = self.current.lock() {
            if current.as_ref().is_some_and(|m| m.message_type == message_type) {
                *current = None;
            }
        }
    }

    /// Returns true if the message was accepted.
    pub fn set_message_if_higher_priority(&self, message: Message) -> bool {
        let Ok(mut current) = self.current.lock() else {
            return false;
        };
        if current
            .as_ref()
            .is_some_and(|existing| existing.message_type > message.message_type)
        {
            debug!(
                "[MessageManager] Dropping {:?} message, {:?} already shown",
                message.message_type,
                current.as_ref().map(|m| m.message_type)
            );
            return false;
        }
        *current = Some(message);
        true
    }

    pub fn set_error_if_higher_priority(&self, error: &Error) -> bool {
        self.set_message_if_higher_priority(Message::from(error))
    }
}
