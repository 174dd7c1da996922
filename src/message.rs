//! Input message model and the enums that drive routing.
//!
//! A [`Message`] is the unit a caller hands to the dispatcher. It is
//! ephemeral: it exists for the duration of one publish call, after which the
//! serialized task envelope in the queue is the only surviving record.
//!
//! Field bounds are enforced at construction. An out-of-range content length
//! or timeout is rejected with a validation error, never clamped, so nothing
//! that reaches the transport can violate them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::error::Error;

/// Inferred communication medium for a message.
///
/// Always recomputed from content by the classifier; never persisted on its
/// own.
#[derive(
    Serialize, Deserialize, Display, EnumString, EnumIter, Debug, Clone, Copy, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChannelType {
    Sms,
    Email,
    Whatsapp,
}

impl ChannelType {
    /// Task name a worker resolves its handler by, e.g. `process_sms_message`.
    pub fn task_name(&self) -> String {
        format!("process_{self}_message")
    }
}

/// Priority tier. Affects queue selection and wire delivery weight.
#[derive(
    Serialize, Deserialize, Display, EnumString, EnumIter, Debug, Clone, Copy, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Numeric delivery weight attached at publish time.
    pub fn weight(&self) -> u8 {
        match self {
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }

    /// Parses a wire priority string, weighing unknown values as medium.
    ///
    /// Foreign publishers may write priority strings this crate never
    /// produces; on the consume side those read back as [`Priority::Medium`].
    /// On the publish side unknown strings are a validation error instead.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(Self::Medium)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

pub const MAX_CONTENT_CHARS: usize = 1000;
pub const MIN_TIMEOUT_SECS: u32 = 1;
pub const MAX_TIMEOUT_SECS: u32 = 300;
pub const DEFAULT_TIMEOUT_SECS: u32 = 30;

const PREVIEW_CHARS: usize = 50;

/// A validated message awaiting dispatch.
#[derive(Serialize, Debug, Clone)]
pub struct Message {
    content: String,
    timeout: u32,
    priority: Priority,
    metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    /// Builds a message, enforcing the content and timeout bounds.
    pub fn new(
        content: impl Into<String>,
        timeout: u32,
        priority: Priority,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Self, Error> {
        let content = content.into();

        let len = content.chars().count();
        if len == 0 || len > MAX_CONTENT_CHARS {
            return Err(Error::validation(format!(
                "content length must be in 1..={MAX_CONTENT_CHARS}, got {len}"
            )));
        }

        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&timeout) {
            return Err(Error::validation(format!(
                "timeout must be in {MIN_TIMEOUT_SECS}..={MAX_TIMEOUT_SECS} seconds, got {timeout}"
            )));
        }

        Ok(Self {
            content,
            timeout,
            priority,
            metadata,
        })
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timeout(&self) -> u32 {
        self.timeout
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn metadata(&self) -> &HashMap<String, serde_json::Value> {
        &self.metadata
    }

    /// Routing summary reported back to the publishing caller.
    pub fn info(&self, channel: ChannelType) -> MessageInfo {
        MessageInfo {
            r#type: channel,
            priority: self.priority,
            content_length: self.content.chars().count(),
            timeout: self.timeout,
            content_preview: preview(&self.content),
        }
    }
}

/// What the publish response reports about a routed message.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MessageInfo {
    pub r#type: ChannelType,
    pub priority: Priority,
    pub content_length: usize,
    pub timeout: u32,
    pub content_preview: String,
}

fn preview(content: &str) -> String {
    if content.chars().count() > PREVIEW_CHARS {
        let head: String = content.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        content.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(content: &str, timeout: u32) -> Result<Message, Error> {
        Message::new(content, timeout, Priority::default(), HashMap::new())
    }

    #[test]
    fn rejects_empty_content() {
        assert!(msg("", 30).is_err());
    }

    #[test]
    fn rejects_oversized_content() {
        let content = "x".repeat(MAX_CONTENT_CHARS + 1);
        assert!(msg(&content, 30).is_err());
        assert!(msg(&"x".repeat(MAX_CONTENT_CHARS), 30).is_ok());
    }

    #[test]
    fn rejects_out_of_range_timeout() {
        assert!(msg("hello", 0).is_err());
        assert!(msg("hello", 301).is_err());
        assert!(msg("hello", 1).is_ok());
        assert!(msg("hello", 300).is_ok());
    }

    #[test]
    fn preview_truncates_at_fifty_chars() {
        let long = "a".repeat(80);
        let message = msg(&long, 30).unwrap();
        let info = message.info(ChannelType::Sms);
        assert_eq!(info.content_preview, format!("{}...", "a".repeat(50)));

        let short = msg("short", 30).unwrap();
        assert_eq!(short.info(ChannelType::Sms).content_preview, "short");
    }

    #[test]
    fn priority_weights() {
        assert_eq!(Priority::High.weight(), 3);
        assert_eq!(Priority::Medium.weight(), 2);
        assert_eq!(Priority::Low.weight(), 1);
        assert_eq!(Priority::parse_lenient("urgent"), Priority::Medium);
        assert_eq!(Priority::parse_lenient("low"), Priority::Low);
    }

    #[test]
    fn task_names() {
        assert_eq!(ChannelType::Email.task_name(), "process_email_message");
        assert_eq!(ChannelType::Sms.task_name(), "process_sms_message");
        assert_eq!(
            ChannelType::Whatsapp.task_name(),
            "process_whatsapp_message"
        );
    }
}
