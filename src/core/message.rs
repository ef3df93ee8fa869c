use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Sender identity forced onto export lines that carry no sender.
pub const SYSTEM_SENDER: &str = "System";

/// Years whose RFC 3339 text form reads back; anything outside is treated as unparseable.
pub const STORABLE_YEARS: std::ops::RangeInclusive<i32> = 1..=9999;

pub fn is_storable_timestamp(ts: &DateTime<Utc>) -> bool {
    STORABLE_YEARS.contains(&ts.year())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Media,
    System,
    Reaction,
}

impl MessageType {
    /// Lenient mapping from a platform's type label; anything unknown is text.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "media" | "image" | "video" | "audio" | "file" => MessageType::Media,
            "system" => MessageType::System,
            "reaction" => MessageType::Reaction,
            _ => MessageType::Text,
        }
    }

    /// Media and system messages never count as important.
    pub fn can_be_important(self) -> bool {
        matches!(self, MessageType::Text | MessageType::Reaction)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Text => write!(f, "text"),
            MessageType::Media => write!(f, "media"),
            MessageType::System => write!(f, "system"),
            MessageType::Reaction => write!(f, "reaction"),
        }
    }
}

/// A single chat message after normalization, whatever platform it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub message_type: MessageType,
    pub is_important: bool,
    #[serde(default)]
    pub platform_data: Map<String, Value>,
    #[serde(default)]
    pub reactions: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl NormalizedMessage {
    pub fn new(
        sender: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
        message_type: MessageType,
        is_important: bool,
    ) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            timestamp,
            message_type,
            is_important,
            platform_data: Map::new(),
            reactions: Vec::new(),
            reply_to: None,
        }
    }

    pub fn is_system(&self) -> bool {
        self.message_type == MessageType::System
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl DateRange {
    /// Min/max over the given timestamps; `None` for an empty input.
    pub fn from_timestamps<I>(timestamps: I) -> Option<Self>
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        timestamps.into_iter().fold(None, |range, ts| match range {
            None => Some(DateRange { start_date: ts, end_date: ts }),
            Some(r) => Some(r.extend(ts)),
        })
    }

    pub fn extend(self, ts: DateTime<Utc>) -> Self {
        DateRange {
            start_date: self.start_date.min(ts),
            end_date: self.end_date.max(ts),
        }
    }
}

/// All messages of one upload plus the aggregates derived from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationBatch {
    pub messages: Vec<NormalizedMessage>,
    /// Distinct senders other than the main user, in order of first appearance.
    pub participants: Vec<String>,
    pub date_range: Option<DateRange>,
}

impl ConversationBatch {
    pub fn new(messages: Vec<NormalizedMessage>, main_user: &str) -> Self {
        let participants = extract_participants(&messages, Some(main_user));
        let date_range = DateRange::from_timestamps(messages.iter().map(|m| m.timestamp));

        Self {
            messages,
            participants,
            date_range,
        }
    }

    pub fn total_messages(&self) -> usize {
        self.messages.len()
    }
}

/// Distinct non-system senders in first-appearance order, minus `exclude`.
pub fn extract_participants(messages: &[NormalizedMessage], exclude: Option<&str>) -> Vec<String> {
    let mut participants: Vec<String> = Vec::new();

    for message in messages {
        if message.is_system() || message.sender.is_empty() {
            continue;
        }
        if exclude == Some(message.sender.as_str()) {
            continue;
        }
        if !participants.iter().any(|p| p == &message.sender) {
            participants.push(message.sender.clone());
        }
    }

    participants
}
