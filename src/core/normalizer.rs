//! Turns one upload, whatever platform it came from, into a `ConversationBatch`.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::error::{PipelineError, Result};
use super::keywords::KeywordTables;
use super::message::{is_storable_timestamp, ConversationBatch, MessageType, NormalizedMessage};
use super::whatsapp::ExportParser;

pub const UNKNOWN_SENDER: &str = "Unknown";

fn default_platform() -> String {
    "unknown".to_string()
}

fn default_group_name() -> String {
    "Unknown Group".to_string()
}

fn default_conversation_type() -> String {
    "group".to_string()
}

/// One conversation upload as handed to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationPayload {
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default)]
    pub main_user: Option<String>,
    #[serde(default = "default_group_name")]
    pub group_name: String,
    #[serde(default = "default_conversation_type")]
    pub conversation_type: String,
    /// Raw export text (WhatsApp only).
    #[serde(default)]
    pub conversation: Option<String>,
    /// Pre-structured message records.
    #[serde(default)]
    pub messages: Option<Vec<Value>>,
    #[serde(default)]
    pub platform_specific_data: Map<String, Value>,
}

impl ConversationPayload {
    pub fn new(platform: impl Into<String>, main_user: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            main_user: Some(main_user.into()),
            group_name: default_group_name(),
            conversation_type: default_conversation_type(),
            conversation: None,
            messages: None,
            platform_specific_data: Map::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.conversation = Some(text.into());
        self
    }

    pub fn with_messages(mut self, messages: Vec<Value>) -> Self {
        self.messages = Some(messages);
        self
    }

    /// The main user identity, if present and non-blank.
    pub fn main_user(&self) -> Option<&str> {
        self.main_user.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

/// The shapes a message timestamp can arrive in.
///
/// JSON records only ever yield `Epoch`, `Text` or `Missing`; `Structured` is
/// for callers building records in code with a timestamp already in hand.
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampInput {
    Structured(DateTime<Utc>),
    /// Seconds since the Unix epoch.
    Epoch(f64),
    Text(String),
    Missing,
}

impl From<Option<&Value>> for TimestampInput {
    fn from(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Number(n)) => n.as_f64().map(TimestampInput::Epoch).unwrap_or(TimestampInput::Missing),
            Some(Value::String(s)) => TimestampInput::Text(s.clone()),
            _ => TimestampInput::Missing,
        }
    }
}

/// Coerce a timestamp, substituting the current time for anything unusable.
pub fn coerce_timestamp(input: &TimestampInput) -> DateTime<Utc> {
    let parsed = match input {
        TimestampInput::Structured(ts) => Some(*ts),
        TimestampInput::Epoch(secs) => from_epoch(*secs),
        TimestampInput::Text(s) => parse_iso8601(s),
        TimestampInput::Missing => None,
    };

    parsed.filter(is_storable_timestamp).unwrap_or_else(|| {
        debug!(?input, "unusable timestamp, using current time");
        Utc::now()
    })
}

fn from_epoch(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round() as u32;
    Utc.timestamp_opt(whole as i64, nanos.min(999_999_999)).single()
}

/// ISO-8601 with an offset or trailing `Z`; offset-less values are read as UTC.
pub fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn str_field<'a>(record: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}

fn id_field(record: &Map<String, Value>, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Field extraction shared by every structured path.
fn read_record(record: &Map<String, Value>, keywords: &KeywordTables) -> NormalizedMessage {
    let sender = str_field(record, "sender")
        .or_else(|| str_field(record, "username"))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_SENDER);
    let content = str_field(record, "content").unwrap_or_default();
    let message_type = str_field(record, "type")
        .or_else(|| str_field(record, "message_type"))
        .map(MessageType::from_label)
        .unwrap_or(MessageType::Text);

    let mut message = NormalizedMessage::new(
        sender,
        content,
        coerce_timestamp(&TimestampInput::from(record.get("timestamp"))),
        message_type,
        keywords.is_important(content, message_type),
    );
    message.reactions = record
        .get("reactions")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    message.reply_to = id_field(record, "reply_to");
    message
}

fn platform_data(platform: &str, record: &Map<String, Value>) -> Map<String, Value> {
    let field = |key: &str, default: Value| record.get(key).cloned().unwrap_or(default);

    let mut data = Map::new();
    match platform {
        "whatsapp" => {}
        "instagram" => {
            data.insert(
                "instagram_data".to_string(),
                json!({
                    "message_id": field("message_id", Value::Null),
                    "is_dm": field("is_dm", Value::Bool(false)),
                    "has_media": field("has_media", Value::Bool(false)),
                    "reactions": field("reactions", json!([])),
                }),
            );
        }
        "discord" => {
            data.insert(
                "discord_data".to_string(),
                json!({
                    "message_id": field("message_id", Value::Null),
                    "channel_id": field("channel_id", Value::Null),
                    "guild_id": field("guild_id", Value::Null),
                    "is_bot": field("is_bot", Value::Bool(false)),
                    "attachments": field("attachments", json!([])),
                }),
            );
        }
        _ => {
            data.insert("is_group".to_string(), field("isGroup", Value::Bool(false)));
            data.insert("conversation_name".to_string(), field("conversationName", json!("")));
            data.insert("app_id".to_string(), field("appId", json!("")));
        }
    }

    if let Some(Value::Object(extra)) = record.get("platform_specific_data") {
        for (k, v) in extra {
            data.insert(k.clone(), v.clone());
        }
    }
    data
}

pub struct PlatformNormalizer<'a> {
    keywords: &'a KeywordTables,
}

impl<'a> PlatformNormalizer<'a> {
    pub fn new(keywords: &'a KeywordTables) -> Self {
        Self { keywords }
    }

    /// Normalize an upload. Fails without a main user or when nothing usable is left.
    pub fn normalize(&self, payload: &ConversationPayload) -> Result<ConversationBatch> {
        let main_user = payload.main_user().ok_or(PipelineError::MissingMainUser)?;
        let platform = payload.platform.trim().to_lowercase();

        let messages = match platform.as_str() {
            "whatsapp" => self.whatsapp_messages(payload),
            _ => self.structured_messages(&platform, payload.messages.as_deref().unwrap_or_default()),
        };

        if messages.is_empty() {
            return Err(PipelineError::NoValidMessages);
        }

        let batch = ConversationBatch::new(messages, main_user);
        info!(
            platform = %platform,
            messages = batch.total_messages(),
            participants = batch.participants.len(),
            "normalized conversation"
        );
        Ok(batch)
    }

    fn whatsapp_messages(&self, payload: &ConversationPayload) -> Vec<NormalizedMessage> {
        if let Some(ref text) = payload.conversation {
            ExportParser::new(self.keywords.clone()).parse_text(text).messages
        } else if let Some(ref records) = payload.messages {
            self.structured_messages("whatsapp", records)
        } else {
            Vec::new()
        }
    }

    fn structured_messages(&self, platform: &str, records: &[Value]) -> Vec<NormalizedMessage> {
        records
            .iter()
            .filter_map(|value| match value.as_object() {
                Some(record) => {
                    let mut message = read_record(record, self.keywords);
                    message.platform_data = platform_data(platform, record);
                    Some(message)
                }
                None => {
                    debug!(%value, "skipping non-object message record");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn normalize(payload: &ConversationPayload) -> Result<ConversationBatch> {
        let keywords = KeywordTables::default();
        PlatformNormalizer::new(&keywords).normalize(payload)
    }

    #[test]
    fn test_whatsapp_text_payload() {
        let payload = ConversationPayload::new("whatsapp", "Dave").with_text(
            "[12/25/23, 2:30 PM] Alice: Let's meet tomorrow!\n[12/25/23, 2:31 PM] Dave: sure",
        );
        let batch = normalize(&payload).unwrap();

        assert_eq!(batch.total_messages(), 2);
        assert_eq!(batch.participants, vec!["Alice"]);
    }

    #[test]
    fn test_whatsapp_structured_payload() {
        let payload = ConversationPayload::new("whatsapp", "Dave").with_messages(vec![
            json!({"username": "Alice", "content": "hi", "timestamp": "2024-01-01T10:00:00Z"}),
        ]);
        let batch = normalize(&payload).unwrap();
        assert_eq!(batch.messages[0].sender, "Alice");
    }

    #[test]
    fn test_generic_prefers_sender_over_username() {
        let payload = ConversationPayload::new("telegram", "Dave").with_messages(vec![
            json!({"sender": "Erin", "username": "erin_99", "content": "yo"}),
            json!({"username": "Frank", "content": "hello"}),
            json!({"content": "who am I"}),
        ]);
        let batch = normalize(&payload).unwrap();
        let senders: Vec<_> = batch.messages.iter().map(|m| m.sender.as_str()).collect();
        assert_eq!(senders, vec!["Erin", "Frank", UNKNOWN_SENDER]);
    }

    #[test]
    fn test_generic_defaults() {
        let before = Utc::now();
        let payload = ConversationPayload::new("other", "Dave")
            .with_messages(vec![json!({"sender": "Erin", "timestamp": "not a date"})]);
        let batch = normalize(&payload).unwrap();
        let msg = &batch.messages[0];

        assert_eq!(msg.content, "");
        assert_eq!(msg.message_type, MessageType::Text);
        assert!(!msg.is_important);
        assert!(msg.timestamp >= before);
        assert_eq!(msg.platform_data["is_group"], json!(false));
    }

    #[test]
    fn test_discord_platform_data_and_reply() {
        let payload = ConversationPayload::new("discord", "Dave").with_messages(vec![json!({
            "username": "Gina",
            "content": "gg",
            "timestamp": 1700000000,
            "channel_id": "c1",
            "reply_to": 42,
            "reactions": [{"emoji": "🔥", "count": 2}],
            "platform_specific_data": {"thread": "t9"}
        })]);
        let batch = normalize(&payload).unwrap();
        let msg = &batch.messages[0];

        assert_eq!(msg.platform_data["discord_data"]["channel_id"], json!("c1"));
        assert_eq!(msg.platform_data["thread"], json!("t9"));
        assert_eq!(msg.reply_to.as_deref(), Some("42"));
        assert_eq!(msg.reactions.len(), 1);
        assert_eq!(msg.timestamp, Utc.timestamp_opt(1_700_000_000, 0).unwrap());
    }

    #[test]
    fn test_missing_main_user() {
        let mut payload = ConversationPayload::new("whatsapp", "")
            .with_text("[12/25/23, 2:30 PM] Alice: hi");
        assert!(matches!(normalize(&payload), Err(PipelineError::MissingMainUser)));

        payload.main_user = None;
        assert!(matches!(normalize(&payload), Err(PipelineError::MissingMainUser)));
    }

    #[test]
    fn test_empty_messages_fail() {
        let payload = ConversationPayload::new("instagram", "Dave").with_messages(vec![]);
        assert!(matches!(normalize(&payload), Err(PipelineError::NoValidMessages)));

        let payload = ConversationPayload::new("whatsapp", "Dave").with_text("no export lines here");
        assert!(matches!(normalize(&payload), Err(PipelineError::NoValidMessages)));
    }

    #[test]
    fn test_every_sender_is_a_participant() {
        let payload = ConversationPayload::new("instagram", "Dave").with_messages(vec![
            json!({"username": "Bob", "content": "a"}),
            json!({"username": "Carol", "content": "b"}),
            json!({"username": "Carol", "content": "c"}),
            json!({"username": "Dave", "content": "d"}),
        ]);
        let batch = normalize(&payload).unwrap();
        assert_eq!(batch.participants, vec!["Bob", "Carol"]);
    }

    #[test]
    fn test_coerce_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();

        assert_eq!(coerce_timestamp(&TimestampInput::Structured(expected)), expected);
        assert_eq!(coerce_timestamp(&TimestampInput::Epoch(expected.timestamp() as f64)), expected);
        assert_eq!(coerce_timestamp(&TimestampInput::Text("2024-02-03T04:05:06Z".into())), expected);
        assert_eq!(coerce_timestamp(&TimestampInput::Text("2024-02-03T06:05:06+02:00".into())), expected);
        assert_eq!(coerce_timestamp(&TimestampInput::Text("2024-02-03T04:05:06".into())), expected);
    }

    #[test]
    fn test_coerce_timestamp_fallback() {
        let before = Utc::now();
        assert!(coerce_timestamp(&TimestampInput::Missing) >= before);
        assert!(coerce_timestamp(&TimestampInput::Epoch(f64::NAN)) >= before);
        assert!(coerce_timestamp(&TimestampInput::Text("yesterday".into())) >= before);
    }

    #[test]
    fn test_millisecond_epoch_falls_back_to_now() {
        let before = Utc::now();
        let ts = coerce_timestamp(&TimestampInput::Epoch(1_700_000_000_000.0));
        assert!(ts >= before);
        assert!(ts.year() <= 9999);

        assert!(coerce_timestamp(&TimestampInput::Text("+55840-11-08T22:13:20Z".into())) >= before);
    }

    #[test]
    fn test_payload_deserializes_with_defaults() {
        let payload: ConversationPayload =
            serde_json::from_value(json!({"main_user": "Dave", "messages": []})).unwrap();
        assert_eq!(payload.platform, "unknown");
        assert_eq!(payload.group_name, "Unknown Group");
        assert_eq!(payload.conversation_type, "group");
    }
}
