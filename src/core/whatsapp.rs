//! WhatsApp export parsing.
//!
//! Exports differ by locale and app version, so this is a best-effort grammar:
//! each line is matched against an ordered list of layouts and the first one
//! that fits wins. Lines matching none of them (wrapped continuation lines,
//! headers) are skipped without failing the export.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use super::error::{PipelineError, Result};
use super::keywords::KeywordTables;
use super::message::{extract_participants, is_storable_timestamp, DateRange, MessageType, NormalizedMessage, SYSTEM_SENDER};

const DATE: &str = r"(\d{1,2}/\d{1,2}/\d{2,4})";
const TIME: &str = r"(\d{1,2}:\d{2}(?::\d{2})?(?:\s*[AaPp][Mm])?)";

/// Marker WhatsApp writes in place of an attachment's body.
const ATTACHED: &str = "<attached:";

static STANDARD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^\[{DATE},?\s*{TIME}\]\s*(.+?):\s*(.+)$")).expect("standard line regex must compile")
});
static ALTERNATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^{DATE},?\s*{TIME}\s*-\s*(.+?):\s*(.+)$")).expect("alternative line regex must compile")
});
static MEDIA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^\[{DATE},?\s*{TIME}\]\s*(.+?):\s*\x{{200E}}?<attached:\s*(.+)>")).expect("media line regex must compile")
});
static SYSTEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^\[{DATE},?\s*{TIME}\]\s*(.+)$")).expect("system line regex must compile")
});

/// Line layouts, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineShape {
    /// `[12/25/23, 2:30 PM] Alice: text`
    Standard,
    /// `12/25/23, 14:30 - Alice: text`
    Alternative,
    /// `[12/25/23, 2:30 PM] Alice: <attached: photo.jpg>`
    Media,
    /// `[12/25/23, 2:30 PM] Alice created group "Trip"`
    System,
}

impl LineShape {
    pub const ORDER: [LineShape; 4] = [
        LineShape::Standard,
        LineShape::Alternative,
        LineShape::Media,
        LineShape::System,
    ];

    fn pattern(self) -> &'static Regex {
        match self {
            LineShape::Standard => &STANDARD,
            LineShape::Alternative => &ALTERNATIVE,
            LineShape::Media => &MEDIA,
            LineShape::System => &SYSTEM,
        }
    }

    fn build(self, caps: &Captures<'_>, keywords: &KeywordTables) -> Option<NormalizedMessage> {
        let timestamp = timestamp_or_now(&caps[1], &caps[2]);

        match self {
            LineShape::Standard | LineShape::Alternative => {
                let content = caps[4].trim();
                // Bracketed attachments belong to the media layout even though
                // they also look like plain text.
                if self == LineShape::Standard && content.trim_start_matches('\u{200e}').starts_with(ATTACHED) {
                    return None;
                }
                Some(NormalizedMessage::new(
                    caps[3].trim(),
                    content,
                    timestamp,
                    MessageType::Text,
                    keywords.is_important(content, MessageType::Text),
                ))
            }
            LineShape::Media => Some(NormalizedMessage::new(
                caps[3].trim(),
                format!("<attached: {}>", caps[4].trim()),
                timestamp,
                MessageType::Media,
                false,
            )),
            LineShape::System => Some(NormalizedMessage::new(
                SYSTEM_SENDER,
                caps[3].trim(),
                timestamp,
                MessageType::System,
                false,
            )),
        }
    }
}

/// Outcome of parsing a whole export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResult {
    pub messages: Vec<NormalizedMessage>,
    pub participants: Vec<String>,
    pub total_messages: usize,
    pub date_range: Option<DateRange>,
    pub parsed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ExportParser {
    keywords: KeywordTables,
}

impl ExportParser {
    pub fn new(keywords: KeywordTables) -> Self {
        Self { keywords }
    }

    /// Classify one export line, or `None` if no layout matches.
    pub fn classify_line(&self, line: &str) -> Option<NormalizedMessage> {
        let line = line.trim_start_matches(['\u{feff}', '\u{200e}']).trim_end();
        if line.is_empty() {
            return None;
        }

        LineShape::ORDER.iter().find_map(|shape| {
            shape
                .pattern()
                .captures(line)
                .and_then(|caps| shape.build(&caps, &self.keywords))
        })
    }

    pub fn parse_text(&self, text: &str) -> ParseResult {
        let mut messages = Vec::new();
        let mut date_range: Option<DateRange> = None;
        let mut skipped = 0usize;

        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match self.classify_line(line) {
                Some(message) => {
                    date_range = Some(match date_range {
                        Some(range) => range.extend(message.timestamp),
                        None => DateRange {
                            start_date: message.timestamp,
                            end_date: message.timestamp,
                        },
                    });
                    messages.push(message);
                }
                None => {
                    skipped += 1;
                    debug!(line, "skipping unrecognised export line");
                }
            }
        }

        let participants = extract_participants(&messages, None);
        info!(
            messages = messages.len(),
            participants = participants.len(),
            skipped,
            "parsed export"
        );

        ParseResult {
            total_messages: messages.len(),
            messages,
            participants,
            date_range,
            parsed_at: Utc::now(),
        }
    }

    /// Read and parse an export file. Fails only if the file cannot be read or
    /// is not valid UTF-8.
    pub fn parse_file(&self, path: &Path) -> Result<ParseResult> {
        let bytes = std::fs::read(path)?;
        let text = String::from_utf8(bytes)
            .map_err(|e| PipelineError::Decode(format!("{}: {}", path.display(), e)))?;
        Ok(self.parse_text(&text))
    }
}

/// Combine an export date and time, falling back to the current time when
/// either part does not parse.
pub fn timestamp_or_now(date: &str, time: &str) -> DateTime<Utc> {
    match parse_export_datetime(date, time).map(|naive| naive.and_utc()) {
        Some(ts) if is_storable_timestamp(&ts) => ts,
        _ => {
            debug!(date, time, "unparseable export timestamp, using current time");
            Utc::now()
        }
    }
}

pub fn parse_export_datetime(date: &str, time: &str) -> Option<NaiveDateTime> {
    Some(NaiveDateTime::new(parse_export_date(date)?, parse_export_time(time)?))
}

/// `M/D/YY` or `M/D/YYYY`; two-digit years are taken as 20YY.
pub fn parse_export_date(date: &str) -> Option<NaiveDate> {
    let mut parts = date.trim().split('/');
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    let year_str = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let year: i32 = match year_str.len() {
        2 => 2000 + year_str.parse::<i32>().ok()?,
        4 => year_str.parse().ok()?,
        _ => return None,
    };

    NaiveDate::from_ymd_opt(year, month, day)
}

/// `H:MM`, `H:MM:SS`, optionally followed by `AM`/`PM` in any case, with or
/// without a space before the suffix.
pub fn parse_export_time(time: &str) -> Option<NaiveTime> {
    let lowered = time.trim().to_lowercase();
    let (clock, meridiem) = if let Some(rest) = lowered.strip_suffix("am") {
        (rest.trim_end(), Some(false))
    } else if let Some(rest) = lowered.strip_suffix("pm") {
        (rest.trim_end(), Some(true))
    } else {
        (lowered.as_str(), None)
    };

    let fields: Vec<&str> = clock.split(':').collect();
    if fields.len() < 2 || fields.len() > 3 {
        return None;
    }
    let hour: u32 = fields[0].parse().ok()?;
    let minute: u32 = fields[1].parse().ok()?;
    let second: u32 = match fields.get(2) {
        Some(s) => s.parse().ok()?,
        None => 0,
    };

    let hour = match meridiem {
        Some(pm) => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            hour % 12 + if pm { 12 } else { 0 }
        }
        None => hour,
    };

    NaiveTime::from_hms_opt(hour, minute, second)
}

/// Most recent important message per sender, newest first, at most `max_updates`.
pub fn extract_key_updates(messages: &[NormalizedMessage], max_updates: usize) -> Vec<NormalizedMessage> {
    let mut important: Vec<&NormalizedMessage> = messages.iter().filter(|m| m.is_important).collect();
    important.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut updates: Vec<NormalizedMessage> = Vec::new();
    for message in important {
        if !updates.iter().any(|u| u.sender == message.sender) {
            updates.push(message.clone());
        }
    }

    updates.truncate(max_updates);
    updates
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};
    use std::io::Write;

    fn parser() -> ExportParser {
        ExportParser::default()
    }

    #[test]
    fn test_standard_line() {
        let msg = parser()
            .classify_line("[12/25/23, 2:30 PM] Alice: Let's meet tomorrow!")
            .unwrap();

        assert_eq!(msg.sender, "Alice");
        assert_eq!(msg.content, "Let's meet tomorrow!");
        assert_eq!(msg.message_type, MessageType::Text);
        assert!(msg.is_important);
        assert_eq!(msg.timestamp, Utc.with_ymd_and_hms(2023, 12, 25, 14, 30, 0).unwrap());
    }

    #[test]
    fn test_alternative_line() {
        let msg = parser()
            .classify_line("3/7/2024, 09:15 - Bob: morning all")
            .unwrap();

        assert_eq!(msg.sender, "Bob");
        assert_eq!(msg.content, "morning all");
        assert!(!msg.is_important);
        assert_eq!(msg.timestamp, Utc.with_ymd_and_hms(2024, 3, 7, 9, 15, 0).unwrap());
    }

    #[test]
    fn test_media_line() {
        let msg = parser()
            .classify_line("[1/2/24, 10:00:05] Carol: <attached: 00000012-PHOTO.jpg>")
            .unwrap();

        assert_eq!(msg.sender, "Carol");
        assert_eq!(msg.content, "<attached: 00000012-PHOTO.jpg>");
        assert_eq!(msg.message_type, MessageType::Media);
        assert!(!msg.is_important);
        assert_eq!(msg.timestamp, Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 5).unwrap());
    }

    #[test]
    fn test_system_line() {
        let msg = parser()
            .classify_line("[1/2/24, 10:00] Messages are end-to-end encrypted.")
            .unwrap();

        assert_eq!(msg.sender, SYSTEM_SENDER);
        assert_eq!(msg.content, "Messages are end-to-end encrypted.");
        assert_eq!(msg.message_type, MessageType::System);
        assert!(!msg.is_important);
    }

    #[test]
    fn test_unmatched_line_is_skipped() {
        assert!(parser().classify_line("just a wrapped continuation line").is_none());
        assert!(parser().classify_line("").is_none());
    }

    #[test]
    fn test_sender_keeps_calendar_day() {
        let msg = parser()
            .classify_line("[7/4/2023, 11:59 pm] Dan Smith: fireworks at 9:30?")
            .unwrap();

        assert_eq!(msg.sender, "Dan Smith");
        assert_eq!(msg.content, "fireworks at 9:30?");
        assert_eq!((msg.timestamp.year(), msg.timestamp.month(), msg.timestamp.day()), (2023, 7, 4));
        assert_eq!(msg.timestamp.hour(), 23);
    }

    #[test]
    fn test_narrow_space_before_meridiem() {
        let msg = parser()
            .classify_line("[12/25/23, 2:30\u{202f}AM] Alice: hi")
            .unwrap();
        assert_eq!(msg.timestamp.hour(), 2);
    }

    #[test]
    fn test_bad_date_falls_back_to_now() {
        let before = Utc::now();
        let msg = parser().classify_line("[13/45/23, 2:30 PM] Alice: hi").unwrap();
        assert_eq!(msg.sender, "Alice");
        assert!(msg.timestamp >= before);
    }

    #[test]
    fn test_year_zero_falls_back_to_now() {
        let before = Utc::now();
        let msg = parser().classify_line("[1/1/0000, 2:30 PM] Alice: hi").unwrap();
        assert!(msg.timestamp >= before);
    }

    #[test]
    fn test_parse_time_forms() {
        assert_eq!(parse_export_time("9:05"), NaiveTime::from_hms_opt(9, 5, 0));
        assert_eq!(parse_export_time("21:05:09"), NaiveTime::from_hms_opt(21, 5, 9));
        assert_eq!(parse_export_time("12:00 AM"), NaiveTime::from_hms_opt(0, 0, 0));
        assert_eq!(parse_export_time("12:00pm"), NaiveTime::from_hms_opt(12, 0, 0));
        assert_eq!(parse_export_time("1:02:03 Pm"), NaiveTime::from_hms_opt(13, 2, 3));
        assert_eq!(parse_export_time("13:00 PM"), None);
        assert_eq!(parse_export_time("25:00"), None);
    }

    #[test]
    fn test_parse_date_forms() {
        assert_eq!(parse_export_date("12/25/23"), NaiveDate::from_ymd_opt(2023, 12, 25));
        assert_eq!(parse_export_date("1/5/2021"), NaiveDate::from_ymd_opt(2021, 1, 5));
        assert_eq!(parse_export_date("2/30/2021"), None);
        assert_eq!(parse_export_date("1/5/202"), None);
    }

    #[test]
    fn test_parse_text_aggregates() {
        let text = "\
[12/25/23, 2:30 PM] Alice: Let's meet tomorrow!
[12/25/23, 2:31 PM] Bob: ok
this line wraps from Bob
[12/24/23, 8:00 AM] Alice created group \"Xmas\"

[12/26/23, 9:00 AM] Carol: <attached: card.png>
";
        let result = parser().parse_text(text);

        assert_eq!(result.total_messages, 4);
        assert_eq!(result.messages.len(), 4);
        assert_eq!(result.participants, vec!["Alice", "Bob", "Carol"]);

        let range = result.date_range.unwrap();
        assert_eq!(range.start_date, Utc.with_ymd_and_hms(2023, 12, 24, 8, 0, 0).unwrap());
        assert_eq!(range.end_date, Utc.with_ymd_and_hms(2023, 12, 26, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_empty_text() {
        let result = parser().parse_text("");
        assert_eq!(result.total_messages, 0);
        assert!(result.date_range.is_none());
    }

    #[test]
    fn test_parse_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[12/25/23, 2:30 PM] Alice: hello").unwrap();
        writeln!(file, "12/25/23, 14:31 - Bob: hey").unwrap();

        let result = parser().parse_file(file.path()).unwrap();
        assert_eq!(result.total_messages, 2);
        assert_eq!(result.participants, vec!["Alice", "Bob"]);
    }

    #[test]
    fn test_parse_file_rejects_undecodable_input() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xff, 0xfe, 0x00, 0xc3, 0x28]).unwrap();

        let err = parser().parse_file(file.path()).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[test]
    fn test_parse_missing_file() {
        let err = parser().parse_file(Path::new("/nonexistent/chat.txt")).unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }

    #[test]
    fn test_key_updates_one_per_sender() {
        let text = "\
[1/1/24, 9:00 AM] Alice: meeting at noon?
[1/1/24, 9:05 AM] Bob: nope
[1/1/24, 9:10 AM] Alice: dinner tonight!
[1/1/24, 9:20 AM] Bob: call me
";
        let result = parser().parse_text(text);
        let updates = extract_key_updates(&result.messages, 10);

        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].sender, "Bob");
        assert_eq!(updates[0].content, "call me");
        assert_eq!(updates[1].content, "dinner tonight!");

        assert_eq!(extract_key_updates(&result.messages, 1).len(), 1);
    }
}
