//! Keyword tables backing every heuristic in the pipeline.
//!
//! The tables are plain data so they can be loaded from the config file and
//! handed to the classifier and the inference engine at construction time.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::message::MessageType;
use super::profile::{Interest, PersonalityTrait, RelationshipType};

static TIME_OF_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,2}:\d{2}").expect("time of day regex must compile"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitRule {
    pub tag: PersonalityTrait,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestRule {
    pub tag: Interest,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRule {
    pub relationship: RelationshipType,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleRules {
    pub formal: Vec<String>,
    pub casual: Vec<String>,
    /// Emoji per message above which a participant is emoji-heavy.
    pub emoji_ratio: f64,
    /// `?` per message above which a participant is question-heavy.
    pub question_ratio: f64,
    /// `!` per message above which a participant is exclamation-heavy.
    pub exclamation_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustRules {
    pub positive: Vec<String>,
    pub negative: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordTables {
    pub importance: Vec<String>,
    pub traits: Vec<TraitRule>,
    /// Definition order matters: preferred topics are taken from the front.
    pub interests: Vec<InterestRule>,
    pub style: StyleRules,
    pub trust: TrustRules,
    /// Evaluated top to bottom; the first rule with a hit wins.
    pub relationships: Vec<RelationshipRule>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

impl Default for KeywordTables {
    fn default() -> Self {
        Self {
            importance: words(&[
                "meeting", "call", "event", "party", "dinner", "lunch", "coffee",
                "deadline", "due", "urgent", "important", "reminder", "schedule",
                "tomorrow", "today", "tonight", "weekend", "birthday", "anniversary",
                "travel", "flight", "hotel", "booking", "reservation", "appointment",
            ]),
            traits: vec![
                TraitRule { tag: PersonalityTrait::Humorous, keywords: words(&["haha", "lol", "😂", "😄", "funny"]) },
                TraitRule { tag: PersonalityTrait::Grateful, keywords: words(&["thanks", "thank you", "appreciate"]) },
                TraitRule { tag: PersonalityTrait::Apologetic, keywords: words(&["sorry", "apologize", "my bad"]) },
                TraitRule { tag: PersonalityTrait::Helpful, keywords: words(&["help", "support", "assist"]) },
                TraitRule { tag: PersonalityTrait::Professional, keywords: words(&["work", "job", "career", "business"]) },
            ],
            interests: vec![
                InterestRule { tag: Interest::Technology, keywords: words(&["tech", "coding", "programming", "computer", "software"]) },
                InterestRule { tag: Interest::Sports, keywords: words(&["football", "basketball", "soccer", "game", "match"]) },
                InterestRule { tag: Interest::Music, keywords: words(&["song", "music", "concert", "artist", "album"]) },
                InterestRule { tag: Interest::Travel, keywords: words(&["travel", "trip", "vacation", "flight", "hotel"]) },
                InterestRule { tag: Interest::Food, keywords: words(&["food", "restaurant", "cooking", "dinner", "lunch"]) },
                InterestRule { tag: Interest::Movies, keywords: words(&["movie", "film", "watch", "cinema", "series"]) },
            ],
            style: StyleRules {
                formal: words(&["sir", "madam", "please", "kindly"]),
                casual: words(&["hey", "yo", "sup", "cool"]),
                emoji_ratio: 0.5,
                question_ratio: 0.3,
                exclamation_ratio: 0.2,
            },
            trust: TrustRules {
                positive: words(&["trust", "reliable", "honest", "confidential", "secret"]),
                negative: words(&["lie", "fake", "untrustworthy", "suspicious"]),
            },
            relationships: vec![
                RelationshipRule { relationship: RelationshipType::Family, keywords: words(&["mom", "dad", "family", "parents"]) },
                RelationshipRule { relationship: RelationshipType::Colleague, keywords: words(&["work", "office", "meeting", "boss"]) },
                RelationshipRule { relationship: RelationshipType::CloseFriend, keywords: words(&["best", "close", "love", "miss"]) },
            ],
        }
    }
}

impl KeywordTables {
    /// Importance flag for a message of the given type.
    ///
    /// Media and system messages are never important. Otherwise any importance
    /// keyword, a `?` or `!`, or an embedded `H:MM` time marks the message.
    pub fn is_important(&self, content: &str, message_type: MessageType) -> bool {
        if !message_type.can_be_important() || content.is_empty() {
            return false;
        }
        if content.contains('?') || content.contains('!') {
            return true;
        }

        let lowered = content.to_lowercase();
        contains_any(&lowered, &self.importance) || TIME_OF_DAY.is_match(&lowered)
    }
}

/// Case-insensitive substring test; `haystack` must already be lowercased.
pub fn contains_any(haystack: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| haystack.contains(&k.to_lowercase()))
}

/// Number of distinct keywords present in `haystack` (lowercased).
pub fn count_present(haystack: &str, keywords: &[String]) -> usize {
    keywords
        .iter()
        .filter(|k| haystack.contains(&k.to_lowercase()))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_importance_keywords() {
        let tables = KeywordTables::default();
        assert!(tables.is_important("Team MEETING moved", MessageType::Text));
        assert!(tables.is_important("happy birthday", MessageType::Text));
        assert!(!tables.is_important("ok sounds good", MessageType::Text));
    }

    #[test]
    fn test_importance_punctuation_and_time() {
        let tables = KeywordTables::default();
        assert!(tables.is_important("you there?", MessageType::Text));
        assert!(tables.is_important("nice!", MessageType::Text));
        assert!(tables.is_important("see you at 7:45", MessageType::Text));
    }

    #[test]
    fn test_media_and_system_never_important() {
        let tables = KeywordTables::default();
        assert!(!tables.is_important("urgent meeting!?", MessageType::Media));
        assert!(!tables.is_important("urgent meeting!?", MessageType::System));
    }

    #[test]
    fn test_count_present_counts_each_keyword_once() {
        let tables = KeywordTables::default();
        let text = "trust me, trust me, honest";
        assert_eq!(count_present(text, &tables.trust.positive), 2);
    }

    #[test]
    fn test_tables_roundtrip_through_json() {
        let tables = KeywordTables::default();
        let json = serde_json::to_string(&tables).unwrap();
        let back: KeywordTables = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tables);
    }
}
