//! Keyword heuristics that turn a participant's messages into profile fields.
//!
//! Every function here is pure; persistence happens in `upsert`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::keywords::{contains_any, count_present, InterestRule, KeywordTables, StyleRules, TraitRule, TrustRules};
use super::message::NormalizedMessage;
use super::profile::{
    CommunicationStyle, Interest, PersonalityTrait, ProfileUpdate, RelationshipType, DEFAULT_TRUST_SCORE,
};
use super::relationship::RelationshipInference;

/// Number of interests promoted to preferred topics.
pub const PREFERRED_TOPIC_LIMIT: usize = 3;

/// Everything inferred for one participant from one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferredProfile {
    pub personality_traits: Vec<PersonalityTrait>,
    pub interests: Vec<Interest>,
    pub communication_style: CommunicationStyle,
    pub frequency_score: f64,
    pub trust_score: f64,
    pub relationship_type: RelationshipType,
    pub preferred_topics: Vec<Interest>,
    pub avoided_topics: Vec<Interest>,
    pub last_interaction: DateTime<Utc>,
    pub message_count: usize,
}

impl From<InferredProfile> for ProfileUpdate {
    fn from(inferred: InferredProfile) -> Self {
        ProfileUpdate {
            display_name: None,
            personality_traits: Some(inferred.personality_traits),
            interests: Some(inferred.interests),
            communication_style: Some(inferred.communication_style),
            frequency_score: Some(inferred.frequency_score),
            trust_score: Some(inferred.trust_score),
            relationship_type: Some(inferred.relationship_type),
            preferred_topics: Some(inferred.preferred_topics),
            avoided_topics: Some(inferred.avoided_topics),
            last_interaction: Some(inferred.last_interaction),
        }
    }
}

pub struct InferenceEngine<'a> {
    keywords: &'a KeywordTables,
}

impl<'a> InferenceEngine<'a> {
    pub fn new(keywords: &'a KeywordTables) -> Self {
        Self { keywords }
    }

    /// Infer a profile for `participant` from the whole batch.
    ///
    /// Returns `None` when the participant authored nothing in the batch.
    pub fn infer(&self, participant: &str, batch: &[NormalizedMessage]) -> Option<InferredProfile> {
        let own: Vec<&NormalizedMessage> = batch.iter().filter(|m| m.sender == participant).collect();
        let last_interaction = own.iter().map(|m| m.timestamp).max()?;

        let joined = own.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join(" ");
        let lowered = joined.to_lowercase();

        let relationship = RelationshipInference::infer(&own, &self.keywords.relationships);
        debug!(
            participant,
            relationship = %relationship.relationship_type,
            rule = ?relationship.matched_rule,
            "classified relationship"
        );

        let interests = detect_interests(&lowered, &self.keywords.interests);
        let preferred_topics = interests.iter().copied().take(PREFERRED_TOPIC_LIMIT).collect();

        Some(InferredProfile {
            personality_traits: detect_traits(&lowered, &self.keywords.traits),
            preferred_topics,
            interests,
            communication_style: communication_style(&joined, own.len(), &self.keywords.style),
            frequency_score: frequency_score(own.len(), batch.len()),
            trust_score: trust_score(&lowered, &self.keywords.trust),
            relationship_type: relationship.relationship_type,
            avoided_topics: Vec::new(),
            last_interaction,
            message_count: own.len(),
        })
    }
}

/// Every trait with at least one keyword present, in table order.
pub fn detect_traits(lowered: &str, rules: &[TraitRule]) -> Vec<PersonalityTrait> {
    let mut traits = Vec::new();
    for rule in rules {
        if contains_any(lowered, &rule.keywords) && !traits.contains(&rule.tag) {
            traits.push(rule.tag);
        }
    }
    traits
}

/// Every interest with at least one keyword present, in table order.
pub fn detect_interests(lowered: &str, rules: &[InterestRule]) -> Vec<Interest> {
    let mut interests = Vec::new();
    for rule in rules {
        if contains_any(lowered, &rule.keywords) && !interests.contains(&rule.tag) {
            interests.push(rule.tag);
        }
    }
    interests
}

pub fn communication_style(joined: &str, message_count: usize, rules: &StyleRules) -> CommunicationStyle {
    let lowered = joined.to_lowercase();
    let n = message_count as f64;
    let questions = joined.matches('?').count() as f64;
    let exclamations = joined.matches('!').count() as f64;

    CommunicationStyle {
        emoji_heavy: count_emoji(joined) as f64 > n * rules.emoji_ratio,
        formal: contains_any(&lowered, &rules.formal),
        casual: contains_any(&lowered, &rules.casual),
        question_heavy: questions > n * rules.question_ratio,
        exclamation_heavy: exclamations > n * rules.exclamation_ratio,
    }
}

/// Emoticons (U+1F600..U+1F64F) and pictographs (U+1F300..U+1F5FF).
pub fn count_emoji(text: &str) -> usize {
    text.chars()
        .filter(|c| matches!(*c as u32, 0x1F600..=0x1F64F | 0x1F300..=0x1F5FF))
        .count()
}

/// Share of the batch authored, scaled so 10% already saturates at 1.0.
pub fn frequency_score(participant_count: usize, total_count: usize) -> f64 {
    if total_count == 0 {
        return 0.0;
    }
    (participant_count as f64 / total_count as f64 * 10.0).min(1.0)
}

/// 0.5 plus 0.1 per positive keyword present, minus 0.1 per negative one, clamped.
pub fn trust_score(lowered: &str, rules: &TrustRules) -> f64 {
    let positive = count_present(lowered, &rules.positive) as f64;
    let negative = count_present(lowered, &rules.negative) as f64;

    (DEFAULT_TRUST_SCORE + (positive - negative) * 0.1).clamp(0.0, 1.0)
}
