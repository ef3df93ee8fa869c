use serde::{Deserialize, Serialize};

use super::keywords::{contains_any, RelationshipRule};
use super::message::NormalizedMessage;
use super::profile::RelationshipType;

/// Relationship classification for one participant.
///
/// Rules are checked in order and the first with a keyword hit decides the
/// outcome, so a participant talking about both family and work is family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipInference {
    pub relationship_type: RelationshipType,
    /// Index of the rule that fired, `None` when falling back to friend.
    pub matched_rule: Option<usize>,
}

impl RelationshipInference {
    pub fn infer(messages: &[&NormalizedMessage], rules: &[RelationshipRule]) -> Self {
        let content = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        Self::from_text(&content, rules)
    }

    /// Classify already-lowercased text.
    pub fn from_text(content: &str, rules: &[RelationshipRule]) -> Self {
        rules
            .iter()
            .position(|rule| contains_any(content, &rule.keywords))
            .map(|idx| RelationshipInference {
                relationship_type: rules[idx].relationship,
                matched_rule: Some(idx),
            })
            .unwrap_or(RelationshipInference {
                relationship_type: RelationshipType::Friend,
                matched_rule: None,
            })
    }
}
