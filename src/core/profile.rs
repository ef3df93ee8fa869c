use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_TRUST_SCORE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonalityTrait {
    Humorous,
    Grateful,
    Apologetic,
    Helpful,
    Professional,
}

impl fmt::Display for PersonalityTrait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PersonalityTrait::Humorous => "humorous",
            PersonalityTrait::Grateful => "grateful",
            PersonalityTrait::Apologetic => "apologetic",
            PersonalityTrait::Helpful => "helpful",
            PersonalityTrait::Professional => "professional",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interest {
    Technology,
    Sports,
    Music,
    Travel,
    Food,
    Movies,
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Interest::Technology => "technology",
            Interest::Sports => "sports",
            Interest::Music => "music",
            Interest::Travel => "travel",
            Interest::Food => "food",
            Interest::Movies => "movies",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Family,
    Colleague,
    CloseFriend,
    #[default]
    Friend,
}

impl RelationshipType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "family" => Some(RelationshipType::Family),
            "colleague" => Some(RelationshipType::Colleague),
            "close_friend" => Some(RelationshipType::CloseFriend),
            "friend" => Some(RelationshipType::Friend),
            _ => None,
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationshipType::Family => write!(f, "family"),
            RelationshipType::Colleague => write!(f, "colleague"),
            RelationshipType::CloseFriend => write!(f, "close_friend"),
            RelationshipType::Friend => write!(f, "friend"),
        }
    }
}

/// Independent style flags; several can hold at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommunicationStyle {
    pub emoji_heavy: bool,
    pub formal: bool,
    pub casual: bool,
    pub question_heavy: bool,
    pub exclamation_heavy: bool,
}

/// Identity of a stored profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileKey {
    pub username: String,
    pub platform: String,
    pub main_user: String,
}

impl ProfileKey {
    pub fn new(username: impl Into<String>, platform: impl Into<String>, main_user: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            platform: platform.into(),
            main_user: main_user.into(),
        }
    }
}

impl fmt::Display for ProfileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.username, self.platform, self.main_user)
    }
}

/// What the profile store holds for one participant of one main user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantProfile {
    pub username: String,
    pub platform: String,
    pub main_user: String,
    pub display_name: String,
    pub personality_traits: Vec<PersonalityTrait>,
    pub interests: Vec<Interest>,
    pub communication_style: CommunicationStyle,
    /// Share of the conversation authored (0.0-1.0)
    pub frequency_score: f64,
    /// Keyword-derived trust (0.0-1.0)
    pub trust_score: f64,
    pub relationship_type: RelationshipType,
    pub preferred_topics: Vec<Interest>,
    /// Reserved; nothing populates it yet.
    pub avoided_topics: Vec<Interest>,
    pub last_interaction: Option<DateTime<Utc>>,
}

impl ParticipantProfile {
    /// Fresh profile with defaults for every inferred field.
    pub fn new(key: &ProfileKey) -> Self {
        Self {
            username: key.username.clone(),
            platform: key.platform.clone(),
            main_user: key.main_user.clone(),
            display_name: key.username.clone(),
            personality_traits: Vec::new(),
            interests: Vec::new(),
            communication_style: CommunicationStyle::default(),
            frequency_score: 0.0,
            trust_score: DEFAULT_TRUST_SCORE,
            relationship_type: RelationshipType::default(),
            preferred_topics: Vec::new(),
            avoided_topics: Vec::new(),
            last_interaction: None,
        }
    }

    pub fn key(&self) -> ProfileKey {
        ProfileKey::new(&self.username, &self.platform, &self.main_user)
    }

    /// Overwrite the fields carried by `update`, leaving the rest untouched.
    ///
    /// Scores are clamped to [0, 1]. `last_interaction` only moves forward so a
    /// batch of older messages cannot rewind it.
    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(ref name) = update.display_name {
            self.display_name = name.clone();
        }
        if let Some(ref traits) = update.personality_traits {
            self.personality_traits = traits.clone();
        }
        if let Some(ref interests) = update.interests {
            self.interests = interests.clone();
        }
        if let Some(style) = update.communication_style {
            self.communication_style = style;
        }
        if let Some(score) = update.frequency_score {
            self.frequency_score = score.clamp(0.0, 1.0);
        }
        if let Some(score) = update.trust_score {
            self.trust_score = score.clamp(0.0, 1.0);
        }
        if let Some(relationship) = update.relationship_type {
            self.relationship_type = relationship;
        }
        if let Some(ref topics) = update.preferred_topics {
            self.preferred_topics = topics.clone();
        }
        if let Some(ref topics) = update.avoided_topics {
            self.avoided_topics = topics.clone();
        }
        if let Some(ts) = update.last_interaction {
            self.last_interaction = Some(match self.last_interaction {
                Some(previous) => previous.max(ts),
                None => ts,
            });
        }
    }
}

/// Partial profile: `None` means "leave the stored value alone".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub personality_traits: Option<Vec<PersonalityTrait>>,
    pub interests: Option<Vec<Interest>>,
    pub communication_style: Option<CommunicationStyle>,
    pub frequency_score: Option<f64>,
    pub trust_score: Option<f64>,
    pub relationship_type: Option<RelationshipType>,
    pub preferred_topics: Option<Vec<Interest>>,
    pub avoided_topics: Option<Vec<Interest>>,
    pub last_interaction: Option<DateTime<Utc>>,
}
