//! Entry point tying normalization, inference and persistence together.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::analysis::InferenceEngine;
use super::error::{PipelineError, Result};
use super::keywords::KeywordTables;
use super::message::DateRange;
use super::normalizer::{ConversationPayload, PlatformNormalizer};
use super::profile::{Interest, PersonalityTrait, ProfileKey, DEFAULT_TRUST_SCORE};
use super::store::{ConversationStore, MainUserStore, NewSession, ProfileStore};
use super::upsert::{ProfileUpserter, UpsertOutcome};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingOutcome {
    pub session_id: String,
    pub participants: Vec<String>,
    /// Profiles written (created or updated) for this upload.
    pub profiles_created_count: usize,
    pub total_messages: usize,
    pub date_range: Option<DateRange>,
}

pub struct ConversationProcessor<'a, P, C, U>
where
    P: ProfileStore + ?Sized,
    C: ConversationStore + ?Sized,
    U: MainUserStore + ?Sized,
{
    profiles: &'a P,
    conversations: &'a C,
    users: &'a U,
    keywords: &'a KeywordTables,
}

impl<'a, P, C, U> ConversationProcessor<'a, P, C, U>
where
    P: ProfileStore + ?Sized,
    C: ConversationStore + ?Sized,
    U: MainUserStore + ?Sized,
{
    pub fn new(profiles: &'a P, conversations: &'a C, users: &'a U, keywords: &'a KeywordTables) -> Self {
        Self {
            profiles,
            conversations,
            users,
            keywords,
        }
    }

    /// Normalize an upload, upsert one profile per participant, then persist
    /// the session and record the platform against the main user.
    ///
    /// Nothing is written when normalization fails. Store failures stop
    /// processing and are returned as-is.
    pub fn process_conversation(&self, payload: &ConversationPayload) -> Result<ProcessingOutcome> {
        let batch = PlatformNormalizer::new(self.keywords).normalize(payload)?;
        let main_user = payload.main_user().ok_or(PipelineError::MissingMainUser)?;
        let platform = payload.platform.trim().to_lowercase();

        let engine = InferenceEngine::new(self.keywords);
        let upserter = ProfileUpserter::new(self.profiles);
        let mut created = 0usize;
        let mut written = 0usize;

        for participant in &batch.participants {
            let Some(inferred) = engine.infer(participant, &batch.messages) else {
                continue;
            };
            let key = ProfileKey::new(participant, &platform, main_user);
            if let UpsertOutcome::Created(_) = upserter.upsert(&key, &inferred.into())? {
                created += 1;
            }
            written += 1;
        }

        let total_messages = batch.total_messages();
        let participants = batch.participants.clone();
        let date_range = batch.date_range;

        let session = NewSession {
            platform: platform.clone(),
            group_name: payload.group_name.clone(),
            main_user: main_user.to_string(),
            conversation_type: payload.conversation_type.clone(),
            platform_specific_data: payload.platform_specific_data.clone(),
            batch,
        };
        let session_id = self.conversations.create_session(&session).map_err(|e| {
            warn!(main_user, error = %e, "failed to persist conversation session");
            PipelineError::Store {
                operation: "create_session",
                key: format!("({}, {})", main_user, platform),
                reason: e.to_string(),
            }
        })?;

        self.users
            .add_connected_platform(main_user, &platform)
            .map_err(|e| PipelineError::Store {
                operation: "add_connected_platform",
                key: format!("({}, {})", main_user, platform),
                reason: e.to_string(),
            })?;

        info!(
            session_id = %session_id,
            participants = participants.len(),
            profiles_created = created,
            profiles_updated = written - created,
            "processed conversation"
        );

        Ok(ProcessingOutcome {
            session_id,
            participants,
            profiles_created_count: written,
            total_messages,
            date_range,
        })
    }
}

/// What downstream consumers need to know about one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantContext {
    pub participant: String,
    pub found: bool,
    pub relationship_type: String,
    pub trust_score: f64,
    pub frequency_score: f64,
    pub personality_traits: Vec<PersonalityTrait>,
    pub interests: Vec<Interest>,
    pub last_interaction: Option<chrono::DateTime<chrono::Utc>>,
}

/// Stored profile view for `participant`, or neutral defaults if none exists.
pub fn participant_context<S: ProfileStore + ?Sized>(
    store: &S,
    main_user: &str,
    participant: &str,
    platform: Option<&str>,
) -> Result<ParticipantContext> {
    let stored = match platform {
        Some(platform) => store.find(&ProfileKey::new(participant, platform, main_user))?,
        None => store
            .list_by_main_user(main_user, None)?
            .into_iter()
            .find(|p| p.profile.username == participant),
    };

    Ok(match stored {
        Some(stored) => {
            let profile = stored.profile;
            ParticipantContext {
                participant: participant.to_string(),
                found: true,
                relationship_type: profile.relationship_type.to_string(),
                trust_score: profile.trust_score,
                frequency_score: profile.frequency_score,
                personality_traits: profile.personality_traits,
                interests: profile.interests,
                last_interaction: profile.last_interaction,
            }
        }
        None => ParticipantContext {
            participant: participant.to_string(),
            found: false,
            relationship_type: "unknown".to_string(),
            trust_score: DEFAULT_TRUST_SCORE,
            frequency_score: 0.0,
            personality_traits: Vec::new(),
            interests: Vec::new(),
            last_interaction: None,
        },
    })
}
