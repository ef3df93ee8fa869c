pub mod analysis;
pub mod error;
pub mod keywords;
pub mod message;
pub mod normalizer;
pub mod processor;
pub mod profile;
pub mod relationship;
pub mod store;
pub mod upsert;
pub mod whatsapp;

pub use analysis::{InferenceEngine, InferredProfile};
pub use error::{PipelineError, Result};
pub use keywords::KeywordTables;
pub use message::{ConversationBatch, DateRange, MessageType, NormalizedMessage};
pub use normalizer::{ConversationPayload, PlatformNormalizer, TimestampInput};
pub use processor::{participant_context, ConversationProcessor, ParticipantContext, ProcessingOutcome};
pub use profile::{ParticipantProfile, ProfileKey, ProfileUpdate, RelationshipType};
pub use relationship::RelationshipInference;
pub use store::{ConversationStore, MainUserStore, ProfileStore, SqliteStore};
pub use upsert::{ProfileUpserter, UpsertOutcome};
pub use whatsapp::{extract_key_updates, ExportParser, ParseResult};
