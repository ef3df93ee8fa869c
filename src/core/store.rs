use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use uuid::Uuid;

use super::error::{PipelineError, Result};
use super::message::{is_storable_timestamp, ConversationBatch, STORABLE_YEARS};
use super::profile::{ParticipantProfile, ProfileKey, RelationshipType};

/// A profile as persisted, with its store-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredProfile {
    pub id: i64,
    pub profile: ParticipantProfile,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A normalized upload ready to be persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub platform: String,
    pub group_name: String,
    pub main_user: String,
    pub conversation_type: String,
    pub platform_specific_data: Map<String, Value>,
    pub batch: ConversationBatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub session_id: String,
    pub status: String,
    #[serde(flatten)]
    pub session: NewSession,
    pub created_at: DateTime<Utc>,
}

pub trait ProfileStore {
    fn find(&self, key: &ProfileKey) -> Result<Option<StoredProfile>>;
    fn create(&self, profile: &ParticipantProfile) -> Result<i64>;
    fn update(&self, id: i64, profile: &ParticipantProfile) -> Result<()>;
    fn list_by_main_user(&self, main_user: &str, platform: Option<&str>) -> Result<Vec<StoredProfile>>;
}

pub trait ConversationStore {
    /// Persist a session and return its id.
    fn create_session(&self, session: &NewSession) -> Result<String>;
    fn find_session(&self, session_id: &str) -> Result<Option<ConversationSession>>;
}

pub trait MainUserStore {
    fn add_connected_platform(&self, main_user: &str, platform: &str) -> Result<()>;
    fn connected_platforms(&self, main_user: &str) -> Result<Vec<String>>;
}

/// SQLite-backed implementation of every store the pipeline talks to.
pub struct SqliteStore {
    conn: Connection,
}

const PROFILE_COLUMNS: &str = "id, username, platform, main_user, display_name, personality_traits, \
     interests, communication_style, frequency_score, trust_score, relationship_type, \
     preferred_topics, avoided_topics, last_interaction, created_at, updated_at";

impl SqliteStore {
    /// Open (or create) the database at `db_path`. `":memory:"` gives a throwaway store.
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                platform TEXT NOT NULL,
                main_user TEXT NOT NULL,
                display_name TEXT NOT NULL,
                personality_traits TEXT NOT NULL,
                interests TEXT NOT NULL,
                communication_style TEXT NOT NULL,
                frequency_score REAL NOT NULL,
                trust_score REAL NOT NULL,
                relationship_type TEXT NOT NULL,
                preferred_topics TEXT NOT NULL,
                avoided_topics TEXT NOT NULL,
                last_interaction TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (username, platform, main_user)
            );
            CREATE INDEX IF NOT EXISTS idx_profiles_main_user ON profiles(main_user);

            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                platform TEXT NOT NULL,
                group_name TEXT NOT NULL,
                main_user TEXT NOT NULL,
                conversation_type TEXT NOT NULL,
                status TEXT NOT NULL,
                total_messages INTEGER NOT NULL,
                batch TEXT NOT NULL,
                platform_specific_data TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_main_user ON sessions(main_user);

            CREATE TABLE IF NOT EXISTS connected_platforms (
                main_user TEXT NOT NULL,
                platform TEXT NOT NULL,
                connected_at TEXT NOT NULL,
                PRIMARY KEY (main_user, platform)
            );",
        )?;

        Ok(Self { conn })
    }
}

fn conversion_error(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

/// RFC 3339 text for a time column, refusing values `time_column` could not read back.
fn time_text(ts: &DateTime<Utc>) -> Result<String> {
    if !is_storable_timestamp(ts) {
        return Err(PipelineError::Store {
            operation: "encode timestamp",
            key: ts.to_string(),
            reason: format!("year outside {}..={}", STORABLE_YEARS.start(), STORABLE_YEARS.end()),
        });
    }
    Ok(ts.to_rfc3339())
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<StoredProfile> {
    let relationship: String = row.get(10)?;
    let relationship_type = RelationshipType::parse(&relationship).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            10,
            rusqlite::types::Type::Text,
            format!("unknown relationship type '{}'", relationship).into(),
        )
    })?;
    let last_interaction = match row.get::<_, Option<String>>(13)? {
        Some(_) => Some(time_column(row, 13)?),
        None => None,
    };

    Ok(StoredProfile {
        id: row.get(0)?,
        profile: ParticipantProfile {
            username: row.get(1)?,
            platform: row.get(2)?,
            main_user: row.get(3)?,
            display_name: row.get(4)?,
            personality_traits: json_column(row, 5)?,
            interests: json_column(row, 6)?,
            communication_style: json_column(row, 7)?,
            frequency_score: row.get(8)?,
            trust_score: row.get(9)?,
            relationship_type,
            preferred_topics: json_column(row, 11)?,
            avoided_topics: json_column(row, 12)?,
            last_interaction,
        },
        created_at: time_column(row, 14)?,
        updated_at: time_column(row, 15)?,
    })
}

impl ProfileStore for SqliteStore {
    fn find(&self, key: &ProfileKey) -> Result<Option<StoredProfile>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE username = ?1 AND platform = ?2 AND main_user = ?3"
        ))?;

        let profile = stmt
            .query_row(params![key.username, key.platform, key.main_user], profile_from_row)
            .optional()?;

        Ok(profile)
    }

    fn create(&self, profile: &ParticipantProfile) -> Result<i64> {
        let last_interaction = profile.last_interaction.as_ref().map(time_text).transpose()?;
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO profiles (username, platform, main_user, display_name, personality_traits,
                interests, communication_style, frequency_score, trust_score, relationship_type,
                preferred_topics, avoided_topics, last_interaction, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
            params![
                profile.username,
                profile.platform,
                profile.main_user,
                profile.display_name,
                serde_json::to_string(&profile.personality_traits)?,
                serde_json::to_string(&profile.interests)?,
                serde_json::to_string(&profile.communication_style)?,
                profile.frequency_score,
                profile.trust_score,
                profile.relationship_type.to_string(),
                serde_json::to_string(&profile.preferred_topics)?,
                serde_json::to_string(&profile.avoided_topics)?,
                last_interaction,
                now,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update(&self, id: i64, profile: &ParticipantProfile) -> Result<()> {
        let last_interaction = profile.last_interaction.as_ref().map(time_text).transpose()?;
        let rows_affected = self.conn.execute(
            "UPDATE profiles SET display_name = ?1, personality_traits = ?2, interests = ?3,
                communication_style = ?4, frequency_score = ?5, trust_score = ?6,
                relationship_type = ?7, preferred_topics = ?8, avoided_topics = ?9,
                last_interaction = ?10, updated_at = ?11
             WHERE id = ?12",
            params![
                profile.display_name,
                serde_json::to_string(&profile.personality_traits)?,
                serde_json::to_string(&profile.interests)?,
                serde_json::to_string(&profile.communication_style)?,
                profile.frequency_score,
                profile.trust_score,
                profile.relationship_type.to_string(),
                serde_json::to_string(&profile.preferred_topics)?,
                serde_json::to_string(&profile.avoided_topics)?,
                last_interaction,
                Utc::now().to_rfc3339(),
                id,
            ],
        )?;

        if rows_affected == 0 {
            return Err(PipelineError::NotFound(id.to_string()));
        }

        Ok(())
    }

    fn list_by_main_user(&self, main_user: &str, platform: Option<&str>) -> Result<Vec<StoredProfile>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles
             WHERE main_user = ?1 AND (?2 IS NULL OR platform = ?2)
             ORDER BY frequency_score DESC, username ASC"
        ))?;

        let profiles = stmt
            .query_map(params![main_user, platform], profile_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(profiles)
    }
}

impl ConversationStore for SqliteStore {
    fn create_session(&self, session: &NewSession) -> Result<String> {
        let session_id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO sessions (session_id, platform, group_name, main_user, conversation_type,
                status, total_messages, batch, platform_specific_data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'uploaded', ?6, ?7, ?8, ?9)",
            params![
                session_id,
                session.platform,
                session.group_name,
                session.main_user,
                session.conversation_type,
                session.batch.total_messages() as i64,
                serde_json::to_string(&session.batch)?,
                serde_json::to_string(&session.platform_specific_data)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(session_id)
    }

    fn find_session(&self, session_id: &str) -> Result<Option<ConversationSession>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, status, platform, group_name, main_user, conversation_type,
                batch, platform_specific_data, created_at
             FROM sessions WHERE session_id = ?1",
        )?;

        let session = stmt
            .query_row(params![session_id], |row| {
                Ok(ConversationSession {
                    session_id: row.get(0)?,
                    status: row.get(1)?,
                    session: NewSession {
                        platform: row.get(2)?,
                        group_name: row.get(3)?,
                        main_user: row.get(4)?,
                        conversation_type: row.get(5)?,
                        batch: json_column(row, 6)?,
                        platform_specific_data: json_column(row, 7)?,
                    },
                    created_at: time_column(row, 8)?,
                })
            })
            .optional()?;

        Ok(session)
    }
}

impl MainUserStore for SqliteStore {
    fn add_connected_platform(&self, main_user: &str, platform: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO connected_platforms (main_user, platform, connected_at) VALUES (?1, ?2, ?3)",
            params![main_user, platform, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn connected_platforms(&self, main_user: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT platform FROM connected_platforms WHERE main_user = ?1 ORDER BY connected_at, platform",
        )?;
        let platforms = stmt
            .query_map(params![main_user], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(platforms)
    }
}
