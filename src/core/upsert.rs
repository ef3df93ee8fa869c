use tracing::{debug, warn};

use super::error::{PipelineError, Result};
use super::profile::{ParticipantProfile, ProfileKey, ProfileUpdate};
use super::store::ProfileStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(i64),
    Updated(i64),
}

impl UpsertOutcome {
    pub fn id(self) -> i64 {
        match self {
            UpsertOutcome::Created(id) | UpsertOutcome::Updated(id) => id,
        }
    }
}

/// Create-or-update of participant profiles, keyed on
/// `(username, platform, main_user)`.
///
/// The lookup runs before every write, so replaying the same input converges
/// on one row. Concurrent upserts of the same key are not serialized here;
/// that is left to the store.
pub struct ProfileUpserter<'a, S: ProfileStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: ProfileStore + ?Sized> ProfileUpserter<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn upsert(&self, key: &ProfileKey, update: &ProfileUpdate) -> Result<UpsertOutcome> {
        let existing = self.store.find(key).map_err(|e| failure("find", key, e))?;

        match existing {
            Some(existing) => {
                let mut profile = existing.profile;
                profile.apply(update);
                self.store
                    .update(existing.id, &profile)
                    .map_err(|e| failure("update", key, e))?;
                debug!(%key, id = existing.id, "updated profile");
                Ok(UpsertOutcome::Updated(existing.id))
            }
            None => {
                let mut profile = ParticipantProfile::new(key);
                profile.apply(update);
                let id = self.store.create(&profile).map_err(|e| failure("create", key, e))?;
                debug!(%key, id, "created profile");
                Ok(UpsertOutcome::Created(id))
            }
        }
    }
}

fn failure(operation: &'static str, key: &ProfileKey, e: PipelineError) -> PipelineError {
    warn!(%key, operation, error = %e, "profile upsert failed");
    PipelineError::ProfileOperation {
        operation,
        username: key.username.clone(),
        platform: key.platform.clone(),
        main_user: key.main_user.clone(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::profile::{Interest, RelationshipType};
    use crate::core::store::{SqliteStore, StoredProfile};
    use chrono::{TimeZone, Utc};

    struct BrokenStore;

    impl ProfileStore for BrokenStore {
        fn find(&self, _key: &ProfileKey) -> Result<Option<StoredProfile>> {
            Err(PipelineError::NotFound("store offline".to_string()))
        }
        fn create(&self, _profile: &ParticipantProfile) -> Result<i64> {
            unreachable!()
        }
        fn update(&self, _id: i64, _profile: &ParticipantProfile) -> Result<()> {
            unreachable!()
        }
        fn list_by_main_user(&self, _main_user: &str, _platform: Option<&str>) -> Result<Vec<StoredProfile>> {
            Ok(vec![])
        }
    }

    fn key() -> ProfileKey {
        ProfileKey::new("Bob", "whatsapp", "Dave")
    }

    #[test]
    fn test_create_then_update_same_row() {
        let store = SqliteStore::new(":memory:".into()).unwrap();
        let upserter = ProfileUpserter::new(&store);
        let update = ProfileUpdate {
            trust_score: Some(0.7),
            interests: Some(vec![Interest::Music]),
            ..Default::default()
        };

        let first = upserter.upsert(&key(), &update).unwrap();
        let second = upserter.upsert(&key(), &update).unwrap();

        assert!(matches!(first, UpsertOutcome::Created(_)));
        assert_eq!(second, UpsertOutcome::Updated(first.id()));
        assert_eq!(store.list_by_main_user("Dave", None).unwrap().len(), 1);
    }

    #[test]
    fn test_create_fills_defaults() {
        let store = SqliteStore::new(":memory:".into()).unwrap();
        ProfileUpserter::new(&store)
            .upsert(&key(), &ProfileUpdate { frequency_score: Some(0.2), ..Default::default() })
            .unwrap();

        let stored = store.find(&key()).unwrap().unwrap().profile;
        assert_eq!(stored.frequency_score, 0.2);
        assert_eq!(stored.trust_score, 0.5);
        assert_eq!(stored.relationship_type, RelationshipType::Friend);
    }

    #[test]
    fn test_update_keeps_unsupplied_fields() {
        let store = SqliteStore::new(":memory:".into()).unwrap();
        let upserter = ProfileUpserter::new(&store);

        upserter
            .upsert(&key(), &ProfileUpdate { relationship_type: Some(RelationshipType::Family), ..Default::default() })
            .unwrap();
        upserter
            .upsert(&key(), &ProfileUpdate { trust_score: Some(0.9), ..Default::default() })
            .unwrap();

        let stored = store.find(&key()).unwrap().unwrap().profile;
        assert_eq!(stored.relationship_type, RelationshipType::Family);
        assert_eq!(stored.trust_score, 0.9);
    }

    #[test]
    fn test_store_failure_carries_key() {
        let err = ProfileUpserter::new(&BrokenStore)
            .upsert(&key(), &ProfileUpdate::default())
            .unwrap_err();

        match err {
            PipelineError::ProfileOperation { operation, username, platform, main_user, reason } => {
                assert_eq!(operation, "find");
                assert_eq!((username.as_str(), platform.as_str(), main_user.as_str()), ("Bob", "whatsapp", "Dave"));
                assert!(reason.contains("store offline"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_create_failure_names_operation() {
        let store = SqliteStore::new(":memory:".into()).unwrap();
        let update = ProfileUpdate {
            last_interaction: Utc.timestamp_opt(1_700_000_000_000, 0).single(),
            ..Default::default()
        };

        let err = ProfileUpserter::new(&store).upsert(&key(), &update).unwrap_err();

        assert!(matches!(err, PipelineError::ProfileOperation { operation: "create", .. }));
        assert!(store.find(&key()).unwrap().is_none());
    }
}
