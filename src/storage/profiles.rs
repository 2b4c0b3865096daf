use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;

use super::document_service::DocumentService;
use super::models::ProfileRecord;
use crate::common::ParticipantProfile;
use crate::error::Result;

/// Read side of the external user profile service.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// Resolve display metadata for every id in one round-trip.
    /// Unknown ids are simply absent from the result.
    async fn lookup(&self, user_ids: &[String]) -> Result<HashMap<String, ParticipantProfile>>;
}

/// Profile directory backed by the `profiles` collection.
#[derive(Clone)]
pub struct SqliteProfileDirectory {
    service: DocumentService,
}

impl SqliteProfileDirectory {
    pub fn new(service: DocumentService) -> Self {
        Self { service }
    }

    /// Seed or replace a profile (used by the CLI; chat never writes profiles).
    pub async fn upsert(
        &self,
        user_id: &str,
        display_name: &str,
        avatar_url: Option<&str>,
    ) -> Result<()> {
        let record = ProfileRecord {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            avatar_url: avatar_url.map(str::to_string),
            updated_at: Utc::now().timestamp_millis(),
        };
        self.service.run(move |db| db.upsert_profile(&record)).await
    }
}

#[async_trait]
impl ProfileDirectory for SqliteProfileDirectory {
    async fn lookup(&self, user_ids: &[String]) -> Result<HashMap<String, ParticipantProfile>> {
        let ids = user_ids.to_vec();
        let records = self.service.run(move |db| db.profiles_for(&ids)).await?;

        Ok(records
            .into_iter()
            .map(|record| {
                (
                    record.user_id,
                    ParticipantProfile {
                        display_name: record.display_name,
                        avatar_url: record.avatar_url,
                    },
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_then_lookup() {
        let directory = SqliteProfileDirectory::new(DocumentService::in_memory().unwrap());
        directory
            .upsert("u1", "Alice", Some("https://img/alice.png"))
            .await
            .unwrap();
        directory.upsert("u1", "Alice B.", None).await.unwrap();

        let found = directory
            .lookup(&["u1".into(), "u2".into()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["u1"].display_name, "Alice B.");
        assert!(found["u1"].avatar_url.is_none());
    }
}
