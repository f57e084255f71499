//! StationRepository — typed operations over `stations` and `locations`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Station, StationStatus};
use crate::shared::errors::DomainResult;

#[async_trait]
pub trait StationRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Station>>;

    /// Inserts the station on first BootNotification, or updates `boot_info`
    /// and `status` if it already exists.
    async fn upsert_boot(
        &self,
        id: &str,
        boot_info: serde_json::Value,
        status: StationStatus,
    ) -> DomainResult<Station>;

    async fn set_status(&self, id: &str, status: StationStatus) -> DomainResult<()>;

    async fn touch_heartbeat(&self, id: &str, at: DateTime<Utc>) -> DomainResult<()>;

    /// Stations whose `last_heartbeat_at` predates the offline threshold and
    /// whose status isn't already `Offline` (reconciler stale-station sweep).
    async fn find_stale(&self, threshold: DateTime<Utc>) -> DomainResult<Vec<Station>>;

    /// Resolves `owner_id` through `location_id` (spec.md §3).
    async fn owner_of(&self, id: &str) -> DomainResult<Option<String>>;
}
