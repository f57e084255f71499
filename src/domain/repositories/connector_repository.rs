//! ConnectorRepository — typed operations over `connectors`.

use async_trait::async_trait;

use crate::domain::{Connector, ConnectorStatus};
use crate::shared::errors::DomainResult;

#[async_trait]
pub trait ConnectorRepository: Send + Sync {
    async fn find(&self, station_id: &str, connector_id: i32) -> DomainResult<Option<Connector>>;

    async fn upsert_status(
        &self,
        station_id: &str,
        connector_id: i32,
        status: ConnectorStatus,
    ) -> DomainResult<()>;

    async fn is_available(&self, station_id: &str, connector_id: i32) -> DomainResult<bool>;
}
