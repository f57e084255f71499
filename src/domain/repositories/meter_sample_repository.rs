//! MeterSampleRepository — append-only writer for `ocpp_meter_samples`.

use async_trait::async_trait;

use crate::domain::OcppMeterSample;
use crate::shared::errors::DomainResult;

#[async_trait]
pub trait MeterSampleRepository: Send + Sync {
    async fn append(&self, sample: OcppMeterSample) -> DomainResult<()>;

    async fn latest_for_session(&self, session_id: &str) -> DomainResult<Option<OcppMeterSample>>;
}
