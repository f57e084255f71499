//! TariffRepository — resolves the single effective `price_per_kwh` for a
//! `(station_id, now)` pair (spec.md §9 Open Questions, SPEC_FULL.md §5).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::shared::errors::DomainResult;

#[async_trait]
pub trait TariffRepository: Send + Sync {
    /// Picks the station-specific rule whose validity window contains `now`,
    /// falling back to a fleet-wide rule (`station_id IS NULL`), and finally
    /// to `default_tariff_price_per_kwh` from config when neither matches.
    async fn effective_price(
        &self,
        station_id: &str,
        now: DateTime<Utc>,
        default_price: Decimal,
    ) -> DomainResult<Decimal>;
}
