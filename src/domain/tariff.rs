//! Tariff rule entity (spec.md §9 Open Questions, SPEC_FULL.md §5).
//!
//! The hot path only ever needs one effective `price_per_kwh` for
//! `(station_id, now)`; `TariffRepository::effective_price` resolves it from
//! whichever rows in `tariff_rules` have a validity window containing `now`,
//! falling back to `default_tariff_price_per_kwh` from config.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct TariffRule {
    pub id: i32,
    pub station_id: Option<String>,
    pub price_per_kwh: Decimal,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
}

impl TariffRule {
    pub fn covers(&self, now: DateTime<Utc>) -> bool {
        self.valid_from.map(|f| now >= f).unwrap_or(true)
            && self.valid_to.map(|t| now < t).unwrap_or(true)
    }
}
