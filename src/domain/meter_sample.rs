//! OcppMeterSample entity — append-only metering record (spec.md §3).

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct OcppMeterSample {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub meter_wh: i64,
    pub measurand: String,
    pub unit: String,
}
