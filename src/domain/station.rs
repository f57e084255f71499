//! Station entity and its status lifecycle (spec.md §3).

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StationStatus {
    Unknown,
    Available,
    Occupied,
    Faulted,
    Unavailable,
    Offline,
}

impl StationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Available => "available",
            Self::Occupied => "occupied",
            Self::Faulted => "faulted",
            Self::Unavailable => "unavailable",
            Self::Offline => "offline",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(Self::Unknown),
            "available" => Some(Self::Available),
            "occupied" => Some(Self::Occupied),
            "faulted" => Some(Self::Faulted),
            "unavailable" => Some(Self::Unavailable),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }
}

/// A charging station, identified by the free-form id it presents at
/// WebSocket handshake (`/ws/{station_id}`).
#[derive(Debug, Clone)]
pub struct Station {
    pub id: String,
    pub location_id: Option<String>,
    pub owner_id: Option<String>,
    pub status: StationStatus,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub boot_info: Option<serde_json::Value>,
}
