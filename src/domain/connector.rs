//! Connector entity — a physical socket on a station (spec.md §3, GLOSSARY).
//!
//! `connector_id = 0` addresses the station as a whole per OCPP and never
//! carries a ChargingSession.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorStatus {
    Available,
    Occupied,
    Faulted,
    Unavailable,
    Reserved,
}

impl ConnectorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Occupied => "occupied",
            Self::Faulted => "faulted",
            Self::Unavailable => "unavailable",
            Self::Reserved => "reserved",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "available" => Some(Self::Available),
            "occupied" => Some(Self::Occupied),
            "faulted" => Some(Self::Faulted),
            "unavailable" => Some(Self::Unavailable),
            "reserved" => Some(Self::Reserved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Connector {
    pub station_id: String,
    pub connector_id: i32,
    pub status: ConnectorStatus,
}
