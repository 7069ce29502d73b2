use serde::{Deserialize, Serialize};
use std::fmt;

/// Flow condition reported by a road sensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TrafficStatus {
    FreeFlow,
    Heavy,
    Congested,
    Unknown,
    /// Any label the upstream feed adds that we have no color for.
    Other(String),
}

impl TrafficStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TrafficStatus::FreeFlow => "freeFlow",
            TrafficStatus::Heavy => "heavy",
            TrafficStatus::Congested => "congested",
            TrafficStatus::Unknown => "unknown",
            TrafficStatus::Other(s) => s,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, TrafficStatus::Unknown)
    }
}

impl From<String> for TrafficStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "freeFlow" => TrafficStatus::FreeFlow,
            "heavy" => TrafficStatus::Heavy,
            "congested" => TrafficStatus::Congested,
            "unknown" => TrafficStatus::Unknown,
            _ => TrafficStatus::Other(s),
        }
    }
}

impl From<&str> for TrafficStatus {
    fn from(s: &str) -> Self {
        TrafficStatus::from(s.to_string())
    }
}

impl From<TrafficStatus> for String {
    fn from(s: TrafficStatus) -> Self {
        match s {
            TrafficStatus::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for TrafficStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One flattened sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficRecord {
    pub timestamp: String,
    pub traffic: TrafficStatus,
    pub lat: f64,
    pub lon: f64,
    /// `None` when the sensor reported no numeric value.
    pub average_vehicle_speed: Option<f64>,
    pub travel_time: Option<f64>,
}
