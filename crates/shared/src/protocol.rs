use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{AlertId, AlertSeverity, Direction, StationUuid};

/// Element of `GET /api/stations`: a configured station without arrivals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationConfig {
    pub uuid: StationUuid,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub is_main: bool,
}

/// Element of `GET /api/arrivals`: a configured station with its upcoming
/// arrivals, already ordered by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationArrivals {
    pub uuid: StationUuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub is_main: bool,
    #[serde(default)]
    pub arrivals: Vec<Arrival>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arrival {
    pub line: String,
    /// Minutes until the train arrives.
    pub time: u32,
    #[serde(
        default,
        deserialize_with = "non_empty_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub destination: Option<String>,
    /// Only sent for stations tracking `Direction::All`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<Direction>,
}

impl Arrival {
    pub fn effective_direction(&self, station_direction: Direction) -> Direction {
        match station_direction {
            Direction::All => self.dir.unwrap_or(Direction::All),
            direction => direction,
        }
    }

    pub fn minutes_label(&self) -> String {
        minutes_label(self.time)
    }
}

pub fn minutes_label(minutes: u32) -> String {
    match minutes {
        0 => "Now".to_string(),
        1 => "1 min".to_string(),
        minutes => format!("{minutes} mins"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub severity: AlertSeverity,
    #[serde(default)]
    pub routes: Vec<String>,
    pub header: String,
    #[serde(
        default,
        deserialize_with = "non_empty_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
}

/// Search hit from `GET /api/stations/available`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableStation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddStationRequest {
    pub id: String,
    pub direction: Direction,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDirectionRequest {
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderRequest {
    pub order: Vec<StationUuid>,
}

fn non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}
