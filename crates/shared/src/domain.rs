use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(StationUuid);
id_newtype!(AlertId);

/// Travel direction of a configured station. `All` tracks both platforms and
/// leaves the per-arrival `dir` to say which one each train uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    #[serde(rename = "N")]
    North,
    #[serde(rename = "S")]
    South,
    #[serde(rename = "all")]
    All,
}

impl Direction {
    pub fn code(self) -> &'static str {
        match self {
            Direction::North => "N",
            Direction::South => "S",
            Direction::All => "all",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::North => "Uptown",
            Direction::South => "Downtown",
            Direction::All => "All directions",
        }
    }

    /// Used as a view filter: `All` passes everything, a concrete direction
    /// only passes the same concrete direction.
    pub fn admits(self, direction: Direction) -> bool {
        match self {
            Direction::All => true,
            filter => filter == direction,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown direction '{0}' (expected N, S or all)")]
pub struct ParseDirectionError(pub String);

impl FromStr for Direction {
    type Err = ParseDirectionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "n" | "north" | "uptown" => Ok(Direction::North),
            "s" | "south" | "downtown" => Ok(Direction::South),
            "all" | "both" | "*" => Ok(Direction::All),
            _ => Err(ParseDirectionError(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Major,
    Minor,
    Info,
    #[serde(other)]
    Unknown,
}

impl AlertSeverity {
    /// Lower is more severe. Unrecognised severities rank with `Info`.
    pub fn rank(self) -> u8 {
        match self {
            AlertSeverity::Major => 0,
            AlertSeverity::Minor => 1,
            AlertSeverity::Info | AlertSeverity::Unknown => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_uses_wire_codes() {
        assert_eq!(serde_json::to_string(&Direction::North).unwrap(), "\"N\"");
        assert_eq!(serde_json::to_string(&Direction::All).unwrap(), "\"all\"");
        let parsed: Direction = serde_json::from_str("\"S\"").unwrap();
        assert_eq!(parsed, Direction::South);
    }

    #[test]
    fn direction_parses_cli_spellings() {
        assert_eq!("uptown".parse::<Direction>().unwrap(), Direction::North);
        assert_eq!(" S ".parse::<Direction>().unwrap(), Direction::South);
        assert_eq!("ALL".parse::<Direction>().unwrap(), Direction::All);
        assert!("east".parse::<Direction>().is_err());
    }

    #[test]
    fn all_filter_admits_every_direction() {
        for direction in [Direction::North, Direction::South, Direction::All] {
            assert!(Direction::All.admits(direction));
        }
        assert!(Direction::North.admits(Direction::North));
        assert!(!Direction::North.admits(Direction::All));
        assert!(!Direction::South.admits(Direction::North));
    }

    #[test]
    fn unknown_severity_ranks_as_info() {
        let severity: AlertSeverity = serde_json::from_str("\"planned_work\"").unwrap();
        assert_eq!(severity, AlertSeverity::Unknown);
        assert_eq!(severity.rank(), AlertSeverity::Info.rank());
        assert!(AlertSeverity::Major.rank() < AlertSeverity::Minor.rank());
    }
}
