//! Event envelope and league classification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One official event as published upstream and carried on the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub venue: String,
    /// Day the event is held. Used to resolve the schedule period.
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub type_name: String,
    #[serde(default)]
    pub league_title: String,
    #[serde(default)]
    pub regulation_title: String,
    #[serde(default)]
    pub csp_flg: bool,
    #[serde(default)]
    pub capacity: u32,
    #[serde(default)]
    pub shop_id: u64,
    #[serde(default)]
    pub shop_name: String,
}

impl EventEnvelope {
    pub fn league_type(&self) -> LeagueType {
        LeagueType::classify(&self.league_title)
    }
}

/// League division of an event. The discriminants are the stored values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum LeagueType {
    Unknown = 0,
    Open = 1,
    Junior = 2,
    Senior = 3,
    Master = 4,
}

impl LeagueType {
    /// Map an upstream league title to its division. Matching is exact;
    /// anything unrecognised, including the empty string, is `Unknown`.
    pub fn classify(league_title: &str) -> Self {
        match league_title {
            "オープン" => LeagueType::Open,
            "ジュニア" => LeagueType::Junior,
            "シニア" => LeagueType::Senior,
            "マスター" => LeagueType::Master,
            _ => LeagueType::Unknown,
        }
    }

    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

impl std::fmt::Display for LeagueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LeagueType::Unknown => "unknown",
            LeagueType::Open => "open",
            LeagueType::Junior => "junior",
            LeagueType::Senior => "senior",
            LeagueType::Master => "master",
        };
        write!(f, "{s}")
    }
}
