//! Result rows, schedule periods and the persisted record built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::{EventEnvelope, LeagueType};
use crate::error::{Error, Result};

/// One participant's outcome as returned by the results lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    pub player_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rank: u32,
    #[serde(default)]
    pub point: u32,
    /// Upstream sends an empty string when no deck was registered.
    #[serde(default)]
    pub deck_id: String,
}

impl ResultRow {
    pub fn deck_code(&self) -> Option<&str> {
        let code = self.deck_id.trim();
        (!code.is_empty()).then_some(code)
    }
}

/// The schedule period an event date falls into.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ScheduleRef {
    pub id: String,
    pub from_date: DateTime<Utc>,
    pub to_date: DateTime<Utc>,
}

impl ScheduleRef {
    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        self.from_date <= date && date <= self.to_date
    }
}

/// Durable record of one participant's result.
///
/// Identity is `(schedule_id, event_id, player_id)`; the storage layer
/// enforces it as a uniqueness constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedResult {
    pub schedule_id: String,
    pub event_id: i64,
    pub league_type: LeagueType,
    pub event_date: DateTime<Utc>,
    pub player_id: String,
    pub player_name: String,
    pub rank: i32,
    pub point: i32,
    pub deck_code: Option<String>,
}

impl PersistedResult {
    /// Build the record for one result row. Fails if an upstream number
    /// does not fit its column.
    pub fn new(
        schedule: &ScheduleRef,
        event: &EventEnvelope,
        league_type: LeagueType,
        row: &ResultRow,
    ) -> Result<Self> {
        Ok(Self {
            schedule_id: schedule.id.clone(),
            event_id: column("event id", event.id)?,
            league_type,
            event_date: event.date,
            player_id: row.player_id.clone(),
            player_name: row.name.clone(),
            rank: column("rank", row.rank)?,
            point: column("point", row.point)?,
            deck_code: row.deck_code().map(str::to_string),
        })
    }

    pub fn identity(&self) -> (&str, i64, &str) {
        (&self.schedule_id, self.event_id, &self.player_id)
    }
}

fn column<T, U>(name: &str, value: T) -> Result<U>
where
    T: Copy + std::fmt::Display,
    U: TryFrom<T>,
{
    U::try_from(value).map_err(|_| Error::OutOfRange(format!("{name} {value} does not fit its column")))
}
