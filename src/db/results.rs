//! Schedule lookup and idempotent result inserts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;

use crate::error::{Error, Result};
use crate::model::{PersistedResult, ScheduleRef};
use crate::telemetry::metrics;

/// Storage operations the worker depends on.
#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// The schedule period containing `date`. `Error::NotFound` when none does.
    async fn schedule_for_date(&self, date: DateTime<Utc>) -> Result<ScheduleRef>;

    /// Insert one result. A row with the same identity yields
    /// `Error::Conflict`, which callers treat as already recorded.
    async fn insert_result(&self, result: &PersistedResult) -> Result<()>;
}

#[async_trait]
impl ResultRepository for super::Db {
    async fn schedule_for_date(&self, date: DateTime<Utc>) -> Result<ScheduleRef> {
        let schedule: Option<ScheduleRef> = sqlx::query_as(
            "SELECT id, from_date, to_date FROM cityleague_schedules
             WHERE from_date <= $1 AND to_date >= $1
             ORDER BY from_date
             LIMIT 1",
        )
        .bind(date)
        .fetch_optional(self.pool())
        .await?;

        schedule.ok_or_else(|| Error::NotFound(format!("cityleague schedule for {date}")))
    }

    async fn insert_result(&self, result: &PersistedResult) -> Result<()> {
        let inserted = sqlx::query(
            "INSERT INTO cityleague_results
                (cityleague_schedule_id, official_event_id, league_type, event_date,
                 player_id, player_name, rank, point, deck_code)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&result.schedule_id)
        .bind(result.event_id)
        .bind(result.league_type.as_i16())
        .bind(result.event_date)
        .bind(&result.player_id)
        .bind(&result.player_name)
        .bind(result.rank)
        .bind(result.point)
        .bind(result.deck_code.as_deref())
        .execute(self.pool())
        .await;

        match inserted {
            Ok(_) => {
                metrics::results_persisted().add(1, &[KeyValue::new("result", "inserted")]);
                Ok(())
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                metrics::results_persisted().add(1, &[KeyValue::new("result", "duplicate")]);
                let (schedule_id, event_id, player_id) = result.identity();
                Err(Error::Conflict(format!(
                    "cityleague result ({schedule_id}, {event_id}, {player_id})"
                )))
            }
            Err(e) => Err(e.into()),
        }
    }
}
