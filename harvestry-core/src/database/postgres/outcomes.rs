use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harvestry_model::{
    DatasetMetadata, HarvestOutcome, InstanceId, OutcomeStatus, ProviderId, RunSnapshot,
};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use crate::database::ports::OutcomeStore;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone)]
pub struct PostgresOutcomeStore {
    pool: PgPool,
}

impl PostgresOutcomeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn map_harvest_row(row: &PgRow) -> Result<HarvestOutcome> {
        let status: String = row.try_get("status")?;
        let status = OutcomeStatus::parse(&status).ok_or_else(|| {
            PipelineError::Internal(format!("unknown harvest status '{status}'"))
        })?;
        let metadata: Option<Json<DatasetMetadata>> = row.try_get("dynamic_metadata")?;
        let started_at: DateTime<Utc> = row.try_get("started_at")?;
        let ended_at: DateTime<Utc> = row.try_get("ended_at")?;

        Ok(HarvestOutcome {
            provider_id: ProviderId(row.try_get("provider_id")?),
            status,
            count: row.try_get("record_count")?,
            started_at,
            ended_at,
            notes: row.try_get("notes")?,
            dynamic_metadata: metadata.map(|Json(m)| m),
        })
    }
}

#[async_trait]
impl OutcomeStore for PostgresOutcomeStore {
    async fn harvest_outcome(
        &self,
        provider_id: ProviderId,
    ) -> Result<Option<HarvestOutcome>> {
        let row = sqlx::query(
            r#"
            SELECT provider_id, status, record_count, started_at, ended_at,
                   notes, dynamic_metadata
            FROM harvest_outcomes
            WHERE provider_id = $1
            "#,
        )
        .bind(provider_id.as_i32())
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(Self::map_harvest_row).transpose()
    }

    async fn harvest_outcomes(&self) -> Result<Vec<HarvestOutcome>> {
        let rows = sqlx::query(
            r#"
            SELECT provider_id, status, record_count, started_at, ended_at,
                   notes, dynamic_metadata
            FROM harvest_outcomes
            ORDER BY provider_id
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(Self::map_harvest_row).collect()
    }

    async fn upsert_harvest_outcome(&self, outcome: &HarvestOutcome) -> Result<()> {
        if !outcome.should_persist() {
            return Err(PipelineError::Internal(format!(
                "refusing to store {} outcome with count {} for provider {}",
                outcome.status.as_str(),
                outcome.count,
                outcome.provider_id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO harvest_outcomes (
                provider_id, status, record_count, started_at, ended_at,
                notes, dynamic_metadata, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (provider_id) DO UPDATE SET
                status = EXCLUDED.status,
                record_count = EXCLUDED.record_count,
                started_at = EXCLUDED.started_at,
                ended_at = EXCLUDED.ended_at,
                notes = EXCLUDED.notes,
                dynamic_metadata = EXCLUDED.dynamic_metadata,
                updated_at = NOW()
            "#,
        )
        .bind(outcome.provider_id.as_i32())
        .bind(outcome.status.as_str())
        .bind(outcome.count)
        .bind(outcome.started_at)
        .bind(outcome.ended_at)
        .bind(outcome.notes.as_deref())
        .bind(outcome.dynamic_metadata.as_ref().map(Json))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn run_snapshot(&self, instance: InstanceId) -> Result<Option<RunSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT snapshot
            FROM run_snapshots
            WHERE instance = $1
            "#,
        )
        .bind(i16::from(instance.bit()))
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let Json(snapshot): Json<RunSnapshot> = row.try_get("snapshot")?;
        Ok(Some(snapshot))
    }

    async fn upsert_run_snapshot(&self, snapshot: &RunSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO run_snapshots (instance, snapshot, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (instance) DO UPDATE SET
                snapshot = EXCLUDED.snapshot,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(i16::from(snapshot.instance.bit()))
        .bind(Json(snapshot))
        .bind(snapshot.updated_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
