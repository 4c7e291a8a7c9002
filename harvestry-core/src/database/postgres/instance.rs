use async_trait::async_trait;
use harvestry_model::InstanceId;
use sqlx::{PgPool, Row};

use crate::database::ports::ActiveInstanceStore;
use crate::error::{PipelineError, Result};

/// Active flag stored as the single row of `active_instance`.
#[derive(Debug, Clone)]
pub struct PostgresActiveInstanceStore {
    pool: PgPool,
}

impl PostgresActiveInstanceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode(raw: i16) -> Result<InstanceId> {
        let bit = u8::try_from(raw)
            .map_err(|_| PipelineError::Internal(format!("invalid active instance {raw}")))?;
        Ok(InstanceId::from_bit(bit)?)
    }
}

#[async_trait]
impl ActiveInstanceStore for PostgresActiveInstanceStore {
    async fn active(&self) -> Result<InstanceId> {
        let row = sqlx::query("SELECT instance FROM active_instance WHERE singleton")
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| {
                PipelineError::Internal("active_instance row is missing".into())
            })?;
        Self::decode(row.try_get("instance")?)
    }

    async fn compare_and_set(
        &self,
        expected: InstanceId,
        next: InstanceId,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE active_instance
            SET instance = $2, updated_at = NOW()
            WHERE singleton AND instance = $1
            "#,
        )
        .bind(i16::from(expected.bit()))
        .bind(i16::from(next.bit()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
