use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sqlx::{MySqlPool, Row};
use tokio::sync::OnceCell;

use crate::checkpoint::CheckpointStore;
use crate::destination::sql;
use crate::error::SinkResult;

/// Checkpoint store appending to the `_sdc_checkpoints` table of a schema.
#[derive(Debug, Clone)]
pub struct MySqlCheckpointStore {
    pool: MySqlPool,
    schema: String,
    prepared: Arc<OnceCell<()>>,
}

impl MySqlCheckpointStore {
    pub fn new(pool: MySqlPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
            prepared: Arc::new(OnceCell::new()),
        }
    }

    async fn ensure_table(&self) -> SinkResult<()> {
        self.prepared
            .get_or_try_init(|| async {
                mysql::schema::ensure_schema(&self.pool, &self.schema).await?;
                sqlx::query(&sql::create_checkpoints(&self.schema))
                    .execute(&self.pool)
                    .await?;

                SinkResult::Ok(())
            })
            .await?;

        Ok(())
    }
}

impl CheckpointStore for MySqlCheckpointStore {
    async fn load(&self) -> SinkResult<HashMap<String, u64>> {
        self.ensure_table().await?;

        let rows = sqlx::query(&sql::load_checkpoints(&self.schema))
            .fetch_all(&self.pool)
            .await?;

        let mut positions = HashMap::with_capacity(rows.len());
        for row in rows {
            let stream: String = row.try_get("stream")?;
            let position: i64 = row.try_get("position")?;
            positions.insert(stream, u64::try_from(position).unwrap_or_default());
        }

        Ok(positions)
    }

    async fn append(&self, stream: &str, position: u64) -> SinkResult<()> {
        self.ensure_table().await?;

        sqlx::query(&sql::append_checkpoint(&self.schema))
            .bind(stream)
            .bind(i64::try_from(position).unwrap_or(i64::MAX))
            .bind(Utc::now().naive_utc())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
