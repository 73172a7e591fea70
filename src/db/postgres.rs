//! PostgreSQL backend for the record store.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Config, Object, Pool, PoolConfig, Runtime};
use tokio_postgres::types::Type;
use tokio_postgres::{Column, NoTls, Row};

use crate::config::DatabaseConfig;
use crate::db::RecordStore;
use crate::error::DatabaseError;
use crate::records::{FieldValue, ResultRecord, ResultSet};
use crate::retry::connect_backoff_delay;
use crate::schema::SchemaContract;
use crate::seed::NewPatientRecord;

/// Pooled PostgreSQL store.
pub struct PgStore {
    pool: Pool,
    connect_retries: u32,
    statement_timeout: Duration,
}

impl PgStore {
    /// Build the pool. Connections are opened lazily on first use.
    pub fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let mut cfg = Config::new();
        cfg.url = Some(config.url().to_string());
        cfg.pool = Some(PoolConfig {
            max_size: config.pool_size,
            ..Default::default()
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;

        Ok(Self {
            pool,
            connect_retries: config.connect_retries,
            statement_timeout: config.query_timeout,
        })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: Pool) -> Self {
        Self {
            pool,
            connect_retries: 0,
            statement_timeout: Duration::from_secs(30),
        }
    }

    /// Get a connection, retrying connection faults with bounded backoff.
    async fn conn(&self) -> Result<Object, DatabaseError> {
        let mut attempt = 0;
        loop {
            let err = match self.pool.get().await {
                Ok(client) => return Ok(client),
                Err(e) => DatabaseError::from(e),
            };
            if !err.is_connection_fault() || attempt >= self.connect_retries {
                return Err(err);
            }

            let delay = connect_backoff_delay(attempt);
            tracing::warn!(
                attempt = attempt + 1,
                max_attempts = self.connect_retries + 1,
                ?delay,
                "Store connection failed, retrying: {}",
                err
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Create the contract's table if it does not exist yet.
    pub async fn ensure_table(&self, contract: &SchemaContract) -> Result<(), DatabaseError> {
        let client = self.conn().await?;
        client
            .batch_execute(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id SERIAL PRIMARY KEY,
                    name VARCHAR(50) NOT NULL,
                    age INTEGER NOT NULL,
                    patient_id VARCHAR(50) UNIQUE NOT NULL,
                    symptoms TEXT,
                    ct_image_file VARCHAR(100),
                    image_path VARCHAR(255)
                )
                "#,
                contract.table()
            ))
            .await?;
        Ok(())
    }

    /// Insert records in one transaction. Returns how many were inserted.
    pub async fn insert_records(
        &self,
        contract: &SchemaContract,
        records: &[NewPatientRecord],
    ) -> Result<u64, DatabaseError> {
        let mut client = self.conn().await?;
        let tx = client.transaction().await?;
        let stmt = tx
            .prepare(&format!(
                "INSERT INTO {} (name, age, patient_id, symptoms, ct_image_file, image_path) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                contract.table()
            ))
            .await?;

        let mut inserted = 0;
        for record in records {
            inserted += tx
                .execute(
                    &stmt,
                    &[
                        &record.name,
                        &record.age,
                        &record.patient_id,
                        &record.symptoms,
                        &record.ct_image_file,
                        &record.image_path,
                    ],
                )
                .await?;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Every record, projected onto the contract's fields in contract order.
    pub async fn list_all(&self, contract: &SchemaContract) -> Result<ResultSet, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY id",
            contract.field_names().join(", "),
            contract.table()
        );
        self.fetch_all(&sql).await
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn fetch_all(&self, sql: &str) -> Result<ResultSet, DatabaseError> {
        let mut client = self.conn().await?;
        let tx = client.build_transaction().read_only(true).start().await?;
        tx.batch_execute(&format!(
            "SET LOCAL statement_timeout = {}",
            self.statement_timeout.as_millis()
        ))
        .await?;

        let stmt = tx.prepare(sql).await?;
        let rows = tx.query(&stmt, &[]).await?;
        tx.commit().await?;
        drop(client);

        let mut set = ResultSet::new(stmt.columns().iter().map(|c| c.name().to_string()).collect());
        for row in &rows {
            let values = stmt
                .columns()
                .iter()
                .enumerate()
                .map(|(idx, column)| decode_cell(row, idx, column))
                .collect::<Result<Vec<_>, _>>()?;
            set.push(ResultRecord::new(values));
        }

        tracing::debug!(rows = set.len(), columns = set.columns.len(), "Fetched result set");
        Ok(set)
    }
}

fn decode_cell(row: &Row, idx: usize, column: &Column) -> Result<FieldValue, DatabaseError> {
    let ty = column.type_();
    let value = if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)?
            .map(|v| FieldValue::Integer(i64::from(v)))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)?
            .map(|v| FieldValue::Integer(i64::from(v)))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)?.map(FieldValue::Integer)
    } else if [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME].contains(ty) {
        row.try_get::<_, Option<String>>(idx)?.map(FieldValue::Text)
    } else {
        return Err(DatabaseError::UnsupportedType {
            column: column.name().to_string(),
            type_name: ty.name().to_string(),
        });
    };
    Ok(value.unwrap_or(FieldValue::Null))
}
