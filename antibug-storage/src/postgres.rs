//! PostgreSQL culture store
//!
//! Pooled with deadpool-postgres. Culture id lists and results are JSONB
//! columns; the query is rendered by [`crate::sql::render_select`].

use crate::query::CultureQuery;
use crate::sql::{render_select, SqlParam};
use crate::store::CultureStore;
use antibug_core::{
    AntibugError, AntibugResult, CultureRecord, LabTestResult, StorageError, TestMethod,
};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Culture store connection pool configuration.
#[derive(Debug, Clone)]
pub struct PgStoreConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection wait timeout
    pub timeout: Duration,
}

impl Default for PgStoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "antibug".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl PgStoreConfig {
    /// Create a configuration from `ANTIBUG_DB_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("ANTIBUG_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("ANTIBUG_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("ANTIBUG_DB_NAME").unwrap_or_else(|_| "antibug".to_string()),
            user: std::env::var("ANTIBUG_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("ANTIBUG_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("ANTIBUG_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("ANTIBUG_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> AntibugResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls).map_err(|e| {
            StorageError::ConnectionFailed {
                reason: format!("Failed to create pool: {}", e),
            }
            .into()
        })
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Culture store backed by a PostgreSQL `cultures` table.
#[derive(Clone)]
pub struct PgCultureStore {
    pool: Pool,
}

impl PgCultureStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &PgStoreConfig) -> AntibugResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Current pool size.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> AntibugResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            StorageError::ConnectionFailed {
                reason: e.to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl CultureStore for PgCultureStore {
    async fn find(&self, query: &CultureQuery) -> AntibugResult<Vec<CultureRecord>> {
        let statement = render_select(query);
        let params: Vec<&(dyn ToSql + Sync)> =
            statement.params.iter().map(param_as_sql).collect();

        let conn = self.get_conn().await?;
        let rows = conn
            .query(statement.clause.as_str(), &params)
            .await
            .map_err(|e| StorageError::QueryFailed {
                operation: "find cultures".to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(rows = rows.len(), "culture query returned");
        rows.iter().map(row_to_record).collect()
    }
}

fn param_as_sql(param: &SqlParam) -> &(dyn ToSql + Sync) {
    match param {
        SqlParam::BigInt(v) => v,
        SqlParam::Int(v) => v,
        SqlParam::Text(v) => v,
        SqlParam::TextArray(v) => v,
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn column<'a, T>(row: &'a Row, name: &str) -> AntibugResult<T>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get(name).map_err(|e| {
        StorageError::RowMapping {
            column: name.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn json_column<T: DeserializeOwned>(row: &Row, name: &str) -> AntibugResult<T> {
    let value: JsonValue = column(row, name)?;
    serde_json::from_value(value).map_err(|e| {
        StorageError::RowMapping {
            column: name.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn row_to_record(row: &Row) -> AntibugResult<CultureRecord> {
    let test_method: String = column(row, "test_method")?;
    let test_method = TestMethod::from_db_str(&test_method).map_err(|e| {
        AntibugError::from(StorageError::RowMapping {
            column: "test_method".to_string(),
            reason: e.to_string(),
        })
    })?;
    let culture_results: Vec<LabTestResult> = json_column(row, "culture_results")?;

    Ok(CultureRecord {
        culture_id: column(row, "culture_id")?,
        lab_tech_id: column(row, "lab_tech_id")?,
        facility_id: column(row, "facility_id")?,
        county_code: column(row, "county_code")?,
        sub_county_code: column(row, "sub_county_code")?,
        patient_id: column(row, "patient_id")?,
        patient_gender: column(row, "patient_gender")?,
        patient_age: column(row, "patient_age")?,
        culture_source: column(row, "culture_source")?,
        test_method,
        pathogens_found: json_column(row, "pathogens_found")?,
        antimicrobials_used: json_column(row, "antimicrobials_used")?,
        culture_results,
        results_timestamp_sec: column(row, "results_timestamp_sec")?,
    })
}
