use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use tracing::info;

use crate::sqlite::configure_connection;

use super::models::{DateRange, MetricDefinition, MetricObservation, ThresholdUpdate};
use super::{KpiError, KpiResult};

const KPI_SCHEMA: &str = include_str!("../../../sql/kpi.sql");

/// Read side of the observation store, as seen by the aggregation facade.
#[async_trait]
pub trait MetricRecordSource: Send + Sync {
    /// Returns observations for `store_id` within the inclusive `range`, in
    /// ingestion order.
    async fn fetch(
        &self,
        store_id: &str,
        range: DateRange,
        metric_ids: Option<&[String]>,
    ) -> KpiResult<Vec<MetricObservation>>;
}

/// Lookup of metric definitions; unknown ids are simply absent from the map.
#[async_trait]
pub trait DefinitionSource: Send + Sync {
    async fn definitions(
        &self,
        metric_ids: &[String],
    ) -> KpiResult<HashMap<String, MetricDefinition>>;
}

/// Observation waiting to be appended to the store.
#[derive(Debug, Clone)]
pub struct NewObservation {
    pub metric_id: String,
    pub store_id: String,
    pub record_date: NaiveDate,
    pub value: f64,
    pub notes: Option<String>,
}

impl NewObservation {
    pub fn new(
        metric_id: impl Into<String>,
        store_id: impl Into<String>,
        record_date: NaiveDate,
        value: f64,
    ) -> Self {
        Self {
            metric_id: metric_id.into(),
            store_id: store_id.into(),
            record_date,
            value,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct SqliteMetricStoreBuilder {
    path: Option<PathBuf>,
    create_if_missing: bool,
}

impl Default for SqliteMetricStoreBuilder {
    fn default() -> Self {
        Self {
            path: None,
            create_if_missing: true,
        }
    }
}

impl SqliteMetricStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> KpiResult<SqliteMetricStore> {
        let path = self.path.ok_or(KpiError::MissingStore)?;
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE;
        if self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        Ok(SqliteMetricStore { path, flags })
    }
}

/// SQLite-backed observation and definition store.
#[derive(Debug, Clone)]
pub struct SqliteMetricStore {
    path: PathBuf,
    flags: OpenFlags,
}

impl SqliteMetricStore {
    pub fn builder() -> SqliteMetricStoreBuilder {
        SqliteMetricStoreBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> KpiResult<Self> {
        SqliteMetricStoreBuilder::new().path(path).build()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> KpiResult<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            KpiError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        configure_connection(&conn).map_err(|source| KpiError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> KpiResult<()> {
        let conn = self.open()?;
        conn.execute_batch(KPI_SCHEMA)?;
        Ok(())
    }

    pub fn record_observation(&self, observation: &NewObservation) -> KpiResult<MetricObservation> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO metric_observations (metric_id, store_id, record_date, value, notes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &observation.metric_id,
                &observation.store_id,
                observation.record_date,
                observation.value,
                &observation.notes,
            ],
        )?;
        let seq = conn.last_insert_rowid();
        let row = conn.query_row(
            "SELECT * FROM metric_observations WHERE seq = ?1",
            [seq],
            MetricObservation::from_row,
        )?;
        Ok(row)
    }

    /// Observations for a store and inclusive date range, oldest ingestion first.
    pub fn observations(
        &self,
        store_id: &str,
        range: DateRange,
        metric_ids: Option<&[String]>,
    ) -> KpiResult<Vec<MetricObservation>> {
        if range.is_empty() || matches!(metric_ids, Some(ids) if ids.is_empty()) {
            return Ok(Vec::new());
        }
        let mut sql = String::from(
            "SELECT * FROM metric_observations
             WHERE store_id = ?1 AND record_date >= ?2 AND record_date <= ?3",
        );
        let mut values = vec![
            Value::Text(store_id.to_string()),
            Value::Text(range.start.format("%F").to_string()),
            Value::Text(range.end.format("%F").to_string()),
        ];
        if let Some(ids) = metric_ids {
            let placeholders = (0..ids.len())
                .map(|index| format!("?{}", index + 4))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" AND metric_id IN ({placeholders})"));
            values.extend(ids.iter().cloned().map(Value::Text));
        }
        sql.push_str(" ORDER BY seq ASC");

        let conn = self.open()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), MetricObservation::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Inserts a definition, or refreshes the descriptive fields of an existing one.
    ///
    /// Target and thresholds of an existing metric are left untouched; they only
    /// change through [`SqliteMetricStore::update_thresholds`]. Returns the stored row.
    pub fn upsert_definition(
        &self,
        definition: &MetricDefinition,
    ) -> KpiResult<MetricDefinition> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO metric_definitions (
                metric_id, name, category, unit, target_value, warning_threshold,
                critical_threshold, active, updated_at
            ) VALUES (
                :metric_id, :name, :category, :unit, :target_value, :warning_threshold,
                :critical_threshold, :active, datetime('now')
            )
            ON CONFLICT(metric_id) DO UPDATE SET
                name = excluded.name,
                category = excluded.category,
                unit = excluded.unit,
                active = excluded.active,
                updated_at = excluded.updated_at",
            params![
                &definition.id,
                &definition.name,
                definition.category.as_str(),
                &definition.unit,
                definition.target_value,
                definition.warning_threshold,
                definition.critical_threshold,
                if definition.active { 1 } else { 0 },
            ],
        )?;
        self.definition(&definition.id)?
            .ok_or_else(|| KpiError::DefinitionNotFound {
                metric_id: definition.id.clone(),
            })
    }

    pub fn definition(&self, metric_id: &str) -> KpiResult<Option<MetricDefinition>> {
        let conn = self.open()?;
        let definition = conn
            .query_row(
                "SELECT * FROM metric_definitions WHERE metric_id = ?1",
                [metric_id],
                MetricDefinition::from_row,
            )
            .optional()?;
        Ok(definition)
    }

    pub fn list_definitions(&self, active_only: bool) -> KpiResult<Vec<MetricDefinition>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM metric_definitions
             WHERE (?1 = 0 OR active = 1)
             ORDER BY metric_id ASC",
        )?;
        let rows = stmt
            .query_map([active_only as i64], MetricDefinition::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Explicit threshold edit; the only mutation path for an existing definition's bounds.
    pub fn update_thresholds(
        &self,
        metric_id: &str,
        update: &ThresholdUpdate,
    ) -> KpiResult<MetricDefinition> {
        let mut definition =
            self.definition(metric_id)?
                .ok_or_else(|| KpiError::DefinitionNotFound {
                    metric_id: metric_id.to_string(),
                })?;
        if update.is_noop() {
            return Ok(definition);
        }
        definition.apply(update);
        let conn = self.open()?;
        conn.execute(
            "UPDATE metric_definitions
             SET target_value = ?2, warning_threshold = ?3, critical_threshold = ?4,
                 updated_at = datetime('now')
             WHERE metric_id = ?1",
            params![
                metric_id,
                definition.target_value,
                definition.warning_threshold,
                definition.critical_threshold,
            ],
        )?;
        info!(
            metric_id,
            target = ?definition.target_value,
            warning = ?definition.warning_threshold,
            critical = ?definition.critical_threshold,
            "metric thresholds updated"
        );
        Ok(definition)
    }

    fn definitions_by_id(
        &self,
        metric_ids: &[String],
    ) -> KpiResult<HashMap<String, MetricDefinition>> {
        let mut found = HashMap::new();
        for metric_id in metric_ids {
            if found.contains_key(metric_id) {
                continue;
            }
            if let Some(definition) = self.definition(metric_id)? {
                found.insert(metric_id.clone(), definition);
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl MetricRecordSource for SqliteMetricStore {
    async fn fetch(
        &self,
        store_id: &str,
        range: DateRange,
        metric_ids: Option<&[String]>,
    ) -> KpiResult<Vec<MetricObservation>> {
        let store = self.clone();
        let store_id = store_id.to_string();
        let metric_ids = metric_ids.map(<[String]>::to_vec);
        tokio::task::spawn_blocking(move || {
            store.observations(&store_id, range, metric_ids.as_deref())
        })
        .await
        .map_err(|err| KpiError::Task(err.to_string()))?
    }
}

#[async_trait]
impl DefinitionSource for SqliteMetricStore {
    async fn definitions(
        &self,
        metric_ids: &[String],
    ) -> KpiResult<HashMap<String, MetricDefinition>> {
        let store = self.clone();
        let metric_ids = metric_ids.to_vec();
        tokio::task::spawn_blocking(move || store.definitions_by_id(&metric_ids))
            .await
            .map_err(|err| KpiError::Task(err.to_string()))?
    }
}
