//! KPI time-series aggregation and threshold evaluation.
//!
//! Raw per-store daily observations are aligned onto a shared date axis,
//! measured against configured targets, classified by trend and reduced to
//! one authoritative latest value per metric. [`kpi::AggregationFacade`] ties
//! these steps together for a single store and date range.

pub mod config;
pub mod error;
pub mod kpi;
mod sqlite;

pub use config::{load_engine_config, EngineConfig, FetchSection, StoreSection, TrendSection};
pub use error::{ConfigError, Result};
pub use kpi::{
    AchievementResult, AchievementStatus, AggregationFacade, AlignedSeries, Completeness,
    ConfigurationIssue, DateRange, DefinitionSource, KpiError, KpiQuery, KpiResponse, KpiResult,
    MetricCategory, MetricDefinition, MetricObservation, MetricRecordSource, NewObservation,
    QueryCache, SqliteMetricStore, SqliteMetricStoreBuilder, ThresholdUpdate, TrendConfig,
    TrendLabel,
};
