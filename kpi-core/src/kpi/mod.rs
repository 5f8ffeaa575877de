pub mod aligner;
pub mod cache;
pub mod error;
pub mod facade;
pub mod latest;
pub mod models;
pub mod store;
pub mod threshold;
pub mod trend;

pub use aligner::{align, AlignedSeries, SeriesPoint};
pub use cache::QueryCache;
pub use error::{KpiError, KpiResult};
pub use facade::{
    assemble, AggregationFacade, Completeness, KpiQuery, KpiResponse, DEFAULT_FETCH_TIMEOUT,
};
pub use latest::select_latest;
pub use models::{
    AchievementResult, AchievementStatus, DateRange, FieldEdit, MetricCategory, MetricDefinition,
    MetricObservation, ThresholdUpdate, TrendLabel,
};
pub use store::{
    DefinitionSource, MetricRecordSource, NewObservation, SqliteMetricStore,
    SqliteMetricStoreBuilder,
};
pub use threshold::{evaluate, validate_definition, ConfigurationIssue, IssueKind};
pub use trend::{classify, TrendClassifier, TrendConfig};
