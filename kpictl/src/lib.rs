use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use kpi_core::kpi::{validate_definition, FieldEdit};
use kpi_core::{
    load_engine_config, AggregationFacade, ConfigurationIssue, DateRange, EngineConfig, KpiQuery,
    KpiResponse, MetricCategory, MetricDefinition, MetricObservation, NewObservation,
    SqliteMetricStore, ThresholdUpdate,
};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] kpi_core::ConfigError),
    #[error("store error: {0}")]
    Store(#[from] kpi_core::KpiError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0} configuration issue(s) found")]
    ValidationFailed(usize),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "KPI aggregation engine control interface", long_about = None)]
pub struct Cli {
    /// Path to kpi.toml
    #[arg(long, default_value = "configs/kpi.toml")]
    pub config: PathBuf,
    /// Overrides store.database from the config file
    #[arg(long)]
    pub database: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Creates the database schema
    Init,
    /// Appends one daily observation
    Record(RecordArgs),
    /// Creates a metric definition or updates its descriptive fields
    Define(DefineArgs),
    /// Threshold edits on existing definitions
    #[command(subcommand)]
    Thresholds(ThresholdCommands),
    /// Lists metric definitions
    Definitions(DefinitionsArgs),
    /// Reports inconsistent threshold configuration
    Validate(ValidateArgs),
    /// Runs an aggregation query for one store
    Query(QueryArgs),
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    #[arg(long)]
    pub store: String,
    #[arg(long)]
    pub metric: String,
    /// Calendar date, YYYY-MM-DD
    #[arg(long)]
    pub date: NaiveDate,
    #[arg(long, allow_negative_numbers = true)]
    pub value: f64,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CategoryArg {
    Revenue,
    Cost,
    Efficiency,
    Quality,
    Customer,
}

impl From<CategoryArg> for MetricCategory {
    fn from(value: CategoryArg) -> Self {
        match value {
            CategoryArg::Revenue => MetricCategory::Revenue,
            CategoryArg::Cost => MetricCategory::Cost,
            CategoryArg::Efficiency => MetricCategory::Efficiency,
            CategoryArg::Quality => MetricCategory::Quality,
            CategoryArg::Customer => MetricCategory::Customer,
        }
    }
}

#[derive(Args, Debug)]
pub struct DefineArgs {
    #[arg(long)]
    pub id: String,
    #[arg(long)]
    pub name: String,
    #[arg(long, value_enum)]
    pub category: CategoryArg,
    #[arg(long)]
    pub unit: String,
    #[arg(long, allow_negative_numbers = true)]
    pub target: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub warning: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub critical: Option<f64>,
    /// Marks the metric inactive
    #[arg(long, default_value_t = false)]
    pub inactive: bool,
}

#[derive(Subcommand, Debug)]
pub enum ThresholdCommands {
    /// Sets or clears target, warning and critical values
    Set(ThresholdSetArgs),
}

#[derive(Args, Debug)]
pub struct ThresholdSetArgs {
    #[arg(long)]
    pub metric: String,
    #[arg(long, allow_negative_numbers = true, conflicts_with = "clear_target")]
    pub target: Option<f64>,
    #[arg(long, allow_negative_numbers = true, conflicts_with = "clear_warning")]
    pub warning: Option<f64>,
    #[arg(long, allow_negative_numbers = true, conflicts_with = "clear_critical")]
    pub critical: Option<f64>,
    #[arg(long, default_value_t = false)]
    pub clear_target: bool,
    #[arg(long, default_value_t = false)]
    pub clear_warning: bool,
    #[arg(long, default_value_t = false)]
    pub clear_critical: bool,
}

impl ThresholdSetArgs {
    fn to_update(&self) -> ThresholdUpdate {
        ThresholdUpdate {
            target_value: field_edit(self.target, self.clear_target),
            warning_threshold: field_edit(self.warning, self.clear_warning),
            critical_threshold: field_edit(self.critical, self.clear_critical),
        }
    }
}

fn field_edit(value: Option<f64>, clear: bool) -> FieldEdit {
    match (value, clear) {
        (_, true) => FieldEdit::Clear,
        (Some(value), false) => FieldEdit::Set(value),
        (None, false) => FieldEdit::Keep,
    }
}

#[derive(Args, Debug)]
pub struct DefinitionsArgs {
    /// Only lists active metrics
    #[arg(long, default_value_t = false)]
    pub active_only: bool,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Exits with an error when any issue is found
    #[arg(long, default_value_t = false)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    #[arg(long)]
    pub store: String,
    /// First day, inclusive
    #[arg(long)]
    pub start: NaiveDate,
    /// Last day, inclusive
    #[arg(long)]
    pub end: NaiveDate,
    /// Restricts the query to a metric; repeatable
    #[arg(long = "metric")]
    pub metrics: Vec<String>,
    /// Overrides fetch.timeout_ms from the config file
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

pub async fn run(cli: Cli) -> Result<()> {
    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Init => {
            let result = context.init()?;
            render(&result, cli.format)?;
        }
        Commands::Record(args) => {
            let observation = context.record(args)?;
            render(&observation, cli.format)?;
        }
        Commands::Define(args) => {
            let definition = context.define(args)?;
            render(&definition, cli.format)?;
        }
        Commands::Thresholds(ThresholdCommands::Set(args)) => {
            let definition = context.set_thresholds(args)?;
            render(&definition, cli.format)?;
        }
        Commands::Definitions(args) => {
            let list = context.definitions(args)?;
            render(&list, cli.format)?;
        }
        Commands::Validate(args) => {
            let report = context.validate()?;
            render(&report, cli.format)?;
            if args.strict && !report.issues.is_empty() {
                return Err(AppError::ValidationFailed(report.issues.len()));
            }
        }
        Commands::Query(args) => {
            let response = context.query(args).await?;
            render(&response, cli.format)?;
        }
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: EngineConfig,
    database: PathBuf,
    store: SqliteMetricStore,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config = load_engine_config(&cli.config)?;
        let config_dir = cli
            .config
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let database = cli
            .database
            .clone()
            .unwrap_or_else(|| config.resolve_path(&config_dir, &config.store.database));
        // only `init` may create the database file
        let store = SqliteMetricStore::builder()
            .path(&database)
            .create_if_missing(matches!(cli.command, Commands::Init))
            .build()?;
        debug!(database = %database.display(), "kpictl context ready");
        Ok(Self {
            config,
            database,
            store,
        })
    }

    fn init(&self) -> Result<InitResult> {
        if let Some(parent) = self.database.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    AppError::InvalidArgument(format!(
                        "cannot create {}: {err}",
                        parent.display()
                    ))
                })?;
            }
        }
        self.store.initialize()?;
        Ok(InitResult {
            database: self.database.clone(),
        })
    }

    fn record(&self, args: &RecordArgs) -> Result<MetricObservation> {
        if !args.value.is_finite() {
            return Err(AppError::InvalidArgument(format!(
                "value must be finite, got {}",
                args.value
            )));
        }
        let mut observation =
            NewObservation::new(&args.metric, &args.store, args.date, args.value);
        observation.notes = args.notes.clone();
        Ok(self.store.record_observation(&observation)?)
    }

    fn define(&self, args: &DefineArgs) -> Result<MetricDefinition> {
        let definition = MetricDefinition {
            id: args.id.clone(),
            name: args.name.clone(),
            category: args.category.into(),
            unit: args.unit.clone(),
            target_value: args.target,
            warning_threshold: args.warning,
            critical_threshold: args.critical,
            active: !args.inactive,
        };
        Ok(self.store.upsert_definition(&definition)?)
    }

    fn set_thresholds(&self, args: &ThresholdSetArgs) -> Result<MetricDefinition> {
        Ok(self.store.update_thresholds(&args.metric, &args.to_update())?)
    }

    fn definitions(&self, args: &DefinitionsArgs) -> Result<DefinitionList> {
        let rows = self.store.list_definitions(args.active_only)?;
        Ok(DefinitionList { rows })
    }

    fn validate(&self) -> Result<ValidationReport> {
        let definitions = self.store.list_definitions(false)?;
        let issues = definitions.iter().flat_map(validate_definition).collect();
        Ok(ValidationReport {
            checked: definitions.len(),
            issues,
        })
    }

    async fn query(&self, args: &QueryArgs) -> Result<KpiResponse> {
        let timeout = args
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.fetch_timeout());
        if timeout.is_zero() {
            return Err(AppError::InvalidArgument(
                "timeout-ms must be greater than zero".to_string(),
            ));
        }
        let shared = Arc::new(self.store.clone());
        let facade = AggregationFacade::new(shared.clone(), shared)
            .with_trend_config(self.config.trend_config())
            .with_fetch_timeout(timeout);
        let mut query = KpiQuery::new(&args.store, DateRange::new(args.start, args.end));
        if !args.metrics.is_empty() {
            query = query.with_metrics(args.metrics.iter().cloned());
        }
        Ok(facade.query(&query).await)
    }
}

#[derive(Debug, Serialize)]
pub struct InitResult {
    pub database: PathBuf,
}

impl DisplayFallback for InitResult {
    fn display(&self) -> String {
        format!("Schema ready at {}", self.database.display())
    }
}

impl DisplayFallback for MetricObservation {
    fn display(&self) -> String {
        let mut line = format!(
            "{} @ {} on {}: {}",
            self.metric_id, self.store_id, self.record_date, self.value
        );
        if let Some(notes) = &self.notes {
            line.push_str(&format!(" ({notes})"));
        }
        line
    }
}

fn optional(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v}"))
        .unwrap_or_else(|| "-".to_string())
}

impl DisplayFallback for MetricDefinition {
    fn display(&self) -> String {
        format!(
            "{} | {} | {} [{}] | target={} warning={} critical={}{}",
            self.id,
            self.name,
            self.category,
            self.unit,
            optional(self.target_value),
            optional(self.warning_threshold),
            optional(self.critical_threshold),
            if self.active { "" } else { " | inactive" }
        )
    }
}

#[derive(Debug, Serialize)]
pub struct DefinitionList {
    pub rows: Vec<MetricDefinition>,
}

impl DisplayFallback for DefinitionList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "No metric definitions".to_string();
        }
        self.rows
            .iter()
            .map(DisplayFallback::display)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub checked: usize,
    pub issues: Vec<ConfigurationIssue>,
}

impl DisplayFallback for ValidationReport {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "{} definition(s) checked, {} issue(s)",
            self.checked,
            self.issues.len()
        )];
        for issue in &self.issues {
            lines.push(format!(
                "[WARN] {} {:?}: {}",
                issue.metric_id, issue.kind, issue.detail
            ));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for KpiResponse {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "Store {} from {} to {}",
            self.store_id, self.range.start, self.range.end
        )];
        if let kpi_core::Completeness::Partial { reason } = &self.completeness {
            lines.push(format!("Partial result: {reason}"));
        }
        if self.latest.is_empty() && self.series.is_empty() {
            lines.push("No observations".to_string());
            return lines.join("\n");
        }
        lines.push("Latest:".to_string());
        for (metric_id, result) in &self.latest {
            let rate = result
                .achievement_rate
                .map(|rate| format!("{:.1}%", rate * 100.0))
                .unwrap_or_else(|| "-".to_string());
            let trend = self
                .trends
                .get(metric_id)
                .map(|trend| trend.as_str())
                .unwrap_or("-");
            lines.push(format!(
                "  - {metric_id}: value={} date={} rate={rate} status={} trend={trend}",
                optional(result.value),
                result
                    .record_date
                    .map(|date| date.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                result.status,
            ));
        }
        if !self.series.is_empty() {
            lines.push("Series:".to_string());
            for (metric_id, points) in &self.series.series {
                let values = points
                    .iter()
                    .map(|point| optional(point.value))
                    .collect::<Vec<_>>()
                    .join(" ");
                lines.push(format!("  - {metric_id}: {values}"));
            }
        }
        for issue in &self.issues {
            lines.push(format!("[WARN] {}: {}", issue.metric_id, issue.detail));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kpi_core::{AchievementStatus, Completeness};
    use tempfile::TempDir;

    fn cli(config: PathBuf, command: Commands) -> Cli {
        Cli {
            config,
            database: None,
            format: OutputFormat::Json,
            command,
        }
    }

    fn prepare_test_context() -> Result<(TempDir, AppContext)> {
        let temp = TempDir::new().unwrap();
        let configs_dir = temp.path().join("configs");
        std::fs::create_dir_all(&configs_dir).unwrap();
        let config_path = configs_dir.join("kpi.toml");
        std::fs::copy("../configs/kpi.toml", &config_path).unwrap();

        let context = AppContext::new(&cli(config_path, Commands::Init))?;
        context.init()?;
        Ok((temp, context))
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn database_path_resolves_relative_to_config() {
        let (temp, context) = prepare_test_context().unwrap();
        assert_eq!(
            context.database,
            temp.path().join("configs").join("data/kpi.sqlite")
        );
        assert!(context.database.exists());
    }

    #[test]
    fn define_then_validate_reports_inverted_bounds() {
        let (_temp, context) = prepare_test_context().unwrap();
        context
            .define(&DefineArgs {
                id: "rev".into(),
                name: "Revenue".into(),
                category: CategoryArg::Revenue,
                unit: "EUR".into(),
                target: Some(100.0),
                warning: Some(50.0),
                critical: Some(90.0),
                inactive: false,
            })
            .unwrap();
        let report = context.validate().unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.issues.len(), 1);
        assert!(report.display().contains("rev"));
    }

    #[test]
    fn only_init_creates_the_database() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("kpi.toml");
        std::fs::copy("../configs/kpi.toml", &config_path).unwrap();
        std::fs::create_dir_all(temp.path().join("data")).unwrap();

        let args = DefinitionsArgs { active_only: false };
        let context = AppContext::new(&cli(
            config_path,
            Commands::Definitions(DefinitionsArgs { active_only: false }),
        ))
        .unwrap();
        let err = context.definitions(&args).unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
        assert!(!context.database.exists());
    }

    #[test]
    fn threshold_set_maps_flags_to_edits() {
        let args = ThresholdSetArgs {
            metric: "rev".into(),
            target: Some(120.0),
            warning: None,
            critical: None,
            clear_target: false,
            clear_warning: true,
            clear_critical: false,
        };
        let update = args.to_update();
        assert_eq!(update.target_value, FieldEdit::Set(120.0));
        assert_eq!(update.warning_threshold, FieldEdit::Clear);
        assert_eq!(update.critical_threshold, FieldEdit::Keep);
    }

    #[tokio::test]
    async fn query_returns_evaluated_latest_values() {
        let (_temp, context) = prepare_test_context().unwrap();
        context
            .define(&DefineArgs {
                id: "rev".into(),
                name: "Revenue".into(),
                category: CategoryArg::Revenue,
                unit: "EUR".into(),
                target: Some(110.0),
                warning: None,
                critical: None,
                inactive: false,
            })
            .unwrap();
        for (day, value) in [(1, 100.0), (2, 120.0)] {
            context
                .record(&RecordArgs {
                    store: "store-1".into(),
                    metric: "rev".into(),
                    date: date(day),
                    value,
                    notes: None,
                })
                .unwrap();
        }

        let response = context
            .query(&QueryArgs {
                store: "store-1".into(),
                start: date(1),
                end: date(31),
                metrics: vec![],
                timeout_ms: None,
            })
            .await
            .unwrap();
        assert_eq!(response.completeness, Completeness::Complete);
        assert_eq!(response.latest["rev"].status, AchievementStatus::OnTrack);
        let text = response.display();
        assert!(text.contains("status=on_track"));
        assert!(text.contains("trend=increasing"));
    }

    #[test]
    fn record_rejects_non_finite_values() {
        let (_temp, context) = prepare_test_context().unwrap();
        let err = context
            .record(&RecordArgs {
                store: "store-1".into(),
                metric: "rev".into(),
                date: date(1),
                value: f64::NAN,
                notes: None,
            })
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[test]
    fn cli_parses_query_arguments() {
        let cli = Cli::try_parse_from([
            "kpictl",
            "--format",
            "json",
            "query",
            "--store",
            "store-1",
            "--start",
            "2024-01-01",
            "--end",
            "2024-01-31",
            "--metric",
            "rev",
            "--metric",
            "cost",
        ])
        .unwrap();
        match cli.command {
            Commands::Query(args) => {
                assert_eq!(args.metrics, vec!["rev".to_string(), "cost".to_string()]);
                assert_eq!(args.start, date(1));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
