use chrono::NaiveDate;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use super::error::KpiError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    Revenue,
    Cost,
    Efficiency,
    Quality,
    Customer,
}

impl MetricCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricCategory::Revenue => "revenue",
            MetricCategory::Cost => "cost",
            MetricCategory::Efficiency => "efficiency",
            MetricCategory::Quality => "quality",
            MetricCategory::Customer => "customer",
        }
    }
}

impl std::fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricCategory {
    type Err = KpiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "revenue" => Ok(MetricCategory::Revenue),
            "cost" => Ok(MetricCategory::Cost),
            "efficiency" => Ok(MetricCategory::Efficiency),
            "quality" => Ok(MetricCategory::Quality),
            "customer" => Ok(MetricCategory::Customer),
            other => Err(KpiError::InvalidCategory(other.to_string())),
        }
    }
}

/// Configured KPI with its target and alerting bounds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricDefinition {
    pub id: String,
    pub name: String,
    pub category: MetricCategory,
    pub unit: String,
    pub target_value: Option<f64>,
    pub warning_threshold: Option<f64>,
    pub critical_threshold: Option<f64>,
    pub active: bool,
}

impl MetricDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: MetricCategory,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            unit: unit.into(),
            target_value: None,
            warning_threshold: None,
            critical_threshold: None,
            active: true,
        }
    }

    pub fn with_target(mut self, target: f64) -> Self {
        self.target_value = Some(target);
        self
    }

    pub fn with_warning(mut self, warning: f64) -> Self {
        self.warning_threshold = Some(warning);
        self
    }

    pub fn with_critical(mut self, critical: f64) -> Self {
        self.critical_threshold = Some(critical);
        self
    }

    /// Target usable as a divisor; zero targets are treated as absent.
    pub fn effective_target(&self) -> Option<f64> {
        self.target_value.filter(|target| *target != 0.0)
    }

    /// Applies a threshold edit in place.
    pub fn apply(&mut self, update: &ThresholdUpdate) {
        update.target_value.apply_to(&mut self.target_value);
        update.warning_threshold.apply_to(&mut self.warning_threshold);
        update.critical_threshold.apply_to(&mut self.critical_threshold);
    }

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let category: String = row.get("category")?;
        let active: i64 = row.get("active")?;
        Ok(Self {
            id: row.get("metric_id")?,
            name: row.get("name")?,
            category: category.parse().unwrap_or(MetricCategory::Efficiency),
            unit: row.get("unit")?,
            target_value: row.get("target_value")?,
            warning_threshold: row.get("warning_threshold")?,
            critical_threshold: row.get("critical_threshold")?,
            active: active != 0,
        })
    }
}

/// Edit applied to one threshold field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op", content = "value")]
pub enum FieldEdit {
    #[default]
    Keep,
    Set(f64),
    Clear,
}

impl FieldEdit {
    fn apply_to(&self, field: &mut Option<f64>) {
        match self {
            FieldEdit::Keep => {}
            FieldEdit::Set(value) => *field = Some(*value),
            FieldEdit::Clear => *field = None,
        }
    }
}

/// Explicit threshold-edit operation on a metric definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdUpdate {
    #[serde(default)]
    pub target_value: FieldEdit,
    #[serde(default)]
    pub warning_threshold: FieldEdit,
    #[serde(default)]
    pub critical_threshold: FieldEdit,
}

impl ThresholdUpdate {
    pub fn is_noop(&self) -> bool {
        self.target_value == FieldEdit::Keep
            && self.warning_threshold == FieldEdit::Keep
            && self.critical_threshold == FieldEdit::Keep
    }
}

/// Raw daily observation; append-only once recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricObservation {
    pub metric_id: String,
    pub store_id: String,
    pub record_date: NaiveDate,
    pub value: f64,
    pub notes: Option<String>,
}

impl MetricObservation {
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

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            metric_id: row.get("metric_id")?,
            store_id: row.get("store_id")?,
            record_date: row.get("record_date")?,
            value: row.get("value")?,
            notes: row.get("notes")?,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AchievementStatus {
    OnTrack,
    AtRisk,
    OffTrack,
    Unknown,
}

impl AchievementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementStatus::OnTrack => "on_track",
            AchievementStatus::AtRisk => "at_risk",
            AchievementStatus::OffTrack => "off_track",
            AchievementStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for AchievementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observation measured against its definition's target.
///
/// `record_date` and `value` are only `None` when the observation itself could
/// not be fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AchievementResult {
    pub metric_id: String,
    pub record_date: Option<NaiveDate>,
    pub value: Option<f64>,
    pub target_value: Option<f64>,
    pub achievement_rate: Option<f64>,
    pub status: AchievementStatus,
}

impl AchievementResult {
    /// Result for an observation that has no definition to evaluate against.
    pub fn undefined(observation: &MetricObservation) -> Self {
        Self {
            metric_id: observation.metric_id.clone(),
            record_date: Some(observation.record_date),
            value: Some(observation.value),
            target_value: None,
            achievement_rate: None,
            status: AchievementStatus::Unknown,
        }
    }

    /// Result for a metric whose data could not be fetched.
    pub fn unavailable(metric_id: impl Into<String>) -> Self {
        Self {
            metric_id: metric_id.into(),
            record_date: None,
            value: None,
            target_value: None,
            achievement_rate: None,
            status: AchievementStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrendLabel {
    Increasing,
    Decreasing,
    Stable,
    Volatile,
}

impl TrendLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendLabel::Increasing => "increasing",
            TrendLabel::Decreasing => "decreasing",
            TrendLabel::Stable => "stable",
            TrendLabel::Volatile => "volatile",
        }
    }
}

impl std::fmt::Display for TrendLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// A range whose start falls after its end selects nothing.
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}
