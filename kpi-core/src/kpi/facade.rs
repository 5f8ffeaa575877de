use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use super::aligner::{align, AlignedSeries};
use super::cache::QueryCache;
use super::latest::select_latest;
use super::models::{
    AchievementResult, DateRange, MetricDefinition, MetricObservation, TrendLabel,
};
use super::store::{DefinitionSource, MetricRecordSource};
use super::threshold::{evaluate, validate_definition, ConfigurationIssue};
use super::trend::{TrendClassifier, TrendConfig};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KpiQuery {
    pub store_id: String,
    pub range: DateRange,
    /// Restricts the query to these metrics; every metric when `None`.
    pub metric_ids: Option<Vec<String>>,
}

impl KpiQuery {
    pub fn new(store_id: impl Into<String>, range: DateRange) -> Self {
        Self {
            store_id: store_id.into(),
            range,
            metric_ids: None,
        }
    }

    pub fn with_metrics<I, S>(mut self, metric_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metric_ids = Some(metric_ids.into_iter().map(Into::into).collect());
        self
    }

    fn metric_filter(&self) -> Option<BTreeSet<String>> {
        self.metric_ids
            .as_ref()
            .map(|ids| ids.iter().cloned().collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum Completeness {
    Complete,
    /// Some upstream data could not be fetched; the response is best effort.
    Partial { reason: String },
}

impl Completeness {
    pub fn is_complete(&self) -> bool {
        matches!(self, Completeness::Complete)
    }
}

/// Consolidated answer for one store, date range and metric set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KpiResponse {
    pub store_id: String,
    pub range: DateRange,
    pub series: AlignedSeries,
    pub latest: BTreeMap<String, AchievementResult>,
    pub trends: BTreeMap<String, TrendLabel>,
    pub completeness: Completeness,
    pub issues: Vec<ConfigurationIssue>,
}

impl KpiResponse {
    pub fn empty(query: &KpiQuery) -> Self {
        Self {
            store_id: query.store_id.clone(),
            range: query.range,
            series: AlignedSeries::default(),
            latest: BTreeMap::new(),
            trends: BTreeMap::new(),
            completeness: Completeness::Complete,
            issues: Vec::new(),
        }
    }

    /// Partial-failure response: no series, `unknown` status for each requested metric.
    pub fn unavailable(query: &KpiQuery, reason: impl Into<String>) -> Self {
        let latest = query
            .metric_ids
            .iter()
            .flatten()
            .map(|metric_id| (metric_id.clone(), AchievementResult::unavailable(metric_id)))
            .collect();
        Self {
            latest,
            completeness: Completeness::Partial {
                reason: reason.into(),
            },
            ..Self::empty(query)
        }
    }
}

/// Builds a response from an already-fetched snapshot.
pub fn assemble(
    query: &KpiQuery,
    records: &[MetricObservation],
    definitions: &HashMap<String, MetricDefinition>,
    classifier: &TrendClassifier,
) -> KpiResponse {
    let filter = query.metric_filter();
    let scoped: Vec<MetricObservation> = records
        .iter()
        .filter(|record| {
            filter
                .as_ref()
                .map_or(true, |filter| filter.contains(&record.metric_id))
        })
        .cloned()
        .collect();

    let series = align(records, filter.as_ref());
    let trends = series
        .series
        .keys()
        .map(|metric_id| {
            let values = series.present_values(metric_id);
            (metric_id.clone(), classifier.classify(&values))
        })
        .collect();

    let latest = select_latest(&scoped)
        .into_iter()
        .map(|(metric_id, observation)| {
            let result = match definitions.get(&metric_id) {
                Some(definition) => evaluate(&observation, definition),
                None => AchievementResult::undefined(&observation),
            };
            (metric_id, result)
        })
        .collect();

    let mut used: Vec<&MetricDefinition> = definitions
        .values()
        .filter(|definition| series.series.contains_key(&definition.id))
        .collect();
    used.sort_by(|a, b| a.id.cmp(&b.id));
    let issues: Vec<ConfigurationIssue> = used
        .into_iter()
        .flat_map(validate_definition)
        .collect();
    for issue in &issues {
        warn!(
            metric_id = %issue.metric_id,
            kind = ?issue.kind,
            detail = %issue.detail,
            "metric definition is inconsistent"
        );
    }

    KpiResponse {
        store_id: query.store_id.clone(),
        range: query.range,
        series,
        latest,
        trends,
        completeness: Completeness::Complete,
        issues,
    }
}

/// Entry point for KPI queries: fetches a snapshot and runs the aggregation
/// pipeline over it.
pub struct AggregationFacade {
    records: Arc<dyn MetricRecordSource>,
    definitions: Arc<dyn DefinitionSource>,
    classifier: TrendClassifier,
    fetch_timeout: Duration,
    cache: Option<Arc<QueryCache>>,
}

impl AggregationFacade {
    pub fn new(
        records: Arc<dyn MetricRecordSource>,
        definitions: Arc<dyn DefinitionSource>,
    ) -> Self {
        Self {
            records,
            definitions,
            classifier: TrendClassifier::default(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            cache: None,
        }
    }

    pub fn with_trend_config(mut self, config: TrendConfig) -> Self {
        self.classifier = TrendClassifier::new(config);
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_cache(mut self, cache: Arc<QueryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn query(&self, query: &KpiQuery) -> KpiResponse {
        if query.range.is_empty() {
            debug!(store_id = %query.store_id, "inverted date range, returning empty response");
            return KpiResponse::empty(query);
        }
        if let Some(cached) = self.cache.as_ref().and_then(|cache| cache.get(query)) {
            debug!(store_id = %query.store_id, "kpi query served from cache");
            return cached;
        }

        // `None` when the timeout is too large to express as an instant
        let deadline = Instant::now().checked_add(self.fetch_timeout);
        let records = match within(
            deadline,
            self.records
                .fetch(&query.store_id, query.range, query.metric_ids.as_deref()),
        )
        .await
        {
            Some(Ok(records)) => records,
            Some(Err(err)) => {
                warn!(store_id = %query.store_id, error = %err, "observation fetch failed");
                return KpiResponse::unavailable(query, format!("observation fetch failed: {err}"));
            }
            None => {
                warn!(
                    store_id = %query.store_id,
                    timeout = ?self.fetch_timeout,
                    "observation fetch timed out"
                );
                return KpiResponse::unavailable(
                    query,
                    format!("observation fetch timed out after {:?}", self.fetch_timeout),
                );
            }
        };

        let metric_ids: Vec<String> = records
            .iter()
            .map(|record| record.metric_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut completeness = Completeness::Complete;
        let definitions = if metric_ids.is_empty() {
            HashMap::new()
        } else {
            match within(deadline, self.definitions.definitions(&metric_ids)).await {
                Some(Ok(definitions)) => definitions,
                Some(Err(err)) => {
                    warn!(error = %err, "definition lookup failed, statuses will be unknown");
                    completeness = Completeness::Partial {
                        reason: format!("definition lookup failed: {err}"),
                    };
                    HashMap::new()
                }
                None => {
                    warn!(timeout = ?self.fetch_timeout, "definition lookup timed out");
                    completeness = Completeness::Partial {
                        reason: format!(
                            "definition lookup timed out after {:?}",
                            self.fetch_timeout
                        ),
                    };
                    HashMap::new()
                }
            }
        };

        let mut response = assemble(query, &records, &definitions, &self.classifier);
        response.completeness = completeness;
        debug!(
            store_id = %query.store_id,
            records = records.len(),
            metrics = response.series.series.len(),
            complete = response.completeness.is_complete(),
            "kpi query assembled"
        );

        if let Some(cache) = &self.cache {
            if response.completeness.is_complete() {
                cache.insert(query, response.clone());
            }
        }
        response
    }
}

/// Runs `future` until `deadline`; `None` means the deadline passed first.
async fn within<F: Future>(deadline: Option<Instant>, future: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => timeout_at(deadline, future).await.ok(),
        None => Some(future.await),
    }
}

impl std::fmt::Debug for AggregationFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationFacade")
            .field("classifier", &self.classifier)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}
