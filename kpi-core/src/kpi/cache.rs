use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::NaiveDate;

use super::facade::{KpiQuery, KpiResponse};
use super::models::DateRange;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    store_id: String,
    range: DateRange,
    metric_ids: Option<Vec<String>>,
}

impl CacheKey {
    fn from_query(query: &KpiQuery) -> Self {
        let metric_ids = query.metric_ids.as_ref().map(|ids| {
            let mut ids = ids.clone();
            ids.sort();
            ids.dedup();
            ids
        });
        Self {
            store_id: query.store_id.clone(),
            range: query.range,
            metric_ids,
        }
    }
}

/// Response cache placed in front of the aggregation facade.
///
/// Entries are keyed by store, date range and metric set. Callers must call
/// [`QueryCache::invalidate_observation`] whenever a new observation lands.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: Mutex<HashMap<CacheKey, KpiResponse>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, query: &KpiQuery) -> Option<KpiResponse> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(&CacheKey::from_query(query)).cloned()
    }

    pub fn insert(&self, query: &KpiQuery, response: KpiResponse) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(CacheKey::from_query(query), response);
    }

    /// Evicts every entry for `store_id` whose range covers `date`.
    pub fn invalidate_observation(&self, store_id: &str, date: NaiveDate) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|key, _| !(key.store_id == store_id && key.range.contains(date)));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
