//! Core operations behind the protocol surface
//!
//! Owns the store, the search index and the document source. Requests are
//! served one at a time; a refresh only swaps the index after the new
//! collection has been validated and persisted.

use crate::config::Config;
use crate::error::{require_param, AppError};
use crate::extractor::{DocumentSource, Extractor, FileDocument};
use crate::metrics::{DataType, Level, Metric, MetricSummary, MetricsFile, Period};
use crate::search::{MetricsIndex, SearchResult};
use crate::store::{FilePersistence, MetricsStore};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, error, info, warn};

/// Longest search query accepted, in characters
pub const MAX_QUERY_CHARS: usize = 256;

/// Exact-match restrictions for listing; `None` or empty means unrestricted
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub level: Option<Level>,
    pub data_type: Option<DataType>,
    pub deprecated: Option<bool>,
    /// Keep metrics reported over any of these periods
    pub periods: Vec<Period>,
    /// Keep metrics carrying any of these tags
    pub tags: Vec<String>,
}

/// Overview of the collection after a refresh
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub version: String,
    pub updated_at: DateTime<Utc>,
    pub total: usize,
    pub by_level: BTreeMap<String, usize>,
    pub by_data_type: BTreeMap<String, usize>,
    pub deprecated: usize,
}

/// Keep the metrics whose names appear in `keep`
fn retain_names(selected: &mut Vec<Metric>, keep: Vec<Metric>) {
    let names: HashSet<String> = keep.into_iter().map(|m| m.name).collect();
    selected.retain(|m| names.contains(&m.name));
}

pub struct MetricsService {
    store: MetricsStore,
    index: MetricsIndex,
    source: Box<dyn DocumentSource>,
}

impl MetricsService {
    pub fn new(store: MetricsStore, source: Box<dyn DocumentSource>) -> Self {
        Self {
            store,
            index: MetricsIndex::default(),
            source,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let store = MetricsStore::new(Box::new(FilePersistence::new(&config.data_path)));
        let source = FileDocument::new(&config.document_path, config.max_document_bytes);
        Self::new(store, Box::new(source))
    }

    /// Make sure a usable collection exists and index it.
    ///
    /// Extraction runs when forced or when nothing is persisted yet. Failing to
    /// extract with no persisted collection to fall back on is an error.
    pub fn startup(&mut self, force_rebuild: bool) -> Result<(), AppError> {
        if force_rebuild || !self.store.exists() {
            info!("Rebuilding metrics from reference document");
            if let Err(e) = self.refresh_now() {
                if !self.store.exists() {
                    error!("No metrics file available and rebuild failed: {}", e);
                    return Err(e);
                }
                warn!("Rebuild failed ({}), continuing with existing metrics file", e);
            }
        }

        let metrics = self.store.all()?.to_vec();
        self.index.rebuild(metrics);
        info!("Search index ready with {} metrics", self.index.count());
        Ok(())
    }

    /// Metrics passing every restriction in `filter` in collection order, projected to their summary fields
    pub fn list_filtered(&mut self, filter: &ListFilter) -> Result<Vec<MetricSummary>, AppError> {
        let mut selected = self.store.all()?.to_vec();

        if let Some(level) = filter.level {
            retain_names(&mut selected, self.store.filter_by_level(level)?);
        }
        if let Some(data_type) = filter.data_type {
            retain_names(&mut selected, self.store.filter_by_data_type(data_type)?);
        }
        if let Some(deprecated) = filter.deprecated {
            retain_names(&mut selected, self.store.filter_by_deprecated(deprecated)?);
        }
        if !filter.periods.is_empty() {
            let keep = self.index.by_periods(&filter.periods).into_iter().cloned().collect();
            retain_names(&mut selected, keep);
        }
        if !filter.tags.is_empty() {
            let keep = self.index.by_tags(&filter.tags).into_iter().cloned().collect();
            retain_names(&mut selected, keep);
        }

        debug!("{} metrics pass filter {:?}", selected.len(), filter);
        Ok(selected.iter().map(Metric::summary).collect())
    }

    /// Full record for an exact name
    pub fn get(&mut self, name: &str) -> Result<Metric, AppError> {
        let name = require_param("name", name)?;
        self.store
            .get(name)?
            .ok_or_else(|| AppError::NotFound(format!("Metric not found: {}", name)))
    }

    /// Ranked fuzzy search
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, AppError> {
        let query = Self::checked_query(query)?;
        Ok(self.index.search(query, limit))
    }

    /// Names of the best fuzzy matches
    pub fn suggest(&self, query: &str, limit: usize) -> Result<Vec<String>, AppError> {
        let query = Self::checked_query(query)?;
        Ok(self.index.suggest(query, limit))
    }

    fn checked_query(query: &str) -> Result<&str, AppError> {
        let query = require_param("q", query)?;
        let length = query.chars().count();
        if length > MAX_QUERY_CHARS {
            return Err(AppError::InvalidInput(format!(
                "q is {} characters, limit is {}",
                length, MAX_QUERY_CHARS
            )));
        }
        Ok(query)
    }

    /// Re-extract, persist, drop the cache and rebuild the index.
    ///
    /// Returns the number of metrics now being served.
    pub fn refresh_now(&mut self) -> Result<usize, AppError> {
        self.refresh_as_of(None)
    }

    /// Refresh, stamping `date` into the version instead of today's date
    pub fn refresh_as_of(&mut self, date: Option<NaiveDate>) -> Result<usize, AppError> {
        let mut extractor = Extractor::from_source(self.source.as_ref())?;
        if let Some(date) = date {
            extractor = extractor.with_extraction_date(date);
        }
        let file = extractor.to_metrics_file();

        self.store.save(file)?;
        self.store.invalidate();

        let metrics = self.store.all()?.to_vec();
        self.index.rebuild(metrics);
        info!("Refreshed {} metrics", self.index.count());
        Ok(self.index.count())
    }

    /// The whole persisted collection
    pub fn collection(&mut self) -> Result<&MetricsFile, AppError> {
        self.store.load()
    }

    /// Version, timestamp and per-level, per-type and deprecated counts of the collection
    pub fn summary(&mut self) -> Result<RefreshSummary, AppError> {
        let by_level = Level::ALL
            .into_iter()
            .map(|level| (level.to_string(), self.index.by_level(level).len()))
            .filter(|(_, count)| *count > 0)
            .collect();
        let by_data_type = DataType::ALL
            .into_iter()
            .map(|data_type| (data_type.to_string(), self.index.by_data_type(data_type).len()))
            .filter(|(_, count)| *count > 0)
            .collect();
        let deprecated = self.store.filter_by_deprecated(true)?.len();

        let file = self.store.load()?;
        Ok(RefreshSummary {
            version: file.version.clone(),
            updated_at: file.updated_at,
            total: file.metrics.len(),
            by_level,
            by_data_type,
            deprecated,
        })
    }

    pub fn tags(&self) -> Vec<String> {
        self.index.get_all_tags()
    }

    pub fn levels(&self) -> Vec<String> {
        self.index.get_all_levels()
    }

    pub fn data_types(&self) -> Vec<String> {
        self.index.get_all_data_types()
    }

    #[cfg(test)]
    pub fn index(&self) -> &MetricsIndex {
        &self.index
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::tests::MemoryPersistence;
    use std::cell::RefCell;
    use std::rc::Rc;

    pub(crate) const REFERENCE: &str = "\
# Metrics Reference
API Version: v23.0
Last Updated: 2025-01-15

## Page Insights

| Metric Name | Description | Period | Data Type | Notes |
|---|---|---|---|---|
| page_impressions | Total impressions | Day, Week, Lifetime | Integer | |
| page_fans | Total fans of the Page | Lifetime | Integer | |

## Monetization

| Metric Name | Description | Period | Data Type | Notes |
|---|---|---|---|---|
| content_monetization_earnings | Estimated earnings | Day, 28 days | Float | Deprecated soon |
";

    /// Document source whose text can be swapped mid-test
    #[derive(Clone)]
    pub(crate) struct StaticDocument(pub(crate) Rc<RefCell<Option<String>>>);

    impl DocumentSource for StaticDocument {
        fn read(&self) -> Result<String, AppError> {
            self.0
                .borrow()
                .clone()
                .ok_or_else(|| AppError::SourceNotFound("reference document".to_string()))
        }
    }

    pub(crate) fn service_with(text: Option<&str>) -> (MetricsService, MemoryPersistence, StaticDocument) {
        let mem = MemoryPersistence::default();
        let doc = StaticDocument(Rc::new(RefCell::new(text.map(str::to_string))));
        let service = MetricsService::new(MetricsStore::new(Box::new(mem.clone())), Box::new(doc.clone()));
        (service, mem, doc)
    }

    #[test]
    fn test_startup_extracts_when_missing() {
        let (mut service, mem, _) = service_with(Some(REFERENCE));
        service.startup(false).unwrap();
        assert!(mem.bytes.borrow().is_some());
        assert_eq!(service.index().count(), 3);
    }

    #[test]
    fn test_startup_fatal_without_file_or_document() {
        let (mut service, _, _) = service_with(None);
        assert!(matches!(service.startup(false), Err(AppError::SourceNotFound(_))));
    }

    #[test]
    fn test_startup_falls_back_to_existing_file() {
        let (mut service, _, doc) = service_with(Some(REFERENCE));
        service.startup(false).unwrap();

        *doc.0.borrow_mut() = None;
        service.startup(true).unwrap();
        assert_eq!(service.index().count(), 3);
    }

    #[test]
    fn test_list_projection() {
        let (mut service, _, _) = service_with(Some(REFERENCE));
        service.startup(false).unwrap();
        let list = service.list_filtered(&ListFilter::default()).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[2].name, "content_monetization_earnings");
        assert!(list[2].deprecated);
    }

    #[test]
    fn test_get_errors() {
        let (mut service, _, _) = service_with(Some(REFERENCE));
        service.startup(false).unwrap();
        assert_eq!(service.get("page_fans").unwrap().name, "page_fans");
        assert!(matches!(service.get(""), Err(AppError::MissingParameter(_))));
        let err = service.get("page_nope").unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(err.to_string().contains("Metric not found: page_nope"));
    }

    #[test]
    fn test_search_requires_query() {
        let (mut service, _, _) = service_with(Some(REFERENCE));
        service.startup(false).unwrap();
        assert!(matches!(service.search("  ", 5), Err(AppError::MissingParameter(_))));
        let results = service.search("impresion", 5).unwrap();
        assert_eq!(results[0].item.name, "page_impressions");
    }

    #[test]
    fn test_refresh_swaps_index_and_cache() {
        let (mut service, _, doc) = service_with(Some(REFERENCE));
        service.startup(false).unwrap();

        let updated = REFERENCE.replace("| page_fans | Total fans of the Page | Lifetime | Integer | |\n", "");
        *doc.0.borrow_mut() = Some(updated);
        assert_eq!(service.refresh_now().unwrap(), 2);
        assert!(service.search("fans", 5).unwrap().iter().all(|r| r.item.name != "page_fans"));
        assert!(matches!(service.get("page_fans"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_failed_refresh_keeps_snapshot() {
        let (mut service, mem, doc) = service_with(Some(REFERENCE));
        service.startup(false).unwrap();

        mem.fail_writes.set(true);
        *doc.0.borrow_mut() = Some("## Empty\n".to_string());
        assert!(service.refresh_now().is_err());
        assert_eq!(service.index().count(), 3);
        assert_eq!(service.list_filtered(&ListFilter::default()).unwrap().len(), 3);
    }

    #[test]
    fn test_overlong_query_rejected() {
        let (mut service, _, _) = service_with(Some(REFERENCE));
        service.startup(false).unwrap();

        let at_limit = "a".repeat(MAX_QUERY_CHARS);
        assert!(service.search(&at_limit, 5).unwrap().is_empty());

        let long = "impressions".repeat(10_000);
        assert!(matches!(service.search(&long, 5), Err(AppError::InvalidInput(_))));
        assert!(matches!(service.suggest(&long, 5), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_suggest_names() {
        let (mut service, _, _) = service_with(Some(REFERENCE));
        service.startup(false).unwrap();
        assert_eq!(service.suggest("earnings", 1).unwrap(), ["content_monetization_earnings"]);
        assert!(matches!(service.suggest(" ", 1), Err(AppError::MissingParameter(_))));
    }

    #[test]
    fn test_list_filtered() {
        let (mut service, _, _) = service_with(Some(REFERENCE));
        service.startup(false).unwrap();
        let names = |service: &mut MetricsService, filter: ListFilter| -> Vec<String> {
            service.list_filtered(&filter).unwrap().into_iter().map(|m| m.name).collect()
        };

        let top = ListFilter { level: Some(Level::Top), ..Default::default() };
        assert_eq!(names(&mut service, top), ["page_impressions", "page_fans"]);

        let float = ListFilter { data_type: Some(DataType::Float), ..Default::default() };
        assert_eq!(names(&mut service, float), ["content_monetization_earnings"]);

        let current_daily = ListFilter {
            deprecated: Some(false),
            periods: vec![Period::Day],
            ..Default::default()
        };
        assert_eq!(names(&mut service, current_daily), ["page_impressions"]);

        let tagged = ListFilter { tags: vec!["fans".to_string()], ..Default::default() };
        assert_eq!(names(&mut service, tagged), ["page_fans"]);

        let none = ListFilter { level: Some(Level::Story), ..Default::default() };
        assert!(names(&mut service, none).is_empty());
    }

    #[test]
    fn test_summary_counts() {
        let (mut service, _, _) = service_with(Some(REFERENCE));
        service
            .refresh_as_of(Some(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()))
            .unwrap();

        let summary = service.summary().unwrap();
        assert_eq!(summary.version, "v23.0.2025-02-01");
        assert_eq!(summary.updated_at.to_rfc3339(), "2025-01-15T00:00:00+00:00");
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_level, BTreeMap::from([("monetization".to_string(), 1), ("top".to_string(), 2)]));
        assert_eq!(summary.by_data_type, BTreeMap::from([("Float".to_string(), 1), ("Integer".to_string(), 2)]));
        assert_eq!(summary.deprecated, 1);

        assert_eq!(service.levels(), ["monetization", "top"]);
        assert_eq!(service.data_types(), ["Float", "Integer"]);
    }
}
