/// Aggregation and reduction engine.
///
/// Every dashboard view goes through one of these operations:
///
/// - `latest_snapshot`: most recent reading per site over a fixed lookback,
///   for the map. One batched provider request per label.
/// - `period_summary`: the map's period view; window totals for rainfall,
///   latest value for everything else.
/// - `series_for`: one site's series for a chart, with hourly and daily
///   totals for cumulative measurements.
/// - `dataset_for`: long-form multi-site table for export. Sites are
///   fetched independently; a failing site is logged and left out.
///
/// Provider errors stop here. They are logged with their request context
/// and surface as `QueryError`, never as raw provider failures.

use chrono::{Duration, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::alert::thresholds::{Classification, Classifier};
use crate::analysis::normalize::normalize_table;
use crate::analysis::reduce::{
    bins_total, latest_per_site, latest_value, resample, window_value, Bin, BinTotal, LatestValue,
};
use crate::catalog::{Catalog, CatalogBuilder, MeasurementDefinition, TimePeriod};
use crate::config::{ConfigError, ServiceConfig};
use crate::ingest::Provider;
use crate::logging::{log_dataset_summary, log_provider_failure};
use crate::model::{
    AggregationInterval, AggregationMethod, DataRequest, QueryError, Reading, ReducedSiteValue,
    Reduction, SelectionKey,
};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// One reduced value per directory site, keyed by site name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub measurement: String,
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
    pub values: BTreeMap<String, ReducedSiteValue>,
}

/// A single site's series over a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteSeries {
    pub measurement: String,
    pub site: String,
    pub unit: String,
    pub cumulative: bool,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Normalized readings in time order.
    pub raw: Vec<Reading>,
    /// Hourly totals; empty for non-cumulative series.
    pub hourly: Vec<BinTotal>,
    /// Daily totals; empty for non-cumulative series.
    pub daily: Vec<BinTotal>,
    /// Window total; `None` for non-cumulative series.
    pub total: Option<f64>,
    pub latest: Option<LatestValue>,
}

/// One row of a long-form export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    #[serde(rename = "DateTime")]
    pub timestamp: NaiveDateTime,
    #[serde(rename = "Value")]
    pub value: Option<f64>,
    #[serde(rename = "Site")]
    pub site: String,
    #[serde(rename = "Measurement")]
    pub measurement: String,
}

/// Multi-site export, rows ordered by site then time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub measurement: String,
    pub rows: Vec<DatasetRow>,
    /// Requested sites that contributed no rows.
    pub missing_sites: Vec<String>,
}

/// A classified value placed on the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapMarker {
    pub site: String,
    pub latitude: f64,
    pub longitude: f64,
    pub value: Option<f64>,
    pub reduction: Reduction,
    pub observed_at: Option<NaiveDateTime>,
    pub status: Classification,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    catalog: Catalog,
    provider: Arc<dyn Provider>,
    classifier: Classifier,
    lookback: Duration,
}

impl Engine {
    pub fn new(
        catalog: Catalog,
        provider: Arc<dyn Provider>,
        classifier: Classifier,
        lookback: Duration,
    ) -> Self {
        Self {
            catalog,
            provider,
            classifier,
            lookback,
        }
    }

    /// Builds the catalog against `provider` and wires up the classifier
    /// from configuration. A provider outage here yields a degraded
    /// catalog, not an error.
    pub fn from_config(
        config: &ServiceConfig,
        provider: Arc<dyn Provider>,
    ) -> Result<Self, ConfigError> {
        let catalog = CatalogBuilder::new(config)?.build(provider.as_ref());
        let classifier = Classifier::from_config(&config.thresholds)?;
        let lookback = Duration::hours(config.provider.snapshot_lookback_hours);
        Ok(Self::new(catalog, provider, classifier, lookback))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Classifies one value for a site under a label.
    pub fn classify(&self, label: &str, site: &str, value: Option<f64>) -> Classification {
        self.classifier.classify(&SelectionKey::site(label, site), value)
    }

    fn fetch(
        &self,
        def: &MeasurementDefinition,
        sites: Vec<String>,
        from: NaiveDateTime,
        to: NaiveDateTime,
        aggregate: bool,
    ) -> Result<Vec<Reading>, QueryError> {
        let default_site = if sites.len() == 1 {
            Some(sites[0].clone())
        } else {
            None
        };
        let context_site = default_site.clone();

        let (method, interval) = if aggregate {
            (def.method, def.interval)
        } else {
            (AggregationMethod::None, AggregationInterval::None)
        };

        let request = DataRequest {
            sites,
            measures: def.measures.clone(),
            from,
            to,
            method,
            interval,
        };

        let table = self.provider.fetch_table(&request).map_err(|source| {
            log_provider_failure(&def.label, context_site.as_deref(), &source);
            QueryError::ProviderUnavailable {
                context: match &context_site {
                    Some(site) => format!("{} at {}", def.label, site),
                    None => def.label.clone(),
                },
                source,
            }
        })?;

        Ok(normalize_table(
            &table,
            def.column_preference(),
            default_site.as_deref(),
        ))
    }

    /// Fetches every directory site of a label in one request. Readings
    /// for sites outside the directory are dropped.
    fn fetch_all_sites(
        &self,
        label: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<(&MeasurementDefinition, Vec<String>, Vec<Reading>), QueryError> {
        let def = self.catalog.resolve(label)?;
        let names: Vec<String> = self
            .catalog
            .sites_for(label)?
            .iter()
            .map(|s| s.name.clone())
            .collect();

        if names.is_empty() {
            debug!(measurement = label, "no sites listed, skipping provider request");
            return Ok((def, names, Vec::new()));
        }

        let mut readings = self.fetch(def, names.clone(), from, to, true)?;
        let before = readings.len();
        readings.retain(|r| names.contains(&r.site));
        if readings.len() != before {
            debug!(
                measurement = label,
                dropped = before - readings.len(),
                "readings for unlisted sites ignored"
            );
        }

        Ok((def, names, readings))
    }

    // --- Snapshot -----------------------------------------------------------

    pub fn latest_snapshot(&self, label: &str) -> Result<Snapshot, QueryError> {
        self.latest_snapshot_at(label, Local::now().naive_local())
    }

    /// Latest non-null reading per site over the configured lookback.
    /// Every directory site is present; sites without a reading map to a
    /// null value, whether or not the measurement is cumulative.
    pub fn latest_snapshot_at(
        &self,
        label: &str,
        now: NaiveDateTime,
    ) -> Result<Snapshot, QueryError> {
        let from = now - self.lookback;
        let (def, names, readings) = self.fetch_all_sites(label, from, now)?;
        let latest = latest_per_site(&readings);

        let values = names
            .into_iter()
            .map(|site| {
                let found = latest.get(&site);
                let value = ReducedSiteValue {
                    site: site.clone(),
                    measurement: def.label.clone(),
                    value: found.map(|l| l.value),
                    reduction: Reduction::LatestInstant,
                    observed_at: found.map(|l| l.timestamp),
                };
                (site, value)
            })
            .collect();

        Ok(Snapshot {
            measurement: def.label.clone(),
            from,
            to: now,
            values,
        })
    }

    // --- Period summary -----------------------------------------------------

    pub fn period_summary(&self, label: &str, period: TimePeriod) -> Result<Snapshot, QueryError> {
        self.period_summary_at(label, period, Local::now().naive_local())
    }

    /// One value per directory site over the period: the window total for
    /// cumulative measurements (0 when nothing was recorded), the latest
    /// reading otherwise (null when there is none).
    pub fn period_summary_at(
        &self,
        label: &str,
        period: TimePeriod,
        now: NaiveDateTime,
    ) -> Result<Snapshot, QueryError> {
        let from = now - period.duration();
        let (def, names, readings) = self.fetch_all_sites(label, from, now)?;

        let mut by_site: HashMap<&str, Vec<Reading>> = HashMap::new();
        for reading in &readings {
            by_site
                .entry(reading.site.as_str())
                .or_default()
                .push(reading.clone());
        }

        let values = names
            .iter()
            .map(|site| {
                let site_readings = by_site.get(site.as_str()).map(Vec::as_slice).unwrap_or(&[]);
                let value = if def.cumulative {
                    ReducedSiteValue {
                        site: site.clone(),
                        measurement: def.label.clone(),
                        value: window_value(site_readings, true),
                        reduction: Reduction::WindowTotal,
                        observed_at: None,
                    }
                } else {
                    let latest = latest_value(site_readings);
                    ReducedSiteValue {
                        site: site.clone(),
                        measurement: def.label.clone(),
                        value: latest.map(|l| l.value),
                        reduction: Reduction::LatestInstant,
                        observed_at: latest.map(|l| l.timestamp),
                    }
                };
                (site.clone(), value)
            })
            .collect();

        Ok(Snapshot {
            measurement: def.label.clone(),
            from,
            to: now,
            values,
        })
    }

    // --- Series -------------------------------------------------------------

    /// A single site's raw series, plus hourly/daily totals when
    /// `cumulative` is set.
    ///
    /// The provider is asked for unaggregated readings so the bins can be
    /// built here over the exact window. An empty cumulative window is a
    /// zero series; an empty instantaneous one is `EmptyResult`.
    pub fn series_for(
        &self,
        label: &str,
        site: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        cumulative: bool,
    ) -> Result<SiteSeries, QueryError> {
        let def = self.catalog.resolve(label)?;
        self.catalog.find_site(label, site)?;

        let mut raw = self.fetch(def, vec![site.to_string()], start, end, false)?;
        raw.retain(|r| r.site == site);
        raw.sort_by_key(|r| r.timestamp);

        let latest = latest_value(&raw);

        if !cumulative && latest.is_none() {
            return Err(QueryError::EmptyResult(format!("{} at {}", label, site)));
        }

        let (hourly, daily, total) = if cumulative {
            let hourly = resample(&raw, Bin::Hour, start, end);
            let daily = resample(&raw, Bin::Day, start, end);
            let total = bins_total(&hourly);
            (hourly, daily, Some(total))
        } else {
            (Vec::new(), Vec::new(), None)
        };

        Ok(SiteSeries {
            measurement: def.label.clone(),
            site: site.to_string(),
            unit: def.unit.clone(),
            cumulative,
            start,
            end,
            raw,
            hourly,
            daily,
            total,
            latest,
        })
    }

    // --- Dataset ------------------------------------------------------------

    /// Long-form table for several sites, fetched one site at a time.
    ///
    /// A site that is unknown, fails, or returns nothing is logged and left
    /// out. Only when no site returns rows is the result `EmptyResult`.
    pub fn dataset_for(
        &self,
        label: &str,
        sites: &[String],
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Dataset, QueryError> {
        let def = self.catalog.resolve(label)?;

        let mut rows: Vec<DatasetRow> = Vec::new();
        let mut missing_sites = Vec::new();
        let mut returned = 0usize;

        // Repeated names are fetched once.
        let mut seen = HashSet::new();
        let unique: Vec<&String> = sites.iter().filter(|s| seen.insert(s.as_str())).collect();

        for site in unique.iter().copied() {
            if let Err(e) = self.catalog.find_site(label, site) {
                warn!(measurement = label, site = %site, "{}", e);
                missing_sites.push(site.clone());
                continue;
            }

            let readings = match self.fetch(def, vec![site.clone()], start, end, true) {
                Ok(readings) => readings,
                Err(_) => {
                    // Already logged with its classification.
                    missing_sites.push(site.clone());
                    continue;
                }
            };

            let before = rows.len();
            rows.extend(readings.into_iter().filter(|r| &r.site == site).map(|r| DatasetRow {
                timestamp: r.timestamp,
                value: r.value,
                site: r.site,
                measurement: def.label.clone(),
            }));

            if rows.len() == before {
                debug!(measurement = label, site = %site, "no rows in window");
                missing_sites.push(site.clone());
            } else {
                returned += 1;
            }
        }

        log_dataset_summary(label, unique.len(), returned);

        if rows.is_empty() {
            return Err(QueryError::EmptyResult(label.to_string()));
        }

        rows.sort_by(|a, b| {
            a.site
                .cmp(&b.site)
                .then_with(|| a.timestamp.cmp(&b.timestamp))
        });

        Ok(Dataset {
            measurement: def.label.clone(),
            rows,
            missing_sites,
        })
    }

    // --- Map markers --------------------------------------------------------

    pub fn map_markers(&self, label: &str) -> Result<Vec<MapMarker>, QueryError> {
        self.map_markers_at(label, Local::now().naive_local())
    }

    /// Classified latest snapshot for sites with coordinates.
    pub fn map_markers_at(
        &self,
        label: &str,
        now: NaiveDateTime,
    ) -> Result<Vec<MapMarker>, QueryError> {
        let snapshot = self.latest_snapshot_at(label, now)?;
        self.markers_for(label, &snapshot)
    }

    pub fn period_markers(
        &self,
        label: &str,
        period: TimePeriod,
    ) -> Result<Vec<MapMarker>, QueryError> {
        self.period_markers_at(label, period, Local::now().naive_local())
    }

    pub fn period_markers_at(
        &self,
        label: &str,
        period: TimePeriod,
        now: NaiveDateTime,
    ) -> Result<Vec<MapMarker>, QueryError> {
        let summary = self.period_summary_at(label, period, now)?;
        self.markers_for(label, &summary)
    }

    /// Joins reduced values with coordinates in directory order. A site
    /// unlocated in its own collection borrows coordinates listed under
    /// another; sites located nowhere get no marker.
    pub fn markers_for(&self, label: &str, snapshot: &Snapshot) -> Result<Vec<MapMarker>, QueryError> {
        let directory = self.catalog.directory();
        let markers = self
            .catalog
            .sites_for(label)?
            .iter()
            .filter_map(|site| {
                let (latitude, longitude) = site
                    .coordinates()
                    .or_else(|| directory.coordinates_of(&site.name))?;
                let reduced = snapshot.values.get(&site.name)?;
                Some(MapMarker {
                    site: site.name.clone(),
                    latitude,
                    longitude,
                    value: reduced.value,
                    reduction: reduced.reduction,
                    observed_at: reduced.observed_at,
                    status: self.classify(label, &site.name, reduced.value),
                })
            })
            .collect();
        Ok(markers)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::thresholds::StatusTier;
    use crate::config::default_config;
    use crate::model::{DataTable, ProviderError, Site, TableRow};
    use crate::sites::SiteDirectory;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    fn at(day: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 7, day)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    /// Replays a fixed table, optionally failing for some sites, and
    /// records every request it receives.
    struct StubProvider {
        table: DataTable,
        failing_sites: Vec<String>,
        requests: Mutex<Vec<DataRequest>>,
    }

    impl StubProvider {
        fn new(table: DataTable) -> Self {
            Self {
                table,
                failing_sites: Vec::new(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self, site: &str) -> Self {
            self.failing_sites.push(site.to_string());
            self
        }
    }

    impl Provider for StubProvider {
        fn site_list(&self, _collection: &str) -> Result<Vec<Site>, ProviderError> {
            Ok(Vec::new())
        }

        fn fetch_table(&self, request: &DataRequest) -> Result<DataTable, ProviderError> {
            self.requests.lock().unwrap().push(request.clone());
            if request.sites.iter().any(|s| self.failing_sites.contains(s)) {
                return Err(ProviderError::Http("connection reset".into()));
            }
            // Single-site requests only see that site's rows.
            let rows = self
                .table
                .rows
                .iter()
                .filter(|r| {
                    request.sites.len() > 1
                        || r.site.as_deref().map_or(true, |s| s == request.sites[0])
                })
                .cloned()
                .collect();
            Ok(DataTable {
                columns: self.table.columns.clone(),
                rows,
            })
        }
    }

    fn row(site: &str, ts: NaiveDateTime, values: Vec<Option<f64>>) -> TableRow {
        TableRow {
            site: Some(site.to_string()),
            timestamp: ts,
            values,
        }
    }

    fn definition(label: &str, collection: &str, cumulative: bool, measures: &[&str]) -> MeasurementDefinition {
        MeasurementDefinition {
            label: label.to_string(),
            collection: collection.to_string(),
            measures: measures.iter().map(|m| m.to_string()).collect(),
            method: if cumulative { AggregationMethod::Total } else { AggregationMethod::None },
            interval: if cumulative { AggregationInterval::Hourly } else { AggregationInterval::None },
            cumulative,
            columns: Vec::new(),
            unit: String::new(),
        }
    }

    fn engine(provider: StubProvider) -> (Engine, Arc<StubProvider>) {
        let mut directory = SiteDirectory::new();
        directory.insert_collection(
            "WebRivers",
            vec![
                Site::new("Patea at Skinner Rd", Some(-39.33), Some(174.47)),
                Site::new("Waiwhakaiho at Egmont Village", Some(-39.14), Some(174.14)),
                Site::new("Mangaehu at Raupuha Rd", None, None),
            ],
        );
        directory.insert_collection(
            "WebRainfall",
            vec![
                Site::new("Manganui at Everett Park", Some(-39.27), Some(174.22)),
                Site::new("Kaimiro at Kaimiro Rd", Some(-39.15), Some(174.16)),
            ],
        );
        let catalog = Catalog::from_parts(
            vec![
                definition("River Flow (m³/s)", "WebRivers", false, &["Flow"]),
                definition("Hourly Rainfall (mm)", "WebRainfall", true, &["Rainfall", "Rainfall SCADA"]),
            ],
            directory,
        );
        let classifier = Classifier::from_config(&default_config().unwrap().thresholds).unwrap();
        let provider = Arc::new(provider);
        let engine = Engine::new(catalog, provider.clone(), classifier, Duration::hours(48));
        (engine, provider)
    }

    fn flow_table() -> DataTable {
        DataTable {
            columns: vec!["M1".into()],
            rows: vec![
                row("Patea at Skinner Rd", at(10, 8), vec![Some(150.0)]),
                row("Patea at Skinner Rd", at(10, 9), vec![Some(160.0)]),
                row("Patea at Skinner Rd", at(10, 10), vec![None]),
                row("Waiwhakaiho at Egmont Village", at(10, 9), vec![Some(160.0)]),
                row("Somewhere Else", at(10, 9), vec![Some(1.0)]),
            ],
        }
    }

    #[test]
    fn test_snapshot_is_one_batched_request_with_every_site() {
        let (engine, provider) = engine(StubProvider::new(flow_table()));
        let snapshot = engine.latest_snapshot_at("River Flow (m³/s)", at(10, 12)).unwrap();

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1, "one request per label");
        assert_eq!(requests[0].sites.len(), 3);
        assert_eq!(requests[0].from, at(8, 12));

        assert_eq!(snapshot.values.len(), 3, "every directory site is present");
        assert_eq!(snapshot.values["Patea at Skinner Rd"].value, Some(160.0));
        assert_eq!(snapshot.values["Patea at Skinner Rd"].observed_at, Some(at(10, 9)));
        assert_eq!(snapshot.values["Mangaehu at Raupuha Rd"].value, None);
        assert!(!snapshot.values.contains_key("Somewhere Else"));
    }

    #[test]
    fn test_snapshot_of_cumulative_site_without_reading_is_null() {
        let (engine, _) = engine(StubProvider::new(DataTable::default()));
        let snapshot = engine.latest_snapshot_at("Hourly Rainfall (mm)", at(10, 12)).unwrap();
        assert!(snapshot.values.values().all(|v| v.value.is_none()));
        assert_eq!(snapshot.values.len(), 2);
    }

    #[test]
    fn test_snapshot_provider_failure_is_contained() {
        let provider = StubProvider::new(flow_table()).failing("Patea at Skinner Rd");
        let (engine, _) = engine(provider);
        let err = engine.latest_snapshot_at("River Flow (m³/s)", at(10, 12)).unwrap_err();
        assert!(matches!(err, QueryError::ProviderUnavailable { .. }));
        assert_eq!(
            err.user_message(),
            "The data source could not be reached. Please try again later."
        );
    }

    #[test]
    fn test_unknown_label_is_resolution_error() {
        let (engine, provider) = engine(StubProvider::new(flow_table()));
        let err = engine.latest_snapshot_at("Snowfall (cm)", at(10, 12)).unwrap_err();
        assert!(matches!(err, QueryError::UnknownMeasurement(_)));
        assert!(provider.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_rainfall_snapshot_overlays_scada_column() {
        let table = DataTable {
            columns: vec!["M1".into(), "M2".into()],
            rows: vec![
                row("Manganui at Everett Park", at(10, 10), vec![Some(3.0), Some(2.5)]),
                row("Manganui at Everett Park", at(10, 11), vec![None, Some(5.0)]),
                row("Kaimiro at Kaimiro Rd", at(10, 10), vec![None, Some(0.5)]),
            ],
        };
        let (engine, _) = engine(StubProvider::new(table));
        let snapshot = engine.latest_snapshot_at("Hourly Rainfall (mm)", at(10, 12)).unwrap();
        assert_eq!(snapshot.values["Manganui at Everett Park"].value, Some(5.0));
        assert_eq!(snapshot.values["Kaimiro at Kaimiro Rd"].value, Some(0.5));
    }

    #[test]
    fn test_period_summary_totals_rain_and_zero_fills() {
        let table = DataTable {
            columns: vec!["M1".into()],
            rows: vec![
                row("Manganui at Everett Park", at(10, 10), vec![Some(3.0)]),
                row("Manganui at Everett Park", at(10, 11), vec![Some(5.0)]),
            ],
        };
        let (engine, provider) = engine(StubProvider::new(table));
        let summary = engine
            .period_summary_at("Hourly Rainfall (mm)", TimePeriod::Hours24, at(10, 12))
            .unwrap();

        assert_eq!(provider.requests.lock().unwrap()[0].from, at(9, 12));
        assert_eq!(summary.values["Manganui at Everett Park"].value, Some(8.0));
        assert_eq!(summary.values["Kaimiro at Kaimiro Rd"].value, Some(0.0));
        assert_eq!(
            summary.values["Kaimiro at Kaimiro Rd"].reduction,
            Reduction::WindowTotal
        );
    }

    #[test]
    fn test_period_summary_instantaneous_missing_is_null() {
        let (engine, _) = engine(StubProvider::new(flow_table()));
        let summary = engine
            .period_summary_at("River Flow (m³/s)", TimePeriod::Latest, at(10, 12))
            .unwrap();
        assert_eq!(summary.values["Mangaehu at Raupuha Rd"].value, None);
        assert_eq!(summary.values["Patea at Skinner Rd"].value, Some(160.0));
    }

    #[test]
    fn test_series_for_cumulative_requests_raw_and_bins_locally() {
        let table = DataTable {
            columns: vec!["M1".into()],
            rows: vec![
                row("Manganui at Everett Park", at(9, 11), vec![Some(5.0)]),
                row("Manganui at Everett Park", at(9, 10), vec![Some(3.0)]),
            ],
        };
        let (engine, provider) = engine(StubProvider::new(table));
        let series = engine
            .series_for("Hourly Rainfall (mm)", "Manganui at Everett Park", at(3, 12), at(10, 12), true)
            .unwrap();

        let request = &provider.requests.lock().unwrap()[0];
        assert_eq!(request.method, AggregationMethod::None);
        assert_eq!(request.interval, AggregationInterval::None);

        assert_eq!(series.raw[0].timestamp, at(9, 10), "raw series is time ordered");
        assert_eq!(series.total, Some(8.0));
        assert_eq!(series.hourly.iter().filter(|b| b.total > 0.0).count(), 2);
        assert_eq!(series.daily.len(), 8);
    }

    #[test]
    fn test_series_for_empty_cumulative_window_is_zero() {
        let (engine, _) = engine(StubProvider::new(DataTable::default()));
        let series = engine
            .series_for("Hourly Rainfall (mm)", "Kaimiro at Kaimiro Rd", at(9, 12), at(10, 12), true)
            .unwrap();
        assert_eq!(series.total, Some(0.0));
        assert_eq!(series.hourly.len(), 25);
    }

    #[test]
    fn test_series_for_empty_instantaneous_window_is_empty_result() {
        let (engine, _) = engine(StubProvider::new(DataTable::default()));
        let err = engine
            .series_for("River Flow (m³/s)", "Patea at Skinner Rd", at(9, 12), at(10, 12), false)
            .unwrap_err();
        assert!(matches!(err, QueryError::EmptyResult(_)));
        assert_eq!(err.user_message(), "No data found for the selected criteria.");
    }

    #[test]
    fn test_series_for_unknown_site() {
        let (engine, provider) = engine(StubProvider::new(flow_table()));
        let err = engine
            .series_for("River Flow (m³/s)", "Nowhere", at(9, 12), at(10, 12), false)
            .unwrap_err();
        assert!(matches!(err, QueryError::UnknownSite { .. }));
        assert!(provider.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dataset_skips_failing_site() {
        let provider = StubProvider::new(flow_table()).failing("Waiwhakaiho at Egmont Village");
        let (engine, provider) = engine(provider);
        let dataset = engine
            .dataset_for(
                "River Flow (m³/s)",
                &["Waiwhakaiho at Egmont Village".to_string(), "Patea at Skinner Rd".to_string()],
                at(9, 12),
                at(10, 12),
            )
            .unwrap();

        assert_eq!(provider.requests.lock().unwrap().len(), 2, "one request per site");
        assert!(dataset.rows.iter().all(|r| r.site == "Patea at Skinner Rd"));
        assert_eq!(dataset.rows.len(), 3);
        assert_eq!(dataset.missing_sites, vec!["Waiwhakaiho at Egmont Village"]);
    }

    #[test]
    fn test_dataset_all_failing_is_empty_result() {
        let provider = StubProvider::new(flow_table())
            .failing("Waiwhakaiho at Egmont Village")
            .failing("Patea at Skinner Rd");
        let (engine, _) = engine(provider);
        let err = engine
            .dataset_for(
                "River Flow (m³/s)",
                &["Waiwhakaiho at Egmont Village".to_string(), "Patea at Skinner Rd".to_string()],
                at(9, 12),
                at(10, 12),
            )
            .unwrap_err();
        assert!(matches!(err, QueryError::EmptyResult(_)));
    }

    #[test]
    fn test_dataset_rows_ordered_by_site_then_time() {
        let (engine, _) = engine(StubProvider::new(flow_table()));
        let dataset = engine
            .dataset_for(
                "River Flow (m³/s)",
                &["Waiwhakaiho at Egmont Village".to_string(), "Patea at Skinner Rd".to_string()],
                at(9, 12),
                at(10, 12),
            )
            .unwrap();

        let keys: Vec<(&str, NaiveDateTime)> = dataset
            .rows
            .iter()
            .map(|r| (r.site.as_str(), r.timestamp))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(dataset.rows[0].measurement, "River Flow (m³/s)");
        assert!(dataset.rows.iter().any(|r| r.value.is_none()), "gaps are kept");
    }

    #[test]
    fn test_dataset_unknown_site_is_skipped() {
        let (engine, provider) = engine(StubProvider::new(flow_table()));
        let dataset = engine
            .dataset_for(
                "River Flow (m³/s)",
                &["Nowhere".to_string(), "Patea at Skinner Rd".to_string()],
                at(9, 12),
                at(10, 12),
            )
            .unwrap();
        assert_eq!(provider.requests.lock().unwrap().len(), 1);
        assert_eq!(dataset.missing_sites, vec!["Nowhere"]);
    }

    #[test]
    fn test_dataset_repeated_site_fetched_once() {
        let (engine, provider) = engine(StubProvider::new(flow_table()));
        let patea = "Patea at Skinner Rd".to_string();
        let dataset = engine
            .dataset_for(
                "River Flow (m³/s)",
                &[patea.clone(), "Nowhere".to_string(), patea.clone(), "Nowhere".to_string()],
                at(9, 12),
                at(10, 12),
            )
            .unwrap();

        assert_eq!(provider.requests.lock().unwrap().len(), 1);
        assert_eq!(dataset.rows.len(), 3, "rows are not duplicated");
        assert_eq!(dataset.missing_sites, vec!["Nowhere"]);
    }

    #[test]
    fn test_marker_borrows_coordinates_from_another_collection() {
        let mut directory = SiteDirectory::new();
        directory.insert_collection(
            "WebRivers",
            vec![Site::new("Patea at Skinner Rd", None, None)],
        );
        directory.insert_collection(
            "WebStage",
            vec![Site::new("Patea at Skinner Rd", Some(-39.33), Some(174.47))],
        );
        let catalog = Catalog::from_parts(
            vec![definition("River Flow (m³/s)", "WebRivers", false, &["Flow"])],
            directory,
        );
        let engine = Engine::new(
            catalog,
            Arc::new(StubProvider::new(flow_table())),
            Classifier::new(),
            Duration::hours(48),
        );

        let markers = engine.map_markers_at("River Flow (m³/s)", at(10, 12)).unwrap();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].latitude, -39.33);
        assert_eq!(markers[0].longitude, 174.47);
    }

    #[test]
    fn test_map_markers_classify_with_site_overrides_and_skip_unlocated() {
        let (engine, _) = engine(StubProvider::new(flow_table()));
        let markers = engine.map_markers_at("River Flow (m³/s)", at(10, 12)).unwrap();

        assert_eq!(markers.len(), 2, "unlocated site is not on the map");
        let patea = markers.iter().find(|m| m.site == "Patea at Skinner Rd").unwrap();
        let egmont = markers
            .iter()
            .find(|m| m.site == "Waiwhakaiho at Egmont Village")
            .unwrap();

        // Same 160 m³/s: above Patea's mean annual flood, below Egmont Village's.
        assert_eq!(patea.status.tier, StatusTier::High);
        assert_eq!(egmont.status.tier, StatusTier::Normal);
    }

    #[test]
    fn test_degraded_catalog_still_serves_snapshots() {
        let catalog = CatalogBuilder::from_definitions(Vec::new()).build(&StubProvider::new(DataTable::default()));
        assert!(!catalog.is_degraded(), "nothing to list is not a failure");

        let degraded = Catalog::degraded("site list unavailable");
        let engine = Engine::new(
            degraded,
            Arc::new(StubProvider::new(DataTable::default())),
            Classifier::new(),
            Duration::hours(48),
        );
        let snapshot = engine.latest_snapshot_at("Rainfall (mm)", at(10, 12)).unwrap();
        assert_eq!(snapshot.values.len(), 3);
    }
}
