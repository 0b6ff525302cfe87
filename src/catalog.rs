/// Measurement catalog: user-facing labels resolved to provider requests.
///
/// The catalog is built once at startup by `CatalogBuilder` from the
/// `[[measurement]]` configuration and one SiteList call per provider
/// collection. If any collection cannot be listed the builder returns a
/// degraded catalog over the embedded fallback sites instead of failing;
/// either way the result is read-only for the life of the process.

use chrono::Duration;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::{error, info};

use crate::config::{ConfigError, ServiceConfig};
use crate::ingest::Provider;
use crate::model::{AggregationInterval, AggregationMethod, QueryError, Site};
use crate::sites::{
    fallback_sites, SiteDirectory, FALLBACK_FLOW_SITES, FALLBACK_RAINFALL_SITES,
};

/// Labels and collections used by the degraded catalog.
pub const FALLBACK_RAINFALL_LABEL: &str = "Rainfall (mm)";
pub const FALLBACK_FLOW_LABEL: &str = "River Flow (m³/s)";
const FALLBACK_RAINFALL_COLLECTION: &str = "WebRainfall";
const FALLBACK_FLOW_COLLECTION: &str = "WebRivers";

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// Everything needed to turn a label into a provider request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementDefinition {
    pub label: String,
    /// Provider collection whose sites belong to this label.
    pub collection: String,
    /// Provider measurement names, requested together in this order.
    pub measures: Vec<String>,
    pub method: AggregationMethod,
    pub interval: AggregationInterval,
    /// Incremental quantity (rainfall): empty windows sum to zero.
    pub cumulative: bool,
    /// Column preference for normalization; empty means every response
    /// column in table order.
    pub columns: Vec<String>,
    pub unit: String,
}

impl MeasurementDefinition {
    /// Column preference used when collapsing a response to one value.
    ///
    /// Empty unless configured, in which case normalization walks every
    /// response column in table order. Columns are numbered over the
    /// (measure, sensor item) pairs actually returned, so a measure with
    /// two items pushes the next measure to `M3`.
    pub fn column_preference(&self) -> &[String] {
        &self.columns
    }
}

/// Whether the catalog reflects the provider or the embedded fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CatalogHealth {
    Live,
    Degraded { reason: String },
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Catalog {
    definitions: Vec<MeasurementDefinition>,
    directory: SiteDirectory,
    health: CatalogHealth,
}

impl Catalog {
    /// A live catalog over an already populated directory.
    pub fn from_parts(definitions: Vec<MeasurementDefinition>, directory: SiteDirectory) -> Self {
        Self {
            definitions,
            directory,
            health: CatalogHealth::Live,
        }
    }

    /// The minimal rainfall/flow catalog over embedded sites.
    pub fn degraded(reason: impl Into<String>) -> Self {
        let definitions = vec![
            MeasurementDefinition {
                label: FALLBACK_RAINFALL_LABEL.to_string(),
                collection: FALLBACK_RAINFALL_COLLECTION.to_string(),
                measures: vec!["Rainfall".to_string()],
                method: AggregationMethod::None,
                interval: AggregationInterval::None,
                cumulative: true,
                columns: Vec::new(),
                unit: "mm".to_string(),
            },
            MeasurementDefinition {
                label: FALLBACK_FLOW_LABEL.to_string(),
                collection: FALLBACK_FLOW_COLLECTION.to_string(),
                measures: vec!["Flow".to_string()],
                method: AggregationMethod::None,
                interval: AggregationInterval::None,
                cumulative: false,
                columns: Vec::new(),
                unit: "m³/s".to_string(),
            },
        ];

        let mut directory = SiteDirectory::new();
        directory.insert_collection(
            FALLBACK_RAINFALL_COLLECTION,
            fallback_sites(FALLBACK_RAINFALL_SITES),
        );
        directory.insert_collection(FALLBACK_FLOW_COLLECTION, fallback_sites(FALLBACK_FLOW_SITES));

        Self {
            definitions,
            directory,
            health: CatalogHealth::Degraded {
                reason: reason.into(),
            },
        }
    }

    pub fn resolve(&self, label: &str) -> Result<&MeasurementDefinition, QueryError> {
        self.definitions
            .iter()
            .find(|d| d.label == label)
            .ok_or_else(|| QueryError::UnknownMeasurement(label.to_string()))
    }

    /// Labels in configuration order.
    pub fn labels(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.label.as_str()).collect()
    }

    pub fn definitions(&self) -> &[MeasurementDefinition] {
        &self.definitions
    }

    /// Sites attached to a label, in provider order.
    pub fn sites_for(&self, label: &str) -> Result<&[Site], QueryError> {
        let def = self.resolve(label)?;
        Ok(self.directory.sites_for_collection(&def.collection))
    }

    /// Looks up one site under a label.
    pub fn find_site(&self, label: &str, site: &str) -> Result<&Site, QueryError> {
        let def = self.resolve(label)?;
        self.directory
            .find_site(&def.collection, site)
            .ok_or_else(|| QueryError::UnknownSite {
                measurement: label.to_string(),
                site: site.to_string(),
            })
    }

    pub fn directory(&self) -> &SiteDirectory {
        &self.directory
    }

    pub fn health(&self) -> &CatalogHealth {
        &self.health
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.health, CatalogHealth::Degraded { .. })
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds the catalog against a provider.
pub struct CatalogBuilder {
    definitions: Vec<MeasurementDefinition>,
}

impl CatalogBuilder {
    pub fn new(config: &ServiceConfig) -> Result<Self, ConfigError> {
        let definitions = config
            .measurements
            .iter()
            .map(|m| {
                Ok(MeasurementDefinition {
                    label: m.label.clone(),
                    collection: m.collection.clone(),
                    measures: m.measures.clone(),
                    method: m.method()?,
                    interval: m.interval()?,
                    cumulative: m.cumulative,
                    columns: m.columns.clone(),
                    unit: m.unit.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self { definitions })
    }

    pub fn from_definitions(definitions: Vec<MeasurementDefinition>) -> Self {
        Self { definitions }
    }

    /// Lists every distinct collection once. Any failure degrades the
    /// whole catalog.
    pub fn build(self, provider: &dyn Provider) -> Catalog {
        let collections: BTreeSet<&str> =
            self.definitions.iter().map(|d| d.collection.as_str()).collect();

        let mut directory = SiteDirectory::new();
        for collection in collections {
            match provider.site_list(collection) {
                Ok(sites) => {
                    info!(collection, sites = sites.len(), "loaded site list");
                    directory.insert_collection(collection, sites);
                }
                Err(e) => {
                    error!(
                        collection,
                        error = %e,
                        "site list unavailable, starting with fallback catalog"
                    );
                    return Catalog::degraded(format!("site list for {}: {}", collection, e));
                }
            }
        }

        Catalog::from_parts(self.definitions, directory)
    }
}

// ---------------------------------------------------------------------------
// Time periods
// ---------------------------------------------------------------------------

/// Map summary periods offered to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TimePeriod {
    #[serde(rename = "latest")]
    Latest,
    #[serde(rename = "24hrs")]
    Hours24,
    #[serde(rename = "48hrs")]
    Hours48,
    #[serde(rename = "72hrs")]
    Hours72,
    #[serde(rename = "1week")]
    Week,
    #[serde(rename = "1month")]
    Month,
}

impl TimePeriod {
    const CUMULATIVE_OPTIONS: &'static [TimePeriod] = &[
        TimePeriod::Hours24,
        TimePeriod::Hours48,
        TimePeriod::Hours72,
        TimePeriod::Week,
        TimePeriod::Month,
    ];
    const INSTANT_OPTIONS: &'static [TimePeriod] = &[TimePeriod::Latest];

    /// Periods that make sense for a measurement.
    pub fn options_for(cumulative: bool) -> &'static [TimePeriod] {
        if cumulative {
            Self::CUMULATIVE_OPTIONS
        } else {
            Self::INSTANT_OPTIONS
        }
    }

    pub fn default_for(cumulative: bool) -> TimePeriod {
        if cumulative {
            TimePeriod::Hours24
        } else {
            TimePeriod::Latest
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            TimePeriod::Latest => Duration::hours(1),
            TimePeriod::Hours24 => Duration::days(1),
            TimePeriod::Hours48 => Duration::days(2),
            TimePeriod::Hours72 => Duration::days(3),
            TimePeriod::Week => Duration::weeks(1),
            TimePeriod::Month => Duration::days(30),
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            TimePeriod::Latest => "latest",
            TimePeriod::Hours24 => "24hrs",
            TimePeriod::Hours48 => "48hrs",
            TimePeriod::Hours72 => "72hrs",
            TimePeriod::Week => "1week",
            TimePeriod::Month => "1month",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimePeriod::Latest => "Latest Reading",
            TimePeriod::Hours24 => "Last 24 Hours",
            TimePeriod::Hours48 => "Last 48 Hours",
            TimePeriod::Hours72 => "Last 72 Hours",
            TimePeriod::Week => "Last 1 Week",
            TimePeriod::Month => "Last 1 Month",
        }
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for TimePeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "latest" => Ok(TimePeriod::Latest),
            "24hrs" => Ok(TimePeriod::Hours24),
            "48hrs" => Ok(TimePeriod::Hours48),
            "72hrs" => Ok(TimePeriod::Hours72),
            "1week" => Ok(TimePeriod::Week),
            "1month" => Ok(TimePeriod::Month),
            other => Err(format!("unknown time period '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
