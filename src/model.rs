/// Core data types for the Taranaki hydrology dashboard service.
///
/// This module defines the shared domain model imported by all other modules:
/// sites, readings, the provider request/response table, reduced values and
/// the error taxonomy. It contains no I/O.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Sites
// ---------------------------------------------------------------------------

/// A monitoring site as listed by a provider collection.
///
/// Coordinates are optional: the Hilltop site list returns sites without a
/// location, and those are kept for data export but left off the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Site {
    pub fn new(name: impl Into<String>, latitude: Option<f64>, longitude: Option<f64>) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
        }
    }

    /// `(latitude, longitude)` when both are present.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregation parameters
// ---------------------------------------------------------------------------

/// Server-side aggregation method passed through to Hilltop `Method=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum AggregationMethod {
    #[default]
    None,
    Total,
    Average,
    Maximum,
    Minimum,
}

impl AggregationMethod {
    /// The value Hilltop expects, empty for no aggregation.
    pub fn as_provider_str(&self) -> &'static str {
        match self {
            AggregationMethod::None => "",
            AggregationMethod::Total => "Total",
            AggregationMethod::Average => "Average",
            AggregationMethod::Maximum => "Maximum",
            AggregationMethod::Minimum => "Minimum",
        }
    }
}

impl FromStr for AggregationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(AggregationMethod::None),
            "total" => Ok(AggregationMethod::Total),
            "average" => Ok(AggregationMethod::Average),
            "maximum" => Ok(AggregationMethod::Maximum),
            "minimum" => Ok(AggregationMethod::Minimum),
            other => Err(format!("unknown aggregation method '{}'", other)),
        }
    }
}

/// Server-side aggregation interval passed through to Hilltop `Interval=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum AggregationInterval {
    #[default]
    None,
    Hourly,
    Daily,
}

impl AggregationInterval {
    pub fn as_provider_str(&self) -> &'static str {
        match self {
            AggregationInterval::None => "",
            AggregationInterval::Hourly => "1 hour",
            AggregationInterval::Daily => "1 day",
        }
    }
}

impl FromStr for AggregationInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(AggregationInterval::None),
            "1 hour" | "hour" | "hourly" => Ok(AggregationInterval::Hourly),
            "1 day" | "day" | "daily" => Ok(AggregationInterval::Daily),
            other => Err(format!("unknown aggregation interval '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Provider request / response
// ---------------------------------------------------------------------------

/// One data query against the provider. `sites` and `measures` are joined
/// with commas on the wire, so a single request can cover many sites.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRequest {
    pub sites: Vec<String>,
    pub measures: Vec<String>,
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
    pub method: AggregationMethod,
    pub interval: AggregationInterval,
}

/// A row of the provider's tabular response. `values[i]` belongs to
/// `DataTable::columns[i]`; `site` is set when the response names the site.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub site: Option<String>,
    pub timestamp: NaiveDateTime,
    pub values: Vec<Option<f64>>,
}

/// Tabular provider response: value columns are labelled `M1`, `M2`, ...
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataTable {
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl DataTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a named value column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }
}

// ---------------------------------------------------------------------------
// Readings and reduced values
// ---------------------------------------------------------------------------

/// A normalized reading: one value per site and timestamp. `None` marks a
/// sensor gap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub site: String,
    pub timestamp: NaiveDateTime,
    pub value: Option<f64>,
}

/// How a reduced value was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    /// Most recent non-null reading in the window.
    LatestInstant,
    /// Sum of all readings in the window.
    WindowTotal,
}

/// The single scalar shown for a site in map and summary views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReducedSiteValue {
    pub site: String,
    pub measurement: String,
    pub value: Option<f64>,
    pub reduction: Reduction,
    /// Timestamp of the reading a `LatestInstant` value came from.
    pub observed_at: Option<NaiveDateTime>,
}

// ---------------------------------------------------------------------------
// Selection key
// ---------------------------------------------------------------------------

/// A measurement label with an optional site name.
///
/// Used to key threshold tables and to carry presentation-layer selections
/// through the service as a structured value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SelectionKey {
    pub measurement: String,
    pub site: Option<String>,
}

impl SelectionKey {
    pub fn measurement(label: impl Into<String>) -> Self {
        Self {
            measurement: label.into(),
            site: None,
        }
    }

    pub fn site(label: impl Into<String>, site: impl Into<String>) -> Self {
        Self {
            measurement: label.into(),
            site: Some(site.into()),
        }
    }

    /// The same key with the site dropped.
    pub fn generic(&self) -> Self {
        Self::measurement(self.measurement.clone())
    }
}

impl fmt::Display for SelectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.site {
            Some(site) => write!(f, "{} @ {}", self.measurement, site),
            None => write!(f, "{}", self.measurement),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by the provider client.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// Transport failure before a response arrived.
    #[error("HTTP error: {0}")]
    Http(String),
    /// Non-2xx response from the provider.
    #[error("HTTP status: {0}")]
    HttpStatus(u16),
    /// The response body could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),
    /// The server answered with an `<Error>` element.
    #[error("Server error: {0}")]
    Server(String),
}

/// Failures reported by engine operations.
///
/// Provider errors never escape the engine as-is; they are logged and
/// wrapped in `ProviderUnavailable` with the request context.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("unknown measurement '{0}'")]
    UnknownMeasurement(String),
    #[error("site '{site}' is not listed for '{measurement}'")]
    UnknownSite { measurement: String, site: String },
    #[error("provider unavailable for {context}: {source}")]
    ProviderUnavailable {
        context: String,
        source: ProviderError,
    },
    #[error("no data found for {0}")]
    EmptyResult(String),
}

impl QueryError {
    /// Neutral message suitable for end users.
    pub fn user_message(&self) -> &'static str {
        match self {
            QueryError::UnknownMeasurement(_) | QueryError::UnknownSite { .. } => {
                "No data available for this selection."
            }
            QueryError::ProviderUnavailable { .. } => {
                "The data source could not be reached. Please try again later."
            }
            QueryError::EmptyResult(_) => "No data found for the selected criteria.",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
