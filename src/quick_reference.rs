/// Quick reference pages: fixed views over configured sites.
///
/// - `taranaki-rainfall-summary`: hourly rainfall totals for the rainfall
///   reference site over the last few days.
/// - `river-flow-status`: Patea at Skinner Rd flow with its status against
///   the mean annual flood.
/// - `waiwhakaiho-egmont-village`: the same view for Waiwhakaiho.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::alert::thresholds::Classification;
use crate::analysis::reduce::BinTotal;
use crate::config::QuickReferenceConfig;
use crate::engine::Engine;
use crate::model::{QueryError, Reading, SelectionKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuickReferencePage {
    RainfallSummary,
    RiverFlowStatus,
    WaiwhakaihoEgmontVillage,
}

impl QuickReferencePage {
    pub const ALL: [QuickReferencePage; 3] = [
        QuickReferencePage::RainfallSummary,
        QuickReferencePage::RiverFlowStatus,
        QuickReferencePage::WaiwhakaihoEgmontVillage,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            QuickReferencePage::RainfallSummary => "taranaki-rainfall-summary",
            QuickReferencePage::RiverFlowStatus => "river-flow-status",
            QuickReferencePage::WaiwhakaihoEgmontVillage => "waiwhakaiho-egmont-village",
        }
    }
}

impl fmt::Display for QuickReferencePage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for QuickReferencePage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.slug() == s.trim())
            .ok_or_else(|| format!("unknown quick reference page '{}'", s))
    }
}

// ---------------------------------------------------------------------------
// Page data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RainfallSummary {
    pub site: String,
    pub measurement: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub hourly: Vec<BinTotal>,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowStatus {
    pub site: String,
    pub measurement: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub series: Vec<Reading>,
    pub latest: Option<f64>,
    pub status: Classification,
    /// Mean annual flood flow for the site, when one is configured.
    pub mean_annual_flood: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "page", rename_all = "snake_case")]
pub enum QuickReference {
    RainfallSummary(RainfallSummary),
    FlowStatus(FlowStatus),
}

/// Hourly rainfall totals for the reference site.
pub fn rainfall_summary(
    engine: &Engine,
    config: &QuickReferenceConfig,
    now: NaiveDateTime,
) -> Result<RainfallSummary, QueryError> {
    let start = now - Duration::days(config.window_days);
    let series = engine.series_for(
        &config.rainfall_measurement,
        &config.rainfall_site,
        start,
        now,
        true,
    )?;

    Ok(RainfallSummary {
        site: series.site,
        measurement: series.measurement,
        start,
        end: now,
        total: series.total.unwrap_or(0.0),
        hourly: series.hourly,
    })
}

/// Flow series, latest value and status for one site.
///
/// Missing data is part of the page, not an error: an empty window or an
/// unreachable provider shows as an unavailable status.
pub fn flow_status(
    engine: &Engine,
    config: &QuickReferenceConfig,
    site: &str,
    now: NaiveDateTime,
) -> Result<FlowStatus, QueryError> {
    let label = config.flow_measurement.as_str();
    let start = now - Duration::days(config.window_days);

    let (series, latest) = match engine.series_for(label, site, start, now, false) {
        Ok(series) => (series.raw, series.latest.map(|l| l.value)),
        Err(QueryError::EmptyResult(_)) | Err(QueryError::ProviderUnavailable { .. }) => {
            (Vec::new(), None)
        }
        Err(e) => return Err(e),
    };

    Ok(FlowStatus {
        site: site.to_string(),
        measurement: label.to_string(),
        start,
        end: now,
        series,
        latest,
        status: engine.classify(label, site, latest),
        mean_annual_flood: engine
            .classifier()
            .reference_bound(&SelectionKey::site(label, site)),
    })
}

/// Builds any quick reference page.
pub fn render(
    page: QuickReferencePage,
    engine: &Engine,
    config: &QuickReferenceConfig,
    now: NaiveDateTime,
) -> Result<QuickReference, QueryError> {
    match page {
        QuickReferencePage::RainfallSummary => {
            rainfall_summary(engine, config, now).map(QuickReference::RainfallSummary)
        }
        QuickReferencePage::RiverFlowStatus => {
            flow_status(engine, config, &config.flow_status_site, now).map(QuickReference::FlowStatus)
        }
        QuickReferencePage::WaiwhakaihoEgmontVillage => {
            flow_status(engine, config, &config.egmont_village_site, now)
                .map(QuickReference::FlowStatus)
        }
    }
}
