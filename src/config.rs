/// Service configuration loader - parses hydromon.toml
///
/// Separates the measurement catalog seed, status thresholds and provider
/// settings from code, so adding a measurement or adjusting a gauge's mean
/// annual flood is a configuration change rather than a recompile.

use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::alert::thresholds::{
    ColorTag, DefaultBand, StatusTier, ThresholdError, ThresholdRule, ThresholdTable,
};
use crate::catalog::{FALLBACK_FLOW_LABEL, FALLBACK_RAINFALL_LABEL};
use crate::model::{AggregationInterval, AggregationMethod, SelectionKey};

/// The default configuration shipped with the service.
const EMBEDDED_CONFIG: &str = include_str!("../hydromon.toml");

/// Default configuration file name, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "hydromon.toml";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ThresholdError> for ConfigError {
    fn from(err: ThresholdError) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// TOML structures
// ---------------------------------------------------------------------------

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub provider: ProviderConfig,
    #[serde(rename = "measurement", default)]
    pub measurements: Vec<MeasurementConfig>,
    #[serde(rename = "threshold", default)]
    pub thresholds: Vec<ThresholdConfig>,
    #[serde(default)]
    pub quick_reference: QuickReferenceConfig,
}

/// Hilltop server location and request defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    pub hts_file: String,
    /// Lookback used for "latest reading" map snapshots.
    #[serde(default = "default_lookback_hours")]
    pub snapshot_lookback_hours: i64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Longest series or dataset window a request may ask for.
    #[serde(default = "default_max_query_days")]
    pub max_query_days: i64,
}

fn default_lookback_hours() -> i64 {
    48
}

fn default_max_query_days() -> i64 {
    366
}

/// Upper bounds accepted by `validate`.
pub const MAX_LOOKBACK_HOURS: i64 = 24 * 31;
pub const MAX_QUICK_REFERENCE_DAYS: i64 = 366;
pub const MAX_QUERY_DAYS: i64 = 3660;

fn default_user_agent() -> String {
    format!("hydromon_service/{}", env!("CARGO_PKG_VERSION"))
}

/// One measurement catalog seed entry.
#[derive(Debug, Clone, Deserialize)]
pub struct MeasurementConfig {
    pub label: String,
    /// Provider collection supplying the site set.
    pub collection: String,
    /// Provider measurement names, in column order (M1, M2, ...).
    pub measures: Vec<String>,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub interval: String,
    pub cumulative: bool,
    /// Column preference for overlaying multi-sensor responses.
    /// Empty means every response column in order.
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub unit: String,
}

impl MeasurementConfig {
    pub fn method(&self) -> Result<AggregationMethod, ConfigError> {
        self.method
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("{}: {}", self.label, e)))
    }

    pub fn interval(&self) -> Result<AggregationInterval, ConfigError> {
        self.interval
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("{}: {}", self.label, e)))
    }
}

/// Threshold table for a measurement, optionally scoped to one site.
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdConfig {
    pub measurement: String,
    pub site: Option<String>,
    pub default_tier: Option<StatusTier>,
    pub default_color: Option<ColorTag>,
    pub default_description: Option<String>,
    #[serde(rename = "rule", default)]
    pub rules: Vec<ThresholdRuleConfig>,
}

/// A single bound. Exactly one of `above` / `below` must be set.
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdRuleConfig {
    pub above: Option<f64>,
    pub below: Option<f64>,
    pub tier: StatusTier,
    pub color: ColorTag,
    pub description: Option<String>,
}

impl ThresholdConfig {
    pub fn key(&self) -> SelectionKey {
        SelectionKey {
            measurement: self.measurement.clone(),
            site: self.site.clone(),
        }
    }

    /// Converts the TOML section into a validated `ThresholdTable`.
    ///
    /// A rule with both or neither bound set is skipped with a warning;
    /// `validate` reports it as an error before this is reached at startup.
    pub fn to_table(&self) -> Result<(ThresholdTable, SelectionKey), ThresholdError> {
        let mut above = Vec::new();
        let mut below = Vec::new();

        for rule in &self.rules {
            let (bound, list) = match (rule.above, rule.below) {
                (Some(b), None) => (b, &mut above),
                (None, Some(b)) => (b, &mut below),
                _ => {
                    warn!(measurement = %self.measurement, "threshold rule needs exactly one of above/below");
                    continue;
                }
            };
            list.push(ThresholdRule {
                bound,
                tier: rule.tier,
                color: rule.color,
                description: rule.description.clone(),
            });
        }

        let mut default = DefaultBand::default();
        if let Some(tier) = self.default_tier {
            default.tier = tier;
        }
        if let Some(color) = self.default_color {
            default.color = color;
        }
        default.description = self.default_description.clone();

        Ok((ThresholdTable::new(above, below, default)?, self.key()))
    }
}

/// Sites and measurements used by the quick reference pages.
#[derive(Debug, Clone, Deserialize)]
pub struct QuickReferenceConfig {
    pub rainfall_measurement: String,
    pub rainfall_site: String,
    pub flow_measurement: String,
    pub flow_status_site: String,
    pub egmont_village_site: String,
    #[serde(default = "default_window_days")]
    pub window_days: i64,
}

fn default_window_days() -> i64 {
    7
}

impl Default for QuickReferenceConfig {
    fn default() -> Self {
        Self {
            rainfall_measurement: "Hourly Rainfall (mm)".to_string(),
            rainfall_site: "Manganui at Everett Park".to_string(),
            flow_measurement: "River Flow (m³/s)".to_string(),
            flow_status_site: "Patea at Skinner Rd".to_string(),
            egmont_village_site: "Waiwhakaiho at Egmont Village".to_string(),
            window_days: default_window_days(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Parses and validates configuration text.
pub fn parse_config(contents: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = toml::from_str(contents)?;
    validate(&config)?;
    Ok(config)
}

/// Loads configuration from a TOML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ServiceConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&contents)
}

/// The configuration compiled into the binary.
pub fn default_config() -> Result<ServiceConfig, ConfigError> {
    parse_config(EMBEDDED_CONFIG)
}

/// Resolves configuration the way the service starts up:
///
/// 1. `.env` is loaded if present.
/// 2. An explicit `path`, else `HYDROMON_CONFIG`, else `hydromon.toml` if it
///    exists, else the embedded default.
/// 3. `HILLTOP_BASE_URL` / `HILLTOP_HTS_FILE` override the provider section.
pub fn load_from_env(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    dotenv::dotenv().ok();

    let explicit = path
        .map(|p| p.to_path_buf())
        .or_else(|| env::var("HYDROMON_CONFIG").ok().map(Into::into));

    let mut config = match explicit {
        Some(p) => {
            info!(path = %p.display(), "loading configuration");
            load_config(&p)?
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            info!(path = DEFAULT_CONFIG_PATH, "loading configuration");
            load_config(DEFAULT_CONFIG_PATH)?
        }
        None => {
            info!("no configuration file found, using embedded defaults");
            default_config()?
        }
    };

    if let Ok(url) = env::var("HILLTOP_BASE_URL") {
        config.provider.base_url = url;
    }
    if let Ok(hts) = env::var("HILLTOP_HTS_FILE") {
        config.provider.hts_file = hts;
    }

    Ok(config)
}

/// Checks the invariants the catalog and classifier rely on.
pub fn validate(config: &ServiceConfig) -> Result<(), ConfigError> {
    check_range(
        "snapshot_lookback_hours",
        config.provider.snapshot_lookback_hours,
        MAX_LOOKBACK_HOURS,
    )?;
    check_range(
        "max_query_days",
        config.provider.max_query_days,
        MAX_QUERY_DAYS,
    )?;
    check_range(
        "quick_reference.window_days",
        config.quick_reference.window_days,
        MAX_QUICK_REFERENCE_DAYS,
    )?;

    let mut labels = HashSet::new();
    for m in &config.measurements {
        if !labels.insert(m.label.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate measurement label '{}'",
                m.label
            )));
        }
        if m.measures.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "measurement '{}' lists no provider measures",
                m.label
            )));
        }
        m.method()?;
        m.interval()?;
    }

    // Fallback labels may carry thresholds for degraded mode.
    labels.insert(FALLBACK_RAINFALL_LABEL);
    labels.insert(FALLBACK_FLOW_LABEL);

    let mut keys = HashSet::new();
    for t in &config.thresholds {
        if !labels.contains(t.measurement.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "threshold references unknown measurement '{}'",
                t.measurement
            )));
        }
        if !keys.insert(t.key()) {
            return Err(ConfigError::Invalid(format!("duplicate threshold table for {}", t.key())));
        }
        for rule in &t.rules {
            if rule.above.is_some() == rule.below.is_some() {
                return Err(ConfigError::Invalid(format!(
                    "threshold rule for {} needs exactly one of above/below",
                    t.key()
                )));
            }
        }
        t.to_table()?;
    }

    Ok(())
}

fn check_range(name: &str, value: i64, max: i64) -> Result<(), ConfigError> {
    if value <= 0 || value > max {
        return Err(ConfigError::Invalid(format!(
            "{} must be between 1 and {}, got {}",
            name, max, value
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
