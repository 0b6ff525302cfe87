//! Status tier classification against ordered threshold tables.
//!
//! Thresholds are data, not code: each measurement label (and optionally a
//! named site under that label) owns a `ThresholdTable` loaded from the
//! `[[threshold]]` sections of `hydromon.toml`. A site-specific table
//! replaces the measurement-wide one, which is how the per-gauge mean annual
//! flood flows are expressed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::config::ThresholdConfig;
use crate::model::SelectionKey;

// ---------------------------------------------------------------------------
// Tiers and colours
// ---------------------------------------------------------------------------

/// Status tiers. `Unavailable` sits outside the severity scale; the others
/// are in ascending order of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusTier {
    Unavailable,
    Low,
    Normal,
    Elevated,
    High,
}

impl StatusTier {
    /// Position on the severity scale, `None` for `Unavailable`.
    pub fn severity(&self) -> Option<u8> {
        match self {
            StatusTier::Unavailable => None,
            StatusTier::Low => Some(0),
            StatusTier::Normal => Some(1),
            StatusTier::Elevated => Some(2),
            StatusTier::High => Some(3),
        }
    }
}

impl fmt::Display for StatusTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StatusTier::Unavailable => "Unavailable",
            StatusTier::Low => "Low",
            StatusTier::Normal => "Normal",
            StatusTier::Elevated => "Elevated",
            StatusTier::High => "High",
        };
        write!(f, "{}", text)
    }
}

/// Marker colour handed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorTag {
    Grey,
    Blue,
    Green,
    Orange,
    Red,
}

impl ColorTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorTag::Grey => "grey",
            ColorTag::Blue => "blue",
            ColorTag::Green => "green",
            ColorTag::Orange => "orange",
            ColorTag::Red => "red",
        }
    }
}

// ---------------------------------------------------------------------------
// Threshold tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThresholdError {
    #[error("threshold bound must be finite, got {0}")]
    NonFiniteBound(f64),
    #[error("'unavailable' cannot be assigned by a threshold")]
    UnavailableTier,
    #[error("tier {tier} at bound {bound} breaks severity ordering")]
    NonMonotonic { bound: f64, tier: StatusTier },
}

/// One bound in a table. Whether it is an upper or lower bound depends on
/// which list of the table it sits in.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRule {
    pub bound: f64,
    pub tier: StatusTier,
    pub color: ColorTag,
    pub description: Option<String>,
}

/// Tier and colour used when no rule matches.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultBand {
    pub tier: StatusTier,
    pub color: ColorTag,
    pub description: Option<String>,
}

impl Default for DefaultBand {
    fn default() -> Self {
        Self {
            tier: StatusTier::Normal,
            color: ColorTag::Green,
            description: None,
        }
    }
}

/// Result of classifying one value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub tier: StatusTier,
    pub color: ColorTag,
    pub description: String,
}

impl Classification {
    fn unavailable() -> Self {
        Self {
            tier: StatusTier::Unavailable,
            color: ColorTag::Grey,
            description: StatusTier::Unavailable.to_string(),
        }
    }

    fn from_parts(tier: StatusTier, color: ColorTag, description: Option<&String>) -> Self {
        Self {
            tier,
            color,
            description: description.cloned().unwrap_or_else(|| tier.to_string()),
        }
    }
}

/// Ordered thresholds for one measurement (or one site under it).
///
/// `above` rules are kept highest bound first and match on `value > bound`;
/// `below` rules are kept lowest bound first and match on `value < bound`.
/// Above rules win over below rules, and the default applies when neither
/// matches.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdTable {
    above: Vec<ThresholdRule>,
    below: Vec<ThresholdRule>,
    default: DefaultBand,
}

impl ThresholdTable {
    /// Builds a table, sorting the rules and rejecting any layout in which a
    /// larger value could land in a less severe tier.
    pub fn new(
        mut above: Vec<ThresholdRule>,
        mut below: Vec<ThresholdRule>,
        default: DefaultBand,
    ) -> Result<Self, ThresholdError> {
        for rule in above.iter().chain(below.iter()) {
            if !rule.bound.is_finite() {
                return Err(ThresholdError::NonFiniteBound(rule.bound));
            }
            if rule.tier == StatusTier::Unavailable {
                return Err(ThresholdError::UnavailableTier);
            }
        }
        if default.tier == StatusTier::Unavailable {
            return Err(ThresholdError::UnavailableTier);
        }

        above.sort_by(|a, b| b.bound.total_cmp(&a.bound));
        below.sort_by(|a, b| a.bound.total_cmp(&b.bound));

        // Walking above rules downwards, severity may only fall, and never
        // beneath the default.
        for pair in above.windows(2) {
            if pair[1].tier > pair[0].tier {
                return Err(ThresholdError::NonMonotonic {
                    bound: pair[1].bound,
                    tier: pair[1].tier,
                });
            }
        }
        if let Some(rule) = above.iter().find(|r| r.tier < default.tier) {
            return Err(ThresholdError::NonMonotonic {
                bound: rule.bound,
                tier: rule.tier,
            });
        }

        // Walking below rules upwards, severity may only rise, and never
        // above the default.
        for pair in below.windows(2) {
            if pair[1].tier < pair[0].tier {
                return Err(ThresholdError::NonMonotonic {
                    bound: pair[1].bound,
                    tier: pair[1].tier,
                });
            }
        }
        if let Some(rule) = below.iter().find(|r| r.tier > default.tier) {
            return Err(ThresholdError::NonMonotonic {
                bound: rule.bound,
                tier: rule.tier,
            });
        }

        Ok(Self {
            above,
            below,
            default,
        })
    }

    /// Classifies a value. `None` and NaN are always unavailable.
    pub fn classify(&self, value: Option<f64>) -> Classification {
        let value = match value {
            Some(v) if !v.is_nan() => v,
            _ => return Classification::unavailable(),
        };

        if let Some(rule) = self.above.iter().find(|r| value > r.bound) {
            return Classification::from_parts(rule.tier, rule.color, rule.description.as_ref());
        }
        if let Some(rule) = self.below.iter().find(|r| value < r.bound) {
            return Classification::from_parts(rule.tier, rule.color, rule.description.as_ref());
        }
        Classification::from_parts(
            self.default.tier,
            self.default.color,
            self.default.description.as_ref(),
        )
    }

    /// The highest `above` bound, e.g. a gauge's mean annual flood.
    pub fn top_bound(&self) -> Option<f64> {
        self.above.first().map(|r| r.bound)
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            above: Vec::new(),
            below: Vec::new(),
            default: DefaultBand::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Threshold tables keyed by measurement label and optional site.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    tables: HashMap<SelectionKey, ThresholdTable>,
    fallback: ThresholdTable,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the table for a key.
    pub fn insert(&mut self, key: SelectionKey, table: ThresholdTable) {
        self.tables.insert(key, table);
    }

    /// Builds the classifier from `[[threshold]]` configuration sections.
    pub fn from_config(sections: &[ThresholdConfig]) -> Result<Self, ThresholdError> {
        let mut classifier = Self::new();
        for section in sections {
            let (table, key) = section.to_table()?;
            classifier.insert(key, table);
        }
        Ok(classifier)
    }

    /// Site table first, then the measurement-wide table.
    pub fn table_for(&self, key: &SelectionKey) -> Option<&ThresholdTable> {
        self.tables
            .get(key)
            .or_else(|| self.tables.get(&key.generic()))
    }

    pub fn classify(&self, key: &SelectionKey, value: Option<f64>) -> Classification {
        self.table_for(key)
            .unwrap_or(&self.fallback)
            .classify(value)
    }

    /// Top bound of the table that applies to `key`.
    pub fn reference_bound(&self, key: &SelectionKey) -> Option<f64> {
        self.table_for(key).and_then(|t| t.top_bound())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
