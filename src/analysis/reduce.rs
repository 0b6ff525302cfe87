/// Reductions over normalized readings.
///
/// Two numeric rules apply everywhere in this module:
/// - cumulative quantities (rainfall) sum, and an empty or all-null window
///   sums to 0.0 because no recorded rain is a real zero;
/// - instantaneous quantities (flow, stage, temperature) take the latest
///   non-null value, and an empty window is `None` because a missing flow
///   reading is unknown, not zero.

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;
use std::collections::HashMap;

use crate::model::Reading;

// ---------------------------------------------------------------------------
// Latest values
// ---------------------------------------------------------------------------

/// The most recent non-null value seen for a site.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatestValue {
    pub timestamp: NaiveDateTime,
    pub value: f64,
}

/// Chronologically last non-null reading per site.
///
/// Readings with equal timestamps are resolved in input order: the later
/// one wins, which matches the provider's response order.
pub fn latest_per_site(readings: &[Reading]) -> HashMap<String, LatestValue> {
    let mut latest: HashMap<String, LatestValue> = HashMap::new();

    for reading in readings {
        let Some(value) = reading.value else { continue };
        let candidate = LatestValue {
            timestamp: reading.timestamp,
            value,
        };
        latest
            .entry(reading.site.clone())
            .and_modify(|current| {
                if candidate.timestamp >= current.timestamp {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }

    latest
}

/// Last non-null reading in a window, with the same tie-break as
/// `latest_per_site`.
pub fn latest_value(readings: &[Reading]) -> Option<LatestValue> {
    readings
        .iter()
        .filter_map(|r| {
            r.value.map(|value| LatestValue {
                timestamp: r.timestamp,
                value,
            })
        })
        .fold(None, |acc: Option<LatestValue>, candidate| match acc {
            Some(current) if candidate.timestamp < current.timestamp => Some(current),
            _ => Some(candidate),
        })
}

/// Sum of all non-null readings; 0.0 for an empty window.
pub fn window_total(readings: &[Reading]) -> f64 {
    readings.iter().filter_map(|r| r.value).sum()
}

/// The single value shown for a window: the total for cumulative
/// measurements, the latest value otherwise.
pub fn window_value(readings: &[Reading], cumulative: bool) -> Option<f64> {
    if cumulative {
        Some(window_total(readings))
    } else {
        latest_value(readings).map(|l| l.value)
    }
}

// ---------------------------------------------------------------------------
// Resampling
// ---------------------------------------------------------------------------

/// Resampling bin width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bin {
    Hour,
    Day,
}

impl Bin {
    /// Start of the bin containing `ts`.
    pub fn floor(&self, ts: NaiveDateTime) -> NaiveDateTime {
        let midnight = NaiveDateTime::new(ts.date(), NaiveTime::MIN);
        match self {
            Bin::Hour => midnight + Duration::hours(i64::from(ts.hour())),
            Bin::Day => midnight,
        }
    }

    pub fn width(&self) -> Duration {
        match self {
            Bin::Hour => Duration::hours(1),
            Bin::Day => Duration::days(1),
        }
    }
}

/// One resampled bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BinTotal {
    pub start: NaiveDateTime,
    pub total: f64,
}

/// Sums readings into contiguous bins covering `[start, end]`.
///
/// Bins run from the bin containing `start` to the bin containing `end`,
/// every one present. Bins with no readings (or only nulls) are 0.0.
/// Readings outside the window are ignored.
pub fn resample(
    readings: &[Reading],
    bin: Bin,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Vec<BinTotal> {
    if end < start {
        return Vec::new();
    }

    let first = bin.floor(start);
    let last = bin.floor(end);

    let mut bins = Vec::new();
    let mut index: HashMap<NaiveDateTime, usize> = HashMap::new();
    let mut cursor = first;
    while cursor <= last {
        index.insert(cursor, bins.len());
        bins.push(BinTotal {
            start: cursor,
            total: 0.0,
        });
        // The last representable bin has no successor.
        match cursor.checked_add_signed(bin.width()) {
            Some(next) => cursor = next,
            None => break,
        }
    }

    for reading in readings {
        if reading.timestamp < start || reading.timestamp > end {
            continue;
        }
        let Some(value) = reading.value else { continue };
        if let Some(&i) = index.get(&bin.floor(reading.timestamp)) {
            bins[i].total += value;
        }
    }

    bins
}

/// Sum over resampled bins.
pub fn bins_total(bins: &[BinTotal]) -> f64 {
    bins.iter().map(|b| b.total).sum()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
