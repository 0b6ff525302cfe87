/// Column normalization.
///
/// The provider answers with one value column per requested measure and
/// sensor (`M1`, `M2`, ...). Everything downstream works on a single value
/// per (site, timestamp), picked row by row as the first non-null column
/// in preference order. Rainfall uses this to fill gauge gaps from the
/// SCADA feed.

use tracing::debug;

use crate::model::{DataTable, Reading};

/// First non-null value among `columns`, in the order given.
pub fn overlay(values: &[Option<f64>], columns: &[usize]) -> Option<f64> {
    columns
        .iter()
        .filter_map(|&i| values.get(i).copied().flatten())
        .next()
}

/// Resolves preferred column names against the table. Names the table
/// does not have are skipped; if none match, every column is used in
/// table order.
fn preferred_columns(table: &DataTable, preference: &[String]) -> Vec<usize> {
    let matched: Vec<usize> = preference
        .iter()
        .filter_map(|name| table.column_index(name))
        .collect();

    if matched.is_empty() {
        (0..table.columns.len()).collect()
    } else {
        matched
    }
}

/// Collapses a provider table to one reading per row.
///
/// Rows keep response order. Rows with no preferred value are kept as
/// gaps (`value: None`). Rows without a site name take `default_site`,
/// and are dropped when there is none.
pub fn normalize_table(
    table: &DataTable,
    preference: &[String],
    default_site: Option<&str>,
) -> Vec<Reading> {
    let columns = preferred_columns(table, preference);
    let mut dropped = 0usize;

    let readings: Vec<Reading> = table
        .rows
        .iter()
        .filter_map(|row| {
            let site = match (row.site.as_deref(), default_site) {
                (Some(site), _) => site,
                (None, Some(site)) => site,
                (None, None) => {
                    dropped += 1;
                    return None;
                }
            };
            Some(Reading {
                site: site.to_string(),
                timestamp: row.timestamp,
                value: overlay(&row.values, &columns),
            })
        })
        .collect();

    if dropped > 0 {
        debug!(dropped, "rows without a site name dropped during normalization");
    }
    readings
}
