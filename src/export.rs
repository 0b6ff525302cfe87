/// CSV export of multi-site datasets.
///
/// Layout is one reading per line, ordered by site then time:
///
/// ```text
/// DateTime,Value,Site,Measurement
/// 2025-07-10T10:00:00,12.402,Patea at Skinner Rd,River Flow (m³/s)
/// 2025-07-10T10:15:00,,Patea at Skinner Rd,River Flow (m³/s)
/// ```
///
/// A gap is an empty `Value` field. Files written here read back to the
/// same rows.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::engine::{Dataset, DatasetRow};

pub const CSV_HEADER: [&str; 4] = ["DateTime", "Value", "Site", "Measurement"];

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Download name for a label: spaces become underscores and `(`, `)`
/// and `/` are dropped.
pub fn export_filename(label: &str) -> String {
    let stem: String = label
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | '/'))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect();
    format!("{}_data.csv", stem)
}

pub fn write_dataset_csv<W: Write>(dataset: &Dataset, writer: W) -> Result<(), ExportError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    wtr.write_record(CSV_HEADER)?;
    for row in &dataset.rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_dataset_file(dataset: &Dataset, path: &Path) -> Result<(), ExportError> {
    let file = File::create(path)?;
    write_dataset_csv(dataset, file)
}

/// Reads rows written by `write_dataset_csv`.
pub fn read_dataset_csv<R: Read>(reader: R) -> Result<Vec<DatasetRow>, ExportError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let rows = rdr
        .deserialize::<DatasetRow>()
        .collect::<Result<Vec<_>, csv::Error>>()?;
    Ok(rows)
}
