//! CSV storage for price records
//!
//! Lets a run work offline from a previously fetched history.

use crate::api::PriceRecord;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Column order of the CSV files
pub const CSV_HEADER: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to open {path}: {source}")]
    Open { path: PathBuf, source: csv::Error },

    #[error("{path}: bad record: {source}")]
    Record { path: PathBuf, source: csv::Error },

    #[error("Failed to write records: {0}")]
    Write(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Loads records from a CSV file (`timestamp,open,high,low,close,volume`)
///
/// Records are returned oldest first regardless of the file order.
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<PriceRecord>, StorageError> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| StorageError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    let mut records = reader
        .deserialize::<PriceRecord>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| StorageError::Record {
            path: path.to_path_buf(),
            source,
        })?;

    records.sort_by_key(|r| r.timestamp);
    log::info!("Loaded {} records from {}", records.len(), path.display());

    Ok(records)
}

/// Saves records to a CSV file
pub fn save_records<P: AsRef<Path>>(records: &[PriceRecord], path: P) -> Result<(), StorageError> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path).map_err(|source| StorageError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    for record in records {
        writer.serialize(record)?;
    }

    writer.flush()?;
    log::info!("Saved {} records to {}", records.len(), path.display());
    Ok(())
}
