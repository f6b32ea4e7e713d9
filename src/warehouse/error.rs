//! Error taxonomy for the warehouse batch
//!
//! Only conditions that abort the run live here. Malformed fields, unresolved keys and
//! duplicate grain rows are counted in the run report instead.

use crate::warehouse::types::Source;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EtlError {
    #[error("{dependency} not reachable after {attempts} attempts: {source}")]
    Unreachable {
        dependency: String,
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("{source_kind} extract is missing required field '{field}'")]
    MissingSourceField { source_kind: Source, field: String },

    #[error("failed to read extract {path:?}: {reason}")]
    Extract { path: PathBuf, reason: String },

    #[error("write to table '{table}' failed, batch rolled back: {source}")]
    Write {
        table: String,
        #[source]
        source: Box<EtlError>,
    },

    #[error("unknown table '{0}' in load batch")]
    UnknownTable(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("store error: {0}")]
    Memory(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Workbook(#[from] calamine::Error),
}

pub type Result<T> = std::result::Result<T, EtlError>;
