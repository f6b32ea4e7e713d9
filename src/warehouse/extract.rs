//! Extract functions - read raw source files into text tables

use crate::warehouse::error::{EtlError, Result};
use crate::warehouse::transform::Extracts;
use crate::warehouse::types::{RawExtract, Source};
use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;
use tracing::info;

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "ods"];

/// Read one extract, dispatching on file extension (CSV unless it is a workbook)
pub fn read_extract(path: &Path, source: Source) -> Result<RawExtract> {
    if !path.is_file() {
        return Err(EtlError::Extract {
            path: path.to_path_buf(),
            reason: "file not found".to_string(),
        });
    }

    let is_workbook = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| WORKBOOK_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false);

    let extract = if is_workbook {
        read_workbook(path, source)?
    } else {
        read_csv(path, source)?
    };

    info!(
        "Read {} extract from {:?}: {} rows, {} columns",
        source,
        path,
        extract.rows.len(),
        extract.headers.len()
    );

    Ok(extract)
}

/// Read the extracts of a batch; the pre-aggregated monthly extract is optional
pub fn read_extracts(
    listings: &Path,
    calendar: &Path,
    tourism: &Path,
    weather: &Path,
    monthly: Option<&Path>,
) -> Result<Extracts> {
    let monthly = match monthly {
        Some(path) => Some(read_extract(path, Source::Monthly)?),
        None => None,
    };

    Ok(Extracts {
        listings: read_extract(listings, Source::Listings)?,
        calendar: read_extract(calendar, Source::Calendar)?,
        tourism: read_extract(tourism, Source::Tourism)?,
        weather: read_extract(weather, Source::Weather)?,
        monthly,
    })
}

fn read_csv(path: &Path, source: Source) -> Result<RawExtract> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(RawExtract::new(source, headers, rows))
}

/// First sheet of a workbook, first row as header
fn read_workbook(path: &Path, source: Source) -> Result<RawExtract> {
    let mut workbook = open_workbook_auto(path)?;

    let sheet_names = workbook.sheet_names();
    let Some(sheet_name) = sheet_names.first() else {
        return Err(EtlError::Extract {
            path: path.to_path_buf(),
            reason: "no sheets found in workbook".to_string(),
        });
    };
    info!("Reading sheet: {}", sheet_name);

    let range = workbook.worksheet_range(sheet_name)?;
    let mut rows = range.rows();

    let headers = match rows.next() {
        Some(header) => header.iter().map(cell_text).collect(),
        None => Vec::new(),
    };
    let rows = rows
        .map(|row| row.iter().map(cell_text).collect())
        .collect();

    Ok(RawExtract::new(source, headers, rows))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{:.0}", f),
        other => other.to_string(),
    }
}
