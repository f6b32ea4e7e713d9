//! Parse functions - turn bound raw extracts into typed records
//!
//! Natural keys are normalized here, once, for every source. A field that is present
//! but unparseable is read as missing and counted as malformed.

use crate::warehouse::error::Result;
use crate::warehouse::mapping::{bind, BoundColumns};
use crate::warehouse::normalize::{currency_code, free_text, place_name, type_name};
use crate::warehouse::types::{
    CalendarDay, ListingRecord, MonthlyRecord, Parsed, RawExtract, TourismRecord, WeatherRecord,
    YearMonth,
};
use chrono::{Datelike, NaiveDate};
use tracing::{info, warn};

/// Cell markers that mean "no value" rather than a malformed value
const MISSING_MARKERS: &[&str] = &["", "na", "n/a", "nan", "null", "none", "-", ".."];

fn is_missing(raw: &str) -> bool {
    let t = raw.trim().to_lowercase();
    MISSING_MARKERS.contains(&t.as_str())
}

/// Parse a float, tolerating currency symbols, thousands separators and a trailing '%'
pub fn parse_number(raw: &str) -> Option<f64> {
    let clean: String = raw
        .trim()
        .trim_start_matches('$')
        .trim_end_matches('%')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    clean.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse an integral value, accepting "3" as well as "3.0"
pub fn parse_integer(raw: &str) -> Option<i64> {
    let clean: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if let Ok(v) = clean.parse::<i64>() {
        return Some(v);
    }
    let f = clean.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Parse a calendar date in any of the formats the sources use
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y/%m/%d"))
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| excel_serial_date(raw))
}

/// Years a workbook serial may land in; anything else is a bare number, not a date
const SERIAL_DATE_YEARS: std::ops::RangeInclusive<i32> = 1950..=2100;

/// Workbook cells store dates as day counts from 1899-12-30
fn excel_serial_date(raw: &str) -> Option<NaiveDate> {
    let serial = raw.parse::<f64>().ok()?;
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?
        .checked_add_days(chrono::Days::new(serial.trunc() as u64))
        .filter(|d| SERIAL_DATE_YEARS.contains(&d.year()))
}

/// Parse a calendar month: `YYYY-MM`, `YYYY/MM`, or any full date inside the month
pub fn parse_period(raw: &str) -> Option<YearMonth> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}/01", raw), "%Y/%m/%d"))
        .ok()
        .or_else(|| parse_date(raw))
        .map(|d| YearMonth {
            year: d.year(),
            month: d.month(),
        })
}

/// Parse an availability flag
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "t" | "true" | "1" | "yes" | "y" => Some(true),
        "f" | "false" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// English month name for 1..=12
pub fn month_name(month: u32) -> Option<String> {
    let name = MONTH_NAMES.get(month.checked_sub(1)? as usize)?;
    let mut chars = name.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
}

/// Parse a month given as a number, a full name, or a three-letter abbreviation
pub fn parse_month(raw: &str) -> Option<u32> {
    if let Some(n) = parse_integer(raw) {
        return u32::try_from(n).ok().filter(|m| (1..=12).contains(m));
    }
    let lower = raw.trim().to_lowercase();
    MONTH_NAMES
        .iter()
        .position(|name| *name == lower || (lower.len() == 3 && name.starts_with(&lower)))
        .map(|i| i as u32 + 1)
}

/// Field reader for one row that counts malformed values as it goes
struct RowReader<'a> {
    bound: &'a BoundColumns,
    row: &'a [String],
    malformed: usize,
}

impl<'a> RowReader<'a> {
    fn new(bound: &'a BoundColumns, row: &'a [String]) -> Self {
        RowReader {
            bound,
            row,
            malformed: 0,
        }
    }

    fn raw(&self, field: &str) -> Option<&'a str> {
        self.bound.get(self.row, field).filter(|s| !is_missing(s))
    }

    fn typed<T>(&mut self, field: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let raw = self.raw(field)?;
        let value = parse(raw);
        if value.is_none() {
            self.malformed += 1;
        }
        value
    }

    fn text(&self, field: &str, normalize: fn(&str) -> Option<String>) -> Option<String> {
        self.raw(field).and_then(normalize)
    }

    fn float(&mut self, field: &str) -> Option<f64> {
        self.typed(field, parse_number)
    }

    fn count(&mut self, field: &str) -> Option<i32> {
        self.typed(field, |s| parse_integer(s).and_then(|v| i32::try_from(v).ok()))
    }

    fn days(&mut self, field: &str) -> Option<u32> {
        self.typed(field, |s| parse_integer(s).and_then(|v| u32::try_from(v).ok()))
    }

    /// Non-negative measure; a negative value is malformed
    fn measure(&mut self, field: &str) -> Option<f64> {
        self.typed(field, |s| parse_number(s).filter(|v| *v >= 0.0))
    }
}

/// Shared row loop: bind, read every row, log the first few defects
fn parse_rows<T>(
    extract: &RawExtract,
    read: impl Fn(&mut RowReader) -> T,
) -> Result<Parsed<T>> {
    let bound = bind(extract)?;
    let mut rows = Vec::with_capacity(extract.rows.len());
    let mut malformed = 0;

    for (idx, raw_row) in extract.rows.iter().enumerate() {
        let mut reader = RowReader::new(&bound, raw_row);
        rows.push(read(&mut reader));

        if reader.malformed > 0 {
            malformed += reader.malformed;
            if malformed <= 10 {
                // Only log the first 10 defects
                warn!(
                    "Row {} of {} extract has {} malformed field(s)",
                    idx + 1,
                    extract.source,
                    reader.malformed
                );
            }
        }
    }

    info!(
        "Parsed {} {} rows ({} malformed fields)",
        rows.len(),
        extract.source,
        malformed
    );

    Ok(Parsed { rows, malformed })
}

/// Parse the listings extract
pub fn parse_listings(extract: &RawExtract) -> Result<Parsed<ListingRecord>> {
    parse_rows(extract, |r| ListingRecord {
        listing_id: r.typed("listing_id", parse_integer),
        listing_name: r.text("listing_name", free_text),
        city: r.text("city", place_name),
        country: r.text("country", place_name),
        listing_type: r.text("listing_type", type_name),
        room_type: r.text("room_type", type_name),
        currency: r.text("currency", currency_code),
        guest_count: r.count("guests"),
        bedroom_count: r.count("bedrooms"),
        cancellation_policy: r.text("cancellation_policy", free_text),
        rating_overall: r.float("rating_overall"),
        ttm_revenue: r.float("ttm_revenue"),
        ttm_avg_rate: r.float("ttm_avg_rate"),
    })
}

/// Parse the daily calendar extract
pub fn parse_calendar(extract: &RawExtract) -> Result<Parsed<CalendarDay>> {
    parse_rows(extract, |r| CalendarDay {
        listing_id: r.typed("listing_id", parse_integer),
        date: r.typed("date", parse_date),
        available: r.typed("available", parse_flag),
        price: r.float("price"),
        country: r.text("country", place_name),
    })
}

/// Parse the country tourism extract
pub fn parse_tourism(extract: &RawExtract) -> Result<Parsed<TourismRecord>> {
    parse_rows(extract, |r| TourismRecord {
        country: r.text("country", place_name),
        year: r.typed("year", |s| {
            parse_integer(s).and_then(|v| i32::try_from(v).ok())
        }),
        total_arrivals: r.float("total_arrivals"),
        total_departures: r.float("total_departures"),
        tourism_expenditure: r.float("tourism_expenditure"),
        arrivals_personal: r.float("arrivals_personal"),
        arrivals_business: r.float("arrivals_business"),
    })
}

/// Parse the climate normals extract
pub fn parse_weather(extract: &RawExtract) -> Result<Parsed<WeatherRecord>> {
    parse_rows(extract, |r| WeatherRecord {
        country: r.text("country", place_name),
        month: r.typed("month", parse_month),
        min_temp: r.float("min_temp"),
        mean_temp: r.float("mean_temp"),
        max_temp: r.float("max_temp"),
        precipitation: r.float("precipitation"),
        hours_of_sunshine: r.float("hours_of_sunshine"),
    })
}

/// Parse the pre-aggregated monthly listing extract
pub fn parse_monthly(extract: &RawExtract) -> Result<Parsed<MonthlyRecord>> {
    parse_rows(extract, |r| MonthlyRecord {
        listing_id: r.typed("listing_id", parse_integer),
        period: r.typed("date", parse_period),
        country: r.text("country", place_name),
        vacant_days: r.days("vacant_days"),
        reserved_days: r.days("reserved_days"),
        avg_length_of_stay: r.measure("avg_length_of_stay"),
        occupancy: r.typed("occupancy", |s| {
            parse_number(s).filter(|v| (0.0..=100.0).contains(v))
        }),
        rate_avg: r.measure("rate_avg"),
        native_revenue: r.measure("native_revenue"),
    })
}
