//! Core data types for the warehouse pipeline
//! Pure data structures with no behavior

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Source extracts feeding the batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Source {
    Listings,
    Calendar,
    Tourism,
    Weather,
    /// Optional pre-aggregated listing months
    Monthly,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Listings => write!(f, "listings"),
            Source::Calendar => write!(f, "calendar"),
            Source::Tourism => write!(f, "tourism"),
            Source::Weather => write!(f, "weather"),
            Source::Monthly => write!(f, "monthly"),
        }
    }
}

/// Raw tabular extract as delivered by a reader - every cell kept as text
#[derive(Debug, Clone)]
pub struct RawExtract {
    pub source: Source,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawExtract {
    pub fn new(source: Source, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        RawExtract {
            source,
            headers,
            rows,
        }
    }

    /// Convenience constructor used by tests and in-memory callers
    pub fn from_rows(source: Source, headers: &[&str], rows: &[&[&str]]) -> Self {
        RawExtract {
            source,
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }
}

/// Typed rows plus the number of fields that could not be parsed
#[derive(Debug)]
pub struct Parsed<T> {
    pub rows: Vec<T>,
    pub malformed: usize,
}

/// Listing record - natural keys already normalized
#[derive(Debug, Clone, Default)]
pub struct ListingRecord {
    pub listing_id: Option<i64>,
    pub listing_name: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub listing_type: Option<String>,
    pub room_type: Option<String>,
    pub currency: Option<String>,
    pub guest_count: Option<i32>,
    pub bedroom_count: Option<i32>,
    pub cancellation_policy: Option<String>,
    pub rating_overall: Option<f64>,
    pub ttm_revenue: Option<f64>,
    pub ttm_avg_rate: Option<f64>,
}

/// One calendar day for one listing
#[derive(Debug, Clone, Default)]
pub struct CalendarDay {
    pub listing_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub available: Option<bool>,
    pub price: Option<f64>,
    pub country: Option<String>,
}

/// One pre-aggregated listing month; any measure may be absent
#[derive(Debug, Clone, Default)]
pub struct MonthlyRecord {
    pub listing_id: Option<i64>,
    pub period: Option<YearMonth>,
    pub country: Option<String>,
    pub vacant_days: Option<u32>,
    pub reserved_days: Option<u32>,
    pub avg_length_of_stay: Option<f64>,
    pub occupancy: Option<f64>,
    pub rate_avg: Option<f64>,
    pub native_revenue: Option<f64>,
}

/// Country-level yearly tourism statistics
#[derive(Debug, Clone, Default)]
pub struct TourismRecord {
    pub country: Option<String>,
    pub year: Option<i32>,
    pub total_arrivals: Option<f64>,
    pub total_departures: Option<f64>,
    pub tourism_expenditure: Option<f64>,
    pub arrivals_personal: Option<f64>,
    pub arrivals_business: Option<f64>,
}

/// Country/month climate normals
#[derive(Debug, Clone, Default)]
pub struct WeatherRecord {
    pub country: Option<String>,
    pub month: Option<u32>,
    pub min_temp: Option<f64>,
    pub mean_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub precipitation: Option<f64>,
    pub hours_of_sunshine: Option<f64>,
}

/// Calendar month - the grain of the date dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl std::fmt::Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryRow {
    pub country_id: i32,
    pub country_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityRow {
    pub city_id: i32,
    pub city_name: String,
    pub country_id: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrencyRow {
    pub currency_id: i32,
    pub currency_code: String,
    pub conversion_rate_to_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomTypeRow {
    pub room_type_id: i32,
    pub room_type_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingTypeRow {
    pub listing_type_id: i32,
    pub listing_type_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateRow {
    pub date_id: i32,
    pub date_actual: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub month_name: String,
    pub quarter: u32,
}

/// Listing dimension row, keyed by the source listing id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingRow {
    pub listing_id: i64,
    pub listing_name: Option<String>,
    pub city_id: i32,
    pub listing_type_id: Option<i32>,
    pub room_type_id: Option<i32>,
    pub currency_id: Option<i32>,
    pub guest_count: Option<i32>,
    pub bedroom_count: Option<i32>,
    pub cancellation_policy: Option<String>,
    pub rating_overall: Option<f64>,
    pub ttm_revenue: Option<f64>,
    pub ttm_avg_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherNormalRow {
    pub country_id: i32,
    pub month: u32,
    pub min_temp: Option<f64>,
    pub mean_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub precipitation: Option<f64>,
    pub hours_of_sunshine: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TourismRow {
    pub country_id: i32,
    pub year: i32,
    pub total_arrivals: Option<f64>,
    pub total_departures: Option<f64>,
    pub tourism_expenditure: Option<f64>,
    pub arrivals_personal: Option<f64>,
    pub arrivals_business: Option<f64>,
}

/// Monthly listing fact - one row per (listing, year, month)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyAirbnbRow {
    pub listing_id: i64,
    pub date_id: i32,
    pub country_id: i32,
    pub year: i32,
    pub month: u32,
    pub vacant_days: u32,
    pub reserved_days: u32,
    pub avg_length_of_stay: Option<f64>,
    pub occupancy: f64,
    pub rate_avg: Option<f64>,
    pub native_revenue: Option<f64>,
}

/// Every conformed table produced by one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Warehouse {
    pub countries: Vec<CountryRow>,
    pub cities: Vec<CityRow>,
    pub currencies: Vec<CurrencyRow>,
    pub room_types: Vec<RoomTypeRow>,
    pub listing_types: Vec<ListingTypeRow>,
    pub dates: Vec<DateRow>,
    pub listings: Vec<ListingRow>,
    pub weather_normals: Vec<WeatherNormalRow>,
    pub tourism: Vec<TourismRow>,
    pub monthly_airbnb: Vec<MonthlyAirbnbRow>,
}

/// Maximum number of offending keys kept per unmatched report
pub const UNMATCHED_SAMPLE_SIZE: usize = 10;

/// Rows excluded because a required natural key had no dimension match
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnmatchedReport {
    pub count: usize,
    pub sample: Vec<String>,
}

impl UnmatchedReport {
    pub fn record(&mut self, key: impl std::fmt::Display) {
        self.count += 1;
        let key = key.to_string();
        if self.sample.len() < UNMATCHED_SAMPLE_SIZE && !self.sample.contains(&key) {
            self.sample.push(key);
        }
    }

    pub fn merge(&mut self, other: UnmatchedReport) {
        self.count += other.count;
        for key in other.sample {
            if self.sample.len() < UNMATCHED_SAMPLE_SIZE && !self.sample.contains(&key) {
                self.sample.push(key);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Everything the batch counted instead of failing on
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    /// Fields that failed to parse, per source
    pub malformed: BTreeMap<Source, usize>,
    /// Empty natural keys left out of each dimension
    pub unresolved: BTreeMap<&'static str, usize>,
    /// Rows excluded from each output table for an unmatched required key
    pub unmatched: BTreeMap<&'static str, UnmatchedReport>,
    /// Repeated grain keys folded into an earlier row, per output table
    pub duplicates: BTreeMap<&'static str, usize>,
    /// Rows dropped before reaching the fact grain (no date, no availability measure)
    pub skipped: BTreeMap<&'static str, usize>,
}

impl RunReport {
    pub fn add_malformed(&mut self, source: Source, count: usize) {
        if count > 0 {
            *self.malformed.entry(source).or_default() += count;
        }
    }

    pub fn add_unresolved(&mut self, dimension: &'static str, count: usize) {
        if count > 0 {
            *self.unresolved.entry(dimension).or_default() += count;
        }
    }

    pub fn add_unmatched(&mut self, table: &'static str, report: UnmatchedReport) {
        if !report.is_empty() {
            self.unmatched.entry(table).or_default().merge(report);
        }
    }

    pub fn add_duplicates(&mut self, table: &'static str, count: usize) {
        if count > 0 {
            *self.duplicates.entry(table).or_default() += count;
        }
    }

    pub fn add_skipped(&mut self, table: &'static str, count: usize) {
        if count > 0 {
            *self.skipped.entry(table).or_default() += count;
        }
    }

    pub fn unmatched_count(&self, table: &str) -> usize {
        self.unmatched.get(table).map(|r| r.count).unwrap_or(0)
    }

    pub fn is_clean(&self) -> bool {
        self.malformed.is_empty()
            && self.unresolved.is_empty()
            && self.unmatched.is_empty()
            && self.duplicates.is_empty()
            && self.skipped.is_empty()
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_clean() {
            return write!(f, "no defects");
        }
        let mut parts = Vec::new();
        for (source, count) in &self.malformed {
            parts.push(format!("{} malformed fields in {}", count, source));
        }
        for (dimension, count) in &self.unresolved {
            parts.push(format!("{} empty {} keys", count, dimension));
        }
        for (table, report) in &self.unmatched {
            parts.push(format!(
                "{} rows excluded from {} (e.g. {})",
                report.count,
                table,
                report.sample.join(", ")
            ));
        }
        for (table, count) in &self.duplicates {
            parts.push(format!("{} duplicate rows folded in {}", count, table));
        }
        for (table, count) in &self.skipped {
            parts.push(format!("{} rows skipped for {}", count, table));
        }
        write!(f, "{}", parts.join("; "))
    }
}

/// A single cell bound into the warehouse
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(Option<i32>),
    BigInt(Option<i64>),
    Float(Option<f64>),
    Text(Option<String>),
    Date(Option<NaiveDate>),
}

/// A named output table ready to persist
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<Value>>,
}

/// Load operation statistics
#[derive(Debug, Default, Clone)]
pub struct LoadStats {
    pub tables: Vec<(String, u64)>,
}

impl LoadStats {
    pub fn rows_inserted(&self) -> u64 {
        self.tables.iter().map(|(_, n)| n).sum()
    }
}

impl std::fmt::Display for LoadStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let per_table: Vec<String> = self
            .tables
            .iter()
            .map(|(name, n)| format!("{}: {}", name, n))
            .collect();
        write!(
            f,
            "{} rows in {} tables ({})",
            self.rows_inserted(),
            self.tables.len(),
            per_table.join(", ")
        )
    }
}
