//! Fact aggregation - daily calendar rows and pre-aggregated months into monthly
//! listing facts
//! Pure functions - no side effects

use crate::warehouse::types::{CalendarDay, MonthlyRecord, YearMonth};
use crate::{days_in_month, occupancy_pct};
use chrono::Datelike;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::debug;

/// Monthly measures for one listing, before dimension keys are attached
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyAggregate {
    pub listing_id: i64,
    pub period: YearMonth,
    pub days_in_month: u32,
    pub vacant_days: u32,
    pub reserved_days: u32,
    pub avg_length_of_stay: Option<f64>,
    pub occupancy: f64,
    pub rate_avg: Option<f64>,
    pub native_revenue: Option<f64>,
}

#[derive(Debug, Default)]
pub struct MonthlyAggregation {
    pub rows: Vec<MonthlyAggregate>,
    /// Repeated (listing, date) rows ignored after the first
    pub duplicates: usize,
    /// Rows without a listing id or date, or months without any availability measure
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy)]
struct DayEntry {
    available: Option<bool>,
    price: Option<f64>,
}

/// Group calendar days by (listing, year, month) and derive the monthly measures.
/// Output is ordered by listing id then month.
pub fn aggregate_monthly(calendar: &[CalendarDay]) -> MonthlyAggregation {
    let mut buckets: BTreeMap<(i64, YearMonth), BTreeMap<u32, DayEntry>> = BTreeMap::new();
    let mut duplicates = 0;
    let mut skipped = 0;

    for day in calendar {
        let (listing_id, date) = match (day.listing_id, day.date) {
            (Some(id), Some(date)) => (id, date),
            _ => {
                skipped += 1;
                continue;
            }
        };
        let period = YearMonth {
            year: date.year(),
            month: date.month(),
        };
        let entry = DayEntry {
            available: day.available,
            price: day.price,
        };

        match buckets.entry((listing_id, period)).or_default().entry(date.day()) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
            Entry::Occupied(_) => duplicates += 1,
        }
    }

    let rows: Vec<MonthlyAggregate> = buckets
        .into_iter()
        .filter_map(|((listing_id, period), days)| summarize(listing_id, period, &days))
        .collect();

    debug!(
        "Aggregated {} calendar rows into {} monthly facts ({} duplicates, {} skipped)",
        calendar.len(),
        rows.len(),
        duplicates,
        skipped
    );

    MonthlyAggregation {
        rows,
        duplicates,
        skipped,
    }
}

fn summarize(
    listing_id: i64,
    period: YearMonth,
    days: &BTreeMap<u32, DayEntry>,
) -> Option<MonthlyAggregate> {
    let total_days = days_in_month(period.year, period.month)?;

    let vacant_days = days.values().filter(|d| d.available == Some(true)).count() as u32;
    // Unobserved days and days with no availability flag count as reserved
    let reserved_days = total_days.saturating_sub(vacant_days);

    let prices: Vec<f64> = days.values().filter_map(|d| d.price).collect();
    let rate_avg = if prices.is_empty() {
        None
    } else {
        Some(prices.iter().sum::<f64>() / prices.len() as f64)
    };

    Some(MonthlyAggregate {
        listing_id,
        period,
        days_in_month: total_days,
        vacant_days,
        reserved_days,
        avg_length_of_stay: average_stay(days, total_days),
        occupancy: occupancy_pct(reserved_days, total_days).unwrap_or(0.0),
        rate_avg,
        native_revenue: rate_avg.map(|rate| rate * reserved_days as f64),
    })
}

/// Calendar-derived months plus pre-aggregated months, one row per (listing, month).
///
/// A calendar month wins over a record for the same key; the record only supplies a
/// stay length the calendar could not derive, and is counted as a duplicate.
pub fn aggregate_with_records(
    calendar: &[CalendarDay],
    records: &[MonthlyRecord],
) -> MonthlyAggregation {
    let mut aggregation = aggregate_monthly(calendar);
    if records.is_empty() {
        return aggregation;
    }

    let mut grain: BTreeMap<(i64, YearMonth), MonthlyAggregate> = aggregation
        .rows
        .drain(..)
        .map(|row| ((row.listing_id, row.period), row))
        .collect();

    for record in records {
        let Some(month) = aggregate_from_record(record) else {
            aggregation.skipped += 1;
            continue;
        };
        match grain.entry((month.listing_id, month.period)) {
            Entry::Vacant(slot) => {
                slot.insert(month);
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if existing.avg_length_of_stay.is_none() {
                    existing.avg_length_of_stay = month.avg_length_of_stay;
                }
                aggregation.duplicates += 1;
            }
        }
    }

    aggregation.rows = grain.into_values().collect();
    debug!(
        "Folded {} monthly records: {} monthly facts in total",
        records.len(),
        aggregation.rows.len()
    );
    aggregation
}

/// Bring a pre-aggregated month in line with the calendar invariants.
///
/// Reserved days come from vacant days, else reserved days, else occupancy, and are
/// clamped to the month. Occupancy is recomputed from them. Revenue falls back to
/// rate times reserved days. None without a key or any availability measure.
pub fn aggregate_from_record(record: &MonthlyRecord) -> Option<MonthlyAggregate> {
    let listing_id = record.listing_id?;
    let period = record.period?;
    let total_days = days_in_month(period.year, period.month)?;

    let reserved_days = match (record.vacant_days, record.reserved_days, record.occupancy) {
        (Some(vacant), _, _) => total_days.saturating_sub(vacant),
        (None, Some(reserved), _) => reserved.min(total_days),
        (None, None, Some(pct)) => {
            let days = (pct / 100.0 * total_days as f64).round().max(0.0) as u32;
            days.min(total_days)
        }
        (None, None, None) => return None,
    };

    Some(MonthlyAggregate {
        listing_id,
        period,
        days_in_month: total_days,
        vacant_days: total_days - reserved_days,
        reserved_days,
        avg_length_of_stay: record.avg_length_of_stay,
        occupancy: occupancy_pct(reserved_days, total_days).unwrap_or(0.0),
        rate_avg: record.rate_avg,
        native_revenue: record
            .native_revenue
            .or_else(|| record.rate_avg.map(|rate| rate * reserved_days as f64)),
    })
}

/// Mean length of consecutive reserved-day runs within the month.
///
/// Only known when every day of the month carries an availability flag; a gap would
/// make run boundaries guesswork. Runs are cut at the month boundaries.
fn average_stay(days: &BTreeMap<u32, DayEntry>, total_days: u32) -> Option<f64> {
    let mut runs = 0u32;
    let mut reserved = 0u32;
    let mut in_run = false;

    for day in 1..=total_days {
        let available = days.get(&day)?.available?;
        if available {
            in_run = false;
        } else {
            reserved += 1;
            if !in_run {
                runs += 1;
                in_run = true;
            }
        }
    }

    if runs == 0 {
        None
    } else {
        Some(reserved as f64 / runs as f64)
    }
}
