// Library module for testable functions

pub mod warehouse;

use chrono::NaiveDate;

/// Number of days in a calendar month, leap years included.
/// Returns None for an invalid month.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some(next.signed_duration_since(first).num_days() as u32)
}

/// Calculate occupancy percentage
/// Formula: (reserved_days / days_in_month) × 100, clamped to [0, 100]
pub fn occupancy_pct(reserved_days: u32, days_in_month: u32) -> Option<f64> {
    if days_in_month == 0 {
        return None;
    }
    let pct = reserved_days as f64 / days_in_month as f64 * 100.0;
    Some(pct.clamp(0.0, 100.0))
}
