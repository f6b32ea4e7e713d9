//! Declared source-field mappings
//!
//! Each source has one table of canonical fields and the header aliases accepted for
//! them. Binding an extract validates the table against its headers up front, so a
//! missing required column fails the run before any transform work starts.

use crate::warehouse::error::{EtlError, Result};
use crate::warehouse::types::{RawExtract, Source};
use std::collections::HashMap;

/// One canonical field and the source headers that may carry it
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub canonical: &'static str,
    pub aliases: &'static [&'static str],
    pub required: bool,
}

const fn required(canonical: &'static str, aliases: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        canonical,
        aliases,
        required: true,
    }
}

const fn optional(canonical: &'static str, aliases: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        canonical,
        aliases,
        required: false,
    }
}

pub const LISTING_FIELDS: &[FieldSpec] = &[
    required("listing_id", &["listing_id", "id"]),
    optional("listing_name", &["listing_name", "name"]),
    required("city", &["city", "city_name"]),
    required("country", &["country", "country_name"]),
    optional("listing_type", &["listing_type", "property_type", "listing_type_name"]),
    optional("room_type", &["room_type", "room_type_name"]),
    optional("currency", &["currency", "currency_code"]),
    optional("guests", &["guests", "accommodates", "guest_count"]),
    optional("bedrooms", &["bedrooms", "bedroom_count"]),
    optional("cancellation_policy", &["cancellation_policy"]),
    optional("rating_overall", &["rating_overall", "review_scores_rating"]),
    optional("ttm_revenue", &["ttm_revenue"]),
    optional("ttm_avg_rate", &["ttm_avg_rate", "price"]),
];

pub const CALENDAR_FIELDS: &[FieldSpec] = &[
    required("listing_id", &["listing_id", "id"]),
    required("date", &["date", "calendar_date"]),
    required("available", &["available", "availability"]),
    optional("price", &["price", "rate", "nightly_rate"]),
    optional("country", &["country", "country_name"]),
];

pub const TOURISM_FIELDS: &[FieldSpec] = &[
    required("country", &["country", "country_name", "reporter"]),
    required("year", &["year", "period"]),
    optional("total_arrivals", &["total_arrivals", "arrivals", "inbound_arrivals"]),
    optional("total_departures", &["total_departures", "departures", "outbound_departures"]),
    optional(
        "tourism_expenditure",
        &["tourism_expenditure", "expenditure", "inbound_expenditure"],
    ),
    optional("arrivals_personal", &["arrivals_personal"]),
    optional("arrivals_business", &["arrivals_business"]),
];

pub const WEATHER_FIELDS: &[FieldSpec] = &[
    required("country", &["country", "country_name"]),
    required("month", &["month"]),
    optional("min_temp", &["min_temp", "minimum_temperature"]),
    optional("mean_temp", &["mean_temp", "temperature", "mean_temperature", "normals"]),
    optional("max_temp", &["max_temp", "maximum_temperature"]),
    optional("precipitation", &["precipitation", "precip"]),
    optional("hours_of_sunshine", &["hours_of_sunshine", "sunshine", "sunshine_hours"]),
];

pub const MONTHLY_FIELDS: &[FieldSpec] = &[
    required("listing_id", &["listing_id", "id"]),
    required("date", &["date", "month", "period"]),
    optional("country", &["country", "country_name"]),
    optional("vacant_days", &["vacant_days"]),
    optional("reserved_days", &["reserved_days"]),
    optional(
        "avg_length_of_stay",
        &["avg_length_of_stay", "length_of_stay_avg"],
    ),
    optional("occupancy", &["occupancy", "occupancy_rate"]),
    optional("rate_avg", &["rate_avg", "average_rate"]),
    optional("native_revenue", &["native_revenue", "revenue"]),
];

/// Field table for a source
pub fn fields_for(source: Source) -> &'static [FieldSpec] {
    match source {
        Source::Listings => LISTING_FIELDS,
        Source::Calendar => CALENDAR_FIELDS,
        Source::Tourism => TOURISM_FIELDS,
        Source::Weather => WEATHER_FIELDS,
        Source::Monthly => MONTHLY_FIELDS,
    }
}

/// Header comparison key: trimmed, lower-cased, spaces as underscores
fn header_key(header: &str) -> String {
    header
        .trim()
        .trim_start_matches('\u{feff}')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// Canonical field name -> column index in one extract
#[derive(Debug, Clone)]
pub struct BoundColumns {
    source: Source,
    index: HashMap<&'static str, usize>,
}

impl BoundColumns {
    /// Raw cell for a canonical field, None when the column is absent or the row short
    pub fn get<'a>(&self, row: &'a [String], canonical: &str) -> Option<&'a str> {
        self.index
            .get(canonical)
            .and_then(|&i| row.get(i))
            .map(|s| s.as_str())
    }

    pub fn has(&self, canonical: &str) -> bool {
        self.index.contains_key(canonical)
    }

    pub fn source(&self) -> Source {
        self.source
    }
}

/// Validate an extract against its declared mapping
pub fn bind(extract: &RawExtract) -> Result<BoundColumns> {
    let keys: Vec<String> = extract.headers.iter().map(|h| header_key(h)).collect();
    let mut index = HashMap::new();

    for field in fields_for(extract.source) {
        // Aliases are tried in declaration order so the canonical name wins over a fallback
        let position = field
            .aliases
            .iter()
            .find_map(|alias| keys.iter().position(|k| k == alias));

        match position {
            Some(i) => {
                index.insert(field.canonical, i);
            }
            None if field.required => {
                return Err(EtlError::MissingSourceField {
                    source_kind: extract.source,
                    field: field.canonical.to_string(),
                });
            }
            None => {}
        }
    }

    Ok(BoundColumns {
        source: extract.source,
        index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_with_aliases() {
        let extract = RawExtract::from_rows(
            Source::Listings,
            &["id", " Name ", "City_Name", "Country", "Property Type", "price"],
            &[&["1", "Loft", "Manila", "Philippines", "Condo", "55"]],
        );
        let bound = bind(&extract).unwrap();
        let row = &extract.rows[0];

        assert_eq!(bound.get(row, "listing_id"), Some("1"));
        assert_eq!(bound.get(row, "listing_name"), Some("Loft"));
        assert_eq!(bound.get(row, "city"), Some("Manila"));
        assert_eq!(bound.get(row, "listing_type"), Some("Condo"));
        assert_eq!(bound.get(row, "ttm_avg_rate"), Some("55"));
        assert!(!bound.has("currency"));
        assert_eq!(bound.get(row, "currency"), None);
    }

    #[test]
    fn test_bind_prefers_canonical_header() {
        let extract = RawExtract::from_rows(
            Source::Listings,
            &["id", "listing_id", "city", "country"],
            &[&["7", "42", "Cebu", "Philippines"]],
        );
        let bound = bind(&extract).unwrap();
        assert_eq!(bound.get(&extract.rows[0], "listing_id"), Some("42"));
    }

    #[test]
    fn test_bind_missing_required_fails_fast() {
        let extract = RawExtract::from_rows(
            Source::Calendar,
            &["listing_id", "date", "price"],
            &[],
        );
        let err = bind(&extract).unwrap_err();
        match err {
            EtlError::MissingSourceField { source_kind, field } => {
                assert_eq!(source_kind, Source::Calendar);
                assert_eq!(field, "available");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_short_row_reads_as_missing() {
        let extract = RawExtract::from_rows(
            Source::Weather,
            &["country", "month", "max_temp"],
            &[&["Japan", "1"]],
        );
        let bound = bind(&extract).unwrap();
        assert_eq!(bound.get(&extract.rows[0], "max_temp"), None);
    }
}
