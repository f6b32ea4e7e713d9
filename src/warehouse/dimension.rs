//! Dimension builders - de-duplicated natural keys with deterministic surrogate ids
//!
//! Keys are sorted before numbering, so identical input always yields identical ids
//! starting at 1. Empty keys never become rows; they are counted as unresolved.

use crate::warehouse::parse::month_name;
use crate::warehouse::types::{
    CalendarDay, CityRow, CountryRow, CurrencyRow, DateRow, ListingRecord, ListingTypeRow,
    MonthlyRecord, RoomTypeRow, TourismRecord, WeatherRecord, YearMonth,
};
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use tracing::debug;

/// Currency used when the listings extract carries no currency column
pub const DEFAULT_CURRENCY: &str = "USD";

/// Conversion rate used for any currency without a configured rate
pub const DEFAULT_RATE_TO_USD: f64 = 1.0;

/// A surrogate-keyed dimension over natural keys of type `K`
#[derive(Debug, Clone)]
pub struct Dimension<K> {
    name: &'static str,
    keys: Vec<K>,
    index: HashMap<K, i32>,
    unresolved: usize,
}

impl<K> Dimension<K>
where
    K: Ord + Hash + Clone,
{
    /// Build from natural keys, None standing for an empty key
    pub fn build(name: &'static str, values: impl IntoIterator<Item = Option<K>>) -> Self {
        let mut unresolved = 0;
        let mut distinct = BTreeSet::new();

        for value in values {
            match value {
                Some(key) => {
                    distinct.insert(key);
                }
                None => unresolved += 1,
            }
        }

        let keys: Vec<K> = distinct.into_iter().collect();
        let index = keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), i as i32 + 1))
            .collect();

        debug!(
            "Built {} dimension: {} rows, {} empty keys",
            name,
            keys.len(),
            unresolved
        );

        Dimension {
            name,
            keys,
            index,
            unresolved,
        }
    }

    pub fn id_of(&self, key: &K) -> Option<i32> {
        self.index.get(key).copied()
    }

    pub fn key_of(&self, id: i32) -> Option<&K> {
        usize::try_from(id - 1).ok().and_then(|i| self.keys.get(i))
    }

    /// Rows in surrogate-id order
    pub fn iter(&self) -> impl Iterator<Item = (i32, &K)> {
        self.keys.iter().enumerate().map(|(i, k)| (i as i32 + 1, k))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn unresolved(&self) -> usize {
        self.unresolved
    }
}

/// Natural key of a city: its name within a resolved country
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CityKey {
    pub name: String,
    pub country_id: i32,
}

impl std::fmt::Display for CityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (country {})", self.name, self.country_id)
    }
}

/// Country dimension from the union of every source's country mentions
pub fn build_countries(
    listings: &[ListingRecord],
    calendar: &[CalendarDay],
    monthly: &[MonthlyRecord],
    tourism: &[TourismRecord],
    weather: &[WeatherRecord],
) -> Dimension<String> {
    let mentions = listings
        .iter()
        .map(|l| l.country.clone())
        .chain(tourism.iter().map(|t| t.country.clone()))
        .chain(weather.iter().map(|w| w.country.clone()))
        // Calendar and monthly countries are optional columns; absent values are not empty keys
        .chain(calendar.iter().filter_map(|c| c.country.clone()).map(Some))
        .chain(monthly.iter().filter_map(|m| m.country.clone()).map(Some));
    Dimension::build("country", mentions)
}

/// City dimension from listings, each city scoped by its country's surrogate id
pub fn build_cities(
    listings: &[ListingRecord],
    countries: &Dimension<String>,
) -> Dimension<CityKey> {
    let keys = listings.iter().map(|l| {
        let country_id = l.country.as_ref().and_then(|c| countries.id_of(c))?;
        let name = l.city.clone()?;
        Some(CityKey { name, country_id })
    });
    Dimension::build("city", keys)
}

/// Currency dimension; a single default row when the source has no currency column
pub fn build_currencies(
    listings: &[ListingRecord],
    has_currency_column: bool,
) -> Dimension<String> {
    if has_currency_column {
        Dimension::build("currency", listings.iter().map(|l| l.currency.clone()))
    } else {
        Dimension::build("currency", [Some(DEFAULT_CURRENCY.to_string())])
    }
}

/// Room types; an extract without the column yields an empty dimension, not empty keys
pub fn build_room_types(listings: &[ListingRecord], has_column: bool) -> Dimension<String> {
    let keys = listings.iter().filter(|_| has_column).map(|l| l.room_type.clone());
    Dimension::build("room_type", keys)
}

pub fn build_listing_types(listings: &[ListingRecord], has_column: bool) -> Dimension<String> {
    let keys = listings
        .iter()
        .filter(|_| has_column)
        .map(|l| l.listing_type.clone());
    Dimension::build("listing_type", keys)
}

/// Date dimension at monthly grain: one row per distinct month in calendar days and
/// monthly records
pub fn build_dates(calendar: &[CalendarDay], monthly: &[MonthlyRecord]) -> Dimension<YearMonth> {
    let days = calendar.iter().map(|c| {
        c.date.map(|d| YearMonth {
            year: d.year(),
            month: d.month(),
        })
    });
    Dimension::build("date", days.chain(monthly.iter().map(|m| m.period)))
}

pub fn country_rows(countries: &Dimension<String>) -> Vec<CountryRow> {
    countries
        .iter()
        .map(|(id, name)| CountryRow {
            country_id: id,
            country_name: name.clone(),
        })
        .collect()
}

pub fn city_rows(cities: &Dimension<CityKey>) -> Vec<CityRow> {
    cities
        .iter()
        .map(|(id, key)| CityRow {
            city_id: id,
            city_name: key.name.clone(),
            country_id: key.country_id,
        })
        .collect()
}

pub fn currency_rows(
    currencies: &Dimension<String>,
    rates: &HashMap<String, f64>,
) -> Vec<CurrencyRow> {
    currencies
        .iter()
        .map(|(id, code)| CurrencyRow {
            currency_id: id,
            currency_code: code.clone(),
            conversion_rate_to_usd: rates.get(code).copied().unwrap_or(DEFAULT_RATE_TO_USD),
        })
        .collect()
}

pub fn room_type_rows(room_types: &Dimension<String>) -> Vec<RoomTypeRow> {
    room_types
        .iter()
        .map(|(id, name)| RoomTypeRow {
            room_type_id: id,
            room_type_name: name.clone(),
        })
        .collect()
}

pub fn listing_type_rows(listing_types: &Dimension<String>) -> Vec<ListingTypeRow> {
    listing_types
        .iter()
        .map(|(id, name)| ListingTypeRow {
            listing_type_id: id,
            listing_type_name: name.clone(),
        })
        .collect()
}

pub fn date_rows(dates: &Dimension<YearMonth>) -> Vec<DateRow> {
    dates
        .iter()
        .filter_map(|(id, ym)| {
            let first = NaiveDate::from_ymd_opt(ym.year, ym.month, 1)?;
            Some(DateRow {
                date_id: id,
                date_actual: first,
                year: ym.year,
                month: ym.month,
                day: 1,
                month_name: month_name(ym.month)?,
                quarter: (ym.month - 1) / 3 + 1,
            })
        })
        .collect()
}
