//! Transform - raw extracts into conformed dimension and fact tables
//!
//! Runs entirely in memory and is deterministic: the same extracts and options always
//! produce the same `Warehouse`, row for row.

use crate::warehouse::aggregate::aggregate_with_records;
use crate::warehouse::dimension::{
    build_cities, build_countries, build_currencies, build_dates, build_listing_types,
    build_room_types, city_rows, country_rows, currency_rows, date_rows, listing_type_rows,
    room_type_rows, CityKey, Dimension, DEFAULT_CURRENCY,
};
use crate::warehouse::error::Result;
use crate::warehouse::mapping::{bind, BoundColumns};
use crate::warehouse::parse::{
    parse_calendar, parse_listings, parse_monthly, parse_tourism, parse_weather,
};
use crate::warehouse::resolve::resolve;
use crate::warehouse::types::{
    CalendarDay, ListingRecord, ListingRow, MonthlyAirbnbRow, MonthlyRecord, RawExtract,
    RunReport, Source, TourismRecord, TourismRow, UnmatchedReport, Warehouse, WeatherNormalRow,
    WeatherRecord, YearMonth,
};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// The raw extracts of one batch
#[derive(Debug, Clone)]
pub struct Extracts {
    pub listings: RawExtract,
    pub calendar: RawExtract,
    pub tourism: RawExtract,
    pub weather: RawExtract,
    /// Pre-aggregated listing months, when the batch ships them
    pub monthly: Option<RawExtract>,
}

/// Which sources may contribute rows to the country dimension
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CountryScope {
    /// Union of every source's country mentions
    #[default]
    AllSources,
    /// Only countries that have listings; other sources' countries go unmatched
    Listings,
}

#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    /// Conversion rates to USD keyed by normalized currency code
    pub currency_rates: HashMap<String, f64>,
    pub country_scope: CountryScope,
}

#[derive(Debug)]
pub struct TransformOutput {
    pub warehouse: Warehouse,
    pub report: RunReport,
}

/// Optional listing columns the extract actually carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListingColumns {
    pub currency: bool,
    pub room_type: bool,
    pub listing_type: bool,
}

impl ListingColumns {
    pub fn from_bound(bound: &BoundColumns) -> Self {
        ListingColumns {
            currency: bound.has("currency"),
            room_type: bound.has("room_type"),
            listing_type: bound.has("listing_type"),
        }
    }
}

/// All dimensions of one batch, kept for key resolution
#[derive(Debug)]
pub struct Dimensions {
    pub countries: Dimension<String>,
    pub cities: Dimension<CityKey>,
    pub currencies: Dimension<String>,
    pub room_types: Dimension<String>,
    pub listing_types: Dimension<String>,
    pub dates: Dimension<YearMonth>,
    pub columns: ListingColumns,
}

/// Run the full transform over one batch of extracts
pub fn transform(extracts: &Extracts, options: &TransformOptions) -> Result<TransformOutput> {
    let mut report = RunReport::default();

    debug!("Parsing extracts...");
    let columns = ListingColumns::from_bound(&bind(&extracts.listings)?);
    let listings = parse_listings(&extracts.listings)?;
    let calendar = parse_calendar(&extracts.calendar)?;
    let tourism = parse_tourism(&extracts.tourism)?;
    let weather = parse_weather(&extracts.weather)?;
    let monthly = match &extracts.monthly {
        Some(extract) => Some(parse_monthly(extract)?),
        None => None,
    };

    report.add_malformed(Source::Listings, listings.malformed);
    report.add_malformed(Source::Calendar, calendar.malformed);
    report.add_malformed(Source::Tourism, tourism.malformed);
    report.add_malformed(Source::Weather, weather.malformed);
    let monthly = match monthly {
        Some(parsed) => {
            report.add_malformed(Source::Monthly, parsed.malformed);
            parsed.rows
        }
        None => Vec::new(),
    };

    debug!("Building dimensions...");
    let dims = build_dimensions(
        &listings.rows,
        &calendar.rows,
        &monthly,
        &tourism.rows,
        &weather.rows,
        columns,
        options.country_scope,
    );
    for (name, count) in [
        (dims.countries.name(), dims.countries.unresolved()),
        (dims.cities.name(), dims.cities.unresolved()),
        (dims.currencies.name(), dims.currencies.unresolved()),
        (dims.room_types.name(), dims.room_types.unresolved()),
        (dims.listing_types.name(), dims.listing_types.unresolved()),
        (dims.dates.name(), dims.dates.unresolved()),
    ] {
        report.add_unresolved(name, count);
    }

    debug!("Resolving listings...");
    let listing_index = build_listing_rows(listings.rows, &dims, &mut report);

    debug!("Building facts...");
    let monthly_airbnb =
        build_monthly_facts(calendar.rows, monthly, &listing_index, &dims, &mut report);
    let tourism = build_tourism_facts(tourism.rows, &dims.countries, &mut report);
    let weather_normals = build_weather_facts(weather.rows, &dims.countries, &mut report);

    let warehouse = Warehouse {
        countries: country_rows(&dims.countries),
        cities: city_rows(&dims.cities),
        currencies: currency_rows(&dims.currencies, &options.currency_rates),
        room_types: room_type_rows(&dims.room_types),
        listing_types: listing_type_rows(&dims.listing_types),
        dates: date_rows(&dims.dates),
        listings: listing_index.into_values().collect(),
        weather_normals,
        tourism,
        monthly_airbnb,
    };

    info!(
        "Transform complete: {} countries, {} cities, {} listings, {} monthly facts, \
         {} tourism facts, {} weather normals",
        warehouse.countries.len(),
        warehouse.cities.len(),
        warehouse.listings.len(),
        warehouse.monthly_airbnb.len(),
        warehouse.tourism.len(),
        warehouse.weather_normals.len()
    );
    if !report.is_clean() {
        warn!("Run report: {}", report);
    }

    Ok(TransformOutput { warehouse, report })
}

/// Build every dimension from the parsed sources
pub fn build_dimensions(
    listings: &[ListingRecord],
    calendar: &[CalendarDay],
    monthly: &[MonthlyRecord],
    tourism: &[TourismRecord],
    weather: &[WeatherRecord],
    columns: ListingColumns,
    scope: CountryScope,
) -> Dimensions {
    let countries = match scope {
        CountryScope::AllSources => build_countries(listings, calendar, monthly, tourism, weather),
        CountryScope::Listings => build_countries(listings, &[], &[], &[], &[]),
    };
    let cities = build_cities(listings, &countries);

    Dimensions {
        currencies: build_currencies(listings, columns.currency),
        room_types: build_room_types(listings, columns.room_type),
        listing_types: build_listing_types(listings, columns.listing_type),
        dates: build_dates(calendar, monthly),
        countries,
        cities,
        columns,
    }
}

/// Listing dimension rows keyed by source listing id.
///
/// The first row per listing id wins before any key is resolved, so a repeat can never
/// stand in for an earlier row that failed resolution. The city reference is required;
/// type and currency references are nullable.
pub fn build_listing_rows(
    listings: Vec<ListingRecord>,
    dims: &Dimensions,
    report: &mut RunReport,
) -> BTreeMap<i64, ListingRow> {
    let mut missing_id = UnmatchedReport::default();
    let mut seen = BTreeSet::new();
    let mut duplicates = 0;
    let mut first_rows: Vec<(i64, ListingRecord)> = Vec::with_capacity(listings.len());

    for listing in listings {
        let Some(id) = listing.listing_id else {
            missing_id.record("<missing listing_id>");
            continue;
        };
        if seen.insert(id) {
            first_rows.push((id, listing));
        } else {
            duplicates += 1;
        }
    }
    report.add_unmatched("listing", missing_id);
    report.add_duplicates("listing", duplicates);

    let city_of = |(_, l): &(i64, ListingRecord)| {
        let country_id = dims.countries.id_of(l.country.as_ref()?)?;
        Some(CityKey {
            name: l.city.clone()?,
            country_id,
        })
    };
    let (resolved, unmatched) = resolve(first_rows, &dims.cities, city_of).into_required();
    report.add_unmatched("listing", unmatched);

    let default_currency = dims.currencies.id_of(&DEFAULT_CURRENCY.to_string());

    resolved
        .into_iter()
        .map(|((listing_id, l), city_id)| {
            let currency_id = if dims.columns.currency {
                l.currency.as_ref().and_then(|c| dims.currencies.id_of(c))
            } else {
                default_currency
            };
            let row = ListingRow {
                listing_id,
                listing_name: l.listing_name,
                city_id,
                listing_type_id: l.listing_type.as_ref().and_then(|t| dims.listing_types.id_of(t)),
                room_type_id: l.room_type.as_ref().and_then(|t| dims.room_types.id_of(t)),
                currency_id,
                guest_count: l.guest_count,
                bedroom_count: l.bedroom_count,
                cancellation_policy: l.cancellation_policy,
                rating_overall: l.rating_overall,
                ttm_revenue: l.ttm_revenue,
                ttm_avg_rate: l.ttm_avg_rate,
            };
            (listing_id, row)
        })
        .collect()
}

/// Monthly listing facts: calendar days and pre-aggregated months resolved against
/// listings, then folded to one row per (listing, month)
pub fn build_monthly_facts(
    calendar: Vec<CalendarDay>,
    monthly: Vec<MonthlyRecord>,
    listings: &BTreeMap<i64, ListingRow>,
    dims: &Dimensions,
    report: &mut RunReport,
) -> Vec<MonthlyAirbnbRow> {
    let (days, unmatched) =
        resolve(calendar, listings, |c: &CalendarDay| c.listing_id).into_required();
    report.add_unmatched("monthly_airbnb", unmatched);
    let (records, unmatched) =
        resolve(monthly, listings, |m: &MonthlyRecord| m.listing_id).into_required();
    report.add_unmatched("monthly_airbnb", unmatched);

    let days: Vec<CalendarDay> = days.into_iter().map(|(day, _)| day).collect();
    let records: Vec<MonthlyRecord> = records.into_iter().map(|(record, _)| record).collect();
    let aggregation = aggregate_with_records(&days, &records);
    report.add_duplicates("monthly_airbnb", aggregation.duplicates);
    report.add_skipped("monthly_airbnb", aggregation.skipped);

    let mut unmatched = UnmatchedReport::default();
    let mut facts = Vec::with_capacity(aggregation.rows.len());

    for agg in aggregation.rows {
        let date_id = dims.dates.id_of(&agg.period);
        let country_id = listings
            .get(&agg.listing_id)
            .and_then(|l| dims.cities.key_of(l.city_id))
            .map(|city| city.country_id);

        match (date_id, country_id) {
            (Some(date_id), Some(country_id)) => facts.push(MonthlyAirbnbRow {
                listing_id: agg.listing_id,
                date_id,
                country_id,
                year: agg.period.year,
                month: agg.period.month,
                vacant_days: agg.vacant_days,
                reserved_days: agg.reserved_days,
                avg_length_of_stay: agg.avg_length_of_stay,
                occupancy: agg.occupancy,
                rate_avg: agg.rate_avg,
                native_revenue: agg.native_revenue,
            }),
            _ => unmatched.record(format!("{} {}", agg.listing_id, agg.period)),
        }
    }
    report.add_unmatched("monthly_airbnb", unmatched);

    facts
}

/// Fold `value` into `slot`; true when it disagrees with a value already there
fn coalesce(slot: &mut Option<f64>, value: Option<f64>) -> bool {
    match (*slot, value) {
        (None, v) => {
            *slot = v;
            false
        }
        (Some(existing), Some(v)) => existing != v,
        (Some(_), None) => false,
    }
}

/// Country tourism facts at (country, year) grain
pub fn build_tourism_facts(
    records: Vec<TourismRecord>,
    countries: &Dimension<String>,
    report: &mut RunReport,
) -> Vec<TourismRow> {
    let (resolved, unmatched) =
        resolve(records, countries, |t: &TourismRecord| t.country.clone()).into_required();
    report.add_unmatched("tourism", unmatched);

    let mut missing_year = UnmatchedReport::default();
    let mut grain: BTreeMap<(i32, i32), TourismRow> = BTreeMap::new();
    let mut duplicates = 0;

    for (t, country_id) in resolved {
        let Some(year) = t.year else {
            missing_year.record("<missing year>");
            continue;
        };
        match grain.entry((country_id, year)) {
            Entry::Vacant(slot) => {
                slot.insert(TourismRow {
                    country_id,
                    year,
                    total_arrivals: t.total_arrivals,
                    total_departures: t.total_departures,
                    tourism_expenditure: t.tourism_expenditure,
                    arrivals_personal: t.arrivals_personal,
                    arrivals_business: t.arrivals_business,
                });
            }
            Entry::Occupied(mut slot) => {
                let row = slot.get_mut();
                let conflict = [
                    coalesce(&mut row.total_arrivals, t.total_arrivals),
                    coalesce(&mut row.total_departures, t.total_departures),
                    coalesce(&mut row.tourism_expenditure, t.tourism_expenditure),
                    coalesce(&mut row.arrivals_personal, t.arrivals_personal),
                    coalesce(&mut row.arrivals_business, t.arrivals_business),
                ];
                if conflict.contains(&true) {
                    duplicates += 1;
                }
            }
        }
    }
    report.add_unmatched("tourism", missing_year);
    report.add_duplicates("tourism", duplicates);

    grain.into_values().collect()
}

/// Climate normal facts at (country, month) grain
pub fn build_weather_facts(
    records: Vec<WeatherRecord>,
    countries: &Dimension<String>,
    report: &mut RunReport,
) -> Vec<WeatherNormalRow> {
    let (resolved, unmatched) =
        resolve(records, countries, |w: &WeatherRecord| w.country.clone()).into_required();
    report.add_unmatched("weather_normals", unmatched);

    let mut missing_month = UnmatchedReport::default();
    let mut grain: BTreeMap<(i32, u32), WeatherNormalRow> = BTreeMap::new();
    let mut duplicates = 0;

    for (w, country_id) in resolved {
        let Some(month) = w.month else {
            missing_month.record("<missing month>");
            continue;
        };
        match grain.entry((country_id, month)) {
            Entry::Vacant(slot) => {
                slot.insert(WeatherNormalRow {
                    country_id,
                    month,
                    min_temp: w.min_temp,
                    mean_temp: w.mean_temp,
                    max_temp: w.max_temp,
                    precipitation: w.precipitation,
                    hours_of_sunshine: w.hours_of_sunshine,
                });
            }
            Entry::Occupied(mut slot) => {
                let row = slot.get_mut();
                let conflict = [
                    coalesce(&mut row.min_temp, w.min_temp),
                    coalesce(&mut row.mean_temp, w.mean_temp),
                    coalesce(&mut row.max_temp, w.max_temp),
                    coalesce(&mut row.precipitation, w.precipitation),
                    coalesce(&mut row.hours_of_sunshine, w.hours_of_sunshine),
                ];
                if conflict.contains(&true) {
                    duplicates += 1;
                }
            }
        }
    }
    report.add_unmatched("weather_normals", missing_month);
    report.add_duplicates("weather_normals", duplicates);

    grain.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::days_in_month;
    use std::collections::HashSet;

    fn sample_extracts() -> Extracts {
        let mut calendar_rows: Vec<Vec<String>> = Vec::new();
        // Listing 42: April 2024, first 10 days available
        for d in 1..=30 {
            calendar_rows.push(vec![
                "42".to_string(),
                format!("2024-04-{:02}", d),
                if d <= 10 { "t" } else { "f" }.to_string(),
                "$100.00".to_string(),
            ]);
        }
        // Listing 7: leap February, every day booked
        for d in 1..=29 {
            calendar_rows.push(vec![
                "7".to_string(),
                format!("2024-02-{:02}", d),
                "f".to_string(),
                "80".to_string(),
            ]);
        }
        // Unknown listing
        calendar_rows.push(vec![
            "999".to_string(),
            "2024-04-01".to_string(),
            "t".to_string(),
            "10".to_string(),
        ]);

        Extracts {
            listings: RawExtract::from_rows(
                Source::Listings,
                &[
                    "listing_id",
                    "listing_name",
                    "city",
                    "country",
                    "property_type",
                    "room_type",
                    "accommodates",
                ],
                &[
                    &["42", "Bay loft", "Manila", "Philippines", "Condo", "Entire home/apt", "4"],
                    &["7", "Hut", " cebu ", " philippines ", "Cabin", "entire HOME/apt", "2"],
                    &["8", "Ryokan", "Kyoto", "JAPAN", "Guesthouse", "Private room", "x"],
                ],
            ),
            calendar: RawExtract::new(
                Source::Calendar,
                vec!["listing_id".into(), "date".into(), "available".into(), "price".into()],
                calendar_rows,
            ),
            tourism: RawExtract::from_rows(
                Source::Tourism,
                &["country", "year", "total_arrivals", "total_departures"],
                &[
                    &["Philippines", "2023", "5450000", ""],
                    &["PHILIPPINES", "2023", "", "3200000"],
                    &["Japan", "2023", "25066100", "9621000"],
                    &["Atlantis", "2023", "1", "1"],
                ],
            ),
            weather: RawExtract::from_rows(
                Source::Weather,
                &["country", "month", "mean_temp"],
                &[&["Japan", "January", "5.2"], &["Philippines", "1", "26.0"]],
            ),
            monthly: None,
        }
    }

    #[test]
    fn test_transform_end_to_end() {
        let out = transform(&sample_extracts(), &TransformOptions::default()).unwrap();
        let wh = &out.warehouse;

        let names: Vec<&str> = wh.countries.iter().map(|c| c.country_name.as_str()).collect();
        assert_eq!(names, vec!["Atlantis", "Japan", "Philippines"]);
        assert_eq!(wh.cities.len(), 3);
        assert_eq!(wh.room_types.len(), 2);
        assert_eq!(wh.currencies.len(), 1);
        assert_eq!(wh.currencies[0].currency_code, "USD");
        assert_eq!(wh.dates.len(), 2);
        assert_eq!(wh.listings.len(), 3);

        let april = wh.monthly_airbnb.iter().find(|f| f.listing_id == 42).unwrap();
        assert_eq!(april.vacant_days, 10);
        assert_eq!(april.reserved_days, 20);
        assert!((april.occupancy - 66.67).abs() < 0.01);
        assert_eq!(april.native_revenue, Some(2000.0));

        let feb = wh.monthly_airbnb.iter().find(|f| f.listing_id == 7).unwrap();
        assert_eq!(feb.reserved_days, 29);
        assert_eq!(feb.avg_length_of_stay, Some(29.0));

        // Unknown listing 999 excluded and counted
        assert_eq!(out.report.unmatched_count("monthly_airbnb"), 1);
        // Malformed guest count on listing 8
        assert_eq!(out.report.malformed.get(&Source::Listings), Some(&1));

        // Two Philippines rows merged into one (country, year) fact
        let philippines = wh
            .countries
            .iter()
            .find(|c| c.country_name == "Philippines")
            .unwrap()
            .country_id;
        let ph_2023: Vec<_> = wh.tourism.iter().filter(|t| t.country_id == philippines).collect();
        assert_eq!(ph_2023.len(), 1);
        assert_eq!(ph_2023[0].total_arrivals, Some(5_450_000.0));
        assert_eq!(ph_2023[0].total_departures, Some(3_200_000.0));
    }

    #[test]
    fn test_transform_is_idempotent() {
        let extracts = sample_extracts();
        let first = transform(&extracts, &TransformOptions::default()).unwrap();
        let second = transform(&extracts, &TransformOptions::default()).unwrap();

        let a = serde_json::to_string(&first.warehouse).unwrap();
        let b = serde_json::to_string(&second.warehouse).unwrap();
        assert_eq!(a, b);
        assert_eq!(first.report, second.report);
    }

    #[test]
    fn test_referential_integrity_holds() {
        let wh = transform(&sample_extracts(), &TransformOptions::default())
            .unwrap()
            .warehouse;

        let countries: HashSet<i32> = wh.countries.iter().map(|c| c.country_id).collect();
        let cities: HashSet<i32> = wh.cities.iter().map(|c| c.city_id).collect();
        let dates: HashSet<i32> = wh.dates.iter().map(|d| d.date_id).collect();
        let listings: HashSet<i64> = wh.listings.iter().map(|l| l.listing_id).collect();

        assert!(wh.cities.iter().all(|c| countries.contains(&c.country_id)));
        assert!(wh.listings.iter().all(|l| cities.contains(&l.city_id)));
        assert!(wh.tourism.iter().all(|t| countries.contains(&t.country_id)));
        assert!(wh.weather_normals.iter().all(|w| countries.contains(&w.country_id)));
        for f in &wh.monthly_airbnb {
            assert!(listings.contains(&f.listing_id));
            assert!(dates.contains(&f.date_id));
            assert!(countries.contains(&f.country_id));
            assert_eq!(
                f.reserved_days + f.vacant_days,
                days_in_month(f.year, f.month).unwrap()
            );
            assert!((0.0..=100.0).contains(&f.occupancy));
        }
    }

    #[test]
    fn test_dimension_names_unique() {
        let wh = transform(&sample_extracts(), &TransformOptions::default())
            .unwrap()
            .warehouse;

        let countries: HashSet<&str> =
            wh.countries.iter().map(|c| c.country_name.as_str()).collect();
        assert_eq!(countries.len(), wh.countries.len());
        let cities: HashSet<(&str, i32)> = wh
            .cities
            .iter()
            .map(|c| (c.city_name.as_str(), c.country_id))
            .collect();
        assert_eq!(cities.len(), wh.cities.len());
        let rooms: HashSet<&str> =
            wh.room_types.iter().map(|r| r.room_type_name.as_str()).collect();
        assert_eq!(rooms.len(), wh.room_types.len());
    }

    #[test]
    fn test_listings_scope_leaves_tourism_country_unmatched() {
        let options = TransformOptions {
            country_scope: CountryScope::Listings,
            ..Default::default()
        };
        let out = transform(&sample_extracts(), &options).unwrap();

        assert!(out.warehouse.countries.iter().all(|c| c.country_name != "Atlantis"));
        assert_eq!(out.report.unmatched_count("tourism"), 1);
        assert_eq!(out.report.unmatched["tourism"].sample, vec!["Atlantis"]);
        assert_eq!(out.warehouse.tourism.len(), 2);
    }

    #[test]
    fn test_tourism_unmatched_country_excluded() {
        let countries = Dimension::build("country", vec![Some("Philippines".to_string())]);
        let records = vec![
            TourismRecord {
                country: Some("Philippines".to_string()),
                year: Some(2023),
                total_arrivals: Some(10.0),
                ..Default::default()
            },
            TourismRecord {
                country: Some("Atlantis".to_string()),
                year: Some(2023),
                ..Default::default()
            },
        ];
        let mut report = RunReport::default();
        let facts = build_tourism_facts(records, &countries, &mut report);

        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].country_id, 1);
        assert_eq!(report.unmatched_count("tourism"), 1);
    }

    #[test]
    fn test_conflicting_weather_rows_counted() {
        let countries = Dimension::build("country", vec![Some("Japan".to_string())]);
        let record = |mean: f64| WeatherRecord {
            country: Some("Japan".to_string()),
            month: Some(1),
            mean_temp: Some(mean),
            ..Default::default()
        };
        let mut report = RunReport::default();
        let records = vec![record(5.2), record(5.2), record(6.0)];
        let facts = build_weather_facts(records, &countries, &mut report);

        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].mean_temp, Some(5.2));
        assert_eq!(report.duplicates.get("weather_normals"), Some(&1));
    }

    #[test]
    fn test_currency_column_resolves_per_listing() {
        let mut extracts = sample_extracts();
        extracts.listings = RawExtract::from_rows(
            Source::Listings,
            &["listing_id", "city", "country", "currency"],
            &[&["1", "Manila", "Philippines", "php"], &["2", "Kyoto", "Japan", ""]],
        );
        let options = TransformOptions {
            currency_rates: HashMap::from([("PHP".to_string(), 0.018)]),
            ..Default::default()
        };
        let out = transform(&extracts, &options).unwrap();
        let wh = &out.warehouse;

        assert_eq!(wh.currencies.len(), 1);
        assert_eq!(wh.currencies[0].conversion_rate_to_usd, 0.018);
        assert_eq!(wh.listings[0].currency_id, Some(1));
        assert_eq!(wh.listings[1].currency_id, None);
        assert_eq!(out.report.unresolved.get("currency"), Some(&1));
    }

    #[test]
    fn test_missing_required_column_aborts() {
        let mut extracts = sample_extracts();
        extracts.tourism = RawExtract::from_rows(Source::Tourism, &["country", "arrivals"], &[]);
        assert!(transform(&extracts, &TransformOptions::default()).is_err());
    }

    #[test]
    fn test_first_listing_row_wins_before_city_resolution() {
        let mut extracts = sample_extracts();
        extracts.listings = RawExtract::from_rows(
            Source::Listings,
            &["listing_id", "listing_name", "city", "country"],
            &[
                &["42", "Bay loft", "", "Philippines"],
                &["42", "Bay loft again", "Manila", "Philippines"],
                &["7", "Hill cabin", "Cebu", "Philippines"],
            ],
        );
        let out = transform(&extracts, &TransformOptions::default()).unwrap();

        let ids: Vec<i64> = out.warehouse.listings.iter().map(|l| l.listing_id).collect();
        assert_eq!(ids, vec![7]);
        assert_eq!(out.report.duplicates.get("listing"), Some(&1));
        assert_eq!(out.report.unmatched_count("listing"), 1);
        assert!(out.warehouse.monthly_airbnb.iter().all(|f| f.listing_id == 7));
    }

    #[test]
    fn test_duplicate_listing_keeps_first_row() {
        let mut extracts = sample_extracts();
        extracts.listings = RawExtract::from_rows(
            Source::Listings,
            &["listing_id", "listing_name", "city", "country"],
            &[
                &["42", "Bay loft", "Manila", "Philippines"],
                &["42", "Bay loft again", "Cebu", "Philippines"],
            ],
        );
        let out = transform(&extracts, &TransformOptions::default()).unwrap();
        let wh = &out.warehouse;

        assert_eq!(wh.listings.len(), 1);
        assert_eq!(wh.listings[0].listing_name.as_deref(), Some("Bay loft"));
        let manila = wh.cities.iter().find(|c| c.city_name == "Manila").unwrap();
        assert_eq!(wh.listings[0].city_id, manila.city_id);
        assert_eq!(out.report.duplicates.get("listing"), Some(&1));
        assert_eq!(out.report.unmatched_count("listing"), 0);
    }

    #[test]
    fn test_missing_type_columns_are_not_unresolved() {
        let mut extracts = sample_extracts();
        extracts.listings = RawExtract::from_rows(
            Source::Listings,
            &["listing_id", "city", "country"],
            &[&["42", "Manila", "Philippines"], &["7", "Cebu", "Philippines"]],
        );
        let out = transform(&extracts, &TransformOptions::default()).unwrap();

        assert!(out.warehouse.room_types.is_empty());
        assert!(out.warehouse.listing_types.is_empty());
        assert_eq!(out.report.unresolved.get("room_type"), None);
        assert_eq!(out.report.unresolved.get("listing_type"), None);
        assert!(out.warehouse.listings.iter().all(|l| l.room_type_id.is_none()));
    }

    #[test]
    fn test_monthly_extract_fills_months_and_dates() {
        let mut extracts = sample_extracts();
        extracts.monthly = Some(RawExtract::from_rows(
            Source::Monthly,
            &[
                "listing_id",
                "date",
                "country",
                "vacant_days",
                "reserved_days",
                "length_of_stay_avg",
                "occupancy",
                "rate_avg",
                "native_revenue",
            ],
            &[
                // New month for listing 42, measures reconciled with a 31-day month
                &["42", "2024-05", "Philippines", "11", "25", "3.5", "70", "95", ""],
                // Same month as the calendar, which already derived every measure
                &["42", "2024-04", "Philippines", "0", "30", "4.0", "100", "1", "1"],
                // No measures at all
                &["7", "2024-03", "Philippines", "", "", "", "", "", ""],
                // Listing without a dimension row
                &["999", "2024-05", "Philippines", "1", "30", "", "", "", ""],
            ],
        ));
        let out = transform(&extracts, &TransformOptions::default()).unwrap();
        let wh = &out.warehouse;

        assert_eq!(wh.dates.len(), 4);
        let may = wh
            .monthly_airbnb
            .iter()
            .find(|f| f.listing_id == 42 && f.month == 5)
            .unwrap();
        assert_eq!(may.vacant_days, 11);
        assert_eq!(may.reserved_days, 20);
        assert_eq!(may.avg_length_of_stay, Some(3.5));
        assert_eq!(may.native_revenue, Some(1900.0));

        let april = wh
            .monthly_airbnb
            .iter()
            .find(|f| f.listing_id == 42 && f.month == 4)
            .unwrap();
        assert_eq!(april.reserved_days, 20);
        assert_eq!(april.native_revenue, Some(2000.0));
        assert_eq!(april.avg_length_of_stay, Some(20.0));

        assert_eq!(out.report.duplicates.get("monthly_airbnb"), Some(&1));
        assert_eq!(out.report.skipped.get("monthly_airbnb"), Some(&1));
        assert_eq!(out.report.unmatched_count("monthly_airbnb"), 2);
    }

    #[test]
    fn test_calendar_rows_without_date_are_reported_skipped() {
        let mut extracts = sample_extracts();
        extracts.calendar = RawExtract::from_rows(
            Source::Calendar,
            &["listing_id", "date", "available", "price"],
            &[&["42", "2024-04-01", "t", "10"], &["42", "", "f", "10"]],
        );
        let out = transform(&extracts, &TransformOptions::default()).unwrap();

        assert_eq!(out.report.skipped.get("monthly_airbnb"), Some(&1));
        assert!(!out.report.is_clean());
        assert!(out.report.to_string().contains("skipped for monthly_airbnb"));
    }
}
