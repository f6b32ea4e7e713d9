//! Load coordination - persist conformed tables as one atomic, full-replace batch

use crate::warehouse::error::{EtlError, Result};
use crate::warehouse::store::Store;
use crate::warehouse::types::{LoadStats, Table, Value, Warehouse};
use tracing::{error, info, warn};

/// Referential load order: every table comes after the tables it references
pub const LOAD_ORDER: [&str; 10] = [
    "country",
    "city",
    "currency",
    "room_type",
    "listing_type",
    "date",
    "listing",
    "weather_normals",
    "tourism",
    "monthly_airbnb",
];

fn load_position(name: &str) -> Option<usize> {
    LOAD_ORDER.iter().position(|t| *t == name)
}

/// Sort tables into load order, rejecting unknown or repeated names
fn order_tables(mut tables: Vec<Table>) -> Result<Vec<Table>> {
    let mut seen = Vec::with_capacity(tables.len());
    for table in &tables {
        if load_position(&table.name).is_none() {
            return Err(EtlError::UnknownTable(table.name.clone()));
        }
        if seen.contains(&table.name) {
            return Err(EtlError::UnknownTable(format!("{} (listed twice)", table.name)));
        }
        seen.push(table.name.clone());
    }
    tables.sort_by_key(|t| load_position(&t.name));
    Ok(tables)
}

/// Load a batch of tables: truncate all, insert in dependency order, commit once.
/// Any failure rolls the whole batch back.
pub async fn load_batch(store: &dyn Store, tables: Vec<Table>) -> Result<LoadStats> {
    let tables = order_tables(tables)?;
    let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    info!("Loading {} tables: {}", tables.len(), names.join(" -> "));

    let mut tx = store.begin().await?;

    if let Err(e) = tx.truncate(&names).await {
        error!("Truncate failed, rolling back: {}", e);
        if let Err(rollback) = tx.rollback().await {
            warn!("Rollback failed: {}", rollback);
        }
        return Err(EtlError::Write {
            table: names.join(", "),
            source: Box::new(e),
        });
    }

    let mut stats = LoadStats::default();
    for table in &tables {
        match tx.insert(table).await {
            Ok(written) => {
                info!("✓ {}: {} rows", table.name, written);
                stats.tables.push((table.name.clone(), written));
            }
            Err(e) => {
                error!("✗ {} failed, rolling back batch: {}", table.name, e);
                if let Err(rollback) = tx.rollback().await {
                    warn!("Rollback failed: {}", rollback);
                }
                return Err(EtlError::Write {
                    table: table.name.clone(),
                    source: Box::new(e),
                });
            }
        }
    }

    tx.commit().await?;
    info!("Load committed: {}", stats);

    Ok(stats)
}

fn int(v: i32) -> Value {
    Value::Int(Some(v))
}

fn uint(v: u32) -> Value {
    Value::Int(i32::try_from(v).ok())
}

fn text(v: &str) -> Value {
    Value::Text(Some(v.to_string()))
}

/// Every table of a warehouse, in load order
pub fn warehouse_tables(wh: &Warehouse) -> Vec<Table> {
    vec![
        Table {
            name: "country".to_string(),
            columns: vec!["country_id", "country_name"],
            rows: wh
                .countries
                .iter()
                .map(|r| vec![int(r.country_id), text(&r.country_name)])
                .collect(),
        },
        Table {
            name: "city".to_string(),
            columns: vec!["city_id", "city_name", "country_id"],
            rows: wh
                .cities
                .iter()
                .map(|r| vec![int(r.city_id), text(&r.city_name), int(r.country_id)])
                .collect(),
        },
        Table {
            name: "currency".to_string(),
            columns: vec!["currency_id", "currency_code", "conversion_rate_to_usd"],
            rows: wh
                .currencies
                .iter()
                .map(|r| {
                    vec![
                        int(r.currency_id),
                        text(&r.currency_code),
                        Value::Float(Some(r.conversion_rate_to_usd)),
                    ]
                })
                .collect(),
        },
        Table {
            name: "room_type".to_string(),
            columns: vec!["room_type_id", "room_type_name"],
            rows: wh
                .room_types
                .iter()
                .map(|r| vec![int(r.room_type_id), text(&r.room_type_name)])
                .collect(),
        },
        Table {
            name: "listing_type".to_string(),
            columns: vec!["listing_type_id", "listing_type_name"],
            rows: wh
                .listing_types
                .iter()
                .map(|r| vec![int(r.listing_type_id), text(&r.listing_type_name)])
                .collect(),
        },
        Table {
            name: "date".to_string(),
            columns: vec![
                "date_id",
                "date_actual",
                "year",
                "month",
                "day",
                "month_name",
                "quarter",
            ],
            rows: wh
                .dates
                .iter()
                .map(|r| {
                    vec![
                        int(r.date_id),
                        Value::Date(Some(r.date_actual)),
                        int(r.year),
                        uint(r.month),
                        uint(r.day),
                        text(&r.month_name),
                        uint(r.quarter),
                    ]
                })
                .collect(),
        },
        Table {
            name: "listing".to_string(),
            columns: vec![
                "listing_id",
                "listing_name",
                "city_id",
                "listing_type_id",
                "room_type_id",
                "currency_id",
                "guest_count",
                "bedroom_count",
                "cancellation_policy",
                "rating_overall",
                "ttm_revenue",
                "ttm_avg_rate",
            ],
            rows: wh
                .listings
                .iter()
                .map(|r| {
                    vec![
                        Value::BigInt(Some(r.listing_id)),
                        Value::Text(r.listing_name.clone()),
                        int(r.city_id),
                        Value::Int(r.listing_type_id),
                        Value::Int(r.room_type_id),
                        Value::Int(r.currency_id),
                        Value::Int(r.guest_count),
                        Value::Int(r.bedroom_count),
                        Value::Text(r.cancellation_policy.clone()),
                        Value::Float(r.rating_overall),
                        Value::Float(r.ttm_revenue),
                        Value::Float(r.ttm_avg_rate),
                    ]
                })
                .collect(),
        },
        Table {
            name: "weather_normals".to_string(),
            columns: vec![
                "country_id",
                "month",
                "min_temp",
                "mean_temp",
                "max_temp",
                "precipitation",
                "hours_of_sunshine",
            ],
            rows: wh
                .weather_normals
                .iter()
                .map(|r| {
                    vec![
                        int(r.country_id),
                        uint(r.month),
                        Value::Float(r.min_temp),
                        Value::Float(r.mean_temp),
                        Value::Float(r.max_temp),
                        Value::Float(r.precipitation),
                        Value::Float(r.hours_of_sunshine),
                    ]
                })
                .collect(),
        },
        Table {
            name: "tourism".to_string(),
            columns: vec![
                "country_id",
                "year",
                "total_arrivals",
                "total_departures",
                "tourism_expenditure",
                "arrivals_personal",
                "arrivals_business",
            ],
            rows: wh
                .tourism
                .iter()
                .map(|r| {
                    vec![
                        int(r.country_id),
                        int(r.year),
                        Value::Float(r.total_arrivals),
                        Value::Float(r.total_departures),
                        Value::Float(r.tourism_expenditure),
                        Value::Float(r.arrivals_personal),
                        Value::Float(r.arrivals_business),
                    ]
                })
                .collect(),
        },
        Table {
            name: "monthly_airbnb".to_string(),
            columns: vec![
                "listing_id",
                "date_id",
                "country_id",
                "vacant_days",
                "reserved_days",
                "avg_length_of_stay",
                "occupancy",
                "rate_avg",
                "native_revenue",
            ],
            rows: wh
                .monthly_airbnb
                .iter()
                .map(|r| {
                    vec![
                        Value::BigInt(Some(r.listing_id)),
                        int(r.date_id),
                        int(r.country_id),
                        uint(r.vacant_days),
                        uint(r.reserved_days),
                        Value::Float(r.avg_length_of_stay),
                        Value::Float(Some(r.occupancy)),
                        Value::Float(r.rate_avg),
                        Value::Float(r.native_revenue),
                    ]
                })
                .collect(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::store::MemoryStore;
    use crate::warehouse::types::{CountryRow, TourismRow};

    fn small_warehouse() -> Warehouse {
        Warehouse {
            countries: vec![CountryRow {
                country_id: 1,
                country_name: "Philippines".to_string(),
            }],
            tourism: vec![TourismRow {
                country_id: 1,
                year: 2023,
                total_arrivals: Some(5_450_000.0),
                total_departures: None,
                tourism_expenditure: None,
                arrivals_personal: None,
                arrivals_business: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_warehouse_tables_follow_load_order() {
        let tables = warehouse_tables(&small_warehouse());
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, LOAD_ORDER.to_vec());
        for table in &tables {
            for row in &table.rows {
                assert_eq!(row.len(), table.columns.len());
            }
        }
    }

    #[test]
    fn test_order_tables_sorts_and_rejects_unknown() {
        let mut tables = warehouse_tables(&small_warehouse());
        tables.reverse();
        let ordered = order_tables(tables).unwrap();
        assert_eq!(ordered[0].name, "country");
        assert_eq!(ordered[9].name, "monthly_airbnb");

        let bogus = vec![Table {
            name: "properties".to_string(),
            columns: vec![],
            rows: vec![],
        }];
        assert!(matches!(order_tables(bogus), Err(EtlError::UnknownTable(_))));
    }

    #[tokio::test]
    async fn test_load_batch_inserts_in_dependency_order() {
        let store = MemoryStore::new();
        let mut tables = warehouse_tables(&small_warehouse());
        tables.swap(0, 9);

        let stats = load_batch(&store, tables).await.unwrap();
        assert_eq!(stats.tables.len(), 10);
        assert_eq!(stats.rows_inserted(), 2);
        assert_eq!(store.insert_log().unwrap(), LOAD_ORDER.to_vec());
    }

    #[tokio::test]
    async fn test_reload_is_idempotent() {
        let store = MemoryStore::new();
        load_batch(&store, warehouse_tables(&small_warehouse()))
            .await
            .unwrap();
        let first = store.snapshot().unwrap();

        load_batch(&store, warehouse_tables(&small_warehouse()))
            .await
            .unwrap();
        let second = store.snapshot().unwrap();

        assert_eq!(first, second);
        assert_eq!(second["country"].rows.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_previous_batch_intact() {
        let failing = MemoryStore::failing_on("tourism");
        let healthy = failing.healed();
        load_batch(&healthy, warehouse_tables(&small_warehouse()))
            .await
            .unwrap();
        let before = failing.snapshot().unwrap();

        let mut changed = small_warehouse();
        changed.countries.push(CountryRow {
            country_id: 2,
            country_name: "Japan".to_string(),
        });

        let err = load_batch(&failing, warehouse_tables(&changed))
            .await
            .unwrap_err();
        match err {
            EtlError::Write { table, .. } => assert_eq!(table, "tourism"),
            other => panic!("unexpected error: {}", other),
        }

        // Country was staged before the failure but never became visible
        let after = failing.snapshot().unwrap();
        assert_eq!(after, before);
        assert_eq!(after["country"].rows.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_table_is_rejected_before_writing() {
        let store = MemoryStore::new();
        let tables = vec![Table {
            name: "properties".to_string(),
            columns: vec!["id"],
            rows: vec![vec![Value::Int(Some(1))]],
        }];

        let err = load_batch(&store, tables).await.unwrap_err();
        assert!(matches!(err, EtlError::UnknownTable(name) if name == "properties"));
        assert!(store.snapshot().unwrap().is_empty());
    }
}
