//! Batch configuration loaded from environment variables

use crate::warehouse::normalize;
use crate::warehouse::transform::{CountryScope, TransformOptions};
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub data_dir: PathBuf,
    pub listings_file: PathBuf,
    pub calendar_file: PathBuf,
    pub tourism_file: PathBuf,
    pub weather_file: PathBuf,
    /// Pre-aggregated monthly listing extract, read only when MONTHLY_FILE is set
    pub monthly_file: Option<PathBuf>,
    pub db_max_retries: u32,
    pub db_retry_delay: Duration,
    /// Conversion rates to USD keyed by currency code
    pub currency_rates: HashMap<String, f64>,
    pub country_scope: CountryScope,
    pub dry_run: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir: PathBuf = var("DATA_DIR")
            .unwrap_or_else(|| "./data".to_string())
            .into();
        let file = |key: &str, default: &str| -> PathBuf {
            data_dir.join(var(key).unwrap_or_else(|| default.to_string()))
        };

        let dry_run = match var("DRY_RUN") {
            Some(v) => parse_flag(&v).context("DRY_RUN must be true/false/1/0")?,
            None => false,
        };

        let database_url = var("WAREHOUSE_DB_URL");
        if database_url.is_none() && !dry_run {
            bail!("WAREHOUSE_DB_URL must be set (or DRY_RUN=true)");
        }

        let db_max_retries = var("DB_MAX_RETRIES")
            .unwrap_or_else(|| "20".to_string())
            .trim()
            .parse()
            .context("DB_MAX_RETRIES must be a valid number")?;

        let retry_secs: u64 = var("DB_RETRY_DELAY_SECS")
            .unwrap_or_else(|| "3".to_string())
            .trim()
            .parse()
            .context("DB_RETRY_DELAY_SECS must be a valid number")?;

        let currency_rates = match var("CURRENCY_RATES") {
            Some(v) => parse_rates(&v).context("CURRENCY_RATES must look like EUR=1.08,PHP=0.018")?,
            None => HashMap::new(),
        };

        let country_scope = match var("COUNTRY_SCOPE").map(|v| v.trim().to_lowercase()) {
            None => CountryScope::AllSources,
            Some(v) if v == "all" => CountryScope::AllSources,
            Some(v) if v == "listings" => CountryScope::Listings,
            Some(v) => bail!("COUNTRY_SCOPE must be 'all' or 'listings', got '{}'", v),
        };

        Ok(Config {
            database_url,
            listings_file: file("LISTINGS_FILE", "listings_data.csv"),
            calendar_file: file("CALENDAR_FILE", "calendar_data.csv"),
            tourism_file: file("TOURISM_FILE", "tourism_data.csv"),
            weather_file: file("WEATHER_FILE", "weather_data.csv"),
            monthly_file: var("MONTHLY_FILE").map(|name| data_dir.join(name)),
            data_dir,
            db_max_retries,
            db_retry_delay: Duration::from_secs(retry_secs),
            currency_rates,
            country_scope,
            dry_run,
        })
    }

    pub fn transform_options(&self) -> TransformOptions {
        TransformOptions {
            currency_rates: self.currency_rates.clone(),
            country_scope: self.country_scope,
        }
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => bail!("not a flag: '{}'", other),
    }
}

/// Parse `CODE=rate` pairs separated by commas
fn parse_rates(raw: &str) -> Result<HashMap<String, f64>> {
    let mut rates = HashMap::new();
    for pair in raw.split(',').filter(|p| !p.trim().is_empty()) {
        let Some((code, rate)) = pair.split_once('=') else {
            bail!("missing '=' in '{}'", pair.trim());
        };
        let Some(code) = normalize::currency_code(code) else {
            bail!("empty currency code in '{}'", pair.trim());
        };
        let rate: f64 = rate
            .trim()
            .parse()
            .with_context(|| format!("invalid rate for {}", code))?;
        if !rate.is_finite() || rate <= 0.0 {
            bail!("rate for {} must be positive", code);
        }
        rates.insert(code, rate);
    }
    Ok(rates)
}
