use std::{collections::HashSet, time::Duration};

use chrono::{NaiveDate, Utc};
use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};

/// Region code used by the charts backend for worldwide charts.
pub const GLOBAL_REGION: &str = "global";
/// Region code stored in the combined dataset for worldwide charts.
pub const WORLDWIDE_CODE: &str = "ww";

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{}', expected YYYY-MM-DD", value))
}

/// Current UTC time as `2024-01-31T12:00:00.000000Z`.
pub fn utc_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Every day from `start` to `end`, both inclusive.
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|date| *date <= end).collect()
}

/// Maps a region code to the form used in chart URLs and file names.
pub fn normalize_region(code: &str) -> String {
    let code = code.trim().to_lowercase();
    if code == WORLDWIDE_CODE {
        GLOBAL_REGION.to_string()
    } else {
        code
    }
}

/// Maps a chart region code to the form stored in the combined dataset.
pub fn dataset_region(code: &str) -> String {
    let code = code.trim().to_lowercase();
    if code == GLOBAL_REGION {
        WORLDWIDE_CODE.to_uppercase()
    } else {
        code.to_uppercase()
    }
}

pub fn chart_alias(region: &str) -> String {
    format!("regional-{}-daily", region)
}

pub fn chart_filename(region: &str, date: NaiveDate) -> String {
    format!("{}-{}.csv", chart_alias(region), date.format("%Y-%m-%d"))
}

/// Splits `regional-<region>-daily-<YYYY-MM-DD>.csv` into region and date.
pub fn parse_chart_filename(name: &str) -> Option<(String, NaiveDate)> {
    let stem = name.strip_suffix(".csv")?;
    let rest = stem.strip_prefix("regional-")?;
    let (region, date) = rest.split_once("-daily-")?;
    if region.is_empty() {
        return None;
    }
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some((region.to_string(), date))
}

/// Returns the last segment of a `spotify:<kind>:<id>` URI.
pub fn id_from_uri(uri: &str) -> &str {
    uri.rsplit(':').next().unwrap_or(uri)
}

/// Keeps the first occurrence of every value, preserving order.
pub fn remove_duplicates(values: &mut Vec<String>) {
    let mut seen = HashSet::new();
    values.retain(|v| seen.insert(v.clone()));
}

/// Seconds from a `Retry-After` header. HTTP dates are not supported.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Uniformly random duration in `[min, max]`.
pub fn random_duration(min: Duration, max: Duration) -> Duration {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    let lo = lo.as_millis() as u64;
    let hi = hi.as_millis() as u64;
    if lo == hi {
        return Duration::from_millis(lo);
    }
    Duration::from_millis(rand::rng().random_range(lo..=hi))
}
