//! Departure-time filtering and ordering of ride search results.
//!
//! Runs after the database query, on the rows that are about to be returned.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::utils::time::hour_component;

/// Fields the engine reads from a ride.
pub trait RideFields {
    fn hour_of_departure(&self) -> Option<&str>;
    fn hour_of_arrival(&self) -> Option<&str>;
    fn price(&self) -> Option<Decimal>;
    fn duration(&self) -> Option<i32>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimeBucket {
    #[serde(rename = "before-6")]
    Before6,
    #[serde(rename = "6-12")]
    From6To12,
    #[serde(rename = "12-18")]
    From12To18,
    #[serde(rename = "after-18")]
    After18,
}

impl TimeBucket {
    pub fn key(self) -> &'static str {
        match self {
            TimeBucket::Before6 => "before-6",
            TimeBucket::From6To12 => "6-12",
            TimeBucket::From12To18 => "12-18",
            TimeBucket::After18 => "after-18",
        }
    }

    pub fn contains(self, hour: u32) -> bool {
        match self {
            TimeBucket::Before6 => hour < 6,
            TimeBucket::From6To12 => (6..=12).contains(&hour),
            TimeBucket::From12To18 => hour > 12 && hour <= 18,
            TimeBucket::After18 => hour > 18,
        }
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for TimeBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "before-6" => Ok(TimeBucket::Before6),
            "6-12" => Ok(TimeBucket::From6To12),
            "12-18" => Ok(TimeBucket::From12To18),
            "after-18" => Ok(TimeBucket::After18),
            other => Err(format!("Unknown time filter '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    HourOfDeparture,
    HourOfArrival,
    Price,
    Duration,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "hour_of_departure" => Ok(SortKey::HourOfDeparture),
            "hour_of_arrival" => Ok(SortKey::HourOfArrival),
            "price" => Ok(SortKey::Price),
            "duration" => Ok(SortKey::Duration),
            other => Err(format!("Unknown sort key '{}'", other)),
        }
    }
}

impl SortKey {
    fn compare<R: RideFields>(self, a: &R, b: &R) -> Ordering {
        match self {
            SortKey::HourOfDeparture => a
                .hour_of_departure()
                .unwrap_or_default()
                .cmp(b.hour_of_departure().unwrap_or_default()),
            SortKey::HourOfArrival => a
                .hour_of_arrival()
                .unwrap_or_default()
                .cmp(b.hour_of_arrival().unwrap_or_default()),
            SortKey::Price => a
                .price()
                .unwrap_or_default()
                .cmp(&b.price().unwrap_or_default()),
            SortKey::Duration => a
                .duration()
                .unwrap_or_default()
                .cmp(&b.duration().unwrap_or_default()),
        }
    }
}

/// Whether the ride departs within any of the active buckets.
/// An empty set lets every ride through; an unreadable departure time
/// matches no bucket.
pub fn matches_filters<R: RideFields>(ride: &R, filters: &BTreeSet<TimeBucket>) -> bool {
    if filters.is_empty() {
        return true;
    }

    match ride.hour_of_departure().and_then(hour_component) {
        Some(hour) => filters.iter().any(|bucket| bucket.contains(hour)),
        None => false,
    }
}

/// Filter by departure bucket, then stable-sort by `key`.
pub fn filter_and_sort<R>(rides: &[R], filters: &BTreeSet<TimeBucket>, key: SortKey) -> Vec<R>
where
    R: RideFields + Clone,
{
    let mut selected: Vec<R> = rides
        .iter()
        .filter(|ride| matches_filters(*ride, filters))
        .cloned()
        .collect();

    // slice::sort_by is stable
    selected.sort_by(|a, b| key.compare(a, b));
    selected
}

/// Parse a comma separated list such as `before-6,12-18`.
pub fn parse_filters(raw: &str) -> Result<BTreeSet<TimeBucket>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(TimeBucket::from_str)
        .collect()
}
