use chrono::{DateTime, Days, Local, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::haversine_km;
use crate::models::donation::{Donation, FoodType};
use crate::models::location::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ExpiryWindow {
    #[default]
    #[serde(rename = "all")]
    All,
    #[serde(rename = "today")]
    Today,
    #[serde(rename = "3days")]
    ThreeDays,
    #[serde(rename = "week")]
    Week,
}

impl ExpiryWindow {
    fn days_ahead(&self) -> Option<u64> {
        match self {
            ExpiryWindow::All => None,
            ExpiryWindow::Today => Some(0),
            ExpiryWindow::ThreeDays => Some(3),
            ExpiryWindow::Week => Some(7),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DonationFilter {
    pub query: Option<String>,
    pub food_type: Option<FoodType>,
    pub expiry: ExpiryWindow,
    pub max_distance_km: Option<f64>,
    pub user_location: Option<GeoPoint>,
}

impl DonationFilter {
    fn query(&self) -> Option<String> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|query| !query.is_empty())
            .map(str::to_lowercase)
    }

    fn radius(&self) -> Option<(GeoPoint, f64)> {
        match (self.user_location, self.max_distance_km) {
            (Some(origin), Some(max_km)) => Some((origin, max_km)),
            _ => None,
        }
    }
}

/// Filters donations against `filter`, using the local clock for expiry.
pub fn filter_donations(donations: &[Donation], filter: &DonationFilter) -> Vec<Donation> {
    filter_donations_at(donations, filter, &Local::now())
}

/// Filters donations against `filter` with expiry windows anchored on `now`.
///
/// All predicates must hold; relative order is preserved.
pub fn filter_donations_at<Tz: TimeZone>(
    donations: &[Donation],
    filter: &DonationFilter,
    now: &DateTime<Tz>,
) -> Vec<Donation> {
    let query = filter.query();
    let expires_before = filter
        .expiry
        .days_ahead()
        .and_then(|days| end_of_day(now, days));
    let radius = filter.radius();

    donations
        .iter()
        .filter(|donation| query.as_deref().is_none_or(|q| matches_query(donation, q)))
        .filter(|donation| filter.food_type.is_none_or(|ft| donation.food_type == ft))
        .filter(|donation| match (expires_before, donation.best_before) {
            (Some(deadline), Some(best_before)) => best_before < deadline,
            _ => true,
        })
        .filter(|donation| {
            radius.is_none_or(|(origin, max_km)| within_radius(donation, &origin, max_km))
        })
        .cloned()
        .collect()
}

fn matches_query(donation: &Donation, query: &str) -> bool {
    [
        donation.title.as_str(),
        donation.description.as_str(),
        donation.food_type.label(),
        donation.pickup_location.as_str(),
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(query))
}

fn within_radius(donation: &Donation, origin: &GeoPoint, max_km: f64) -> bool {
    donation
        .location
        .as_ref()
        .map(|location| location.point())
        .filter(GeoPoint::is_valid)
        .is_some_and(|point| haversine_km(origin, &point) <= max_km)
}

/// Last instant of the calendar day `days` after `now`, in `now`'s zone.
fn end_of_day<Tz: TimeZone>(now: &DateTime<Tz>, days: u64) -> Option<DateTime<Utc>> {
    let day = now.date_naive().checked_add_days(Days::new(days))?;
    let last_instant = NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?;

    now.timezone()
        .from_local_datetime(&day.and_time(last_instant))
        .latest()
        .map(|end| end.with_timezone(&Utc))
}
