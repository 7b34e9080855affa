use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StopKind {
    Pickup,
    Dropoff,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: StopKind,
    pub donation_title: String,
    pub address: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub contact_name: String,
    pub contact_phone: Option<String>,
    pub delivery_id: Uuid,
}

impl Stop {
    /// The stop's coordinate, if both components are present and usable.
    pub fn point(&self) -> Option<GeoPoint> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }).filter(GeoPoint::is_valid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlan {
    pub start: GeoPoint,
    pub stops: Vec<Stop>,
    pub total_distance_km: f64,
    pub estimated_minutes: u32,
}
