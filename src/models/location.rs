use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PointKind {
    #[default]
    Point,
}

/// GeoJSON point as stored on donations and user profiles.
///
/// Coordinates are `[longitude, latitude]`, in GeoJSON order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoLocation {
    #[serde(rename = "type", default)]
    pub kind: PointKind,
    pub coordinates: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_address: Option<String>,
}

impl GeoLocation {
    pub fn from_point(point: GeoPoint) -> Self {
        Self {
            kind: PointKind::Point,
            coordinates: [point.lng, point.lat],
            formatted_address: None,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.coordinates[1],
            lng: self.coordinates[0],
        }
    }
}
