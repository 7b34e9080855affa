use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::GeoLocation;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FoodType {
    #[serde(rename = "Cooked Meal")]
    CookedMeal,
    Vegetables,
    Fruits,
    #[serde(rename = "Canned Goods")]
    CannedGoods,
    #[serde(rename = "Baked Goods")]
    BakedGoods,
    Dairy,
    Beverages,
    Grains,
    Other,
}

impl FoodType {
    pub const ALL: [FoodType; 9] = [
        FoodType::CookedMeal,
        FoodType::Vegetables,
        FoodType::Fruits,
        FoodType::CannedGoods,
        FoodType::BakedGoods,
        FoodType::Dairy,
        FoodType::Beverages,
        FoodType::Grains,
        FoodType::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FoodType::CookedMeal => "Cooked Meal",
            FoodType::Vegetables => "Vegetables",
            FoodType::Fruits => "Fruits",
            FoodType::CannedGoods => "Canned Goods",
            FoodType::BakedGoods => "Baked Goods",
            FoodType::Dairy => "Dairy",
            FoodType::Beverages => "Beverages",
            FoodType::Grains => "Grains",
            FoodType::Other => "Other",
        }
    }

    /// Case-insensitive lookup by display label.
    pub fn from_label(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|food_type| food_type.label().eq_ignore_ascii_case(raw))
    }
}

impl fmt::Display for FoodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DonationStatus {
    #[default]
    Available,
    Pending,
    Confirmed,
    #[serde(rename = "In Transit")]
    InTransit,
    Delivered,
    Expired,
}

/// A donation status move that only applies while the donation is still in
/// `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DonationChange {
    pub from: DonationStatus,
    pub to: DonationStatus,
}

impl DonationChange {
    pub const fn new(from: DonationStatus, to: DonationStatus) -> Self {
        Self { from, to }
    }

    pub const fn reverse(self) -> Self {
        Self {
            from: self.to,
            to: self.from,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub food_type: FoodType,
    pub quantity: String,
    pub pickup_location: String,
    pub location: Option<GeoLocation>,
    pub best_before: Option<DateTime<Utc>>,
    pub status: DonationStatus,
    pub images: Vec<String>,
    pub allergens: Vec<String>,
    pub dietary_info: Vec<String>,
    pub donor: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
