use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::donation::Donation;
use crate::models::request::{DonationRequest, RequestStatus};
use crate::models::user::User;

/// A request with its references resolved, as handed to drivers and donors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub id: Uuid,
    pub donation: Option<Donation>,
    pub receiver: Option<User>,
    pub donor: Option<User>,
    pub delivery_person: Option<Uuid>,
    pub message: String,
    pub status: RequestStatus,
    pub responded_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    pub fn populate(
        request: &DonationRequest,
        donation: Option<Donation>,
        receiver: Option<User>,
        donor: Option<User>,
    ) -> Self {
        Self {
            id: request.id,
            donation,
            receiver,
            donor,
            delivery_person: request.delivery_person,
            message: request.message.clone(),
            status: request.status,
            responded_at: request.responded_at,
            completed_at: request.completed_at,
            created_at: request.created_at,
            updated_at: request.updated_at,
        }
    }
}
