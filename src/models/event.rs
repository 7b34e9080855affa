use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::donation::{Donation, DonationStatus};
use crate::models::request::{DonationRequest, RequestStatus};

/// Marketplace changes pushed to subscribers on `/ws`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum MarketEvent {
    DonationCreated(Donation),
    DonationUpdated(Donation),
    DonationDeleted { id: Uuid },
    DonationStatusChanged { id: Uuid, status: DonationStatus },
    RequestCreated(DonationRequest),
    RequestStatusChanged { id: Uuid, donation: Uuid, status: RequestStatus },
}
