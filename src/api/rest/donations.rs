use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::rest::session::Session;
use crate::engine::filter::{DonationFilter, ExpiryWindow, filter_donations};
use crate::error::AppError;
use crate::models::donation::{Donation, DonationStatus, FoodType};
use crate::models::event::MarketEvent;
use crate::models::location::{GeoLocation, GeoPoint};
use crate::models::request::{DEFAULT_REQUEST_MESSAGE, DonationRequest, RequestStatus};
use crate::models::user::Role;
use crate::state::AppState;

const MAX_TITLE_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 500;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/donations", post(create_donation).get(list_donations))
        .route("/donations/my", get(my_donations))
        .route(
            "/donations/:id",
            get(get_donation).put(update_donation).delete(delete_donation),
        )
        .route("/donations/:id/request", post(request_donation))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDonationRequest {
    pub title: String,
    pub description: String,
    pub food_type: FoodType,
    pub quantity: String,
    pub pickup_location: String,
    pub best_before: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub allergens: Vec<String>,
    #[serde(default)]
    pub dietary_info: Vec<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDonationRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub food_type: Option<FoodType>,
    pub quantity: Option<String>,
    pub pickup_location: Option<String>,
    pub best_before: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub images: Option<Vec<String>>,
    pub allergens: Option<Vec<String>>,
    pub dietary_info: Option<Vec<String>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListDonationsQuery {
    pub status: Option<DonationStatus>,
    pub q: Option<String>,
    pub food_type: Option<String>,
    pub expiry: Option<ExpiryWindow>,
    pub max_distance: Option<f64>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl ListDonationsQuery {
    fn filter(&self) -> Result<DonationFilter, AppError> {
        let food_type = match self.food_type.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) if raw.eq_ignore_ascii_case("all") || raw.eq_ignore_ascii_case("all types") => {
                None
            }
            Some(raw) => Some(
                FoodType::from_label(raw)
                    .ok_or_else(|| AppError::BadRequest(format!("unknown food type: {raw}")))?,
            ),
        };

        let user_location = coordinate(self.lat, self.lng)?;

        if let Some(max_km) = self.max_distance {
            if !max_km.is_finite() || max_km < 0.0 {
                return Err(AppError::BadRequest(format!(
                    "maxDistance must be a non-negative number, got {max_km}"
                )));
            }
        }

        Ok(DonationFilter {
            query: self.q.clone(),
            food_type,
            expiry: self.expiry.unwrap_or_default(),
            max_distance_km: self.max_distance,
            user_location,
        })
    }
}

#[derive(Deserialize, Default)]
pub struct RequestDonationBody {
    pub message: Option<String>,
}

#[derive(Serialize)]
pub struct DeletedResponse {
    pub message: &'static str,
}

/// Parses an optional `lat`/`lng` pair. Both or neither must be given.
pub(crate) fn coordinate(lat: Option<f64>, lng: Option<f64>) -> Result<Option<GeoPoint>, AppError> {
    match (lat, lng) {
        (None, None) => Ok(None),
        (Some(lat), Some(lng)) => {
            let point = GeoPoint::new(lat, lng);
            if point.is_valid() {
                Ok(Some(point))
            } else {
                Err(AppError::BadRequest(format!("invalid coordinates: {point:?}")))
            }
        }
        _ => Err(AppError::BadRequest(
            "latitude and longitude must be given together".to_string(),
        )),
    }
}

fn validate(donation: &Donation) -> Result<(), AppError> {
    if donation.title.is_empty() {
        return Err(AppError::BadRequest("add a title for the donation".to_string()));
    }
    if donation.title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::BadRequest(format!(
            "title can not be more than {MAX_TITLE_LEN} characters"
        )));
    }
    if donation.description.trim().is_empty() {
        return Err(AppError::BadRequest("add a description".to_string()));
    }
    if donation.description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(AppError::BadRequest(format!(
            "description can not be more than {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    if donation.quantity.trim().is_empty() {
        return Err(AppError::BadRequest("specify the quantity".to_string()));
    }
    if donation.pickup_location.trim().is_empty() {
        return Err(AppError::BadRequest("add a pickup address".to_string()));
    }
    Ok(())
}

fn pickup_point(
    lat: Option<f64>,
    lng: Option<f64>,
    address: &str,
) -> Result<Option<GeoLocation>, AppError> {
    Ok(coordinate(lat, lng)?.map(|point| GeoLocation {
        formatted_address: Some(address.to_string()),
        ..GeoLocation::from_point(point)
    }))
}

fn newest_first(donations: &mut [Donation]) {
    donations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

async fn create_donation(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<CreateDonationRequest>,
) -> Result<(StatusCode, Json<Donation>), AppError> {
    session.require_role(&[Role::Donor, Role::Admin])?;

    let location = pickup_point(payload.latitude, payload.longitude, &payload.pickup_location)?;
    let now = Utc::now();
    let donation = Donation {
        id: Uuid::new_v4(),
        title: payload.title.trim().to_string(),
        description: payload.description,
        food_type: payload.food_type,
        quantity: payload.quantity,
        pickup_location: payload.pickup_location,
        location,
        best_before: payload.best_before,
        status: DonationStatus::Available,
        images: payload.images,
        allergens: payload.allergens,
        dietary_info: payload.dietary_info,
        donor: session.id(),
        created_at: now,
        updated_at: now,
    };
    validate(&donation)?;

    state.donations.insert(donation.id, donation.clone());
    state.metrics.donations_created_total.inc();
    state.publish(MarketEvent::DonationCreated(donation.clone()));

    info!(donation_id = %donation.id, donor_id = %donation.donor, food_type = %donation.food_type, "donation created");

    Ok((StatusCode::CREATED, Json(donation)))
}

async fn list_donations(
    State(state): State<Arc<AppState>>,
    _session: Session,
    Query(query): Query<ListDonationsQuery>,
) -> Result<Json<Vec<Donation>>, AppError> {
    let filter = query.filter()?;
    let status = query.status.unwrap_or(DonationStatus::Available);

    let mut donations: Vec<Donation> = state
        .donations
        .iter()
        .filter(|entry| entry.value().status == status)
        .map(|entry| entry.value().clone())
        .collect();
    newest_first(&mut donations);

    Ok(Json(filter_donations(&donations, &filter)))
}

async fn my_donations(State(state): State<Arc<AppState>>, session: Session) -> Json<Vec<Donation>> {
    let mut donations: Vec<Donation> = state
        .donations
        .iter()
        .filter(|entry| entry.value().donor == session.id())
        .map(|entry| entry.value().clone())
        .collect();
    newest_first(&mut donations);

    Json(donations)
}

async fn get_donation(
    State(state): State<Arc<AppState>>,
    _session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Donation>, AppError> {
    state
        .donation(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("donation {} not found", id)))
}

async fn update_donation(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateDonationRequest>,
) -> Result<Json<Donation>, AppError> {
    let mut donation = state
        .donations
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("donation {} not found", id)))?;

    if donation.donor != session.id() {
        return Err(AppError::Forbidden(
            "not authorized to update this donation".to_string(),
        ));
    }

    let mut updated = donation.clone();
    if let Some(title) = payload.title {
        updated.title = title.trim().to_string();
    }
    if let Some(description) = payload.description {
        updated.description = description;
    }
    if let Some(food_type) = payload.food_type {
        updated.food_type = food_type;
    }
    if let Some(quantity) = payload.quantity {
        updated.quantity = quantity;
    }
    if let Some(pickup_location) = payload.pickup_location {
        updated.pickup_location = pickup_location;
    }
    if payload.best_before.is_some() {
        updated.best_before = payload.best_before;
    }
    if let Some(location) =
        pickup_point(payload.latitude, payload.longitude, &updated.pickup_location)?
    {
        updated.location = Some(location);
    }
    if let Some(images) = payload.images {
        updated.images = images;
    }
    if let Some(allergens) = payload.allergens {
        updated.allergens = allergens;
    }
    if let Some(dietary_info) = payload.dietary_info {
        updated.dietary_info = dietary_info;
    }
    validate(&updated)?;

    updated.updated_at = Utc::now();
    *donation = updated.clone();
    drop(donation);

    state.publish(MarketEvent::DonationUpdated(updated.clone()));
    Ok(Json(updated))
}

async fn delete_donation(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, AppError> {
    let donation = state
        .donation(&id)
        .ok_or_else(|| AppError::NotFound(format!("donation {} not found", id)))?;

    if donation.donor != session.id() {
        return Err(AppError::Forbidden(
            "not authorized to delete this donation".to_string(),
        ));
    }

    let in_flight = state.requests.iter().any(|entry| {
        let request = entry.value();
        request.donation == id
            && matches!(
                request.status,
                RequestStatus::Approved | RequestStatus::InTransit
            )
    });
    if in_flight {
        return Err(AppError::Conflict(
            "donation has a delivery in progress".to_string(),
        ));
    }

    // A donation claimed since the scan above stays.
    let removed = state.donations.remove_if(&id, |_, donation| {
        !matches!(
            donation.status,
            DonationStatus::Pending | DonationStatus::InTransit
        )
    });
    if removed.is_none() {
        return Err(AppError::Conflict(
            "donation has a delivery in progress".to_string(),
        ));
    }

    let pending: Vec<Uuid> = state
        .requests
        .iter()
        .filter(|entry| entry.value().donation == id && entry.value().status == RequestStatus::Pending)
        .map(|entry| *entry.key())
        .collect();
    for request_id in pending {
        if let Some(mut request) = state.requests.get_mut(&request_id) {
            request.status = RequestStatus::Cancelled;
            request.updated_at = Utc::now();
            let event = MarketEvent::RequestStatusChanged {
                id: request.id,
                donation: id,
                status: request.status,
            };
            drop(request);
            state.publish(event);
        }
    }

    state.publish(MarketEvent::DonationDeleted { id });
    info!(donation_id = %id, "donation removed");

    Ok(Json(DeletedResponse {
        message: "Donation removed",
    }))
}

async fn request_donation(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
    body: Option<Json<RequestDonationBody>>,
) -> Result<(StatusCode, Json<DonationRequest>), AppError> {
    session.require_role(&[Role::Receiver, Role::Admin])?;

    let donation = state
        .donation(&id)
        .ok_or_else(|| AppError::NotFound(format!("donation {} not found", id)))?;

    if donation.status != DonationStatus::Available {
        return Err(AppError::BadRequest(
            "donation is no longer available".to_string(),
        ));
    }
    if donation.donor == session.id() {
        return Err(AppError::BadRequest(
            "cannot request your own donation".to_string(),
        ));
    }

    let message = body
        .and_then(|Json(body)| body.message)
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| DEFAULT_REQUEST_MESSAGE.to_string());

    let now = Utc::now();
    let request = DonationRequest {
        id: Uuid::new_v4(),
        donation: donation.id,
        receiver: session.id(),
        donor: donation.donor,
        delivery_person: None,
        message,
        status: RequestStatus::Pending,
        responded_at: None,
        completed_at: None,
        created_at: now,
        updated_at: now,
    };

    match state.request_keys.entry((donation.id, session.id())) {
        Entry::Occupied(_) => {
            return Err(AppError::Conflict(
                "you have already requested this donation".to_string(),
            ));
        }
        Entry::Vacant(slot) => {
            slot.insert(request.id);
        }
    }

    state.requests.insert(request.id, request.clone());
    state
        .metrics
        .requests_total
        .with_label_values(&[request.status.as_str()])
        .inc();
    state.publish(MarketEvent::RequestCreated(request.clone()));

    info!(request_id = %request.id, donation_id = %donation.id, receiver_id = %request.receiver, "donation requested");

    Ok((StatusCode::CREATED, Json(request)))
}
