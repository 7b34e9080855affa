use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{delete, get, patch};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::rest::session::Session;
use crate::engine::lifecycle::{Actor, transition};
use crate::error::AppError;
use crate::models::delivery::Delivery;
use crate::models::donation::DonationChange;
use crate::models::event::MarketEvent;
use crate::models::request::{DonationRequest, RequestStatus};
use crate::models::user::Role;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/requests/received", get(received_requests))
        .route("/requests/my", get(my_requests))
        .route("/requests/:id/status", patch(update_request_status))
        .route("/requests/:id/cancel", delete(cancel_request))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequestStatus {
    pub status: RequestStatus,
    pub delivery_person: Option<Uuid>,
}

async fn received_requests(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Json<Vec<Delivery>> {
    Json(populated_where(&state, |request| request.donor == session.id()))
}

async fn my_requests(State(state): State<Arc<AppState>>, session: Session) -> Json<Vec<Delivery>> {
    Json(populated_where(&state, |request| {
        request.receiver == session.id()
    }))
}

fn populated_where(
    state: &AppState,
    predicate: impl Fn(&DonationRequest) -> bool,
) -> Vec<Delivery> {
    let mut requests: Vec<DonationRequest> = state
        .requests
        .iter()
        .filter(|entry| predicate(entry.value()))
        .map(|entry| entry.value().clone())
        .collect();
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    requests.iter().map(|request| state.populate(request)).collect()
}

async fn update_request_status(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRequestStatus>,
) -> Result<Json<DonationRequest>, AppError> {
    let request = load_request(&state, &id)?;

    if request.donor != session.id() {
        return Err(AppError::Forbidden(
            "not authorized to manage this request".to_string(),
        ));
    }

    let donation_change = transition(Actor::Donor, request.status, payload.status)?;

    let mut delivery_person = None;
    if payload.status == RequestStatus::Approved {
        if let Some(driver_id) = payload.delivery_person {
            let driver = state
                .user(&driver_id)
                .ok_or_else(|| AppError::BadRequest(format!("driver {driver_id} not found")))?;
            if driver.role != Role::Driver {
                return Err(AppError::BadRequest(format!(
                    "user {driver_id} is not a driver"
                )));
            }
            delivery_person = Some(driver_id);
        }
    }

    // Approval claims the donation before the request moves.
    if let Some(change) = donation_change {
        state
            .set_donation_status(&request.donation, change)
            .map_err(|err| match err {
                AppError::Conflict(_) => {
                    AppError::Conflict("donation is no longer available".to_string())
                }
                other => other,
            })?;
    }

    let updated = match apply(&state, &id, request.status, |request| {
        request.status = payload.status;
        request.responded_at = Some(Utc::now());
        if delivery_person.is_some() {
            request.delivery_person = delivery_person;
        }
    }) {
        Ok(updated) => updated,
        Err(err) => {
            if let Some(change) = donation_change {
                sync_donation(&state, &request.donation, change.reverse());
            }
            return Err(err);
        }
    };

    info!(
        request_id = %updated.id,
        status = ?updated.status,
        delivery_person = ?updated.delivery_person,
        "request answered"
    );

    Ok(Json(updated))
}

async fn cancel_request(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<DonationRequest>, AppError> {
    let request = load_request(&state, &id)?;

    if request.receiver != session.id() {
        return Err(AppError::Forbidden(
            "not authorized to cancel this request".to_string(),
        ));
    }

    let donation_change =
        transition(Actor::Receiver, request.status, RequestStatus::Cancelled)?;

    let updated = apply(&state, &id, request.status, |request| {
        request.status = RequestStatus::Cancelled;
    })?;

    if let Some(change) = donation_change {
        sync_donation(&state, &updated.donation, change);
    }

    info!(request_id = %updated.id, "request cancelled");

    Ok(Json(updated))
}

pub(crate) fn load_request(state: &AppState, id: &Uuid) -> Result<DonationRequest, AppError> {
    state
        .requests
        .get(id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("request {} not found", id)))
}

/// Moves the donation behind a request that has already changed. A donation
/// found in an unexpected status is left as is.
pub(crate) fn sync_donation(state: &AppState, donation: &Uuid, change: DonationChange) {
    if let Err(err) = state.set_donation_status(donation, change) {
        warn!(donation_id = %donation, error = %err, "donation status not synced");
    }
}

/// Applies `change` if the request is still in `expected` status, then counts
/// and publishes the new status.
pub(crate) fn apply(
    state: &AppState,
    id: &Uuid,
    expected: RequestStatus,
    change: impl FnOnce(&mut DonationRequest),
) -> Result<DonationRequest, AppError> {
    let mut request = state
        .requests
        .get_mut(id)
        .ok_or_else(|| AppError::NotFound(format!("request {} not found", id)))?;

    if request.status != expected {
        return Err(AppError::Conflict(format!(
            "request {} changed concurrently",
            id
        )));
    }

    change(&mut request);
    request.updated_at = Utc::now();
    let updated = request.clone();
    drop(request);

    state
        .metrics
        .requests_total
        .with_label_values(&[updated.status.as_str()])
        .inc();
    state.publish(MarketEvent::RequestStatusChanged {
        id: updated.id,
        donation: updated.donation,
        status: updated.status,
    });

    Ok(updated)
}
