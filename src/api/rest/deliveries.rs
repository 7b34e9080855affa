use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{get, patch};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api::rest::donations::coordinate;
use crate::api::rest::requests::{apply, load_request, sync_donation};
use crate::api::rest::session::Session;
use crate::engine::lifecycle::{Actor, transition};
use crate::engine::route::plan_route;
use crate::engine::stops::extract_stops;
use crate::error::AppError;
use crate::models::delivery::Delivery;
use crate::models::request::{DonationRequest, RequestStatus};
use crate::models::stop::RoutePlan;
use crate::models::user::Role;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", get(my_deliveries))
        .route("/deliveries/route", get(route_plan))
        .route("/deliveries/:id", patch(update_delivery_status))
}

#[derive(Deserialize)]
pub struct UpdateDeliveryStatus {
    pub status: RequestStatus,
}

#[derive(Deserialize, Default)]
pub struct RouteQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

fn deliveries_for(
    state: &AppState,
    driver_id: Uuid,
    statuses: &[RequestStatus],
) -> Vec<Delivery> {
    let mut requests: Vec<DonationRequest> = state
        .requests
        .iter()
        .filter(|entry| {
            let request = entry.value();
            request.delivery_person == Some(driver_id) && statuses.contains(&request.status)
        })
        .map(|entry| entry.value().clone())
        .collect();
    requests.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    requests.iter().map(|request| state.populate(request)).collect()
}

async fn my_deliveries(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<Vec<Delivery>>, AppError> {
    session.require_role(&[Role::Driver])?;

    Ok(Json(deliveries_for(
        &state,
        session.id(),
        &[
            RequestStatus::Approved,
            RequestStatus::InTransit,
            RequestStatus::Completed,
        ],
    )))
}

async fn update_delivery_status(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateDeliveryStatus>,
) -> Result<Json<DonationRequest>, AppError> {
    session.require_role(&[Role::Driver])?;

    let request = load_request(&state, &id)?;
    if request.delivery_person != Some(session.id()) {
        return Err(AppError::Forbidden("not authorized".to_string()));
    }

    let donation_change = transition(Actor::Driver, request.status, payload.status)?;

    let updated = apply(&state, &id, request.status, |request| {
        request.status = payload.status;
        if payload.status == RequestStatus::Completed {
            request.completed_at = Some(Utc::now());
        }
    })?;

    if let Some(change) = donation_change {
        sync_donation(&state, &updated.donation, change);
    }

    info!(request_id = %updated.id, driver_id = %session.id(), status = ?updated.status, "delivery progressed");

    Ok(Json(updated))
}

/// Orders the caller's open deliveries into a pickup/dropoff route starting
/// at the given position, or at the configured default when none is given.
async fn route_plan(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(query): Query<RouteQuery>,
) -> Result<Json<RoutePlan>, AppError> {
    session.require_role(&[Role::Driver])?;

    let start = coordinate(query.lat, query.lng)?.unwrap_or(state.default_location);
    let deliveries = deliveries_for(
        &state,
        session.id(),
        &[RequestStatus::Approved, RequestStatus::InTransit],
    );

    let stops = extract_stops(&deliveries);
    let plan = plan_route(&stops, start);

    state.metrics.route_plans_total.inc();
    state.metrics.route_plan_stops.observe(plan.stops.len() as f64);
    info!(
        driver_id = %session.id(),
        stops = plan.stops.len(),
        distance_km = plan.total_distance_km,
        minutes = plan.estimated_minutes,
        "route planned"
    );

    Ok(Json(plan))
}
