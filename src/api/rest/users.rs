use std::sync::{Arc, LazyLock};

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use regex::Regex;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api::rest::session::Session;
use crate::error::AppError;
use crate::models::location::{GeoLocation, GeoPoint};
use crate::models::user::{Role, User};
use crate::state::AppState;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,3})+$").expect("valid email pattern")
});

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", post(register_user))
        .route("/users/me", get(get_me).put(update_profile))
        .route("/users/drivers", get(list_drivers))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    pub phone: Option<String>,
    pub organization: Option<String>,
    pub avatar: Option<String>,
    pub address: Option<String>,
    pub location: Option<GeoPoint>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub organization: Option<String>,
    pub avatar: Option<String>,
    pub address: Option<String>,
    pub location: Option<GeoPoint>,
}

async fn register_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let email = payload.email.trim().to_lowercase();
    if !EMAIL_PATTERN.is_match(&email) {
        return Err(AppError::BadRequest("email is not valid".to_string()));
    }

    if payload.role == Role::Admin {
        return Err(AppError::Forbidden(
            "admin accounts cannot be self-registered".to_string(),
        ));
    }

    let location = payload.location.map(profile_location).transpose()?;

    let id = match state.emails.entry(email.clone()) {
        Entry::Occupied(_) => {
            return Err(AppError::Conflict(format!("email {email} is already registered")));
        }
        Entry::Vacant(slot) => *slot.insert(Uuid::new_v4()).value(),
    };

    let now = Utc::now();
    let user = User {
        id,
        name,
        email,
        role: payload.role,
        phone: payload.phone,
        organization: payload.organization,
        avatar: payload.avatar,
        address: payload.address,
        location,
        created_at: now,
        updated_at: now,
    };

    state.users.insert(user.id, user.clone());
    info!(user_id = %user.id, role = ?user.role, "user registered");

    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_me(session: Session) -> Json<User> {
    Json(session.user)
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<User>, AppError> {
    let location = payload.location.map(profile_location).transpose()?;

    let mut user = state
        .users
        .get_mut(&session.id())
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", session.id())))?;

    if let Some(name) = payload.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("name cannot be empty".to_string()));
        }
        user.name = name.to_string();
    }
    if payload.phone.is_some() {
        user.phone = payload.phone;
    }
    if payload.organization.is_some() {
        user.organization = payload.organization;
    }
    if payload.avatar.is_some() {
        user.avatar = payload.avatar;
    }
    if payload.address.is_some() {
        user.address = payload.address;
    }
    if location.is_some() {
        user.location = location;
    }
    user.updated_at = Utc::now();

    Ok(Json(user.clone()))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    _session: Session,
) -> Json<Vec<User>> {
    let mut drivers: Vec<User> = state
        .users
        .iter()
        .filter(|entry| entry.value().role == Role::Driver)
        .map(|entry| entry.value().clone())
        .collect();
    drivers.sort_by(|a, b| a.name.cmp(&b.name));

    Json(drivers)
}

fn profile_location(point: GeoPoint) -> Result<GeoLocation, AppError> {
    if !point.is_valid() {
        return Err(AppError::BadRequest(format!("invalid coordinates: {point:?}")));
    }
    Ok(GeoLocation::from_point(point))
}
