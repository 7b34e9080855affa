use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::user::{Role, User};
use crate::state::AppState;

/// Header set by the upstream auth gateway once it has authenticated the
/// caller.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller, resolved per request.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn require_role(&self, roles: &[Role]) -> Result<(), AppError> {
        if self.user.has_role(roles) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "role {:?} is not allowed to do this",
                self.user.role
            )))
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Session {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized("missing session".to_string()))?
            .to_str()
            .map_err(|_| AppError::Unauthorized("malformed session".to_string()))?;

        let id = Uuid::parse_str(raw.trim())
            .map_err(|_| AppError::Unauthorized("malformed session".to_string()))?;

        let user = state
            .user(&id)
            .ok_or_else(|| AppError::Unauthorized("unknown user".to_string()))?;

        Ok(Session { user })
    }
}
