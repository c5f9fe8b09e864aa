use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::collaborators::{Role, UserProfile};
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::state::AppState;

pub const USER_HEADER: &str = "x-user-id";

#[derive(Debug, Clone)]
pub struct Caller {
    pub profile: UserProfile,
    /// Rider record of a rider user; `None` until they have onboarded.
    pub rider_id: Option<Uuid>,
}

impl Caller {
    pub fn actor(&self) -> Result<Actor, AppError> {
        match self.profile.role {
            Role::Admin => Ok(Actor::Admin(self.profile.id)),
            Role::Customer => Ok(Actor::Customer(self.profile.id)),
            Role::Rider => self
                .rider_id
                .map(Actor::Rider)
                .ok_or_else(|| AppError::Forbidden("rider profile not onboarded".to_string())),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.profile.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<Actor, AppError> {
        if self.is_admin() {
            Ok(Actor::Admin(self.profile.id))
        } else {
            Err(AppError::Forbidden(format!(
                "user {} is not an administrator",
                self.profile.id
            )))
        }
    }

    pub fn require_rider_or_admin(&self, rider_id: Uuid) -> Result<Actor, AppError> {
        if self.is_admin() {
            return Ok(Actor::Admin(self.profile.id));
        }
        match self.rider_id {
            Some(own) if own == rider_id => Ok(Actor::Rider(own)),
            _ => Err(AppError::Forbidden(format!(
                "user {} may not act for rider {rider_id}",
                self.profile.id
            ))),
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .ok_or_else(|| AppError::Forbidden("missing or malformed caller identity".to_string()))?;

        let profile = state.identity.lookup(user_id).await.map_err(|err| match err {
            AppError::NotFound(_) => AppError::Forbidden(format!("unknown user {user_id}")),
            other => other,
        })?;

        let rider_id = if profile.role == Role::Rider {
            match state.riders.find_by_user(user_id).await {
                Ok(rider) => Some(rider.id),
                Err(AppError::NotFound(_)) => None,
                Err(err) => return Err(err),
            }
        } else {
            None
        };

        Ok(Caller { profile, rider_id })
    }
}
