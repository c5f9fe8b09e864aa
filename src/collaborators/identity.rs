use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Rider,
    Customer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub display_name: String,
    pub role: Role,
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn lookup(&self, user_id: Uuid) -> Result<UserProfile, AppError>;
}

#[derive(Debug, Default)]
pub struct InMemoryIdentity {
    users: DashMap<Uuid, UserProfile>,
}

impl InMemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: UserProfile) {
        self.users.insert(profile.id, profile);
    }
}

#[async_trait]
impl IdentityService for InMemoryIdentity {
    async fn lookup(&self, user_id: Uuid) -> Result<UserProfile, AppError> {
        self.users
            .get(&user_id)
            .map(|profile| profile.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("user {user_id} not found")))
    }
}
