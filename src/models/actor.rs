use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Actor {
    System,
    Admin(Uuid),
    Rider(Uuid),
    Customer(Uuid),
}

impl Actor {
    pub fn label(&self) -> String {
        match self {
            Actor::System => "system".to_string(),
            Actor::Admin(id) => format!("admin:{id}"),
            Actor::Rider(id) => format!("rider:{id}"),
            Actor::Customer(id) => format!("customer:{id}"),
        }
    }

    pub fn is_privileged(&self) -> bool {
        matches!(self, Actor::System | Actor::Admin(_))
    }
}
