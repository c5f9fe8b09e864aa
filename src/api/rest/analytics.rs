use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::api::rest::auth::Caller;
use crate::engine::analytics::{
    get_assignment_analytics, get_delivery_metrics, AssignmentAnalytics, DeliveryMetrics,
    Timeframe,
};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analytics/assignments", get(assignments))
        .route("/analytics/deliveries", get(deliveries))
}

#[derive(Deserialize)]
pub struct TimeframeQuery {
    pub timeframe: Option<String>,
}

impl TimeframeQuery {
    fn parse(&self) -> Result<Timeframe, AppError> {
        self.timeframe
            .as_deref()
            .map(str::parse::<Timeframe>)
            .transpose()
            .map(Option::unwrap_or_default)
    }
}

async fn assignments(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<TimeframeQuery>,
) -> Result<Json<AssignmentAnalytics>, AppError> {
    caller.require_admin()?;
    Ok(Json(get_assignment_analytics(&state, query.parse()?).await?))
}

async fn deliveries(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<TimeframeQuery>,
) -> Result<Json<DeliveryMetrics>, AppError> {
    caller.require_admin()?;
    Ok(Json(get_delivery_metrics(&state, query.parse()?).await?))
}
