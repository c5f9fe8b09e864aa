use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::engine::lifecycle::expire_offer;
use crate::engine::reassignment::{self, ReassignTrigger};
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::state::AppState;

const AUTO_EXPIRY_NOTE: &str = "offer expired automatically: no rider response";

#[derive(Debug, Default, Clone, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub expired: Vec<Uuid>,
    pub failed: Vec<Uuid>,
}

pub async fn sweep_once(state: &AppState) -> Result<SweepReport, AppError> {
    let lapsed = state
        .deliveries
        .list_expired_offers(state.clock.now())
        .await?;

    let mut report = SweepReport {
        scanned: lapsed.len(),
        ..SweepReport::default()
    };

    for delivery in lapsed {
        match expire_offer(state, delivery.id, AUTO_EXPIRY_NOTE).await {
            Ok(Some(expired)) => {
                info!(
                    delivery_id = %expired.id,
                    rider_id = ?expired.rider_id,
                    "offer expired by sweeper"
                );
                report.expired.push(expired.id);
            }
            Ok(None) => {
                debug!(delivery_id = %delivery.id, "offer settled before the sweeper reached it");
            }
            Err(err) => {
                error!(delivery_id = %delivery.id, error = %err, "failed to expire offer");
                report.failed.push(delivery.id);
            }
        }
    }

    Ok(report)
}

pub async fn run_expiry_sweeper(state: Arc<AppState>, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "expiry sweeper started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let report = match sweep_once(&state).await {
            Ok(report) => report,
            Err(err) => {
                error!(error = %err, "expiry sweep failed");
                continue;
            }
        };

        if !report.expired.is_empty() || !report.failed.is_empty() {
            info!(
                scanned = report.scanned,
                expired = report.expired.len(),
                failed = report.failed.len(),
                "expiry sweep finished"
            );
        }

        if !state.policy.reassign_on_expiry {
            continue;
        }
        for delivery_id in report.expired {
            if let Err(err) = reassignment::reassign(
                &state,
                delivery_id,
                ReassignTrigger::Expired,
                Actor::System,
                None,
            )
            .await
            {
                error!(delivery_id = %delivery_id, error = %err, "reassignment after expiry failed");
            }
        }
    }
}
