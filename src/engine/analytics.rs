use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::delivery::{Delivery, DeliveryStatus, PaymentStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Day,
    #[default]
    Week,
    Month,
    All,
}

impl Timeframe {
    pub fn since(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Timeframe::Day => Some(now - Duration::days(1)),
            Timeframe::Week => Some(now - Duration::weeks(1)),
            Timeframe::Month => Some(now - Duration::days(30)),
            Timeframe::All => None,
        }
    }
}

impl FromStr for Timeframe {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "day" => Ok(Timeframe::Day),
            "week" => Ok(Timeframe::Week),
            "month" => Ok(Timeframe::Month),
            "all" => Ok(Timeframe::All),
            other => Err(AppError::BadRequest(format!("unknown timeframe {other}"))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct AssignmentAnalytics {
    pub timeframe: Timeframe,
    pub created: usize,
    pub assigned: usize,
    pub awaiting_response: usize,
    pub accepted: usize,
    pub declined: usize,
    pub expired: usize,
    pub manual_queue: usize,
    /// Share of answered offers that were accepted, in percent.
    pub acceptance_rate: f64,
    pub avg_seconds_to_assign: Option<f64>,
    pub avg_seconds_to_respond: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DeliveryMetrics {
    pub timeframe: Timeframe,
    pub total: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub in_progress: usize,
    pub completion_rate: f64,
    pub avg_delivery_minutes: Option<f64>,
    pub total_delivery_fees: u64,
    pub total_rider_payments: u64,
    pub released_payouts: u64,
    pub avg_customer_rating: Option<f64>,
    pub by_status: BTreeMap<&'static str, usize>,
}

pub async fn get_assignment_analytics(
    state: &AppState,
    timeframe: Timeframe,
) -> Result<AssignmentAnalytics, AppError> {
    let deliveries = in_timeframe(state, timeframe).await?;
    Ok(summarize_assignments(&deliveries, timeframe))
}

pub async fn get_delivery_metrics(
    state: &AppState,
    timeframe: Timeframe,
) -> Result<DeliveryMetrics, AppError> {
    let deliveries = in_timeframe(state, timeframe).await?;
    Ok(summarize_deliveries(&deliveries, timeframe))
}

async fn in_timeframe(state: &AppState, timeframe: Timeframe) -> Result<Vec<Delivery>, AppError> {
    let since = timeframe.since(state.clock.now());
    Ok(state
        .deliveries
        .list()
        .await?
        .into_iter()
        .filter(|delivery| since.is_none_or(|start| delivery.created_at >= start))
        .collect())
}

pub fn summarize_assignments(deliveries: &[Delivery], timeframe: Timeframe) -> AssignmentAnalytics {
    let mut report = AssignmentAnalytics {
        timeframe,
        created: deliveries.len(),
        ..AssignmentAnalytics::default()
    };

    let mut assign_secs = Vec::new();
    let mut respond_secs = Vec::new();

    for delivery in deliveries {
        let mut offered = false;
        let mut answered = false;
        for entry in &delivery.status_history {
            match entry.status {
                DeliveryStatus::AwaitingRiderResponse => offered = true,
                DeliveryStatus::Accepted => {
                    report.accepted += 1;
                    answered = true;
                }
                DeliveryStatus::Declined => {
                    report.declined += 1;
                    answered = true;
                }
                DeliveryStatus::Expired => report.expired += 1,
                _ => {}
            }
        }
        if offered {
            report.assigned += 1;
        }
        if delivery.status == DeliveryStatus::AwaitingRiderResponse {
            report.awaiting_response += 1;
        }
        if delivery.status == DeliveryStatus::PendingAssignment
            && delivery.manual_assignment.is_some()
        {
            report.manual_queue += 1;
        }

        if let Some(first_offer) = delivery
            .status_history
            .iter()
            .find(|entry| entry.status == DeliveryStatus::AwaitingRiderResponse)
        {
            assign_secs.push(seconds_between(delivery.created_at, first_offer.at));
        }
        if answered {
            if let (Some(assigned), Some(responded)) =
                (delivery.time_log.assigned_at, delivery.time_log.responded_at)
            {
                respond_secs.push(seconds_between(assigned, responded));
            }
        }
    }

    let answered = report.accepted + report.declined + report.expired;
    report.acceptance_rate = percentage(report.accepted, answered);
    report.avg_seconds_to_assign = mean(&assign_secs);
    report.avg_seconds_to_respond = mean(&respond_secs);
    report
}

pub fn summarize_deliveries(deliveries: &[Delivery], timeframe: Timeframe) -> DeliveryMetrics {
    let mut report = DeliveryMetrics {
        timeframe,
        total: deliveries.len(),
        ..DeliveryMetrics::default()
    };

    let mut minutes = Vec::new();
    let mut ratings = Vec::new();

    for delivery in deliveries {
        *report.by_status.entry(delivery.status.as_str()).or_default() += 1;
        report.total_delivery_fees += delivery.delivery_fee;

        match delivery.status {
            DeliveryStatus::Completed => {
                report.completed += 1;
                report.total_rider_payments += delivery.rider_payment;
            }
            DeliveryStatus::Cancelled => report.cancelled += 1,
            status if !status.is_terminal() => report.in_progress += 1,
            _ => {}
        }

        if delivery.payment_status == PaymentStatus::Released {
            report.released_payouts += delivery.rider_payment;
        }
        if let Some(duration) = delivery.delivery_minutes {
            minutes.push(duration);
        }
        if let Some(feedback) = &delivery.feedback {
            ratings.push(f64::from(feedback.rating));
        }
    }

    report.completion_rate = percentage(report.completed, report.total);
    report.avg_delivery_minutes = mean(&minutes);
    report.avg_customer_rating = mean(&ratings);
    report
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds().max(0) as f64 / 1000.0
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{summarize_assignments, summarize_deliveries, Timeframe};
    use crate::geo::GeoPoint;
    use crate::models::actor::Actor;
    use crate::models::delivery::{Delivery, DeliveryStatus, Location, NewDelivery};

    fn delivery() -> Delivery {
        let location = |lat: f64| Location {
            address: "Allen Avenue".to_string(),
            city: "Lagos".to_string(),
            state: "Lagos".to_string(),
            coordinates: Some(GeoPoint::new(lat, 3.35)),
        };
        Delivery::new(
            NewDelivery {
                order_id: Uuid::new_v4(),
                customer_id: Uuid::new_v4(),
                pickup: location(6.60),
                dropoff: location(6.62),
                delivery_fee: 2_000,
                rider_payment: 1_600,
            },
            Utc::now(),
        )
    }

    fn offered(mut delivery: Delivery, after_secs: i64) -> Delivery {
        let at = delivery.created_at + Duration::seconds(after_secs);
        delivery
            .offer_to(Uuid::new_v4(), at, at + Duration::minutes(3), None, Some(&Actor::System))
            .unwrap();
        delivery
    }

    fn step(delivery: &mut Delivery, status: DeliveryStatus, after_secs: i64) {
        let at = delivery.created_at + Duration::seconds(after_secs);
        delivery.apply_transition(status, at, None, Some(&Actor::System)).unwrap();
    }

    #[test]
    fn parses_timeframes_case_insensitively() {
        assert_eq!("DAY".parse::<Timeframe>().unwrap(), Timeframe::Day);
        assert_eq!("all".parse::<Timeframe>().unwrap(), Timeframe::All);
        assert!("fortnight".parse::<Timeframe>().is_err());
        assert!(Timeframe::All.since(Utc::now()).is_none());
    }

    #[test]
    fn assignment_counts_and_rates() {
        let mut accepted = offered(delivery(), 30);
        step(&mut accepted, DeliveryStatus::Accepted, 90);

        let mut declined = offered(delivery(), 60);
        step(&mut declined, DeliveryStatus::Declined, 120);

        let awaiting = offered(delivery(), 90);

        let mut flagged = delivery();
        flagged.flag_for_manual_assignment(Utc::now(), "no available riders");

        let report = summarize_assignments(&[accepted, declined, awaiting, flagged], Timeframe::All);

        assert_eq!(report.created, 4);
        assert_eq!(report.assigned, 3);
        assert_eq!(report.accepted, 1);
        assert_eq!(report.declined, 1);
        assert_eq!(report.awaiting_response, 1);
        assert_eq!(report.manual_queue, 1);
        assert!((report.acceptance_rate - 50.0).abs() < 1e-9);
        assert_eq!(report.avg_seconds_to_assign, Some(60.0));
        assert_eq!(report.avg_seconds_to_respond, Some(60.0));
    }

    #[test]
    fn delivery_metrics_cover_money_and_duration() {
        let mut done = offered(delivery(), 10);
        step(&mut done, DeliveryStatus::Accepted, 20);
        step(&mut done, DeliveryStatus::PickedUp, 60);
        step(&mut done, DeliveryStatus::InTransit, 120);
        step(&mut done, DeliveryStatus::Delivered, 60 + 25 * 60);
        step(&mut done, DeliveryStatus::Completed, 60 + 30 * 60);

        let mut cancelled = delivery();
        step(&mut cancelled, DeliveryStatus::Cancelled, 5);

        let open = delivery();

        let report = summarize_deliveries(&[done, cancelled, open], Timeframe::All);

        assert_eq!(report.total, 3);
        assert_eq!(report.completed, 1);
        assert_eq!(report.cancelled, 1);
        assert_eq!(report.in_progress, 1);
        assert_eq!(report.total_delivery_fees, 6_000);
        assert_eq!(report.total_rider_payments, 1_600);
        assert_eq!(report.released_payouts, 0);
        assert_eq!(report.avg_delivery_minutes, Some(25.0));
        assert_eq!(report.by_status.get("completed"), Some(&1));
        assert!(report.avg_customer_rating.is_none());
    }

    #[test]
    fn empty_input_yields_zeroes() {
        let report = summarize_deliveries(&[], Timeframe::Day);
        assert_eq!(report.total, 0);
        assert_eq!(report.completion_rate, 0.0);
        assert!(report.avg_delivery_minutes.is_none());
    }
}
