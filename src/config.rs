use std::env;

use crate::error::AppError;
use crate::models::rider::VehicleType;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    /// `json` switches the subscriber to one JSON object per line.
    pub log_format: String,
    pub order_queue_size: usize,
    pub event_buffer_size: usize,
    pub sweep_interval_secs: u64,
    pub policy: DispatchPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
            order_queue_size: parse_or_default("ORDER_QUEUE_SIZE", 1024)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            sweep_interval_secs: parse_or_default("SWEEP_INTERVAL_SECS", 60)?,
            policy: DispatchPolicy::from_env()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchPolicy {
    pub max_search_radius_km: f64,
    pub priority_radius_km: f64,
    pub workload_cap: u32,
    pub min_rating: f64,
    /// Rating assumed for riders nobody has rated yet.
    pub unrated_rider_rating: f64,
    pub min_acceptance_score: f64,
    pub alternates: usize,
    pub acceptance_window_secs: i64,
    pub prep_time_minutes: u32,
    pub handover_time_minutes: u32,
    pub min_security_deposit: u64,
    pub vehicle_requirement_hard_fail: bool,
    pub high_value_threshold: u64,
    pub medium_value_threshold: u64,
    pub premium_fee_threshold: u64,
    pub reassign_on_decline: bool,
    pub reassign_on_expiry: bool,
    pub vehicle_speeds: VehicleSpeeds,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            max_search_radius_km: 15.0,
            priority_radius_km: 5.0,
            workload_cap: 3,
            min_rating: 3.0,
            unrated_rider_rating: 4.0,
            min_acceptance_score: 60.0,
            alternates: 3,
            acceptance_window_secs: 180,
            prep_time_minutes: 15,
            handover_time_minutes: 5,
            min_security_deposit: 70_000,
            vehicle_requirement_hard_fail: true,
            high_value_threshold: 100_000,
            medium_value_threshold: 50_000,
            premium_fee_threshold: 5_000,
            reassign_on_decline: true,
            reassign_on_expiry: true,
            vehicle_speeds: VehicleSpeeds::default(),
        }
    }
}

impl DispatchPolicy {
    pub fn from_env() -> Result<Self, AppError> {
        let d = Self::default();

        let policy = Self {
            max_search_radius_km: parse_or_default("MAX_SEARCH_RADIUS_KM", d.max_search_radius_km)?,
            priority_radius_km: parse_or_default("PRIORITY_RADIUS_KM", d.priority_radius_km)?,
            workload_cap: parse_or_default("WORKLOAD_CAP", d.workload_cap)?,
            min_rating: parse_or_default("MIN_RATING", d.min_rating)?,
            unrated_rider_rating: parse_or_default("UNRATED_RIDER_RATING", d.unrated_rider_rating)?,
            min_acceptance_score: parse_or_default("MIN_ACCEPTANCE_SCORE", d.min_acceptance_score)?,
            alternates: parse_or_default("ALTERNATES", d.alternates)?,
            acceptance_window_secs: parse_or_default(
                "ACCEPTANCE_WINDOW_SECS",
                d.acceptance_window_secs,
            )?,
            prep_time_minutes: parse_or_default("PREP_TIME_MINUTES", d.prep_time_minutes)?,
            handover_time_minutes: parse_or_default(
                "HANDOVER_TIME_MINUTES",
                d.handover_time_minutes,
            )?,
            min_security_deposit: parse_or_default("MIN_SECURITY_DEPOSIT", d.min_security_deposit)?,
            vehicle_requirement_hard_fail: parse_or_default(
                "VEHICLE_REQUIREMENT_HARD_FAIL",
                d.vehicle_requirement_hard_fail,
            )?,
            high_value_threshold: parse_or_default("HIGH_VALUE_THRESHOLD", d.high_value_threshold)?,
            medium_value_threshold: parse_or_default(
                "MEDIUM_VALUE_THRESHOLD",
                d.medium_value_threshold,
            )?,
            premium_fee_threshold: parse_or_default(
                "PREMIUM_FEE_THRESHOLD",
                d.premium_fee_threshold,
            )?,
            reassign_on_decline: parse_or_default("REASSIGN_ON_DECLINE", d.reassign_on_decline)?,
            reassign_on_expiry: parse_or_default("REASSIGN_ON_EXPIRY", d.reassign_on_expiry)?,
            vehicle_speeds: VehicleSpeeds {
                on_foot: parse_or_default("SPEED_ON_FOOT_KMH", d.vehicle_speeds.on_foot)?,
                bicycle: parse_or_default("SPEED_BICYCLE_KMH", d.vehicle_speeds.bicycle)?,
                motorcycle: parse_or_default("SPEED_MOTORCYCLE_KMH", d.vehicle_speeds.motorcycle)?,
                car: parse_or_default("SPEED_CAR_KMH", d.vehicle_speeds.car)?,
                van: parse_or_default("SPEED_VAN_KMH", d.vehicle_speeds.van)?,
            },
        };

        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.priority_radius_km < 0.0 || self.max_search_radius_km <= self.priority_radius_km {
            return Err(AppError::Internal(
                "MAX_SEARCH_RADIUS_KM must exceed PRIORITY_RADIUS_KM".to_string(),
            ));
        }
        if !(0.0..5.0).contains(&self.min_rating) {
            return Err(AppError::Internal(
                "MIN_RATING must be in [0, 5)".to_string(),
            ));
        }
        if self.acceptance_window_secs <= 0 {
            return Err(AppError::Internal(
                "ACCEPTANCE_WINDOW_SECS must be > 0".to_string(),
            ));
        }
        if VehicleType::ALL
            .iter()
            .any(|vehicle| self.vehicle_speeds.for_vehicle(*vehicle) <= 0.0)
        {
            return Err(AppError::Internal("vehicle speeds must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn acceptance_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.acceptance_window_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleSpeeds {
    pub on_foot: f64,
    pub bicycle: f64,
    pub motorcycle: f64,
    pub car: f64,
    pub van: f64,
}

impl Default for VehicleSpeeds {
    fn default() -> Self {
        Self {
            on_foot: VehicleType::OnFoot.default_speed_kmh(),
            bicycle: VehicleType::Bicycle.default_speed_kmh(),
            motorcycle: VehicleType::Motorcycle.default_speed_kmh(),
            car: VehicleType::Car.default_speed_kmh(),
            van: VehicleType::Van.default_speed_kmh(),
        }
    }
}

impl VehicleSpeeds {
    pub fn for_vehicle(&self, vehicle: VehicleType) -> f64 {
        match vehicle {
            VehicleType::OnFoot => self.on_foot,
            VehicleType::Bicycle => self.bicycle,
            VehicleType::Motorcycle => self.motorcycle,
            VehicleType::Car => self.car,
            VehicleType::Van => self.van,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
