use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::models::activity::DEFAULT_LOG_CAPACITY;
use crate::models::coordinate::Coordinate;

pub const BASE_LOCATION: Coordinate = Coordinate::new(17.405, 78.4867);
pub const INITIAL_DRONE_LOCATION: Coordinate = Coordinate::new(17.26235, 78.29479);

/// Step count and tick interval of one flight leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegTiming {
    pub steps: u32,
    pub delay: Duration,
}

#[derive(Debug, Clone)]
pub struct FlightConfig {
    pub drone_id: String,
    pub base: Coordinate,
    pub initial_position: Coordinate,
    pub outbound: LegTiming,
    pub inbound: LegTiming,
    pub delivery_pause: Duration,
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            drone_id: "drone1".to_string(),
            base: BASE_LOCATION,
            initial_position: INITIAL_DRONE_LOCATION,
            outbound: LegTiming {
                steps: 150,
                delay: Duration::from_millis(60),
            },
            inbound: LegTiming {
                steps: 120,
                delay: Duration::from_millis(50),
            },
            delivery_pause: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub log_capacity: usize,
    pub flight: FlightConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            log_capacity: DEFAULT_LOG_CAPACITY,
            flight: FlightConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = FlightConfig::default();

        let flight = FlightConfig {
            drone_id: env::var("DRONE_ID").unwrap_or(defaults.drone_id),
            base: Coordinate::new(
                parse_or_default("BASE_LAT", defaults.base.lat)?,
                parse_or_default("BASE_LNG", defaults.base.lng)?,
            ),
            initial_position: Coordinate::new(
                parse_or_default("INITIAL_LAT", defaults.initial_position.lat)?,
                parse_or_default("INITIAL_LNG", defaults.initial_position.lng)?,
            ),
            outbound: LegTiming {
                steps: parse_or_default("OUTBOUND_STEPS", defaults.outbound.steps)?,
                delay: parse_delay("OUTBOUND_DELAY_MS", defaults.outbound.delay)?,
            },
            inbound: LegTiming {
                steps: parse_or_default("RETURN_STEPS", defaults.inbound.steps)?,
                delay: parse_delay("RETURN_DELAY_MS", defaults.inbound.delay)?,
            },
            delivery_pause: Duration::from_millis(parse_or_default(
                "DELIVERY_PAUSE_MS",
                defaults.delivery_pause.as_millis() as u64,
            )?),
        };

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            log_capacity: parse_or_default("LOG_CAPACITY", DEFAULT_LOG_CAPACITY)?,
            flight,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !self.flight.base.is_valid() || !self.flight.initial_position.is_valid() {
            return Err(AppError::Internal(
                "base and initial coordinates must be valid lat/lng".to_string(),
            ));
        }

        // broadcast channels reject a zero capacity
        if self.event_buffer_size == 0 {
            return Err(AppError::Internal("EVENT_BUFFER_SIZE must be > 0".to_string()));
        }

        if self.log_capacity == 0 {
            return Err(AppError::Internal("LOG_CAPACITY must be > 0".to_string()));
        }

        if self.flight.outbound.delay.is_zero() || self.flight.inbound.delay.is_zero() {
            return Err(AppError::Internal("leg delays must be > 0".to_string()));
        }

        Ok(())
    }
}

fn parse_delay(key: &str, default: Duration) -> Result<Duration, AppError> {
    let millis: u64 = parse_or_default(key, default.as_millis() as u64)?;
    if millis == 0 {
        return Err(AppError::Internal(format!("{key} must be > 0")));
    }
    Ok(Duration::from_millis(millis))
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
