//! Alert policy
//!
//! Two independent gates, both must pass before an alert may go out:
//!
//! - **Quiet hours**: a time-of-day window, possibly wrapping midnight, in
//!   which nothing is sent. Applies to outage and recovery alerts alike.
//! - **Anti-spam**: at most one alert per endpoint within the cooldown. An
//!   endpoint that was never alerted is never held back by this gate.

use chrono::{DateTime, Local, NaiveTime, TimeDelta};
use serde::{Deserialize, Deserializer};

use crate::config::Config;
use crate::monitors::registry::Endpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct QuietHours {
    #[serde(deserialize_with = "deserialize_time_of_day")]
    pub start: NaiveTime,
    #[serde(deserialize_with = "deserialize_time_of_day")]
    pub end: NaiveTime,
}

impl QuietHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// `[start, end)`, wrapping over midnight when `start > end`.
    /// `start == end` is an empty window.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

/// Accepts `HH:MM` and `HH:MM:SS`
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

fn deserialize_time_of_day<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    parse_time_of_day(value.trim()).ok_or_else(|| {
        serde::de::Error::custom(format!("invalid time of day '{value}', expected HH:MM"))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    Allowed,
    QuietHours,
    Cooldown { remaining: TimeDelta },
}

impl AlertDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AlertDecision::Allowed)
    }
}

#[derive(Debug, Clone)]
pub struct AlertPolicy {
    quiet_hours: Option<QuietHours>,
    cooldown: TimeDelta,
}

impl AlertPolicy {
    pub fn new(quiet_hours: Option<QuietHours>, cooldown: TimeDelta) -> Self {
        Self {
            quiet_hours,
            cooldown,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.quiet_hours, config.anti_spam())
    }

    pub fn cooldown(&self) -> TimeDelta {
        self.cooldown
    }

    pub fn evaluate(&self, endpoint: &Endpoint, now: DateTime<Local>) -> AlertDecision {
        if let Some(quiet_hours) = &self.quiet_hours {
            if quiet_hours.contains(now.time()) {
                return AlertDecision::QuietHours;
            }
        }

        if let Some(last_alert) = endpoint.last_alert {
            let elapsed = now - last_alert;
            if elapsed < self.cooldown {
                return AlertDecision::Cooldown {
                    remaining: self.cooldown.checked_sub(&elapsed).unwrap_or(TimeDelta::MAX),
                };
            }
        }

        AlertDecision::Allowed
    }

    pub fn may_alert(&self, endpoint: &Endpoint, now: DateTime<Local>) -> bool {
        self.evaluate(endpoint, now).is_allowed()
    }
}
