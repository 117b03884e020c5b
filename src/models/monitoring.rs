//! Stress monitoring settings.
//!
//! Everything here is validated before it is applied: a rejected change
//! leaves the previous config untouched.

use crate::error::AppError;
use chrono::{Duration, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Highest strain value WHOOP reports.
pub const MAX_STRAIN: f64 = 21.0;

pub const DEFAULT_THRESHOLD: f64 = 12.0;
pub const DEFAULT_COOLDOWN_MINUTES: u32 = 120;

/// Time-of-day range `[start, end)` during which polling happens.
///
/// An `end` of 00:00 means midnight. A window with `start > end` wraps past
/// midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Default for ActiveWindow {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            end: NaiveTime::default(),
        }
    }
}

impl ActiveWindow {
    /// Parse a window from two `HH:MM` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, AppError> {
        let window = Self {
            start: parse_hhmm(start)?,
            end: parse_hhmm(end)?,
        };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.start == self.end {
            return Err(AppError::ConfigInvalid(format!(
                "active window start and end are both {}",
                self.start.format("%H:%M")
            )));
        }
        Ok(())
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.end == NaiveTime::default() {
            return time >= self.start;
        }
        if self.start < self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

/// Parse an `HH:MM` time of day.
pub fn parse_hhmm(value: &str) -> Result<NaiveTime, AppError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map(|t| t.with_second(0).unwrap_or(t))
        .map_err(|_| AppError::ConfigInvalid(format!("'{}' is not a valid HH:MM time", value)))
}

/// Recovery percentages that split alerts into urgency tiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecoveryBands {
    /// Below this: urgent.
    pub low: f64,
    /// At or above this: gentle.
    pub high: f64,
}

impl Default for RecoveryBands {
    fn default() -> Self {
        Self {
            low: 50.0,
            high: 70.0,
        }
    }
}

impl RecoveryBands {
    pub fn validate(&self) -> Result<(), AppError> {
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        if !in_range(self.low) || !in_range(self.high) || self.low > self.high {
            return Err(AppError::ConfigInvalid(format!(
                "recovery bands must satisfy 0 <= low <= high <= 100 (got {} / {})",
                self.low, self.high
            )));
        }
        Ok(())
    }
}

/// Per-user monitoring settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    /// Strain level at or above which an alert fires.
    pub threshold: f64,
    pub cooldown_minutes: u32,
    pub active_window: ActiveWindow,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: DEFAULT_THRESHOLD,
            cooldown_minutes: DEFAULT_COOLDOWN_MINUTES,
            active_window: ActiveWindow::default(),
        }
    }
}

impl MonitoringConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::minutes(i64::from(self.cooldown_minutes))
    }

    pub fn validate(&self) -> Result<(), AppError> {
        validate_threshold(self.threshold)?;
        self.active_window.validate()
    }

    /// Copy with a new threshold, or an error with `self` untouched.
    pub fn with_threshold(&self, threshold: f64) -> Result<Self, AppError> {
        validate_threshold(threshold)?;
        Ok(Self {
            threshold,
            ..self.clone()
        })
    }
}

pub fn validate_threshold(threshold: f64) -> Result<(), AppError> {
    if !threshold.is_finite() || !(0.0..=MAX_STRAIN).contains(&threshold) {
        return Err(AppError::ConfigInvalid(format!(
            "threshold must be between 0 and {} (got {})",
            MAX_STRAIN, threshold
        )));
    }
    Ok(())
}
