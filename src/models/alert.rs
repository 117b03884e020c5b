//! Stress alert models.

use crate::models::RecoveryBands;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Alert severity, derived from recovery at the time of a strain breach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Gentle,
    Medium,
    Urgent,
}

impl Urgency {
    /// Classify by recovery percentage. Unknown recovery is `Medium`.
    pub fn classify(recovery_pct: Option<f64>, bands: &RecoveryBands) -> Self {
        match recovery_pct {
            Some(r) if r < bands.low => Urgency::Urgent,
            Some(r) if r >= bands.high => Urgency::Gentle,
            _ => Urgency::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Gentle => "gentle",
            Urgency::Medium => "medium",
            Urgency::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cooldown bookkeeping. Lives only while monitoring is enabled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertState {
    pub last_alert_at: Option<DateTime<Utc>>,
    pub last_urgency: Option<Urgency>,
}

impl AlertState {
    /// End of the running cooldown, if any.
    pub fn cooldown_until(&self, cooldown: chrono::Duration) -> Option<DateTime<Utc>> {
        self.last_alert_at.map(|at| at + cooldown)
    }

    pub fn in_cooldown(&self, now: DateTime<Utc>, cooldown: chrono::Duration) -> bool {
        self.cooldown_until(cooldown)
            .is_some_and(|until| now < until)
    }
}

/// One emitted alert. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub timestamp: DateTime<Utc>,
    pub strain_value: f64,
    pub recovery_value: Option<f64>,
    pub urgency_level: Urgency,
    pub advice_text: String,
}

impl AlertRecord {
    /// Message body sent to the user.
    pub fn notification_text(&self) -> String {
        let mut text = format!("⚠️ High strain\n\nStrain: {:.1}", self.strain_value);
        if let Some(recovery) = self.recovery_value {
            text.push_str(&format!(" | Recovery: {:.0}%", recovery));
        }
        text.push_str("\n\n");
        text.push_str(&self.advice_text);
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_urgency_tiers() {
        let bands = RecoveryBands::default();
        assert_eq!(Urgency::classify(Some(40.0), &bands), Urgency::Urgent);
        assert_eq!(Urgency::classify(Some(49.9), &bands), Urgency::Urgent);
        assert_eq!(Urgency::classify(Some(50.0), &bands), Urgency::Medium);
        assert_eq!(Urgency::classify(Some(69.9), &bands), Urgency::Medium);
        assert_eq!(Urgency::classify(Some(70.0), &bands), Urgency::Gentle);
        assert_eq!(Urgency::classify(Some(75.0), &bands), Urgency::Gentle);
        assert_eq!(Urgency::classify(None, &bands), Urgency::Medium);
    }

    #[test]
    fn test_cooldown_window() {
        let now = Utc::now();
        let state = AlertState {
            last_alert_at: Some(now),
            last_urgency: Some(Urgency::Urgent),
        };
        let cooldown = Duration::hours(2);

        assert!(state.in_cooldown(now + Duration::minutes(10), cooldown));
        assert!(!state.in_cooldown(now + Duration::hours(2), cooldown));
        assert!(!AlertState::default().in_cooldown(now, cooldown));
    }

    #[test]
    fn test_notification_text() {
        let record = AlertRecord {
            timestamp: Utc::now(),
            strain_value: 15.04,
            recovery_value: Some(40.2),
            urgency_level: Urgency::Urgent,
            advice_text: "Slow down.".to_string(),
        };
        assert_eq!(
            record.notification_text(),
            "⚠️ High strain\n\nStrain: 15.0 | Recovery: 40%\n\nSlow down."
        );

        let no_recovery = AlertRecord {
            recovery_value: None,
            ..record
        };
        assert!(!no_recovery.notification_text().contains("Recovery"));
    }

    #[test]
    fn test_urgency_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Urgency::Gentle).unwrap(), "\"gentle\"");
    }
}
