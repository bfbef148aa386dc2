use crate::config::SlaConfig;
use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlaPriority {
    Normal,
    High,
    Critical,
    /// The cutoff for the day has already passed.
    Late,
}

impl fmt::Display for SlaPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlaPriority::Normal => write!(f, "NORMAL"),
            SlaPriority::High => write!(f, "HIGH"),
            SlaPriority::Critical => write!(f, "CRITICAL"),
            SlaPriority::Late => write!(f, "LATE"),
        }
    }
}

/// Settlement-cutoff watchdog. Priority is informational and never changes a decision.
#[derive(Debug, Clone)]
pub struct SlaWatchdog {
    cutoff: NaiveTime,
    critical_hours: f64,
    high_hours: f64,
}

impl SlaWatchdog {
    pub fn new(config: &SlaConfig) -> Self {
        Self {
            cutoff: NaiveTime::from_hms_opt(config.cutoff_hour.min(23), 0, 0)
                .unwrap_or(NaiveTime::MIN),
            critical_hours: config.critical_hours,
            high_hours: config.high_hours,
        }
    }

    pub fn check_priority(&self, now: NaiveDateTime) -> SlaPriority {
        let deadline = now.date().and_time(self.cutoff);
        if now > deadline {
            return SlaPriority::Late;
        }

        let hours_remaining = (deadline - now).num_seconds() as f64 / 3600.0;
        if hours_remaining < self.critical_hours {
            SlaPriority::Critical
        } else if hours_remaining < self.high_hours {
            SlaPriority::High
        } else {
            SlaPriority::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_priority_tiers() {
        let watchdog = SlaWatchdog::new(&SlaConfig::default());
        assert_eq!(watchdog.check_priority(at(9, 0)), SlaPriority::Normal);
        assert_eq!(watchdog.check_priority(at(13, 0)), SlaPriority::Normal);
        assert_eq!(watchdog.check_priority(at(13, 30)), SlaPriority::High);
        assert_eq!(watchdog.check_priority(at(15, 1)), SlaPriority::Critical);
        assert_eq!(watchdog.check_priority(at(17, 0)), SlaPriority::Critical);
        assert_eq!(watchdog.check_priority(at(17, 1)), SlaPriority::Late);
    }

    #[test]
    fn test_custom_cutoff() {
        let watchdog = SlaWatchdog::new(&SlaConfig {
            cutoff_hour: 12,
            ..SlaConfig::default()
        });
        assert_eq!(watchdog.check_priority(at(11, 0)), SlaPriority::Critical);
        assert_eq!(watchdog.check_priority(at(12, 30)), SlaPriority::Late);
    }
}
