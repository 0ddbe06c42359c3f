use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Registration,
    Certificate,
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckKind::Registration => write!(f, "registration"),
            CheckKind::Certificate => write!(f, "certificate"),
        }
    }
}

/// What a checker extracted from a successful lookup. The orchestrator turns
/// this into a [`CheckResult`] with the day arithmetic applied.
#[derive(Debug, Clone)]
pub struct Expiration {
    pub expiration_date: DateTime<Utc>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registrar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self.registrar.is_none() && self.issuer.is_none() && self.subject.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome {
    Success {
        expiration_date: DateTime<Utc>,
        days_until_expiry: i64,
        is_expired: bool,
        #[serde(default, skip_serializing_if = "Metadata::is_empty")]
        metadata: Metadata,
    },
    Failure {
        error_kind: ErrorKind,
        error_message: String,
    },
}

/// One check of one domain, immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub domain: String,
    pub kind: CheckKind,
    #[serde(flatten)]
    pub outcome: CheckOutcome,
}

impl CheckResult {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, CheckOutcome::Failure { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertItem {
    pub domain: String,
    pub kind: CheckKind,
    pub days_until_expiry: i64,
    pub expiration_date: DateTime<Utc>,
    pub severity: Severity,
    pub threshold_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub domains_monitored: usize,
    pub checks_run: usize,
    pub check_failures: usize,
    pub alerts_raised: usize,
}

/// The complete record of one monitoring pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub checked_at: DateTime<Utc>,
    pub summary: RunSummary,
    pub results: Vec<CheckResult>,
    pub alerts: Vec<AlertItem>,
}

impl RunReport {
    pub fn new(
        checked_at: DateTime<Utc>,
        domains_monitored: usize,
        results: Vec<CheckResult>,
        alerts: Vec<AlertItem>,
    ) -> Self {
        let summary = RunSummary {
            domains_monitored,
            checks_run: results.len(),
            check_failures: results.iter().filter(|r| r.is_failure()).count(),
            alerts_raised: alerts.len(),
        };
        RunReport {
            checked_at,
            summary,
            results,
            alerts,
        }
    }
}

const SECONDS_PER_DAY: i64 = 86_400;

/// Whole days until `expiration`, rounded up. Goes negative once expiry is a
/// full day in the past; anything inside the trailing 24h window is 0.
pub fn days_until(expiration: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (expiration - now).num_seconds();
    let days = seconds.div_euclid(SECONDS_PER_DAY);
    if seconds.rem_euclid(SECONDS_PER_DAY) > 0 {
        days + 1
    } else {
        days
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        format!("{}Z", s.replace(' ', "T"))
            .parse::<DateTime<Utc>>()
            .unwrap()
    }

    #[test]
    fn days_until_rounds_up() {
        let now = at("2026-01-10 12:00:00");
        assert_eq!(days_until(at("2026-01-10 12:00:01"), now), 1);
        assert_eq!(days_until(at("2026-01-11 12:00:00"), now), 1);
        assert_eq!(days_until(at("2026-01-11 12:00:01"), now), 2);
        assert_eq!(days_until(at("2026-01-25 12:00:00"), now), 15);
    }

    #[test]
    fn days_until_at_and_past_expiry() {
        let now = at("2026-01-10 12:00:00");
        assert_eq!(days_until(now, now), 0);
        // expired less than a day ago still rounds up to 0
        assert_eq!(days_until(at("2026-01-10 11:59:59"), now), 0);
        assert_eq!(days_until(at("2026-01-09 12:00:00"), now), -1);
        assert_eq!(days_until(at("2026-01-05 12:00:00"), now), -5);
    }

    #[test]
    fn check_result_round_trips_through_json() {
        let success = CheckResult {
            domain: "example.com".into(),
            kind: CheckKind::Certificate,
            outcome: CheckOutcome::Success {
                expiration_date: at("2026-02-01 00:00:00"),
                days_until_expiry: 15,
                is_expired: false,
                metadata: Metadata {
                    issuer: Some("CN=R13, O=Let's Encrypt".into()),
                    subject: Some("CN=example.com".into()),
                    ..Metadata::default()
                },
            },
        };
        let failure = CheckResult {
            domain: "unreachable.test".into(),
            kind: CheckKind::Registration,
            outcome: CheckOutcome::Failure {
                error_kind: ErrorKind::Timeout,
                error_message: "timed out after 30s".into(),
            },
        };

        for result in [success, failure] {
            let json = serde_json::to_string(&result).unwrap();
            let back: CheckResult = serde_json::from_str(&json).unwrap();
            assert_eq!(back, result);
        }
    }

    #[test]
    fn status_tag_is_stable() {
        let result = CheckResult {
            domain: "example.com".into(),
            kind: CheckKind::Registration,
            outcome: CheckOutcome::Failure {
                error_kind: ErrorKind::Lookup,
                error_message: "no expiration date".into(),
            },
        };
        let value: serde_json::Value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "failure");
        assert_eq!(value["error_kind"], "lookup");
        assert_eq!(value["kind"], "registration");
    }
}
