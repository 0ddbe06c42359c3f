use crate::models::{AlertItem, CheckOutcome, CheckResult, Severity};

/// Anything due within this many days is critical no matter how generous the
/// configured threshold is.
const IMMINENT_WINDOW_DAYS: i64 = 7;

/// Map a check result onto an alert, or nothing when the domain is healthy.
/// Failed checks never alert; they stay visible in the report as operational
/// issues rather than expiry warnings.
pub fn classify(result: &CheckResult, threshold_days: i64) -> Option<AlertItem> {
    let CheckOutcome::Success {
        expiration_date,
        days_until_expiry,
        is_expired,
        ..
    } = &result.outcome
    else {
        return None;
    };

    let severity = if *is_expired || *days_until_expiry <= IMMINENT_WINDOW_DAYS {
        Severity::Critical
    } else if *days_until_expiry <= threshold_days {
        Severity::Warning
    } else {
        return None;
    };

    Some(AlertItem {
        domain: result.domain.clone(),
        kind: result.kind,
        days_until_expiry: *days_until_expiry,
        expiration_date: *expiration_date,
        severity,
        threshold_days,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{CheckKind, Metadata};
    use chrono::{TimeZone, Utc};

    fn success(days: i64) -> CheckResult {
        CheckResult {
            domain: "example.com".into(),
            kind: CheckKind::Certificate,
            outcome: CheckOutcome::Success {
                expiration_date: Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap(),
                days_until_expiry: days,
                is_expired: days < 0,
                metadata: Metadata::default(),
            },
        }
    }

    #[test]
    fn expired_is_always_critical() {
        for threshold in [1, 30, 10_000] {
            let alert = classify(&success(-5), threshold).unwrap();
            assert_eq!(alert.severity, Severity::Critical);
        }
    }

    #[test]
    fn imminent_window_is_critical() {
        for days in 0..=7 {
            let alert = classify(&success(days), 30).unwrap();
            assert_eq!(alert.severity, Severity::Critical, "day {days}");
        }
    }

    #[test]
    fn within_threshold_is_warning() {
        for days in 8..=30 {
            let alert = classify(&success(days), 30).unwrap();
            assert_eq!(alert.severity, Severity::Warning, "day {days}");
        }
    }

    #[test]
    fn beyond_threshold_is_healthy() {
        assert!(classify(&success(31), 30).is_none());
        assert!(classify(&success(400), 30).is_none());
    }

    #[test]
    fn imminent_window_overrides_a_smaller_threshold() {
        // threshold 5: day 6 is past the threshold but inside the fixed window
        let alert = classify(&success(6), 5).unwrap();
        assert_eq!(alert.severity, Severity::Critical);
    }

    #[test]
    fn huge_threshold_still_flags_imminent_as_critical() {
        let alert = classify(&success(3), 10_000).unwrap();
        assert_eq!(alert.severity, Severity::Critical);
    }

    #[test]
    fn failures_do_not_alert() {
        let failure = CheckResult {
            domain: "unreachable.test".into(),
            kind: CheckKind::Certificate,
            outcome: CheckOutcome::Failure {
                error_kind: ErrorKind::Timeout,
                error_message: "timed out after 10s".into(),
            },
        };
        assert!(classify(&failure, 30).is_none());
    }

    #[test]
    fn only_the_expiring_check_of_a_domain_alerts() {
        let registration = CheckResult {
            kind: CheckKind::Registration,
            ..success(400)
        };
        let certificate = success(15);
        let alerts: Vec<_> = [&registration, &certificate]
            .into_iter()
            .filter_map(|r| classify(r, 30))
            .collect();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, CheckKind::Certificate);
        assert_eq!(alerts[0].severity, Severity::Warning);
    }

    #[test]
    fn alert_carries_the_resolved_threshold() {
        let alert = classify(&success(15), 45).unwrap();
        assert_eq!(alert.threshold_days, 45);
        assert_eq!(alert.days_until_expiry, 15);
        assert_eq!(alert.kind, CheckKind::Certificate);
    }
}
