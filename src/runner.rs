use std::future::Future;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use tokio::time;

use crate::certificate;
use crate::classify::classify;
use crate::config::{DomainSpec, MonitorConfig, RetryPolicy};
use crate::error::CheckError;
use crate::models::{CheckKind, CheckOutcome, CheckResult, RunReport, days_until};
use crate::registration;

/// Run every configured check and assemble the report. Check failures are
/// recorded per (domain, kind) and never abort the rest of the run.
pub async fn run(config: &MonitorConfig, client: &Client) -> RunReport {
    let checked_at = Utc::now();

    let tasks = config.domains.iter().enumerate().map(|(index, domain)| async move {
        println!("Checking {} ...", domain.name);
        let (registration, certificate) = tokio::join!(
            checked(client, config, domain, CheckKind::Registration, checked_at),
            checked(client, config, domain, CheckKind::Certificate, checked_at),
        );
        (index, registration, certificate)
    });
    let mut outcomes = stream::iter(tasks)
        .buffer_unordered(config.max_concurrent_checks)
        .collect::<Vec<_>>()
        .await;
    // fan-out completes in arbitrary order; the report stays in config order
    outcomes.sort_by_key(|(index, _, _)| *index);

    let mut results = Vec::with_capacity(outcomes.len() * 2);
    let mut alerts = Vec::new();
    for (index, registration, certificate) in outcomes {
        let threshold = config.domains[index].threshold_days;
        for result in [registration, certificate] {
            if let Some(alert) = classify(&result, threshold) {
                alerts.push(alert);
            }
            results.push(result);
        }
    }

    RunReport::new(checked_at, config.domains.len(), results, alerts)
}

async fn checked(
    client: &Client,
    config: &MonitorConfig,
    domain: &DomainSpec,
    kind: CheckKind,
    now: DateTime<Utc>,
) -> CheckResult {
    let attempt = || async move {
        match kind {
            CheckKind::Registration => {
                registration::check_registration(client, &domain.name, config.timeouts.registration)
                    .await
            }
            CheckKind::Certificate => {
                certificate::check_certificate(&domain.name, config.timeouts.certificate).await
            }
        }
    };

    let outcome = match with_retry(&config.retry, &domain.name, kind, attempt).await {
        Ok(found) => {
            let days = days_until(found.expiration_date, now);
            println!(
                "{} {}: expires {} ({} days)",
                domain.name,
                kind,
                found.expiration_date.format("%Y-%m-%d"),
                days
            );
            CheckOutcome::Success {
                expiration_date: found.expiration_date,
                days_until_expiry: days,
                is_expired: days < 0,
                metadata: found.metadata,
            }
        }
        Err(e) => {
            eprintln!("{} {} check failed: {}", domain.name, kind, e);
            CheckOutcome::Failure {
                error_kind: e.kind(),
                error_message: e.to_string(),
            }
        }
    };

    CheckResult {
        domain: domain.name.clone(),
        kind,
        outcome,
    }
}

/// Apply the retry policy around one checker invocation. Only transient
/// failures (timeout, connection) are retried; lookup and certificate errors
/// are deterministic and returned immediately.
async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    domain: &str,
    kind: CheckKind,
    mut attempt: F,
) -> Result<T, CheckError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CheckError>>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempts < policy.max_attempts => {
                eprintln!(
                    "Attempt {}/{} for {} {} failed: {}; retrying",
                    attempts, policy.max_attempts, domain, kind, e
                );
                time::sleep(policy.backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}
