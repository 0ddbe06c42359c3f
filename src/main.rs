mod certificate;
mod classify;
mod cli;
mod config;
mod error;
mod models;
mod notify;
mod registration;
mod runner;
mod store;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use reqwest::Client;

use crate::cli::Cli;
use crate::models::{CheckOutcome, RunReport, Severity};
use crate::notify::DispatchOutcome;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref()).context("invalid configuration")?;

    println!("🔍 Monitoring {} domain(s)", config.domains.len());

    let client = Client::builder().user_agent(&config.user_agent).build()?;
    let report = runner::run(&config, &client).await;

    // persistence is best-effort and runs before dispatch
    if config.save_results {
        match store::persist_report(
            config.results_filename.clone(),
            &report,
            config.json_pretty_print,
        )
        .await
        {
            Ok(()) => println!("💾 Results saved to {}", config.results_filename),
            Err(e) => eprintln!("Failed to save results: {e:#}"),
        }
    }

    print_summary(&report);

    let outcome = notify::dispatch(&client, &config, &report, cli.dry_run).await;
    print_dispatch(&outcome, cli.dry_run);

    Ok(())
}

fn print_summary(report: &RunReport) {
    let summary = &report.summary;

    println!();
    println!("📊 Summary");
    println!("-----------------");
    let failures = if summary.check_failures > 0 {
        summary.check_failures.to_string().red()
    } else {
        summary.check_failures.to_string().green()
    };
    println!(
        "Domains: {}, checks: {}, failures: {}, alerts: {}",
        summary.domains_monitored, summary.checks_run, failures, summary.alerts_raised
    );

    for alert in &report.alerts {
        let line = format!(
            "  - {} ({}) expires {} - {} day(s), threshold {}",
            alert.domain,
            alert.kind,
            alert.expiration_date.format("%Y-%m-%d"),
            alert.days_until_expiry,
            alert.threshold_days
        );
        match alert.severity {
            Severity::Critical => println!("{}", line.red()),
            Severity::Warning => println!("{}", line.yellow()),
        }
    }

    for result in report.results.iter().filter(|r| r.is_failure()) {
        if let CheckOutcome::Failure { error_message, .. } = &result.outcome {
            println!(
                "{}",
                format!("  ! {} ({}): {}", result.domain, result.kind, error_message).red()
            );
        }
    }

    if report.alerts.is_empty() && summary.check_failures == 0 {
        println!("{}", "✅ All domains and certificates are healthy".green());
    }
}

fn print_dispatch(outcome: &DispatchOutcome, dry_run: bool) {
    for channel in &outcome.channels {
        match &channel.error {
            None if dry_run => println!("📤 {} notification rendered (dry run)", channel.channel),
            None => println!("📤 {} notification sent", channel.channel),
            Some(e) => eprintln!(
                "{}",
                format!("❌ {} notification failed: {}", channel.channel, e).red()
            ),
        }
    }
}
