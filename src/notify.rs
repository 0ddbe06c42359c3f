use anyhow::{Context, Result};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use reqwest::Client;
use serde_json::json;
use tokio::task;

use crate::config::{EmailSettings, MonitorConfig, SlackSettings};
use crate::models::{AlertItem, CheckKind, CheckOutcome, RunReport, Severity};

/// Per-channel delivery record for one run. Best-effort: a failed channel is
/// recorded here and never stops the others.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub channels: Vec<ChannelOutcome>,
}

#[derive(Debug)]
pub struct ChannelOutcome {
    pub channel: &'static str,
    pub error: Option<String>,
}

impl DispatchOutcome {
    pub fn all_delivered(&self) -> bool {
        self.channels.iter().all(|c| c.error.is_none())
    }
}

/// Render and deliver the run's alerts through every enabled channel. A
/// channel with nothing to say is skipped unless its `notify_when_healthy`
/// flag asks for a healthy-run notice. With `dry_run` the rendered messages
/// go to stdout instead of the wire.
pub async fn dispatch(
    client: &Client,
    config: &MonitorConfig,
    report: &RunReport,
    dry_run: bool,
) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();

    if config.email.enabled && (!report.alerts.is_empty() || config.email.notify_when_healthy) {
        let subject = render_template(&config.email.subject_template, report.alerts.len());
        let body = render_email_body(report);
        let error = if dry_run {
            println!("\n--- Email dry run ---\nSubject: {subject}\n\n{body}");
            None
        } else {
            send_email(&config.email, subject, body)
                .await
                .err()
                .map(|e| format!("{e:#}"))
        };
        outcome.channels.push(ChannelOutcome {
            channel: "email",
            error,
        });
    }

    if config.slack.enabled && (!report.alerts.is_empty() || config.slack.notify_when_healthy) {
        let text = render_slack_message(&config.slack, report);
        let error = if dry_run {
            println!("\n--- Slack dry run ---\n{text}");
            None
        } else {
            post_to_slack(client, &config.slack, &text)
                .await
                .err()
                .map(|e| format!("{e:#}"))
        };
        outcome.channels.push(ChannelOutcome {
            channel: "slack",
            error,
        });
    }

    outcome
}

fn render_template(template: &str, count: usize) -> String {
    template.replace("{count}", &count.to_string())
}

fn kind_label(kind: CheckKind) -> &'static str {
    match kind {
        CheckKind::Registration => "Domain registration",
        CheckKind::Certificate => "TLS certificate",
    }
}

fn days_phrase(days: i64) -> String {
    if days < 0 {
        format!("expired {} day(s) ago", -days)
    } else {
        format!("{days} day(s) left")
    }
}

fn render_email_body(report: &RunReport) -> String {
    let mut lines = vec![
        "Domain Expiration Alert".to_string(),
        "=".repeat(50),
        String::new(),
    ];

    if report.alerts.is_empty() {
        lines.push(format!(
            "All {} monitored domain(s) are healthy - nothing expires within its threshold.",
            report.summary.domains_monitored
        ));
    } else {
        lines.push("The following are expiring within their alert thresholds:".to_string());
        lines.push(String::new());
        for alert in &report.alerts {
            lines.push(format!("* {}", alert.domain));
            lines.push(format!("   Type: {}", kind_label(alert.kind)));
            lines.push(format!("   Severity: {:?}", alert.severity));
            lines.push(format!("   Days until expiry: {}", alert.days_until_expiry));
            lines.push(format!(
                "   Expiration date: {}",
                alert.expiration_date.format("%Y-%m-%d")
            ));
            if let Some(registrar) = registrar_of(report, alert) {
                lines.push(format!("   Registrar: {registrar}"));
            }
            lines.push(String::new());
        }
        lines.push("Please take action to renew these domains/certificates.".to_string());
    }

    let failures: Vec<_> = report.results.iter().filter(|r| r.is_failure()).collect();
    if !failures.is_empty() {
        lines.push(String::new());
        lines.push("Check failures (status could not be determined):".to_string());
        for result in failures {
            if let CheckOutcome::Failure { error_message, .. } = &result.outcome {
                lines.push(format!(
                    "- {} ({}): {}",
                    result.domain, result.kind, error_message
                ));
            }
        }
    }

    lines.push(String::new());
    lines.push("This is an automated alert from domainwatch.".to_string());
    lines.join("\n")
}

fn registrar_of<'a>(report: &'a RunReport, alert: &AlertItem) -> Option<&'a str> {
    report
        .results
        .iter()
        .find(|r| r.domain == alert.domain && r.kind == alert.kind)
        .and_then(|r| match &r.outcome {
            CheckOutcome::Success { metadata, .. } => metadata.registrar.as_deref(),
            CheckOutcome::Failure { .. } => None,
        })
}

fn render_slack_message(settings: &SlackSettings, report: &RunReport) -> String {
    if report.alerts.is_empty() {
        return format!(
            "✅ All {} monitored domain(s) healthy - no expirations within thresholds",
            report.summary.domains_monitored
        );
    }
    let mut lines = vec![format!(
        "{}:",
        render_template(&settings.message_template, report.alerts.len())
    )];
    for alert in &report.alerts {
        lines.push(format!(
            "{} *{}* ({}) - {}",
            severity_symbol(settings, alert.severity),
            alert.domain,
            alert.kind,
            days_phrase(alert.days_until_expiry)
        ));
    }
    if report.summary.check_failures > 0 {
        lines.push(format!(
            "⚠️ {} check(s) failed - see the run report",
            report.summary.check_failures
        ));
    }
    lines.join("\n")
}

fn severity_symbol(settings: &SlackSettings, severity: Severity) -> &str {
    let (key, fallback) = match severity {
        Severity::Critical => ("critical", "🔴"),
        Severity::Warning => ("warning", "🟡"),
    };
    settings
        .symbols
        .get(key)
        .map(String::as_str)
        .unwrap_or(fallback)
}

async fn send_email(settings: &EmailSettings, subject: String, body: String) -> Result<()> {
    let from: Mailbox = settings
        .from
        .parse()
        .with_context(|| format!("invalid from address {:?}", settings.from))?;
    let mut builder = Message::builder()
        .from(from)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN);
    for recipient in &settings.recipients {
        let mailbox: Mailbox = if recipient.name.is_empty() {
            recipient.email.parse()
        } else {
            format!("{} <{}>", recipient.name, recipient.email).parse()
        }
        .with_context(|| format!("invalid recipient address {:?}", recipient.email))?;
        builder = builder.to(mailbox);
    }
    let message = builder.body(body)?;

    let mut transport = SmtpTransport::relay(&settings.smtp_host)
        .with_context(|| format!("invalid SMTP relay {:?}", settings.smtp_host))?
        .port(settings.smtp_port);
    if !settings.username.is_empty() {
        transport = transport.credentials(Credentials::new(
            settings.username.clone(),
            settings.password.clone(),
        ));
    }
    let transport = transport.build();

    task::spawn_blocking(move || transport.send(&message)).await??;
    Ok(())
}

async fn post_to_slack(client: &Client, settings: &SlackSettings, text: &str) -> Result<()> {
    let payload = json!({ "channel": settings.channel, "text": text });
    let response = client
        .post(&settings.webhook_url)
        .json(&payload)
        .send()
        .await?;
    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "no body".to_string());
        anyhow::bail!("Slack webhook returned {status}: {body}");
    }
    Ok(())
}
