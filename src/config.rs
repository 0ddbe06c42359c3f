use std::collections::{HashMap, HashSet};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;

#[derive(Debug, Deserialize)]
struct RawSettings {
    #[serde(default)]
    monitoring: RawMonitoring,
    #[serde(default)]
    domains: Vec<RawDomain>,
    #[serde(default)]
    advanced: RawAdvanced,
    #[serde(default)]
    notifications: RawNotifications,
}

#[derive(Debug, Deserialize)]
struct RawMonitoring {
    #[serde(default = "default_threshold_days")]
    alert_threshold_days: i64,
    #[serde(default = "default_true")]
    save_results: bool,
    #[serde(default = "default_results_filename")]
    results_filename: String,
}

impl Default for RawMonitoring {
    fn default() -> Self {
        RawMonitoring {
            alert_threshold_days: default_threshold_days(),
            save_results: true,
            results_filename: default_results_filename(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDomain {
    name: String,
    #[serde(default)]
    description: String,
    alert_threshold_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawAdvanced {
    #[serde(default)]
    timeouts: RawTimeouts,
    #[serde(default)]
    retry: RawRetry,
    #[serde(default = "default_max_concurrent_checks")]
    max_concurrent_checks: usize,
    #[serde(default = "default_user_agent")]
    user_agent: String,
    #[serde(default)]
    output: RawOutput,
}

impl Default for RawAdvanced {
    fn default() -> Self {
        RawAdvanced {
            timeouts: RawTimeouts::default(),
            retry: RawRetry::default(),
            max_concurrent_checks: default_max_concurrent_checks(),
            user_agent: default_user_agent(),
            output: RawOutput::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTimeouts {
    #[serde(default = "default_registration_timeout")]
    registration_seconds: u64,
    #[serde(default = "default_certificate_timeout")]
    certificate_seconds: u64,
}

impl Default for RawTimeouts {
    fn default() -> Self {
        RawTimeouts {
            registration_seconds: default_registration_timeout(),
            certificate_seconds: default_certificate_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRetry {
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    #[serde(default = "default_backoff_seconds")]
    backoff_seconds: u64,
}

impl Default for RawRetry {
    fn default() -> Self {
        RawRetry {
            max_attempts: default_max_attempts(),
            backoff_seconds: default_backoff_seconds(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    #[serde(default = "default_true")]
    json_pretty_print: bool,
}

impl Default for RawOutput {
    fn default() -> Self {
        RawOutput {
            json_pretty_print: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawNotifications {
    #[serde(default)]
    email: RawEmail,
    #[serde(default)]
    slack: RawSlack,
}

#[derive(Debug, Deserialize)]
struct RawEmail {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    smtp_host: String,
    #[serde(default = "default_smtp_port")]
    smtp_port: u16,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    from: String,
    #[serde(default)]
    recipients: Vec<RawRecipient>,
    #[serde(default = "default_email_subject")]
    subject_template: String,
    #[serde(default)]
    notify_when_healthy: bool,
}

impl Default for RawEmail {
    fn default() -> Self {
        RawEmail {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from: String::new(),
            recipients: Vec::new(),
            subject_template: default_email_subject(),
            notify_when_healthy: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRecipient {
    email: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawSlack {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    webhook_url: String,
    #[serde(default = "default_slack_channel")]
    channel: String,
    #[serde(default = "default_slack_template")]
    message_template: String,
    #[serde(default = "default_slack_symbols")]
    symbols: HashMap<String, String>,
    #[serde(default)]
    notify_when_healthy: bool,
}

impl Default for RawSlack {
    fn default() -> Self {
        RawSlack {
            enabled: false,
            webhook_url: String::new(),
            channel: default_slack_channel(),
            message_template: default_slack_template(),
            symbols: default_slack_symbols(),
            notify_when_healthy: false,
        }
    }
}

fn default_threshold_days() -> i64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_results_filename() -> String {
    "domain_check_results.json".to_string()
}
fn default_registration_timeout() -> u64 {
    30
}
fn default_certificate_timeout() -> u64 {
    10
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_seconds() -> u64 {
    5
}
fn default_max_concurrent_checks() -> usize {
    4
}
fn default_user_agent() -> String {
    concat!("domainwatch/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_email_subject() -> String {
    "🚨 Domain Expiration Alert - {count} domain(s) expiring soon".to_string()
}
fn default_slack_channel() -> String {
    "#alerts".to_string()
}
fn default_slack_template() -> String {
    "🚨 *Domain Alert* - {count} domain(s) expiring soon".to_string()
}
fn default_slack_symbols() -> HashMap<String, String> {
    HashMap::from([
        ("critical".to_string(), "🔴".to_string()),
        ("warning".to_string(), "🟡".to_string()),
    ])
}

/// Validated, flattened configuration for one run. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub global_threshold_days: i64,
    pub save_results: bool,
    pub results_filename: String,
    pub json_pretty_print: bool,
    pub user_agent: String,
    pub domains: Vec<DomainSpec>,
    pub timeouts: Timeouts,
    pub retry: RetryPolicy,
    pub max_concurrent_checks: usize,
    pub email: EmailSettings,
    pub slack: SlackSettings,
}

#[derive(Debug, Clone)]
pub struct DomainSpec {
    pub name: String,
    pub description: Option<String>,
    /// Per-domain override already resolved against the global threshold.
    pub threshold_days: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub registration: Duration,
    pub certificate: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub recipients: Vec<Recipient>,
    pub subject_template: String,
    pub notify_when_healthy: bool,
}

#[derive(Debug, Clone)]
pub struct Recipient {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct SlackSettings {
    pub enabled: bool,
    pub webhook_url: String,
    pub channel: String,
    pub message_template: String,
    pub symbols: HashMap<String, String>,
    pub notify_when_healthy: bool,
}

/// Load and validate configuration: the named file (any format the config
/// crate understands) layered with a `DOMAINWATCH__`-prefixed environment
/// source, so credentials such as the SMTP password or webhook URL never have
/// to live in the file.
pub fn load(path: Option<&str>) -> Result<MonitorConfig, ConfigError> {
    let file = match path {
        Some(p) => File::with_name(p),
        None => File::with_name("config/default").required(false),
    };
    let settings = Config::builder()
        .add_source(file)
        .add_source(Environment::with_prefix("DOMAINWATCH").separator("__"))
        .build()?;
    let raw: RawSettings = settings.try_deserialize()?;
    validate(raw)
}

fn validate(raw: RawSettings) -> Result<MonitorConfig, ConfigError> {
    if raw.monitoring.alert_threshold_days <= 0 {
        return Err(ConfigError::NotPositive("monitoring.alert_threshold_days"));
    }
    if raw.domains.is_empty() {
        return Err(ConfigError::NoDomains);
    }
    if raw.advanced.timeouts.registration_seconds == 0 {
        return Err(ConfigError::NotPositive(
            "advanced.timeouts.registration_seconds",
        ));
    }
    if raw.advanced.timeouts.certificate_seconds == 0 {
        return Err(ConfigError::NotPositive(
            "advanced.timeouts.certificate_seconds",
        ));
    }
    if raw.advanced.retry.max_attempts == 0 {
        return Err(ConfigError::NoAttempts);
    }
    if raw.advanced.max_concurrent_checks == 0 {
        return Err(ConfigError::NotPositive("advanced.max_concurrent_checks"));
    }

    let mut seen = HashSet::new();
    let mut domains = Vec::with_capacity(raw.domains.len());
    for (index, entry) in raw.domains.into_iter().enumerate() {
        let name = normalize_domain(&entry.name);
        if name.is_empty() {
            return Err(ConfigError::EmptyDomainName(index));
        }
        if !seen.insert(name.clone()) {
            return Err(ConfigError::DuplicateDomain(name));
        }
        if let Some(days) = entry.alert_threshold_days
            && days <= 0
        {
            return Err(ConfigError::NotPositive("domains[].alert_threshold_days"));
        }
        domains.push(DomainSpec {
            name,
            description: (!entry.description.trim().is_empty())
                .then(|| entry.description.trim().to_string()),
            threshold_days: entry
                .alert_threshold_days
                .unwrap_or(raw.monitoring.alert_threshold_days),
        });
    }

    let email = raw.notifications.email;
    if email.enabled {
        if email.smtp_host.is_empty() {
            return Err(ConfigError::MissingChannelParameter {
                channel: "email",
                key: "smtp_host",
            });
        }
        if email.from.is_empty() {
            return Err(ConfigError::MissingChannelParameter {
                channel: "email",
                key: "from",
            });
        }
        if email.recipients.is_empty() {
            return Err(ConfigError::MissingChannelParameter {
                channel: "email",
                key: "recipients",
            });
        }
    }
    let slack = raw.notifications.slack;
    if slack.enabled && slack.webhook_url.is_empty() {
        return Err(ConfigError::MissingChannelParameter {
            channel: "slack",
            key: "webhook_url",
        });
    }

    Ok(MonitorConfig {
        global_threshold_days: raw.monitoring.alert_threshold_days,
        save_results: raw.monitoring.save_results,
        results_filename: raw.monitoring.results_filename,
        json_pretty_print: raw.advanced.output.json_pretty_print,
        user_agent: raw.advanced.user_agent,
        domains,
        timeouts: Timeouts {
            registration: Duration::from_secs(raw.advanced.timeouts.registration_seconds),
            certificate: Duration::from_secs(raw.advanced.timeouts.certificate_seconds),
        },
        retry: RetryPolicy {
            max_attempts: raw.advanced.retry.max_attempts,
            backoff: Duration::from_secs(raw.advanced.retry.backoff_seconds),
        },
        max_concurrent_checks: raw.advanced.max_concurrent_checks,
        email: EmailSettings {
            enabled: email.enabled,
            smtp_host: email.smtp_host,
            smtp_port: email.smtp_port,
            username: email.username,
            password: email.password,
            from: email.from,
            recipients: email
                .recipients
                .into_iter()
                .map(|r| Recipient {
                    email: r.email,
                    name: r.name,
                })
                .collect(),
            subject_template: email.subject_template,
            notify_when_healthy: email.notify_when_healthy,
        },
        slack: SlackSettings {
            enabled: slack.enabled,
            webhook_url: slack.webhook_url,
            channel: slack.channel,
            message_template: slack.message_template,
            symbols: slack.symbols,
            notify_when_healthy: slack.notify_when_healthy,
        },
    })
}

/// Reduce whatever the operator wrote (URL, www-prefixed, trailing dot) to a
/// bare lowercase host name.
fn normalize_domain(raw: &str) -> String {
    let trimmed = raw.trim();
    let host = if trimmed.contains("://") {
        Url::parse(trimmed)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default()
    } else {
        trimmed.split('/').next().unwrap_or_default().to_string()
    };
    let host = host.to_ascii_lowercase();
    host.strip_prefix("www.")
        .unwrap_or(&host)
        .trim_end_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn load_toml(toml: &str) -> Result<MonitorConfig, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        validate(settings.try_deserialize()?)
    }

    const MINIMAL: &str = r#"
        [monitoring]
        alert_threshold_days = 30

        [[domains]]
        name = "example.com"
    "#;

    #[test]
    fn minimal_config_loads_with_defaults() {
        let config = load_toml(MINIMAL).unwrap();
        assert_eq!(config.global_threshold_days, 30);
        assert_eq!(config.domains.len(), 1);
        assert_eq!(config.domains[0].name, "example.com");
        assert_eq!(config.domains[0].threshold_days, 30);
        assert_eq!(config.timeouts.registration, Duration::from_secs(30));
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.save_results);
        assert!(!config.email.enabled);
        assert!(!config.slack.enabled);
    }

    #[test]
    fn per_domain_threshold_overrides_global_only_for_that_domain() {
        let config = load_toml(
            r#"
            [monitoring]
            alert_threshold_days = 30

            [[domains]]
            name = "example.com"

            [[domains]]
            name = "urgent.example"
            alert_threshold_days = 60
        "#,
        )
        .unwrap();
        assert_eq!(config.domains[0].threshold_days, 30);
        assert_eq!(config.domains[1].threshold_days, 60);
    }

    #[test]
    fn empty_domain_list_is_rejected() {
        let err = load_toml("domains = []\n[monitoring]\nalert_threshold_days = 30").unwrap_err();
        assert!(matches!(err, ConfigError::NoDomains));
    }

    #[test]
    fn duplicate_domains_detected_after_normalization() {
        let err = load_toml(
            r#"
            [[domains]]
            name = "example.com"

            [[domains]]
            name = "https://www.Example.com/login"
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateDomain(ref d) if d == "example.com"));
    }

    #[test]
    fn non_positive_thresholds_and_timeouts_rejected() {
        let err = load_toml(
            r#"
            [monitoring]
            alert_threshold_days = 0

            [[domains]]
            name = "example.com"
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::NotPositive(_)));

        let err = load_toml(
            r#"
            [[domains]]
            name = "example.com"

            [advanced.timeouts]
            certificate_seconds = 0
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::NotPositive(_)));

        let err = load_toml(
            r#"
            [[domains]]
            name = "example.com"

            [advanced.retry]
            max_attempts = 0
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::NoAttempts));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let err = load_toml(
            r#"
            [monitoring]
            alert_threshold_days = "soon"

            [[domains]]
            name = "example.com"
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Read(_)));
    }

    #[test]
    fn unknown_top_level_keys_are_ignored() {
        let config = load_toml(
            r#"
            [monitoring]
            alert_threshold_days = 14

            [[domains]]
            name = "example.com"

            [future_feature]
            knob = true
        "#,
        )
        .unwrap();
        assert_eq!(config.global_threshold_days, 14);
    }

    #[test]
    fn enabled_channel_without_parameters_is_rejected() {
        let err = load_toml(
            r#"
            [[domains]]
            name = "example.com"

            [notifications.slack]
            enabled = true
        "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingChannelParameter {
                channel: "slack",
                key: "webhook_url",
            }
        ));
    }

    #[test]
    fn domain_names_are_normalized() {
        assert_eq!(normalize_domain("https://www.Example.com/path"), "example.com");
        assert_eq!(normalize_domain("WWW.EXAMPLE.ORG"), "example.org");
        assert_eq!(normalize_domain("example.net."), "example.net");
        assert_eq!(normalize_domain("  example.io/health  "), "example.io");
        assert_eq!(normalize_domain(""), "");
    }
}
