use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

use crate::error::CheckError;
use crate::models::{Expiration, Metadata};

const RDAP_ENDPOINT: &str = "https://rdap.org/domain";
const IANA_WHOIS: &str = "whois.iana.org";
const WHOIS_PORT: u16 = 43;

/// Look up when the domain's registration lapses.
///
/// RDAP is the primary source; WHOIS over port 43 is the fallback when RDAP
/// fails deterministically. A transient RDAP error is returned as-is so the
/// caller's retry policy still sees it as retryable.
pub async fn check_registration(
    client: &Client,
    domain: &str,
    timeout: Duration,
) -> Result<Expiration, CheckError> {
    match time::timeout(timeout, registration_lookup(client, domain)).await {
        Ok(result) => result,
        Err(_) => Err(CheckError::Timeout(timeout)),
    }
}

async fn registration_lookup(client: &Client, domain: &str) -> Result<Expiration, CheckError> {
    let rdap_err = match rdap_lookup(client, domain).await {
        Ok(found) => return Ok(found),
        Err(e) if e.is_transient() => return Err(e),
        Err(e) => e,
    };
    match whois_lookup(domain).await {
        Ok(found) => Ok(found),
        Err(whois_err) if whois_err.is_transient() => Err(whois_err),
        Err(whois_err) => Err(CheckError::Lookup(format!(
            "rdap: {rdap_err}; whois: {whois_err}"
        ))),
    }
}

async fn rdap_lookup(client: &Client, domain: &str) -> Result<Expiration, CheckError> {
    let url = format!("{RDAP_ENDPOINT}/{domain}");
    let response = client.get(&url).send().await.map_err(request_error)?;
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(CheckError::Lookup(format!("no RDAP record for {domain}")));
    }
    if !status.is_success() {
        return Err(CheckError::Lookup(format!(
            "RDAP query for {domain} returned {status}"
        )));
    }
    let body: Value = response.json().await.map_err(request_error)?;
    let expiration_date = rdap_expiration(&body).ok_or_else(|| {
        CheckError::Lookup(format!("RDAP record for {domain} has no expiration event"))
    })?;
    Ok(Expiration {
        expiration_date,
        metadata: Metadata {
            registrar: rdap_registrar(&body),
            ..Metadata::default()
        },
    })
}

fn request_error(e: reqwest::Error) -> CheckError {
    if e.is_connect() || e.is_timeout() {
        CheckError::Connection(e.to_string())
    } else {
        CheckError::Lookup(e.to_string())
    }
}

fn rdap_expiration(body: &Value) -> Option<DateTime<Utc>> {
    body["events"].as_array()?.iter().find_map(|event| {
        let action = event["eventAction"].as_str()?;
        if !action.eq_ignore_ascii_case("expiration") {
            return None;
        }
        let date = event["eventDate"].as_str()?;
        DateTime::parse_from_rfc3339(date)
            .ok()
            .map(|d| d.with_timezone(&Utc))
    })
}

fn rdap_registrar(body: &Value) -> Option<String> {
    body["entities"].as_array()?.iter().find_map(|entity| {
        let is_registrar = entity["roles"]
            .as_array()?
            .iter()
            .any(|role| role.as_str().is_some_and(|r| r.eq_ignore_ascii_case("registrar")));
        if !is_registrar {
            return None;
        }
        vcard_full_name(&entity["vcardArray"])
    })
}

// vcardArray is ["vcard", [["fn", {}, "text", "Registrar Inc."], ...]]
fn vcard_full_name(vcard: &Value) -> Option<String> {
    vcard.as_array()?.get(1)?.as_array()?.iter().find_map(|entry| {
        let entry = entry.as_array()?;
        if entry.first()?.as_str()? != "fn" {
            return None;
        }
        let name = entry.get(3)?.as_str()?.trim();
        (!name.is_empty()).then(|| name.to_string())
    })
}

async fn whois_lookup(domain: &str) -> Result<Expiration, CheckError> {
    let referral = whois_query(IANA_WHOIS, domain).await?;
    let server = whois_field(&referral, &["refer", "whois"])
        .ok_or_else(|| CheckError::Lookup(format!("no WHOIS referral for {domain}")))?;
    let response = whois_query(&server, domain).await?;
    let expiration_date = whois_expiration(&response).ok_or_else(|| {
        CheckError::Lookup(format!("WHOIS record for {domain} has no expiration date"))
    })?;
    Ok(Expiration {
        expiration_date,
        metadata: Metadata {
            registrar: whois_field(&response, &["registrar", "sponsoring registrar"]),
            ..Metadata::default()
        },
    })
}

async fn whois_query(server: &str, query: &str) -> Result<String, CheckError> {
    let mut stream = TcpStream::connect((server, WHOIS_PORT))
        .await
        .map_err(|e| CheckError::Connection(format!("{server}:{WHOIS_PORT}: {e}")))?;
    stream
        .write_all(format!("{query}\r\n").as_bytes())
        .await
        .map_err(|e| CheckError::Connection(format!("{server}: {e}")))?;
    let mut raw = Vec::new();
    stream
        .read_to_end(&mut raw)
        .await
        .map_err(|e| CheckError::Connection(format!("{server}: {e}")))?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn whois_field(response: &str, keys: &[&str]) -> Option<String> {
    response.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if !keys.contains(&key.trim().to_ascii_lowercase().as_str()) {
            return None;
        }
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

// The common spellings across registries; registrars invent their own.
const EXPIRY_KEYS: &[&str] = &[
    "registry expiry date",
    "registrar registration expiration date",
    "expiry date",
    "expiration date",
    "expiration time",
    "expire date",
    "expires",
    "expires on",
    "expire",
    "paid-till",
];

fn whois_expiration(response: &str) -> Option<DateTime<Utc>> {
    response.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if !EXPIRY_KEYS.contains(&key.trim().to_ascii_lowercase().as_str()) {
            return None;
        }
        parse_expiry_date(value.trim())
    })
}

fn parse_expiry_date(value: &str) -> Option<DateTime<Utc>> {
    parse_expiry_value(value)
        // some registries append annotations, e.g. "2027-09-14 (registry time)"
        .or_else(|| parse_expiry_value(value.split_whitespace().next()?))
}

fn parse_expiry_value(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y.%m.%d %H:%M:%S",
    ];
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed.and_utc());
        }
    }
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%b-%Y", "%d.%m.%Y", "%Y.%m.%d", "%Y/%m/%d"];
    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, format) {
            return parsed.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}
