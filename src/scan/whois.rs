//! WHOIS lookup and normalization.
//!
//! Speaks the raw WHOIS protocol (TCP/43) against a per-TLD server
//! table, falling back to a referral walk from `whois.iana.org`, with a
//! single registrar-referral follow. Responses are normalized into
//! [`WhoisRecord`]: recognized keys are extracted with compiled regexes
//! and dates run through a fixed list of fallback parsers — a date that
//! refuses to parse nulls the field without failing the lookup.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_derive::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::scan::errors::NetError;
use crate::scan::retry::RetryPolicy;

/// TTL for cached `Unavailable` outcomes, to avoid hammering registries
/// that are refusing us.
pub const NEGATIVE_TTL_SECS: u64 = 600;

const IANA_SERVER: &str = "whois.iana.org";
const MAX_RESPONSE_BYTES: usize = 256 * 1024;

/// Normalized registration metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhoisRecord {
    pub registrar: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
    pub updated_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub name_servers: Vec<String>,
    pub status: Vec<String>,
    pub emails: Vec<String>,
    /// The lookup itself succeeded; individual fields may still be null.
    pub raw_ok: bool,
}

/// Cacheable outcome of a lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WhoisOutcome {
    Ok(WhoisRecord),
    Unavailable,
}

pub struct WhoisClient {
    retry: RetryPolicy,
}

impl WhoisClient {
    pub fn new(timeout_secs: u64, retry_count: u32, retry_delay_secs: u64) -> WhoisClient {
        WhoisClient {
            retry: RetryPolicy::fixed(
                retry_count.max(1),
                Duration::from_secs(timeout_secs.max(1)),
                Duration::from_secs(retry_delay_secs),
            ),
        }
    }

    pub async fn lookup(&self, domain: &str) -> WhoisOutcome {
        match self
            .retry
            .run(&format!("whois {}", domain), || self.query(domain))
            .await
        {
            Ok(record) => WhoisOutcome::Ok(record),
            Err(err) => {
                log::warn!("whois for {} unavailable: {}", domain, err);
                WhoisOutcome::Unavailable
            }
        }
    }

    async fn query(&self, domain: &str) -> Result<WhoisRecord, NetError> {
        let mut server = server_for(domain).to_string();
        let mut response = raw_query(&server, domain).await?;

        if server == IANA_SERVER {
            match referral_server(&response) {
                Some(referred) => {
                    server = referred;
                    response = raw_query(&server, domain).await?;
                }
                None => {
                    return Err(NetError::Malformed(format!(
                        "iana has no whois server for {}",
                        domain
                    )))
                }
            }
        }

        // registries like verisign answer thinly and point at the
        // registrar's server; follow that referral once
        if let Some(registrar_server) = registrar_referral(&response) {
            if registrar_server != server {
                if let Ok(better) = raw_query(&registrar_server, domain).await {
                    if !better.trim().is_empty() {
                        response = better;
                    }
                }
            }
        }

        if looks_refused(&response) {
            return Err(NetError::Refused(format!("{} throttled the query", server)));
        }

        Ok(parse_response(&response))
    }
}

async fn raw_query(server: &str, domain: &str) -> Result<String, NetError> {
    let mut stream = TcpStream::connect((server, 43)).await?;

    // verisign's thin servers need the "domain" keyword to suppress
    // fuzzy matching
    let request = if server.contains("verisign-grs") {
        format!("domain {}\r\n", domain)
    } else {
        format!("{}\r\n", domain)
    };
    stream.write_all(request.as_bytes()).await?;

    let mut response = Vec::new();
    let mut chunk = [0u8; 4096];
    while response.len() < MAX_RESPONSE_BYTES {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        response.extend_from_slice(&chunk[..n]);
    }
    Ok(String::from_utf8_lossy(&response).into_owned())
}

/// Authoritative server for the domain's TLD, or the IANA root server
/// when the TLD is not in the table.
fn server_for(domain: &str) -> &'static str {
    let tld = domain.rsplit('.').next().unwrap_or("");
    match tld {
        "com" | "net" => "whois.verisign-grs.com",
        "org" => "whois.publicinterestregistry.org",
        "info" => "whois.nic.info",
        "biz" => "whois.nic.biz",
        "io" => "whois.nic.io",
        "co" => "whois.nic.co",
        "ai" => "whois.nic.ai",
        "app" | "dev" | "page" => "whois.nic.google",
        "xyz" => "whois.nic.xyz",
        "top" => "whois.nic.top",
        "online" => "whois.nic.online",
        "site" => "whois.nic.site",
        "shop" => "whois.nic.shop",
        "store" => "whois.nic.store",
        "club" => "whois.nic.club",
        "me" => "whois.nic.me",
        "tv" => "whois.nic.tv",
        "cc" => "ccwhois.verisign-grs.com",
        "us" => "whois.nic.us",
        "uk" => "whois.nic.uk",
        "de" => "whois.denic.de",
        "fr" => "whois.nic.fr",
        "nl" => "whois.domain-registry.nl",
        "it" => "whois.nic.it",
        "es" => "whois.nic.es",
        "pl" => "whois.dns.pl",
        "ru" | "su" => "whois.tcinet.ru",
        "ch" => "whois.nic.ch",
        "at" => "whois.nic.at",
        "be" => "whois.dns.be",
        "se" => "whois.iis.se",
        "no" => "whois.norid.no",
        "fi" => "whois.fi",
        "dk" => "whois.punktum.dk",
        "eu" => "whois.eu",
        "ca" => "whois.cira.ca",
        "au" => "whois.auda.org.au",
        "nz" => "whois.irs.net.nz",
        "jp" => "whois.jprs.jp",
        "cn" => "whois.cnnic.cn",
        "in" => "whois.registry.in",
        "br" => "whois.registro.br",
        _ => IANA_SERVER,
    }
}

/// `refer:`/`whois:` line from an IANA root response.
fn referral_server(response: &str) -> Option<String> {
    lazy_static! {
        static ref REFER: Regex = Regex::new(r"(?mi)^\s*(?:refer|whois):\s*(\S+)").expect("regex");
    }
    REFER
        .captures(response)
        .map(|cap| cap[1].trim().to_lowercase())
}

/// `Registrar WHOIS Server:` line from a thin registry response.
fn registrar_referral(response: &str) -> Option<String> {
    lazy_static! {
        static ref REGISTRAR_WHOIS: Regex =
            Regex::new(r"(?mi)^\s*Registrar WHOIS Server:\s*(\S+)").expect("regex");
    }
    REGISTRAR_WHOIS
        .captures(response)
        .map(|cap| cap[1].trim().trim_start_matches("whois://").to_lowercase())
        .filter(|server| !server.is_empty())
}

fn looks_refused(response: &str) -> bool {
    let lowered = response.to_lowercase();
    ["query rate", "rate limit", "exceeded", "try again later", "quota"]
        .iter()
        .any(|marker| lowered.contains(marker))
        && response.len() < 2048
}

pub fn parse_response(response: &str) -> WhoisRecord {
    lazy_static! {
        static ref REGISTRAR: Regex =
            Regex::new(r"(?mi)^\s*registrar(?: name)?:\s*(.+?)\s*$").expect("regex");
        static ref CREATED: Regex = Regex::new(
            r"(?mi)^\s*(?:creation date|created(?: on| date)?|registered(?: on)?|registration (?:date|time)|domain record activated):\s*(.+?)\s*$"
        )
        .expect("regex");
        static ref UPDATED: Regex = Regex::new(
            r"(?mi)^\s*(?:updated date|last[ -]updated(?: on)?|modified|changed|last modified):\s*(.+?)\s*$"
        )
        .expect("regex");
        static ref EXPIRES: Regex = Regex::new(
            r"(?mi)^\s*(?:registry expiry date|expiration date|expiry date|expires(?: on)?|paid-till):\s*(.+?)\s*$"
        )
        .expect("regex");
        static ref NAME_SERVER: Regex =
            Regex::new(r"(?mi)^\s*(?:name server|nserver|nameserver):\s*(\S+)").expect("regex");
        static ref STATUS: Regex =
            Regex::new(r"(?mi)^\s*(?:domain )?status:\s*(.+?)\s*$").expect("regex");
        static ref EMAIL: Regex =
            Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("regex");
    }

    let mut record = WhoisRecord {
        raw_ok: true,
        ..Default::default()
    };

    record.registrar = REGISTRAR
        .captures(response)
        .map(|cap| cap[1].trim().to_string())
        .filter(|r| !r.is_empty());
    record.creation_date = CREATED
        .captures(response)
        .and_then(|cap| parse_date(&cap[1]));
    record.updated_date = UPDATED
        .captures(response)
        .and_then(|cap| parse_date(&cap[1]));
    record.expiration_date = EXPIRES
        .captures(response)
        .and_then(|cap| parse_date(&cap[1]));

    record.name_servers = dedup(
        NAME_SERVER
            .captures_iter(response)
            .map(|cap| cap[1].trim().trim_end_matches('.').to_lowercase()),
    );
    record.status = dedup(STATUS.captures_iter(response).filter_map(|cap| {
        // EPP status lines carry a trailing icann.org URL; keep the code
        cap[1].split_whitespace().next().map(str::to_string)
    }));
    record.emails = dedup(
        EMAIL
            .find_iter(response)
            .map(|m| m.as_str().to_lowercase())
            .filter(|email| !email.ends_with("icann.org")),
    );

    record
}

fn dedup(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .filter(|value| !value.is_empty() && seen.insert(value.clone()))
        .collect()
}

/// Normalize one date string through the fallback parser chain.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let cleaned = raw
        .trim()
        .trim_end_matches(" UTC")
        .trim_end_matches(" GMT")
        .trim_matches('.')
        .trim();
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(cleaned) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(cleaned) {
        return Some(parsed.with_timezone(&Utc));
    }

    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%Y-%m-%d %H:%M:%S",
        "%Y.%m.%d %H:%M:%S",
        "%d.%m.%Y %H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
    ];
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(cleaned, format) {
            return Some(Utc.from_utc_datetime(&parsed));
        }
    }

    const DATE_FORMATS: &[&str] = &[
        "%Y-%m-%d",
        "%d.%m.%Y",
        "%d-%b-%Y",
        "%d %b %Y",
        "%Y/%m/%d",
        "%Y.%m.%d",
    ];
    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(cleaned, format) {
            let midnight = parsed.and_hms_opt(0, 0, 0)?;
            return Some(Utc.from_utc_datetime(&midnight));
        }
    }

    log::debug!("unparseable whois date: {:?}", raw);
    None
}

/// Heuristic: the registration hides behind a privacy/proxy service.
pub fn uses_privacy_service(record: &WhoisRecord) -> bool {
    const MARKERS: &[&str] = &[
        "privacy",
        "redacted",
        "proxy",
        "whoisguard",
        "withheld",
        "identity protect",
        "contact privacy",
        "private registration",
    ];
    let mut haystacks: Vec<&str> = Vec::new();
    if let Some(registrar) = &record.registrar {
        haystacks.push(registrar);
    }
    haystacks.extend(record.emails.iter().map(String::as_str));

    haystacks.iter().any(|hay| {
        let lowered = hay.to_lowercase();
        MARKERS.iter().any(|marker| lowered.contains(marker))
    })
}
