//! Layered scan configuration.
//!
//! Values come from three layers, later wins: the YAML file, the
//! `TYPO_SNIPER_*` environment, and the command line. The merged value
//! is immutable for the life of the scan; components receive it by
//! reference and never mutate it.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::Deserialize as _;
use serde_derive::Deserialize;

use crate::scan::errors::FatalError;

/// Tri-state switch for enrichers that can self-enable when their
/// credential resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Toggle {
    /// Enabled exactly when a credential resolves.
    #[default]
    Auto,
    On,
    Off,
}

impl FromStr for Toggle {
    type Err = String;

    fn from_str(raw: &str) -> Result<Toggle, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Toggle::Auto),
            "true" | "on" | "yes" | "1" => Ok(Toggle::On),
            "false" | "off" | "no" | "0" => Ok(Toggle::Off),
            other => Err(format!("'{}' is not one of auto/on/off", other)),
        }
    }
}

impl<'de> serde::Deserialize<'de> for Toggle {
    fn deserialize<D>(deserializer: D) -> Result<Toggle, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(serde_derive::Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Bool(true) => Ok(Toggle::On),
            Raw::Bool(false) => Ok(Toggle::Off),
            Raw::Text(text) => Toggle::from_str(&text).map_err(de::Error::custom),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    // scheduling
    pub max_workers: usize,
    pub rate_limit_delay: f64,
    pub scan_deadline: Option<u64>,

    // cache
    pub use_cache: bool,
    pub cache_dir: PathBuf,
    pub cache_ttl: u64,

    // record filter
    pub months_filter: u32,

    // dns
    pub dns_retry_count: u32,

    // whois
    pub whois_timeout: u64,
    pub whois_retry_count: u32,
    pub whois_retry_delay: u64,

    // optional fuzzers
    pub enable_combosquatting: bool,
    pub enable_soundalike: bool,
    pub enable_idn_homograph: bool,

    // urlscan
    pub enable_urlscan: Toggle,
    pub urlscan_api_key: Option<String>,
    pub urlscan_max_age_days: u32,
    pub urlscan_wait_timeout: u64,
    pub urlscan_visibility: String,
    pub urlscan_submit_interval: f64,

    // other enrichers
    pub enable_certificate_transparency: bool,
    pub enable_http_probe: bool,
    pub http_timeout: u64,
    pub enable_risk_scoring: bool,

    // ml hook
    pub enable_ml: bool,
    pub ml_model_path: Option<PathBuf>,
    pub ml_confidence_threshold: f64,
    pub ml_enable_active_learning: bool,
    pub ml_uncertainty_threshold: f64,
    pub ml_review_budget: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            max_workers: 10,
            rate_limit_delay: 1.0,
            scan_deadline: None,
            use_cache: true,
            cache_dir: PathBuf::from(".typo-sniper-cache"),
            cache_ttl: 24 * 60 * 60,
            months_filter: 0,
            dns_retry_count: 2,
            whois_timeout: 30,
            whois_retry_count: 2,
            whois_retry_delay: 5,
            enable_combosquatting: false,
            enable_soundalike: false,
            enable_idn_homograph: false,
            enable_urlscan: Toggle::Auto,
            urlscan_api_key: None,
            urlscan_max_age_days: 7,
            urlscan_wait_timeout: 90,
            urlscan_visibility: "public".to_string(),
            urlscan_submit_interval: 1.0,
            enable_certificate_transparency: false,
            enable_http_probe: false,
            http_timeout: 10,
            enable_risk_scoring: true,
            enable_ml: false,
            ml_model_path: None,
            ml_confidence_threshold: 0.5,
            ml_enable_active_learning: false,
            ml_uncertainty_threshold: 0.1,
            ml_review_budget: 50,
        }
    }
}

impl Config {
    pub fn from_yaml_file(path: &Path) -> Result<Config, FatalError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| FatalError::config(format!("{}: {}", path.display(), err)))?;
        serde_yaml::from_str(&raw)
            .map_err(|err| FatalError::config(format!("{}: {}", path.display(), err)))
    }

    /// Overlay `TYPO_SNIPER_*` environment variables onto this config.
    /// An unparseable value is a configuration error, not a silent skip.
    pub fn apply_env_overrides(&mut self) -> Result<(), FatalError> {
        overlay(&mut self.max_workers, "TYPO_SNIPER_MAX_WORKERS")?;
        overlay(&mut self.rate_limit_delay, "TYPO_SNIPER_RATE_LIMIT_DELAY")?;
        overlay_opt(&mut self.scan_deadline, "TYPO_SNIPER_SCAN_DEADLINE")?;
        overlay(&mut self.use_cache, "TYPO_SNIPER_USE_CACHE")?;
        overlay(&mut self.cache_dir, "TYPO_SNIPER_CACHE_DIR")?;
        overlay(&mut self.cache_ttl, "TYPO_SNIPER_CACHE_TTL")?;
        overlay(&mut self.months_filter, "TYPO_SNIPER_MONTHS_FILTER")?;
        overlay(&mut self.dns_retry_count, "TYPO_SNIPER_DNS_RETRY_COUNT")?;
        overlay(&mut self.whois_timeout, "TYPO_SNIPER_WHOIS_TIMEOUT")?;
        overlay(&mut self.whois_retry_count, "TYPO_SNIPER_WHOIS_RETRY_COUNT")?;
        overlay(&mut self.whois_retry_delay, "TYPO_SNIPER_WHOIS_RETRY_DELAY")?;
        overlay(
            &mut self.enable_combosquatting,
            "TYPO_SNIPER_ENABLE_COMBOSQUATTING",
        )?;
        overlay(&mut self.enable_soundalike, "TYPO_SNIPER_ENABLE_SOUNDALIKE")?;
        overlay(
            &mut self.enable_idn_homograph,
            "TYPO_SNIPER_ENABLE_IDN_HOMOGRAPH",
        )?;
        overlay(&mut self.enable_urlscan, "TYPO_SNIPER_ENABLE_URLSCAN")?;
        overlay(
            &mut self.urlscan_max_age_days,
            "TYPO_SNIPER_URLSCAN_MAX_AGE_DAYS",
        )?;
        overlay(
            &mut self.urlscan_wait_timeout,
            "TYPO_SNIPER_URLSCAN_WAIT_TIMEOUT",
        )?;
        overlay(
            &mut self.urlscan_visibility,
            "TYPO_SNIPER_URLSCAN_VISIBILITY",
        )?;
        overlay(
            &mut self.urlscan_submit_interval,
            "TYPO_SNIPER_URLSCAN_SUBMIT_INTERVAL",
        )?;
        overlay(
            &mut self.enable_certificate_transparency,
            "TYPO_SNIPER_ENABLE_CERTIFICATE_TRANSPARENCY",
        )?;
        overlay(&mut self.enable_http_probe, "TYPO_SNIPER_ENABLE_HTTP_PROBE")?;
        overlay(&mut self.http_timeout, "TYPO_SNIPER_HTTP_TIMEOUT")?;
        overlay(
            &mut self.enable_risk_scoring,
            "TYPO_SNIPER_ENABLE_RISK_SCORING",
        )?;
        overlay(&mut self.enable_ml, "TYPO_SNIPER_ENABLE_ML")?;
        overlay_opt(&mut self.ml_model_path, "TYPO_SNIPER_ML_MODEL_PATH")?;
        overlay(
            &mut self.ml_confidence_threshold,
            "TYPO_SNIPER_ML_CONFIDENCE_THRESHOLD",
        )?;
        overlay(
            &mut self.ml_enable_active_learning,
            "TYPO_SNIPER_ML_ENABLE_ACTIVE_LEARNING",
        )?;
        overlay(
            &mut self.ml_uncertainty_threshold,
            "TYPO_SNIPER_ML_UNCERTAINTY_THRESHOLD",
        )?;
        overlay(&mut self.ml_review_budget, "TYPO_SNIPER_ML_REVIEW_BUDGET")?;
        Ok(())
    }

    /// Reject configurations no scan should run with.
    pub fn validate(&self) -> Result<(), FatalError> {
        if self.max_workers == 0 {
            return Err(FatalError::config("max_workers must be >= 1"));
        }
        if self.rate_limit_delay < 0.0 {
            return Err(FatalError::config("rate_limit_delay must be >= 0"));
        }
        if self.whois_timeout == 0 {
            return Err(FatalError::config("whois_timeout must be >= 1"));
        }
        if self.urlscan_submit_interval <= 0.0 {
            return Err(FatalError::config("urlscan_submit_interval must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.ml_confidence_threshold) {
            return Err(FatalError::config(
                "ml_confidence_threshold must be within [0, 1]",
            ));
        }
        if !(0.0..=0.5).contains(&self.ml_uncertainty_threshold) {
            return Err(FatalError::config(
                "ml_uncertainty_threshold must be within [0, 0.5]",
            ));
        }
        match &self.urlscan_visibility[..] {
            "public" | "unlisted" | "private" => {}
            other => {
                return Err(FatalError::config(format!(
                    "urlscan_visibility '{}' is not public/unlisted/private",
                    other
                )))
            }
        }
        Ok(())
    }

    /// Feature names recorded in the scan metadata.
    pub fn enabled_features(&self, enricher_names: &[&str]) -> Vec<String> {
        let mut features: Vec<String> = enricher_names.iter().map(|n| n.to_string()).collect();
        if self.enable_combosquatting {
            features.push("combosquatting".to_string());
        }
        if self.enable_soundalike {
            features.push("soundalike".to_string());
        }
        if self.enable_idn_homograph {
            features.push("idn_homograph".to_string());
        }
        if self.enable_risk_scoring {
            features.push("risk_scoring".to_string());
        }
        if self.enable_ml {
            features.push("ml".to_string());
        }
        if self.ml_enable_active_learning {
            features.push("active_learning".to_string());
        }
        features.sort();
        features
    }
}

fn overlay<T>(slot: &mut T, key: &str) -> Result<(), FatalError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(key) {
        if !raw.trim().is_empty() {
            *slot = raw
                .trim()
                .parse()
                .map_err(|err| FatalError::config(format!("{}={}: {}", key, raw, err)))?;
        }
    }
    Ok(())
}

fn overlay_opt<T>(slot: &mut Option<T>, key: &str) -> Result<(), FatalError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(key) {
        if !raw.trim().is_empty() {
            *slot = Some(
                raw.trim()
                    .parse()
                    .map_err(|err| FatalError::config(format!("{}={}: {}", key, raw, err)))?,
            );
        }
    }
    Ok(())
}
