//! Threat-intel enrichers.
//!
//! A closed set of three optional enrichers, each an independent client
//! with its own timeout, cache key and failure mode. Failure of one
//! enricher nulls its own field and nothing else.
//!
//! * `urlscan` - urlscan.io search-then-submit protocol
//! * `ct` - certificate-transparency log counts via crt.sh
//! * `http_probe` - liveness probe of the candidate's web endpoint

pub mod ct;
pub mod http_probe;
pub mod urlscan;

use crate::scan::config::{Config, Toggle};
use crate::scan::errors::FatalError;

/// The enrichers a scan runs with. `None` means disabled: the record
/// field stays null and no request is ever issued.
pub struct EnricherSet {
    pub urlscan: Option<urlscan::UrlScanClient>,
    pub certificate_transparency: Option<ct::CtClient>,
    pub http_probe: Option<http_probe::HttpProbe>,
}

impl EnricherSet {
    /// Build the set from configuration plus the resolved URLScan key.
    /// `enable_urlscan: auto` enables URLScan exactly when a key was
    /// resolved; `on` without a key is a configuration error.
    pub fn from_config(
        config: &Config,
        urlscan_key: Option<String>,
    ) -> Result<EnricherSet, FatalError> {
        let urlscan = match (config.enable_urlscan, urlscan_key) {
            (Toggle::Off, _) => None,
            (Toggle::On, None) => {
                return Err(FatalError::config(
                    "enable_urlscan is 'on' but no API key could be resolved",
                ))
            }
            (_, Some(key)) => Some(urlscan::UrlScanClient::new(
                key,
                config.urlscan_max_age_days,
                config.urlscan_wait_timeout,
                &config.urlscan_visibility,
            )?),
            (Toggle::Auto, None) => {
                log::debug!("urlscan disabled: no API key resolved");
                None
            }
        };

        let certificate_transparency = if config.enable_certificate_transparency {
            Some(ct::CtClient::new()?)
        } else {
            None
        };

        let http_probe = if config.enable_http_probe {
            Some(http_probe::HttpProbe::new(config.http_timeout))
        } else {
            None
        };

        Ok(EnricherSet {
            urlscan,
            certificate_transparency,
            http_probe,
        })
    }

    /// Names of the active enrichers, for the scan metadata.
    pub fn enabled_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.urlscan.is_some() {
            names.push("urlscan");
        }
        if self.certificate_transparency.is_some() {
            names.push("certificate_transparency");
        }
        if self.http_probe.is_some() {
            names.push("http_probe");
        }
        names
    }
}
