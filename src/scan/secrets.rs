//! Ordered credential resolution.
//!
//! A named credential is looked up through a fixed chain and the first
//! non-empty value wins:
//!
//! 1. `TYPO_SNIPER_<NAME>` environment variable
//! 2. Doppler (when `DOPPLER_TOKEN` is set)
//! 3. AWS Secrets Manager JSON field (when `AWS_SECRET_NAME` is set)
//! 4. `<NAME>` environment variable
//! 5. the configuration-file value
//!
//! Every failure along the chain is silent: enrichers check for an
//! empty result and simply stay disabled.

use std::time::Duration;

/// Resolve `name` (lower snake case, e.g. `urlscan_api_key`).
pub async fn resolve(name: &str, config_value: Option<&str>) -> Option<String> {
    let upper = name.to_ascii_uppercase();

    if let Some(value) = env_value(&format!("TYPO_SNIPER_{}", upper)) {
        log::debug!("secret {} resolved from prefixed environment", name);
        return Some(value);
    }

    if let Some(token) = env_value("DOPPLER_TOKEN") {
        if let Some(value) = doppler_lookup(&token, &upper).await {
            log::debug!("secret {} resolved from doppler", name);
            return Some(value);
        }
    }

    if let Some(secret_name) = env_value("AWS_SECRET_NAME") {
        if let Some(value) = aws_lookup(&secret_name, name).await {
            log::debug!("secret {} resolved from aws secrets manager", name);
            return Some(value);
        }
    }

    if let Some(value) = env_value(&upper) {
        log::debug!("secret {} resolved from unprefixed environment", name);
        return Some(value);
    }

    non_empty(config_value.map(str::to_string))
}

fn env_value(key: &str) -> Option<String> {
    non_empty(std::env::var(key).ok())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn doppler_lookup(token: &str, name: &str) -> Option<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .ok()?;
    let response = client
        .get("https://api.doppler.com/v3/configs/config/secret")
        .query(&[("name", name)])
        .bearer_auth(token)
        .send()
        .await
        .ok()?;
    if !response.status().is_success() {
        log::debug!("doppler lookup for {} returned {}", name, response.status());
        return None;
    }
    let body: serde_json::Value = response.json().await.ok()?;
    non_empty(body["value"]["raw"].as_str().map(str::to_string))
}

async fn aws_lookup(secret_name: &str, field: &str) -> Option<String> {
    let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let client = aws_sdk_secretsmanager::Client::new(&shared);
    let output = client
        .get_secret_value()
        .secret_id(secret_name)
        .send()
        .await
        .map_err(|err| log::debug!("aws secrets manager lookup failed: {}", err))
        .ok()?;
    let raw = output.secret_string()?;
    let body: serde_json::Value = serde_json::from_str(raw).ok()?;
    non_empty(body[field].as_str().map(str::to_string))
}
