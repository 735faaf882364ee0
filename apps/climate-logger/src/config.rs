use anyhow::{anyhow, Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

const MAX_OFFSET_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_bind: String,

    pub log_path: PathBuf,
    pub sync_each_append: bool,

    pub demo_when_empty: bool,
    pub demo_seed: u64,
    pub display_offset_minutes: i32,

    pub cors_permissive: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let http_bind = env_string("CLIMATE_HTTP_BIND", Some("0.0.0.0:8080".to_string()))?;

        let log_path = PathBuf::from(env_string(
            "CLIMATE_LOG_PATH",
            Some("./data/readings.csv".to_string()),
        )?);
        let sync_each_append = env_bool("CLIMATE_SYNC_EACH_APPEND", true)?;

        let demo_when_empty = env_bool("CLIMATE_DEMO_WHEN_EMPTY", true)?;
        let demo_seed = env_u64("CLIMATE_DEMO_SEED", Some(42))?;

        let display_offset_minutes = match env_optional("CLIMATE_DISPLAY_UTC_OFFSET_MINUTES") {
            Some(raw) => parse_offset_minutes(&raw)?,
            None => 0,
        };

        let cors_permissive = env_bool("CLIMATE_CORS_PERMISSIVE", true)?;

        Ok(Self {
            http_bind,
            log_path,
            sync_each_append,
            demo_when_empty,
            demo_seed,
            display_offset_minutes,
            cors_permissive,
        })
    }

    /// Offset used for dashboard labels and the synthetic curve's hour-of-day.
    pub fn display_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.display_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }
}

fn env_string(key: &str, default: Option<String>) -> Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value.trim().to_string()),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_u64(key: &str, default: Option<u64>) -> Result<u64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env_optional(key) {
        Some(value) => parse_bool(&value).ok_or_else(|| anyhow!("invalid {key}: {value}")),
        None => Ok(default),
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// UTC offset in whole minutes, strictly inside one day either way.
fn parse_offset_minutes(raw: &str) -> Result<i32> {
    let minutes = raw
        .trim()
        .parse::<i64>()
        .context("invalid CLIMATE_DISPLAY_UTC_OFFSET_MINUTES")?;
    if minutes.abs() >= MAX_OFFSET_MINUTES {
        return Err(anyhow!(
            "CLIMATE_DISPLAY_UTC_OFFSET_MINUTES must be within ±{}",
            MAX_OFFSET_MINUTES - 1
        ));
    }
    Ok(minutes as i32)
}
