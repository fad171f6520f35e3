use std::env;

use anyhow::{Context, Result, anyhow, ensure};

pub const DEFAULT_DIFF_SERVER_URL: &str = "http://localhost:3000";
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_FETCH_MAX_RETRIES: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerSettings {
    pub diff_server_url: String,
    pub fetch_timeout_ms: u64,
    pub fetch_max_retries: u32,
    pub telemetry_enabled: bool,
    pub telemetry_post_url: String,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self::for_server(DEFAULT_DIFF_SERVER_URL)
    }
}

impl ViewerSettings {
    pub fn from_env() -> Result<Self> {
        // Load .env if present, but do not fail if file does not exist.
        let _ = dotenvy::dotenv();

        let diff_server_url =
            env::var("DIFF_SERVER_URL").unwrap_or_else(|_| DEFAULT_DIFF_SERVER_URL.to_owned());
        ensure!(
            !diff_server_url.trim().is_empty(),
            "DIFF_SERVER_URL cannot be empty"
        );
        let diff_server_url = diff_server_url.trim().trim_end_matches('/').to_owned();

        let fetch_timeout_ms = parse_u64_env("DIFF_FETCH_TIMEOUT_MS", DEFAULT_FETCH_TIMEOUT_MS)?;
        ensure!(
            fetch_timeout_ms > 0,
            "DIFF_FETCH_TIMEOUT_MS must be greater than 0"
        );

        let fetch_max_retries =
            parse_u32_env("DIFF_FETCH_MAX_RETRIES", DEFAULT_FETCH_MAX_RETRIES)?;
        let telemetry_enabled = parse_bool_env("TELEMETRY_ENABLED", true)?;

        let telemetry_post_url = read_optional_env("TELEMETRY_POST_URL")
            .map(|url| url.trim_end_matches('/').to_owned())
            .unwrap_or_else(|| default_post_url(&diff_server_url));

        Ok(Self {
            diff_server_url,
            fetch_timeout_ms,
            fetch_max_retries,
            telemetry_enabled,
            telemetry_post_url,
        })
    }

    /// Defaults pointed at `diff_server_url`; used by tests and fixtures.
    pub fn for_server(diff_server_url: &str) -> Self {
        let diff_server_url = diff_server_url.trim_end_matches('/').to_owned();
        Self {
            telemetry_post_url: default_post_url(&diff_server_url),
            diff_server_url,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            fetch_max_retries: DEFAULT_FETCH_MAX_RETRIES,
            telemetry_enabled: true,
        }
    }
}

fn default_post_url(diff_server_url: &str) -> String {
    format!("{diff_server_url}/study")
}

fn read_optional_env(name: &str) -> Option<String> {
    env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_owned())
        }
    })
}

fn parse_u32_env(name: &str, default: u32) -> Result<u32> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u32>()
            .with_context(|| format!("failed to parse {name} as u32")),
        Err(_) => Ok(default),
    }
}

fn parse_u64_env(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("failed to parse {name} as u64")),
        Err(_) => Ok(default),
    }
}

fn parse_bool_env(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(raw) => parse_bool(&raw).with_context(|| format!("failed to parse {name}")),
        Err(_) => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(anyhow!("invalid boolean `{other}`; expected `true` or `false`")),
    }
}
