#![forbid(unsafe_code)]

use anyhow::{Context, Result, anyhow};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PAGE_LOAD_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SCROLL_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_SCROLL_PAUSE_MILLIS: u64 = 2000;

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    /// `None` means every `/scrape` request is rejected.
    pub api_key: Option<String>,
    pub port: u16,
    pub host: String,
    pub chrome_executable: Option<PathBuf>,
    pub extraction: ExtractionSettings,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub chrome_executable: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_settings(overrides: RuntimeOverrides) -> Result<RuntimeSettings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_runtime_settings(&file_vars, env_var_string, overrides)
}

fn build_runtime_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> Result<RuntimeSettings> {
    let lookup = |key: &str| lookup_value(key, file_vars, &env_lookup);

    let port = match overrides.port {
        Some(port) => port,
        None => parse_or("PORT", lookup("PORT"), DEFAULT_PORT)?,
    };
    let host = overrides
        .host
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| lookup("HOST"))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let chrome_executable = overrides
        .chrome_executable
        .or_else(|| lookup("CHROME_EXECUTABLE").map(PathBuf::from));

    let page_load_secs = parse_or(
        "PAGE_LOAD_TIMEOUT_SECS",
        lookup("PAGE_LOAD_TIMEOUT_SECS"),
        DEFAULT_PAGE_LOAD_TIMEOUT_SECS,
    )?;
    let scroll_timeout_secs = parse_or(
        "SCROLL_TIMEOUT_SECS",
        lookup("SCROLL_TIMEOUT_SECS"),
        DEFAULT_SCROLL_TIMEOUT_SECS,
    )?;
    let scroll_pause_millis = parse_or(
        "SCROLL_PAUSE_MILLIS",
        lookup("SCROLL_PAUSE_MILLIS"),
        DEFAULT_SCROLL_PAUSE_MILLIS,
    )?;

    Ok(RuntimeSettings {
        api_key: lookup("API_KEY"),
        port,
        host,
        chrome_executable,
        extraction: ExtractionSettings {
            page_load_timeout: Duration::from_secs(page_load_secs),
            scroll_timeout: Duration::from_secs(scroll_timeout_secs),
            scroll_pause: Duration::from_millis(scroll_pause_millis),
            ..ExtractionSettings::default()
        },
    })
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value
            .parse::<T>()
            .map_err(|err| anyhow!("invalid {key} value {value:?}: {err}")),
        None => Ok(default),
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| {
        file_vars
            .get(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

/// Every wait and limit the extraction flow uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSettings {
    pub page_load_timeout: Duration,
    pub scroll_pause: Duration,
    pub scroll_timeout: Duration,
    /// Consecutive scrolls without new entries before the list counts as complete.
    pub max_stalled_attempts: u32,
    pub reveal_wait: Duration,
    pub about_page_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            page_load_timeout: Duration::from_secs(DEFAULT_PAGE_LOAD_TIMEOUT_SECS),
            scroll_pause: Duration::from_millis(DEFAULT_SCROLL_PAUSE_MILLIS),
            scroll_timeout: Duration::from_secs(DEFAULT_SCROLL_TIMEOUT_SECS),
            max_stalled_attempts: 3,
            reveal_wait: Duration::from_secs(2),
            about_page_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl ExtractionSettings {
    /// No waiting at all. Scripted pages answer immediately, so only the
    /// stall limit and the scroll timeout bound the loops.
    #[cfg(test)]
    pub fn immediate() -> Self {
        Self {
            page_load_timeout: Duration::ZERO,
            scroll_pause: Duration::ZERO,
            reveal_wait: Duration::ZERO,
            about_page_timeout: Duration::ZERO,
            poll_interval: Duration::ZERO,
            ..Self::default()
        }
    }
}
