//! Environment-backed configuration for `resource-smoke`.

use std::{env, path::PathBuf};

use resource_core::{ResourceCenterConfig, Theme};
use thiserror::Error;

const DEFAULT_LIST_ENDPOINT: &str = "https://api.imagekit.io/v1/files";
const DEFAULT_UPLOAD_ENDPOINT: &str = "https://upload.imagekit.io/api/v1/files/upload";

/// Smoke run settings: the widget configuration plus an optional file to upload.
#[derive(Debug, Clone, PartialEq)]
pub struct SmokeConfig {
    pub widget: ResourceCenterConfig,
    /// Local file uploaded after the first page loads.
    pub upload_path: Option<PathBuf>,
}

impl SmokeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let private_key = optional_trimmed_env("RESOURCE_CENTER_PRIVATE_KEY", &mut lookup)
            .ok_or(ConfigError::Missing {
                key: "RESOURCE_CENTER_PRIVATE_KEY",
            })?;
        let list_endpoint = optional_trimmed_env("RESOURCE_CENTER_LIST_ENDPOINT", &mut lookup)
            .unwrap_or_else(|| DEFAULT_LIST_ENDPOINT.to_owned());
        let upload_endpoint = optional_trimmed_env("RESOURCE_CENTER_UPLOAD_ENDPOINT", &mut lookup)
            .unwrap_or_else(|| DEFAULT_UPLOAD_ENDPOINT.to_owned());

        let mut widget = ResourceCenterConfig::new(list_endpoint, upload_endpoint, private_key);
        widget.upload_folder = optional_trimmed_env("RESOURCE_CENTER_UPLOAD_FOLDER", &mut lookup);
        if let Some(tags) = optional_list("RESOURCE_CENTER_UPLOAD_TAGS", &mut lookup) {
            widget.upload_tags = tags;
        }
        if let Some(types) = optional_list("RESOURCE_CENTER_ALLOWED_TYPES", &mut lookup) {
            widget.allowed_types = types;
        }
        if let Some(exts) = optional_list("RESOURCE_CENTER_ALLOWED_EXTS", &mut lookup) {
            widget.allowed_exts = exts;
        }
        if let Some(max) = parse_optional::<u64, _>("RESOURCE_CENTER_MAX_FILE_SIZE", &mut lookup)? {
            widget.max_file_size = max;
        }
        if let Some(flag) = parse_optional_bool("RESOURCE_CENTER_ENABLE_DELETE", &mut lookup)? {
            widget.enable_delete = flag;
        }
        if let Some(flag) = parse_optional_bool("RESOURCE_CENTER_ENABLE_UPLOAD", &mut lookup)? {
            widget.enable_upload = flag;
        }
        if let Some(flag) = parse_optional_bool("RESOURCE_CENTER_MULTI_SELECT", &mut lookup)? {
            widget.multi_select = flag;
        }
        if let Some(flag) = parse_optional_bool("RESOURCE_CENTER_OFFLINE_FALLBACK", &mut lookup)? {
            widget.offline_fallback = flag;
        }
        if let Some(theme) = optional_trimmed_env("RESOURCE_CENTER_THEME", &mut lookup) {
            widget.theme = parse_theme(&theme)?;
        }
        if let Some(size) = parse_optional::<usize, _>("RESOURCE_CENTER_PAGE_SIZE", &mut lookup)? {
            if size == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "RESOURCE_CENTER_PAGE_SIZE",
                    value: "0".to_owned(),
                    reason: "must be at least 1".to_owned(),
                });
            }
            widget.page_size = size;
        }
        widget.request_timeout_ms =
            parse_optional::<u64, _>("RESOURCE_CENTER_REQUEST_TIMEOUT_MS", &mut lookup)?;
        if let Some(linger) =
            parse_optional::<u64, _>("RESOURCE_CENTER_SUCCESS_LINGER_MS", &mut lookup)?
        {
            widget.success_linger_ms = linger;
        }

        let upload_path =
            optional_trimmed_env("RESOURCE_CENTER_SMOKE_UPLOAD", &mut lookup).map(PathBuf::from);

        Ok(Self {
            widget,
            upload_path,
        })
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required {key}")]
    Missing { key: &'static str },
    #[error("invalid {key}='{value}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Comma-separated list; blank entries are dropped.
fn optional_list<F>(key: &'static str, lookup: &mut F) -> Option<Vec<String>>
where
    F: FnMut(&str) -> Option<String>,
{
    optional_trimmed_env(key, lookup).map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_owned)
            .collect()
    })
}

fn parse_optional<T, F>(key: &'static str, lookup: &mut F) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(None);
    };
    value
        .parse::<T>()
        .map(Some)
        .map_err(|err| ConfigError::InvalidValue {
            key,
            reason: err.to_string(),
            value,
        })
}

fn parse_optional_bool<F>(key: &'static str, lookup: &mut F) -> Result<Option<bool>, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(None);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::InvalidValue {
            key,
            value,
            reason: "expected true or false".to_owned(),
        }),
    }
}

fn parse_theme(value: &str) -> Result<Theme, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "light" => Ok(Theme::Light),
        "dark" => Ok(Theme::Dark),
        _ => Err(ConfigError::InvalidValue {
            key: "RESOURCE_CENTER_THEME",
            value: value.to_owned(),
            reason: "expected light or dark".to_owned(),
        }),
    }
}
