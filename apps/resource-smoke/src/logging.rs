//! Tracing bootstrap for the smoke binary.

use std::env;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,resource_smoke=debug,resource_imagekit=debug,resource_core=info";

/// Where the active filter directive came from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FilterSource {
    RustLog(String),
    ResourceCenterLog(String),
    Default,
}

impl FilterSource {
    /// `RUST_LOG` wins over `RESOURCE_CENTER_LOG`; blank or unparsable values fall through.
    fn resolve<F>(mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(directive) = usable_directive(lookup(EnvFilter::DEFAULT_ENV)) {
            return Self::RustLog(directive);
        }
        if let Some(directive) = usable_directive(lookup("RESOURCE_CENTER_LOG")) {
            return Self::ResourceCenterLog(directive);
        }
        Self::Default
    }

    fn directive(&self) -> &str {
        match self {
            Self::RustLog(directive) | Self::ResourceCenterLog(directive) => directive,
            Self::Default => DEFAULT_FILTER,
        }
    }
}

fn usable_directive(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty() && EnvFilter::try_new(value).is_ok())
}

/// Install the global subscriber. `RESOURCE_CENTER_LOG_COMPACT=1` drops targets
/// and timestamps for terminal runs.
pub fn init() {
    let source = FilterSource::resolve(|key| env::var(key).ok());
    let compact = env::var("RESOURCE_CENTER_LOG_COMPACT")
        .is_ok_and(|value| matches!(value.trim(), "1" | "true" | "yes"));
    let filter = EnvFilter::new(source.directive());

    let installed = if compact {
        tracing_subscriber::fmt()
            .compact()
            .without_time()
            .with_target(false)
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_target(true)
            .with_env_filter(filter)
            .try_init()
    };
    if installed.is_ok() {
        tracing::debug!(source = ?source, "logging initialised");
    }
}
