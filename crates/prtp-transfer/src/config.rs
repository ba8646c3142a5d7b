//! Resolution of channel settings from CLI flags and the optional TOML
//! profile. Explicit flags always win over profile values.

use prtp::transport::Impairments;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::cli::ChannelArgs;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read profile '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse profile '{path}': {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// On-disk mirror of the channel flags.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Profile {
    pub loss_rate: Option<f64>,
    pub corruption_rate: Option<f64>,
    pub min_delay: Option<f64>,
    pub max_delay: Option<f64>,
    pub initial_window: Option<f64>,
}

impl Profile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Fully resolved channel settings.
#[derive(Debug, Clone, Copy)]
pub struct ChannelSettings {
    pub impairments: Impairments,
    pub initial_window: f64,
}

pub fn resolve(args: &ChannelArgs) -> Result<ChannelSettings, ConfigError> {
    let profile = match &args.config {
        Some(path) => Profile::load(path)?,
        None => Profile::default(),
    };

    let loss_rate = args.loss_rate.or(profile.loss_rate).unwrap_or(0.0);
    let corruption_rate = args
        .corruption_rate
        .or(profile.corruption_rate)
        .unwrap_or(0.0);
    let min_delay = args.min_delay.or(profile.min_delay).unwrap_or(0.0);
    let max_delay = args.max_delay.or(profile.max_delay).unwrap_or(0.0);
    let initial_window = args
        .initial_window
        .or(profile.initial_window)
        .unwrap_or(prtp::consts::INITIAL_CWND);

    for (name, rate) in [("loss-rate", loss_rate), ("corruption-rate", corruption_rate)] {
        if !(0.0..=1.0).contains(&rate) {
            return Err(ConfigError::Validation(format!(
                "{name} must lie in [0, 1], got {rate}"
            )));
        }
    }
    for (name, delay) in [("min-delay", min_delay), ("max-delay", max_delay)] {
        if !delay.is_finite() || delay < 0.0 {
            return Err(ConfigError::Validation(format!(
                "{name} must be a non-negative number of seconds, got {delay}"
            )));
        }
    }
    if min_delay > max_delay {
        return Err(ConfigError::Validation(format!(
            "min-delay ({min_delay}) exceeds max-delay ({max_delay})"
        )));
    }
    if initial_window < 1.0 {
        return Err(ConfigError::Validation(format!(
            "initial-window must be at least 1, got {initial_window}"
        )));
    }

    Ok(ChannelSettings {
        impairments: Impairments {
            loss_rate,
            corruption_rate,
            min_delay: Duration::from_secs_f64(min_delay),
            max_delay: Duration::from_secs_f64(max_delay),
        },
        initial_window,
    })
}
