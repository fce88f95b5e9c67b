//! Agenda configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::resource_pool::CardinalityProfile;
use crate::core::AppResult;

const fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

const fn default_constraint_tolerance() -> Duration {
    Duration::from_secs(1)
}

const fn default_audit_capacity() -> usize {
    1024
}

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgendaConfig {
    /// Delay between two scheduler iterations.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Sentinel file whose presence stops the scheduler.
    #[serde(default)]
    pub stop_file: Option<PathBuf>,
    /// JSON-lines reservation store.
    #[serde(default)]
    pub reservations_store: Option<PathBuf>,
    /// Maximum number of past reservations kept on store (0 keeps all).
    #[serde(default)]
    pub purge_store: usize,
    /// Past reservations younger than this are never purged.
    #[serde(default, with = "humantime_serde")]
    pub retention: Option<Duration>,
    /// Slack applied when checking stage durations against constraints.
    #[serde(default = "default_constraint_tolerance", with = "humantime_serde")]
    pub constraint_tolerance: Duration,
    /// Sizing of the root resource pool.
    #[serde(default)]
    pub root_profile: CardinalityProfile,
    /// Bound of the in-memory audit buffer.
    #[serde(default = "default_audit_capacity")]
    pub audit_capacity: usize,
}

impl Default for AgendaConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            stop_file: None,
            reservations_store: None,
            purge_store: 0,
            retention: None,
            constraint_tolerance: default_constraint_tolerance(),
            root_profile: CardinalityProfile::default(),
            audit_capacity: default_audit_capacity(),
        }
    }
}

impl AgendaConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Describes the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval.is_zero() {
            return Err("poll_interval must be greater than 0".into());
        }
        if self.audit_capacity == 0 {
            return Err("audit_capacity must be greater than 0".into());
        }
        if self
            .stop_file
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            return Err("stop_file must not be empty".into());
        }
        if self
            .reservations_store
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            return Err("reservations_store must not be empty".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a `.env` file if present, then read `AGENDA_*` variables over the defaults.
    ///
    /// Recognized: `AGENDA_POLL_INTERVAL`, `AGENDA_STOP_FILE`,
    /// `AGENDA_RESERVATIONS_STORE`, `AGENDA_PURGE_STORE`, `AGENDA_RETENTION`,
    /// `AGENDA_CONSTRAINT_TOLERANCE`, `AGENDA_ROOT_PROFILE`, `AGENDA_AUDIT_CAPACITY`.
    ///
    /// # Errors
    ///
    /// Unparsable variable or invalid resulting configuration.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AgendaConfig::from_env`] with an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Unparsable variable or invalid resulting configuration.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let mut cfg = Self::default();
        if let Some(v) = lookup("AGENDA_POLL_INTERVAL") {
            cfg.poll_interval =
                humantime::parse_duration(&v).context("AGENDA_POLL_INTERVAL")?;
        }
        if let Some(v) = lookup("AGENDA_STOP_FILE") {
            cfg.stop_file = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("AGENDA_RESERVATIONS_STORE") {
            cfg.reservations_store = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("AGENDA_PURGE_STORE") {
            cfg.purge_store = v.trim().parse().context("AGENDA_PURGE_STORE")?;
        }
        if let Some(v) = lookup("AGENDA_RETENTION") {
            cfg.retention = Some(humantime::parse_duration(&v).context("AGENDA_RETENTION")?);
        }
        if let Some(v) = lookup("AGENDA_CONSTRAINT_TOLERANCE") {
            cfg.constraint_tolerance =
                humantime::parse_duration(&v).context("AGENDA_CONSTRAINT_TOLERANCE")?;
        }
        if let Some(v) = lookup("AGENDA_ROOT_PROFILE") {
            cfg.root_profile = serde_json::from_value(serde_json::Value::String(v))
                .context("AGENDA_ROOT_PROFILE")?;
        }
        if let Some(v) = lookup("AGENDA_AUDIT_CAPACITY") {
            cfg.audit_capacity = v.trim().parse().context("AGENDA_AUDIT_CAPACITY")?;
        }
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}
