// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Runtime-only configuration (C12): ComID preference, IF-RECV poll
//! backoff, and logging. Never persisted by the driver itself — loaded once
//! at process start and treated as read-only thereafter.

use std::path::Path;
use std::time::Duration;

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};

use crate::discovery::SscKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfiguredSsc {
    Enterprise,
    OpalV1,
    OpalV2,
    Opalite,
    PyriteV1,
    PyriteV2,
    Ruby,
    KeyPerIo,
}

impl From<ConfiguredSsc> for SscKind {
    fn from(value: ConfiguredSsc) -> Self {
        match value {
            ConfiguredSsc::Enterprise => SscKind::Enterprise,
            ConfiguredSsc::OpalV1 => SscKind::OpalV1,
            ConfiguredSsc::OpalV2 => SscKind::OpalV2,
            ConfiguredSsc::Opalite => SscKind::Opalite,
            ConfiguredSsc::PyriteV1 => SscKind::PyriteV1,
            ConfiguredSsc::PyriteV2 => SscKind::PyriteV2,
            ConfiguredSsc::Ruby => SscKind::Ruby,
            ConfiguredSsc::KeyPerIo => SscKind::KeyPerIo,
        }
    }
}

mod serde_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// IF-RECV polling backoff: retry every `interval` until `max_total` has
/// elapsed, then fail with `Error::Device`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(with = "serde_millis")]
    pub interval: Duration,
    #[serde(with = "serde_millis")]
    pub max_total: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig { interval: Duration::from_millis(100), max_total: Duration::from_secs(30) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSink {
    Stdout,
    Stderr,
}

/// Structured-logging configuration (C13).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub sink: LogSink,
    pub show_target: bool,
    pub show_module: bool,
    pub show_line: bool,
    pub file_path: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
            sink: LogSink::Stderr,
            show_target: true,
            show_module: false,
            show_line: false,
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub preferred_ssc: Option<ConfiguredSsc>,
    pub poll: PollConfig,
    pub logging: LogConfig,
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config =
            serde_yaml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate_and_normalize()
    }

    pub fn validate_and_normalize(self) -> anyhow::Result<Self> {
        ensure!(!self.poll.interval.is_zero(), "poll.interval must be non-zero");
        ensure!(!self.poll.max_total.is_zero(), "poll.max_total must be non-zero");
        ensure!(
            self.poll.max_total >= self.poll.interval,
            "poll.max_total ({:?}) must be at least poll.interval ({:?})",
            self.poll.max_total,
            self.poll.interval
        );
        Ok(self)
    }

    pub fn preferred_ssc(&self) -> Option<SscKind> {
        self.preferred_ssc.map(SscKind::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_poll_config_is_valid() {
        let config = Config::default();
        assert!(config.validate_and_normalize().is_ok());
    }

    #[test]
    fn zero_poll_budget_is_rejected() {
        let config = Config { poll: PollConfig { interval: Duration::from_millis(0), ..Default::default() }, ..Default::default() };
        assert!(config.validate_and_normalize().is_err());
    }

    #[test]
    fn max_total_below_interval_is_rejected() {
        let config = Config {
            poll: PollConfig { interval: Duration::from_secs(1), max_total: Duration::from_millis(500) },
            ..Default::default()
        };
        assert!(config.validate_and_normalize().is_err());
    }

    #[test]
    fn parses_yaml_with_preferred_ssc() {
        let yaml = "preferred_ssc: opal-v2\npoll:\n  interval: 200\n  max_total: 5000\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.preferred_ssc, Some(ConfiguredSsc::OpalV2));
        assert_eq!(config.poll.interval, Duration::from_millis(200));
    }
}
