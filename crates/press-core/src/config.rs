//! Console configuration loading.

#![allow(missing_docs)]

use std::path::Path;
use std::time::Duration;

use rustc_hash::FxHashSet;
use serde::Deserialize;
use smol_str::SmolStr;

use crate::bridge::BridgeRegistry;
use crate::connection::{
    ConnectionOptions, HandshakePolicy, DEFAULT_HANDSHAKE_ATTEMPTS, MES_STATUS_SIGNAL,
};
use crate::error::ConsoleError;
use crate::lock::MoldLockOptions;
use crate::mold::{MAX_MOLD_LOCK_COUNT, MIN_SEARCH_CHARS};
use crate::signal::{SignalConfig, SignalDataType, SignalDirection, SignalScalar};

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_BRIDGE_DRIVER: &str = "stub";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
pub const MIN_POLL_INTERVAL_MS: u64 = 50;
pub const MAX_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_THROTTLE_MS: u64 = 100;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleConfig {
    pub device_id: Option<SmolStr>,
    pub log_level: SmolStr,
    pub bridge: BridgeConfig,
    pub handshake: HandshakePolicy,
    pub mold: MoldLockOptions,
    pub signals: Vec<SignalConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub driver: SmolStr,
    pub poll_interval: Duration,
    pub throttle_window: Duration,
    pub auto_poll: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            driver: SmolStr::new(DEFAULT_BRIDGE_DRIVER),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            throttle_window: Duration::from_millis(DEFAULT_THROTTLE_MS),
            auto_poll: false,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            log_level: SmolStr::new(DEFAULT_LOG_LEVEL),
            bridge: BridgeConfig::default(),
            handshake: HandshakePolicy::default(),
            mold: MoldLockOptions::default(),
            signals: Vec::new(),
        }
    }
}

impl ConsoleConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConsoleError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|err| ConsoleError::InvalidConfig(format!("console.toml: {err}").into()))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConsoleError> {
        let raw: ConsoleToml = toml::from_str(text)
            .map_err(|err| ConsoleError::InvalidConfig(format!("console.toml: {err}").into()))?;
        raw.into_config()
    }

    /// Options for the connection coordinator.
    #[must_use]
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            handshake: self.handshake.clone(),
            throttle_window: self.bridge.throttle_window,
            poll_interval: self.bridge.poll_interval,
            auto_poll: self.bridge.auto_poll,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConsoleToml {
    console: Option<ConsoleSection>,
    bridge: Option<BridgeSection>,
    handshake: Option<HandshakeSection>,
    mold: Option<MoldSection>,
    signals: Option<Vec<SignalSection>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConsoleSection {
    device_id: Option<String>,
    log_level: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BridgeSection {
    driver: Option<String>,
    poll_interval_ms: Option<u64>,
    throttle_ms: Option<u64>,
    auto_poll: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HandshakeSection {
    signal_name: Option<String>,
    connected_value: Option<SignalScalar>,
    max_attempts: Option<u32>,
    retry_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MoldSection {
    max_lock_count: Option<usize>,
    min_search_chars: Option<usize>,
    serialize_locks: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SignalSection {
    code: String,
    name: String,
    data_type: String,
    group: Option<String>,
    unit: Option<String>,
    direction: Option<String>,
    active: Option<bool>,
}

fn parse_log_level(text: &str) -> Result<SmolStr, ConsoleError> {
    let level = text.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(SmolStr::new(level)),
        _ => Err(ConsoleError::InvalidConfig(
            format!("invalid console.log_level '{text}'").into(),
        )),
    }
}

fn parse_direction(text: &str) -> Result<SignalDirection, ConsoleError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "read" => Ok(SignalDirection::Read),
        "write" => Ok(SignalDirection::Write),
        _ => Err(ConsoleError::InvalidConfig(
            format!("invalid signals.direction '{text}'").into(),
        )),
    }
}

impl ConsoleToml {
    fn into_config(self) -> Result<ConsoleConfig, ConsoleError> {
        let defaults = ConsoleConfig::default();

        let (device_id, log_level) = match self.console {
            Some(section) => (
                section
                    .device_id
                    .map(|id| SmolStr::new(id.trim()))
                    .filter(|id| !id.is_empty()),
                match section.log_level {
                    Some(level) => parse_log_level(&level)?,
                    None => defaults.log_level.clone(),
                },
            ),
            None => (None, defaults.log_level.clone()),
        };

        let bridge = match self.bridge {
            Some(section) => section.into_config()?,
            None => defaults.bridge.clone(),
        };

        let handshake = match self.handshake {
            Some(section) => section.into_config()?,
            None => defaults.handshake.clone(),
        };

        let mold = match self.mold {
            Some(section) => section.into_config()?,
            None => defaults.mold,
        };

        let signals = self
            .signals
            .unwrap_or_default()
            .into_iter()
            .map(SignalSection::into_config)
            .collect::<Result<Vec<_>, _>>()?;
        let mut seen = FxHashSet::default();
        for signal in &signals {
            if !seen.insert(signal.code.clone()) {
                return Err(ConsoleError::InvalidConfig(
                    format!("duplicate signals.code '{}'", signal.code).into(),
                ));
            }
        }

        Ok(ConsoleConfig {
            device_id,
            log_level,
            bridge,
            handshake,
            mold,
            signals,
        })
    }
}

impl BridgeSection {
    fn into_config(self) -> Result<BridgeConfig, ConsoleError> {
        let driver = SmolStr::new(
            self.driver
                .as_deref()
                .unwrap_or(DEFAULT_BRIDGE_DRIVER)
                .trim()
                .to_ascii_lowercase(),
        );
        BridgeRegistry::default_registry().validate(&driver)?;
        let poll_ms = self
            .poll_interval_ms
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
            .clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS);
        let throttle_ms = self.throttle_ms.unwrap_or(DEFAULT_THROTTLE_MS);
        if throttle_ms == 0 {
            return Err(ConsoleError::InvalidConfig(
                "bridge.throttle_ms must be greater than zero".into(),
            ));
        }
        Ok(BridgeConfig {
            driver,
            poll_interval: Duration::from_millis(poll_ms),
            throttle_window: Duration::from_millis(throttle_ms),
            auto_poll: self.auto_poll.unwrap_or(false),
        })
    }
}

impl HandshakeSection {
    fn into_config(self) -> Result<HandshakePolicy, ConsoleError> {
        let max_attempts = self.max_attempts.unwrap_or(DEFAULT_HANDSHAKE_ATTEMPTS);
        if max_attempts == 0 {
            return Err(ConsoleError::InvalidConfig(
                "handshake.max_attempts must be at least 1".into(),
            ));
        }
        let signal_name = self
            .signal_name
            .map_or_else(|| SmolStr::new(MES_STATUS_SIGNAL), SmolStr::new);
        if signal_name.trim().is_empty() {
            return Err(ConsoleError::InvalidConfig(
                "handshake.signal_name must not be empty".into(),
            ));
        }
        Ok(HandshakePolicy {
            signal_name,
            connected_value: self.connected_value.unwrap_or(SignalScalar::Bool(true)),
            max_attempts,
            retry_delay: Duration::from_millis(
                self.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS),
            ),
        })
    }
}

impl MoldSection {
    fn into_config(self) -> Result<MoldLockOptions, ConsoleError> {
        let max_lock_count = self.max_lock_count.unwrap_or(MAX_MOLD_LOCK_COUNT);
        if max_lock_count == 0 {
            return Err(ConsoleError::InvalidConfig(
                "mold.max_lock_count must be at least 1".into(),
            ));
        }
        Ok(MoldLockOptions {
            max_lock_count,
            min_search_chars: self.min_search_chars.unwrap_or(MIN_SEARCH_CHARS),
            serialize_locks: self.serialize_locks.unwrap_or(false),
        })
    }
}

impl SignalSection {
    fn into_config(self) -> Result<SignalConfig, ConsoleError> {
        let code = self.code.trim();
        if code.is_empty() {
            return Err(ConsoleError::InvalidConfig(
                "signals.code must not be empty".into(),
            ));
        }
        let mut signal = SignalConfig::new(code, self.name, SignalDataType::parse(&self.data_type)?);
        signal.polling_group = self.group.map(SmolStr::new);
        signal.unit = self.unit.map(SmolStr::new);
        if let Some(direction) = self.direction {
            signal.direction = parse_direction(&direction)?;
        }
        signal.active = self.active.unwrap_or(true);
        Ok(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_matches_default() {
        assert_eq!(
            ConsoleConfig::from_toml_str("").unwrap(),
            ConsoleConfig::default()
        );
    }

    #[test]
    fn poll_interval_is_clamped() {
        let config = ConsoleConfig::from_toml_str("[bridge]\npoll_interval_ms = 5\n").unwrap();
        assert_eq!(config.bridge.poll_interval, Duration::from_millis(50));
        let config = ConsoleConfig::from_toml_str("[bridge]\npoll_interval_ms = 5000\n").unwrap();
        assert_eq!(config.bridge.poll_interval, Duration::from_millis(1000));
    }

    #[test]
    fn blank_device_id_is_unset() {
        let config = ConsoleConfig::from_toml_str("[console]\ndevice_id = \"  \"\n").unwrap();
        assert_eq!(config.device_id, None);
    }
}
