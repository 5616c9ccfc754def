//! Signal configuration and value types exchanged with the bridge.

#![allow(missing_docs)]

use std::fmt;
use std::time::Instant;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::ConsoleError;

/// Batch of signal values keyed by signal code, as pushed or returned by the bridge.
pub type SignalValues = IndexMap<SmolStr, SignalScalar>;

/// Register data type of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalDataType {
    Bit,
    Word,
    Uint16,
    Float,
    Double,
    Int32,
}

impl SignalDataType {
    /// Parse a data type name as used in bridge configuration.
    pub fn parse(text: &str) -> Result<Self, ConsoleError> {
        match text.trim().to_ascii_lowercase().as_str() {
            "bit" | "bool" => Ok(Self::Bit),
            "word" => Ok(Self::Word),
            "uint16" => Ok(Self::Uint16),
            "float" | "real" => Ok(Self::Float),
            "double" | "lreal" => Ok(Self::Double),
            "int32" | "dint" => Ok(Self::Int32),
            _ => Err(ConsoleError::InvalidConfig(
                format!("invalid signal data type '{text}'").into(),
            )),
        }
    }
}

/// Direction of a signal as seen from the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalDirection {
    #[default]
    Read,
    Write,
}

/// One signal definition. Replaced wholesale on every configuration load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalConfig {
    #[serde(rename = "signalCode")]
    pub code: SmolStr,
    #[serde(rename = "signalName", default)]
    pub display_name: SmolStr,
    pub data_type: SignalDataType,
    #[serde(rename = "paramGroup", default)]
    pub polling_group: Option<SmolStr>,
    #[serde(rename = "isActive", default)]
    pub active: bool,
    #[serde(rename = "signalType", default)]
    pub direction: SignalDirection,
    #[serde(default)]
    pub unit: Option<SmolStr>,
}

impl SignalConfig {
    #[must_use]
    pub fn new(
        code: impl Into<SmolStr>,
        display_name: impl Into<SmolStr>,
        data_type: SignalDataType,
    ) -> Self {
        Self {
            code: code.into(),
            display_name: display_name.into(),
            data_type,
            polling_group: None,
            active: true,
            direction: SignalDirection::Read,
            unit: None,
        }
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<SmolStr>) -> Self {
        self.polling_group = Some(group.into());
        self
    }

    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<SmolStr>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Polling group name, `default` when unset or blank.
    #[must_use]
    pub fn group_name(&self) -> &str {
        match self.polling_group.as_deref().map(str::trim) {
            Some(group) if !group.is_empty() => group,
            _ => "default",
        }
    }
}

/// Scalar carried by a signal. Values are passed through as received; no
/// check against [`SignalDataType`] is made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalScalar {
    Bool(bool),
    Number(f64),
    Text(SmolStr),
}

impl SignalScalar {
    /// JavaScript-like truthiness, used for write acknowledgements and bit signals.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Number(value) => *value != 0.0 && !value.is_nan(),
            Self::Text(value) => !value.is_empty(),
        }
    }
}

impl fmt::Display for SignalScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<bool> for SignalScalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for SignalScalar {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for SignalScalar {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for SignalScalar {
    fn from(value: &str) -> Self {
        Self::Text(value.into())
    }
}

/// Latest value of a signal plus the time it was merged into the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSample {
    pub value: SignalScalar,
    pub received_at: Instant,
}
