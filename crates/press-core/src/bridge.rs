//! PLC bridge capability consumed by the console.
//!
//! The bridge is the boundary to the PLC transport. The console only needs
//! named-signal reads and writes, the signal configuration, polling control and
//! a push channel; the transport behind it is opaque.

#![allow(missing_docs)]

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::ConsoleError;
use crate::signal::{SignalConfig, SignalScalar, SignalValues};

mod loopback;
mod registry;
mod stub;

pub use loopback::LoopbackBridge;
pub use registry::{BridgeRegistry, BridgeSpec};
pub use stub::StubBridge;

/// Capacity of the push channel of the built-in bridges.
pub const EVENT_CAPACITY: usize = 256;

/// Push notifications emitted by a bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    ConnectionChanged(bool),
    ValuesChanged(SignalValues),
    ConfigChanged(usize),
    PollingChanged(bool),
}

/// Signal bridge interface.
#[async_trait]
pub trait SignalBridge: Send + Sync {
    /// Whether the PLC link is up at the time of the call.
    fn is_connected(&self) -> bool;

    /// Whether the bridge is currently polling.
    fn is_polling(&self) -> bool;

    /// Read one signal by code.
    async fn read_signal(&self, code: &str) -> Result<SignalScalar, ConsoleError>;

    /// Write one signal by code. `Ok(false)` means the host refused the write.
    async fn write_signal(&self, code: &str, value: SignalScalar) -> Result<bool, ConsoleError>;

    /// Read several signals at once.
    async fn batch_read(&self, codes: &[&str]) -> Result<SignalValues, ConsoleError>;

    /// Full signal configuration list.
    async fn signal_config(&self) -> Result<Vec<SignalConfig>, ConsoleError>;

    /// Ask the host to re-sync its signal configuration. Completion is
    /// reported through [`BridgeEvent::ConfigChanged`].
    async fn refresh_signal_config(&self) -> Result<(), ConsoleError>;

    async fn start_polling(&self, interval: Duration) -> Result<(), ConsoleError>;

    async fn stop_polling(&self) -> Result<(), ConsoleError>;

    /// Subscribe to the push channel. Every call returns an independent receiver.
    fn subscribe(&self) -> broadcast::Receiver<BridgeEvent>;
}
