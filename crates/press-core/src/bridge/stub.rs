//! Inert bridge used when no host bridge is available.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::bridge::{BridgeEvent, SignalBridge};
use crate::error::ConsoleError;
use crate::signal::{SignalConfig, SignalDataType, SignalScalar, SignalValues};

/// Answers every call trivially and never pushes, so the console stays usable
/// without PLC hardware.
#[derive(Debug)]
pub struct StubBridge {
    polling: AtomicBool,
    events: broadcast::Sender<BridgeEvent>,
}

impl StubBridge {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1);
        Self {
            polling: AtomicBool::new(false),
            events,
        }
    }

    fn demo_signals() -> Vec<SignalConfig> {
        vec![
            SignalConfig::new("PRESSURE", "Pressure", SignalDataType::Float).with_unit("MPa"),
            SignalConfig::new("TEMPERATURE", "Temperature", SignalDataType::Float).with_unit("°C"),
        ]
    }
}

impl Default for StubBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalBridge for StubBridge {
    fn is_connected(&self) -> bool {
        false
    }

    fn is_polling(&self) -> bool {
        self.polling.load(Ordering::Relaxed)
    }

    async fn read_signal(&self, _code: &str) -> Result<SignalScalar, ConsoleError> {
        Ok(SignalScalar::Number(0.0))
    }

    async fn write_signal(&self, _code: &str, _value: SignalScalar) -> Result<bool, ConsoleError> {
        Ok(true)
    }

    async fn batch_read(&self, _codes: &[&str]) -> Result<SignalValues, ConsoleError> {
        Ok(SignalValues::new())
    }

    async fn signal_config(&self) -> Result<Vec<SignalConfig>, ConsoleError> {
        Ok(Self::demo_signals())
    }

    async fn refresh_signal_config(&self) -> Result<(), ConsoleError> {
        Ok(())
    }

    async fn start_polling(&self, _interval: Duration) -> Result<(), ConsoleError> {
        self.polling.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn stop_polling(&self) -> Result<(), ConsoleError> {
        self.polling.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }
}
