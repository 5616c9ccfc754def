//! Loopback bridge for development.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tokio::sync::broadcast;
use tracing::debug;

use crate::bridge::{BridgeEvent, SignalBridge, EVENT_CAPACITY};
use crate::error::ConsoleError;
use crate::signal::{SignalConfig, SignalScalar, SignalValues};

/// Serves a fixed signal list and echoes written values back through the
/// push channel.
#[derive(Debug)]
pub struct LoopbackBridge {
    signals: RwLock<Vec<SignalConfig>>,
    values: Mutex<FxHashMap<SmolStr, SignalScalar>>,
    connected: AtomicBool,
    polling: AtomicBool,
    events: broadcast::Sender<BridgeEvent>,
}

impl LoopbackBridge {
    #[must_use]
    pub fn new(signals: Vec<SignalConfig>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            signals: RwLock::new(signals),
            values: Mutex::new(FxHashMap::default()),
            connected: AtomicBool::new(true),
            polling: AtomicBool::new(false),
            events,
        }
    }

    /// Replace the served configuration and announce it.
    pub fn set_signals(&self, signals: Vec<SignalConfig>) {
        let count = signals.len();
        *self.signals.write() = signals;
        self.emit(BridgeEvent::ConfigChanged(count));
    }

    /// Inject values as if the PLC had reported them.
    pub fn push_values(&self, values: SignalValues) {
        {
            let mut stored = self.values.lock();
            for (code, value) in &values {
                stored.insert(code.clone(), value.clone());
            }
        }
        self.emit(BridgeEvent::ValuesChanged(values));
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
        self.emit(BridgeEvent::ConnectionChanged(connected));
    }

    fn emit(&self, event: BridgeEvent) {
        // No subscribers is not an error for a push channel.
        let _ = self.events.send(event);
    }

    fn is_known(&self, code: &str) -> bool {
        self.signals.read().iter().any(|signal| signal.code == code)
    }
}

impl Default for LoopbackBridge {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl SignalBridge for LoopbackBridge {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn is_polling(&self) -> bool {
        self.polling.load(Ordering::Relaxed)
    }

    async fn read_signal(&self, code: &str) -> Result<SignalScalar, ConsoleError> {
        if !self.is_known(code) {
            return Err(ConsoleError::Bridge(format!("unknown signal '{code}'").into()));
        }
        Ok(self
            .values
            .lock()
            .get(code)
            .cloned()
            .unwrap_or(SignalScalar::Number(0.0)))
    }

    async fn write_signal(&self, code: &str, value: SignalScalar) -> Result<bool, ConsoleError> {
        if !self.is_known(code) {
            debug!(code, "loopback write to unknown signal refused");
            return Ok(false);
        }
        let mut batch = SignalValues::new();
        batch.insert(SmolStr::new(code), value);
        self.push_values(batch);
        Ok(true)
    }

    async fn batch_read(&self, codes: &[&str]) -> Result<SignalValues, ConsoleError> {
        let stored = self.values.lock();
        Ok(codes
            .iter()
            .filter_map(|code| {
                stored
                    .get(*code)
                    .map(|value| (SmolStr::new(code), value.clone()))
            })
            .collect())
    }

    async fn signal_config(&self) -> Result<Vec<SignalConfig>, ConsoleError> {
        Ok(self.signals.read().clone())
    }

    async fn refresh_signal_config(&self) -> Result<(), ConsoleError> {
        let count = self.signals.read().len();
        self.emit(BridgeEvent::ConfigChanged(count));
        Ok(())
    }

    async fn start_polling(&self, interval: Duration) -> Result<(), ConsoleError> {
        debug!(interval_ms = interval.as_millis(), "loopback polling started");
        self.polling.store(true, Ordering::Relaxed);
        self.emit(BridgeEvent::PollingChanged(true));
        Ok(())
    }

    async fn stop_polling(&self) -> Result<(), ConsoleError> {
        self.polling.store(false, Ordering::Relaxed);
        self.emit(BridgeEvent::PollingChanged(false));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }
}
