//! Signal configuration and live value cache.

#![allow(missing_docs)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::RwLock;
use smol_str::SmolStr;
use tracing::{debug, info, warn};

use crate::bridge::SignalBridge;
use crate::error::ConsoleError;
use crate::signal::{SignalConfig, SignalSample, SignalScalar, SignalValues};

/// Owns the signal configuration and the latest value per signal code.
///
/// Locks are only held for synchronous assignments; bridge calls are awaited
/// with no lock held.
#[derive(Default)]
pub struct SignalRegistry {
    bridge: RwLock<Option<Arc<dyn SignalBridge>>>,
    signals: RwLock<Vec<SignalConfig>>,
    values: RwLock<IndexMap<SmolStr, SignalSample>>,
    loading: AtomicBool,
    polling: AtomicBool,
}

impl std::fmt::Debug for SignalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalRegistry")
            .field("signals", &self.signals.read().len())
            .field("values", &self.values.read().len())
            .field("loading", &self.is_loading())
            .field("polling", &self.is_polling())
            .finish_non_exhaustive()
    }
}

impl SignalRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the bridge used by subsequent calls.
    pub fn attach(&self, bridge: Arc<dyn SignalBridge>) {
        self.polling.store(bridge.is_polling(), Ordering::Relaxed);
        *self.bridge.write() = Some(bridge);
    }

    pub fn detach(&self) {
        *self.bridge.write() = None;
    }

    #[must_use]
    pub fn bridge(&self) -> Option<Arc<dyn SignalBridge>> {
        self.bridge.read().clone()
    }

    fn require_bridge(&self) -> Result<Arc<dyn SignalBridge>, ConsoleError> {
        self.bridge().ok_or(ConsoleError::BridgeUnavailable)
    }

    /// Replace the configuration with the bridge's full list. On any failure
    /// the previous configuration is kept as is.
    pub async fn load_signals(&self) -> Result<usize, ConsoleError> {
        let bridge = match self.require_bridge() {
            Ok(bridge) => bridge,
            Err(err) => {
                warn!("signal bridge unavailable, keeping previous configuration");
                return Err(err);
            }
        };
        self.loading.store(true, Ordering::Relaxed);
        let result = bridge.signal_config().await;
        self.loading.store(false, Ordering::Relaxed);
        match result {
            Ok(signals) => {
                let count = signals.len();
                *self.signals.write() = signals;
                info!(count, "signal configuration loaded");
                Ok(count)
            }
            Err(err) => {
                warn!(error = %err, "failed to load signal configuration");
                Err(err)
            }
        }
    }

    /// Ask the bridge to re-sync its configuration. The reload itself happens
    /// when the bridge announces the change.
    pub async fn refresh_signals(&self) -> Result<(), ConsoleError> {
        let bridge = self.require_bridge()?;
        bridge.refresh_signal_config().await.inspect_err(|err| {
            warn!(error = %err, "failed to refresh signal configuration");
        })
    }

    /// Code of the signal whose display name is `name`.
    #[must_use]
    pub fn find_code_by_display_name(&self, name: &str) -> Option<SmolStr> {
        self.signals
            .read()
            .iter()
            .find(|signal| signal.display_name == name)
            .map(|signal| signal.code.clone())
    }

    /// Merge a batch of values. Later batches overwrite earlier ones per code.
    pub fn update_values(&self, batch: &SignalValues) {
        if batch.is_empty() {
            return;
        }
        let received_at = Instant::now();
        let mut values = self.values.write();
        for (code, value) in batch {
            values.insert(
                code.clone(),
                SignalSample {
                    value: value.clone(),
                    received_at,
                },
            );
        }
        debug!(count = batch.len(), "signal values merged");
    }

    #[must_use]
    pub fn value(&self, code: &str) -> Option<SignalScalar> {
        self.values.read().get(code).map(|sample| sample.value.clone())
    }

    #[must_use]
    pub fn sample(&self, code: &str) -> Option<SignalSample> {
        self.values.read().get(code).cloned()
    }

    /// Snapshot of every cached value, in first-received order.
    #[must_use]
    pub fn values(&self) -> SignalValues {
        self.values
            .read()
            .iter()
            .map(|(code, sample)| (code.clone(), sample.value.clone()))
            .collect()
    }

    #[must_use]
    pub fn signals(&self) -> Vec<SignalConfig> {
        self.signals.read().clone()
    }

    #[must_use]
    pub fn signal_count(&self) -> usize {
        self.signals.read().len()
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.signals.read().iter().filter(|signal| signal.active).count()
    }

    /// Signals grouped by polling group, groups in first-seen order.
    #[must_use]
    pub fn signals_by_group(&self) -> IndexMap<SmolStr, Vec<SignalConfig>> {
        let mut groups: IndexMap<SmolStr, Vec<SignalConfig>> = IndexMap::new();
        for signal in self.signals.read().iter() {
            groups
                .entry(SmolStr::new(signal.group_name()))
                .or_default()
                .push(signal.clone());
        }
        groups
    }

    /// Read one signal through the bridge and cache it. Failures are logged
    /// and reported as `None`.
    pub async fn read_signal(&self, code: &str) -> Option<SignalScalar> {
        let bridge = self.bridge()?;
        match bridge.read_signal(code).await {
            Ok(value) => {
                let mut batch = SignalValues::new();
                batch.insert(SmolStr::new(code), value.clone());
                self.update_values(&batch);
                Some(value)
            }
            Err(err) => {
                warn!(code, error = %err, "signal read failed");
                None
            }
        }
    }

    /// Write one signal through the bridge. Failures are logged and reported
    /// as `false`.
    pub async fn write_signal(&self, code: &str, value: SignalScalar) -> bool {
        let Some(bridge) = self.bridge() else {
            warn!(code, "signal write without bridge");
            return false;
        };
        match bridge.write_signal(code, value).await {
            Ok(ack) => ack,
            Err(err) => {
                warn!(code, error = %err, "signal write failed");
                false
            }
        }
    }

    /// Read several signals and merge the result into the cache.
    pub async fn batch_read(&self, codes: &[&str]) -> SignalValues {
        let Some(bridge) = self.bridge() else {
            return SignalValues::new();
        };
        match bridge.batch_read(codes).await {
            Ok(values) => {
                self.update_values(&values);
                values
            }
            Err(err) => {
                warn!(count = codes.len(), error = %err, "batch read failed");
                SignalValues::new()
            }
        }
    }

    pub async fn start_polling(&self, interval: Duration) -> bool {
        let Some(bridge) = self.bridge() else {
            return false;
        };
        match bridge.start_polling(interval).await {
            Ok(()) => {
                self.set_polling(true);
                true
            }
            Err(err) => {
                warn!(error = %err, "failed to start polling");
                false
            }
        }
    }

    pub async fn stop_polling(&self) -> bool {
        let Some(bridge) = self.bridge() else {
            return false;
        };
        match bridge.stop_polling().await {
            Ok(()) => {
                self.set_polling(false);
                true
            }
            Err(err) => {
                warn!(error = %err, "failed to stop polling");
                false
            }
        }
    }

    /// Mirror of the bridge polling flag, fed by pushes.
    pub fn set_polling(&self, polling: bool) {
        self.polling.store(polling, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Relaxed)
    }

    /// Drop every cached value, keeping the configuration.
    pub fn clear_values(&self) {
        self.values.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{LoopbackBridge, StubBridge};
    use crate::signal::SignalDataType;

    fn batch(entries: &[(&str, SignalScalar)]) -> SignalValues {
        entries
            .iter()
            .map(|(code, value)| (SmolStr::new(code), value.clone()))
            .collect()
    }

    #[test]
    fn later_batches_win() {
        let registry = SignalRegistry::new();
        registry.update_values(&batch(&[("A", 1.into()), ("B", 2.into())]));
        registry.update_values(&batch(&[("A", 3.into())]));
        assert_eq!(registry.value("A"), Some(SignalScalar::Number(3.0)));
        assert_eq!(registry.value("B"), Some(SignalScalar::Number(2.0)));
        assert_eq!(registry.value("C"), None);
    }

    #[tokio::test]
    async fn load_without_bridge_keeps_configuration() {
        let registry = SignalRegistry::new();
        assert_eq!(
            registry.load_signals().await,
            Err(ConsoleError::BridgeUnavailable)
        );
        assert_eq!(registry.signal_count(), 0);
    }

    #[tokio::test]
    async fn groups_keep_first_seen_order() {
        let registry = SignalRegistry::new();
        registry.attach(Arc::new(LoopbackBridge::new(vec![
            SignalConfig::new("P1", "Pressure", SignalDataType::Float).with_group("hydraulic"),
            SignalConfig::new("S1", "Status", SignalDataType::Bit),
            SignalConfig::new("P2", "Pressure 2", SignalDataType::Float).with_group("hydraulic"),
        ])));
        assert_eq!(registry.load_signals().await, Ok(3));
        let groups = registry.signals_by_group();
        let names: Vec<&str> = groups.keys().map(SmolStr::as_str).collect();
        assert_eq!(names, ["hydraulic", "default"]);
        assert_eq!(groups["hydraulic"].len(), 2);
        assert_eq!(registry.find_code_by_display_name("Status").as_deref(), Some("S1"));
        assert_eq!(registry.find_code_by_display_name("Missing"), None);
    }

    #[tokio::test]
    async fn stub_polling_round_trip() {
        let registry = SignalRegistry::new();
        registry.attach(Arc::new(StubBridge::new()));
        assert!(registry.start_polling(Duration::from_millis(100)).await);
        assert!(registry.is_polling());
        assert!(registry.stop_polling().await);
        assert!(!registry.is_polling());
    }
}
