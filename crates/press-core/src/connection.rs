//! Connection lifecycle and the MES handshake.

#![allow(missing_docs)]

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use smol_str::SmolStr;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bridge::{BridgeEvent, BridgeRegistry, SignalBridge, StubBridge};
use crate::config::ConsoleConfig;
use crate::error::ConsoleError;
use crate::registry::SignalRegistry;
use crate::signal::{SignalScalar, SignalValues};
use crate::throttle::{ThrottleOptions, Throttled, DEFAULT_THROTTLE_WINDOW};

/// Display name of the signal asserted by the handshake.
pub const MES_STATUS_SIGNAL: &str = "MES通信状态";
pub const DEFAULT_HANDSHAKE_ATTEMPTS: u32 = 3;
pub const DEFAULT_HANDSHAKE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Device operation state of one console session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Processing,
    Completed,
    Error,
}

impl ConnectionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Operator-facing label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Standby",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Processing => "Processing",
            Self::Completed => "Completed",
            Self::Error => "Fault",
        }
    }

    /// Whether an action handler may move from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        matches!(
            (self, next),
            (Self::Connected | Self::Completed, Self::Processing)
                | (Self::Processing, Self::Completed)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handshake parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakePolicy {
    pub signal_name: SmolStr,
    pub connected_value: SignalScalar,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for HandshakePolicy {
    fn default() -> Self {
        Self {
            signal_name: SmolStr::new(MES_STATUS_SIGNAL),
            connected_value: SignalScalar::Bool(true),
            max_attempts: DEFAULT_HANDSHAKE_ATTEMPTS,
            retry_delay: DEFAULT_HANDSHAKE_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionOptions {
    pub handshake: HandshakePolicy,
    pub throttle_window: Duration,
    pub poll_interval: Duration,
    /// Start polling once the handshake succeeds.
    pub auto_poll: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            handshake: HandshakePolicy::default(),
            throttle_window: DEFAULT_THROTTLE_WINDOW,
            poll_interval: DEFAULT_POLL_INTERVAL,
            auto_poll: false,
        }
    }
}

/// Outcome of a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeReport {
    pub signal_code: SmolStr,
    /// Failed attempts before the acknowledged one.
    pub retry_count: u32,
}

/// Drives the bridge lifecycle, the push listener and the handshake for one
/// device session.
pub struct ConnectionCoordinator {
    registry: Arc<SignalRegistry>,
    host_bridge: Option<Arc<dyn SignalBridge>>,
    options: ConnectionOptions,
    state: watch::Sender<ConnectionState>,
    connected: Arc<AtomicBool>,
    listener: Mutex<Option<JoinHandle<()>>>,
    throttle: Mutex<Option<Arc<Throttled<SignalValues>>>>,
}

impl fmt::Debug for ConnectionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCoordinator")
            .field("state", &self.state())
            .field("connected", &self.is_connected())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ConnectionCoordinator {
    /// `host_bridge` is the bridge offered by the host environment; `None`
    /// makes [`initialize`](Self::initialize) fall back to [`StubBridge`].
    #[must_use]
    pub fn new(
        registry: Arc<SignalRegistry>,
        host_bridge: Option<Arc<dyn SignalBridge>>,
        options: ConnectionOptions,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            registry,
            host_bridge,
            options,
            state,
            connected: Arc::new(AtomicBool::new(false)),
            listener: Mutex::new(None),
            throttle: Mutex::new(None),
        }
    }

    /// Coordinator whose bridge comes from `bridge.driver`. The `none` driver
    /// leaves the stub fallback to [`initialize`](Self::initialize).
    pub fn from_config(
        config: &ConsoleConfig,
        registry: Arc<SignalRegistry>,
    ) -> Result<Self, ConsoleError> {
        let spec =
            BridgeRegistry::default_registry().build(&config.bridge.driver, &config.signals)?;
        let bridge = spec.map(|spec| {
            info!(driver = %spec.name, "signal bridge selected");
            spec.bridge
        });
        Ok(Self::new(registry, bridge, config.connection_options()))
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.registry.is_polling()
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SignalRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "connection state changed");
        }
    }

    /// Attach the bridge, subscribe to its pushes and load the signal
    /// configuration. Calling it again replaces the previous subscription.
    pub async fn initialize(&self) {
        let bridge = match &self.host_bridge {
            Some(bridge) => Arc::clone(bridge),
            None => {
                info!("signal bridge not available, using stub bridge");
                Arc::new(StubBridge::new()) as Arc<dyn SignalBridge>
            }
        };
        self.registry.attach(Arc::clone(&bridge));
        self.connected
            .store(bridge.is_connected(), Ordering::Relaxed);
        self.stop_listener();

        let registry = Arc::clone(&self.registry);
        let throttle = Arc::new(Throttled::spawn(
            self.options.throttle_window,
            ThrottleOptions::default(),
            move |values: SignalValues| registry.update_values(&values),
        ));
        let task = tokio::spawn(listen(
            bridge.subscribe(),
            Arc::clone(&self.registry),
            Arc::clone(&self.connected),
            Arc::clone(&throttle),
        ));
        *self.throttle.lock() = Some(throttle);
        *self.listener.lock() = Some(task);

        // Failures are logged by the registry and leave the previous list in place.
        let _ = self.registry.load_signals().await;
    }

    /// Initialize and run the MES handshake.
    ///
    /// The handshake has no cancellation hook: once started it runs until it
    /// is acknowledged, the signal is found missing, or the attempts run out.
    pub async fn establish_connection(&self) -> Result<HandshakeReport, ConsoleError> {
        self.set_state(ConnectionState::Connecting);
        self.initialize().await;

        match self.handshake().await {
            Ok(report) => {
                self.set_state(ConnectionState::Connected);
                info!(retry_count = report.retry_count, "PLC communication established");
                if self.options.auto_poll {
                    self.registry.start_polling(self.options.poll_interval).await;
                }
                Ok(report)
            }
            Err(err) => {
                self.set_state(ConnectionState::Error);
                error!(error = %err, "PLC communication failed");
                Err(err)
            }
        }
    }

    async fn handshake(&self) -> Result<HandshakeReport, ConsoleError> {
        let policy = &self.options.handshake;
        let Some(code) = self.registry.find_code_by_display_name(&policy.signal_name) else {
            return Err(ConsoleError::SignalNotConfigured(policy.signal_name.clone()));
        };
        let bridge = self.registry.bridge().ok_or(ConsoleError::BridgeUnavailable)?;
        let max_attempts = policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            debug!(attempt, max_attempts, code = %code, "writing MES status");
            match bridge.write_signal(&code, policy.connected_value.clone()).await {
                Ok(true) => {
                    return Ok(HandshakeReport {
                        signal_code: code,
                        retry_count: attempt - 1,
                    });
                }
                Ok(false) => warn!(attempt, code = %code, "MES status write not acknowledged"),
                Err(err) => warn!(attempt, code = %code, error = %err, "MES status write failed"),
            }
            if attempt < max_attempts {
                tokio::time::sleep(policy.retry_delay).await;
            }
        }
        Err(ConsoleError::HandshakeExhausted {
            attempts: max_attempts,
        })
    }

    pub fn start_processing(&self) -> Result<(), ConsoleError> {
        self.transition(ConnectionState::Processing)?;
        info!("processing started");
        Ok(())
    }

    pub fn complete_processing(&self) -> Result<(), ConsoleError> {
        self.transition(ConnectionState::Completed)?;
        info!("processing completed");
        Ok(())
    }

    fn transition(&self, next: ConnectionState) -> Result<(), ConsoleError> {
        let from = self.state();
        if !from.can_transition_to(next) {
            return Err(ConsoleError::InvalidTransition { from, to: next });
        }
        self.set_state(next);
        Ok(())
    }

    /// Stop the push listener and drop pending throttled values.
    pub fn dispose(&self) {
        self.stop_listener();
        self.registry.detach();
    }

    fn stop_listener(&self) {
        if let Some(task) = self.listener.lock().take() {
            task.abort();
        }
        if let Some(throttle) = self.throttle.lock().take() {
            throttle.abort();
        }
    }
}

impl Drop for ConnectionCoordinator {
    fn drop(&mut self) {
        self.stop_listener();
    }
}

async fn listen(
    mut events: broadcast::Receiver<BridgeEvent>,
    registry: Arc<SignalRegistry>,
    connected: Arc<AtomicBool>,
    throttle: Arc<Throttled<SignalValues>>,
) {
    loop {
        match events.recv().await {
            Ok(BridgeEvent::ConnectionChanged(value)) => {
                info!(connected = value, "bridge connection changed");
                connected.store(value, Ordering::Relaxed);
            }
            Ok(BridgeEvent::ValuesChanged(values)) => throttle.call(values),
            Ok(BridgeEvent::ConfigChanged(count)) => {
                debug!(count, "bridge signal configuration changed");
                let _ = registry.load_signals().await;
            }
            Ok(BridgeEvent::PollingChanged(value)) => registry.set_polling(value),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "bridge push listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
