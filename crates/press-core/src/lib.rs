//! `press-core` - signal acquisition, MES handshake and mold locking for a
//! press operator console.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

/// PLC signal bridge interface and built-in bridges.
pub mod bridge;
/// Console configuration.
pub mod config;
/// Connection lifecycle and MES handshake.
pub mod connection;
/// Console errors.
pub mod error;
/// Job selection gating.
pub mod job;
/// Mold lock coordination.
pub mod lock;
/// Mold records and data service.
pub mod mold;
/// Signal configuration and value cache.
pub mod registry;
/// Session wiring.
pub mod session;
/// Signal types.
pub mod signal;
/// Push event throttling.
pub mod throttle;

pub use bridge::{BridgeEvent, SignalBridge};
pub use config::ConsoleConfig;
pub use connection::{ConnectionCoordinator, ConnectionState, HandshakeReport};
pub use error::{ConsoleError, JobSelectionError, LockError, MoldValidationError};
pub use job::JobSelectionGuard;
pub use lock::MoldLockCoordinator;
pub use registry::SignalRegistry;
pub use session::Session;
