//! One console session: the coordinators for a single device, wired together.

#![allow(missing_docs)]

use std::sync::Arc;

use tracing::info;

use crate::bridge::SignalBridge;
use crate::config::ConsoleConfig;
use crate::connection::ConnectionCoordinator;
use crate::error::{ConsoleError, LockError};
use crate::job::JobSelectionGuard;
use crate::lock::MoldLockCoordinator;
use crate::mold::MoldService;
use crate::registry::SignalRegistry;

#[derive(Debug)]
pub struct Session {
    config: ConsoleConfig,
    registry: Arc<SignalRegistry>,
    connection: ConnectionCoordinator,
    jobs: JobSelectionGuard,
    molds: MoldLockCoordinator,
}

impl Session {
    /// Build a session around an explicit bridge. `None` means the host
    /// offers no bridge and the stub is used once the connection initializes.
    #[must_use]
    pub fn create(
        config: ConsoleConfig,
        bridge: Option<Arc<dyn SignalBridge>>,
        mold_service: Arc<dyn MoldService>,
    ) -> Self {
        let registry = Arc::new(SignalRegistry::new());
        let connection = ConnectionCoordinator::new(
            Arc::clone(&registry),
            bridge,
            config.connection_options(),
        );
        Self::assemble(config, registry, connection, mold_service)
    }

    /// Build a session whose bridge comes from `bridge.driver`.
    pub fn from_config(
        config: ConsoleConfig,
        mold_service: Arc<dyn MoldService>,
    ) -> Result<Self, ConsoleError> {
        let registry = Arc::new(SignalRegistry::new());
        let connection = ConnectionCoordinator::from_config(&config, Arc::clone(&registry))?;
        Ok(Self::assemble(config, registry, connection, mold_service))
    }

    fn assemble(
        config: ConsoleConfig,
        registry: Arc<SignalRegistry>,
        connection: ConnectionCoordinator,
        mold_service: Arc<dyn MoldService>,
    ) -> Self {
        let jobs = JobSelectionGuard::new();
        jobs.set_device(config.device_id.clone());
        let molds = MoldLockCoordinator::new(mold_service, config.mold);
        Self {
            config,
            registry,
            connection,
            jobs,
            molds,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SignalRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn connection(&self) -> &ConnectionCoordinator {
        &self.connection
    }

    #[must_use]
    pub fn jobs(&self) -> &JobSelectionGuard {
        &self.jobs
    }

    #[must_use]
    pub fn molds(&self) -> &MoldLockCoordinator {
        &self.molds
    }

    /// Open the mold lock panel for the current device.
    pub async fn open_mold_panel(&self) -> bool {
        self.molds.open_panel(&self.jobs).await
    }

    /// Lock the selected mold as the current operator on the current device.
    pub async fn lock_selected_mold(&self) -> Result<(), LockError> {
        let user_name = self.jobs.current_user_name().unwrap_or_default();
        let device_id = self.jobs.device_id().unwrap_or_default();
        self.molds.confirm_lock(&user_name, &device_id).await
    }

    /// Unlock a comma-separated list of mould codes as the current operator.
    pub async fn unlock_molds(&self, mould_codes: &str) -> Result<(), ConsoleError> {
        let user_name = self.jobs.current_user_name().unwrap_or_default();
        let device_id = self.jobs.device_id().unwrap_or_default();
        self.molds
            .cancel_lock(mould_codes, &user_name, &device_id)
            .await
    }

    /// Stop background tasks. Mold and job state is left as is.
    pub fn dispose(&self) {
        self.connection.dispose();
        info!("console session disposed");
    }
}
