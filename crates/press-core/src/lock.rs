//! Mold search, selection and lock/unlock coordination for one device.
//!
//! The locked set is changed in two ways only: optimistically after a lock or
//! unlock request succeeds, and wholesale from the server. A server
//! reconciliation always replaces whatever optimistic state was there.
//!
//! Two confirmations running at once can both validate against the same
//! locked count. With [`MoldLockOptions::serialize_locks`] set, the
//! validate-and-lock section runs under a per-coordinator async mutex.

#![allow(missing_docs)]

use std::sync::Arc;

use parking_lot::RwLock;
use smol_str::SmolStr;
use tracing::{debug, error, info, warn};

use crate::error::{ConsoleError, LockError, MoldValidationError};
use crate::job::{split_codes, JobSelectionGuard};
use crate::mold::{
    project_code, LockForm, MoldInfo, MoldQuery, MoldService, UnlockForm, MAX_MOLD_LOCK_COUNT,
    MIN_SEARCH_CHARS,
};

/// Where the current candidate is in the lock flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockPhase {
    #[default]
    None,
    Searching,
    Selected,
    Validating,
    Locking,
    Locked,
    ValidationFailed,
    LockFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoldLockOptions {
    pub max_lock_count: usize,
    pub min_search_chars: usize,
    pub serialize_locks: bool,
}

impl Default for MoldLockOptions {
    fn default() -> Self {
        Self {
            max_lock_count: MAX_MOLD_LOCK_COUNT,
            min_search_chars: MIN_SEARCH_CHARS,
            serialize_locks: false,
        }
    }
}

/// Molds locked on the device, in lock order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockedSet {
    molds: Vec<MoldInfo>,
}

impl LockedSet {
    #[must_use]
    pub fn len(&self) -> usize {
        self.molds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.molds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MoldInfo> {
        self.molds.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[MoldInfo] {
        &self.molds
    }

    #[must_use]
    pub fn codes(&self) -> Vec<SmolStr> {
        self.molds.iter().map(|mold| mold.mould_code.clone()).collect()
    }

    #[must_use]
    pub fn contains(&self, mould_code: &str) -> bool {
        self.molds.iter().any(|mold| mold.mould_code == mould_code)
    }

    /// Project the device is working on, from the first locked mold.
    #[must_use]
    pub fn active_project(&self) -> Option<&str> {
        self.molds.first().map(MoldInfo::project)
    }

    /// Append a mold the server just accepted.
    pub fn apply_optimistic_lock(&mut self, mold: MoldInfo) {
        self.molds.push(mold);
    }

    /// Remove every mold whose code is listed. Returns how many were removed.
    pub fn apply_optimistic_unlock(&mut self, codes: &[SmolStr]) -> usize {
        let before = self.molds.len();
        self.molds.retain(|mold| !codes.contains(&mold.mould_code));
        before - self.molds.len()
    }

    /// Replace the set with the server's view.
    pub fn reconcile_from_server(&mut self, molds: Vec<MoldInfo>) {
        self.molds = molds;
    }

    pub fn clear(&mut self) {
        self.molds.clear();
    }
}

/// Copy of the coordinator state for display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoldPanelSnapshot {
    pub keyword: SmolStr,
    pub options: Vec<SmolStr>,
    pub search_results: Vec<MoldInfo>,
    pub selected: Option<MoldInfo>,
    pub locked: Vec<MoldInfo>,
    pub locked_count: usize,
    pub can_lock_more: bool,
    pub phase: LockPhase,
    pub panel_open: bool,
    pub unlock_panel_open: bool,
    pub selected_unlock: Option<MoldInfo>,
    pub loading: bool,
    pub search_loading: bool,
}

#[derive(Debug, Default)]
struct PanelState {
    keyword: SmolStr,
    options: Vec<SmolStr>,
    search_results: Vec<MoldInfo>,
    selected: Option<MoldInfo>,
    locked: LockedSet,
    phase: LockPhase,
    panel_open: bool,
    unlock_panel_open: bool,
    selected_unlock: Option<MoldInfo>,
    loading: bool,
    search_loading: bool,
}

impl PanelState {
    fn clear_selection(&mut self) {
        self.selected = None;
        self.search_results.clear();
        self.keyword = SmolStr::default();
        self.options.clear();
        self.phase = LockPhase::None;
    }
}

/// Owns the mold panel state and the device's locked set.
///
/// State is read and written in short synchronous sections; no lock is held
/// while a service call is in flight.
pub struct MoldLockCoordinator {
    service: Arc<dyn MoldService>,
    options: MoldLockOptions,
    state: RwLock<PanelState>,
    lock_gate: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for MoldLockCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoldLockCoordinator")
            .field("options", &self.options)
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

impl MoldLockCoordinator {
    #[must_use]
    pub fn new(service: Arc<dyn MoldService>, options: MoldLockOptions) -> Self {
        Self {
            service,
            options,
            state: RwLock::new(PanelState::default()),
            lock_gate: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn options(&self) -> MoldLockOptions {
        self.options
    }

    #[must_use]
    pub fn snapshot(&self) -> MoldPanelSnapshot {
        let state = self.state.read();
        MoldPanelSnapshot {
            keyword: state.keyword.clone(),
            options: state.options.clone(),
            search_results: state.search_results.clone(),
            selected: state.selected.clone(),
            locked: state.locked.as_slice().to_vec(),
            locked_count: state.locked.len(),
            can_lock_more: state.locked.len() < self.options.max_lock_count,
            phase: state.phase,
            panel_open: state.panel_open,
            unlock_panel_open: state.unlock_panel_open,
            selected_unlock: state.selected_unlock.clone(),
            loading: state.loading,
            search_loading: state.search_loading,
        }
    }

    #[must_use]
    pub fn locked_molds(&self) -> Vec<MoldInfo> {
        self.state.read().locked.as_slice().to_vec()
    }

    #[must_use]
    pub fn locked_codes(&self) -> Vec<SmolStr> {
        self.state.read().locked.codes()
    }

    #[must_use]
    pub fn locked_count(&self) -> usize {
        self.state.read().locked.len()
    }

    #[must_use]
    pub fn can_lock_more(&self) -> bool {
        self.locked_count() < self.options.max_lock_count
    }

    #[must_use]
    pub fn selected(&self) -> Option<MoldInfo> {
        self.state.read().selected.clone()
    }

    #[must_use]
    pub fn phase(&self) -> LockPhase {
        self.state.read().phase
    }

    /// Fill the code dropdown. Keywords shorter than the configured minimum
    /// clear it without a request.
    pub async fn search_mold_options(&self, keyword: &str) {
        {
            let mut state = self.state.write();
            state.keyword = SmolStr::new(keyword);
            if keyword.chars().count() < self.options.min_search_chars {
                state.options.clear();
                return;
            }
            state.search_loading = true;
        }
        let result = self
            .service
            .search_mold_codes(keyword)
            .await
            .and_then(|response| response.into_list());
        let mut state = self.state.write();
        state.search_loading = false;
        match result {
            Ok(options) => {
                state.options = options.into_iter().map(|option| option.code).collect();
                debug!(keyword, count = state.options.len(), "mold code search done");
            }
            Err(err) => {
                error!(keyword, error = %err, "mold code search failed");
                state.options.clear();
            }
        }
    }

    /// Load detail records for `mould_code`, leaving out molds already locked
    /// on the device. The selection is cleared first.
    pub async fn fetch_mold_info(&self, mould_code: &str, device_id: &str) -> Vec<MoldInfo> {
        let query = {
            let mut state = self.state.write();
            state.selected = None;
            if mould_code.is_empty() {
                state.search_results.clear();
                state.phase = LockPhase::None;
                return Vec::new();
            }
            state.phase = LockPhase::Searching;
            state.loading = true;
            let locked = state.locked.codes();
            MoldQuery {
                mould_code: SmolStr::new(mould_code),
                device_id: SmolStr::new(device_id),
                mould_code_array: (!locked.is_empty()).then_some(locked),
            }
        };
        let result = self
            .service
            .list_mold_info(&query)
            .await
            .and_then(|response| response.into_list());
        let mut state = self.state.write();
        state.loading = false;
        state.phase = LockPhase::None;
        state.search_results = match result {
            Ok(molds) => {
                debug!(mould_code, count = molds.len(), "mold detail query done");
                molds
            }
            Err(err) => {
                error!(mould_code, error = %err, "mold detail query failed");
                Vec::new()
            }
        };
        state.search_results.clone()
    }

    /// Select a candidate. The coordinator keeps its own copy.
    pub fn select_mold(&self, mold: Option<&MoldInfo>) {
        let mut state = self.state.write();
        state.selected = mold.cloned();
        state.phase = if state.selected.is_some() {
            LockPhase::Selected
        } else {
            LockPhase::None
        };
        debug!(
            mould_code = mold.map_or("", |mold| mold.mould_code.as_str()),
            "mold selected"
        );
    }

    /// Set the craft of the current candidate. No-op without a candidate.
    pub fn update_selected_craft(&self, craft_code: &str, craft_name: &str) {
        let mut state = self.state.write();
        if let Some(selected) = state.selected.as_mut() {
            selected.craft_code = Some(SmolStr::new(craft_code));
            selected.craft_name = Some(SmolStr::new(craft_name));
        }
    }

    /// Check the current candidate against the locked set.
    pub fn validate_selection(&self) -> Result<(), MoldValidationError> {
        let state = self.state.read();
        self.validate(&state).map(|_| ())
    }

    fn validate(&self, state: &PanelState) -> Result<MoldInfo, MoldValidationError> {
        let Some(candidate) = state.selected.as_ref() else {
            return Err(MoldValidationError::NoSelection);
        };
        if state.locked.len() >= self.options.max_lock_count {
            return Err(MoldValidationError::CapacityReached {
                limit: self.options.max_lock_count,
            });
        }
        if state.locked.contains(&candidate.mould_code) {
            return Err(MoldValidationError::AlreadyLocked {
                mould_code: candidate.mould_code.clone(),
            });
        }
        if !candidate.has_order_and_craft() {
            return Err(MoldValidationError::MissingOrderOrCraft);
        }
        if let Some(active) = state.locked.active_project() {
            let incoming = project_code(&candidate.mould_code);
            if !incoming.is_empty() && !active.is_empty() && incoming != active {
                return Err(MoldValidationError::CrossProject {
                    active_project: SmolStr::new(active),
                });
            }
        }
        Ok(candidate.clone())
    }

    /// Validate and lock the current candidate on `device_id`.
    pub async fn confirm_lock(&self, user_name: &str, device_id: &str) -> Result<(), LockError> {
        let _serial = if self.options.serialize_locks {
            Some(self.lock_gate.lock().await)
        } else {
            None
        };

        let candidate = {
            let mut state = self.state.write();
            state.phase = LockPhase::Validating;
            match self.validate(&state) {
                Ok(candidate) => {
                    state.phase = LockPhase::Locking;
                    state.loading = true;
                    candidate
                }
                Err(err) => {
                    state.phase = LockPhase::ValidationFailed;
                    warn!(reason = %err, "mold lock rejected");
                    return Err(err.into());
                }
            }
        };

        let result = match LockForm::new(std::slice::from_ref(&candidate), user_name, device_id) {
            Ok(form) => self
                .service
                .lock_molds(&form)
                .await
                .and_then(|response| response.into_result()),
            Err(err) => Err(err),
        };

        let mut state = self.state.write();
        state.loading = false;
        match result {
            Ok(_) => {
                info!(mould_code = %candidate.mould_code, device_id, "mold locked");
                state.locked.apply_optimistic_lock(candidate);
                state.clear_selection();
                state.phase = LockPhase::Locked;
                Ok(())
            }
            Err(err) => {
                error!(mould_code = %candidate.mould_code, error = %err, "mold lock failed");
                state.phase = LockPhase::LockFailed;
                Err(LockError::Request)
            }
        }
    }

    /// Unlock a comma-separated list of mould codes.
    pub async fn cancel_lock(
        &self,
        mould_codes: &str,
        user_name: &str,
        device_id: &str,
    ) -> Result<(), ConsoleError> {
        let codes = split_codes(mould_codes);
        if codes.is_empty() {
            warn!("unlock requested without mould code");
            return Err(ConsoleError::EmptyMouldCodes);
        }
        let form = UnlockForm {
            mould_codes: SmolStr::new(mould_codes),
            user_name: SmolStr::new(user_name),
            device_id: SmolStr::new(device_id),
        };
        self.state.write().loading = true;
        let result = self
            .service
            .unlock_molds(&form)
            .await
            .and_then(|response| response.into_result());
        let mut state = self.state.write();
        state.loading = false;
        match result {
            Ok(_) => {
                let removed = state.locked.apply_optimistic_unlock(&codes);
                state.selected_unlock = None;
                info!(mould_codes, removed, "molds unlocked");
                Ok(())
            }
            Err(err) => {
                error!(mould_codes, error = %err, "mold unlock failed");
                Err(err)
            }
        }
    }

    /// Replace the locked set with the server's view of `device_id`.
    pub async fn fetch_locked_molds(&self, device_id: &str) {
        if device_id.is_empty() {
            self.state.write().locked.clear();
            return;
        }
        self.state.write().loading = true;
        let result = self
            .service
            .locked_molds(device_id)
            .await
            .and_then(|response| response.into_list());
        let mut state = self.state.write();
        state.loading = false;
        match result {
            Ok(molds) => {
                debug!(device_id, count = molds.len(), "locked molds loaded");
                state.locked.reconcile_from_server(molds);
            }
            Err(err) => {
                error!(device_id, error = %err, "failed to load locked molds");
                state.locked.clear();
            }
        }
    }

    /// Open the lock panel when the job selection allows it, then resync the
    /// locked set. Returns whether the panel opened.
    pub async fn open_panel(&self, guard: &JobSelectionGuard) -> bool {
        if !guard.can_open_mold_panel() {
            debug!("mold panel blocked by job selection");
            return false;
        }
        let device_id = guard.device_id().unwrap_or_default();
        self.state.write().panel_open = true;
        self.fetch_locked_molds(&device_id).await;
        true
    }

    /// Close the lock panel. The locked set is kept.
    pub fn close_panel(&self) {
        let mut state = self.state.write();
        state.panel_open = false;
        state.clear_selection();
    }

    pub fn open_unlock_panel(&self) {
        let mut state = self.state.write();
        state.unlock_panel_open = true;
        state.selected_unlock = None;
    }

    pub fn close_unlock_panel(&self) {
        let mut state = self.state.write();
        state.unlock_panel_open = false;
        state.selected_unlock = None;
    }

    pub fn select_unlock_mold(&self, mold: Option<&MoldInfo>) {
        self.state.write().selected_unlock = mold.cloned();
    }

    /// Clear the candidate, search results, keyword and options.
    pub fn clear_selection(&self) {
        self.state.write().clear_selection();
    }

    /// Drop all state, including the locked set.
    pub fn reset(&self) {
        *self.state.write() = PanelState::default();
    }
}
