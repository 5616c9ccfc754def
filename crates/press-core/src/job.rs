//! Job selection gating.

#![allow(missing_docs)]

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tracing::debug;

use crate::error::JobSelectionError;

/// Team, operator and process chosen by the operator. Blank ids count as
/// missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSelection {
    pub team_id: Option<SmolStr>,
    #[serde(rename = "personnelId")]
    pub operator_id: Option<SmolStr>,
    pub process_id: Option<SmolStr>,
}

impl JobSelection {
    /// First missing field in team, operator, process order.
    pub fn validate(&self) -> Result<(), JobSelectionError> {
        if !is_present(self.team_id.as_ref()) {
            return Err(JobSelectionError::MissingTeam);
        }
        if !is_present(self.operator_id.as_ref()) {
            return Err(JobSelectionError::MissingOperator);
        }
        if !is_present(self.process_id.as_ref()) {
            return Err(JobSelectionError::MissingProcess);
        }
        Ok(())
    }
}

/// Job record reported for the press attached to this console.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PressJob {
    #[serde(default)]
    pub device_id: Option<SmolStr>,
    /// Comma-separated mould codes locked on the device.
    #[serde(default)]
    pub mould_code: Option<SmolStr>,
    #[serde(default)]
    pub status: Option<SmolStr>,
    #[serde(default)]
    pub start_time: Option<SmolStr>,
}

#[derive(Debug, Default)]
struct GuardState {
    selection: JobSelection,
    device_id: Option<SmolStr>,
    locked_mould_codes: Vec<SmolStr>,
}

/// Decides which operations the current job selection permits.
#[derive(Debug, Default)]
pub struct JobSelectionGuard {
    state: RwLock<GuardState>,
}

impl JobSelectionGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_team(&self, team_id: Option<SmolStr>) {
        self.state.write().selection.team_id = team_id;
    }

    pub fn set_operator(&self, operator_id: Option<SmolStr>) {
        self.state.write().selection.operator_id = operator_id;
    }

    pub fn set_process(&self, process_id: Option<SmolStr>) {
        self.state.write().selection.process_id = process_id;
    }

    pub fn set_device(&self, device_id: Option<SmolStr>) {
        self.state.write().device_id = device_id;
    }

    #[must_use]
    pub fn selection(&self) -> JobSelection {
        self.state.read().selection.clone()
    }

    #[must_use]
    pub fn device_id(&self) -> Option<SmolStr> {
        self.state.read().device_id.clone()
    }

    /// Operator id, used as the user name on lock requests.
    #[must_use]
    pub fn current_user_name(&self) -> Option<SmolStr> {
        self.state.read().selection.operator_id.clone()
    }

    /// Mould codes the press job reports as locked on the device.
    #[must_use]
    pub fn locked_mould_codes(&self) -> Vec<SmolStr> {
        self.state.read().locked_mould_codes.clone()
    }

    /// True iff team, operator and device are all known.
    #[must_use]
    pub fn can_open_mold_panel(&self) -> bool {
        let state = self.state.read();
        is_present(state.selection.team_id.as_ref())
            && is_present(state.selection.operator_id.as_ref())
            && is_present(state.device_id.as_ref())
    }

    pub fn validate_job_selection(&self) -> Result<(), JobSelectionError> {
        self.state.read().selection.validate()
    }

    pub fn reset_selection(&self) {
        self.state.write().selection = JobSelection::default();
    }

    /// Take the device id from the first job carrying one and the locked
    /// codes from the first job's mould code list.
    pub fn apply_press_jobs(&self, jobs: &[PressJob]) {
        let device_id = jobs
            .iter()
            .find_map(|job| job.device_id.clone().filter(|id| !id.trim().is_empty()));
        let locked = jobs
            .first()
            .and_then(|job| job.mould_code.as_deref())
            .map(split_codes)
            .unwrap_or_default();
        debug!(
            device_id = device_id.as_deref().unwrap_or(""),
            locked = locked.len(),
            "press jobs applied"
        );
        let mut state = self.state.write();
        state.device_id = device_id;
        state.locked_mould_codes = locked;
    }
}

/// Split a comma-separated code list, trimming and dropping empties.
#[must_use]
pub fn split_codes(text: &str) -> Vec<SmolStr> {
    text.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(SmolStr::new)
        .collect()
}

fn is_present(value: Option<&SmolStr>) -> bool {
    value.is_some_and(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_codes_drops_blanks() {
        assert_eq!(split_codes(" A, ,B,"), vec!["A", "B"]);
        assert!(split_codes("").is_empty());
    }

    #[test]
    fn press_job_decodes_backend_fields() {
        let job: PressJob =
            serde_json::from_str(r#"{"deviceId": "7", "mouldCode": "P1-01,P1-02"}"#).unwrap();
        assert_eq!(job.device_id.as_deref(), Some("7"));
        assert_eq!(job.mould_code.as_deref(), Some("P1-01,P1-02"));
    }

    #[test]
    fn blank_team_counts_as_missing() {
        let selection = JobSelection {
            team_id: Some("  ".into()),
            operator_id: Some("op".into()),
            process_id: Some("p".into()),
        };
        assert_eq!(selection.validate(), Err(JobSelectionError::MissingTeam));
    }
}
