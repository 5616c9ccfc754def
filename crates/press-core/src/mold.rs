//! Mold records and the mold data service consumed by the lock coordinator.

#![allow(missing_docs)]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::ConsoleError;

/// Maximum number of molds locked on one device.
pub const MAX_MOLD_LOCK_COUNT: usize = 5;
/// Shortest keyword sent to the mold code search.
pub const MIN_SEARCH_CHARS: usize = 2;

/// Mold as returned by search, detail and locked-set queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoldInfo {
    pub mould_code: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<SmolStr>,
    #[serde(default)]
    pub make_order_number: SmolStr,
    #[serde(default)]
    pub stages: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub craft_code: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub craft_name: Option<SmolStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_code: Option<SmolStr>,
}

impl MoldInfo {
    #[must_use]
    pub fn new(mould_code: impl Into<SmolStr>) -> Self {
        Self {
            mould_code: mould_code.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_order(mut self, make_order_number: impl Into<SmolStr>) -> Self {
        self.make_order_number = make_order_number.into();
        self
    }

    #[must_use]
    pub fn with_craft(mut self, code: impl Into<SmolStr>, name: impl Into<SmolStr>) -> Self {
        self.craft_code = Some(code.into());
        self.craft_name = Some(name.into());
        self
    }

    /// Project part of the mould code.
    #[must_use]
    pub fn project(&self) -> &str {
        project_code(&self.mould_code)
    }

    /// Make-order number and craft code are both filled in.
    #[must_use]
    pub fn has_order_and_craft(&self) -> bool {
        !self.make_order_number.trim().is_empty()
            && self
                .craft_code
                .as_ref()
                .is_some_and(|code| !code.trim().is_empty())
    }
}

/// Substring of a mould code before the first `-`. A code without `-` is its
/// own project code.
#[must_use]
pub fn project_code(mould_code: &str) -> &str {
    mould_code
        .split_once('-')
        .map_or(mould_code, |(project, _)| project)
}

/// Entry of the mold code dropdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoldOption {
    pub code: SmolStr,
}

/// Envelope used by the mold data service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default = "default_code")]
    pub code: i32,
    #[serde(default)]
    pub msg: Option<SmolStr>,
    pub data: Option<T>,
}

fn default_code() -> i32 {
    200
}

impl<T> ApiResponse<T> {
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self {
            code: 200,
            msg: None,
            data: Some(data),
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            code: 200,
            msg: None,
            data: None,
        }
    }

    /// Payload of a successful response; non-200 codes become service errors.
    pub fn into_result(self) -> Result<Option<T>, ConsoleError> {
        if self.code == 200 {
            return Ok(self.data);
        }
        let msg = self
            .msg
            .unwrap_or_else(|| SmolStr::new(format!("request failed with code {}", self.code)));
        Err(ConsoleError::Service(msg))
    }
}

impl<T> ApiResponse<Vec<T>> {
    /// Successful payload, empty when absent.
    pub fn into_list(self) -> Result<Vec<T>, ConsoleError> {
        Ok(self.into_result()?.unwrap_or_default())
    }
}

/// Detail query. `mould_code_array` lists codes the backend must leave out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoldQuery {
    pub mould_code: SmolStr,
    pub device_id: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mould_code_array: Option<Vec<SmolStr>>,
}

/// Lock form. `choosed_rows` is the JSON array of the molds to lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockForm {
    #[serde(rename = "choosedRowsStr")]
    pub choosed_rows: String,
    pub user_name: SmolStr,
    pub device_id: SmolStr,
}

impl LockForm {
    pub fn new(
        molds: &[MoldInfo],
        user_name: impl Into<SmolStr>,
        device_id: impl Into<SmolStr>,
    ) -> Result<Self, ConsoleError> {
        Ok(Self {
            choosed_rows: serde_json::to_string(molds)?,
            user_name: user_name.into(),
            device_id: device_id.into(),
        })
    }

    /// Molds carried by the form.
    pub fn molds(&self) -> Result<Vec<MoldInfo>, ConsoleError> {
        Ok(serde_json::from_str(&self.choosed_rows)?)
    }
}

/// Unlock form. `mould_codes` is comma-separated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockForm {
    pub mould_codes: SmolStr,
    pub user_name: SmolStr,
    pub device_id: SmolStr,
}

/// Mold data service. Every call is a single request/response round trip.
#[async_trait]
pub trait MoldService: Send + Sync {
    async fn search_mold_codes(
        &self,
        keyword: &str,
    ) -> Result<ApiResponse<Vec<MoldOption>>, ConsoleError>;

    async fn list_mold_info(
        &self,
        query: &MoldQuery,
    ) -> Result<ApiResponse<Vec<MoldInfo>>, ConsoleError>;

    async fn lock_molds(&self, form: &LockForm) -> Result<ApiResponse<()>, ConsoleError>;

    async fn unlock_molds(&self, form: &UnlockForm) -> Result<ApiResponse<()>, ConsoleError>;

    async fn locked_molds(&self, device_id: &str)
        -> Result<ApiResponse<Vec<MoldInfo>>, ConsoleError>;
}
