#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use press_core::bridge::{BridgeEvent, SignalBridge};
use press_core::connection::MES_STATUS_SIGNAL;
use press_core::error::ConsoleError;
use press_core::mold::{
    ApiResponse, LockForm, MoldInfo, MoldOption, MoldQuery, MoldService, UnlockForm,
};
use press_core::signal::{SignalConfig, SignalDataType, SignalScalar, SignalValues};
use smol_str::SmolStr;
use tokio::sync::broadcast;

pub const MES_CODE: &str = "MES_COMM";

pub fn mes_signals() -> Vec<SignalConfig> {
    vec![
        SignalConfig::new(MES_CODE, MES_STATUS_SIGNAL, SignalDataType::Bit),
        SignalConfig::new("P_MAIN", "Main pressure", SignalDataType::Float).with_group("hydraulic"),
        SignalConfig::new("T_OIL", "Oil temperature", SignalDataType::Float),
    ]
}

pub fn values(entries: &[(&str, SignalScalar)]) -> SignalValues {
    entries
        .iter()
        .map(|(code, value)| (SmolStr::new(code), value.clone()))
        .collect()
}

/// Bridge whose write acknowledgements and configuration answers are scripted.
pub struct ScriptedBridge {
    signals: Mutex<Vec<SignalConfig>>,
    config_failure: AtomicBool,
    write_script: Mutex<VecDeque<Result<bool, ConsoleError>>>,
    pub writes: Mutex<Vec<(SmolStr, SignalScalar)>>,
    pub write_calls: AtomicUsize,
    pub config_calls: AtomicUsize,
    connected: AtomicBool,
    polling: AtomicBool,
    events: broadcast::Sender<BridgeEvent>,
}

impl ScriptedBridge {
    pub fn new(signals: Vec<SignalConfig>) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            signals: Mutex::new(signals),
            config_failure: AtomicBool::new(false),
            write_script: Mutex::new(VecDeque::new()),
            writes: Mutex::new(Vec::new()),
            write_calls: AtomicUsize::new(0),
            config_calls: AtomicUsize::new(0),
            connected: AtomicBool::new(true),
            polling: AtomicBool::new(false),
            events,
        })
    }

    /// Queue write outcomes; once drained, writes acknowledge `true`.
    pub fn script_writes(&self, outcomes: impl IntoIterator<Item = Result<bool, ConsoleError>>) {
        self.write_script.lock().extend(outcomes);
    }

    pub fn fail_config(&self, fail: bool) {
        self.config_failure.store(fail, Ordering::SeqCst);
    }

    pub fn set_signals(&self, signals: Vec<SignalConfig>) {
        *self.signals.lock() = signals;
    }

    pub fn push(&self, event: BridgeEvent) {
        let _ = self.events.send(event);
    }

    pub fn write_count(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalBridge for ScriptedBridge {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_polling(&self) -> bool {
        self.polling.load(Ordering::SeqCst)
    }

    async fn read_signal(&self, code: &str) -> Result<SignalScalar, ConsoleError> {
        Err(ConsoleError::Bridge(format!("read of '{code}' not scripted").into()))
    }

    async fn write_signal(&self, code: &str, value: SignalScalar) -> Result<bool, ConsoleError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.writes.lock().push((SmolStr::new(code), value));
        self.write_script.lock().pop_front().unwrap_or(Ok(true))
    }

    async fn batch_read(&self, codes: &[&str]) -> Result<SignalValues, ConsoleError> {
        Ok(codes
            .iter()
            .map(|code| (SmolStr::new(code), SignalScalar::Number(1.0)))
            .collect())
    }

    async fn signal_config(&self) -> Result<Vec<SignalConfig>, ConsoleError> {
        self.config_calls.fetch_add(1, Ordering::SeqCst);
        if self.config_failure.load(Ordering::SeqCst) {
            return Err(ConsoleError::Bridge("configuration unavailable".into()));
        }
        Ok(self.signals.lock().clone())
    }

    async fn refresh_signal_config(&self) -> Result<(), ConsoleError> {
        let count = self.signals.lock().len();
        self.push(BridgeEvent::ConfigChanged(count));
        Ok(())
    }

    async fn start_polling(&self, _interval: Duration) -> Result<(), ConsoleError> {
        self.polling.store(true, Ordering::SeqCst);
        self.push(BridgeEvent::PollingChanged(true));
        Ok(())
    }

    async fn stop_polling(&self) -> Result<(), ConsoleError> {
        self.polling.store(false, Ordering::SeqCst);
        self.push(BridgeEvent::PollingChanged(false));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }
}

/// In-memory mold backend that counts calls.
#[derive(Default)]
pub struct MemoryMoldService {
    pub options: Mutex<Vec<SmolStr>>,
    pub infos: Mutex<Vec<MoldInfo>>,
    pub server_locked: Mutex<Vec<MoldInfo>>,
    pub fail_requests: AtomicBool,
    pub lock_delay: Mutex<Option<Duration>>,
    pub search_calls: AtomicUsize,
    pub info_calls: AtomicUsize,
    pub lock_calls: AtomicUsize,
    pub unlock_calls: AtomicUsize,
    pub locked_calls: AtomicUsize,
    pub last_query: Mutex<Option<MoldQuery>>,
    pub last_lock: Mutex<Option<LockForm>>,
    pub last_unlock: Mutex<Option<UnlockForm>>,
}

impl MemoryMoldService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ConsoleError> {
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(ConsoleError::Service("backend unavailable".into()));
        }
        Ok(())
    }

    pub fn network_calls(&self) -> usize {
        [
            &self.search_calls,
            &self.info_calls,
            &self.lock_calls,
            &self.unlock_calls,
            &self.locked_calls,
        ]
        .iter()
        .map(|counter| counter.load(Ordering::SeqCst))
        .sum()
    }
}

#[async_trait]
impl MoldService for MemoryMoldService {
    async fn search_mold_codes(
        &self,
        keyword: &str,
    ) -> Result<ApiResponse<Vec<MoldOption>>, ConsoleError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let options = self
            .options
            .lock()
            .iter()
            .filter(|code| code.contains(keyword))
            .map(|code| MoldOption { code: code.clone() })
            .collect();
        Ok(ApiResponse::ok(options))
    }

    async fn list_mold_info(
        &self,
        query: &MoldQuery,
    ) -> Result<ApiResponse<Vec<MoldInfo>>, ConsoleError> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock() = Some(query.clone());
        self.check()?;
        let excluded = query.mould_code_array.clone().unwrap_or_default();
        let infos = self
            .infos
            .lock()
            .iter()
            .filter(|info| info.mould_code.starts_with(query.mould_code.as_str()))
            .filter(|info| !excluded.contains(&info.mould_code))
            .cloned()
            .collect();
        Ok(ApiResponse::ok(infos))
    }

    async fn lock_molds(&self, form: &LockForm) -> Result<ApiResponse<()>, ConsoleError> {
        self.lock_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_lock.lock() = Some(form.clone());
        let delay = *self.lock_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check()?;
        self.server_locked.lock().extend(form.molds()?);
        Ok(ApiResponse::empty())
    }

    async fn unlock_molds(&self, form: &UnlockForm) -> Result<ApiResponse<()>, ConsoleError> {
        self.unlock_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_unlock.lock() = Some(form.clone());
        self.check()?;
        Ok(ApiResponse::empty())
    }

    async fn locked_molds(
        &self,
        _device_id: &str,
    ) -> Result<ApiResponse<Vec<MoldInfo>>, ConsoleError> {
        self.locked_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(ApiResponse::ok(self.server_locked.lock().clone()))
    }
}

/// Complete candidate for project `PRJ001`.
pub fn candidate(code: &str) -> MoldInfo {
    MoldInfo::new(code)
        .with_order("M1")
        .with_craft("C1", "Forming")
}
