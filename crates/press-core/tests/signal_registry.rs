mod common;

use std::sync::Arc;
use std::time::Duration;

use press_core::bridge::{BridgeEvent, LoopbackBridge, SignalBridge};
use press_core::connection::{ConnectionCoordinator, ConnectionOptions};
use press_core::registry::SignalRegistry;
use press_core::signal::{SignalConfig, SignalDataType, SignalScalar};
use rustc_hash::FxHashMap;
use tokio::time::sleep;

use common::{mes_signals, values, ScriptedBridge};

#[test]
fn last_write_wins_over_any_batch_sequence() {
    let registry = SignalRegistry::new();
    let codes = ["A", "B", "C", "D"];
    let mut expected = FxHashMap::default();
    // Deterministic pseudo-random batches.
    let mut seed: u32 = 0x2545_f491;
    for round in 0..200_i32 {
        let mut batch = Vec::new();
        for code in codes {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            if seed % 3 == 0 {
                let value = SignalScalar::from(round);
                expected.insert(code, value.clone());
                batch.push((code, value));
            }
        }
        registry.update_values(&values(&batch));
    }
    for code in codes {
        assert_eq!(registry.value(code), expected.get(code).cloned(), "code {code}");
    }
}

#[tokio::test]
async fn failed_load_keeps_previous_configuration() {
    let bridge = ScriptedBridge::new(mes_signals());
    let registry = SignalRegistry::new();
    registry.attach(bridge.clone());
    assert_eq!(registry.load_signals().await, Ok(3));

    bridge.set_signals(vec![SignalConfig::new("X", "X", SignalDataType::Word)]);
    bridge.fail_config(true);
    assert!(registry.load_signals().await.is_err());
    assert_eq!(registry.signal_count(), 3);
    assert!(registry.find_code_by_display_name("Main pressure").is_some());
    assert!(!registry.is_loading());
}

#[tokio::test]
async fn batch_read_merges_into_cache() {
    let bridge = ScriptedBridge::new(mes_signals());
    let registry = SignalRegistry::new();
    registry.attach(bridge);
    let read = registry.batch_read(&["P_MAIN", "T_OIL"]).await;
    assert_eq!(read.len(), 2);
    assert_eq!(registry.value("T_OIL"), Some(SignalScalar::Number(1.0)));
    assert_eq!(registry.values().len(), 2);
}

#[tokio::test]
async fn single_signal_failures_are_soft() {
    let bridge = ScriptedBridge::new(mes_signals());
    bridge.script_writes([Err(press_core::ConsoleError::Bridge("timeout".into()))]);
    let registry = SignalRegistry::new();
    registry.attach(bridge);
    assert_eq!(registry.read_signal("P_MAIN").await, None);
    assert!(!registry.write_signal("P_MAIN", 2.into()).await);
    assert!(registry.write_signal("P_MAIN", 2.into()).await);
}

#[tokio::test(start_paused = true)]
async fn config_push_reloads_registry() {
    let bridge = ScriptedBridge::new(mes_signals());
    let registry = Arc::new(SignalRegistry::new());
    let coordinator = ConnectionCoordinator::new(
        Arc::clone(&registry),
        Some(bridge.clone() as Arc<dyn SignalBridge>),
        ConnectionOptions::default(),
    );
    coordinator.initialize().await;
    assert_eq!(registry.signal_count(), 3);

    bridge.set_signals(vec![SignalConfig::new("ONLY", "Only", SignalDataType::Bit)]);
    registry.refresh_signals().await.unwrap();
    sleep(Duration::from_millis(1)).await;

    assert_eq!(registry.signal_count(), 1);
    assert_eq!(bridge.config_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn value_pushes_are_throttled_into_registry() {
    let bridge = ScriptedBridge::new(mes_signals());
    let registry = Arc::new(SignalRegistry::new());
    let coordinator = ConnectionCoordinator::new(
        Arc::clone(&registry),
        Some(bridge.clone() as Arc<dyn SignalBridge>),
        ConnectionOptions::default(),
    );
    coordinator.initialize().await;

    bridge.push(BridgeEvent::ValuesChanged(values(&[("P_MAIN", 1.into())])));
    sleep(Duration::from_millis(1)).await;
    assert_eq!(registry.value("P_MAIN"), Some(SignalScalar::Number(1.0)));

    bridge.push(BridgeEvent::ValuesChanged(values(&[("P_MAIN", 2.into())])));
    bridge.push(BridgeEvent::ValuesChanged(values(&[("P_MAIN", 3.into())])));
    sleep(Duration::from_millis(10)).await;
    // Still inside the first window.
    assert_eq!(registry.value("P_MAIN"), Some(SignalScalar::Number(1.0)));

    sleep(Duration::from_millis(100)).await;
    assert_eq!(registry.value("P_MAIN"), Some(SignalScalar::Number(3.0)));
}

#[tokio::test(start_paused = true)]
async fn polling_flag_follows_bridge_pushes() {
    let bridge = Arc::new(LoopbackBridge::new(mes_signals()));
    let registry = Arc::new(SignalRegistry::new());
    let coordinator = ConnectionCoordinator::new(
        Arc::clone(&registry),
        Some(bridge.clone() as Arc<dyn SignalBridge>),
        ConnectionOptions::default(),
    );
    coordinator.initialize().await;
    assert!(!coordinator.is_polling());

    bridge.start_polling(Duration::from_millis(100)).await.unwrap();
    sleep(Duration::from_millis(1)).await;
    assert!(coordinator.is_polling());

    bridge.set_connected(false);
    sleep(Duration::from_millis(1)).await;
    assert!(!coordinator.is_connected());
}

#[tokio::test]
async fn grouped_view_and_active_count() {
    let mut signals = mes_signals();
    signals[2].active = false;
    let registry = SignalRegistry::new();
    registry.attach(ScriptedBridge::new(signals));
    registry.load_signals().await.unwrap();
    let groups = registry.signals_by_group();
    assert_eq!(
        groups.keys().map(|group| group.as_str()).collect::<Vec<_>>(),
        ["default", "hydraulic"]
    );
    assert_eq!(registry.active_count(), 2);
}
