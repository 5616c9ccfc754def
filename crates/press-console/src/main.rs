//! `press-console` - bench CLI for press operator console sessions.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use press_core::bridge::BridgeRegistry;
use press_core::config::ConsoleConfig;
use press_core::connection::ConnectionCoordinator;
use press_core::registry::SignalRegistry;
use press_core::signal::SignalScalar;
use serde_json::json;
use smol_str::SmolStr;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("press-console error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ConsoleConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::CheckConfig => check_config(&config, cli.json),
        Command::Connect { hold_ms } => connect(config, hold_ms, cli.json).await,
        Command::Signals => signals(config, cli.json).await,
        Command::Read { code } => read(config, &code, cli.json).await,
        Command::Write { code, value } => write(config, &code, &value).await,
    }
}

fn coordinator(config: &ConsoleConfig) -> anyhow::Result<ConnectionCoordinator> {
    Ok(ConnectionCoordinator::from_config(
        config,
        Arc::new(SignalRegistry::new()),
    )?)
}

fn check_config(config: &ConsoleConfig, as_json: bool) -> anyhow::Result<()> {
    let drivers = BridgeRegistry::default_registry().canonical_driver_names();
    if as_json {
        let summary = json!({
            "deviceId": config.device_id,
            "logLevel": config.log_level,
            "driver": config.bridge.driver,
            "drivers": drivers,
            "pollIntervalMs": config.bridge.poll_interval.as_millis(),
            "throttleMs": config.bridge.throttle_window.as_millis(),
            "handshakeSignal": config.handshake.signal_name,
            "maxAttempts": config.handshake.max_attempts,
            "maxLockCount": config.mold.max_lock_count,
            "signals": config.signals.len(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    println!("config ok");
    println!(
        "  device:    {}",
        config.device_id.as_deref().unwrap_or("(unset)")
    );
    println!(
        "  driver:    {} (available: {})",
        config.bridge.driver,
        drivers.join(", ")
    );
    println!(
        "  poll:      {} ms, throttle {} ms",
        config.bridge.poll_interval.as_millis(),
        config.bridge.throttle_window.as_millis()
    );
    println!(
        "  handshake: '{}' x{} every {} ms",
        config.handshake.signal_name,
        config.handshake.max_attempts,
        config.handshake.retry_delay.as_millis()
    );
    println!("  molds:     up to {}", config.mold.max_lock_count);
    println!("  signals:   {}", config.signals.len());
    Ok(())
}

async fn connect(config: ConsoleConfig, hold_ms: u64, as_json: bool) -> anyhow::Result<()> {
    let coordinator = coordinator(&config)?;
    let report = coordinator.establish_connection().await?;
    if hold_ms > 0 {
        tokio::time::sleep(Duration::from_millis(hold_ms)).await;
    }
    let registry = coordinator.registry();
    if as_json {
        let out = json!({
            "state": coordinator.state().as_str(),
            "signalCode": report.signal_code,
            "retryCount": report.retry_count,
            "polling": coordinator.is_polling(),
            "values": registry.values(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!(
            "{} via '{}' after {} retries",
            coordinator.state().label(),
            report.signal_code,
            report.retry_count
        );
        for (code, value) in registry.values() {
            println!("  {code} = {value}");
        }
    }
    coordinator.dispose();
    Ok(())
}

async fn signals(config: ConsoleConfig, as_json: bool) -> anyhow::Result<()> {
    let coordinator = coordinator(&config)?;
    coordinator.initialize().await;
    let groups = coordinator.registry().signals_by_group();
    if as_json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
    } else {
        for (group, signals) in &groups {
            println!("[{group}]");
            for signal in signals {
                let unit = signal.unit.as_deref().unwrap_or("");
                let inactive = if signal.active { "" } else { " (inactive)" };
                println!(
                    "  {:<16} {:?} {}{}{}",
                    signal.code, signal.data_type, signal.display_name, unit, inactive
                );
            }
        }
    }
    coordinator.dispose();
    Ok(())
}

async fn read(config: ConsoleConfig, code: &str, as_json: bool) -> anyhow::Result<()> {
    let coordinator = coordinator(&config)?;
    coordinator.initialize().await;
    let Some(value) = coordinator.registry().read_signal(code).await else {
        coordinator.dispose();
        bail!("reading '{code}' failed");
    };
    if as_json {
        println!("{}", serde_json::to_string(&json!({ code: value }))?);
    } else {
        println!("{code} = {value}");
    }
    coordinator.dispose();
    Ok(())
}

async fn write(config: ConsoleConfig, code: &str, value: &str) -> anyhow::Result<()> {
    let coordinator = coordinator(&config)?;
    coordinator.initialize().await;
    let acknowledged = coordinator
        .registry()
        .write_signal(code, parse_value(value))
        .await;
    coordinator.dispose();
    if !acknowledged {
        bail!("write of '{code}' was not acknowledged");
    }
    println!("{code} written");
    Ok(())
}

fn parse_value(text: &str) -> SignalScalar {
    let trimmed = text.trim();
    match trimmed {
        "true" => SignalScalar::Bool(true),
        "false" => SignalScalar::Bool(false),
        _ => trimmed
            .parse::<f64>()
            .map_or_else(|_| SignalScalar::Text(SmolStr::new(text)), SignalScalar::Number),
    }
}
