//! Bridge driver registry for console configuration.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;

use smol_str::SmolStr;

use crate::error::ConsoleError;
use crate::signal::SignalConfig;

use super::{LoopbackBridge, SignalBridge, StubBridge};

pub struct BridgeRegistry {
    entries: HashMap<SmolStr, BridgeRegistryEntry>,
}

impl Default for BridgeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub struct BridgeSpec {
    pub name: SmolStr,
    pub bridge: Arc<dyn SignalBridge>,
}

impl std::fmt::Debug for BridgeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeSpec")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

type BridgeCreate = fn(&[SignalConfig]) -> Result<Arc<dyn SignalBridge>, ConsoleError>;

#[derive(Clone)]
struct BridgeRegistryEntry {
    canonical: SmolStr,
    create: BridgeCreate,
}

impl BridgeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    #[must_use]
    pub fn default_registry() -> Self {
        let mut registry = Self::new();
        registry.register("stub", create_stub);
        registry.register_alias("sim", "stub");
        registry.register_alias("noop", "stub");
        registry.register_alias("mock", "stub");
        registry.register("loopback", create_loopback);
        registry.register_alias("echo", "loopback");
        registry
    }

    pub fn register(&mut self, name: impl Into<SmolStr>, create: BridgeCreate) {
        let canonical = normalize_name(&name.into());
        let entry = BridgeRegistryEntry {
            canonical: canonical.clone(),
            create,
        };
        self.entries.insert(canonical, entry);
    }

    pub fn register_alias(&mut self, alias: impl Into<SmolStr>, target: &str) {
        let alias = normalize_name(&alias.into());
        let target = normalize_name(target);
        if let Some(entry) = self.entries.get(&target).cloned() {
            self.entries.insert(alias, entry);
        }
    }

    /// Check that `driver` names a registered bridge (or `none`).
    pub fn validate(&self, driver: &str) -> Result<(), ConsoleError> {
        if is_none_driver(driver) {
            return Ok(());
        }
        self.entry(driver).map(|_| ())
    }

    /// Build the named bridge. `none` yields `Ok(None)`.
    pub fn build(
        &self,
        driver: &str,
        signals: &[SignalConfig],
    ) -> Result<Option<BridgeSpec>, ConsoleError> {
        if is_none_driver(driver) {
            return Ok(None);
        }
        let entry = self.entry(driver)?;
        let bridge = (entry.create)(signals)?;
        Ok(Some(BridgeSpec {
            name: entry.canonical,
            bridge,
        }))
    }

    /// Return the canonical built-in driver names (stable sorted).
    #[must_use]
    pub fn canonical_driver_names(&self) -> Vec<String> {
        let names: BTreeSet<String> = self
            .entries
            .values()
            .map(|entry| entry.canonical.to_string())
            .collect();
        names.into_iter().collect()
    }

    fn entry(&self, driver: &str) -> Result<BridgeRegistryEntry, ConsoleError> {
        self.entries
            .get(&normalize_name(driver))
            .cloned()
            .ok_or_else(|| {
                ConsoleError::InvalidConfig(format!("unsupported bridge.driver '{driver}'").into())
            })
    }
}

fn normalize_name(name: &str) -> SmolStr {
    SmolStr::new(name.trim().to_ascii_lowercase())
}

fn is_none_driver(name: &str) -> bool {
    name.trim().eq_ignore_ascii_case("none")
}

fn create_stub(_signals: &[SignalConfig]) -> Result<Arc<dyn SignalBridge>, ConsoleError> {
    Ok(Arc::new(StubBridge::new()))
}

fn create_loopback(signals: &[SignalConfig]) -> Result<Arc<dyn SignalBridge>, ConsoleError> {
    if signals.is_empty() {
        return Err(ConsoleError::InvalidConfig(
            "bridge.driver 'loopback' requires at least one [[signals]] entry".into(),
        ));
    }
    Ok(Arc::new(LoopbackBridge::new(signals.to_vec())))
}
