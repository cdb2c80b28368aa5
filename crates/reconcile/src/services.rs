//! Service reconciliation
//!
//! Declared services are compared against the live enabled state. The ledger
//! adds the one thing the live system cannot tell us: which services this tool
//! enabled earlier. A tracked service that has since vanished from every
//! module is disabled; a service the operator enabled by hand is never touched
//! unless it was tracked.

use std::collections::BTreeSet;

use crate::context::ServiceBackend;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::resolver::stable_dedup_by_key;
use crate::types::{ServiceKey, ServiceScope, ServiceSpec};

/// Why a service is being disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableReason {
    /// Declared with `enabled: false`
    Declared,
    /// Tracked in the ledger but no longer declared anywhere
    Undeclared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disable {
    pub key: ServiceKey,
    pub reason: DisableReason,
}

/// Service changes for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServicePlan {
    /// Declared enabled but not enabled, in declaration order
    pub to_enable: Vec<ServiceKey>,
    /// Declared disables first, then undeclared tracked services in ledger order
    pub to_disable: Vec<Disable>,
    /// Declared-and-enabled keys; the tracked set after a successful apply
    pub desired: Vec<ServiceKey>,
}

impl ServicePlan {
    /// Query every declared and tracked service and work out what to change.
    pub fn reconcile(
        declared: &[ServiceSpec],
        backend: &dyn ServiceBackend,
        ledger: &Ledger,
    ) -> Result<Self> {
        let declared = stable_dedup_by_key(declared.iter(), |s| s.key());
        let mut plan = Self::default();

        for spec in &declared {
            let key = spec.key();
            let enabled = backend.is_enabled(&key)?;
            match (spec.enabled, enabled) {
                (true, false) => plan.to_enable.push(key.clone()),
                (false, true) => plan.to_disable.push(Disable {
                    key: key.clone(),
                    reason: DisableReason::Declared,
                }),
                _ => {}
            }
            if spec.enabled {
                plan.desired.push(key);
            }
        }

        let declared_keys: BTreeSet<ServiceKey> = declared.iter().map(|s| s.key()).collect();
        for key in ledger.tracked_services() {
            if declared_keys.contains(&key) {
                continue;
            }
            if backend.is_enabled(&key)? {
                plan.to_disable.push(Disable {
                    key,
                    reason: DisableReason::Undeclared,
                });
            } else {
                log::debug!("Tracked service {key} is already disabled");
            }
        }

        Ok(plan)
    }

    pub fn is_empty(&self) -> bool {
        self.to_enable.is_empty() && self.to_disable.is_empty()
    }

    /// Whether applying the plan changes any system-scope unit
    pub fn touches_system(&self) -> bool {
        self.to_enable
            .iter()
            .chain(self.to_disable.iter().map(|d| &d.key))
            .any(|key| key.scope == ServiceScope::System)
    }

    /// Apply enables, then disables. The first failure stops the batch.
    /// Each success is written to the ledger as it happens; once everything
    /// succeeded the tracked set becomes exactly [`Self::desired`].
    pub fn apply(
        &self,
        backend: &dyn ServiceBackend,
        ledger: &mut Ledger,
        dry_run: bool,
    ) -> Result<()> {
        if dry_run {
            return Ok(());
        }

        for key in &self.to_enable {
            log::info!("Enabling {key}");
            backend.enable(key)?;
            ledger.track(key)?;
        }

        for disable in &self.to_disable {
            log::info!("Disabling {}", disable.key);
            backend.disable(&disable.key)?;
            if disable.reason == DisableReason::Undeclared {
                ledger.untrack(&disable.key)?;
            }
        }

        ledger.replace_tracked(&self.desired)
    }
}

/// Enabled units no module declares, system scope first, each scope sorted.
/// A declared unit is never returned, whatever its `enabled` flag says.
pub fn undeclared_enabled(
    declared: &[ServiceSpec],
    backend: &dyn ServiceBackend,
) -> Result<Vec<ServiceKey>> {
    let declared: BTreeSet<ServiceKey> = declared.iter().map(ServiceSpec::key).collect();
    let mut found = Vec::new();
    for scope in [ServiceScope::System, ServiceScope::User] {
        for unit in backend.enabled_units(scope)? {
            let key = ServiceKey::new(unit, scope);
            if !declared.contains(&key) {
                found.push(key);
            }
        }
    }
    Ok(found)
}
