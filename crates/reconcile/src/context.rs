//! Backend and callback traits
//!
//! The engine decides what to change; these traits are how it asks the
//! package manager, service manager and hook interpreter to do it, and how it
//! talks back to whoever drives it. The binary supplies process-backed
//! implementations and tests use the mocks below.

use std::collections::BTreeSet;
use std::path::Path;

use crate::converge::SyncPhase;
use crate::dotfiles::{Conflict, LinkChange, SyncReport};
use crate::error::Result;
use crate::hooks::{HookKey, HookOutcome, ResolvedHook};
use crate::packages::PackagePlan;
use crate::services::ServicePlan;
use crate::types::{ServiceKey, ServiceScope};

/// Package manager operations
pub trait PackageBackend {
    /// Explicitly installed package names
    fn explicit_packages(&self) -> Result<BTreeSet<String>>;

    /// Packages installed as dependencies that nothing requires any more
    fn orphan_packages(&self) -> Result<BTreeSet<String>>;

    fn install(&self, packages: &[String]) -> Result<()>;

    /// Remove packages together with their now-unneeded dependencies
    fn remove(&self, packages: &[String]) -> Result<()>;

    /// Full system upgrade
    fn upgrade(&self) -> Result<()>;

    /// Whether install and remove need root
    fn needs_privilege(&self) -> bool {
        false
    }
}

/// Service manager operations
pub trait ServiceBackend {
    /// Whether the unit is enabled in its scope
    fn is_enabled(&self, key: &ServiceKey) -> Result<bool>;

    /// Enable and start
    fn enable(&self, key: &ServiceKey) -> Result<()>;

    /// Disable and stop
    fn disable(&self, key: &ServiceKey) -> Result<()>;

    /// Names of every enabled unit in `scope`
    fn enabled_units(&self, scope: ServiceScope) -> Result<BTreeSet<String>>;
}

/// Executes hook scripts
pub trait HookInterpreter {
    /// Run `script`, elevated if requested. Returns the exit code, or `None`
    /// if the process was terminated by a signal.
    fn run(&self, script: &Path, elevate: bool) -> Result<Option<i32>>;
}

/// Progress callback for sync operations
///
/// Every state-changing step is announced before it is applied, so a
/// failure never hides what was attempted. All methods default to no-ops.
pub trait ProgressCallback {
    /// A sync phase is starting
    fn on_phase_start(&mut self, _phase: SyncPhase) {}

    /// Something the operator should know that does not stop the run
    fn on_warning(&mut self, _message: &str) {}

    /// A dotfile target is claimed more than once
    fn on_conflict(&mut self, _conflict: &Conflict) {}

    /// The package diff, before anything is installed or removed
    fn on_package_plan(&mut self, _plan: &PackagePlan, _prune: bool) {}

    /// The service diff, before anything is enabled or disabled
    fn on_service_plan(&mut self, _plan: &ServicePlan) {}

    /// A link is about to be written (or would be, in dry run)
    fn on_link_start(&mut self, _change: &LinkChange, _dry_run: bool) {}

    /// Every link has been processed
    fn on_links_complete(&mut self, _report: &SyncReport) {}

    /// A hook script is about to run
    fn on_hook_start(&mut self, _hook: &ResolvedHook) {}

    /// A hook finished, was skipped, or would run
    fn on_hook_complete(&mut self, _key: &HookKey, _outcome: HookOutcome) {}
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {}

/// Confirmation callback for destructive steps
pub trait ConfirmCallback {
    /// Ask the operator to confirm; `false` skips the step
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Provider for elevated privileges
///
/// Called before the first privileged step of a run; implementations are
/// expected to make later calls cheap.
pub trait PrivilegeProvider {
    fn acquire(&mut self, reason: &str) -> Result<()>;
}

/// Provider for runs that never elevate
pub struct NoPrivilege;

impl PrivilegeProvider for NoPrivilege {
    fn acquire(&mut self, _reason: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::error::Error;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    /// Service backend over an in-memory enabled set
    #[derive(Default)]
    pub struct MockServices {
        pub enabled: RefCell<BTreeSet<ServiceKey>>,
        pub calls: RefCell<Vec<String>>,
        /// Unit name whose enable/disable fails
        pub fail_on: Option<String>,
    }

    impl MockServices {
        pub fn with_enabled(keys: impl IntoIterator<Item = ServiceKey>) -> Self {
            Self {
                enabled: RefCell::new(keys.into_iter().collect()),
                ..Self::default()
            }
        }

        fn check(&self, action: &str, key: &ServiceKey) -> Result<()> {
            self.calls.borrow_mut().push(format!("{action} {key}"));
            if self.fail_on.as_deref() == Some(key.name.as_str()) {
                return Err(Error::backend(format!("{action} {}", key.name), "unit failed"));
            }
            Ok(())
        }
    }

    /// Package backend over in-memory explicit and orphan sets
    #[derive(Default)]
    pub struct MockPackages {
        pub explicit: RefCell<BTreeSet<String>>,
        pub orphans: RefCell<BTreeSet<String>>,
        pub calls: RefCell<Vec<String>>,
        pub privileged: bool,
    }

    impl MockPackages {
        pub fn with_explicit(names: &[&str]) -> Self {
            Self {
                explicit: RefCell::new(names.iter().map(ToString::to_string).collect()),
                ..Self::default()
            }
        }
    }

    impl PackageBackend for MockPackages {
        fn explicit_packages(&self) -> Result<BTreeSet<String>> {
            Ok(self.explicit.borrow().clone())
        }

        fn orphan_packages(&self) -> Result<BTreeSet<String>> {
            Ok(self.orphans.borrow().clone())
        }

        fn install(&self, packages: &[String]) -> Result<()> {
            self.calls.borrow_mut().push(format!("install {}", packages.join(" ")));
            self.explicit.borrow_mut().extend(packages.iter().cloned());
            Ok(())
        }

        fn remove(&self, packages: &[String]) -> Result<()> {
            self.calls.borrow_mut().push(format!("remove {}", packages.join(" ")));
            let mut explicit = self.explicit.borrow_mut();
            let mut orphans = self.orphans.borrow_mut();
            for pkg in packages {
                explicit.remove(pkg);
                orphans.remove(pkg);
            }
            Ok(())
        }

        fn upgrade(&self) -> Result<()> {
            self.calls.borrow_mut().push("upgrade".into());
            Ok(())
        }

        fn needs_privilege(&self) -> bool {
            self.privileged
        }
    }

    impl ServiceBackend for MockServices {
        fn is_enabled(&self, key: &ServiceKey) -> Result<bool> {
            Ok(self.enabled.borrow().contains(key))
        }

        fn enable(&self, key: &ServiceKey) -> Result<()> {
            self.check("enable", key)?;
            self.enabled.borrow_mut().insert(key.clone());
            Ok(())
        }

        fn disable(&self, key: &ServiceKey) -> Result<()> {
            self.check("disable", key)?;
            self.enabled.borrow_mut().remove(key);
            Ok(())
        }

        fn enabled_units(&self, scope: ServiceScope) -> Result<BTreeSet<String>> {
            Ok(self
                .enabled
                .borrow()
                .iter()
                .filter(|k| k.scope == scope)
                .map(|k| k.name.clone())
                .collect())
        }
    }

    /// Interpreter that records invocations and returns scripted exit codes
    #[derive(Default)]
    pub struct MockInterpreter {
        pub exits: BTreeMap<PathBuf, Option<i32>>,
        pub calls: RefCell<Vec<(PathBuf, bool)>>,
    }

    impl MockInterpreter {
        pub fn failing(script: impl Into<PathBuf>, code: i32) -> Self {
            let mut exits = BTreeMap::new();
            exits.insert(script.into(), Some(code));
            Self {
                exits,
                ..Self::default()
            }
        }

        pub fn runs(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl HookInterpreter for MockInterpreter {
        fn run(&self, script: &Path, elevate: bool) -> Result<Option<i32>> {
            self.calls.borrow_mut().push((script.to_path_buf(), elevate));
            Ok(self.exits.get(script).copied().unwrap_or(Some(0)))
        }
    }

    /// Progress callback that keeps a line per event
    #[derive(Default)]
    pub struct RecordingProgress {
        pub events: Vec<String>,
    }

    impl ProgressCallback for RecordingProgress {
        fn on_phase_start(&mut self, phase: SyncPhase) {
            self.events.push(format!("phase {phase}"));
        }

        fn on_warning(&mut self, message: &str) {
            self.events.push(format!("warn {message}"));
        }

        fn on_conflict(&mut self, conflict: &Conflict) {
            self.events.push(format!("conflict {conflict}"));
        }

        fn on_link_start(&mut self, change: &LinkChange, _dry_run: bool) {
            self.events.push(format!("link {}", change.link.target.display()));
        }

        fn on_hook_start(&mut self, hook: &ResolvedHook) {
            self.events.push(format!("hook {}", hook.key));
        }

        fn on_hook_complete(&mut self, key: &HookKey, outcome: HookOutcome) {
            self.events.push(format!("hook {key} {outcome:?}"));
        }
    }

    /// Privilege provider that remembers every request
    #[derive(Default)]
    pub struct RecordingPrivilege {
        pub reasons: Vec<String>,
    }

    impl PrivilegeProvider for RecordingPrivilege {
        fn acquire(&mut self, reason: &str) -> Result<()> {
            self.reasons.push(reason.to_string());
            Ok(())
        }
    }
}
