//! Lifecycle hooks
//!
//! A hook is identified by `owner:phase`, where the owner is a module name or
//! the reserved `host` owner. Unless marked `always`, a hook runs once and is
//! then recorded in the [`Ledger`] until it is reset.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::context::{HookInterpreter, ProgressCallback};
use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::types::{HookDecl, HostConfig, Module};

/// Owner name reserved for host-level hooks
pub const HOST_OWNER: &str = "host";

/// When a hook fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HookPhase {
    /// Module, before packages are applied
    Pre,
    /// Module, after dotfiles and services
    Post,
    PreSync,
    PostSync,
    PreUpdate,
    PostUpdate,
}

impl HookPhase {
    pub const MODULE: [Self; 2] = [Self::Pre, Self::Post];
    pub const HOST: [Self; 4] = [Self::PreSync, Self::PostSync, Self::PreUpdate, Self::PostUpdate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pre => "pre",
            Self::Post => "post",
            Self::PreSync => "pre_sync",
            Self::PostSync => "post_sync",
            Self::PreUpdate => "pre_update",
            Self::PostUpdate => "post_update",
        }
    }

    pub fn is_host_phase(&self) -> bool {
        Self::HOST.contains(self)
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookPhase {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pre" => Ok(Self::Pre),
            "post" => Ok(Self::Post),
            "pre_sync" => Ok(Self::PreSync),
            "post_sync" => Ok(Self::PostSync),
            "pre_update" => Ok(Self::PreUpdate),
            "post_update" => Ok(Self::PostUpdate),
            other => Err(format!("unknown hook phase '{other}'")),
        }
    }
}

/// Who declares a hook
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HookOwner {
    Host,
    Module(String),
}

impl fmt::Display for HookOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => f.write_str(HOST_OWNER),
            Self::Module(name) => f.write_str(name),
        }
    }
}

/// Ledger identity of a hook
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HookKey {
    pub owner: HookOwner,
    pub phase: HookPhase,
}

impl HookKey {
    pub fn module(name: impl Into<String>, phase: HookPhase) -> Self {
        Self {
            owner: HookOwner::Module(name.into()),
            phase,
        }
    }

    pub fn host(phase: HookPhase) -> Self {
        Self {
            owner: HookOwner::Host,
            phase,
        }
    }
}

impl fmt::Display for HookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner, self.phase)
    }
}

impl FromStr for HookKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidHookKey(s.to_string());
        let (owner, phase) = s.split_once(':').ok_or_else(invalid)?;
        let phase: HookPhase = phase.parse().map_err(|_| invalid())?;
        if owner.is_empty() {
            return Err(invalid());
        }

        match (owner == HOST_OWNER, phase.is_host_phase()) {
            (true, true) => Ok(Self::host(phase)),
            (false, false) => Ok(Self::module(owner, phase)),
            _ => Err(invalid()),
        }
    }
}

/// A declared hook with its script resolved against the owner's directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHook {
    pub key: HookKey,
    pub script: PathBuf,
    pub always: bool,
    pub root: bool,
}

impl ResolvedHook {
    fn new(key: HookKey, base: &Path, decl: &HookDecl) -> Self {
        let script = if decl.script.is_absolute() {
            decl.script.clone()
        } else {
            base.join(&decl.script)
        };
        Self {
            key,
            script,
            always: decl.always,
            root: decl.root,
        }
    }

    pub fn exists(&self) -> bool {
        self.script.is_file()
    }
}

/// A module's hook for `phase`, if declared
pub fn module_hook(module: &Module, phase: HookPhase) -> Option<ResolvedHook> {
    module
        .decl
        .hooks
        .get(phase)
        .map(|decl| ResolvedHook::new(HookKey::module(&module.name, phase), &module.dir, decl))
}

/// The host's hook for `phase`, if declared
pub fn host_hook(host: &HostConfig, phase: HookPhase) -> Option<ResolvedHook> {
    host.hooks
        .get(phase)
        .map(|decl| ResolvedHook::new(HookKey::host(phase), &host.root, decl))
}

/// Every declared hook: host hooks first, then module hooks in module order
pub fn declared_hooks(host: &HostConfig, modules: &[Module]) -> Vec<ResolvedHook> {
    let host_hooks = HookPhase::HOST.into_iter().filter_map(|p| host_hook(host, p));
    let module_hooks = modules
        .iter()
        .flat_map(|m| HookPhase::MODULE.into_iter().filter_map(move |p| module_hook(m, p)));
    host_hooks.chain(module_hooks).collect()
}

/// Look up a declared hook by key
pub fn find_hook(key: &HookKey, host: &HostConfig, modules: &[Module]) -> Option<ResolvedHook> {
    match &key.owner {
        HookOwner::Host => host_hook(host, key.phase),
        HookOwner::Module(name) => modules
            .iter()
            .find(|m| &m.name == name)
            .and_then(|m| module_hook(m, key.phase)),
    }
}

/// What happened to a hook invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    Ran,
    /// Dry run: would have executed
    WouldRun,
    /// Already recorded in the ledger
    AlreadyRun,
    /// Not declared, or the script does not exist
    NotConfigured,
}

/// Ledger view of a declared hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStatus {
    Pending,
    Done,
    Always,
    Missing,
}

impl HookStatus {
    pub fn of(hook: &ResolvedHook, ledger: &Ledger) -> Self {
        if !hook.exists() {
            Self::Missing
        } else if hook.always {
            Self::Always
        } else if ledger.has_run(&hook.key) {
            Self::Done
        } else {
            Self::Pending
        }
    }
}

/// Runs hooks against the ledger
pub struct HookRunner<'a> {
    interpreter: &'a dyn HookInterpreter,
    ledger: &'a mut Ledger,
    dry_run: bool,
    progress: Option<&'a mut dyn ProgressCallback>,
}

impl<'a> HookRunner<'a> {
    pub fn new(
        interpreter: &'a dyn HookInterpreter,
        ledger: &'a mut Ledger,
        dry_run: bool,
    ) -> Self {
        Self {
            interpreter,
            ledger,
            dry_run,
            progress: None,
        }
    }

    /// Announce each hook before it runs and report its outcome
    pub fn with_progress(mut self, progress: &'a mut dyn ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run a module hook if declared and not yet run
    pub fn run_module(&mut self, module: &Module, phase: HookPhase) -> Result<HookOutcome> {
        match module_hook(module, phase) {
            Some(hook) => self.run(&hook),
            None => Ok(HookOutcome::NotConfigured),
        }
    }

    /// Run a host hook if declared and not yet run
    pub fn run_host(&mut self, host: &HostConfig, phase: HookPhase) -> Result<HookOutcome> {
        match host_hook(host, phase) {
            Some(hook) => self.run(&hook),
            None => Ok(HookOutcome::NotConfigured),
        }
    }

    /// Run a hook unless the ledger says it already ran. `always` hooks run
    /// every time and are never recorded.
    pub fn run(&mut self, hook: &ResolvedHook) -> Result<HookOutcome> {
        let outcome = self.run_unforced(hook)?;
        self.report(&hook.key, outcome);
        Ok(outcome)
    }

    fn run_unforced(&mut self, hook: &ResolvedHook) -> Result<HookOutcome> {
        if !hook.exists() {
            log::warn!("Hook {} script not found: {}", hook.key, hook.script.display());
            return Ok(HookOutcome::NotConfigured);
        }

        if !hook.always && self.ledger.has_run(&hook.key) {
            log::debug!("Hook {} already run, skipping", hook.key);
            return Ok(HookOutcome::AlreadyRun);
        }

        if self.dry_run {
            return Ok(HookOutcome::WouldRun);
        }

        self.execute(hook)?;
        if !hook.always {
            self.ledger.mark_run(&hook.key)?;
        }
        Ok(HookOutcome::Ran)
    }

    /// Run a hook regardless of the ledger or `always`
    pub fn force_run(&mut self, hook: &ResolvedHook) -> Result<HookOutcome> {
        if !hook.exists() {
            return Err(Error::HookNotConfigured(hook.key.clone()));
        }
        if self.dry_run {
            self.report(&hook.key, HookOutcome::WouldRun);
            return Ok(HookOutcome::WouldRun);
        }

        self.execute(hook)?;
        if !hook.always {
            self.ledger.mark_run(&hook.key)?;
        }
        self.report(&hook.key, HookOutcome::Ran);
        Ok(HookOutcome::Ran)
    }

    fn report(&mut self, key: &HookKey, outcome: HookOutcome) {
        if let Some(progress) = self.progress.as_deref_mut() {
            progress.on_hook_complete(key, outcome);
        }
    }

    fn execute(&mut self, hook: &ResolvedHook) -> Result<()> {
        if let Some(progress) = self.progress.as_deref_mut() {
            progress.on_hook_start(hook);
        }
        log::info!(
            "Running hook {}{}: {}",
            hook.key,
            if hook.root { " (root)" } else { "" },
            hook.script.display()
        );

        let code = self.interpreter.run(&hook.script, hook.root)?;
        if code == Some(0) {
            Ok(())
        } else {
            Err(Error::HookFailed {
                key: hook.key.clone(),
                script: hook.script.clone(),
                code,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::mock::{MockInterpreter, RecordingProgress};
    use crate::types::{HostHooks, ModuleDecl, ModuleHooks};
    use std::fs;
    use tempfile::TempDir;

    fn module_with_hooks(dir: &Path, pre: Option<HookDecl>, post: Option<HookDecl>) -> Module {
        let decl = ModuleDecl {
            hooks: ModuleHooks { pre, post },
            ..ModuleDecl::default()
        };
        Module::new("neovim", dir, decl)
    }

    fn script(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "#!/bin/bash\n").unwrap();
        path
    }

    #[test]
    fn key_parse_and_display() {
        let key: HookKey = "neovim:post".parse().unwrap();
        assert_eq!(key, HookKey::module("neovim", HookPhase::Post));
        assert_eq!(key.to_string(), "neovim:post");

        let key: HookKey = "host:pre_update".parse().unwrap();
        assert_eq!(key, HookKey::host(HookPhase::PreUpdate));

        for bad in ["neovim", "neovim:later", ":pre", "host:pre", "neovim:pre_sync"] {
            assert!(
                matches!(bad.parse::<HookKey>(), Err(Error::InvalidHookKey(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn runs_once_until_reset() {
        let dir = TempDir::new().unwrap();
        script(dir.path(), "scripts/post.sh");
        let module = module_with_hooks(dir.path(), None, Some(HookDecl::new("scripts/post.sh")));
        let interpreter = MockInterpreter::default();
        let mut ledger = Ledger::in_memory();

        {
            let mut runner = HookRunner::new(&interpreter, &mut ledger, false);
            assert_eq!(runner.run_module(&module, HookPhase::Post).unwrap(), HookOutcome::Ran);
            assert_eq!(
                runner.run_module(&module, HookPhase::Post).unwrap(),
                HookOutcome::AlreadyRun
            );
        }
        assert_eq!(interpreter.runs(), 1);

        ledger.reset("neovim").unwrap();
        let mut runner = HookRunner::new(&interpreter, &mut ledger, false);
        assert_eq!(runner.run_module(&module, HookPhase::Post).unwrap(), HookOutcome::Ran);
        assert_eq!(
            runner.run_module(&module, HookPhase::Post).unwrap(),
            HookOutcome::AlreadyRun
        );
        assert_eq!(interpreter.runs(), 2);
    }

    #[test]
    fn always_hooks_run_every_time_and_are_not_recorded() {
        let dir = TempDir::new().unwrap();
        script(dir.path(), "pre.sh");
        let decl = HookDecl {
            always: true,
            ..HookDecl::new("pre.sh")
        };
        let module = module_with_hooks(dir.path(), Some(decl), None);
        let interpreter = MockInterpreter::default();
        let mut ledger = Ledger::in_memory();

        let mut runner = HookRunner::new(&interpreter, &mut ledger, false);
        for _ in 0..3 {
            assert_eq!(runner.run_module(&module, HookPhase::Pre).unwrap(), HookOutcome::Ran);
        }

        assert_eq!(interpreter.runs(), 3);
        assert!(ledger.record().hooks_run.is_empty());
    }

    #[test]
    fn dry_run_does_not_execute_or_record() {
        let dir = TempDir::new().unwrap();
        script(dir.path(), "pre.sh");
        let module = module_with_hooks(dir.path(), Some(HookDecl::new("pre.sh")), None);
        let interpreter = MockInterpreter::default();
        let mut ledger = Ledger::in_memory();

        let mut runner = HookRunner::new(&interpreter, &mut ledger, true);
        assert_eq!(runner.run_module(&module, HookPhase::Pre).unwrap(), HookOutcome::WouldRun);

        assert_eq!(interpreter.runs(), 0);
        assert!(ledger.record().hooks_run.is_empty());
    }

    #[test]
    fn missing_script_is_not_configured() {
        let dir = TempDir::new().unwrap();
        let module = module_with_hooks(dir.path(), Some(HookDecl::new("absent.sh")), None);
        let interpreter = MockInterpreter::default();
        let mut ledger = Ledger::in_memory();

        let mut runner = HookRunner::new(&interpreter, &mut ledger, false);
        assert_eq!(
            runner.run_module(&module, HookPhase::Pre).unwrap(),
            HookOutcome::NotConfigured
        );
        assert_eq!(
            runner.run_module(&module, HookPhase::Post).unwrap(),
            HookOutcome::NotConfigured
        );
        assert_eq!(interpreter.runs(), 0);
    }

    #[test]
    fn failure_is_reported_and_not_recorded() {
        let dir = TempDir::new().unwrap();
        let path = script(dir.path(), "post.sh");
        let module = module_with_hooks(dir.path(), None, Some(HookDecl::new("post.sh")));
        let interpreter = MockInterpreter::failing(&path, 3);
        let mut ledger = Ledger::in_memory();

        let mut runner = HookRunner::new(&interpreter, &mut ledger, false);
        let err = runner.run_module(&module, HookPhase::Post).unwrap_err();

        match err {
            Error::HookFailed { script, code, .. } => {
                assert_eq!(script, path);
                assert_eq!(code, Some(3));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(ledger.record().hooks_run.is_empty());
    }

    #[test]
    fn failing_hook_is_announced_before_it_runs() {
        let dir = TempDir::new().unwrap();
        let path = script(dir.path(), "post.sh");
        let module = module_with_hooks(dir.path(), None, Some(HookDecl::new("post.sh")));
        let interpreter = MockInterpreter::failing(&path, 1);
        let mut ledger = Ledger::in_memory();
        let mut progress = RecordingProgress::default();

        let mut runner =
            HookRunner::new(&interpreter, &mut ledger, false).with_progress(&mut progress);
        assert!(runner.run_module(&module, HookPhase::Post).is_err());
        drop(runner);

        assert_eq!(progress.events, vec!["hook neovim:post"]);
        assert_eq!(interpreter.runs(), 1);
    }

    #[test]
    fn outcomes_are_reported_to_progress() {
        let dir = TempDir::new().unwrap();
        script(dir.path(), "pre.sh");
        let module = module_with_hooks(dir.path(), Some(HookDecl::new("pre.sh")), None);
        let interpreter = MockInterpreter::default();
        let mut ledger = Ledger::in_memory();
        let mut progress = RecordingProgress::default();

        let mut runner =
            HookRunner::new(&interpreter, &mut ledger, false).with_progress(&mut progress);
        runner.run_module(&module, HookPhase::Pre).unwrap();
        runner.run_module(&module, HookPhase::Pre).unwrap();
        drop(runner);

        assert_eq!(
            progress.events,
            vec!["hook neovim:pre", "hook neovim:pre Ran", "hook neovim:pre AlreadyRun"]
        );
    }

    #[test]
    fn root_hooks_are_elevated() {
        let dir = TempDir::new().unwrap();
        script(dir.path(), "hooks/pre-sync.sh");
        let host = HostConfig {
            hooks: HostHooks {
                pre_sync: Some(HookDecl {
                    root: true,
                    ..HookDecl::new("hooks/pre-sync.sh")
                }),
                ..HostHooks::default()
            },
            ..HostConfig::default()
        }
        .located("laptop", dir.path());
        let interpreter = MockInterpreter::default();
        let mut ledger = Ledger::in_memory();

        let mut runner = HookRunner::new(&interpreter, &mut ledger, false);
        runner.run_host(&host, HookPhase::PreSync).unwrap();

        let calls = interpreter.calls.borrow();
        assert_eq!(calls[0], (dir.path().join("hooks/pre-sync.sh"), true));
        assert!(ledger.has_run(&HookKey::host(HookPhase::PreSync)));
    }

    #[test]
    fn force_run_ignores_ledger() {
        let dir = TempDir::new().unwrap();
        script(dir.path(), "post.sh");
        let module = module_with_hooks(dir.path(), None, Some(HookDecl::new("post.sh")));
        let hook = module_hook(&module, HookPhase::Post).unwrap();
        let interpreter = MockInterpreter::default();
        let mut ledger = Ledger::in_memory();
        ledger.mark_run(&hook.key).unwrap();

        let mut runner = HookRunner::new(&interpreter, &mut ledger, false);
        assert_eq!(runner.run(&hook).unwrap(), HookOutcome::AlreadyRun);
        assert_eq!(runner.force_run(&hook).unwrap(), HookOutcome::Ran);
        assert_eq!(interpreter.runs(), 1);

        let missing = ResolvedHook {
            script: dir.path().join("gone.sh"),
            ..hook
        };
        assert!(matches!(
            runner.force_run(&missing),
            Err(Error::HookNotConfigured(_))
        ));
    }

    #[test]
    fn declared_hooks_and_status() {
        let dir = TempDir::new().unwrap();
        script(dir.path(), "pre.sh");
        let module = module_with_hooks(
            dir.path(),
            Some(HookDecl::new("pre.sh")),
            Some(HookDecl::new("missing.sh")),
        );
        let host = HostConfig::default().located("laptop", dir.path());
        let mut ledger = Ledger::in_memory();

        let hooks = declared_hooks(&host, std::slice::from_ref(&module));
        assert_eq!(hooks.len(), 2);
        assert_eq!(HookStatus::of(&hooks[0], &ledger), HookStatus::Pending);
        assert_eq!(HookStatus::of(&hooks[1], &ledger), HookStatus::Missing);

        ledger.mark_run(&hooks[0].key).unwrap();
        assert_eq!(HookStatus::of(&hooks[0], &ledger), HookStatus::Done);

        let key = HookKey::module("neovim", HookPhase::Pre);
        assert_eq!(find_hook(&key, &host, &[module]), Some(hooks[0].clone()));
        assert!(find_hook(&HookKey::host(HookPhase::PreSync), &host, &[]).is_none());
    }
}
