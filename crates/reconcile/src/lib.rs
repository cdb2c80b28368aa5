//! # Reconcile
//!
//! The engine behind hostform: turns a host's module declarations into the
//! smallest set of changes that brings a machine into line.
//!
//! ## Components
//!
//! - [`Declarations`]: loads the host's modules and flattens them into
//!   declared packages, services, dotfile links and hooks
//! - [`PackagePlan`]: declared packages versus installed and orphaned ones
//! - [`ServicePlan`]: declared services versus live state and the ledger
//! - [`dotfiles`]: link resolution, conflict detection and convergence
//! - [`HookRunner`]: run-once (or `always`) lifecycle scripts
//! - [`Ledger`]: persisted hook runs and tracked services
//! - [`converge::sync`]: the phase sequence that ties them together
//!
//! Side effects go through the traits in [`context`], so every component can
//! be exercised against in-memory backends.
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{AutoConfirm, Declarations, FileLedgerStore, Ledger, NoPrivilege, NoProgress};
//! use reconcile::converge::{self, SyncContext, SyncOptions};
//!
//! let decls = Declarations::resolve(host, &modules);
//! let mut ledger = Ledger::open(FileLedgerStore::new(ledger_path))?;
//! let mut ctx = SyncContext {
//!     packages: &pacman,
//!     services: &systemd,
//!     interpreter: &bash,
//!     progress: &mut NoProgress,
//!     confirm: &mut AutoConfirm,
//!     privilege: &mut NoPrivilege,
//! };
//! converge::sync(&decls, &home, &mut ledger, &mut ctx, &SyncOptions::default())?;
//! ```

pub mod context;
pub mod converge;
pub mod dotfiles;
pub mod error;
pub mod hooks;
pub mod ledger;
pub mod packages;
pub mod resolver;
pub mod services;
pub mod types;

// Re-export main types at crate root
pub use context::{
    AutoConfirm, AutoDecline, ConfirmCallback, HookInterpreter, NoPrivilege, NoProgress,
    PackageBackend, PrivilegeProvider, ProgressCallback, ServiceBackend,
};
pub use converge::{SyncContext, SyncOptions, SyncPhase};
pub use dotfiles::{Conflict, DotfileLink, LinkAction, LinkState, SyncReport};
pub use error::{Error, Result};
pub use hooks::{HookKey, HookOutcome, HookPhase, HookRunner, HookStatus, ResolvedHook};
pub use ledger::{FileLedgerStore, Ledger, LedgerStore, MemoryLedgerStore};
pub use packages::{PackagePlan, parse_package_list, resolve_prune_mode};
pub use resolver::{Declarations, InvalidModule, ModuleSource};
pub use services::{DisableReason, ServicePlan, undeclared_enabled};
pub use types::{
    DotfilesDecl, HookDecl, HostConfig, Module, ModuleDecl, ServiceKey, ServiceScope, ServiceSpec,
};
