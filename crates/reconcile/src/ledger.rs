//! Persisted reconciliation ledger
//!
//! One record holds the facts that cannot be recovered from the live system:
//! which hooks have already run, and which services this tool enabled. Every
//! mutating call writes the record back immediately so an interrupted run
//! leaves the ledger matching exactly the work that completed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::hooks::HookKey;
use crate::types::ServiceKey;

/// On-disk shape of the ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Hook keys (`owner:phase`) that completed successfully
    #[serde(default)]
    pub hooks_run: BTreeMap<String, bool>,

    /// Service keys (`name|scope`) enabled by this tool
    #[serde(default)]
    pub tracked_services: BTreeMap<String, bool>,

    /// Last time the ledger was written
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Where a ledger record is loaded from and saved to
pub trait LedgerStore {
    /// Load the record. A store with nothing saved yields the default record.
    fn load(&self) -> Result<LedgerRecord>;

    /// Replace the stored record
    fn save(&self, record: &LedgerRecord) -> Result<()>;
}

/// TOML file store
#[derive(Debug, Clone)]
pub struct FileLedgerStore {
    path: PathBuf,
}

impl FileLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerStore for FileLedgerStore {
    fn load(&self) -> Result<LedgerRecord> {
        if !self.path.exists() {
            log::debug!("Ledger {} does not exist, starting empty", self.path.display());
            return Ok(LedgerRecord::default());
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| Error::fs("read ledger", &self.path, e))?;
        if content.trim().is_empty() {
            log::debug!("Ledger {} is empty, starting empty", self.path.display());
            return Ok(LedgerRecord::default());
        }

        let record = toml::from_str(&content).map_err(|e| Error::LedgerParse {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        log::debug!("Loaded ledger from {}", self.path.display());
        Ok(record)
    }

    fn save(&self, record: &LedgerRecord) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| Error::fs("create ledger directory", dir, e))?;
        }

        let content =
            toml::to_string_pretty(record).map_err(|e| Error::LedgerSerialize(e.to_string()))?;

        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, content).map_err(|e| Error::fs("write ledger", &tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| Error::fs("replace ledger", &self.path, e))?;

        log::debug!("Saved ledger to {}", self.path.display());
        Ok(())
    }
}

/// In-memory store; clones share the same slot
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    slot: Rc<RefCell<Option<LedgerRecord>>>,
    saves: Rc<RefCell<usize>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a record
    pub fn with_record(record: LedgerRecord) -> Self {
        let store = Self::default();
        *store.slot.borrow_mut() = Some(record);
        store
    }

    /// Last saved record, if any
    pub fn snapshot(&self) -> Option<LedgerRecord> {
        self.slot.borrow().clone()
    }

    /// Number of times `save` was called
    pub fn save_count(&self) -> usize {
        *self.saves.borrow()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&self) -> Result<LedgerRecord> {
        Ok(self.slot.borrow().clone().unwrap_or_default())
    }

    fn save(&self, record: &LedgerRecord) -> Result<()> {
        *self.slot.borrow_mut() = Some(record.clone());
        *self.saves.borrow_mut() += 1;
        Ok(())
    }
}

/// The loaded ledger, threaded through the service reconciler and hook runner
pub struct Ledger {
    store: Box<dyn LedgerStore>,
    record: LedgerRecord,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").field("record", &self.record).finish_non_exhaustive()
    }
}

impl Ledger {
    /// Load the ledger once for this invocation
    pub fn open(store: impl LedgerStore + 'static) -> Result<Self> {
        let record = store.load()?;
        Ok(Self {
            store: Box::new(store),
            record,
        })
    }

    /// Empty ledger backed by a fresh in-memory store
    pub fn in_memory() -> Self {
        Self {
            store: Box::new(MemoryLedgerStore::new()),
            record: LedgerRecord::default(),
        }
    }

    pub fn record(&self) -> &LedgerRecord {
        &self.record
    }

    fn persist(&mut self) -> Result<()> {
        self.record.last_updated = Some(Utc::now());
        self.store.save(&self.record)
    }

    // ========================================================================
    // Hooks
    // ========================================================================

    pub fn has_run(&self, key: &HookKey) -> bool {
        self.record
            .hooks_run
            .get(&key.to_string())
            .copied()
            .unwrap_or(false)
    }

    /// Record a successful hook run and persist
    pub fn mark_run(&mut self, key: &HookKey) -> Result<()> {
        self.record.hooks_run.insert(key.to_string(), true);
        log::debug!("Ledger: hook {key} marked as run");
        self.persist()
    }

    /// Forget hook runs. `owner:phase` removes that key; a bare owner removes
    /// every key of that owner. Returns the removed keys.
    pub fn reset(&mut self, selector: &str) -> Result<Vec<String>> {
        let removed: Vec<String> = if selector.contains(':') {
            self.record
                .hooks_run
                .remove_entry(selector)
                .map(|(k, _)| k)
                .into_iter()
                .collect()
        } else {
            let prefix = format!("{selector}:");
            let keys: Vec<String> = self
                .record
                .hooks_run
                .keys()
                .filter(|k| k.starts_with(&prefix))
                .cloned()
                .collect();
            for k in &keys {
                self.record.hooks_run.remove(k);
            }
            keys
        };

        if !removed.is_empty() {
            log::debug!("Ledger: reset {}", removed.join(", "));
            self.persist()?;
        }
        Ok(removed)
    }

    // ========================================================================
    // Services
    // ========================================================================

    pub fn is_tracked(&self, key: &ServiceKey) -> bool {
        self.record
            .tracked_services
            .get(&key.to_string())
            .copied()
            .unwrap_or(false)
    }

    /// Tracked services in ledger order. Entries that do not parse are skipped.
    pub fn tracked_services(&self) -> Vec<ServiceKey> {
        self.record
            .tracked_services
            .iter()
            .filter(|(_, tracked)| **tracked)
            .filter_map(|(raw, _)| match raw.parse::<ServiceKey>() {
                Ok(key) => Some(key),
                Err(e) => {
                    log::warn!("Ignoring ledger entry: {e}");
                    None
                }
            })
            .collect()
    }

    /// Record that this tool enabled a service, and persist
    pub fn track(&mut self, key: &ServiceKey) -> Result<()> {
        self.record.tracked_services.insert(key.to_string(), true);
        self.persist()
    }

    /// Forget a tracked service, and persist
    pub fn untrack(&mut self, key: &ServiceKey) -> Result<()> {
        if self.record.tracked_services.remove(&key.to_string()).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    /// Replace the tracked set with exactly `keys`, and persist
    pub fn replace_tracked<'a>(
        &mut self,
        keys: impl IntoIterator<Item = &'a ServiceKey>,
    ) -> Result<()> {
        self.record.tracked_services = keys
            .into_iter()
            .map(|k| (k.to_string(), true))
            .collect();
        self.persist()
    }
}
