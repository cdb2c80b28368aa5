//! Loading declarations from the config directory
//!
//! Host and module files are YAML. An empty file is treated as an empty
//! declaration. Commands that edit these files go through [`YamlDoc`], which
//! rewrites the whole mapping: comments and key order are not preserved.

use anyhow::{Context, Result, bail};
use reconcile::hooks::HOST_OWNER;
use reconcile::{HostConfig, Module, ModuleDecl, ModuleSource};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::paths;

/// Interpreter used for hook scripts unless `config.yaml` names another
pub const DEFAULT_INTERPRETER: &str = "bash";

/// `config.yaml`
#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    /// Active host name
    #[serde(default)]
    pub host: Option<String>,

    /// Hook interpreter
    #[serde(default)]
    pub interpreter: Option<String>,
}

impl AppConfig {
    pub fn interpreter(&self) -> &str {
        self.interpreter.as_deref().unwrap_or(DEFAULT_INTERPRETER)
    }
}

/// The config directory and everything under it
#[derive(Debug, Clone)]
pub struct ConfigRoot {
    pub dir: PathBuf,
}

impl ConfigRoot {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Config root from the environment (see [`paths::config_dir`])
    pub fn discover() -> Result<Self> {
        Ok(Self::new(paths::config_dir()?))
    }

    /// Load `config.yaml`; a missing file yields defaults
    pub fn app_config(&self) -> Result<AppConfig> {
        let path = paths::app_config_file(&self.dir);
        if !path.exists() {
            log::debug!("{} does not exist, using defaults", path.display());
            return Ok(AppConfig::default());
        }
        read_yaml(&path)
    }

    /// Host from `--host`, else `config.yaml`
    pub fn select_host(&self, flag: Option<&str>, app: &AppConfig) -> Result<String> {
        if let Some(host) = flag.or(app.host.as_deref()) {
            return Ok(host.to_string());
        }
        bail!(
            "No host selected. Pass --host or set `host:` in {}",
            paths::app_config_file(&self.dir).display()
        )
    }

    /// Load `hosts/<name>.yaml`
    pub fn load_host(&self, name: &str) -> Result<HostConfig> {
        let path = paths::host_file(&self.dir, name);
        if !path.exists() {
            bail!("Host file not found: {}", path.display());
        }
        let host: HostConfig = read_yaml(&path)?;
        Ok(host.located(name, &self.dir))
    }

    pub fn modules(&self) -> ModuleDir {
        ModuleDir::new(paths::modules_dir(&self.dir))
    }
}

/// `modules/`: one directory per module, each with a `module.yaml`
#[derive(Debug, Clone)]
pub struct ModuleDir {
    root: PathBuf,
}

impl ModuleDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn module_file(&self, name: &str) -> PathBuf {
        self.root.join(name).join("module.yaml")
    }

    /// Create `<name>/module.yaml` with empty package and service lists.
    /// Returns `false` if the module already exists.
    pub fn create(&self, name: &str) -> Result<bool> {
        if !is_valid_module_name(name) {
            bail!("'{name}' is not a valid module name");
        }
        let path = self.module_file(name);
        if path.exists() {
            return Ok(false);
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        fs::write(&path, MODULE_TEMPLATE)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(true)
    }

    /// Names of every module on disk, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read {}", self.root.display()))?
        {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.module_file(&name).is_file() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

impl ModuleSource for ModuleDir {
    fn load_module(&self, name: &str) -> reconcile::Result<Option<Module>> {
        let path = self.module_file(name);
        if !is_valid_module_name(name) {
            return Err(reconcile::Error::Declaration {
                path,
                message: format!("'{name}' is not a valid module name"),
            });
        }
        if !path.is_file() {
            return Ok(None);
        }

        let decl: ModuleDecl = read_yaml(&path).map_err(|e| reconcile::Error::Declaration {
            path: path.clone(),
            message: format!("{e:#}"),
        })?;
        Ok(Some(Module::new(name, self.root.join(name), decl)))
    }
}

const MODULE_TEMPLATE: &str = "packages: []\nservices: []\n";

/// Module names become directory names and hook owners
fn is_valid_module_name(name: &str) -> bool {
    !name.is_empty() && name != HOST_OWNER && !name.contains('/') && name != "." && name != ".."
}

fn read_yaml<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yaml::from_str(&content).with_context(|| format!("Invalid YAML in {}", path.display()))
}

// ============================================================================
// Editing
// ============================================================================

/// A YAML mapping file opened for editing
pub struct YamlDoc {
    path: PathBuf,
    map: Mapping,
}

impl YamlDoc {
    /// Open `path`; a missing or empty file is an empty mapping
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let map = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => Mapping::new(),
            Ok(content) => serde_yaml::from_str(&content)
                .with_context(|| format!("{} is not a YAML mapping", path.display()))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Mapping::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Could not read {}", path.display()));
            }
        };
        Ok(Self { path, map })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// String entries of the list under `key`
    pub fn strings(&self, key: &str) -> Vec<String> {
        self.map
            .get(key)
            .and_then(Value::as_sequence)
            .map(|seq| {
                seq.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Append each item the list under `key` does not already hold.
    /// Returns how many were added.
    pub fn append_unique(
        &mut self,
        key: &str,
        items: impl IntoIterator<Item = Value>,
    ) -> Result<usize> {
        let seq = self.sequence_mut(key)?;
        let mut added = 0;
        for item in items {
            if !seq.contains(&item) {
                seq.push(item);
                added += 1;
            }
        }
        Ok(added)
    }

    /// Drop string entries equal to one of `names`. Returns the names removed.
    pub fn remove_strings(&mut self, key: &str, names: &[String]) -> Result<Vec<String>> {
        let seq = self.sequence_mut(key)?;
        let mut removed = Vec::new();
        seq.retain(|item| match item.as_str() {
            Some(s) if names.iter().any(|n| n == s) => {
                removed.push(s.to_string());
                false
            }
            _ => true,
        });
        Ok(removed)
    }

    fn sequence_mut(&mut self, key: &str) -> Result<&mut Vec<Value>> {
        let entry = self
            .map
            .entry(Value::from(key))
            .or_insert(Value::Sequence(Vec::new()));
        if entry.is_null() {
            *entry = Value::Sequence(Vec::new());
        }
        match entry {
            Value::Sequence(seq) => Ok(seq),
            _ => bail!("`{key}` in {} is not a list", self.path.display()),
        }
    }

    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let content = serde_yaml::to_string(&self.map)
            .with_context(|| format!("Failed to serialize {}", self.path.display()))?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}
