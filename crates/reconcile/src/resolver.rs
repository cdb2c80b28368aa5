//! Flattening a host's modules into declared sets
//!
//! Modules are visited in the order the host lists them. Whenever the same
//! item is declared more than once (a package, a service key) the first
//! declaration wins and keeps its position.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::dotfiles::{ModuleDotfiles, resolve_module_dotfiles};
use crate::error::{Error, Result};
use crate::hooks::{ResolvedHook, declared_hooks};
use crate::types::{HostConfig, Module, ServiceSpec};

/// Where modules are loaded from
pub trait ModuleSource {
    /// Load a module by name. `Ok(None)` means the module does not exist.
    fn load_module(&self, name: &str) -> Result<Option<Module>>;
}

impl ModuleSource for BTreeMap<String, Module> {
    fn load_module(&self, name: &str) -> Result<Option<Module>> {
        Ok(self.get(name).cloned())
    }
}

/// Keep the first item for each key, preserving order
pub fn stable_dedup_by_key<T, K, F>(items: impl IntoIterator<Item = T>, key: F) -> Vec<T>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    let mut seen = BTreeSet::new();
    items.into_iter().filter(|item| seen.insert(key(item))).collect()
}

/// A listed module whose file exists but could not be loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidModule {
    pub name: String,
    pub reason: String,
}

/// The active host with its modules loaded
#[derive(Debug, Clone)]
pub struct Declarations {
    pub host: HostConfig,
    /// Loaded modules in host order, each at most once
    pub modules: Vec<Module>,
    missing: Vec<String>,
    invalid: Vec<InvalidModule>,
}

impl Declarations {
    /// Load every module the host lists. Modules that do not exist or fail
    /// to load are recorded rather than treated as an error, so read-only
    /// callers can still report on the rest.
    pub fn resolve(host: HostConfig, source: &dyn ModuleSource) -> Self {
        let names = stable_dedup_by_key(host.modules.iter().cloned(), Clone::clone);
        let mut modules = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        let mut invalid = Vec::new();

        for name in names {
            match source.load_module(&name) {
                Ok(Some(module)) => modules.push(module),
                Ok(None) => {
                    log::debug!("Module {name} not found");
                    missing.push(name);
                }
                Err(e) => {
                    log::debug!("Module {name} failed to load: {e}");
                    invalid.push(InvalidModule {
                        name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Self {
            host,
            modules,
            missing,
            invalid,
        }
    }

    /// Host-listed modules that do not exist
    pub fn missing_modules(&self) -> &[String] {
        &self.missing
    }

    /// Host-listed modules that exist but could not be loaded
    pub fn invalid_modules(&self) -> &[InvalidModule] {
        &self.invalid
    }

    /// Refuse to continue when any listed module is missing or invalid.
    /// Mutating operations call this before doing anything.
    pub fn ensure_complete(&self) -> Result<()> {
        if !self.missing.is_empty() {
            Err(Error::MissingModules(self.missing.clone()))
        } else if !self.invalid.is_empty() {
            Err(Error::InvalidModules(self.invalid.clone()))
        } else {
            Ok(())
        }
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Declared packages in first-seen order
    pub fn packages(&self) -> Vec<String> {
        stable_dedup_by_key(
            self.modules
                .iter()
                .flat_map(|m| m.decl.packages.iter().cloned()),
            Clone::clone,
        )
    }

    /// Declared services, one per `(name, scope)`, first declaration wins
    pub fn services(&self) -> Vec<ServiceSpec> {
        stable_dedup_by_key(
            self.modules
                .iter()
                .flat_map(|m| m.decl.services.iter().cloned()),
            ServiceSpec::key,
        )
    }

    /// Dotfile links of every module, in module order
    pub fn dotfiles(&self, home: &Path) -> Result<ModuleDotfiles> {
        let mut all = ModuleDotfiles::default();
        for module in &self.modules {
            let resolved = resolve_module_dotfiles(module, home)?;
            all.links.extend(resolved.links);
            all.warnings.extend(resolved.warnings);
        }
        Ok(all)
    }

    /// Every declared hook, host first
    pub fn hooks(&self) -> Vec<ResolvedHook> {
        declared_hooks(&self.host, &self.modules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ModuleDecl, ServiceScope};

    fn module(name: &str, packages: &[&str], services: Vec<ServiceSpec>) -> (String, Module) {
        let decl = ModuleDecl {
            packages: packages.iter().map(ToString::to_string).collect(),
            services,
            ..ModuleDecl::default()
        };
        (name.to_string(), Module::new(name, format!("/mods/{name}"), decl))
    }

    fn host(modules: &[&str]) -> HostConfig {
        HostConfig {
            modules: modules.iter().map(ToString::to_string).collect(),
            ..HostConfig::default()
        }
        .located("laptop", "/cfg")
    }

    fn source() -> BTreeMap<String, Module> {
        BTreeMap::from([
            module("base", &["base", "git"], vec![ServiceSpec::new("sshd", ServiceScope::System, true)]),
            module(
                "editor",
                &["neovim", "git", "ripgrep"],
                vec![
                    ServiceSpec::new("sshd.service", ServiceScope::System, false),
                    ServiceSpec::new("sshd", ServiceScope::User, true),
                ],
            ),
        ])
    }

    #[test]
    fn packages_keep_first_seen_order() {
        let decls = Declarations::resolve(host(&["base", "editor"]), &source());
        assert_eq!(decls.packages(), vec!["base", "git", "neovim", "ripgrep"]);

        let decls = Declarations::resolve(host(&["editor", "base"]), &source());
        assert_eq!(decls.packages(), vec!["neovim", "git", "ripgrep", "base"]);
    }

    #[test]
    fn services_dedup_by_name_and_scope() {
        let decls = Declarations::resolve(host(&["base", "editor"]), &source());
        let services = decls.services();

        assert_eq!(services.len(), 2);
        assert_eq!(services[0], ServiceSpec::new("sshd", ServiceScope::System, true));
        assert_eq!(services[1].scope, ServiceScope::User);
    }

    #[test]
    fn missing_modules_are_reported_not_fatal() {
        let decls =
            Declarations::resolve(host(&["base", "desktop", "base", "gaming"]), &source());

        assert_eq!(decls.modules.len(), 1);
        assert_eq!(decls.missing_modules(), ["desktop", "gaming"]);
        assert_eq!(decls.packages(), vec!["base", "git"]);
        assert!(matches!(
            decls.ensure_complete(),
            Err(Error::MissingModules(ref names)) if names.len() == 2
        ));
    }

    #[test]
    fn unloadable_modules_are_reported_not_fatal() {
        struct Flaky(BTreeMap<String, Module>);

        impl ModuleSource for Flaky {
            fn load_module(&self, name: &str) -> Result<Option<Module>> {
                if name == "broken" {
                    return Err(Error::Declaration {
                        path: "/mods/broken/module.yaml".into(),
                        message: "expected a mapping".into(),
                    });
                }
                self.0.load_module(name)
            }
        }

        let decls = Declarations::resolve(host(&["base", "broken"]), &Flaky(source()));

        assert_eq!(decls.modules.len(), 1);
        assert!(decls.missing_modules().is_empty());
        assert_eq!(decls.invalid_modules()[0].name, "broken");
        assert_eq!(decls.packages(), vec!["base", "git"]);
        assert!(matches!(
            decls.ensure_complete(),
            Err(Error::InvalidModules(ref modules)) if modules.len() == 1
        ));
    }

    #[test]
    fn complete_host_passes() {
        let decls = Declarations::resolve(host(&["base"]), &source());
        assert!(decls.ensure_complete().is_ok());
        assert!(decls.module("base").is_some());
        assert!(decls.module("editor").is_none());
    }
}
