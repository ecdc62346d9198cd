//! Module lookup by path, plus `import` expansion.
use std::{collections::HashMap, path::PathBuf, rc::Rc};

use anyhow::{anyhow, bail, Context, Result};

use super::ast::Module;
use super::syn::parse_source;

pub mod fs;
pub mod import;
pub mod vdir;

#[cfg(test)]
mod tests;

pub use fs::FilesystemModuleResolver;
pub use import::expand_imports;
pub use vdir::{VirtualDirectory, VirtualDirectoryResolver, VirtualEntry};

/// Maps a module path (`["Modules", "Data"]`) to its parsed module.
pub trait ModuleResolver {
    fn resolve(&mut self, path: &[String]) -> Result<Option<Rc<Module>>>;
}

/// Splits `Modules.Data` or `Modules/Data` into path segments.
pub fn split_path(path: &str) -> Vec<String> {
    path.split(|c| c == '.' || c == '/')
        .filter(|x| !x.is_empty())
        .map(|x| x.to_string())
        .collect()
}

pub fn path_key(path: &[String]) -> String {
    path.join(".")
}

/// Path-keyed store of already resolved modules.
#[derive(Default)]
pub struct ModuleCache {
    modules: HashMap<String, Rc<Module>>,
}
impl ModuleCache {
    pub fn get(&self, path: &[String]) -> Option<Rc<Module>> {
        let out = self.modules.get(&path_key(path)).cloned();
        if out.is_some() {
            tracing::trace!(path = %path_key(path), "module cache hit");
        }
        out
    }
    pub fn insert(&mut self, path: &[String], module: Rc<Module>) {
        self.modules.insert(path_key(path), module);
    }
    pub fn len(&self) -> usize {
        self.modules.len()
    }
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

pub(crate) fn parse_bytes(bytes: &[u8], origin: &str) -> Result<Module> {
    let text = std::str::from_utf8(bytes).with_context(|| format!("{} is not valid UTF-8", origin))?;
    parse_source(text).with_context(|| format!("failed to parse {}", origin))
}

enum ModuleSource {
    Module(Rc<Module>),
    Source(String),
    Bytes(Vec<u8>),
    File(PathBuf),
}

/// In-memory table of modules. Sources and files are parsed on first
/// resolution.
#[derive(Default)]
pub struct MemoryModuleResolver {
    entries: HashMap<String, ModuleSource>,
    cache: ModuleCache,
}
impl MemoryModuleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module under the name it declares.
    pub fn register_module(&mut self, module: Module) -> Result<()> {
        let name = module
            .metadata
            .module_name
            .clone()
            .ok_or_else(|| anyhow!("cannot register an anonymous module"))?;
        self.entries.insert(name, ModuleSource::Module(Rc::new(module)));
        Ok(())
    }
    pub fn register_source(&mut self, name: &str, source: impl Into<String>) {
        self.entries.insert(path_key(&split_path(name)), ModuleSource::Source(source.into()));
    }
    pub fn register_bytes(&mut self, name: &str, bytes: Vec<u8>) {
        self.entries.insert(path_key(&split_path(name)), ModuleSource::Bytes(bytes));
    }
    pub fn register_file(&mut self, name: &str, path: impl Into<PathBuf>) {
        self.entries.insert(path_key(&split_path(name)), ModuleSource::File(path.into()));
    }
}
impl ModuleResolver for MemoryModuleResolver {
    fn resolve(&mut self, path: &[String]) -> Result<Option<Rc<Module>>> {
        if let Some(module) = self.cache.get(path) {
            return Ok(Some(module));
        }
        let key = path_key(path);
        let module = match self.entries.get(&key) {
            None => return Ok(None),
            Some(ModuleSource::Module(module)) => module.clone(),
            Some(ModuleSource::Source(source)) => Rc::new(parse_bytes(source.as_bytes(), &key)?),
            Some(ModuleSource::Bytes(bytes)) => Rc::new(parse_bytes(bytes, &key)?),
            Some(ModuleSource::File(file)) => {
                let bytes = std::fs::read(file)
                    .with_context(|| format!("failed to read {}", file.display()))?;
                Rc::new(parse_bytes(&bytes, &file.display().to_string())?)
            }
        };
        if let Some(name) = &module.metadata.module_name {
            if name != &key {
                bail!("module registered as {} declares itself as {}", key, name);
            }
        }
        self.cache.insert(path, module.clone());
        Ok(Some(module))
    }
}
