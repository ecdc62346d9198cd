use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    rc::Rc,
};

use anyhow::{anyhow, bail, Context, Result};

use super::vdir::MODULE_EXTENSION;
use super::{parse_bytes, path_key, split_path, ModuleResolver};
use crate::compiler::ast::Module;

/// Modules found on disk, indexed by the name each file declares. Files
/// are parsed when registered.
#[derive(Default)]
pub struct FilesystemModuleResolver {
    modules: HashMap<String, Rc<Module>>,
}
impl FilesystemModuleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses every `*.nzsl` file below `dir`, without following symlinked
    /// directories. Files that fail to parse or declare an already
    /// registered name are logged and skipped. Returns the number of
    /// registered modules.
    pub fn register_directory(&mut self, dir: impl AsRef<Path>) -> Result<usize> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        collect_files(dir, &mut files).with_context(|| format!("failed to scan {}", dir.display()))?;
        files.sort();

        let mut count = 0;
        for file in files {
            match self.register_file(&file) {
                Ok(()) => count += 1,
                Err(e) => tracing::warn!(file = %file.display(), "skipped module: {:#}", e),
            }
        }
        tracing::debug!(dir = %dir.display(), count, "registered module directory");
        Ok(count)
    }

    pub fn register_file(&mut self, file: impl AsRef<Path>) -> Result<()> {
        let file = file.as_ref();
        let data = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
        let module = parse_bytes(&data, &file.display().to_string())?;
        self.register_module(module)
    }

    pub fn register_source(&mut self, source: &str) -> Result<()> {
        let module = parse_bytes(source.as_bytes(), "<source>")?;
        self.register_module(module)
    }

    /// Fails when another module already uses the same name.
    pub fn register_module(&mut self, module: Module) -> Result<()> {
        let name = module
            .metadata
            .module_name
            .clone()
            .ok_or_else(|| anyhow!("module has no name and cannot be imported"))?;
        let key = path_key(&split_path(&name));
        if self.modules.contains_key(&key) {
            bail!("module {} is already registered", name);
        }
        self.modules.insert(key, Rc::new(module));
        Ok(())
    }
}
impl ModuleResolver for FilesystemModuleResolver {
    fn resolve(&mut self, path: &[String]) -> Result<Option<Rc<Module>>> {
        Ok(self.modules.get(&path_key(path)).cloned())
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, out)?;
        } else if path.extension().map_or(false, |x| x == MODULE_EXTENSION) {
            out.push(path);
        }
    }
    Ok(())
}
