use std::{collections::BTreeMap, path::PathBuf, rc::Rc};

use anyhow::{Context, Result};

use super::{parse_bytes, path_key, ModuleCache, ModuleResolver};
use crate::compiler::ast::Module;

pub const MODULE_EXTENSION: &str = "nzsl";

pub enum VirtualEntry {
    /// Blob embedded in the binary.
    Data(&'static [u8]),
    Buffer(Vec<u8>),
    /// Physical file, read when first resolved.
    File(PathBuf),
    Directory(VirtualDirectory),
}

#[derive(Default)]
pub struct VirtualDirectory {
    entries: BTreeMap<String, VirtualEntry>,
}
impl VirtualDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: VirtualEntry) {
        self.entries.insert(name.into(), entry);
    }
    pub fn get(&self, name: &str) -> Option<&VirtualEntry> {
        self.entries.get(name)
    }

    /// Inserts an entry at a slash-separated path, creating intermediate
    /// directories.
    pub fn insert_path(&mut self, path: &str, entry: VirtualEntry) {
        let segs = path.split('/').filter(|x| !x.is_empty()).collect::<Vec<_>>();
        self.insert_segments(&segs, entry);
    }
    fn insert_segments(&mut self, segs: &[&str], entry: VirtualEntry) {
        match segs {
            [] => {}
            [leaf] => self.insert(*leaf, entry),
            [head, rest @ ..] => {
                let next = self
                    .entries
                    .entry(head.to_string())
                    .or_insert_with(|| VirtualEntry::Directory(VirtualDirectory::new()));
                if !matches!(next, VirtualEntry::Directory(_)) {
                    *next = VirtualEntry::Directory(VirtualDirectory::new());
                }
                if let VirtualEntry::Directory(dir) = next {
                    dir.insert_segments(rest, entry);
                }
            }
        }
    }

    fn lookup(&self, path: &[String]) -> Option<&VirtualEntry> {
        let (leaf, dirs) = path.split_last()?;
        let mut dir = self;
        for seg in dirs {
            match dir.entries.get(seg)? {
                VirtualEntry::Directory(x) => dir = x,
                _ => return None,
            }
        }
        dir.entries.get(&format!("{}.{}", leaf, MODULE_EXTENSION))
    }
}

/// Resolves `A.B` to the entry `A/B.nzsl` of a virtual directory tree.
pub struct VirtualDirectoryResolver {
    root: VirtualDirectory,
    cache: ModuleCache,
}
impl VirtualDirectoryResolver {
    pub fn new(root: VirtualDirectory) -> Self {
        Self {
            root,
            cache: ModuleCache::default(),
        }
    }
    pub fn root_mut(&mut self) -> &mut VirtualDirectory {
        &mut self.root
    }
}
impl ModuleResolver for VirtualDirectoryResolver {
    fn resolve(&mut self, path: &[String]) -> Result<Option<Rc<Module>>> {
        if let Some(module) = self.cache.get(path) {
            return Ok(Some(module));
        }
        let origin = path_key(path);
        let module = match self.root.lookup(path) {
            None | Some(VirtualEntry::Directory(_)) => return Ok(None),
            Some(VirtualEntry::Data(data)) => parse_bytes(data, &origin)?,
            Some(VirtualEntry::Buffer(data)) => parse_bytes(data, &origin)?,
            Some(VirtualEntry::File(file)) => {
                let data = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
                parse_bytes(&data, &file.display().to_string())?
            }
        };
        let module = Rc::new(module);
        self.cache.insert(path, module.clone());
        Ok(Some(module))
    }
}
