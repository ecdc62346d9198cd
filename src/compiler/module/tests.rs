use std::rc::Rc;

use pretty_assertions::assert_eq;

use super::import::module_identifier;
use super::*;
use crate::compiler::ast::{StatementKind, TypeExpr};
use crate::compiler::error::CompileError;

const DATA_MODULE: &str = r#"
[nzsl_version("1.0")]
[uuid("ad3aed6e-0619-4a26-b5ce-abc2ec0836c4")]
module Modules.Data;

[export]
struct Data { value: f32 }

struct Private { value: f32 }
"#;

const MAIN_MODULE: &str = r#"
[nzsl_version("1.0")]
module;

import Modules.Data;

external
{
    [set(0), binding(0)] block: uniform[Data]
}
"#;

fn path(text: &str) -> Vec<String> {
    split_path(text)
}

#[test]
fn test_split_path() {
    assert_eq!(path("Modules.Data"), vec!["Modules", "Data"]);
    assert_eq!(path("Modules/Data"), vec!["Modules", "Data"]);
    assert_eq!(path_key(&path("A/B.C")), "A.B.C");
}

#[test]
fn test_memory_resolver_caches() {
    let mut resolver = MemoryModuleResolver::new();
    resolver.register_source("Modules.Data", DATA_MODULE);
    let a = resolver.resolve(&path("Modules.Data")).unwrap().unwrap();
    let b = resolver.resolve(&path("Modules/Data")).unwrap().unwrap();
    assert!(Rc::ptr_eq(&a, &b));
    assert_eq!(a.metadata.module_name.as_deref(), Some("Modules.Data"));
    assert!(resolver.resolve(&path("Modules.Missing")).unwrap().is_none());
}

#[test]
fn test_memory_resolver_rejects_mismatched_name() {
    let mut resolver = MemoryModuleResolver::new();
    resolver.register_bytes("Other.Name", DATA_MODULE.as_bytes().to_vec());
    assert!(resolver.resolve(&path("Other.Name")).is_err());
}

#[test]
fn test_virtual_directory_resolver() {
    let mut root = VirtualDirectory::new();
    root.insert_path("Modules/Data.nzsl", VirtualEntry::Data(DATA_MODULE.as_bytes()));
    root.insert_path("Modules/Broken.nzsl", VirtualEntry::Buffer(b"module".to_vec()));
    let mut resolver = VirtualDirectoryResolver::new(root);

    let module = resolver.resolve(&path("Modules.Data")).unwrap().unwrap();
    assert_eq!(module.statements.len(), 2);
    assert!(resolver.resolve(&path("Modules")).unwrap().is_none());
    assert!(resolver.resolve(&path("Modules.Missing")).unwrap().is_none());
    assert!(resolver.resolve(&path("Modules.Broken")).is_err());
}

#[test]
fn test_filesystem_resolver_skips_broken_files() {
    let dir = std::env::temp_dir().join(format!("nzslc-modules-{}", std::process::id()));
    let nested = dir.join("nested");
    std::fs::create_dir_all(&nested).unwrap();
    std::fs::write(nested.join("data.nzsl"), DATA_MODULE).unwrap();
    std::fs::write(dir.join("broken.nzsl"), "[nzsl_version(\"1.0\")] module Broken; struct").unwrap();
    std::fs::write(dir.join("notes.txt"), "not a module").unwrap();

    let mut resolver = FilesystemModuleResolver::new();
    let count = resolver.register_directory(&dir).unwrap();
    std::fs::remove_dir_all(&dir).unwrap();

    assert_eq!(count, 1);
    assert!(resolver.resolve(&path("Modules.Data")).unwrap().is_some());
    assert!(resolver.resolve(&path("Broken")).unwrap().is_none());
}

#[test]
fn test_filesystem_resolver_rejects_duplicate_names() {
    let mut resolver = FilesystemModuleResolver::new();
    resolver.register_source(DATA_MODULE).unwrap();
    let first = resolver.resolve(&path("Modules.Data")).unwrap().unwrap();
    let err = resolver.register_source(DATA_MODULE).unwrap_err();
    assert_eq!(err.to_string(), "module Modules.Data is already registered");
    let again = resolver.resolve(&path("Modules.Data")).unwrap().unwrap();
    assert!(Rc::ptr_eq(&first, &again));
}

#[cfg(unix)]
#[test]
fn test_filesystem_resolver_ignores_symlinked_directories() {
    let dir = std::env::temp_dir().join(format!("nzslc-symlinks-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("data.nzsl"), DATA_MODULE).unwrap();
    std::os::unix::fs::symlink(&dir, dir.join("loop")).unwrap();

    let mut resolver = FilesystemModuleResolver::new();
    let count = resolver.register_directory(&dir);
    std::fs::remove_dir_all(&dir).unwrap();

    assert_eq!(count.unwrap(), 1);
    assert!(resolver.resolve(&path("Modules.Data")).unwrap().is_some());
}

#[test]
fn test_expand_imports_inserts_aliases() {
    let mut resolver = MemoryModuleResolver::new();
    resolver.register_source("Modules.Data", DATA_MODULE);
    let main = crate::compiler::syn::parse_source(MAIN_MODULE).unwrap();
    let expanded = expand_imports(&main, &mut resolver).unwrap();

    let data = resolver.resolve(&path("Modules.Data")).unwrap().unwrap();
    let identifier = module_identifier(&data.metadata, "Modules.Data");
    assert_eq!(identifier.len(), 9);
    assert!(identifier.starts_with('_'));

    assert!(expanded.imports.is_empty());
    assert_eq!(expanded.imported_modules.len(), 1);
    assert_eq!(expanded.imported_modules[0].identifier, identifier);
    assert_eq!(expanded.imported_modules[0].module.metadata.module_name, None);
    match &expanded.statements[0].kind {
        StatementKind::DeclareAlias(alias) => {
            assert_eq!(alias.name, "Data");
            assert_eq!(alias.target, TypeExpr::Named(vec![identifier.clone(), "Data".to_string()]));
        }
        x => panic!("unexpected {:?}", x),
    }
    // Only exported declarations are aliased.
    assert_eq!(expanded.statements.len(), main.statements.len() + 1);
}

#[test]
fn test_transitive_imports_come_first() {
    let mut resolver = MemoryModuleResolver::new();
    resolver.register_source("Base", "[nzsl_version(\"1.0\")] module Base; [export] fn one() -> f32 { return 1.0; }");
    resolver.register_source(
        "Middle",
        "[nzsl_version(\"1.0\")] module Middle; import Base; [export] fn two() -> f32 { return one() + one(); }",
    );
    let main = crate::compiler::syn::parse_source("[nzsl_version(\"1.0\")] module; import Middle; import Base;").unwrap();
    let expanded = expand_imports(&main, &mut resolver).unwrap();

    let ids = expanded
        .imported_modules
        .iter()
        .map(|x| x.identifier.clone())
        .collect::<Vec<_>>();
    let base = format!("_{:08x}", crate::compiler::common::fnv1a_32(b"Base"));
    let middle = format!("_{:08x}", crate::compiler::common::fnv1a_32(b"Middle"));
    assert_eq!(ids, vec![base.clone(), middle]);

    // Middle sees Base through an alias of its own.
    let middle_stmts = &expanded.imported_modules[1].module.statements;
    assert!(matches!(&middle_stmts[0].kind, StatementKind::DeclareAlias(x) if x.name == "one"));
    assert_eq!(expanded.statements.len(), 2);
}

#[test]
fn test_cyclic_import() {
    let mut resolver = MemoryModuleResolver::new();
    resolver.register_source("A", "[nzsl_version(\"1.0\")] module A; import B;");
    resolver.register_source("B", "[nzsl_version(\"1.0\")] module B; import A;");
    let main = crate::compiler::syn::parse_source("[nzsl_version(\"1.0\")] module; import A;").unwrap();
    let err = expand_imports(&main, &mut resolver).unwrap_err();
    assert!(err.to_string().contains("cyclic import"));
}

#[test]
fn test_missing_import() {
    let mut resolver = MemoryModuleResolver::new();
    let main = crate::compiler::syn::parse_source("[nzsl_version(\"1.0\")] module;\nimport Nowhere;").unwrap();
    let err = expand_imports(&main, &mut resolver).unwrap_err();
    let err = err.downcast_ref::<CompileError>().unwrap();
    assert_eq!(err.message, "module Nowhere not found");
    assert_eq!(err.span.map(|x| x.start.line), Some(2));
}
