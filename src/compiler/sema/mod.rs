//! Scope and type resolution. `analyze` walks a module once, resolves every
//! identifier against a scope stack and computes the type of every
//! expression node. Results are keyed by node address, so an `Analysis`
//! borrows the module it describes.
use std::collections::{HashMap, HashSet};

use anyhow::{bail, Result};

use crate::compiler::ast::*;
use crate::compiler::common::Span;
use crate::compiler::error::CompileError;

pub mod decl;
pub mod layout;
pub mod scope;
pub mod types;

#[cfg(test)]
mod tests;

pub use decl::{AliasTarget, DeclKind, Declaration, ExternalInfo, FieldInfo, FunctionInfo, StructInfo};
pub use scope::ScopeStack;
pub use types::ExpressionType;

/// Index into the declaration arena.
pub type DeclId = usize;

/// Options are stored in a 64-bit set.
pub const MAX_OPTIONS: usize = 64;

fn fail<T>(span: Span, msg: impl Into<String>) -> Result<T> {
    Err(CompileError::new(msg, span).into())
}

fn key<T>(x: &T) -> *const T {
    x as *const T
}

#[derive(Default)]
struct NodeMaps {
    types: HashMap<*const Expression, ExpressionType>,
    bindings: HashMap<*const Expression, DeclId>,
    fields: HashMap<*const Expression, (DeclId, usize)>,
    structs: HashMap<*const StructDecl, DeclId>,
    functions: HashMap<*const FunctionDecl, DeclId>,
    variables: HashMap<*const VariableDecl, DeclId>,
    params: HashMap<*const Parameter, DeclId>,
    externals: HashMap<*const ExternalVar, DeclId>,
    consts: HashMap<*const ConstDecl, DeclId>,
    options: HashMap<*const OptionDecl, DeclId>,
    aliases: HashMap<*const AliasDecl, DeclId>,
}

/// Resolved view of one module.
pub struct Analysis<'a> {
    module: &'a Module,
    decls: Vec<Declaration<'a>>,
    maps: NodeMaps,
    options: Vec<DeclId>,
    namespaces: Vec<HashMap<String, DeclId>>,
}
impl<'a> Analysis<'a> {
    pub fn module(&self) -> &'a Module {
        self.module
    }
    pub fn declarations(&self) -> &[Declaration<'a>] {
        &self.decls
    }
    pub fn decl(&self, id: DeclId) -> &Declaration<'a> {
        &self.decls[id]
    }

    /// Memoized type of an analyzed expression.
    pub fn type_of(&self, expr: &Expression) -> Result<ExpressionType> {
        match self.maps.types.get(&key(expr)) {
            Some(x) => Ok(x.clone()),
            None => fail(expr.span, "expression was not part of the analyzed module"),
        }
    }
    /// Declaration an identifier (or a module member access) refers to.
    /// Aliases are already followed.
    pub fn binding(&self, expr: &Expression) -> Option<DeclId> {
        self.maps.bindings.get(&key(expr)).copied()
    }
    /// Struct and field index selected by a member access.
    pub fn field_of(&self, expr: &Expression) -> Option<(DeclId, usize)> {
        self.maps.fields.get(&key(expr)).copied()
    }

    pub fn struct_id(&self, decl: &StructDecl) -> Option<DeclId> {
        self.maps.structs.get(&key(decl)).copied()
    }
    pub fn function_id(&self, decl: &FunctionDecl) -> Option<DeclId> {
        self.maps.functions.get(&key(decl)).copied()
    }
    pub fn variable_id(&self, decl: &VariableDecl) -> Option<DeclId> {
        self.maps.variables.get(&key(decl)).copied()
    }
    pub fn param_id(&self, param: &Parameter) -> Option<DeclId> {
        self.maps.params.get(&key(param)).copied()
    }
    pub fn external_id(&self, var: &ExternalVar) -> Option<DeclId> {
        self.maps.externals.get(&key(var)).copied()
    }
    pub fn const_id(&self, decl: &ConstDecl) -> Option<DeclId> {
        self.maps.consts.get(&key(decl)).copied()
    }
    pub fn option_id(&self, decl: &OptionDecl) -> Option<DeclId> {
        self.maps.options.get(&key(decl)).copied()
    }
    pub fn alias_id(&self, decl: &AliasDecl) -> Option<DeclId> {
        self.maps.aliases.get(&key(decl)).copied()
    }

    pub fn struct_info(&self, id: DeclId) -> Option<&StructInfo<'a>> {
        self.decls.get(id).and_then(|x| x.as_struct())
    }
    pub fn function_info(&self, id: DeclId) -> Option<&FunctionInfo<'a>> {
        self.decls.get(id).and_then(|x| x.as_function())
    }
    /// Resolved type of a declared variable, parameter or constant.
    pub fn decl_type(&self, id: DeclId) -> Option<ExpressionType> {
        self.decls.get(id).and_then(|x| x.value_type(id))
    }

    /// Option declarations in bit order.
    pub fn options(&self) -> &[DeclId] {
        &self.options
    }
    /// Bits of every option declared under `name`, in any module.
    pub fn option_bits(&self, name: &str) -> Vec<usize> {
        self.options
            .iter()
            .enumerate()
            .filter(|(_, id)| self.decls[**id].name == name)
            .map(|(i, _)| i)
            .collect()
    }

    /// Top-level declaration `name` of imported module `index`.
    pub fn module_member(&self, index: usize, name: &str) -> Option<DeclId> {
        self.namespaces.get(index).and_then(|x| x.get(name)).copied()
    }

    /// Functions tagged with `[entry(..)]`, in declaration order.
    pub fn entry_points(&self) -> Vec<DeclId> {
        self.decls
            .iter()
            .enumerate()
            .filter(|(_, x)| matches!(&x.kind, DeclKind::Function(f) if f.decl.entry.is_some()))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Resolves every identifier and type of `module`.
pub fn analyze(module: &Module) -> Result<Analysis<'_>> {
    let out = Analyzer::new(module).apply()?;
    tracing::debug!(
        declarations = out.decls.len(),
        expressions = out.maps.types.len(),
        "analyzed module"
    );
    Ok(out)
}

struct Analyzer<'a> {
    out: Analysis<'a>,
    scope: ScopeStack,
    current_module: Option<usize>,
    module_depth: usize,
    return_type: Option<ExpressionType>,
}
impl<'a> Analyzer<'a> {
    fn new(module: &'a Module) -> Self {
        Self {
            out: Analysis {
                module,
                decls: Vec::new(),
                maps: NodeMaps::default(),
                options: Vec::new(),
                namespaces: vec![HashMap::new(); module.imported_modules.len()],
            },
            scope: ScopeStack::new(),
            current_module: None,
            module_depth: 0,
            return_type: None,
        }
    }

    fn apply(mut self) -> Result<Analysis<'a>> {
        let module = self.out.module;
        self.scope.push();
        for (i, imported) in module.imported_modules.iter().enumerate() {
            let id = self.add_decl(&imported.identifier, Span::call_site(), DeclKind::Module(i));
            self.declare(&imported.identifier, id, false, Span::call_site())?;
        }
        for (i, imported) in module.imported_modules.iter().enumerate() {
            self.current_module = Some(i);
            self.module_scope(&imported.module.statements)?;
        }
        self.current_module = None;
        self.module_scope(&module.statements)?;
        self.scope.pop();
        Ok(self.out)
    }

    fn add_decl(&mut self, name: &str, span: Span, kind: DeclKind<'a>) -> DeclId {
        self.out.decls.push(Declaration {
            name: name.to_string(),
            module: self.current_module,
            local: self.return_type.is_some(),
            span,
            kind,
        });
        self.out.decls.len() - 1
    }

    fn declare(&mut self, name: &str, id: DeclId, conditional: bool, span: Span) -> Result<()> {
        if let Err(prev) = self.scope.define(name, id, conditional) {
            let prev = &self.out.decls[prev];
            let msg = format!("{} is already declared as a {} in this scope", name, prev.kind_name());
            return fail(span, msg);
        }
        if let Some(index) = self.current_module {
            if self.scope.depth() == self.module_depth {
                self.out.namespaces[index].insert(name.to_string(), id);
            }
        }
        Ok(())
    }

    fn module_scope(&mut self, stmts: &'a [Statement]) -> Result<()> {
        self.scope.push();
        self.module_depth = self.scope.depth();

        let mut hoisted = Vec::new();
        for stmt in stmts {
            self.hoist(stmt, false, &mut hoisted)?;
        }
        for id in &hoisted {
            if matches!(self.out.decls[*id].kind, DeclKind::Alias(..)) {
                self.follow_alias(*id)?;
            }
        }
        for id in &hoisted {
            self.resolve_signature(*id)?;
        }
        for id in &hoisted {
            self.check_struct_cycle(*id)?;
        }
        for stmt in stmts {
            self.statement(stmt, false)?;
        }

        self.scope.pop();
        Ok(())
    }

    /// Pre-registers top-level structs, functions and aliases so they can be
    /// used before their declaration.
    fn hoist(&mut self, stmt: &'a Statement, conditional: bool, out: &mut Vec<DeclId>) -> Result<()> {
        match &stmt.kind {
            StatementKind::DeclareStruct(decl) => {
                let info = StructInfo {
                    decl,
                    fields: Vec::new(),
                };
                let id = self.add_decl(&decl.name, stmt.span, DeclKind::Struct(info));
                self.out.maps.structs.insert(key(decl), id);
                self.declare(&decl.name, id, conditional, stmt.span)?;
                out.push(id);
            }
            StatementKind::DeclareFunction(decl) => {
                let info = FunctionInfo {
                    decl,
                    params: Vec::new(),
                    return_type: ExpressionType::NoType,
                };
                let id = self.add_decl(&decl.name, stmt.span, DeclKind::Function(info));
                self.out.maps.functions.insert(key(decl), id);
                self.declare(&decl.name, id, conditional, stmt.span)?;
                out.push(id);
            }
            StatementKind::DeclareAlias(decl) => {
                let id = self.add_decl(&decl.name, stmt.span, DeclKind::Alias(decl, None));
                self.out.maps.aliases.insert(key(decl), id);
                self.declare(&decl.name, id, conditional, stmt.span)?;
                out.push(id);
            }
            StatementKind::Multi(stmts) => {
                for stmt in stmts {
                    self.hoist(stmt, conditional, out)?;
                }
            }
            StatementKind::Conditional(cond) => self.hoist(&cond.statement, true, out)?,
            _ => {}
        }
        Ok(())
    }

    /// Resolves struct field types and function signatures.
    fn resolve_signature(&mut self, id: DeclId) -> Result<()> {
        let span = self.out.decls[id].span;
        match self.out.decls[id].kind.clone() {
            DeclKind::Struct(info) => {
                let fields = self.struct_fields(info.decl)?;
                if let DeclKind::Struct(info) = &mut self.out.decls[id].kind {
                    info.fields = fields;
                }
            }
            DeclKind::Function(info) => {
                let mut params = Vec::new();
                for param in &info.decl.params {
                    let ty = self.resolve_type(&param.ty, param.span)?;
                    let param_id = self.add_decl(&param.name, param.span, DeclKind::Parameter(ty));
                    self.out.maps.params.insert(key(param), param_id);
                    params.push(param_id);
                }
                let return_type = match &info.decl.return_type {
                    Some(ty) => self.resolve_type(ty, span)?,
                    None => ExpressionType::NoType,
                };
                if let DeclKind::Function(info) = &mut self.out.decls[id].kind {
                    info.params = params;
                    info.return_type = return_type;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn struct_fields(&mut self, decl: &'a StructDecl) -> Result<Vec<FieldInfo>> {
        let mut fields = Vec::<FieldInfo>::new();
        for field in &decl.fields {
            if field.cond.is_none() && fields.iter().any(|x| x.name == field.name) {
                return fail(field.span, format!("field {} is declared twice in {}", field.name, decl.name));
            }
            let ty = self.resolve_type(&field.ty, field.span)?;
            if matches!(
                ty,
                ExpressionType::Sampler(..) | ExpressionType::Uniform(_) | ExpressionType::Storage(_)
            ) {
                return fail(field.span, format!("{} cannot be stored in a struct", ty));
            }
            fields.push(FieldInfo {
                name: field.name.clone(),
                ty,
                location: field.location,
                builtin: field.builtin,
            });
        }
        Ok(fields)
    }

    /// Rejects a struct that holds itself by value, directly or through
    /// other structs and arrays.
    fn check_struct_cycle(&self, root: DeclId) -> Result<()> {
        let mut seen = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(info) = self.out.struct_info(id) else {
                continue;
            };
            for field in &info.fields {
                let Some(inner) = field.ty.stored_struct() else {
                    continue;
                };
                if inner == root {
                    let decl = &self.out.decls[root];
                    return fail(decl.span, format!("struct {} contains itself", decl.name));
                }
                if seen.insert(inner) {
                    stack.push(inner);
                }
            }
        }
        Ok(())
    }

    /// Follows an alias chain to a non-alias declaration or a plain type,
    /// rejecting cycles.
    fn follow_alias(&mut self, id: DeclId) -> Result<AliasTarget> {
        let mut cur = id;
        for _ in 0..=self.out.decls.len() {
            let next = match &self.out.decls[cur].kind {
                DeclKind::Alias(_, Some(AliasTarget::Type(ty))) => {
                    let target = AliasTarget::Type(ty.clone());
                    self.set_alias_target(id, target.clone());
                    return Ok(target);
                }
                DeclKind::Alias(_, Some(AliasTarget::Decl(next))) => *next,
                DeclKind::Alias(decl, None) => {
                    let decl: &'a AliasDecl = *decl;
                    let span = self.out.decls[cur].span;
                    match &decl.target {
                        TypeExpr::Named(path) => self.lookup_path(path, span)?,
                        ty => {
                            let ty = self.resolve_type(ty, span)?;
                            let target = AliasTarget::Type(ty);
                            self.set_alias_target(cur, target.clone());
                            self.set_alias_target(id, target.clone());
                            return Ok(target);
                        }
                    }
                }
                _ => {
                    let target = AliasTarget::Decl(cur);
                    if cur != id {
                        self.set_alias_target(id, target.clone());
                    }
                    return Ok(target);
                }
            };
            cur = next;
        }
        let decl = &self.out.decls[id];
        fail(decl.span, format!("alias {} is part of a cycle", decl.name))
    }

    fn set_alias_target(&mut self, id: DeclId, target: AliasTarget) {
        if let DeclKind::Alias(_, slot) = &mut self.out.decls[id].kind {
            *slot = Some(target);
        }
    }

    /// Looks up a possibly module-qualified name. The result may be an alias.
    fn lookup_path(&mut self, path: &[String], span: Span) -> Result<DeclId> {
        let Some((first, rest)) = path.split_first() else {
            return fail(span, "empty path");
        };
        let mut id = match self.scope.lookup(first) {
            Some(x) => x,
            None => return fail(span, format!("unknown identifier {}", first)),
        };
        for seg in rest {
            id = match self.follow_alias(id)? {
                AliasTarget::Decl(x) => x,
                AliasTarget::Type(_) => return fail(span, format!("{} is not a module", path.join("."))),
            };
            let index = match &self.out.decls[id].kind {
                DeclKind::Module(x) => *x,
                _ => return fail(span, format!("{} is not a module", self.out.decls[id].name)),
            };
            id = match self.out.namespaces[index].get(seg) {
                Some(x) => *x,
                None => return fail(span, format!("module {} has no member {}", self.out.decls[id].name, seg)),
            };
        }
        Ok(id)
    }

    fn resolve_type(&mut self, ty: &TypeExpr, span: Span) -> Result<ExpressionType> {
        let out = match ty {
            TypeExpr::Primitive(x) => ExpressionType::Primitive(*x),
            TypeExpr::Vector { base, count } => {
                if !(2..=4).contains(count) {
                    return fail(span, format!("vector must have 2 to 4 components, found {}", count));
                }
                ExpressionType::Vector(*base, *count)
            }
            TypeExpr::Matrix { base, columns, rows } => {
                if !(2..=4).contains(columns) || !(2..=4).contains(rows) || !base.is_float() {
                    return fail(span, format!("invalid matrix type {}", ty));
                }
                ExpressionType::Matrix(*base, *columns, *rows)
            }
            TypeExpr::Array { element, length } => {
                if *length == 0 {
                    return fail(span, "array length must be positive");
                }
                let element = self.resolve_type(element, span)?;
                ExpressionType::Array(Box::new(element), *length)
            }
            TypeExpr::Sampler { dim, sampled } => ExpressionType::Sampler(*dim, *sampled),
            TypeExpr::Uniform(inner) | TypeExpr::Storage(inner) => {
                let inner_ty = self.resolve_type(inner, span)?;
                let Some(id) = inner_ty.struct_id().filter(|_| inner_ty.is_struct()) else {
                    return fail(span, format!("{} expects a struct, found {}", ty, inner_ty));
                };
                match ty {
                    TypeExpr::Uniform(_) => ExpressionType::Uniform(id),
                    _ => ExpressionType::Storage(id),
                }
            }
            TypeExpr::Named(path) => {
                let id = self.lookup_path(path, span)?;
                match self.follow_alias(id)? {
                    AliasTarget::Type(ty) => ty,
                    AliasTarget::Decl(id) => match &self.out.decls[id].kind {
                        DeclKind::Struct(_) => ExpressionType::Struct(id),
                        _ => {
                            let decl = &self.out.decls[id];
                            return fail(span, format!("{} is a {}, not a type", path.join("."), decl.kind_name()));
                        }
                    },
                }
            }
        };
        Ok(out)
    }

    fn statement(&mut self, stmt: &'a Statement, conditional: bool) -> Result<()> {
        let span = stmt.span;
        match &stmt.kind {
            StatementKind::DeclareStruct(decl) => {
                for field in &decl.fields {
                    if let Some(cond) = &field.cond {
                        self.condition(cond)?;
                    }
                }
                if !self.out.maps.structs.contains_key(&key(decl)) {
                    let fields = self.struct_fields(decl)?;
                    let id = self.add_decl(&decl.name, span, DeclKind::Struct(StructInfo { decl, fields }));
                    self.out.maps.structs.insert(key(decl), id);
                    self.declare(&decl.name, id, conditional, span)?;
                }
            }
            StatementKind::DeclareFunction(decl) => self.function_body(decl, span)?,
            StatementKind::DeclareAlias(decl) => {
                if !self.out.maps.aliases.contains_key(&key(decl)) {
                    let id = self.add_decl(&decl.name, span, DeclKind::Alias(decl, None));
                    self.follow_alias(id)?;
                    self.out.maps.aliases.insert(key(decl), id);
                    self.declare(&decl.name, id, conditional, span)?;
                }
            }
            StatementKind::DeclareExternal(decl) => {
                for var in &decl.vars {
                    let ty = self.resolve_type(&var.ty, var.span)?;
                    if !matches!(
                        ty,
                        ExpressionType::Uniform(_) | ExpressionType::Storage(_) | ExpressionType::Sampler(..)
                    ) {
                        return fail(var.span, format!("external {} cannot have type {}", var.name, ty));
                    }
                    let info = ExternalInfo {
                        var,
                        set: var.set.or(decl.set).unwrap_or(0),
                        ty,
                    };
                    let id = self.add_decl(&var.name, var.span, DeclKind::External(info));
                    self.out.maps.externals.insert(key(var), id);
                    self.declare(&var.name, id, conditional, var.span)?;
                }
            }
            StatementKind::DeclareOption(decl) => {
                let ty = self.resolve_type(&decl.ty, span)?;
                if ty != ExpressionType::BOOL {
                    return fail(span, format!("option {} must be a bool, found {}", decl.name, ty));
                }
                if let Some(default) = &decl.default {
                    let default_ty = self.expr(default)?;
                    if default_ty != ty {
                        let msg = format!("option {} is declared as {} but its default value is {}", decl.name, ty, default_ty);
                        return fail(default.span, msg);
                    }
                }
                let index = self.out.options.len();
                if index >= MAX_OPTIONS {
                    return fail(span, format!("too many options, at most {} are supported", MAX_OPTIONS));
                }
                let id = self.add_decl(&decl.name, span, DeclKind::Option(decl, index));
                self.out.options.push(id);
                self.out.maps.options.insert(key(decl), id);
                self.declare(&decl.name, id, conditional, span)?;
            }
            StatementKind::DeclareConst(decl) => {
                let value_ty = self.expr(&decl.value)?;
                if let Some(ty) = &decl.ty {
                    let ty = self.resolve_type(ty, span)?;
                    if ty != value_ty {
                        return fail(span, format!("const {} is declared as {} but its value is {}", decl.name, ty, value_ty));
                    }
                }
                let id = self.add_decl(&decl.name, span, DeclKind::Const(decl, value_ty));
                self.out.maps.consts.insert(key(decl), id);
                self.declare(&decl.name, id, conditional, span)?;
            }
            StatementKind::DeclareVariable(decl) => {
                let init_ty = decl.init.as_ref().map(|x| self.expr(x)).transpose()?;
                let ty = match (&decl.ty, init_ty) {
                    (Some(ty), init_ty) => {
                        let ty = self.resolve_type(ty, span)?;
                        if let Some(init_ty) = init_ty {
                            if init_ty != ty {
                                let msg = format!("variable {} is declared as {} but initialized with {}", decl.name, ty, init_ty);
                                return fail(span, msg);
                            }
                        }
                        ty
                    }
                    (None, Some(init_ty)) => init_ty,
                    (None, None) => return fail(span, format!("variable {} needs a type or an initializer", decl.name)),
                };
                if !matches!(
                    ty,
                    ExpressionType::Primitive(_)
                        | ExpressionType::Vector(..)
                        | ExpressionType::Matrix(..)
                        | ExpressionType::Array(..)
                        | ExpressionType::Struct(_)
                ) {
                    return fail(span, format!("variable {} cannot have type {}", decl.name, ty));
                }
                let id = self.add_decl(&decl.name, span, DeclKind::Variable(ty));
                self.out.maps.variables.insert(key(decl), id);
                self.declare(&decl.name, id, conditional, span)?;
            }
            StatementKind::Branch(branch) => {
                for (cond, arm) in &branch.cond_statements {
                    self.condition(cond)?;
                    self.statement(arm, false)?;
                }
                if let Some(arm) = &branch.else_statement {
                    self.statement(arm, false)?;
                }
            }
            StatementKind::Conditional(cond) => {
                self.condition(&cond.condition)?;
                self.statement(&cond.statement, true)?;
            }
            StatementKind::Multi(stmts) => {
                for stmt in stmts {
                    self.statement(stmt, conditional)?;
                }
            }
            StatementKind::Scoped(stmts) => {
                self.scope.push();
                for stmt in stmts {
                    self.statement(stmt, false)?;
                }
                self.scope.pop();
            }
            StatementKind::Expression(expr) => {
                self.expr(expr)?;
            }
            StatementKind::Discard => {
                if self.return_type.is_none() {
                    return fail(span, "discard outside of a function");
                }
            }
            StatementKind::Return(value) => {
                let Some(expected) = self.return_type.clone() else {
                    return fail(span, "return outside of a function");
                };
                let found = match value {
                    Some(x) => self.expr(x)?,
                    None => ExpressionType::NoType,
                };
                if found != expected {
                    return fail(span, format!("function returns {} but {} was returned", expected, found));
                }
            }
        }
        Ok(())
    }

    fn condition(&mut self, expr: &'a Expression) -> Result<()> {
        let ty = self.expr(expr)?;
        if ty != ExpressionType::BOOL {
            return fail(expr.span, format!("condition must be a bool, found {}", ty));
        }
        Ok(())
    }

    fn function_body(&mut self, decl: &'a FunctionDecl, span: Span) -> Result<()> {
        let Some(id) = self.out.maps.functions.get(&key(decl)).copied() else {
            return fail(span, format!("function {} must be declared at module scope", decl.name));
        };
        let Some(info) = self.out.decls[id].as_function().cloned() else {
            bail!("function {} has no signature", decl.name);
        };

        self.scope.push();
        for (param, param_id) in decl.params.iter().zip(&info.params) {
            self.declare(&param.name, *param_id, false, param.span)?;
        }
        let prev = self.return_type.replace(info.return_type.clone());
        for stmt in &decl.body {
            self.statement(stmt, false)?;
        }
        self.return_type = prev;
        self.scope.pop();
        Ok(())
    }

    /// Value declaration bound to `id`, with aliases followed.
    fn value_decl(&mut self, id: DeclId, name: &str, span: Span) -> Result<(DeclId, ExpressionType)> {
        let id = match self.follow_alias(id)? {
            AliasTarget::Decl(x) => x,
            AliasTarget::Type(ty) => return fail(span, format!("{} names the type {}, not a value", name, ty)),
        };
        let decl = &self.out.decls[id];
        match decl.value_type(id) {
            Some(ty) => Ok((id, ty)),
            None => fail(span, format!("{} is a {}, not a value", name, decl.kind_name())),
        }
    }

    fn expr(&mut self, expr: &'a Expression) -> Result<ExpressionType> {
        if let Some(ty) = self.out.maps.types.get(&key(expr)) {
            return Ok(ty.clone());
        }
        let ty = self.expr_impl(expr)?;
        self.out.maps.types.insert(key(expr), ty.clone());
        Ok(ty)
    }

    fn expr_impl(&mut self, expr: &'a Expression) -> Result<ExpressionType> {
        use ExpressionType as T;

        let span = expr.span;
        let out = match &expr.kind {
            ExpressionKind::Constant(value) => T::of_constant(value),
            ExpressionKind::Identifier(name) => {
                let Some(id) = self.scope.lookup(name) else {
                    return fail(span, format!("unknown identifier {}", name));
                };
                let (id, ty) = self.value_decl(id, name, span)?;
                self.out.maps.bindings.insert(key(expr), id);
                ty
            }
            ExpressionKind::Binary { op, lhs, rhs } => {
                let lhs = self.expr(lhs)?;
                let rhs = self.expr(rhs)?;
                types::binary_type(*op, &lhs, &rhs).or_else(|e| fail(span, e))?
            }
            ExpressionKind::Unary { op, expr: inner } => {
                let ty = self.expr(inner)?;
                types::unary_type(*op, &ty).or_else(|e| fail(span, e))?
            }
            ExpressionKind::Assign { op, lhs, rhs } => {
                let lhs_ty = self.expr(lhs)?;
                let rhs_ty = self.expr(rhs)?;
                if let Some(op) = op.binary_op() {
                    let ty = types::binary_type(op, &lhs_ty, &rhs_ty).or_else(|e| fail(span, e))?;
                    if ty != lhs_ty {
                        return fail(span, format!("cannot assign {} to {}", ty, lhs_ty));
                    }
                }
                lhs_ty
            }
            ExpressionKind::Cast { target, args } => {
                let target = self.resolve_type(target, span)?;
                let args = args.iter().map(|x| self.expr(x)).collect::<Result<Vec<_>>>()?;
                types::cast_type(target, &args).or_else(|e| fail(span, e))?
            }
            ExpressionKind::AccessMember { expr: inner, member } => {
                let ty = self.expr(inner)?;
                self.member_type(expr, &ty, member)?
            }
            ExpressionKind::AccessIndex { expr: inner, index } => {
                let ty = self.expr(inner)?;
                let index_ty = self.expr(index)?;
                if !index_ty.is_integer_scalar() {
                    return fail(index.span, format!("index must be an integer, found {}", index_ty));
                }
                match ty {
                    T::Array(element, _) => *element,
                    T::Vector(base, _) => T::Primitive(base),
                    T::Matrix(base, _, rows) => T::Vector(base, rows),
                    _ => return fail(span, format!("{} cannot be indexed", ty)),
                }
            }
            ExpressionKind::Swizzle { expr: inner, components } => {
                let ty = self.expr(inner)?;
                self.swizzle_type(&ty, components, span)?
            }
            ExpressionKind::CallFunction { callee, args } => {
                let callee_ty = self.expr(callee)?;
                let args_ty = args.iter().map(|x| self.expr(x)).collect::<Result<Vec<_>>>()?;
                match callee_ty {
                    T::Function(id) => {
                        let Some(info) = self.out.decls[id].as_function() else {
                            return fail(span, "call target is not a function");
                        };
                        let params = info
                            .params
                            .iter()
                            .map(|x| self.out.decls[*x].value_type(*x).unwrap_or(T::NoType))
                            .collect::<Vec<_>>();
                        if params != args_ty {
                            let name = &self.out.decls[id].name;
                            let msg = format!(
                                "function {} expects {} arguments of types ({}), found ({})",
                                name,
                                params.len(),
                                join_types(&params),
                                join_types(&args_ty)
                            );
                            return fail(span, msg);
                        }
                        info.return_type.clone()
                    }
                    T::Method(receiver, IntrinsicType::SampleTexture) => {
                        types::sample_type(&receiver, &args_ty).or_else(|e| fail(span, e))?
                    }
                    ty => return fail(span, format!("{} is not callable", ty)),
                }
            }
            ExpressionKind::Intrinsic { intrinsic, args } => {
                let args = args.iter().map(|x| self.expr(x)).collect::<Result<Vec<_>>>()?;
                types::intrinsic_type(*intrinsic, &args).or_else(|e| fail(span, e))?
            }
            ExpressionKind::Conditional {
                condition,
                true_expr,
                false_expr,
            } => {
                self.condition(condition)?;
                let a = self.expr(true_expr)?;
                let b = self.expr(false_expr)?;
                if a != b {
                    return fail(span, format!("const_select branches differ: {} and {}", a, b));
                }
                a
            }
        };
        Ok(out)
    }

    fn member_type(&mut self, expr: &'a Expression, ty: &ExpressionType, member: &str) -> Result<ExpressionType> {
        use ExpressionType as T;

        let span = expr.span;
        let out = match ty {
            T::Struct(id) | T::Uniform(id) | T::Storage(id) => {
                let Some(info) = self.out.decls[*id].as_struct() else {
                    return fail(span, "member access on a non-struct");
                };
                let Some(index) = info.field_index(member) else {
                    let name = &self.out.decls[*id].name;
                    return fail(span, format!("struct {} has no field {}", name, member));
                };
                let field_ty = info.fields[index].ty.clone();
                self.out.maps.fields.insert(key(expr), (*id, index));
                field_ty
            }
            T::Primitive(_) | T::Vector(..) => match types::parse_swizzle(member) {
                Some(components) => self.swizzle_type(ty, &components, span)?,
                None => return fail(span, format!("{} has no member {}", ty, member)),
            },
            T::Sampler(..) if member == IntrinsicType::SampleTexture.name() => {
                T::Method(Box::new(ty.clone()), IntrinsicType::SampleTexture)
            }
            T::Module(index) => {
                let Some(id) = self.out.namespaces[*index].get(member).copied() else {
                    let name = &self.out.module.imported_modules[*index].identifier;
                    return fail(span, format!("module {} has no member {}", name, member));
                };
                let (id, ty) = self.value_decl(id, member, span)?;
                self.out.maps.bindings.insert(key(expr), id);
                ty
            }
            _ => return fail(span, format!("{} has no member {}", ty, member)),
        };
        Ok(out)
    }

    fn swizzle_type(&self, ty: &ExpressionType, components: &[u32], span: Span) -> Result<ExpressionType> {
        let (base, count) = match ty {
            ExpressionType::Primitive(x) => (*x, 1),
            ExpressionType::Vector(x, n) => (*x, *n),
            _ => return fail(span, format!("cannot swizzle {}", ty)),
        };
        if components.is_empty() || components.len() > 4 {
            return fail(span, "swizzle must select 1 to 4 components");
        }
        if let Some(x) = components.iter().find(|x| **x >= count) {
            return fail(span, format!("component {} is out of range for {}", x, ty));
        }
        Ok(ExpressionType::scalar_or_vector(base, components.len() as u32))
    }
}

fn join_types(tys: &[ExpressionType]) -> String {
    tys.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(", ")
}
