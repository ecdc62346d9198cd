//! Replaces `import` directives with the imported modules themselves.
use std::collections::HashMap;

use anyhow::Result;

use super::{path_key, ModuleResolver};
use crate::compiler::ast::*;
use crate::compiler::common::{fnv1a_32, Span};
use crate::compiler::error::CompileError;

/// Identifier an imported module is renamed to: `_` followed by the FNV-1a
/// hash of its UUID, or of its name when it has none.
pub fn module_identifier(metadata: &ModuleMetadata, fallback: &str) -> String {
    let hash = match (&metadata.uuid, &metadata.module_name) {
        (Some(uuid), _) => fnv1a_32(uuid.as_bytes()),
        (None, Some(name)) => fnv1a_32(name.as_bytes()),
        (None, None) => fnv1a_32(fallback.as_bytes()),
    };
    format!("_{:08x}", hash)
}

pub struct ImportExpander<'r> {
    resolver: &'r mut dyn ModuleResolver,
    expanded: Vec<ImportedModule>,
    identifiers: HashMap<String, String>,
    stack: Vec<String>,
}
impl<'r> ImportExpander<'r> {
    pub fn new(resolver: &'r mut dyn ModuleResolver) -> Self {
        Self {
            resolver,
            expanded: Vec::new(),
            identifiers: HashMap::new(),
            stack: Vec::new(),
        }
    }

    pub fn expand(mut self, module: &Module) -> Result<Module> {
        let mut out = module.clone();
        let aliases = self.import_all(&module.imports)?;
        out.imports.clear();
        out.imported_modules.extend(self.expanded);
        prepend(&mut out.statements, aliases);
        Ok(out)
    }

    fn import_all(&mut self, imports: &[ImportDirective]) -> Result<Vec<Statement>> {
        let mut aliases = Vec::new();
        for import in imports {
            let identifier = self.import_one(import)?;
            let imported = self
                .expanded
                .iter()
                .find(|x| x.identifier == identifier)
                .map(|x| &x.module);
            if let Some(imported) = imported {
                collect_export_aliases(&identifier, &imported.statements, import.span, &mut aliases);
            }
        }
        Ok(aliases)
    }

    fn import_one(&mut self, import: &ImportDirective) -> Result<String> {
        let key = path_key(&import.path);
        if let Some(identifier) = self.identifiers.get(&key) {
            return Ok(identifier.clone());
        }
        if self.stack.contains(&key) {
            let chain = self.stack.join(" -> ");
            let msg = format!("cyclic import of module {} ({} -> {})", key, chain, key);
            return Err(CompileError::new(msg, import.span).into());
        }
        let resolved = self
            .resolver
            .resolve(&import.path)?
            .ok_or_else(|| CompileError::new(format!("module {} not found", key), import.span))?;

        self.stack.push(key.clone());
        let mut module = (*resolved).clone();
        let aliases = self.import_all(&module.imports)?;
        self.stack.pop();

        let identifier = module_identifier(&module.metadata, &key);
        tracing::debug!(module = %key, identifier = %identifier, "expanded import");

        // Modules that were printed after expansion carry their own blocks.
        self.expanded.append(&mut module.imported_modules);
        module.imports.clear();
        module.metadata.module_name = None;
        prepend(&mut module.statements, aliases);

        self.identifiers.insert(key, identifier.clone());
        self.expanded.push(ImportedModule {
            identifier: identifier.clone(),
            module,
        });
        Ok(identifier)
    }
}

/// Expands every import of `module`, dependencies first.
pub fn expand_imports(module: &Module, resolver: &mut dyn ModuleResolver) -> Result<Module> {
    ImportExpander::new(resolver).expand(module)
}

fn prepend(statements: &mut Vec<Statement>, mut head: Vec<Statement>) {
    if !head.is_empty() {
        head.append(statements);
        *statements = head;
    }
}

fn collect_export_aliases(identifier: &str, stmts: &[Statement], span: Span, out: &mut Vec<Statement>) {
    for stmt in stmts {
        match &stmt.kind {
            StatementKind::DeclareStruct(StructDecl { name, export: true, .. })
            | StatementKind::DeclareFunction(FunctionDecl { name, export: true, .. }) => {
                out.push(make_alias(identifier, name, span));
            }
            StatementKind::Multi(stmts) => collect_export_aliases(identifier, stmts, span, out),
            StatementKind::Conditional(cond) => {
                let mut inner = Vec::new();
                collect_export_aliases(identifier, std::slice::from_ref(&*cond.statement), span, &mut inner);
                for alias in inner {
                    let kind = StatementKind::Conditional(ConditionalStatement {
                        condition: qualify(identifier, &cond.condition),
                        statement: Box::new(alias),
                    });
                    out.push(Statement::new(kind, span));
                }
            }
            _ => {}
        }
    }
}

fn make_alias(identifier: &str, name: &str, span: Span) -> Statement {
    let decl = AliasDecl {
        name: name.to_string(),
        target: TypeExpr::Named(vec![identifier.to_string(), name.to_string()]),
    };
    Statement::new(StatementKind::DeclareAlias(decl), span)
}

/// Rewrites the bare names of a condition so that they refer to the
/// imported module's declarations.
fn qualify(identifier: &str, expr: &Expression) -> Expression {
    let kind = match &expr.kind {
        ExpressionKind::Identifier(name) => ExpressionKind::AccessMember {
            expr: Box::new(Expression::identifier(identifier, expr.span)),
            member: name.clone(),
        },
        ExpressionKind::Binary { op, lhs, rhs } => ExpressionKind::Binary {
            op: *op,
            lhs: Box::new(qualify(identifier, lhs)),
            rhs: Box::new(qualify(identifier, rhs)),
        },
        ExpressionKind::Unary { op, expr: inner } => ExpressionKind::Unary {
            op: *op,
            expr: Box::new(qualify(identifier, inner)),
        },
        ExpressionKind::Conditional {
            condition,
            true_expr,
            false_expr,
        } => ExpressionKind::Conditional {
            condition: Box::new(qualify(identifier, condition)),
            true_expr: Box::new(qualify(identifier, true_expr)),
            false_expr: Box::new(qualify(identifier, false_expr)),
        },
        x => x.clone(),
    };
    Expression::new(kind, expr.span)
}
