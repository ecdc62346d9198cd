//! Specialization of a module for one option set: constant folding and
//! removal of branches decided at compile time. The input module is left
//! untouched and a new one is returned.
use std::collections::HashMap;

use anyhow::{bail, Result};

use crate::compiler::ast::*;
use crate::compiler::common::{ConstantValue, Span};
use crate::compiler::error::CompileError;
use crate::compiler::sema::{types::parse_swizzle, Analysis, DeclId, DeclKind, ExpressionType, MAX_OPTIONS};

pub mod fold;

#[cfg(test)]
mod tests;

/// Enabled options, one bit per option declaration in declaration order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct OptionSet(u64);
impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }
    pub fn bits(&self) -> u64 {
        self.0
    }
    pub fn set(&mut self, index: usize, enabled: bool) {
        if index < MAX_OPTIONS {
            if enabled {
                self.0 |= 1 << index;
            } else {
                self.0 &= !(1 << index);
            }
        }
    }
    pub fn is_set(&self, index: usize) -> bool {
        index < MAX_OPTIONS && self.0 & (1 << index) != 0
    }

    /// Options set to their declared default value. Options without one
    /// are disabled.
    pub fn defaults(analysis: &Analysis) -> Result<Self> {
        let mut out = Self::new();
        for (bit, id) in analysis.options().iter().enumerate() {
            let DeclKind::Option(decl, _) = &analysis.decl(*id).kind else {
                continue;
            };
            let Some(default) = &decl.default else {
                continue;
            };
            let value = Optimizer::new(analysis, Self::new()).lower_expr(default)?;
            match value.as_constant().and_then(|x| x.as_bool()) {
                Some(x) => out.set(bit, x),
                None => {
                    let msg = format!("default value of option {} is not a compile-time constant", decl.name);
                    return Err(CompileError::new(msg, default.span).into());
                }
            }
        }
        Ok(out)
    }

    /// Starts from the defaults and applies each of `names`: `Name` enables
    /// the options declared under it, `Name=true` and `Name=false` set them.
    pub fn from_names<S: AsRef<str>>(analysis: &Analysis, names: &[S]) -> Result<Self> {
        let mut out = Self::defaults(analysis)?;
        for name in names {
            let (name, enabled) = match name.as_ref().split_once('=') {
                Some((name, "true")) => (name, true),
                Some((name, "false")) => (name, false),
                Some((name, value)) => bail!("invalid value {} for option {}", value, name),
                None => (name.as_ref(), true),
            };
            let bits = analysis.option_bits(name);
            if bits.is_empty() {
                bail!("unknown option {}", name);
            }
            for bit in bits {
                out.set(bit, enabled);
            }
        }
        Ok(out)
    }
}

/// Folds `module` for `options`. `analysis` must describe `module`.
pub fn optimize(module: &Module, analysis: &Analysis, options: OptionSet) -> Result<Module> {
    let out = Optimizer::new(analysis, options).apply(module)?;
    tracing::debug!(options = options.bits(), "optimized module");
    Ok(out)
}

pub struct Optimizer<'a, 'b> {
    analysis: &'b Analysis<'a>,
    options: OptionSet,
    consts: HashMap<DeclId, ConstantValue>,
}
impl<'a, 'b> Optimizer<'a, 'b> {
    pub fn new(analysis: &'b Analysis<'a>, options: OptionSet) -> Self {
        Self {
            analysis,
            options,
            consts: HashMap::new(),
        }
    }

    pub fn apply(mut self, module: &Module) -> Result<Module> {
        let imported_modules = module
            .imported_modules
            .iter()
            .map(|x| {
                let statements = self.lower_stmts(&x.module.statements)?;
                let module = Module {
                    statements,
                    ..x.module.clone()
                };
                Ok(ImportedModule {
                    identifier: x.identifier.clone(),
                    module,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let statements = self.lower_stmts(&module.statements)?;
        Ok(Module {
            metadata: module.metadata.clone(),
            imports: module.imports.clone(),
            imported_modules,
            statements,
        })
    }

    fn lower_stmts(&mut self, stmts: &[Statement]) -> Result<Vec<Statement>> {
        stmts
            .iter()
            .filter_map(|x| self.lower_stmt(x).transpose())
            .collect()
    }

    /// Compile-time value of a condition, if it folds to a bool.
    fn fold_condition(&mut self, expr: &Expression) -> Result<(Expression, Option<bool>)> {
        let expr = self.lower_expr(expr)?;
        let value = expr.as_constant().and_then(|x| x.as_bool());
        Ok((expr, value))
    }

    fn lower_stmt(&mut self, stmt: &Statement) -> Result<Option<Statement>> {
        let span = stmt.span;
        let kind = match &stmt.kind {
            StatementKind::DeclareStruct(decl) => {
                let mut fields = Vec::new();
                for field in &decl.fields {
                    match &field.cond {
                        Some(cond) => match self.fold_condition(cond)?.1 {
                            Some(true) => fields.push(StructField {
                                cond: None,
                                ..field.clone()
                            }),
                            Some(false) => {}
                            None => {
                                let msg = format!("condition of field {} is not a compile-time constant", field.name);
                                return Err(CompileError::new(msg, cond.span).into());
                            }
                        },
                        None => fields.push(field.clone()),
                    }
                }
                StatementKind::DeclareStruct(StructDecl {
                    fields,
                    ..decl.clone()
                })
            }
            StatementKind::DeclareFunction(decl) => StatementKind::DeclareFunction(FunctionDecl {
                body: self.lower_stmts(&decl.body)?,
                ..decl.clone()
            }),
            StatementKind::DeclareVariable(decl) => StatementKind::DeclareVariable(VariableDecl {
                init: decl.init.as_ref().map(|x| self.lower_expr(x)).transpose()?,
                ..decl.clone()
            }),
            StatementKind::DeclareConst(decl) => StatementKind::DeclareConst(ConstDecl {
                value: self.lower_expr(&decl.value)?,
                ..decl.clone()
            }),
            StatementKind::DeclareExternal(_) | StatementKind::DeclareAlias(_) | StatementKind::DeclareOption(_) => {
                stmt.kind.clone()
            }
            StatementKind::Branch(branch) => return self.lower_branch(branch, span),
            StatementKind::Conditional(cond) => {
                return match self.fold_condition(&cond.condition)?.1 {
                    Some(true) => self.lower_stmt(&cond.statement),
                    Some(false) => Ok(None),
                    None => {
                        let msg = "condition attribute is not a compile-time constant";
                        Err(CompileError::new(msg, cond.condition.span).into())
                    }
                };
            }
            StatementKind::Multi(stmts) => {
                let stmts = self.lower_stmts(stmts)?;
                if stmts.is_empty() {
                    return Ok(None);
                }
                StatementKind::Multi(stmts)
            }
            StatementKind::Scoped(stmts) => StatementKind::Scoped(self.lower_stmts(stmts)?),
            StatementKind::Expression(expr) => StatementKind::Expression(self.lower_expr(expr)?),
            StatementKind::Discard => StatementKind::Discard,
            StatementKind::Return(value) => {
                StatementKind::Return(value.as_ref().map(|x| self.lower_expr(x)).transpose()?)
            }
        };
        Ok(Some(Statement::new(kind, span)))
    }

    /// Drops arms whose condition folds to false. An arm folding to true
    /// ends the chain: it becomes the whole statement, or the `else` of the
    /// arms kept before it.
    fn lower_branch(&mut self, branch: &BranchStatement, span: Span) -> Result<Option<Statement>> {
        let mut arms = Vec::new();
        let mut else_statement = branch.else_statement.as_deref();
        for (cond, arm) in &branch.cond_statements {
            let (cond, value) = self.fold_condition(cond)?;
            match value {
                Some(true) => {
                    else_statement = Some(arm);
                    break;
                }
                Some(false) => {}
                None if branch.is_const => {
                    let msg = "const if condition is not a compile-time constant";
                    return Err(CompileError::new(msg, cond.span).into());
                }
                None => arms.push((cond, arm)),
            }
        }

        let else_statement = else_statement.map(|x| self.lower_stmt(x)).transpose()?.flatten();
        if arms.is_empty() {
            return Ok(else_statement);
        }
        let cond_statements = arms
            .into_iter()
            .map(|(cond, arm)| {
                let arm = self
                    .lower_stmt(arm)?
                    .unwrap_or_else(|| Statement::new(StatementKind::Scoped(Vec::new()), arm.span));
                Ok((cond, arm))
            })
            .collect::<Result<Vec<_>>>()?;
        let out = BranchStatement {
            cond_statements,
            else_statement: else_statement.map(Box::new),
            is_const: false,
        };
        Ok(Some(Statement::new(StatementKind::Branch(out), span)))
    }

    /// Value of an option or const the expression is bound to.
    fn bound_value(&mut self, expr: &Expression) -> Result<Option<ConstantValue>> {
        let Some(id) = self.analysis.binding(expr) else {
            return Ok(None);
        };
        let analysis = self.analysis;
        let decl = analysis.decl(id);
        match &decl.kind {
            DeclKind::Option(_, index) => Ok(Some(ConstantValue::Bool(self.options.is_set(*index)))),
            DeclKind::Const(const_decl, _) => {
                if let Some(x) = self.consts.get(&id) {
                    return Ok(Some(x.clone()));
                }
                let const_decl: &ConstDecl = *const_decl;
                let value = self.lower_expr(&const_decl.value)?;
                match value.as_constant() {
                    Some(x) => {
                        self.consts.insert(id, x.clone());
                        Ok(Some(x.clone()))
                    }
                    None => {
                        let msg = format!("value of const {} is not a compile-time constant", decl.name);
                        Err(CompileError::new(msg, const_decl.value.span).into())
                    }
                }
            }
            _ => Ok(None),
        }
    }

    fn lower_expr(&mut self, expr: &Expression) -> Result<Expression> {
        let span = expr.span;
        let constant = |x: ConstantValue| -> Result<Expression> { Ok(Expression::constant(x, span)) };

        let kind = match &expr.kind {
            ExpressionKind::Constant(_) => return Ok(expr.clone()),
            ExpressionKind::Identifier(_) => match self.bound_value(expr)? {
                Some(x) => return constant(x),
                None => return Ok(expr.clone()),
            },
            ExpressionKind::Binary { op, lhs, rhs } => {
                let lhs = self.lower_expr(lhs)?;
                let rhs = self.lower_expr(rhs)?;
                match (lhs.as_constant(), rhs.as_constant()) {
                    (Some(a), Some(b)) => {
                        if let Some(x) = a.binary(*op, b) {
                            return constant(x);
                        }
                    }
                    // `false && x`, `true || x` and their neutral forms.
                    (Some(ConstantValue::Bool(a)), None) if op.is_logical() => {
                        return match (op, a) {
                            (BinaryOp::LogicalAnd, false) | (BinaryOp::LogicalOr, true) => constant(ConstantValue::Bool(*a)),
                            _ => Ok(rhs),
                        };
                    }
                    _ => {}
                }
                ExpressionKind::Binary {
                    op: *op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                }
            }
            ExpressionKind::Unary { op, expr: inner } => {
                let inner = self.lower_expr(inner)?;
                if let Some(x) = inner.as_constant().and_then(|x| x.unary(*op)) {
                    return constant(x);
                }
                ExpressionKind::Unary {
                    op: *op,
                    expr: Box::new(inner),
                }
            }
            ExpressionKind::Assign { op, lhs, rhs } => ExpressionKind::Assign {
                op: *op,
                lhs: Box::new(self.lower_target(lhs)?),
                rhs: Box::new(self.lower_expr(rhs)?),
            },
            ExpressionKind::Cast { target, args } => {
                let args = args.iter().map(|x| self.lower_expr(x)).collect::<Result<Vec<_>>>()?;
                let values = args.iter().map(|x| x.as_constant().cloned()).collect::<Option<Vec<_>>>();
                if let Some(x) = values.and_then(|xs| fold::cast(target, &xs)) {
                    return constant(x);
                }
                ExpressionKind::Cast {
                    target: target.clone(),
                    args,
                }
            }
            ExpressionKind::AccessMember { expr: inner, member } => {
                if self.analysis.binding(expr).is_some() {
                    // Member of an imported module.
                    return match self.bound_value(expr)? {
                        Some(x) => constant(x),
                        None => Ok(expr.clone()),
                    };
                }
                let inner_ty = self.analysis.type_of(inner)?;
                let lowered = self.lower_expr(inner)?;
                match (&inner_ty, parse_swizzle(member)) {
                    (ExpressionType::Primitive(_) | ExpressionType::Vector(..), Some(components)) => {
                        return self.swizzle(lowered, components, span);
                    }
                    _ => ExpressionKind::AccessMember {
                        expr: Box::new(lowered),
                        member: member.clone(),
                    },
                }
            }
            ExpressionKind::AccessIndex { expr: inner, index } => ExpressionKind::AccessIndex {
                expr: Box::new(self.lower_expr(inner)?),
                index: Box::new(self.lower_expr(index)?),
            },
            ExpressionKind::Swizzle { expr: inner, components } => {
                let inner = self.lower_expr(inner)?;
                return self.swizzle(inner, components.clone(), span);
            }
            ExpressionKind::CallFunction { callee, args } => ExpressionKind::CallFunction {
                callee: Box::new(self.lower_expr(callee)?),
                args: args.iter().map(|x| self.lower_expr(x)).collect::<Result<Vec<_>>>()?,
            },
            ExpressionKind::Intrinsic { intrinsic, args } => ExpressionKind::Intrinsic {
                intrinsic: *intrinsic,
                args: args.iter().map(|x| self.lower_expr(x)).collect::<Result<Vec<_>>>()?,
            },
            ExpressionKind::Conditional {
                condition,
                true_expr,
                false_expr,
            } => {
                let (condition, value) = self.fold_condition(condition)?;
                match value {
                    Some(true) => return self.lower_expr(true_expr),
                    Some(false) => return self.lower_expr(false_expr),
                    None => ExpressionKind::Conditional {
                        condition: Box::new(condition),
                        true_expr: Box::new(self.lower_expr(true_expr)?),
                        false_expr: Box::new(self.lower_expr(false_expr)?),
                    },
                }
            }
        };
        Ok(Expression::new(kind, span))
    }

    /// Assignment targets keep their identifiers so that writes to options
    /// and consts still reach the validator. Indices are folded as usual.
    fn lower_target(&mut self, expr: &Expression) -> Result<Expression> {
        let span = expr.span;
        let kind = match &expr.kind {
            ExpressionKind::AccessMember { expr: inner, member } if self.analysis.binding(expr).is_none() => {
                let inner_ty = self.analysis.type_of(inner)?;
                let lowered = self.lower_target(inner)?;
                match (&inner_ty, parse_swizzle(member)) {
                    (ExpressionType::Primitive(_) | ExpressionType::Vector(..), Some(components)) => {
                        ExpressionKind::Swizzle {
                            expr: Box::new(lowered),
                            components,
                        }
                    }
                    _ => ExpressionKind::AccessMember {
                        expr: Box::new(lowered),
                        member: member.clone(),
                    },
                }
            }
            ExpressionKind::AccessIndex { expr: inner, index } => ExpressionKind::AccessIndex {
                expr: Box::new(self.lower_target(inner)?),
                index: Box::new(self.lower_expr(index)?),
            },
            ExpressionKind::Swizzle { expr: inner, components } => ExpressionKind::Swizzle {
                expr: Box::new(self.lower_target(inner)?),
                components: components.clone(),
            },
            ExpressionKind::Identifier(_) | ExpressionKind::AccessMember { .. } => return Ok(expr.clone()),
            _ => return self.lower_expr(expr),
        };
        Ok(Expression::new(kind, span))
    }

    fn swizzle(&self, inner: Expression, components: Vec<u32>, span: Span) -> Result<Expression> {
        if let Some(x) = inner.as_constant().and_then(|x| x.swizzle(&components)) {
            return Ok(Expression::constant(x, span));
        }
        let kind = ExpressionKind::Swizzle {
            expr: Box::new(inner),
            components,
        };
        Ok(Expression::new(kind, span))
    }
}
