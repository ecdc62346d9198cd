//! Checks run on an optimized module right before code generation. The
//! first violation aborts validation.
use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::Result;

use crate::compiler::ast::*;
use crate::compiler::common::{PrimitiveType, Span};
use crate::compiler::error::CompileError;
use crate::compiler::sema::{layout, Analysis, DeclId, DeclKind, ExpressionType};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Default)]
pub struct ValidationOptions {
    /// Stages that must each have exactly one entry point.
    pub stages: Vec<ShaderStage>,
}

fn fail<T>(span: Span, msg: impl Into<String>) -> Result<T> {
    Err(CompileError::new(msg, span).into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Input,
    Output,
}
impl Direction {
    fn name(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

/// Stage, direction and type a builtin is available with.
fn builtin_usage(builtin: BuiltinEntry) -> (ShaderStage, Direction, ExpressionType) {
    use ExpressionType as T;
    match builtin {
        BuiltinEntry::Position => (ShaderStage::Vertex, Direction::Output, T::Vector(PrimitiveType::F32, 4)),
        BuiltinEntry::VertexIndex => (ShaderStage::Vertex, Direction::Input, T::Primitive(PrimitiveType::I32)),
        BuiltinEntry::FragCoord => (ShaderStage::Fragment, Direction::Input, T::Vector(PrimitiveType::F32, 4)),
        BuiltinEntry::FragDepth => (ShaderStage::Fragment, Direction::Output, T::Primitive(PrimitiveType::F32)),
        BuiltinEntry::GlobalInvocationIndices
        | BuiltinEntry::LocalInvocationIndices
        | BuiltinEntry::WorkgroupIndices => (ShaderStage::Compute, Direction::Input, T::Vector(PrimitiveType::U32, 3)),
    }
}

/// Validates an optimized and re-analyzed module.
pub fn validate(module: &Module, analysis: &Analysis, options: &ValidationOptions) -> Result<()> {
    let mut validator = Validator::new(analysis);
    for imported in &module.imported_modules {
        validator.statements(&imported.module.statements)?;
    }
    validator.statements(&module.statements)?;

    let entries = validator.entries(options)?;
    validator.check_recursion()?;
    validator.check_discards(&entries)?;
    validator.check_bindings()?;
    tracing::debug!(entries = entries.len(), "validated module");
    Ok(())
}

struct Validator<'a, 'b> {
    analysis: &'b Analysis<'a>,
    current: Option<DeclId>,
    /// Callees of every function, in call order.
    calls: BTreeMap<DeclId, Vec<DeclId>>,
    /// First `discard` of each function that contains one.
    discards: HashMap<DeclId, Span>,
}
impl<'a, 'b> Validator<'a, 'b> {
    fn new(analysis: &'b Analysis<'a>) -> Self {
        Self {
            analysis,
            current: None,
            calls: BTreeMap::new(),
            discards: HashMap::new(),
        }
    }

    fn statements(&mut self, stmts: &[Statement]) -> Result<()> {
        for stmt in stmts {
            self.statement(stmt)?;
        }
        Ok(())
    }

    fn statement(&mut self, stmt: &Statement) -> Result<()> {
        let span = stmt.span;
        match &stmt.kind {
            StatementKind::DeclareStruct(decl) => {
                if let Some(field) = decl.fields.iter().find(|x| x.cond.is_some()) {
                    let msg = format!("condition of field {} must be resolved before validation", field.name);
                    return fail(field.span, msg);
                }
            }
            StatementKind::DeclareFunction(decl) => {
                let prev = std::mem::replace(&mut self.current, self.analysis.function_id(decl));
                if let Some(id) = self.current {
                    self.calls.entry(id).or_default();
                }
                self.statements(&decl.body)?;
                self.current = prev;
            }
            StatementKind::DeclareVariable(decl) => {
                if let Some(init) = &decl.init {
                    self.expr(init)?;
                }
            }
            StatementKind::DeclareConst(decl) => self.expr(&decl.value)?,
            StatementKind::DeclareExternal(_) | StatementKind::DeclareAlias(_) | StatementKind::DeclareOption(_) => {}
            StatementKind::Branch(branch) => {
                if branch.is_const {
                    return fail(span, "const if must be resolved before validation");
                }
                for (cond, arm) in &branch.cond_statements {
                    self.expr(cond)?;
                    self.statement(arm)?;
                }
                if let Some(arm) = &branch.else_statement {
                    self.statement(arm)?;
                }
            }
            StatementKind::Conditional(_) => {
                return fail(span, "cond attribute must be resolved before validation");
            }
            StatementKind::Multi(stmts) | StatementKind::Scoped(stmts) => self.statements(stmts)?,
            StatementKind::Expression(expr) => self.expr(expr)?,
            StatementKind::Discard => {
                if let Some(id) = self.current {
                    self.discards.entry(id).or_insert(span);
                }
            }
            StatementKind::Return(value) => {
                if let Some(value) = value {
                    self.expr(value)?;
                }
            }
        }
        Ok(())
    }

    fn expr(&mut self, expr: &Expression) -> Result<()> {
        match &expr.kind {
            ExpressionKind::Constant(_) | ExpressionKind::Identifier(_) => {}
            ExpressionKind::Binary { lhs, rhs, .. } => {
                self.expr(lhs)?;
                self.expr(rhs)?;
            }
            ExpressionKind::Unary { expr: inner, .. }
            | ExpressionKind::AccessMember { expr: inner, .. }
            | ExpressionKind::Swizzle { expr: inner, .. } => self.expr(inner)?,
            ExpressionKind::Assign { op, lhs, rhs } => {
                self.assign_target(lhs)?;
                if *op == AssignOp::Simple {
                    let lhs_ty = self.analysis.type_of(lhs)?;
                    let rhs_ty = self.analysis.type_of(rhs)?;
                    if lhs_ty != rhs_ty {
                        return fail(expr.span, format!("cannot assign {} to {}", rhs_ty, lhs_ty));
                    }
                }
                self.expr(lhs)?;
                self.expr(rhs)?;
            }
            ExpressionKind::AccessIndex { expr: inner, index } => {
                self.expr(inner)?;
                self.expr(index)?;
            }
            ExpressionKind::Cast { args, .. } | ExpressionKind::Intrinsic { args, .. } => {
                for arg in args {
                    self.expr(arg)?;
                }
            }
            ExpressionKind::CallFunction { callee, args } => {
                if let (ExpressionType::Function(id), Some(caller)) = (self.analysis.type_of(callee)?, self.current) {
                    self.calls.entry(caller).or_default().push(id);
                }
                self.expr(callee)?;
                for arg in args {
                    self.expr(arg)?;
                }
            }
            ExpressionKind::Conditional { .. } => {
                return fail(expr.span, "const_select must be resolved before validation");
            }
        }
        Ok(())
    }

    /// Rejects assignments to anything but a variable, a parameter, a
    /// storage block, or a field, element or non-repeating swizzle of one.
    fn assign_target(&self, expr: &Expression) -> Result<()> {
        match &expr.kind {
            ExpressionKind::Identifier(name) => self.assign_decl(expr, name),
            ExpressionKind::AccessMember { expr: inner, member } => {
                if self.analysis.binding(expr).is_some() {
                    return self.assign_decl(expr, member);
                }
                if let Some(ExpressionType::Uniform(_)) = self.analysis.type_of(inner).ok() {
                    return fail(expr.span, "uniform blocks are read-only");
                }
                self.assign_target(inner)
            }
            ExpressionKind::AccessIndex { expr: inner, .. } => self.assign_target(inner),
            ExpressionKind::Swizzle { expr: inner, components } => {
                let unique = components.iter().collect::<HashSet<_>>();
                if unique.len() != components.len() {
                    return fail(expr.span, "swizzle with repeated components is not assignable");
                }
                self.assign_target(inner)
            }
            _ => fail(expr.span, "expression is not assignable"),
        }
    }

    fn assign_decl(&self, expr: &Expression, name: &str) -> Result<()> {
        let Some(id) = self.analysis.binding(expr) else {
            return fail(expr.span, format!("unknown identifier {}", name));
        };
        let decl = self.analysis.decl(id);
        match &decl.kind {
            DeclKind::Variable(_) | DeclKind::Parameter(_) => Ok(()),
            DeclKind::External(x) if x.ty.is_storage() => Ok(()),
            _ => fail(expr.span, format!("cannot assign to {} {}", decl.kind_name(), name)),
        }
    }

    /// Checks entry points of the root module and returns them by stage.
    fn entries(&self, options: &ValidationOptions) -> Result<Vec<(ShaderStage, DeclId)>> {
        let mut out = Vec::<(ShaderStage, DeclId)>::new();
        for id in self.analysis.entry_points() {
            let decl = self.analysis.decl(id);
            if decl.module.is_some() {
                continue;
            }
            let Some(info) = decl.as_function() else {
                continue;
            };
            let Some(stage) = info.decl.entry else {
                continue;
            };
            if let Some((_, prev)) = out.iter().find(|(x, _)| *x == stage) {
                let prev = &self.analysis.decl(*prev).name;
                let msg = format!("multiple {} entry points: {} and {}", stage, prev, decl.name);
                return fail(decl.span, msg);
            }
            self.entry_contract(id, stage)?;
            out.push((stage, id));
        }
        for stage in &options.stages {
            if !out.iter().any(|(x, _)| x == stage) {
                return Err(CompileError::without_span(format!("no entry point for stage {}", stage)).into());
            }
        }
        Ok(out)
    }

    fn entry_contract(&self, id: DeclId, stage: ShaderStage) -> Result<()> {
        let decl = self.analysis.decl(id);
        let Some(info) = decl.as_function() else {
            return Ok(());
        };
        let span = decl.span;
        let name = &decl.name;
        let f = info.decl;

        if f.workgroup.is_some() && stage != ShaderStage::Compute {
            return fail(span, format!("workgroup is only valid on compute entries, {} is a {} entry", name, stage));
        }
        if stage != ShaderStage::Fragment && (f.depth_write.is_some() || f.early_fragment_tests.is_some()) {
            return fail(span, format!("{} entry {} cannot carry fragment attributes", stage, name));
        }
        if stage == ShaderStage::Compute && f.workgroup.is_none() {
            return fail(span, format!("compute entry {} requires the workgroup attribute", name));
        }

        let input = match info.params.as_slice() {
            [] => None,
            [param] => match self.analysis.decl_type(*param) {
                Some(ExpressionType::Struct(x)) => Some(x),
                Some(ty) => return fail(span, format!("entry {} takes {}, expected a struct", name, ty)),
                None => None,
            },
            _ => return fail(span, format!("entry {} takes at most one parameter", name)),
        };
        if let Some(input) = input {
            self.io_struct(id, stage, input, Direction::Input)?;
        }

        match &info.return_type {
            ExpressionType::NoType => {}
            ExpressionType::Struct(output) if stage != ShaderStage::Compute => {
                self.io_struct(id, stage, *output, Direction::Output)?;
            }
            ty => return fail(span, format!("{} entry {} cannot return {}", stage, name, ty)),
        }
        Ok(())
    }

    fn io_struct(&self, entry: DeclId, stage: ShaderStage, id: DeclId, direction: Direction) -> Result<()> {
        let entry_decl = self.analysis.decl(entry);
        let Some(info) = self.analysis.struct_info(id) else {
            return Ok(());
        };
        let struct_name = &self.analysis.decl(id).name;
        let mut locations = HashSet::new();
        for (i, field) in info.fields.iter().enumerate() {
            let span = info.decl.fields.get(i).map_or(entry_decl.span, |x| x.span);
            match (field.location, field.builtin) {
                (Some(_), Some(_)) => {
                    let msg = format!("field {} of {} cannot have both a location and a builtin", field.name, struct_name);
                    return fail(span, msg);
                }
                (None, None) => {
                    let msg = format!("field {} of {} needs a location or a builtin", field.name, struct_name);
                    return fail(span, msg);
                }
                (Some(location), None) => {
                    if stage == ShaderStage::Compute {
                        return fail(span, format!("compute entry inputs can only be builtins, found field {}", field.name));
                    }
                    if !locations.insert(location) {
                        return fail(span, format!("location {} is used twice in {}", location, struct_name));
                    }
                    let numeric = matches!(
                        field.ty,
                        ExpressionType::Primitive(_) | ExpressionType::Vector(..) | ExpressionType::Matrix(..)
                    );
                    if !numeric || field.ty.base_type() == Some(PrimitiveType::Bool) {
                        let msg = format!("{} cannot be a shader {}", field.ty, direction.name());
                        return fail(span, msg);
                    }
                }
                (None, Some(builtin)) => {
                    let (expected_stage, expected_direction, ty) = builtin_usage(builtin);
                    if expected_stage != stage || expected_direction != direction {
                        let msg = format!(
                            "builtin {} is a {} {}, it cannot be used as a {} {}",
                            builtin.name(),
                            expected_stage,
                            expected_direction.name(),
                            stage,
                            direction.name()
                        );
                        return fail(span, msg);
                    }
                    if field.ty != ty {
                        return fail(span, format!("builtin {} must be {}, found {}", builtin.name(), ty, field.ty));
                    }
                    let has_depth_write = entry_decl
                        .as_function()
                        .map_or(false, |x| x.decl.depth_write.is_some());
                    if builtin == BuiltinEntry::FragDepth && !has_depth_write {
                        let msg = format!("frag_depth requires the depth_write attribute on entry {}", entry_decl.name);
                        return fail(span, msg);
                    }
                }
            }
        }
        Ok(())
    }

    fn check_recursion(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        fn visit(v: &Validator, id: DeclId, marks: &mut HashMap<DeclId, Mark>) -> Result<()> {
            match marks.get(&id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    let decl = v.analysis.decl(id);
                    return fail(decl.span, format!("function {} is recursive", decl.name));
                }
                None => {}
            }
            marks.insert(id, Mark::Visiting);
            for callee in v.calls.get(&id).into_iter().flatten() {
                visit(v, *callee, marks)?;
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }

        let mut marks = HashMap::new();
        for id in self.calls.keys() {
            visit(self, *id, &mut marks)?;
        }
        Ok(())
    }

    /// `discard` may only be reached from fragment entries.
    fn check_discards(&self, entries: &[(ShaderStage, DeclId)]) -> Result<()> {
        for (stage, entry) in entries {
            if *stage == ShaderStage::Fragment {
                continue;
            }
            let mut seen = HashSet::new();
            let mut stack = vec![*entry];
            while let Some(id) = stack.pop() {
                if !seen.insert(id) {
                    continue;
                }
                if let Some(span) = self.discards.get(&id) {
                    let msg = format!(
                        "discard is only allowed in fragment stage, {} is reachable from {} entry {}",
                        self.analysis.decl(id).name,
                        stage,
                        self.analysis.decl(*entry).name
                    );
                    return fail(*span, msg);
                }
                stack.extend(self.calls.get(&id).into_iter().flatten());
            }
        }
        Ok(())
    }

    /// Every external needs a binding, and no two share a (set, binding).
    fn check_bindings(&self) -> Result<()> {
        let mut seen = HashMap::<(u32, u32), &str>::new();
        for decl in self.analysis.declarations() {
            let Some(external) = decl.as_external() else {
                continue;
            };
            let Some(binding) = external.var.binding else {
                return fail(external.var.span, format!("external {} requires a binding", decl.name));
            };
            if let Some(prev) = seen.insert((external.set, binding), &decl.name) {
                let msg = format!(
                    "set {} binding {} is used by both {} and {}",
                    external.set, binding, prev, decl.name
                );
                return fail(external.var.span, msg);
            }
            if let ExpressionType::Uniform(block) | ExpressionType::Storage(block) = external.ty {
                let rule = layout::layout_rule(self.analysis, block, MemoryLayout::Std140);
                if let Err(err) = layout::struct_layout(self.analysis, block, rule) {
                    return match err.downcast::<CompileError>() {
                        Ok(e) if e.span.is_none() => fail(external.var.span, e.message),
                        Ok(e) => Err(e.into()),
                        Err(e) => Err(e),
                    };
                }
            }
        }
        Ok(())
    }
}
