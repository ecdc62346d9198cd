//! NZSL pretty-printer. Output of `LangWriter::generate` parses back to an
//! equal module.
use std::fmt::Write;

use crate::compiler::ast::*;
use crate::compiler::common::ConstantValue;

#[cfg(test)]
mod tests;

const SWIZZLE: [char; 4] = ['x', 'y', 'z', 'w'];

pub struct LangWriter {
    out: String,
    indent: usize,
}
impl LangWriter {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            indent: 0,
        }
    }

    pub fn generate(mut self, module: &Module) -> String {
        self.write_module_attributes(&module.metadata);
        match &module.metadata.module_name {
            Some(name) => self.line(&format!("module {};", name)),
            None => self.line("module;"),
        }
        self.out.push('\n');

        if !module.imports.is_empty() {
            for import in &module.imports {
                self.line(&format!("import {};", import.path.join(".")));
            }
            self.out.push('\n');
        }

        for imported in &module.imported_modules {
            self.write_module_attributes(&imported.module.metadata);
            self.line(&format!("module {}", imported.identifier));
            self.line("{");
            self.indent += 1;
            self.write_top_level(&imported.module.statements);
            self.indent -= 1;
            self.line("}");
        }

        self.write_top_level(&module.statements);
        self.out
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push('\t');
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn write_module_attributes(&mut self, metadata: &ModuleMetadata) {
        self.line(&format!("[nzsl_version(\"{}\")]", metadata.lang_version));
        if let Some(author) = &metadata.author {
            self.line(&format!("[author({})]", quote(author)));
        }
        if let Some(desc) = &metadata.description {
            self.line(&format!("[desc({})]", quote(desc)));
        }
        if let Some(uuid) = &metadata.uuid {
            self.line(&format!("[uuid(\"{}\")]", uuid));
        }
    }

    fn write_top_level(&mut self, stmts: &[Statement]) {
        for stmt in stmts {
            self.write_declaration(stmt, Vec::new());
            self.out.push('\n');
        }
    }

    fn write_attributes(&mut self, attrs: &[String]) {
        if !attrs.is_empty() {
            self.line(&format!("[{}]", attrs.join(", ")));
        }
    }

    /// Writes a module-scope statement. `attrs` carries attributes inherited
    /// from an enclosing conditional statement.
    fn write_declaration(&mut self, stmt: &Statement, mut attrs: Vec<String>) {
        match &stmt.kind {
            StatementKind::Conditional(cond) => {
                attrs.push(format!("cond({})", expr_to_string(&cond.condition)));
                self.write_declaration(&cond.statement, attrs);
            }
            StatementKind::DeclareStruct(decl) => {
                if decl.export {
                    attrs.push("export".to_string());
                }
                if let Some(layout) = decl.layout {
                    attrs.push(format!("layout({})", layout.name()));
                }
                self.write_attributes(&attrs);
                self.line(&format!("struct {}", decl.name));
                self.line("{");
                self.indent += 1;
                let count = decl.fields.len();
                for (i, field) in decl.fields.iter().enumerate() {
                    let mut field_attrs = Vec::new();
                    if let Some(cond) = &field.cond {
                        field_attrs.push(format!("cond({})", expr_to_string(cond)));
                    }
                    if let Some(location) = field.location {
                        field_attrs.push(format!("location({})", location));
                    }
                    if let Some(builtin) = field.builtin {
                        field_attrs.push(format!("builtin({})", builtin.name()));
                    }
                    let mut text = String::new();
                    if !field_attrs.is_empty() {
                        let _ = write!(text, "[{}] ", field_attrs.join(", "));
                    }
                    let _ = write!(text, "{}: {}", field.name, field.ty);
                    if i + 1 < count {
                        text.push(',');
                    }
                    self.line(&text);
                }
                self.indent -= 1;
                self.line("}");
            }
            StatementKind::DeclareExternal(decl) => {
                if let Some(set) = decl.set {
                    attrs.push(format!("set({})", set));
                }
                self.write_attributes(&attrs);
                self.line("external");
                self.line("{");
                self.indent += 1;
                let count = decl.vars.len();
                for (i, var) in decl.vars.iter().enumerate() {
                    let mut var_attrs = Vec::new();
                    if let Some(set) = var.set {
                        var_attrs.push(format!("set({})", set));
                    }
                    if let Some(binding) = var.binding {
                        var_attrs.push(format!("binding({})", binding));
                    }
                    let mut text = String::new();
                    if !var_attrs.is_empty() {
                        let _ = write!(text, "[{}] ", var_attrs.join(", "));
                    }
                    let _ = write!(text, "{}: {}", var.name, var.ty);
                    if i + 1 < count {
                        text.push(',');
                    }
                    self.line(&text);
                }
                self.indent -= 1;
                self.line("}");
            }
            StatementKind::DeclareFunction(func) => {
                if let Some(stage) = func.entry {
                    attrs.push(format!("entry({})", stage.name()));
                }
                if func.export {
                    attrs.push("export".to_string());
                }
                if let Some(mode) = func.depth_write {
                    attrs.push(format!("depth_write({})", mode.name()));
                }
                if let Some(flag) = func.early_fragment_tests {
                    attrs.push(format!("early_fragment_tests({})", flag));
                }
                if let Some([x, y, z]) = func.workgroup {
                    attrs.push(format!("workgroup({}, {}, {})", x, y, z));
                }
                self.write_attributes(&attrs);

                let params = func
                    .params
                    .iter()
                    .map(|x| format!("{}: {}", x.name, x.ty))
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut header = format!("fn {}({})", func.name, params);
                if let Some(ret) = &func.return_type {
                    let _ = write!(header, " -> {}", ret);
                }
                self.line(&header);
                self.write_block(&func.body);
            }
            StatementKind::DeclareAlias(decl) => {
                self.write_attributes(&attrs);
                self.line(&format!("alias {} = {};", decl.name, decl.target));
            }
            StatementKind::DeclareOption(decl) => {
                self.write_attributes(&attrs);
                match &decl.default {
                    Some(value) => self.line(&format!(
                        "option {}: {} = {};",
                        decl.name,
                        decl.ty,
                        expr_to_string(value)
                    )),
                    None => self.line(&format!("option {}: {};", decl.name, decl.ty)),
                }
            }
            StatementKind::DeclareConst(decl) => {
                self.write_attributes(&attrs);
                match &decl.ty {
                    Some(ty) => self.line(&format!(
                        "const {}: {} = {};",
                        decl.name,
                        ty,
                        expr_to_string(&decl.value)
                    )),
                    None => self.line(&format!("const {} = {};", decl.name, expr_to_string(&decl.value))),
                }
            }
            StatementKind::Multi(stmts) => {
                for (i, stmt) in stmts.iter().enumerate() {
                    if i > 0 {
                        self.out.push('\n');
                    }
                    self.write_declaration(stmt, attrs.clone());
                }
            }
            _ => self.write_statement(stmt),
        }
    }

    fn write_block(&mut self, stmts: &[Statement]) {
        self.line("{");
        self.indent += 1;
        for stmt in stmts {
            self.write_statement(stmt);
        }
        self.indent -= 1;
        self.line("}");
    }

    fn write_arm(&mut self, stmt: &Statement) {
        match &stmt.kind {
            StatementKind::Scoped(stmts) => self.write_block(stmts),
            _ => self.write_block(std::slice::from_ref(stmt)),
        }
    }

    fn write_statement(&mut self, stmt: &Statement) {
        match &stmt.kind {
            StatementKind::DeclareVariable(decl) => {
                let mut text = format!("let {}", decl.name);
                if let Some(ty) = &decl.ty {
                    let _ = write!(text, ": {}", ty);
                }
                if let Some(init) = &decl.init {
                    let _ = write!(text, " = {}", expr_to_string(init));
                }
                text.push(';');
                self.line(&text);
            }
            StatementKind::Branch(branch) => {
                let prefix = if branch.is_const { "const " } else { "" };
                for (i, (cond, body)) in branch.cond_statements.iter().enumerate() {
                    let keyword = if i == 0 { "if" } else { "else if" };
                    let text = if i == 0 {
                        format!("{}{} ({})", prefix, keyword, expr_to_string(cond))
                    } else {
                        format!("{} ({})", keyword, expr_to_string(cond))
                    };
                    self.line(&text);
                    self.write_arm(body);
                }
                if let Some(else_stmt) = &branch.else_statement {
                    self.line("else");
                    self.write_arm(else_stmt);
                }
            }
            StatementKind::Conditional(cond) => {
                self.line(&format!("const if ({})", expr_to_string(&cond.condition)));
                self.write_arm(&cond.statement);
            }
            StatementKind::Multi(stmts) => {
                for stmt in stmts {
                    self.write_statement(stmt);
                }
            }
            StatementKind::Scoped(stmts) => self.write_block(stmts),
            StatementKind::Expression(expr) => self.line(&format!("{};", expr_to_string(expr))),
            StatementKind::Discard => self.line("discard;"),
            StatementKind::Return(Some(expr)) => self.line(&format!("return {};", expr_to_string(expr))),
            StatementKind::Return(None) => self.line("return;"),
            StatementKind::DeclareStruct(_)
            | StatementKind::DeclareExternal(_)
            | StatementKind::DeclareFunction(_)
            | StatementKind::DeclareAlias(_)
            | StatementKind::DeclareOption(_)
            | StatementKind::DeclareConst(_) => self.write_declaration(stmt, Vec::new()),
        }
    }
}
impl Default for LangWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn quote(s: &str) -> String {
    let mut out = String::from("\"");
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn float_literal(x: f64, text: String) -> String {
    if x.is_sign_negative() {
        format!("({})", text)
    } else {
        text
    }
}

pub fn constant_to_string(value: &ConstantValue) -> String {
    match value {
        ConstantValue::Bool(x) => x.to_string(),
        ConstantValue::I32(x) if *x < 0 => format!("({})", x),
        ConstantValue::I32(x) => x.to_string(),
        ConstantValue::U32(x) if *x > i32::MAX as u32 => x.to_string(),
        ConstantValue::U32(x) => format!("u32({})", x),
        ConstantValue::F32(x) => float_literal(*x as f64, format!("{:?}", x)),
        ConstantValue::F64(x) => format!("f64({:?})", x),
        ConstantValue::Vector(xs) => {
            let base = value.primitive_type();
            let args = xs.iter().map(constant_to_string).collect::<Vec<_>>().join(", ");
            format!("vec{}[{}]({})", xs.len(), base, args)
        }
    }
}

/// Operands printed inside an operator need parentheses when they are not
/// atoms.
fn needs_parens(expr: &Expression) -> bool {
    matches!(
        expr.kind,
        ExpressionKind::Binary { .. } | ExpressionKind::Unary { .. } | ExpressionKind::Assign { .. }
    )
}

fn operand_to_string(expr: &Expression) -> String {
    if needs_parens(expr) {
        format!("({})", expr_to_string(expr))
    } else {
        expr_to_string(expr)
    }
}

fn args_to_string(args: &[Expression]) -> String {
    args.iter().map(expr_to_string).collect::<Vec<_>>().join(", ")
}

pub fn expr_to_string(expr: &Expression) -> String {
    match &expr.kind {
        ExpressionKind::Constant(value) => constant_to_string(value),
        ExpressionKind::Identifier(name) => name.clone(),
        ExpressionKind::Binary { op, lhs, rhs } => {
            format!("{} {} {}", operand_to_string(lhs), op.symbol(), operand_to_string(rhs))
        }
        ExpressionKind::Unary { op, expr } => format!("{}{}", op.symbol(), operand_to_string(expr)),
        ExpressionKind::Assign { op, lhs, rhs } => {
            format!("{} {} {}", expr_to_string(lhs), op.symbol(), expr_to_string(rhs))
        }
        ExpressionKind::Cast { target, args } => format!("{}({})", target, args_to_string(args)),
        ExpressionKind::AccessMember { expr, member } => format!("{}.{}", operand_to_string(expr), member),
        ExpressionKind::AccessIndex { expr, index } => {
            format!("{}[{}]", operand_to_string(expr), expr_to_string(index))
        }
        ExpressionKind::Swizzle { expr, components } => {
            let pattern = components
                .iter()
                .map(|x| SWIZZLE.get(*x as usize).copied().unwrap_or('x'))
                .collect::<String>();
            format!("{}.{}", operand_to_string(expr), pattern)
        }
        ExpressionKind::CallFunction { callee, args } => {
            format!("{}({})", operand_to_string(callee), args_to_string(args))
        }
        ExpressionKind::Intrinsic { intrinsic, args } => {
            format!("{}({})", intrinsic.name(), args_to_string(args))
        }
        ExpressionKind::Conditional {
            condition,
            true_expr,
            false_expr,
        } => format!(
            "const_select({}, {}, {})",
            expr_to_string(condition),
            expr_to_string(true_expr),
            expr_to_string(false_expr)
        ),
    }
}
