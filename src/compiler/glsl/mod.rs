//! GLSL code generation. Entry IO structs are flattened into `in`/`out`
//! globals, aliases disappear behind the declarations they name, and
//! declarations of imported modules are renamed with the module identifier.
use std::collections::HashSet;

use anyhow::{anyhow, bail, Result};

use crate::compiler::ast::*;
use crate::compiler::common::{ConstantValue, PrimitiveType};
use crate::compiler::error::BackendError;
use crate::compiler::sema::{Analysis, DeclId, DeclKind, ExpressionType};

#[cfg(test)]
mod tests;

const INPUT_PREFIX: &str = "_NzIn_";
const OUTPUT_PREFIX: &str = "_NzOut_";
const OUTPUT_VAR: &str = "_nzOutput";
const BINDING_PREFIX: &str = "_NzBinding_";
const FLIP_Y_UNIFORM: &str = "_NzFlipYValue";
const SWIZZLE: [char; 4] = ['x', 'y', 'z', 'w'];

/// Identifiers a shader cannot declare: GLSL keywords, builtin functions
/// the writer emits, and `main`.
const RESERVED: &[&str] = &[
    "active", "asm", "atomic_uint", "attribute", "bool", "break", "buffer", "bvec2", "bvec3", "bvec4", "case",
    "cast", "centroid", "class", "coherent", "common", "const", "continue", "default", "discard", "dmat2",
    "dmat2x2", "dmat2x3", "dmat2x4", "dmat3", "dmat3x2", "dmat3x3", "dmat3x4", "dmat4", "dmat4x2", "dmat4x3",
    "dmat4x4", "do", "double", "dvec2", "dvec3", "dvec4", "else", "enum", "extern", "external", "false",
    "filter", "fixed", "flat", "float", "for", "fvec2", "fvec3", "fvec4", "goto", "half", "highp", "hvec2",
    "hvec3", "hvec4", "if", "in", "inline", "inout", "input", "int", "interface", "invariant", "isampler1D",
    "isampler2D", "isampler3D", "isamplerCube", "ivec2", "ivec3", "ivec4", "layout", "long", "lowp", "mat2",
    "mat2x2", "mat2x3", "mat2x4", "mat3", "mat3x2", "mat3x3", "mat3x4", "mat4", "mat4x2", "mat4x3", "mat4x4",
    "mediump", "namespace", "noinline", "noperspective", "out", "output", "partition", "patch", "precise",
    "precision", "public", "readonly", "resource", "restrict", "return", "sample", "sampler", "sampler1D",
    "sampler2D", "sampler3D", "samplerCube", "shared", "short", "sizeof", "smooth", "static", "struct",
    "subroutine", "superp", "switch", "template", "this", "true", "typedef", "uint", "uniform", "union",
    "unsigned", "usampler1D", "usampler2D", "usampler3D", "usamplerCube", "using", "uvec2", "uvec3", "uvec4",
    "varying", "vec2", "vec3", "vec4", "void", "volatile", "while", "writeonly",
    // Functions.
    "clamp", "cross", "dot", "exp", "length", "main", "max", "min", "mix", "normalize", "pow", "reflect",
    "sqrt", "texture",
];

/// Identifier as written in GLSL: reserved names get a `_` suffix.
pub fn identifier(name: &str) -> String {
    if RESERVED.contains(&name) {
        format!("{}_", name)
    } else {
        name.to_string()
    }
}

/// Target OpenGL flavour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlslEnvironment {
    pub gl_major_version: u32,
    pub gl_minor_version: u32,
    pub gl_es: bool,
    /// Multiplies the vertex position by `vec4(1, _NzFlipYValue, 1, 1)`.
    pub flip_y_position: bool,
}
impl Default for GlslEnvironment {
    fn default() -> Self {
        Self {
            gl_major_version: 3,
            gl_minor_version: 3,
            gl_es: false,
            flip_y_position: false,
        }
    }
}
impl GlslEnvironment {
    /// `#version` number matching the GL version.
    pub fn glsl_version(&self) -> Result<u32> {
        let (major, minor) = (self.gl_major_version, self.gl_minor_version);
        let out = if self.gl_es {
            match (major, minor) {
                (3.., 2..) => 320,
                (3.., 1) => 310,
                (3.., _) => 300,
                (2, _) => 100,
                _ => bail!("OpenGL ES {}.{} does not support shaders", major, minor),
            }
        } else {
            match (major, minor) {
                (4.., _) | (3, 3..) => major * 100 + minor * 10,
                (3, 2) => 150,
                (3, 1) => 140,
                (3, 0) => 130,
                (2, 1..) => 120,
                (2, 0) => 110,
                _ => bail!("OpenGL {}.{} does not support shaders", major, minor),
            }
        };
        Ok(out)
    }

    fn version_name(&self) -> String {
        match self.glsl_version() {
            Ok(x) if self.gl_es => format!("{} es", x),
            Ok(x) => x.to_string(),
            Err(_) => "?".to_string(),
        }
    }

    fn supports_f64(&self) -> bool {
        !self.gl_es && self.gl_major_version >= 4
    }
    fn supports_compute(&self) -> bool {
        let version = (self.gl_major_version, self.gl_minor_version);
        if self.gl_es {
            version >= (3, 1)
        } else {
            version >= (4, 3)
        }
    }
    fn supports_explicit_location(&self) -> bool {
        let version = (self.gl_major_version, self.gl_minor_version);
        if self.gl_es {
            version >= (3, 0)
        } else {
            version >= (3, 3)
        }
    }
    fn supports_early_fragment_tests(&self) -> bool {
        let version = (self.gl_major_version, self.gl_minor_version);
        if self.gl_es {
            version >= (3, 1)
        } else {
            version >= (4, 2)
        }
    }
}

pub struct GlslWriter {
    env: GlslEnvironment,
}
impl GlslWriter {
    pub fn new(env: GlslEnvironment) -> Self {
        Self { env }
    }

    /// Generates the program of `stage`'s entry point. Without a stage the
    /// module must contain at most one entry point.
    pub fn generate(&self, module: &Module, analysis: &Analysis, stage: Option<ShaderStage>) -> Result<String> {
        let out = GlslState::new(&self.env, analysis, stage)?.generate(module)?;
        tracing::debug!(version = %self.env.version_name(), bytes = out.len(), "generated glsl");
        Ok(out)
    }
}

struct GlslState<'a, 'b> {
    env: &'b GlslEnvironment,
    analysis: &'b Analysis<'a>,
    stage: Option<ShaderStage>,
    entry: Option<DeclId>,
    live: HashSet<DeclId>,
    emitted: HashSet<DeclId>,
    /// Entry IO: struct member and the global it maps to.
    inputs: Vec<(String, String)>,
    outputs: Vec<(String, String)>,
    in_entry: bool,
    out: String,
    indent: usize,
}
impl<'a, 'b> GlslState<'a, 'b> {
    fn new(env: &'b GlslEnvironment, analysis: &'b Analysis<'a>, stage: Option<ShaderStage>) -> Result<Self> {
        let mut entry = None;
        for id in analysis.entry_points() {
            let decl = analysis.decl(id);
            if decl.module.is_some() {
                continue;
            }
            let entry_stage = decl.as_function().and_then(|x| x.decl.entry);
            match stage {
                Some(stage) if entry_stage != Some(stage) => continue,
                _ => {}
            }
            if entry.is_some() {
                bail!("multiple entry points found, a stage must be selected to generate GLSL");
            }
            entry = Some(id);
        }
        if let (Some(stage), None) = (stage, entry) {
            return Err(BackendError::MissingEntry(stage.to_string()).into());
        }
        Ok(Self {
            env,
            analysis,
            stage: stage.or_else(|| entry.and_then(|x| analysis.decl(x).as_function()).and_then(|x| x.decl.entry)),
            entry,
            live: HashSet::new(),
            emitted: HashSet::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            in_entry: false,
            out: String::new(),
            indent: 0,
        })
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push('\t');
        }
        self.out.push_str(text);
        self.out.push('\n');
    }
    fn blank(&mut self) {
        self.out.push('\n');
    }
    fn comment_section(&mut self, title: &str) {
        let stars = "*".repeat(if title.len() < 33 { (36 - title.len()) / 2 } else { 3 });
        self.line(&format!("/*{} {} {}*/", stars, title, stars));
    }

    fn generate(mut self, module: &Module) -> Result<String> {
        self.header()?;

        // A program keeps what its entry point reaches. A module without
        // any entry point keeps all of its own declarations.
        let roots = match self.entry {
            Some(entry) => vec![entry],
            None => {
                let mut roots = Vec::new();
                self.items(&module.statements, &mut roots)?;
                roots.retain(|id| self.analysis.decl(*id).as_function().and_then(|x| x.decl.entry).is_none());
                roots
            }
        };
        self.mark_live(roots)?;

        let mut any_imported = false;
        for imported in &module.imported_modules {
            let mut items = Vec::new();
            self.items(&imported.module.statements, &mut items)?;
            if items.iter().any(|x| self.live.contains(x)) {
                any_imported = true;
                self.line(&format!("// Module {}", imported.identifier));
                self.blank();
                for id in items {
                    self.emit(id)?;
                }
            }
        }
        if any_imported {
            self.line("// Main file");
            self.blank();
        }
        let mut items = Vec::new();
        self.items(&module.statements, &mut items)?;
        for id in items {
            self.emit(id)?;
        }
        Ok(self.out)
    }

    fn header(&mut self) -> Result<()> {
        let version = self.env.glsl_version()?;
        if self.env.gl_es {
            self.line(&format!("#version {} es", version));
        } else {
            self.line(&format!("#version {}", version));
        }
        self.blank();
        if self.env.gl_es {
            self.line("#if GL_FRAGMENT_PRECISION_HIGH");
            self.line("precision highp float;");
            self.line("#else");
            self.line("precision mediump float;");
            self.line("#endif");
            self.blank();
        }
        Ok(())
    }

    /// Structs, functions and externals declared by `stmts`, in order.
    fn items(&self, stmts: &[Statement], out: &mut Vec<DeclId>) -> Result<()> {
        for stmt in stmts {
            match &stmt.kind {
                StatementKind::DeclareStruct(decl) => out.extend(self.analysis.struct_id(decl)),
                StatementKind::DeclareFunction(decl) => out.extend(self.analysis.function_id(decl)),
                StatementKind::DeclareExternal(decl) => {
                    out.extend(decl.vars.iter().filter_map(|x| self.analysis.external_id(x)));
                }
                StatementKind::Multi(stmts) => self.items(stmts, out)?,
                StatementKind::Conditional(_) => bail!("cond attribute must be resolved before generating GLSL"),
                _ => {}
            }
        }
        Ok(())
    }

    fn mark_live(&mut self, roots: Vec<DeclId>) -> Result<()> {
        let mut stack = roots;
        while let Some(id) = stack.pop() {
            if self.live.insert(id) {
                stack.extend(self.dependencies(id)?);
            }
        }
        Ok(())
    }

    /// Declarations that must be emitted before `id`.
    fn dependencies(&self, id: DeclId) -> Result<Vec<DeclId>> {
        let mut out = Vec::new();
        match &self.analysis.decl(id).kind {
            DeclKind::Struct(info) => {
                for field in &info.fields {
                    struct_refs(&field.ty, &mut out);
                }
            }
            DeclKind::External(info) => struct_refs(&info.ty, &mut out),
            DeclKind::Function(info) => {
                for param in &info.params {
                    if let Some(ty) = self.analysis.decl_type(*param) {
                        struct_refs(&ty, &mut out);
                    }
                }
                struct_refs(&info.return_type, &mut out);
                for stmt in &info.decl.body {
                    self.statement_refs(stmt, &mut out)?;
                }
            }
            _ => {}
        }
        Ok(out)
    }

    fn statement_refs(&self, stmt: &Statement, out: &mut Vec<DeclId>) -> Result<()> {
        match &stmt.kind {
            StatementKind::DeclareStruct(decl) => out.extend(self.analysis.struct_id(decl)),
            StatementKind::DeclareVariable(decl) => {
                if let Some(ty) = self.analysis.variable_id(decl).and_then(|x| self.analysis.decl_type(x)) {
                    struct_refs(&ty, out);
                }
                if let Some(init) = &decl.init {
                    self.expr_refs(init, out);
                }
            }
            StatementKind::Branch(branch) => {
                for (cond, arm) in &branch.cond_statements {
                    self.expr_refs(cond, out);
                    self.statement_refs(arm, out)?;
                }
                if let Some(arm) = &branch.else_statement {
                    self.statement_refs(arm, out)?;
                }
            }
            StatementKind::Multi(stmts) | StatementKind::Scoped(stmts) => {
                for stmt in stmts {
                    self.statement_refs(stmt, out)?;
                }
            }
            StatementKind::Expression(expr) | StatementKind::Return(Some(expr)) => self.expr_refs(expr, out),
            _ => {}
        }
        Ok(())
    }

    fn expr_refs(&self, expr: &Expression, out: &mut Vec<DeclId>) {
        if let Some(id) = self.analysis.binding(expr) {
            if matches!(
                self.analysis.decl(id).kind,
                DeclKind::Function(_) | DeclKind::External(_) | DeclKind::Struct(_)
            ) {
                out.push(id);
            }
        }
        for child in children(expr) {
            self.expr_refs(child, out);
        }
    }

    fn emit(&mut self, id: DeclId) -> Result<()> {
        if !self.live.contains(&id) || !self.emitted.insert(id) {
            return Ok(());
        }
        for dep in self.dependencies(id)? {
            self.emit(dep)?;
        }
        let analysis = self.analysis;
        // Function-local structs are written with the function body.
        if analysis.decl(id).local {
            return Ok(());
        }
        match &analysis.decl(id).kind {
            DeclKind::Struct(_) => self.struct_definition(id)?,
            DeclKind::External(info) => self.external(id, &info.ty)?,
            DeclKind::Function(info) if Some(id) == self.entry => self.entry_point(info.decl, &info.params)?,
            DeclKind::Function(info) => {
                let params = info
                    .params
                    .iter()
                    .map(|x| -> Result<String> {
                        let ty = analysis.decl_type(*x).unwrap_or(ExpressionType::NoType);
                        Ok(format!("{} {}", self.type_name(&ty)?, self.decl_name(*x)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let header = format!(
                    "{} {}({})",
                    self.type_name(&info.return_type)?,
                    self.decl_name(id)?,
                    params.join(", ")
                );
                self.line(&header);
                self.block(&info.decl.body)?;
            }
            _ => return Ok(()),
        }
        self.blank();
        Ok(())
    }

    fn struct_definition(&mut self, id: DeclId) -> Result<()> {
        let analysis = self.analysis;
        let info = analysis
            .struct_info(id)
            .ok_or_else(|| anyhow!("declaration #{} is not a struct", id))?;
        if info.fields.is_empty() {
            bail!("struct {} has no field, GLSL requires at least one", analysis.decl(id).name);
        }
        self.line(&format!("struct {}", self.decl_name(id)?));
        self.line("{");
        self.indent += 1;
        for field in &info.fields {
            let text = format!("{} {};", self.type_name(&field.ty)?, identifier(&field.name));
            self.line(&text);
        }
        self.indent -= 1;
        self.line("};");
        Ok(())
    }

    fn external(&mut self, id: DeclId, ty: &ExpressionType) -> Result<()> {
        let name = self.decl_name(id)?;
        let (qualifier, block) = match ty {
            ExpressionType::Uniform(x) => ("layout(std140) uniform", *x),
            ExpressionType::Storage(x) => {
                if !self.env.supports_compute() {
                    let version = self.env.version_name();
                    return Err(BackendError::UnsupportedGlslFeature(version, "storage buffers").into());
                }
                ("layout(std430) buffer", *x)
            }
            _ => {
                let text = format!("uniform {} {};", self.type_name(ty)?, name);
                self.line(&text);
                return Ok(());
            }
        };
        let info = self
            .analysis
            .struct_info(block)
            .ok_or_else(|| anyhow!("external {} is not backed by a struct", name))?;
        self.line(&format!("{} {}{}", qualifier, BINDING_PREFIX, name));
        self.line("{");
        self.indent += 1;
        for field in &info.fields {
            let text = format!("{} {};", self.type_name(&field.ty)?, identifier(&field.name));
            self.line(&text);
        }
        self.indent -= 1;
        self.line(&format!("}} {};", name));
        Ok(())
    }

    fn entry_point(&mut self, decl: &FunctionDecl, params: &[DeclId]) -> Result<()> {
        let stage = decl.entry.or(self.stage);
        if stage == Some(ShaderStage::Fragment)
            && decl.early_fragment_tests == Some(true)
            && self.env.supports_early_fragment_tests()
        {
            self.line("layout(early_fragment_tests) in;");
            self.blank();
        }
        if stage == Some(ShaderStage::Compute) {
            if !self.env.supports_compute() {
                let version = self.env.version_name();
                return Err(BackendError::UnsupportedGlslFeature(version, "compute shaders").into());
            }
            let [x, y, z] = decl.workgroup.unwrap_or([1, 1, 1]);
            self.line(&format!(
                "layout(local_size_x = {}, local_size_y = {}, local_size_z = {}) in;",
                x, y, z
            ));
            self.blank();
        }

        let input = params.first().copied();
        if let Some(param) = input {
            let Some(ExpressionType::Struct(id)) = self.analysis.decl_type(param) else {
                bail!("entry {} must take a struct", decl.name);
            };
            self.inputs = self.io_globals(id, "Inputs", "in", INPUT_PREFIX)?;
        }
        if stage == Some(ShaderStage::Vertex) && self.env.flip_y_position {
            self.line(&format!("uniform float {};", FLIP_Y_UNIFORM));
            self.blank();
        }
        if let Some(ExpressionType::Struct(id)) = self.analysis.function_id(decl).and_then(|x| {
            self.analysis.function_info(x).map(|x| x.return_type.clone())
        }) {
            self.outputs = self.io_globals(id, "Outputs", "out", OUTPUT_PREFIX)?;
        }

        self.line("void main()");
        self.line("{");
        self.indent += 1;
        if let Some(param) = input {
            let ty = self.analysis.decl_type(param).unwrap_or(ExpressionType::NoType);
            let name = self.decl_name(param)?;
            let text = format!("{} {};", self.type_name(&ty)?, name);
            self.line(&text);
            for (member, global) in self.inputs.clone() {
                self.line(&format!("{}.{} = {};", name, member, global));
            }
            self.blank();
        }
        self.in_entry = true;
        for stmt in &decl.body {
            self.statement(stmt)?;
        }
        self.in_entry = false;
        self.indent -= 1;
        self.line("}");
        Ok(())
    }

    /// Declares the globals backing the fields of an IO struct, under a
    /// `title` section when there is at least one.
    fn io_globals(&mut self, id: DeclId, title: &str, keyword: &str, prefix: &str) -> Result<Vec<(String, String)>> {
        let info = self
            .analysis
            .struct_info(id)
            .ok_or_else(|| anyhow!("entry IO must be a struct"))?;
        if info.fields.iter().any(|x| x.builtin.is_none()) {
            self.comment_section(title);
        }
        let mut out = Vec::new();
        for field in &info.fields {
            let member = identifier(&field.name);
            if let Some(builtin) = field.builtin {
                out.push((member, builtin_name(builtin).to_string()));
                continue;
            }
            let global = format!("{}{}", prefix, field.name);
            let mut text = String::new();
            if let (Some(location), true) = (field.location, self.env.supports_explicit_location()) {
                text.push_str(&format!("layout(location = {}) ", location));
            }
            text.push_str(&format!("{} {} {};", keyword, self.type_name(&field.ty)?, global));
            self.line(&text);
            out.push((member, global));
        }
        if info.fields.iter().any(|x| x.builtin.is_none()) {
            self.blank();
        }
        Ok(out)
    }

    fn block(&mut self, stmts: &[Statement]) -> Result<()> {
        self.line("{");
        self.indent += 1;
        for stmt in stmts {
            self.statement(stmt)?;
        }
        self.indent -= 1;
        self.line("}");
        Ok(())
    }

    fn arm(&mut self, stmt: &Statement) -> Result<()> {
        match &stmt.kind {
            StatementKind::Scoped(stmts) => self.block(stmts),
            _ => self.block(std::slice::from_ref(stmt)),
        }
    }

    fn statement(&mut self, stmt: &Statement) -> Result<()> {
        match &stmt.kind {
            StatementKind::DeclareVariable(decl) => {
                let id = self
                    .analysis
                    .variable_id(decl)
                    .ok_or_else(|| anyhow!("variable {} was not analyzed", decl.name))?;
                let ty = self.analysis.decl_type(id).unwrap_or(ExpressionType::NoType);
                let mut text = format!("{} {}", self.type_name(&ty)?, self.decl_name(id)?);
                if let Some(init) = &decl.init {
                    text.push_str(" = ");
                    text.push_str(&self.expr(init)?);
                }
                text.push(';');
                self.line(&text);
            }
            StatementKind::Branch(branch) => {
                if branch.is_const {
                    bail!("const if must be resolved before generating GLSL");
                }
                for (i, (cond, arm)) in branch.cond_statements.iter().enumerate() {
                    let keyword = if i == 0 { "if" } else { "else if" };
                    let text = format!("{} ({})", keyword, self.expr(cond)?);
                    self.line(&text);
                    self.arm(arm)?;
                }
                if let Some(arm) = &branch.else_statement {
                    self.line("else");
                    self.arm(arm)?;
                }
            }
            StatementKind::Multi(stmts) => {
                for stmt in stmts {
                    self.statement(stmt)?;
                }
            }
            StatementKind::Scoped(stmts) => self.block(stmts)?,
            StatementKind::Expression(expr) => {
                let text = format!("{};", self.expr(expr)?);
                self.line(&text);
            }
            StatementKind::Discard => self.line("discard;"),
            StatementKind::Return(Some(value)) if self.in_entry => self.entry_return(value)?,
            StatementKind::Return(Some(value)) => {
                let text = format!("return {};", self.expr(value)?);
                self.line(&text);
            }
            StatementKind::Return(None) => self.line("return;"),
            StatementKind::DeclareConst(_) | StatementKind::DeclareAlias(_) | StatementKind::DeclareOption(_) => {}
            StatementKind::Conditional(_) => bail!("cond attribute must be resolved before generating GLSL"),
            StatementKind::DeclareStruct(decl) => {
                let id = self
                    .analysis
                    .struct_id(decl)
                    .ok_or_else(|| anyhow!("struct {} was not analyzed", decl.name))?;
                self.struct_definition(id)?;
            }
            StatementKind::DeclareExternal(_) | StatementKind::DeclareFunction(_) => {
                bail!("only variables can be declared inside a function")
            }
        }
        Ok(())
    }

    /// Copies the returned struct into the output globals.
    fn entry_return(&mut self, value: &Expression) -> Result<()> {
        let var = match &value.kind {
            ExpressionKind::Identifier(_) => self.expr(value)?,
            _ => {
                let ty = self.analysis.type_of(value)?;
                let text = format!("{} {} = {};", self.type_name(&ty)?, OUTPUT_VAR, self.expr(value)?);
                self.line(&text);
                OUTPUT_VAR.to_string()
            }
        };
        for (member, global) in self.outputs.clone() {
            let flip = self.env.flip_y_position && self.stage == Some(ShaderStage::Vertex) && global == "gl_Position";
            if flip {
                self.line(&format!(
                    "{} = {}.{} * vec4(1.0, {}, 1.0, 1.0);",
                    global, var, member, FLIP_Y_UNIFORM
                ));
            } else {
                self.line(&format!("{} = {}.{};", global, var, member));
            }
        }
        self.line("return;");
        Ok(())
    }

    fn decl_name(&self, id: DeclId) -> Result<String> {
        let decl = self.analysis.decl(id);
        match &decl.kind {
            DeclKind::Struct(_) | DeclKind::Function(_) | DeclKind::External(_) => {
                let name = match decl.module {
                    Some(i) => {
                        let imported = self
                            .analysis
                            .module()
                            .imported_modules
                            .get(i)
                            .ok_or_else(|| anyhow!("unknown imported module #{}", i))?;
                        format!("{}{}", decl.name, imported.identifier)
                    }
                    None => decl.name.clone(),
                };
                Ok(identifier(&name))
            }
            DeclKind::Variable(_) | DeclKind::Parameter(_) => Ok(identifier(&decl.name)),
            _ => bail!("{} {} cannot be referenced in GLSL", decl.kind_name(), decl.name),
        }
    }

    fn primitive(&self, ty: PrimitiveType) -> Result<&'static str> {
        let out = match ty {
            PrimitiveType::Bool => "bool",
            PrimitiveType::I32 => "int",
            PrimitiveType::U32 => "uint",
            PrimitiveType::F32 => "float",
            PrimitiveType::F64 => {
                self.require_f64()?;
                "double"
            }
        };
        Ok(out)
    }

    fn require_f64(&self) -> Result<()> {
        if self.env.supports_f64() {
            Ok(())
        } else {
            Err(BackendError::UnsupportedGlslFeature(self.env.version_name(), "f64").into())
        }
    }

    fn vector_prefix(&self, ty: PrimitiveType) -> Result<&'static str> {
        let out = match ty {
            PrimitiveType::Bool => "b",
            PrimitiveType::I32 => "i",
            PrimitiveType::U32 => "u",
            PrimitiveType::F32 => "",
            PrimitiveType::F64 => {
                self.require_f64()?;
                "d"
            }
        };
        Ok(out)
    }

    fn type_name(&self, ty: &ExpressionType) -> Result<String> {
        use ExpressionType as T;
        let out = match ty {
            T::NoType => "void".to_string(),
            T::Primitive(x) => self.primitive(*x)?.to_string(),
            T::Vector(x, n) => format!("{}vec{}", self.vector_prefix(*x)?, n),
            T::Matrix(x, c, r) if c == r => format!("{}mat{}", self.vector_prefix(*x)?, c),
            T::Matrix(x, c, r) => format!("{}mat{}x{}", self.vector_prefix(*x)?, c, r),
            T::Array(element, length) => format!("{}[{}]", self.type_name(element)?, length),
            T::Struct(id) => self.decl_name(*id)?,
            T::Sampler(dim, sampled) => {
                let prefix = match sampled {
                    PrimitiveType::I32 => "i",
                    PrimitiveType::U32 => "u",
                    _ => "",
                };
                format!("{}sampler{}", prefix, dim.suffix())
            }
            _ => bail!("{} has no GLSL type", ty),
        };
        Ok(out)
    }

    fn constant(&self, value: &ConstantValue) -> Result<String> {
        let out = match value {
            ConstantValue::Bool(x) => x.to_string(),
            ConstantValue::I32(x) if *x < 0 => format!("({})", x),
            ConstantValue::I32(x) => x.to_string(),
            ConstantValue::U32(x) => format!("{}u", x),
            ConstantValue::F32(x) if x.is_sign_negative() => format!("({:.6})", x),
            ConstantValue::F32(x) => format!("{:.6}", x),
            ConstantValue::F64(x) => {
                self.require_f64()?;
                if x.is_sign_negative() {
                    format!("({:.6}lf)", x)
                } else {
                    format!("{:.6}lf", x)
                }
            }
            ConstantValue::Vector(xs) => {
                let args = xs.iter().map(|x| self.constant(x)).collect::<Result<Vec<_>>>()?;
                let prefix = self.vector_prefix(value.primitive_type())?;
                format!("{}vec{}({})", prefix, xs.len(), args.join(", "))
            }
        };
        Ok(out)
    }

    fn operand(&self, expr: &Expression) -> Result<String> {
        let text = self.expr(expr)?;
        let wrap = matches!(
            expr.kind,
            ExpressionKind::Binary { .. } | ExpressionKind::Unary { .. } | ExpressionKind::Assign { .. }
        );
        Ok(if wrap { format!("({})", text) } else { text })
    }

    fn args(&self, args: &[Expression]) -> Result<String> {
        Ok(args.iter().map(|x| self.expr(x)).collect::<Result<Vec<_>>>()?.join(", "))
    }

    fn expr(&self, expr: &Expression) -> Result<String> {
        let out = match &expr.kind {
            ExpressionKind::Constant(value) => self.constant(value)?,
            ExpressionKind::Identifier(name) => {
                let id = self
                    .analysis
                    .binding(expr)
                    .ok_or_else(|| anyhow!("identifier {} was not resolved", name))?;
                self.decl_name(id)?
            }
            ExpressionKind::Binary { op, lhs, rhs } => {
                format!("{} {} {}", self.operand(lhs)?, op.symbol(), self.operand(rhs)?)
            }
            ExpressionKind::Unary { op, expr } => format!("{}{}", op.symbol(), self.operand(expr)?),
            ExpressionKind::Assign { op, lhs, rhs } => {
                format!("{} {} {}", self.expr(lhs)?, op.symbol(), self.expr(rhs)?)
            }
            ExpressionKind::Cast { args, .. } => {
                let ty = self.analysis.type_of(expr)?;
                format!("{}({})", self.type_name(&ty)?, self.args(args)?)
            }
            ExpressionKind::AccessMember { expr: inner, member } => match self.analysis.binding(expr) {
                Some(id) => self.decl_name(id)?,
                None => format!("{}.{}", self.operand(inner)?, identifier(member)),
            },
            ExpressionKind::AccessIndex { expr: inner, index } => {
                format!("{}[{}]", self.operand(inner)?, self.expr(index)?)
            }
            ExpressionKind::Swizzle { expr: inner, components } => {
                let inner_ty = self.analysis.type_of(inner)?;
                match inner_ty {
                    // Scalars cannot be swizzled in GLSL, splat them instead.
                    ExpressionType::Primitive(_) if components.len() == 1 => self.operand(inner)?,
                    ExpressionType::Primitive(base) => {
                        let ty = ExpressionType::Vector(base, components.len() as u32);
                        format!("{}({})", self.type_name(&ty)?, self.expr(inner)?)
                    }
                    _ => {
                        let pattern = components
                            .iter()
                            .map(|x| SWIZZLE.get(*x as usize).copied().unwrap_or('x'))
                            .collect::<String>();
                        format!("{}.{}", self.operand(inner)?, pattern)
                    }
                }
            }
            ExpressionKind::CallFunction { callee, args } => match self.analysis.type_of(callee)? {
                ExpressionType::Method(_, IntrinsicType::SampleTexture) => {
                    let ExpressionKind::AccessMember { expr: sampler, .. } = &callee.kind else {
                        bail!("Sample must be called on a sampler");
                    };
                    format!("texture({}, {})", self.expr(sampler)?, self.args(args)?)
                }
                _ => format!("{}({})", self.expr(callee)?, self.args(args)?),
            },
            ExpressionKind::Intrinsic { intrinsic, args } => {
                format!("{}({})", intrinsic_name(*intrinsic), self.args(args)?)
            }
            ExpressionKind::Conditional { .. } => bail!("const_select must be resolved before generating GLSL"),
        };
        Ok(out)
    }
}

fn intrinsic_name(intrinsic: IntrinsicType) -> &'static str {
    match intrinsic {
        IntrinsicType::Lerp => "mix",
        IntrinsicType::SampleTexture => "texture",
        x => x.name(),
    }
}

fn builtin_name(builtin: BuiltinEntry) -> &'static str {
    match builtin {
        BuiltinEntry::FragCoord => "gl_FragCoord",
        BuiltinEntry::FragDepth => "gl_FragDepth",
        BuiltinEntry::Position => "gl_Position",
        BuiltinEntry::VertexIndex => "gl_VertexID",
        BuiltinEntry::GlobalInvocationIndices => "gl_GlobalInvocationID",
        BuiltinEntry::LocalInvocationIndices => "gl_LocalInvocationID",
        BuiltinEntry::WorkgroupIndices => "gl_WorkGroupID",
    }
}

/// Structs a type refers to.
fn struct_refs(ty: &ExpressionType, out: &mut Vec<DeclId>) {
    match ty {
        ExpressionType::Struct(id) | ExpressionType::Uniform(id) | ExpressionType::Storage(id) => out.push(*id),
        ExpressionType::Array(element, _) => struct_refs(element, out),
        _ => {}
    }
}

/// Direct sub-expressions of `expr`.
fn children(expr: &Expression) -> Vec<&Expression> {
    match &expr.kind {
        ExpressionKind::Constant(_) | ExpressionKind::Identifier(_) => Vec::new(),
        ExpressionKind::Binary { lhs, rhs, .. } | ExpressionKind::Assign { lhs, rhs, .. } => vec![lhs, rhs],
        ExpressionKind::Unary { expr, .. }
        | ExpressionKind::AccessMember { expr, .. }
        | ExpressionKind::Swizzle { expr, .. } => vec![expr],
        ExpressionKind::AccessIndex { expr, index } => vec![expr, index],
        ExpressionKind::Cast { args, .. } | ExpressionKind::Intrinsic { args, .. } => args.iter().collect(),
        ExpressionKind::CallFunction { callee, args } => std::iter::once(&**callee).chain(args).collect(),
        ExpressionKind::Conditional {
            condition,
            true_expr,
            false_expr,
        } => vec![condition, true_expr, false_expr],
    }
}

impl Default for GlslWriter {
    fn default() -> Self {
        Self::new(GlslEnvironment::default())
    }
}
