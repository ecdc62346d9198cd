//! Binary form of a module (`.nzslb`), so a checked module can be stored
//! and compiled later without its source.
//!
//! Everything is little-endian. The stream opens with a magic number and a
//! format version, followed by the module. Strings and lists are prefixed
//! with their `u32` length, optional values with a `0`/`1` byte and enums
//! are a single tag byte. Source spans are kept so diagnostics raised on a
//! loaded module still point into the original file.
use anyhow::{bail, Result};

use super::*;

pub const MAGIC_NUMBER: u32 = 0x4E53_4852;
pub const VERSION: u32 = 1;

/// Nesting allowed while reading. Parsed modules stay well below it.
const MAX_DEPTH: usize = 256;

/// Enum stored as a single tag byte.
trait Tagged: Copy + Sized {
    const NAME: &'static str;
    fn tag(self) -> u8;
    fn from_tag(tag: u8) -> Option<Self>;
}

macro_rules! def_tagged {
    ($($ty:ident($name:literal) { $($variant:ident = $tag:literal,)* })*) => {
        $(
            impl Tagged for $ty {
                const NAME: &'static str = $name;
                fn tag(self) -> u8 {
                    match self {
                        $($ty::$variant => $tag,)*
                    }
                }
                fn from_tag(tag: u8) -> Option<Self> {
                    match tag {
                        $($tag => Some($ty::$variant),)*
                        _ => None,
                    }
                }
            }
        )*
    };
}

def_tagged! {
    PrimitiveType("primitive type") {
        Bool = 0, I32 = 1, U32 = 2, F32 = 3, F64 = 4,
    }
    SamplerDim("sampler dimension") {
        Dim1D = 0, Dim2D = 1, Dim3D = 2, Cube = 3,
    }
    MemoryLayout("memory layout") {
        Std140 = 0, Std430 = 1,
    }
    ShaderStage("shader stage") {
        Vertex = 0, Fragment = 1, Compute = 2,
    }
    BuiltinEntry("builtin") {
        FragCoord = 0, FragDepth = 1, Position = 2, VertexIndex = 3,
        GlobalInvocationIndices = 4, LocalInvocationIndices = 5, WorkgroupIndices = 6,
    }
    DepthWriteMode("depth write mode") {
        Greater = 0, Less = 1, Replace = 2, Unchanged = 3,
    }
    BinaryOp("binary operator") {
        Add = 0, Subtract = 1, Multiply = 2, Divide = 3,
        CompEq = 4, CompNe = 5, CompLt = 6, CompLe = 7, CompGt = 8, CompGe = 9,
        LogicalAnd = 10, LogicalOr = 11,
    }
    UnaryOp("unary operator") {
        Minus = 0, LogicalNot = 1,
    }
    AssignOp("assignment operator") {
        Simple = 0, Add = 1, Subtract = 2, Multiply = 3, Divide = 4,
    }
    IntrinsicType("intrinsic") {
        CrossProduct = 0, DotProduct = 1, Exp = 2, Length = 3, Max = 4, Min = 5,
        Normalize = 6, Pow = 7, Reflect = 8, Sqrt = 9, Clamp = 10, Lerp = 11,
        SampleTexture = 12,
    }
}

/// Encodes `module` with its header.
pub fn serialize_module(module: &Module) -> Vec<u8> {
    let mut s = AstSerializer::default();
    s.u32(MAGIC_NUMBER);
    s.u32(VERSION);
    s.module(module);
    s.buf
}

/// Decodes a module produced by [`serialize_module`].
pub fn deserialize_module(bytes: &[u8]) -> Result<Module> {
    let mut d = AstDeserializer {
        bytes,
        offset: 0,
        depth: 0,
    };
    let magic = d.u32()?;
    if magic != MAGIC_NUMBER {
        bail!("invalid nzslb magic number {:#010x}", magic);
    }
    let version = d.u32()?;
    if version != VERSION {
        bail!("unsupported nzslb version {}, expected {}", version, VERSION);
    }
    let module = d.module()?;
    if d.offset != bytes.len() {
        bail!("{} trailing bytes after module", bytes.len() - d.offset);
    }
    Ok(module)
}

#[derive(Default)]
struct AstSerializer {
    buf: Vec<u8>,
}
impl AstSerializer {
    fn u8(&mut self, x: u8) {
        self.buf.push(x);
    }
    fn u32(&mut self, x: u32) {
        self.buf.extend(x.to_le_bytes());
    }
    fn len(&mut self, x: usize) {
        self.u32(x as u32);
    }
    fn bool(&mut self, x: bool) {
        self.u8(x as u8);
    }
    fn tag<T: Tagged>(&mut self, x: T) {
        self.u8(x.tag());
    }
    fn str(&mut self, x: &str) {
        self.len(x.len());
        self.buf.extend_from_slice(x.as_bytes());
    }
    fn opt<T>(&mut self, x: Option<T>, f: impl FnOnce(&mut Self, T)) {
        match x {
            Some(x) => {
                self.u8(1);
                f(self, x);
            }
            None => self.u8(0),
        }
    }
    fn list<T>(&mut self, xs: &[T], mut f: impl FnMut(&mut Self, &T)) {
        self.len(xs.len());
        for x in xs {
            f(self, x);
        }
    }
    fn span(&mut self, span: Span) {
        self.u32(span.start.line);
        self.u32(span.start.column);
        self.u32(span.end.line);
        self.u32(span.end.column);
    }

    fn module(&mut self, module: &Module) {
        let metadata = &module.metadata;
        self.opt(metadata.module_name.as_deref(), Self::str);
        self.opt(metadata.author.as_deref(), Self::str);
        self.opt(metadata.description.as_deref(), Self::str);
        self.u32(metadata.lang_version.major);
        self.u32(metadata.lang_version.minor);
        self.opt(metadata.uuid, |s, x| s.buf.extend_from_slice(x.as_bytes()));
        self.list(&module.imports, |s, x| {
            s.list(&x.path, |s, x| s.str(x));
            s.span(x.span);
        });
        self.list(&module.imported_modules, |s, x| {
            s.str(&x.identifier);
            s.module(&x.module);
        });
        self.list(&module.statements, Self::stmt);
    }

    fn ty(&mut self, ty: &TypeExpr) {
        match ty {
            TypeExpr::Primitive(x) => {
                self.u8(0);
                self.tag(*x);
            }
            TypeExpr::Vector { base, count } => {
                self.u8(1);
                self.tag(*base);
                self.u32(*count);
            }
            TypeExpr::Matrix { base, columns, rows } => {
                self.u8(2);
                self.tag(*base);
                self.u32(*columns);
                self.u32(*rows);
            }
            TypeExpr::Array { element, length } => {
                self.u8(3);
                self.ty(element);
                self.u32(*length);
            }
            TypeExpr::Sampler { dim, sampled } => {
                self.u8(4);
                self.tag(*dim);
                self.tag(*sampled);
            }
            TypeExpr::Uniform(x) => {
                self.u8(5);
                self.ty(x);
            }
            TypeExpr::Storage(x) => {
                self.u8(6);
                self.ty(x);
            }
            TypeExpr::Named(path) => {
                self.u8(7);
                self.list(path, |s, x| s.str(x));
            }
        }
    }

    fn constant(&mut self, value: &ConstantValue) {
        match value {
            ConstantValue::Bool(x) => {
                self.u8(0);
                self.bool(*x);
            }
            ConstantValue::I32(x) => {
                self.u8(1);
                self.u32(*x as u32);
            }
            ConstantValue::U32(x) => {
                self.u8(2);
                self.u32(*x);
            }
            ConstantValue::F32(x) => {
                self.u8(3);
                self.u32(x.to_bits());
            }
            ConstantValue::F64(x) => {
                self.u8(4);
                self.buf.extend(x.to_bits().to_le_bytes());
            }
            ConstantValue::Vector(xs) => {
                self.u8(5);
                self.list(xs, Self::constant);
            }
        }
    }

    fn expr(&mut self, expr: &Expression) {
        self.span(expr.span);
        match &expr.kind {
            ExpressionKind::Constant(x) => {
                self.u8(0);
                self.constant(x);
            }
            ExpressionKind::Identifier(x) => {
                self.u8(1);
                self.str(x);
            }
            ExpressionKind::Binary { op, lhs, rhs } => {
                self.u8(2);
                self.tag(*op);
                self.expr(lhs);
                self.expr(rhs);
            }
            ExpressionKind::Unary { op, expr } => {
                self.u8(3);
                self.tag(*op);
                self.expr(expr);
            }
            ExpressionKind::Assign { op, lhs, rhs } => {
                self.u8(4);
                self.tag(*op);
                self.expr(lhs);
                self.expr(rhs);
            }
            ExpressionKind::Cast { target, args } => {
                self.u8(5);
                self.ty(target);
                self.list(args, Self::expr);
            }
            ExpressionKind::AccessMember { expr, member } => {
                self.u8(6);
                self.expr(expr);
                self.str(member);
            }
            ExpressionKind::AccessIndex { expr, index } => {
                self.u8(7);
                self.expr(expr);
                self.expr(index);
            }
            ExpressionKind::Swizzle { expr, components } => {
                self.u8(8);
                self.expr(expr);
                self.list(components, |s, x| s.u32(*x));
            }
            ExpressionKind::CallFunction { callee, args } => {
                self.u8(9);
                self.expr(callee);
                self.list(args, Self::expr);
            }
            ExpressionKind::Intrinsic { intrinsic, args } => {
                self.u8(10);
                self.tag(*intrinsic);
                self.list(args, Self::expr);
            }
            ExpressionKind::Conditional {
                condition,
                true_expr,
                false_expr,
            } => {
                self.u8(11);
                self.expr(condition);
                self.expr(true_expr);
                self.expr(false_expr);
            }
        }
    }

    fn stmt(&mut self, stmt: &Statement) {
        self.span(stmt.span);
        match &stmt.kind {
            StatementKind::DeclareStruct(decl) => {
                self.u8(0);
                self.str(&decl.name);
                self.opt(decl.layout, Self::tag);
                self.bool(decl.export);
                self.list(&decl.fields, |s, field| {
                    s.str(&field.name);
                    s.ty(&field.ty);
                    s.opt(field.location, Self::u32);
                    s.opt(field.builtin, Self::tag);
                    s.opt(field.cond.as_ref(), Self::expr);
                    s.span(field.span);
                });
            }
            StatementKind::DeclareExternal(decl) => {
                self.u8(1);
                self.opt(decl.set, Self::u32);
                self.list(&decl.vars, |s, var| {
                    s.str(&var.name);
                    s.ty(&var.ty);
                    s.opt(var.set, Self::u32);
                    s.opt(var.binding, Self::u32);
                    s.span(var.span);
                });
            }
            StatementKind::DeclareFunction(func) => {
                self.u8(2);
                self.str(&func.name);
                self.list(&func.params, |s, param| {
                    s.str(&param.name);
                    s.ty(&param.ty);
                    s.span(param.span);
                });
                self.opt(func.return_type.as_ref(), Self::ty);
                self.opt(func.entry, Self::tag);
                self.bool(func.export);
                self.opt(func.depth_write, Self::tag);
                self.opt(func.early_fragment_tests, Self::bool);
                self.opt(func.workgroup, |s, xs| xs.into_iter().for_each(|x| s.u32(x)));
                self.list(&func.body, Self::stmt);
            }
            StatementKind::DeclareVariable(decl) => {
                self.u8(3);
                self.str(&decl.name);
                self.opt(decl.ty.as_ref(), Self::ty);
                self.opt(decl.init.as_ref(), Self::expr);
            }
            StatementKind::DeclareAlias(decl) => {
                self.u8(4);
                self.str(&decl.name);
                self.ty(&decl.target);
            }
            StatementKind::DeclareOption(decl) => {
                self.u8(5);
                self.str(&decl.name);
                self.ty(&decl.ty);
                self.opt(decl.default.as_ref(), Self::expr);
            }
            StatementKind::DeclareConst(decl) => {
                self.u8(6);
                self.str(&decl.name);
                self.opt(decl.ty.as_ref(), Self::ty);
                self.expr(&decl.value);
            }
            StatementKind::Branch(branch) => {
                self.u8(7);
                self.list(&branch.cond_statements, |s, (cond, stmt)| {
                    s.expr(cond);
                    s.stmt(stmt);
                });
                self.opt(branch.else_statement.as_deref(), Self::stmt);
                self.bool(branch.is_const);
            }
            StatementKind::Conditional(cond) => {
                self.u8(8);
                self.expr(&cond.condition);
                self.stmt(&cond.statement);
            }
            StatementKind::Multi(stmts) => {
                self.u8(9);
                self.list(stmts, Self::stmt);
            }
            StatementKind::Scoped(stmts) => {
                self.u8(10);
                self.list(stmts, Self::stmt);
            }
            StatementKind::Expression(expr) => {
                self.u8(11);
                self.expr(expr);
            }
            StatementKind::Discard => self.u8(12),
            StatementKind::Return(value) => {
                self.u8(13);
                self.opt(value.as_ref(), Self::expr);
            }
        }
    }
}

struct AstDeserializer<'a> {
    bytes: &'a [u8],
    offset: usize,
    depth: usize,
}
impl<'a> AstDeserializer<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let Some(out) = self.bytes.get(self.offset..self.offset.saturating_add(n)) else {
            bail!("unexpected end of nzslb data at byte {}", self.offset);
        };
        self.offset += n;
        Ok(out)
    }
    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }
    fn u32(&mut self) -> Result<u32> {
        let mut word = [0; 4];
        word.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(word))
    }
    fn u64(&mut self) -> Result<u64> {
        let mut word = [0; 8];
        word.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(word))
    }
    fn bool(&mut self) -> Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            x => bail!("invalid boolean {} at byte {}", x, self.offset - 1),
        }
    }
    fn tag<T: Tagged>(&mut self) -> Result<T> {
        let tag = self.u8()?;
        match T::from_tag(tag) {
            Some(x) => Ok(x),
            None => bail!("invalid {} tag {} at byte {}", T::NAME, tag, self.offset - 1),
        }
    }
    /// Reads the tag of a node kind.
    fn kind(&mut self, what: &str, count: u8) -> Result<u8> {
        let tag = self.u8()?;
        if tag >= count {
            bail!("invalid {} tag {} at byte {}", what, tag, self.offset - 1);
        }
        Ok(tag)
    }
    fn str(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        match std::str::from_utf8(bytes) {
            Ok(x) => Ok(x.to_string()),
            Err(_) => bail!("invalid utf-8 string at byte {}", self.offset - len),
        }
    }
    fn opt<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<Option<T>> {
        if self.bool()? {
            Ok(Some(f(self)?))
        } else {
            Ok(None)
        }
    }
    fn list<T>(&mut self, mut f: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let len = self.u32()?;
        let mut out = Vec::new();
        for _ in 0..len {
            out.push(f(self)?);
        }
        Ok(out)
    }
    fn span(&mut self) -> Result<Span> {
        Ok(Span::new(self.u32()?, self.u32()?, self.u32()?, self.u32()?))
    }
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_DEPTH {
            bail!("nzslb data is nested too deeply at byte {}", self.offset);
        }
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }
    fn boxed_ty(&mut self) -> Result<Box<TypeExpr>> {
        Ok(Box::new(self.ty()?))
    }
    fn boxed_expr(&mut self) -> Result<Box<Expression>> {
        Ok(Box::new(self.expr()?))
    }

    fn module(&mut self) -> Result<Module> {
        self.nested(|d| {
            let metadata = ModuleMetadata {
                module_name: d.opt(Self::str)?,
                author: d.opt(Self::str)?,
                description: d.opt(Self::str)?,
                lang_version: LangVersion {
                    major: d.u32()?,
                    minor: d.u32()?,
                },
                uuid: d.opt(|d| {
                    let mut bytes = [0; 16];
                    bytes.copy_from_slice(d.take(16)?);
                    Ok(Uuid::from_bytes(bytes))
                })?,
            };
            let imports = d.list(|d| {
                Ok(ImportDirective {
                    path: d.list(Self::str)?,
                    span: d.span()?,
                })
            })?;
            let imported_modules = d.list(|d| {
                Ok(ImportedModule {
                    identifier: d.str()?,
                    module: d.module()?,
                })
            })?;
            let statements = d.list(Self::stmt)?;
            Ok(Module {
                metadata,
                imports,
                imported_modules,
                statements,
            })
        })
    }

    fn ty(&mut self) -> Result<TypeExpr> {
        self.nested(|d| {
            let ty = match d.kind("type", 8)? {
                0 => TypeExpr::Primitive(d.tag()?),
                1 => TypeExpr::Vector {
                    base: d.tag()?,
                    count: d.u32()?,
                },
                2 => TypeExpr::Matrix {
                    base: d.tag()?,
                    columns: d.u32()?,
                    rows: d.u32()?,
                },
                3 => TypeExpr::Array {
                    element: d.boxed_ty()?,
                    length: d.u32()?,
                },
                4 => TypeExpr::Sampler {
                    dim: d.tag()?,
                    sampled: d.tag()?,
                },
                5 => TypeExpr::Uniform(d.boxed_ty()?),
                6 => TypeExpr::Storage(d.boxed_ty()?),
                _ => TypeExpr::Named(d.list(Self::str)?),
            };
            Ok(ty)
        })
    }

    fn constant(&mut self) -> Result<ConstantValue> {
        self.nested(|d| {
            let value = match d.kind("constant", 6)? {
                0 => ConstantValue::Bool(d.bool()?),
                1 => ConstantValue::I32(d.u32()? as i32),
                2 => ConstantValue::U32(d.u32()?),
                3 => ConstantValue::F32(f32::from_bits(d.u32()?)),
                4 => ConstantValue::F64(f64::from_bits(d.u64()?)),
                _ => ConstantValue::Vector(d.list(Self::constant)?),
            };
            Ok(value)
        })
    }

    fn expr(&mut self) -> Result<Expression> {
        self.nested(|d| {
            let span = d.span()?;
            let kind = match d.kind("expression", 12)? {
                0 => ExpressionKind::Constant(d.constant()?),
                1 => ExpressionKind::Identifier(d.str()?),
                2 => ExpressionKind::Binary {
                    op: d.tag()?,
                    lhs: d.boxed_expr()?,
                    rhs: d.boxed_expr()?,
                },
                3 => ExpressionKind::Unary {
                    op: d.tag()?,
                    expr: d.boxed_expr()?,
                },
                4 => ExpressionKind::Assign {
                    op: d.tag()?,
                    lhs: d.boxed_expr()?,
                    rhs: d.boxed_expr()?,
                },
                5 => ExpressionKind::Cast {
                    target: d.ty()?,
                    args: d.list(Self::expr)?,
                },
                6 => ExpressionKind::AccessMember {
                    expr: d.boxed_expr()?,
                    member: d.str()?,
                },
                7 => ExpressionKind::AccessIndex {
                    expr: d.boxed_expr()?,
                    index: d.boxed_expr()?,
                },
                8 => ExpressionKind::Swizzle {
                    expr: d.boxed_expr()?,
                    components: d.list(Self::u32)?,
                },
                9 => ExpressionKind::CallFunction {
                    callee: d.boxed_expr()?,
                    args: d.list(Self::expr)?,
                },
                10 => ExpressionKind::Intrinsic {
                    intrinsic: d.tag()?,
                    args: d.list(Self::expr)?,
                },
                _ => ExpressionKind::Conditional {
                    condition: d.boxed_expr()?,
                    true_expr: d.boxed_expr()?,
                    false_expr: d.boxed_expr()?,
                },
            };
            Ok(Expression::new(kind, span))
        })
    }

    fn stmt(&mut self) -> Result<Statement> {
        self.nested(|d| {
            let span = d.span()?;
            let kind = match d.kind("statement", 14)? {
                0 => StatementKind::DeclareStruct(StructDecl {
                    name: d.str()?,
                    layout: d.opt(Self::tag)?,
                    export: d.bool()?,
                    fields: d.list(|d| {
                        Ok(StructField {
                            name: d.str()?,
                            ty: d.ty()?,
                            location: d.opt(Self::u32)?,
                            builtin: d.opt(Self::tag)?,
                            cond: d.opt(Self::expr)?,
                            span: d.span()?,
                        })
                    })?,
                }),
                1 => StatementKind::DeclareExternal(ExternalDecl {
                    set: d.opt(Self::u32)?,
                    vars: d.list(|d| {
                        Ok(ExternalVar {
                            name: d.str()?,
                            ty: d.ty()?,
                            set: d.opt(Self::u32)?,
                            binding: d.opt(Self::u32)?,
                            span: d.span()?,
                        })
                    })?,
                }),
                2 => StatementKind::DeclareFunction(FunctionDecl {
                    name: d.str()?,
                    params: d.list(|d| {
                        Ok(Parameter {
                            name: d.str()?,
                            ty: d.ty()?,
                            span: d.span()?,
                        })
                    })?,
                    return_type: d.opt(Self::ty)?,
                    entry: d.opt(Self::tag)?,
                    export: d.bool()?,
                    depth_write: d.opt(Self::tag)?,
                    early_fragment_tests: d.opt(Self::bool)?,
                    workgroup: d.opt(|d| Ok([d.u32()?, d.u32()?, d.u32()?]))?,
                    body: d.list(Self::stmt)?,
                }),
                3 => StatementKind::DeclareVariable(VariableDecl {
                    name: d.str()?,
                    ty: d.opt(Self::ty)?,
                    init: d.opt(Self::expr)?,
                }),
                4 => StatementKind::DeclareAlias(AliasDecl {
                    name: d.str()?,
                    target: d.ty()?,
                }),
                5 => StatementKind::DeclareOption(OptionDecl {
                    name: d.str()?,
                    ty: d.ty()?,
                    default: d.opt(Self::expr)?,
                }),
                6 => StatementKind::DeclareConst(ConstDecl {
                    name: d.str()?,
                    ty: d.opt(Self::ty)?,
                    value: d.expr()?,
                }),
                7 => StatementKind::Branch(BranchStatement {
                    cond_statements: d.list(|d| Ok((d.expr()?, d.stmt()?)))?,
                    else_statement: d.opt(|d| Ok(Box::new(d.stmt()?)))?,
                    is_const: d.bool()?,
                }),
                8 => StatementKind::Conditional(ConditionalStatement {
                    condition: d.expr()?,
                    statement: Box::new(d.stmt()?),
                }),
                9 => StatementKind::Multi(d.list(Self::stmt)?),
                10 => StatementKind::Scoped(d.list(Self::stmt)?),
                11 => StatementKind::Expression(d.expr()?),
                12 => StatementKind::Discard,
                _ => StatementKind::Return(d.opt(Self::expr)?),
            };
            Ok(Statement::new(kind, span))
        })
    }
}
