//! Module AST produced by the parser and consumed by every later pass.
use std::fmt;

use super::common::{ConstantValue, PrimitiveType, Span, Uuid};

pub mod compare;
pub mod export;
pub mod serialize;


#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LangVersion {
    pub major: u32,
    pub minor: u32,
}
impl LangVersion {
    pub fn parse(s: &str) -> Option<Self> {
        let (major, minor) = s.split_once('.')?;
        let major = major.parse::<u32>().ok()?;
        let minor = minor.parse::<u32>().ok()?;
        Some(Self { major, minor })
    }
}
impl Default for LangVersion {
    fn default() -> Self {
        Self { major: 1, minor: 0 }
    }
}
impl fmt::Display for LangVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleMetadata {
    /// Dotted module name, `None` for anonymous (`module;`) modules.
    pub module_name: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub lang_version: LangVersion,
    pub uuid: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct ImportDirective {
    pub path: Vec<String>,
    pub span: Span,
}

/// Module pulled in through `import`, renamed to a generated identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedModule {
    pub identifier: String,
    pub module: Module,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub metadata: ModuleMetadata,
    pub imports: Vec<ImportDirective>,
    pub imported_modules: Vec<ImportedModule>,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}
impl ShaderStage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Vertex => "vert",
            Self::Fragment => "frag",
            Self::Compute => "compute",
        }
    }
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "vert" => Some(Self::Vertex),
            "frag" => Some(Self::Fragment),
            "compute" => Some(Self::Compute),
            _ => None,
        }
    }
}
impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryLayout {
    Std140,
    Std430,
}
impl MemoryLayout {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Std140 => "std140",
            Self::Std430 => "std430",
        }
    }
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "std140" => Some(Self::Std140),
            "std430" => Some(Self::Std430),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinEntry {
    FragCoord,
    FragDepth,
    Position,
    VertexIndex,
    GlobalInvocationIndices,
    LocalInvocationIndices,
    WorkgroupIndices,
}
impl BuiltinEntry {
    pub const ALL: [BuiltinEntry; 7] = [
        Self::FragCoord,
        Self::FragDepth,
        Self::Position,
        Self::VertexIndex,
        Self::GlobalInvocationIndices,
        Self::LocalInvocationIndices,
        Self::WorkgroupIndices,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::FragCoord => "fragcoord",
            Self::FragDepth => "frag_depth",
            Self::Position => "position",
            Self::VertexIndex => "vertex_index",
            Self::GlobalInvocationIndices => "global_invocation_indices",
            Self::LocalInvocationIndices => "local_invocation_indices",
            Self::WorkgroupIndices => "workgroup_indices",
        }
    }
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|x| x.name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthWriteMode {
    Greater,
    Less,
    Replace,
    Unchanged,
}
impl DepthWriteMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Greater => "greater",
            Self::Less => "less",
            Self::Replace => "replace",
            Self::Unchanged => "unchanged",
        }
    }
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "greater" => Some(Self::Greater),
            "less" => Some(Self::Less),
            "replace" => Some(Self::Replace),
            "unchanged" => Some(Self::Unchanged),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerDim {
    Dim1D,
    Dim2D,
    Dim3D,
    Cube,
}
impl SamplerDim {
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Dim1D => "1D",
            Self::Dim2D => "2D",
            Self::Dim3D => "3D",
            Self::Cube => "Cube",
        }
    }
    /// Component count of the coordinates used to sample such a texture.
    pub fn coordinate_count(&self) -> u32 {
        match self {
            Self::Dim1D => 1,
            Self::Dim2D => 2,
            Self::Dim3D | Self::Cube => 3,
        }
    }
}

/// Type as written in source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeExpr {
    Primitive(PrimitiveType),
    Vector { base: PrimitiveType, count: u32 },
    Matrix { base: PrimitiveType, columns: u32, rows: u32 },
    Array { element: Box<TypeExpr>, length: u32 },
    Sampler { dim: SamplerDim, sampled: PrimitiveType },
    Uniform(Box<TypeExpr>),
    Storage(Box<TypeExpr>),
    /// Struct, alias or module member, e.g. `Data` or `_181c45e9.Block`.
    Named(Vec<String>),
}
impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Primitive(x) => write!(f, "{}", x),
            TypeExpr::Vector { base, count } => write!(f, "vec{}[{}]", count, base),
            TypeExpr::Matrix { base, columns, rows } => {
                if columns == rows {
                    write!(f, "mat{}[{}]", columns, base)
                } else {
                    write!(f, "mat{}x{}[{}]", columns, rows, base)
                }
            }
            TypeExpr::Array { element, length } => write!(f, "array[{}, {}]", element, length),
            TypeExpr::Sampler { dim, sampled } => write!(f, "sampler{}[{}]", dim.suffix(), sampled),
            TypeExpr::Uniform(x) => write!(f, "uniform[{}]", x),
            TypeExpr::Storage(x) => write!(f, "storage[{}]", x),
            TypeExpr::Named(path) => f.write_str(&path.join(".")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    CompEq,
    CompNe,
    CompLt,
    CompLe,
    CompGt,
    CompGe,
    LogicalAnd,
    LogicalOr,
}
impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::CompEq => "==",
            Self::CompNe => "!=",
            Self::CompLt => "<",
            Self::CompLe => "<=",
            Self::CompGt => ">",
            Self::CompGe => ">=",
            Self::LogicalAnd => "&&",
            Self::LogicalOr => "||",
        }
    }
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::CompEq | Self::CompNe | Self::CompLt | Self::CompLe | Self::CompGt | Self::CompGe
        )
    }
    pub fn is_logical(&self) -> bool {
        matches!(self, Self::LogicalAnd | Self::LogicalOr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Minus,
    LogicalNot,
}
impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Minus => "-",
            Self::LogicalNot => "!",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignOp {
    Simple,
    Add,
    Subtract,
    Multiply,
    Divide,
}
impl AssignOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Simple => "=",
            Self::Add => "+=",
            Self::Subtract => "-=",
            Self::Multiply => "*=",
            Self::Divide => "/=",
        }
    }
    /// Binary operator applied by a compound assignment.
    pub fn binary_op(&self) -> Option<BinaryOp> {
        match self {
            Self::Simple => None,
            Self::Add => Some(BinaryOp::Add),
            Self::Subtract => Some(BinaryOp::Subtract),
            Self::Multiply => Some(BinaryOp::Multiply),
            Self::Divide => Some(BinaryOp::Divide),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntrinsicType {
    CrossProduct,
    DotProduct,
    Exp,
    Length,
    Max,
    Min,
    Normalize,
    Pow,
    Reflect,
    Sqrt,
    Clamp,
    Lerp,
    SampleTexture,
}
impl IntrinsicType {
    /// Intrinsics callable as free functions.
    pub const FREE_FUNCTIONS: [IntrinsicType; 12] = [
        Self::CrossProduct,
        Self::DotProduct,
        Self::Exp,
        Self::Length,
        Self::Max,
        Self::Min,
        Self::Normalize,
        Self::Pow,
        Self::Reflect,
        Self::Sqrt,
        Self::Clamp,
        Self::Lerp,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::CrossProduct => "cross",
            Self::DotProduct => "dot",
            Self::Exp => "exp",
            Self::Length => "length",
            Self::Max => "max",
            Self::Min => "min",
            Self::Normalize => "normalize",
            Self::Pow => "pow",
            Self::Reflect => "reflect",
            Self::Sqrt => "sqrt",
            Self::Clamp => "clamp",
            Self::Lerp => "lerp",
            Self::SampleTexture => "Sample",
        }
    }
    pub fn from_name(name: &str) -> Option<Self> {
        Self::FREE_FUNCTIONS.iter().copied().find(|x| x.name() == name)
    }
}

#[derive(Debug, Clone)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub span: Span,
}
impl Expression {
    pub fn new(kind: ExpressionKind, span: Span) -> Self {
        Self { kind, span }
    }
    pub fn constant(value: ConstantValue, span: Span) -> Self {
        Self::new(ExpressionKind::Constant(value), span)
    }
    pub fn identifier(name: impl Into<String>, span: Span) -> Self {
        Self::new(ExpressionKind::Identifier(name.into()), span)
    }
    pub fn as_constant(&self) -> Option<&ConstantValue> {
        match &self.kind {
            ExpressionKind::Constant(x) => Some(x),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Constant(ConstantValue),
    Identifier(String),
    Binary {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expression>,
    },
    Assign {
        op: AssignOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    /// Scalar conversion or vector/matrix construction.
    Cast {
        target: TypeExpr,
        args: Vec<Expression>,
    },
    AccessMember {
        expr: Box<Expression>,
        member: String,
    },
    AccessIndex {
        expr: Box<Expression>,
        index: Box<Expression>,
    },
    Swizzle {
        expr: Box<Expression>,
        components: Vec<u32>,
    },
    /// Function call, or method call when the callee is a member access.
    CallFunction {
        callee: Box<Expression>,
        args: Vec<Expression>,
    },
    Intrinsic {
        intrinsic: IntrinsicType,
        args: Vec<Expression>,
    },
    /// Compile-time selection, written `const_select(cond, a, b)`.
    Conditional {
        condition: Box<Expression>,
        true_expr: Box<Expression>,
        false_expr: Box<Expression>,
    },
}

#[derive(Debug, Clone)]
pub struct StructField {
    pub name: String,
    pub ty: TypeExpr,
    pub location: Option<u32>,
    pub builtin: Option<BuiltinEntry>,
    pub cond: Option<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub name: String,
    pub layout: Option<MemoryLayout>,
    pub export: bool,
    pub fields: Vec<StructField>,
}

#[derive(Debug, Clone)]
pub struct ExternalVar {
    pub name: String,
    pub ty: TypeExpr,
    pub set: Option<u32>,
    pub binding: Option<u32>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalDecl {
    /// Default descriptor set for the block's variables.
    pub set: Option<u32>,
    pub vars: Vec<ExternalVar>,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeExpr>,
    pub entry: Option<ShaderStage>,
    pub export: bool,
    pub depth_write: Option<DepthWriteMode>,
    pub early_fragment_tests: Option<bool>,
    pub workgroup: Option<[u32; 3]>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub name: String,
    pub ty: Option<TypeExpr>,
    pub init: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AliasDecl {
    pub name: String,
    pub target: TypeExpr,
}

/// Compile-time boolean switch, enabled through an option set.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionDecl {
    pub name: String,
    pub ty: TypeExpr,
    /// Value used when the option set does not mention the option.
    pub default: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstDecl {
    pub name: String,
    pub ty: Option<TypeExpr>,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BranchStatement {
    /// `if` and `else if` arms, in order.
    pub cond_statements: Vec<(Expression, Statement)>,
    pub else_statement: Option<Box<Statement>>,
    /// `const if`: every condition must fold at compile time.
    pub is_const: bool,
}

/// Statement gated by a `[cond(..)]` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalStatement {
    pub condition: Expression,
    pub statement: Box<Statement>,
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    pub span: Span,
}
impl Statement {
    pub fn new(kind: StatementKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    DeclareStruct(StructDecl),
    DeclareExternal(ExternalDecl),
    DeclareFunction(FunctionDecl),
    DeclareVariable(VariableDecl),
    DeclareAlias(AliasDecl),
    DeclareOption(OptionDecl),
    DeclareConst(ConstDecl),
    Branch(BranchStatement),
    Conditional(ConditionalStatement),
    /// Statements sharing the enclosing scope.
    Multi(Vec<Statement>),
    /// `{ ... }` block opening a new scope.
    Scoped(Vec<Statement>),
    Expression(Expression),
    Discard,
    Return(Option<Expression>),
}
