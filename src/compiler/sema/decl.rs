//! Declaration arena entries. Every named thing a module declares gets one
//! slot; aliases point at other slots by index.
use super::types::ExpressionType;
use super::DeclId;
use crate::compiler::ast::*;
use crate::compiler::common::Span;

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub ty: ExpressionType,
    pub location: Option<u32>,
    pub builtin: Option<BuiltinEntry>,
}

#[derive(Debug, Clone)]
pub struct StructInfo<'a> {
    pub decl: &'a StructDecl,
    /// Filled once every struct name of the scope is known.
    pub fields: Vec<FieldInfo>,
}
impl<'a> StructInfo<'a> {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|x| x.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct FunctionInfo<'a> {
    pub decl: &'a FunctionDecl,
    pub params: Vec<DeclId>,
    pub return_type: ExpressionType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AliasTarget {
    Type(ExpressionType),
    Decl(DeclId),
}

#[derive(Debug, Clone)]
pub struct ExternalInfo<'a> {
    pub var: &'a ExternalVar,
    pub set: u32,
    pub ty: ExpressionType,
}

#[derive(Debug, Clone)]
pub enum DeclKind<'a> {
    Struct(StructInfo<'a>),
    Function(FunctionInfo<'a>),
    /// `None` until the alias chain has been followed.
    Alias(&'a AliasDecl, Option<AliasTarget>),
    Variable(ExpressionType),
    Parameter(ExpressionType),
    External(ExternalInfo<'a>),
    /// Bit index in the option set.
    Option(&'a OptionDecl, usize),
    Const(&'a ConstDecl, ExpressionType),
    /// Index into `Module::imported_modules`.
    Module(usize),
}

#[derive(Debug, Clone)]
pub struct Declaration<'a> {
    pub name: String,
    /// Imported module the declaration belongs to, `None` for the root.
    pub module: Option<usize>,
    /// Declared inside a function body.
    pub local: bool,
    pub span: Span,
    pub kind: DeclKind<'a>,
}
impl<'a> Declaration<'a> {
    pub fn as_struct(&self) -> Option<&StructInfo<'a>> {
        match &self.kind {
            DeclKind::Struct(x) => Some(x),
            _ => None,
        }
    }
    pub fn as_function(&self) -> Option<&FunctionInfo<'a>> {
        match &self.kind {
            DeclKind::Function(x) => Some(x),
            _ => None,
        }
    }
    pub fn as_external(&self) -> Option<&ExternalInfo<'a>> {
        match &self.kind {
            DeclKind::External(x) => Some(x),
            _ => None,
        }
    }
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            DeclKind::Struct(_) => "struct",
            DeclKind::Function(_) => "function",
            DeclKind::Alias(..) => "alias",
            DeclKind::Variable(_) => "variable",
            DeclKind::Parameter(_) => "parameter",
            DeclKind::External(_) => "external",
            DeclKind::Option(..) => "option",
            DeclKind::Const(..) => "const",
            DeclKind::Module(_) => "module",
        }
    }
    /// Type of the declaration used as a value, if it is one.
    pub fn value_type(&self, id: DeclId) -> Option<ExpressionType> {
        match &self.kind {
            DeclKind::Variable(ty) | DeclKind::Parameter(ty) | DeclKind::Const(_, ty) => Some(ty.clone()),
            DeclKind::External(x) => Some(x.ty.clone()),
            DeclKind::Option(..) => Some(ExpressionType::BOOL),
            DeclKind::Function(_) => Some(ExpressionType::Function(id)),
            DeclKind::Module(x) => Some(ExpressionType::Module(*x)),
            DeclKind::Struct(_) | DeclKind::Alias(..) => None,
        }
    }
}
