//! Structural AST equality. Source spans never take part in comparison, so
//! a module re-parsed from printed text compares equal to the original.
use super::*;

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl PartialEq for Statement {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl PartialEq for ImportDirective {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl PartialEq for StructField {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.ty == other.ty
            && self.location == other.location
            && self.builtin == other.builtin
            && self.cond == other.cond
    }
}

impl PartialEq for ExternalVar {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.ty == other.ty
            && self.set == other.set
            && self.binding == other.binding
    }
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.ty == other.ty
    }
}
