//! Resolved types and the typing rules of operators, casts and intrinsics.
use std::fmt;

use anyhow::Result;

use super::DeclId;
use crate::compiler::ast::{BinaryOp, IntrinsicType, SamplerDim, UnaryOp};
use crate::compiler::common::{ConstantValue, PrimitiveType};

macro_rules! def_type_accessors {
    ($($name:ident,)+) => {
        impl ExpressionType {
            $(
                paste::paste! {
                    #[allow(dead_code)]
                    pub fn [<is_ $name:snake>](&self) -> bool {
                        matches!(self, ExpressionType::$name { .. })
                    }
                }
            )+
        }
    };
}

/// Type of a resolved expression. Aliases never appear here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExpressionType {
    NoType,
    Primitive(PrimitiveType),
    Vector(PrimitiveType, u32),
    /// Base type, columns, rows.
    Matrix(PrimitiveType, u32, u32),
    Array(Box<ExpressionType>, u32),
    Struct(DeclId),
    Sampler(SamplerDim, PrimitiveType),
    Uniform(DeclId),
    Storage(DeclId),
    Function(DeclId),
    Method(Box<ExpressionType>, IntrinsicType),
    Module(usize),
}
def_type_accessors! {
    NoType,
    Primitive,
    Vector,
    Matrix,
    Array,
    Struct,
    Sampler,
    Uniform,
    Storage,
    Function,
    Method,
    Module,
}
impl ExpressionType {
    pub const BOOL: ExpressionType = ExpressionType::Primitive(PrimitiveType::Bool);

    /// Scalar base type of a primitive, vector or matrix.
    pub fn base_type(&self) -> Option<PrimitiveType> {
        match self {
            Self::Primitive(x) | Self::Vector(x, _) | Self::Matrix(x, _, _) => Some(*x),
            _ => None,
        }
    }
    pub fn is_scalar_of(&self, ty: PrimitiveType) -> bool {
        *self == Self::Primitive(ty)
    }
    pub fn is_integer_scalar(&self) -> bool {
        matches!(self, Self::Primitive(x) if x.is_integer())
    }
    /// Struct behind a struct value or a uniform/storage block.
    pub fn struct_id(&self) -> Option<DeclId> {
        match self {
            Self::Struct(x) | Self::Uniform(x) | Self::Storage(x) => Some(*x),
            _ => None,
        }
    }
    /// Struct held by value, possibly as an array element.
    pub fn stored_struct(&self) -> Option<DeclId> {
        match self {
            Self::Struct(x) => Some(*x),
            Self::Array(element, _) => element.stored_struct(),
            _ => None,
        }
    }
    /// Component count of a scalar (1) or vector.
    pub fn component_count(&self) -> Option<u32> {
        match self {
            Self::Primitive(_) => Some(1),
            Self::Vector(_, n) => Some(*n),
            _ => None,
        }
    }
    pub fn of_constant(value: &ConstantValue) -> Self {
        match value {
            ConstantValue::Vector(xs) => Self::Vector(value.primitive_type(), xs.len() as u32),
            _ => Self::Primitive(value.primitive_type()),
        }
    }
    /// Scalar or vector of `base` with `count` components.
    pub fn scalar_or_vector(base: PrimitiveType, count: u32) -> Self {
        if count == 1 {
            Self::Primitive(base)
        } else {
            Self::Vector(base, count)
        }
    }
}
impl fmt::Display for ExpressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoType => f.write_str("()"),
            Self::Primitive(x) => write!(f, "{}", x),
            Self::Vector(x, n) => write!(f, "vec{}[{}]", n, x),
            Self::Matrix(x, c, r) if c == r => write!(f, "mat{}[{}]", c, x),
            Self::Matrix(x, c, r) => write!(f, "mat{}x{}[{}]", c, r, x),
            Self::Array(x, n) => write!(f, "array[{}, {}]", x, n),
            Self::Struct(id) => write!(f, "struct #{}", id),
            Self::Sampler(dim, x) => write!(f, "sampler{}[{}]", dim.suffix(), x),
            Self::Uniform(id) => write!(f, "uniform[struct #{}]", id),
            Self::Storage(id) => write!(f, "storage[struct #{}]", id),
            Self::Function(id) => write!(f, "function #{}", id),
            Self::Method(x, m) => write!(f, "{}.{}", x, m.name()),
            Self::Module(x) => write!(f, "module #{}", x),
        }
    }
}

/// Swizzle letters to component indices, `xyzw` or `rgba`.
pub fn parse_swizzle(member: &str) -> Option<Vec<u32>> {
    if member.is_empty() || member.len() > 4 {
        return None;
    }
    let xyzw = member
        .chars()
        .map(|c| "xyzw".find(c).map(|x| x as u32))
        .collect::<Option<Vec<_>>>();
    xyzw.or_else(|| member.chars().map(|c| "rgba".find(c).map(|x| x as u32)).collect())
}

pub fn binary_type(op: BinaryOp, lhs: &ExpressionType, rhs: &ExpressionType) -> Result<ExpressionType, String> {
    use ExpressionType as T;

    if op.is_logical() {
        if *lhs == T::BOOL && *rhs == T::BOOL {
            return Ok(T::BOOL);
        }
        return Err(format!("operator {} expects bool operands, found {} and {}", op.symbol(), lhs, rhs));
    }
    if op.is_comparison() {
        if lhs != rhs {
            return Err(format!("cannot compare {} with {}", lhs, rhs));
        }
        let ok = match (op, lhs) {
            (BinaryOp::CompEq | BinaryOp::CompNe, T::Primitive(_)) => true,
            (_, T::Primitive(x)) => x.is_numeric(),
            _ => false,
        };
        if !ok {
            return Err(format!("operator {} is not defined for {}", op.symbol(), lhs));
        }
        return Ok(T::BOOL);
    }

    let numeric = |x: &ExpressionType| x.base_type().map_or(false, |x| x.is_numeric());
    if !numeric(lhs) || !numeric(rhs) || lhs.base_type() != rhs.base_type() {
        return Err(format!("operator {} is not defined for {} and {}", op.symbol(), lhs, rhs));
    }
    let out = match (lhs, rhs) {
        _ if lhs == rhs => match lhs {
            // Matrix products must be square to keep the same shape.
            T::Matrix(_, c, r) if op == BinaryOp::Multiply && c != r => None,
            T::Matrix(..) if op == BinaryOp::Divide => None,
            _ => Some(lhs.clone()),
        },
        (T::Primitive(_), T::Vector(..)) | (T::Primitive(_), T::Matrix(..))
            if matches!(op, BinaryOp::Multiply) || rhs.is_vector() =>
        {
            Some(rhs.clone())
        }
        (T::Vector(..), T::Primitive(_)) => Some(lhs.clone()),
        (T::Matrix(..), T::Primitive(_)) if op == BinaryOp::Multiply => Some(lhs.clone()),
        (T::Matrix(base, c, r), T::Vector(_, n)) if op == BinaryOp::Multiply && c == n => {
            Some(T::Vector(*base, *r))
        }
        (T::Vector(base, n), T::Matrix(_, c, r)) if op == BinaryOp::Multiply && r == n => {
            Some(T::Vector(*base, *c))
        }
        (T::Matrix(base, c1, r1), T::Matrix(_, c2, r2)) if op == BinaryOp::Multiply && c1 == r2 => {
            Some(T::Matrix(*base, *c2, *r1))
        }
        _ => None,
    };
    out.ok_or_else(|| format!("operator {} is not defined for {} and {}", op.symbol(), lhs, rhs))
}

pub fn unary_type(op: UnaryOp, ty: &ExpressionType) -> Result<ExpressionType, String> {
    let ok = match op {
        UnaryOp::LogicalNot => *ty == ExpressionType::BOOL,
        UnaryOp::Minus => matches!(
            ty.base_type(),
            Some(PrimitiveType::I32 | PrimitiveType::F32 | PrimitiveType::F64)
        ),
    };
    if ok {
        Ok(ty.clone())
    } else {
        Err(format!("operator {} is not defined for {}", op.symbol(), ty))
    }
}

/// Checks a `T(args)` construction and returns its type.
pub fn cast_type(target: ExpressionType, args: &[ExpressionType]) -> Result<ExpressionType, String> {
    use ExpressionType as T;

    let ok = match &target {
        T::Primitive(to) => match args {
            [T::Primitive(from)] => (*from == PrimitiveType::Bool) == (*to == PrimitiveType::Bool),
            _ => false,
        },
        T::Vector(base, count) => match args {
            // Component-wise conversion of a whole vector.
            [T::Vector(from, n)] if n == count => {
                (*from == PrimitiveType::Bool) == (*base == PrimitiveType::Bool)
            }
            [T::Primitive(from)] => from == base,
            _ => {
                let mut total = 0;
                let mut ok = true;
                for arg in args {
                    match arg {
                        T::Primitive(x) | T::Vector(x, _) if x == base => {
                            total += arg.component_count().unwrap_or(0);
                        }
                        _ => ok = false,
                    }
                }
                ok && total == *count
            }
        },
        T::Matrix(base, columns, rows) => match args {
            [T::Matrix(from, c, r)] => from == base && c == columns && r == rows,
            _ => args.len() == *columns as usize && args.iter().all(|x| *x == T::Vector(*base, *rows)),
        },
        _ => false,
    };
    if ok {
        Ok(target)
    } else {
        let args = args.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(", ");
        Err(format!("cannot construct {} from ({})", target, args))
    }
}

pub fn intrinsic_type(intrinsic: IntrinsicType, args: &[ExpressionType]) -> Result<ExpressionType, String> {
    use ExpressionType as T;

    let float_vector = |x: &ExpressionType| matches!(x, T::Vector(b, _) if b.is_float());
    let float_value = |x: &ExpressionType| {
        matches!(x, T::Primitive(b) | T::Vector(b, _) if b.is_float())
    };
    let numeric_value = |x: &ExpressionType| {
        matches!(x, T::Primitive(b) | T::Vector(b, _) if b.is_numeric())
    };
    let all_same = args.windows(2).all(|x| x[0] == x[1]);

    let out = match (intrinsic, args) {
        (IntrinsicType::CrossProduct, [a, b]) if a == b && matches!(a, T::Vector(x, 3) if x.is_float()) => {
            Some(a.clone())
        }
        (IntrinsicType::DotProduct, [a, b]) if a == b && float_vector(a) => a.base_type().map(T::Primitive),
        (IntrinsicType::Length, [a]) if float_value(a) => a.base_type().map(T::Primitive),
        (IntrinsicType::Normalize, [a]) if float_vector(a) => Some(a.clone()),
        (IntrinsicType::Exp | IntrinsicType::Sqrt, [a]) if float_value(a) => Some(a.clone()),
        (IntrinsicType::Pow, [a, b]) if a == b && float_value(a) => Some(a.clone()),
        (IntrinsicType::Reflect, [a, b]) if a == b && float_vector(a) => Some(a.clone()),
        (IntrinsicType::Max | IntrinsicType::Min, [a, _]) if all_same && numeric_value(a) => Some(a.clone()),
        (IntrinsicType::Clamp, [a, _, _]) if all_same && numeric_value(a) => Some(a.clone()),
        (IntrinsicType::Lerp, [a, _, _]) if all_same && float_value(a) => Some(a.clone()),
        _ => None,
    };
    out.ok_or_else(|| {
        let args = args.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(", ");
        format!("no overload of {} takes ({})", intrinsic.name(), args)
    })
}

/// Return type of `sampler.Sample(coords)`.
pub fn sample_type(sampler: &ExpressionType, args: &[ExpressionType]) -> Result<ExpressionType, String> {
    match (sampler, args) {
        (ExpressionType::Sampler(dim, sampled), [coords]) => {
            let expected = ExpressionType::scalar_or_vector(PrimitiveType::F32, dim.coordinate_count());
            if *coords == expected {
                Ok(ExpressionType::Vector(*sampled, 4))
            } else {
                Err(format!("{} must be sampled with {}, found {}", sampler, expected, coords))
            }
        }
        _ => Err(format!("Sample expects one coordinate argument on {}", sampler)),
    }
}
