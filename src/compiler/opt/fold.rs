//! Compile-time evaluation of operators over constants. Integer arithmetic
//! wraps in two's complement; a division by zero or a float result that is
//! not finite is left unfolded.
use num_traits::{CheckedDiv, Float, PrimInt, WrappingAdd, WrappingMul, WrappingNeg, WrappingSub};

use crate::compiler::ast::{BinaryOp, TypeExpr, UnaryOp};
use crate::compiler::common::ConstantValue;

enum Folded<T> {
    Value(T),
    Bool(bool),
}
impl<T> Folded<T> {
    fn map(self, f: impl FnOnce(T) -> ConstantValue) -> ConstantValue {
        match self {
            Folded::Value(x) => f(x),
            Folded::Bool(x) => ConstantValue::Bool(x),
        }
    }
}

fn compare<T: PartialOrd>(op: BinaryOp, a: T, b: T) -> Option<bool> {
    let out = match op {
        BinaryOp::CompEq => a == b,
        BinaryOp::CompNe => a != b,
        BinaryOp::CompLt => a < b,
        BinaryOp::CompLe => a <= b,
        BinaryOp::CompGt => a > b,
        BinaryOp::CompGe => a >= b,
        _ => return None,
    };
    Some(out)
}

fn fold_int<T>(op: BinaryOp, a: T, b: T) -> Option<Folded<T>>
where
    T: PrimInt + WrappingAdd + WrappingSub + WrappingMul,
{
    let out = match op {
        BinaryOp::Add => WrappingAdd::wrapping_add(&a, &b),
        BinaryOp::Subtract => WrappingSub::wrapping_sub(&a, &b),
        BinaryOp::Multiply => WrappingMul::wrapping_mul(&a, &b),
        BinaryOp::Divide => {
            if b.is_zero() {
                return None;
            }
            // Only MIN / -1 overflows, and it wraps back to MIN.
            CheckedDiv::checked_div(&a, &b).unwrap_or(a)
        }
        _ => return compare(op, a, b).map(Folded::Bool),
    };
    Some(Folded::Value(out))
}

fn fold_float<T: Float>(op: BinaryOp, a: T, b: T) -> Option<Folded<T>> {
    let out = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide => {
            if b.is_zero() {
                return None;
            }
            a / b
        }
        _ => return compare(op, a, b).map(Folded::Bool),
    };
    if !out.is_finite() {
        return None;
    }
    Some(Folded::Value(out))
}

impl ConstantValue {
    pub fn binary(&self, op: BinaryOp, rhs: &ConstantValue) -> Option<ConstantValue> {
        use ConstantValue as C;

        let componentwise = !op.is_comparison() && !op.is_logical();
        let out = match (self, rhs) {
            (C::Vector(a), C::Vector(b)) if componentwise && a.len() == b.len() => C::Vector(
                a.iter()
                    .zip(b)
                    .map(|(x, y)| x.binary(op, y))
                    .collect::<Option<Vec<_>>>()?,
            ),
            (C::Vector(a), b) if componentwise && !b.is_vector() => {
                C::Vector(a.iter().map(|x| x.binary(op, b)).collect::<Option<Vec<_>>>()?)
            }
            (a, C::Vector(b)) if componentwise && !a.is_vector() => {
                C::Vector(b.iter().map(|y| a.binary(op, y)).collect::<Option<Vec<_>>>()?)
            }
            (C::I32(a), C::I32(b)) => fold_int(op, *a, *b)?.map(C::I32),
            (C::U32(a), C::U32(b)) => fold_int(op, *a, *b)?.map(C::U32),
            (C::F32(a), C::F32(b)) => fold_float(op, *a, *b)?.map(C::F32),
            (C::F64(a), C::F64(b)) => fold_float(op, *a, *b)?.map(C::F64),
            (C::Bool(a), C::Bool(b)) => match op {
                BinaryOp::CompEq => C::Bool(a == b),
                BinaryOp::CompNe => C::Bool(a != b),
                BinaryOp::LogicalAnd => C::Bool(*a && *b),
                BinaryOp::LogicalOr => C::Bool(*a || *b),
                _ => return None,
            },
            _ => return None,
        };
        Some(out)
    }

    pub fn unary(&self, op: UnaryOp) -> Option<ConstantValue> {
        use ConstantValue as C;

        let out = match (op, self) {
            (_, C::Vector(xs)) => C::Vector(xs.iter().map(|x| x.unary(op)).collect::<Option<Vec<_>>>()?),
            (UnaryOp::LogicalNot, C::Bool(x)) => C::Bool(!x),
            (UnaryOp::Minus, C::I32(x)) => C::I32(WrappingNeg::wrapping_neg(x)),
            (UnaryOp::Minus, C::F32(x)) => C::F32(-x),
            (UnaryOp::Minus, C::F64(x)) => C::F64(-x),
            _ => return None,
        };
        Some(out)
    }

    pub fn swizzle(&self, components: &[u32]) -> Option<ConstantValue> {
        let picked = components
            .iter()
            .map(|i| match self {
                ConstantValue::Vector(xs) => xs.get(*i as usize).cloned(),
                x if *i == 0 => Some(x.clone()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        match picked.len() {
            1 => picked.into_iter().next(),
            _ => Some(ConstantValue::Vector(picked)),
        }
    }
}

/// Evaluates `target(args)` over constant arguments.
pub fn cast(target: &TypeExpr, args: &[ConstantValue]) -> Option<ConstantValue> {
    match target {
        TypeExpr::Primitive(to) => match args {
            [x] if !x.is_vector() => x.convert(*to),
            _ => None,
        },
        TypeExpr::Vector { base, count } => {
            let mut comps = Vec::new();
            for arg in args {
                match arg {
                    ConstantValue::Vector(xs) => comps.extend(xs.iter().cloned()),
                    x => comps.push(x.clone()),
                }
            }
            if comps.len() == 1 {
                comps = vec![comps[0].clone(); *count as usize];
            }
            if comps.len() != *count as usize {
                return None;
            }
            comps
                .iter()
                .map(|x| x.convert(*base))
                .collect::<Option<Vec<_>>>()
                .map(ConstantValue::Vector)
        }
        _ => None,
    }
}
