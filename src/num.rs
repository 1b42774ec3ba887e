//! Numeric operators shared by constant folding and the runtime

use core::{cmp::Ordering, fmt};

use arbitrary::Arbitrary;

use crate::{
    compiler::bytecode::OpCode,
    runtime::RuntimeError,
    value::{Integer, Value},
};

/// Exact fraction, always stored normalised with a positive denominator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    numer: Integer,
    denom: Integer,
}

fn gcd(mut a: Integer, mut b: Integer) -> Integer {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.abs()
}

impl Rational {
    pub fn new(numer: Integer, denom: Integer) -> Option<Self> {
        if denom == 0 {
            return None;
        }
        let divisor = gcd(numer, denom).max(1);
        let sign = if denom < 0 { -1 } else { 1 };
        Some(Self {
            numer: (numer / divisor).checked_mul(sign)?,
            denom: (denom / divisor).checked_mul(sign)?,
        })
    }

    pub fn numer(self) -> Integer {
        self.numer
    }

    pub fn denom(self) -> Integer {
        self.denom
    }

    pub fn inexact(self) -> f64 {
        self.numer as f64 / self.denom as f64
    }

    fn from_integer(value: Integer) -> Self {
        Self {
            numer: value,
            denom: 1,
        }
    }

    /// Integral rationals collapse back into integers
    fn into_value(self) -> Value {
        if self.denom == 1 {
            Value::Integer(self.numer)
        } else {
            Value::Rational(self)
        }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numer, self.denom)
    }
}

/// Binary arithmetic operators that can be folded at build time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum Arith {
    Add,
    Sub,
    Mul,
    /// integer division on integers, exact on rationals
    Div,
    /// floating division
    FDiv,
    Mod,
    Pow,
}

impl Arith {
    pub fn from_op(op: OpCode) -> Option<Self> {
        Some(match op {
            OpCode::Add => Self::Add,
            OpCode::Sub => Self::Sub,
            OpCode::Mul => Self::Mul,
            OpCode::Div => Self::Div,
            OpCode::FDiv => Self::FDiv,
            OpCode::Mod => Self::Mod,
            OpCode::Pow => Self::Pow,
            _ => return None,
        })
    }

    pub fn op(self) -> OpCode {
        match self {
            Self::Add => OpCode::Add,
            Self::Sub => OpCode::Sub,
            Self::Mul => OpCode::Mul,
            Self::Div => OpCode::Div,
            Self::FDiv => OpCode::FDiv,
            Self::Mod => OpCode::Mod,
            Self::Pow => OpCode::Pow,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::FDiv => "fdiv",
            Self::Mod => "mod",
            Self::Pow => "pow",
        }
    }
}

enum Operands {
    Integers(Integer, Integer),
    Rationals(Rational, Rational),
    Floats(f64, f64),
}

fn operands(op: Arith, a: &Value, b: &Value) -> Result<Operands, RuntimeError> {
    Ok(match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Operands::Integers(*x, *y),
        (Value::Rational(x), Value::Rational(y)) => Operands::Rationals(*x, *y),
        (Value::Rational(x), Value::Integer(y)) => {
            Operands::Rationals(*x, Rational::from_integer(*y))
        }
        (Value::Integer(x), Value::Rational(y)) => {
            Operands::Rationals(Rational::from_integer(*x), *y)
        }
        (x, y) => match (inexact(x), inexact(y)) {
            (Some(x), Some(y)) => Operands::Floats(x, y),
            _ => {
                let culprit = if x.is_numeric() { y } else { x };
                return Err(RuntimeError::WrongType {
                    function: op.name().into(),
                    expected: "a number",
                    found: culprit.kind_name(),
                });
            }
        },
    })
}

fn inexact(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Floating(f) => Some(*f),
        Value::Rational(r) => Some(r.inexact()),
        _ => None,
    }
}

fn overflow(op: Arith) -> RuntimeError {
    RuntimeError::Overflow(op.name().into())
}

/// Evaluates a binary arithmetic operator
pub fn arith(op: Arith, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    let zero_divisor = match b {
        Value::Integer(0) => true,
        Value::Floating(f) => *f == 0.0,
        _ => false,
    };
    if zero_divisor && matches!(op, Arith::Div | Arith::FDiv | Arith::Mod) {
        return Err(RuntimeError::DivisionByZero);
    }

    match operands(op, a, b)? {
        Operands::Integers(x, y) => match op {
            Arith::Add => x.checked_add(y).map(Value::Integer).ok_or(overflow(op)),
            Arith::Sub => x.checked_sub(y).map(Value::Integer).ok_or(overflow(op)),
            Arith::Mul => x.checked_mul(y).map(Value::Integer).ok_or(overflow(op)),
            Arith::Div => x.checked_div(y).map(Value::Integer).ok_or(overflow(op)),
            Arith::FDiv => Ok(Value::Floating(x as f64 / y as f64)),
            Arith::Mod => x.checked_rem(y).map(Value::Integer).ok_or(overflow(op)),
            Arith::Pow => match u32::try_from(y) {
                Ok(exp) => x.checked_pow(exp).map(Value::Integer).ok_or(overflow(op)),
                Err(_) if y < 0 => Ok(Value::Floating((x as f64).powf(y as f64))),
                Err(_) => Err(overflow(op)),
            },
        },
        Operands::Rationals(x, y) => {
            let exact = |numer: Option<Integer>, denom: Option<Integer>| {
                numer
                    .zip(denom)
                    .and_then(|(n, d)| Rational::new(n, d))
                    .map(Rational::into_value)
                    .ok_or(overflow(op))
            };
            match op {
                Arith::Add | Arith::Sub => {
                    let left = x.numer.checked_mul(y.denom);
                    let right = y.numer.checked_mul(x.denom);
                    let numer = left.zip(right).and_then(|(l, r)| {
                        if op == Arith::Add {
                            l.checked_add(r)
                        } else {
                            l.checked_sub(r)
                        }
                    });
                    exact(numer, x.denom.checked_mul(y.denom))
                }
                Arith::Mul => exact(
                    x.numer.checked_mul(y.numer),
                    x.denom.checked_mul(y.denom),
                ),
                Arith::Div if y.numer == 0 => Err(RuntimeError::DivisionByZero),
                Arith::Div => exact(
                    x.numer.checked_mul(y.denom),
                    x.denom.checked_mul(y.numer),
                ),
                Arith::FDiv | Arith::Mod | Arith::Pow => {
                    float_arith(op, x.inexact(), y.inexact())
                }
            }
        }
        Operands::Floats(x, y) => float_arith(op, x, y),
    }
}

fn float_arith(op: Arith, x: f64, y: f64) -> Result<Value, RuntimeError> {
    if y == 0.0 && matches!(op, Arith::Div | Arith::FDiv | Arith::Mod) {
        return Err(RuntimeError::DivisionByZero);
    }
    Ok(Value::Floating(match op {
        Arith::Add => x + y,
        Arith::Sub => x - y,
        Arith::Mul => x * y,
        Arith::Div | Arith::FDiv => x / y,
        Arith::Mod => x % y,
        Arith::Pow => x.powf(y),
    }))
}

pub fn negate(value: &Value) -> Result<Value, RuntimeError> {
    match value {
        Value::Integer(i) => i
            .checked_neg()
            .map(Value::Integer)
            .ok_or_else(|| RuntimeError::Overflow("neg".into())),
        Value::Floating(f) => Ok(Value::Floating(-f)),
        Value::Rational(r) => Rational::new(-r.numer, r.denom)
            .map(Value::Rational)
            .ok_or_else(|| RuntimeError::Overflow("neg".into())),
        other => Err(RuntimeError::WrongType {
            function: "neg".into(),
            expected: "a number",
            found: other.kind_name(),
        }),
    }
}

/// Equality as seen by programs: numbers compare by value across kinds
pub fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Integer(_) | Value::Floating(_) | Value::Rational(_), _) if b.is_numeric() => {
            compare(a, b) == Some(Ordering::Equal)
        }
        (Value::Block(x), Value::Block(y)) => {
            x.len() == y.len() && x.items().iter().zip(y.items()).all(|(l, r)| equals(l, r))
        }
        (Value::Dictionary(x), Value::Dictionary(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x.iter()
                    .all(|(key, value)| y.get(key).is_some_and(|other| equals(value, other)))
        }
        _ => a == b,
    }
}

/// Ordering for numbers and strings; `None` for anything else
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Rational(x), Value::Rational(y)) => {
            let left = i128::from(x.numer) * i128::from(y.denom);
            let right = i128::from(y.numer) * i128::from(x.denom);
            Some(left.cmp(&right))
        }
        (Value::Rational(x), Value::Integer(y)) => {
            Some(i128::from(x.numer).cmp(&(i128::from(*y) * i128::from(x.denom))))
        }
        (Value::Integer(x), Value::Rational(y)) => {
            Some((i128::from(*x) * i128::from(y.denom)).cmp(&i128::from(y.numer)))
        }
        (x, y) => inexact(x)?.partial_cmp(&inexact(y)?),
    }
}

#[cfg(test)]
mod tests {
    use core::cmp::Ordering;

    use assert2::{check, let_assert};

    use super::{arith, compare, equals, Arith, Rational};
    use crate::{runtime::RuntimeError, value::Value};

    #[test]
    fn integer_arithmetic() {
        check!(arith(Arith::Add, &Value::Integer(3), &Value::Integer(1)) == Ok(Value::Integer(4)));
        check!(arith(Arith::Div, &Value::Integer(7), &Value::Integer(2)) == Ok(Value::Integer(3)));
        check!(
            arith(Arith::FDiv, &Value::Integer(7), &Value::Integer(2)) == Ok(Value::Floating(3.5))
        );
        check!(arith(Arith::Pow, &Value::Integer(2), &Value::Integer(10)) == Ok(Value::Integer(1024)));
        check!(arith(Arith::Mod, &Value::Integer(7), &Value::Integer(0)) == Err(RuntimeError::DivisionByZero));
    }

    #[test]
    fn overflow_is_reported() {
        let_assert!(
            Err(RuntimeError::Overflow(_)) =
                arith(Arith::Mul, &Value::Integer(i64::MAX), &Value::Integer(2))
        );
    }

    #[test]
    fn rationals_stay_exact() {
        let half = Value::Rational(Rational::new(1, 2).unwrap());
        let third = Value::Rational(Rational::new(1, 3).unwrap());
        check!(
            arith(Arith::Add, &half, &third) == Ok(Value::Rational(Rational::new(5, 6).unwrap()))
        );
        check!(arith(Arith::Add, &half, &half) == Ok(Value::Integer(1)));
        check!(Rational::new(2, -4) == Rational::new(-1, 2));
    }

    #[test]
    fn mixed_comparisons() {
        check!(equals(&Value::Integer(1), &Value::Floating(1.0)));
        check!(!equals(&Value::Integer(1), &Value::string("1")));
        check!(compare(&Value::Integer(1), &Value::Floating(1.5)) == Some(Ordering::Less));
        check!(compare(&Value::Integer(1), &Value::Null).is_none());
    }
}
