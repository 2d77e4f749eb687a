//! Numeric value model
//!
//! A `Numeric` is one value tagged with its machine width. Binary
//! operators require both operands to share a width; mixing widths is
//! rejected instead of guessing a promotion rule. Integer arithmetic wraps
//! at the operand width, floating point follows IEEE 754.

use super::error::{InterpResult, RuntimeError};
use crate::bytecode::Operator;
use crate::model::{ClassStore, TypeId};
use std::fmt;

/// Tolerance used when comparing floating point numerics for equality.
pub const FLOAT_EQ_DELTA: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericMode {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl NumericMode {
    pub fn name(self) -> &'static str {
        match self {
            NumericMode::Byte => "byte",
            NumericMode::Short => "short",
            NumericMode::Int => "int",
            NumericMode::Long => "long",
            NumericMode::Float => "float",
            NumericMode::Double => "double",
        }
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, NumericMode::Float | NumericMode::Double)
    }

    fn bits(self) -> u32 {
        match self {
            NumericMode::Byte => 8,
            NumericMode::Short => 16,
            NumericMode::Int | NumericMode::Float => 32,
            NumericMode::Long | NumericMode::Double => 64,
        }
    }
}

impl fmt::Display for NumericMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Byte(u8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Numeric {
    pub const ZERO: Numeric = Numeric::Int(0);
    pub const ONE: Numeric = Numeric::Int(1);

    pub fn from_bool(value: bool) -> Self {
        Numeric::Byte(value as u8)
    }

    pub fn mode(self) -> NumericMode {
        match self {
            Numeric::Byte(_) => NumericMode::Byte,
            Numeric::Short(_) => NumericMode::Short,
            Numeric::Int(_) => NumericMode::Int,
            Numeric::Long(_) => NumericMode::Long,
            Numeric::Float(_) => NumericMode::Float,
            Numeric::Double(_) => NumericMode::Double,
        }
    }

    /// Parse a literal: digits, an optional width suffix, and an optional
    /// fraction. A fraction without suffix yields a float; no suffix and no
    /// fraction yields an int, or a long when the int overflows.
    pub fn compile(text: &str) -> InterpResult<Numeric> {
        let invalid = || RuntimeError::fatal(format!("Invalid numeric literal: {text}"));
        let digits_end = text
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(text.len());
        if digits_end == 0 {
            return Err(invalid());
        }
        let (int_part, mut rest) = text.split_at(digits_end);
        let mut suffix = None;
        if let Some(c) = rest.chars().next().filter(|c| "bsilfd".contains(*c)) {
            suffix = Some(c);
            rest = &rest[1..];
        }
        let mut fraction = None;
        if let Some(frac) = rest.strip_prefix('.') {
            let end = frac
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(frac.len());
            if end == 0 {
                return Err(invalid());
            }
            fraction = Some(&frac[..end]);
            rest = &frac[end..];
            if let Some(c) = rest.chars().next().filter(|c| *c == 'f' || *c == 'd') {
                suffix = Some(c);
                rest = &rest[1..];
            }
        }
        if !rest.is_empty() {
            return Err(invalid());
        }

        let number = match fraction {
            Some(frac) => format!("{int_part}.{frac}"),
            None => int_part.to_string(),
        };
        let parsed = match suffix {
            Some('b') if fraction.is_none() => number.parse().map(Numeric::Byte).ok(),
            Some('s') if fraction.is_none() => number.parse().map(Numeric::Short).ok(),
            Some('i') if fraction.is_none() => number.parse().map(Numeric::Int).ok(),
            Some('l') if fraction.is_none() => number.parse().map(Numeric::Long).ok(),
            Some('f') => number.parse().map(Numeric::Float).ok(),
            Some('d') => number.parse().map(Numeric::Double).ok(),
            Some(_) => None,
            None if fraction.is_some() => number.parse().map(Numeric::Float).ok(),
            None => number
                .parse()
                .map(Numeric::Int)
                .or_else(|_| number.parse().map(Numeric::Long))
                .ok(),
        };
        parsed.ok_or_else(invalid)
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Numeric::Byte(v) => v as i64,
            Numeric::Short(v) => v as i64,
            Numeric::Int(v) => v as i64,
            Numeric::Long(v) => v,
            Numeric::Float(v) => v as i64,
            Numeric::Double(v) => v as i64,
        }
    }

    pub fn as_i32(self) -> i32 {
        self.as_i64() as i32
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Numeric::Byte(v) => v as f64,
            Numeric::Short(v) => v as f64,
            Numeric::Int(v) => v as f64,
            Numeric::Long(v) => v as f64,
            Numeric::Float(v) => v as f64,
            Numeric::Double(v) => v,
        }
    }

    /// Truncate `value` to `mode`, wrapping integers at their width.
    pub fn from_i64(mode: NumericMode, value: i64) -> Numeric {
        match mode {
            NumericMode::Byte => Numeric::Byte(value as u8),
            NumericMode::Short => Numeric::Short(value as i16),
            NumericMode::Int => Numeric::Int(value as i32),
            NumericMode::Long => Numeric::Long(value),
            NumericMode::Float => Numeric::Float(value as f32),
            NumericMode::Double => Numeric::Double(value as f64),
        }
    }

    pub fn from_f64(mode: NumericMode, value: f64) -> Numeric {
        match mode {
            NumericMode::Float => Numeric::Float(value as f32),
            NumericMode::Double => Numeric::Double(value),
            integer => Numeric::from_i64(integer, value as i64),
        }
    }

    /// Convert to `mode`, truncating fractions and wrapping integers.
    pub fn cast(self, mode: NumericMode) -> Numeric {
        if self.mode() == mode {
            return self;
        }
        match self {
            Numeric::Float(_) | Numeric::Double(_) => Numeric::from_f64(mode, self.as_f64()),
            _ if mode.is_integer() => Numeric::from_i64(mode, self.as_i64()),
            _ => Numeric::from_f64(mode, self.as_f64()),
        }
    }

    /// Zero or negative numerics count as false.
    pub fn is_implicitly_false(self) -> bool {
        self.as_f64() <= 0.0
    }

    /// Key of the interned constant in the absolute store.
    pub fn key(self) -> String {
        format!("num:{}:{}", self.mode(), self)
    }

    pub fn equals(self, other: Numeric) -> bool {
        match (self.mode().is_integer(), other.mode().is_integer()) {
            (true, true) => self.as_i64() == other.as_i64(),
            _ => (self.as_f64() - other.as_f64()).abs() < FLOAT_EQ_DELTA,
        }
    }

    pub fn negate(self) -> Numeric {
        match self {
            Numeric::Float(v) => Numeric::Float(-v),
            Numeric::Double(v) => Numeric::Double(-v),
            other => Numeric::from_i64(other.mode(), other.as_i64().wrapping_neg()),
        }
    }

    fn step(self, delta: i64) -> Numeric {
        match self {
            Numeric::Float(v) => Numeric::Float(v + delta as f32),
            Numeric::Double(v) => Numeric::Double(v + delta as f64),
            other => Numeric::from_i64(other.mode(), other.as_i64().wrapping_add(delta)),
        }
    }

    /// `sqrt`, `sin`, `cos` or `tan`. Floats stay floats; every other width
    /// computes through and returns a double.
    pub fn math(self, function: &str) -> Option<Numeric> {
        let f: fn(f64) -> f64 = match function {
            "sqrt" => f64::sqrt,
            "sin" => f64::sin,
            "cos" => f64::cos,
            "tan" => f64::tan,
            _ => return None,
        };
        Some(match self {
            Numeric::Float(v) => Numeric::Float(f(v as f64) as f32),
            other => Numeric::Double(f(other.as_f64())),
        })
    }

    /// Apply a unary operator. Increment and decrement forms all yield the
    /// stepped value; the caller decides which snapshot a postfix form shows.
    pub fn unary(self, op: Operator) -> InterpResult<Numeric> {
        let base = op.base();
        Ok(if base == Operator::INCREMENT_READ || base == Operator::READ_INCREMENT {
            self.step(1)
        } else if base == Operator::DECREMENT_READ || base == Operator::READ_DECREMENT {
            self.step(-1)
        } else if base == Operator::ARITHMETIC_NOT {
            self.negate()
        } else if base == Operator::LOGIC_NOT {
            Numeric::from_bool(self.is_implicitly_false())
        } else {
            return Err(RuntimeError::fatal(format!("Invalid unary numeric operator: {op}")));
        })
    }

    /// Apply a binary operator. Comparisons yield a byte-width boolean.
    pub fn binary(self, op: Operator, rhs: Numeric) -> InterpResult<Numeric> {
        let base = op.base();
        if base == Operator::EQUALS {
            return Ok(Numeric::from_bool(self.equals(rhs)));
        }
        if base == Operator::NOT_EQUALS {
            return Ok(Numeric::from_bool(!self.equals(rhs)));
        }
        if base == Operator::LOGIC_AND {
            return Ok(Numeric::from_bool(!self.is_implicitly_false() && !rhs.is_implicitly_false()));
        }
        if base == Operator::LOGIC_OR {
            return Ok(Numeric::from_bool(!self.is_implicitly_false() || !rhs.is_implicitly_false()));
        }
        if base == Operator::NULL_FALLBACK {
            return Ok(self);
        }

        let mode = self.mode();
        if mode != rhs.mode() {
            return Err(RuntimeError::fatal(format!(
                "Mixed-width numeric operands: {} {} {}",
                mode,
                op.name().unwrap_or("?"),
                rhs.mode()
            )));
        }

        if let Some(ordering) = self.compare(base, rhs) {
            return Ok(Numeric::from_bool(ordering));
        }
        if base == Operator::POW {
            return Ok(Numeric::from_f64(mode, self.as_f64().powf(rhs.as_f64())));
        }
        if mode.is_integer() {
            self.integer_op(base, rhs)
        } else {
            self.float_op(base, rhs)
        }
    }

    fn compare(self, base: Operator, rhs: Numeric) -> Option<bool> {
        let (a, b) = (self.as_f64(), rhs.as_f64());
        if self.mode().is_integer() {
            let (a, b) = (self.as_i64(), rhs.as_i64());
            return match base {
                Operator::GREATER => Some(a > b),
                Operator::GREATER_EQ => Some(a >= b),
                Operator::LESSER => Some(a < b),
                Operator::LESSER_EQ => Some(a <= b),
                _ => None,
            };
        }
        match base {
            Operator::GREATER => Some(a > b),
            Operator::GREATER_EQ => Some(a >= b),
            Operator::LESSER => Some(a < b),
            Operator::LESSER_EQ => Some(a <= b),
            _ => None,
        }
    }

    fn integer_op(self, base: Operator, rhs: Numeric) -> InterpResult<Numeric> {
        let mode = self.mode();
        let (a, b) = (self.as_i64(), rhs.as_i64());
        let shift = (b as u32) % mode.bits();
        let value = match base {
            Operator::PLUS => a.wrapping_add(b),
            Operator::MINUS => a.wrapping_sub(b),
            Operator::MULTIPLY => a.wrapping_mul(b),
            Operator::DIVIDE | Operator::MODULUS if b == 0 => {
                return Err(RuntimeError::division_by_zero());
            }
            Operator::DIVIDE => a.wrapping_div(b),
            Operator::MODULUS => a.wrapping_rem(b),
            Operator::BIT_AND => a & b,
            Operator::BIT_OR => a | b,
            Operator::LSHIFT | Operator::ULSHIFT => a.wrapping_shl(shift),
            Operator::RSHIFT => a >> shift,
            Operator::URSHIFT => {
                let mask = if mode.bits() == 64 {
                    u64::MAX
                } else {
                    (1u64 << mode.bits()) - 1
                };
                ((a as u64 & mask) >> shift) as i64
            }
            _ => {
                return Err(RuntimeError::fatal(format!(
                    "Invalid binary numeric operator: {base}"
                )));
            }
        };
        Ok(Numeric::from_i64(mode, value))
    }

    fn float_op(self, base: Operator, rhs: Numeric) -> InterpResult<Numeric> {
        match (self, rhs) {
            (Numeric::Float(a), Numeric::Float(b)) => {
                let v = match base {
                    Operator::PLUS => a + b,
                    Operator::MINUS => a - b,
                    Operator::MULTIPLY => a * b,
                    Operator::DIVIDE => a / b,
                    Operator::MODULUS => a % b,
                    _ => return Err(invalid_float_op(base)),
                };
                Ok(Numeric::Float(v))
            }
            (Numeric::Double(a), Numeric::Double(b)) => {
                let v = match base {
                    Operator::PLUS => a + b,
                    Operator::MINUS => a - b,
                    Operator::MULTIPLY => a * b,
                    Operator::DIVIDE => a / b,
                    Operator::MODULUS => a % b,
                    _ => return Err(invalid_float_op(base)),
                };
                Ok(Numeric::Double(v))
            }
            _ => Err(invalid_float_op(base)),
        }
    }
}

/// Width of a numeric class instance such as `num<int<32>>`.
pub fn numeric_mode(classes: &ClassStore, ty: TypeId) -> Option<NumericMode> {
    let p = classes.primitives();
    Some(match ty {
        t if t == p.num_byte => NumericMode::Byte,
        t if t == p.num_short => NumericMode::Short,
        t if t == p.num_int => NumericMode::Int,
        t if t == p.num_long => NumericMode::Long,
        t if t == p.num_float => NumericMode::Float,
        t if t == p.num_double => NumericMode::Double,
        _ => return None,
    })
}

fn invalid_float_op(op: Operator) -> RuntimeError {
    RuntimeError::fatal(format!("Operator {op} requires integer operands"))
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Numeric::Byte(v) => write!(f, "{v}"),
            Numeric::Short(v) => write!(f, "{v}"),
            Numeric::Int(v) => write!(f, "{v}"),
            Numeric::Long(v) => write!(f, "{v}"),
            Numeric::Float(v) => write!(f, "{v}"),
            Numeric::Double(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::error::ErrorKind;

    fn bin(op: Operator) -> Operator {
        op | Operator::BINARY
    }

    // ================================================================
    // Literal compilation
    // ================================================================

    #[test]
    fn test_compile_plain_int() {
        assert_eq!(Numeric::compile("5").unwrap(), Numeric::Int(5));
    }

    #[test]
    fn test_compile_overflow_to_long() {
        assert_eq!(
            Numeric::compile("3000000000").unwrap(),
            Numeric::Long(3_000_000_000)
        );
    }

    #[test]
    fn test_compile_suffixes() {
        assert_eq!(Numeric::compile("7b").unwrap(), Numeric::Byte(7));
        assert_eq!(Numeric::compile("7s").unwrap(), Numeric::Short(7));
        assert_eq!(Numeric::compile("7i").unwrap(), Numeric::Int(7));
        assert_eq!(Numeric::compile("7l").unwrap(), Numeric::Long(7));
        assert_eq!(Numeric::compile("7f").unwrap(), Numeric::Float(7.0));
        assert_eq!(Numeric::compile("7d").unwrap(), Numeric::Double(7.0));
    }

    #[test]
    fn test_compile_fraction() {
        assert_eq!(Numeric::compile("2.5").unwrap(), Numeric::Float(2.5));
        assert_eq!(Numeric::compile("2.5d").unwrap(), Numeric::Double(2.5));
        assert_eq!(Numeric::compile("2.5f").unwrap(), Numeric::Float(2.5));
    }

    #[test]
    fn test_compile_rejects_garbage() {
        for text in ["", "abc", "1x", "1.", "300b", "1b.5"] {
            let err = Numeric::compile(text).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Fatal, "{text}");
        }
    }

    // ================================================================
    // Arithmetic
    // ================================================================

    #[test]
    fn test_int_add() {
        let r = Numeric::Int(5).binary(bin(Operator::PLUS), Numeric::Int(3)).unwrap();
        assert_eq!(r, Numeric::Int(8));
    }

    #[test]
    fn test_int_divide_truncates() {
        let r = Numeric::Int(5).binary(bin(Operator::DIVIDE), Numeric::Int(2)).unwrap();
        assert_eq!(r, Numeric::Int(2));
        let r = Numeric::Int(-5).binary(bin(Operator::DIVIDE), Numeric::Int(2)).unwrap();
        assert_eq!(r, Numeric::Int(-2));
    }

    #[test]
    fn test_double_divide() {
        let r = Numeric::Double(5.0)
            .binary(bin(Operator::DIVIDE), Numeric::Double(2.0))
            .unwrap();
        assert_eq!(r, Numeric::Double(2.5));
    }

    #[test]
    fn test_int_divide_by_zero() {
        let err = Numeric::Int(1).binary(bin(Operator::DIVIDE), Numeric::Int(0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
    }

    #[test]
    fn test_byte_wraps() {
        let r = Numeric::Byte(250).binary(bin(Operator::PLUS), Numeric::Byte(10)).unwrap();
        assert_eq!(r, Numeric::Byte(4));
    }

    #[test]
    fn test_mixed_width_rejected() {
        let err = Numeric::Byte(1).binary(bin(Operator::PLUS), Numeric::Int(1)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Fatal);
        assert!(err.message.contains("Mixed-width"));
    }

    #[test]
    fn test_pow() {
        let r = Numeric::Int(2).binary(bin(Operator::POW), Numeric::Int(10)).unwrap();
        assert_eq!(r, Numeric::Int(1024));
    }

    #[test]
    fn test_comparisons_yield_bool() {
        let lt = Numeric::Int(1).binary(bin(Operator::LESSER), Numeric::Int(2)).unwrap();
        assert_eq!(lt, Numeric::from_bool(true));
        let ge = Numeric::Double(1.0).binary(bin(Operator::GREATER_EQ), Numeric::Double(2.0)).unwrap();
        assert_eq!(ge, Numeric::from_bool(false));
    }

    #[test]
    fn test_float_equals_with_delta() {
        assert!(Numeric::Double(0.1 + 0.2).equals(Numeric::Double(0.3)));
        assert!(!Numeric::Double(0.1).equals(Numeric::Double(0.2)));
    }

    #[test]
    fn test_shifts() {
        let l = Numeric::Int(1).binary(bin(Operator::LSHIFT), Numeric::Int(4)).unwrap();
        assert_eq!(l, Numeric::Int(16));
        let r = Numeric::Int(-16).binary(bin(Operator::RSHIFT), Numeric::Int(2)).unwrap();
        assert_eq!(r, Numeric::Int(-4));
        let u = Numeric::Int(-1).binary(bin(Operator::URSHIFT), Numeric::Int(28)).unwrap();
        assert_eq!(u, Numeric::Int(15));
    }

    #[test]
    fn test_bit_ops_reject_floats() {
        let err = Numeric::Float(1.0).binary(bin(Operator::BIT_AND), Numeric::Float(1.0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Fatal);
    }

    #[test]
    fn test_unary_ops() {
        assert_eq!(Numeric::Int(4).unary(Operator::INCREMENT_READ).unwrap(), Numeric::Int(5));
        assert_eq!(Numeric::Int(4).unary(Operator::READ_DECREMENT).unwrap(), Numeric::Int(3));
        assert_eq!(Numeric::Int(4).unary(Operator::ARITHMETIC_NOT).unwrap(), Numeric::Int(-4));
        assert_eq!(Numeric::Int(0).unary(Operator::LOGIC_NOT).unwrap(), Numeric::from_bool(true));
    }

    #[test]
    fn test_math_widths() {
        assert_eq!(Numeric::Int(16).math("sqrt"), Some(Numeric::Double(4.0)));
        assert_eq!(Numeric::Float(16.0).math("sqrt"), Some(Numeric::Float(4.0)));
        assert_eq!(Numeric::Int(1).math("log"), None);
    }

    #[test]
    fn test_implicitly_false() {
        assert!(Numeric::Int(0).is_implicitly_false());
        assert!(Numeric::Int(-3).is_implicitly_false());
        assert!(!Numeric::Byte(1).is_implicitly_false());
    }

    #[test]
    fn test_cast() {
        assert_eq!(Numeric::Int(300).cast(NumericMode::Byte), Numeric::Byte(44));
        assert_eq!(Numeric::Double(2.9).cast(NumericMode::Int), Numeric::Int(2));
        assert_eq!(Numeric::Int(2).cast(NumericMode::Double), Numeric::Double(2.0));
    }

    #[test]
    fn test_numeric_mode_of_type() {
        let classes = ClassStore::new().unwrap();
        let p = *classes.primitives();
        assert_eq!(numeric_mode(&classes, p.num_long), Some(NumericMode::Long));
        assert_eq!(numeric_mode(&classes, p.num_t), None);
        assert_eq!(numeric_mode(&classes, p.str_t), None);
    }

    #[test]
    fn test_key_includes_mode() {
        assert_eq!(Numeric::Int(5).key(), "num:int:5");
        assert_ne!(Numeric::Int(5).key(), Numeric::Long(5).key());
    }
}
