//! Operator word carried in `StatementComponent::byte_arg`
//!
//! The low bits name exactly one base operator; the top four bits are
//! flags saying how it is applied (prefix, postfix, binary, compound).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Operator(u32);

impl Operator {
    pub const UNKNOWN: Operator = Operator(0);

    // unary
    pub const INCREMENT_READ: Operator = Operator(1 << 1);
    pub const DECREMENT_READ: Operator = Operator(1 << 2);
    pub const READ_INCREMENT: Operator = Operator(1 << 3);
    pub const READ_DECREMENT: Operator = Operator(1 << 4);
    pub const LOGIC_NOT: Operator = Operator(1 << 5);
    pub const ARITHMETIC_NOT: Operator = Operator(1 << 6);

    // binary
    pub const PLUS: Operator = Operator(1 << 7);
    pub const MINUS: Operator = Operator(1 << 8);
    pub const MULTIPLY: Operator = Operator(1 << 9);
    pub const DIVIDE: Operator = Operator(1 << 10);
    pub const MODULUS: Operator = Operator(1 << 11);
    pub const POW: Operator = Operator(1 << 12);
    pub const EQUALS: Operator = Operator(1 << 13);
    pub const NOT_EQUALS: Operator = Operator(1 << 14);
    pub const GREATER: Operator = Operator(1 << 15);
    pub const GREATER_EQ: Operator = Operator(1 << 16);
    pub const LESSER: Operator = Operator(1 << 17);
    pub const LESSER_EQ: Operator = Operator(1 << 18);
    pub const BIT_AND: Operator = Operator(1 << 19);
    pub const BIT_OR: Operator = Operator(1 << 20);
    pub const LOGIC_AND: Operator = Operator(1 << 21);
    pub const LOGIC_OR: Operator = Operator(1 << 22);
    pub const LSHIFT: Operator = Operator(1 << 23);
    pub const RSHIFT: Operator = Operator(1 << 24);
    pub const ULSHIFT: Operator = Operator(1 << 25);
    pub const URSHIFT: Operator = Operator(1 << 26);
    pub const NULL_FALLBACK: Operator = Operator(1 << 27);

    // flags
    pub const UNARY_PREFIX: Operator = Operator(1 << 28);
    pub const UNARY_POSTFIX: Operator = Operator(1 << 29);
    pub const BINARY: Operator = Operator(1 << 30);
    pub const COMPOUND: Operator = Operator(1 << 31);

    const FLAGS: u32 = 0xF000_0000;

    const NAMED: [(Operator, &'static str); 27] = [
        (Self::INCREMENT_READ, "IncrementRead"),
        (Self::DECREMENT_READ, "DecrementRead"),
        (Self::READ_INCREMENT, "ReadIncrement"),
        (Self::READ_DECREMENT, "ReadDecrement"),
        (Self::LOGIC_NOT, "LogicNot"),
        (Self::ARITHMETIC_NOT, "ArithmeticNot"),
        (Self::PLUS, "Plus"),
        (Self::MINUS, "Minus"),
        (Self::MULTIPLY, "Multiply"),
        (Self::DIVIDE, "Divide"),
        (Self::MODULUS, "Modulus"),
        (Self::POW, "Pow"),
        (Self::EQUALS, "Equals"),
        (Self::NOT_EQUALS, "NotEquals"),
        (Self::GREATER, "Greater"),
        (Self::GREATER_EQ, "GreaterEq"),
        (Self::LESSER, "Lesser"),
        (Self::LESSER_EQ, "LesserEq"),
        (Self::BIT_AND, "BitAnd"),
        (Self::BIT_OR, "BitOr"),
        (Self::LOGIC_AND, "LogicAnd"),
        (Self::LOGIC_OR, "LogicOr"),
        (Self::LSHIFT, "LShift"),
        (Self::RSHIFT, "RShift"),
        (Self::ULSHIFT, "ULShift"),
        (Self::URSHIFT, "URShift"),
        (Self::NULL_FALLBACK, "NullFallback"),
    ];

    pub const fn bits(self) -> u64 {
        self.0 as u64
    }

    pub const fn from_bits(bits: u64) -> Self {
        Operator(bits as u32)
    }

    pub const fn contains(self, other: Operator) -> bool {
        self.0 & other.0 == other.0
    }

    /// The operator with its flag bits stripped.
    pub const fn base(self) -> Operator {
        Operator(self.0 & !Self::FLAGS)
    }

    pub const fn is_binary(self) -> bool {
        self.contains(Self::BINARY)
    }

    pub const fn is_compound(self) -> bool {
        self.contains(Self::COMPOUND)
    }

    pub const fn is_prefix(self) -> bool {
        self.contains(Self::UNARY_PREFIX)
    }

    pub const fn is_postfix(self) -> bool {
        self.contains(Self::UNARY_POSTFIX)
    }

    /// Name of the base operator, e.g. `Plus`.
    pub fn name(self) -> Option<&'static str> {
        let base = self.base();
        Self::NAMED.iter().find(|(op, _)| *op == base).map(|(_, n)| *n)
    }

    /// Member name a non-numeric operand must declare to overload this
    /// operator (`opPlus`).
    pub fn member_name(self) -> Option<String> {
        self.name().map(|n| format!("op{n}"))
    }

    /// Inverse of `member_name`, yielding a binary operator.
    pub fn from_member_name(member: &str) -> Option<Operator> {
        let name = member.strip_prefix("op")?;
        Self::NAMED
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(op, _)| *op | Self::BINARY)
    }
}

impl BitOr for Operator {
    type Output = Operator;

    fn bitor(self, rhs: Operator) -> Operator {
        Operator(self.0 | rhs.0)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().unwrap_or("Unknown"))?;
        for (flag, label) in [
            (Self::UNARY_PREFIX, "prefix"),
            (Self::UNARY_POSTFIX, "postfix"),
            (Self::BINARY, "binary"),
            (Self::COMPOUND, "compound"),
        ] {
            if self.contains(flag) {
                write!(f, "|{label}")?;
            }
        }
        Ok(())
    }
}
