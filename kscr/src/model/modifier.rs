//! Member and class modifier flags

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bit set of declaration modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Modifier(u32);

impl Modifier {
    pub const NONE: Modifier = Modifier(0);

    pub const PUBLIC: Modifier = Modifier(0x1000);
    pub const INTERNAL: Modifier = Modifier(0x2000);
    pub const PROTECTED: Modifier = Modifier(0x4000);
    pub const PRIVATE: Modifier = Modifier(0x8000);

    pub const STATIC: Modifier = Modifier(0x10_0000);
    pub const ABSTRACT: Modifier = Modifier(0x40_0000);
    pub const FINAL: Modifier = Modifier(0x80_0000);
    pub const NATIVE: Modifier = Modifier(0x100_0000);
    pub const SYNCHRONIZED: Modifier = Modifier(0x200_0000);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Modifier(bits)
    }

    pub const fn contains(self, other: Modifier) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_public(self) -> bool {
        self.contains(Self::PUBLIC)
    }

    pub fn is_private(self) -> bool {
        self.contains(Self::PRIVATE)
    }

    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    pub fn is_abstract(self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    pub fn is_final(self) -> bool {
        self.contains(Self::FINAL)
    }

    pub fn is_native(self) -> bool {
        self.contains(Self::NATIVE)
    }

    /// Map a source keyword onto its flag.
    pub fn from_keyword(word: &str) -> Option<Modifier> {
        Some(match word {
            "public" => Self::PUBLIC,
            "internal" => Self::INTERNAL,
            "protected" => Self::PROTECTED,
            "private" => Self::PRIVATE,
            "static" => Self::STATIC,
            "abstract" => Self::ABSTRACT,
            "final" => Self::FINAL,
            "native" => Self::NATIVE,
            "synchronized" => Self::SYNCHRONIZED,
            _ => return None,
        })
    }
}

impl BitOr for Modifier {
    type Output = Modifier;

    fn bitor(self, rhs: Modifier) -> Modifier {
        Modifier(self.0 | rhs.0)
    }
}

impl BitOrAssign for Modifier {
    fn bitor_assign(&mut self, rhs: Modifier) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Modifier, &str); 9] = [
            (Modifier::PUBLIC, "public"),
            (Modifier::INTERNAL, "internal"),
            (Modifier::PROTECTED, "protected"),
            (Modifier::PRIVATE, "private"),
            (Modifier::STATIC, "static"),
            (Modifier::ABSTRACT, "abstract"),
            (Modifier::FINAL, "final"),
            (Modifier::NATIVE, "native"),
            (Modifier::SYNCHRONIZED, "synchronized"),
        ];
        let words: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", words.join(" "))
    }
}
