//! Classes, generic instances and type parameters

use super::member::ClassMember;
use super::modifier::Modifier;
use crate::span::SourcePosition;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Handle of a declared class inside the `ClassStore` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ClassId(pub(crate) u32);

/// Handle of a parameterized class instance (a runtime type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TypeId(pub(crate) u32);

impl ClassId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ClassKind {
    #[default]
    Class,
    Interface,
    Enum,
}

impl fmt::Display for ClassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClassKind::Class => "class",
            ClassKind::Interface => "interface",
            ClassKind::Enum => "enum",
        };
        write!(f, "{s}")
    }
}

/// How a type parameter constrains its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Specialization {
    #[default]
    Extends,
    Super,
    List,
    /// Integer bit-width parameter (`int<n>`)
    N,
}

/// Default bit width bound to an `n` parameter.
pub const DEFAULT_WIDTH: u32 = 32;

/// A generic parameter declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeParameter {
    pub name: String,
    specialization: Specialization,
    /// Type name the parameter defaults to; `void` when unset.
    pub target: Option<String>,
}

impl TypeParameter {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let specialization = if name == "n" {
            Specialization::N
        } else {
            Specialization::Extends
        };
        Self {
            name,
            specialization,
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn specialization(&self) -> Specialization {
        self.specialization
    }

    /// Change the specialization. An `n` parameter keeps `N` forever;
    /// returns whether the change was applied.
    pub fn specialize(&mut self, specialization: Specialization) -> bool {
        if self.specialization == Specialization::N {
            return specialization == Specialization::N;
        }
        self.specialization = specialization;
        true
    }

    pub fn target_name(&self) -> &str {
        self.target.as_deref().unwrap_or("void")
    }
}

/// A type argument bound to a parameter when a class is instantiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeArgument {
    Type(TypeId),
    Width(u32),
}

/// Lifecycle of a class; transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ClassState {
    #[default]
    Declared,
    Initialized,
    LateInitialized,
}

/// A named, packaged type declaration.
#[derive(Debug, Clone)]
pub struct Class {
    pub(crate) id: ClassId,
    pub name: String,
    pub package: String,
    pub modifier: Modifier,
    pub kind: ClassKind,
    pub primitive: bool,
    pub type_params: Vec<TypeParameter>,
    pub members: HashMap<String, ClassMember>,
    pub superclasses: Vec<TypeId>,
    pub interfaces: Vec<TypeId>,
    pub position: SourcePosition,
    pub(crate) state: ClassState,
    pub(crate) default_instance: Option<TypeId>,
}

impl Class {
    pub(crate) fn new(id: ClassId, package: &str, name: &str, modifier: Modifier, kind: ClassKind) -> Self {
        Self {
            id,
            name: name.to_string(),
            package: package.to_string(),
            modifier,
            kind,
            primitive: false,
            type_params: Vec::new(),
            members: HashMap::new(),
            superclasses: Vec::new(),
            interfaces: Vec::new(),
            position: SourcePosition::system(),
            state: ClassState::Declared,
            default_instance: None,
        }
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn full_name(&self) -> String {
        if self.package.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.package, self.name)
        }
    }

    pub fn state(&self) -> ClassState {
        self.state
    }

    pub fn default_instance(&self) -> Option<TypeId> {
        self.default_instance
    }

    pub fn is_native(&self) -> bool {
        self.modifier.is_native()
    }

    pub fn is_interface(&self) -> bool {
        self.kind == ClassKind::Interface
    }

    pub fn declared_member(&self, name: &str) -> Option<&ClassMember> {
        self.members.get(name)
    }
}

/// A class as parameterized with concrete type arguments.
#[derive(Debug, Clone)]
pub struct ClassInstance {
    pub(crate) id: TypeId,
    pub base: ClassId,
    /// Bindings in declaration order: parameter name and argument.
    pub args: Vec<(String, TypeArgument)>,
    pub(crate) detailed_name: String,
    pub(crate) full_detailed_name: String,
}

impl ClassInstance {
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Name with type arguments, e.g. `array<str>`.
    pub fn detailed_name(&self) -> &str {
        &self.detailed_name
    }

    /// Qualified name with type arguments.
    pub fn full_detailed_name(&self) -> &str {
        &self.full_detailed_name
    }

    /// Key of the self-reference token stored in the absolute store.
    pub fn key(&self) -> String {
        format!("class-instance:{}", self.full_detailed_name)
    }

    pub fn argument(&self, name: &str) -> Option<TypeArgument> {
        self.args.iter().find(|(n, _)| n == name).map(|(_, a)| *a)
    }

    pub fn first_type_argument(&self) -> Option<TypeId> {
        self.args.iter().find_map(|(_, a)| match a {
            TypeArgument::Type(t) => Some(*t),
            TypeArgument::Width(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_n_parameter_is_width() {
        let p = TypeParameter::new("n");
        assert_eq!(p.specialization(), Specialization::N);
    }

    #[test]
    fn test_n_parameter_is_immutable() {
        let mut p = TypeParameter::new("n");
        assert!(!p.specialize(Specialization::Super));
        assert_eq!(p.specialization(), Specialization::N);
    }

    #[test]
    fn test_regular_parameter_can_specialize() {
        let mut p = TypeParameter::new("T");
        assert!(p.specialize(Specialization::Super));
        assert_eq!(p.specialization(), Specialization::Super);
    }

    #[test]
    fn test_target_defaults_to_void() {
        assert_eq!(TypeParameter::new("T").target_name(), "void");
        assert_eq!(TypeParameter::new("T").with_target("num").target_name(), "num");
    }

    #[test]
    fn test_full_name_without_package() {
        let c = Class::new(ClassId(0), "", "Main", Modifier::PUBLIC, ClassKind::Class);
        assert_eq!(c.full_name(), "Main");
        let c = Class::new(ClassId(1), "org.test", "Main", Modifier::PUBLIC, ClassKind::Class);
        assert_eq!(c.full_name(), "org.test.Main");
    }
}
