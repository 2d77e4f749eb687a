//! Class members: methods and properties

use super::class::ClassId;
use super::modifier::Modifier;
use crate::bytecode::{ExecutableCode, Statement};
use crate::span::SourcePosition;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Name under which constructors are registered.
pub const CONSTRUCTOR_NAME: &str = "ctor";
/// Name under which static initializers are registered.
pub const STATIC_INITIALIZER_NAME: &str = "cctor";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodParameter {
    /// Declared type name, resolved when the method is invoked.
    pub ty: String,
    pub name: String,
}

impl MethodParameter {
    pub fn new(ty: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug)]
pub struct Method {
    pub name: String,
    pub owner: ClassId,
    pub modifier: Modifier,
    pub return_type: String,
    pub parameters: Vec<MethodParameter>,
    /// `None` for native and abstract methods.
    pub body: Option<Rc<ExecutableCode>>,
    pub position: SourcePosition,
}

impl Method {
    /// A bodiless native member synthesized for primitive classes.
    pub fn native(owner: ClassId, name: &str, return_type: &str, parameters: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            owner,
            modifier: Modifier::PUBLIC | Modifier::NATIVE,
            return_type: return_type.to_string(),
            parameters: parameters
                .iter()
                .map(|(ty, name)| MethodParameter::new(*ty, *name))
                .collect(),
            body: None,
            position: SourcePosition::system(),
        }
    }

    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    pub fn returns_void(&self) -> bool {
        self.return_type == "void"
    }

    /// `name(type a, type b)` as used in frame labels.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| format!("{} {}", p.ty, p.name))
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }
}

#[derive(Debug)]
pub struct Property {
    pub name: String,
    pub owner: ClassId,
    pub modifier: Modifier,
    pub ty: String,
    pub gettable: bool,
    pub settable: bool,
    pub inittable: bool,
    pub getter: Option<Rc<ExecutableCode>>,
    pub setter: Option<Rc<ExecutableCode>>,
    pub initializer: Option<Rc<Statement>>,
    pub position: SourcePosition,
}

impl Property {
    /// Whether reads and writes go to the property store rather than code.
    pub fn is_auto(&self) -> bool {
        self.getter.is_none() && self.setter.is_none()
    }

    /// Store key of an auto-property's value on the object with `owner_key`.
    pub fn storage_key(&self, owner_key: &str) -> String {
        format!("property-{owner_key}.{}", self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Method,
    Property,
}

/// A method or property declared on a class.
#[derive(Debug, Clone)]
pub enum ClassMember {
    Method(Rc<Method>),
    Property(Rc<Property>),
}

impl ClassMember {
    pub fn name(&self) -> &str {
        match self {
            ClassMember::Method(m) => &m.name,
            ClassMember::Property(p) => &p.name,
        }
    }

    pub fn owner(&self) -> ClassId {
        match self {
            ClassMember::Method(m) => m.owner,
            ClassMember::Property(p) => p.owner,
        }
    }

    pub fn modifier(&self) -> Modifier {
        match self {
            ClassMember::Method(m) => m.modifier,
            ClassMember::Property(p) => p.modifier,
        }
    }

    pub fn kind(&self) -> MemberKind {
        match self {
            ClassMember::Method(_) => MemberKind::Method,
            ClassMember::Property(_) => MemberKind::Property,
        }
    }

    pub fn is_static(&self) -> bool {
        self.modifier().is_static()
    }

    pub fn is_native(&self) -> bool {
        self.modifier().is_native()
    }

    /// Label used for the frame that executes this member.
    pub fn label(&self) -> String {
        match self {
            ClassMember::Method(m) => m.signature(),
            ClassMember::Property(p) => p.name.clone(),
        }
    }

    pub fn position(&self) -> &SourcePosition {
        match self {
            ClassMember::Method(m) => &m.position,
            ClassMember::Property(p) => &p.position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_method_signature() {
        let m = Method::native(ClassId(0), "equals", "num", &[("object", "other")]);
        assert_eq!(m.signature(), "equals(object other)");
        assert!(m.modifier.is_native());
        assert!(m.body.is_none());
    }

    #[test]
    fn test_constructor_detection() {
        let m = Method::native(ClassId(0), CONSTRUCTOR_NAME, "void", &[]);
        assert!(m.is_constructor());
        assert!(m.returns_void());
    }

    #[test]
    fn test_property_storage_key() {
        let p = Property {
            name: "count".into(),
            owner: ClassId(3),
            modifier: Modifier::PUBLIC,
            ty: "int".into(),
            gettable: true,
            settable: true,
            inittable: true,
            getter: None,
            setter: None,
            initializer: None,
            position: SourcePosition::system(),
        };
        assert!(p.is_auto());
        assert_eq!(p.storage_key("obj:Counter-1"), "property-obj:Counter-1.count");
    }

    #[test]
    fn test_member_accessors() {
        let m = ClassMember::Method(Rc::new(Method::native(ClassId(2), "length", "int", &[])));
        assert_eq!(m.name(), "length");
        assert_eq!(m.owner(), ClassId(2));
        assert_eq!(m.kind(), MemberKind::Method);
        assert_eq!(m.label(), "length()");
    }
}
