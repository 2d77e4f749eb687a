//! Class and member declarations as produced by the compiler
//!
//! These are the persistent form of a class: plain data that the codec
//! writes and loads, and that `Interpreter::load` turns into live classes.

use super::{ExecutableCode, Statement};
use crate::model::{ClassKind, MethodParameter, Modifier, TypeParameter};
use crate::span::SourcePosition;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    #[serde(default)]
    pub package: String,
    pub modifier: Modifier,
    pub kind: ClassKind,
    #[serde(default)]
    pub type_params: Vec<TypeParameter>,
    /// Type names, resolved when the class is loaded
    #[serde(default)]
    pub superclasses: Vec<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub members: Vec<MemberDecl>,
    #[serde(default)]
    pub position: SourcePosition,
}

impl ClassDecl {
    pub fn new(package: impl Into<String>, name: impl Into<String>, modifier: Modifier, kind: ClassKind) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
            modifier,
            kind,
            type_params: Vec::new(),
            superclasses: Vec::new(),
            interfaces: Vec::new(),
            members: Vec::new(),
            position: SourcePosition::default(),
        }
    }

    pub fn full_name(&self) -> String {
        if self.package.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.package, self.name)
        }
    }

    pub fn member(&self, name: &str) -> Option<&MemberDecl> {
        self.members.iter().find(|m| m.name() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemberDecl {
    Method(MethodDecl),
    Property(PropertyDecl),
}

impl MemberDecl {
    pub fn name(&self) -> &str {
        match self {
            MemberDecl::Method(m) => &m.name,
            MemberDecl::Property(p) => &p.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    pub modifier: Modifier,
    pub return_type: String,
    #[serde(default)]
    pub parameters: Vec<MethodParameter>,
    /// Absent for abstract and native methods
    #[serde(default)]
    pub body: Option<ExecutableCode>,
    #[serde(default)]
    pub position: SourcePosition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDecl {
    pub name: String,
    pub modifier: Modifier,
    pub ty: String,
    pub gettable: bool,
    pub settable: bool,
    pub inittable: bool,
    #[serde(default)]
    pub getter: Option<ExecutableCode>,
    #[serde(default)]
    pub setter: Option<ExecutableCode>,
    #[serde(default)]
    pub initializer: Option<Statement>,
    #[serde(default)]
    pub position: SourcePosition,
}

impl PropertyDecl {
    /// A plain field: gettable, settable and inittable.
    pub fn field(name: impl Into<String>, modifier: Modifier, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modifier,
            ty: ty.into(),
            gettable: true,
            settable: true,
            inittable: true,
            getter: None,
            setter: None,
            initializer: None,
            position: SourcePosition::default(),
        }
    }
}
