//! Statement/component bytecode
//!
//! "Bytecode" here is the in-memory tree the front-end produces and the
//! evaluator walks: an `ExecutableCode` is a list of `Statement`s, each of
//! which is a sequence of `StatementComponent`s sharing the default output
//! register. Which child slots of a component are populated depends on its
//! `(role, kind)` pair; the evaluator's dispatch is the contract.

pub mod codec;
pub mod decl;
mod operator;

pub use decl::{ClassDecl, MemberDecl, MethodDecl, PropertyDecl};
pub use operator::Operator;

use crate::span::SourcePosition;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which scoped store a variable name resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VariableContext {
    #[default]
    Local,
    This,
    Property,
    Absolute,
}

/// Role of a component within its statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ComponentRole {
    #[default]
    Expression,
    Declaration,
    Setter,
    Pipe,
    Code,
    Operator,
    Provider,
    Consumer,
    Emitter,
    Lambda,
}

impl ComponentRole {
    const EXPRESSION: u16 = 0x10;

    /// Flag word of the role; composite roles include their parents' bits.
    pub const fn bits(self) -> u16 {
        match self {
            ComponentRole::Expression => 0x10,
            ComponentRole::Declaration => 0x20 | 0x10,
            ComponentRole::Setter => 0x100,
            ComponentRole::Pipe => 0x40 | 0x20 | 0x10,
            ComponentRole::Code => 0x80,
            ComponentRole::Operator => 0x01 | 0x10,
            ComponentRole::Provider => 0x02 | 0x10,
            ComponentRole::Consumer => 0x04 | 0x02 | 0x10 | 0x40 | 0x20,
            ComponentRole::Emitter => 0x08 | 0x40 | 0x20 | 0x10,
            ComponentRole::Lambda => 0x200,
        }
    }

    /// Whether a component of this role yields a value.
    pub const fn is_expression(self) -> bool {
        self.bits() & Self::EXPRESSION != 0
    }

    pub const fn is_declaration(self) -> bool {
        self.bits() & 0x20 != 0
    }
}

/// Kind of a statement or component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BytecodeKind {
    #[default]
    Undefined,
    Declaration,
    Assignment,
    Expression,
    Statement,
    Operator,
    Parentheses,
    LiteralNumeric,
    LiteralString,
    LiteralTrue,
    LiteralFalse,
    LiteralRange,
    ExpressionVariable,
    StmtIf,
    StmtElse,
    StmtDo,
    StmtWhile,
    StmtTry,
    StmtCatch,
    StmtFinally,
    StmtFor,
    StmtForEach,
    Instanceof,
    Indexer,
    ArrayConstructor,
    ParameterExpression,
    StdioExpression,
    TypeExpression,
    ConstructorCall,
    Call,
    Lambda,
    Throw,
    Return,
    Null,
}

/// An ordered list of statements: a method, property accessor or block body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutableCode {
    pub main: Vec<Statement>,
}

impl ExecutableCode {
    pub fn new(main: Vec<Statement>) -> Self {
        Self { main }
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_empty()
    }
}

/// One syntactic unit: a sequence of components plus an optional
/// catch/finally handler chain.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Statement {
    pub role: ComponentRole,
    pub kind: BytecodeKind,
    /// Declared or inferred result type name, empty when unknown.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_type: String,
    pub main: Vec<StatementComponent>,
    /// First clause of a `catch ... finally` chain linked through
    /// `alt_component`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catch_finally: Option<Box<StatementComponent>>,
}

impl Statement {
    pub fn new(role: ComponentRole, kind: BytecodeKind) -> Self {
        Self {
            role,
            kind,
            ..Default::default()
        }
    }

    /// An expression statement over `main`.
    pub fn expression(main: Vec<StatementComponent>) -> Self {
        Self {
            role: ComponentRole::Expression,
            kind: BytecodeKind::Expression,
            main,
            ..Default::default()
        }
    }

    pub fn with_component(mut self, component: StatementComponent) -> Self {
        self.main.push(component);
        self
    }

    pub fn with_catch_finally(mut self, handler: StatementComponent) -> Self {
        self.catch_finally = Some(Box::new(handler));
        self
    }
}

/// A node of the statement tree.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatementComponent {
    pub role: ComponentRole,
    pub kind: BytecodeKind,
    #[serde(default)]
    pub context: VariableContext,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub arg: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Operator word for `Operator` components.
    #[serde(default)]
    pub byte_arg: u64,
    #[serde(default)]
    pub position: SourcePosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_statement: Option<Box<Statement>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_statement: Option<Box<Statement>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_component: Option<Box<StatementComponent>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_component: Option<Box<StatementComponent>>,
    /// Evaluated after this component, against its result (member chaining).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_component: Option<Box<StatementComponent>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_code: Option<ExecutableCode>,
}

impl StatementComponent {
    pub fn new(role: ComponentRole, kind: BytecodeKind) -> Self {
        Self {
            role,
            kind,
            ..Default::default()
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.arg = arg.into();
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_operator(mut self, op: Operator) -> Self {
        self.byte_arg = op.bits();
        self
    }

    pub fn with_position(mut self, position: SourcePosition) -> Self {
        self.position = position;
        self
    }

    pub fn with_sub_statement(mut self, stmt: Statement) -> Self {
        self.sub_statement = Some(Box::new(stmt));
        self
    }

    pub fn with_alt_statement(mut self, stmt: Statement) -> Self {
        self.alt_statement = Some(Box::new(stmt));
        self
    }

    pub fn with_sub_component(mut self, comp: StatementComponent) -> Self {
        self.sub_component = Some(Box::new(comp));
        self
    }

    pub fn with_alt_component(mut self, comp: StatementComponent) -> Self {
        self.alt_component = Some(Box::new(comp));
        self
    }

    pub fn with_post_component(mut self, comp: StatementComponent) -> Self {
        self.post_component = Some(Box::new(comp));
        self
    }

    pub fn with_inner_code(mut self, code: ExecutableCode) -> Self {
        self.inner_code = Some(code);
        self
    }

    /// Append `comp` at the end of this component's post chain.
    pub fn chain(&mut self, comp: StatementComponent) {
        let mut slot = &mut self.post_component;
        while let Some(next) = slot {
            slot = &mut next.post_component;
        }
        *slot = Some(Box::new(comp));
    }

    pub fn operator(&self) -> Operator {
        Operator::from_bits(self.byte_arg)
    }

    // ---- common node shapes ----

    pub fn numeric(text: impl Into<String>) -> Self {
        Self::new(ComponentRole::Expression, BytecodeKind::LiteralNumeric).with_arg(text)
    }

    pub fn string(text: impl Into<String>) -> Self {
        Self::new(ComponentRole::Expression, BytecodeKind::LiteralString).with_arg(text)
    }

    pub fn boolean(value: bool) -> Self {
        let kind = if value {
            BytecodeKind::LiteralTrue
        } else {
            BytecodeKind::LiteralFalse
        };
        Self::new(ComponentRole::Expression, kind)
    }

    pub fn null() -> Self {
        Self::new(ComponentRole::Expression, BytecodeKind::Null)
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::new(ComponentRole::Provider, BytecodeKind::ExpressionVariable).with_arg(name)
    }

    pub fn this() -> Self {
        Self::new(ComponentRole::Provider, BytecodeKind::Undefined)
    }

    /// `type name` declaration, with an initializer when `init` is given.
    pub fn declaration(ty: impl Into<String>, name: impl Into<String>, init: Option<StatementComponent>) -> Self {
        let kind = if init.is_some() {
            BytecodeKind::Assignment
        } else {
            BytecodeKind::Declaration
        };
        let mut comp = Self::new(ComponentRole::Declaration, kind).with_args([ty.into(), name.into()]);
        comp.sub_component = init.map(Box::new);
        comp
    }

    pub fn binary(op: Operator, right: StatementComponent) -> Self {
        Self::new(ComponentRole::Operator, BytecodeKind::Operator)
            .with_operator(op | Operator::BINARY)
            .with_sub_component(right)
    }

    /// A component evaluating `stmt` as a nested expression.
    pub fn parentheses(stmt: Statement) -> Self {
        Self::new(ComponentRole::Expression, BytecodeKind::Parentheses).with_sub_statement(stmt)
    }

    /// Parameter list; each statement yields one argument.
    pub fn parameters(args: Vec<Statement>) -> Self {
        Self::new(ComponentRole::Code, BytecodeKind::ParameterExpression)
            .with_inner_code(ExecutableCode::new(args))
    }

    pub fn call(member: impl Into<String>, args: Option<StatementComponent>) -> Self {
        let mut comp = Self::new(ComponentRole::Expression, BytecodeKind::Call).with_arg(member);
        comp.sub_component = args.map(Box::new);
        comp
    }
}

impl fmt::Display for StatementComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{:?}", self.role, self.kind)?;
        if !self.arg.is_empty() {
            write!(f, "({})", self.arg)?;
        }
        if !self.args.is_empty() {
            write!(f, "[{}]", self.args.join(", "))?;
        }
        if self.role == ComponentRole::Operator {
            write!(f, "<{}>", self.operator())?;
        }
        Ok(())
    }
}
