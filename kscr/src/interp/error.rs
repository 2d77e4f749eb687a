//! Runtime errors for the interpreter
//!
//! Two tiers: fatal kinds describe malformed bytecode or a broken runtime
//! invariant and are never caught by user code; `Thrown` carries a value
//! raised by a `throw` statement (or a native null access) and is what
//! `catch` clauses match against. `StackTrace` wraps either tier once per
//! frame boundary it crosses.

use super::value::Value;
use crate::span::SourcePosition;
use std::fmt;

/// Runtime error during interpretation
#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    /// Wrapped error when `kind` is `StackTrace`
    pub cause: Option<Box<RuntimeError>>,
}

/// Kinds of runtime errors
#[derive(Debug, Clone)]
pub enum ErrorKind {
    /// Interpreter invariant violated
    Fatal,
    /// Value assigned to a reference that cannot hold its type
    TypeMismatch,
    UndefinedVariable,
    UndefinedMember,
    /// Type argument or call argument count mismatch
    ArityMismatch,
    NotGettable,
    NotSettable,
    DivisionByZero,
    IndexOutOfBounds,
    /// Call depth exceeded
    StackOverflow,
    Unimplemented,
    Io,
    /// A user-level throw; the only catchable kind
    Thrown {
        value: Value,
        exit_code: i32,
        exit_message: String,
    },
    /// Frame boundary crossed by `cause`
    StackTrace {
        local: String,
        position: SourcePosition,
    },
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl RuntimeError {
    fn new(kind: ErrorKind, message: String) -> Self {
        RuntimeError {
            kind,
            message,
            cause: None,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message.into())
    }

    pub fn type_mismatch(value_type: &str, ref_type: &str) -> Self {
        Self::new(
            ErrorKind::TypeMismatch,
            format!("Invalid Type ({value_type}) assigned to reference of type {ref_type}"),
        )
    }

    pub fn undefined_variable(name: &str) -> Self {
        Self::new(ErrorKind::UndefinedVariable, format!("undefined variable: {name}"))
    }

    pub fn undefined_member(ty: &str, name: &str) -> Self {
        Self::new(
            ErrorKind::UndefinedMember,
            format!("member {name} not found in type {ty}"),
        )
    }

    pub fn arity_mismatch(name: &str, expected: usize, got: usize) -> Self {
        Self::new(
            ErrorKind::ArityMismatch,
            format!("{name} expects {expected} argument(s), got {got}"),
        )
    }

    pub fn not_gettable(property: &str) -> Self {
        Self::new(ErrorKind::NotGettable, format!("Property {property} is not gettable"))
    }

    pub fn not_settable(property: &str) -> Self {
        Self::new(ErrorKind::NotSettable, format!("Property {property} is not settable"))
    }

    pub fn division_by_zero() -> Self {
        Self::new(ErrorKind::DivisionByZero, "division by zero".to_string())
    }

    pub fn index_out_of_bounds(index: i64, len: usize) -> Self {
        Self::new(
            ErrorKind::IndexOutOfBounds,
            format!("index {index} out of bounds for length {len}"),
        )
    }

    pub fn stack_overflow(depth: usize) -> Self {
        Self::new(
            ErrorKind::StackOverflow,
            format!("stack overflow: call depth exceeded {depth}"),
        )
    }

    pub fn unimplemented(what: &str) -> Self {
        Self::new(ErrorKind::Unimplemented, format!("not implemented: {what}"))
    }

    pub fn io_error(msg: &str) -> Self {
        Self::new(ErrorKind::Io, format!("IO error: {msg}"))
    }

    /// A structured throw of `value` whose native members produced
    /// `exit_code` and `exit_message`.
    pub fn thrown(value: Value, type_name: &str, exit_code: i32, exit_message: String) -> Self {
        let message = format!("{type_name}: {exit_message} ({exit_code})");
        Self::new(
            ErrorKind::Thrown {
                value,
                exit_code,
                exit_message,
            },
            message,
        )
    }

    /// Wrap `cause` as it leaves the frame labelled `local`.
    pub fn stack_trace(local: &str, position: SourcePosition, cause: RuntimeError) -> Self {
        RuntimeError {
            message: format!("at {local} ({position})"),
            kind: ErrorKind::StackTrace {
                local: local.to_string(),
                position,
            },
            cause: Some(Box::new(cause)),
        }
    }

    /// Innermost error of a stack-trace chain.
    pub fn root_cause(&self) -> &RuntimeError {
        let mut current = self;
        while let Some(cause) = &current.cause {
            current = cause;
        }
        current
    }

    /// The thrown value, if the root cause is a user-level throw.
    pub fn thrown_value(&self) -> Option<&Value> {
        match &self.root_cause().kind {
            ErrorKind::Thrown { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Whether user code may catch this error.
    pub fn is_catchable(&self) -> bool {
        self.thrown_value().is_some()
    }

    /// Process exit code this error terminates with.
    pub fn exit_code(&self) -> i32 {
        match &self.root_cause().kind {
            ErrorKind::Thrown { exit_code, .. } => *exit_code,
            _ => -1,
        }
    }

    /// Exit message this error terminates with.
    pub fn exit_message(&self) -> &str {
        match &self.root_cause().kind {
            ErrorKind::Thrown { exit_message, .. } => exit_message,
            _ => &self.root_cause().message,
        }
    }

    /// Frames crossed by this error, innermost first.
    pub fn frames(&self) -> Vec<(&str, &SourcePosition)> {
        let mut out = Vec::new();
        let mut current = Some(self);
        while let Some(err) = current {
            if let ErrorKind::StackTrace { local, position } = &err.kind {
                out.push((local.as_str(), position));
            }
            current = err.cause.as_deref();
        }
        out.reverse();
        out
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Runtime error: {}", self.root_cause().message)
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

/// Result type for interpreter operations
pub type InterpResult<T> = Result<T, RuntimeError>;
