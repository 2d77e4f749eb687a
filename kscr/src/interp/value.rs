//! Runtime values
//!
//! Primitive values (`Numeric`, ranges, class references) are plain data;
//! everything with identity (strings, objects, arrays, sequences,
//! exceptions) is shared through `Rc`.

use super::numeric::{Numeric, NumericMode};
use crate::model::{ClassStore, TypeId};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Instance of a user class.
#[derive(Debug)]
pub struct CodeObject {
    pub id: u64,
    pub ty: TypeId,
}

/// Fixed-length array; `ty` is the `array<T>` instance.
#[derive(Debug)]
pub struct ArrayObject {
    pub id: u64,
    pub ty: TypeId,
    pub element: TypeId,
    pub items: RefCell<Vec<Value>>,
}

impl ArrayObject {
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.borrow().get(index).cloned()
    }
}

/// Iteration state of a native sequence.
#[derive(Debug)]
pub enum SequenceSource {
    /// Walks `start` towards `end`, excluding `end`
    Range { start: i32, end: i32 },
    /// Walks an in-memory list
    Values(Vec<Value>),
}

/// A finite, single-pass sequence.
#[derive(Debug)]
pub struct SequenceObject {
    pub id: u64,
    pub ty: TypeId,
    pub source: SequenceSource,
    /// Number of elements consumed so far
    position: Cell<usize>,
    current: RefCell<Value>,
}

impl SequenceObject {
    pub fn new(id: u64, ty: TypeId, source: SequenceSource) -> Self {
        Self {
            id,
            ty,
            source,
            position: Cell::new(0),
            current: RefCell::new(Value::Null),
        }
    }

    pub fn len(&self) -> usize {
        match &self.source {
            SequenceSource::Range { start, end } => start.abs_diff(*end) as usize,
            SequenceSource::Values(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn element(&self, n: usize) -> Option<Value> {
        match &self.source {
            SequenceSource::Range { start, end } => {
                if n >= self.len() {
                    return None;
                }
                let n = n as i32;
                let v = if end < start { start - n } else { start + n };
                Some(Value::Numeric(Numeric::Int(v)))
            }
            SequenceSource::Values(items) => items.get(n).cloned(),
        }
    }

    pub fn has_next(&self) -> bool {
        self.position.get() < self.len()
    }

    /// Advance and return the new current element, or `None` when drained.
    pub fn next(&self) -> Option<Value> {
        let v = self.element(self.position.get())?;
        self.position.set(self.position.get() + 1);
        *self.current.borrow_mut() = v.clone();
        Some(v)
    }

    pub fn current(&self) -> Value {
        self.current.borrow().clone()
    }
}

/// An exception raised by the runtime itself (e.g. null access).
#[derive(Debug)]
pub struct ExceptionObject {
    pub id: u64,
    pub ty: TypeId,
    pub message: String,
    pub exit_code: i32,
}

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Numeric(Numeric),
    Str(Rc<str>),
    Object(Rc<CodeObject>),
    Array(Rc<ArrayObject>),
    Range { start: i32, end: i32 },
    Sequence(Rc<SequenceObject>),
    /// Reference to a class instance, as produced by a type expression
    Type(TypeId),
    Error(Rc<ExceptionObject>),
}

impl Value {
    pub fn bool(value: bool) -> Self {
        Value::Numeric(Numeric::from_bool(value))
    }

    pub fn int(value: i32) -> Self {
        Value::Numeric(Numeric::Int(value))
    }

    pub fn str(value: &str) -> Self {
        Value::Str(Rc::from(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_numeric(&self) -> Option<Numeric> {
        match self {
            Value::Numeric(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Identity of the value; `0` is reserved for null.
    pub fn id(&self) -> u64 {
        match self {
            Value::Null => 0,
            Value::Object(o) => o.id,
            Value::Array(a) => a.id,
            Value::Sequence(s) => s.id,
            Value::Error(e) => e.id,
            Value::Numeric(_) | Value::Str(_) | Value::Range { .. } | Value::Type(_) => u64::MAX,
        }
    }

    /// Truthiness: not null and not a zero or negative numeric.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Numeric(n) => !n.is_implicitly_false(),
            _ => true,
        }
    }

    pub fn type_of(&self, classes: &ClassStore) -> TypeId {
        let p = classes.primitives();
        match self {
            Value::Null => p.void_t,
            Value::Numeric(n) => match n.mode() {
                NumericMode::Byte => p.num_byte,
                NumericMode::Short => p.num_short,
                NumericMode::Int => p.num_int,
                NumericMode::Long => p.num_long,
                NumericMode::Float => p.num_float,
                NumericMode::Double => p.num_double,
            },
            Value::Str(_) => p.str_t,
            Value::Object(o) => o.ty,
            Value::Array(a) => a.ty,
            Value::Range { .. } => p.range_t,
            Value::Sequence(s) => s.ty,
            Value::Type(_) => p.type_t,
            Value::Error(e) => e.ty,
        }
    }

    /// Key under which the value is stored in the absolute store.
    pub fn key(&self, classes: &ClassStore) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Numeric(n) => n.key(),
            Value::Str(s) => format!("str:{s:?}"),
            Value::Range { start, end } => format!("range:{start}~{end}"),
            Value::Type(t) => classes.instance(*t).key(),
            other => format!("obj:{}-{:x}", classes.type_name(other.type_of(classes)), other.id()),
        }
    }

    /// Identity or value equality, without user `equals` overrides.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Numeric(a), Value::Numeric(b)) => a.equals(*b),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Sequence(a), Value::Sequence(b)) => Rc::ptr_eq(a, b),
            (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(a, b),
            (Value::Range { start: s1, end: e1 }, Value::Range { start: s2, end: e2 }) => {
                s1 == s2 && e1 == e2
            }
            (Value::Type(a), Value::Type(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    /// Context-free rendering; class names need the store, see `Interpreter::stringify`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Numeric(n) => write!(f, "{n}"),
            Value::Str(s) => f.write_str(s),
            Value::Range { start, end } => write!(f, "{start}~{end}"),
            Value::Object(o) => write!(f, "object#{:x}", o.id),
            Value::Array(a) => write!(f, "array[{}]", a.len()),
            Value::Sequence(s) => write!(f, "sequence[{}]", s.len()),
            Value::Type(t) => write!(f, "type#{}", t.index()),
            Value::Error(e) => f.write_str(&e.message),
        }
    }
}
