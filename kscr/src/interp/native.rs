//! Native members of the primitive classes
//!
//! Bodiless members declared on native classes are implemented here,
//! dispatched on the receiver's value kind. Members a user class declares
//! `native` go to the installed [`NativeRunner`] instead.

use super::error::{InterpResult, RuntimeError};
use super::numeric::{Numeric, NumericMode};
use super::runtime::Interpreter;
use super::store::{Accessor, ObjectRef};
use super::value::{ExceptionObject, SequenceObject, SequenceSource, Value};
use crate::bytecode::Operator;
use crate::model::{ClassMember, TypeId};
use std::io::{BufRead, Write};
use std::rc::Rc;
use tracing::trace;

/// Runs `native` members declared by user classes.
pub trait NativeRunner {
    fn invoke(
        &self,
        vm: &mut Interpreter,
        receiver: &Value,
        member: &ClassMember,
        args: &[Value],
    ) -> InterpResult<Value>;
}

/// Exit code carried by runtime-raised exceptions.
pub(crate) const EXCEPTION_EXIT_CODE: i32 = 1;

impl Interpreter {
    /// Invoke the native member `name` on `receiver`.
    pub(crate) fn invoke_native(&mut self, receiver: &Value, name: &str, args: &[Value]) -> InterpResult<Value> {
        trace!(member = name, receiver = %receiver, "native call");
        let specific = match receiver {
            Value::Null => return self.null_member(name),
            Value::Numeric(n) => self.numeric_member(*n, name, args)?,
            Value::Str(s) => self.str_member(s, name, args)?,
            Value::Range { start, end } => self.range_member(*start, *end, name, args)?,
            Value::Array(a) => match name {
                "length" => Some(Value::int(a.len() as i32)),
                "get" => {
                    let index = index_arg(args, a.len())?;
                    Some(
                        a.get(index)
                            .ok_or_else(|| RuntimeError::index_out_of_bounds(index as i64, a.len()))?,
                    )
                }
                "set" => {
                    let index = index_arg(args, a.len())?;
                    let value = args.get(1).cloned().unwrap_or_default();
                    let slot = ObjectRef::with_accessor(
                        a.element,
                        Accessor::ArrayElement { array: a.clone(), index },
                    );
                    self.write_ref(&slot, value)?;
                    Some(Value::Null)
                }
                "iterator" | "sequence" => {
                    let items = a.items.borrow().clone();
                    let element = self.classes.type_name(a.element).to_string();
                    Some(self.new_sequence(&element, SequenceSource::Values(items))?)
                }
                _ => None,
            },
            Value::Sequence(s) => match name {
                "finite" => Some(Value::bool(true)),
                "length" => Some(Value::int(s.len() as i32)),
                "hasNext" => Some(Value::bool(s.has_next())),
                "next" => Some(s.next().unwrap_or_default()),
                "current" => Some(s.current()),
                "iterator" | "sequence" => Some(receiver.clone()),
                _ => None,
            },
            Value::Object(o) => match name {
                "toString" => Some(Value::str(&format!(
                    "{}#{:x}",
                    self.classes.base_class(o.ty).full_name(),
                    o.id
                ))),
                "ExitCode" => Some(Value::int(EXCEPTION_EXIT_CODE)),
                "Message" => Some(Value::str(self.classes.type_name(o.ty))),
                _ => None,
            },
            Value::Type(t) => match name {
                "toString" => Some(Value::str(self.classes.instance(*t).full_detailed_name())),
                _ => None,
            },
            Value::Error(e) => match name {
                "ExitCode" => Some(Value::int(e.exit_code)),
                "Message" => Some(Value::str(&e.message)),
                "toString" => Some(Value::str(&format!(
                    "{}: {}",
                    self.classes.type_name(e.ty),
                    e.message
                ))),
                _ => None,
            },
        };
        if let Some(value) = specific {
            return Ok(value);
        }

        match name {
            "toString" => Ok(Value::str(&receiver.to_string())),
            "equals" => Ok(Value::bool(
                args.first().map(|other| receiver.same(other)).unwrap_or(false),
            )),
            "getType" => Ok(Value::Type(receiver.type_of(&self.classes))),
            "InternalID" => Ok(Value::Numeric(Numeric::Long(receiver.id() as i64))),
            _ => {
                let ty = receiver.type_of(&self.classes);
                Err(RuntimeError::undefined_member(self.classes.type_name(ty), name))
            }
        }
    }

    /// `null` renders as `"null"`; every other member access is a
    /// catchable null-pointer throw.
    fn null_member(&mut self, name: &str) -> InterpResult<Value> {
        if name == "toString" {
            return Ok(Value::str("null"));
        }
        let ty = self.classes.primitives().null_pointer_t;
        let message = format!("Cannot invoke member {name} on null");
        let value = self.new_exception(ty, &message, EXCEPTION_EXIT_CODE);
        let type_name = self.classes.type_name(ty).to_string();
        Err(RuntimeError::thrown(value, &type_name, EXCEPTION_EXIT_CODE, message))
    }

    fn numeric_member(&mut self, n: Numeric, name: &str, args: &[Value]) -> InterpResult<Option<Value>> {
        if let Some(op) = Operator::from_member_name(name) {
            let rhs = numeric_arg(args, name)?;
            return n.binary(op, rhs).map(|v| Some(Value::Numeric(v)));
        }
        Ok(match name {
            "toString" | "Message" => Some(Value::str(&n.to_string())),
            "ExitCode" => Some(Value::int(n.as_i32())),
            "equals" => Some(Value::bool(
                args.first()
                    .and_then(Value::as_numeric)
                    .map(|other| n.equals(other))
                    .unwrap_or(false),
            )),
            "sqrt" | "sin" | "cos" | "tan" => n.math(name).map(Value::Numeric),
            "byteValue" => Some(Value::Numeric(n.cast(NumericMode::Byte))),
            "shortValue" => Some(Value::Numeric(n.cast(NumericMode::Short))),
            "intValue" => Some(Value::Numeric(n.cast(NumericMode::Int))),
            "longValue" => Some(Value::Numeric(n.cast(NumericMode::Long))),
            "floatValue" => Some(Value::Numeric(n.cast(NumericMode::Float))),
            "doubleValue" => Some(Value::Numeric(n.cast(NumericMode::Double))),
            _ => None,
        })
    }

    fn str_member(&mut self, s: &Rc<str>, name: &str, args: &[Value]) -> InterpResult<Option<Value>> {
        Ok(match name {
            "toString" => Some(Value::Str(s.clone())),
            "length" => Some(Value::int(s.chars().count() as i32)),
            "opPlus" => {
                let other = match args.first() {
                    Some(v) => self.stringify(v)?,
                    None => return Err(RuntimeError::arity_mismatch(name, 1, 0)),
                };
                Some(Value::str(&format!("{s}{other}")))
            }
            _ => None,
        })
    }

    fn range_member(&mut self, start: i32, end: i32, name: &str, args: &[Value]) -> InterpResult<Option<Value>> {
        let decremental = end < start;
        Ok(match name {
            "start" => Some(Value::int(start)),
            "end" => Some(Value::int(end)),
            "decremental" => Some(Value::bool(decremental)),
            "test" => {
                let n = numeric_arg(args, name)?.as_i32();
                Some(Value::bool(if decremental { n > end } else { n < end }))
            }
            "accumulate" => {
                let n = numeric_arg(args, name)?.as_i32();
                Some(Value::int(if decremental { n - 1 } else { n + 1 }))
            }
            "iterator" | "sequence" => {
                Some(self.new_sequence("int", SequenceSource::Range { start, end })?)
            }
            _ => None,
        })
    }

    /// A fresh finite sequence over `source`.
    pub(crate) fn new_sequence(&mut self, element: &str, source: SequenceSource) -> InterpResult<Value> {
        let ty = self.sequence_type(element)?;
        let id = self.next_id();
        Ok(Value::Sequence(Rc::new(SequenceObject::new(id, ty, source))))
    }

    fn sequence_type(&mut self, element: &str) -> InterpResult<TypeId> {
        let name = format!("Sequence<{element}>");
        match self.classes.find_type(&name)? {
            Some(t) => Ok(t),
            None => self.require_type("Sequence<void>"),
        }
    }

    /// An exception object of primitive type `ty`.
    pub(crate) fn new_exception(&mut self, ty: TypeId, message: &str, exit_code: i32) -> Value {
        let id = self.next_id();
        Value::Error(Rc::new(ExceptionObject {
            id,
            ty,
            message: message.to_string(),
            exit_code,
        }))
    }

    /// Render a value through its `toString` member, honouring user overrides.
    pub fn stringify(&mut self, value: &Value) -> InterpResult<String> {
        match value {
            Value::Null => Ok("null".to_string()),
            Value::Str(s) => Ok(s.to_string()),
            Value::Numeric(n) => Ok(n.to_string()),
            Value::Object(_) => {
                let position = self.stack.context().position.clone();
                let rendered = self.invoke_member(value.clone(), "toString", Vec::new(), &position)?;
                match rendered {
                    Value::Str(s) => Ok(s.to_string()),
                    other => Ok(other.to_string()),
                }
            }
            other => match self.invoke_native(other, "toString", &[])? {
                Value::Str(s) => Ok(s.to_string()),
                rendered => Ok(rendered.to_string()),
            },
        }
    }

    /// Write one line to the standard output sink.
    pub(crate) fn write_stdio(&mut self, value: &Value) -> InterpResult<()> {
        let line = self.stringify(value)?;
        writeln!(self.stdout, "{line}")
            .and_then(|()| self.stdout.flush())
            .map_err(|e| RuntimeError::io_error(&e.to_string()))
    }

    /// Read one line from the standard input source: a numeric literal when
    /// it parses as one, a string otherwise, null at end of input.
    pub(crate) fn read_stdio(&mut self) -> InterpResult<Value> {
        let mut line = String::new();
        let read = self
            .stdin
            .read_line(&mut line)
            .map_err(|e| RuntimeError::io_error(&e.to_string()))?;
        if read == 0 {
            return Ok(Value::Null);
        }
        let line = line.trim_end_matches(['\r', '\n']);
        match Numeric::compile(line.trim()) {
            Ok(n) => Ok(Value::Numeric(n)),
            Err(_) => Ok(Value::str(line)),
        }
    }
}

fn numeric_arg(args: &[Value], member: &str) -> InterpResult<Numeric> {
    match args.first() {
        Some(Value::Numeric(n)) => Ok(*n),
        Some(_) => Err(RuntimeError::fatal(format!("{member} expects a numeric argument"))),
        None => Err(RuntimeError::arity_mismatch(member, 1, 0)),
    }
}

/// The first argument as an index into a sequence of `len` items.
pub(super) fn index_arg(args: &[Value], len: usize) -> InterpResult<usize> {
    let n = numeric_arg(args, "index")?;
    if !n.mode().is_integer() {
        return Err(RuntimeError::fatal(format!(
            "Array index must be an integer, got {}",
            NumericMode::name(n.mode())
        )));
    }
    let i = n.as_i64();
    match usize::try_from(i) {
        Ok(index) if index < len => Ok(index),
        _ => Err(RuntimeError::index_out_of_bounds(i, len)),
    }
}
