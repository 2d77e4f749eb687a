//! Runtime for compiled KScr classes
//!
//! The interpreter walks `Statement`/`StatementComponent` trees over a
//! register-bank [`Stack`], keeping variables and interned constants in an
//! [`ObjectStore`] and class metadata in the model's `ClassStore`.

pub mod error;
mod eval;
mod native;
pub mod numeric;
pub mod output_type;
mod runtime;
pub mod stack;
pub mod store;
pub mod value;

pub use error::{ErrorKind, InterpResult, RuntimeError};
pub use native::NativeRunner;
pub use numeric::{Numeric, NumericMode};
pub use runtime::{is_thrown, Interpreter, TraceElement};
pub use stack::{Registers, Stack, State};
pub use store::{ObjRef, ObjectRef, ObjectStore};
pub use value::Value;
