//! KScr execution core
//!
//! Compiles KScr source into statement trees and runs them on a
//! register-bank interpreter.

pub mod bytecode;
pub mod compiler;
pub mod config;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod model;
pub mod span;

pub use compiler::compile;
pub use config::RuntimeConfig;
pub use error::{CompileError, Result};
pub use interp::Interpreter;
pub use span::{SourcePosition, Span};
