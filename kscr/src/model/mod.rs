//! Type/class model
//!
//! Classes live in the `ClassStore` arena and are addressed by handle.
//! A `Class` is a declaration; a `ClassInstance` is that declaration with
//! its type parameters bound, and is what values and references are typed
//! against.

pub mod class;
pub mod member;
pub mod modifier;
pub mod package;
pub mod primitives;
pub mod store;

pub use class::{
    Class, ClassId, ClassInstance, ClassKind, ClassState, Specialization, TypeArgument, TypeId,
    TypeParameter,
};
pub use member::{ClassMember, MemberKind, Method, MethodParameter, Property};
pub use modifier::Modifier;
pub use package::Package;
pub use primitives::Primitives;
pub use store::ClassStore;
