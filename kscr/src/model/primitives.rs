//! Primitive type registry and bootstrap
//!
//! Registers the core classes every value is typed against and gives them
//! their native members (`toString`, `equals`, `getType`, the iterator and
//! sequence protocols, pipe read/write, `close`, throwable message and exit
//! code). Runs exactly once, when a `ClassStore` is created.

use super::class::{ClassId, ClassKind, TypeArgument, TypeId, TypeParameter};
use super::member::{ClassMember, Method};
use super::modifier::Modifier;
use super::store::ClassStore;
use crate::interp::error::InterpResult;
use std::rc::Rc;

pub const CORE_PACKAGE: &str = "org.comroid.kscr.core";

/// Handles of the primitive classes and their common instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct Primitives {
    pub void: ClassId,
    pub object: ClassId,
    pub type_: ClassId,
    pub enum_: ClassId,
    pub pipe: ClassId,
    pub array: ClassId,
    pub tuple: ClassId,
    pub str_: ClassId,
    pub num: ClassId,
    pub range: ClassId,
    pub iterator: ClassId,
    pub iterable: ClassId,
    pub sequence: ClassId,
    pub sequencable: ClassId,
    pub throwable: ClassId,
    pub closeable: ClassId,
    pub exception: ClassId,
    pub null_pointer: ClassId,
    pub byte: ClassId,
    pub short: ClassId,
    pub int: ClassId,
    pub long: ClassId,
    pub float: ClassId,
    pub double: ClassId,

    pub void_t: TypeId,
    pub object_t: TypeId,
    pub type_t: TypeId,
    pub str_t: TypeId,
    pub range_t: TypeId,
    pub pipe_t: TypeId,
    pub throwable_t: TypeId,
    pub closeable_t: TypeId,
    pub exception_t: TypeId,
    pub null_pointer_t: TypeId,
    pub num_t: TypeId,
    pub num_byte: TypeId,
    pub num_short: TypeId,
    pub num_int: TypeId,
    pub num_long: TypeId,
    pub num_float: TypeId,
    pub num_double: TypeId,
}

impl Primitives {
    /// Keyword type names that resolve to numeric instances.
    pub fn numeric_alias(&self, name: &str) -> Option<TypeId> {
        Some(match name {
            "byte" | "bool" => self.num_byte,
            "short" => self.num_short,
            "int" => self.num_int,
            "long" => self.num_long,
            "float" => self.num_float,
            "double" => self.num_double,
            _ => return None,
        })
    }
}

/// Operator members of `num`, for explicit invocation such as `a.opLShift(2)`.
const NUMERIC_OPERATORS: [(&str, &str); 18] = [
    ("opPlus", "num"),
    ("opMinus", "num"),
    ("opMultiply", "num"),
    ("opDivide", "num"),
    ("opModulus", "num"),
    ("opPow", "num"),
    ("opEquals", "bool"),
    ("opNotEquals", "bool"),
    ("opGreater", "bool"),
    ("opGreaterEq", "bool"),
    ("opLesser", "bool"),
    ("opLesserEq", "bool"),
    ("opBitAnd", "num"),
    ("opBitOr", "num"),
    ("opLShift", "num"),
    ("opRShift", "num"),
    ("opULShift", "num"),
    ("opURShift", "num"),
];

fn declare(store: &mut ClassStore, name: &str, kind: ClassKind, params: &[&str]) -> ClassId {
    let id = store.get_or_create_class(CORE_PACKAGE, name, Modifier::PUBLIC | Modifier::NATIVE, kind);
    let class = store.class_mut(id);
    class.primitive = true;
    class.type_params = params.iter().map(|p| TypeParameter::new(*p)).collect();
    id
}

fn natives(store: &mut ClassStore, class: ClassId, members: &[(&str, &str, &[(&str, &str)])]) {
    for (name, ret, params) in members {
        let method = Method::native(class, name, ret, params);
        store
            .class_mut(class)
            .members
            .insert(name.to_string(), ClassMember::Method(Rc::new(method)));
    }
}

pub(crate) fn bootstrap(store: &mut ClassStore) -> InterpResult<()> {
    use ClassKind::{Class, Interface};

    let mut p = Primitives {
        void: declare(store, "void", Interface, &[]),
        object: declare(store, "object", Class, &[]),
        type_: declare(store, "type", Class, &[]),
        enum_: declare(store, "enum", Class, &["T"]),
        pipe: declare(store, "pipe", Interface, &["T"]),
        array: declare(store, "array", Class, &["T"]),
        tuple: declare(store, "tuple", Class, &["T"]),
        str_: declare(store, "str", Class, &[]),
        num: declare(store, "num", Class, &["T"]),
        range: declare(store, "range", Class, &[]),
        iterator: declare(store, "Iterator", Interface, &["T"]),
        iterable: declare(store, "Iterable", Interface, &["T"]),
        sequence: declare(store, "Sequence", Interface, &["T"]),
        sequencable: declare(store, "Sequencable", Interface, &["T"]),
        throwable: declare(store, "Throwable", Interface, &[]),
        closeable: declare(store, "Closeable", Interface, &[]),
        exception: declare(store, "Exception", Class, &[]),
        null_pointer: declare(store, "NullPointerException", Class, &[]),
        byte: declare(store, "byte", Class, &[]),
        short: declare(store, "short", Class, &[]),
        int: declare(store, "int", Class, &["n"]),
        long: declare(store, "long", Class, &[]),
        float: declare(store, "float", Class, &[]),
        double: declare(store, "double", Class, &[]),
        ..Primitives::default()
    };
    store.prims = p;

    store.initialize(p.void)?;
    store.initialize(p.object)?;

    // explicit supertypes must be wired before initialization
    let exception = store.default_instance(p.exception)?;
    store.class_mut(p.null_pointer).superclasses.push(exception);
    let iterator = store.default_instance(p.iterator)?;
    store.class_mut(p.sequence).interfaces.push(iterator);

    let all: Vec<ClassId> = store.root_package().all_classes();
    for id in all {
        store.initialize(id)?;
    }

    let throwable = store.default_instance(p.throwable)?;
    let iterable = store.default_instance(p.iterable)?;
    let sequencable = store.default_instance(p.sequencable)?;
    for class in [p.num, p.exception] {
        store.class_mut(class).interfaces.push(throwable);
    }
    for class in [p.range, p.array] {
        store.class_mut(class).interfaces.push(iterable);
        store.class_mut(class).interfaces.push(sequencable);
    }

    p.void_t = store.default_instance(p.void)?;
    p.object_t = store.default_instance(p.object)?;
    p.type_t = store.default_instance(p.type_)?;
    p.str_t = store.default_instance(p.str_)?;
    p.range_t = store.default_instance(p.range)?;
    p.pipe_t = store.default_instance(p.pipe)?;
    p.throwable_t = throwable;
    p.closeable_t = store.default_instance(p.closeable)?;
    p.exception_t = exception;
    p.null_pointer_t = store.default_instance(p.null_pointer)?;
    p.num_t = store.default_instance(p.num)?;
    for (width, slot) in [
        (p.byte, &mut p.num_byte),
        (p.short, &mut p.num_short),
        (p.int, &mut p.num_int),
        (p.long, &mut p.num_long),
        (p.float, &mut p.num_float),
        (p.double, &mut p.num_double),
    ] {
        let width_t = store.default_instance(width)?;
        *slot = store.get_instance(p.num, &[TypeArgument::Type(width_t)])?;
    }
    store.prims = p;

    initialize_primitive_members(store, &p);
    Ok(())
}

fn initialize_primitive_members(store: &mut ClassStore, p: &Primitives) {
    natives(store, p.object, &[
        ("toString", "str", &[]),
        ("equals", "bool", &[("object", "other")]),
        ("getType", "type", &[]),
        ("InternalID", "long", &[]),
    ]);
    natives(store, p.enum_, &[("name", "str", &[]), ("values", "array<T>", &[])]);
    natives(store, p.pipe, &[("read", "T", &[("int", "length")]), ("write", "void", &[("T", "data")])]);
    natives(store, p.array, &[
        ("length", "int", &[]),
        ("get", "T", &[("int", "index")]),
        ("set", "void", &[("int", "index"), ("T", "value")]),
        ("iterator", "Iterator<T>", &[]),
        ("sequence", "Sequence<T>", &[]),
    ]);
    natives(store, p.tuple, &[("size", "int", &[])]);
    natives(store, p.str_, &[("length", "int", &[]), ("opPlus", "str", &[("object", "other")])]);
    natives(store, p.num, &[
        ("ExitCode", "int", &[]),
        ("Message", "str", &[]),
        ("sqrt", "double", &[]),
        ("sin", "double", &[]),
        ("cos", "double", &[]),
        ("tan", "double", &[]),
        ("byteValue", "byte", &[]),
        ("shortValue", "short", &[]),
        ("intValue", "int", &[]),
        ("longValue", "long", &[]),
        ("floatValue", "float", &[]),
        ("doubleValue", "double", &[]),
    ]);
    let operand: &[(&str, &str)] = &[("num", "other")];
    let operators: Vec<(&str, &str, &[(&str, &str)])> = NUMERIC_OPERATORS
        .iter()
        .map(|(name, ret)| (*name, *ret, operand))
        .collect();
    natives(store, p.num, &operators);
    natives(store, p.range, &[
        ("start", "int", &[]),
        ("end", "int", &[]),
        ("test", "bool", &[("int", "n")]),
        ("accumulate", "int", &[("int", "n")]),
        ("decremental", "bool", &[]),
        ("iterator", "Iterator<int>", &[]),
        ("sequence", "Sequence<int>", &[]),
    ]);
    natives(store, p.iterable, &[("iterator", "Iterator<T>", &[])]);
    natives(store, p.iterator, &[("current", "T", &[]), ("next", "T", &[]), ("hasNext", "bool", &[])]);
    natives(store, p.sequencable, &[("sequence", "Sequence<T>", &[])]);
    natives(store, p.sequence, &[
        ("finite", "bool", &[]),
        ("length", "int", &[]),
        ("current", "T", &[]),
        ("next", "T", &[]),
        ("hasNext", "bool", &[]),
    ]);
    natives(store, p.throwable, &[("ExitCode", "int", &[]), ("Message", "str", &[])]);
    natives(store, p.closeable, &[("close", "void", &[])]);
    natives(store, p.exception, &[("ExitCode", "int", &[]), ("Message", "str", &[])]);
}
