//! Object references and the scoped object store
//!
//! An `ObjectRef` is a typed, mutable variable cell. Locals live in the
//! `ObjectStore` keyed by the scope that declared them; every frame opens
//! a scope and closing it removes exactly the locals that scope declared.

use super::error::{InterpResult, RuntimeError};
use super::value::{ArrayObject, Value};
use crate::bytecode::VariableContext;
use crate::model::{ClassStore, Property, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::trace;

pub type ObjRef = Rc<ObjectRef>;

/// Code or native plumbing behind a reference, replacing plain slot storage.
#[derive(Debug, Clone)]
pub enum Accessor {
    /// Property of `target`; reads and writes go through getter/setter or
    /// the property's storage slot.
    Property { target: Value, property: Rc<Property> },
    ArrayElement { array: Rc<ArrayObject>, index: usize },
    /// The standard IO pipe
    Stdio,
}

#[derive(Debug)]
pub struct ObjectRef {
    pub ty: TypeId,
    slots: RefCell<Vec<Value>>,
    pub accessor: Option<Accessor>,
    /// Interned constants and expression results reject writes
    frozen: bool,
}

impl ObjectRef {
    /// An empty single-slot reference of type `ty`.
    pub fn new(ty: TypeId) -> ObjRef {
        Self::with_len(ty, 1)
    }

    pub fn with_len(ty: TypeId, len: usize) -> ObjRef {
        Rc::new(ObjectRef {
            ty,
            slots: RefCell::new(vec![Value::Null; len]),
            accessor: None,
            frozen: false,
        })
    }

    /// A read-only reference holding `value`.
    pub fn constant(ty: TypeId, value: Value) -> ObjRef {
        Rc::new(ObjectRef {
            ty,
            slots: RefCell::new(vec![value]),
            accessor: None,
            frozen: true,
        })
    }

    /// A multi-slot reference holding `values`.
    pub fn of_values(ty: TypeId, values: Vec<Value>) -> ObjRef {
        Rc::new(ObjectRef {
            ty,
            slots: RefCell::new(values),
            accessor: None,
            frozen: false,
        })
    }

    pub fn with_accessor(ty: TypeId, accessor: Accessor) -> ObjRef {
        Rc::new(ObjectRef {
            ty,
            slots: RefCell::new(vec![Value::Null]),
            accessor: Some(accessor),
            frozen: false,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    /// Plain slot read. Accessor refs must be read through the interpreter.
    pub fn value(&self) -> Value {
        self.get(0)
    }

    pub fn get(&self, index: usize) -> Value {
        self.slots.borrow().get(index).cloned().unwrap_or_default()
    }

    pub fn values(&self) -> Vec<Value> {
        self.slots.borrow().clone()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Type-checked slot write. Numerics keep their own width; any `num`
    /// reference holds any width.
    pub fn set(&self, classes: &ClassStore, index: usize, value: Value) -> InterpResult<()> {
        if self.accessor.is_some() {
            return Err(RuntimeError::fatal(
                "Cannot write directly into an accessor reference",
            ));
        }
        if self.frozen {
            return Err(RuntimeError::fatal("Cannot assign to a constant reference"));
        }
        let value_ty = value.type_of(classes);
        if !classes.can_hold(self.ty, value_ty) {
            return Err(RuntimeError::type_mismatch(
                classes.type_name(value_ty),
                classes.type_name(self.ty),
            ));
        }
        let mut slots = self.slots.borrow_mut();
        let len = slots.len();
        match slots.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(RuntimeError::index_out_of_bounds(index as i64, len)),
        }
    }

    pub fn set_value(&self, classes: &ClassStore, value: Value) -> InterpResult<()> {
        self.set(classes, 0, value)
    }

    /// Whether reads and writes route through an accessor or a `pipe` value.
    pub fn is_pipe(&self, classes: &ClassStore) -> bool {
        if self.accessor.is_some() {
            return true;
        }
        let pipe = classes.primitives().pipe;
        let implements = |ty: TypeId| {
            classes.base_class(ty).id() == pipe
                || classes
                    .inheritors(ty)
                    .into_iter()
                    .any(|t| classes.base_class(t).id() == pipe)
        };
        implements(self.ty) || implements(self.value().type_of(classes))
    }

    /// Truthiness of the stored value.
    pub fn to_bool(&self) -> bool {
        self.value().to_bool()
    }
}

/// Handle of a lexical scope in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

#[derive(Debug, Default)]
struct Scope {
    parent: Option<ScopeId>,
    names: Vec<String>,
}

/// A concrete store key produced by `ObjectStore::keys`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    Local { scope: ScopeId, name: String },
    Property(String),
    Absolute(String),
}

#[derive(Debug, Default)]
pub struct ObjectStore {
    locals: HashMap<(ScopeId, String), ObjRef>,
    properties: HashMap<String, ObjRef>,
    absolute: HashMap<String, ObjRef>,
    scopes: Vec<Option<Scope>>,
    free: Vec<ScopeId>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a scope; lookups fall back to `parent` when given.
    pub fn open_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let scope = Scope {
            parent,
            names: Vec::new(),
        };
        match self.free.pop() {
            Some(id) => {
                self.scopes[id.0 as usize] = Some(scope);
                id
            }
            None => {
                let id = ScopeId(self.scopes.len() as u32);
                self.scopes.push(Some(scope));
                id
            }
        }
    }

    /// Close `id`, dropping every local it declared.
    pub fn close_scope(&mut self, id: ScopeId) {
        if let Some(scope) = self.scopes.get_mut(id.0 as usize).and_then(Option::take) {
            trace!(scope = id.0, locals = scope.names.len(), "closing scope");
            for name in scope.names {
                self.locals.remove(&(id, name));
            }
            self.free.push(id);
        }
    }

    fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.scopes
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .and_then(|s| s.parent)
    }

    /// Candidate keys for `name` in `context`, most specific first.
    pub fn keys(&self, scope: ScopeId, context: VariableContext, name: &str) -> Vec<StoreKey> {
        match context {
            VariableContext::Local => {
                let mut keys = Vec::new();
                let mut current = Some(scope);
                while let Some(id) = current {
                    keys.push(StoreKey::Local {
                        scope: id,
                        name: name.to_string(),
                    });
                    current = self.parent(id);
                }
                keys
            }
            VariableContext::This | VariableContext::Property => {
                vec![StoreKey::Property(name.to_string())]
            }
            VariableContext::Absolute => vec![StoreKey::Absolute(name.to_string())],
        }
    }

    fn lookup(&self, key: &StoreKey) -> Option<&ObjRef> {
        match key {
            StoreKey::Local { scope, name } => self.locals.get(&(*scope, name.clone())),
            StoreKey::Property(k) => self.properties.get(k),
            StoreKey::Absolute(k) => self.absolute.get(k),
        }
    }

    /// First hit among the candidate keys.
    pub fn get(&self, scope: ScopeId, context: VariableContext, name: &str) -> Option<ObjRef> {
        self.keys(scope, context, name)
            .iter()
            .find_map(|k| self.lookup(k))
            .cloned()
    }

    /// Bind `name` in the innermost key of `context`; `None` removes the
    /// nearest existing binding instead.
    pub fn set(&mut self, scope: ScopeId, context: VariableContext, name: &str, value: Option<ObjRef>) {
        let keys = self.keys(scope, context, name);
        let Some(value) = value else {
            if let Some(key) = keys.iter().find(|k| self.lookup(k).is_some()).cloned() {
                self.remove(&key);
            }
            return;
        };
        match keys.into_iter().next() {
            Some(StoreKey::Local { scope, name }) => {
                if let Some(Some(s)) = self.scopes.get_mut(scope.0 as usize) {
                    if !s.names.contains(&name) {
                        s.names.push(name.clone());
                    }
                }
                self.locals.insert((scope, name), value);
            }
            Some(StoreKey::Property(k)) => {
                self.properties.insert(k, value);
            }
            Some(StoreKey::Absolute(k)) => {
                self.absolute.insert(k, value);
            }
            None => {}
        }
    }

    fn remove(&mut self, key: &StoreKey) {
        match key {
            StoreKey::Local { scope, name } => {
                self.locals.remove(&(*scope, name.clone()));
                if let Some(Some(s)) = self.scopes.get_mut(scope.0 as usize) {
                    s.names.retain(|n| n != name);
                }
            }
            StoreKey::Property(k) => {
                self.properties.remove(k);
            }
            StoreKey::Absolute(k) => {
                self.absolute.remove(k);
            }
        }
    }

    /// Get the absolute entry `key`, creating it with `create` on first use.
    pub fn compute(&mut self, key: &str, create: impl FnOnce() -> ObjRef) -> ObjRef {
        self.absolute
            .entry(key.to_string())
            .or_insert_with(create)
            .clone()
    }

    pub fn property(&self, key: &str) -> Option<ObjRef> {
        self.properties.get(key).cloned()
    }

    pub fn compute_property(&mut self, key: &str, create: impl FnOnce() -> ObjRef) -> ObjRef {
        self.properties
            .entry(key.to_string())
            .or_insert_with(create)
            .clone()
    }

    pub fn local_count(&self) -> usize {
        self.locals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::error::ErrorKind;
    use crate::interp::numeric::Numeric;

    fn classes() -> ClassStore {
        ClassStore::new().unwrap()
    }

    #[test]
    fn test_ref_rejects_str_in_num() {
        let c = classes();
        let r = ObjectRef::new(c.primitives().num_int);
        let err = r.set_value(&c, Value::str("nope")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_ref_accepts_num_in_num() {
        let c = classes();
        let r = ObjectRef::new(c.primitives().num_int);
        r.set_value(&c, Value::int(5)).unwrap();
        assert_eq!(r.value().as_numeric(), Some(Numeric::Int(5)));
    }

    #[test]
    fn test_numeric_ref_keeps_value_width() {
        let c = classes();
        let r = ObjectRef::new(c.primitives().num_long);
        r.set_value(&c, Value::int(5)).unwrap();
        assert_eq!(r.value().as_numeric(), Some(Numeric::Int(5)));
        r.set_value(&c, Value::Numeric(Numeric::Double(2.5))).unwrap();
        assert_eq!(r.value().as_numeric(), Some(Numeric::Double(2.5)));
    }

    #[test]
    fn test_constant_rejects_write() {
        let c = classes();
        let r = ObjectRef::constant(c.primitives().num_int, Value::int(1));
        assert_eq!(r.set_value(&c, Value::int(2)).unwrap_err().kind, ErrorKind::Fatal);
        assert_eq!(r.value().as_numeric(), Some(Numeric::Int(1)));
    }

    #[test]
    fn test_void_ref_holds_anything() {
        let c = classes();
        let r = ObjectRef::new(c.primitives().void_t);
        r.set_value(&c, Value::str("x")).unwrap();
        r.set_value(&c, Value::int(1)).unwrap();
    }

    #[test]
    fn test_accessor_ref_rejects_direct_write() {
        let c = classes();
        let r = ObjectRef::with_accessor(c.primitives().pipe_t, Accessor::Stdio);
        assert!(r.is_pipe(&c));
        assert_eq!(r.set_value(&c, Value::Null).unwrap_err().kind, ErrorKind::Fatal);
    }

    #[test]
    fn test_plain_ref_is_not_pipe() {
        let c = classes();
        assert!(!ObjectRef::new(c.primitives().str_t).is_pipe(&c));
    }

    #[test]
    fn test_set_out_of_range_slot() {
        let c = classes();
        let r = ObjectRef::with_len(c.primitives().void_t, 2);
        r.set(&c, 1, Value::int(1)).unwrap();
        assert_eq!(r.set(&c, 2, Value::int(1)).unwrap_err().kind, ErrorKind::IndexOutOfBounds);
    }

    #[test]
    fn test_local_scope_cleanup() {
        let c = classes();
        let mut store = ObjectStore::new();
        let outer = store.open_scope(None);
        let inner = store.open_scope(Some(outer));
        let x = ObjectRef::new(c.primitives().num_int);
        store.set(inner, VariableContext::Local, "x", Some(x));
        assert!(store.get(inner, VariableContext::Local, "x").is_some());
        store.close_scope(inner);
        assert!(store.get(outer, VariableContext::Local, "x").is_none());
        assert_eq!(store.local_count(), 0);
    }

    #[test]
    fn test_child_scope_sees_parent_locals() {
        let c = classes();
        let mut store = ObjectStore::new();
        let outer = store.open_scope(None);
        store.set(outer, VariableContext::Local, "a", Some(ObjectRef::new(c.primitives().str_t)));
        let inner = store.open_scope(Some(outer));
        assert!(store.get(inner, VariableContext::Local, "a").is_some());
        let isolated = store.open_scope(None);
        assert!(store.get(isolated, VariableContext::Local, "a").is_none());
    }

    #[test]
    fn test_set_none_removes() {
        let c = classes();
        let mut store = ObjectStore::new();
        let s = store.open_scope(None);
        store.set(s, VariableContext::Local, "a", Some(ObjectRef::new(c.primitives().str_t)));
        store.set(s, VariableContext::Local, "a", None);
        assert!(store.get(s, VariableContext::Local, "a").is_none());
    }

    #[test]
    fn test_compute_interns() {
        let c = classes();
        let mut store = ObjectStore::new();
        let ty = c.primitives().num_int;
        let a = store.compute("num:int:5", || ObjectRef::constant(ty, Value::int(5)));
        let b = store.compute("num:int:5", || ObjectRef::constant(ty, Value::int(6)));
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(b.value().as_numeric(), Some(Numeric::Int(5)));
    }

    #[test]
    fn test_scope_ids_are_reused() {
        let mut store = ObjectStore::new();
        let a = store.open_scope(None);
        store.close_scope(a);
        let b = store.open_scope(None);
        assert_eq!(a, b);
    }
}
