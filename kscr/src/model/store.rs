//! Class store: the arena owning every class and class instance

use super::class::{
    Class, ClassId, ClassInstance, ClassKind, ClassState, Specialization, TypeArgument, TypeId,
    DEFAULT_WIDTH,
};
use super::member::{ClassMember, Method};
use super::modifier::Modifier;
use super::package::Package;
use super::primitives::Primitives;
use crate::interp::error::{InterpResult, RuntimeError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use tracing::{debug, trace};

/// Single source of truth for classes and their instances.
///
/// Classes and instances refer to each other through `ClassId` and
/// `TypeId` handles, so cyclic graphs such as `array<T>` referring to
/// `T` need no shared ownership.
#[derive(Debug)]
pub struct ClassStore {
    classes: Vec<Class>,
    instances: Vec<ClassInstance>,
    by_full_name: HashMap<String, ClassId>,
    by_name: HashMap<String, ClassId>,
    instance_keys: HashMap<String, TypeId>,
    root: Package,
    pub(crate) prims: Primitives,
}

impl ClassStore {
    /// Create a store with every primitive class registered and initialized.
    pub fn new() -> InterpResult<Self> {
        let mut store = ClassStore {
            classes: Vec::new(),
            instances: Vec::new(),
            by_full_name: HashMap::new(),
            by_name: HashMap::new(),
            instance_keys: HashMap::new(),
            root: Package::root(),
            prims: Primitives::default(),
        };
        super::primitives::bootstrap(&mut store)?;
        Ok(store)
    }

    pub fn primitives(&self) -> &Primitives {
        &self.prims
    }

    pub fn root_package(&self) -> &Package {
        &self.root
    }

    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.index()]
    }

    pub(crate) fn class_mut(&mut self, id: ClassId) -> &mut Class {
        &mut self.classes[id.index()]
    }

    pub fn instance(&self, ty: TypeId) -> &ClassInstance {
        &self.instances[ty.index()]
    }

    pub fn base_class(&self, ty: TypeId) -> &Class {
        self.class(self.instance(ty).base)
    }

    pub fn type_name(&self, ty: TypeId) -> &str {
        self.instance(ty).detailed_name()
    }

    pub fn classes(&self) -> impl Iterator<Item = &Class> {
        self.classes.iter()
    }

    /// Register a class in `package`, or return the one already there.
    pub fn get_or_create_class(
        &mut self,
        package: &str,
        name: &str,
        modifier: Modifier,
        kind: ClassKind,
    ) -> ClassId {
        if let Some(existing) = self.root.package(package).and_then(|p| p.class(name)) {
            return existing;
        }
        let id = ClassId(self.classes.len() as u32);
        let class = Class::new(id, package, name, modifier, kind);
        self.by_full_name.insert(class.full_name(), id);
        self.by_name.entry(name.to_string()).or_insert(id);
        self.classes.push(class);
        self.root.get_or_create_package(package).insert_class(name, id);
        trace!(class = name, package, "declared class");
        id
    }

    /// Find a class by qualified or simple name.
    pub fn find_class(&self, name: &str) -> Option<ClassId> {
        self.by_full_name
            .get(name)
            .or_else(|| self.by_name.get(name))
            .copied()
    }

    fn render_args(&self, args: &[(String, TypeArgument)], full: bool) -> String {
        let parts: Vec<String> = args
            .iter()
            .map(|(_, arg)| match arg {
                TypeArgument::Type(t) if full => self.instance(*t).full_detailed_name.clone(),
                TypeArgument::Type(t) => self.instance(*t).detailed_name.clone(),
                TypeArgument::Width(n) => n.to_string(),
            })
            .collect();
        format!("<{}>", parts.join(", "))
    }

    fn bind_args(&self, class: ClassId, args: &[TypeArgument]) -> InterpResult<Vec<(String, TypeArgument)>> {
        let c = self.class(class);
        if c.type_params.len() != args.len() {
            return Err(RuntimeError::arity_mismatch(
                &c.full_name(),
                c.type_params.len(),
                args.len(),
            ));
        }
        Ok(c.type_params
            .iter()
            .zip(args)
            .map(|(p, a)| (p.name.clone(), *a))
            .collect())
    }

    fn instance_key(&self, class: ClassId, bound: &[(String, TypeArgument)]) -> (String, String) {
        let c = self.class(class);
        if bound.is_empty() {
            (c.name.clone(), c.full_name())
        } else {
            (
                format!("{}{}", c.name, self.render_args(bound, false)),
                format!("{}{}", c.full_name(), self.render_args(bound, true)),
            )
        }
    }

    /// Instantiate `class` with `args`. Registering the same instance twice
    /// is an invariant violation.
    pub fn create_instance(&mut self, class: ClassId, args: &[TypeArgument]) -> InterpResult<TypeId> {
        let bound = self.bind_args(class, args)?;
        let (detailed_name, full_detailed_name) = self.instance_key(class, &bound);
        if self.instance_keys.contains_key(&full_detailed_name) {
            return Err(RuntimeError::fatal(format!(
                "Duplicate class instance: {full_detailed_name}"
            )));
        }
        let id = TypeId(self.instances.len() as u32);
        self.instance_keys.insert(full_detailed_name.clone(), id);
        self.instances.push(ClassInstance {
            id,
            base: class,
            args: bound,
            detailed_name,
            full_detailed_name,
        });
        trace!(instance = self.instances[id.index()].full_detailed_name(), "created class instance");
        Ok(id)
    }

    /// Cached instance of `class` with `args`, created on first use.
    pub fn get_instance(&mut self, class: ClassId, args: &[TypeArgument]) -> InterpResult<TypeId> {
        let bound = self.bind_args(class, args)?;
        let (_, full) = self.instance_key(class, &bound);
        match self.instance_keys.get(&full) {
            Some(id) => Ok(*id),
            None => self.create_instance(class, args),
        }
    }

    /// Wire default supertypes and compute the default instance. Idempotent.
    pub fn initialize(&mut self, id: ClassId) -> InterpResult<()> {
        if self.class(id).state >= ClassState::Initialized {
            return Ok(());
        }
        self.class_mut(id).state = ClassState::Initialized;
        let prims = self.prims;
        let kind = self.class(id).kind;
        let root = id == prims.void || id == prims.object;

        if !root && self.class(id).superclasses.is_empty() {
            match kind {
                ClassKind::Class => {
                    let object = self.default_instance(prims.object)?;
                    self.class_mut(id).superclasses.push(object);
                }
                ClassKind::Enum => {
                    let enum_default = self.default_instance(prims.enum_)?;
                    self.class_mut(id).superclasses.push(enum_default);
                }
                ClassKind::Interface => {}
            }
        }
        if id == prims.object {
            let void = self.default_instance(prims.void)?;
            if !self.class(id).interfaces.contains(&void) {
                self.class_mut(id).interfaces.push(void);
            }
        }

        let params = self.class(id).type_params.clone();
        let mut args = Vec::with_capacity(params.len());
        for param in &params {
            if param.specialization() == Specialization::N {
                args.push(TypeArgument::Width(DEFAULT_WIDTH));
            } else {
                let target = self.find_type(param.target_name())?.ok_or_else(|| {
                    RuntimeError::fatal(format!("Unknown type parameter target: {}", param.target_name()))
                })?;
                args.push(TypeArgument::Type(target));
            }
        }
        let default = self.get_instance(id, &args)?;
        self.class_mut(id).default_instance = Some(default);
        debug!(class = %self.class(id).full_name(), "initialized class");
        Ok(())
    }

    pub fn default_instance(&mut self, id: ClassId) -> InterpResult<TypeId> {
        if let Some(t) = self.class(id).default_instance {
            return Ok(t);
        }
        self.initialize(id)?;
        self.class(id)
            .default_instance
            .ok_or_else(|| RuntimeError::fatal("Class has no default instance"))
    }

    pub(crate) fn mark_late_initialized(&mut self, id: ClassId) -> bool {
        let class = self.class_mut(id);
        if class.state >= ClassState::LateInitialized {
            return false;
        }
        class.state = ClassState::LateInitialized;
        true
    }

    /// All supertypes of `ty`, nearest first, transitively expanded.
    pub fn inheritors(&self, ty: TypeId) -> Vec<TypeId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([ty]);
        while let Some(t) = queue.pop_front() {
            let class = self.base_class(t);
            for s in class.superclasses.iter().chain(&class.interfaces) {
                if seen.insert(*s) {
                    out.push(*s);
                    queue.push_back(*s);
                }
            }
        }
        out
    }

    /// Nominal subtype check: can a reference of type `this` hold a value of
    /// type `candidate`?
    pub fn can_hold(&self, this: TypeId, candidate: TypeId) -> bool {
        let target = self.base_class(this);
        let actual = self.base_class(candidate);
        if target.id == self.prims.void || actual.id == self.prims.void {
            return true;
        }
        if target.id == actual.id {
            return true;
        }
        let full = target.full_name();
        self.inheritors(candidate)
            .iter()
            .any(|t| self.base_class(*t).full_name() == full)
    }

    /// Find a member declared on `ty` or any of its supertypes.
    pub fn find_member(&self, ty: TypeId, name: &str) -> Option<ClassMember> {
        if let Some(m) = self.base_class(ty).declared_member(name) {
            return Some(m.clone());
        }
        self.inheritors(ty)
            .into_iter()
            .find_map(|t| self.base_class(t).declared_member(name).cloned())
    }

    /// Resolve a type name, instantiating generic forms on demand.
    pub fn find_type(&mut self, name: &str) -> InterpResult<Option<TypeId>> {
        let name = name.trim();
        if let Some(element) = name.strip_suffix("[]") {
            let Some(element) = self.find_type(element)? else {
                return Ok(None);
            };
            let array = self.prims.array;
            return self.get_instance(array, &[TypeArgument::Type(element)]).map(Some);
        }
        if let (Some(open), true) = (name.find('<'), name.ends_with('>')) {
            let Some(class) = self.find_class(&name[..open]) else {
                return Ok(None);
            };
            let mut args = Vec::new();
            for part in split_type_args(&name[open + 1..name.len() - 1]) {
                if let Ok(width) = part.parse::<u32>() {
                    args.push(TypeArgument::Width(width));
                } else {
                    match self.find_type(part)? {
                        Some(t) => args.push(TypeArgument::Type(t)),
                        None => return Ok(None),
                    }
                }
            }
            return self.get_instance(class, &args).map(Some);
        }
        if let Some(t) = self.prims.numeric_alias(name) {
            return Ok(Some(t));
        }
        match self.find_class(name) {
            Some(class) => self.default_instance(class).map(Some),
            None => Ok(None),
        }
    }

    /// Read-only variant of `find_type`: never instantiates.
    pub fn lookup_type(&self, name: &str) -> Option<TypeId> {
        let name = name.trim();
        if let Some(t) = self.prims.numeric_alias(name) {
            return Some(t);
        }
        if name.contains('<') || name.ends_with("[]") {
            return self
                .instances
                .iter()
                .find(|i| i.detailed_name == name || i.full_detailed_name == name)
                .map(|i| i.id);
        }
        self.find_class(name).and_then(|c| self.class(c).default_instance)
    }

    /// Locate a static method named `name` to start execution from.
    pub fn find_entrypoint(&self, name: &str) -> Option<Rc<Method>> {
        self.root.all_classes().into_iter().find_map(|id| {
            match self.class(id).declared_member(name) {
                Some(ClassMember::Method(m)) if m.modifier.is_static() && m.body.is_some() => {
                    Some(m.clone())
                }
                _ => None,
            }
        })
    }
}

/// Split `a, b<c, d>, e` at top-level commas.
fn split_type_args(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = s[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::class::TypeParameter;

    fn store() -> ClassStore {
        ClassStore::new().expect("bootstrap")
    }

    fn user_class(store: &mut ClassStore, name: &str) -> ClassId {
        let id = store.get_or_create_class("org.test", name, Modifier::PUBLIC, ClassKind::Class);
        store.initialize(id).expect("initialize");
        id
    }

    #[test]
    fn test_can_hold_is_reflexive() {
        let mut s = store();
        let names = ["str", "int", "range", "object", "type", "Throwable"];
        for name in names {
            let t = s.find_type(name).unwrap().unwrap();
            assert!(s.can_hold(t, t), "{name} should hold itself");
        }
        let c = user_class(&mut s, "Foo");
        let t = s.default_instance(c).unwrap();
        assert!(s.can_hold(t, t));
    }

    #[test]
    fn test_void_holds_everything_and_is_held() {
        let mut s = store();
        let void = s.find_type("void").unwrap().unwrap();
        for name in ["str", "int", "double", "range", "Exception"] {
            let t = s.find_type(name).unwrap().unwrap();
            assert!(s.can_hold(void, t));
            assert!(s.can_hold(t, void));
        }
    }

    #[test]
    fn test_str_cannot_be_held_by_num() {
        let mut s = store();
        let num = s.find_type("num").unwrap().unwrap();
        let str_t = s.find_type("str").unwrap().unwrap();
        assert!(!s.can_hold(num, str_t));
    }

    #[test]
    fn test_numeric_widths_share_base() {
        let mut s = store();
        let num = s.find_type("num").unwrap().unwrap();
        let int = s.find_type("int").unwrap().unwrap();
        let long = s.find_type("long").unwrap().unwrap();
        assert!(s.can_hold(num, int));
        assert!(s.can_hold(int, long));
    }

    #[test]
    fn test_interface_held_through_inheritors() {
        let mut s = store();
        let throwable = s.find_type("Throwable").unwrap().unwrap();
        let int = s.find_type("int").unwrap().unwrap();
        let npe = s.find_type("NullPointerException").unwrap().unwrap();
        let str_t = s.find_type("str").unwrap().unwrap();
        assert!(s.can_hold(throwable, int));
        assert!(s.can_hold(throwable, npe));
        assert!(!s.can_hold(throwable, str_t));
    }

    #[test]
    fn test_user_class_inherits_object() {
        let mut s = store();
        let c = user_class(&mut s, "Foo");
        let t = s.default_instance(c).unwrap();
        let object = s.find_type("object").unwrap().unwrap();
        assert!(s.can_hold(object, t));
        assert!(!s.can_hold(t, object));
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let mut s = store();
        let c = user_class(&mut s, "Foo");
        let supers = s.class(c).superclasses.len();
        s.initialize(c).unwrap();
        assert_eq!(s.class(c).superclasses.len(), supers);
        assert_eq!(s.class(c).state(), ClassState::Initialized);
    }

    #[test]
    fn test_create_instance_arity_mismatch() {
        let mut s = store();
        let array = s.prims.array;
        let err = s.create_instance(array, &[]).unwrap_err();
        assert_eq!(err.kind, crate::interp::error::ErrorKind::ArityMismatch);
    }

    #[test]
    fn test_create_instance_duplicate_is_fatal() {
        let mut s = store();
        let array = s.prims.array;
        let str_t = s.find_type("str").unwrap().unwrap();
        s.get_instance(array, &[TypeArgument::Type(str_t)]).unwrap();
        assert!(s.create_instance(array, &[TypeArgument::Type(str_t)]).is_err());
    }

    #[test]
    fn test_get_instance_is_cached() {
        let mut s = store();
        let a = s.find_type("array<str>").unwrap().unwrap();
        let b = s.find_type("str[]").unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(s.type_name(a), "array<str>");
    }

    #[test]
    fn test_width_generic() {
        let mut s = store();
        let t = s.find_type("int<8>").unwrap().unwrap();
        assert_eq!(s.type_name(t), "int<8>");
        assert_eq!(s.instance(t).argument("n"), Some(TypeArgument::Width(8)));
    }

    #[test]
    fn test_generic_user_class_default_instance() {
        let mut s = store();
        let id = s.get_or_create_class("org.test", "Box", Modifier::PUBLIC, ClassKind::Class);
        s.class_mut(id).type_params.push(TypeParameter::new("T"));
        s.initialize(id).unwrap();
        let t = s.default_instance(id).unwrap();
        assert_eq!(s.type_name(t), "Box<void>");
    }

    #[test]
    fn test_find_member_searches_supertypes() {
        let mut s = store();
        let c = user_class(&mut s, "Foo");
        let t = s.default_instance(c).unwrap();
        assert!(s.find_member(t, "toString").is_some());
        assert!(s.find_member(t, "nope").is_none());
    }

    #[test]
    fn test_split_type_args_nested() {
        assert_eq!(split_type_args("a, b<c, d>, e"), vec!["a", "b<c, d>", "e"]);
    }

    #[test]
    fn test_lookup_type_readonly() {
        let s = store();
        assert!(s.lookup_type("int").is_some());
        assert!(s.lookup_type("Missing").is_none());
    }
}
