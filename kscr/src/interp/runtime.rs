//! The interpreter: class loading, frame boundaries and reference access

use super::error::{ErrorKind, InterpResult, RuntimeError};
use super::native::NativeRunner;
use super::numeric::Numeric;
use super::output_type;
use super::stack::{Context, FrameKind, Registers, Stack, State};
use super::store::{Accessor, ObjRef, ObjectRef, ObjectStore};
use super::value::Value;
use crate::bytecode::{ClassDecl, MemberDecl, VariableContext};
use crate::config::RuntimeConfig;
use crate::model::member::{CONSTRUCTOR_NAME, STATIC_INITIALIZER_NAME};
use crate::model::{ClassId, ClassMember, ClassStore, Method, Property, TypeId};
use crate::span::SourcePosition;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Stack growth parameters for deep recursion
pub(crate) const STACK_RED_ZONE: usize = 128 * 1024; // 128KB remaining triggers growth
pub(crate) const STACK_GROW_SIZE: usize = 4 * 1024 * 1024; // Grow by 4MB each time

/// One frame an error unwound through.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceElement {
    pub local: String,
    pub position: SourcePosition,
}

impl fmt::Display for TraceElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {} ({})", self.local, self.position)
    }
}

/// The interpreter
pub struct Interpreter {
    pub(crate) classes: ClassStore,
    pub(crate) store: ObjectStore,
    pub(crate) stack: Stack,
    config: RuntimeConfig,
    native_runner: Option<Rc<dyn NativeRunner>>,
    pub(crate) stdout: Box<dyn Write>,
    pub(crate) stdin: Box<dyn BufRead>,
    exit_code: i32,
    exit_message: Option<String>,
    /// Frames the current throw unwound through, innermost first
    pub(crate) stack_trace: Vec<TraceElement>,
    next_object_id: u64,
    call_depth: usize,
    pub(crate) void: ObjRef,
    pub(crate) stdio: ObjRef,
}

impl Interpreter {
    pub fn new(config: RuntimeConfig) -> InterpResult<Self> {
        Self::with_io(
            config,
            Box::new(io::stdout()),
            Box::new(io::BufReader::new(io::stdin())),
        )
    }

    /// An interpreter whose `stdio` pipe writes to `stdout` and reads from `stdin`.
    pub fn with_io(
        config: RuntimeConfig,
        stdout: Box<dyn Write>,
        stdin: Box<dyn BufRead>,
    ) -> InterpResult<Self> {
        let classes = ClassStore::new()?;
        let mut store = ObjectStore::new();
        let p = *classes.primitives();
        let stack = Stack::new(Context {
            local: crate::span::SYSTEM_SOURCE.to_string(),
            position: SourcePosition::system(),
            this: None,
            class: None,
            scope: store.open_scope(None),
            kind: FrameKind::Root,
        });
        let void = store.compute("null", || ObjectRef::constant(p.void_t, Value::Null));
        let stdio = ObjectRef::with_accessor(p.pipe_t, Accessor::Stdio);
        Ok(Self {
            classes,
            store,
            stack,
            config,
            native_runner: None,
            stdout,
            stdin,
            exit_code: 0,
            exit_message: None,
            stack_trace: Vec::new(),
            next_object_id: 1,
            call_depth: 0,
            void,
            stdio,
        })
    }

    /// Install the collaborator that runs user-declared `native` members.
    pub fn set_native_runner(&mut self, runner: Rc<dyn NativeRunner>) {
        self.native_runner = Some(runner);
    }

    pub fn classes(&self) -> &ClassStore {
        &self.classes
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn exit_message(&self) -> Option<&str> {
        self.exit_message.as_deref()
    }

    pub fn stack_trace(&self) -> &[TraceElement] {
        &self.stack_trace
    }

    pub(crate) fn next_id(&mut self) -> u64 {
        let id = self.next_object_id;
        self.next_object_id += 1;
        id
    }

    // ================================================================
    // Loading
    // ================================================================

    /// Register compiled classes: declare all, wire supertypes, attach
    /// members, then initialize.
    pub fn load(&mut self, decls: Vec<ClassDecl>) -> InterpResult<Vec<ClassId>> {
        let mut ids = Vec::with_capacity(decls.len());
        for decl in &decls {
            let id = self
                .classes
                .get_or_create_class(&decl.package, &decl.name, decl.modifier, decl.kind);
            let class = self.classes.class_mut(id);
            class.type_params = decl.type_params.clone();
            class.position = decl.position.clone();
            ids.push(id);
        }
        for (decl, &id) in decls.iter().zip(&ids) {
            for name in &decl.superclasses {
                let ty = self.require_type(name)?;
                self.classes.class_mut(id).superclasses.push(ty);
            }
            for name in &decl.interfaces {
                let ty = self.require_type(name)?;
                self.classes.class_mut(id).interfaces.push(ty);
            }
        }
        for (decl, &id) in decls.into_iter().zip(&ids) {
            for member in decl.members {
                let member = match member {
                    MemberDecl::Method(m) => ClassMember::Method(Rc::new(Method {
                        name: m.name,
                        owner: id,
                        modifier: m.modifier,
                        return_type: m.return_type,
                        parameters: m.parameters,
                        body: m.body.map(Rc::new),
                        position: m.position,
                    })),
                    MemberDecl::Property(p) => ClassMember::Property(Rc::new(Property {
                        name: p.name,
                        owner: id,
                        modifier: p.modifier,
                        ty: p.ty,
                        gettable: p.gettable,
                        settable: p.settable,
                        inittable: p.inittable,
                        getter: p.getter.map(Rc::new),
                        setter: p.setter.map(Rc::new),
                        initializer: p.initializer.map(Rc::new),
                        position: p.position,
                    })),
                };
                self.classes
                    .class_mut(id)
                    .members
                    .insert(member.name().to_string(), member);
            }
        }
        for &id in &ids {
            self.classes.initialize(id)?;
        }
        for &id in &ids {
            self.check_return_types(id);
        }
        debug!(classes = ids.len(), "loaded classes");
        Ok(ids)
    }

    /// Warn about `return` statements whose inferred type the method's
    /// declared return type cannot hold.
    fn check_return_types(&self, id: ClassId) {
        let class = self.classes.class(id);
        let this = class.default_instance();
        for member in class.members.values() {
            let ClassMember::Method(method) = member else {
                continue;
            };
            let (Some(body), Some(declared)) =
                (&method.body, self.classes.lookup_type(&method.return_type))
            else {
                continue;
            };
            for stmt in &body.main {
                let Some(ret) = stmt.main.first().filter(|c| c.kind == crate::bytecode::BytecodeKind::Return) else {
                    continue;
                };
                let inferred = ret
                    .sub_statement
                    .as_deref()
                    .and_then(|s| output_type::statement_type(&self.classes, s, this));
                if let Some(inferred) = inferred {
                    if !self.classes.can_hold(declared, inferred) {
                        warn!(
                            method = %method.signature(),
                            declared = self.classes.type_name(declared),
                            returned = self.classes.type_name(inferred),
                            "return type mismatch"
                        );
                    }
                }
            }
        }
    }

    pub fn find_type(&mut self, name: &str) -> InterpResult<Option<TypeId>> {
        self.classes.find_type(name)
    }

    pub(crate) fn require_type(&mut self, name: &str) -> InterpResult<TypeId> {
        self.classes
            .find_type(name)?
            .ok_or_else(|| RuntimeError::fatal(format!("Unknown type: {name}")))
    }

    /// Resolve a declared type name; `var` and type parameters of `owner`
    /// hold any value.
    pub(crate) fn resolve_type(&mut self, name: &str, owner: Option<ClassId>) -> InterpResult<TypeId> {
        if name == "var" {
            return Ok(self.classes.primitives().void_t);
        }
        if let Some(ty) = self.classes.find_type(name)? {
            return Ok(ty);
        }
        let is_param = owner
            .map(|o| self.classes.class(o).type_params.iter().any(|p| p.name == name))
            .unwrap_or(false);
        if is_param {
            return Ok(self.classes.primitives().void_t);
        }
        Err(RuntimeError::fatal(format!("Unknown type: {name}")))
    }

    /// Class owning the code of the current frame.
    pub(crate) fn current_class(&self) -> Option<ClassId> {
        self.stack
            .context()
            .class
            .map(|t| self.classes.instance(t).base)
    }

    // ================================================================
    // Execution
    // ================================================================

    /// Run static initializers once, then the entrypoint. Returns the exit
    /// code; an uncaught error sets exit code and message from its root cause.
    pub fn execute(&mut self) -> InterpResult<i32> {
        let result = self.late_initialize().and_then(|()| self.run_entrypoint());
        match result {
            Ok(value) => {
                if let Some(n) = value.as_numeric() {
                    self.exit_code = n.as_i32();
                }
                Ok(self.exit_code)
            }
            Err(err) => {
                self.exit_code = err.exit_code();
                self.exit_message = Some(err.exit_message().to_string());
                debug!(code = self.exit_code, "uncaught error");
                Err(err)
            }
        }
    }

    fn run_entrypoint(&mut self) -> InterpResult<Value> {
        let name = self.config.entrypoint.clone();
        let entry = self
            .classes
            .find_entrypoint(&name)
            .ok_or_else(|| RuntimeError::fatal(format!("No entrypoint method '{name}' found")))?;
        let owner = self.classes.default_instance(entry.owner)?;
        debug!(entrypoint = %entry.signature(), "executing");
        self.invoke_method(Value::Type(owner), entry, Vec::new(), &SourcePosition::system())
    }

    /// Move every user class to `LateInitialized`, running static property
    /// initializers and the static initializer exactly once.
    pub fn late_initialize(&mut self) -> InterpResult<()> {
        let ids: Vec<ClassId> = self.classes.root_package().all_classes();
        for id in ids {
            if self.classes.class(id).primitive || !self.classes.mark_late_initialized(id) {
                continue;
            }
            let ty = self.classes.default_instance(id)?;
            let members: Vec<ClassMember> = self.classes.class(id).members.values().cloned().collect();
            for member in &members {
                if let ClassMember::Property(p) = member {
                    if p.modifier.is_static() && p.initializer.is_some() {
                        self.initialize_property(Value::Type(ty), p.clone())?;
                    }
                }
            }
            if let Some(ClassMember::Method(cctor)) = self.classes.class(id).declared_member(STATIC_INITIALIZER_NAME).cloned() {
                trace!(class = %self.classes.class(id).full_name(), "running static initializer");
                self.invoke_method(Value::Type(ty), cctor, Vec::new(), &SourcePosition::system())?;
            }
        }
        Ok(())
    }

    /// Evaluate `property`'s initializer on `target` and store it.
    pub(crate) fn initialize_property(&mut self, target: Value, property: Rc<Property>) -> InterpResult<()> {
        let Some(init) = property.initializer.clone() else {
            return Ok(());
        };
        let receiver = self.to_ref(target.clone());
        let position = property.position.clone();
        let label = format!("{}.<init>", property.name);
        self.step_into(&position, receiver, label, Registers::DEFAULT, |vm| {
            let value = vm.eval_value(&init)?;
            vm.store_property(&target, &property, value)
        })?;
        Ok(())
    }

    // ================================================================
    // Frame boundaries
    // ================================================================

    /// Run `body` in a frame with its own receiver and an isolated scope.
    /// Yields the returned value when the body returned.
    pub fn step_into(
        &mut self,
        position: &SourcePosition,
        receiver: ObjRef,
        label: String,
        maintain: Registers,
        body: impl FnOnce(&mut Self) -> InterpResult<()>,
    ) -> InterpResult<Option<ObjRef>> {
        let class = match receiver.value() {
            Value::Type(t) => Some(t),
            other => Some(other.type_of(&self.classes)),
        };
        let scope = self.store.open_scope(None);
        let context = Context {
            local: label,
            position: position.clone(),
            this: Some(receiver),
            class,
            scope,
            kind: FrameKind::Into,
        };
        self.wrap_execution(context, maintain, body)
    }

    /// Run `body` in a block frame: same receiver, child scope. A `return`
    /// inside propagates to the enclosing frame.
    pub fn step_inside(
        &mut self,
        label: &str,
        maintain: Registers,
        body: impl FnOnce(&mut Self) -> InterpResult<()>,
    ) -> InterpResult<Option<ObjRef>> {
        let parent = self.stack.context().clone();
        let scope = self.store.open_scope(Some(parent.scope));
        let context = Context {
            local: format!("{}.{}", parent.local, label),
            position: parent.position.clone(),
            this: parent.this.clone(),
            class: parent.class,
            scope,
            kind: FrameKind::Inside,
        };
        self.wrap_execution(context, maintain, body)
    }

    fn wrap_execution(
        &mut self,
        context: Context,
        maintain: Registers,
        body: impl FnOnce(&mut Self) -> InterpResult<()>,
    ) -> InterpResult<Option<ObjRef>> {
        if self.call_depth >= self.config.max_call_depth {
            self.store.close_scope(context.scope);
            return Err(RuntimeError::stack_overflow(self.config.max_call_depth));
        }
        let kind = context.kind;
        let ctx = self.stack.push_context(context);
        self.call_depth += 1;
        trace!(local = %ctx.local, depth = self.call_depth, "enter frame");

        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || body(self))
            .and_then(|()| self.settle_frame());

        self.call_depth -= 1;
        let frame = self.stack.pop();
        self.store.close_scope(ctx.scope);
        if let Some(frame) = &frame {
            self.stack.hand_off(frame, maintain | Registers::OMG);
            if kind == FrameKind::Inside && result.is_ok() && frame.state == State::Return {
                self.stack.copy_state(frame);
            }
        }
        trace!(local = %ctx.local, "leave frame");

        result.map_err(|err| {
            self.stack_trace.push(TraceElement {
                local: ctx.local.clone(),
                position: ctx.position.clone(),
            });
            RuntimeError::stack_trace(&ctx.local, ctx.position.clone(), err)
        })
    }

    /// Inspect the state a body left its frame in.
    fn settle_frame(&mut self) -> InterpResult<Option<ObjRef>> {
        match self.stack.state() {
            State::Normal => Ok(None),
            State::Return => Ok(Some(
                self.stack
                    .get(Registers::OMG)
                    .unwrap_or_else(|| self.void.clone()),
            )),
            State::Throw => Err(self.convert_throw()),
        }
    }

    /// Turn the value in `OMG` into a structured throw.
    fn convert_throw(&mut self) -> RuntimeError {
        let value = self
            .stack
            .get(Registers::OMG)
            .map(|r| r.value())
            .unwrap_or_default();
        if value.is_null() {
            return RuntimeError::fatal("No Message Provided");
        }
        let ty = value.type_of(&self.classes);
        let throwable = self.classes.primitives().throwable_t;
        if !self.classes.can_hold(throwable, ty) {
            return RuntimeError::fatal(format!(
                "Value is not instanceof Throwable: {}",
                self.classes.type_name(ty)
            ));
        }
        let position = self.stack.context().position.clone();
        let code = match self.invoke_member(value.clone(), "ExitCode", Vec::new(), &position) {
            Ok(v) => v.as_numeric().map(Numeric::as_i32).unwrap_or(-1),
            Err(e) => return e,
        };
        let message = match self
            .invoke_member(value.clone(), "Message", Vec::new(), &position)
            .and_then(|v| self.stringify(&v))
        {
            Ok(m) => m,
            Err(e) => return e,
        };
        let type_name = self.classes.type_name(ty).to_string();
        debug!(ty = %type_name, code, %message, "throw");
        RuntimeError::thrown(value, &type_name, code, message)
    }

    // ================================================================
    // Variables and references
    // ================================================================

    /// Declare `name` in the current scope.
    pub fn put_local(&mut self, name: &str, value: ObjRef) {
        let scope = self.stack.scope();
        self.store.set(scope, VariableContext::Local, name, Some(value));
    }

    /// Look `name` up through the current scope chain.
    pub fn get_local(&self, name: &str) -> Option<ObjRef> {
        self.store.get(self.stack.scope(), VariableContext::Local, name)
    }

    /// A reference holding `value`; primitive values are interned in the
    /// absolute store.
    pub fn to_ref(&mut self, value: Value) -> ObjRef {
        let ty = value.type_of(&self.classes);
        match &value {
            Value::Null => self.void.clone(),
            Value::Numeric(_) | Value::Str(_) | Value::Range { .. } | Value::Type(_) => {
                let key = value.key(&self.classes);
                self.store.compute(&key, || ObjectRef::constant(ty, value))
            }
            _ => ObjectRef::constant(ty, value),
        }
    }

    pub fn numeric_ref(&mut self, n: Numeric) -> ObjRef {
        self.to_ref(Value::Numeric(n))
    }

    pub fn bool_ref(&mut self, b: bool) -> ObjRef {
        self.to_ref(Value::bool(b))
    }

    /// Read through a reference, evaluating its accessor if any.
    pub fn read_ref(&mut self, r: &ObjRef) -> InterpResult<Value> {
        match &r.accessor {
            None => Ok(r.value()),
            Some(Accessor::Property { target, property }) => {
                self.read_property(target.clone(), property.clone())
            }
            Some(Accessor::ArrayElement { array, index }) => array
                .get(*index)
                .ok_or_else(|| RuntimeError::index_out_of_bounds(*index as i64, array.len())),
            Some(Accessor::Stdio) => self.read_stdio(),
        }
    }

    /// Write through a reference, evaluating its accessor if any.
    pub fn write_ref(&mut self, r: &ObjRef, value: Value) -> InterpResult<()> {
        match &r.accessor {
            None => r.set_value(&self.classes, value),
            Some(Accessor::Property { target, property }) => {
                self.write_property(target.clone(), property.clone(), value)
            }
            Some(Accessor::ArrayElement { array, index }) => {
                let ty = value.type_of(&self.classes);
                if !self.classes.can_hold(array.element, ty) {
                    return Err(RuntimeError::type_mismatch(
                        self.classes.type_name(ty),
                        self.classes.type_name(array.element),
                    ));
                }
                let mut items = array.items.borrow_mut();
                let len = items.len();
                match items.get_mut(*index) {
                    Some(slot) => {
                        *slot = value;
                        Ok(())
                    }
                    None => Err(RuntimeError::index_out_of_bounds(*index as i64, len)),
                }
            }
            Some(Accessor::Stdio) => self.write_stdio(&value),
        }
    }

    /// Storage key of `property` on `target`; static properties live on the
    /// owning class.
    fn property_key(&mut self, target: &Value, property: &Property) -> InterpResult<String> {
        let owner_key = if property.modifier.is_static() {
            let ty = self.classes.default_instance(property.owner)?;
            self.classes.instance(ty).key()
        } else {
            target.key(&self.classes)
        };
        Ok(property.storage_key(&owner_key))
    }

    pub(crate) fn read_property(&mut self, target: Value, property: Rc<Property>) -> InterpResult<Value> {
        if !property.gettable {
            return Err(RuntimeError::not_gettable(&property.name));
        }
        if let Some(getter) = property.getter.clone() {
            let receiver = self.to_ref(target);
            let label = format!("{}.get", property.name);
            let ret = self.step_into(&property.position, receiver, label, Registers::DEFAULT, |vm| {
                vm.execute_code(&getter)
            })?;
            return Ok(ret.map(|r| r.value()).unwrap_or_default());
        }
        let key = self.property_key(&target, &property)?;
        Ok(self.store.property(&key).map(|r| r.value()).unwrap_or_default())
    }

    pub(crate) fn write_property(&mut self, target: Value, property: Rc<Property>, value: Value) -> InterpResult<()> {
        if !property.settable {
            return Err(RuntimeError::not_settable(&property.name));
        }
        if let Some(setter) = property.setter.clone() {
            let ty = self.resolve_type(&property.ty, Some(property.owner))?;
            let receiver = self.to_ref(target);
            let label = format!("{}.set", property.name);
            self.step_into(&property.position, receiver, label, Registers::DEFAULT, |vm| {
                let param = ObjectRef::new(ty);
                param.set_value(&vm.classes, value)?;
                vm.put_local("value", param);
                vm.execute_code(&setter)
            })?;
            return Ok(());
        }
        self.store_property(&target, &property, value)
    }

    /// Write an auto-property's storage slot, bypassing `settable`.
    pub(crate) fn store_property(&mut self, target: &Value, property: &Property, value: Value) -> InterpResult<()> {
        let ty = self.resolve_type(&property.ty, Some(property.owner))?;
        let key = self.property_key(target, property)?;
        let slot = self.store.compute_property(&key, || ObjectRef::new(ty));
        slot.set_value(&self.classes, value)
    }

    // ================================================================
    // Member invocation
    // ================================================================

    /// Find `name` on the value's type; class references look at the
    /// referenced class first.
    pub(crate) fn resolve_member(&self, receiver: &Value, name: &str) -> Option<ClassMember> {
        if let Value::Type(t) = receiver {
            if let Some(m) = self.classes.find_member(*t, name) {
                return Some(m);
            }
        }
        self.classes.find_member(receiver.type_of(&self.classes), name)
    }

    /// Invoke the member `name` of `receiver`.
    pub fn invoke_member(
        &mut self,
        receiver: Value,
        name: &str,
        args: Vec<Value>,
        position: &SourcePosition,
    ) -> InterpResult<Value> {
        if receiver.is_null() {
            return self.invoke_native(&receiver, name, &args);
        }
        match self.resolve_member(&receiver, name) {
            Some(ClassMember::Method(m)) => self.invoke_method(receiver, m, args, position),
            Some(ClassMember::Property(p)) => self.read_property(receiver, p),
            None => {
                let ty = receiver.type_of(&self.classes);
                Err(RuntimeError::undefined_member(self.classes.type_name(ty), name))
            }
        }
    }

    /// Invoke `method` on `receiver` with evaluated `args`.
    pub fn invoke_method(
        &mut self,
        receiver: Value,
        method: Rc<Method>,
        args: Vec<Value>,
        position: &SourcePosition,
    ) -> InterpResult<Value> {
        if args.len() != method.parameters.len() {
            return Err(RuntimeError::arity_mismatch(
                &method.name,
                method.parameters.len(),
                args.len(),
            ));
        }
        let Some(body) = method.body.clone() else {
            if method.modifier.is_native() && !self.classes.class(method.owner).is_native() {
                let runner = self.native_runner.clone().ok_or_else(|| {
                    RuntimeError::unimplemented(&format!("native member {}", method.name))
                })?;
                let member = ClassMember::Method(method.clone());
                return runner.invoke(self, &receiver, &member, &args);
            }
            return self.invoke_native(&receiver, &method.name, &args);
        };

        let mut params = Vec::with_capacity(args.len());
        for (param, arg) in method.parameters.iter().zip(args) {
            let ty = self.resolve_type(&param.ty, Some(method.owner))?;
            params.push((param.name.clone(), ty, arg));
        }
        let return_type = if method.returns_void() || method.is_constructor() {
            None
        } else {
            Some(self.resolve_type(&method.return_type, Some(method.owner))?)
        };
        let label = self.method_label(&receiver, &method);
        let receiver = self.to_ref(receiver);
        let must_return = return_type.is_some();
        let name = method.name.clone();

        let ret = self.step_into(position, receiver, label, Registers::DEFAULT, |vm| {
            for (name, ty, arg) in params {
                let param = ObjectRef::new(ty);
                param.set_value(&vm.classes, arg)?;
                vm.put_local(&name, param);
            }
            vm.execute_code(&body)?;
            if must_return && vm.stack.state() == State::Normal {
                return Err(RuntimeError::fatal(format!(
                    "Invalid state after method {name}: no value returned"
                )));
            }
            Ok(())
        })?;
        Ok(ret.map(|r| r.value()).unwrap_or_default())
    }

    /// `FullName[#id].signature` label of a method frame.
    fn method_label(&self, receiver: &Value, method: &Method) -> String {
        let class = self.classes.class(method.owner);
        match receiver {
            Value::Object(o) => format!("{}#{:x}.{}", class.full_name(), o.id, method.signature()),
            _ => format!("{}.{}", class.full_name(), method.signature()),
        }
    }

    /// Allocate an instance of `ty`, run its property initializers and
    /// constructor.
    pub fn construct(&mut self, ty: TypeId, args: Vec<Value>, position: &SourcePosition) -> InterpResult<Value> {
        let object = Value::Object(Rc::new(super::value::CodeObject {
            id: self.next_id(),
            ty,
        }));
        let key = object.key(&self.classes);
        let stored = object.clone();
        self.store
            .compute(&key, || ObjectRef::constant(ty, stored));

        let mut chain = vec![ty];
        chain.extend(self.classes.inheritors(ty));
        for t in chain.into_iter().rev() {
            let class = self.classes.base_class(t);
            if class.primitive {
                continue;
            }
            let props: Vec<Rc<Property>> = class
                .members
                .values()
                .filter_map(|m| match m {
                    ClassMember::Property(p) if !p.modifier.is_static() => Some(p.clone()),
                    _ => None,
                })
                .collect();
            for p in props {
                self.initialize_property(object.clone(), p)?;
            }
        }

        match self.classes.base_class(ty).declared_member(CONSTRUCTOR_NAME).cloned() {
            Some(ClassMember::Method(ctor)) => {
                self.invoke_method(object.clone(), ctor, args, position)?;
            }
            _ if !args.is_empty() => {
                return Err(RuntimeError::arity_mismatch(CONSTRUCTOR_NAME, 0, args.len()));
            }
            _ => {}
        }
        trace!(object = %key, "constructed");
        Ok(object)
    }
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("config", &self.config)
            .field("depth", &self.stack.depth())
            .field("exit_code", &self.exit_code)
            .finish_non_exhaustive()
    }
}

/// Whether `err` ends in a user-level throw rather than a fatal fault.
pub fn is_thrown(err: &RuntimeError) -> bool {
    matches!(err.root_cause().kind, ErrorKind::Thrown { .. })
}
