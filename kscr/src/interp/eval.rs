//! Statement and component evaluation
//!
//! A statement runs in an output child frame: each component reads the
//! previous component's result from the frame's default register (its
//! "left") and writes its own result back there. Nested operands run in
//! their own output frame so they never see an outer left.

use super::error::{InterpResult, RuntimeError};
use super::native::{index_arg, EXCEPTION_EXIT_CODE};
use super::numeric::{numeric_mode, Numeric};
use super::runtime::{Interpreter, STACK_GROW_SIZE, STACK_RED_ZONE};
use super::stack::{Registers, State};
use super::store::{Accessor, ObjRef, ObjectRef};
use super::value::{ArrayObject, SequenceSource, Value};
use crate::bytecode::{
    BytecodeKind, ComponentRole, ExecutableCode, Operator, Statement, StatementComponent, VariableContext,
};
use crate::model::{ClassMember, TypeId};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, trace};

impl Interpreter {
    // ================================================================
    // Statements
    // ================================================================

    /// Run statements in order, stopping once the frame leaves `Normal`.
    pub fn execute_code(&mut self, code: &ExecutableCode) -> InterpResult<()> {
        for stmt in &code.main {
            self.eval_statement(stmt)?;
            if self.stack.state() != State::Normal {
                break;
            }
        }
        Ok(())
    }

    pub fn eval_statement(&mut self, stmt: &Statement) -> InterpResult<()> {
        let result = self.run_statement(stmt).map(|_| ());
        match stmt.catch_finally.as_deref() {
            Some(handler) => self.handle_catch_finally(handler, result),
            None => result,
        }
    }

    /// Evaluate the components of `stmt` in an output child frame and
    /// return the final result register.
    fn run_statement(&mut self, stmt: &Statement) -> InterpResult<Option<ObjRef>> {
        self.stack.push_output(Registers::ALP);
        let mut result = Ok(());
        for comp in &stmt.main {
            result = self.eval_component(comp);
            if result.is_err() || self.stack.state() != State::Normal {
                break;
            }
        }
        let out = self.stack.local(Registers::DEFAULT);
        if let Some(frame) = self.stack.pop() {
            self.stack.copy_state(&frame);
        }
        result.map(|()| out)
    }

    /// Evaluate `stmt` as an expression yielding a reference.
    pub fn eval_ref(&mut self, stmt: &Statement) -> InterpResult<ObjRef> {
        Ok(self.run_statement(stmt)?.unwrap_or_else(|| self.void.clone()))
    }

    /// Evaluate `stmt` and read its value through any accessor.
    pub fn eval_value(&mut self, stmt: &Statement) -> InterpResult<Value> {
        let r = self.eval_ref(stmt)?;
        self.read_ref(&r)
    }

    /// Evaluate a single operand component in its own output frame.
    fn eval_operand(&mut self, comp: &StatementComponent) -> InterpResult<ObjRef> {
        self.stack.push_output(Registers::ALP);
        let result = self.eval_component(comp);
        let out = self.stack.local(Registers::DEFAULT);
        if let Some(frame) = self.stack.pop() {
            self.stack.copy_state(&frame);
        }
        result.map(|()| out.unwrap_or_else(|| self.void.clone()))
    }

    fn operand_value(&mut self, comp: &StatementComponent) -> InterpResult<Value> {
        let r = self.eval_operand(comp)?;
        self.read_ref(&r)
    }

    fn left(&self) -> Option<ObjRef> {
        self.stack.local(Registers::DEFAULT)
    }

    fn left_value(&mut self, what: &str) -> InterpResult<Value> {
        let r = self
            .left()
            .ok_or_else(|| RuntimeError::fatal(format!("{what} requires a left operand")))?;
        self.read_ref(&r)
    }

    fn set_result(&mut self, r: ObjRef) {
        self.stack.set(Registers::DEFAULT, Some(r));
    }

    fn set_value(&mut self, value: Value) {
        let r = self.to_ref(value);
        self.set_result(r);
    }

    fn this_value(&self) -> Value {
        self.stack.this().map(|r| r.value()).unwrap_or_default()
    }

    /// Declare a fresh local of type `ty` holding `value`.
    fn bind_local(&mut self, name: &str, ty: TypeId, value: Value) -> InterpResult<ObjRef> {
        let r = ObjectRef::new(ty);
        r.set_value(&self.classes, value)?;
        self.put_local(name, r.clone());
        Ok(r)
    }

    fn run_block(&mut self, label: &str, code: Option<&ExecutableCode>) -> InterpResult<()> {
        match code {
            Some(code) => self
                .step_inside(label, Registers::DEFAULT, |vm| vm.execute_code(code))
                .map(|_| ()),
            None => Ok(()),
        }
    }

    // ================================================================
    // Components
    // ================================================================

    pub fn eval_component(&mut self, comp: &StatementComponent) -> InterpResult<()> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.dispatch(comp))?;
        match comp.post_component.as_deref() {
            Some(post) if self.stack.state() == State::Normal => self.eval_component(post),
            _ => Ok(()),
        }
    }

    fn dispatch(&mut self, comp: &StatementComponent) -> InterpResult<()> {
        use BytecodeKind as K;
        use ComponentRole as R;

        trace!(component = %comp, "eval");
        match (comp.role, comp.kind) {
            (R::Emitter, _) => self.eval_emitter(comp),
            (R::Consumer, _) => self.eval_consumer(comp),
            (R::Pipe, K::Lambda) => self.eval_listener(comp),

            (_, K::LiteralNumeric) => {
                let n = Numeric::compile(&comp.arg)?;
                let r = self.numeric_ref(n);
                self.set_result(r);
                Ok(())
            }
            (_, K::LiteralString) => {
                self.set_value(Value::str(&comp.arg));
                Ok(())
            }
            (_, K::LiteralTrue) => {
                self.set_value(Value::bool(true));
                Ok(())
            }
            (_, K::LiteralFalse) => {
                self.set_value(Value::bool(false));
                Ok(())
            }
            (_, K::Null) => {
                let void = self.void.clone();
                self.set_result(void);
                Ok(())
            }
            (_, K::LiteralRange) => {
                let start = self.range_bound(comp.sub_statement.as_deref())?;
                let end = self.range_bound(comp.alt_statement.as_deref())?;
                self.set_value(Value::Range { start, end });
                Ok(())
            }
            (_, K::Parentheses) => {
                let stmt = required(comp.sub_statement.as_deref(), "parentheses")?;
                let r = self.eval_ref(stmt)?;
                self.set_result(r);
                Ok(())
            }
            (_, K::TypeExpression) => {
                let owner = self.current_class();
                let ty = self.resolve_type(&comp.arg, owner)?;
                self.set_value(Value::Type(ty));
                Ok(())
            }
            (_, K::StdioExpression) => {
                let stdio = self.stdio.clone();
                self.set_result(stdio);
                Ok(())
            }
            (R::Provider, K::Undefined) => {
                let this = self.stack.this().unwrap_or_else(|| self.void.clone());
                self.set_result(this);
                Ok(())
            }
            (_, K::ExpressionVariable) => self.eval_variable(comp),
            (R::Declaration, K::Declaration | K::Assignment) => self.eval_declaration(comp),
            (R::Setter, K::Assignment) => self.eval_setter(comp),
            (_, K::Return) => self.eval_exit(comp, State::Return),
            (_, K::Throw) => self.eval_exit(comp, State::Throw),

            (_, K::StmtIf) => self.eval_if(comp),
            (_, K::StmtFor) => self.eval_for(comp),
            (_, K::StmtForEach) => self.eval_foreach(comp),
            (_, K::StmtWhile) => self.eval_while(comp),
            (_, K::StmtDo) => self.eval_do(comp),
            (_, K::StmtTry) => self.eval_try(comp),

            (R::Operator, K::Operator) => self.eval_operator(comp),
            (_, K::ConstructorCall) => self.eval_constructor(comp),
            (_, K::Call) => self.eval_call(comp),
            (_, K::Indexer) => self.eval_indexer(comp),
            (_, K::ArrayConstructor) => self.eval_array(comp),
            (_, K::Instanceof) => {
                let value = self.left_value("instanceof")?;
                let owner = self.current_class();
                let ty = self.resolve_type(&comp.arg, owner)?;
                let holds = !value.is_null() && self.classes.can_hold(ty, value.type_of(&self.classes));
                self.set_value(Value::bool(holds));
                Ok(())
            }

            (role, kind) => Err(RuntimeError::unimplemented(&format!("component {role:?}:{kind:?}"))),
        }
    }

    fn range_bound(&mut self, stmt: Option<&Statement>) -> InterpResult<i32> {
        let stmt = required(stmt, "range bound")?;
        match self.eval_value(stmt)? {
            Value::Numeric(n) => Ok(n.as_i32()),
            other => {
                let ty = other.type_of(&self.classes);
                Err(RuntimeError::type_mismatch(self.classes.type_name(ty), "int"))
            }
        }
    }

    /// Locals first, then members of `this`, then type names.
    fn eval_variable(&mut self, comp: &StatementComponent) -> InterpResult<()> {
        let name = comp.arg.as_str();
        if comp.context == VariableContext::Local {
            if let Some(r) = self.get_local(name) {
                self.set_result(r);
                return Ok(());
            }
        }
        let this = self.this_value();
        if let Some(ClassMember::Property(property)) = self.resolve_member(&this, name) {
            let r = self.property_ref(this, property)?;
            self.set_result(r);
            return Ok(());
        }
        if let Some(ty) = self.find_type(name)? {
            self.set_value(Value::Type(ty));
            return Ok(());
        }
        Err(RuntimeError::undefined_variable(name))
    }

    fn property_ref(&mut self, target: Value, property: Rc<crate::model::Property>) -> InterpResult<ObjRef> {
        let ty = self.resolve_type(&property.ty, Some(property.owner))?;
        Ok(ObjectRef::with_accessor(ty, Accessor::Property { target, property }))
    }

    fn eval_declaration(&mut self, comp: &StatementComponent) -> InterpResult<()> {
        let (ty_name, name) = match comp.args.as_slice() {
            [ty, name] => (ty.as_str(), name.as_str()),
            _ => return Err(RuntimeError::fatal("Declaration requires a type and a name")),
        };
        let owner = self.current_class();
        let ty = self.resolve_type(ty_name, owner)?;
        let value = match comp.sub_component.as_deref() {
            Some(init) => self.operand_value(init)?,
            None => default_value(&self.classes, ty),
        };
        let r = self.bind_local(name, ty, value)?;
        self.set_result(r);
        Ok(())
    }

    fn eval_setter(&mut self, comp: &StatementComponent) -> InterpResult<()> {
        let target = self
            .left()
            .ok_or_else(|| RuntimeError::fatal("Assignment requires a target"))?;
        let rhs = required(comp.sub_component.as_deref(), "assignment value")?;
        let value = self.operand_value(rhs)?;
        self.write_ref(&target, value.clone())?;
        self.set_value(value);
        Ok(())
    }

    /// `return` and `throw`: the operand goes to `Alp|Omg` and the frame
    /// changes state.
    fn eval_exit(&mut self, comp: &StatementComponent, state: State) -> InterpResult<()> {
        let value = match comp.sub_statement.as_deref() {
            Some(stmt) => self.eval_value(stmt)?,
            None => Value::Null,
        };
        let r = self.to_ref(value);
        self.stack.set(Registers::ALP | Registers::OMG, Some(r));
        if state == State::Throw {
            self.stack_trace.clear();
        }
        self.stack.set_state(state);
        Ok(())
    }

    // ================================================================
    // Control flow
    // ================================================================

    fn condition(&mut self, stmt: &Statement) -> InterpResult<bool> {
        let holds = self.eval_value(stmt)?.to_bool();
        let r = self.bool_ref(holds);
        self.stack.set(Registers::PHI, Some(r));
        Ok(holds)
    }

    fn eval_if(&mut self, comp: &StatementComponent) -> InterpResult<()> {
        let cond = required(comp.sub_statement.as_deref(), "if condition")?;
        if self.condition(cond)? {
            self.run_block("if", comp.inner_code.as_ref())
        } else {
            match comp.sub_component.as_deref() {
                Some(otherwise) => self.run_block("else", otherwise.inner_code.as_ref()),
                None => Ok(()),
            }
        }
    }

    fn eval_for(&mut self, comp: &StatementComponent) -> InterpResult<()> {
        let init = comp.sub_statement.as_deref();
        let cond = comp.sub_component.as_deref();
        let step = comp.alt_statement.as_deref();
        let body = comp.inner_code.as_ref();
        self.step_inside("for", Registers::DEFAULT, |vm| {
            if let Some(init) = init {
                let r = vm.eval_ref(init)?;
                vm.stack.set(Registers::DEL, Some(r));
            }
            loop {
                if let Some(cond) = cond {
                    let holds = vm.operand_value(cond)?.to_bool();
                    let r = vm.bool_ref(holds);
                    vm.stack.set(Registers::PHI, Some(r));
                    if !holds {
                        break;
                    }
                }
                vm.run_block("body", body)?;
                if vm.stack.state() != State::Normal {
                    break;
                }
                if let Some(step) = step {
                    vm.eval_statement(step)?;
                }
            }
            Ok(())
        })?;
        Ok(())
    }

    fn eval_foreach(&mut self, comp: &StatementComponent) -> InterpResult<()> {
        let source = required(comp.sub_statement.as_deref(), "foreach source")?;
        let name = comp.arg.as_str();
        let ty_name = comp.args.first().map(String::as_str).unwrap_or("var");
        let body = comp.inner_code.as_ref();
        let position = comp.position.clone();
        let iterable = self.eval_value(source)?;
        self.step_inside("foreach", Registers::DEFAULT, |vm| {
            let owner = vm.current_class();
            let ty = vm.resolve_type(ty_name, owner)?;
            let seq = vm.sequence_of(iterable)?;
            let iterator = vm.to_ref(seq.clone());
            vm.stack.set(Registers::EPS, Some(iterator));
            let var = vm.bind_local(name, ty, default_value(&vm.classes, ty))?;
            loop {
                let more = vm.invoke_member(seq.clone(), "hasNext", Vec::new(), &position)?;
                if !more.to_bool() {
                    break;
                }
                let item = vm.invoke_member(seq.clone(), "next", Vec::new(), &position)?;
                var.set_value(&vm.classes, item)?;
                vm.run_block("body", body)?;
                if vm.stack.state() != State::Normal {
                    break;
                }
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Obtain the iteration protocol object of `value`.
    fn sequence_of(&mut self, value: Value) -> InterpResult<Value> {
        if let Value::Sequence(_) = value {
            return Ok(value);
        }
        let position = self.stack.context().position.clone();
        for member in ["sequence", "iterator"] {
            if self.resolve_member(&value, member).is_some() {
                return self.invoke_member(value, member, Vec::new(), &position);
            }
        }
        let ty = value.type_of(&self.classes);
        Err(RuntimeError::fatal(format!(
            "Value is not iterable: {}",
            self.classes.type_name(ty)
        )))
    }

    fn eval_while(&mut self, comp: &StatementComponent) -> InterpResult<()> {
        let cond = required(comp.sub_statement.as_deref(), "while condition")?;
        let body = comp.inner_code.as_ref();
        self.step_inside("while", Registers::DEFAULT, |vm| {
            while vm.condition(cond)? {
                vm.run_block("body", body)?;
                if vm.stack.state() != State::Normal {
                    break;
                }
            }
            Ok(())
        })?;
        Ok(())
    }

    fn eval_do(&mut self, comp: &StatementComponent) -> InterpResult<()> {
        let cond = required(comp.sub_statement.as_deref(), "do condition")?;
        let body = comp.inner_code.as_ref();
        self.step_inside("do", Registers::DEFAULT, |vm| {
            loop {
                vm.run_block("body", body)?;
                if vm.stack.state() != State::Normal || !vm.condition(cond)? {
                    break;
                }
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Bind resources, run the body, then close resources in reverse order
    /// whether or not the body failed. Catch and finally clauses hang off
    /// the enclosing statement.
    fn eval_try(&mut self, comp: &StatementComponent) -> InterpResult<()> {
        let resources = comp.sub_statement.as_deref();
        let body = comp.inner_code.as_ref();
        let position = comp.position.clone();
        self.step_inside("try", Registers::DEFAULT, |vm| {
            let mut bound = Vec::new();
            let mut result = Ok(());
            for decl in resources.map(|r| r.main.as_slice()).unwrap_or_default() {
                match vm.eval_operand(decl) {
                    Ok(r) => bound.push(r),
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                }
            }
            if result.is_ok() {
                result = vm.run_block("body", body);
            }
            for r in bound.iter().rev() {
                let resource = vm.read_ref(r)?;
                if resource.is_null() {
                    continue;
                }
                if let Err(e) = vm.invoke_member(resource, "close", Vec::new(), &position) {
                    return Err(RuntimeError::fatal(format!(
                        "Could not close resource: {}",
                        e.root_cause().message
                    )));
                }
            }
            result
        })?;
        Ok(())
    }

    /// Match a failed statement against its catch clauses, then run the
    /// finally clause exactly once.
    fn handle_catch_finally(
        &mut self,
        handler: &StatementComponent,
        result: InterpResult<()>,
    ) -> InterpResult<()> {
        let mut outcome = result;
        let mut finally = None;
        let mut handled = false;
        let mut clause = Some(handler);
        while let Some(c) = clause {
            clause = c.alt_component.as_deref();
            if c.kind == BytecodeKind::StmtFinally {
                finally = Some(c);
                continue;
            }
            if handled || c.kind != BytecodeKind::StmtCatch {
                continue;
            }
            let Err(err) = &outcome else {
                continue;
            };
            let Some(thrown) = err.thrown_value().cloned() else {
                continue;
            };
            match self.catch_matches(c, &thrown) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    handled = true;
                    outcome = Err(e);
                    continue;
                }
            }
            handled = true;
            debug!(types = ?c.args, "caught throw");
            self.stack_trace.clear();
            outcome = self.run_catch(c, thrown);
        }
        if let Some(f) = finally {
            self.run_finally(f)?;
        }
        outcome
    }

    fn catch_matches(&mut self, clause: &StatementComponent, thrown: &Value) -> InterpResult<bool> {
        if clause.args.is_empty() {
            return Ok(true);
        }
        let actual = thrown.type_of(&self.classes);
        let owner = self.current_class();
        for name in &clause.args {
            let ty = self.resolve_type(name, owner)?;
            if self.classes.can_hold(ty, actual) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn run_catch(&mut self, clause: &StatementComponent, thrown: Value) -> InterpResult<()> {
        let name = clause.arg.as_str();
        let body = clause.inner_code.as_ref();
        let ty = thrown.type_of(&self.classes);
        self.step_inside("catch", Registers::DEFAULT, |vm| {
            if !name.is_empty() {
                vm.bind_local(name, ty, thrown)?;
            }
            match body {
                Some(code) => vm.execute_code(code),
                None => Ok(()),
            }
        })?;
        Ok(())
    }

    /// Run a finally clause with the frame temporarily `Normal`; the prior
    /// state is restored unless the clause changes it.
    fn run_finally(&mut self, clause: &StatementComponent) -> InterpResult<()> {
        let state = self.stack.state();
        let omega = self.stack.get(Registers::OMG);
        self.stack.set_state(State::Normal);
        let result = self.run_block("finally", clause.inner_code.as_ref());
        if self.stack.state() == State::Normal {
            self.stack.set_state(state);
            self.stack.set(Registers::OMG, omega);
        }
        result.map_err(|e| RuntimeError::fatal(format!("Error in finally block: {}", e.root_cause().message)))
    }

    // ================================================================
    // Operators
    // ================================================================

    fn eval_operator(&mut self, comp: &StatementComponent) -> InterpResult<()> {
        let op = comp.operator();
        if op.is_binary() || op.is_compound() {
            self.eval_binary(comp, op)
        } else {
            self.eval_unary(comp, op)
        }
    }

    fn eval_binary(&mut self, comp: &StatementComponent, op: Operator) -> InterpResult<()> {
        let base = op.base();
        let target = self
            .left()
            .ok_or_else(|| RuntimeError::fatal(format!("Operator {op} requires a left operand")))?;
        let left = self.read_ref(&target)?;

        if base == Operator::LOGIC_AND && !left.to_bool() {
            self.set_value(Value::bool(false));
            return Ok(());
        }
        if base == Operator::LOGIC_OR && left.to_bool() {
            self.set_value(Value::bool(true));
            return Ok(());
        }
        if base == Operator::NULL_FALLBACK && !left.is_null() {
            self.set_value(left);
            return Ok(());
        }

        let rhs = required(comp.sub_component.as_deref(), "right operand")?;
        let right = self.operand_value(rhs)?;
        let value = self.apply_binary(op, left, right, comp)?;
        if op.is_compound() {
            self.write_ref(&target, value.clone())?;
        }
        self.set_value(value);
        Ok(())
    }

    fn apply_binary(&mut self, op: Operator, left: Value, right: Value, comp: &StatementComponent) -> InterpResult<Value> {
        let base = op.base();
        if let (Value::Numeric(a), Value::Numeric(b)) = (&left, &right) {
            return Ok(Value::Numeric(a.binary(op, *b)?));
        }
        if base == Operator::LOGIC_AND {
            return Ok(Value::bool(left.to_bool() && right.to_bool()));
        }
        if base == Operator::LOGIC_OR {
            return Ok(Value::bool(left.to_bool() || right.to_bool()));
        }
        if base == Operator::NULL_FALLBACK {
            return Ok(if left.is_null() { right } else { left });
        }
        if base == Operator::EQUALS || base == Operator::NOT_EQUALS {
            let equal = self.values_equal(left, right, comp)?;
            return Ok(Value::bool(equal == (base == Operator::EQUALS)));
        }
        if base == Operator::PLUS && (left.as_str().is_some() || right.as_str().is_some()) {
            let joined = format!("{}{}", self.stringify(&left)?, self.stringify(&right)?);
            return Ok(Value::str(&joined));
        }

        let member = op
            .member_name()
            .ok_or_else(|| RuntimeError::fatal(format!("Unknown operator: {op}")))?;
        if !left.is_null() && self.resolve_member(&left, &member).is_none() {
            let ty = left.type_of(&self.classes);
            return Err(RuntimeError::fatal(format!(
                "Operator {} is not applicable to {}",
                op.name().unwrap_or("?"),
                self.classes.type_name(ty)
            )));
        }
        self.invoke_member(left, &member, vec![right], &comp.position)
    }

    /// Equality honouring user `equals` overrides on objects.
    fn values_equal(&mut self, left: Value, right: Value, comp: &StatementComponent) -> InterpResult<bool> {
        match left {
            Value::Object(_) => Ok(self
                .invoke_member(left, "equals", vec![right], &comp.position)?
                .to_bool()),
            other => Ok(other.same(&right)),
        }
    }

    /// Prefix and postfix operators; increments and decrements write back
    /// and postfix forms yield the value read before the write.
    fn eval_unary(&mut self, comp: &StatementComponent, op: Operator) -> InterpResult<()> {
        let base = op.base();
        let target = self
            .left()
            .ok_or_else(|| RuntimeError::fatal(format!("Operator {op} requires an operand")))?;
        let before = self.read_ref(&target)?;
        let steps = [
            Operator::INCREMENT_READ,
            Operator::DECREMENT_READ,
            Operator::READ_INCREMENT,
            Operator::READ_DECREMENT,
        ]
        .contains(&base);

        let after = match &before {
            Value::Numeric(n) => Value::Numeric(n.unary(op)?),
            other if base == Operator::LOGIC_NOT => Value::bool(!other.to_bool()),
            other => {
                let member = op
                    .member_name()
                    .ok_or_else(|| RuntimeError::fatal(format!("Unknown operator: {op}")))?;
                self.invoke_member(other.clone(), &member, Vec::new(), &comp.position)?
            }
        };
        if steps {
            self.write_ref(&target, after.clone())?;
        }
        let read_first = base == Operator::READ_INCREMENT || base == Operator::READ_DECREMENT;
        self.set_value(if read_first { before } else { after });
        Ok(())
    }

    // ================================================================
    // Objects, members and arrays
    // ================================================================

    fn eval_args(&mut self, comp: Option<&StatementComponent>) -> InterpResult<Vec<Value>> {
        let Some(comp) = comp else {
            return Ok(Vec::new());
        };
        let Some(code) = comp.inner_code.as_ref() else {
            return Ok(Vec::new());
        };
        let mut args = Vec::with_capacity(code.main.len());
        for stmt in &code.main {
            args.push(self.eval_value(stmt)?);
        }
        Ok(args)
    }

    fn eval_constructor(&mut self, comp: &StatementComponent) -> InterpResult<()> {
        let owner = self.current_class();
        let ty = self.resolve_type(&comp.arg, owner)?;
        let args = self.eval_args(comp.sub_component.as_deref())?;
        let p = *self.classes.primitives();
        let class = self.classes.base_class(ty);
        let (exception, primitive, instantiable) = (
            class.id() == p.exception || class.id() == p.null_pointer,
            class.primitive,
            !class.is_interface() && !class.modifier.is_abstract(),
        );
        let value = if exception {
            let message = match args.first() {
                Some(v) => self.stringify(v)?,
                None => String::new(),
            };
            self.new_exception(ty, &message, EXCEPTION_EXIT_CODE)
        } else if primitive {
            return Err(RuntimeError::fatal(format!(
                "Cannot instantiate primitive type {}",
                self.classes.type_name(ty)
            )));
        } else if !instantiable {
            return Err(RuntimeError::fatal(format!(
                "Cannot instantiate abstract type {}",
                self.classes.type_name(ty)
            )));
        } else {
            self.construct(ty, args, &comp.position)?
        };
        self.set_value(value);
        Ok(())
    }

    /// `.member` and `.member(args)`; a bare call targets `this`. Property
    /// reads without arguments yield an accessor so they can be assigned.
    fn eval_call(&mut self, comp: &StatementComponent) -> InterpResult<()> {
        let receiver = match self.left() {
            Some(r) => self.read_ref(&r)?,
            None => self.this_value(),
        };
        let name = comp.arg.as_str();
        let has_args = comp.sub_component.is_some();
        let args = self.eval_args(comp.sub_component.as_deref())?;
        if receiver.is_null() {
            let v = self.invoke_member(receiver, name, args, &comp.position)?;
            self.set_value(v);
            return Ok(());
        }
        match self.resolve_member(&receiver, name) {
            Some(ClassMember::Property(property)) if !has_args => {
                let r = self.property_ref(receiver, property)?;
                self.set_result(r);
            }
            Some(ClassMember::Property(property)) => {
                return Err(RuntimeError::fatal(format!(
                    "Property {} cannot be invoked",
                    property.name
                )));
            }
            Some(ClassMember::Method(method)) => {
                let v = self.invoke_method(receiver, method, args, &comp.position)?;
                self.set_value(v);
            }
            None => {
                let ty = receiver.type_of(&self.classes);
                return Err(RuntimeError::undefined_member(self.classes.type_name(ty), name));
            }
        }
        Ok(())
    }

    fn eval_indexer(&mut self, comp: &StatementComponent) -> InterpResult<()> {
        let target = self.left_value("indexer")?;
        let index_comp = required(comp.sub_component.as_deref(), "index")?;
        let index = self.operand_value(index_comp)?;
        match target {
            Value::Array(array) => {
                let i = index_arg(std::slice::from_ref(&index), array.len())?;
                let r = ObjectRef::with_accessor(array.element, Accessor::ArrayElement { array, index: i });
                self.set_result(r);
            }
            other => {
                let v = self.invoke_member(other, "get", vec![index], &comp.position)?;
                self.set_value(v);
            }
        }
        Ok(())
    }

    /// `new T[n]` with zeroed slots, or `new T[] { a, b }`.
    fn eval_array(&mut self, comp: &StatementComponent) -> InterpResult<()> {
        let owner = self.current_class();
        let element = self.resolve_type(&comp.arg, owner)?;
        let element_name = self.classes.instance(element).full_detailed_name().to_string();
        let ty = self.require_type(&format!("{element_name}[]"))?;
        let items = match (&comp.inner_code, comp.sub_component.as_deref()) {
            (Some(code), _) => {
                let mut items = Vec::with_capacity(code.main.len());
                for stmt in &code.main {
                    let value = self.eval_value(stmt)?;
                    let actual = value.type_of(&self.classes);
                    if !self.classes.can_hold(element, actual) {
                        return Err(RuntimeError::type_mismatch(
                            self.classes.type_name(actual),
                            self.classes.type_name(element),
                        ));
                    }
                    items.push(value);
                }
                items
            }
            (None, Some(len)) => {
                let len = match self.operand_value(len)? {
                    Value::Numeric(n) if n.as_i64() >= 0 => n.as_i64() as usize,
                    other => {
                        return Err(RuntimeError::fatal(format!("Invalid array length: {other}")));
                    }
                };
                vec![default_value(&self.classes, element); len]
            }
            (None, None) => Vec::new(),
        };
        let id = self.next_id();
        self.set_value(Value::Array(Rc::new(ArrayObject {
            id,
            ty,
            element,
            items: RefCell::new(items),
        })));
        Ok(())
    }

    // ================================================================
    // Pipes
    // ================================================================

    /// `target << value`
    fn eval_emitter(&mut self, comp: &StatementComponent) -> InterpResult<()> {
        let target = self
            .left()
            .ok_or_else(|| RuntimeError::fatal("Emit requires a target pipe"))?;
        if !target.is_pipe(&self.classes) {
            return Err(RuntimeError::fatal(format!(
                "Cannot emit into non-pipe type {}",
                self.classes.type_name(target.ty)
            )));
        }
        let source = required(comp.sub_component.as_deref(), "emitted value")?;
        let value = self.operand_value(source)?;
        self.write_ref(&target, value)?;
        self.set_result(target);
        Ok(())
    }

    /// `source >> type name`
    fn eval_consumer(&mut self, comp: &StatementComponent) -> InterpResult<()> {
        let value = self.left_value("consume")?;
        let (ty_name, name) = match comp.args.as_slice() {
            [ty, name] => (ty.as_str(), name.as_str()),
            _ => return Err(RuntimeError::fatal("Consumer requires a type and a name")),
        };
        let owner = self.current_class();
        let ty = self.resolve_type(ty_name, owner)?;
        let r = self.bind_local(name, ty, value)?;
        self.set_result(r);
        Ok(())
    }

    /// `source >> x -> expr`: drain a finite sequence through the lambda
    /// into a new in-memory sequence.
    fn eval_listener(&mut self, comp: &StatementComponent) -> InterpResult<()> {
        let source = self.left_value("listener")?;
        let body = required(comp.sub_statement.as_deref(), "listener body")?;
        let name = comp.arg.as_str();
        let position = comp.position.clone();
        let seq = self.sequence_of(source)?;
        let finite = self.invoke_member(seq.clone(), "finite", Vec::new(), &position)?;
        if !finite.to_bool() {
            return Err(RuntimeError::unimplemented("listening to an infinite sequence"));
        }
        let void = self.classes.primitives().void_t;
        let mut out = Vec::new();
        while self
            .invoke_member(seq.clone(), "hasNext", Vec::new(), &position)?
            .to_bool()
        {
            let item = self.invoke_member(seq.clone(), "next", Vec::new(), &position)?;
            let mut mapped = Value::Null;
            self.step_inside("lambda", Registers::DEFAULT, |vm| {
                vm.bind_local(name, void, item)?;
                mapped = vm.eval_value(body)?;
                Ok(())
            })?;
            out.push(mapped);
        }
        let seq = self.new_sequence("void", SequenceSource::Values(out))?;
        self.set_value(seq);
        Ok(())
    }
}

fn required<'a, T>(slot: Option<&'a T>, what: &str) -> InterpResult<&'a T> {
    slot.ok_or_else(|| RuntimeError::fatal(format!("Malformed bytecode: missing {what}")))
}

/// Zero for numeric types, null otherwise.
fn default_value(classes: &crate::model::ClassStore, ty: TypeId) -> Value {
    match numeric_mode(classes, ty) {
        Some(mode) => Value::Numeric(Numeric::from_i64(mode, 0)),
        None => Value::Null,
    }
}
