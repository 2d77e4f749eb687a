//! Static output-type inference
//!
//! Answers "what type would this statement produce" without evaluating it,
//! following the same (role, kind) dispatch as the evaluator. `None` means
//! the type depends on runtime state (e.g. a local variable).

use super::numeric::Numeric;
use super::value::Value;
use crate::bytecode::{BytecodeKind, ComponentRole, Operator, Statement, StatementComponent};
use crate::model::{ClassMember, ClassStore, TypeId};

/// Type of the value `stmt` leaves in its result register.
pub fn statement_type(classes: &ClassStore, stmt: &Statement, this: Option<TypeId>) -> Option<TypeId> {
    let mut current = None;
    for comp in &stmt.main {
        current = chain_type(classes, comp, current, this);
    }
    current
}

fn chain_type(
    classes: &ClassStore,
    comp: &StatementComponent,
    left: Option<TypeId>,
    this: Option<TypeId>,
) -> Option<TypeId> {
    let ty = component_type(classes, comp, left, this);
    match comp.post_component.as_deref() {
        Some(post) => chain_type(classes, post, ty, this),
        None => ty,
    }
}

/// Type produced by one component given the type of its left operand.
pub fn component_type(
    classes: &ClassStore,
    comp: &StatementComponent,
    left: Option<TypeId>,
    this: Option<TypeId>,
) -> Option<TypeId> {
    use BytecodeKind as K;
    use ComponentRole as R;

    let p = classes.primitives();
    match (comp.role, comp.kind) {
        (R::Emitter, _) => left,
        (R::Consumer, _) => comp.args.first().and_then(|t| classes.lookup_type(t)),
        (R::Pipe, K::Lambda) => classes.lookup_type("Sequence<void>"),

        (_, K::LiteralNumeric) => Numeric::compile(&comp.arg)
            .ok()
            .map(|n| Value::Numeric(n).type_of(classes)),
        (_, K::LiteralString) => Some(p.str_t),
        (_, K::LiteralTrue | K::LiteralFalse | K::Instanceof) => Some(p.num_byte),
        (_, K::Null) => Some(p.void_t),
        (_, K::LiteralRange) => Some(p.range_t),
        (_, K::Parentheses) => comp
            .sub_statement
            .as_deref()
            .and_then(|s| statement_type(classes, s, this)),
        (_, K::TypeExpression) => Some(p.type_t),
        (_, K::StdioExpression) => Some(p.pipe_t),
        (R::Provider, K::Undefined) => this,
        (_, K::ExpressionVariable) => None,
        (R::Declaration, K::Declaration | K::Assignment) => {
            comp.args.first().and_then(|t| classes.lookup_type(t))
        }
        (R::Setter, K::Assignment) => left,
        (R::Operator, K::Operator) => operator_type(classes, comp, left, this),
        (_, K::ConstructorCall) => classes.lookup_type(&comp.arg),
        (_, K::Call) => {
            let receiver = left.or(this)?;
            match classes.find_member(receiver, &comp.arg)? {
                ClassMember::Method(m) => classes.lookup_type(&m.return_type),
                ClassMember::Property(prop) => classes.lookup_type(&prop.ty),
            }
        }
        (_, K::Indexer) => left.and_then(|t| classes.instance(t).first_type_argument()),
        (_, K::ArrayConstructor) => classes.lookup_type(&format!("{}[]", comp.arg)),
        _ => None,
    }
}

fn operator_type(
    classes: &ClassStore,
    comp: &StatementComponent,
    left: Option<TypeId>,
    this: Option<TypeId>,
) -> Option<TypeId> {
    let p = classes.primitives();
    let op = comp.operator();
    let base = op.base();
    let boolean = [
        Operator::EQUALS,
        Operator::NOT_EQUALS,
        Operator::GREATER,
        Operator::GREATER_EQ,
        Operator::LESSER,
        Operator::LESSER_EQ,
        Operator::LOGIC_AND,
        Operator::LOGIC_OR,
        Operator::LOGIC_NOT,
    ];
    if boolean.contains(&base) {
        return Some(p.num_byte);
    }
    if !op.is_binary() && !op.is_compound() {
        return left;
    }
    let right = comp
        .sub_component
        .as_deref()
        .and_then(|c| chain_type(classes, c, None, this));
    if base == Operator::PLUS && (left == Some(p.str_t) || right == Some(p.str_t)) {
        return Some(p.str_t);
    }
    if base == Operator::NULL_FALLBACK {
        return left.or(right);
    }
    left
}
