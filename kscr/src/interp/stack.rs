//! Register-bank execution stack
//!
//! Each frame carries seven result registers. `ALP`, `BET` and `DEL` fall
//! back to the same register of the frames below when unset; `EPS`, `TAU`,
//! `PHI` and `OMG` are local to their frame. Frames are pushed either as
//! output children (same context, different default register) or as
//! context frames opened by the interpreter's step helpers.

use super::store::{ObjRef, ScopeId};
use crate::model::TypeId;
use crate::span::SourcePosition;
use std::fmt;
use std::ops::BitOr;
use std::rc::Rc;

/// Mask of registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Registers(u8);

impl Registers {
    /// The current frame's output register(s)
    pub const DEFAULT: Registers = Registers(0);
    pub const ALP: Registers = Registers(0b0000_0001);
    pub const BET: Registers = Registers(0b0000_0010);
    pub const DEL: Registers = Registers(0b0000_0100);
    pub const EPS: Registers = Registers(0b0000_1000);
    pub const TAU: Registers = Registers(0b0001_0000);
    pub const PHI: Registers = Registers(0b0010_0000);
    pub const OMG: Registers = Registers(0b0100_0000);
    pub const TRI: Registers = Registers(0b0000_0111);
    pub const ALL: Registers = Registers(0b0111_1111);
    pub const NONE: Registers = Registers(0b1000_0000);

    const FALLBACK: u8 = Self::TRI.0;

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Registers) -> bool {
        self.0 & other.0 == other.0
    }

    /// Slot indices selected by this mask.
    fn slots(self) -> impl Iterator<Item = usize> {
        (0..7).filter(move |i| self.0 & (1 << i) != 0)
    }

    /// Index of the lowest selected slot.
    fn first_slot(self) -> Option<usize> {
        self.slots().next()
    }
}

impl BitOr for Registers {
    type Output = Registers;

    fn bitor(self, rhs: Registers) -> Registers {
        Registers(self.0 | rhs.0)
    }
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [&str; 7] = ["Alp", "Bet", "Del", "Eps", "Tau", "Phi", "Omg"];
        if self.0 == 0 {
            return f.write_str("Default");
        }
        let names: Vec<&str> = self.slots().map(|i| NAMES[i]).collect();
        f.write_str(&names.join("|"))
    }
}

/// Control state of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Normal,
    Return,
    Throw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Root,
    /// Method or property body with its own receiver
    Into,
    /// Block scope inside the current receiver
    Inside,
}

/// What a context frame establishes: a local label, receiver and scope.
#[derive(Debug)]
pub struct Context {
    pub local: String,
    pub position: SourcePosition,
    pub this: Option<ObjRef>,
    /// Type the receiver is resolved against
    pub class: Option<TypeId>,
    pub scope: ScopeId,
    pub kind: FrameKind,
}

#[derive(Debug)]
pub struct Frame {
    pub output: Registers,
    registers: [Option<ObjRef>; 7],
    pub state: State,
    pub context: Rc<Context>,
}

impl Frame {
    fn new(context: Rc<Context>, output: Registers) -> Self {
        Self {
            output,
            registers: Default::default(),
            state: State::Normal,
            context,
        }
    }

    /// Frame-local read, without parent fallback.
    pub fn register(&self, reg: Registers) -> Option<ObjRef> {
        let reg = if reg == Registers::DEFAULT { self.output } else { reg };
        reg.first_slot().and_then(|i| self.registers[i].clone())
    }
}

#[derive(Debug)]
pub struct Stack {
    frames: Vec<Frame>,
}

impl Stack {
    pub fn new(root: Context) -> Self {
        Self {
            frames: vec![Frame::new(Rc::new(root), Registers::ALP)],
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    fn top(&self) -> &Frame {
        // the root frame is never popped
        &self.frames[self.frames.len() - 1]
    }

    fn top_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    pub fn context(&self) -> &Rc<Context> {
        &self.top().context
    }

    pub fn this(&self) -> Option<ObjRef> {
        self.top().context.this.clone()
    }

    pub fn scope(&self) -> ScopeId {
        self.top().context.scope
    }

    pub fn state(&self) -> State {
        self.top().state
    }

    pub fn set_state(&mut self, state: State) {
        self.top_mut().state = state;
    }

    /// Read a single register of the top frame, falling back to lower
    /// frames for `ALP`, `BET` and `DEL`. `NONE` reads the receiver.
    pub fn get(&self, reg: Registers) -> Option<ObjRef> {
        let top = self.top();
        let reg = if reg == Registers::DEFAULT { top.output } else { reg };
        if reg == Registers::NONE {
            return self.this();
        }
        let slot = reg.first_slot()?;
        if Registers::FALLBACK & (1 << slot) == 0 {
            return top.registers[slot].clone();
        }
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.registers[slot].clone())
    }

    /// Read a register of the top frame only.
    pub fn local(&self, reg: Registers) -> Option<ObjRef> {
        self.top().register(reg)
    }

    /// Write every register in the mask of the top frame.
    pub fn set(&mut self, reg: Registers, value: Option<ObjRef>) {
        let top = self.top_mut();
        let reg = if reg == Registers::DEFAULT { top.output } else { reg };
        for slot in reg.slots() {
            top.registers[slot] = value.clone();
        }
    }

    /// Push a child sharing the current context, writing to `output`.
    pub fn push_output(&mut self, output: Registers) {
        let context = self.top().context.clone();
        self.frames.push(Frame::new(context, output));
    }

    /// Push a frame that establishes `context`.
    pub fn push_context(&mut self, context: Context) -> Rc<Context> {
        let context = Rc::new(context);
        self.frames.push(Frame::new(context.clone(), Registers::ALP));
        context
    }

    /// Pop the top frame. The root frame stays.
    pub fn pop(&mut self) -> Option<Frame> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    /// Copy `mask` registers of a popped `child` into the top frame; unset
    /// child registers leave the parent's value alone.
    pub fn hand_off(&mut self, child: &Frame, mask: Registers) {
        let top = self.top_mut();
        for slot in mask.slots() {
            if let Some(v) = &child.registers[slot] {
                top.registers[slot] = Some(v.clone());
            }
        }
    }

    /// Carry a non-normal state of `child` (and its `OMG`) into the top frame.
    pub fn copy_state(&mut self, child: &Frame) {
        if child.state != State::Normal {
            let top = self.top_mut();
            top.state = child.state;
            top.registers[6] = child.registers[6].clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::store::{ObjectRef, ObjectStore};
    use crate::interp::value::Value;
    use crate::model::TypeId;

    fn stack() -> Stack {
        let mut store = ObjectStore::new();
        Stack::new(Context {
            local: "root".into(),
            position: SourcePosition::system(),
            this: None,
            class: None,
            scope: store.open_scope(None),
            kind: FrameKind::Root,
        })
    }

    fn num(v: i32) -> ObjRef {
        ObjectRef::constant(TypeId::default(), Value::int(v))
    }

    #[test]
    fn test_alp_falls_back_to_parent() {
        let mut s = stack();
        s.set(Registers::ALP, Some(num(1)));
        s.push_output(Registers::BET);
        let alp = s.get(Registers::ALP).map(|r| r.value().as_numeric());
        assert_eq!(alp, Some(Some(crate::interp::numeric::Numeric::Int(1))));
    }

    #[test]
    fn test_tau_does_not_fall_back() {
        let mut s = stack();
        s.set(Registers::TAU, Some(num(1)));
        s.push_output(Registers::ALP);
        assert!(s.get(Registers::TAU).is_none());
    }

    #[test]
    fn test_default_maps_to_output() {
        let mut s = stack();
        s.push_output(Registers::PHI);
        s.set(Registers::DEFAULT, Some(num(3)));
        assert!(s.get(Registers::PHI).is_some());
        let frame = s.pop().unwrap();
        assert!(frame.register(Registers::DEFAULT).is_some());
        assert!(frame.register(Registers::ALP).is_none());
    }

    #[test]
    fn test_set_mask_writes_each_register() {
        let mut s = stack();
        s.set(Registers::ALP | Registers::OMG, Some(num(7)));
        assert!(s.get(Registers::ALP).is_some());
        assert!(s.get(Registers::OMG).is_some());
        assert!(s.get(Registers::BET).is_none());
    }

    #[test]
    fn test_local_read_skips_parent() {
        let mut s = stack();
        s.set(Registers::ALP, Some(num(1)));
        s.push_output(Registers::ALP);
        assert!(s.local(Registers::DEFAULT).is_none());
        assert!(s.get(Registers::DEFAULT).is_some());
    }

    #[test]
    fn test_root_frame_is_never_popped() {
        let mut s = stack();
        assert!(s.pop().is_none());
        assert_eq!(s.depth(), 1);
    }

    #[test]
    fn test_copy_state_carries_omega() {
        let mut s = stack();
        s.push_output(Registers::ALP);
        s.set(Registers::OMG, Some(num(9)));
        s.set_state(State::Return);
        let child = s.pop().unwrap();
        s.copy_state(&child);
        assert_eq!(s.state(), State::Return);
        assert!(s.get(Registers::OMG).is_some());
    }

    #[test]
    fn test_registers_display() {
        assert_eq!((Registers::ALP | Registers::OMG).to_string(), "Alp|Omg");
        assert_eq!(Registers::DEFAULT.to_string(), "Default");
    }
}
