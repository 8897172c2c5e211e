use std::collections::VecDeque;
use std::fmt;

use crate::instructions::instructions::{AddressType, Opcode, Reg, Tag, ValueType, WordType};

// PC values are kept signed so a backwards branch can never underflow.
pub type PcType = i64;

#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) enum RobDest {
    Register(Reg),
    Store,
    Branch,
    // an instruction that computes a value without a destination register
    Discard,
}

impl fmt::Display for RobDest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RobDest::Register(reg) => write!(f, "{}", reg),
            RobDest::Store => write!(f, "MEM"),
            RobDest::Branch => write!(f, "BRANCH"),
            RobDest::Discard => write!(f, "-"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) enum RobValue {
    Int(i64),
    Float(f64),
}

impl RobValue {
    pub(crate) fn for_dest(dest: Option<Reg>, value: ValueType) -> RobValue {
        match dest {
            Some(reg) if reg.is_int() => RobValue::Int(value as i64),
            _ => RobValue::Float(value),
        }
    }

    pub(crate) fn as_f64(&self) -> ValueType {
        match self {
            RobValue::Int(value) => *value as ValueType,
            RobValue::Float(value) => *value,
        }
    }
}

impl fmt::Display for RobValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RobValue::Int(value) => write!(f, "{}", value),
            RobValue::Float(value) => write!(f, "{}", value),
        }
    }
}

pub(crate) struct ROBSlot {
    pub(crate) tag: Tag,
    pub(crate) opcode: Opcode,
    pub(crate) dest: RobDest,
    pub(crate) ready: bool,
    pub(crate) value: Option<RobValue>,
    pub(crate) store_address: Option<AddressType>,
    pub(crate) store_value: Option<WordType>,
    pub(crate) branch_operands: Option<(ValueType, ValueType)>,
    pub(crate) immediate: i32,
    pub(crate) issue_pc: PcType,
}

impl ROBSlot {
    pub(crate) fn new(tag: Tag, opcode: Opcode, dest: RobDest, immediate: i32, issue_pc: PcType) -> ROBSlot {
        ROBSlot {
            tag,
            opcode,
            dest,
            ready: false,
            value: None,
            store_address: None,
            store_value: None,
            branch_operands: None,
            immediate,
            issue_pc,
        }
    }
}

/// The reorder buffer. Slots are appended in program order at issue and
/// only ever leave from the head, so instructions retire in order no matter
/// in which order they complete.
pub(crate) struct ROB {
    capacity: u16,
    slots: VecDeque<ROBSlot>,
}

impl ROB {
    pub(crate) fn new(capacity: u16) -> Self {
        Self { capacity, slots: VecDeque::with_capacity(capacity as usize) }
    }

    pub(crate) fn size(&self) -> u16 {
        self.slots.len() as u16
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn has_space(&self) -> bool {
        self.capacity > self.size()
    }

    pub(crate) fn allocate(&mut self, slot: ROBSlot) {
        assert!(self.has_space(), "ROB: Can't allocate if no space.");
        debug_assert!(self.slots.back().map_or(true, |last| last.tag < slot.tag), "ROB: tags must be issued in order");
        self.slots.push_back(slot);
    }

    pub(crate) fn head(&self) -> Option<&ROBSlot> {
        self.slots.front()
    }

    pub(crate) fn head_is_ready(&self) -> bool {
        self.head().map_or(false, |slot| slot.ready)
    }

    // Removes the head, but only if it is ready to retire.
    pub(crate) fn pop_ready(&mut self) -> Option<ROBSlot> {
        if !self.head_is_ready() {
            return None;
        }
        self.slots.pop_front()
    }

    fn position(&self, tag: Tag) -> Option<usize> {
        let head_tag = self.head()?.tag;
        if tag < head_tag {
            return None;
        }
        // tags are handed out consecutively, so the offset from the head is the position
        let index = (tag - head_tag) as usize;
        match self.slots.get(index) {
            Some(slot) if slot.tag == tag => Some(index),
            _ => self.slots.iter().position(|slot| slot.tag == tag),
        }
    }

    pub(crate) fn get(&self, tag: Tag) -> Option<&ROBSlot> {
        let index = self.position(tag)?;
        self.slots.get(index)
    }

    pub(crate) fn get_mut(&mut self, tag: Tag) -> Option<&mut ROBSlot> {
        let index = self.position(tag)?;
        self.slots.get_mut(index)
    }

    pub(crate) fn has_pending_branch(&self) -> bool {
        self.slots.iter().any(|slot| slot.dest == RobDest::Branch)
    }

    pub(crate) fn flush(&mut self) {
        self.slots.clear();
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item=&ROBSlot> {
        self.slots.iter()
    }
}
