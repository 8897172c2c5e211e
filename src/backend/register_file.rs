use crate::error::SimError;
use crate::instructions::instructions::{get_register, Reg, RegisterClass, Tag, ValueType, REGISTER_COUNT};

/// Integer registers hold whole numbers: values written to or read from them
/// are truncated toward zero. Floating registers keep full precision.
pub(crate) fn coerce(reg: Reg, value: ValueType) -> ValueType {
    if reg.is_int() {
        value.trunc()
    } else {
        value
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegEntry {
    pub value: ValueType,
    // the ROB tag of the in-flight instruction that will write this register next
    pub tag: Option<Tag>,
}

impl RegEntry {
    fn reset(&mut self) {
        self.value = 0.0;
        self.tag = None;
    }
}

/// The architectural register file: `R0..R31` and `F0..F31`.
pub(crate) struct RegisterFile {
    int_entries: Vec<RegEntry>,
    fp_entries: Vec<RegEntry>,
}

impl RegisterFile {
    pub(crate) fn new() -> RegisterFile {
        let empty = RegEntry { value: 0.0, tag: None };
        RegisterFile {
            int_entries: vec![empty; REGISTER_COUNT as usize],
            fp_entries: vec![empty; REGISTER_COUNT as usize],
        }
    }

    pub(crate) fn lookup(name: &str) -> Result<Reg, SimError> {
        get_register(name).ok_or_else(|| SimError::UnknownRegister(name.to_string()))
    }

    fn entry(&self, reg: Reg) -> &RegEntry {
        match reg.class {
            RegisterClass::INT => &self.int_entries[reg.index as usize],
            RegisterClass::FP => &self.fp_entries[reg.index as usize],
        }
    }

    fn entry_mut(&mut self, reg: Reg) -> &mut RegEntry {
        match reg.class {
            RegisterClass::INT => &mut self.int_entries[reg.index as usize],
            RegisterClass::FP => &mut self.fp_entries[reg.index as usize],
        }
    }

    pub(crate) fn get(&self, name: &str) -> Result<RegEntry, SimError> {
        let reg = Self::lookup(name)?;
        Ok(*self.entry(reg))
    }

    pub(crate) fn value(&self, reg: Reg) -> ValueType {
        coerce(reg, self.entry(reg).value)
    }

    pub(crate) fn set_value(&mut self, reg: Reg, value: ValueType) {
        self.entry_mut(reg).value = coerce(reg, value);
    }

    pub(crate) fn tag(&self, reg: Reg) -> Option<Tag> {
        self.entry(reg).tag
    }

    pub(crate) fn set_tag(&mut self, reg: Reg, tag: Tag) {
        self.entry_mut(reg).tag = Some(tag);
    }

    pub(crate) fn clear_tag(&mut self, reg: Reg) {
        self.entry_mut(reg).tag = None;
    }

    pub(crate) fn reset(&mut self) {
        for entry in self.int_entries.iter_mut().chain(self.fp_entries.iter_mut()) {
            entry.reset();
        }
    }

    // All registers, integer registers first.
    pub(crate) fn iter(&self) -> impl Iterator<Item=(Reg, &RegEntry)> {
        let ints = self.int_entries.iter().enumerate().map(|(i, e)| (Reg::int(i as u8), e));
        let fps = self.fp_entries.iter().enumerate().map(|(i, e)| (Reg::fp(i as u8), e));
        ints.chain(fps)
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}
