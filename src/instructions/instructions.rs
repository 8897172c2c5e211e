use std::collections::VecDeque;
use std::fmt;

use crate::cpu::Latencies;

pub type WordType = i32;
pub type AddressType = u32;
pub type ValueType = f64;

// Identifies the in-flight instruction (its ROB sequence id) that produces a value.
pub type Tag = u64;

// The number of registers in each register class.
pub const REGISTER_COUNT: u8 = 32;

// Width in bytes of a single instruction; the PC advances by this on every issue.
pub const INSTR_WIDTH: AddressType = 4;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub enum RegisterClass {
    INT,
    FP,
}

/// An architectural register name such as `R3` or `F12`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct Reg {
    pub class: RegisterClass,
    pub index: u8,
}

impl Reg {
    pub const fn int(index: u8) -> Reg {
        Reg { class: RegisterClass::INT, index }
    }

    pub const fn fp(index: u8) -> Reg {
        Reg { class: RegisterClass::FP, index }
    }

    pub fn is_int(&self) -> bool {
        self.class == RegisterClass::INT
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.class {
            RegisterClass::INT => write!(f, "R{}", self.index),
            RegisterClass::FP => write!(f, "F{}", self.index),
        }
    }
}

pub fn get_register(name: &str) -> Option<Reg> {
    let name_uppercased = name.trim().to_uppercase();
    let mut chars = name_uppercased.chars();

    let class = match chars.next() {
        Some('R') => RegisterClass::INT,
        Some('F') => RegisterClass::FP,
        _ => return None,
    };

    let digits = chars.as_str();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let index: u8 = digits.parse().ok()?;
    if index >= REGISTER_COUNT {
        return None;
    }
    Some(Reg { class, index })
}

/// The reservation station class an opcode is issued into.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum StationClass {
    Add,
    Mul,
    Load,
    Store,
}

impl StationClass {
    pub const ALL: [StationClass; 4] = [StationClass::Add, StationClass::Mul, StationClass::Load, StationClass::Store];

    pub fn name(&self) -> &'static str {
        match self {
            StationClass::Add => "Add",
            StationClass::Mul => "Mul",
            StationClass::Load => "Load",
            StationClass::Store => "Store",
        }
    }
}

#[allow(non_camel_case_types)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Opcode {
    DADDI,
    DSUBI,
    ADD_D,
    ADD_S,
    SUB_D,
    SUB_S,
    MUL_D,
    MUL_S,
    DIV_D,
    DIV_S,
    LW,
    LD,
    L_S,
    L_D,
    SW,
    SD,
    S_S,
    S_D,
    BEQ,
    BNE,
}

pub fn mnemonic(opcode: Opcode) -> &'static str {
    match opcode {
        Opcode::DADDI => "DADDI",
        Opcode::DSUBI => "DSUBI",
        Opcode::ADD_D => "ADD.D",
        Opcode::ADD_S => "ADD.S",
        Opcode::SUB_D => "SUB.D",
        Opcode::SUB_S => "SUB.S",
        Opcode::MUL_D => "MUL.D",
        Opcode::MUL_S => "MUL.S",
        Opcode::DIV_D => "DIV.D",
        Opcode::DIV_S => "DIV.S",
        Opcode::LW => "LW",
        Opcode::LD => "LD",
        Opcode::L_S => "L.S",
        Opcode::L_D => "L.D",
        Opcode::SW => "SW",
        Opcode::SD => "SD",
        Opcode::S_S => "S.S",
        Opcode::S_D => "S.D",
        Opcode::BEQ => "BEQ",
        Opcode::BNE => "BNE",
    }
}

pub fn get_opcode(mnemonic: &str) -> Option<Opcode> {
    let string = mnemonic.to_uppercase();
    let mnemonic_uppercased = string.as_str();

    match mnemonic_uppercased {
        "DADDI" => Some(Opcode::DADDI),
        "DSUBI" => Some(Opcode::DSUBI),
        "ADD.D" => Some(Opcode::ADD_D),
        "ADD.S" => Some(Opcode::ADD_S),
        "SUB.D" => Some(Opcode::SUB_D),
        "SUB.S" => Some(Opcode::SUB_S),
        "MUL.D" => Some(Opcode::MUL_D),
        "MUL.S" => Some(Opcode::MUL_S),
        "DIV.D" => Some(Opcode::DIV_D),
        "DIV.S" => Some(Opcode::DIV_S),
        "LW" => Some(Opcode::LW),
        "LD" => Some(Opcode::LD),
        "L.S" => Some(Opcode::L_S),
        "L.D" => Some(Opcode::L_D),
        "SW" => Some(Opcode::SW),
        "SD" => Some(Opcode::SD),
        "S.S" => Some(Opcode::S_S),
        "S.D" => Some(Opcode::S_D),
        "BEQ" => Some(Opcode::BEQ),
        "BNE" => Some(Opcode::BNE),
        _ => None,
    }
}

impl Opcode {
    pub fn station_class(&self) -> StationClass {
        match self {
            Opcode::DADDI | Opcode::DSUBI |
            Opcode::ADD_D | Opcode::ADD_S |
            Opcode::SUB_D | Opcode::SUB_S |
            Opcode::BEQ | Opcode::BNE => StationClass::Add,
            Opcode::MUL_D | Opcode::MUL_S |
            Opcode::DIV_D | Opcode::DIV_S => StationClass::Mul,
            Opcode::LW | Opcode::LD | Opcode::L_S | Opcode::L_D => StationClass::Load,
            Opcode::SW | Opcode::SD | Opcode::S_S | Opcode::S_D => StationClass::Store,
        }
    }

    /// The fixed execution latency of a non-memory opcode. Memory opcodes
    /// return `None`: their cost comes from the cache.
    pub fn latency(&self, latencies: &Latencies) -> Option<u32> {
        match self {
            Opcode::DADDI | Opcode::DSUBI => Some(latencies.int_alu),
            Opcode::ADD_D | Opcode::ADD_S |
            Opcode::SUB_D | Opcode::SUB_S => Some(latencies.add_sub),
            Opcode::MUL_D | Opcode::MUL_S => Some(latencies.mul),
            Opcode::DIV_D | Opcode::DIV_S => Some(latencies.div),
            Opcode::BEQ | Opcode::BNE => Some(latencies.branch),
            Opcode::LW | Opcode::LD | Opcode::L_S | Opcode::L_D |
            Opcode::SW | Opcode::SD | Opcode::S_S | Opcode::S_D => None,
        }
    }

    pub fn is_load(&self) -> bool {
        self.station_class() == StationClass::Load
    }

    pub fn is_store(&self) -> bool {
        self.station_class() == StationClass::Store
    }

    pub fn is_memory(&self) -> bool {
        self.is_load() || self.is_store()
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, Opcode::BEQ | Opcode::BNE)
    }

    // single precision arithmetic rounds its result through f32
    pub fn is_single(&self) -> bool {
        matches!(self, Opcode::ADD_S | Opcode::SUB_S | Opcode::MUL_S | Opcode::DIV_S)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", mnemonic(*self))
    }
}

/// A decoded instruction.
///
/// Operand placement per form:
/// - arithmetic: `dest`, `src1`, `src2`
/// - DADDI/DSUBI: `dest`, `src1`, `immediate`
/// - loads: `dest`, `src1` is the base register, `immediate` the offset
/// - stores: `src1` is the base register, `src2` the value register, `immediate` the offset
/// - branches: `src1`, `src2`, `immediate` counted in instructions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instr {
    pub opcode: Opcode,
    pub dest: Option<Reg>,
    pub src1: Option<Reg>,
    pub src2: Option<Reg>,
    pub immediate: i32,
    pub line: Option<usize>,
}

impl Instr {
    pub fn new(opcode: Opcode, dest: Option<Reg>, src1: Option<Reg>, src2: Option<Reg>, immediate: i32) -> Instr {
        Instr { opcode, dest, src1, src2, immediate, line: None }
    }

    pub fn arith(opcode: Opcode, dest: Reg, src1: Reg, src2: Reg) -> Instr {
        Instr::new(opcode, Some(dest), Some(src1), Some(src2), 0)
    }

    pub fn immediate(opcode: Opcode, dest: Reg, src: Reg, immediate: i32) -> Instr {
        Instr::new(opcode, Some(dest), Some(src), None, immediate)
    }

    pub fn load(opcode: Opcode, dest: Reg, offset: i32, base: Reg) -> Instr {
        Instr::new(opcode, Some(dest), Some(base), None, offset)
    }

    pub fn store(opcode: Opcode, value: Reg, offset: i32, base: Reg) -> Instr {
        Instr::new(opcode, None, Some(base), Some(value), offset)
    }

    pub fn branch(opcode: Opcode, src1: Reg, src2: Reg, offset: i32) -> Instr {
        Instr::new(opcode, None, Some(src1), Some(src2), offset)
    }

    pub fn with_line(mut self, line: usize) -> Instr {
        self.line = Some(line);
        self
    }
}

fn fmt_reg(reg: Option<Reg>) -> String {
    match reg {
        Some(reg) => reg.to_string(),
        None => String::from("-"),
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", mnemonic(self.opcode))?;

        match self.opcode {
            Opcode::ADD_D | Opcode::ADD_S |
            Opcode::SUB_D | Opcode::SUB_S |
            Opcode::MUL_D | Opcode::MUL_S |
            Opcode::DIV_D | Opcode::DIV_S =>
                write!(f, "{}, {}, {}", fmt_reg(self.dest), fmt_reg(self.src1), fmt_reg(self.src2))?,
            Opcode::DADDI | Opcode::DSUBI =>
                write!(f, "{}, {}, {}", fmt_reg(self.dest), fmt_reg(self.src1), self.immediate)?,
            Opcode::LW | Opcode::LD | Opcode::L_S | Opcode::L_D =>
                write!(f, "{}, {}({})", fmt_reg(self.dest), self.immediate, fmt_reg(self.src1))?,
            Opcode::SW | Opcode::SD | Opcode::S_S | Opcode::S_D =>
                write!(f, "{}, {}({})", fmt_reg(self.src2), self.immediate, fmt_reg(self.src1))?,
            Opcode::BEQ | Opcode::BNE =>
                write!(f, "{}, {}, {}", fmt_reg(self.src1), fmt_reg(self.src2), self.immediate)?,
        }

        if let Some(line) = self.line {
            write!(f, " ; line {}", line)?;
        }

        Ok(())
    }
}

// The InstrQueue holds the instructions that are waiting to be issued, in program order.
pub struct InstrQueue {
    instructions: VecDeque<Instr>,
}

impl InstrQueue {
    pub fn new() -> Self {
        InstrQueue { instructions: VecDeque::new() }
    }

    pub fn size(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn enqueue(&mut self, instr: Instr) {
        self.instructions.push_back(instr);
    }

    pub fn peek(&self) -> Option<&Instr> {
        self.instructions.front()
    }

    pub fn dequeue(&mut self) -> Option<Instr> {
        self.instructions.pop_front()
    }

    // Discards everything still waiting; returns the number of discarded instructions.
    pub fn flush(&mut self) -> usize {
        let discarded = self.instructions.len();
        self.instructions.clear();
        discarded
    }
}

impl Default for InstrQueue {
    fn default() -> Self {
        Self::new()
    }
}
