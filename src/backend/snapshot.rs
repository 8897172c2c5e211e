// Read-only views of the engine state, for front-ends that render tables.

use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub struct StationSnapshot {
    pub name: String,
    pub busy: bool,
    pub opcode: String,
    pub vj: String,
    pub vk: String,
    pub qj: String,
    pub qk: String,
    pub remaining: u32,
}

impl fmt::Display for StationSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<7} {:<5} {:<6} Vj={:<8} Vk={:<8} Qj={:<6} Qk={:<6} remaining={}",
               self.name,
               if self.busy { "busy" } else { "idle" },
               self.opcode,
               self.vj,
               self.vk,
               self.qj,
               self.qk,
               self.remaining)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RobSnapshot {
    pub entry: u64,
    pub instr: String,
    pub dest: String,
    pub value: String,
    pub ready: bool,
}

impl fmt::Display for RobSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ROB{:<4} {:<6} dest={:<6} value={:<10} ready={}",
               self.entry, self.instr, self.dest, self.value, self.ready)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RegisterSnapshot {
    pub name: String,
    pub value: f64,
    pub tag: Option<String>,
}

impl fmt::Display for RegisterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{:<4} = {} (waiting on {})", self.name, self.value, tag),
            None => write!(f, "{:<4} = {}", self.name, self.value),
        }
    }
}
