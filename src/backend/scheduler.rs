use log::{debug, info};

use crate::backend::execution_unit::{branch_taken, evaluate};
use crate::backend::register_file::{coerce, RegEntry, RegisterFile};
use crate::backend::reorder_buffer::{PcType, ROB, ROBSlot, RobDest, RobValue};
use crate::backend::reservation_station::{RS, RSPool, RSState, SourceOperand, StationRef};
use crate::backend::snapshot::{RegisterSnapshot, RobSnapshot, StationSnapshot};
use crate::cpu::{PerfCounters, SimConfig, Trace};
use crate::error::SimError;
use crate::instructions::instructions::{AddressType, Instr, INSTR_WIDTH, InstrQueue, mnemonic, Reg, Tag, ValueType, WordType};
use crate::memory_subsystem::memory_subsystem::MemorySubsystem;

/// Notifications produced while advancing a cycle.
#[derive(Clone, Debug, PartialEq)]
pub enum SimEvent {
    CacheMiss { address: AddressType },
    AddressClash { station: String, address: AddressType, reason: String },
}

/// The Tomasulo engine. Owns every piece of mutable machine state and
/// advances it one clock cycle per `step`.
pub struct Scheduler {
    config: SimConfig,
    trace: Trace,
    initial_registers: Vec<(Reg, ValueType)>,
    instr_queue: InstrQueue,
    reg_file: RegisterFile,
    rs_pool: RSPool,
    rob: ROB,
    memory_subsystem: MemorySubsystem,
    pc: PcType,
    cycle: u64,
    next_tag: Tag,
    perf_counters: PerfCounters,
}

impl Scheduler {
    pub fn new(config: &SimConfig) -> Result<Scheduler, SimError> {
        config.validate()?;

        let mut initial_registers = Vec::with_capacity(config.registers.len());
        for (name, value) in &config.registers {
            initial_registers.push((RegisterFile::lookup(name)?, *value));
        }

        let mut scheduler = Scheduler {
            config: config.clone(),
            trace: config.trace.clone(),
            initial_registers,
            instr_queue: InstrQueue::new(),
            reg_file: RegisterFile::new(),
            rs_pool: RSPool::new(&config.stations),
            rob: ROB::new(config.rob_capacity),
            memory_subsystem: MemorySubsystem::new(config),
            pc: 0,
            cycle: 0,
            next_tag: 0,
            perf_counters: PerfCounters::default(),
        };
        scheduler.apply_initial_registers();
        Ok(scheduler)
    }

    fn apply_initial_registers(&mut self) {
        for (reg, value) in &self.initial_registers {
            self.reg_file.set_value(*reg, *value);
        }
    }

    /// Replaces the instructions waiting to be issued and restarts the PC and clock.
    pub fn load_program(&mut self, program: Vec<Instr>) {
        self.instr_queue.flush();
        for instr in program {
            self.instr_queue.enqueue(instr);
        }
        self.pc = 0;
        self.cycle = 0;
    }

    /// Brings the machine back to its configured initial state.
    pub fn reset(&mut self) {
        self.instr_queue.flush();
        self.rs_pool.flush();
        self.rob.flush();
        self.reg_file.reset();
        self.memory_subsystem.init(&self.config);
        self.pc = 0;
        self.cycle = 0;
        self.next_tag = 0;
        self.perf_counters = PerfCounters::default();
        self.apply_initial_registers();
    }

    /// Advances exactly one clock cycle: commit, writeback, execute, issue.
    pub fn step(&mut self) -> Vec<SimEvent> {
        let mut events = Vec::new();
        self.cycle += 1;
        self.perf_counters.cycle_cnt += 1;

        self.cycle_commit();
        self.cycle_writeback();
        self.cycle_execute(&mut events);
        self.cycle_issue();

        // stations freed by writeback become allocatable from the next cycle on
        self.rs_pool.release_drained();
        events
    }

    pub fn is_finished(&self) -> bool {
        self.instr_queue.is_empty() && self.rob.is_empty() && !self.rs_pool.has_busy()
    }

    fn cycle_commit(&mut self) {
        let slot = match self.rob.pop_ready() {
            Some(slot) => slot,
            None => return,
        };

        match slot.dest {
            RobDest::Store => {
                if let (Some(addr), Some(value)) = (slot.store_address, slot.store_value) {
                    self.memory_subsystem.store_word(addr, value);
                    if self.trace.commit {
                        info!("Commit ROB{} {}: MEM[{}] = {}", slot.tag, mnemonic(slot.opcode), addr, value);
                    }
                }
            }
            RobDest::Register(reg) => {
                let value = slot.value.map_or(0.0, |v| v.as_f64());
                // a newer renamer of the same register owns its future value
                if self.reg_file.tag(reg) == Some(slot.tag) {
                    self.reg_file.set_value(reg, value);
                    self.reg_file.clear_tag(reg);
                    if self.trace.commit {
                        info!("Commit ROB{} {}: {} = {}", slot.tag, mnemonic(slot.opcode), reg, value);
                    }
                } else if self.trace.commit {
                    info!("Commit ROB{} {}: {} already renamed, value {} dropped", slot.tag, mnemonic(slot.opcode), reg, value);
                }
            }
            RobDest::Branch => {
                let (vj, vk) = slot.branch_operands.unwrap_or((0.0, 0.0));
                if branch_taken(slot.opcode, vj, vk) {
                    let target = slot.issue_pc + INSTR_WIDTH as PcType + slot.immediate as PcType * INSTR_WIDTH as PcType;
                    let discarded = self.instr_queue.flush();
                    self.pc = target;
                    self.perf_counters.branch_taken_cnt += 1;
                    self.perf_counters.flushed_cnt += discarded as u64;
                    if self.trace.commit {
                        info!("Commit ROB{} {}: taken, PC = {}, {} queued instructions discarded", slot.tag, mnemonic(slot.opcode), target, discarded);
                    }
                } else if self.trace.commit {
                    info!("Commit ROB{} {}: not taken", slot.tag, mnemonic(slot.opcode));
                }
            }
            RobDest::Discard => {
                if self.trace.commit {
                    info!("Commit ROB{} {}", slot.tag, mnemonic(slot.opcode));
                }
            }
        }

        self.perf_counters.commit_cnt += 1;
    }

    // Stations whose state matches, oldest first.
    fn stations_in_program_order(&self, filter: impl Fn(&RS) -> bool) -> Vec<(Tag, StationRef)> {
        let mut stations: Vec<(Tag, StationRef)> = self.rs_pool.iter()
            .filter(|(_, rs)| filter(*rs))
            .filter_map(|(station, rs)| rs.rob_tag.map(|tag| (tag, station)))
            .collect();
        stations.sort_by_key(|(tag, _)| *tag);
        stations
    }

    fn cycle_writeback(&mut self) {
        let finished = self.stations_in_program_order(|rs| rs.is_busy() && rs.started && rs.result_ready);

        for (tag, station) in finished {
            let rs = self.rs_pool.get(station);
            let opcode = match rs.opcode {
                Some(opcode) => opcode,
                None => continue,
            };
            debug_assert!(rs.operands_ready(), "{} finished with unresolved operands", station);
            let vj = rs.source[0].value().unwrap_or(0.0);
            let vk = rs.source[1].value().unwrap_or(0.0);
            let dest = rs.dest;
            let immediate = rs.immediate;
            let effective_address = rs.effective_address;

            let broadcast = if opcode.is_load() {
                let addr = effective_address.unwrap_or(0);
                let word = self.memory_subsystem.load_word(addr);
                Some(match dest {
                    Some(reg) => coerce(reg, word as ValueType),
                    None => word as ValueType,
                })
            } else if opcode.is_store() {
                if let Some(slot) = self.rob.get_mut(tag) {
                    slot.store_address = effective_address;
                    // the saturating float to int cast truncates toward zero
                    slot.store_value = Some(vk as WordType);
                }
                None
            } else if opcode.is_branch() {
                if let Some(slot) = self.rob.get_mut(tag) {
                    slot.branch_operands = Some((vj, vk));
                }
                None
            } else {
                evaluate(opcode, vj, vk, immediate).map(|value| match dest {
                    Some(reg) => coerce(reg, value),
                    None => value,
                })
            };

            if let Some(slot) = self.rob.get_mut(tag) {
                slot.value = broadcast.map(|value| RobValue::for_dest(dest, value));
                slot.ready = true;
            }

            if self.trace.writeback {
                match broadcast {
                    Some(value) => info!("Writeback {} ROB{} {} = {}", station, tag, mnemonic(opcode), value),
                    None => info!("Writeback {} ROB{} {}", station, tag, mnemonic(opcode)),
                }
            }

            if let Some(value) = broadcast {
                self.cdb_broadcast(tag, value);
            }

            self.rs_pool.get_mut(station).state = RSState::DRAINED;
            self.perf_counters.writeback_cnt += 1;
        }
    }

    // Every station waiting on tag picks up the value.
    fn cdb_broadcast(&mut self, tag: Tag, value: ValueType) {
        let waiting = self.stations_in_program_order(|rs| {
            rs.is_busy() && rs.source.iter().any(|s| *s == SourceOperand::Pending(tag))
        });

        for (_, station) in waiting {
            let rs = self.rs_pool.get_mut(station);
            for source in rs.source.iter_mut() {
                if *source == SourceOperand::Pending(tag) {
                    *source = SourceOperand::Value(value);
                }
            }
        }
    }

    fn cycle_execute(&mut self, events: &mut Vec<SimEvent>) {
        self.resolve_effective_addresses();

        let executing = self.stations_in_program_order(|rs| rs.is_busy() && !rs.result_ready && rs.operands_ready());

        for (tag, station) in executing {
            let rs = self.rs_pool.get_mut(station);
            if rs.started {
                rs.remaining = rs.remaining.saturating_sub(1);
                rs.result_ready = rs.remaining == 0;
                continue;
            }

            let opcode = match rs.opcode {
                Some(opcode) => opcode,
                None => continue,
            };

            let cycles = match opcode.latency(&self.config.latencies) {
                Some(cycles) => cycles,
                None => {
                    let addr = match rs.effective_address {
                        Some(addr) => addr,
                        None => continue,
                    };

                    if let Some(reason) = self.find_address_clash(tag, addr) {
                        debug!("Address clash {} at {}: {}", station, addr, reason);
                        self.perf_counters.address_clash_cnt += 1;
                        events.push(SimEvent::AddressClash { station: station.to_string(), address: addr, reason });
                        continue;
                    }

                    let timing = self.memory_subsystem.begin_access(addr);
                    if timing.hit {
                        self.perf_counters.cache_hit_cnt += 1;
                    } else {
                        self.perf_counters.cache_miss_cnt += 1;
                        events.push(SimEvent::CacheMiss { address: addr });
                    }
                    timing.cycles
                }
            };

            // the first execution cycle counts towards the latency
            let rs = self.rs_pool.get_mut(station);
            rs.started = true;
            rs.remaining = cycles.saturating_sub(1);
            rs.result_ready = rs.remaining == 0;
            self.perf_counters.execute_cnt += 1;

            if self.trace.execute {
                info!("Execute {} ROB{} {} ({} cycles)", station, tag, mnemonic(opcode), cycles);
            }
        }
    }

    // A memory station's address is known as soon as its base register is,
    // even while a store still waits for the value it writes.
    fn resolve_effective_addresses(&mut self) {
        let unresolved = self.stations_in_program_order(|rs| {
            rs.is_busy()
                && rs.effective_address.is_none()
                && rs.opcode.map_or(false, |opcode| opcode.is_memory())
                && rs.source[0].is_ready()
        });

        for (_, station) in unresolved {
            let rs = self.rs_pool.get(station);
            // the float to int cast saturates, so only the add can overflow
            let base = rs.source[0].value().unwrap_or(0.0).trunc() as i64;
            let addr = self.memory_subsystem.normalize_address(base.saturating_add(rs.immediate as i64));
            self.rs_pool.get_mut(station).effective_address = Some(addr);
        }
    }

    // An older memory operation on the same address that hasn't retired yet
    // blocks this one, as long as at least one of the two is a store. A load
    // also waits for every older store whose address is still unknown.
    fn find_address_clash(&self, tag: Tag, addr: AddressType) -> Option<String> {
        let is_store = self.rob.get(tag).map_or(false, |slot| slot.opcode.is_store());

        for (station, rs) in self.rs_pool.iter() {
            let (other_tag, other_opcode) = match (rs.rob_tag, rs.opcode) {
                (Some(other_tag), Some(other_opcode)) => (other_tag, other_opcode),
                _ => continue,
            };
            if !rs.is_busy() || other_tag >= tag || !other_opcode.is_memory() {
                continue;
            }
            if !is_store && !other_opcode.is_store() {
                continue;
            }
            match rs.effective_address {
                Some(other_addr) if other_addr == addr =>
                    return Some(format!("{} (ROB{}) {} on the same address is still executing", station, other_tag, mnemonic(other_opcode))),
                None if !is_store =>
                    return Some(format!("{} (ROB{}) {} has no address yet", station, other_tag, mnemonic(other_opcode))),
                _ => {}
            }
        }

        for slot in self.rob.iter() {
            if slot.tag >= tag {
                break;
            }
            if slot.dest == RobDest::Store && slot.store_address == Some(addr) {
                return Some(format!("store ROB{} to the same address has not committed", slot.tag));
            }
        }

        None
    }

    fn cycle_issue(&mut self) {
        let instr = match self.instr_queue.peek() {
            Some(instr) => *instr,
            None => return,
        };

        // nothing is issued past a branch until the branch has committed
        if self.rob.has_pending_branch() || !self.rob.has_space() {
            self.perf_counters.issue_stall_cnt += 1;
            return;
        }

        let class = instr.opcode.station_class();
        let station = match self.rs_pool.allocate(class) {
            Some(station) => station,
            None => {
                self.perf_counters.issue_stall_cnt += 1;
                if self.trace.issue {
                    info!("Issue stalled: no free {} station for [{}]", class.name(), instr);
                }
                return;
            }
        };

        let tag = self.next_tag;
        self.next_tag += 1;

        // bind the sources before renaming the destination: `DADDI R1, R1, 1` reads the old R1
        let source = [self.bind_operand(instr.src1), self.bind_operand(instr.src2)];

        let dest = if instr.opcode.is_store() {
            RobDest::Store
        } else if instr.opcode.is_branch() {
            RobDest::Branch
        } else {
            match instr.dest {
                Some(reg) => RobDest::Register(reg),
                None => RobDest::Discard,
            }
        };

        self.rob.allocate(ROBSlot::new(tag, instr.opcode, dest, instr.immediate, self.pc));

        let rs = self.rs_pool.get_mut(station);
        debug_assert!(rs.state == RSState::BUSY);
        rs.opcode = Some(instr.opcode);
        rs.source = source;
        rs.immediate = instr.immediate;
        rs.dest = instr.dest;
        rs.rob_tag = Some(tag);
        rs.effective_address = None;
        rs.remaining = 0;
        rs.started = false;
        rs.result_ready = false;

        if let RobDest::Register(reg) = dest {
            self.reg_file.set_tag(reg, tag);
        }

        if self.trace.issue {
            info!("Issued [{}] to {} as ROB{} at PC {}: {}", instr, station, tag, self.pc, self.rs_pool.get(station));
        }

        self.instr_queue.dequeue();
        self.pc += INSTR_WIDTH as PcType;
        self.perf_counters.issue_cnt += 1;
    }

    fn bind_operand(&self, src: Option<Reg>) -> SourceOperand {
        let reg = match src {
            Some(reg) => reg,
            None => return SourceOperand::Value(0.0),
        };

        match self.reg_file.tag(reg) {
            None => SourceOperand::Value(self.reg_file.value(reg)),
            Some(tag) => match self.rob.get(tag) {
                // produced but not yet committed
                Some(slot) if slot.ready => match slot.value {
                    Some(value) => SourceOperand::Value(value.as_f64()),
                    None => SourceOperand::Pending(tag),
                },
                Some(_) => SourceOperand::Pending(tag),
                None => SourceOperand::Value(self.reg_file.value(reg)),
            },
        }
    }

    pub fn pc(&self) -> PcType {
        self.pc
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn pending_instructions(&self) -> usize {
        self.instr_queue.size()
    }

    pub fn perf_counters(&self) -> &PerfCounters {
        &self.perf_counters
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn register(&self, name: &str) -> Result<RegEntry, SimError> {
        self.reg_file.get(name)
    }

    pub fn set_register(&mut self, name: &str, value: ValueType) -> Result<(), SimError> {
        let reg = RegisterFile::lookup(name)?;
        self.reg_file.set_value(reg, value);
        Ok(())
    }

    pub fn read_memory_word(&self, address: i64) -> WordType {
        let addr = self.memory_subsystem.normalize_address(address);
        self.memory_subsystem.peek_word(addr)
    }

    pub fn write_memory_word(&mut self, address: i64, value: WordType) {
        let addr = self.memory_subsystem.normalize_address(address);
        self.memory_subsystem.poke_word(addr, value);
    }

    pub fn stations(&self) -> Vec<StationSnapshot> {
        self.rs_pool.iter().map(|(station, rs)| {
            let busy = rs.is_busy();
            let (vj, qj) = operand_columns(busy, &rs.source[0]);
            let (vk, qk) = operand_columns(busy, &rs.source[1]);
            StationSnapshot {
                name: station.to_string(),
                busy,
                opcode: match (busy, rs.opcode) {
                    (true, Some(opcode)) => mnemonic(opcode).to_string(),
                    _ => String::new(),
                },
                vj,
                vk,
                qj,
                qk,
                remaining: rs.remaining,
            }
        }).collect()
    }

    pub fn rob_entries(&self) -> Vec<RobSnapshot> {
        self.rob.iter().map(|slot| {
            let value = match (slot.value, slot.store_value, slot.branch_operands) {
                (Some(value), _, _) => value.to_string(),
                (None, Some(word), _) => word.to_string(),
                (None, None, Some((vj, vk))) => {
                    if branch_taken(slot.opcode, vj, vk) { String::from("taken") } else { String::from("not taken") }
                }
                _ => String::new(),
            };
            RobSnapshot {
                entry: slot.tag,
                instr: mnemonic(slot.opcode).to_string(),
                dest: slot.dest.to_string(),
                value,
                ready: slot.ready,
            }
        }).collect()
    }

    pub fn registers(&self) -> Vec<RegisterSnapshot> {
        self.reg_file.iter().map(|(reg, entry)| RegisterSnapshot {
            name: reg.to_string(),
            value: entry.value,
            tag: entry.tag.map(|tag| format!("ROB{}", tag)),
        }).collect()
    }

    pub fn cache_status(&self) -> Vec<String> {
        self.memory_subsystem.cache_status()
    }
}

fn operand_columns(busy: bool, source: &SourceOperand) -> (String, String) {
    if !busy {
        return (String::new(), String::new());
    }
    match source {
        SourceOperand::Value(_) => (source.to_string(), String::new()),
        SourceOperand::Pending(_) => (String::new(), source.to_string()),
    }
}
