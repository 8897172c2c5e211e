use std::collections::BTreeMap;
use std::error::Error;
use std::fs::File;

use log::{info, warn};
use serde::Deserialize;

use crate::backend::scheduler::{Scheduler, SimEvent};
use crate::error::SimError;
use crate::instructions::instructions::{get_register, AddressType, Instr, StationClass, WordType};
use crate::memory_subsystem::memory::WORD_SIZE;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PerfCounters {
    pub cycle_cnt: u64,
    pub issue_cnt: u64,
    pub issue_stall_cnt: u64,
    pub execute_cnt: u64,
    pub writeback_cnt: u64,
    pub commit_cnt: u64,
    pub cache_hit_cnt: u64,
    pub cache_miss_cnt: u64,
    pub address_clash_cnt: u64,
    pub branch_taken_cnt: u64,
    pub flushed_cnt: u64,
}

// Controls which pipeline phases log what they do.
#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Trace {
    pub issue: bool,
    pub execute: bool,
    pub writeback: bool,
    pub commit: bool,
    pub cycle: bool,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct StationCounts {
    // FP add/sub, DADDI/DSUBI and branches
    pub fp_add: u16,
    // FP mul/div
    pub fp_mul: u16,
    pub load: u16,
    pub store: u16,
}

impl StationCounts {
    pub fn count(&self, class: StationClass) -> u16 {
        match class {
            StationClass::Add => self.fp_add,
            StationClass::Mul => self.fp_mul,
            StationClass::Load => self.load,
            StationClass::Store => self.store,
        }
    }
}

impl Default for StationCounts {
    fn default() -> Self {
        StationCounts { fp_add: 3, fp_mul: 2, load: 3, store: 2 }
    }
}

// Execution latencies in cycles; memory operations take theirs from the cache.
#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct Latencies {
    pub add_sub: u32,
    pub mul: u32,
    pub div: u32,
    pub int_alu: u32,
    pub branch: u32,
}

impl Default for Latencies {
    fn default() -> Self {
        Latencies { add_sub: 2, mul: 10, div: 40, int_alu: 1, branch: 1 }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    // total size in bytes
    pub size: AddressType,
    pub block_size: AddressType,
    pub hit_latency: u32,
    pub miss_penalty: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig { size: 256, block_size: 16, hit_latency: 1, miss_penalty: 10 }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    pub stations: StationCounts,
    pub latencies: Latencies,
    pub cache: CacheConfig,
    // the size of the memory in bytes
    pub memory_size: AddressType,
    // the capacity of the reorder buffer
    pub rob_capacity: u16,
    // initial register values, e.g. `F1: 2.5`
    pub registers: BTreeMap<String, f64>,
    // initial memory words by byte address
    pub memory: BTreeMap<AddressType, WordType>,
    pub trace: Trace,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            stations: StationCounts::default(),
            latencies: Latencies::default(),
            cache: CacheConfig::default(),
            memory_size: 4096,
            rob_capacity: 16,
            registers: BTreeMap::new(),
            memory: BTreeMap::new(),
            trace: Trace::default(),
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        let invalid = |msg: String| Err(SimError::InvalidConfiguration(msg));

        for class in StationClass::ALL {
            if self.stations.count(class) == 0 {
                return invalid(format!("{} station count must be positive", class.name()));
            }
        }

        let cache = &self.cache;
        if cache.size == 0 || cache.block_size == 0 {
            return invalid(format!("cache size ({}) and block size ({}) must be positive", cache.size, cache.block_size));
        }
        if cache.size % cache.block_size != 0 {
            return invalid(format!("block size {} does not divide cache size {}", cache.block_size, cache.size));
        }
        if cache.block_size % WORD_SIZE != 0 {
            return invalid(format!("block size {} is not a multiple of the {} byte word", cache.block_size, WORD_SIZE));
        }
        if self.memory_size == 0 || self.memory_size % cache.block_size != 0 {
            return invalid(format!("memory size {} must be a positive multiple of the block size {}", self.memory_size, cache.block_size));
        }
        if cache.size > self.memory_size {
            return invalid(format!("cache size {} exceeds memory size {}", cache.size, self.memory_size));
        }
        if self.rob_capacity == 0 {
            return invalid(String::from("ROB capacity must be positive"));
        }

        for name in self.registers.keys() {
            if get_register(name).is_none() {
                return invalid(format!("initial value for unknown register '{}'", name));
            }
        }

        Ok(())
    }
}

pub fn load_sim_config(file_path: &str) -> Result<SimConfig, Box<dyn Error>> {
    let file = File::open(file_path)?;
    let config: SimConfig = serde_yaml::from_reader(file)?;
    config.validate()?;
    Ok(config)
}

/// Drives a Scheduler until the program has drained.
pub struct CPU {
    pub(crate) scheduler: Scheduler,
    trace: Trace,
    events: Vec<SimEvent>,
}

impl CPU {
    pub fn new(config: &SimConfig) -> Result<CPU, SimError> {
        Ok(CPU {
            scheduler: Scheduler::new(config)?,
            trace: config.trace.clone(),
            events: Vec::new(),
        })
    }

    pub fn load_program(&mut self, program: Vec<Instr>) {
        self.events.clear();
        self.scheduler.load_program(program);
    }

    // Steps until nothing is left in flight or max_cycles have passed; returns the cycles run.
    pub fn run(&mut self, max_cycles: u64) -> u64 {
        let mut cycles = 0;
        while !self.scheduler.is_finished() {
            if cycles == max_cycles {
                warn!("Stopped after {} cycles with {} instructions still queued", cycles, self.scheduler.pending_instructions());
                break;
            }
            self.step();
            cycles += 1;
        }
        cycles
    }

    /// Advances a single cycle, logging and recording the events it produced.
    pub fn step(&mut self) {
        let events = self.scheduler.step();

        for event in &events {
            match event {
                SimEvent::CacheMiss { address } => info!("Cache miss at address {}", address),
                SimEvent::AddressClash { station, address, reason } =>
                    info!("Address clash: {} at address {}: {}", station, address, reason),
            }
        }
        self.events.extend(events);

        if self.trace.cycle {
            let perf_counters = self.scheduler.perf_counters();
            info!("[Cycles:{}][Issued={}][Executed={}][Written back={}][Committed={}][IPC={:.2}]",
                  perf_counters.cycle_cnt,
                  perf_counters.issue_cnt,
                  perf_counters.execute_cnt,
                  perf_counters.writeback_cnt,
                  perf_counters.commit_cnt,
                  perf_counters.commit_cnt as f32 / perf_counters.cycle_cnt as f32
            );
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }
}
