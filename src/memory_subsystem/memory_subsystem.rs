use log::debug;

use crate::cpu::SimConfig;
use crate::instructions::instructions::{AddressType, WordType};
use crate::memory_subsystem::cache::Cache;
use crate::memory_subsystem::memory::{Memory, WORD_SIZE};

/// Outcome of starting a memory access: how many cycles it costs and whether it hit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct AccessTiming {
    pub(crate) cycles: u32,
    pub(crate) hit: bool,
}

pub(crate) struct MemorySubsystem {
    pub(crate) memory: Memory,
    pub(crate) cache: Cache,
    hit_latency: u32,
    miss_penalty: u32,
}

impl MemorySubsystem {
    pub(crate) fn new(config: &SimConfig) -> MemorySubsystem {
        let mut memory_subsystem = MemorySubsystem {
            memory: Memory::new(config.memory_size),
            cache: Cache::new(config.cache.size, config.cache.block_size),
            hit_latency: config.cache.hit_latency,
            miss_penalty: config.cache.miss_penalty,
        };
        memory_subsystem.init(config);
        memory_subsystem
    }

    // (Re)applies the configured initial memory words and drops every cached block.
    pub(crate) fn init(&mut self, config: &SimConfig) {
        self.memory.reset();
        self.cache.invalidate();

        for (addr, value) in &config.memory {
            let addr = self.normalize_address(*addr as i64);
            self.memory.store_word(addr, *value);
        }
    }

    /// Maps an effective address onto a word aligned address inside memory.
    pub(crate) fn normalize_address(&self, effective_address: i64) -> AddressType {
        let wrapped = effective_address.rem_euclid(self.memory.size() as i64) as AddressType;
        wrapped & !(WORD_SIZE - 1)
    }

    /// Starts an access at addr. On a miss the owning block is fetched right
    /// away so later accesses to the same block hit.
    pub(crate) fn begin_access(&mut self, addr: AddressType) -> AccessTiming {
        let hit = self.cache.access(addr, &self.memory);
        if hit {
            AccessTiming { cycles: self.hit_latency, hit }
        } else {
            debug!("Cache miss at address {}, block index {}", addr, self.cache.index_of(addr));
            AccessTiming { cycles: self.hit_latency + self.miss_penalty, hit }
        }
    }

    pub(crate) fn load_word(&mut self, addr: AddressType) -> WordType {
        self.cache.load_word(addr, &self.memory)
    }

    pub(crate) fn store_word(&mut self, addr: AddressType, value: WordType) {
        self.cache.store_word(addr, value, &mut self.memory);
    }

    // Reads straight from memory, bypassing (and not disturbing) the cache.
    pub(crate) fn peek_word(&self, addr: AddressType) -> WordType {
        self.memory.load_word(addr)
    }

    // Writes straight to memory; a cached copy of the block is dropped.
    pub(crate) fn poke_word(&mut self, addr: AddressType, value: WordType) {
        self.memory.store_word(addr, value);
        if self.cache.is_hit(addr) {
            self.cache.store_word(addr, value, &mut self.memory);
        }
    }

    pub(crate) fn cache_status(&self) -> Vec<String> {
        self.cache.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_timing() {
        let config = SimConfig::default();
        let mut memory_subsystem = MemorySubsystem::new(&config);

        let first = memory_subsystem.begin_access(64);
        assert!(!first.hit);
        assert_eq!(first.cycles, config.cache.hit_latency + config.cache.miss_penalty);

        let second = memory_subsystem.begin_access(68);
        assert!(second.hit);
        assert_eq!(second.cycles, config.cache.hit_latency);
    }

    #[test]
    fn test_normalize_address() {
        let config = SimConfig::default();
        let memory_subsystem = MemorySubsystem::new(&config);
        assert_eq!(memory_subsystem.normalize_address(13), 12);
        assert_eq!(memory_subsystem.normalize_address(config.memory_size as i64 + 8), 8);
        assert_eq!(memory_subsystem.normalize_address(-4), config.memory_size - 4);
    }

    #[test]
    fn test_initial_memory_words() {
        let mut config = SimConfig::default();
        config.memory.insert(16, 77);
        let mut memory_subsystem = MemorySubsystem::new(&config);
        assert_eq!(memory_subsystem.peek_word(16), 77);
        assert_eq!(memory_subsystem.load_word(16), 77);

        memory_subsystem.store_word(16, 5);
        memory_subsystem.init(&config);
        assert_eq!(memory_subsystem.peek_word(16), 77);
        assert!(memory_subsystem.cache_status().iter().all(|s| s.ends_with("Invalid")));
    }

    #[test]
    fn test_poke_keeps_cache_coherent() {
        let config = SimConfig::default();
        let mut memory_subsystem = MemorySubsystem::new(&config);
        assert_eq!(memory_subsystem.load_word(32), 0);
        memory_subsystem.poke_word(32, 9);
        assert_eq!(memory_subsystem.load_word(32), 9);
    }
}
