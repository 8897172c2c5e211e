use crate::instructions::instructions::{AddressType, WordType};
use crate::memory_subsystem::memory::{Memory, WORD_SIZE};

pub(crate) struct CacheBlock {
    pub(crate) valid: bool,
    // the block address (address / block_size) of the cached block
    pub(crate) tag: AddressType,
    pub(crate) data: Vec<u8>,
}

impl CacheBlock {
    fn new(block_size: AddressType) -> CacheBlock {
        CacheBlock { valid: false, tag: 0, data: vec![0; block_size as usize] }
    }
}

/// A direct-mapped, write-through cache in front of main memory.
///
/// An address maps to block address `address / block_size` which lives at
/// index `block_address % num_blocks`. The tag stored with a block is the
/// full block address.
pub(crate) struct Cache {
    block_size: AddressType,
    num_blocks: AddressType,
    blocks: Vec<CacheBlock>,
}

impl Cache {
    pub(crate) fn new(cache_size: AddressType, block_size: AddressType) -> Cache {
        assert!(block_size > 0 && cache_size % block_size == 0, "Cache: block size must divide cache size");

        let num_blocks = cache_size / block_size;
        let blocks = (0..num_blocks).map(|_| CacheBlock::new(block_size)).collect();

        Cache { block_size, num_blocks, blocks }
    }

    fn block_address(&self, addr: AddressType) -> AddressType {
        addr / self.block_size
    }

    pub(crate) fn index_of(&self, addr: AddressType) -> AddressType {
        self.block_address(addr) % self.num_blocks
    }

    pub(crate) fn is_hit(&self, addr: AddressType) -> bool {
        let block_address = self.block_address(addr);
        let block = &self.blocks[(block_address % self.num_blocks) as usize];
        block.valid && block.tag == block_address
    }

    // Brings the block owning addr into the cache; returns true if it was already present.
    pub(crate) fn access(&mut self, addr: AddressType, memory: &Memory) -> bool {
        if self.is_hit(addr) {
            return true;
        }
        self.fetch_block(addr, memory);
        false
    }

    fn fetch_block(&mut self, addr: AddressType, memory: &Memory) {
        let block_address = self.block_address(addr);
        let block_start = block_address * self.block_size;
        let index = block_address % self.num_blocks;

        let block = &mut self.blocks[index as usize];
        memory.read_block(block_start, &mut block.data);
        block.tag = block_address;
        block.valid = true;
    }

    fn offset_in_block(&self, addr: AddressType) -> usize {
        let offset = (addr % self.block_size) as usize;
        debug_assert!(offset + WORD_SIZE as usize <= self.block_size as usize, "Cache: word at {} straddles a block", addr);
        offset
    }

    pub(crate) fn load_word(&mut self, addr: AddressType, memory: &Memory) -> WordType {
        self.access(addr, memory);

        let offset = self.offset_in_block(addr);
        let block = &self.blocks[self.index_of(addr) as usize];
        let mut word = [0u8; WORD_SIZE as usize];
        word.copy_from_slice(&block.data[offset..offset + WORD_SIZE as usize]);
        WordType::from_be_bytes(word)
    }

    pub(crate) fn store_word(&mut self, addr: AddressType, value: WordType, memory: &mut Memory) {
        self.access(addr, memory);

        let offset = self.offset_in_block(addr);
        let index = self.index_of(addr) as usize;
        self.blocks[index].data[offset..offset + WORD_SIZE as usize].copy_from_slice(&value.to_be_bytes());

        // write-through
        memory.store_word(addr, value);
    }

    pub(crate) fn status(&self) -> Vec<String> {
        self.blocks.iter().enumerate().map(|(i, block)| {
            if block.valid {
                format!("Block {}: Valid, Tag={}", i, block.tag)
            } else {
                format!("Block {}: Invalid", i)
            }
        }).collect()
    }

    pub(crate) fn invalidate(&mut self) {
        for block in &mut self.blocks {
            block.valid = false;
        }
    }
}
