use crate::instructions::instructions::{AddressType, WordType};

// The number of bytes in a machine word.
pub(crate) const WORD_SIZE: AddressType = 4;

/// Flat byte addressable main memory. Words are packed big-endian.
pub(crate) struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    pub(crate) fn new(size: AddressType) -> Memory {
        Memory { bytes: vec![0; size as usize] }
    }

    pub(crate) fn size(&self) -> AddressType {
        self.bytes.len() as AddressType
    }

    pub(crate) fn load_word(&self, addr: AddressType) -> WordType {
        let start = addr as usize;
        debug_assert!(start + WORD_SIZE as usize <= self.bytes.len(), "Memory: load_word {} out of range", addr);

        let mut word = [0u8; WORD_SIZE as usize];
        word.copy_from_slice(&self.bytes[start..start + WORD_SIZE as usize]);
        WordType::from_be_bytes(word)
    }

    pub(crate) fn store_word(&mut self, addr: AddressType, value: WordType) {
        let start = addr as usize;
        debug_assert!(start + WORD_SIZE as usize <= self.bytes.len(), "Memory: store_word {} out of range", addr);

        self.bytes[start..start + WORD_SIZE as usize].copy_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn read_block(&self, start: AddressType, dst: &mut [u8]) {
        let start = start as usize;
        dst.copy_from_slice(&self.bytes[start..start + dst.len()]);
    }

    pub(crate) fn reset(&mut self) {
        self.bytes.fill(0);
    }
}
