use std::fmt;
use std::fmt::Display;

use crate::cpu::StationCounts;
use crate::instructions::instructions::{AddressType, mnemonic, Opcode, Reg, StationClass, Tag, ValueType};

/// One operand slot of a reservation station: either the value itself, or
/// the tag of the in-flight instruction that will produce it.
#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) enum SourceOperand {
    Value(ValueType),
    Pending(Tag),
}

impl SourceOperand {
    pub(crate) fn value(&self) -> Option<ValueType> {
        match self {
            SourceOperand::Value(value) => Some(*value),
            SourceOperand::Pending(_) => None,
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        matches!(self, SourceOperand::Value(_))
    }
}

impl Display for SourceOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceOperand::Value(value) => write!(f, "{}", value),
            SourceOperand::Pending(tag) => write!(f, "ROB{}", tag),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) enum RSState {
    IDLE,
    BUSY,
    // result broadcast this cycle; becomes IDLE once the cycle ends
    DRAINED,
}

/// Names a single station: its class plus the slot index, e.g. `Mul1`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) struct StationRef {
    pub(crate) class: StationClass,
    pub(crate) index: u16,
}

impl Display for StationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.class.name(), self.index)
    }
}

// A single reservation station
pub(crate) struct RS {
    pub(crate) state: RSState,
    pub(crate) opcode: Option<Opcode>,
    pub(crate) source: [SourceOperand; 2],
    pub(crate) immediate: i32,
    pub(crate) dest: Option<Reg>,
    pub(crate) rob_tag: Option<Tag>,
    pub(crate) effective_address: Option<AddressType>,
    pub(crate) remaining: u32,
    pub(crate) started: bool,
    pub(crate) result_ready: bool,
}

impl RS {
    fn new() -> Self {
        Self {
            state: RSState::IDLE,
            opcode: None,
            source: [SourceOperand::Value(0.0), SourceOperand::Value(0.0)],
            immediate: 0,
            dest: None,
            rob_tag: None,
            effective_address: None,
            remaining: 0,
            started: false,
            result_ready: false,
        }
    }

    fn reset(&mut self) {
        *self = RS::new();
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.state == RSState::BUSY
    }

    pub(crate) fn operands_ready(&self) -> bool {
        self.source.iter().all(|s| s.is_ready())
    }
}

impl Display for RS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RS ")?;
        match self.opcode {
            Some(opcode) => write!(f, "{}", mnemonic(opcode))?,
            None => write!(f, "-")?,
        }

        for source in &self.source {
            write!(f, " {}", source)?;
        }

        if let Some(dest) = self.dest {
            write!(f, " -> {}", dest)?;
        }

        Ok(())
    }
}

// The stations of a single class.
pub(crate) struct RSTable {
    class: StationClass,
    array: Vec<RS>,
}

impl RSTable {
    pub(crate) fn new(class: StationClass, capacity: u16) -> Self {
        let array = (0..capacity).map(|_| RS::new()).collect();
        RSTable { class, array }
    }

    // Claims the first idle station; None when every station is occupied.
    pub(crate) fn allocate(&mut self) -> Option<u16> {
        let index = self.array.iter().position(|rs| rs.state == RSState::IDLE)?;
        self.array[index].state = RSState::BUSY;
        Some(index as u16)
    }

    pub(crate) fn get(&self, index: u16) -> &RS {
        &self.array[index as usize]
    }

    pub(crate) fn get_mut(&mut self, index: u16) -> &mut RS {
        &mut self.array[index as usize]
    }

    pub(crate) fn release_drained(&mut self) {
        for rs in &mut self.array {
            if rs.state == RSState::DRAINED {
                rs.reset();
            }
        }
    }

    pub(crate) fn flush(&mut self) {
        for rs in &mut self.array {
            rs.reset();
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item=(StationRef, &RS)> {
        let class = self.class;
        self.array.iter().enumerate().map(move |(i, rs)| (StationRef { class, index: i as u16 }, rs))
    }
}

/// All reservation stations, one table per station class.
pub(crate) struct RSPool {
    tables: Vec<RSTable>,
}

impl RSPool {
    pub(crate) fn new(counts: &StationCounts) -> Self {
        let tables = StationClass::ALL.iter()
            .map(|class| RSTable::new(*class, counts.count(*class)))
            .collect();
        RSPool { tables }
    }

    fn table_index(class: StationClass) -> usize {
        match class {
            StationClass::Add => 0,
            StationClass::Mul => 1,
            StationClass::Load => 2,
            StationClass::Store => 3,
        }
    }

    pub(crate) fn table(&self, class: StationClass) -> &RSTable {
        &self.tables[Self::table_index(class)]
    }

    pub(crate) fn allocate(&mut self, class: StationClass) -> Option<StationRef> {
        let index = self.tables[Self::table_index(class)].allocate()?;
        Some(StationRef { class, index })
    }

    pub(crate) fn get(&self, station: StationRef) -> &RS {
        self.table(station.class).get(station.index)
    }

    pub(crate) fn get_mut(&mut self, station: StationRef) -> &mut RS {
        self.tables[Self::table_index(station.class)].get_mut(station.index)
    }

    pub(crate) fn has_busy(&self) -> bool {
        self.iter().any(|(_, rs)| rs.state != RSState::IDLE)
    }

    pub(crate) fn release_drained(&mut self) {
        for table in &mut self.tables {
            table.release_drained();
        }
    }

    pub(crate) fn flush(&mut self) {
        for table in &mut self.tables {
            table.flush();
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item=(StationRef, &RS)> {
        self.tables.iter().flat_map(|table| table.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_first_free() {
        let mut table = RSTable::new(StationClass::Mul, 2);
        assert_eq!(table.allocate(), Some(0));
        assert_eq!(table.allocate(), Some(1));
        assert_eq!(table.allocate(), None);

        table.get_mut(0).state = RSState::DRAINED;
        // a drained station is only reusable after the cycle ends
        assert_eq!(table.allocate(), None);
        table.release_drained();
        assert_eq!(table.allocate(), Some(0));
    }

    #[test]
    fn test_pool_classes() {
        let counts = StationCounts { fp_add: 3, fp_mul: 2, load: 1, store: 2 };
        let mut pool = RSPool::new(&counts);
        assert_eq!(pool.table(StationClass::Add).iter().count(), 3);
        assert_eq!(pool.table(StationClass::Load).iter().count(), 1);

        let station = pool.allocate(StationClass::Load);
        assert_eq!(station, Some(StationRef { class: StationClass::Load, index: 0 }));
        assert_eq!(pool.allocate(StationClass::Load), None);
        assert!(pool.allocate(StationClass::Store).is_some());
        assert!(pool.has_busy());

        pool.flush();
        assert!(!pool.has_busy());
        assert_eq!(pool.iter().count(), 8);
    }

    #[test]
    fn test_station_names() {
        let station = StationRef { class: StationClass::Add, index: 2 };
        assert_eq!(station.to_string(), "Add2");
        assert_eq!(SourceOperand::Pending(4).to_string(), "ROB4");
        assert_eq!(SourceOperand::Value(2.5).to_string(), "2.5");
    }

    #[test]
    fn test_display() {
        let mut rs = RS::new();
        rs.opcode = Some(Opcode::ADD_D);
        rs.source = [SourceOperand::Value(1.5), SourceOperand::Pending(3)];
        rs.dest = Some(Reg::fp(2));
        assert_eq!(rs.to_string(), "RS ADD.D 1.5 ROB3 -> F2");
        assert_eq!(RS::new().to_string(), "RS - 0 0");
    }

    #[test]
    fn test_operands_ready() {
        let mut rs = RS::new();
        rs.source = [SourceOperand::Value(1.0), SourceOperand::Pending(3)];
        assert!(!rs.operands_ready());
        rs.source[1] = SourceOperand::Value(2.0);
        assert!(rs.operands_ready());
    }
}
