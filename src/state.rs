use crate::{
    instr::Instr,
    symbol::{Addr, MEMORY_MAX},
};

/// Accumulators, condition bits and program counter.
///
/// `ADD` folds its result through [`crate::instr::wrap30`]; `LDI` loads its 32-bit immediate
/// unchecked, so the accumulators are wide enough to hold any sum of such values.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct RegisterFile {
    /// Accumulator A
    pub a: i64,
    /// Accumulator B
    pub b: i64,
    /// Program counter. May point outside memory after a jump.
    pub pc: i32,
    /// Set when the last `ADD` produced zero
    pub zero: bool,
    /// Set when the last `ADD` wrapped
    pub overflow: bool,
}

impl RegisterFile {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Move to the following slot.
    #[inline]
    pub fn advance(&mut self) {
        self.pc = self.pc.saturating_add(1);
    }
}

/// Fixed-size store of instruction slots, doubling as data storage for declared identifiers.
#[derive(Clone, Debug)]
pub struct Memory {
    slots: Box<[Option<Instr>; MEMORY_MAX]>,
}

impl Memory {
    pub fn new() -> Self {
        Memory {
            slots: Box::new([None; MEMORY_MAX]),
        }
    }

    /// Empty every slot.
    pub fn clear(&mut self) {
        self.slots.fill(None);
    }

    pub fn get(&self, addr: Addr) -> Option<&Instr> {
        self.slots[addr.index()].as_ref()
    }

    pub fn get_mut(&mut self, addr: Addr) -> Option<&mut Instr> {
        self.slots[addr.index()].as_mut()
    }

    pub fn set(&mut self, addr: Addr, instr: Option<Instr>) {
        self.slots[addr.index()] = instr;
    }

    /// Payload of the declared cell at `addr`, if that slot is one.
    pub fn cell(&self, addr: Addr) -> Option<i64> {
        match self.get(addr) {
            Some(Instr::Dec {
                value,
                declared: true,
                ..
            }) => Some(*value),
            _ => None,
        }
    }

    /// Mutable payload of the declared cell at `addr`, if that slot is one.
    pub fn cell_mut(&mut self, addr: Addr) -> Option<&mut i64> {
        match self.get_mut(addr) {
            Some(Instr::Dec {
                value,
                declared: true,
                ..
            }) => Some(value),
            _ => None,
        }
    }

    /// Number of occupied slots.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Option<&Instr>)> + '_ {
        self.slots.iter().map(Option::as_ref).enumerate()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}
