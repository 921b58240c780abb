use std::fmt;

use fxhash::FxBuildHasher;
use indexmap::IndexMap;

/// SAL memory holds 256 slots.
pub const MEMORY_MAX: usize = 256;

// Symbol table of identifier -> memory address, in order of first binding
type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Single-character identifier naming a declared storage cell.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Ident(pub char);

impl Ident {
    /// Stand-in for an identifier operand that is absent from the source line.
    pub const MISSING: Ident = Ident('_');
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype representing an address that is known to be inside SAL memory.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Addr(usize);

impl Addr {
    /// `None` if `index` falls outside memory.
    pub fn new(index: usize) -> Option<Addr> {
        (index < MEMORY_MAX).then_some(Addr(index))
    }

    /// Interpret a program counter value as an address.
    pub fn from_pc(pc: i32) -> Option<Addr> {
        usize::try_from(pc).ok().and_then(Addr::new)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifiers bound by executed `DEC` instructions.
///
/// Populated during execution rather than at load time. Every bound address names a slot holding a
/// `DEC` whose declared flag is set; bindings are only dropped by [`SymbolTable::clear`].
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    table: FxMap<Ident, Addr>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            table: IndexMap::with_hasher(FxBuildHasher::default()),
        }
    }

    /// Bind `name` to `addr`, returning the address it was previously bound to.
    pub fn bind(&mut self, name: Ident, addr: Addr) -> Option<Addr> {
        self.table.insert(name, addr)
    }

    pub fn resolve(&self, name: Ident) -> Option<Addr> {
        self.table.get(&name).copied()
    }

    pub fn clear(&mut self) {
        self.table.clear()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Ident, Addr)> + '_ {
        self.table.iter().map(|(name, addr)| (*name, *addr))
    }
}
