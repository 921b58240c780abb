use std::{fmt, str::FromStr};

use crate::symbol::Ident;

/// Largest value representable in a 30-bit two's-complement word.
pub const WORD_MAX: i64 = (1 << 29) - 1;
/// Smallest value representable in a 30-bit two's-complement word.
pub const WORD_MIN: i64 = -(1 << 29);
/// Number of distinct 30-bit words.
const WORD_SPAN: i64 = 1 << 30;

/// Fold `total` into the 30-bit word range, reporting whether it had to wrap.
///
/// A total above [`WORD_MAX`] loses exactly 2^30, one below [`WORD_MIN`] gains exactly 2^30.
/// Nothing further is done: operands that are not themselves valid words (only reachable
/// through an out-of-range `LDI`) can leave a result outside the word range.
pub fn wrap30(total: i64) -> (i64, bool) {
    if total > WORD_MAX {
        (total - WORD_SPAN, true)
    } else if total < WORD_MIN {
        (total + WORD_SPAN, true)
    } else {
        (total, false)
    }
}

/// Single SAL instruction, as held by one memory slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Instr {
    /// Declare `name`. After first execution the slot turns into the storage cell for `name`.
    Dec {
        name: Ident,
        value: i64,
        declared: bool,
    },
    /// Load the cell bound to `name` into A
    Lda { name: Ident },
    /// Load the cell bound to `name` into B
    Ldb { name: Ident },
    /// Load an immediate into A
    Ldi { value: i64 },
    /// Store A into the cell bound to `name`
    St { name: Ident },
    /// Swap A and B
    Xch,
    /// Unconditional jump
    Jmp { dest: i32 },
    /// Jump if the zero bit is set
    Jzs { dest: i32 },
    /// Jump if the overflow bit is set
    Jvs { dest: i32 },
    /// A <- A + B, setting zero and overflow bits
    Add,
    Hlt,
}

impl Instr {
    /// Fresh, not yet executed declaration of `name`.
    pub fn dec(name: Ident) -> Self {
        Instr::Dec {
            name,
            value: 0,
            declared: false,
        }
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Instr::Dec { .. } => Opcode::Dec,
            Instr::Lda { .. } => Opcode::Lda,
            Instr::Ldb { .. } => Opcode::Ldb,
            Instr::Ldi { .. } => Opcode::Ldi,
            Instr::St { .. } => Opcode::St,
            Instr::Xch => Opcode::Xch,
            Instr::Jmp { .. } => Opcode::Jmp,
            Instr::Jzs { .. } => Opcode::Jzs,
            Instr::Jvs { .. } => Opcode::Jvs,
            Instr::Add => Opcode::Add,
            Instr::Hlt => Opcode::Hlt,
        }
    }

    pub fn is_halt(&self) -> bool {
        matches!(self, Instr::Hlt)
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Dec {
                name,
                value,
                declared: true,
            } => write!(f, "{name}: {value}"),
            Instr::Dec { name, .. }
            | Instr::Lda { name }
            | Instr::Ldb { name }
            | Instr::St { name } => write!(f, "{} {name}", self.opcode()),
            Instr::Ldi { value } => write!(f, "{} {value}", self.opcode()),
            Instr::Jmp { dest } | Instr::Jzs { dest } | Instr::Jvs { dest } => {
                write!(f, "{} {dest}", self.opcode())
            }
            Instr::Xch | Instr::Add | Instr::Hlt => write!(f, "{}", self.opcode()),
        }
    }
}

/// Opcode keyword as written in source.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Opcode {
    Dec,
    Lda,
    Ldb,
    Ldi,
    St,
    Xch,
    Jmp,
    Jzs,
    Jvs,
    Add,
    Hlt,
}

/// Shape of the operand an opcode expects.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OperandKind {
    None,
    Ident,
    Int,
}

impl Opcode {
    pub fn operand(self) -> OperandKind {
        match self {
            Opcode::Dec | Opcode::Lda | Opcode::Ldb | Opcode::St => OperandKind::Ident,
            Opcode::Ldi | Opcode::Jmp | Opcode::Jzs | Opcode::Jvs => OperandKind::Int,
            Opcode::Xch | Opcode::Add | Opcode::Hlt => OperandKind::None,
        }
    }
}

impl FromStr for Opcode {
    type Err = ();

    // Keywords are case-sensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEC" => Ok(Opcode::Dec),
            "LDA" => Ok(Opcode::Lda),
            "LDB" => Ok(Opcode::Ldb),
            "LDI" => Ok(Opcode::Ldi),
            "ST" => Ok(Opcode::St),
            "XCH" => Ok(Opcode::Xch),
            "JMP" => Ok(Opcode::Jmp),
            "JZS" => Ok(Opcode::Jzs),
            "JVS" => Ok(Opcode::Jvs),
            "ADD" => Ok(Opcode::Add),
            "HLT" => Ok(Opcode::Hlt),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = match self {
            Opcode::Dec => "DEC",
            Opcode::Lda => "LDA",
            Opcode::Ldb => "LDB",
            Opcode::Ldi => "LDI",
            Opcode::St => "ST",
            Opcode::Xch => "XCH",
            Opcode::Jmp => "JMP",
            Opcode::Jzs => "JZS",
            Opcode::Jvs => "JVS",
            Opcode::Add => "ADD",
            Opcode::Hlt => "HLT",
        };
        write!(f, "{keyword}")
    }
}
