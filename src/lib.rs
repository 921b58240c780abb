// Decoding
mod span;
pub use span::{Idx, Span};
pub mod instr;
pub use instr::{wrap30, Instr, Opcode};
pub mod parser;
pub use parser::{Decoder, Program};

// Running
pub mod state;
pub use state::{Memory, RegisterFile};
pub mod symbol;
pub use symbol::{Addr, Ident, SymbolTable, MEMORY_MAX};
mod runtime;
pub use runtime::{Machine, Options};

mod error;
pub use error::{Diagnostic, DiagnosticKind};

// Shell
pub mod command;
pub mod env;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 2;
