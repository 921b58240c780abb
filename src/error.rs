use std::fmt;

use miette::{miette, LabeledSpan, Report, Severity};

use crate::{
    instr::Opcode,
    span::Span,
    symbol::{Ident, MEMORY_MAX},
};

/// Condition the interpreter tolerated silently.
///
/// None of these change how a program loads or runs. They are collected so that callers (and
/// strict mode) can see what was skipped.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Offending source text, for load-time diagnostics.
    pub span: Option<Span>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum DiagnosticKind {
    // Loader
    UnreadableSource { path: String, reason: String },
    UnknownOpcode { line: usize, keyword: String },
    MissingOperand { line: usize, opcode: Opcode },
    MalformedOperand { line: usize, opcode: Opcode, text: String },
    TrailingInput { line: usize, text: String },
    Truncated { ignored: usize },
    // Runtime
    UnresolvedSymbol { pc: i32, name: Ident },
    PcOutOfRange { pc: i32 },
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind) -> Self {
        Diagnostic { kind, span: None }
    }

    pub fn at(kind: DiagnosticKind, span: Span) -> Self {
        Diagnostic {
            kind,
            span: Some(span),
        }
    }

    pub fn code(&self) -> &'static str {
        match self.kind {
            DiagnosticKind::UnreadableSource { .. } => "load::unreadable",
            DiagnosticKind::UnknownOpcode { .. } => "load::unknown_opcode",
            DiagnosticKind::MissingOperand { .. } => "load::missing_operand",
            DiagnosticKind::MalformedOperand { .. } => "load::bad_operand",
            DiagnosticKind::TrailingInput { .. } => "load::trailing_input",
            DiagnosticKind::Truncated { .. } => "load::truncated",
            DiagnosticKind::UnresolvedSymbol { .. } => "run::unresolved_symbol",
            DiagnosticKind::PcOutOfRange { .. } => "run::pc_out_of_range",
        }
    }

    fn help(&self) -> String {
        match &self.kind {
            DiagnosticKind::UnreadableSource { .. } => {
                "the machine was reset to an empty program".into()
            }
            DiagnosticKind::UnknownOpcode { .. } => {
                "valid opcodes are DEC LDA LDB LDI ST XCH JMP JZS JVS ADD HLT; the slot was left empty"
                    .into()
            }
            DiagnosticKind::MissingOperand { opcode, .. }
            | DiagnosticKind::MalformedOperand { opcode, .. } => {
                format!("{opcode} expects {}", operand_hint(*opcode))
            }
            DiagnosticKind::TrailingInput { .. } => "extra text after an operand is ignored".into(),
            DiagnosticKind::Truncated { .. } => {
                format!("programs may hold at most {MEMORY_MAX} lines")
            }
            DiagnosticKind::UnresolvedSymbol { name, .. } => {
                format!("execute a `DEC {name}` before referencing it; the instruction had no effect")
            }
            DiagnosticKind::PcOutOfRange { .. } => {
                format!("jump targets must lie between 0 and {}", MEMORY_MAX - 1)
            }
        }
    }

    /// Render as a warning, attaching `src` when the diagnostic points into it.
    pub fn report(&self, src: Option<&str>) -> Report {
        let labels = match self.span {
            Some(span) if src.is_some() => vec![LabeledSpan::at(span, self.label())],
            _ => Vec::new(),
        };
        let report = miette!(
            severity = Severity::Warning,
            code = self.code(),
            help = self.help(),
            labels = labels,
            "{}",
            self
        );
        match (self.span, src) {
            (Some(_), Some(src)) => report.with_source_code(src.to_owned()),
            _ => report,
        }
    }

    fn label(&self) -> &'static str {
        match self.kind {
            DiagnosticKind::UnknownOpcode { .. } => "unknown opcode",
            DiagnosticKind::MissingOperand { .. } => "operand expected here",
            DiagnosticKind::MalformedOperand { .. } => "incorrect operand",
            DiagnosticKind::TrailingInput { .. } => "ignored",
            _ => "here",
        }
    }
}

fn operand_hint(opcode: Opcode) -> &'static str {
    use crate::instr::OperandKind;
    match opcode.operand() {
        OperandKind::Ident => "a single-character identifier",
        OperandKind::Int => "a decimal integer",
        OperandKind::None => "no operand",
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::UnreadableSource { path, reason } => {
                write!(f, "Could not read program source {path}: {reason}")
            }
            DiagnosticKind::UnknownOpcode { line, keyword } if keyword.is_empty() => {
                write!(f, "Line {line} is blank")
            }
            DiagnosticKind::UnknownOpcode { line, keyword } => {
                write!(f, "Unknown opcode `{keyword}` on line {line}")
            }
            DiagnosticKind::MissingOperand { line, opcode } => {
                write!(f, "Missing operand for {opcode} on line {line}")
            }
            DiagnosticKind::MalformedOperand { line, opcode, text } => {
                write!(f, "Malformed operand `{text}` for {opcode} on line {line}")
            }
            DiagnosticKind::TrailingInput { line, text } => {
                write!(f, "Unexpected trailing input `{text}` on line {line}")
            }
            DiagnosticKind::Truncated { ignored } => {
                write!(f, "Memory is full, {ignored} trailing line(s) ignored")
            }
            DiagnosticKind::UnresolvedSymbol { pc, name } => {
                write!(f, "Identifier `{name}` is not declared (at address {pc})")
            }
            DiagnosticKind::PcOutOfRange { pc } => {
                write!(f, "Program counter {pc} is outside of memory")
            }
        }
    }
}
