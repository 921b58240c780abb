use std::{fmt, fs, path::Path};

use miette::{IntoDiagnostic, Result, WrapErr};

use crate::{
    error::{Diagnostic, DiagnosticKind},
    instr::{wrap30, Instr},
    parser::{Decoder, Program},
    state::{Memory, RegisterFile},
    symbol::{Addr, Ident, SymbolTable},
};

/// Diagnostics kept before further ones are only logged.
const MAX_DIAGNOSTICS: usize = 1024;

/// Behaviour switches for a [`Machine`].
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Options {
    /// Surface tolerated conditions as warnings. Never changes control flow.
    pub strict: bool,
}

/// Represents complete program state during runtime.
pub struct Machine {
    reg: RegisterFile,
    mem: Memory,
    symbols: SymbolTable,
    options: Options,
    /// Conditions noticed since the last call to `take_diagnostics`
    diagnostics: Vec<Diagnostic>,
    /// Text of the last loaded program, for rendering load diagnostics
    source: String,
}

impl Machine {
    pub fn new(options: Options) -> Self {
        Machine {
            reg: RegisterFile::default(),
            mem: Memory::new(),
            symbols: SymbolTable::new(),
            options,
            diagnostics: Vec::new(),
            source: String::new(),
        }
    }

    /// Replace the whole machine state with the program in `src`.
    pub fn load(&mut self, src: &str) {
        let program = Decoder::new(src).decode();
        self.load_program(program);
        self.source = src.to_owned();
    }

    /// Replace the whole machine state with an already decoded program.
    pub fn load_program(&mut self, program: Program) {
        self.reset();
        let Program { slots, diagnostics } = program;
        let lines = slots.len();
        for (index, instr) in slots.into_iter().enumerate() {
            // Decoder never yields more than MEMORY_MAX slots
            if let Some(addr) = Addr::new(index) {
                self.mem.set(addr, instr);
            }
        }
        log::debug!(
            "loaded {} instruction(s) from {lines} line(s)",
            self.mem.occupied()
        );
        for diagnostic in diagnostics {
            self.diagnose(diagnostic);
        }
    }

    /// Load the program stored at `path`.
    ///
    /// An unreadable file loads as an empty program.
    pub fn load_file(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(src) => self.load(&src),
            Err(err) => {
                self.reset();
                self.diagnose(Diagnostic::new(DiagnosticKind::UnreadableSource {
                    path: path.display().to_string(),
                    reason: err.to_string(),
                }));
            }
        }
    }

    fn reset(&mut self) {
        self.reg.reset();
        self.mem.clear();
        self.symbols.clear();
        self.diagnostics.clear();
        self.source.clear();
    }

    /// Execute the instruction at the program counter.
    ///
    /// Returns `false` without touching any state if the slot is empty, holds `HLT`, or lies
    /// outside memory.
    pub fn step(&mut self) -> bool {
        let pc = self.reg.pc;
        let Some(addr) = Addr::from_pc(pc) else {
            self.diagnose(Diagnostic::new(DiagnosticKind::PcOutOfRange { pc }));
            return false;
        };
        let Some(&instr) = self.mem.get(addr) else {
            return false;
        };
        if instr.is_halt() {
            return false;
        }
        log::trace!("{addr:>3}: {instr}");

        match instr {
            Instr::Dec { name, declared, .. } => self.dec(addr, name, declared),
            Instr::Lda { name } => self.lda(name),
            Instr::Ldb { name } => self.ldb(name),
            Instr::Ldi { value } => self.ldi(value),
            Instr::St { name } => self.st(name),
            Instr::Xch => self.xch(),
            Instr::Jmp { dest } => self.jmp(dest),
            Instr::Jzs { dest } => self.jzs(dest),
            Instr::Jvs { dest } => self.jvs(dest),
            Instr::Add => self.add(),
            Instr::Hlt => {}
        }
        true
    }

    /// Step until a halt, an empty slot, or the edge of memory. Loops forever on a program that
    /// jumps without end.
    pub fn execute_all(&mut self) {
        while self.step() {}
    }

    /// Human-readable dump of registers and every memory slot.
    pub fn snapshot(&self) -> String {
        self.to_string()
    }

    /// Write the snapshot to `path`, replacing anything already there.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.snapshot())
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to write snapshot to {}", path.display()))
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.reg
    }

    pub fn memory(&self) -> &Memory {
        &self.mem
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Whether the program counter rests on a `HLT` instruction.
    pub fn is_halted(&self) -> bool {
        Addr::from_pc(self.reg.pc)
            .and_then(|addr| self.mem.get(addr))
            .is_some_and(Instr::is_halt)
    }

    /// Source text of the loaded program. Empty when nothing could be read.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Drain the diagnostics collected so far.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    fn diagnose(&mut self, diagnostic: Diagnostic) {
        if self.options.strict {
            log::warn!("{diagnostic}");
        } else {
            log::debug!("{diagnostic}");
        }
        // A looping program can produce these without end
        if self.diagnostics.len() < MAX_DIAGNOSTICS {
            self.diagnostics.push(diagnostic);
        }
    }

    /// Resolve `name` to the payload of its cell.
    fn load_cell(&mut self, name: Ident) -> Option<i64> {
        let value = self
            .symbols
            .resolve(name)
            .and_then(|addr| self.mem.cell(addr));
        if value.is_none() {
            self.unresolved(name);
        }
        value
    }

    fn unresolved(&mut self, name: Ident) {
        let pc = self.reg.pc;
        self.diagnose(Diagnostic::new(DiagnosticKind::UnresolvedSymbol { pc, name }));
    }

    fn dec(&mut self, addr: Addr, name: Ident, declared: bool) {
        // Only the first arrival declares; afterwards the slot is plain storage
        if !declared {
            self.symbols.bind(name, addr);
            if let Some(Instr::Dec { declared, .. }) = self.mem.get_mut(addr) {
                *declared = true;
            }
        }
        self.reg.advance();
    }

    fn lda(&mut self, name: Ident) {
        if let Some(value) = self.load_cell(name) {
            self.reg.a = value;
        }
        self.reg.advance();
    }

    fn ldb(&mut self, name: Ident) {
        if let Some(value) = self.load_cell(name) {
            self.reg.b = value;
        }
        self.reg.advance();
    }

    fn ldi(&mut self, value: i64) {
        self.reg.a = value;
        self.reg.advance();
    }

    fn st(&mut self, name: Ident) {
        let a = self.reg.a;
        let stored = self
            .symbols
            .resolve(name)
            .and_then(|addr| self.mem.cell_mut(addr))
            .map(|cell| *cell = a)
            .is_some();
        if !stored {
            self.unresolved(name);
        }
        self.reg.advance();
    }

    fn xch(&mut self) {
        std::mem::swap(&mut self.reg.a, &mut self.reg.b);
        self.reg.advance();
    }

    fn jmp(&mut self, dest: i32) {
        self.reg.pc = dest;
    }

    fn jzs(&mut self, dest: i32) {
        if self.reg.zero {
            self.reg.pc = dest;
        } else {
            self.reg.advance();
        }
    }

    fn jvs(&mut self, dest: i32) {
        if self.reg.overflow {
            self.reg.pc = dest;
        } else {
            self.reg.advance();
        }
    }

    fn add(&mut self) {
        let (value, overflow) = wrap30(self.reg.a.saturating_add(self.reg.b));
        self.reg.zero = value == 0;
        self.reg.overflow = overflow;
        self.reg.a = value;
        self.reg.advance();
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Register A: {}", self.reg.a)?;
        writeln!(f, "Register B: {}", self.reg.b)?;
        writeln!(f, "Program counter: {}", self.reg.pc)?;
        writeln!(f, "Zero bit: {}", u8::from(self.reg.zero))?;
        writeln!(f, "Overflow bit: {}", u8::from(self.reg.overflow))?;
        writeln!(f, "Current memory:")?;
        for (i, slot) in self.mem.iter() {
            match slot {
                Some(instr) => writeln!(f, "{i}: {instr}")?,
                None => writeln!(f, "{i}: null")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        instr::{WORD_MAX, WORD_MIN},
        symbol::MEMORY_MAX,
    };

    fn machine(src: &str) -> Machine {
        let mut machine = Machine::default();
        machine.load(src);
        machine
    }

    fn addr(index: usize) -> Addr {
        Addr::new(index).unwrap()
    }

    /// Run ADD with the given accumulators.
    fn add(a: i64, b: i64) -> RegisterFile {
        let mut machine = machine("ADD\nHLT");
        machine.reg.a = a;
        machine.reg.b = b;
        assert!(machine.step());
        machine.reg
    }

    #[test]
    fn declare_store_load_round() {
        let mut machine = machine("DEC x\nLDI 10\nST x\nLDA x\nHLT\n");
        machine.execute_all();

        let reg = machine.registers();
        assert_eq!(reg.a, 10);
        assert_eq!(reg.pc, 4);
        assert!(!reg.zero);
        assert!(!reg.overflow);
        assert_eq!(machine.memory().get(addr(0)).unwrap().to_string(), "x: 10");
        assert_eq!(machine.symbols().resolve(Ident('x')), Some(addr(0)));
        assert!(machine.diagnostics().is_empty());
    }

    #[test]
    fn add_overflows_at_word_max() {
        let reg = add(536870911, 1);
        assert_eq!(reg.a, -536870912);
        assert!(reg.overflow);
        assert!(!reg.zero);
        assert_eq!(reg.pc, 1);
    }

    #[test]
    fn add_within_range_is_exact() {
        #[rustfmt::skip]
        let cases: &[(i64, i64)] = &[
            (0, 0),
            (1, -1),
            (123, 456),
            (-5000, 20),
            (WORD_MAX, 0),
            (WORD_MIN, 0),
            (WORD_MAX, WORD_MIN),
            (268435456, 268435455),
            (-268435456, -268435456),
        ];
        for &(a, b) in cases {
            let reg = add(a, b);
            assert_eq!(reg.a, a + b, "{a} + {b}");
            assert!(!reg.overflow, "{a} + {b} should not overflow");
            assert_eq!(reg.zero, a + b == 0, "zero bit for {a} + {b}");
        }
    }

    #[test]
    fn add_wraps_out_of_range() {
        #[rustfmt::skip]
        let cases: &[(i64, i64, i64)] = &[
            // (a, b, wrapped)
            (536870911,  1,          -536870912),
            (536870911,  536870911,  -2),
            (300000000,  300000000,  600000000 - (1 << 30)),
            (-536870912, -1,         536870911),
            (-536870912, -536870912, 0),
            (-400000000, -200000000, -600000000 + (1 << 30)),
        ];
        for &(a, b, wrapped) in cases {
            let reg = add(a, b);
            assert_eq!(reg.a, wrapped, "{a} + {b}");
            assert!(reg.overflow, "{a} + {b} should overflow");
            assert_eq!(reg.zero, wrapped == 0, "zero bit follows the wrapped value");
        }
    }

    #[test]
    fn add_clears_overflow_again() {
        let mut machine = machine("ADD\nADD\nHLT");
        machine.reg.a = 536870911;
        machine.reg.b = 1;
        machine.step();
        assert!(machine.reg.overflow);
        machine.reg.b = 0;
        machine.step();
        assert!(!machine.reg.overflow);
        assert_eq!(machine.reg.a, -536870912);
    }

    #[test]
    fn add_shifts_wide_totals_once() {
        let mut machine = machine("LDI 2000000000\nADD\nHLT");
        machine.execute_all();
        assert_eq!(machine.reg.a, 2000000000 - (1 << 30));
        assert!(machine.reg.overflow);
        assert!(!machine.reg.zero);
        assert_eq!(machine.reg.pc, 2);

        let reg = add(-2000000000, 0);
        assert_eq!(reg.a, -2000000000 + (1 << 30));
        assert!(reg.overflow);
    }

    #[test]
    fn exchange_is_its_own_inverse() {
        let mut machine = machine("XCH\nXCH\nHLT");
        machine.reg.a = 7;
        machine.reg.b = -3;
        assert!(machine.step());
        assert_eq!((machine.reg.a, machine.reg.b), (-3, 7));
        assert!(machine.step());
        assert_eq!((machine.reg.a, machine.reg.b), (7, -3));
        assert!(!machine.step());
    }

    #[test]
    fn step_reports_completion() {
        let mut machine = machine("LDI 1\n\nHLT");
        assert!(machine.step());
        assert_eq!(machine.reg.pc, 1);
        // Empty slot
        assert!(!machine.step());
        assert_eq!(machine.reg.pc, 1);

        machine.load("HLT\nLDI 1");
        let before = machine.reg;
        assert!(!machine.step());
        assert_eq!(machine.reg, before);
    }

    #[test]
    fn halted_only_on_hlt() {
        let mut machine = machine("LDI 1\n\nHLT");
        machine.execute_all();
        assert!(!machine.is_halted());

        machine.load("LDI 1\nHLT");
        machine.execute_all();
        assert!(machine.is_halted());

        machine.load("JMP 300\nHLT");
        machine.execute_all();
        assert!(!machine.is_halted());
    }

    #[test]
    fn every_executed_step_moves_pc() {
        let src = "DEC x\nLDI 0\nLDB x\nADD\nJZS 6\nHLT\nJVS 0\nXCH\nST x\nLDA x\nJMP 12\nHLT\nHLT\n";
        let mut machine = machine(src);
        loop {
            let before = machine.reg.pc;
            if !machine.step() {
                break;
            }
            assert_ne!(machine.reg.pc, before, "pc stuck at {before}");
        }
        assert_eq!(machine.reg.pc, 12);
    }

    #[test]
    fn jump_lands_exactly_on_target() {
        let mut machine = machine("JMP 3\nLDI 1\nHLT\nLDI 2\nHLT");
        assert!(machine.step());
        assert_eq!(machine.reg.pc, 3);
        assert!(machine.step());
        assert_eq!(machine.reg.a, 2);
        assert_eq!(machine.reg.pc, 4);
    }

    #[test]
    fn conditional_jumps_follow_flags() {
        let mut machine = machine("JZS 5\nJVS 5\nHLT");
        machine.step();
        assert_eq!(machine.reg.pc, 1, "zero bit clear");
        machine.step();
        assert_eq!(machine.reg.pc, 2, "overflow bit clear");

        machine.reg.pc = 0;
        machine.reg.zero = true;
        machine.step();
        assert_eq!(machine.reg.pc, 5);

        machine.reg.pc = 1;
        machine.reg.overflow = true;
        machine.step();
        assert_eq!(machine.reg.pc, 5);
    }

    #[test]
    fn counting_loop_terminates() {
        // n = 3; do { n += -1 } while n != 0
        let src = "\
DEC n
DEC m
LDI 3
ST n
LDI -1
ST m
LDA n
LDB m
ADD
ST n
JZS 12
JMP 6
HLT
";
        let mut machine = machine(src);
        machine.execute_all();
        assert_eq!(machine.reg.pc, 12);
        assert_eq!(machine.reg.a, 0);
        assert!(machine.reg.zero);
        assert_eq!(machine.memory().cell(addr(0)), Some(0));
        assert_eq!(machine.memory().cell(addr(1)), Some(-1));
        assert_eq!(machine.memory().get(addr(1)).unwrap().to_string(), "m: -1");
    }

    #[test]
    fn reentering_declaration_is_plain_storage() {
        let mut machine = machine("DEC x\nLDI 5\nST x\nJMP 0\n");
        for _ in 0..4 {
            machine.step();
        }
        assert_eq!(machine.reg.pc, 0);
        assert_eq!(machine.memory().cell(addr(0)), Some(5));
        // Second arrival
        assert!(machine.step());
        assert_eq!(machine.reg.pc, 1);
        assert_eq!(machine.memory().cell(addr(0)), Some(5));
        assert_eq!(machine.symbols().resolve(Ident('x')), Some(addr(0)));
    }

    #[test]
    fn later_declaration_rebinds() {
        let mut machine = machine("DEC x\nLDI 4\nST x\nDEC x\nLDA x\nHLT");
        machine.execute_all();
        assert_eq!(machine.symbols().resolve(Ident('x')), Some(addr(3)));
        assert_eq!(machine.reg.a, 0);
        assert_eq!(machine.memory().cell(addr(0)), Some(4));
    }

    #[test]
    fn unresolved_symbols_are_no_ops() {
        let mut machine = machine("LDI 9\nLDA y\nLDB y\nST y\nHLT");
        machine.execute_all();
        assert_eq!(machine.reg.a, 9);
        assert_eq!(machine.reg.b, 0);
        assert_eq!(machine.reg.pc, 4);
        assert!(machine.symbols().is_empty());

        let pcs: Vec<i32> = machine
            .diagnostics()
            .iter()
            .map(|diag| match diag.kind {
                DiagnosticKind::UnresolvedSymbol { pc, name } => {
                    assert_eq!(name, Ident('y'));
                    pc
                }
                ref other => panic!("unexpected diagnostic {other:?}"),
            })
            .collect();
        assert_eq!(pcs, [1, 2, 3]);
    }

    #[test]
    fn use_before_declaration_is_a_no_op() {
        let mut machine = machine("LDI 3\nST x\nDEC x\nLDA x\nHLT");
        machine.execute_all();
        assert_eq!(machine.reg.a, 0);
        assert_eq!(machine.memory().cell(addr(2)), Some(0));
    }

    #[test]
    fn out_of_range_jump_is_contained() {
        for dest in [-1, MEMORY_MAX as i32, i32::MAX] {
            let mut machine = machine(&format!("JMP {dest}\n"));
            assert!(machine.step());
            assert_eq!(machine.reg.pc, dest);
            assert!(!machine.step());
            assert_eq!(machine.reg.pc, dest);
            assert_eq!(
                machine.take_diagnostics().last().map(|diag| &diag.kind),
                Some(&DiagnosticKind::PcOutOfRange { pc: dest })
            );
        }
    }

    #[test]
    fn runs_off_the_end_of_full_memory() {
        let mut machine = machine(&"LDI 1\n".repeat(MEMORY_MAX));
        machine.execute_all();
        assert_eq!(machine.reg.pc, MEMORY_MAX as i32);
    }

    #[test]
    fn load_resets_everything() {
        let mut machine = machine("DEC x\nLDI 7\nST x\nXCH\nLDI 536870911\nXCH\nLDI 1\nADD\nJMP 0");
        for _ in 0..8 {
            machine.step();
        }
        assert!(machine.reg.overflow);
        assert!(!machine.symbols().is_empty());

        machine.load("HLT\n");
        assert_eq!(*machine.registers(), RegisterFile::default());
        assert!(machine.symbols().is_empty());
        assert_eq!(machine.memory().occupied(), 1);
        assert!(machine.diagnostics().is_empty());
    }

    #[test]
    fn unreadable_file_loads_empty_program() {
        let mut machine = machine("LDI 3\nHLT");
        machine.step();
        machine.load_file("definitely/not/a/real/path.sal");
        assert_eq!(*machine.registers(), RegisterFile::default());
        assert_eq!(machine.memory().occupied(), 0);
        assert!(!machine.step());
        assert!(matches!(
            machine.diagnostics(),
            [Diagnostic {
                kind: DiagnosticKind::UnreadableSource { .. },
                ..
            }]
        ));
    }

    #[test]
    fn unknown_opcode_leaves_hole() {
        let mut machine = machine("LDI 2\nFOO\nHLT");
        machine.execute_all();
        assert_eq!(machine.reg.pc, 1);
        assert!(machine.memory().get(addr(1)).is_none());
        assert_eq!(machine.diagnostics().len(), 1);
    }

    #[test]
    fn strict_mode_keeps_control_flow() {
        let src = "LDA q\nFOO\nHLT";
        let mut lenient = machine(src);
        let mut strict = Machine::new(Options { strict: true });
        strict.load(src);
        lenient.execute_all();
        strict.execute_all();
        assert_eq!(lenient.registers(), strict.registers());
        assert_eq!(lenient.snapshot(), strict.snapshot());
        assert_eq!(lenient.diagnostics(), strict.diagnostics());
    }

    #[test]
    fn snapshot_format() {
        let mut machine = machine("DEC x\nLDI 10\nST x\nDEC y\nJMP 2\nHLT\n");
        machine.step();
        machine.step();
        machine.step();
        let snapshot = machine.snapshot();
        let lines: Vec<&str> = snapshot.lines().collect();
        assert_eq!(
            lines[..13],
            [
                "Register A: 10",
                "Register B: 0",
                "Program counter: 3",
                "Zero bit: 0",
                "Overflow bit: 0",
                "Current memory:",
                "0: x: 10",
                "1: LDI 10",
                "2: ST x",
                "3: DEC y",
                "4: JMP 2",
                "5: HLT",
                "6: null",
            ]
        );
        assert_eq!(lines.len(), 6 + MEMORY_MAX);
        assert_eq!(lines.last(), Some(&"255: null"));
        assert!(snapshot.ends_with("255: null\n"));
    }

    #[test]
    fn save_overwrites_destination() {
        let dir = std::env::temp_dir().join(format!("sal-save-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("output.txt");
        fs::write(&path, "stale contents that are much longer than nothing at all\n".repeat(400))
            .unwrap();

        let machine = machine("HLT");
        machine.save(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), machine.snapshot());
        fs::remove_dir_all(&dir).unwrap();
    }
}
