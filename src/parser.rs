use crate::{
    error::{Diagnostic, DiagnosticKind},
    instr::{Instr, Opcode, OperandKind},
    span::{Idx, Span},
    symbol::{Ident, MEMORY_MAX},
};

/// Decoded program, ready to be placed into memory starting at address 0.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Program {
    /// One entry per consumed source line. `None` for lines that did not decode.
    pub slots: Vec<Option<Instr>>,
    /// Everything the decoder skipped over or defaulted.
    pub diagnostics: Vec<Diagnostic>,
}

impl Program {
    /// Number of decoded instructions.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Turns SAL source into a [`Program`], one instruction per line.
///
/// Decoding never fails. Unknown opcodes leave their slot empty but still consume an address,
/// malformed operands fall back to a default, and lines past the end of memory are dropped. Each of
/// these is recorded as a [`Diagnostic`].
pub struct Decoder<'a> {
    src: &'a str,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Decoder<'a> {
    pub fn new(src: &'a str) -> Self {
        Decoder {
            src,
            diagnostics: Vec::new(),
        }
    }

    pub fn decode(mut self) -> Program {
        let mut slots = Vec::new();
        let mut lines = Lines::new(self.src);

        while slots.len() < MEMORY_MAX {
            let Some((offs, line)) = lines.next() else {
                break;
            };
            // Address always advances, even for lines that yield nothing
            let lineno = slots.len() + 1;
            slots.push(self.decode_line(lineno, offs, line));
        }

        let ignored = lines.count();
        if ignored > 0 {
            self.push(Diagnostic::new(DiagnosticKind::Truncated { ignored }));
        }

        Program {
            slots,
            diagnostics: self.diagnostics,
        }
    }

    fn decode_line(&mut self, lineno: usize, offs: usize, line: &str) -> Option<Instr> {
        let mut words = Words::new(line);
        let Some((start, keyword)) = words.next() else {
            self.push(Diagnostic::at(
                DiagnosticKind::UnknownOpcode {
                    line: lineno,
                    keyword: String::new(),
                },
                Span::new(Idx(offs), line.len()),
            ));
            return None;
        };
        let keyword_span = Span::new(Idx(offs + start), keyword.len());

        let Ok(opcode) = keyword.parse::<Opcode>() else {
            self.push(Diagnostic::at(
                DiagnosticKind::UnknownOpcode {
                    line: lineno,
                    keyword: keyword.to_owned(),
                },
                keyword_span,
            ));
            return None;
        };

        let instr = match opcode.operand() {
            OperandKind::None => match opcode {
                Opcode::Xch => Instr::Xch,
                Opcode::Add => Instr::Add,
                _ => Instr::Hlt,
            },
            OperandKind::Ident => {
                let name = self.ident_operand(lineno, offs, opcode, keyword_span, &mut words);
                match opcode {
                    Opcode::Dec => Instr::dec(name),
                    Opcode::Lda => Instr::Lda { name },
                    Opcode::Ldb => Instr::Ldb { name },
                    _ => Instr::St { name },
                }
            }
            OperandKind::Int => {
                let value = self.int_operand(lineno, offs, opcode, keyword_span, &mut words);
                match opcode {
                    Opcode::Ldi => Instr::Ldi {
                        value: i64::from(value),
                    },
                    Opcode::Jmp => Instr::Jmp { dest: value },
                    Opcode::Jzs => Instr::Jzs { dest: value },
                    _ => Instr::Jvs { dest: value },
                }
            }
        };

        // Anything left on the line is ignored
        if let Some((start, _)) = words.next() {
            let rest = line[start..].trim_end();
            self.trailing(lineno, offs + start, rest);
        }
        Some(instr)
    }

    /// First non-blank character after the keyword.
    fn ident_operand(
        &mut self,
        lineno: usize,
        offs: usize,
        opcode: Opcode,
        keyword_span: Span,
        words: &mut Words,
    ) -> Ident {
        let Some((start, word)) = words.next() else {
            self.missing(lineno, opcode, keyword_span);
            return Ident::MISSING;
        };
        let mut chars = word.chars();
        // `Words` never yields empty words
        let name = chars.next().unwrap_or(Ident::MISSING.0);
        let rest = chars.as_str();
        if !rest.is_empty() {
            self.trailing(lineno, offs + start + name.len_utf8(), rest);
        }
        Ident(name)
    }

    /// Longest leading decimal integer of the next word. Saturates on overflow, 0 if absent.
    fn int_operand(
        &mut self,
        lineno: usize,
        offs: usize,
        opcode: Opcode,
        keyword_span: Span,
        words: &mut Words,
    ) -> i32 {
        let Some((start, word)) = words.next() else {
            self.missing(lineno, opcode, keyword_span);
            return 0;
        };

        let sign_len = usize::from(word.starts_with(['+', '-']));
        let digits_len = word[sign_len..]
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(word.len() - sign_len);
        let span = Span::new(Idx(offs + start), word.len());

        if digits_len == 0 {
            self.malformed(lineno, opcode, word, span);
            return 0;
        }

        let (number, rest) = word.split_at(sign_len + digits_len);
        let value = match number.parse::<i32>() {
            Ok(value) => value,
            Err(_) => {
                self.malformed(lineno, opcode, number, span);
                if number.starts_with('-') {
                    i32::MIN
                } else {
                    i32::MAX
                }
            }
        };
        if !rest.is_empty() {
            self.trailing(lineno, offs + start + number.len(), rest);
        }
        value
    }

    fn missing(&mut self, line: usize, opcode: Opcode, keyword_span: Span) {
        let span = Span::new(Idx(keyword_span.as_range().end), 0);
        self.push(Diagnostic::at(
            DiagnosticKind::MissingOperand { line, opcode },
            span,
        ));
    }

    fn malformed(&mut self, line: usize, opcode: Opcode, text: &str, span: Span) {
        self.push(Diagnostic::at(
            DiagnosticKind::MalformedOperand {
                line,
                opcode,
                text: text.to_owned(),
            },
            span,
        ));
    }

    fn trailing(&mut self, line: usize, offs: usize, text: &str) {
        self.push(Diagnostic::at(
            DiagnosticKind::TrailingInput {
                line,
                text: text.to_owned(),
            },
            Span::new(Idx(offs), text.len()),
        ));
    }

    fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

/// Source lines paired with their byte offset. Line terminators are not included.
struct Lines<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lines<'a> {
    fn new(src: &'a str) -> Self {
        Lines { src, pos: 0 }
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = (usize, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.src.len() {
            return None;
        }
        let start = self.pos;
        let rest = &self.src[start..];
        let (line, consumed) = match rest.find('\n') {
            Some(end) => (&rest[..end], end + 1),
            None => (rest, rest.len()),
        };
        self.pos += consumed;
        Some((start, line.strip_suffix('\r').unwrap_or(line)))
    }
}

/// Whitespace-separated words of a line, paired with their offset into it.
struct Words<'a> {
    line: &'a str,
    pos: usize,
}

impl<'a> Words<'a> {
    fn new(line: &'a str) -> Self {
        Words { line, pos: 0 }
    }
}

impl<'a> Iterator for Words<'a> {
    type Item = (usize, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.line[self.pos..];
        let start = self.pos + rest.find(|c: char| !c.is_whitespace())?;
        let len = self.line[start..]
            .find(char::is_whitespace)
            .unwrap_or(self.line.len() - start);
        self.pos = start + len;
        Some((start, &self.line[start..start + len]))
    }
}
