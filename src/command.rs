use std::{collections::VecDeque, fmt, io::BufRead};

/// Printed before every command is read.
pub const MENU: &str = "\
What is your next command?
i - read input, d - execute in debug mode, r - run to completion
s - save program state, q - quit";

/// Single-character shell command.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Command {
    /// Load the input file
    Input,
    /// Execute one instruction
    Debug,
    /// Run to completion
    Run,
    /// Write the snapshot to the output file
    Save,
    Quit,
}

impl Command {
    /// `None` for characters with no command attached.
    pub fn from_char(ch: char) -> Option<Self> {
        match ch {
            'i' => Some(Command::Input),
            'd' => Some(Command::Debug),
            'r' => Some(Command::Run),
            's' => Some(Command::Save),
            'q' => Some(Command::Quit),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Debug => write!(f, "debug"),
            Self::Run => write!(f, "run"),
            Self::Save => write!(f, "save"),
            Self::Quit => write!(f, "quit"),
        }
    }
}

/// Read from argument first, if `Some`. Then read from stream.
///
/// Every non-whitespace character is one command, so `idr` on a single line is three commands.
#[derive(Debug)]
pub struct CommandReader<R> {
    argument: VecDeque<char>,
    stream: R,
    /// Characters of the last line read from `stream` that are yet to be handed out
    pending: VecDeque<char>,
}

impl<R: BufRead> CommandReader<R> {
    pub fn new(argument: Option<String>, stream: R) -> Self {
        Self {
            argument: argument.unwrap_or_default().chars().collect(),
            stream,
            pending: VecDeque::new(),
        }
    }

    /// `None` indicates EOF.
    pub fn read(&mut self) -> Option<char> {
        if let Some(ch) = next_non_blank(&mut self.argument) {
            return Some(ch);
        }
        loop {
            if let Some(ch) = next_non_blank(&mut self.pending) {
                return Some(ch);
            }
            let mut line = String::new();
            match self.stream.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => self.pending.extend(line.chars()),
                Err(err) => {
                    log::warn!("failed to read command: {err}");
                    return None;
                }
            }
        }
    }
}

fn next_non_blank(chars: &mut VecDeque<char>) -> Option<char> {
    while let Some(ch) = chars.pop_front() {
        if !ch.is_whitespace() {
            return Some(ch);
        }
    }
    None
}
