use std::io;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{bail, Result};

use sal::command::{self as shell, CommandReader, MENU};
use sal::{Machine, Options};

/// Sal runs programs written in SAL, a tiny accumulator assembly language.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.sal` file to run
    path: Option<PathBuf>,

    /// Report every tolerated problem (unknown opcodes, undeclared names, ...) as a warning
    #[arg(short, long, global = true)]
    strict: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run a `.sal` file to completion and print the final machine state
    Run {
        /// `.sal` file to run
        name: PathBuf,
        /// Also write the final machine state to this file, replacing its contents
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Load a `.sal` file without running it and report any problems
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Drive the machine one command at a time
    Repl {
        /// Program source loaded by the `i` command [default: input.sal]
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Destination written by the `s` command [default: output.txt]
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Read commands from argument before reading stdin
        #[arg(short, long)]
        command: Option<String>,
    },
}

fn main() -> miette::Result<()> {
    let args = Args::parse();
    env_logger::init();
    sal::env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(sal::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    let options = Options {
        strict: args.strict || sal::env::is_strict_enabled(),
    };

    match args.command {
        Some(Command::Run { name, save }) => run(&name, save.as_deref(), options),
        Some(Command::Check { name }) => check(&name),
        Some(Command::Repl {
            input,
            output,
            command,
        }) => repl(
            &input.unwrap_or_else(sal::env::input_path),
            &output.unwrap_or_else(sal::env::output_path),
            command,
            options,
        ),
        None => match args.path {
            Some(path) => run(&path, None, options),
            None => repl(
                &sal::env::input_path(),
                &sal::env::output_path(),
                None,
                options,
            ),
        },
    }
}

enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message(color: MsgColor, left: &str, right: &str) {
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    eprintln!("{left:>12} {right}");
}

/// Print every diagnostic collected since the last call.
fn report(machine: &mut Machine) -> usize {
    let diagnostics = machine.take_diagnostics();
    for diagnostic in &diagnostics {
        eprintln!("{:?}", diagnostic.report(Some(machine.source())));
    }
    diagnostics.len()
}

fn run(name: &Path, save: Option<&Path>, options: Options) -> Result<()> {
    file_message(MsgColor::Green, "Loading", name);
    let mut machine = Machine::new(options);
    machine.load_file(name);

    message(MsgColor::Green, "Running", "to completion");
    machine.execute_all();
    if options.strict {
        report(&mut machine);
    }

    print!("{}", machine.snapshot());
    let pc = machine.registers().pc;
    if machine.is_halted() {
        message(MsgColor::Cyan, "Halted", &format!("at address {pc}"));
    } else {
        message(MsgColor::Red, "Stopped", &format!("at address {pc}"));
    }

    if let Some(dest) = save {
        machine.save(dest)?;
        file_message(MsgColor::Green, "Saved", dest);
    }
    Ok(())
}

fn check(name: &Path) -> Result<()> {
    file_message(MsgColor::Green, "Checking", name);
    let mut machine = Machine::new(Options { strict: true });
    machine.load_file(name);
    let problems = report(&mut machine);
    if problems > 0 {
        message(MsgColor::Red, "Failed", "problems found");
        bail!("found {problems} problem(s) in {}", name.display());
    }
    message(MsgColor::Green, "Success", "no problems found!");
    Ok(())
}

fn repl(input: &Path, output: &Path, command: Option<String>, options: Options) -> Result<()> {
    let mut machine = Machine::new(options);
    let mut reader = CommandReader::new(command, io::stdin().lock());

    loop {
        println!("{MENU}");
        let Some(ch) = reader.read() else {
            break;
        };
        let Some(action) = shell::Command::from_char(ch) else {
            log::debug!("ignoring unknown command `{ch}`");
            continue;
        };
        log::debug!("command: {action}");

        match action {
            shell::Command::Input => {
                machine.load_file(input);
                println!("\n{}", machine.snapshot());
            }
            shell::Command::Debug => {
                machine.step();
                println!("\n{}", machine.snapshot());
            }
            shell::Command::Run => {
                machine.execute_all();
                println!("\n{}", machine.snapshot());
            }
            shell::Command::Save => match machine.save(output) {
                Ok(()) => file_message(MsgColor::Green, "Saved", output),
                Err(err) => eprintln!("{err:?}"),
            },
            shell::Command::Quit => break,
        }

        if options.strict {
            report(&mut machine);
        }
    }
    Ok(())
}
