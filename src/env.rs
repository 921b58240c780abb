use std::{cell::RefCell, ffi::OsStr, path::PathBuf};

/// Program source read by the shell when no path is given.
pub const DEFAULT_INPUT: &str = "input.sal";
/// Snapshot destination written by the shell when no path is given.
pub const DEFAULT_OUTPUT: &str = "output.txt";

#[derive(Clone, Debug)]
struct Env {
    strict: bool,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
}

thread_local! {
    /// Must only be mutated within `set_env`
    static ENV: RefCell<Option<Env>> = const { RefCell::new(None) };
}

/// Read `SAL_STRICT`, `SAL_INPUT` and `SAL_OUTPUT` from the process environment.
pub fn init() {
    let value = Env {
        strict: var_is("SAL_STRICT", "1"),
        input: std::env::var_os("SAL_INPUT").map(PathBuf::from),
        output: std::env::var_os("SAL_OUTPUT").map(PathBuf::from),
    };
    set_env(value);
}

pub fn is_strict_enabled() -> bool {
    with_env(|env| env.strict)
}

pub fn input_path() -> PathBuf {
    with_env(|env| env.input.clone()).unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT))
}

pub fn output_path() -> PathBuf {
    with_env(|env| env.output.clone()).unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT))
}

fn set_env(value: Env) {
    ENV.with(|env| {
        let mut env = env.borrow_mut();
        assert!(
            env.is_none(),
            "tried to initialize environment state multiple times"
        );
        *env = Some(value);
    });
}

fn with_env<F, R>(callback: F) -> R
where
    F: Fn(&Env) -> R,
{
    ENV.with(|env| {
        let env = env.borrow();
        let env = env.as_ref().unwrap_or_else(|| {
            panic!("tried to access environment state before initialization");
        });
        callback(env)
    })
}

fn var_is(name: impl AsRef<OsStr>, value: impl AsRef<str>) -> bool {
    std::env::var(name.as_ref()).is_ok_and(|v| v == value.as_ref())
}
