//! Shell passthrough used by the `shell` input mode.

pub mod builtins;
pub mod exec;

use std::path::PathBuf;
use std::sync::{OnceLock, RwLock};

use tracing::debug;

pub use exec::ShellResult;

/// Directory state shared by the builtins
#[derive(Debug, Default)]
pub struct ShellState {
    pub previous_dir: Option<PathBuf>,
}

static SHELL_STATE: OnceLock<RwLock<ShellState>> = OnceLock::new();

pub(crate) fn get_shell_state() -> &'static RwLock<ShellState> {
    SHELL_STATE.get_or_init(|| RwLock::new(ShellState::default()))
}

/// Split a command line into words, honoring single and double quotes
pub fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }

    // An unterminated quote runs to the end of the line
    if in_word {
        words.push(current);
    }
    words
}

/// Run one line typed in shell mode: builtins in process, anything else
/// through `sh -c`
pub fn run_line(line: &str) -> ShellResult {
    let words = split_words(line);
    let result = match words.split_first() {
        Some((name, args)) => match builtins::get_builtin(name) {
            Some(builtin) => ShellResult {
                exit_code: builtin(args) as u8,
            },
            None => exec::execute(line),
        },
        None => ShellResult { exit_code: 0 },
    };
    debug!(line, exit_code = result.exit_code, "shell command finished");
    result
}
