//! Host implementations of the runtime's console callbacks other than
//! console-read.

use std::io::{self, Write};

use crossterm::style::{Color, Stylize, style};
use tracing::{debug, info};

use crate::embed::{OutputStream, SaveAction};

/// Write runtime output: stdout as is, stderr in red
pub fn write_output<O: Write, E: Write>(
    stdout: &mut O,
    stderr: &mut E,
    bytes: &[u8],
    stream: OutputStream,
) -> io::Result<()> {
    match stream {
        OutputStream::Stdout => {
            stdout.write_all(bytes)?;
            stdout.flush()
        }
        OutputStream::Stderr => {
            let text = String::from_utf8_lossy(bytes);
            write!(stderr, "{}", style(&*text).with(Color::Red))?;
            stderr.flush()
        }
    }
}

pub fn write_console(bytes: &[u8], stream: OutputStream) {
    let result = write_output(&mut io::stdout().lock(), &mut io::stderr().lock(), bytes, stream);
    if let Err(err) = result {
        debug!(error = %err, "console write failed");
    }
}

pub fn show_message(message: &str) {
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{message}");
    let _ = stdout.flush();
}

pub fn busy(which: bool) {
    debug!(busy = which, "runtime busy state");
}

/// Host side of the runtime's cleanup; the runtime's own routine runs after
pub fn clean_up(save_action: SaveAction, status: i32, run_last: bool) {
    info!(?save_action, status, run_last, "runtime shutting down");
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}
