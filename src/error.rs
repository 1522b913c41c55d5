use std::backtrace::Backtrace;
use std::io::Write;
use std::path::PathBuf;

use thiserror::Error;

/// Failures while locating, loading or starting the R runtime
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("cannot find R home; expose the R binary via `PATH`, set `R_HOME`, or pass --r-home")]
    RHomeNotFound,

    #[error("cannot locate R shared library at {}", .0.display())]
    LibraryNotFound(PathBuf),

    #[error("cannot load R shared library {}: {reason}", path.display())]
    LibraryLoad { path: PathBuf, reason: String },

    #[error("R shared library does not export `{0}`")]
    MissingSymbol(String),

    #[error("rterm requires R 3.4.0 or above (`{0}` is missing)")]
    UnsupportedVersion(&'static str),

    #[error("argument contains an interior NUL byte: {0:?}")]
    InvalidArgument(String),

    #[error("Rf_initialize_R failed with status {0}")]
    Initialize(i32),
}

/// Report an unexpected internal error and terminate the process.
///
/// Used at every boundary where an error would otherwise travel into native
/// frames of the runtime.
pub fn fatal(context: &str, err: &anyhow::Error) -> ! {
    tracing::error!(context, error = %err, "unexpected error");

    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "unexpected error was caught in {context}.");
    let _ = writeln!(stderr, "please report such errors to the rterm issue tracker.");
    let _ = writeln!(stderr, "{err:?}");
    let _ = writeln!(stderr, "{}", Backtrace::force_capture());
    let _ = stderr.flush();

    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_gate_message_names_symbol() {
        let err = EmbedError::UnsupportedVersion("R_tryCatchError");
        let msg = err.to_string();
        assert!(msg.contains("3.4.0"));
        assert!(msg.contains("R_tryCatchError"));
    }

    #[test]
    fn library_not_found_shows_path() {
        let err = EmbedError::LibraryNotFound(PathBuf::from("/opt/R/lib/libR.so"));
        assert!(err.to_string().contains("/opt/R/lib/libR.so"));
    }
}
