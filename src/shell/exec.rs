use std::ffi::{CStr, CString};

use nix::errno::Errno;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, execv, fork};
use tracing::warn;

const SHELL: &CStr = c"/bin/sh";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellResult {
    pub exit_code: u8,
}

/// Run a command line with `sh -c` in a child process and wait for it
pub fn execute(command: &str) -> ShellResult {
    let argv = match ["sh", "-c", command]
        .into_iter()
        .map(CString::new)
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(argv) => argv,
        Err(_) => {
            eprintln!("sh: command contains a NUL byte");
            return ShellResult { exit_code: 1 };
        }
    };

    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => wait_for_child(child),
        Ok(ForkResult::Child) => {
            if let Err(err) = execv(SHELL, &argv) {
                eprintln!("Failed to execute {}: {}", SHELL.to_string_lossy(), err);
            }
            std::process::exit(127);
        }
        Err(e) => {
            eprintln!("fork failed: {}", e);
            ShellResult { exit_code: 1 }
        }
    }
}

/// Wait for a child and convert its status to ShellResult
fn wait_for_child(child: Pid) -> ShellResult {
    loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_pid, exit_code)) => {
                return ShellResult {
                    exit_code: exit_code as u8,
                };
            }
            Ok(WaitStatus::Signaled(_pid, signal, _core_dump)) => {
                return ShellResult {
                    exit_code: 128 + (signal as i32) as u8,
                };
            }
            Ok(status) => {
                warn!(?status, "unexpected wait status");
            }
            Err(Errno::EINTR) => {}
            Err(e) => {
                eprintln!("waitpid failed: {}", e);
                return ShellResult { exit_code: 1 };
            }
        }
    }
}
