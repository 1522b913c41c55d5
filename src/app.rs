//! Wiring: locate and start the runtime, connect the callbacks to the
//! prompt driver and console, run the main loop.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::Args;
use crate::console;
use crate::driver::{PromptDriver, Resolution};
use crate::editor::ReedlineEditor;
use crate::embed::callbacks::Callback;
use crate::embed::{RSession, locate};
use crate::interrupt::SignalLatch;
use crate::modes::default_registry;
use crate::session::Session;

pub fn print_version(args: &Args) {
    println!("rterm version: {}", env!("CARGO_PKG_VERSION"));
    match locate::r_home(args.r_home.as_deref()) {
        Ok(home) => {
            println!("r home: {}", home.display());
            println!("r library: {}", locate::library_path(&home).display());
        }
        Err(_) => {
            println!("r home: NA");
            println!("r library: NA");
        }
    }
}

pub fn run(args: Args) -> Result<()> {
    let r_home = locate::r_home(args.r_home.as_deref())?;
    export_environment(&args, &r_home);

    let runtime_args = args.runtime_args();
    let mut rs = RSession::start(&r_home, &runtime_args)
        .with_context(|| format!("failed to start R from {}", r_home.display()))?;
    let interrupter = rs.interrupter()?;

    let latch = SignalLatch::new();
    latch
        .install()
        .context("failed to install SIGINT handler")?;

    let history = history_file(&args);
    let modes = Arc::new(default_registry());
    let session = Session::new(Arc::clone(&modes), !args.no_insert_new_line);
    let editor = ReedlineEditor::new(history, modes);
    let mut driver = PromptDriver::new(session, editor, interrupter, io::stdout());

    let read_latch = latch.clone();
    rs.set_callback(Callback::ReadConsole(Box::new(move |prompt, add_history| {
        // Signals caught while editing or running shell commands are not
        // meant for the next evaluation
        read_latch.take();
        let resolution = driver.resolve(prompt, add_history)?;
        read_latch.take();

        Ok(match resolution {
            Resolution::Line(line) => Some(line),
            Resolution::EndOfInput => None,
            Resolution::Abandoned => Some(String::new()),
        })
    })));
    for callback in console_callbacks() {
        rs.set_callback(callback);
    }
    rs.set_callback(Callback::PolledEvents(Box::new(move || {
        latch.forward(&interrupter);
    })));

    if !args.quiet {
        println!("rterm {} -- R at {}", env!("CARGO_PKG_VERSION"), r_home.display());
        println!("Type ';' at the start of a line for shell mode, Ctrl+D to quit");
    }

    info!("starting R main loop");
    rs.run_loop()?;
    debug!("main loop returned without exiting");
    Ok(())
}

/// Console output, notifications and cleanup.
///
/// Yes/no/cancel questions are not wired: unix builds have no slot for them
/// and ask through console-read instead.
fn console_callbacks() -> Vec<Callback> {
    vec![
        Callback::WriteConsole(Box::new(console::write_console)),
        Callback::Busy(Box::new(console::busy)),
        Callback::ShowMessage(Box::new(console::show_message)),
        Callback::CleanUp(Box::new(console::clean_up)),
    ]
}

/// Variables the runtime reads from the environment during initialization
fn export_environment(args: &Args, r_home: &Path) {
    let dirs = locate::r_dirs(r_home);
    debug!(?dirs, "R directories");

    // SAFETY: still single-threaded, before the runtime starts
    unsafe {
        std::env::set_var("R_HOME", r_home);
        for (name, dir) in dirs.env_vars() {
            std::env::set_var(name, dir);
        }
        for name in args.blanked_env_vars() {
            std::env::set_var(name, "");
        }
    }
}

fn history_file(args: &Args) -> Option<PathBuf> {
    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            warn!(error = %e, "cannot read current directory, skipping local history");
            PathBuf::from(".")
        }
    };
    if let Err(e) = args.prepare_history(&cwd) {
        warn!(error = %e, "cannot create local history file");
    }
    args.history_path(&cwd, home::home_dir().as_deref())
}
