//! Embedding session for the R shared library.
//!
//! `RSession::start` loads and initializes the runtime, `set_callback`
//! registers the host side of the callback ABI, and `run_loop` hands control
//! to the runtime's blocking main loop. `run_loop` consumes the session, so
//! no callback can be registered once the runtime may call them.

pub mod callbacks;
pub mod library;
pub mod locate;

use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use std::path::Path;
use std::ptr;

use tracing::{debug, info};

use crate::error::EmbedError;
use crate::interrupt::NativeInterrupter;
use callbacks::{Callback, CallbackTable};
use library::NativeLibrary;

pub use callbacks::{Answer, CallbackRole, OutputStream, SaveAction};

/// Exported since R 3.4.0; its absence means the runtime is too old
pub const VERSION_GATE_SYMBOL: &str = "R_tryCatchError";

type InitializeFn = unsafe extern "C" fn(c_int, *mut *mut c_char) -> c_int;
type MainLoopFn = unsafe extern "C" fn();

pub struct RSession {
    library: NativeLibrary,
    callbacks: CallbackTable,
    // argv strings stay alive for the whole session
    _arguments: Vec<CString>,
}

impl RSession {
    /// Load the runtime below `r_home` and initialize it with `arguments`.
    ///
    /// The runtime is ready for its loop afterwards but reads no input until
    /// `run_loop`.
    pub fn start(r_home: &Path, arguments: &[String]) -> Result<Self, EmbedError> {
        let path = locate::library_path(r_home);
        let library = NativeLibrary::open(&path)?;
        if !library.has_symbol(VERSION_GATE_SYMBOL) {
            return Err(EmbedError::UnsupportedVersion(VERSION_GATE_SYMBOL));
        }
        info!(library = %library.path().display(), "R library loaded");

        let arguments = arguments
            .iter()
            .map(|arg| CString::new(arg.as_str()).map_err(|_| EmbedError::InvalidArgument(arg.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        let mut argv: Vec<*mut c_char> = arguments.iter().map(|arg| arg.as_ptr().cast_mut()).collect();
        let argc = c_int::try_from(argv.len()).map_err(|_| EmbedError::InvalidArgument("argc".to_string()))?;

        // SAFETY: globals and functions of the loaded runtime with their
        // documented types (Rinterface.h)
        unsafe {
            // SIGINT is caught by the host and forwarded cooperatively
            library.global::<c_int>("R_SignalHandlers")?.as_ptr().write(0);

            let initialize = library.function::<InitializeFn>("Rf_initialize_R")?;
            let status = initialize(argc, argv.as_mut_ptr());
            if status < 0 {
                return Err(EmbedError::Initialize(status));
            }

            library.global::<c_int>("R_Interactive")?.as_ptr().write(1);
        }
        debug!(?arguments, "runtime initialized");

        Ok(Self {
            library,
            callbacks: CallbackTable::default(),
            _arguments: arguments,
        })
    }

    /// Register one callback role. A later registration replaces an earlier one.
    pub fn set_callback(&mut self, callback: Callback) {
        debug!(role = callback.role().name(), "callback registered");
        self.callbacks.set(callback);
    }

    pub fn interrupter(&self) -> Result<NativeInterrupter, EmbedError> {
        NativeInterrupter::new(&self.library)
    }

    /// Install the callbacks and run the runtime's main loop.
    ///
    /// Returns only if the runtime leaves its loop without exiting the
    /// process; normally its cleanup routine terminates the process.
    pub fn run_loop(self) -> Result<(), EmbedError> {
        let Self {
            library,
            callbacks,
            _arguments,
        } = self;

        callbacks::install(&library, callbacks)?;

        // SAFETY: output goes through the console-write callback once the
        // runtime's file handles are detached
        unsafe {
            library
                .global::<*mut std::ffi::c_void>("R_Outputfile")?
                .as_ptr()
                .write(ptr::null_mut());
            library
                .global::<*mut std::ffi::c_void>("R_Consolefile")?
                .as_ptr()
                .write(ptr::null_mut());

            let setup = library.function::<MainLoopFn>("setup_Rmainloop")?;
            let run = library.function::<MainLoopFn>("run_Rmainloop")?;

            info!("entering R main loop");
            setup();
            run();
        }

        debug!("R main loop returned");
        Ok(())
    }
}
