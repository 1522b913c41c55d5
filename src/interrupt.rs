//! Cooperative cancellation between the host and the runtime.
//!
//! The runtime cannot be preempted. A cancellation only raises its
//! interrupt-pending flag; the abort happens when the runtime itself checks
//! that flag at one of its safe points, or when the host forces a check
//! through `check_now`.

use std::io;
use std::os::raw::c_int;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::SIGINT;
use tracing::debug;

use crate::embed::library::NativeLibrary;
use crate::error::EmbedError;

/// Access to the runtime's cooperative interrupt protocol
pub trait Interrupter {
    /// Request (or withdraw) an abort at the runtime's next checkpoint
    fn set_interrupt_pending(&self, pending: bool);

    /// Make the runtime check its flag now.
    ///
    /// With the flag raised this long-jumps to the runtime's nearest
    /// protected frame and does not return. Host frames in between are not
    /// unwound, so no value with a destructor may be live across this call.
    fn check_now(&self);
}

/// Location of the runtime's interrupt-pending flag
#[derive(Debug, Clone, Copy)]
pub enum InterruptFlag {
    /// `R_interrupts_pending`, exported by unix builds
    Pending(NonNull<c_int>),
    /// `UserBreak`, exported by Windows builds
    UserBreak(NonNull<c_int>),
}

impl InterruptFlag {
    pub fn resolve(library: &NativeLibrary) -> Result<Self, EmbedError> {
        if cfg!(windows) {
            Ok(Self::UserBreak(library.symbol("UserBreak")?.cast()))
        } else {
            Ok(Self::Pending(library.symbol("R_interrupts_pending")?.cast()))
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Pending(_) => "R_interrupts_pending",
            Self::UserBreak(_) => "UserBreak",
        }
    }

    pub fn set(&self, pending: bool) {
        let (Self::Pending(ptr) | Self::UserBreak(ptr)) = self;
        // SAFETY: the pointer comes from the loaded runtime (or a test local)
        // and refers to a plain int for the lifetime of the library
        unsafe { ptr.as_ptr().write_volatile(c_int::from(pending)) };
    }

    pub fn get(&self) -> bool {
        let (Self::Pending(ptr) | Self::UserBreak(ptr)) = self;
        // SAFETY: see `set`
        unsafe { ptr.as_ptr().read_volatile() != 0 }
    }
}

type CheckUserInterrupt = unsafe extern "C" fn();

/// Interrupter backed by the loaded runtime
#[derive(Clone, Copy)]
pub struct NativeInterrupter {
    flag: InterruptFlag,
    check: CheckUserInterrupt,
}

impl NativeInterrupter {
    pub fn new(library: &NativeLibrary) -> Result<Self, EmbedError> {
        let flag = InterruptFlag::resolve(library)?;
        // SAFETY: R_CheckUserInterrupt is `void R_CheckUserInterrupt(void)`
        let check = unsafe { library.function::<CheckUserInterrupt>("R_CheckUserInterrupt")? };
        debug!(flag = flag.symbol(), "interrupt bridge ready");
        Ok(Self { flag, check })
    }
}

impl Interrupter for NativeInterrupter {
    fn set_interrupt_pending(&self, pending: bool) {
        self.flag.set(pending);
    }

    fn check_now(&self) {
        // SAFETY: only called from the runtime's own thread while it waits in
        // a console callback. May long-jump, see the trait docs.
        unsafe { (self.check)() }
    }
}

/// SIGINT observed while the runtime evaluates.
///
/// The runtime's own signal handlers are disabled, so the handler only sets
/// this latch. The polled-events callback forwards it into the runtime flag,
/// which keeps the signal handler free of any runtime access.
#[derive(Clone, Default)]
pub struct SignalLatch(Arc<AtomicBool>);

impl SignalLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self) -> io::Result<()> {
        signal_hook::flag::register(SIGINT, Arc::clone(&self.0))?;
        Ok(())
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    /// Move a caught signal into the runtime's pending flag
    pub fn forward(&self, interrupter: &impl Interrupter) -> bool {
        let caught = self.take();
        if caught {
            debug!("forwarding SIGINT to runtime");
            interrupter.set_interrupt_pending(true);
        }
        caught
    }
}
