//! Callback roles and the native trampolines behind them.
//!
//! The runtime keeps bare function pointers. It only ever sees the static
//! `extern "C"` trampolines in this module; the host closures they dispatch
//! to live in a table leaked at `run_loop`, so they outlive every native
//! reference to them.

use std::cell::{Cell, RefCell};
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_uchar};
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;

use anyhow::{Context, anyhow};
use tracing::debug;

use super::library::NativeLibrary;
use crate::error::{EmbedError, fatal};

type ReadConsoleFn = unsafe extern "C" fn(*const c_char, *mut c_uchar, c_int, c_int) -> c_int;
type WriteConsoleExFn = unsafe extern "C" fn(*const c_char, c_int, c_int);
type WriteConsoleFn = unsafe extern "C" fn(*const c_char, c_int);
type BusyFn = unsafe extern "C" fn(c_int);
type ShowMessageFn = unsafe extern "C" fn(*const c_char);
type PolledEventsFn = unsafe extern "C" fn();
type CleanUpFn = unsafe extern "C" fn(c_int, c_int, c_int);

pub type ReadConsole = dyn FnMut(&str, bool) -> anyhow::Result<Option<String>>;
pub type WriteConsole = dyn FnMut(&[u8], OutputStream);
pub type Busy = dyn FnMut(bool);
pub type ShowMessage = dyn FnMut(&str);
pub type YesNoCancel = dyn FnMut(&str) -> anyhow::Result<Answer>;
pub type PolledEvents = dyn FnMut();
pub type CleanUp = dyn FnMut(SaveAction, i32, bool);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackRole {
    ReadConsole,
    WriteConsole,
    Busy,
    ShowMessage,
    YesNoCancel,
    PolledEvents,
    CleanUp,
}

impl CallbackRole {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadConsole => "console-read",
            Self::WriteConsole => "console-write",
            Self::Busy => "busy-notify",
            Self::ShowMessage => "show-message",
            Self::YesNoCancel => "ask-yes-no-cancel",
            Self::PolledEvents => "polled-events",
            Self::CleanUp => "cleanup",
        }
    }

    /// Native function-pointer slot for the role.
    ///
    /// The unix runtime has no yes/no/cancel slot; it asks through the
    /// console instead.
    pub fn slot(&self) -> Option<&'static str> {
        match self {
            Self::ReadConsole => Some("ptr_R_ReadConsole"),
            Self::WriteConsole => Some("ptr_R_WriteConsoleEx"),
            Self::Busy => Some("ptr_R_Busy"),
            Self::ShowMessage => Some("ptr_R_ShowMessage"),
            Self::YesNoCancel => None,
            Self::PolledEvents => Some("R_PolledEvents"),
            Self::CleanUp => Some("ptr_R_CleanUp"),
        }
    }
}

/// One host callback, tagged with its role
pub enum Callback {
    ReadConsole(Box<ReadConsole>),
    WriteConsole(Box<WriteConsole>),
    Busy(Box<Busy>),
    ShowMessage(Box<ShowMessage>),
    YesNoCancel(Box<YesNoCancel>),
    PolledEvents(Box<PolledEvents>),
    CleanUp(Box<CleanUp>),
}

impl Callback {
    pub fn role(&self) -> CallbackRole {
        match self {
            Self::ReadConsole(_) => CallbackRole::ReadConsole,
            Self::WriteConsole(_) => CallbackRole::WriteConsole,
            Self::Busy(_) => CallbackRole::Busy,
            Self::ShowMessage(_) => CallbackRole::ShowMessage,
            Self::YesNoCancel(_) => CallbackRole::YesNoCancel,
            Self::PolledEvents(_) => CallbackRole::PolledEvents,
            Self::CleanUp(_) => CallbackRole::CleanUp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    fn from_raw(otype: c_int) -> Self {
        if otype == 0 { Self::Stdout } else { Self::Stderr }
    }
}

/// Reply to a yes/no/cancel question, encoded the way the runtime expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    Cancel,
}

impl Answer {
    pub fn to_raw(self) -> c_int {
        match self {
            Self::Yes => 1,
            Self::No => -1,
            Self::Cancel => 0,
        }
    }
}

/// The runtime's `SA_TYPE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveAction {
    NoRestore,
    Restore,
    Default,
    NoSave,
    Save,
    SaveAsk,
    Suicide,
    Other(i32),
}

impl SaveAction {
    pub fn from_raw(raw: c_int) -> Self {
        match raw {
            0 => Self::NoRestore,
            1 => Self::Restore,
            2 => Self::Default,
            3 => Self::NoSave,
            4 => Self::Save,
            5 => Self::SaveAsk,
            6 => Self::Suicide,
            other => Self::Other(other),
        }
    }
}

/// Input the runtime's fixed-size console buffer could not take yet
#[derive(Debug, Default)]
pub struct PendingInput {
    bytes: Vec<u8>,
}

impl PendingInput {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Copy as much pending input as fits into `out`, NUL-terminated.
    ///
    /// Splits on a UTF-8 character boundary whenever the buffer allows it.
    /// Returns the number of bytes delivered.
    pub fn fill(&mut self, out: &mut [u8]) -> usize {
        if out.is_empty() {
            return 0;
        }

        let room = out.len() - 1;
        let mut take = self.bytes.len().min(room);
        if take < self.bytes.len() {
            while take > 0 && is_continuation(self.bytes[take]) {
                take -= 1;
            }
            if take == 0 {
                take = self.bytes.len().min(room);
            }
        }

        out[..take].copy_from_slice(&self.bytes[..take]);
        out[take] = 0;
        self.bytes.drain(..take);
        take
    }
}

fn is_continuation(byte: u8) -> bool {
    byte & 0b1100_0000 == 0b1000_0000
}

/// Host closures, one per registered role
#[derive(Default)]
pub struct CallbackTable {
    read_console: Option<RefCell<Box<ReadConsole>>>,
    write_console: Option<RefCell<Box<WriteConsole>>>,
    busy: Option<RefCell<Box<Busy>>>,
    show_message: Option<RefCell<Box<ShowMessage>>>,
    yes_no_cancel: Option<RefCell<Box<YesNoCancel>>>,
    polled_events: Option<RefCell<Box<PolledEvents>>>,
    clean_up: Option<RefCell<Box<CleanUp>>>,
    pending_input: RefCell<PendingInput>,
}

impl CallbackTable {
    pub fn set(&mut self, callback: Callback) {
        let role = callback.role();
        let replaced = match callback {
            Callback::ReadConsole(f) => self.read_console.replace(RefCell::new(f)).is_some(),
            Callback::WriteConsole(f) => self.write_console.replace(RefCell::new(f)).is_some(),
            Callback::Busy(f) => self.busy.replace(RefCell::new(f)).is_some(),
            Callback::ShowMessage(f) => self.show_message.replace(RefCell::new(f)).is_some(),
            Callback::YesNoCancel(f) => self.yes_no_cancel.replace(RefCell::new(f)).is_some(),
            Callback::PolledEvents(f) => self.polled_events.replace(RefCell::new(f)).is_some(),
            Callback::CleanUp(f) => self.clean_up.replace(RefCell::new(f)).is_some(),
        };
        if replaced {
            debug!(role = role.name(), "callback replaced");
        }
    }

    pub fn has(&self, role: CallbackRole) -> bool {
        match role {
            CallbackRole::ReadConsole => self.read_console.is_some(),
            CallbackRole::WriteConsole => self.write_console.is_some(),
            CallbackRole::Busy => self.busy.is_some(),
            CallbackRole::ShowMessage => self.show_message.is_some(),
            CallbackRole::YesNoCancel => self.yes_no_cancel.is_some(),
            CallbackRole::PolledEvents => self.polled_events.is_some(),
            CallbackRole::CleanUp => self.clean_up.is_some(),
        }
    }
}

thread_local! {
    static INSTALLED: Cell<Option<&'static CallbackTable>> = const { Cell::new(None) };
}

static ORIGINAL_CLEANUP: OnceLock<CleanUpFn> = OnceLock::new();

/// Point the runtime's slots at the trampolines.
///
/// The table is leaked so the closures outlive the main loop and every
/// pointer the runtime holds.
pub(crate) fn install(library: &NativeLibrary, callbacks: CallbackTable) -> Result<(), EmbedError> {
    let table: &'static CallbackTable = Box::leak(Box::new(callbacks));
    INSTALLED.set(Some(table));

    // SAFETY: every slot below is a function-pointer global of the runtime
    // whose signature matches the trampoline written into it.
    unsafe {
        if table.has(CallbackRole::ReadConsole) {
            set_slot::<ReadConsoleFn>(library, CallbackRole::ReadConsole, read_console)?;
        }
        if table.has(CallbackRole::WriteConsole) {
            library
                .global::<Option<WriteConsoleFn>>("ptr_R_WriteConsole")?
                .as_ptr()
                .write(None);
            set_slot::<WriteConsoleExFn>(library, CallbackRole::WriteConsole, write_console)?;
        }
        if table.has(CallbackRole::Busy) {
            set_slot::<BusyFn>(library, CallbackRole::Busy, busy)?;
        }
        if table.has(CallbackRole::ShowMessage) {
            set_slot::<ShowMessageFn>(library, CallbackRole::ShowMessage, show_message)?;
        }
        if table.has(CallbackRole::PolledEvents) {
            set_slot::<PolledEventsFn>(library, CallbackRole::PolledEvents, polled_events)?;
        }
        if table.has(CallbackRole::CleanUp) {
            let slot = library.global::<Option<CleanUpFn>>("ptr_R_CleanUp")?;
            if let Some(original) = slot.as_ptr().read() {
                let _ = ORIGINAL_CLEANUP.set(original);
            }
            slot.as_ptr().write(Some(clean_up));
        }
    }

    if table.has(CallbackRole::YesNoCancel) {
        debug!("no yes/no/cancel slot on this platform; the runtime asks through console-read");
    }

    debug!("callbacks installed");
    Ok(())
}

/// # Safety
///
/// `F` must be the exact pointer type of the slot's global.
unsafe fn set_slot<F>(library: &NativeLibrary, role: CallbackRole, trampoline: F) -> Result<(), EmbedError> {
    let name = role.slot().ok_or_else(|| EmbedError::MissingSymbol(role.name().to_string()))?;
    let slot = library.global::<Option<F>>(name)?;
    // SAFETY: upheld by the caller
    unsafe { slot.as_ptr().write(Some(trampoline)) };
    debug!(role = role.name(), slot = name, "slot set");
    Ok(())
}

fn installed() -> anyhow::Result<&'static CallbackTable> {
    INSTALLED
        .get()
        .ok_or_else(|| anyhow!("runtime callback invoked outside the main loop"))
}

/// Run a callback body without letting a panic or an error cross into the
/// runtime's frames.
fn guarded<R>(role: CallbackRole, body: impl FnOnce() -> anyhow::Result<R>) -> R {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => fatal(role.name(), &err),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            fatal(role.name(), &anyhow!("panic: {message}"))
        }
    }
}

fn lossy(text: *const c_char) -> String {
    if text.is_null() {
        return String::new();
    }
    // SAFETY: the runtime passes NUL-terminated strings
    unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned()
}

unsafe extern "C" fn read_console(
    prompt: *const c_char,
    buf: *mut c_uchar,
    buflen: c_int,
    add_history: c_int,
) -> c_int {
    guarded(CallbackRole::ReadConsole, || {
        let table = installed()?;
        let capacity = usize::try_from(buflen).context("negative console buffer length")?;
        // SAFETY: the runtime hands out a writable buffer of `buflen` bytes
        let out = unsafe { std::slice::from_raw_parts_mut(buf, capacity) };

        if !table.pending_input.borrow().is_empty() {
            table.pending_input.borrow_mut().fill(out);
            return Ok(1);
        }

        let reader = table
            .read_console
            .as_ref()
            .context("no console reader registered")?;
        let prompt = lossy(prompt);

        // No borrow guard is held here: the reader may leave through
        // `Interrupter::check_now`, which long-jumps over this frame.
        // SAFETY: the runtime never re-enters console-read while it waits
        // for a line, so this is the only live reference.
        let reader = unsafe { &mut *reader.as_ptr() };

        match reader(&prompt, add_history != 0)? {
            Some(mut line) => {
                line.push('\n');
                let mut pending = table.pending_input.borrow_mut();
                pending.push(line.as_bytes());
                pending.fill(out);
                Ok(1)
            }
            None => Ok(0),
        }
    })
}

unsafe extern "C" fn write_console(buf: *const c_char, buflen: c_int, otype: c_int) {
    guarded(CallbackRole::WriteConsole, || {
        let table = installed()?;
        let len = usize::try_from(buflen).unwrap_or(0);
        let bytes = if buf.is_null() || len == 0 {
            &[][..]
        } else {
            // SAFETY: the runtime passes `buflen` readable bytes
            unsafe { std::slice::from_raw_parts(buf.cast::<u8>(), len) }
        };
        if let Some(writer) = &table.write_console {
            (writer.try_borrow_mut()?)(bytes, OutputStream::from_raw(otype));
        }
        Ok(())
    })
}

unsafe extern "C" fn busy(which: c_int) {
    guarded(CallbackRole::Busy, || {
        if let Some(callback) = &installed()?.busy {
            (callback.try_borrow_mut()?)(which != 0);
        }
        Ok(())
    })
}

unsafe extern "C" fn show_message(message: *const c_char) {
    guarded(CallbackRole::ShowMessage, || {
        if let Some(callback) = &installed()?.show_message {
            (callback.try_borrow_mut()?)(&lossy(message));
        }
        Ok(())
    })
}

unsafe extern "C" fn polled_events() {
    guarded(CallbackRole::PolledEvents, || {
        if let Some(callback) = &installed()?.polled_events {
            // Re-entry happens when a callback itself triggers a poll; skip it
            if let Ok(mut callback) = callback.try_borrow_mut() {
                callback();
            }
        }
        Ok(())
    })
}

unsafe extern "C" fn clean_up(save_action: c_int, status: c_int, run_last: c_int) {
    guarded(CallbackRole::CleanUp, || {
        if let Some(callback) = &installed()?.clean_up {
            (callback.try_borrow_mut()?)(SaveAction::from_raw(save_action), status, run_last != 0);
        }
        Ok(())
    });

    if let Some(original) = ORIGINAL_CLEANUP.get() {
        // SAFETY: the runtime's own cleanup routine, called with its arguments
        unsafe { original(save_action, status, run_last) };
    }
}
