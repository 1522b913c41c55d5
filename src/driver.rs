//! Prompt driver: resolves one console read of the runtime.
//!
//! ```text
//! awaiting-mode -> awaiting-input -> dispatching-result -> done
//!       ^                |   \                |
//!       |                |    `-> handling-interrupt
//!       `----------------+-------------------'
//! ```
//!
//! Each call activates a mode, renders its prompt and asks the editor for a
//! line. Native modes hand the line to the runtime. Handled modes finish it
//! on the host and either end the cycle with their result or prompt again.

use std::io::Write;

use thiserror::Error;
use tracing::debug;

use crate::interrupt::Interrupter;
use crate::modes::Completion;
use crate::session::Session;

/// Conditions the line editor reports instead of a line
#[derive(Debug, Error)]
pub enum EditorError {
    #[error("end of input")]
    EndOfInput,
    #[error("interrupted")]
    Interrupted,
    #[error("terminal failure: {0}")]
    Terminal(#[from] std::io::Error),
}

pub trait LineEditor {
    /// Read one line, rendering `session.state.prompt_text` before the cursor.
    ///
    /// The prompt must follow the mode of the buffer being edited. On
    /// cancellation the editor reports the abandoned buffer through
    /// `Session::update_buffer`, so the interrupt is handled by the mode that
    /// was on screen.
    fn read_line(&mut self, session: &mut Session, add_history: bool) -> Result<String, EditorError>;
}

/// How a prompt cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Text for the runtime
    Line(String),
    /// No more input; the runtime shuts down
    EndOfInput,
    /// A native-mode interrupt was forwarded but the runtime did not leave
    /// the cycle; nothing was entered
    Abandoned,
}

pub struct PromptDriver<E, I, W> {
    session: Session,
    editor: E,
    interrupter: I,
    out: W,
    interrupted: bool,
}

impl<E, I, W> PromptDriver<E, I, W>
where
    E: LineEditor,
    I: Interrupter,
    W: Write,
{
    pub fn new(session: Session, editor: E, interrupter: I, out: W) -> Self {
        Self {
            session,
            editor,
            interrupter,
            out,
            interrupted: false,
        }
    }

    /// Resolve the runtime's request for a line shown with `message`.
    ///
    /// Errors are terminal failures of the editor and must end the process.
    pub fn resolve(&mut self, message: &str, add_history: bool) -> anyhow::Result<Resolution> {
        let interrupted = std::mem::take(&mut self.interrupted);

        // awaiting-mode
        message.clone_into(&mut self.session.state.message);
        self.session.state.buffer.clear();
        self.session.activate();
        if !interrupted && self.session.wants_new_line() {
            self.new_line()?;
        }

        loop {
            // awaiting-input
            let line = match self.editor.read_line(&mut self.session, add_history) {
                Ok(line) => line,
                Err(EditorError::EndOfInput) => {
                    debug!("end of input");
                    return Ok(Resolution::EndOfInput);
                }
                Err(EditorError::Interrupted) => {
                    // handling-interrupt
                    if self.session.current_mode().is_native() {
                        self.interrupted = true;
                        self.interrupter.set_interrupt_pending(true);
                        // May long-jump into the runtime and never return
                        self.interrupter.check_now();
                        return Ok(Resolution::Abandoned);
                    }
                    debug!(mode = self.session.current_mode().name(), "input discarded");
                    if self.session.wants_new_line() {
                        self.new_line()?;
                    }
                    self.restart();
                    continue;
                }
                Err(err @ EditorError::Terminal(_)) => return Err(err.into()),
            };

            // dispatching-result
            self.session.update_buffer(&line);
            match self.session.complete_current() {
                None => return Ok(Resolution::Line(line)),
                Some(Completion::Finished(result)) => return Ok(Resolution::Line(result)),
                Some(Completion::Continue) => {
                    if self.session.wants_new_line() {
                        self.new_line()?;
                    }
                    self.restart();
                }
            }
        }
    }

    /// Back to awaiting-mode within the same cycle
    fn restart(&mut self) {
        self.session.state.buffer.clear();
        self.session.activate();
    }

    fn new_line(&mut self) -> std::io::Result<()> {
        self.out.write_all(b"\n")?;
        self.out.flush()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn interrupter(&self) -> &I {
        &self.interrupter
    }

    pub fn editor(&self) -> &E {
        &self.editor
    }
}
