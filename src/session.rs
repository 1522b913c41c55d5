use std::sync::Arc;

use tracing::debug;

use crate::modes::{Completion, ModeDescriptor, ModeId, ModeRegistry};

/// Default prompts of the runtime (`options(prompt, continue)`).
///
/// The `r` and `shell` activators match these literally. A session that sets
/// a custom `options(prompt = ...)` lands in the fallback mode: no shell
/// passthrough and no separator line.
pub const TOP_LEVEL_PROMPT: &str = "> ";
pub const CONTINUE_PROMPT: &str = "+ ";

/// State visible to mode activators and handlers
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Prompt requested by the runtime for the pending console read
    pub message: String,
    /// Current contents of the editable buffer
    pub buffer: String,
    /// Text rendered before the cursor
    pub prompt_text: String,
    pub insert_new_line: bool,
    /// Shell mode stays active across lines until an empty line
    pub shell_active: bool,
}

/// Process-wide interactive session: the static mode set and which of them
/// is active.
pub struct Session {
    pub state: SessionState,
    modes: Arc<ModeRegistry>,
    current: ModeId,
}

impl Session {
    pub fn new(modes: impl Into<Arc<ModeRegistry>>, insert_new_line: bool) -> Self {
        Self {
            state: SessionState {
                insert_new_line,
                ..SessionState::default()
            },
            modes: modes.into(),
            current: ModeId::Fallback,
        }
    }

    /// Run the activation pass, record the winner and re-render the prompt
    pub fn activate(&mut self) -> ModeId {
        let id = self.modes.render(&mut self.state);
        if id != self.current {
            debug!(
                from = self.modes.get(self.current).name(),
                to = self.modes.get(id).name(),
                "mode switch"
            );
        }
        self.current = id;
        id
    }

    /// Record an edit of the buffer. The active mode may change with it, the
    /// way typing `;` at the start of a line switches to shell mode.
    pub fn update_buffer(&mut self, text: &str) -> ModeId {
        text.clone_into(&mut self.state.buffer);
        self.activate()
    }

    pub fn current_mode(&self) -> &ModeDescriptor {
        self.modes.get(self.current)
    }

    pub fn current_mode_id(&self) -> ModeId {
        self.current
    }

    /// Finish the buffer with the current mode's `on_done`
    pub fn complete_current(&mut self) -> Option<Completion> {
        self.modes.get(self.current).complete(&mut self.state)
    }

    /// Both the session toggle and the current mode ask for separation
    pub fn wants_new_line(&self) -> bool {
        self.state.insert_new_line && self.current_mode().inserts_new_line()
    }
}
