use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reedline::{
    FileBackedHistory, Highlighter, Prompt, PromptEditMode, PromptHistorySearch,
    PromptHistorySearchStatus, Reedline, Signal, StyledText,
};
use tracing::{debug, warn};

use crate::driver::{EditorError, LineEditor};
use crate::modes::ModeRegistry;
use crate::session::{Session, SessionState};

const HISTORY_CAPACITY: usize = 20_000;

/// Session state as seen while the editor owns the terminal.
///
/// reedline runs the highlighter on every repaint, before it draws the
/// prompt. Re-running activation there keeps the prompt in step with the
/// buffer: typing `;` shows the shell prompt, deleting it brings the R prompt
/// back.
#[derive(Clone)]
pub struct LiveMode {
    modes: Arc<ModeRegistry>,
    state: Arc<Mutex<SessionState>>,
}

impl LiveMode {
    pub fn new(modes: Arc<ModeRegistry>) -> Self {
        Self {
            modes,
            state: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a read from the session's current state
    pub fn begin(&self, state: &SessionState) {
        *self.lock() = state.clone();
    }

    /// Record the buffer after an edit and re-activate
    pub fn edit(&self, buffer: &str) {
        let mut state = self.lock();
        if state.buffer != buffer {
            buffer.clone_into(&mut state.buffer);
            self.modes.render(&mut state);
        }
    }

    pub fn prompt_text(&self) -> String {
        self.lock().prompt_text.clone()
    }

    pub fn buffer(&self) -> String {
        self.lock().buffer.clone()
    }

    /// Hand the last edited buffer back to the session, so a cancelled read
    /// is judged by the mode that was on screen
    pub fn sync(&self, session: &mut Session) {
        session.update_buffer(&self.buffer());
    }
}

impl Highlighter for LiveMode {
    fn highlight(&self, line: &str, _cursor: usize) -> StyledText {
        self.edit(line);
        let mut styled = StyledText::new();
        styled.push((Default::default(), line.to_string()));
        styled
    }
}

/// Prompt rendered from the live session state
struct ModePrompt {
    live: LiveMode,
}

impl Prompt for ModePrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        // Reset to the default terminal color before the prompt
        Cow::Owned(format!("\x1b[0m{}", self.live.prompt_text()))
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _mode: PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "failing ",
        };
        Cow::Owned(format!("({}reverse search) ", prefix))
    }
}

/// `LineEditor` backed by reedline
pub struct ReedlineEditor {
    line_editor: Reedline,
    live: LiveMode,
}

impl ReedlineEditor {
    pub fn new(history: Option<PathBuf>, modes: Arc<ModeRegistry>) -> Self {
        let live = LiveMode::new(modes);
        let mut line_editor = Reedline::create().with_highlighter(Box::new(live.clone()));

        if let Some(path) = history {
            match FileBackedHistory::with_file(HISTORY_CAPACITY, path.clone()) {
                Ok(history) => {
                    debug!(path = %path.display(), "history file attached");
                    line_editor = line_editor.with_history(Box::new(history));
                }
                Err(err) => warn!(path = %path.display(), error = %err, "history file unavailable"),
            }
        }

        Self { line_editor, live }
    }
}

impl LineEditor for ReedlineEditor {
    fn read_line(&mut self, session: &mut Session, _add_history: bool) -> Result<String, EditorError> {
        self.live.begin(&session.state);
        let prompt = ModePrompt {
            live: self.live.clone(),
        };

        match self.line_editor.read_line(&prompt) {
            Ok(Signal::Success(line)) => Ok(line),
            Ok(Signal::CtrlC) => {
                self.live.sync(session);
                Err(EditorError::Interrupted)
            }
            Ok(Signal::CtrlD) => Err(EditorError::EndOfInput),
            Err(err) => Err(EditorError::Terminal(err)),
        }
    }
}
