use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rterm::driver::{EditorError, LineEditor, PromptDriver, Resolution};
use rterm::editor::LiveMode;
use rterm::interrupt::Interrupter;
use rterm::modes::{ModeDescriptor, ModeRegistry, default_registry, unknown_mode};
use rterm::session::Session;

enum Step {
    /// Type the text and press Enter
    Type(&'static str),
    /// Type the text and press Ctrl+C
    Cancel(&'static str),
    Eof,
    Fail,
}

/// Plays back a script through the same live-mode tracking the reedline
/// editor uses, recording the prompt on screen when each read ends
struct ScriptedEditor {
    live: LiveMode,
    steps: VecDeque<Step>,
    prompts: Vec<String>,
}

impl ScriptedEditor {
    fn new(modes: Arc<ModeRegistry>, steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            live: LiveMode::new(modes),
            steps: steps.into_iter().collect(),
            prompts: Vec::new(),
        }
    }
}

impl LineEditor for ScriptedEditor {
    fn read_line(&mut self, session: &mut Session, _add_history: bool) -> Result<String, EditorError> {
        self.live.begin(&session.state);
        let step = self.steps.pop_front().unwrap_or(Step::Eof);
        if let Step::Type(text) | Step::Cancel(text) = step {
            self.live.edit(text);
        }
        self.prompts.push(self.live.prompt_text());

        match step {
            Step::Type(text) => Ok(text.to_string()),
            Step::Cancel(_) => {
                self.live.sync(session);
                Err(EditorError::Interrupted)
            }
            Step::Eof => Err(EditorError::EndOfInput),
            Step::Fail => Err(EditorError::Terminal(io::Error::other("tty gone"))),
        }
    }
}

#[derive(Default)]
struct RecordingInterrupter {
    pending: RefCell<Vec<bool>>,
    checks: Cell<usize>,
}

impl Interrupter for RecordingInterrupter {
    fn set_interrupt_pending(&self, pending: bool) {
        self.pending.borrow_mut().push(pending);
    }

    fn check_now(&self) {
        self.checks.set(self.checks.get() + 1);
    }
}

type TestDriver = PromptDriver<ScriptedEditor, RecordingInterrupter, Vec<u8>>;

fn driver_with(
    registry: ModeRegistry,
    insert_new_line: bool,
    steps: impl IntoIterator<Item = Step>,
) -> TestDriver {
    let modes = Arc::new(registry);
    PromptDriver::new(
        Session::new(Arc::clone(&modes), insert_new_line),
        ScriptedEditor::new(modes, steps),
        RecordingInterrupter::default(),
        Vec::new(),
    )
}

fn driver(registry: ModeRegistry, steps: impl IntoIterator<Item = Step>) -> TestDriver {
    driver_with(registry, true, steps)
}

/// A handled mode that is always active and counts its completions
fn counting_registry(calls: Arc<AtomicUsize>) -> ModeRegistry {
    let mut registry = ModeRegistry::new(unknown_mode());
    registry
        .register(
            ModeDescriptor::handled("count", move |state| {
                calls.fetch_add(1, Ordering::SeqCst);
                state.buffer.clone()
            })
            .activated_by(|_| true),
        )
        .unwrap();
    registry
}

#[test]
fn native_line_goes_to_runtime() {
    let mut driver = driver(default_registry(), [Step::Type("1 + 1")]);
    assert_eq!(driver.resolve("> ", true).unwrap(), Resolution::Line("1 + 1".into()));
    assert_eq!(driver.editor().prompts, ["r$> "]);
    assert_eq!(driver.output().as_slice(), b"\n");
}

#[test]
fn shell_prefix_hands_back_command() {
    let mut registry = ModeRegistry::new(unknown_mode());
    registry
        .register(ModeDescriptor::native("r").activated_by(|state| !state.buffer.starts_with(';')))
        .unwrap();
    registry
        .register(
            ModeDescriptor::handled("shell", |state| {
                state.buffer.trim_start_matches(';').to_string()
            })
            .activated_by(|state| state.buffer.starts_with(';'))
            .return_result(|result| !result.is_empty()),
        )
        .unwrap();

    let mut driver = driver(registry, [Step::Type(";ls")]);
    assert_eq!(driver.resolve("> ", true).unwrap(), Resolution::Line("ls".into()));
    assert_eq!(driver.session().current_mode().name(), "shell");
}

#[test]
fn native_interrupt_abandons_cycle() {
    let mut driver = driver(default_registry(), [Step::Cancel(""), Step::Type("x")]);

    assert_eq!(driver.resolve("> ", true).unwrap(), Resolution::Abandoned);
    assert_eq!(*driver.interrupter().pending.borrow(), [true]);
    assert_eq!(driver.interrupter().checks.get(), 1);

    // no separator right after an interrupt
    assert_eq!(driver.resolve("> ", true).unwrap(), Resolution::Line("x".into()));
    assert_eq!(driver.output().as_slice(), b"\n");
    assert_eq!(driver.interrupter().checks.get(), 1);
}

#[test]
fn handled_interrupt_discards_input_only() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut driver = driver(counting_registry(calls.clone()), [Step::Cancel("abc"), Step::Eof]);

    assert_eq!(driver.resolve("> ", true).unwrap(), Resolution::EndOfInput);
    assert!(driver.interrupter().pending.borrow().is_empty());
    assert_eq!(driver.interrupter().checks.get(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(driver.editor().prompts.len(), 2);
}

#[test]
fn consumed_results_loop_without_leaking() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut driver = driver(
        counting_registry(calls.clone()),
        [Step::Type("a"), Step::Type("b"), Step::Type("c"), Step::Eof],
    );

    assert_eq!(driver.resolve("> ", true).unwrap(), Resolution::EndOfInput);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // one before the first prompt, one after each consumed result
    assert_eq!(driver.output().as_slice(), b"\n\n\n\n");
}

#[test]
fn end_of_input_skips_on_done() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut driver = driver(counting_registry(calls.clone()), [Step::Eof]);
    assert_eq!(driver.resolve("> ", true).unwrap(), Resolution::EndOfInput);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn terminal_failure_is_an_error() {
    let mut driver = driver(default_registry(), [Step::Fail]);
    let err = driver.resolve("> ", true).unwrap_err();
    assert!(err.to_string().contains("tty gone"));
}

#[test]
fn separator_follows_session_and_mode() {
    let mut quiet = driver_with(default_registry(), false, [Step::Type("1")]);
    quiet.resolve("> ", true).unwrap();
    assert!(quiet.output().is_empty());

    // the fallback mode never asks for one
    let mut unknown = driver(default_registry(), [Step::Type("y")]);
    assert_eq!(unknown.resolve("Continue? ", true).unwrap(), Resolution::Line("y".into()));
    assert!(unknown.output().is_empty());
    assert_eq!(unknown.editor().prompts, ["Continue? "]);
}

#[test]
fn shell_mode_is_sticky_until_empty_line() {
    let mut driver = driver(
        default_registry(),
        [Step::Type(";true"), Step::Type(""), Step::Type("x <- 1")],
    );

    assert_eq!(driver.resolve("> ", true).unwrap(), Resolution::Line("x <- 1".into()));
    assert_eq!(driver.editor().prompts, ["#!> ", "#!> ", "r$> "]);
    assert!(!driver.session().state.shell_active);
}

#[test]
fn typed_semicolon_shows_shell_prompt() {
    let mut driver = driver(default_registry(), [Step::Type(";true"), Step::Eof]);
    assert_eq!(driver.resolve("> ", true).unwrap(), Resolution::EndOfInput);
    // the prompt switched while typing, before Enter
    assert_eq!(driver.editor().prompts[0], "#!> ");
}

#[test]
fn cancel_with_shell_text_discards_input() {
    let mut driver = driver(default_registry(), [Step::Cancel(";sleep 5"), Step::Type("1")]);

    assert_eq!(driver.resolve("> ", true).unwrap(), Resolution::Line("1".into()));
    assert!(driver.interrupter().pending.borrow().is_empty());
    assert_eq!(driver.interrupter().checks.get(), 0);
    assert_eq!(driver.editor().prompts, ["#!> ", "r$> "]);
    // separator before the first prompt and after the discarded line
    assert_eq!(driver.output().as_slice(), b"\n\n");
}

#[test]
fn cancel_with_r_text_interrupts_runtime() {
    let mut driver = driver(default_registry(), [Step::Cancel("Sys.sleep(")]);
    assert_eq!(driver.resolve("> ", true).unwrap(), Resolution::Abandoned);
    assert_eq!(*driver.interrupter().pending.borrow(), [true]);
    assert_eq!(driver.interrupter().checks.get(), 1);
}

#[test]
fn browser_prompt_uses_runtime_text() {
    let mut driver = driver(default_registry(), [Step::Type("n")]);
    assert_eq!(driver.resolve("Browse[2]> ", true).unwrap(), Resolution::Line("n".into()));
    assert_eq!(driver.session().current_mode().name(), "browse");
    assert_eq!(driver.editor().prompts, ["Browse[2]> "]);
}
