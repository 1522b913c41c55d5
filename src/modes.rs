//! Input modes and the activation decision.
//!
//! A mode decides how a line obtained from the editor is handled. Native
//! modes hand the text straight back to the runtime for evaluation. Handled
//! modes finish the line on the host side through `on_done` and may keep the
//! prompt cycle going (shell passthrough, multi-step flows).
//!
//! Modes are checked in reverse registration order, so a mode registered
//! later takes precedence over the ones before it. When nothing matches, the
//! registry's fallback mode is active.

use thiserror::Error;
use tracing::debug;

use crate::session::{CONTINUE_PROMPT, SessionState, TOP_LEVEL_PROMPT};

// Send + Sync: the line editor re-runs activation from its own callbacks
pub type Activator = Box<dyn Fn(&SessionState) -> bool + Send + Sync>;
pub type PromptRenderer = Box<dyn Fn(&SessionState) -> String + Send + Sync>;
pub type DoneHandler = Box<dyn Fn(&mut SessionState) -> String + Send + Sync>;
pub type ResultPredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

pub const FALLBACK_MODE: &str = "unknown";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModeError {
    #[error("mode `{0}` is already registered")]
    Duplicate(String),
}

/// Who finishes a line once the editor returns it
pub enum ModeKind {
    /// The runtime evaluates the text itself
    Native,
    /// The host finishes the line before control returns to the runtime
    Handled {
        on_done: DoneHandler,
        return_result: Option<ResultPredicate>,
    },
}

/// Outcome of finishing a line in a handled mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The cycle is over and this text goes to the runtime
    Finished(String),
    /// The result was consumed on the host side; prompt again
    Continue,
}

pub struct ModeDescriptor {
    name: String,
    activator: Option<Activator>,
    kind: ModeKind,
    insert_new_line: bool,
    prompt: Option<PromptRenderer>,
}

impl ModeDescriptor {
    pub fn native(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            activator: None,
            kind: ModeKind::Native,
            insert_new_line: true,
            prompt: None,
        }
    }

    pub fn handled<F>(name: impl Into<String>, on_done: F) -> Self
    where
        F: Fn(&mut SessionState) -> String + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            activator: None,
            kind: ModeKind::Handled {
                on_done: Box::new(on_done),
                return_result: None,
            },
            insert_new_line: true,
            prompt: None,
        }
    }

    pub fn activated_by<F>(mut self, activator: F) -> Self
    where
        F: Fn(&SessionState) -> bool + Send + Sync + 'static,
    {
        self.activator = Some(Box::new(activator));
        self
    }

    /// Decide whether a handled mode's result ends the prompt cycle.
    ///
    /// Without a predicate every result is consumed on the host side and the
    /// cycle loops. Native modes ignore this.
    pub fn return_result<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        if let ModeKind::Handled { return_result, .. } = &mut self.kind {
            *return_result = Some(Box::new(predicate));
        }
        self
    }

    pub fn insert_new_line(mut self, insert: bool) -> Self {
        self.insert_new_line = insert;
        self
    }

    pub fn prompt<F>(mut self, renderer: F) -> Self
    where
        F: Fn(&SessionState) -> String + Send + Sync + 'static,
    {
        self.prompt = Some(Box::new(renderer));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_native(&self) -> bool {
        matches!(self.kind, ModeKind::Native)
    }

    pub fn inserts_new_line(&self) -> bool {
        self.insert_new_line
    }

    fn matches(&self, state: &SessionState) -> bool {
        self.activator.as_ref().is_some_and(|activator| activator(state))
    }

    /// Prompt text for this mode; defaults to the runtime's own prompt
    pub fn render_prompt(&self, state: &SessionState) -> String {
        match &self.prompt {
            Some(renderer) => renderer(state),
            None => state.message.clone(),
        }
    }

    /// Run `on_done` for a handled mode. Returns `None` for native modes.
    pub fn complete(&self, state: &mut SessionState) -> Option<Completion> {
        match &self.kind {
            ModeKind::Native => None,
            ModeKind::Handled {
                on_done,
                return_result,
            } => {
                let result = on_done(state);
                let finished = return_result
                    .as_ref()
                    .is_some_and(|predicate| predicate(&result));
                Some(if finished {
                    Completion::Finished(result)
                } else {
                    Completion::Continue
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeId {
    Registered(usize),
    Fallback,
}

/// The static set of modes plus the fallback
pub struct ModeRegistry {
    modes: Vec<ModeDescriptor>,
    fallback: ModeDescriptor,
}

impl ModeRegistry {
    pub fn new(fallback: ModeDescriptor) -> Self {
        Self {
            modes: Vec::new(),
            fallback,
        }
    }

    pub fn register(&mut self, mode: ModeDescriptor) -> Result<ModeId, ModeError> {
        if self.find(mode.name()).is_some() {
            return Err(ModeError::Duplicate(mode.name().to_string()));
        }
        self.modes.push(mode);
        Ok(ModeId::Registered(self.modes.len() - 1))
    }

    /// First matching mode in priority order, or the fallback
    pub fn activate(&self, state: &SessionState) -> ModeId {
        self.modes
            .iter()
            .enumerate()
            .rev()
            .find(|(_, mode)| mode.matches(state))
            .map_or(ModeId::Fallback, |(index, _)| ModeId::Registered(index))
    }

    /// Activate against `state` and render the winner's prompt into it
    pub fn render(&self, state: &mut SessionState) -> ModeId {
        let id = self.activate(state);
        state.prompt_text = self.get(id).render_prompt(state);
        id
    }

    pub fn get(&self, id: ModeId) -> &ModeDescriptor {
        match id {
            ModeId::Registered(index) => &self.modes[index],
            ModeId::Fallback => &self.fallback,
        }
    }

    pub fn find(&self, name: &str) -> Option<ModeId> {
        if self.fallback.name() == name {
            return Some(ModeId::Fallback);
        }
        self.modes
            .iter()
            .position(|mode| mode.name() == name)
            .map(ModeId::Registered)
    }

    /// Mode names in the order `activate` checks them, fallback last
    pub fn priority(&self) -> Vec<&str> {
        self.modes
            .iter()
            .rev()
            .map(ModeDescriptor::name)
            .chain(std::iter::once(self.fallback.name()))
            .collect()
    }
}

/// `Browse[N]> ` as printed by the debugger
pub fn is_browse_prompt(message: &str) -> bool {
    message
        .strip_prefix("Browse[")
        .and_then(|rest| rest.strip_suffix("]> "))
        .is_some_and(|level| !level.is_empty() && level.bytes().all(|b| b.is_ascii_digit()))
}

/// Catch-all for prompts no other mode claims, e.g. `readline()`
pub fn unknown_mode() -> ModeDescriptor {
    ModeDescriptor::native(FALLBACK_MODE).insert_new_line(false)
}

pub fn r_mode() -> ModeDescriptor {
    ModeDescriptor::native("r")
        .activated_by(|state| state.message == TOP_LEVEL_PROMPT || state.message == CONTINUE_PROMPT)
        .prompt(|state| {
            if state.message == TOP_LEVEL_PROMPT {
                "r$> ".to_string()
            } else {
                state.message.clone()
            }
        })
}

pub fn browse_mode() -> ModeDescriptor {
    ModeDescriptor::native("browse").activated_by(|state| is_browse_prompt(&state.message))
}

/// Shell passthrough: `;` at the start of a line enters it, an empty line
/// leaves it. Commands never reach the runtime.
pub fn shell_mode() -> ModeDescriptor {
    ModeDescriptor::handled("shell", |state| {
        let command = match state.buffer.strip_prefix(';') {
            Some(rest) => {
                state.shell_active = true;
                rest.to_string()
            }
            None => state.buffer.clone(),
        };

        if command.trim().is_empty() {
            if !state.buffer.starts_with(';') {
                state.shell_active = false;
            }
            return command;
        }

        let result = crate::shell::run_line(command.trim());
        debug!(exit_code = result.exit_code, "shell mode command done");
        command
    })
    .activated_by(|state| {
        state.message == TOP_LEVEL_PROMPT && (state.shell_active || state.buffer.starts_with(';'))
    })
    .prompt(|_| "#!> ".to_string())
}

/// Modes available in every session: r, browse, shell, unknown
pub fn default_registry() -> ModeRegistry {
    let mut registry = ModeRegistry::new(unknown_mode());
    for mode in [r_mode(), browse_mode(), shell_mode()] {
        registry
            .register(mode)
            .expect("default mode names are distinct");
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(message: &str, buffer: &str) -> SessionState {
        SessionState {
            message: message.to_string(),
            buffer: buffer.to_string(),
            ..SessionState::default()
        }
    }

    #[test]
    fn later_registration_wins() {
        let mut registry = ModeRegistry::new(unknown_mode());
        registry
            .register(ModeDescriptor::native("first").activated_by(|_| true))
            .unwrap();
        let second = registry
            .register(ModeDescriptor::native("second").activated_by(|_| true))
            .unwrap();

        assert_eq!(registry.activate(&SessionState::default()), second);
        assert_eq!(registry.priority(), vec!["second", "first", "unknown"]);
    }

    #[test]
    fn no_match_falls_back() {
        let mut registry = ModeRegistry::new(unknown_mode());
        registry
            .register(ModeDescriptor::native("never").activated_by(|_| false))
            .unwrap();
        registry.register(ModeDescriptor::native("no-activator")).unwrap();

        assert_eq!(registry.activate(&SessionState::default()), ModeId::Fallback);
        assert_eq!(registry.get(ModeId::Fallback).name(), FALLBACK_MODE);
    }

    #[test]
    fn activation_is_first_match_for_every_order() {
        // a matches buffers with 'a', b with 'b'; both match "ab"
        let orders: [[&str; 2]; 2] = [["a", "b"], ["b", "a"]];
        for order in orders {
            let mut registry = ModeRegistry::new(unknown_mode());
            for name in order {
                let needle = name.to_string();
                registry
                    .register(
                        ModeDescriptor::native(name)
                            .activated_by(move |s| s.buffer.contains(needle.as_str())),
                    )
                    .unwrap();
            }

            let both = registry.activate(&state("", "ab"));
            assert_eq!(registry.get(both).name(), order[1]);
            let only_a = registry.activate(&state("", "a"));
            assert_eq!(registry.get(only_a).name(), "a");
            assert_eq!(registry.activate(&state("", "z")), ModeId::Fallback);
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ModeRegistry::new(unknown_mode());
        registry.register(ModeDescriptor::native("r")).unwrap();
        assert_eq!(
            registry.register(ModeDescriptor::native("r")),
            Err(ModeError::Duplicate("r".to_string()))
        );
        assert_eq!(
            registry.register(ModeDescriptor::native(FALLBACK_MODE)),
            Err(ModeError::Duplicate(FALLBACK_MODE.to_string()))
        );
    }

    #[test]
    fn return_result_decides_completion() {
        let mode = ModeDescriptor::handled("upper", |s| s.buffer.to_uppercase())
            .return_result(|result| result.len() > 2);

        let mut short = state("", "ab");
        assert_eq!(mode.complete(&mut short), Some(Completion::Continue));

        let mut long = state("", "abc");
        assert_eq!(
            mode.complete(&mut long),
            Some(Completion::Finished("ABC".to_string()))
        );

        assert_eq!(ModeDescriptor::native("r").complete(&mut long), None);
    }

    #[test]
    fn default_modes_follow_runtime_prompt() {
        let registry = default_registry();
        let name = |s: &SessionState| registry.get(registry.activate(s)).name().to_string();

        assert_eq!(name(&state("> ", "")), "r");
        assert_eq!(name(&state("+ ", "")), "r");
        assert_eq!(name(&state("Browse[2]> ", "")), "browse");
        assert_eq!(name(&state("Enter a number: ", "")), "unknown");
        assert_eq!(name(&state("> ", ";ls")), "shell");
        assert_eq!(name(&state("+ ", ";ls")), "r");

        let sticky = SessionState {
            shell_active: true,
            ..state("> ", "pwd")
        };
        assert_eq!(name(&sticky), "shell");
    }

    #[test]
    fn prompts_per_mode() {
        let registry = default_registry();
        let r = registry.get(registry.find("r").unwrap());
        assert_eq!(r.render_prompt(&state("> ", "")), "r$> ");
        assert_eq!(r.render_prompt(&state("+ ", "")), "+ ");

        let shell = registry.get(registry.find("shell").unwrap());
        assert_eq!(shell.render_prompt(&state("> ", "")), "#!> ");

        let unknown = registry.get(ModeId::Fallback);
        assert_eq!(unknown.render_prompt(&state("Name? ", "")), "Name? ");
        assert!(!unknown.inserts_new_line());
        assert!(!shell.is_native());
    }

    #[test]
    fn browse_prompt_detection() {
        assert!(is_browse_prompt("Browse[1]> "));
        assert!(is_browse_prompt("Browse[12]> "));
        assert!(!is_browse_prompt("Browse[]> "));
        assert!(!is_browse_prompt("Browse[x]> "));
        assert!(!is_browse_prompt("> "));
    }

    #[test]
    fn shell_empty_line_leaves_sticky_mode() {
        let registry = default_registry();
        let shell = registry.get(registry.find("shell").unwrap());

        let mut entering = state("> ", ";");
        assert_eq!(shell.complete(&mut entering), Some(Completion::Continue));
        assert!(entering.shell_active);

        let mut leaving = SessionState {
            shell_active: true,
            ..state("> ", "")
        };
        assert_eq!(shell.complete(&mut leaving), Some(Completion::Continue));
        assert!(!leaving.shell_active);
    }
}
