//! Per-key action table
//!
//! One slot per possible key code. Populated once at startup and only read
//! while the event loop runs.

use std::fmt;

use tracing::{debug, warn};

use crate::hotkey::KEY_MAX;

const SLOTS: usize = KEY_MAX as usize + 1;

static NO_ACTION: Action = Action::None;

/// What happens when a key fires
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Action {
    /// Nothing happens
    #[default]
    None,
    /// Print the key's name to stdout
    Print,
    /// Launch an external command
    Exec(Command),
}

impl Action {
    /// Build an `Exec` action, rejecting an empty argument vector
    pub fn exec<I, S>(argv: I) -> Result<Self, ActionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Command::new(argv.into_iter().map(Into::into).collect()).map(Self::Exec)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// An owned, non-empty argument vector; `argv[0]` is the program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    argv: Vec<String>,
}

impl Command {
    pub fn new(argv: Vec<String>) -> Result<Self, ActionError> {
        match argv.first() {
            Some(program) if !program.is_empty() => Ok(Self { argv }),
            _ => Err(ActionError::EmptyCommand),
        }
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}

/// Errors raised while filling the action table
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("key code {0} is out of range (max {KEY_MAX})")]
    KeyOutOfRange(u16),

    #[error("command must name a program")]
    EmptyCommand,
}

/// Fixed-size table mapping every key code to an action
pub struct ActionTable {
    slots: Box<[Action]>,
}

impl ActionTable {
    /// Create a table with no actions installed
    pub fn new() -> Self {
        Self {
            slots: vec![Action::None; SLOTS].into_boxed_slice(),
        }
    }

    /// Create a table that prints the name of every key
    pub fn print_all() -> Self {
        Self {
            slots: vec![Action::Print; SLOTS].into_boxed_slice(),
        }
    }

    /// Action for `code`. Out-of-range codes get [`Action::None`].
    pub fn lookup(&self, code: u16) -> &Action {
        match self.slots.get(usize::from(code)) {
            Some(action) => action,
            None => {
                warn!(code, "key code out of range, ignoring");
                &NO_ACTION
            }
        }
    }

    /// Install `action` for `code`, returning the action it replaces
    pub fn install(&mut self, code: u16, action: Action) -> Result<Action, ActionError> {
        let slot = self
            .slots
            .get_mut(usize::from(code))
            .ok_or(ActionError::KeyOutOfRange(code))?;

        debug!(code, ?action, "installing action");
        Ok(std::mem::replace(slot, action))
    }

    /// Release every installed action, returning how many there were
    pub fn teardown(&mut self) -> usize {
        let released = self.len();
        for slot in self.slots.iter_mut() {
            *slot = Action::None;
        }
        debug!(released, "action table cleared");
        released
    }

    /// Number of keys with an action
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|action| !action.is_none()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Installed entries in key code order
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Action)> {
        (0..=KEY_MAX)
            .zip(self.slots.iter())
            .filter(|(_, action)| !action.is_none())
    }
}

impl Default for ActionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ActionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table() {
        let table = ActionTable::new();
        assert!(table.is_empty());
        assert_eq!(table.lookup(30), &Action::None);
        assert_eq!(table.lookup(KEY_MAX), &Action::None);
    }

    #[test]
    fn test_install_then_lookup() {
        let mut table = ActionTable::new();
        let action = Action::exec(["/bin/true"]).unwrap();

        let previous = table.install(30, action.clone()).unwrap();
        assert_eq!(previous, Action::None);
        assert_eq!(table.lookup(30), &action);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_replace_hands_back_previous() {
        let mut table = ActionTable::new();
        let first = Action::exec(["/bin/echo", "one"]).unwrap();
        let second = Action::exec(["/bin/echo", "two"]).unwrap();

        table.install(KEY_MAX, first.clone()).unwrap();
        let previous = table.install(KEY_MAX, second.clone()).unwrap();

        assert_eq!(previous, first);
        assert_eq!(table.lookup(KEY_MAX), &second);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_out_of_range() {
        let mut table = ActionTable::print_all();
        assert_eq!(table.lookup(KEY_MAX + 1), &Action::None);
        assert_eq!(table.lookup(u16::MAX), &Action::None);
        assert_eq!(
            table.install(KEY_MAX + 1, Action::Print),
            Err(ActionError::KeyOutOfRange(KEY_MAX + 1))
        );
    }

    #[test]
    fn test_empty_command_rejected() {
        assert_eq!(Action::exec(Vec::<String>::new()), Err(ActionError::EmptyCommand));
        assert_eq!(Action::exec([""]), Err(ActionError::EmptyCommand));
    }

    #[test]
    fn test_command_parts() {
        let Action::Exec(command) = Action::exec(["sh", "-c", "echo hi"]).unwrap() else {
            panic!("expected exec action");
        };
        assert_eq!(command.program(), "sh");
        assert_eq!(command.args(), ["-c", "echo hi"]);
        assert_eq!(command.to_string(), "sh -c echo hi");
    }

    #[test]
    fn test_teardown_releases_everything() {
        let mut table = ActionTable::new();
        table.install(1, Action::Print).unwrap();
        table.install(2, Action::exec(["/bin/true"]).unwrap()).unwrap();

        assert_eq!(table.teardown(), 2);
        assert!(table.is_empty());
        assert_eq!(table.lookup(2), &Action::None);
    }

    #[test]
    fn test_print_all_covers_every_code() {
        let table = ActionTable::print_all();
        assert_eq!(table.len(), SLOTS);
        assert_eq!(table.iter().next(), Some((0, &Action::Print)));
        assert_eq!(table.iter().last(), Some((KEY_MAX, &Action::Print)));
    }
}
