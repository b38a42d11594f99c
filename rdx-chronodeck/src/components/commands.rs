//! The command table: the only way a timer can reach executable code.
//!
//! Commands are registered once at startup under an `ActionRef` and looked
//! up by name when a timer is registered.

use crate::common::ActionRef;
use crate::engine::Scheduler;
use std::collections::HashMap;
use std::rc::Rc;

/// A zero-argument command. It receives the scheduler so it can register,
/// start or stop timers, including the one that is currently firing.
pub type Action = Rc<dyn Fn(&mut Scheduler)>;

#[derive(Default)]
pub struct CommandTable {
    commands: HashMap<ActionRef, Action>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a command, replacing any earlier one with the same reference.
    pub fn insert(&mut self, action: ActionRef, command: impl Fn(&mut Scheduler) + 'static) {
        self.commands.insert(action, Rc::new(command));
    }

    pub fn resolve(&self, action: &ActionRef) -> Option<Action> {
        self.commands.get(action).cloned()
    }

    pub fn contains(&self, action: &ActionRef) -> bool {
        self.commands.contains_key(action)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_only_registered_commands() {
        let mut table = CommandTable::new();
        table.insert(ActionRef::new("panel", "show_time"), |_| {});
        assert!(table.resolve(&ActionRef::new("panel", "show_time")).is_some());
        assert!(table.resolve(&ActionRef::new("panel", "missing")).is_none());
        assert_eq!(table.len(), 1);
    }
}
