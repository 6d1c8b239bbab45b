//! Named sets of commands external controllers may issue

use std::collections::BTreeSet;

use crate::command::catalog::CommandKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAvailability {
    name: String,
    allowed: BTreeSet<CommandKind>,
}

impl CommandAvailability {
    pub fn new(name: impl Into<String>, allowed: impl IntoIterator<Item = CommandKind>) -> Self {
        Self {
            name: name.into(),
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn all() -> Self {
        Self::new("All", CommandKind::ALL)
    }

    /// Everything except declaring war
    pub fn peaceful() -> Self {
        Self::new(
            "Peaceful",
            CommandKind::ALL
                .into_iter()
                .filter(|kind| *kind != CommandKind::DeclareWar),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn allows(&self, kind: CommandKind) -> bool {
        self.allowed.contains(&kind)
    }
}
