use serde::{Deserialize, Serialize};

use crate::agent::state::MutableAgentState;
use crate::command::catalog::{Command, CommandKind, CommandResult};
use crate::core::config::UniverseSettings;
use crate::core::types::{AgentId, Int4D};

/// A command in transit, tagged with where and when it was sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub to_id: AgentId,
    pub from_id: AgentId,
    /// Sender position at send time; the causal delay is measured from here
    pub from_int4d: Int4D,
    pub command: Command,
}

impl CommandEnvelope {
    pub fn new(to_id: AgentId, from_id: AgentId, from_int4d: Int4D, command: Command) -> Self {
        Self {
            to_id,
            from_id,
            from_int4d,
            command,
        }
    }

    /// Envelope from `sender`'s current position
    pub fn from_agent(sender: &MutableAgentState, to_id: AgentId, command: Command) -> Self {
        Self::new(to_id, sender.id, sender.int4d, command)
    }

    /// Envelope to the sender itself
    pub fn to_self(sender: &MutableAgentState, command: Command) -> Self {
        Self::from_agent(sender, sender.id, command)
    }

    pub fn kind(&self) -> CommandKind {
        self.command.kind()
    }

    pub fn is_self_targeted(&self) -> bool {
        self.to_id == self.from_id
    }

    pub fn can_send_from_agent(
        &self,
        sender: &MutableAgentState,
        settings: &UniverseSettings,
    ) -> CommandResult {
        self.command.can_send_from_agent(sender, self.to_id, settings)
    }

    pub fn check_and_self_execute_before_send(
        &self,
        sender: &mut MutableAgentState,
        settings: &UniverseSettings,
    ) -> CommandResult {
        self.command
            .check_and_self_execute_before_send(sender, self.to_id, settings)
    }

    pub fn check_and_execute(
        &self,
        target: &mut MutableAgentState,
        settings: &UniverseSettings,
    ) -> CommandResult {
        self.command
            .check_and_execute(target, self.from_id, self.from_int4d, settings)
    }
}
