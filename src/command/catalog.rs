//! Built-in command types and their validation/execution rules

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::state::{AgentInternal, AgentSpawn, MutableAgentState, WarRecord};
use crate::core::config::UniverseSettings;
use crate::core::types::{AgentId, Int4D, Velocity};

/// Stable key of a command type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    Dummy,
    ChangeVelocity,
    SendResource,
    SplitAgent,
    DeclareWar,
    ProposePeace,
}

impl CommandKind {
    pub const ALL: [CommandKind; 6] = [
        CommandKind::Dummy,
        CommandKind::ChangeVelocity,
        CommandKind::SendResource,
        CommandKind::SplitAgent,
        CommandKind::DeclareWar,
        CommandKind::ProposePeace,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Dummy => "Dummy",
            CommandKind::ChangeVelocity => "ChangeVelocity",
            CommandKind::SendResource => "SendResource",
            CommandKind::SplitAgent => "SplitAgent",
            CommandKind::DeclareWar => "DeclareWar",
            CommandKind::ProposePeace => "ProposePeace",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A command refused by its own validation rules.
///
/// Never fatal: the command is skipped and nothing is mutated.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} rejected: {reason}")]
pub struct CommandRejection {
    pub kind: CommandKind,
    pub reason: String,
}

impl CommandRejection {
    pub fn new(kind: CommandKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

pub type CommandResult = Result<(), CommandRejection>;

/// Validation and execution contract shared by every command type.
///
/// The router only ever calls these; it never looks at command fields.
pub trait CommandBehavior {
    fn kind(&self) -> CommandKind;

    /// Checked against the sender before the command leaves it
    fn can_send(&self, _sender: &MutableAgentState, _to: AgentId, _settings: &UniverseSettings) -> CommandResult {
        Ok(())
    }

    /// Sender-side effect applied once `can_send` passed
    fn self_execute_before_send(
        &self,
        _sender: &mut MutableAgentState,
        _to: AgentId,
        _settings: &UniverseSettings,
    ) {
    }

    /// Checked against the target at delivery time
    fn can_execute(
        &self,
        _target: &MutableAgentState,
        _from: AgentId,
        _from_int4d: Int4D,
        _settings: &UniverseSettings,
    ) -> CommandResult {
        Ok(())
    }

    fn execute(
        &self,
        target: &mut MutableAgentState,
        from: AgentId,
        from_int4d: Int4D,
        settings: &UniverseSettings,
    );
}

fn reject(kind: CommandKind, reason: impl Into<String>) -> CommandResult {
    Err(CommandRejection::new(kind, reason))
}

/// Does nothing; useful as a heartbeat and in tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DummyCommand;

impl CommandBehavior for DummyCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Dummy
    }

    fn execute(&self, _: &mut MutableAgentState, _: AgentId, _: Int4D, _: &UniverseSettings) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChangeVelocityCommand {
    pub target_velocity: Velocity,
}

impl ChangeVelocityCommand {
    fn check_speed(&self, settings: &UniverseSettings) -> CommandResult {
        let speed = self.target_velocity.magnitude();
        if !speed.is_finite() || speed >= settings.speed_of_light {
            return reject(
                CommandKind::ChangeVelocity,
                format!(
                    "speed {speed} must stay below the speed of light {}",
                    settings.speed_of_light
                ),
            );
        }
        Ok(())
    }
}

impl CommandBehavior for ChangeVelocityCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::ChangeVelocity
    }

    fn can_send(&self, _: &MutableAgentState, _: AgentId, settings: &UniverseSettings) -> CommandResult {
        self.check_speed(settings)
    }

    fn can_execute(&self, _: &MutableAgentState, _: AgentId, _: Int4D, settings: &UniverseSettings) -> CommandResult {
        self.check_speed(settings)
    }

    fn execute(&self, target: &mut MutableAgentState, _: AgentId, _: Int4D, _: &UniverseSettings) {
        target.velocity = self.target_velocity;
    }
}

/// Transfer resources to another agent.
///
/// The sender pays `amount` up front; the target receives `amount * retention`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SendResourceCommand {
    pub amount: f64,
    pub retention: f64,
}

impl CommandBehavior for SendResourceCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::SendResource
    }

    fn can_send(&self, sender: &MutableAgentState, to: AgentId, _: &UniverseSettings) -> CommandResult {
        if to == sender.id {
            return reject(self.kind(), "cannot send resources to itself");
        }
        if !(self.amount > 0.0 && self.amount.is_finite()) {
            return reject(self.kind(), format!("amount must be positive, got {}", self.amount));
        }
        if !(self.retention > 0.0 && self.retention <= 1.0) {
            return reject(
                self.kind(),
                format!("retention must be in (0, 1], got {}", self.retention),
            );
        }
        if sender.internal.resources < self.amount {
            return reject(
                self.kind(),
                format!(
                    "not enough resources: has {}, needs {}",
                    sender.internal.resources, self.amount
                ),
            );
        }
        Ok(())
    }

    fn self_execute_before_send(&self, sender: &mut MutableAgentState, _: AgentId, _: &UniverseSettings) {
        sender.internal.resources -= self.amount;
    }

    fn execute(&self, target: &mut MutableAgentState, _: AgentId, _: Int4D, _: &UniverseSettings) {
        target.internal.resources += self.amount * self.retention;
    }
}

/// Split off a new agent carrying `fraction` of this agent's assets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitAgentCommand {
    pub fraction: f64,
    pub name: String,
}

impl SplitAgentCommand {
    fn check_fraction(&self) -> CommandResult {
        if !(self.fraction > 0.0 && self.fraction < 1.0) {
            return reject(
                CommandKind::SplitAgent,
                format!("fraction must be in (0, 1), got {}", self.fraction),
            );
        }
        Ok(())
    }
}

impl CommandBehavior for SplitAgentCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::SplitAgent
    }

    fn can_send(&self, sender: &MutableAgentState, to: AgentId, _: &UniverseSettings) -> CommandResult {
        if to != sender.id {
            return reject(self.kind(), "split must target the sender itself");
        }
        self.check_fraction()?;
        if sender.internal.population <= 0.0 {
            return reject(self.kind(), "nothing to split");
        }
        Ok(())
    }

    fn can_execute(&self, target: &MutableAgentState, from: AgentId, _: Int4D, _: &UniverseSettings) -> CommandResult {
        if from != target.id {
            return reject(self.kind(), format!("split of {} ordered by {from}", target.id));
        }
        self.check_fraction()
    }

    fn execute(&self, target: &mut MutableAgentState, _: AgentId, _: Int4D, _: &UniverseSettings) {
        let internal = &mut target.internal;
        let resources = internal.resources * self.fraction;
        let population = internal.population * self.fraction;
        internal.resources -= resources;
        internal.population -= population;

        target.spawn_queue.push(AgentSpawn {
            name: self.name.clone(),
            agent_type: target.agent_type,
            velocity: target.velocity,
            internal: AgentInternal {
                resources,
                population,
                ..AgentInternal::default()
            },
        });
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeclareWarCommand;

impl CommandBehavior for DeclareWarCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::DeclareWar
    }

    fn can_send(&self, sender: &MutableAgentState, to: AgentId, _: &UniverseSettings) -> CommandResult {
        if to == sender.id {
            return reject(self.kind(), "cannot declare war on itself");
        }
        if sender.internal.wars.contains_key(&to) {
            return reject(self.kind(), format!("already at war with {to}"));
        }
        Ok(())
    }

    fn self_execute_before_send(&self, sender: &mut MutableAgentState, to: AgentId, _: &UniverseSettings) {
        sender.internal.wars.insert(
            to,
            WarRecord {
                start_time: sender.current_time(),
                initiator: true,
            },
        );
    }

    fn can_execute(&self, target: &MutableAgentState, from: AgentId, _: Int4D, _: &UniverseSettings) -> CommandResult {
        if from == target.id {
            tracing::error!(agent = %target.id, "self-targeted war reached execution");
            return reject(self.kind(), "self-targeted war");
        }
        Ok(())
    }

    fn execute(&self, target: &mut MutableAgentState, from: AgentId, _: Int4D, _: &UniverseSettings) {
        let start_time = target.current_time();
        target.internal.wars.entry(from).or_insert(WarRecord {
            start_time,
            initiator: false,
        });
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProposePeaceCommand;

impl CommandBehavior for ProposePeaceCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::ProposePeace
    }

    fn can_send(&self, sender: &MutableAgentState, to: AgentId, _: &UniverseSettings) -> CommandResult {
        if !sender.internal.wars.contains_key(&to) {
            return reject(self.kind(), format!("not at war with {to}"));
        }
        Ok(())
    }

    fn self_execute_before_send(&self, sender: &mut MutableAgentState, to: AgentId, _: &UniverseSettings) {
        sender.internal.wars.remove(&to);
    }

    fn execute(&self, target: &mut MutableAgentState, from: AgentId, _: Int4D, _: &UniverseSettings) {
        target.internal.wars.remove(&from);
    }
}

/// Every command the universe can carry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Dummy(DummyCommand),
    ChangeVelocity(ChangeVelocityCommand),
    SendResource(SendResourceCommand),
    SplitAgent(SplitAgentCommand),
    DeclareWar(DeclareWarCommand),
    ProposePeace(ProposePeaceCommand),
}

impl Command {
    pub fn change_velocity(target_velocity: Velocity) -> Self {
        Command::ChangeVelocity(ChangeVelocityCommand { target_velocity })
    }

    pub fn send_resource(amount: f64, retention: f64) -> Self {
        Command::SendResource(SendResourceCommand { amount, retention })
    }

    pub fn split_agent(fraction: f64, name: impl Into<String>) -> Self {
        Command::SplitAgent(SplitAgentCommand {
            fraction,
            name: name.into(),
        })
    }

    pub fn behavior(&self) -> &dyn CommandBehavior {
        match self {
            Command::Dummy(c) => c,
            Command::ChangeVelocity(c) => c,
            Command::SendResource(c) => c,
            Command::SplitAgent(c) => c,
            Command::DeclareWar(c) => c,
            Command::ProposePeace(c) => c,
        }
    }

    pub fn kind(&self) -> CommandKind {
        self.behavior().kind()
    }

    /// Validate against the sender without mutating anything
    pub fn can_send_from_agent(
        &self,
        sender: &MutableAgentState,
        to: AgentId,
        settings: &UniverseSettings,
    ) -> CommandResult {
        self.behavior().can_send(sender, to, settings)
    }

    /// Validate, then apply the sender-side effect
    pub fn check_and_self_execute_before_send(
        &self,
        sender: &mut MutableAgentState,
        to: AgentId,
        settings: &UniverseSettings,
    ) -> CommandResult {
        let behavior = self.behavior();
        behavior.can_send(sender, to, settings)?;
        behavior.self_execute_before_send(sender, to, settings);
        Ok(())
    }

    /// Validate against the target, then execute on it
    pub fn check_and_execute(
        &self,
        target: &mut MutableAgentState,
        from: AgentId,
        from_int4d: Int4D,
        settings: &UniverseSettings,
    ) -> CommandResult {
        let behavior = self.behavior();
        behavior.can_execute(target, from, from_int4d, settings)?;
        behavior.execute(target, from, from_int4d, settings);
        Ok(())
    }
}
