//! Commands between agents
//!
//! Commands are produced by mechanisms and external controllers, validated
//! on the sender, then either executed at once in the sender's cell or parked
//! in the target's mailbox until the light delay has elapsed:
//! CommandEnvelope -> CommandRouter -> (local execution | CommandMailbox)

pub mod availability;
pub mod catalog;
pub mod envelope;
pub mod mailbox;
pub mod router;

pub use availability::CommandAvailability;
pub use catalog::{
    ChangeVelocityCommand, Command, CommandBehavior, CommandKind, CommandRejection, CommandResult,
    DeclareWarCommand, DummyCommand, ProposePeaceCommand, SendResourceCommand, SplitAgentCommand,
};
pub use envelope::CommandEnvelope;
pub use mailbox::CommandMailbox;
pub use router::{
    CellAgents, CellDispatch, CommandRouter, Delivery, Route, SelfTargets, SendRejection,
};
