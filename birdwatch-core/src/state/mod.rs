//! Node state machine
//!
//! The node runs a linear boot sequence followed by an unbounded service
//! loop. Every state change goes through [`NodeState::transition`].

pub mod events;
pub mod machine;

pub use events::Event;
pub use machine::{ConnectionState, NodeState};
