//! Raft-backed consensus engine and replicated key-value state machine.
//!
//! Servers keep an identical string-to-string mapping in memory, mutated
//! only by applying committed log entries. The [`Engine`] wraps the raft
//! instance, its transport and storage, and hands the HTTP layer a
//! capability-restricted [`Consensus`] handle. Leadership transitions fan
//! out to bounded subscriber inboxes with drop-on-full delivery.

pub mod command;
mod control;
mod engine;
mod network;
mod snapshot;
mod storage;
pub mod store;
mod typeconfig;

mod error;

pub use command::{Command, CommandError, Op};
pub use control::RaftRole;
pub use engine::{Consensus, Engine, EngineConfig, LeadershipChanges};
pub use error::{ConsensusError, ConsensusResult};
pub use store::{Mapping, SafeStore};
pub use typeconfig::{Member, node_id};
