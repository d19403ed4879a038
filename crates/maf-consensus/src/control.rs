//! The narrow surface the engine needs from a raft implementation.
//!
//! Keeping this boundary small means no openraft type crosses into the
//! engine's callers, and the membership/apply logic can be exercised in
//! tests against a scripted implementation.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use async_trait::async_trait;
use openraft::error::{ClientWriteError, InitializeError, RaftError};
use openraft::{ChangeMembers, ServerState};
use tokio::sync::watch;

use crate::command::Command;
use crate::error::{ConsensusError, ConsensusResult};
use crate::typeconfig::{MafRaft, Member, NodeId, node_id};

/// Local raft role, rendered into cluster info.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaftRole {
    Leader,
    Follower,
    Candidate,
    Shutdown,
    Unknown,
}

impl fmt::Display for RaftRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Leader => "Leader",
            Self::Follower => "Follower",
            Self::Candidate => "Candidate",
            Self::Shutdown => "Shutdown",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// One configured cluster member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MemberEntry {
    pub nid: NodeId,
    pub member: Member,
    pub voter: bool,
}

impl MemberEntry {
    pub fn suffrage(&self) -> &'static str {
        if self.voter { "Voter" } else { "Nonvoter" }
    }
}

/// Raft operations the engine depends on.
#[async_trait]
pub(crate) trait RaftControl: Send + Sync {
    fn role(&self) -> RaftRole;

    /// `(id, addr)` of the current leader, if known.
    fn current_leader(&self) -> Option<Member>;

    fn members(&self) -> Vec<MemberEntry>;

    fn stats(&self) -> BTreeMap<String, String>;

    /// `true` whenever the local node holds leadership; updated on every
    /// transition.
    fn leadership_watch(&self) -> watch::Receiver<bool>;

    /// Form a single-node cluster. Already-bootstrapped is success.
    async fn bootstrap(&self, member: Member) -> ConsensusResult<()>;

    async fn add_voter(&self, member: Member) -> ConsensusResult<()>;

    async fn remove_server(&self, nid: NodeId) -> ConsensusResult<()>;

    async fn apply(&self, command: Command) -> ConsensusResult<()>;

    async fn shutdown(&self) -> ConsensusResult<()>;
}

/// Production implementation over an openraft instance.
pub(crate) struct OpenraftControl {
    raft: MafRaft,
    metrics: watch::Receiver<openraft::RaftMetrics<NodeId, Member>>,
    leadership: watch::Receiver<bool>,
}

impl OpenraftControl {
    pub fn new(raft: MafRaft) -> Self {
        let metrics = raft.metrics();
        let leadership = spawn_leadership_mapper(metrics.clone());
        Self {
            raft,
            metrics,
            leadership,
        }
    }

    fn voter_ids(&self) -> BTreeSet<NodeId> {
        self.metrics
            .borrow()
            .membership_config
            .membership()
            .voter_ids()
            .collect()
    }
}

/// Collapses the metrics stream into leadership transitions.
fn spawn_leadership_mapper(
    mut metrics: watch::Receiver<openraft::RaftMetrics<NodeId, Member>>,
) -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        loop {
            let is_leader = metrics.borrow_and_update().state == ServerState::Leader;
            tx.send_if_modified(|current| {
                if *current == is_leader {
                    false
                } else {
                    *current = is_leader;
                    true
                }
            });

            if metrics.changed().await.is_err() {
                break;
            }
        }
    });

    rx
}

fn wrap<E: std::error::Error>(context: &str, err: E) -> ConsensusError {
    ConsensusError::Raft(format!("{context}: {err}"))
}

#[async_trait]
impl RaftControl for OpenraftControl {
    fn role(&self) -> RaftRole {
        match self.metrics.borrow().state {
            ServerState::Leader => RaftRole::Leader,
            ServerState::Follower => RaftRole::Follower,
            ServerState::Candidate => RaftRole::Candidate,
            _ => RaftRole::Unknown,
        }
    }

    fn current_leader(&self) -> Option<Member> {
        let metrics = self.metrics.borrow();
        let leader_nid = metrics.current_leader?;
        let member = metrics
            .membership_config
            .membership()
            .nodes()
            .find(|(nid, _)| **nid == leader_nid)
            .map(|(_, member)| member.clone());
        member
    }

    fn members(&self) -> Vec<MemberEntry> {
        let metrics = self.metrics.borrow();
        let membership = metrics.membership_config.membership();
        let voters: BTreeSet<NodeId> = membership.voter_ids().collect();

        membership
            .nodes()
            .map(|(nid, member)| MemberEntry {
                nid: *nid,
                member: member.clone(),
                voter: voters.contains(nid),
            })
            .collect()
    }

    fn stats(&self) -> BTreeMap<String, String> {
        let metrics = self.metrics.borrow();
        let mut stats = BTreeMap::new();

        stats.insert("state".to_string(), format!("{:?}", metrics.state));
        stats.insert("term".to_string(), metrics.current_term.to_string());
        stats.insert(
            "last_log_index".to_string(),
            metrics
                .last_log_index
                .map_or_else(|| "none".to_string(), |i| i.to_string()),
        );
        stats.insert(
            "last_applied".to_string(),
            metrics
                .last_applied
                .map_or_else(|| "none".to_string(), |l| l.to_string()),
        );
        stats.insert(
            "snapshot".to_string(),
            metrics
                .snapshot
                .map_or_else(|| "none".to_string(), |l| l.to_string()),
        );
        stats.insert(
            "leader_id".to_string(),
            metrics
                .current_leader
                .map_or_else(|| "none".to_string(), |l| l.to_string()),
        );

        stats
    }

    fn leadership_watch(&self) -> watch::Receiver<bool> {
        self.leadership.clone()
    }

    async fn bootstrap(&self, member: Member) -> ConsensusResult<()> {
        let mut nodes = BTreeMap::new();
        nodes.insert(node_id(&member.id), member);

        match self.raft.initialize(nodes).await {
            Ok(()) => Ok(()),
            Err(RaftError::APIError(InitializeError::NotAllowed(_))) => {
                tracing::warn!("cluster already bootstrapped, ignoring");
                Ok(())
            }
            Err(err) => Err(wrap("failed to bootstrap cluster", err)),
        }
    }

    async fn add_voter(&self, member: Member) -> ConsensusResult<()> {
        let nid = node_id(&member.id);

        self.raft
            .add_learner(nid, member, true)
            .await
            .map_err(|e| to_write_error("failed to add learner", e))?;

        let mut voters = self.voter_ids();
        voters.insert(nid);

        self.raft
            .change_membership(voters, false)
            .await
            .map_err(|e| to_write_error("failed to add voter", e))?;

        Ok(())
    }

    async fn remove_server(&self, nid: NodeId) -> ConsensusResult<()> {
        let mut voters = self.voter_ids();

        if voters.remove(&nid) {
            self.raft
                .change_membership(voters, false)
                .await
                .map_err(|e| to_write_error("failed to remove voter", e))?;
        } else {
            let mut ids = BTreeSet::new();
            ids.insert(nid);
            self.raft
                .change_membership(ChangeMembers::RemoveNodes(ids), false)
                .await
                .map_err(|e| to_write_error("failed to remove learner", e))?;
        }

        Ok(())
    }

    async fn apply(&self, command: Command) -> ConsensusResult<()> {
        self.raft
            .client_write(command)
            .await
            .map(|_| ())
            .map_err(|e| to_write_error("failed to apply command", e))
    }

    async fn shutdown(&self) -> ConsensusResult<()> {
        self.raft
            .shutdown()
            .await
            .map_err(|e| ConsensusError::Raft(format!("failed to shut down raft: {e}")))
    }
}

/// Leadership loss surfaces as `NotALeader`; everything else is wrapped.
fn to_write_error(
    context: &str,
    err: RaftError<NodeId, ClientWriteError<NodeId, Member>>,
) -> ConsensusError {
    match err {
        RaftError::APIError(ClientWriteError::ForwardToLeader(_)) => ConsensusError::NotALeader,
        other => wrap(context, other),
    }
}
