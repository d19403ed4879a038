//! The consensus engine.
//!
//! Wires the replicated store, the TCP transport and the raft instance
//! together, and exposes the [`Consensus`] surface the HTTP layer holds: a
//! capability-restricted handle with membership, key-value and liveness
//! operations. Reads are served from the local store and are eventually
//! consistent; mutations require leadership.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use maf_client::{Client, TlsOptions};
use maf_wire::ClusterInfo;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::command::Command;
use crate::control::{OpenraftControl, RaftControl, RaftRole};
use crate::error::{ConsensusError, ConsensusResult};
use crate::network::{self, RaftTransport};
use crate::storage::ReplicatedStore;
use crate::store::SafeStore;
use crate::typeconfig::{MafRaft, Member, node_id};

const DATADIR_MODE: u32 = 0o700;
const CMD_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_JOIN_DELAY: Duration = Duration::from_secs(1);

/// Capacity-bounded inbox for leadership transitions. Delivery is
/// non-blocking: a full inbox drops the event for that subscriber only.
pub type LeadershipChanges = mpsc::Sender<bool>;

/// The surface handed to the HTTP layer and supervisor.
#[async_trait]
pub trait Consensus: Send + Sync {
    /// Init sequence finished (bootstrap done or a peer accepted us).
    fn is_ready(&self) -> bool;

    /// Local raft role is Leader or Follower.
    fn is_live(&self) -> bool;

    fn is_leader(&self) -> bool;

    async fn join(&self, server_id: &str, addr: &str) -> ConsensusResult<()>;

    async fn forget(&self, server_id: &str) -> ConsensusResult<()>;

    async fn get_info(&self, verbose: bool) -> ConsensusResult<ClusterInfo>;

    /// Local read; eventually consistent with respect to committed writes.
    fn get(&self, key: &str) -> Option<String>;

    async fn set(&self, key: &str, value: &str) -> ConsensusResult<()>;

    async fn delete(&self, key: &str) -> ConsensusResult<()>;

    fn subscribe_on_leadership_changes(&self, subscriber: LeadershipChanges);
}

/// Engine configuration, mapped from `server.raft.*`.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Raft transport address (`host:port`), distinct from the HTTP
    /// address.
    pub addr: String,
    /// Operator-chosen id, unique within the cluster.
    pub node_id: String,
    /// In-memory stores; no on-disk state.
    pub devmode: bool,
    /// HTTP advertise URLs of peers to join on startup.
    pub peers: Vec<String>,
    /// Durable state directory; unused in devmode.
    pub data_dir: Option<String>,
    /// Form a new single-node cluster instead of joining peers.
    pub bootstrap: bool,
    /// TLS material for the outbound join client.
    pub server_client_tls: Option<TlsOptions>,
}

pub struct Engine {
    config: EngineConfig,
    store: Arc<SafeStore>,
    control: OnceLock<Arc<dyn RaftControl>>,
    init_completed: AtomicBool,
    subscribers: Mutex<Vec<LeadershipChanges>>,
    done: CancellationToken,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Arc<Self> {
        tracing::trace!("configuring consensus engine");

        Arc::new(Self {
            config,
            store: Arc::new(SafeStore::new()),
            control: OnceLock::new(),
            init_completed: AtomicBool::new(false),
            subscribers: Mutex::new(Vec::new()),
            done: CancellationToken::new(),
        })
    }

    /// Deterministic init sequence; any failure is fatal for the worker.
    pub async fn init(self: &Arc<Self>) -> ConsensusResult<()> {
        tracing::trace!("initializing consensus engine");

        self.ensure_datadir()?;

        let raft_config = openraft::Config {
            cluster_name: "maf".to_string(),
            heartbeat_interval: 500,
            election_timeout_min: 1500,
            election_timeout_max: 3000,
            ..Default::default()
        }
        .validate()
        .map_err(|e| ConsensusError::Raft(format!("invalid raft config: {e}")))?;

        let listener = TcpListener::bind(&self.config.addr).await?;
        tracing::info!(addr = %self.config.addr, "raft transport bound");

        let store = if self.config.devmode {
            tracing::info!("using in-memory log and stable store");
            ReplicatedStore::in_memory(self.store.clone())
        } else {
            let datadir = self.config.data_dir.as_deref().ok_or_else(|| {
                ConsensusError::Storage("data_dir is required outside devmode".to_string())
            })?;
            tracing::info!(%datadir, "using sled log and stable store");
            ReplicatedStore::open(self.store.clone(), Path::new(datadir))?
        };

        let (log_store, state_machine) = openraft::storage::Adaptor::new(store);

        let raft = MafRaft::new(
            node_id(&self.config.node_id),
            Arc::new(raft_config),
            RaftTransport::default(),
            log_store,
            state_machine,
        )
        .await
        .map_err(|e| ConsensusError::Raft(format!("failed to create raft instance: {e}")))?;

        network::spawn_listener(raft.clone(), listener, self.done.clone());

        let control: Arc<dyn RaftControl> = Arc::new(OpenraftControl::new(raft));
        let _ = self.control.set(control.clone());

        self.spawn_watcher(control.leadership_watch());

        if self.config.bootstrap {
            tracing::info!("bootstrapping raft cluster");
            control
                .bootstrap(Member::new(&self.config.node_id, &self.config.addr))
                .await?;
            self.init_completed.store(true, Ordering::SeqCst);
        } else {
            self.spawn_auto_join();
        }

        Ok(())
    }

    /// Stop raft and the engine's background tasks.
    pub async fn stop(&self) {
        tracing::info!("stopping consensus engine");

        if !self.init_completed.load(Ordering::SeqCst) {
            tracing::warn!("consensus not initialized, skipping stop");
            self.done.cancel();
            return;
        }

        if self.is_leader() {
            // No explicit transfer operation is available; the remaining
            // quorum elects a successor once we shut down.
            tracing::info!("stepping down as leader");
        }

        if let Some(control) = self.control.get() {
            if let Err(err) = control.shutdown().await {
                tracing::error!(%err, "failed to shut down raft");
            }
        }

        self.done.cancel();
    }

    fn ensure_datadir(&self) -> ConsensusResult<()> {
        let Some(datadir) = self.config.data_dir.as_deref().filter(|d| !d.is_empty()) else {
            return Ok(());
        };

        tracing::info!(%datadir, "using raft data directory");
        std::fs::create_dir_all(datadir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(datadir, std::fs::Permissions::from_mode(DATADIR_MODE))?;
        }

        Ok(())
    }

    fn control(&self) -> ConsensusResult<&Arc<dyn RaftControl>> {
        self.control.get().ok_or(ConsensusError::NotInitialized)
    }

    fn spawn_watcher(self: &Arc<Self>, mut leadership: watch::Receiver<bool>) {
        let engine = Arc::clone(self);

        tokio::spawn(async move {
            tracing::info!("monitoring leadership changes");

            loop {
                tokio::select! {
                    () = engine.done.cancelled() => {
                        tracing::info!("stopping leadership monitoring");
                        break;
                    }
                    changed = leadership.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let is_leader = *leadership.borrow_and_update();
                        if is_leader {
                            tracing::info!("became leader");
                        } else {
                            tracing::info!("lost leadership");
                        }
                        engine.broadcast_leadership_change(is_leader);
                    }
                }
            }
        });
    }

    fn broadcast_leadership_change(&self, is_leader: bool) {
        let subscribers = self.subscribers.lock().expect("subscriber list poisoned");

        for subscriber in subscribers.iter() {
            match subscriber.try_send(is_leader) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("leadership change channel is full, skipping");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!("leadership change subscriber gone");
                }
            }
        }
    }

    fn spawn_auto_join(self: &Arc<Self>) {
        let engine = Arc::clone(self);

        tokio::spawn(async move {
            tracing::info!("retrying to join peers");

            loop {
                for peer in &engine.config.peers {
                    if engine.done.is_cancelled() {
                        return;
                    }

                    tracing::debug!(%peer, "joining peer");

                    let url = match Url::parse(peer) {
                        Ok(url) => url,
                        Err(err) => {
                            tracing::warn!(%peer, %err, "failed to parse peer URL");
                            continue;
                        }
                    };

                    if url_authority(&url) == engine.config.addr {
                        tracing::debug!("skipping self");
                        continue;
                    }

                    match engine.try_join(peer).await {
                        Ok(()) => {
                            tracing::info!(%peer, "successfully joined peer");
                            engine.init_completed.store(true, Ordering::SeqCst);
                            return;
                        }
                        Err(err) => {
                            tracing::warn!(%peer, %err, "failed to join peer");
                        }
                    }
                }

                tokio::select! {
                    () = engine.done.cancelled() => return,
                    () = tokio::time::sleep(RETRY_JOIN_DELAY) => {}
                }
            }
        });
    }

    async fn try_join(&self, peer: &str) -> Result<(), maf_client::ClientError> {
        let client = Client::with_auto_tls(peer, self.config.server_client_tls.as_ref(), true)?;
        client
            .raft_join(&self.config.node_id, &self.config.addr)
            .await
    }

    async fn apply_command(&self, command: Command) -> ConsensusResult<()> {
        let control = self.control()?;

        match tokio::time::timeout(CMD_TIMEOUT, control.apply(command)).await {
            Ok(result) => result,
            Err(_) => Err(ConsensusError::Timeout),
        }
    }
}

fn url_authority(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        _ => String::new(),
    }
}

#[async_trait]
impl Consensus for Engine {
    fn is_ready(&self) -> bool {
        self.init_completed.load(Ordering::SeqCst)
    }

    fn is_live(&self) -> bool {
        let Some(control) = self.control.get() else {
            return false;
        };
        matches!(control.role(), RaftRole::Leader | RaftRole::Follower)
    }

    fn is_leader(&self) -> bool {
        self.control
            .get()
            .is_some_and(|control| control.role() == RaftRole::Leader)
    }

    async fn join(&self, server_id: &str, addr: &str) -> ConsensusResult<()> {
        tracing::trace!(%server_id, %addr, "join requested");

        if !self.is_leader() {
            tracing::warn!("not a leader, can't proceed with join");
            return Err(ConsensusError::NotALeader);
        }

        let control = self.control()?;

        // An exact match is an idempotent re-join; a partial collision on
        // id or address means the node was re-provisioned and the stale
        // entry has to go first.
        for entry in control.members() {
            let same_id = entry.member.id == server_id;
            let same_addr = entry.member.addr == addr;

            if same_id && same_addr {
                tracing::info!(
                    %server_id, %addr,
                    "node already member of cluster, ignoring join request"
                );
                return Ok(());
            }

            if same_id || same_addr {
                tracing::info!(
                    id = %entry.member.id, addr = %entry.member.addr,
                    "removing conflicting member before join"
                );
                control.remove_server(entry.nid).await?;
            }
        }

        control.add_voter(Member::new(server_id, addr)).await?;

        tracing::info!(%server_id, %addr, "successfully added voter");
        Ok(())
    }

    async fn forget(&self, server_id: &str) -> ConsensusResult<()> {
        tracing::trace!(%server_id, "forget requested");

        if !self.is_leader() {
            tracing::warn!("not a leader, can't proceed with forget");
            return Err(ConsensusError::NotALeader);
        }

        self.control()?.remove_server(node_id(server_id)).await
    }

    async fn get_info(&self, verbose: bool) -> ConsensusResult<ClusterInfo> {
        tracing::trace!("cluster info requested");

        let control = self.control()?;
        let leader = control.current_leader();

        let servers = control
            .members()
            .into_iter()
            .map(|entry| maf_wire::ServerEntry {
                id: entry.member.id.clone(),
                address: entry.member.addr.clone(),
                suffrage: entry.suffrage().to_string(),
                leader: leader.as_ref() == Some(&entry.member),
            })
            .collect();

        Ok(ClusterInfo {
            state: control.role().to_string(),
            id: self.config.node_id.clone(),
            addr: self.config.addr.clone(),
            servers,
            stats: verbose.then(|| control.stats()),
        })
    }

    fn get(&self, key: &str) -> Option<String> {
        self.store.get(key)
    }

    async fn set(&self, key: &str, value: &str) -> ConsensusResult<()> {
        if !self.is_leader() {
            tracing::warn!("not a leader, can't proceed with set");
            return Err(ConsensusError::NotALeader);
        }

        self.apply_command(Command::set(key, value)).await
    }

    async fn delete(&self, key: &str) -> ConsensusResult<()> {
        if !self.is_leader() {
            tracing::warn!("not a leader, can't proceed with delete");
            return Err(ConsensusError::NotALeader);
        }

        self.apply_command(Command::delete(key)).await
    }

    fn subscribe_on_leadership_changes(&self, subscriber: LeadershipChanges) {
        tracing::trace!("registering leadership changes channel");
        self.subscribers
            .lock()
            .expect("subscriber list poisoned")
            .push(subscriber);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::control::MemberEntry;

    struct MockControl {
        role: Mutex<RaftRole>,
        members: Mutex<Vec<MemberEntry>>,
        applied: Mutex<Vec<Command>>,
    }

    impl MockControl {
        fn with_role(role: RaftRole) -> Arc<Self> {
            Arc::new(Self {
                role: Mutex::new(role),
                members: Mutex::new(Vec::new()),
                applied: Mutex::new(Vec::new()),
            })
        }

        fn leader() -> Arc<Self> {
            Self::with_role(RaftRole::Leader)
        }

        fn follower() -> Arc<Self> {
            Self::with_role(RaftRole::Follower)
        }

        fn with_member(self: Arc<Self>, id: &str, addr: &str) -> Arc<Self> {
            self.members.lock().unwrap().push(MemberEntry {
                nid: node_id(id),
                member: Member::new(id, addr),
                voter: true,
            });
            self
        }

        fn member_pairs(&self) -> Vec<(String, String)> {
            self.members
                .lock()
                .unwrap()
                .iter()
                .map(|e| (e.member.id.clone(), e.member.addr.clone()))
                .collect()
        }
    }

    #[async_trait]
    impl RaftControl for MockControl {
        fn role(&self) -> RaftRole {
            *self.role.lock().unwrap()
        }

        fn current_leader(&self) -> Option<Member> {
            None
        }

        fn members(&self) -> Vec<MemberEntry> {
            self.members.lock().unwrap().clone()
        }

        fn stats(&self) -> BTreeMap<String, String> {
            BTreeMap::new()
        }

        fn leadership_watch(&self) -> watch::Receiver<bool> {
            watch::channel(false).1
        }

        async fn bootstrap(&self, _member: Member) -> ConsensusResult<()> {
            Ok(())
        }

        async fn add_voter(&self, member: Member) -> ConsensusResult<()> {
            self.members.lock().unwrap().push(MemberEntry {
                nid: node_id(&member.id),
                member,
                voter: true,
            });
            Ok(())
        }

        async fn remove_server(&self, nid: u64) -> ConsensusResult<()> {
            self.members.lock().unwrap().retain(|e| e.nid != nid);
            Ok(())
        }

        async fn apply(&self, command: Command) -> ConsensusResult<()> {
            self.applied.lock().unwrap().push(command);
            Ok(())
        }

        async fn shutdown(&self) -> ConsensusResult<()> {
            Ok(())
        }
    }

    fn engine_with(control: Arc<MockControl>) -> Arc<Engine> {
        let engine = Engine::new(EngineConfig {
            addr: "127.0.0.1:7081".to_string(),
            node_id: "local".to_string(),
            devmode: true,
            ..Default::default()
        });
        let _ = engine.control.set(control);
        engine.init_completed.store(true, Ordering::SeqCst);
        engine
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let control = MockControl::leader().with_member("b", "127.0.0.1:7082");
        let engine = engine_with(control.clone());

        engine.join("b", "127.0.0.1:7082").await.unwrap();
        engine.join("b", "127.0.0.1:7082").await.unwrap();

        assert_eq!(
            control.member_pairs(),
            vec![("b".to_string(), "127.0.0.1:7082".to_string())]
        );
    }

    #[tokio::test]
    async fn join_replaces_member_with_same_id() {
        let control = MockControl::leader().with_member("b", "127.0.0.1:7082");
        let engine = engine_with(control.clone());

        engine.join("b", "10.0.0.9:7082").await.unwrap();

        assert_eq!(
            control.member_pairs(),
            vec![("b".to_string(), "10.0.0.9:7082".to_string())]
        );
    }

    #[tokio::test]
    async fn join_replaces_member_with_same_addr() {
        let control = MockControl::leader().with_member("b", "127.0.0.1:7082");
        let engine = engine_with(control.clone());

        engine.join("b2", "127.0.0.1:7082").await.unwrap();

        assert_eq!(
            control.member_pairs(),
            vec![("b2".to_string(), "127.0.0.1:7082".to_string())]
        );
    }

    #[tokio::test]
    async fn join_on_follower_is_rejected_without_mutation() {
        let control = MockControl::follower().with_member("a", "127.0.0.1:7081");
        let engine = engine_with(control.clone());

        let err = engine.join("b", "127.0.0.1:7082").await.unwrap_err();
        assert!(matches!(err, ConsensusError::NotALeader));
        assert_eq!(control.member_pairs().len(), 1);
    }

    #[tokio::test]
    async fn forget_on_follower_is_rejected() {
        let engine = engine_with(MockControl::follower());
        let err = engine.forget("b").await.unwrap_err();
        assert!(matches!(err, ConsensusError::NotALeader));
    }

    #[tokio::test]
    async fn forget_removes_member() {
        let control = MockControl::leader()
            .with_member("a", "127.0.0.1:7081")
            .with_member("b", "127.0.0.1:7082");
        let engine = engine_with(control.clone());

        engine.forget("b").await.unwrap();
        assert_eq!(
            control.member_pairs(),
            vec![("a".to_string(), "127.0.0.1:7081".to_string())]
        );
    }

    #[tokio::test]
    async fn set_on_follower_is_rejected_without_apply() {
        let control = MockControl::follower();
        let engine = engine_with(control.clone());

        let err = engine.set("k", "v").await.unwrap_err();
        assert!(matches!(err, ConsensusError::NotALeader));
        assert!(control.applied.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_and_delete_apply_commands_in_order() {
        let control = MockControl::leader();
        let engine = engine_with(control.clone());

        engine.set("k", "v").await.unwrap();
        engine.delete("k").await.unwrap();

        let applied = control.applied.lock().unwrap();
        assert_eq!(applied[0], Command::set("k", "v"));
        assert_eq!(applied[1], Command::delete("k"));
    }

    #[tokio::test]
    async fn get_info_marks_no_leader_when_unknown() {
        let control = MockControl::leader().with_member("a", "127.0.0.1:7081");
        let engine = engine_with(control);

        let info = engine.get_info(false).await.unwrap();
        assert_eq!(info.state, "Leader");
        assert_eq!(info.servers.len(), 1);
        assert!(!info.servers[0].leader);
        assert!(info.stats.is_none());

        let info = engine.get_info(true).await.unwrap();
        assert!(info.stats.is_some());
    }

    #[tokio::test]
    async fn full_subscriber_does_not_block_others() {
        let engine = engine_with(MockControl::leader());

        let (full_tx, _full_rx) = mpsc::channel(1);
        full_tx.try_send(true).unwrap(); // pre-fill to capacity
        let (open_tx, mut open_rx) = mpsc::channel(1);

        engine.subscribe_on_leadership_changes(full_tx);
        engine.subscribe_on_leadership_changes(open_tx);

        engine.broadcast_leadership_change(true);

        assert!(open_rx.try_recv().unwrap());
    }

    #[tokio::test]
    async fn local_get_reads_the_store() {
        let engine = engine_with(MockControl::leader());
        assert_eq!(engine.get("missing"), None);

        engine.store.set("k", "v");
        assert_eq!(engine.get("k"), Some("v".to_string()));
    }
}
