//! TCP raft transport.
//!
//! Nodes exchange raft RPCs as length-delimited JSON frames over plain TCP,
//! bound to the configured raft address (distinct from the HTTP address).
//! Outbound connections are cached per target and re-established once on
//! error; transport failures surface as `Unreachable` so raft backs off,
//! remote raft errors come back typed.

use std::io;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use openraft::error::{
    InstallSnapshotError, NetworkError, RPCError, RaftError, RemoteError, Unreachable,
};
use openraft::network::{RPCOption, RaftNetwork, RaftNetworkFactory};
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;

use crate::typeconfig::{MafRaft, Member, NodeId, TypeConfig};

/// Snapshot chunks dominate frame sizes.
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_BYTES)
        .new_codec()
}

#[derive(Debug, Serialize, Deserialize)]
enum RpcRequest {
    AppendEntries(AppendEntriesRequest<TypeConfig>),
    InstallSnapshot(InstallSnapshotRequest<TypeConfig>),
    Vote(VoteRequest<NodeId>),
}

#[derive(Debug, Serialize, Deserialize)]
enum RpcReply {
    AppendEntries(Result<AppendEntriesResponse<NodeId>, RaftError<NodeId>>),
    InstallSnapshot(
        Result<InstallSnapshotResponse<NodeId>, RaftError<NodeId, InstallSnapshotError>>,
    ),
    Vote(Result<VoteResponse<NodeId>, RaftError<NodeId>>),
}

#[derive(Debug, Error)]
#[error("raft transport protocol error: {0}")]
struct ProtocolError(String);

/// Outbound side: builds one cached connection per peer.
#[derive(Debug, Clone, Default)]
pub(crate) struct RaftTransport;

impl RaftNetworkFactory<TypeConfig> for RaftTransport {
    type Network = Connection;

    async fn new_client(&mut self, target: NodeId, node: &Member) -> Self::Network {
        Connection {
            target,
            addr: node.addr.clone(),
            framed: None,
        }
    }
}

pub(crate) struct Connection {
    target: NodeId,
    addr: String,
    framed: Option<Framed<TcpStream, LengthDelimitedCodec>>,
}

impl Connection {
    async fn call(&mut self, request: &RpcRequest) -> io::Result<RpcReply> {
        let raw = serde_json::to_vec(request).map_err(io::Error::other)?;

        let mut attempts = 0;
        loop {
            let framed = match self.framed.take() {
                Some(framed) => self.framed.insert(framed),
                None => {
                    let stream = TcpStream::connect(&self.addr).await?;
                    self.framed.insert(Framed::new(stream, codec()))
                }
            };

            match exchange(framed, raw.clone()).await {
                Ok(reply) => return Ok(reply),
                Err(err) => {
                    // A cached connection may be stale; reconnect once.
                    self.framed = None;
                    attempts += 1;
                    if attempts > 1 {
                        return Err(err);
                    }
                }
            }
        }
    }
}

async fn exchange(
    framed: &mut Framed<TcpStream, LengthDelimitedCodec>,
    raw: Vec<u8>,
) -> io::Result<RpcReply> {
    framed.send(Bytes::from(raw)).await?;

    let frame = framed
        .next()
        .await
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed connection"))??;

    serde_json::from_slice(&frame).map_err(io::Error::other)
}

fn unexpected_reply<E>(got: &RpcReply) -> RPCError<NodeId, Member, E>
where
    E: std::error::Error,
{
    RPCError::Network(NetworkError::new(&ProtocolError(format!(
        "unexpected reply variant: {got:?}"
    ))))
}

impl RaftNetwork<TypeConfig> for Connection {
    async fn append_entries(
        &mut self,
        rpc: AppendEntriesRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<AppendEntriesResponse<NodeId>, RPCError<NodeId, Member, RaftError<NodeId>>> {
        let reply = self
            .call(&RpcRequest::AppendEntries(rpc))
            .await
            .map_err(|e| RPCError::Unreachable(Unreachable::new(&e)))?;

        match reply {
            RpcReply::AppendEntries(Ok(resp)) => Ok(resp),
            RpcReply::AppendEntries(Err(err)) => {
                Err(RPCError::RemoteError(RemoteError::new(self.target, err)))
            }
            other => Err(unexpected_reply(&other)),
        }
    }

    async fn install_snapshot(
        &mut self,
        rpc: InstallSnapshotRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<
        InstallSnapshotResponse<NodeId>,
        RPCError<NodeId, Member, RaftError<NodeId, InstallSnapshotError>>,
    > {
        let reply = self
            .call(&RpcRequest::InstallSnapshot(rpc))
            .await
            .map_err(|e| RPCError::Unreachable(Unreachable::new(&e)))?;

        match reply {
            RpcReply::InstallSnapshot(Ok(resp)) => Ok(resp),
            RpcReply::InstallSnapshot(Err(err)) => {
                Err(RPCError::RemoteError(RemoteError::new(self.target, err)))
            }
            other => Err(unexpected_reply(&other)),
        }
    }

    async fn vote(
        &mut self,
        rpc: VoteRequest<NodeId>,
        _option: RPCOption,
    ) -> Result<VoteResponse<NodeId>, RPCError<NodeId, Member, RaftError<NodeId>>> {
        let reply = self
            .call(&RpcRequest::Vote(rpc))
            .await
            .map_err(|e| RPCError::Unreachable(Unreachable::new(&e)))?;

        match reply {
            RpcReply::Vote(Ok(resp)) => Ok(resp),
            RpcReply::Vote(Err(err)) => {
                Err(RPCError::RemoteError(RemoteError::new(self.target, err)))
            }
            other => Err(unexpected_reply(&other)),
        }
    }
}

/// Inbound side: accepts peer connections and feeds RPCs into the local
/// raft instance until the engine shuts down.
pub(crate) fn spawn_listener(raft: MafRaft, listener: TcpListener, done: CancellationToken) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = done.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::trace!(%peer, "raft transport connection accepted");
                        tokio::spawn(handle_peer(raft.clone(), stream, done.clone()));
                    }
                    Err(err) => {
                        tracing::warn!(%err, "raft transport accept failed");
                    }
                },
            }
        }
        tracing::debug!("raft transport listener stopped");
    });
}

async fn handle_peer(raft: MafRaft, stream: TcpStream, done: CancellationToken) {
    let mut framed = Framed::new(stream, codec());

    loop {
        let frame = tokio::select! {
            () = done.cancelled() => break,
            frame = framed.next() => frame,
        };

        let raw = match frame {
            None => break,
            Some(Err(err)) => {
                tracing::warn!(%err, "raft transport read failed");
                break;
            }
            Some(Ok(raw)) => raw,
        };

        let reply = match dispatch(&raft, &raw).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(%err, "dropping undecodable raft rpc");
                break;
            }
        };

        if let Err(err) = framed.send(Bytes::from(reply)).await {
            tracing::warn!(%err, "raft transport write failed");
            break;
        }
    }
}

async fn dispatch(raft: &MafRaft, raw: &[u8]) -> Result<Vec<u8>, serde_json::Error> {
    let request: RpcRequest = serde_json::from_slice(raw)?;

    let reply = match request {
        RpcRequest::AppendEntries(rpc) => RpcReply::AppendEntries(raft.append_entries(rpc).await),
        RpcRequest::Vote(rpc) => RpcReply::Vote(raft.vote(rpc).await),
        RpcRequest::InstallSnapshot(rpc) => {
            RpcReply::InstallSnapshot(raft.install_snapshot(rpc).await)
        }
    };

    serde_json::to_vec(&reply)
}
