//! `maf server raft …` — cluster and key-value operations over the API.
//!
//! Read-only commands hit the configured advertise address directly.
//! Mutating commands first look up the current leader via the
//! `leaderAPIAddr` key and reissue against the returned URL.

use std::path::Path;

use anyhow::{Context, bail};
use maf_client::{Client, TlsOptions};
use maf_config::Config;

use crate::{KvCommands, RaftCommands};

pub fn run(config_file: Option<&Path>, command: &RaftCommands) -> anyhow::Result<()> {
    let cfg = super::load_config(config_file)?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    runtime.block_on(async {
        match command {
            RaftCommands::Info { include_stats } => info(&cfg, *include_stats).await,
            RaftCommands::Forget { server_id } => forget(&cfg, server_id).await,
            RaftCommands::Kv(kv) => match kv {
                KvCommands::Get { key } => kv_get(&cfg, key).await,
                KvCommands::Set { key, value } => kv_set(&cfg, key, value).await,
                KvCommands::Delete { key } => kv_delete(&cfg, key).await,
            },
        }
    })
}

fn client_tls(cfg: &Config) -> TlsOptions {
    let clients = &cfg.server.http.clients.server;
    TlsOptions {
        cert_file: clients.cert_file.clone(),
        key_file: clients.key_file.clone(),
        server_cert_file: clients.server_cert_file.clone(),
    }
}

/// Client against the locally configured advertise address.
fn direct_client(cfg: &Config) -> anyhow::Result<Client> {
    Client::with_auto_tls(&cfg.server.http.advertise, Some(&client_tls(cfg)), false)
        .context("failed to build API client")
}

/// Client against the current leader, discovered through the replicated
/// advertise key.
async fn leader_client(cfg: &Config) -> anyhow::Result<Client> {
    let direct = direct_client(cfg)?;
    let (leader_addr, exist) = direct
        .raft_kv_get(maf_wire::LEADER_API_ADDR_KEY)
        .await
        .context("failed to discover the leader")?;

    if !exist || leader_addr.is_empty() {
        bail!("leader API address not found");
    }

    Client::with_auto_tls(&leader_addr, Some(&client_tls(cfg)), false)
        .context("failed to build leader API client")
}

async fn info(cfg: &Config, include_stats: bool) -> anyhow::Result<()> {
    let client = direct_client(cfg)?;
    let info = client.raft_info(include_stats).await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

async fn forget(cfg: &Config, server_id: &str) -> anyhow::Result<()> {
    let client = leader_client(cfg).await?;
    client.raft_forget(server_id).await?;
    Ok(())
}

async fn kv_get(cfg: &Config, key: &str) -> anyhow::Result<()> {
    let client = direct_client(cfg)?;
    let (value, exist) = client.raft_kv_get(key).await?;
    if exist {
        println!("{value}");
    }
    Ok(())
}

async fn kv_set(cfg: &Config, key: &str, value: &str) -> anyhow::Result<()> {
    let client = leader_client(cfg).await?;
    client.raft_kv_set(key, value).await?;
    Ok(())
}

async fn kv_delete(cfg: &Config, key: &str) -> anyhow::Result<()> {
    let client = leader_client(cfg).await?;
    client.raft_kv_delete(key).await?;
    Ok(())
}
