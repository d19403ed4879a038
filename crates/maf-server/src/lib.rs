//! The maf server process: a consensus worker and an HTTP worker under one
//! supervisor.
//!
//! The supervisor starts both workers, blocks until SIGINT/SIGTERM (or a
//! worker failing fatally), then stops workers in reverse start order:
//! the HTTP listener drains within its graceful deadline, consensus shuts
//! raft down last.

use std::sync::Arc;

use maf_client::TlsOptions;
use maf_consensus::{Engine, EngineConfig};
use tokio::task::JoinSet;

pub mod http;
mod worker;

pub use worker::{ConsensusWorker, HttpWorker, HttpWorkerConfig, Worker};

pub struct Server {
    workers: Vec<Arc<dyn Worker>>,
}

impl Server {
    /// Construct both workers from the merged configuration and subscribe
    /// the HTTP worker to leadership changes.
    pub fn init(config: &maf_config::ServerConfig) -> Self {
        tracing::trace!("configuring server");

        let raft = &config.raft;
        let engine = Engine::new(EngineConfig {
            addr: raft.addr.clone(),
            node_id: raft.node_id.clone().unwrap_or_default(),
            devmode: raft.devmode,
            peers: raft.peers.clone(),
            data_dir: raft.data_dir.clone(),
            bootstrap: raft.bootstrap,
            server_client_tls: Some(TlsOptions {
                cert_file: config.http.clients.server.cert_file.clone(),
                key_file: config.http.clients.server.key_file.clone(),
                server_cert_file: config.http.clients.server.server_cert_file.clone(),
            }),
        });

        let consensus_worker = Arc::new(ConsensusWorker::new(engine.clone()));
        let http_worker = Arc::new(HttpWorker::new(
            HttpWorkerConfig::from_http_config(&config.http),
            engine,
        ));

        Self {
            workers: vec![consensus_worker, http_worker],
        }
    }

    /// Start all workers and block until termination, then stop them in
    /// reverse order and wait for every background task to finish.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut tasks = JoinSet::new();
        for worker in &self.workers {
            let worker = worker.clone();
            tracing::info!(worker = worker.name(), "running worker");
            tasks.spawn(async move { (worker.name(), worker.run().await) });
        }

        let mut outcome = Ok(());

        tokio::select! {
            () = wait_for_termination() => {
                tracing::info!("termination signal received");
            }
            joined = tasks.join_next() => {
                match joined {
                    Some(Ok((name, Err(err)))) => {
                        tracing::error!(worker = name, %err, "worker failed");
                        outcome = Err(err);
                    }
                    Some(Ok((name, Ok(())))) => {
                        tracing::warn!(worker = name, "worker exited early");
                    }
                    Some(Err(err)) => {
                        tracing::error!(%err, "worker task panicked");
                        outcome = Err(err.into());
                    }
                    None => {}
                }
            }
        }

        for worker in self.workers.iter().rev() {
            tracing::info!(worker = worker.name(), "stopping worker");
            worker.stop().await;
        }

        tracing::trace!("waiting for all workers to stop");
        while tasks.join_next().await.is_some() {}

        outcome
    }
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(sig) => sig,
        Err(err) => {
            tracing::error!(%err, "failed to install SIGINT handler");
            return std::future::pending().await;
        }
    };
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sig) => sig,
        Err(err) => {
            tracing::error!(%err, "failed to install SIGTERM handler");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}
