//! The two long-running workers of the server process.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use maf_consensus::{Consensus, Engine};
use maf_http::{Healthcheck, ServeConfig, TlsSettings};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A supervised unit of work: `run` blocks for the worker's lifetime,
/// `stop` asks it to wind down.
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self) -> anyhow::Result<()>;

    async fn stop(&self);
}

/// Drives the consensus engine.
pub struct ConsensusWorker {
    engine: Arc<Engine>,
    stopped: CancellationToken,
}

impl ConsensusWorker {
    pub fn new(engine: Arc<Engine>) -> Self {
        tracing::trace!("configuring raft worker");
        Self {
            engine,
            stopped: CancellationToken::new(),
        }
    }

    pub fn engine(&self) -> Arc<Engine> {
        self.engine.clone()
    }
}

#[async_trait]
impl Worker for ConsensusWorker {
    fn name(&self) -> &'static str {
        "raft"
    }

    async fn run(&self) -> anyhow::Result<()> {
        self.engine.init().await?;
        self.stopped.cancelled().await;
        Ok(())
    }

    async fn stop(&self) {
        self.engine.stop().await;
        self.stopped.cancel();
    }
}

/// HTTP worker configuration, mapped from `server.http.*`.
#[derive(Debug, Clone)]
pub struct HttpWorkerConfig {
    pub addr: String,
    /// URL (with scheme) written under the leader-advertise key upon
    /// acquiring leadership.
    pub advertise: String,
    pub tls: TlsSettings,
    pub graceful_shutdown_timeout: Duration,
}

impl HttpWorkerConfig {
    pub fn from_http_config(http: &maf_config::HttpConfig) -> Self {
        Self {
            addr: http.addr.clone(),
            advertise: http.advertise.clone(),
            tls: TlsSettings {
                cert_file: http.cert_file.clone(),
                key_file: http.key_file.clone(),
                client_cert_file: http.client_cert_file.clone(),
            },
            graceful_shutdown_timeout: Duration::from_secs(http.graceful_shutdown_timeout),
        }
    }
}

/// Serves the `v1alpha` API and publishes the leader advertise address.
pub struct HttpWorker {
    config: HttpWorkerConfig,
    consensus: Arc<dyn Consensus>,
    leadership_rx: Mutex<Option<mpsc::Receiver<bool>>>,
    stopped: CancellationToken,
}

impl HttpWorker {
    pub fn new(config: HttpWorkerConfig, consensus: Arc<Engine>) -> Self {
        tracing::trace!("configuring http worker");

        // Capacity 1 is enough: transitions coalesce and the publisher
        // only acts on the latest state.
        let (leadership_tx, leadership_rx) = mpsc::channel(1);
        consensus.subscribe_on_leadership_changes(leadership_tx);

        Self {
            config,
            consensus,
            leadership_rx: Mutex::new(Some(leadership_rx)),
            stopped: CancellationToken::new(),
        }
    }

    /// On becoming leader, write the advertised HTTP URL under the
    /// well-known key so clients can discover the leader. A failing write
    /// here means the node lost leadership in between and the
    /// configuration is unrecoverable.
    async fn watch_leadership_changes(
        consensus: Arc<dyn Consensus>,
        advertise: String,
        mut rx: mpsc::Receiver<bool>,
        done: CancellationToken,
    ) {
        tracing::info!("watching leadership changes");

        loop {
            tokio::select! {
                () = done.cancelled() => {
                    tracing::info!("shutting down leadership changes watcher");
                    return;
                }
                event = rx.recv() => {
                    let Some(is_leader) = event else { return };
                    tracing::info!(is_leader, "leadership change detected");

                    if !is_leader {
                        continue;
                    }

                    if let Err(err) = consensus
                        .set(maf_wire::LEADER_API_ADDR_KEY, &advertise)
                        .await
                    {
                        tracing::error!(
                            %err,
                            "failed to set leader API address, this should not happen"
                        );
                        std::process::exit(1);
                    }
                }
            }
        }
    }
}

struct ConsensusHealth(Arc<dyn Consensus>);

impl Healthcheck for ConsensusHealth {
    fn is_live(&self) -> bool {
        tracing::trace!("live check called");
        self.0.is_live()
    }

    fn is_ready(&self) -> bool {
        tracing::trace!("ready check called");
        self.0.is_ready()
    }
}

#[async_trait]
impl Worker for HttpWorker {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn run(&self) -> anyhow::Result<()> {
        let rx = self
            .leadership_rx
            .lock()
            .expect("leadership receiver poisoned")
            .take();
        if let Some(rx) = rx {
            tokio::spawn(Self::watch_leadership_changes(
                self.consensus.clone(),
                self.config.advertise.clone(),
                rx,
                self.stopped.clone(),
            ));
        }

        let state = crate::http::AppState {
            consensus: self.consensus.clone(),
        };
        let health: Arc<dyn Healthcheck> = Arc::new(ConsensusHealth(self.consensus.clone()));
        let router = crate::http::build_router(state, health);

        maf_http::serve(
            router,
            ServeConfig {
                addr: self.config.addr.clone(),
                tls: self.config.tls.clone(),
                graceful_shutdown_timeout: self.config.graceful_shutdown_timeout,
            },
            self.stopped.clone(),
        )
        .await?;

        Ok(())
    }

    async fn stop(&self) {
        self.stopped.cancel();
    }
}
