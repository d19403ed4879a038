//! Serving a router over plain HTTP, TLS or mTLS with graceful shutdown.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use crate::error::HttpError;
use crate::tls::TlsSettings;

/// How to serve a worker's router.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub addr: String,
    pub tls: TlsSettings,
    /// In-flight requests past this deadline are cut on shutdown.
    pub graceful_shutdown_timeout: Duration,
}

/// Serve `router` on `config.addr` until `shutdown` fires, then drain
/// gracefully within the configured deadline.
pub async fn serve(
    router: Router,
    config: ServeConfig,
    shutdown: CancellationToken,
) -> Result<(), HttpError> {
    let listener = TcpListener::bind(&config.addr)
        .await
        .map_err(|source| HttpError::Bind {
            addr: config.addr.clone(),
            source,
        })?;

    if config.tls.enabled() {
        if config.tls.mutual() {
            tracing::info!(addr = %config.addr, "listening with mutual TLS");
        } else {
            tracing::info!(addr = %config.addr, "listening with TLS");
        }
        serve_tls(router, listener, &config, shutdown).await
    } else {
        tracing::info!(addr = %config.addr, "listening");
        serve_plain(router, listener, &config, shutdown).await
    }
}

async fn serve_plain(
    router: Router,
    listener: TcpListener,
    config: &ServeConfig,
    shutdown: CancellationToken,
) -> Result<(), HttpError> {
    let drain_signal = shutdown.clone();
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(async move { drain_signal.cancelled().await })
        .into_future();

    let deadline = config.graceful_shutdown_timeout;
    tokio::select! {
        result = server => result.map_err(HttpError::Io),
        () = async {
            shutdown.cancelled().await;
            tokio::time::sleep(deadline).await;
        } => {
            tracing::warn!("graceful shutdown deadline exceeded, cutting connections");
            Ok(())
        }
    }
}

async fn serve_tls(
    router: Router,
    listener: TcpListener,
    config: &ServeConfig,
    shutdown: CancellationToken,
) -> Result<(), HttpError> {
    let tls_config = config.tls.server_config()?;
    let acceptor = TlsAcceptor::from(Arc::new(tls_config));

    loop {
        let (stream, peer) = tokio::select! {
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(err) => {
                    tracing::warn!(%err, "accept failed");
                    continue;
                }
            },
        };

        let acceptor = acceptor.clone();
        let router = router.clone();
        let conn_shutdown = shutdown.clone();
        let deadline = config.graceful_shutdown_timeout;

        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(tls_stream) => tls_stream,
                Err(err) => {
                    tracing::debug!(%peer, %err, "TLS handshake failed");
                    return;
                }
            };

            let service = hyper::service::service_fn(move |request: hyper::Request<Incoming>| {
                router.clone().oneshot(request)
            });

            let builder = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new());
            let connection = builder.serve_connection_with_upgrades(TokioIo::new(tls_stream), service);

            tokio::select! {
                result = connection => {
                    if let Err(err) = result {
                        tracing::debug!(%peer, %err, "connection error");
                    }
                }
                () = async {
                    conn_shutdown.cancelled().await;
                    tokio::time::sleep(deadline).await;
                } => {
                    tracing::debug!(%peer, "cutting connection past the shutdown deadline");
                }
            }
        });
    }

    Ok(())
}
