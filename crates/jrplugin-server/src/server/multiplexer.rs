//! The plugin server: one loopback listener, four gRPC services, one
//! handshake line.
//!
//! ```text
//!  Created ──bind()──► Bound ──serve_with_shutdown()──► Serving
//!                                                          │ signal / stop() / honored Shutdown RPC
//!                                                          ▼
//!                                 Stopped ◄── transport ── Stopping
//!                                             drained      (health NOT_SERVING,
//!                                                           stdio cancelled,
//!                                                           pool drained)
//! ```
//!
//! The handshake is written only after the listener is bound, so a host that
//! reads it can connect right away; connections that arrive before the accept
//! loop is polled wait in the listen backlog.

use crate::server::{
    bridge::LogBridge,
    config::ServerConfig,
    health::{HealthReporter, HealthService},
    pool::manager::WorkerPool,
    service::{controller::ControllerService, producer::ProducerService, stdio::StdioService},
    work::WorkService,
};
use anyhow::{Context, anyhow};
use core::{future::Future, time::Duration};
use futures::Stream;
use jrplugin_core::{
    Handshake, Network,
    proto::{
        FILE_DESCRIPTOR_SET,
        plugin::{grpc_controller_server::GrpcControllerServer, grpc_stdio_server::GrpcStdioServer},
        producer::producer_server::ProducerServer,
    },
    types::{PLUGIN_HEALTH_SERVICE, ServingStatus},
};
use std::{io::Write, path::PathBuf, sync::Arc};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
    sync::watch,
};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::{
    codec::CompressionEncoding,
    server::NamedService,
    transport::{Server, server::Connected},
};
use tonic_health::pb::health_server::HealthServer;

/// Extra time on top of `shutdown_timeout` before a transport that refuses to
/// drain is aborted.
const TRANSPORT_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle of a [`PluginServer`]. States only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServerState {
    Created,
    Bound,
    Serving,
    Stopping,
    Stopped,
}

/// Observes and stops a server from another task.
#[derive(Clone)]
pub struct ServerHandle {
    state: watch::Receiver<ServerState>,
    stop: CancellationToken,
}

impl ServerHandle {
    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Starts a graceful stop. Idempotent.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Waits until the server reaches `target` or any later state, and returns
    /// the state observed.
    pub async fn wait_for(&self, target: ServerState) -> ServerState {
        let mut rx = self.state.clone();
        let reached = rx.wait_for(|state| *state >= target).await.map(|state| *state);
        reached.unwrap_or_else(|_| *rx.borrow())
    }
}

/// A plugin server that has not bound its listener yet.
pub struct PluginServer {
    config: ServerConfig,
    bridge: LogBridge,
    work: Arc<dyn WorkService>,
    state: Arc<watch::Sender<ServerState>>,
    stop: CancellationToken,
}

impl PluginServer {
    /// Creates a server in [`ServerState::Created`].
    ///
    /// `bridge` is the queue drained by `StreamStdio`; `work` handles every
    /// `Produce` call.
    pub fn new(config: ServerConfig, bridge: LogBridge, work: Arc<dyn WorkService>) -> Self {
        let (state, _) = watch::channel(ServerState::Created);
        Self {
            config,
            bridge,
            work,
            state: Arc::new(state),
            stop: CancellationToken::new(),
        }
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            state: self.state.subscribe(),
            stop: self.stop.clone(),
        }
    }

    /// Binds the listener and moves to [`ServerState::Bound`].
    ///
    /// # Errors
    ///
    /// Fails if the address is not loopback, is already in use, or (with
    /// `uds`) the platform has no Unix sockets.
    pub async fn bind(self) -> anyhow::Result<BoundServer> {
        let (listener, handshake, uds_path) = if self.config.uds {
            bind_uds(&self.config)?
        } else {
            let addr = self.config.loopback_addr()?;
            let tcp = TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            let local = tcp.local_addr()?;
            let handshake = Handshake::grpc(
                self.config.app_protocol_version,
                Network::Tcp,
                local.to_string(),
            );
            (Listener::Tcp(tcp), handshake, None)
        };

        log_startup_info(&handshake.address, &self.config);
        self.state.send_replace(ServerState::Bound);

        Ok(BoundServer {
            server: self,
            listener,
            handshake,
            uds_path,
        })
    }
}

enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener),
}

#[cfg(unix)]
fn bind_uds(config: &ServerConfig) -> anyhow::Result<(Listener, Handshake, Option<PathBuf>)> {
    let path = PathBuf::from(&config.server_addr);
    let uds = tokio::net::UnixListener::bind(&path)
        .with_context(|| format!("failed to bind {}", path.display()))?;
    let handshake = Handshake::grpc(
        config.app_protocol_version,
        Network::Unix,
        config.server_addr.clone(),
    );
    Ok((Listener::Unix(uds), handshake, Some(path)))
}

#[cfg(not(unix))]
fn bind_uds(_config: &ServerConfig) -> anyhow::Result<(Listener, Handshake, Option<PathBuf>)> {
    anyhow::bail!("Unix domain sockets are not supported on this platform");
}

/// A server with a bound listener, ready to announce itself and serve.
pub struct BoundServer {
    server: PluginServer,
    listener: Listener,
    handshake: Handshake,
    uds_path: Option<PathBuf>,
}

impl BoundServer {
    /// The line that [`serve_with_shutdown`](Self::serve_with_shutdown) will
    /// write.
    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    pub fn handle(&self) -> ServerHandle {
        self.server.handle()
    }

    /// Starts serving, writes the handshake to `out`, and runs until `signal`
    /// resolves or the server is stopped through its [`ServerHandle`].
    ///
    /// # Errors
    ///
    /// Fails if the handshake cannot be written (the server is torn down
    /// before reaching [`ServerState::Serving`]) or the transport fails.
    pub async fn serve_with_shutdown<W, F>(self, out: W, signal: F) -> anyhow::Result<()>
    where
        W: Write + Send + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        let Self {
            server,
            listener,
            handshake,
            uds_path,
        } = self;

        let result = match listener {
            Listener::Tcp(tcp) => {
                server
                    .run_with_incoming(TcpListenerStream::new(tcp), &handshake, out, signal)
                    .await
            }
            #[cfg(unix)]
            Listener::Unix(uds) => {
                server
                    .run_with_incoming(
                        tokio_stream::wrappers::UnixListenerStream::new(uds),
                        &handshake,
                        out,
                        signal,
                    )
                    .await
            }
        };

        if let Some(path) = uds_path {
            // A panic above can still leave the socket file behind.
            let _ = std::fs::remove_file(path);
        }

        result
    }
}

impl PluginServer {
    async fn run_with_incoming<I, IO, IE, W, F>(
        self,
        incoming: I,
        handshake: &Handshake,
        out: W,
        signal: F,
    ) -> anyhow::Result<()>
    where
        I: Stream<Item = Result<IO, IE>>,
        IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
        IE: Into<tower::BoxError>,
        W: Write + Send + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        let config = self.config;
        let shutdown = self.stop;
        let state = self.state;

        let pool = Arc::new(WorkerPool::spawn(
            config.num_workers,
            Arc::clone(&self.work),
            config.shutdown_timeout,
        ));

        let health = HealthReporter::new();
        health.set_status(PLUGIN_HEALTH_SERVICE, ServingStatus::Serving);
        for name in service_names() {
            health.set_status(name, ServingStatus::Serving);
        }

        let reflection = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
            .build_v1()?;

        let controller =
            ControllerService::new(config.honor_shutdown_rpc.then(|| shutdown.clone()));
        let stdio = StdioService::new(
            self.bridge.clone(),
            shutdown.child_token(),
            config.stream_buffer_size,
        );

        let stopping = stopping(
            signal,
            shutdown.clone(),
            Arc::clone(&state),
            health.clone(),
            Arc::clone(&pool),
        );

        let transport = Server::builder()
            .http2_adaptive_window(Some(true))
            .add_service(HealthServer::new(HealthService::new(health)))
            .add_service(reflection)
            .add_service(build_producer_service(ProducerService::new(pool)))
            .add_service(GrpcControllerServer::new(controller))
            .add_service(GrpcStdioServer::new(stdio))
            .serve_with_incoming_shutdown(incoming, stopping);

        tokio::pin!(transport);

        // The accept loop gets polled first; the handshake follows on the
        // next turn.
        let announced = tokio::select! {
            biased;
            early = &mut transport => {
                state.send_replace(ServerState::Stopped);
                return match early {
                    Ok(()) => Err(anyhow!("transport stopped before the handshake was written")),
                    Err(e) => Err(anyhow::Error::new(e).context("gRPC transport failed")),
                };
            }
            announced = announce(handshake, out) => announced,
        };

        if let Err(e) = announced {
            shutdown.cancel();
            state.send_replace(ServerState::Stopped);
            return Err(e);
        }

        state.send_if_modified(|current| {
            let advance = *current == ServerState::Bound;
            if advance {
                *current = ServerState::Serving;
            }
            advance
        });

        let deadline = config.shutdown_timeout + TRANSPORT_GRACE;
        let finished = tokio::select! {
            finished = &mut transport => Some(finished),
            () = async {
                shutdown.cancelled().await;
                tokio::time::sleep(deadline).await;
            } => None,
        };

        shutdown.cancel();
        state.send_replace(ServerState::Stopped);

        match finished {
            Some(Ok(())) => {
                tracing::info!("Plugin server shut down successfully");
                Ok(())
            }
            Some(Err(e)) => Err(anyhow::Error::new(e).context("gRPC transport failed")),
            None => {
                tracing::warn!("Transport did not drain within {deadline:?}; dropped");
                Ok(())
            }
        }
    }
}

async fn announce<W: Write>(handshake: &Handshake, mut out: W) -> anyhow::Result<()> {
    tokio::task::yield_now().await;
    handshake
        .emit(&mut out)
        .context("failed to write the handshake line")?;
    tracing::debug!("Handshake written: {handshake}");
    Ok(())
}

/// Resolves once the server should stop, after moving it to
/// [`ServerState::Stopping`] and draining the worker pool. The transport then
/// stops accepting and waits for open calls.
async fn stopping<F>(
    signal: F,
    shutdown: CancellationToken,
    state: Arc<watch::Sender<ServerState>>,
    health: HealthReporter,
    pool: Arc<WorkerPool>,
) where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::select! {
        () = signal => tracing::info!("Shutdown signal received, terminating gracefully..."),
        () = shutdown.cancelled() => tracing::info!("Stop requested, terminating gracefully..."),
    }

    // 1. Publish the status
    state.send_replace(ServerState::Stopping);
    health.set_all(ServingStatus::NotServing);

    // 2. End the stdio stream and refuse new work
    shutdown.cancel();

    // 3. Give in-flight work its grace period
    if let Err(e) = pool.shutdown().await {
        tracing::error!("Error during worker pool shutdown: {e:?}");
    }
}

fn log_startup_info(addr: &str, config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting plugin server on {addr} with full config: {config:#?}");
    } else {
        tracing::info!(
            "Starting plugin server on {addr} with {} workers",
            config.num_workers
        );
    }
}

fn build_producer_service(service: ProducerService) -> ProducerServer<ProducerService> {
    ProducerServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

/// Fully qualified names of the plugin's own services, as reported by
/// health checks.
pub fn service_names() -> [&'static str; 3] {
    [
        ProducerServer::<ProducerService>::NAME,
        GrpcControllerServer::<ControllerService>::NAME,
        GrpcStdioServer::<StdioService>::NAME,
    ]
}
