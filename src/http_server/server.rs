//! # Control Server
//!
//! Owns the listener and the path table, and runs the accept loop.
//!
//! Lifecycle: `Idle` (bound at construction) → `Serving` → `Draining` →
//! `Stopped`. Paths can only be added while `Idle`. `serve` returns
//! [`ControlError::ServerClosed`] as soon as shutdown begins; `shutdown`
//! waits for in-flight connections until its deadline and aborts whatever is
//! left after that.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use axum::routing::{get, MethodRouter};
use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tower_http::set_header::SetResponseHeaderLayer;

use super::buffer::BufferPool;
use super::config::ControlServerConfig;
use super::envelope::no_cache_headers;
use super::errors::{ControlError, ControlResult, RequestError};
use super::log_level::{log_level_handler, LogLevelState, LOG_LEVEL_PATH};
use super::options::ServerOptions;
use crate::observability::{Logger, MetricsRegistry, EXPOSITION_CONTENT_TYPE};

pub const METRICS_PATH: &str = "/metrics";

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Lifecycle state of a [`ControlServer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Listener bound, not accepting yet
    Idle,
    Serving,
    /// Shutdown requested, waiting for in-flight connections
    Draining,
    Stopped,
}

struct Lifecycle {
    state: ServerState,
    /// Present until `serve` takes it
    listener: Option<std::net::TcpListener>,
    /// Live connections handed from the accept loop to `shutdown`
    connections: Option<JoinSet<()>>,
}

/// Embeddable control-plane HTTP server
pub struct ControlServer {
    local_addr: SocketAddr,
    routes: Mutex<BTreeMap<String, MethodRouter>>,
    lifecycle: Mutex<Lifecycle>,
    /// Flipped once to ask the accept loop and every connection to wind down
    shutdown_tx: watch::Sender<bool>,
    /// Flipped once the accept loop has stopped and handed off its connections
    handoff_tx: watch::Sender<bool>,
    metrics: Arc<MetricsRegistry>,
}

impl ControlServer {
    /// Bind `addr` and register the fixed paths.
    ///
    /// An empty `addr` binds every interface on the default port.
    pub fn new(addr: &str, options: ServerOptions) -> ControlResult<Self> {
        Self::with_config(&ControlServerConfig::from_addr(addr)?, options)
    }

    pub fn with_config(config: &ControlServerConfig, options: ServerOptions) -> ControlResult<Self> {
        let addr = config.socket_addr();
        let listener = std::net::TcpListener::bind(addr.as_str())
            .map_err(|source| ControlError::Bind {
                addr: addr.clone(),
                source,
            })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let ServerOptions {
            level_getter,
            level_setter,
            metrics: metrics_override,
            profiling,
        } = options;

        let metrics = Arc::new(MetricsRegistry::new());
        let pool = Arc::new(BufferPool::new());

        let mut routes = BTreeMap::new();
        routes.insert(
            LOG_LEVEL_PATH.to_string(),
            log_level_handler(LogLevelState::new(
                level_getter,
                level_setter,
                pool,
                Arc::clone(&metrics),
            )),
        );
        routes.insert(
            METRICS_PATH.to_string(),
            metrics_override.unwrap_or_else(|| metrics_handler(Arc::clone(&metrics))),
        );
        for (path, handler) in profiling.unwrap_or_default().into_routes() {
            routes.insert(path.to_string(), handler);
        }

        let (shutdown_tx, _) = watch::channel(false);
        let (handoff_tx, _) = watch::channel(false);

        Logger::info("CONTROL_SERVER_BOUND", &[("addr", &local_addr.to_string())]);

        Ok(Self {
            local_addr,
            routes: Mutex::new(routes),
            lifecycle: Mutex::new(Lifecycle {
                state: ServerState::Idle,
                listener: Some(listener),
                connections: None,
            }),
            shutdown_tx,
            handoff_tx,
            metrics,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ServerState {
        self.lifecycle.lock().state
    }

    /// Counters fed by the built-in handlers
    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.metrics)
    }

    /// Register an extra path. Only allowed before serving starts; an
    /// existing path is never replaced.
    pub fn add_handler(&self, path: &str, handler: MethodRouter) -> ControlResult<()> {
        validate_path(path)?;

        let lifecycle = self.lifecycle.lock();
        match lifecycle.state {
            ServerState::Idle => {}
            ServerState::Serving => return Err(ControlError::AlreadyServing),
            ServerState::Draining | ServerState::Stopped => return Err(ControlError::ServerClosed),
        }

        match self.routes.lock().entry(path.to_string()) {
            Entry::Occupied(_) => Err(ControlError::DuplicatePath(path.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(handler);
                Ok(())
            }
        }
    }

    /// Router over the currently registered paths
    pub fn router(&self) -> Router {
        let mut router = Router::new();
        for (path, handler) in self.routes.lock().iter() {
            router = router.route(path, handler.clone());
        }

        let metrics = Arc::clone(&self.metrics);
        router = router.fallback(move || {
            let metrics = Arc::clone(&metrics);
            async move {
                metrics.increment_unknown_paths();
                RequestError::NotFound
            }
        });

        for (name, value) in no_cache_headers() {
            router = router.layer(SetResponseHeaderLayer::if_not_present(name, value));
        }
        router
    }

    /// Accept and dispatch connections until shutdown is requested.
    ///
    /// Returns `Err(ControlError::ServerClosed)` once shutdown begins; any
    /// other error is a genuine fault.
    pub async fn serve(&self) -> ControlResult<()> {
        let std_listener = {
            let mut lifecycle = self.lifecycle.lock();
            match lifecycle.state {
                ServerState::Idle => {}
                ServerState::Serving => return Err(ControlError::AlreadyServing),
                ServerState::Draining | ServerState::Stopped => {
                    return Err(ControlError::ServerClosed)
                }
            }
            let listener = lifecycle.listener.take().ok_or(ControlError::ServerClosed)?;
            lifecycle.state = ServerState::Serving;
            listener
        };
        // From here on every exit, including cancellation, hands off to shutdown
        let mut handoff = Handoff {
            server: self,
            connections: JoinSet::new(),
        };

        let listener = TcpListener::from_std(std_listener)?;
        let router = self.router();
        let addr = self.local_addr.to_string();
        Logger::info("CONTROL_SERVER_SERVING", &[("addr", &addr)]);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = closing(&mut shutdown_rx) => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        Logger::debug("CONTROL_CONNECTION_ACCEPTED", &[("remote", &remote.to_string())]);
                        handoff.connections.spawn(serve_connection(
                            stream,
                            remote,
                            router.clone(),
                            self.shutdown_tx.subscribe(),
                        ));
                    }
                    Err(err) => {
                        Logger::warn("CONTROL_ACCEPT_FAILED", &[("error", &err.to_string())]);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(_) = handoff.connections.join_next(), if !handoff.connections.is_empty() => {}
            }
        }

        // New connections are refused from here on
        drop(listener);
        drop(handoff);

        Logger::info("CONTROL_SERVER_CLOSED", &[("addr", &addr)]);
        Err(ControlError::ServerClosed)
    }

    /// Stop accepting and wait up to `timeout` for in-flight requests.
    ///
    /// Connections still open at the deadline are aborted and
    /// `ControlError::DeadlineExceeded` is returned. Calling this on a server
    /// that never served just releases the listener. Later calls are no-ops.
    pub async fn shutdown(&self, timeout: Duration) -> ControlResult<()> {
        let deadline = Instant::now() + timeout;
        {
            let mut lifecycle = self.lifecycle.lock();
            let state = lifecycle.state;
            match state {
                ServerState::Idle => {
                    lifecycle.listener = None;
                    lifecycle.state = ServerState::Stopped;
                    self.shutdown_tx.send_replace(true);
                    return Ok(());
                }
                ServerState::Serving => lifecycle.state = ServerState::Draining,
                ServerState::Draining | ServerState::Stopped => return Ok(()),
            }
        }
        self.shutdown_tx.send_replace(true);

        let drain = async {
            let mut handoff_rx = self.handoff_tx.subscribe();
            let _ = handoff_rx.wait_for(|handed_off| *handed_off).await;

            let connections = self.lifecycle.lock().connections.take();
            if let Some(mut connections) = connections {
                while connections.join_next().await.is_some() {}
            }
        };
        let result = tokio::time::timeout_at(deadline, drain)
            .await
            .map_err(|_| ControlError::DeadlineExceeded(timeout));

        let leftover = {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.state = ServerState::Stopped;
            lifecycle.connections.take()
        };
        drop(leftover);

        result
    }
}

/// Passes the accept loop's live connections to `shutdown` when `serve`
/// exits, whether it returned or was dropped.
struct Handoff<'a> {
    server: &'a ControlServer,
    connections: JoinSet<()>,
}

impl Drop for Handoff<'_> {
    fn drop(&mut self) {
        let connections = std::mem::take(&mut self.connections);
        let leftover = {
            let mut lifecycle = self.server.lifecycle.lock();
            if lifecycle.state == ServerState::Draining {
                lifecycle.connections = Some(connections);
                None
            } else {
                // Shutdown already gave up waiting, or serve was cancelled
                // without one; either way nobody drains these
                lifecycle.state = ServerState::Stopped;
                Some(connections)
            }
        };
        // Dropping the set aborts its tasks
        drop(leftover);
        self.server.handoff_tx.send_replace(true);
    }
}

/// Resolves once shutdown has been requested
async fn closing(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|closing| *closing).await;
}

/// Default handler for [`METRICS_PATH`]
pub fn metrics_handler(registry: Arc<MetricsRegistry>) -> MethodRouter {
    get(move || {
        let registry = Arc::clone(&registry);
        async move { ([(CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], registry.to_prometheus()) }
    })
}

async fn serve_connection(
    stream: TcpStream,
    remote: SocketAddr,
    router: Router,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let io = TokioIo::new(stream);
    let service = TowerToHyperService::new(router);
    let conn = http1::Builder::new().serve_connection(io, service);
    let mut conn = std::pin::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = closing(&mut shutdown_rx) => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    // Response bytes that could not be delivered are only logged; the status
    // line may already be on the wire.
    if let Err(err) = result {
        if !err.is_incomplete_message() {
            Logger::warn(
                "CONTROL_CONNECTION_FAILED",
                &[("error", &err.to_string()), ("remote", &remote.to_string())],
            );
        }
    }
}

fn validate_path(path: &str) -> ControlResult<()> {
    // Paths are literal; capture and wildcard markers are never accepted
    if !path.starts_with('/') || path.contains([':', '*']) {
        return Err(ControlError::InvalidPath(path.to_string()));
    }
    Ok(())
}
