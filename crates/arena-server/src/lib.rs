//! Multi-room websocket game relay server.
//!
//! Clients connect over TCP, upgrade from HTTP to websocket, join a room by
//! name, and exchange JSON state updates that the server fans out to every
//! co-member of the room. The server is the authoritative broadcast point:
//! it relays state, it does not simulate it.
//!
//! # Architecture
//!
//! - `transport`: plain-HTTP front door and websocket upgrade
//! - `session`: per-connection read task plus a writer task (the
//!   per-session strand) draining the outbound queue
//! - [`Registry`]: process-wide session/room index with empty-room
//!   collection
//! - [`Room`]: two-team membership, snapshots, fan-out
//! - `dispatcher`: phase-selected frame handlers
//! - [`Server`]: production runtime tying the accept loop, sessions and
//!   signal-driven shutdown together

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
mod dispatcher;
mod error;
mod listener;
mod registry;
mod room;
mod session;
mod sync;
mod transport;

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tokio::net::TcpStream;
use tokio::signal::unix::{signal, SignalKind};

pub use config::Config;
pub use dispatcher::Handler;
pub use error::ServerError;
pub use listener::Listener;
pub use registry::Registry;
pub use room::{Room, Team, TeamHint, MAX_PLAYERS_PER_TEAM};
pub use session::{SessionHandle, SessionId};

/// Production relay server.
///
/// [`bind`](Self::bind) opens the listening socket; [`run`](Self::run)
/// accepts connections until SIGINT or SIGTERM arrives.
pub struct Server {
    listener: Listener,
    registry: Arc<Registry>,
    next_session_id: AtomicU64,
}

impl Server {
    /// Bind the configured endpoint and prepare the registry.
    ///
    /// Configuration and bind failures abort startup before any connection
    /// is served.
    pub fn bind(config: &Config) -> Result<Self, ServerError> {
        let listener = Listener::bind(&config.listener)?;
        Ok(Self {
            listener,
            registry: Arc::new(Registry::new()),
            next_session_id: AtomicU64::new(0),
        })
    }

    /// Local address the server listens on.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle to the session/room registry.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Accept and serve connections until a termination signal arrives.
    ///
    /// On SIGINT/SIGTERM the registry is switched into shutdown mode (so
    /// per-session unregistration short-circuits while the runtime tears the
    /// connection tasks down) and `run` returns for a clean exit.
    pub async fn run(self) -> Result<(), ServerError> {
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
                        let registry = Arc::clone(&self.registry);
                        tokio::spawn(async move {
                            if let Err(error) = handle_connection(stream, peer, session_id, &registry).await {
                                tracing::debug!(session = session_id, %error, "connection ended with error");
                            }
                        });
                    }
                    Err(error) => {
                        tracing::error!(%error, "accept failed");
                    }
                },
                _ = sigint.recv() => {
                    tracing::warn!("received SIGINT, shutting down");
                    break;
                }
                _ = sigterm.recv() => {
                    tracing::warn!("received SIGTERM, shutting down");
                    break;
                }
            }
        }

        self.registry.shutdown();
        tracing::info!(
            accepted = self.listener.accepted_count(),
            "relay stopped"
        );
        Ok(())
    }
}

/// Serve one accepted TCP connection.
///
/// The connection starts in the HTTP phase; when the peer upgrades, the
/// websocket session takes over until close or error.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    session_id: SessionId,
    registry: &Registry,
) -> Result<(), ServerError> {
    match transport::serve(stream, &peer).await? {
        Some(websocket) => {
            let handle = SessionHandle::new(session_id, &peer.to_string());
            session::run(websocket, handle, registry).await;
            Ok(())
        }
        None => Ok(()),
    }
}
