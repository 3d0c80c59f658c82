//! TCP accept front-end.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{TcpListener, TcpSocket, TcpStream};

use crate::{config::ListenerConfig, error::ServerError};

/// Listening socket plus a monotonic count of accepted connections.
pub struct Listener {
    inner: TcpListener,
    accepted: AtomicU64,
}

impl Listener {
    /// Bind the configured endpoint.
    ///
    /// Any failure here (bad interface, address in use, access denied)
    /// aborts startup; nothing is retried.
    pub fn bind(config: &ListenerConfig) -> Result<Self, ServerError> {
        let ip: IpAddr = config.interface.parse().map_err(|_| {
            ServerError::Config(format!("invalid listener interface '{}'", config.interface))
        })?;
        let addr = SocketAddr::new(ip, config.port);

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(|e| ServerError::Bind(format!("cannot create socket: {e}")))?;

        socket
            .set_reuseaddr(true)
            .map_err(|e| ServerError::Bind(format!("cannot set SO_REUSEADDR: {e}")))?;
        socket
            .bind(addr)
            .map_err(|e| ServerError::Bind(format!("cannot bind {addr}: {e}")))?;

        let inner = socket
            .listen(config.max_queued_connections)
            .map_err(|e| ServerError::Bind(format!("cannot listen on {addr}: {e}")))?;

        Ok(Self { inner, accepted: AtomicU64::new(0) })
    }

    /// Wait for the next connection.
    pub async fn accept(&self) -> std::io::Result<(TcpStream, SocketAddr)> {
        let pair = self.inner.accept().await?;
        self.accepted.fetch_add(1, Ordering::Relaxed);
        Ok(pair)
    }

    /// Local address; useful when bound to port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Number of connections accepted so far.
    pub fn accepted_count(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListenerConfig;

    fn config(port: u16) -> ListenerConfig {
        ListenerConfig {
            interface: "127.0.0.1".to_owned(),
            port,
            max_queued_connections: 16,
        }
    }

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let listener = Listener::bind(&config(0)).unwrap();

        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(listener.accepted_count(), 0);
    }

    #[tokio::test]
    async fn rejects_invalid_interface() {
        let bad = ListenerConfig {
            interface: "not-an-ip".to_owned(),
            port: 0,
            max_queued_connections: 16,
        };

        assert!(matches!(Listener::bind(&bad), Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn second_bind_to_same_port_fails() {
        let first = Listener::bind(&config(0)).unwrap();
        let port = first.local_addr().unwrap().port();

        assert!(matches!(Listener::bind(&config(port)), Err(ServerError::Bind(_))));
    }

    #[tokio::test]
    async fn accept_counts_connections() {
        let listener = Listener::bind(&config(0)).unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move { TcpStream::connect(addr).await });
        let (_stream, _peer) = listener.accept().await.unwrap();
        client.await.unwrap().unwrap();

        assert_eq!(listener.accepted_count(), 1);
    }
}
