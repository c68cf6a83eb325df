//! TCP listener for the proxy endpoint.
//!
//! # Responsibilities
//! - Build the bind address from `[proxy_server]`
//! - Bind the main listener, reporting failures as fatal errors

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ProxyServerConfig;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The server stopped with an I/O error.
    #[error("server error: {0}")]
    Serve(#[source] io::Error),
}

/// `address:port`, with an empty address meaning all interfaces.
pub fn bind_address(listen_address: &str, port: u16) -> String {
    let host = if listen_address.is_empty() {
        "0.0.0.0"
    } else {
        listen_address
    };
    format!("{host}:{port}")
}

/// Bind the proxy listener.
pub async fn bind(config: &ProxyServerConfig) -> Result<TcpListener, ListenerError> {
    let address = bind_address(&config.listen_address, config.listen_port);
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| ListenerError::Bind {
            address: address.clone(),
            source,
        })?;

    let local_addr: SocketAddr = listener
        .local_addr()
        .map_err(|source| ListenerError::Bind { address, source })?;

    tracing::info!(address = %local_addr, "Listener bound");
    Ok(listener)
}
