use std::time::Duration;

use anyhow::Context;
use futures_util::FutureExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::ConnectionManager;
use crate::configuration::Endpoint;

/// A command sent over a raw TCP connection.
///
/// The pool does not interpret the payload: it only needs to know whether sending it twice
/// is harmless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpCommand {
    pub payload: Vec<u8>,
    /// Whether the command can be sent again on a new connection if the first attempt
    /// failed mid-flight.
    pub replayable: bool,
}

impl TcpCommand {
    /// A command that is safe to send more than once.
    pub fn replayable(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            replayable: true,
        }
    }

    /// A command with side effects that must not be duplicated.
    pub fn once(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            replayable: false,
        }
    }
}

#[derive(Clone, Debug)]
/// Opens plain TCP connections to an [`Endpoint`].
pub struct TcpConnectionManager {
    /// The timeout observed when trying to connect.
    connect_timeout: Duration,
    nodelay: bool,
}

impl Default for TcpConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpConnectionManager {
    /// Connections time out after 10 seconds and have Nagle's algorithm disabled.
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            nodelay: true,
        }
    }

    /// How long to wait for the TCP handshake before giving up.
    #[must_use]
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Toggle `TCP_NODELAY` on new connections.
    #[must_use]
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

#[async_trait::async_trait]
impl ConnectionManager for TcpConnectionManager {
    type Connection = TcpStream;
    type Command = TcpCommand;
    type Response = Vec<u8>;

    #[tracing::instrument(name = "tcp_connect", skip(self, endpoint), fields(endpoint = %endpoint))]
    async fn create(&self, endpoint: &Endpoint) -> Result<TcpStream, anyhow::Error> {
        let stream = timeout(
            self.connect_timeout,
            TcpStream::connect((endpoint.host(), endpoint.port())),
        )
        .await
        .with_context(|| {
            format!(
                "Timed out after {:?} connecting to {endpoint}",
                self.connect_timeout
            )
        })?
        .with_context(|| format!("Failed to connect to {endpoint}"))?;
        stream.set_nodelay(self.nodelay)?;
        Ok(stream)
    }

    async fn validate(&self, stream: &mut TcpStream) -> bool {
        // An idle connection has nothing to read: EOF means the peer hung up, unsolicited
        // bytes mean the stream is out of sync with the commands we sent.
        let mut peeked = [0u8; 1];
        match stream.peek(&mut peeked).now_or_never() {
            None => true,
            Some(Ok(0)) => {
                debug!("Peer closed the connection");
                false
            }
            Some(Ok(_)) => {
                debug!("Unsolicited data on an idle connection");
                false
            }
            Some(Err(e)) => {
                debug!(error = %e, "Idle connection is broken");
                false
            }
        }
    }

    fn is_replayable(&self, command: &TcpCommand) -> bool {
        command.replayable
    }
}
