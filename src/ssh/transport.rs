//! Thin wrapper over the russh client: authenticated connect, interactive
//! PTY channel, and one-shot command execution.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, AuthResult};
use russh::keys::{decode_secret_key, PrivateKeyWithHashAlg};
use russh::{ChannelMsg, Disconnect};
use thiserror::Error;
use tracing::debug;

use super::stream::{ChunkSink, ChunkSource, StreamError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TERM: &str = "xterm-256color";

/// Read side of the interactive channel.
pub(crate) type InteractiveRead = russh::ChannelReadHalf;
/// Write side of the interactive channel; resize requests go through it
/// too.
pub(crate) type InteractiveWrite = russh::ChannelWriteHalf<client::Msg>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid connection parameters: {0}")]
    InvalidParams(&'static str),
    #[error("connection timed out")]
    Timeout,
    #[error("authentication failed for user {0}")]
    AuthDenied(String),
    #[error("private key could not be parsed: {0}")]
    BadKey(#[source] russh::keys::Error),
    #[error("session is not connected")]
    NotConnected,
    #[error(transparent)]
    Ssh(#[from] russh::Error),
}

/// Secret material for one connection attempt, chosen by the profile's
/// auth method. Key material is PEM/OpenSSH-encoded.
pub enum Credential {
    Password(String),
    Key(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password(_) => write!(f, "Credential::Password([REDACTED])"),
            Credential::Key(_) => write!(f, "Credential::Key([REDACTED])"),
        }
    }
}

/// Host keys are accepted without verification; the mobile client does
/// not carry a known_hosts store.
struct AcceptingHandler;

impl client::Handler for AcceptingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// One authenticated SSH connection.
pub(crate) struct TransportHandle {
    handle: client::Handle<AcceptingHandler>,
}

/// Connects and authenticates. Validates parameters before any I/O so
/// bad input never opens a socket.
pub(crate) async fn open(
    hostname: &str,
    port: u16,
    username: &str,
    credential: &Credential,
) -> Result<TransportHandle, TransportError> {
    if hostname.is_empty() {
        return Err(TransportError::InvalidParams("hostname is empty"));
    }
    if username.is_empty() {
        return Err(TransportError::InvalidParams("username is empty"));
    }
    if port == 0 {
        return Err(TransportError::InvalidParams("port is zero"));
    }

    let config = Arc::new(client::Config::default());
    let mut handle = tokio::time::timeout(
        CONNECT_TIMEOUT,
        client::connect(config, (hostname, port), AcceptingHandler),
    )
    .await
    .map_err(|_| TransportError::Timeout)??;

    let auth = match credential {
        Credential::Password(password) => {
            handle
                .authenticate_password(username, password.as_str())
                .await?
        }
        Credential::Key(pem) => {
            let key = decode_secret_key(pem, None).map_err(TransportError::BadKey)?;
            let hash = handle.best_supported_rsa_hash().await?.flatten();
            handle
                .authenticate_publickey(username, PrivateKeyWithHashAlg::new(Arc::new(key), hash))
                .await?
        }
    };
    match auth {
        AuthResult::Success => {}
        AuthResult::Failure { .. } => {
            return Err(TransportError::AuthDenied(username.to_string()));
        }
    }

    debug!(%hostname, port, %username, "ssh transport established");
    Ok(TransportHandle { handle })
}

impl TransportHandle {
    /// Opens the interactive shell channel with the given geometry.
    pub(crate) async fn open_interactive(
        &self,
        columns: u16,
        rows: u16,
    ) -> Result<(InteractiveRead, InteractiveWrite), TransportError> {
        let mut channel = self.handle.channel_open_session().await?;
        channel
            .request_pty(false, TERM, columns as u32, rows as u32, 0, 0, &[])
            .await?;
        channel.request_shell(false).await?;
        Ok(channel.split())
    }

    /// Runs a non-interactive command on a fresh session channel and
    /// collects its stdout. A nonzero exit status is not an error here;
    /// callers that care inspect the output.
    pub(crate) async fn exec(&self, command: &str) -> Result<Vec<u8>, TransportError> {
        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut output = Vec::new();
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => output.extend_from_slice(data),
                ChannelMsg::Eof | ChannelMsg::Close => break,
                _ => {}
            }
        }
        Ok(output)
    }

    /// Best-effort disconnect notification to the server.
    pub(crate) async fn close(&self) {
        let _ = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;
    }
}

impl ChunkSource for InteractiveRead {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        loop {
            match self.wait().await {
                Some(ChannelMsg::Data { data }) => return Ok(Some(data.to_vec())),
                // On a PTY the remote merges stderr into the stream, but
                // tolerate extended data from odd servers anyway.
                Some(ChannelMsg::ExtendedData { data, .. }) => return Ok(Some(data.to_vec())),
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => return Ok(None),
                Some(_) => continue,
            }
        }
    }
}

impl ChunkSink for InteractiveWrite {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StreamError> {
        self.data(chunk)
            .await
            .map_err(|err| StreamError::Write(err.to_string()))
    }

    async fn resize_window(&mut self, columns: u16, rows: u16) {
        // Advisory only; the remote shell may ignore it.
        let _ = self
            .window_change(columns as u32, rows as u32, 0, 0)
            .await;
    }
}
