//! Discovery of and attachment to tmux sessions on the remote host,
//! riding on an already-established SSH session.

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::debug;

use crate::profile::{AuthMethod, ConnectionProfile};
use crate::secrets::{SecretKind, SecretStore};
use crate::ssh::{Credential, Session, SessionState};

use super::TmuxSessionRecord;

/// Field separator for the listing format; two characters tmux session
/// names are not expected to contain.
pub const LIST_DELIMITER: &str = "@@";

/// Listing command, one line per session in a fixed field order. Errors
/// go to /dev/null and a nonzero exit is tolerated: no sessions (or no
/// tmux server) is not an error, it is an empty listing.
pub const LIST_COMMAND: &str = "bash -lc 'tmux ls -F \"#{session_name}@@#{session_windows}@@#{session_attached}@@#{session_activity}@@#{session_created}\"' 2>/dev/null || true";

#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Key auth is configured but no key is stored; surfaced before any
    /// connection attempt.
    #[error("no private key stored for this profile; add one or switch to password auth")]
    MissingKey,
    /// The bridge-initiated (re)connect failed; carries the session's
    /// error message verbatim.
    #[error("{0}")]
    Connect(String),
    #[error("listing command failed: {0}")]
    Exec(String),
}

/// Shell line that attaches to a named session, or creates it when the
/// attach fails. A typo'd name silently becomes a fresh session; the
/// recovery flow depends on that.
pub fn attach_command(session_name: &str) -> String {
    format!(
        "tmux a -t {name} 2>/dev/null || tmux new -s {name}\n",
        name = session_name
    )
}

/// Parses listing output into records, most recently active first.
/// Malformed lines are dropped, never an error.
pub fn parse_listing(output: &str) -> Vec<TmuxSessionRecord> {
    let mut records: Vec<TmuxSessionRecord> = output.lines().filter_map(parse_line).collect();
    // Stable sort keeps encounter order for equal timestamps.
    records.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
    records
}

fn parse_line(line: &str) -> Option<TmuxSessionRecord> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let fields: Vec<&str> = line.split(LIST_DELIMITER).collect();
    if fields.len() < 5 || fields[0].is_empty() {
        return None;
    }

    let created_epoch: i64 = fields[4].parse().unwrap_or(0);
    Some(TmuxSessionRecord {
        name: fields[0].to_string(),
        window_count: fields[1].parse().unwrap_or(1),
        is_attached: fields[2].parse::<i64>().map(|n| n != 0).unwrap_or(false),
        last_activity: fields[3].parse().unwrap_or(0),
        created: created_display(created_epoch),
    })
}

fn created_display(epoch: i64) -> String {
    if epoch <= 0 {
        return String::new();
    }
    DateTime::from_timestamp(epoch, 0)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

/// Lists and attaches to remote tmux sessions. If the owning session is
/// not connected, the bridge connects it first, resolving credentials
/// from the secret store per the profile's auth method.
pub struct TmuxDirectory<S> {
    secrets: S,
}

impl<S: SecretStore> TmuxDirectory<S> {
    pub fn new(secrets: S) -> Self {
        Self { secrets }
    }

    /// Queries the remote host for its tmux sessions. Empty or
    /// malformed output degrades to an empty listing.
    pub async fn list_sessions(
        &self,
        session: &Session,
        profile: &ConnectionProfile,
    ) -> Result<Vec<TmuxSessionRecord>, DirectoryError> {
        self.connect(session, profile).await?;
        let output = session
            .exec_command(LIST_COMMAND)
            .await
            .map_err(|err| DirectoryError::Exec(err.to_string()))?;
        let records = parse_listing(&String::from_utf8_lossy(&output));
        debug!(profile = %profile.profile_id, count = records.len(), "tmux listing");
        Ok(records)
    }

    /// Types the attach-or-create line into the interactive channel.
    /// No acknowledgment is parsed; the outcome shows up in the
    /// interactive output stream.
    pub async fn attach(
        &self,
        session: &Session,
        profile: &ConnectionProfile,
        session_name: &str,
    ) -> Result<(), DirectoryError> {
        self.connect(session, profile).await?;
        session.send_text(&attach_command(session_name));
        debug!(profile = %profile.profile_id, session_name, "tmux attach issued");
        Ok(())
    }

    /// Ensures the session is connected, resolving credentials through
    /// the secret store. A missing key is reported before any
    /// connection attempt.
    pub async fn connect(
        &self,
        session: &Session,
        profile: &ConnectionProfile,
    ) -> Result<(), DirectoryError> {
        if session.state() == SessionState::Connected {
            return Ok(());
        }
        let credential = self.resolve_credential(profile)?;
        session
            .connect(
                &profile.hostname,
                profile.port,
                &profile.username,
                credential,
            )
            .await;
        match session.state() {
            SessionState::Connected => Ok(()),
            SessionState::Error(message) => Err(DirectoryError::Connect(message)),
            other => Err(DirectoryError::Connect(format!(
                "connection ended up {}",
                other
            ))),
        }
    }

    fn resolve_credential(&self, profile: &ConnectionProfile) -> Result<Credential, DirectoryError> {
        match profile.auth_method {
            AuthMethod::Password => {
                // An absent password resolves to empty; the server then
                // rejects it and the failure surfaces as a connect error.
                let secret = self
                    .secrets
                    .load_secret(&profile.profile_id, SecretKind::Password)
                    .unwrap_or_default();
                Ok(Credential::Password(
                    String::from_utf8_lossy(&secret).into_owned(),
                ))
            }
            AuthMethod::Key => {
                let secret = self
                    .secrets
                    .load_secret(&profile.profile_id, SecretKind::PrivateKey)
                    .ok_or(DirectoryError::MissingKey)?;
                Ok(Credential::Key(String::from_utf8_lossy(&secret).into_owned()))
            }
        }
    }
}
