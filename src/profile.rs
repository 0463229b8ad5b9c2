use serde::{Deserialize, Serialize};

/// How a profile authenticates against its host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Password,
    Key,
}

/// Connection parameters for one saved host, as handed over by the
/// profile store. Persistence of these records is not this crate's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProfile {
    /// Opaque unique id, also the key for secrets and live sessions
    pub profile_id: String,
    /// Display name
    pub name: String,
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub auth_method: AuthMethod,
    /// Name of the tmux session last attached from this profile, if any
    pub last_tmux_session: Option<String>,
}

impl ConnectionProfile {
    pub fn new(
        profile_id: impl Into<String>,
        name: impl Into<String>,
        hostname: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        auth_method: AuthMethod,
    ) -> Self {
        Self {
            profile_id: profile_id.into(),
            name: name.into(),
            hostname: hostname.into(),
            port,
            username: username.into(),
            auth_method,
            last_tmux_session: None,
        }
    }
}
