//! Core engine of a mobile SSH terminal client: per-profile session
//! lifecycle, duplex PTY streaming, tmux session discovery/attach, and
//! scroll-to-copy-mode translation. Rendering, profile persistence, and
//! credential storage live outside this crate.

pub mod manager;
pub mod profile;
pub mod secrets;
pub mod ssh;
pub mod tmux;

pub use manager::ConnectionManager;
pub use profile::{AuthMethod, ConnectionProfile};
pub use secrets::{MemorySecretStore, SecretKind, SecretStore};
pub use ssh::{Credential, Session, SessionState};
pub use tmux::{CopyModeState, DirectoryError, ScrollTranslator, TmuxDirectory, TmuxSessionRecord};
