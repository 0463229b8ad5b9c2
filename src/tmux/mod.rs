mod copy_mode;
mod directory;

pub use copy_mode::{CopyModeState, ScrollTranslator, DEFAULT_LINE_HEIGHT};
pub use directory::{attach_command, parse_listing, DirectoryError, TmuxDirectory, LIST_COMMAND};

use serde::{Deserialize, Serialize};

/// Snapshot of one tmux session on the remote host, as reported by a
/// single listing call. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmuxSessionRecord {
    /// Remote-assigned session name; the attach key
    pub name: String,
    pub window_count: u32,
    pub is_attached: bool,
    /// Last activity, seconds since epoch; 0 when unknown
    pub last_activity: i64,
    /// Human-readable creation time, empty when unknown
    pub created: String,
}
