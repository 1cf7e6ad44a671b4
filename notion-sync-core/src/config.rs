use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::synchronise::DEFAULT_LINK_PREFIX;

/// Settings for one mirror: which collection view to read and where to write.
#[derive(Clone, Deserialize)]
pub struct SyncConfig {
    /// Notion session token. May be supplied through the environment instead.
    #[serde(default)]
    pub token_v2: String,
    /// Collection view page URL or id.
    pub sync_root: String,
    pub destination: PathBuf,
    #[serde(default = "default_link_prefix")]
    pub link_prefix: String,
}

fn default_link_prefix() -> String {
    DEFAULT_LINK_PREFIX.to_string()
}

// The token is a credential; keep it out of logs.
impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("token_v2", &"<redacted>")
            .field("sync_root", &self.sync_root)
            .field("destination", &self.destination)
            .field("link_prefix", &self.link_prefix)
            .finish()
    }
}

impl SyncConfig {
    pub fn trace_loaded(&self) {
        info!(
            destination = %self.destination.display(),
            sync_root = %self.sync_root,
            "Loaded Config"
        );
        debug!(?self, "Config loaded (full debug)");
    }
}
