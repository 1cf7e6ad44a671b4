/// `load_config` module: loads the JSON config file and injects the session token from the
/// environment when one is set.
///
/// # Responsibilities
/// - Parse the user-supplied JSON file into [`SyncConfig`]
/// - Let `NOTION_TOKEN_V2` (environment or `.env`) override or supply `token_v2`, so the
///   secret does not have to live next to the rest of the config
/// - Reject configs with empty required fields before anything talks to Notion
///
/// # Errors
/// All errors use `anyhow::Error` with the config path in context, and surface at the CLI boundary.
use anyhow::{bail, Context, Result};
use notion_sync_core::config::SyncConfig;
use std::fs;
use std::path::Path;
use tracing::{error, info};

pub const TOKEN_ENV_VAR: &str = "NOTION_TOKEN_V2";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SyncConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    let mut config: SyncConfig = serde_json::from_str(&config_content)
        .map_err(|e| {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config JSON");
            e
        })
        .with_context(|| format!("Failed to parse config JSON {:?}", path_ref))?;
    info!(config_path = ?path_ref, "Parsed config JSON successfully");

    if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
        if !token.trim().is_empty() {
            info!(env_var = TOKEN_ENV_VAR, "Using session token from environment");
            config.token_v2 = token;
        }
    }

    validate(&config).with_context(|| format!("Invalid config {:?}", path_ref))?;
    config.trace_loaded();
    Ok(config)
}

fn validate(config: &SyncConfig) -> Result<()> {
    if config.token_v2.trim().is_empty() {
        bail!("token_v2 is missing: set it in the config file or via {TOKEN_ENV_VAR}");
    }
    if config.sync_root.trim().is_empty() {
        bail!("sync_root must name a collection view");
    }
    if config.destination.as_os_str().is_empty() {
        bail!("destination must be a directory path");
    }
    Ok(())
}
