use std::{fs, path::Path};

use anyhow::{Context, Result};
use shared::domain::ClientId;
use uuid::Uuid;

/// Loads the visitor's persisted opaque id, creating one on first use.
/// The id is generated once per storage profile and reused so the same
/// visitor's history survives restarts.
pub fn load_or_create_client_id(path: &Path) -> Result<ClientId> {
    if let Ok(raw) = fs::read_to_string(path) {
        let stored = raw.trim();
        if !stored.is_empty() {
            return Ok(ClientId::new(stored));
        }
    }

    let id = Uuid::new_v4().to_string();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create identity directory '{}'", parent.display())
            })?;
        }
    }
    fs::write(path, &id)
        .with_context(|| format!("failed to persist client id to '{}'", path.display()))?;
    Ok(ClientId::new(id))
}
