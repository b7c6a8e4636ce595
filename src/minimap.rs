use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::config::AppConfig;
use crate::storage::{ObjectStore, object_key};

/// Outcome of a minimap save attempt. Missing configuration is a no-op, not
/// an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapSaveStatus {
    Saved,
    NotSet,
    Error,
}

fn decode_png(base64src: &str) -> Option<Vec<u8>> {
    match BASE64.decode(base64src.trim()) {
        Ok(bytes) if !bytes.is_empty() => Some(bytes),
        Ok(_) => None,
        Err(e) => {
            tracing::error!("Minimap base64 decode failed: {}", e);
            None
        }
    }
}

/// Write the minimap PNG under the configured local map directory as
/// `{basename}.png`.
pub async fn save_local(config: &AppConfig, basename: &str, base64src: &str) -> MapSaveStatus {
    if config.mapdest != "local" {
        return MapSaveStatus::NotSet;
    }
    let Some(mapdir) = config.mapdir.clone() else {
        return MapSaveStatus::NotSet;
    };
    let Some(bytes) = decode_png(base64src) else {
        return MapSaveStatus::Error;
    };

    let target = mapdir.join(format!("{basename}.png"));
    match write_file(&mapdir, &target, &bytes).await {
        Ok(()) => MapSaveStatus::Saved,
        Err(e) => {
            tracing::error!("Minimap save failed for {}: {}", basename, e);
            MapSaveStatus::Error
        }
    }
}

async fn write_file(dir: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(target, bytes).await
}

/// Upload the minimap PNG to the object store under `{mapdirS3}/{basename}.png`.
pub async fn save_object_store(
    store: Option<&ObjectStore>,
    config: &AppConfig,
    basename: &str,
    base64src: &str,
) -> MapSaveStatus {
    let Some(prefix) = config.mapdir_s3.as_deref() else {
        return MapSaveStatus::NotSet;
    };
    let Some(store) = store else {
        tracing::error!("Minimap upload skipped, object store unavailable");
        return MapSaveStatus::Error;
    };
    let Some(bytes) = decode_png(base64src) else {
        return MapSaveStatus::Error;
    };

    let key = object_key(prefix, &format!("{basename}.png"));
    match store.put(&key, &bytes, &[], Some("image/png")).await {
        Ok(()) => {
            tracing::debug!("Minimap uploaded: {}", key);
            MapSaveStatus::Saved
        }
        Err(e) => {
            tracing::error!("Minimap upload failed for {}: {}", basename, e);
            MapSaveStatus::Error
        }
    }
}
