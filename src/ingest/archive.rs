use std::path::{Path, PathBuf};

use crate::errors::AppError;
use crate::ingest::processor::IngestContext;
use crate::ingest::quarantine::move_to_error;
use crate::ingest::scanner;

/// Archives above this size are extracted on a background task.
const INLINE_SIZE_LIMIT: u64 = 2 * 1024 * 1024;

fn status_json(status: &str, message: &str) -> serde_json::Value {
    serde_json::json!({"status": status, "message": message})
}

/// Blocking extraction into a fresh prefixed subdirectory of the upload
/// root, where the watcher machinery will pick the contents up.
fn extract_into_upload_dir(
    config: &crate::config::AppConfig,
    archive_path: &Path,
) -> Result<PathBuf, AppError> {
    let ext = archive_path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let outdir = config
        .uploaddir
        .join(format!("{}unzip_{}", config.tmpprefix, uuid::Uuid::new_v4().simple()));
    std::fs::create_dir_all(&outdir)?;

    match ext.as_str() {
        "zip" => {
            let file = std::fs::File::open(archive_path)?;
            let mut archive = zip::ZipArchive::new(file)?;
            archive.extract(&outdir)?;
            Ok(outdir)
        }
        other => {
            let _ = std::fs::remove_dir(&outdir);
            Err(AppError::InvalidInput(format!("no in-process extractor for .{other}")))
        }
    }
}

async fn extract_and_enqueue(ctx: IngestContext, path: PathBuf, cleanup: bool) -> bool {
    let config = ctx.config.clone();
    let blocking_path = path.clone();
    let extracted = tokio::task::spawn_blocking(move || {
        extract_into_upload_dir(&config, &blocking_path)
    })
    .await;

    match extracted {
        Ok(Ok(outdir)) => {
            if cleanup {
                let _ = std::fs::remove_file(&path);
            }
            scanner::scan(&outdir, &ctx.queue).await;
            true
        }
        Ok(Err(e)) => {
            tracing::error!("Extraction failed for {}: {}", path.display(), e);
            let _ = move_to_error(&ctx.config, &path, "archivefile");
            false
        }
        Err(e) => {
            tracing::error!("Extraction task died for {}: {}", path.display(), e);
            let _ = move_to_error(&ctx.config, &path, "archivefile");
            false
        }
    }
}

/// Handle one uploaded archive. Small archives extract inline; big ones are
/// handed to a background task so the caller is not held up.
pub async fn process_archive(
    ctx: &IngestContext,
    path: PathBuf,
    cleanup: bool,
) -> serde_json::Value {
    let Ok(metadata) = std::fs::metadata(&path) else {
        return status_json("error", "file not found");
    };

    if metadata.len() > INLINE_SIZE_LIMIT {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            extract_and_enqueue(ctx, path, cleanup).await;
        });
        return status_json("success", "big compressed file was queued for processing");
    }

    if extract_and_enqueue(ctx.clone(), path, cleanup).await {
        status_json("success", "small compressed file was queued for processing")
    } else {
        status_json("error", "failed to extract a compressed file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::queue::IngestQueue;
    use std::io::Write;
    use std::sync::Arc;

    async fn test_ctx(dir: &Path) -> (IngestContext, tokio::sync::mpsc::Receiver<PathBuf>) {
        let mut cfg = crate::config::AppConfig::from_env();
        cfg.uploaddir = dir.join("upload");
        cfg.errordir = dir.join("error");
        cfg.tmpprefix = "tmp_".into();
        let (queue, rx) = IngestQueue::bounded(16);
        (
            IngestContext {
                config: Arc::new(cfg),
                pool: crate::db::test_pool().await,
                store: None,
                queue,
            },
            rx,
        )
    }

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[tokio::test]
    async fn small_zip_extracts_and_enqueues_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, mut rx) = test_ctx(dir.path()).await;

        let zip_path = dir.path().join("batch.zip");
        write_zip(&zip_path, &[("a.mgx", b"recA"), ("sub/b.mgx", b"recB")]);

        let result = process_archive(&ctx, zip_path.clone(), true).await;
        assert_eq!(result["status"], "success");
        assert!(!zip_path.exists());

        let mut queued = Vec::new();
        for _ in 0..2 {
            queued.push(rx.recv().await.unwrap());
        }
        let mut names: Vec<String> = queued
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, ["a.mgx", "b.mgx"]);
        // All extracted files live under the upload root.
        assert!(queued.iter().all(|p| p.starts_with(&ctx.config.uploaddir)));
    }

    #[tokio::test]
    async fn cleanup_false_preserves_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, mut rx) = test_ctx(dir.path()).await;

        let zip_path = dir.path().join("keepme.zip");
        write_zip(&zip_path, &[("a.mgx", b"recA")]);

        let result = process_archive(&ctx, zip_path.clone(), false).await;
        assert_eq!(result["status"], "success");
        assert!(zip_path.exists());
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn corrupt_zip_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _rx) = test_ctx(dir.path()).await;

        let zip_path = dir.path().join("corrupt.zip");
        std::fs::write(&zip_path, b"PK\x03\x04 this is no zip").unwrap();

        let result = process_archive(&ctx, zip_path.clone(), true).await;
        assert_eq!(result["status"], "error");
        assert!(!zip_path.exists());
        assert!(ctx.config.errordir.join("archivefile").join("corrupt.zip").exists());
    }

    #[tokio::test]
    async fn rar_has_no_extractor_and_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _rx) = test_ctx(dir.path()).await;

        let rar_path = dir.path().join("old.rar");
        std::fs::write(&rar_path, b"Rar!\x1a\x07\x00junk").unwrap();

        let result = process_archive(&ctx, rar_path.clone(), true).await;
        assert_eq!(result["status"], "error");
        assert!(ctx.config.errordir.join("archivefile").join("old.rar").exists());
    }
}
