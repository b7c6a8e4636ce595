use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::db::game::save_game;
use crate::ingest::archive::process_archive;
use crate::ingest::envelope::save_record_to_store;
use crate::ingest::quarantine::move_to_error;
use crate::ingest::queue::IngestQueue;
use crate::minimap;
use crate::models::normalize::clamp_game_time;
use crate::parser;
use crate::rating::RatingLock;
use crate::storage::ObjectStore;

pub static RECORD_EXTENSIONS: Lazy<Vec<&'static str>> =
    Lazy::new(|| vec!["mgx", "mgx2", "mgz", "mgl", "msx", "msx2", "aoe2record"]);
pub static ARCHIVE_EXTENSIONS: Lazy<Vec<&'static str>> = Lazy::new(|| vec!["zip", "rar", "7z"]);

/// How long a synchronous caller waits for the fanned-out I/O tasks.
const SYNC_IO_DEADLINE: Duration = Duration::from_secs(100);

/// Everything a worker needs to push one file through the pipeline.
#[derive(Clone)]
pub struct IngestContext {
    pub config: Arc<AppConfig>,
    pub pool: SqlitePool,
    pub store: Option<Arc<ObjectStore>>,
    pub queue: IngestQueue,
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessOptions {
    /// Wait for the I/O fan-out (bounded) instead of detaching it.
    pub syncproc: bool,
    /// Overwrite an already-stored record object.
    pub s3replace: bool,
    /// Remove the source file after successful handling.
    pub cleanup: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self { syncproc: true, s3replace: false, cleanup: true }
    }
}

fn status_json(status: &str, message: &str) -> serde_json::Value {
    serde_json::json!({"status": status, "message": message})
}

fn extension_of(path: &Path) -> String {
    path.extension().map(|e| e.to_string_lossy().to_lowercase()).unwrap_or_default()
}

fn file_mtime(path: &Path) -> Option<NaiveDateTime> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let dt: chrono::DateTime<chrono::Utc> = modified.into();
    Some(dt.naive_utc())
}

/// Dispatch one filesystem path: record files parse and fan out, archives
/// extract and re-enqueue, directories recurse, everything else is
/// quarantined as unsupported.
pub async fn process_path(
    ctx: &IngestContext,
    path: &Path,
    opts: ProcessOptions,
) -> serde_json::Value {
    if path.is_dir() {
        let entries: Vec<PathBuf> = match std::fs::read_dir(path) {
            Ok(rd) => rd.flatten().map(|e| e.path()).collect(),
            Err(e) => return status_json("error", &format!("unreadable directory: {e}")),
        };
        for entry in entries {
            Box::pin(process_path(ctx, &entry, opts)).await;
        }
        return status_json("success", "directory processed");
    }
    if !path.is_file() {
        return status_json("error", "file not found");
    }

    let ext = extension_of(path);
    if RECORD_EXTENSIONS.contains(&ext.as_str()) {
        tracing::debug!("Proc(record): {}", path.display());
        process_record(ctx, path, opts).await
    } else if ARCHIVE_EXTENSIONS.contains(&ext.as_str()) {
        tracing::debug!("Proc(archive): {}", path.display());
        process_archive(ctx, path.to_path_buf(), opts.cleanup).await
    } else {
        let _ = move_to_error(&ctx.config, path, "");
        status_json("invalid", "unsupported file type")
    }
}

async fn process_record(
    ctx: &IngestContext,
    path: &Path,
    opts: ProcessOptions,
) -> serde_json::Value {
    let outcome = parser::parse(&ctx.config, path, "-b").await;
    if outcome.record.is_unusable() {
        tracing::warn!("Invalid record: {}", path.display());
        let _ = move_to_error(&ctx.config, path, "");
        return outcome.raw;
    }

    let record = Arc::new(outcome.record);
    let file_time = file_mtime(path).map(clamp_game_time);
    let mut tasks = Vec::new();

    // Task: relational write; a successful write schedules a rating run.
    {
        let ctx = ctx.clone();
        let record = record.clone();
        let path = path.to_path_buf();
        tasks.push(tokio::spawn(async move {
            let (status, guid) = save_game(&ctx.pool, &record, file_time, "upload").await;
            if status.changed_data() {
                if let Err(e) = RatingLock::new(&ctx.config).start_calc(true) {
                    tracing::error!("Could not schedule rating run: {}", e);
                }
            } else if status == crate::db::game::AddGameStatus::Error && path.exists() {
                let _ = move_to_error(&ctx.config, &path, "db");
            }
            tracing::debug!("Game write finished: {} {}", status.as_str(), guid);
        }));
    }

    // Task: canonical binary into the object store.
    {
        let ctx = ctx.clone();
        let record = record.clone();
        let path = path.to_path_buf();
        tasks.push(tokio::spawn(async move {
            let status = save_record_to_store(
                &ctx.config,
                ctx.store.as_deref(),
                &path,
                &record,
                opts.s3replace,
                opts.cleanup,
            )
            .await;
            tracing::debug!("Record upload finished: {:?}", status);
        }));
    }

    // Tasks: minimap to disk and/or object store.
    if let Some(base64src) = record.map_base64() {
        let guid = record.guid.clone().unwrap_or_default();
        let base64src = base64src.to_string();
        {
            let ctx = ctx.clone();
            let guid = guid.clone();
            let base64src = base64src.clone();
            tasks.push(tokio::spawn(async move {
                let status = minimap::save_local(&ctx.config, &guid, &base64src).await;
                tracing::debug!("Minimap local save: {:?}", status);
            }));
        }
        {
            let ctx = ctx.clone();
            tasks.push(tokio::spawn(async move {
                let status =
                    minimap::save_object_store(ctx.store.as_deref(), &ctx.config, &guid, &base64src)
                        .await;
                tracing::debug!("Minimap upload: {:?}", status);
            }));
        }
    }

    if opts.syncproc {
        let joined = tokio::time::timeout(SYNC_IO_DEADLINE, futures::future::join_all(tasks)).await;
        if joined.is_err() {
            tracing::error!("I/O tasks for {} exceeded the deadline", path.display());
        }
    }
    // Detached tasks keep running on the runtime.

    outcome.raw
}

/// Persist a buffered upload into a per-request tmp subdirectory, coerce its
/// mtime to the claimed last-modified time, then process it like any path.
pub async fn process_upload(
    ctx: &IngestContext,
    bytes: &[u8],
    filename: &str,
    lastmod: &str,
    opts: ProcessOptions,
) -> serde_json::Value {
    // Only the basename; clients may send paths.
    let basename = Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "upload.bin".to_string());

    let subdir = ctx
        .config
        .tmpdir
        .join(format!("{}{}", ctx.config.tmpprefix, uuid::Uuid::new_v4().simple()));
    if let Err(e) = tokio::fs::create_dir_all(&subdir).await {
        return status_json("error", &format!("could not create tmp dir: {e}"));
    }
    let target = subdir.join(&basename);
    if let Err(e) = tokio::fs::write(&target, bytes).await {
        return status_json("error", &format!("could not save upload: {e}"));
    }

    let lastmod_time = NaiveDateTime::parse_from_str(lastmod, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(lastmod, "%Y-%m-%dT%H:%M:%S%.f"))
        .map(clamp_game_time)
        .unwrap_or_else(|_| chrono::Utc::now().naive_utc());
    set_file_times(&target, lastmod_time);
    tracing::debug!("Upload buffer saved: {}", target.display());

    let result = process_path(ctx, &target, opts).await;

    // The tmp subdir is per-request; drop it if the pipeline emptied it.
    let _ = std::fs::remove_dir(&subdir);
    result
}

/// Coerce atime/mtime so the parser sees the client's file timestamp.
fn set_file_times(path: &Path, t: NaiveDateTime) {
    use std::os::unix::ffi::OsStrExt;
    let Ok(cpath) = std::ffi::CString::new(path.as_os_str().as_bytes()) else {
        return;
    };
    let times = [
        libc::timeval { tv_sec: t.and_utc().timestamp(), tv_usec: 0 },
        libc::timeval { tv_sec: t.and_utc().timestamp(), tv_usec: 0 },
    ];
    let rc = unsafe { libc::utimes(cpath.as_ptr(), times.as_ptr()) };
    if rc != 0 {
        tracing::debug!("utimes failed for {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::queue::IngestQueue;

    async fn test_ctx(dir: &Path) -> IngestContext {
        let mut cfg = AppConfig::from_env();
        cfg.workdir = dir.to_path_buf();
        cfg.uploaddir = dir.join("upload");
        cfg.tmpdir = dir.join("tmp");
        cfg.errordir = dir.join("error");
        cfg.mapdest = "none".into();
        cfg.mapdir = None;
        cfg.mapdir_s3 = None;
        cfg.parser_path = PathBuf::from("/nonexistent/parser");
        cfg.rating.lockfile = dir.join("elo.lock");
        let (queue, _rx) = IngestQueue::bounded(16);
        IngestContext {
            config: Arc::new(cfg),
            pool: crate::db::test_pool().await,
            store: None,
            queue,
        }
    }

    #[tokio::test]
    async fn unsupported_extension_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, b"hello").unwrap();

        let result = process_path(&ctx, &file, ProcessOptions::default()).await;
        assert_eq!(result["status"], "invalid");
        assert_eq!(result["message"], "unsupported file type");
        assert!(!file.exists());
        assert!(ctx.config.errordir.join("notes.txt").exists());
    }

    #[tokio::test]
    async fn failing_parser_quarantines_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;
        let file = dir.path().join("match.mgx");
        std::fs::write(&file, b"not a real record").unwrap();

        let result = process_path(&ctx, &file, ProcessOptions::default()).await;
        assert_eq!(result["status"], "error");
        assert!(!file.exists());
        assert!(ctx.config.errordir.join("match.mgx").exists());
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;
        let result =
            process_path(&ctx, &dir.path().join("gone.mgx"), ProcessOptions::default()).await;
        assert_eq!(result["status"], "error");
    }

    #[tokio::test]
    async fn upload_lands_in_a_prefixed_tmp_subdir() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;

        // Unsupported type: quarantined, but via the tmp-save path.
        let result = process_upload(
            &ctx,
            b"payload",
            "some.weird",
            "2023-06-01T10:00:00",
            ProcessOptions::default(),
        )
        .await;
        assert_eq!(result["status"], "invalid");
        assert!(ctx.config.errordir.join("some.weird").exists());
        // Per-request subdir was cleaned away again.
        let leftovers: Vec<_> = std::fs::read_dir(&ctx.config.tmpdir)
            .map(|rd| rd.flatten().collect())
            .unwrap_or_default();
        assert!(leftovers.is_empty());
    }
}
