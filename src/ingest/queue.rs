use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::ingest::processor::{IngestContext, ProcessOptions, process_path};
use crate::ingest::scanner;

const QUEUE_CAPACITY: usize = 4096;
pub const WORKER_COUNT: usize = 4;

/// Multi-producer handle onto the process-wide ingest queue.
#[derive(Clone, Debug)]
pub struct IngestQueue {
    tx: mpsc::Sender<PathBuf>,
}

impl IngestQueue {
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<PathBuf>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue a path for ingestion; waits when the queue is full.
    pub async fn enqueue(&self, path: PathBuf) {
        if let Err(e) = self.tx.send(path).await {
            tracing::error!("Ingest queue closed, dropping {}", e.0.display());
        }
    }
}

/// Try to become this host's single watcher by exclusively creating the
/// election lock. A live PID in an existing file means someone else won.
fn elect_watcher(lock_path: &Path) -> bool {
    if let Ok(content) = std::fs::read_to_string(lock_path) {
        let pid: Option<i32> = content.lines().next().and_then(|l| l.trim().parse().ok());
        let alive = pid.map(|p| unsafe { libc::kill(p, 0) == 0 }).unwrap_or(false);
        if alive && pid != Some(std::process::id() as i32) {
            return false;
        }
        let _ = std::fs::remove_file(lock_path);
    }
    if let Some(parent) = lock_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match std::fs::OpenOptions::new().write(true).create_new(true).open(lock_path) {
        Ok(mut f) => {
            use std::io::Write;
            let _ = writeln!(f, "{}", std::process::id());
            true
        }
        Err(_) => false,
    }
}

async fn worker_loop(worker: usize, ctx: IngestContext, rx: Arc<Mutex<mpsc::Receiver<PathBuf>>>) {
    loop {
        let path = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(path) = path else {
            tracing::debug!("Ingest worker {} shutting down", worker);
            return;
        };

        tracing::debug!("Worker {} processing {}", worker, path.display());
        let result = process_path(
            &ctx,
            &path,
            ProcessOptions { syncproc: true, s3replace: false, cleanup: true },
        )
        .await;
        tracing::debug!(
            "Worker {} finished {}: {}",
            worker,
            path.display(),
            result.get("status").and_then(|s| s.as_str()).unwrap_or("?")
        );

        // The processing tasks usually consumed or quarantined the file
        // already; sweep leftovers and the emptied parent directory.
        if path.exists() {
            let _ = std::fs::remove_file(&path);
        }
        if let Some(parent) = path.parent() {
            if parent != ctx.config.uploaddir {
                let _ = std::fs::remove_dir(parent);
            }
        }
    }
}

/// Start the ingest machinery: the bounded queue, the worker pool, and (for
/// the elected watcher only) a crash-recovery scan of the upload root.
pub async fn start(ctx_builder: impl FnOnce(IngestQueue) -> IngestContext) -> IngestQueue {
    let (queue, rx) = IngestQueue::bounded(QUEUE_CAPACITY);
    let ctx = ctx_builder(queue.clone());
    let rx = Arc::new(Mutex::new(rx));

    for worker in 0..WORKER_COUNT {
        tokio::spawn(worker_loop(worker, ctx.clone(), rx.clone()));
    }

    if elect_watcher(&ctx.config.watcher_lockfile()) {
        let _ = tokio::fs::create_dir_all(&ctx.config.uploaddir).await;
        tracing::info!("Watching upload directory {}", ctx.config.uploaddir.display());
        let scan_queue = queue.clone();
        let uploaddir = ctx.config.uploaddir.clone();
        tokio::spawn(async move {
            scanner::scan(&uploaddir, &scan_queue).await;
        });
    } else {
        tracing::info!("Another watcher instance is active on this host");
    }

    queue
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn election_is_exclusive_until_released() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("watcher.lock");

        assert!(elect_watcher(&lock));
        // Our own PID may re-elect (same-process restart of the watcher).
        assert!(elect_watcher(&lock));

        // A dead PID is stale and gets replaced.
        std::fs::write(&lock, format!("{}\n", i32::MAX)).unwrap();
        assert!(elect_watcher(&lock));
    }
}
