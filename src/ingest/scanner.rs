use std::path::{Path, PathBuf};

use crate::ingest::queue::IngestQueue;

/// Collect every regular file under `dir`, bottom-up.
fn walk_files(dir: &Path, files: &mut Vec<PathBuf>, dirs: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_files(&path, files, dirs);
            dirs.push(path);
        } else if path.is_file() {
            files.push(path);
        }
    }
}

/// Scan a directory, enqueue every regular file and prune subdirectories
/// that are already empty. Workers prune the rest as files complete.
pub async fn scan(dir: &Path, queue: &IngestQueue) {
    let mut files = Vec::new();
    let mut dirs = Vec::new();
    walk_files(dir, &mut files, &mut dirs);

    for file in files {
        tracing::debug!("Queued from scan: {}", file.display());
        queue.enqueue(file).await;
    }

    // Bottom-up from the walk, so children come before parents.
    for dir in dirs {
        let is_empty = std::fs::read_dir(&dir).map(|mut d| d.next().is_none()).unwrap_or(false);
        if is_empty {
            let _ = std::fs::remove_dir(&dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scan_enqueues_files_and_prunes_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();
        std::fs::write(nested.join("one.mgx"), b"1").unwrap();
        std::fs::write(dir.path().join("two.mgx"), b"2").unwrap();

        let (queue, mut rx) = IngestQueue::bounded(16);
        scan(dir.path(), &queue).await;
        drop(queue);

        let mut seen = Vec::new();
        while let Some(path) = rx.recv().await {
            seen.push(path);
        }
        assert_eq!(seen.len(), 2);
        assert!(!dir.path().join("empty").exists());
        // Non-empty directories survive until their files are processed.
        assert!(nested.exists());
    }
}
