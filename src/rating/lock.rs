use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::AppConfig;
use crate::errors::AppError;

/// Cross-process singleton gate for the rating pass.
///
/// Two sentinel files back it: the primary lock (two ASCII lines, PID and
/// unix start time) and the schedule sentinel whose mere existence means
/// "one more run should follow". A stale lock whose PID died is treated as
/// not running.
#[derive(Debug, Clone)]
pub struct RatingLock {
    lock_path: PathBuf,
    schedule_path: PathBuf,
    pid: Option<i32>,
    started: Option<i64>,
}

fn pid_alive(pid: i32) -> bool {
    // Signal 0 probes existence without delivering anything.
    unsafe { libc::kill(pid, 0) == 0 }
}

impl RatingLock {
    /// Snapshot the lock state from disk.
    pub fn new(config: &AppConfig) -> Self {
        let lock_path = config.rating.lockfile.clone();
        let schedule_path = config.rating_schedule_file();

        let (pid, started) = match std::fs::read_to_string(&lock_path) {
            Ok(content) => {
                let mut lines = content.lines();
                let pid = lines.next().and_then(|l| l.trim().parse().ok());
                let started = lines.next().and_then(|l| l.trim().parse().ok());
                (pid, started)
            }
            Err(_) => (None, None),
        };

        Self { lock_path, schedule_path, pid, started }
    }

    pub fn pid(&self) -> Option<i32> {
        self.pid
    }

    pub fn started_time(&self) -> Option<i64> {
        self.started
    }

    pub fn elapsed(&self) -> Option<i64> {
        let started = self.started?;
        let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs() as i64;
        Some(now - started)
    }

    pub fn lock_file_exists(&self) -> bool {
        self.lock_path.exists()
    }

    /// Running means the lock file exists and its PID is still alive.
    pub fn rating_running(&self) -> bool {
        self.lock_file_exists() && self.pid.map(pid_alive).unwrap_or(false)
    }

    /// Ask for one follow-up run. Creating the sentinel twice is fine; the
    /// signal collapses to at most one queued pass.
    pub fn schedule(&self) -> Result<(), AppError> {
        if let Some(parent) = self.schedule_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::File::create(&self.schedule_path)?;
        tracing::debug!("Rating run scheduled");
        Ok(())
    }

    pub fn scheduled(&self) -> bool {
        self.schedule_path.exists()
    }

    /// Remove the schedule sentinel; the caller's run discharges it.
    pub fn discharge_schedule(&self) {
        match std::fs::remove_file(&self.schedule_path) {
            Ok(()) => tracing::debug!("Schedule sentinel discharged"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Could not remove schedule sentinel: {}", e),
        }
    }

    /// Spawn the detached rating subprocess, or queue a follow-up when one
    /// is already running. Returns true if a process was spawned.
    pub fn start_calc(&self, schedule: bool) -> Result<bool, AppError> {
        if self.rating_running() {
            if schedule {
                self.schedule()?;
            }
            return Ok(false);
        }

        let rating_bin = std::env::current_exe()
            .map_err(AppError::Io)?
            .with_file_name("rating");
        std::process::Command::new(&rating_bin)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| {
                tracing::error!("Could not spawn {}: {}", rating_bin.display(), e);
                AppError::Io(e)
            })?;
        tracing::info!("Rating process spawned");
        Ok(true)
    }

    /// Exclusive acquisition for the rating process itself. Fails when any
    /// live instance holds the file.
    pub fn acquire(&mut self) -> Result<bool, AppError> {
        if self.rating_running() {
            return Ok(false);
        }
        // A leftover file from a dead process is stale; reclaim it.
        if self.lock_file_exists() {
            tracing::warn!("Removing stale rating lock (pid {:?})", self.pid);
            let _ = std::fs::remove_file(&self.lock_path);
        }
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let pid = std::process::id() as i32;
        let started = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        writeln!(file, "{pid}")?;
        writeln!(file, "{started}")?;
        file.sync_all()?;

        self.pid = Some(pid);
        self.started = Some(started);
        Ok(true)
    }

    /// Drop the primary lock held by this process.
    pub fn release(&self) {
        if let Err(e) = std::fs::remove_file(&self.lock_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Could not remove rating lock: {}", e);
            }
        }
    }

    /// Remove the lock; with `force`, terminate the running process first.
    pub fn unlock(&self, force: bool) -> Result<(), AppError> {
        if force {
            self.terminate();
        }
        if self.lock_file_exists() && !self.pid.map(pid_alive).unwrap_or(false) {
            std::fs::remove_file(&self.lock_path)?;
        }
        Ok(())
    }

    /// SIGTERM the recorded PID and wait for it to go away.
    fn terminate(&self) {
        let Some(pid) = self.pid.filter(|p| pid_alive(*p)) else {
            return;
        };
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
        // Not our child, so poll instead of waitpid.
        for _ in 0..50 {
            if !pid_alive(pid) {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
        tracing::warn!("Rating process {} did not exit after SIGTERM", pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn config_in(dir: &std::path::Path) -> AppConfig {
        let mut cfg = AppConfig::from_env();
        cfg.rating.lockfile = dir.join("elo.lock");
        cfg
    }

    #[test]
    fn acquire_is_exclusive_within_a_host() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(dir.path());

        let mut first = RatingLock::new(&cfg);
        assert!(first.acquire().unwrap());

        // Same PID is alive (it is us), so a second acquisition must fail.
        let mut second = RatingLock::new(&cfg);
        assert!(!second.acquire().unwrap());

        first.release();
        let mut third = RatingLock::new(&cfg);
        assert!(third.acquire().unwrap());
        third.release();
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(dir.path());

        // A PID that cannot exist long-term; i32::MAX is far above pid_max.
        std::fs::write(&cfg.rating.lockfile, format!("{}\n0\n", i32::MAX)).unwrap();

        let probe = RatingLock::new(&cfg);
        assert!(probe.lock_file_exists());
        assert!(!probe.rating_running());

        let mut lock = RatingLock::new(&cfg);
        assert!(lock.acquire().unwrap());
        lock.release();
    }

    #[test]
    fn schedule_sentinel_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(dir.path());
        let lock = RatingLock::new(&cfg);

        assert!(!lock.scheduled());
        lock.schedule().unwrap();
        lock.schedule().unwrap();
        assert!(lock.scheduled());
        lock.discharge_schedule();
        assert!(!lock.scheduled());
        // Discharging an absent sentinel is a no-op.
        lock.discharge_schedule();
    }

    #[test]
    fn lock_state_reads_pid_and_start_time() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(dir.path());

        let mut lock = RatingLock::new(&cfg);
        lock.acquire().unwrap();

        let observer = RatingLock::new(&cfg);
        assert_eq!(observer.pid(), Some(std::process::id() as i32));
        assert!(observer.started_time().is_some());
        assert!(observer.rating_running());

        lock.release();
    }
}
