use std::path::{Path, PathBuf};

use rand::Rng;

use crate::config::AppConfig;

fn random_prefix() -> String {
    let mut rng = rand::rng();
    (0..3).map(|_| rng.random_range(b'a'..=b'z') as char).collect()
}

/// Move a failed file into the error directory, optionally under a subdir
/// naming the failure class. A colliding basename gets a random three-letter
/// prefix until it is free.
pub fn move_to_error(config: &AppConfig, src: &Path, subdir: &str) -> std::io::Result<PathBuf> {
    let destdir = if subdir.is_empty() {
        config.errordir.clone()
    } else {
        config.errordir.join(subdir)
    };
    std::fs::create_dir_all(&destdir)?;

    let filename = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string());
    let mut destpath = destdir.join(&filename);
    while destpath.exists() {
        destpath = destdir.join(format!("{}_{}", random_prefix(), filename));
    }

    match std::fs::rename(src, &destpath) {
        Ok(()) => {}
        Err(_) => {
            // Cross-device moves need copy + remove.
            std::fs::copy(src, &destpath)?;
            std::fs::remove_file(src)?;
        }
    }
    tracing::warn!("Quarantined {} -> {}", src.display(), destpath.display());
    Ok(destpath)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> AppConfig {
        let mut cfg = AppConfig::from_env();
        cfg.errordir = dir.join("error");
        cfg
    }

    #[test]
    fn moves_file_into_error_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(dir.path());
        let src = dir.path().join("broken.mgx");
        std::fs::write(&src, b"junk").unwrap();

        let dest = move_to_error(&cfg, &src, "badgame").unwrap();
        assert!(!src.exists());
        assert_eq!(dest, cfg.errordir.join("badgame").join("broken.mgx"));
        assert_eq!(std::fs::read(dest).unwrap(), b"junk");
    }

    #[test]
    fn collision_gets_a_three_letter_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(dir.path());

        for _ in 0..2 {
            let src = dir.path().join("broken.mgx");
            std::fs::write(&src, b"junk").unwrap();
            move_to_error(&cfg, &src, "").unwrap();
        }

        let mut names: Vec<String> = std::fs::read_dir(&cfg.errordir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"broken.mgx".to_string()));
        let prefixed = names.iter().find(|n| *n != "broken.mgx").unwrap();
        assert_eq!(prefixed.len(), "broken.mgx".len() + 4);
        assert!(prefixed.ends_with("_broken.mgx"));
        assert!(prefixed[..3].chars().all(|c| c.is_ascii_lowercase()));
    }
}
