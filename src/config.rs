use std::path::{Path, PathBuf};
use std::time::Duration;

/// Grouped process configuration, read once from the environment.
///
/// Every key follows the `SECTION_KEY` naming scheme, e.g. `SYSTEM_PARSER`,
/// `DATABASE_SQLITE`, `S3_ENDPOINT`, `RATING_LOCKFILE`, `WORDPRESS_URL`.
/// Directory defaults are derived from `SYSTEM_WORKDIR` and created lazily by
/// the components that use them.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub parser_path: PathBuf,
    pub workdir: PathBuf,
    pub logdir: PathBuf,
    pub uploaddir: PathBuf,
    pub backupdir: PathBuf,
    pub tmpdir: PathBuf,
    pub errordir: PathBuf,
    pub langdir: PathBuf,
    pub tmpprefix: String,
    pub loglevel: String,
    pub logdest: String,
    pub mapdest: String,
    pub mapdir: Option<PathBuf>,
    pub mapdir_s3: Option<String>,
    pub echosql: bool,
    pub sqlite_path: PathBuf,
    pub s3: S3Config,
    pub rating: RatingConfig,
    pub wordpress: WordpressConfig,
}

#[derive(Clone, Debug, Default)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub accesskey: Option<String>,
    pub secretkey: Option<String>,
    pub region: Option<String>,
    pub bucket: Option<String>,
    pub secure: bool,
    pub recorddir: String,
}

#[derive(Clone, Debug)]
pub struct RatingConfig {
    /// Games shorter than this many milliseconds are ignored by the engine.
    pub duration_threshold: i64,
    /// Row batch size of the streaming rating query.
    pub batch_size: i64,
    /// ELO adjustment magnitude.
    pub k_factor: i64,
    pub lockfile: PathBuf,
}

#[derive(Clone, Debug, Default)]
pub struct WordpressConfig {
    pub url: Option<String>,
    /// Successful logins are cached for this many minutes.
    pub login_expire: i64,
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> Self {
        let workdir = env_str("SYSTEM_WORKDIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("workdir"));
        let sub = |name: &str| workdir.join(name);

        let s3 = S3Config {
            endpoint: env_str("S3_ENDPOINT"),
            accesskey: env_str("S3_ACCESSKEY"),
            secretkey: env_str("S3_SECRETKEY"),
            region: env_str("S3_REGION"),
            bucket: env_str("S3_BUCKET"),
            secure: env_str("S3_SECURE").map(|v| v != "off").unwrap_or(true),
            recorddir: env_str("S3_RECORDDIR").unwrap_or_else(|| "records".into()),
        };

        let rating = RatingConfig {
            duration_threshold: env_str("RATING_DURATIONTHRESHOLD")
                .and_then(|v| v.parse().ok())
                .unwrap_or(15 * 60 * 1000),
            batch_size: env_str("RATING_BATCHSIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(150_000),
            k_factor: env_str("RATING_KFACTOR").and_then(|v| v.parse().ok()).unwrap_or(32),
            lockfile: env_str("RATING_LOCKFILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| workdir.join("elo_calc_process.lock")),
        };

        let wordpress = WordpressConfig {
            url: env_str("WORDPRESS_URL"),
            login_expire: env_str("WORDPRESS_LOGIN_EXPIRE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
        };

        Self {
            parser_path: env_str("SYSTEM_PARSER")
                .map(PathBuf::from)
                .unwrap_or_else(|| workdir.join("parser")),
            logdir: env_str("SYSTEM_LOGDIR").map(PathBuf::from).unwrap_or_else(|| sub("log")),
            uploaddir: env_str("SYSTEM_UPLOADDIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| sub("upload")),
            backupdir: env_str("SYSTEM_BACKUPDIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| sub("backup")),
            tmpdir: env_str("SYSTEM_TMPDIR").map(PathBuf::from).unwrap_or_else(|| sub("tmp")),
            errordir: env_str("SYSTEM_ERRORDIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| sub("error")),
            langdir: env_str("SYSTEM_LANGDIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| sub("lang")),
            tmpprefix: env_str("SYSTEM_TMPPREFIX").unwrap_or_else(|| "tmp_".into()),
            loglevel: env_str("SYSTEM_LOGLEVEL").unwrap_or_else(|| "INFO".into()),
            logdest: env_str("SYSTEM_LOGDEST").unwrap_or_else(|| "console".into()),
            mapdest: env_str("SYSTEM_MAPDEST").unwrap_or_else(|| "local".into()),
            mapdir: env_str("SYSTEM_MAPDIR").map(PathBuf::from).or_else(|| Some(sub("map"))),
            mapdir_s3: env_str("SYSTEM_MAPDIR_S3"),
            echosql: env_str("SYSTEM_ECHOSQL").map(|v| v == "on").unwrap_or(false),
            sqlite_path: env_str("DATABASE_SQLITE")
                .map(PathBuf::from)
                .unwrap_or_else(|| workdir.join("db.sqlite3")),
            workdir,
            s3,
            rating,
            wordpress,
        }
    }

    /// Path of the watcher-election lock file.
    pub fn watcher_lockfile(&self) -> PathBuf {
        self.workdir.join("ingest_watcher.lock")
    }

    /// Path of the "run once more" sentinel, kept next to the rating lock.
    pub fn rating_schedule_file(&self) -> PathBuf {
        let mut name = self
            .rating
            .lockfile
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "elo_calc_process.lock".into());
        name.push(".scheduled");
        self.rating.lockfile.with_file_name(name)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(15)
    }

    /// Serialize the effective configuration as an ini-style document for the
    /// admin config endpoints. Secrets are redacted.
    pub fn render_ini(&self) -> String {
        fn line(out: &mut String, key: &str, value: impl AsRef<str>) {
            out.push_str(key);
            out.push_str(" = ");
            out.push_str(value.as_ref());
            out.push('\n');
        }
        fn pline(out: &mut String, key: &str, value: &Path) {
            line(out, key, value.to_string_lossy());
        }

        let mut out = String::from("[system]\n");
        pline(&mut out, "parser", &self.parser_path);
        pline(&mut out, "workdir", &self.workdir);
        pline(&mut out, "logdir", &self.logdir);
        pline(&mut out, "uploaddir", &self.uploaddir);
        pline(&mut out, "backupdir", &self.backupdir);
        pline(&mut out, "tmpdir", &self.tmpdir);
        pline(&mut out, "errordir", &self.errordir);
        pline(&mut out, "langdir", &self.langdir);
        line(&mut out, "tmpprefix", &self.tmpprefix);
        line(&mut out, "loglevel", &self.loglevel);
        line(&mut out, "logdest", &self.logdest);
        line(&mut out, "mapdest", &self.mapdest);
        if let Some(dir) = &self.mapdir {
            pline(&mut out, "mapdir", dir);
        }
        if let Some(dir) = &self.mapdir_s3 {
            line(&mut out, "mapdirS3", dir);
        }
        line(&mut out, "echosql", if self.echosql { "on" } else { "off" });

        out.push_str("\n[database]\n");
        pline(&mut out, "sqlite", &self.sqlite_path);

        out.push_str("\n[s3]\n");
        line(&mut out, "endpoint", self.s3.endpoint.as_deref().unwrap_or(""));
        line(&mut out, "accesskey", if self.s3.accesskey.is_some() { "***" } else { "" });
        line(&mut out, "secretkey", if self.s3.secretkey.is_some() { "***" } else { "" });
        line(&mut out, "region", self.s3.region.as_deref().unwrap_or(""));
        line(&mut out, "bucket", self.s3.bucket.as_deref().unwrap_or(""));
        line(&mut out, "secure", if self.s3.secure { "on" } else { "off" });
        line(&mut out, "recorddir", &self.s3.recorddir);

        out.push_str("\n[rating]\n");
        line(&mut out, "durationthreshold", self.rating.duration_threshold.to_string());
        line(&mut out, "batchsize", self.rating.batch_size.to_string());
        line(&mut out, "kfactor", self.rating.k_factor.to_string());
        pline(&mut out, "lockfile", &self.rating.lockfile);

        out.push_str("\n[wordpress]\n");
        line(&mut out, "url", self.wordpress.url.as_deref().unwrap_or(""));
        line(&mut out, "login_expire", self.wordpress.login_expire.to_string());

        out
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
