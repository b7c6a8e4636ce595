use std::path::Path;

use tokio::process::Command;

use crate::config::AppConfig;
use crate::models::record::ParsedRecord;

/// Outcome of one parser invocation: the typed view plus the raw document,
/// which upload endpoints return to callers verbatim.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub record: ParsedRecord,
    pub raw: serde_json::Value,
}

impl ParseOutcome {
    fn error(message: &str) -> Self {
        Self {
            record: ParsedRecord::error(message),
            raw: serde_json::json!({"status": "error", "message": message}),
        }
    }
}

/// Run the configured parser binary against a record file and decode its
/// stdout as one JSON document.
///
/// Statuses: `perfect` and `good` mean a fully usable record, `valid` means
/// the header decoded but the body had problems, `invalid` means the file is
/// not a usable record, `error` means the parser produced no usable JSON.
pub async fn parse(config: &AppConfig, path: &Path, opts: &str) -> ParseOutcome {
    let output = match Command::new(&config.parser_path)
        .arg(path)
        .arg(opts)
        .kill_on_drop(true)
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            tracing::error!("Parser spawn failed ({}): {}", config.parser_path.display(), e);
            return ParseOutcome::error("parsing failed");
        }
    };

    let raw: serde_json::Value = match serde_json::from_slice(&output.stdout) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Parser emitted non-JSON stdout for {}: {}", path.display(), e);
            return ParseOutcome::error("parsing failed");
        }
    };

    match serde_json::from_value::<ParsedRecord>(raw.clone()) {
        Ok(record) => ParseOutcome { record, raw },
        Err(e) => {
            tracing::warn!("Parser document had unexpected shape for {}: {}", path.display(), e);
            ParseOutcome::error("parsing failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use std::io::Write;

    fn config_with_parser(parser: &Path) -> AppConfig {
        let mut cfg = AppConfig::from_env();
        cfg.parser_path = parser.to_path_buf();
        cfg
    }

    #[tokio::test]
    async fn missing_binary_reports_parsing_failed() {
        let cfg = config_with_parser(Path::new("/nonexistent/parser-binary"));
        let out = parse(&cfg, Path::new("/tmp/whatever.mgx"), "-b").await;
        assert_eq!(out.record.status, "error");
        assert_eq!(out.record.message.as_deref(), Some("parsing failed"));
    }

    #[tokio::test]
    async fn json_stdout_is_decoded() {
        // A shell script standing in for the parser binary.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("parser.sh");
        {
            let mut f = std::fs::File::create(&script).unwrap();
            writeln!(f, "#!/bin/sh").unwrap();
            writeln!(f, "echo '{{\"status\": \"good\", \"guid\": \"00000000000000000000000000000001\"}}'").unwrap();
        }
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let cfg = config_with_parser(&script);
        let out = parse(&cfg, Path::new("/tmp/record.mgx"), "").await;
        assert_eq!(out.record.status, "good");
        assert_eq!(out.record.guid.as_deref(), Some("00000000000000000000000000000001"));
    }

    #[tokio::test]
    async fn non_json_stdout_reports_parsing_failed() {
        let cfg = config_with_parser(Path::new("/bin/echo"));
        let out = parse(&cfg, Path::new("not json at all"), "").await;
        assert_eq!(out.record.status, "error");
    }
}
