use std::io::{Cursor, Write};
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::ingest::quarantine::move_to_error;
use crate::models::record::ParsedRecord;
use crate::storage::{ObjectStore, object_key};

/// Outcome of packing and uploading one record binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordUploadStatus {
    BadMeta,
    Exists,
    ConnError,
    Success,
    UploadError,
}

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn played_at(record: &ParsedRecord, fallback: &str) -> String {
    record
        .game_time
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.naive_utc().format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| fallback.to_string())
}

fn envelope_comment(
    version: &str,
    matchup: &str,
    guid: &str,
    md5: &str,
    played: &str,
    parser: &str,
    packed_at: &str,
) -> String {
    format!(
        "Age of Empires II record\n\
         \n\
         Version: {version}\n\
         Matchup: {matchup}\n\
         \n\
         GUID: {guid}\n\
         MD5 : {md5}\n\
         (Maybe) Played at: {played}\n\
         \n\
         Collected by aocrec.com\n\
         Parsed by {parser}\n\
         Packed at {packed_at}\n"
    )
}

/// DEFLATE-pack the record into a single-entry zip named
/// `{version}_{matchup}_{md5 prefix}{ext}` with an ASCII provenance comment.
pub fn pack_record(record_bytes: &[u8], record: &ParsedRecord) -> Result<Vec<u8>, AppError> {
    let md5 = record.md5.as_deref().unwrap_or_default();
    let fileext = record.fileext.as_deref().unwrap_or_default();
    let guid = record.guid.as_deref().unwrap_or_default();
    let version = record.version_code().unwrap_or("UNKNOWN");
    let matchup = record.matchup.as_deref().unwrap_or("UNKNOWN");
    let parser = record.parser.as_deref().unwrap_or("unknown");

    let packed_at = Utc::now().naive_utc().format(TIME_FORMAT).to_string();
    let played = played_at(record, &packed_at);
    let entry_name = format!("{version}_{matchup}_{}{fileext}", &md5[..md5.len().min(4)]);
    let comment = envelope_comment(version, matchup, guid, md5, &played, parser, &packed_at);
    // Zip comments must stay ASCII for ancient unzip tools.
    let comment: String = comment.chars().filter(|c| c.is_ascii()).collect();

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    writer.set_comment(comment);
    writer.start_file(entry_name, options)?;
    writer.write_all(record_bytes).map_err(AppError::Io)?;
    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}

/// Pack and upload one record to `{recorddir}/{md5}.zip`.
///
/// Anything that keeps the binary out of the store moves the source file to
/// the error directory; the database rows written by the parallel task stay
/// put and a later reparse refills the object.
pub async fn save_record_to_store(
    config: &AppConfig,
    store: Option<&ObjectStore>,
    record_path: &Path,
    record: &ParsedRecord,
    force_replace: bool,
    cleanup: bool,
) -> RecordUploadStatus {
    let has_meta = record.md5.as_deref().map(|v| !v.is_empty()).unwrap_or(false)
        && record.fileext.is_some()
        && record.guid.as_deref().map(|v| !v.is_empty()).unwrap_or(false);
    if !has_meta {
        tracing::error!("Bad record metadata: {}", record_path.display());
        let _ = move_to_error(config, record_path, "badgame");
        return RecordUploadStatus::BadMeta;
    }
    let md5 = record.md5.as_deref().unwrap_or_default();

    let Some(store) = store else {
        tracing::error!("Object store unavailable for {}", record_path.display());
        let _ = move_to_error(config, record_path, "s3upload");
        return RecordUploadStatus::ConnError;
    };

    let key = object_key(&config.s3.recorddir, &format!("{md5}.zip"));
    match store.exists(&key).await {
        Ok(true) if !force_replace => {
            if cleanup {
                let _ = std::fs::remove_file(record_path);
            }
            return RecordUploadStatus::Exists;
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!("Object store check failed: {}", e);
            let _ = move_to_error(config, record_path, "s3upload");
            return RecordUploadStatus::ConnError;
        }
    }

    let bytes = match tokio::fs::read(record_path).await {
        Ok(b) => b,
        Err(e) => {
            tracing::error!("Could not read record {}: {}", record_path.display(), e);
            return RecordUploadStatus::UploadError;
        }
    };
    let zipped = {
        let record = record.clone();
        match tokio::task::spawn_blocking(move || pack_record(&bytes, &record)).await {
            Ok(Ok(z)) => z,
            Ok(Err(e)) => {
                tracing::error!("Packing failed for {}: {}", record_path.display(), e);
                let _ = move_to_error(config, record_path, "s3upload");
                return RecordUploadStatus::UploadError;
            }
            Err(e) => {
                tracing::error!("Packing task died: {}", e);
                return RecordUploadStatus::UploadError;
            }
        }
    };

    let packed_at = Utc::now().naive_utc().format(TIME_FORMAT).to_string();
    let metadata = [
        ("guid", record.guid.clone().unwrap_or_default()),
        ("md5", md5.to_string()),
        ("parser", record.parser.clone().unwrap_or_default()),
        ("played", played_at(record, &packed_at)),
        ("version", record.version_code().unwrap_or("UNKNOWN").to_string()),
        ("matchup", record.matchup.clone().unwrap_or_else(|| "UNKNOWN".into())),
    ];

    match store.put(&key, &zipped, &metadata, Some("application/zip")).await {
        Ok(()) => {
            tracing::info!("Uploaded: {}", key);
            if cleanup {
                let _ = std::fs::remove_file(record_path);
            }
            RecordUploadStatus::Success
        }
        Err(e) => {
            tracing::error!("Upload failed for {}: {}", key, e);
            let _ = move_to_error(config, record_path, "s3upload");
            RecordUploadStatus::UploadError
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn record() -> ParsedRecord {
        serde_json::from_value(serde_json::json!({
            "status": "perfect",
            "guid": "0123456789abcdef0123456789abcdef",
            "md5": "d41d8cd98f00b204e9800998ecf8427e",
            "fileext": ".mgx",
            "gameTime": 1_685_613_600,
            "matchup": "1v1",
            "version": {"code": "AOC10"},
            "parser": "TestParser 1.0"
        }))
        .unwrap()
    }

    #[test]
    fn zip_has_one_renamed_entry_and_ascii_comment() {
        let packed = pack_record(b"record-bytes", &record()).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(packed)).unwrap();

        assert_eq!(archive.len(), 1);
        let comment = String::from_utf8(archive.comment().to_vec()).unwrap();
        assert!(comment.is_ascii());
        assert!(comment.contains("Age of Empires II record"));
        assert!(comment.contains("GUID: 0123456789abcdef0123456789abcdef"));
        assert!(comment.contains("MD5 : d41d8cd98f00b204e9800998ecf8427e"));
        assert!(comment.contains("Version: AOC10"));
        assert!(comment.contains("Matchup: 1v1"));
        assert!(comment.contains("Parsed by TestParser 1.0"));

        let mut entry = archive.by_index(0).unwrap();
        assert_eq!(entry.name(), "AOC10_1v1_d41d.mgx");
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"record-bytes");
    }

    #[test]
    fn unknown_fields_fall_back() {
        let mut rec = record();
        rec.version = None;
        rec.matchup = None;
        let packed = pack_record(b"x", &rec).unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(packed)).unwrap();
        let comment = String::from_utf8(archive.comment().to_vec()).unwrap();
        assert!(comment.contains("Version: UNKNOWN"));
        assert!(comment.contains("Matchup: UNKNOWN"));
    }

    #[tokio::test]
    async fn missing_meta_quarantines_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::from_env();
        cfg.errordir = dir.path().join("error");
        let src = dir.path().join("rec.mgx");
        std::fs::write(&src, b"bytes").unwrap();

        let mut rec = record();
        rec.md5 = None;
        let status = save_record_to_store(&cfg, None, &src, &rec, false, true).await;
        assert_eq!(status, RecordUploadStatus::BadMeta);
        assert!(!src.exists());
        assert!(cfg.errordir.join("badgame").join("rec.mgx").exists());
    }

    #[tokio::test]
    async fn missing_store_quarantines_under_s3upload() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::from_env();
        cfg.errordir = dir.path().join("error");
        let src = dir.path().join("rec.mgx");
        std::fs::write(&src, b"bytes").unwrap();

        let status = save_record_to_store(&cfg, None, &src, &record(), false, true).await;
        assert_eq!(status, RecordUploadStatus::ConnError);
        assert!(cfg.errordir.join("s3upload").join("rec.mgx").exists());
    }
}
