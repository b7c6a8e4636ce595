// End-to-end ingestion: fake parser subprocess -> processor fan-out ->
// sqlite rows, deduplication and quarantine behavior.
// Run with: `cargo test --test ingest`

#[path = "common/mod.rs"]
mod common;

use rechub::ingest::ProcessOptions;
use rechub::ingest::processor::{process_path, process_upload};

async fn spawn_app_with_parser() -> common::TestApp {
    let app = common::TestApp::spawn().await;
    common::install_fake_parser(&app.state.config.parser_path);
    app
}

fn opts() -> ProcessOptions {
    ProcessOptions { syncproc: true, s3replace: false, cleanup: false }
}

#[tokio::test]
async fn upload_creates_game_players_file_and_chat_rows() {
    let app = spawn_app_with_parser().await;
    let ctx = app.state.ingest_context();

    let result = process_upload(
        &ctx,
        b"record-body-one",
        "skirmish.mgx",
        "2023-06-01T10:00:00",
        opts(),
    )
    .await;
    assert_eq!(result["status"], "good");
    let guid = result["guid"].as_str().expect("guid in parser output");
    assert_eq!(guid.len(), 32);

    let factory = app.factory();
    assert_eq!(factory.count("games").await, 1);
    assert_eq!(factory.count("players").await, 2);
    assert_eq!(factory.count("files").await, 1);
    assert_eq!(factory.count("chats").await, 1);

    let hash: String =
        sqlx::query_scalar("SELECT name_hash FROM players WHERE slot = 1")
            .fetch_one(&factory.pool)
            .await
            .unwrap();
    assert_eq!(hash, rechub::models::normalize::name_hash("Alpha"));

    app.stop().await;
}

#[tokio::test]
async fn reingesting_the_same_binary_is_duplicated() {
    let app = spawn_app_with_parser().await;
    let ctx = app.state.ingest_context();

    for _ in 0..3 {
        process_upload(&ctx, b"record-body-same", "match.mgx", "2023-06-01T10:00:00", opts())
            .await;
    }

    let factory = app.factory();
    // One game, two player slots, exactly one file row: the repeats
    // short-circuited as duplicates.
    assert_eq!(factory.count("games").await, 1);
    assert_eq!(factory.count("players").await, 2);
    assert_eq!(factory.count("files").await, 1);
    app.stop().await;
}

#[tokio::test]
async fn shorter_record_of_the_same_game_leaves_the_longer_one() {
    let app = spawn_app_with_parser().await;
    let ctx = app.state.ingest_context();

    // Same stem before "__", so both parse to the same guid; duration is
    // proportional to content length.
    process_upload(&ctx, b"record-long-version!", "duel__a.mgx", "2023-06-01T10:00:00", opts())
        .await;
    process_upload(&ctx, b"record-short", "duel__b.mgx", "2023-06-01T10:00:00", opts()).await;

    let factory = app.factory();
    assert_eq!(factory.count("games").await, 1);
    let duration: i64 = sqlx::query_scalar("SELECT duration FROM games")
        .fetch_one(&factory.pool)
        .await
        .unwrap();
    assert_eq!(duration, 20 * 100_000);
    // The shorter upload was rejected before writing a file row.
    assert_eq!(factory.count("files").await, 1);
    app.stop().await;
}

#[tokio::test]
async fn corrupt_record_is_quarantined_with_parser_verdict() {
    let app = spawn_app_with_parser().await;
    let ctx = app.state.ingest_context();

    let result = process_upload(
        &ctx,
        b"garbage",
        "corrupt_match.mgx",
        "2023-06-01T10:00:00",
        opts(),
    )
    .await;
    assert_eq!(result["status"], "invalid");
    assert_eq!(result["message"], "record is corrupt");

    assert_eq!(app.factory().count("games").await, 0);
    assert!(app.state.config.errordir.join("corrupt_match.mgx").exists());
    app.stop().await;
}

#[tokio::test]
async fn zip_archive_feeds_contained_records_through_the_queue() {
    use std::io::Write;

    let app = spawn_app_with_parser().await;
    let ctx = app.state.ingest_context();

    // Two records inside, one of them corrupt.
    let zip_path = app.workdir.join("bundle.zip");
    {
        let file = std::fs::File::create(&zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("good_game.mgx", options).unwrap();
        writer.write_all(b"good-record-bytes").unwrap();
        writer.start_file("corrupt_game.mgx", options).unwrap();
        writer.write_all(b"broken").unwrap();
        writer.finish().unwrap();
    }

    let result = process_path(&ctx, &zip_path, ProcessOptions::default()).await;
    assert_eq!(result["status"], "success");
    assert!(!zip_path.exists());

    // The queue workers drain asynchronously.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    let factory = app.factory();
    while factory.count("games").await < 1 && std::time::Instant::now() < deadline {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    assert_eq!(factory.count("games").await, 1);
    // The corrupt sibling landed in the error dir instead.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    let quarantined = loop {
        if app.state.config.errordir.join("corrupt_game.mgx").exists() {
            break true;
        }
        if std::time::Instant::now() > deadline {
            break false;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    };
    assert!(quarantined);
    app.stop().await;
}

#[tokio::test]
async fn minimap_lands_in_the_map_dir_when_present() {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let app = common::TestApp::spawn().await;

    // A parser variant that embeds a map payload.
    let script = format!(
        r#"#!/bin/sh
md5=$(md5sum "$1" | cut -d' ' -f1)
cat <<EOF
{{
  "status": "good",
  "guid": "$md5",
  "md5": "$md5",
  "fileext": ".mgx",
  "duration": 1800000,
  "gameTime": 1685613600,
  "map": {{"nameEn": "Arabia", "base64": "{}"}},
  "players": [{{"slot": 1, "name": "Solo", "isWinner": true, "mainOp": true}}],
  "parser": "FakeParser"
}}
EOF
"#,
        "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg=="
    );
    let parser = &app.state.config.parser_path;
    let mut file = std::fs::File::create(parser).unwrap();
    file.write_all(script.as_bytes()).unwrap();
    let mut perms = std::fs::metadata(parser).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(parser, perms).unwrap();

    let ctx = app.state.ingest_context();
    let result =
        process_upload(&ctx, b"mapped-record", "mapped.mgx", "2023-06-01T10:00:00", opts()).await;
    let guid = result["guid"].as_str().unwrap().to_string();

    let map_file = app
        .state
        .config
        .mapdir
        .clone()
        .unwrap()
        .join(format!("{guid}.png"));
    assert!(map_file.exists(), "minimap not written to {}", map_file.display());
    let png = std::fs::read(map_file).unwrap();
    assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    app.stop().await;
}
