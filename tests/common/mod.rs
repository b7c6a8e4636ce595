use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use tokio::sync::oneshot;

use rechub::config::AppConfig;
use rechub::state::AppState;

/// Test application harness bound to a throwaway work directory.
#[allow(dead_code)]
pub struct TestApp {
    pub base_url: String,
    pub state: AppState,
    pub workdir: PathBuf,
    _tempdir: tempfile::TempDir,
    shutdown: Option<oneshot::Sender<()>>,
    mock_auth_shutdown: Option<oneshot::Sender<()>>,
}

/// Configuration rooted in a fresh temp directory: file-backed sqlite, no
/// object store, no upstream auth unless a mock is attached.
pub fn test_config(root: &std::path::Path) -> AppConfig {
    let mut cfg = AppConfig::from_env();
    cfg.workdir = root.to_path_buf();
    cfg.uploaddir = root.join("upload");
    cfg.tmpdir = root.join("tmp");
    cfg.errordir = root.join("error");
    cfg.logdir = root.join("log");
    cfg.backupdir = root.join("backup");
    cfg.mapdir = Some(root.join("map"));
    cfg.mapdest = "local".into();
    cfg.mapdir_s3 = None;
    cfg.sqlite_path = root.join("db.sqlite3");
    cfg.parser_path = root.join("parser.sh");
    cfg.rating.lockfile = root.join("elo_calc_process.lock");
    cfg.s3.endpoint = None;
    cfg.wordpress.url = None;
    cfg.wordpress.login_expire = 15;
    cfg
}

#[allow(dead_code)]
impl TestApp {
    /// Boot the whole app (state, workers, router) on an ephemeral port.
    pub async fn spawn() -> Self {
        Self::spawn_with(|_cfg| {}).await
    }

    /// Same, with a configuration hook applied before boot.
    pub async fn spawn_with(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let mut cfg = test_config(tempdir.path());
        tweak(&mut cfg);

        let state = AppState::with_config(Arc::new(cfg))
            .await
            .expect("app state");

        let app = axum::Router::new()
            .merge(rechub::http::create_http_routes(state.clone()))
            .layer(rechub::cors_layer());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (tx, rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                let _ = rx.await;
            })
            .await
            .ok();
        });

        TestApp {
            base_url: format!("http://{addr}"),
            workdir: tempdir.path().to_path_buf(),
            state,
            _tempdir: tempdir,
            shutdown: Some(tx),
            mock_auth_shutdown: None,
        }
    }

    /// Spawn with a mock user service; `admin_user` gets the administrator
    /// role, any other username only validates as itself.
    pub async fn spawn_with_auth(admin_user: &str) -> Self {
        let (url, tx) = spawn_mock_user_service(admin_user.to_string()).await;
        let mut app = Self::spawn_with(move |cfg| {
            cfg.wordpress.url = Some(url);
        })
        .await;
        app.mock_auth_shutdown = Some(tx);
        app
    }

    pub fn factory(&self) -> TestFactory {
        TestFactory { pool: self.state.sqlite.clone() }
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(tx) = self.mock_auth_shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
}

/// Minimal stand-in for the external user service: any password works, the
/// designated admin carries the administrator role.
async fn spawn_mock_user_service(admin_user: String) -> (String, oneshot::Sender<()>) {
    use axum::{Json, Router, extract::State, http::HeaderMap, routing::get};
    use base64::Engine;

    async fn users_me(
        State(admin): State<String>,
        headers: HeaderMap,
    ) -> Result<Json<serde_json::Value>, axum::http::StatusCode> {
        let username = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Basic "))
            .and_then(|v| base64::engine::general_purpose::STANDARD.decode(v).ok())
            .and_then(|v| String::from_utf8(v).ok())
            .and_then(|v| v.split(':').next().map(str::to_string))
            .ok_or(axum::http::StatusCode::UNAUTHORIZED)?;

        let roles = if username == admin {
            vec!["administrator"]
        } else {
            vec!["subscriber"]
        };
        Ok(Json(serde_json::json!({
            "name": username,
            "roles": roles,
        })))
    }

    let app = Router::new()
        .route("/wp-json/wp/v2/users/me", get(users_me))
        .with_state(admin_user);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock auth");
    let addr = listener.local_addr().expect("mock auth addr");
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = rx.await;
            })
            .await
            .ok();
    });
    (format!("http://{addr}"), tx)
}

/// Inserts domain rows directly, skipping the ingest pipeline.
#[allow(dead_code)]
pub struct TestFactory {
    pub pool: SqlitePool,
}

#[allow(dead_code)]
impl TestFactory {
    /// Insert one finished multiplayer game with winner and loser line-ups.
    pub async fn create_game(
        &self,
        guid: &str,
        game_time: &str,
        version_code: &str,
        matchup: &str,
        winners: &[&str],
        losers: &[&str],
    ) -> Result<(), sqlx::Error> {
        let game_time = NaiveDateTime::parse_from_str(game_time, "%Y-%m-%d %H:%M:%S")
            .expect("test game_time");
        sqlx::query(
            "INSERT INTO games (game_guid, duration, include_ai, is_multiplayer,
                                matchup, version_code, game_time)
             VALUES (?, 1800000, 0, 1, ?, ?, ?)",
        )
        .bind(guid)
        .bind(matchup)
        .bind(version_code)
        .bind(game_time)
        .execute(&self.pool)
        .await?;

        let mut slot = 1i64;
        for (names, is_winner) in [(winners, true), (losers, false)] {
            for name in names.iter() {
                sqlx::query(
                    "INSERT INTO players (game_guid, slot, name, name_hash,
                                          is_winner, is_main_operator)
                     VALUES (?, ?, ?, ?, ?, 1)",
                )
                .bind(guid)
                .bind(slot)
                .bind(name)
                .bind(rechub::models::normalize::name_hash(name))
                .bind(is_winner)
                .execute(&self.pool)
                .await?;
                slot += 1;
            }
        }
        Ok(())
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .unwrap_or(0)
    }
}

/// Write a fake parser script: emits a JSON document derived from the input
/// file. Files whose name contains "corrupt" yield an invalid status, so a
/// single script covers both happy and broken paths.
#[allow(dead_code)]
pub fn install_fake_parser(path: &std::path::Path) {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let script = r#"#!/bin/sh
# guid comes from the basename (minus a "__variant" suffix), so re-recordings
# of the same match share a game; md5 stays content-derived.
f="$1"
case "$f" in
  *corrupt*)
    echo '{"status": "invalid", "message": "record is corrupt"}'
    exit 0
    ;;
esac
stem=$(basename "$f")
stem=${stem%.*}
stem=${stem%%__*}
guid=$(printf '%s' "$stem" | md5sum | cut -d' ' -f1)
md5=$(md5sum "$f" | cut -d' ' -f1)
size=$(wc -c < "$f")
cat <<EOF
{
  "status": "good",
  "guid": "$guid",
  "md5": "$md5",
  "fileext": ".mgx",
  "duration": $((size * 100000)),
  "gameTime": 1685613600,
  "includeAI": false,
  "isMultiplayer": true,
  "matchup": "1v1",
  "version": {"code": "AOC10"},
  "map": {"nameEn": "Arabia", "sizeEn": "Tiny"},
  "players": [
    {"slot": 1, "name": "Alpha", "team": 1, "isWinner": true, "mainOp": true},
    {"slot": 2, "name": "Bravo", "team": 2, "isWinner": false, "mainOp": true}
  ],
  "chat": [{"time": 3000, "msg": "glhf"}],
  "parser": "FakeParser 1.0"
}
EOF
"#;
    let mut file = std::fs::File::create(path).expect("parser script");
    file.write_all(script.as_bytes()).expect("write script");
    let mut perms = std::fs::metadata(path).expect("script metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).expect("chmod script");
}
