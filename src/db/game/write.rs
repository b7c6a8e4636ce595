use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::SqlitePool;

use crate::errors::AppError;
use crate::models::normalize::{clamp_game_time, name_hash, sanitize_player_name};
use crate::models::record::ParsedRecord;

/// Outcome of one [`add_game`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddGameStatus {
    /// No guid in the parsed data; nothing written.
    Invalid,
    /// A longer record of the same game already exists; nothing written.
    Exists,
    /// The exact same binary (md5) is already on file; nothing written.
    Duplicated,
    /// The game existed and was replaced by this record.
    Updated,
    /// The game is new.
    Success,
    /// Persistent write failure after retries.
    Error,
}

impl AddGameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddGameStatus::Invalid => "invalid",
            AddGameStatus::Exists => "exists",
            AddGameStatus::Duplicated => "duplicated",
            AddGameStatus::Updated => "updated",
            AddGameStatus::Success => "success",
            AddGameStatus::Error => "error",
        }
    }

    /// Only a fresh insert or a replacement changes rating-relevant data.
    pub fn changed_data(&self) -> bool {
        matches!(self, AddGameStatus::Success | AddGameStatus::Updated)
    }
}

/// Derive the play time: parser's gameTime if present, possibly pulled
/// earlier by the record file's own mtime, clamped to the plausible range.
fn derive_game_time(record: &ParsedRecord, file_time: Option<NaiveDateTime>) -> NaiveDateTime {
    let mut game_time = record
        .game_time
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.naive_utc())
        .unwrap_or_else(|| Utc::now().naive_utc());
    if let Some(t) = file_time {
        game_time = game_time.min(t);
    }
    clamp_game_time(game_time)
}

async fn flush_game_time(
    tx: &mut sqlx::SqliteConnection,
    guid: &str,
    game_time: NaiveDateTime,
) -> Result<(), AppError> {
    sqlx::query("UPDATE games SET game_time = ?, modified = CURRENT_TIMESTAMP WHERE game_guid = ?")
        .bind(game_time)
        .bind(guid)
        .execute(tx)
        .await?;
    tracing::info!("game_time updated: {}", guid);
    Ok(())
}

/// Insert or merge one parsed game with its players, file and chat rows.
///
/// Deduplication: a stored game with a longer record wins (`Exists`); the
/// same duration plus an already-known binary md5 is `Duplicated`. In both
/// cases a pending earlier game_time still gets flushed, since shorter
/// records tend to keep their original file timestamps.
pub async fn add_game(
    pool: &SqlitePool,
    record: &ParsedRecord,
    file_time: Option<NaiveDateTime>,
    source: &str,
) -> Result<(AddGameStatus, String), AppError> {
    let Some(guid) = record.guid.clone().filter(|g| !g.is_empty()) else {
        return Ok((AddGameStatus::Invalid, "missing guid".into()));
    };

    let game_time = derive_game_time(record, file_time);

    let mut tx = pool.begin().await?;

    let existing: Option<(i64, Option<i64>, Option<NaiveDateTime>)> =
        sqlx::query_as("SELECT id, duration, game_time FROM games WHERE game_guid = ?")
            .bind(&guid)
            .fetch_optional(&mut *tx)
            .await?;

    if let Some((_, Some(existing_duration), existing_time)) = existing {
        let earlier = existing_time.map(|et| game_time < et).unwrap_or(true);
        if let Some(new_duration) = record.duration {
            if existing_duration > new_duration {
                if earlier {
                    flush_game_time(&mut *tx, &guid, game_time).await?;
                }
                tx.commit().await?;
                return Ok((AddGameStatus::Exists, guid));
            }
            if existing_duration == new_duration {
                let same_md5: Option<i64> = sqlx::query_scalar("SELECT id FROM files WHERE md5 = ?")
                    .bind(record.md5.as_deref().unwrap_or_default())
                    .fetch_optional(&mut *tx)
                    .await?;
                if same_md5.is_some() {
                    if earlier {
                        flush_game_time(&mut *tx, &guid, game_time).await?;
                    }
                    tx.commit().await?;
                    return Ok((AddGameStatus::Duplicated, guid));
                }
            }
        }
    }

    sqlx::query(
        "INSERT INTO games (
            game_guid, duration, include_ai, is_multiplayer, population, speed,
            matchup, map_name, map_size, version_code, version_log, version_raw,
            version_save, version_scenario, victory_type, instruction, game_time
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (game_guid) DO UPDATE SET
            duration = excluded.duration,
            include_ai = excluded.include_ai,
            is_multiplayer = excluded.is_multiplayer,
            population = excluded.population,
            speed = excluded.speed,
            matchup = excluded.matchup,
            map_name = excluded.map_name,
            map_size = excluded.map_size,
            version_code = excluded.version_code,
            version_log = excluded.version_log,
            version_raw = excluded.version_raw,
            version_save = excluded.version_save,
            version_scenario = excluded.version_scenario,
            victory_type = excluded.victory_type,
            instruction = excluded.instruction,
            game_time = excluded.game_time,
            modified = CURRENT_TIMESTAMP",
    )
    .bind(&guid)
    .bind(record.duration)
    .bind(record.include_ai)
    .bind(record.is_multiplayer)
    .bind(record.population)
    .bind(&record.speed)
    .bind(&record.matchup)
    .bind(record.map.as_ref().and_then(|m| m.name.clone()))
    .bind(record.map.as_ref().and_then(|m| m.size.clone()))
    .bind(record.version.as_ref().and_then(|v| v.code.clone()))
    .bind(record.version.as_ref().and_then(|v| v.log_ver))
    .bind(record.version.as_ref().and_then(|v| v.raw_str.clone()))
    .bind(record.version.as_ref().and_then(|v| v.save_ver))
    .bind(record.version.as_ref().and_then(|v| v.scenario_version))
    .bind(record.victory.as_ref().and_then(|v| v.victory_type.clone()))
    .bind(&record.instruction)
    .bind(game_time)
    .execute(&mut *tx)
    .await?;

    if let Some(players) = &record.players {
        // Replace the whole line-up; different recorders may disagree on slots.
        sqlx::query("DELETE FROM players WHERE game_guid = ?")
            .bind(&guid)
            .execute(&mut *tx)
            .await?;

        for p in players {
            let sanitized = sanitize_player_name(p.name.as_deref().unwrap_or(""));
            let hash = name_hash(&sanitized);
            let (init_x, init_y) = p.init_xy();
            sqlx::query(
                "INSERT INTO players (
                    game_guid, slot, index_player, name, name_hash, type, team,
                    color_index, init_x, init_y, disconnected, is_winner,
                    is_main_operator, civ_id, civ_name, feudal_time, castle_time,
                    imperial_time, resigned_time
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&guid)
            .bind(p.slot)
            .bind(p.index)
            .bind(&sanitized)
            .bind(&hash)
            .bind(&p.player_type)
            .bind(p.team)
            .bind(p.color_index)
            .bind(init_x)
            .bind(init_y)
            .bind(p.disconnected)
            .bind(p.is_winner)
            .bind(p.is_main_operator)
            .bind(p.civilization.as_ref().and_then(|c| c.id))
            .bind(p.civilization.as_ref().and_then(|c| c.name.clone()))
            .bind(p.feudal_time)
            .bind(p.castle_time)
            .bind(p.imperial_time)
            .bind(p.resigned_time)
            .execute(&mut *tx)
            .await?;
        }
    }

    sqlx::query(
        "INSERT INTO files (
            game_guid, md5, parser, parse_time, parsed_status, raw_filename,
            raw_lastmodified, notes, recorder_slot, source
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&guid)
    .bind(record.md5.as_deref().unwrap_or_default())
    .bind(&record.parser)
    .bind(record.parse_time)
    .bind(&record.status)
    .bind(&record.realfile)
    .bind(game_time)
    .bind(&record.message)
    .bind(record.recorder_slot)
    .bind(source)
    .execute(&mut *tx)
    .await?;

    if let Some(chats) = &record.chat {
        for c in chats {
            sqlx::query(
                "INSERT INTO chats (game_guid, chat_time, chat_content) VALUES (?, ?, ?)
                 ON CONFLICT (game_guid, chat_time, chat_content) DO NOTHING",
            )
            .bind(&guid)
            .bind(c.time)
            .bind(&c.msg)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;

    if existing.is_some() {
        Ok((AddGameStatus::Updated, guid))
    } else {
        Ok((AddGameStatus::Success, guid))
    }
}

fn is_constraint_violation(err: &AppError) -> bool {
    match err {
        AppError::Database(sqlx::Error::Database(db)) => {
            matches!(
                db.kind(),
                sqlx::error::ErrorKind::UniqueViolation
                    | sqlx::error::ErrorKind::ForeignKeyViolation
                    | sqlx::error::ErrorKind::CheckViolation
            )
        }
        _ => false,
    }
}

/// [`add_game`] with up to 3 retries on constraint violations. Each retry
/// starts a fresh transaction; a poisoned one is never reused.
pub async fn save_game(
    pool: &SqlitePool,
    record: &ParsedRecord,
    file_time: Option<NaiveDateTime>,
    source: &str,
) -> (AddGameStatus, String) {
    let mut retries = 3;
    loop {
        match add_game(pool, record, file_time, source).await {
            Ok(result) => {
                tracing::info!("Game added: {} {}", result.0.as_str(), result.1);
                return result;
            }
            Err(e) if is_constraint_violation(&e) && retries > 0 => {
                retries -= 1;
                tracing::warn!("Constraint violation while adding game, retrying: {}", e);
            }
            Err(e) => {
                tracing::error!("Failed to add game: {}", e);
                let guid = record.guid.clone().unwrap_or_else(|| "unknown guid".into());
                return (AddGameStatus::Error, guid);
            }
        }
    }
}
