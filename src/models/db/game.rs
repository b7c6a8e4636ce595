use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// One recorded match, identified by its 32-hex `game_guid`.
///
/// Maps to the `games` table. All per-slot data lives in `players`; binary
/// provenance in `files`. The same match recorded by different clients still
/// collapses into one row here.
///
/// # Database Schema
/// - Unique constraint: `game_guid`
/// - `visibility`: 0 public, 1 private, 2 unlisted
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: i64,
    pub created: NaiveDateTime,
    pub modified: NaiveDateTime,
    pub game_guid: String,
    pub duration: Option<i64>,
    pub include_ai: Option<bool>,
    pub is_multiplayer: Option<bool>,
    pub population: Option<i64>,
    pub speed: Option<String>,
    pub matchup: Option<String>,
    pub map_name: Option<String>,
    pub map_size: Option<String>,
    pub version_code: Option<String>,
    pub version_log: Option<i64>,
    pub version_raw: Option<String>,
    pub version_save: Option<f64>,
    pub version_scenario: Option<f64>,
    pub victory_type: Option<String>,
    pub instruction: Option<String>,
    pub game_time: Option<NaiveDateTime>,
    pub visibility: i64,
}
