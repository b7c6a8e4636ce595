use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// One occupied slot of one game.
///
/// `name_hash` is md5 of the sanitized display name and is the only link the
/// rating system keeps to a person. `rating_change` is back-filled by the
/// rating pass.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: i64,
    pub created: NaiveDateTime,
    pub modified: NaiveDateTime,
    pub game_guid: String,
    pub slot: Option<i64>,
    pub index_player: Option<i64>,
    pub name: Option<String>,
    pub name_hash: Option<String>,
    pub r#type: Option<String>,
    pub team: Option<i64>,
    pub color_index: Option<i64>,
    pub init_x: Option<f64>,
    pub init_y: Option<f64>,
    pub disconnected: Option<bool>,
    pub is_winner: Option<bool>,
    pub is_main_operator: Option<bool>,
    pub civ_id: Option<i64>,
    pub civ_name: Option<String>,
    pub feudal_time: Option<i64>,
    pub castle_time: Option<i64>,
    pub imperial_time: Option<i64>,
    pub resigned_time: Option<i64>,
    pub rating_change: Option<i64>,
}
