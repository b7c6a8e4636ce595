use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// One in-game chat line. Unique on (game_guid, chat_time, chat_content) so
/// the same line captured by several recorders collapses to one row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: i64,
    pub created: NaiveDateTime,
    pub modified: NaiveDateTime,
    pub game_guid: String,
    pub chat_time: Option<i64>,
    pub chat_content: Option<String>,
}
