use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// Aggregated ELO standing of one display name within one
/// (version_code, matchup) partition. The whole table is replaced on every
/// rating run.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub id: i64,
    pub name: Option<String>,
    pub name_hash: Option<String>,
    pub version_code: Option<String>,
    pub matchup: Option<String>,
    pub rating: Option<i64>,
    pub wins: Option<i64>,
    pub total: Option<i64>,
    pub streak: Option<i64>,
    pub streak_max: Option<i64>,
    pub highest: Option<i64>,
    pub lowest: Option<i64>,
    pub first_played: Option<NaiveDateTime>,
    pub last_played: Option<NaiveDateTime>,
}
