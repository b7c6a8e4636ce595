use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// Provenance of one uploaded record binary.
///
/// A game may own several of these (the same match recorded from different
/// clients); `md5` globally identifies the binary itself.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RecordFile {
    pub id: i64,
    pub created: NaiveDateTime,
    pub modified: NaiveDateTime,
    pub game_guid: String,
    pub md5: String,
    pub parser: Option<String>,
    pub parse_time: Option<f64>,
    pub parsed_status: Option<String>,
    pub raw_filename: Option<String>,
    pub raw_lastmodified: Option<NaiveDateTime>,
    pub notes: Option<String>,
    pub recorder_slot: Option<i64>,
    pub source: Option<String>,
}
