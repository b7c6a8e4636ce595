use serde::Deserialize;

/// Criteria body of `POST /game/search`.
///
/// When `game_guid` is a 32-hex identifier it is authoritative and every
/// other field is ignored. Range fields treat None as unset; list fields
/// become `IN (…)` constraints; `map_name` and `instruction` are substring
/// matches.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchCriteria {
    pub page: i64,
    pub page_size: i64,
    pub order_by: Option<String>,
    pub order_desc: Option<bool>,
    pub game_guid: Option<String>,
    pub duration_min: Option<i64>,
    pub duration_max: Option<i64>,
    pub include_ai: Option<bool>,
    pub is_multiplayer: Option<bool>,
    pub population_min: Option<i64>,
    pub population_max: Option<i64>,
    pub instruction: Option<String>,
    pub gametime_min: Option<String>,
    pub gametime_max: Option<String>,
    pub map_name: Option<String>,
    pub speed: Option<Vec<String>>,
    pub victory_type: Option<Vec<String>>,
    pub version_code: Option<Vec<String>>,
    pub matchup: Option<Vec<String>>,
    pub map_size: Option<Vec<String>>,
}

impl Default for SearchCriteria {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 100,
            order_by: None,
            order_desc: None,
            game_guid: None,
            duration_min: None,
            duration_max: None,
            include_ai: None,
            is_multiplayer: None,
            population_min: None,
            population_max: None,
            instruction: None,
            gametime_min: None,
            gametime_max: None,
            map_name: None,
            speed: None,
            victory_type: None,
            version_code: None,
            matchup: None,
            map_size: None,
        }
    }
}
