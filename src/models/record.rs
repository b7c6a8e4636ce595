use serde::Deserialize;

/// Typed view over the external parser's JSON output.
///
/// The parser emits one document per record; everything is optional except
/// `status` because broken records produce sparse output. Unknown fields are
/// carried in the raw document the processor keeps alongside this struct,
/// never here.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedRecord {
    pub status: String,
    pub message: Option<String>,
    pub guid: Option<String>,
    pub md5: Option<String>,
    pub fileext: Option<String>,
    pub duration: Option<i64>,
    pub game_time: Option<i64>,
    #[serde(rename = "includeAI")]
    pub include_ai: Option<bool>,
    pub is_multiplayer: Option<bool>,
    pub population: Option<i64>,
    #[serde(rename = "speedEn")]
    pub speed: Option<String>,
    pub matchup: Option<String>,
    pub map: Option<ParsedMap>,
    pub version: Option<ParsedVersion>,
    pub victory: Option<ParsedVictory>,
    pub instruction: Option<String>,
    pub players: Option<Vec<ParsedPlayer>>,
    pub chat: Option<Vec<ParsedChat>>,
    pub parser: Option<String>,
    pub parse_time: Option<f64>,
    #[serde(rename = "recPlayer")]
    pub recorder_slot: Option<i64>,
    pub realfile: Option<String>,
    pub realsize: Option<i64>,
}

impl ParsedRecord {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            message: Some(message.into()),
            guid: None,
            md5: None,
            fileext: None,
            duration: None,
            game_time: None,
            include_ai: None,
            is_multiplayer: None,
            population: None,
            speed: None,
            matchup: None,
            map: None,
            version: None,
            victory: None,
            instruction: None,
            players: None,
            chat: None,
            parser: None,
            parse_time: None,
            recorder_slot: None,
            realfile: None,
            realsize: None,
        }
    }

    /// Parser statuses that mean the record could not be used at all.
    pub fn is_unusable(&self) -> bool {
        matches!(self.status.as_str(), "error" | "invalid")
    }

    pub fn version_code(&self) -> Option<&str> {
        self.version.as_ref().and_then(|v| v.code.as_deref())
    }

    pub fn map_base64(&self) -> Option<&str> {
        self.map.as_ref().and_then(|m| m.base64.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedMap {
    #[serde(rename = "nameEn")]
    pub name: Option<String>,
    #[serde(rename = "sizeEn")]
    pub size: Option<String>,
    pub base64: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedVersion {
    pub code: Option<String>,
    pub log_ver: Option<i64>,
    pub raw_str: Option<String>,
    pub save_ver: Option<f64>,
    pub scenario_version: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParsedVictory {
    #[serde(rename = "typeEn")]
    pub victory_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedPlayer {
    pub slot: Option<i64>,
    pub index: Option<i64>,
    pub name: Option<String>,
    #[serde(rename = "typeEn")]
    pub player_type: Option<String>,
    pub team: Option<i64>,
    pub color_index: Option<i64>,
    pub init_position: Option<Vec<f64>>,
    pub disconnected: Option<bool>,
    pub is_winner: Option<bool>,
    #[serde(rename = "mainOp")]
    pub is_main_operator: Option<bool>,
    pub civilization: Option<ParsedCivilization>,
    pub feudal_time: Option<i64>,
    pub castle_time: Option<i64>,
    pub imperial_time: Option<i64>,
    #[serde(rename = "resigned")]
    pub resigned_time: Option<i64>,
}

impl ParsedPlayer {
    /// Starting coordinates, `(-1, -1)` when the parser had none.
    pub fn init_xy(&self) -> (f64, f64) {
        match self.init_position.as_deref() {
            Some([x, y, ..]) => (*x, *y),
            _ => (-1.0, -1.0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParsedChat {
    pub time: Option<i64>,
    pub msg: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedCivilization {
    pub id: Option<i64>,
    #[serde(rename = "nameEn")]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_minimal_parser_document() {
        let doc = serde_json::json!({
            "status": "perfect",
            "guid": "0123456789abcdef0123456789abcdef",
            "md5": "d41d8cd98f00b204e9800998ecf8427e",
            "fileext": ".mgx",
            "duration": 1_800_000,
            "gameTime": 1_685_613_600,
            "includeAI": false,
            "isMultiplayer": true,
            "matchup": "1v1",
            "map": {"nameEn": "Arabia", "sizeEn": "Tiny", "base64": "aGk="},
            "version": {"code": "AOC10", "logVer": 5},
            "victory": {"typeEn": "Conquest"},
            "players": [
                {"slot": 1, "name": "A", "isWinner": true, "mainOp": true,
                 "civilization": {"id": 8, "nameEn": "Huns"}},
                {"slot": 2, "name": "B", "isWinner": false, "mainOp": true,
                 "initPosition": [12.5, 40.0]}
            ],
            "chat": [{"time": 5000, "msg": "glhf"}],
            "parser": "TestParser 1.0"
        });
        let rec: ParsedRecord = serde_json::from_value(doc).unwrap();
        assert_eq!(rec.status, "perfect");
        assert!(!rec.is_unusable());
        assert_eq!(rec.version_code(), Some("AOC10"));
        assert_eq!(rec.map_base64(), Some("aGk="));
        let players = rec.players.as_ref().unwrap();
        assert_eq!(players[0].init_xy(), (-1.0, -1.0));
        assert_eq!(players[1].init_xy(), (12.5, 40.0));
    }

    #[test]
    fn error_and_invalid_are_unusable() {
        assert!(ParsedRecord::error("boom").is_unusable());
        let rec: ParsedRecord = serde_json::from_value(serde_json::json!({"status": "invalid"})).unwrap();
        assert!(rec.is_unusable());
    }
}
