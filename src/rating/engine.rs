use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use sqlx::prelude::FromRow;

use crate::db::rating::read::partition_of;
use crate::db::rating::replace::{RatingUpsert, replace_all, update_rating_changes};
use crate::errors::AppError;

const SEED_RATING: i64 = 1600;
const CHANGE_FLUSH_INTERVAL: usize = 10_000;

/// Running aggregate of one name within one partition.
#[derive(Debug, Clone)]
struct PlayerRecord {
    name: String,
    rating: i64,
    total: i64,
    wins: i64,
    lowest: i64,
    highest: i64,
    streak: i64,
    streak_max: i64,
    first_played: NaiveDateTime,
    last_played: NaiveDateTime,
    player_id: i64,
}

impl PlayerRecord {
    fn new(name: String, game_time: NaiveDateTime, player_id: i64) -> Self {
        Self {
            name,
            rating: SEED_RATING,
            total: 0,
            wins: 0,
            lowest: SEED_RATING,
            highest: SEED_RATING,
            streak: 0,
            streak_max: 0,
            first_played: game_time,
            last_played: game_time,
            player_id,
        }
    }
}

#[derive(Debug, FromRow)]
struct RatingSourceRow {
    game_guid: String,
    version_code: Option<String>,
    matchup: Option<String>,
    name_hash: Option<String>,
    name: Option<String>,
    is_winner: Option<bool>,
    game_time: Option<NaiveDateTime>,
    player_id: i64,
}

/// Chronological ELO pass over the whole corpus.
///
/// Rows arrive ordered by (game_time, game_guid, is_winner) with winners
/// last, so a game is complete when the guid changes. Ratings never cross a
/// (version_code, partition) boundary.
pub struct EloEngine {
    pool: SqlitePool,
    k: f64,
    /// (version_code, partition) → name_hash → record
    cache: HashMap<(String, &'static str), HashMap<String, PlayerRecord>>,
    current_game: Option<String>,
    current_key: Option<(String, &'static str)>,
    winners: Vec<String>,
    losers: Vec<String>,
    change_buffer: Vec<(i64, i64)>,
    processed_games: usize,
}

fn expected_score(rating_a: f64, rating_b: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((rating_b - rating_a) / 400.0))
}

fn mean_rating(col: &HashMap<String, PlayerRecord>, hashes: &[String]) -> f64 {
    let sum: i64 = hashes.iter().filter_map(|h| col.get(h)).map(|p| p.rating).sum();
    sum as f64 / hashes.len() as f64
}

/// Per-game deltas: `Δ_w = round(K·(1−E_l))`, `Δ_l = round(K·(0−E_w))`,
/// positive for winners, negative for losers, always summing to zero.
fn compute_deltas(k: f64, mean_winner: f64, mean_loser: f64) -> (i64, i64) {
    let e_winner = expected_score(mean_winner, mean_loser);
    let e_loser = expected_score(mean_loser, mean_winner);
    let delta_winner = (k * (1.0 - e_loser)).round() as i64;
    let delta_loser = (k * (0.0 - e_winner)).round() as i64;
    (delta_winner, delta_loser)
}

impl EloEngine {
    pub fn new(pool: SqlitePool, k: i64) -> Self {
        Self {
            pool,
            k: k as f64,
            cache: HashMap::new(),
            current_game: None,
            current_key: None,
            winners: Vec::new(),
            losers: Vec::new(),
            change_buffer: Vec::new(),
            processed_games: 0,
        }
    }

    fn settle_current_game(&mut self) {
        let Some(key) = self.current_key.clone() else {
            return;
        };
        let guid = self.current_game.clone().unwrap_or_default();

        let unique_winners: HashSet<&String> = self.winners.iter().collect();
        let unique_losers: HashSet<&String> = self.losers.iter().collect();
        if unique_winners.len() != self.winners.len() || unique_losers.len() != self.losers.len() {
            tracing::debug!("Duplicate name_hash detected in {}", guid);
        } else if self.winners.is_empty() || self.losers.is_empty() {
            tracing::debug!("Empty winners or losers in {}", guid);
        } else if let Some(col) = self.cache.get_mut(&key) {
            let mean_winner = mean_rating(col, &self.winners);
            let mean_loser = mean_rating(col, &self.losers);

            // A historical guard aborted the whole run outside [500, 4000];
            // corrupt corners of the corpus should not kill a batch job.
            if !(500.0..=4000.0).contains(&mean_winner) || !(500.0..=4000.0).contains(&mean_loser) {
                tracing::warn!(
                    "Implausible mean ratings in {}: winners {:.0}, losers {:.0}",
                    guid,
                    mean_winner,
                    mean_loser
                );
            }

            let (delta_winner, delta_loser) = compute_deltas(self.k, mean_winner, mean_loser);

            for hash in &self.winners {
                if let Some(p) = col.get_mut(hash) {
                    p.rating += delta_winner;
                    p.total += 1;
                    p.wins += 1;
                    p.highest = p.highest.max(p.rating);
                    p.streak += 1;
                    p.streak_max = p.streak_max.max(p.streak);
                    self.change_buffer.push((p.player_id, delta_winner));
                }
            }
            for hash in &self.losers {
                if let Some(p) = col.get_mut(hash) {
                    p.rating += delta_loser;
                    p.total += 1;
                    p.lowest = p.lowest.min(p.rating);
                    p.streak = 0;
                    self.change_buffer.push((p.player_id, delta_loser));
                }
            }
        }

        self.winners.clear();
        self.losers.clear();
    }

    async fn flush_changes(&mut self) -> Result<(), AppError> {
        update_rating_changes(&self.pool, &self.change_buffer).await?;
        self.change_buffer.clear();
        Ok(())
    }

    fn observe(&mut self, row: RatingSourceRow) {
        let Some(name_hash) = row.name_hash else {
            return;
        };
        let Some(game_time) = row.game_time else {
            return;
        };
        let version = row.version_code.unwrap_or_default();
        let partition = partition_of(row.matchup.as_deref().unwrap_or(""));

        let key = (version, partition);
        let col = self.cache.entry(key.clone()).or_default();
        let record = col
            .entry(name_hash.clone())
            .or_insert_with(|| {
                PlayerRecord::new(row.name.unwrap_or_default(), game_time, row.player_id)
            });
        record.last_played = game_time;
        // The same name has a fresh players-row id in every game.
        record.player_id = row.player_id;

        self.current_key = Some(key);
        if row.is_winner.unwrap_or(false) {
            self.winners.push(name_hash);
        } else {
            self.losers.push(name_hash);
        }
    }

    /// Run the full pass and replace the ratings table.
    pub async fn update_ratings(
        &mut self,
        duration_threshold: i64,
        batch_size: i64,
    ) -> Result<(), AppError> {
        let batch_size = batch_size.max(1);
        let mut offset: i64 = 0;

        loop {
            let rows = sqlx::query_as::<_, RatingSourceRow>(
                "SELECT p.game_guid, g.version_code, g.matchup, p.name_hash, p.name,
                        p.is_winner, g.game_time, p.id AS player_id
                 FROM players p JOIN games g ON p.game_guid = g.game_guid
                 WHERE g.duration > ? AND g.is_multiplayer = 1
                   AND g.include_ai = 0 AND p.is_main_operator = 1
                 ORDER BY g.game_time, p.game_guid, p.is_winner
                 LIMIT ? OFFSET ?",
            )
            .bind(duration_threshold)
            .bind(batch_size)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
            if rows.is_empty() {
                break;
            }
            offset += rows.len() as i64;

            for row in rows {
                if self.current_game.as_deref() != Some(row.game_guid.as_str()) {
                    if self.current_game.is_some() {
                        self.settle_current_game();
                        self.processed_games += 1;
                        if self.processed_games % CHANGE_FLUSH_INTERVAL == 0 {
                            self.flush_changes().await?;
                        }
                    }
                    self.current_game = Some(row.game_guid.clone());
                }
                self.observe(row);
            }
        }

        if self.current_game.is_some() {
            self.settle_current_game();
            self.processed_games += 1;
        }
        self.flush_changes().await?;

        let rows = self.collect_rows();
        replace_all(&self.pool, &rows).await?;
        tracing::info!("Rating pass finished: {} games settled", self.processed_games);
        Ok(())
    }

    fn collect_rows(&self) -> Vec<RatingUpsert> {
        let mut rows = Vec::new();
        for ((version_code, matchup), col) in &self.cache {
            for (name_hash, p) in col {
                rows.push(RatingUpsert {
                    name: p.name.clone(),
                    name_hash: name_hash.clone(),
                    version_code: version_code.clone(),
                    matchup: (*matchup).to_string(),
                    rating: p.rating,
                    wins: p.wins,
                    total: p.total,
                    streak: p.streak,
                    streak_max: p.streak_max,
                    highest: p.highest,
                    lowest: p.lowest,
                    first_played: p.first_played,
                    last_played: p.last_played,
                });
            }
        }
        rows
    }

    pub fn games_settled(&self) -> usize {
        self.processed_games
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_match_splits_k() {
        assert_eq!(compute_deltas(32.0, 1600.0, 1600.0), (16, -16));
    }

    #[test]
    fn team_game_deltas_match_expected_scores() {
        // Winners averaging 1700 over losers averaging 1500:
        // E_w = 1/(1+10^(-0.5)) ≈ 0.7597, so both sides move by 24.
        assert_eq!(compute_deltas(32.0, 1700.0, 1500.0), (24, -24));
        assert_eq!(compute_deltas(32.0, 1500.0, 1700.0), (8, -8));
    }

    #[test]
    fn deltas_are_symmetric() {
        for (w, l) in [(1600.0, 1600.0), (1820.0, 1410.0), (950.0, 2100.0)] {
            let (dw, dl) = compute_deltas(32.0, w, l);
            assert_eq!(dw + dl, 0, "asymmetric deltas for {w}/{l}");
        }
    }
}
