use sqlx::SqlitePool;

use crate::errors::AppError;

/// Delete a game and everything it owns in one transaction.
///
/// Children first so foreign keys hold: chats, files, players, legacy rows,
/// then the game row itself.
pub async fn delete_game(pool: &SqlitePool, guid: &str) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM games WHERE game_guid = ?")
        .bind(guid)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound(format!("Game [{guid}] not found")));
    }

    for table in ["chats", "files", "players", "legacy_info"] {
        sqlx::query(&format!("DELETE FROM {table} WHERE game_guid = ?"))
            .bind(guid)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("DELETE FROM games WHERE game_guid = ?")
        .bind(guid)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    tracing::warn!("Game deleted: {}", guid);
    Ok(())
}

/// Set the visibility level of a game (0 public, 1 private, 2 unlisted).
pub async fn set_visibility(pool: &SqlitePool, guid: &str, level: i64) -> Result<(), AppError> {
    if !(0..=2).contains(&level) {
        return Err(AppError::BadRequest(format!("bad visibility level: {level}")));
    }
    let result = sqlx::query(
        "UPDATE games SET visibility = ?, modified = CURRENT_TIMESTAMP WHERE game_guid = ?",
    )
    .bind(level)
    .bind(guid)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Game [{guid}] not found")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::game::add_game;

    const GUID: &str = "abcdefabcdefabcdefabcdefabcdef99";

    fn record() -> crate::models::record::ParsedRecord {
        serde_json::from_value(serde_json::json!({
            "status": "perfect",
            "guid": GUID,
            "md5": "99990000999900009999000099990000",
            "duration": 1_800_000,
            "players": [
                {"slot": 1, "name": "A", "isWinner": true, "mainOp": true},
                {"slot": 2, "name": "B", "isWinner": false, "mainOp": true}
            ],
            "chat": [{"time": 1, "msg": "hi"}]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn delete_cascades_all_owned_rows() {
        let pool = crate::db::test_pool().await;
        add_game(&pool, &record(), None, "t").await.unwrap();

        delete_game(&pool, GUID).await.unwrap();

        for table in ["games", "players", "files", "chats"] {
            let count: i64 =
                sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table} WHERE game_guid = ?"))
                    .bind(GUID)
                    .fetch_one(&pool)
                    .await
                    .unwrap();
            assert_eq!(count, 0, "{table} not emptied");
        }
    }

    #[tokio::test]
    async fn deleting_a_missing_game_is_not_found() {
        let pool = crate::db::test_pool().await;
        let err = delete_game(&pool, GUID).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn visibility_update() {
        let pool = crate::db::test_pool().await;
        add_game(&pool, &record(), None, "t").await.unwrap();
        set_visibility(&pool, GUID, 2).await.unwrap();
        let level: i64 = sqlx::query_scalar("SELECT visibility FROM games WHERE game_guid = ?")
            .bind(GUID)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(level, 2);
        assert!(set_visibility(&pool, GUID, 9).await.is_err());
    }
}
