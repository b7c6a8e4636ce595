use sqlx::SqlitePool;

use crate::errors::AppError;

/// Read-through response cache over the `cache` table.
///
/// Expensive aggregates are stored as serialized JSON under a stable key and
/// purged wholesale at the end of every rating run.
#[derive(Clone)]
pub struct Cacher {
    pool: SqlitePool,
}

impl Cacher {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM cache WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO cache (key, value) VALUES (?, ?)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn purge(&self) -> Result<(), AppError> {
        sqlx::query("DELETE FROM cache").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_overwrite_purge() {
        let pool = crate::db::test_pool().await;
        let cacher = Cacher::new(pool);

        assert_eq!(cacher.get("k").await.unwrap(), None);
        cacher.set("k", "v1").await.unwrap();
        assert_eq!(cacher.get("k").await.unwrap().as_deref(), Some("v1"));
        cacher.set("k", "v2").await.unwrap();
        assert_eq!(cacher.get("k").await.unwrap().as_deref(), Some("v2"));

        cacher.purge().await.unwrap();
        assert_eq!(cacher.get("k").await.unwrap(), None);
    }
}
