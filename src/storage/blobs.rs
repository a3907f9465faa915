use anyhow::Result;

use super::schema::Database;

impl Database {
    // ========================================================================
    // Blob Operations
    // ========================================================================

    /// Load the blob stored under `key`, or `None` if nothing was saved yet.
    pub async fn load_blob(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_blobs WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Store `blob` under `key`, replacing any previous value (UPSERT).
    pub async fn save_blob(&self, key: &str, blob: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_blobs (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(blob)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::Database;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_load_missing_blob() {
        let db = test_db().await;
        assert_eq!(db.load_blob("nonexistent.key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_and_load_blob() {
        let db = test_db().await;
        db.save_blob("grocer.state", r#"{"list":[]}"#).await.unwrap();

        let value = db.load_blob("grocer.state").await.unwrap();
        assert_eq!(value.as_deref(), Some(r#"{"list":[]}"#));
    }

    #[tokio::test]
    async fn test_save_blob_upsert() {
        let db = test_db().await;
        db.save_blob("grocer.state", "first").await.unwrap();
        db.save_blob("grocer.state", "second").await.unwrap();

        assert_eq!(db.load_blob("grocer.state").await.unwrap().as_deref(), Some("second"));

        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM kv_blobs")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let db = test_db().await;
        db.save_blob("a", "1").await.unwrap();
        db.save_blob("b", "2").await.unwrap();
        assert_eq!(db.load_blob("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(db.load_blob("b").await.unwrap().as_deref(), Some("2"));
    }
}
