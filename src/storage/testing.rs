//! Fixtures for tests that need a populated database.

use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use time::OffsetDateTime;

use super::entities::{Feed, Program, SubscriptionStatus, User};
use super::{NewFeedRow, NewProgramRow, Storage, Tx};

impl Storage {
    /// Opens a private in-memory database with the schema applied.
    pub async fn in_memory() -> Result<Self> {
        // every connection to `:memory:` is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true))
            .await
            .context("could not open an in-memory database")?;

        Self::from_pool(pool).await
    }

    pub async fn seed_user(&self, user_id: &str) -> Result<User> {
        let mut tx = self.begin().await?;
        let user = tx
            .upsert_user(user_id, &format!("{user_id} display name"), None)
            .await?;
        tx.commit().await?;

        Ok(user)
    }

    pub async fn seed_plan(&self, plan_id: &str, max_feeds: i64, max_authors: i64, max_tags: i64) -> Result<()> {
        sqlx::query(
            "INSERT
            INTO plans (id, name, price, max_feeds, max_authors, max_tags, created_at)
            VALUES (?1, ?1, 980, ?2, ?3, ?4, ?5)",
        )
        .bind(plan_id)
        .bind(max_feeds)
        .bind(max_authors)
        .bind(max_tags)
        .bind(OffsetDateTime::now_utc())
        .execute(&self.pool)
        .await
        .context("could not insert a plan")?;

        Ok(())
    }

    pub async fn seed_subscription(
        &self,
        user_id: &str,
        plan_id: &str,
        status: SubscriptionStatus,
    ) -> Result<()> {
        sqlx::query(
            "INSERT
            INTO subscriptions (user_id, plan_id, status, start_date, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, TRUE, ?4)",
        )
        .bind(user_id)
        .bind(plan_id)
        .bind(status)
        .bind(OffsetDateTime::now_utc())
        .execute(&self.pool)
        .await
        .context("could not insert a subscription")?;

        Ok(())
    }

    pub async fn seed_feed(&self, user_id: &str, name: &str) -> Result<Feed> {
        let empty = serde_json::json!({});
        let mut tx = self.begin().await?;
        let feed = tx
            .insert_feed(NewFeedRow {
                user_id,
                name,
                data_source: "qiita",
                filter_config: &empty,
                delivery_config: &empty,
            })
            .await?;
        tx.commit().await?;

        Ok(feed)
    }

    pub async fn seed_program(
        &self,
        user_id: &str,
        feed_id: i64,
        title: &str,
        created_at: OffsetDateTime,
    ) -> Result<Program> {
        let mut tx: Tx = self.begin().await?;
        let program = tx
            .insert_program(NewProgramRow {
                user_id,
                feed_id,
                title,
                audio_url: "https://cdn.example.com/audio.mp3",
                audio_duration: 180_000,
                image_url: None,
                created_at,
            })
            .await?;
        tx.commit().await?;

        Ok(program)
    }

    pub async fn count_rows(&self, table: &str) -> Result<i64> {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .context("could not count rows")
    }
}
