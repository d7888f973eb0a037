use anyhow::{Context, Result};
use time::OffsetDateTime;
use tracing::instrument;

use super::entities::{RssToken, User, UserRow};
use super::Tx;

const USER_COLUMNS: &str = "id, display_name, email, rss_token, created_at, updated_at";

impl Tx {
    #[instrument(level = "TRACE", skip(self))]
    pub async fn upsert_user(
        &mut self,
        user_id: &str,
        display_name: &str,
        email: Option<&str>,
    ) -> Result<User> {
        let now = OffsetDateTime::now_utc();
        let row: UserRow = sqlx::query_as(&format!(
            "INSERT
            INTO users (id, display_name, email, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ON CONFLICT (id) DO UPDATE SET
              display_name = excluded.display_name,
              email = excluded.email,
              updated_at = excluded.updated_at
            RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(display_name)
        .bind(email)
        .bind(now)
        .fetch_one(self.0.as_mut())
        .await
        .context("could not upsert a user")?;

        Ok(row.into())
    }

    #[instrument(level = "TRACE", skip(self))]
    pub async fn find_user(&mut self, user_id: &str) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS}
            FROM users
            WHERE id = ?1"
        ))
        .bind(user_id)
        .fetch_optional(self.0.as_mut())
        .await
        .context("could not retrieve a user")?;

        Ok(row.map(Into::into))
    }

    /// Stores a new RSS token, or clears it when `token` is `None`.
    ///
    /// The `rss_enabled` flag always follows the presence of the token.
    #[instrument(level = "TRACE", skip(self, token))]
    pub async fn set_rss_token(&mut self, user_id: &str, token: Option<&RssToken>) -> Result<User> {
        let row: UserRow = sqlx::query_as(&format!(
            "UPDATE users
            SET rss_token = ?2, rss_enabled = ?3, updated_at = ?4
            WHERE id = ?1
            RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(token.map(RssToken::as_str))
        .bind(token.is_some())
        .bind(OffsetDateTime::now_utc())
        .fetch_one(self.0.as_mut())
        .await
        .context("could not update the RSS token")?;

        Ok(row.into())
    }
}
