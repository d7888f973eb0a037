use anyhow::{Context, Result};
use sqlx::FromRow;
use time::OffsetDateTime;
use tracing::instrument;

use super::entities::{Plan, Subscription, SubscriptionStatus};
use super::Tx;

#[derive(FromRow)]
struct SubscriptionRow {
    id: i64,
    user_id: String,
    status: SubscriptionStatus,
    start_date: OffsetDateTime,
    end_date: Option<OffsetDateTime>,
    is_active: bool,
    plan_id: String,
    plan_name: String,
    plan_price: i64,
    plan_max_feeds: i64,
    plan_max_authors: i64,
    plan_max_tags: i64,
    plan_created_at: OffsetDateTime,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            status: row.status,
            start_date: row.start_date,
            end_date: row.end_date,
            is_active: row.is_active,
            plan: Plan {
                id: row.plan_id,
                name: row.plan_name,
                price: row.plan_price,
                max_feeds: row.plan_max_feeds,
                max_authors: row.plan_max_authors,
                max_tags: row.plan_max_tags,
                created_at: row.plan_created_at,
            },
        }
    }
}

impl Tx {
    /// Returns the user's most recent subscription that has not been deactivated.
    ///
    /// The subscription's status is not inspected: an expired subscription is still returned.
    #[instrument(level = "TRACE", skip(self))]
    pub async fn current_subscription(&mut self, user_id: &str) -> Result<Option<Subscription>> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            "SELECT
              s.id AS id,
              s.user_id AS user_id,
              s.status AS status,
              s.start_date AS start_date,
              s.end_date AS end_date,
              s.is_active AS is_active,
              p.id AS plan_id,
              p.name AS plan_name,
              p.price AS plan_price,
              p.max_feeds AS plan_max_feeds,
              p.max_authors AS plan_max_authors,
              p.max_tags AS plan_max_tags,
              p.created_at AS plan_created_at
            FROM subscriptions s
              INNER JOIN plans p ON (s.plan_id = p.id)
            WHERE s.user_id = ?1 AND s.is_active
            ORDER BY s.start_date DESC, s.id DESC
            LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(self.0.as_mut())
        .await
        .context("could not retrieve the current subscription")?;

        Ok(row.map(Into::into))
    }

    #[instrument(level = "TRACE", skip(self))]
    pub async fn get_plans(&mut self) -> Result<Vec<Plan>> {
        sqlx::query_as(
            "SELECT id, name, price, max_feeds, max_authors, max_tags, created_at
            FROM plans
            ORDER BY price ASC, id ASC",
        )
        .fetch_all(self.0.as_mut())
        .await
        .context("could not retrieve the plan list")
    }
}
