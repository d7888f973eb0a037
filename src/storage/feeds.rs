use anyhow::{anyhow, Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::{Encode, FromRow, Sqlite, Type};
use time::OffsetDateTime;
use tracing::{debug, instrument, trace_span, Instrument};

use super::entities::{Feed, FilterGroup, LogicType};
use super::Tx;

const FEED_COLUMNS: &str = "id, user_id, name, data_source, filter_config, delivery_config, \
    is_active, created_at, updated_at";
const FILTER_GROUP_COLUMNS: &str = "id, feed_id, name, logic_type, created_at, updated_at";

/// A child filter table scoped to a filter group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterTable {
    Tags,
    Authors,
    DateRanges,
    LikesCounts,
}

impl FilterTable {
    fn table(self) -> &'static str {
        match self {
            Self::Tags => "tag_filters",
            Self::Authors => "author_filters",
            Self::DateRanges => "date_range_filters",
            Self::LikesCounts => "likes_count_filters",
        }
    }

    fn value_column(self) -> &'static str {
        match self {
            Self::Tags => "tag_name",
            Self::Authors => "author_id",
            Self::DateRanges => "days_ago",
            Self::LikesCounts => "min_likes",
        }
    }
}

pub struct NewFeedRow<'a> {
    pub user_id: &'a str,
    pub name: &'a str,
    pub data_source: &'a str,
    pub filter_config: &'a serde_json::Value,
    pub delivery_config: &'a serde_json::Value,
}

#[derive(Default)]
pub struct FeedRowPatch<'a> {
    pub name: Option<&'a str>,
    pub data_source: Option<&'a str>,
    pub filter_config: Option<&'a serde_json::Value>,
    pub delivery_config: Option<&'a serde_json::Value>,
}

impl Tx {
    /// Counts the user's active feeds, leaving out `excluding` if given.
    #[instrument(level = "TRACE", skip(self))]
    pub async fn count_active_feeds(&mut self, user_id: &str, excluding: Option<i64>) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*)
            FROM feeds
            WHERE user_id = ?1 AND is_active AND (?2 IS NULL OR id != ?2)",
        )
        .bind(user_id)
        .bind(excluding)
        .fetch_one(self.0.as_mut())
        .await
        .context("could not count active feeds")
    }

    #[instrument(level = "TRACE", skip(self, feed), fields(user_id = feed.user_id))]
    pub async fn insert_feed(&mut self, feed: NewFeedRow<'_>) -> Result<Feed> {
        let now = OffsetDateTime::now_utc();

        sqlx::query_as(&format!(
            "INSERT
            INTO feeds (
              user_id,
              name,
              data_source,
              filter_config,
              delivery_config,
              is_active,
              created_at,
              updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, TRUE, ?6, ?6)
            RETURNING {FEED_COLUMNS}"
        ))
        .bind(feed.user_id)
        .bind(feed.name)
        .bind(feed.data_source)
        .bind(Json(feed.filter_config))
        .bind(Json(feed.delivery_config))
        .bind(now)
        .fetch_one(self.0.as_mut())
        .await
        .context("could not insert a feed")
    }

    #[instrument(level = "TRACE", skip(self))]
    pub async fn find_feed(&mut self, feed_id: i64) -> Result<Option<Feed>> {
        sqlx::query_as(&format!(
            "SELECT {FEED_COLUMNS}
            FROM feeds
            WHERE id = ?1"
        ))
        .bind(feed_id)
        .fetch_optional(self.0.as_mut())
        .await
        .context("could not retrieve a feed")
    }

    /// Looks up a feed that is active and belongs to `user_id`.
    ///
    /// Feeds owned by other users are reported as missing.
    pub async fn find_owned_feed(&mut self, user_id: &str, feed_id: i64) -> Result<Option<Feed>> {
        Ok(self
            .find_feed(feed_id)
            .await?
            .filter(|feed| feed.is_active && feed.user_id == user_id))
    }

    #[instrument(level = "TRACE", skip(self))]
    pub async fn get_active_feeds(&mut self, user_id: &str) -> Result<Vec<Feed>> {
        sqlx::query_as(&format!(
            "SELECT {FEED_COLUMNS}
            FROM feeds
            WHERE user_id = ?1 AND is_active
            ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(self.0.as_mut())
        .await
        .context("could not retrieve the feed list")
    }

    /// Overwrites the scalar fields present in `patch`.
    #[instrument(level = "TRACE", skip(self, patch))]
    pub async fn update_feed(&mut self, feed_id: i64, patch: FeedRowPatch<'_>) -> Result<Feed> {
        sqlx::query_as(&format!(
            "UPDATE feeds
            SET
              name = COALESCE(?2, name),
              data_source = COALESCE(?3, data_source),
              filter_config = COALESCE(?4, filter_config),
              delivery_config = COALESCE(?5, delivery_config),
              updated_at = ?6
            WHERE id = ?1
            RETURNING {FEED_COLUMNS}"
        ))
        .bind(feed_id)
        .bind(patch.name)
        .bind(patch.data_source)
        .bind(patch.filter_config.map(Json))
        .bind(patch.delivery_config.map(Json))
        .bind(OffsetDateTime::now_utc())
        .fetch_one(self.0.as_mut())
        .await
        .context("could not update a feed")
    }

    /// Deactivates an active feed owned by `user_id`.
    ///
    /// Returns `false` if there was no such feed.
    #[instrument(level = "TRACE", skip(self))]
    pub async fn soft_delete_feed(&mut self, user_id: &str, feed_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE feeds
            SET is_active = FALSE, updated_at = ?3
            WHERE id = ?1 AND user_id = ?2 AND is_active",
        )
        .bind(feed_id)
        .bind(user_id)
        .bind(OffsetDateTime::now_utc())
        .execute(self.0.as_mut())
        .await
        .context("could not deactivate a feed")?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(level = "TRACE", skip(self))]
    pub async fn insert_filter_group(
        &mut self,
        feed_id: i64,
        name: &str,
        logic_type: LogicType,
    ) -> Result<FilterGroup> {
        sqlx::query_as(&format!(
            "INSERT
            INTO filter_groups (feed_id, name, logic_type, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            RETURNING {FILTER_GROUP_COLUMNS}"
        ))
        .bind(feed_id)
        .bind(name)
        .bind(logic_type)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(self.0.as_mut())
        .await
        .context("could not insert a filter group")
    }

    #[instrument(level = "TRACE", skip(self))]
    pub async fn update_filter_group(
        &mut self,
        group_id: i64,
        name: Option<&str>,
        logic_type: Option<LogicType>,
    ) -> Result<FilterGroup> {
        sqlx::query_as(&format!(
            "UPDATE filter_groups
            SET
              name = COALESCE(?2, name),
              logic_type = COALESCE(?3, logic_type),
              updated_at = ?4
            WHERE id = ?1
            RETURNING {FILTER_GROUP_COLUMNS}"
        ))
        .bind(group_id)
        .bind(name)
        .bind(logic_type)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(self.0.as_mut())
        .await
        .context("could not update a filter group")
    }

    #[instrument(level = "TRACE", skip(self))]
    pub async fn get_filter_groups(&mut self, feed_id: i64) -> Result<Vec<FilterGroup>> {
        sqlx::query_as(&format!(
            "SELECT {FILTER_GROUP_COLUMNS}
            FROM filter_groups
            WHERE feed_id = ?1
            ORDER BY id ASC"
        ))
        .bind(feed_id)
        .fetch_all(self.0.as_mut())
        .await
        .context("could not retrieve filter groups")
    }

    #[instrument(level = "TRACE", skip(self, values), fields(count = values.len()))]
    pub async fn insert_filters<T, V>(
        &mut self,
        table: FilterTable,
        group_id: i64,
        values: Vec<V>,
    ) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
        V: for<'q> Encode<'q, Sqlite> + Type<Sqlite> + Send + 'static,
    {
        let (name, column) = (table.table(), table.value_column());
        let sql = format!(
            "INSERT
            INTO {name} (filter_group_id, {column}, created_at)
            VALUES (?1, ?2, ?3)
            RETURNING id, filter_group_id, {column}, created_at"
        );
        let now = OffsetDateTime::now_utc();
        let mut result = Vec::with_capacity(values.len());

        for (idx, value) in values.into_iter().enumerate() {
            let row = sqlx::query_as(&sql)
                .bind(group_id)
                .bind(value)
                .bind(now)
                .fetch_one(self.0.as_mut())
                .instrument(trace_span!("insert_filter", %idx))
                .await
                .with_context(|| anyhow!("could not insert into `{name}`"))?;
            result.push(row);
        }

        Ok(result)
    }

    #[instrument(level = "TRACE", skip(self))]
    pub async fn delete_filters(&mut self, table: FilterTable, group_id: i64) -> Result<u64> {
        let name = table.table();
        let result = sqlx::query(&format!("DELETE FROM {name} WHERE filter_group_id = ?1"))
            .bind(group_id)
            .execute(self.0.as_mut())
            .await
            .with_context(|| anyhow!("could not delete from `{name}`"))?;
        debug!(deleted = result.rows_affected(), "Cleared {name}");

        Ok(result.rows_affected())
    }

    #[instrument(level = "TRACE", skip(self))]
    pub async fn get_filters<T>(&mut self, table: FilterTable, group_id: i64) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let (name, column) = (table.table(), table.value_column());

        sqlx::query_as(&format!(
            "SELECT id, filter_group_id, {column}, created_at
            FROM {name}
            WHERE filter_group_id = ?1
            ORDER BY id ASC"
        ))
        .bind(group_id)
        .fetch_all(self.0.as_mut())
        .await
        .with_context(|| anyhow!("could not retrieve rows from `{name}`"))
    }
}
