use std::fmt::{self, Display};

use derive_more::{From, Into};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::OffsetDateTime;

const RSS_TOKEN_LEN: usize = 32;

/// An opaque, unguessable identifier addressing a user's published RSS file.
#[derive(From, Into, Serialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RssToken(String);

impl RssToken {
    pub fn generate() -> Self {
        let token = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RSS_TOKEN_LEN)
            .map(char::from)
            .collect();

        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path of the published RSS file inside the bucket.
    pub fn object_path(&self) -> String {
        format!("u/{}/rss.xml", self.0)
    }
}

impl Display for RssToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "state", content = "token", rename_all = "snake_case")]
pub enum RssState {
    Disabled,
    Enabled(RssToken),
}

impl RssState {
    pub fn token(&self) -> Option<&RssToken> {
        match self {
            Self::Disabled => None,
            Self::Enabled(token) => Some(token),
        }
    }
}

#[derive(FromRow, Debug, Clone)]
pub(super) struct UserRow {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub rss_token: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Serialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub rss: RssState,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        // the schema ties `rss_enabled` to the presence of a token.
        let rss = match row.rss_token {
            Some(token) => RssState::Enabled(RssToken(token)),
            None => RssState::Disabled,
        };

        Self {
            id: row.id,
            display_name: row.display_name,
            email: row.email,
            rss,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "subscription_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Canceled,
    None,
}

#[derive(FromRow, Serialize, Debug, Clone)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub price: i64,
    pub max_feeds: i64,
    pub max_authors: i64,
    pub max_tags: i64,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A subscription joined with its plan.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: i64,
    pub user_id: String,
    pub status: SubscriptionStatus,
    pub start_date: OffsetDateTime,
    pub end_date: Option<OffsetDateTime>,
    pub is_active: bool,
    pub plan: Plan,
}

#[derive(FromRow, Serialize, Debug, Clone)]
pub struct Feed {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub data_source: String,
    pub filter_config: Json<serde_json::Value>,
    pub delivery_config: Json<serde_json::Value>,
    pub is_active: bool,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[sqlx(type_name = "logic_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicType {
    And,
    #[default]
    Or,
}

#[derive(FromRow, Serialize, Debug, Clone)]
pub struct FilterGroup {
    pub id: i64,
    pub feed_id: i64,
    pub name: String,
    pub logic_type: LogicType,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(FromRow, Serialize, Debug, Clone)]
pub struct TagFilter {
    pub id: i64,
    pub filter_group_id: i64,
    pub tag_name: String,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(FromRow, Serialize, Debug, Clone)]
pub struct AuthorFilter {
    pub id: i64,
    pub filter_group_id: i64,
    pub author_id: String,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(FromRow, Serialize, Debug, Clone)]
pub struct DateRangeFilter {
    pub id: i64,
    pub filter_group_id: i64,
    pub days_ago: i64,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(FromRow, Serialize, Debug, Clone)]
pub struct LikesCountFilter {
    pub id: i64,
    pub filter_group_id: i64,
    pub min_likes: i64,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(FromRow, Serialize, Debug, Clone)]
pub struct Program {
    pub id: i64,
    pub user_id: String,
    pub feed_id: i64,
    pub title: String,
    pub audio_url: String,

    /// In milliseconds.
    pub audio_duration: i64,
    pub image_url: Option<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "attempt_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum AttemptStatus {
    Success,
    Skipped,
    Failed,
}

#[derive(FromRow, Serialize, Debug, Clone)]
pub struct ProgramAttempt {
    pub id: i64,
    pub user_id: String,
    pub feed_id: i64,
    pub status: AttemptStatus,
    pub reason: Option<String>,
    pub post_count: i64,
    pub program_id: Option<i64>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
