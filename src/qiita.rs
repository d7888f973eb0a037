use anyhow::{anyhow, Context, Result};
use reqwest::Url;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};
use tracing::{debug, instrument};

use crate::feeds::FeedDetails;

pub const DEFAULT_PER_PAGE: u32 = 20;

static QUERY_DATE_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PostAuthor {
    pub id: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PostTag {
    pub name: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub url: String,
    pub likes_count: i64,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub user: PostAuthor,

    #[serde(default)]
    pub tags: Vec<PostTag>,
}

#[derive(Serialize, Debug, Clone)]
pub struct PostsPage {
    pub posts: Vec<Post>,

    /// The number of matching posts reported by the API, before filtering by likes.
    pub total_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindPosts {
    pub authors: Vec<String>,
    pub tags: Vec<String>,
    pub min_published_at: Option<Date>,
    pub min_likes: Option<i64>,
    pub page: u32,
    pub per_page: u32,
}

impl Default for FindPosts {
    fn default() -> Self {
        Self {
            authors: vec![],
            tags: vec![],
            min_published_at: None,
            min_likes: None,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|v| v == value) {
        values.push(value.to_owned());
    }
}

impl FindPosts {
    /// Builds the search a feed's filter groups describe.
    ///
    /// Authors and tags are merged across groups. The narrowest date range and the
    /// highest likes threshold win.
    pub fn from_feed(details: &FeedDetails, now: OffsetDateTime) -> Self {
        let mut find = Self::default();

        for group in &details.filter_groups {
            for filter in &group.author_filters {
                push_unique(&mut find.authors, &filter.author_id);
            }

            for filter in &group.tag_filters {
                push_unique(&mut find.tags, &filter.tag_name);
            }
        }

        find.min_published_at = details
            .filter_groups
            .iter()
            .flat_map(|group| &group.date_range_filters)
            .map(|filter| filter.days_ago)
            .min()
            .map(|days_ago| (now - Duration::days(days_ago)).date());

        find.min_likes = details
            .filter_groups
            .iter()
            .flat_map(|group| &group.likes_count_filters)
            .map(|filter| filter.min_likes)
            .max();

        find
    }

    /// Renders the Qiita search query, e.g. `user:a OR user:b tag:rust created:>=2024-01-01`.
    pub fn build_query(&self) -> Result<String> {
        let mut blocks = vec![];

        if !self.authors.is_empty() {
            blocks.push(or_block("user", &self.authors));
        }

        if !self.tags.is_empty() {
            blocks.push(or_block("tag", &self.tags));
        }

        if let Some(date) = self.min_published_at {
            let date = date
                .format(QUERY_DATE_FORMAT)
                .with_context(|| anyhow!("could not format the date {date}"))?;
            blocks.push(format!("created:>={date}"));
        }

        Ok(blocks.join(" "))
    }
}

fn or_block(qualifier: &str, values: &[String]) -> String {
    values
        .iter()
        .map(|value| format!("{qualifier}:{value}"))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[derive(Clone)]
pub struct QiitaClient {
    http: ClientWithMiddleware,
    base_url: Url,
    access_token: Option<String>,
}

impl QiitaClient {
    pub fn new(http: ClientWithMiddleware, base_url: Url, access_token: Option<String>) -> Self {
        Self {
            http,
            base_url,
            access_token,
        }
    }

    #[instrument(level = "DEBUG", skip(self))]
    pub async fn find_posts(&self, find: &FindPosts) -> Result<PostsPage> {
        let url = self
            .base_url
            .join("api/v2/items")
            .context("could not build the items URL")?;
        let query = find.build_query()?;
        debug!(%query, "Searching posts");

        let mut req = self.http.get(url.clone()).query(&[
            ("page", find.page.to_string()),
            ("per_page", find.per_page.to_string()),
            ("query", query),
        ]);

        if let Some(token) = &self.access_token {
            req = req.bearer_auth(token);
        }

        let response = req
            .send()
            .await
            .map_err(anyhow::Error::from)
            .and_then(|r| r.error_for_status().context("Qiita returned an error"))
            .with_context(|| anyhow!("could not fetch `{url}`"))?;

        let total_count = response
            .headers()
            .get("total-count")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());

        let mut posts: Vec<Post> = response
            .json()
            .await
            .context("could not parse the Qiita response")?;

        if let Some(min_likes) = find.min_likes {
            posts.retain(|post| post.likes_count >= min_likes);
        }

        Ok(PostsPage { posts, total_count })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use serde_json::json;
    use sqlx::types::Json;
    use time::macros::{date, datetime};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::feeds::FilterGroupDetails;
    use crate::storage::entities::{
        AuthorFilter, DateRangeFilter, Feed, FilterGroup, LikesCountFilter, LogicType, TagFilter,
    };

    const NOW: OffsetDateTime = datetime!(2024-03-31 12:00 UTC);

    fn group(
        tags: &[&str],
        authors: &[&str],
        days_ago: Option<i64>,
        min_likes: Option<i64>,
    ) -> FilterGroupDetails {
        FilterGroupDetails {
            group: FilterGroup {
                id: 1,
                feed_id: 1,
                name: "group".into(),
                logic_type: LogicType::Or,
                created_at: NOW,
                updated_at: NOW,
            },
            tag_filters: tags
                .iter()
                .map(|tag| TagFilter {
                    id: 1,
                    filter_group_id: 1,
                    tag_name: tag.to_string(),
                    created_at: NOW,
                })
                .collect(),
            author_filters: authors
                .iter()
                .map(|author| AuthorFilter {
                    id: 1,
                    filter_group_id: 1,
                    author_id: author.to_string(),
                    created_at: NOW,
                })
                .collect(),
            date_range_filters: days_ago
                .into_iter()
                .map(|days_ago| DateRangeFilter {
                    id: 1,
                    filter_group_id: 1,
                    days_ago,
                    created_at: NOW,
                })
                .collect(),
            likes_count_filters: min_likes
                .into_iter()
                .map(|min_likes| LikesCountFilter {
                    id: 1,
                    filter_group_id: 1,
                    min_likes,
                    created_at: NOW,
                })
                .collect(),
        }
    }

    fn details(filter_groups: Vec<FilterGroupDetails>) -> FeedDetails {
        FeedDetails {
            feed: Feed {
                id: 1,
                user_id: "user_1".into(),
                name: "Rust".into(),
                data_source: "qiita".into(),
                filter_config: Json(json!({})),
                delivery_config: Json(json!({})),
                is_active: true,
                created_at: NOW,
                updated_at: NOW,
            },
            filter_groups,
        }
    }

    #[test]
    fn query_joins_blocks() {
        let find = FindPosts {
            authors: vec!["alice".into(), "bob".into()],
            tags: vec!["rust".into(), "tokio".into()],
            min_published_at: Some(date!(2024 - 03 - 01)),
            ..Default::default()
        };

        assert_eq!(
            find.build_query().unwrap(),
            "user:alice OR user:bob tag:rust OR tag:tokio created:>=2024-03-01"
        );
        assert_eq!(FindPosts::default().build_query().unwrap(), "");
    }

    #[test]
    fn search_from_feed_filters() {
        let feed = details(vec![
            group(&["rust", "tokio"], &["alice"], Some(30), Some(5)),
            group(&["rust"], &["bob"], Some(7), Some(10)),
        ]);

        let find = FindPosts::from_feed(&feed, NOW);

        assert_eq!(find.authors, ["alice", "bob"]);
        assert_eq!(find.tags, ["rust", "tokio"]);
        assert_eq!(find.min_published_at, Some(date!(2024 - 03 - 24)));
        assert_eq!(find.min_likes, Some(10));
    }

    #[test]
    fn search_without_filters() {
        let find = FindPosts::from_feed(&details(vec![group(&[], &[], None, None)]), NOW);

        assert_eq!(find, FindPosts::default());
    }

    #[tokio::test]
    async fn fetches_and_filters_posts() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v2/items"))
            .and(query_param("query", "tag:rust created:>=2024-03-24"))
            .and(query_param("page", "1"))
            .and(query_param("per_page", "20"))
            .and(header("authorization", "Bearer qiita-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Total-Count", "2")
                    .set_body_json(json!([
                        {
                            "id": "a1",
                            "title": "Async Rust",
                            "url": "https://qiita.com/alice/items/a1",
                            "likes_count": 12,
                            "created_at": "2024-03-30T10:00:00+09:00",
                            "user": { "id": "alice", "name": "Alice" },
                            "tags": [{ "name": "rust", "versions": [] }]
                        },
                        {
                            "id": "b2",
                            "title": "Hello",
                            "url": "https://qiita.com/bob/items/b2",
                            "likes_count": 1,
                            "created_at": "2024-03-29T10:00:00+09:00",
                            "user": { "id": "bob" },
                            "tags": []
                        }
                    ])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = QiitaClient::new(
            crate::http::cached_client(StdDuration::from_secs(5), None).unwrap(),
            server.uri().parse().unwrap(),
            Some("qiita-token".into()),
        );
        let find = FindPosts {
            tags: vec!["rust".into()],
            min_published_at: Some(date!(2024 - 03 - 24)),
            min_likes: Some(10),
            ..Default::default()
        };

        let page = client.find_posts(&find).await.unwrap();

        assert_eq!(page.total_count, Some(2));
        assert_eq!(page.posts.len(), 1);
        assert_eq!(page.posts[0].id, "a1");
        assert_eq!(page.posts[0].user.id, "alice");
        assert_eq!(page.posts[0].tags, [PostTag { name: "rust".into() }]);
    }

    #[tokio::test]
    async fn api_errors_are_reported() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = QiitaClient::new(
            crate::http::cached_client(StdDuration::from_secs(5), None).unwrap(),
            server.uri().parse().unwrap(),
            None,
        );

        assert!(client.find_posts(&FindPosts::default()).await.is_err());
    }
}
