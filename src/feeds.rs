use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::{Error, Result};
use crate::limits::{self, CandidateFeed, CandidateGroup};
use crate::notify::Notifier;
use crate::storage::entities::{
    AuthorFilter, DateRangeFilter, Feed, FilterGroup, LikesCountFilter, LogicType, TagFilter,
};
use crate::storage::{FeedRowPatch, FilterTable, NewFeedRow, Storage, Tx};

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

#[derive(Deserialize, Debug, Clone)]
pub struct TagFilterInput {
    pub tag_name: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AuthorFilterInput {
    pub author_id: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DateRangeFilterInput {
    pub days_ago: i64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LikesCountFilterInput {
    pub min_likes: i64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct NewFeed {
    pub name: String,
    pub data_source: String,

    #[serde(default = "empty_object")]
    pub filter_config: serde_json::Value,

    #[serde(default = "empty_object")]
    pub delivery_config: serde_json::Value,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct FeedPatch {
    pub name: Option<String>,
    pub data_source: Option<String>,
    pub filter_config: Option<serde_json::Value>,
    pub delivery_config: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct FilterGroupSpec {
    pub name: String,

    #[serde(default)]
    pub logic_type: LogicType,

    #[serde(default)]
    pub tag_filters: Vec<TagFilterInput>,

    #[serde(default)]
    pub author_filters: Vec<AuthorFilterInput>,

    #[serde(default)]
    pub date_range_filters: Vec<DateRangeFilterInput>,

    #[serde(default)]
    pub likes_count_filters: Vec<LikesCountFilterInput>,
}

/// Changes to a filter group.
///
/// A child collection set to `None` is left untouched; `Some` replaces it entirely.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct FilterGroupPatch {
    pub name: Option<String>,
    pub logic_type: Option<LogicType>,
    pub tag_filters: Option<Vec<TagFilterInput>>,
    pub author_filters: Option<Vec<AuthorFilterInput>>,
    pub date_range_filters: Option<Vec<DateRangeFilterInput>>,
    pub likes_count_filters: Option<Vec<LikesCountFilterInput>>,
}

impl From<FilterGroupSpec> for FilterGroupPatch {
    fn from(spec: FilterGroupSpec) -> Self {
        Self {
            name: Some(spec.name),
            logic_type: Some(spec.logic_type),
            tag_filters: Some(spec.tag_filters),
            author_filters: Some(spec.author_filters),
            date_range_filters: Some(spec.date_range_filters),
            likes_count_filters: Some(spec.likes_count_filters),
        }
    }
}

impl FilterGroupPatch {
    fn validate(&self) -> Result<()> {
        if self.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(Error::validation("the filter group name must not be empty"));
        }

        if let Some(filters) = &self.date_range_filters {
            if filters.len() > 1 {
                return Err(Error::validation(
                    "a filter group can have at most one date range filter",
                ));
            }

            if filters.iter().any(|filter| filter.days_ago < 0) {
                return Err(Error::validation("`days_ago` must not be negative"));
            }
        }

        if let Some(filters) = &self.tag_filters {
            if filters.iter().any(|filter| filter.tag_name.trim().is_empty()) {
                return Err(Error::validation("tag names must not be empty"));
            }
        }

        if let Some(filters) = &self.author_filters {
            if filters.iter().any(|filter| filter.author_id.trim().is_empty()) {
                return Err(Error::validation("author ids must not be empty"));
            }
        }

        if let Some(filters) = &self.likes_count_filters {
            if filters.iter().any(|filter| filter.min_likes < 0) {
                return Err(Error::validation("`min_likes` must not be negative"));
            }
        }

        Ok(())
    }
}

fn validate_feed_fields(name: Option<&str>, data_source: Option<&str>) -> Result<()> {
    if name.is_some_and(|name| name.trim().is_empty()) {
        return Err(Error::validation("the feed name must not be empty"));
    }

    if data_source.is_some_and(|data_source| data_source.trim().is_empty()) {
        return Err(Error::validation("the data source must not be empty"));
    }

    Ok(())
}

#[derive(Serialize, Debug, Clone)]
pub struct FilterGroupDetails {
    #[serde(flatten)]
    pub group: FilterGroup,
    pub tag_filters: Vec<TagFilter>,
    pub author_filters: Vec<AuthorFilter>,
    pub date_range_filters: Vec<DateRangeFilter>,
    pub likes_count_filters: Vec<LikesCountFilter>,
}

#[derive(Serialize, Debug, Clone)]
pub struct FeedDetails {
    #[serde(flatten)]
    pub feed: Feed,
    pub filter_groups: Vec<FilterGroupDetails>,
}

/// The result of a feed creation or update: the feed, the filter group it touched, and
/// that group's filters.
#[derive(Serialize, Debug, Clone)]
pub struct FeedWithFilterGroup {
    pub feed: Feed,
    pub filter_group: Option<FilterGroup>,
    pub tag_filters: Vec<TagFilter>,
    pub author_filters: Vec<AuthorFilter>,
    pub date_range_filters: Vec<DateRangeFilter>,
    pub likes_count_filters: Vec<LikesCountFilter>,
}

impl FeedWithFilterGroup {
    fn new(feed: Feed, details: Option<FilterGroupDetails>) -> Self {
        match details {
            Some(details) => Self {
                feed,
                filter_group: Some(details.group),
                tag_filters: details.tag_filters,
                author_filters: details.author_filters,
                date_range_filters: details.date_range_filters,
                likes_count_filters: details.likes_count_filters,
            },

            None => Self {
                feed,
                filter_group: None,
                tag_filters: vec![],
                author_filters: vec![],
                date_range_filters: vec![],
                likes_count_filters: vec![],
            },
        }
    }
}

async fn load_group_details(tx: &mut Tx, group: FilterGroup) -> Result<FilterGroupDetails> {
    Ok(FilterGroupDetails {
        tag_filters: tx.get_filters(FilterTable::Tags, group.id).await?,
        author_filters: tx.get_filters(FilterTable::Authors, group.id).await?,
        date_range_filters: tx.get_filters(FilterTable::DateRanges, group.id).await?,
        likes_count_filters: tx.get_filters(FilterTable::LikesCounts, group.id).await?,
        group,
    })
}

async fn load_feed_details(tx: &mut Tx, feed: Feed) -> Result<FeedDetails> {
    let groups = tx.get_filter_groups(feed.id).await?;
    let mut filter_groups = Vec::with_capacity(groups.len());

    for group in groups {
        filter_groups.push(load_group_details(tx, group).await?);
    }

    Ok(FeedDetails {
        feed,
        filter_groups,
    })
}

/// Writes the child collections present in `patch`.
///
/// With `replace` set, every present collection is cleared before the new rows go in.
async fn write_filters(
    tx: &mut Tx,
    group_id: i64,
    patch: &FilterGroupPatch,
    replace: bool,
) -> Result<()> {
    async fn write<T, V>(
        tx: &mut Tx,
        table: FilterTable,
        group_id: i64,
        values: Option<Vec<V>>,
        replace: bool,
    ) -> Result<()>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> + Send + Unpin,
        V: for<'q> sqlx::Encode<'q, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite> + Send + 'static,
    {
        let Some(values) = values else {
            return Ok(());
        };

        if replace {
            tx.delete_filters(table, group_id).await?;
        }

        tx.insert_filters::<T, V>(table, group_id, values).await?;

        Ok(())
    }

    let tags: Option<Vec<String>> = patch
        .tag_filters
        .as_ref()
        .map(|filters| filters.iter().map(|f| f.tag_name.clone()).collect());
    let authors: Option<Vec<String>> = patch
        .author_filters
        .as_ref()
        .map(|filters| filters.iter().map(|f| f.author_id.clone()).collect());
    let date_ranges: Option<Vec<i64>> = patch
        .date_range_filters
        .as_ref()
        .map(|filters| filters.iter().map(|f| f.days_ago).collect());
    let likes_counts: Option<Vec<i64>> = patch
        .likes_count_filters
        .as_ref()
        .map(|filters| filters.iter().map(|f| f.min_likes).collect());

    write::<TagFilter, String>(tx, FilterTable::Tags, group_id, tags, replace).await?;
    write::<AuthorFilter, String>(tx, FilterTable::Authors, group_id, authors, replace).await?;
    write::<DateRangeFilter, i64>(tx, FilterTable::DateRanges, group_id, date_ranges, replace)
        .await?;
    write::<LikesCountFilter, i64>(tx, FilterTable::LikesCounts, group_id, likes_counts, replace)
        .await?;

    Ok(())
}

/// Creates, updates and deletes feeds together with their filter groups.
///
/// Every mutation of a feed's filter groups and filters goes through here, one transaction
/// per call.
#[derive(Clone)]
pub struct FeedManager {
    storage: Arc<Storage>,
    free_plan_id: Arc<str>,
    notifier: Notifier,
}

impl FeedManager {
    pub fn new(storage: Arc<Storage>, free_plan_id: impl Into<Arc<str>>, notifier: Notifier) -> Self {
        Self {
            storage,
            free_plan_id: free_plan_id.into(),
            notifier,
        }
    }

    #[instrument(level = "DEBUG", skip(self, feed, filter_group), fields(feed_name = %feed.name))]
    pub async fn create_feed_with_filter_group(
        &self,
        user_id: &str,
        feed: NewFeed,
        filter_group: FilterGroupSpec,
    ) -> Result<FeedWithFilterGroup> {
        validate_feed_fields(Some(&feed.name), Some(&feed.data_source))?;
        let group = FilterGroupPatch::from(filter_group);
        group.validate()?;

        let mut tx = self.storage.begin().await?;
        tx.find_user(user_id).await?.ok_or(Error::NotFound("user"))?;

        let subscription = tx.current_subscription(user_id).await?;
        let candidate = CandidateFeed {
            feed_id: None,
            groups: vec![CandidateGroup {
                tags: group.tag_filters.as_ref().map_or(0, Vec::len),
                authors: group.author_filters.as_ref().map_or(0, Vec::len),
            }],
        };
        limits::check_feed_creation_limits(
            &mut tx,
            user_id,
            subscription.as_ref(),
            &self.free_plan_id,
            &candidate,
        )
        .await?;

        let created = tx
            .insert_feed(NewFeedRow {
                user_id,
                name: &feed.name,
                data_source: &feed.data_source,
                filter_config: &feed.filter_config,
                delivery_config: &feed.delivery_config,
            })
            .await?;
        let filter_group = tx
            .insert_filter_group(
                created.id,
                group.name.as_deref().unwrap_or(&feed.name),
                group.logic_type.unwrap_or_default(),
            )
            .await?;
        write_filters(&mut tx, filter_group.id, &group, false).await?;
        let details = load_group_details(&mut tx, filter_group).await?;
        tx.commit().await?;

        info!(feed_id = created.id, "Created a feed");
        self.notifier.notify(format!(
            "User `{user_id}` created a new feed `{}`",
            created.name
        ));

        Ok(FeedWithFilterGroup::new(created, Some(details)))
    }

    /// Updates a feed and its first filter group.
    ///
    /// A filter group is created from `filter_group` if the feed does not have one yet.
    #[instrument(level = "DEBUG", skip(self, patch, filter_group))]
    pub async fn update_feed_with_filter_group(
        &self,
        user_id: &str,
        feed_id: i64,
        patch: FeedPatch,
        filter_group: Option<FilterGroupPatch>,
    ) -> Result<FeedWithFilterGroup> {
        validate_feed_fields(patch.name.as_deref(), patch.data_source.as_deref())?;

        if let Some(group) = &filter_group {
            group.validate()?;
        }

        let mut tx = self.storage.begin().await?;
        let feed = tx
            .find_owned_feed(user_id, feed_id)
            .await?
            .ok_or(Error::NotFound("feed"))?;
        let groups = tx.get_filter_groups(feed.id).await?;
        let target = groups.first().cloned();

        let mut candidate = CandidateFeed {
            feed_id: Some(feed.id),
            groups: Vec::with_capacity(groups.len() + 1),
        };

        for group in &groups {
            let group_patch = filter_group
                .as_ref()
                .filter(|_| target.as_ref().is_some_and(|target| target.id == group.id));
            let tags = match group_patch.and_then(|patch| patch.tag_filters.as_ref()) {
                Some(filters) => filters.len(),
                None => tx.get_filters::<TagFilter>(FilterTable::Tags, group.id).await?.len(),
            };
            let authors = match group_patch.and_then(|patch| patch.author_filters.as_ref()) {
                Some(filters) => filters.len(),
                None => {
                    tx.get_filters::<AuthorFilter>(FilterTable::Authors, group.id)
                        .await?
                        .len()
                }
            };
            candidate.groups.push(CandidateGroup { tags, authors });
        }

        if let (None, Some(patch)) = (&target, &filter_group) {
            candidate.groups.push(CandidateGroup {
                tags: patch.tag_filters.as_ref().map_or(0, Vec::len),
                authors: patch.author_filters.as_ref().map_or(0, Vec::len),
            });
        }

        let subscription = tx.current_subscription(user_id).await?;
        limits::check_feed_creation_limits(
            &mut tx,
            user_id,
            subscription.as_ref(),
            &self.free_plan_id,
            &candidate,
        )
        .await?;

        let feed = tx
            .update_feed(
                feed.id,
                FeedRowPatch {
                    name: patch.name.as_deref(),
                    data_source: patch.data_source.as_deref(),
                    filter_config: patch.filter_config.as_ref(),
                    delivery_config: patch.delivery_config.as_ref(),
                },
            )
            .await?;

        let group = match (target, filter_group) {
            (Some(target), Some(patch)) => {
                let group = if patch.name.is_some() || patch.logic_type.is_some() {
                    tx.update_filter_group(target.id, patch.name.as_deref(), patch.logic_type)
                        .await?
                } else {
                    target
                };
                write_filters(&mut tx, group.id, &patch, true).await?;

                Some(group)
            }

            (None, Some(patch)) => {
                let group = tx
                    .insert_filter_group(
                        feed.id,
                        patch.name.as_deref().unwrap_or(&feed.name),
                        patch.logic_type.unwrap_or_default(),
                    )
                    .await?;
                write_filters(&mut tx, group.id, &patch, false).await?;

                Some(group)
            }

            (target, None) => target,
        };

        let details = match group {
            Some(group) => Some(load_group_details(&mut tx, group).await?),
            None => None,
        };
        tx.commit().await?;

        info!(feed_id = feed.id, "Updated a feed");

        Ok(FeedWithFilterGroup::new(feed, details))
    }

    /// Deactivates a feed. Its filter groups are left in place.
    #[instrument(level = "DEBUG", skip(self))]
    pub async fn soft_delete(&self, user_id: &str, feed_id: i64) -> Result<()> {
        let mut tx = self.storage.begin().await?;

        if !tx.soft_delete_feed(user_id, feed_id).await? {
            return Err(Error::NotFound("feed"));
        }

        tx.commit().await?;
        info!(feed_id, "Deactivated a feed");

        Ok(())
    }

    #[instrument(level = "DEBUG", skip(self))]
    pub async fn get_feed(&self, user_id: &str, feed_id: i64) -> Result<FeedDetails> {
        let mut tx = self.storage.begin().await?;
        let feed = tx
            .find_owned_feed(user_id, feed_id)
            .await?
            .ok_or(Error::NotFound("feed"))?;
        let details = load_feed_details(&mut tx, feed).await?;
        tx.commit().await?;

        Ok(details)
    }

    #[instrument(level = "DEBUG", skip(self))]
    pub async fn list_feeds(&self, user_id: &str) -> Result<Vec<FeedDetails>> {
        let mut tx = self.storage.begin().await?;
        let feeds = tx.get_active_feeds(user_id).await?;
        let mut result = Vec::with_capacity(feeds.len());

        for feed in feeds {
            result.push(load_feed_details(&mut tx, feed).await?);
        }

        tx.commit().await?;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use crate::limits::LimitExceeded;
    use crate::storage::entities::SubscriptionStatus;

    use super::*;

    const USER: &str = "user_1";

    async fn setup(max_feeds: i64, max_authors: i64, max_tags: i64) -> (Arc<Storage>, FeedManager) {
        let storage = Arc::new(Storage::in_memory().await.unwrap());
        storage.seed_user(USER).await.unwrap();
        storage
            .seed_plan("pro", max_feeds, max_authors, max_tags)
            .await
            .unwrap();
        storage
            .seed_subscription(USER, "pro", SubscriptionStatus::Active)
            .await
            .unwrap();
        let manager = FeedManager::new(storage.clone(), "free", Notifier::disabled());

        (storage, manager)
    }

    fn new_feed(name: &str) -> NewFeed {
        NewFeed {
            name: name.into(),
            data_source: "qiita".into(),
            filter_config: empty_object(),
            delivery_config: empty_object(),
        }
    }

    fn group(tags: &[&str], authors: &[&str], days_ago: &[i64]) -> FilterGroupSpec {
        FilterGroupSpec {
            name: "default".into(),
            logic_type: LogicType::Or,
            tag_filters: tags
                .iter()
                .map(|&tag_name| TagFilterInput {
                    tag_name: tag_name.into(),
                })
                .collect(),
            author_filters: authors
                .iter()
                .map(|&author_id| AuthorFilterInput {
                    author_id: author_id.into(),
                })
                .collect(),
            date_range_filters: days_ago
                .iter()
                .map(|&days_ago| DateRangeFilterInput { days_ago })
                .collect(),
            likes_count_filters: vec![],
        }
    }

    #[tokio::test]
    async fn creates_feed_group_and_filters() {
        let (_, manager) = setup(10, 10, 10).await;

        let created = manager
            .create_feed_with_filter_group(
                USER,
                new_feed("Rust news"),
                FilterGroupSpec {
                    likes_count_filters: vec![LikesCountFilterInput { min_likes: 10 }],
                    ..group(&["rust", "tokio"], &["alice"], &[7])
                },
            )
            .await
            .unwrap();

        assert_eq!(created.feed.name, "Rust news");
        assert!(created.feed.is_active);
        let filter_group = created.filter_group.unwrap();
        assert_eq!(filter_group.feed_id, created.feed.id);
        assert_eq!(filter_group.logic_type, LogicType::Or);
        let tags = created
            .tag_filters
            .iter()
            .map(|f| f.tag_name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(tags, ["rust", "tokio"]);
        assert_eq!(created.author_filters[0].author_id, "alice");
        assert_eq!(created.date_range_filters[0].days_ago, 7);
        assert_eq!(created.likes_count_filters[0].min_likes, 10);
    }

    #[tokio::test]
    async fn date_range_accepts_zero_days() {
        let (storage, manager) = setup(10, 10, 10).await;

        let created = manager
            .create_feed_with_filter_group(USER, new_feed("today"), group(&[], &[], &[0]))
            .await
            .unwrap();
        assert_eq!(created.date_range_filters[0].days_ago, 0);

        let err = manager
            .create_feed_with_filter_group(USER, new_feed("yesterday"), group(&[], &[], &[-1]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(storage.count_rows("feeds").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn two_date_ranges_are_rejected_before_any_write() {
        let (storage, manager) = setup(10, 10, 10).await;

        let err = manager
            .create_feed_with_filter_group(USER, new_feed("feed"), group(&[], &[], &[7, 30]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(storage.count_rows("feeds").await.unwrap(), 0);
        assert_eq!(storage.count_rows("filter_groups").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn single_date_range_is_accepted() {
        let (_, manager) = setup(10, 10, 10).await;

        let created = manager
            .create_feed_with_filter_group(USER, new_feed("feed"), group(&[], &[], &[30]))
            .await
            .unwrap();

        assert_eq!(created.date_range_filters.len(), 1);
    }

    #[tokio::test]
    async fn update_replaces_date_range() {
        let (storage, manager) = setup(10, 10, 10).await;
        let created = manager
            .create_feed_with_filter_group(USER, new_feed("feed"), group(&["rust"], &[], &[30]))
            .await
            .unwrap();

        let updated = manager
            .update_feed_with_filter_group(
                USER,
                created.feed.id,
                FeedPatch::default(),
                Some(FilterGroupPatch {
                    date_range_filters: Some(vec![DateRangeFilterInput { days_ago: 60 }]),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();

        assert_eq!(updated.date_range_filters.len(), 1);
        assert_eq!(updated.date_range_filters[0].days_ago, 60);
        assert_eq!(storage.count_rows("date_range_filters").await.unwrap(), 1);
        // tags were not part of the patch.
        assert_eq!(updated.tag_filters.len(), 1);
        assert_eq!(updated.tag_filters[0].tag_name, "rust");
    }

    #[tokio::test]
    async fn empty_collection_clears_and_scalars_are_patched() {
        let (_, manager) = setup(10, 10, 10).await;
        let created = manager
            .create_feed_with_filter_group(USER, new_feed("feed"), group(&["rust"], &["bob"], &[]))
            .await
            .unwrap();

        let updated = manager
            .update_feed_with_filter_group(
                USER,
                created.feed.id,
                FeedPatch {
                    name: Some("renamed".into()),
                    ..Default::default()
                },
                Some(FilterGroupPatch {
                    logic_type: Some(LogicType::And),
                    tag_filters: Some(vec![]),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();

        assert_eq!(updated.feed.name, "renamed");
        assert_eq!(updated.feed.data_source, "qiita");
        assert_eq!(updated.filter_group.unwrap().logic_type, LogicType::And);
        assert!(updated.tag_filters.is_empty());
        assert_eq!(updated.author_filters.len(), 1);
    }

    #[tokio::test]
    async fn other_users_feeds_are_not_found() {
        let (storage, manager) = setup(10, 10, 10).await;
        storage.seed_user("user_2").await.unwrap();
        let created = manager
            .create_feed_with_filter_group(USER, new_feed("feed"), group(&[], &[], &[]))
            .await
            .unwrap();

        let err = manager
            .update_feed_with_filter_group("user_2", created.feed.id, FeedPatch::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound("feed")));

        let err = manager.get_feed("user_2", created.feed.id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound("feed")));

        let err = manager.soft_delete("user_2", created.feed.id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound("feed")));

        let err = manager
            .update_feed_with_filter_group(USER, 9999, FeedPatch::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound("feed")));
    }

    #[tokio::test]
    async fn feed_count_boundary() {
        let (_, manager) = setup(10, 10, 10).await;

        for idx in 0..10 {
            manager
                .create_feed_with_filter_group(USER, new_feed(&format!("feed {idx}")), group(&[], &[], &[]))
                .await
                .unwrap();
        }

        let err = manager
            .create_feed_with_filter_group(USER, new_feed("one too many"), group(&[], &[], &[]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::LimitExceeded(LimitExceeded::FeedCountExceeded { max: 10 })
        ));
    }

    #[tokio::test]
    async fn soft_delete_hides_feed_and_frees_quota() {
        let (_, manager) = setup(1, 10, 10).await;
        let created = manager
            .create_feed_with_filter_group(USER, new_feed("feed"), group(&["rust"], &[], &[]))
            .await
            .unwrap();

        manager.soft_delete(USER, created.feed.id).await.unwrap();

        assert!(matches!(
            manager.get_feed(USER, created.feed.id).await,
            Err(Error::NotFound(_))
        ));
        assert!(manager.list_feeds(USER).await.unwrap().is_empty());
        manager
            .create_feed_with_filter_group(USER, new_feed("replacement"), group(&[], &[], &[]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn free_tier_limits_apply_without_subscription() {
        let storage = Arc::new(Storage::in_memory().await.unwrap());
        storage.seed_user(USER).await.unwrap();
        let manager = FeedManager::new(storage.clone(), "free", Notifier::disabled());

        let err = manager
            .create_feed_with_filter_group(USER, new_feed("feed"), group(&["rust", "go"], &[], &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LimitExceeded(_)));
        assert_eq!(storage.count_rows("feeds").await.unwrap(), 0);

        let created = manager
            .create_feed_with_filter_group(USER, new_feed("feed"), group(&["rust"], &[], &[]))
            .await
            .unwrap();

        // the feed being updated does not count against its own quota.
        manager
            .update_feed_with_filter_group(
                USER,
                created.feed.id,
                FeedPatch {
                    name: Some("still one feed".into()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        let err = manager
            .update_feed_with_filter_group(
                USER,
                created.feed.id,
                FeedPatch::default(),
                Some(FilterGroupPatch {
                    tag_filters: Some(vec![
                        TagFilterInput {
                            tag_name: "rust".into(),
                        },
                        TagFilterInput {
                            tag_name: "go".into(),
                        },
                    ]),
                    ..Default::default()
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::LimitExceeded(LimitExceeded::TagCountExceeded { count: 2, max: 1 })
        ));
    }

    #[tokio::test]
    async fn inactive_subscription_blocks_creation() {
        let storage = Arc::new(Storage::in_memory().await.unwrap());
        storage.seed_user(USER).await.unwrap();
        storage.seed_plan("pro", 10, 10, 10).await.unwrap();
        storage
            .seed_subscription(USER, "pro", SubscriptionStatus::Expired)
            .await
            .unwrap();
        let manager = FeedManager::new(storage, "free", Notifier::disabled());

        let err = manager
            .create_feed_with_filter_group(USER, new_feed("feed"), group(&[], &[], &[]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::LimitExceeded(LimitExceeded::SubscriptionInactive)
        ));
    }

    #[tokio::test]
    async fn update_creates_missing_filter_group() {
        let (storage, manager) = setup(10, 10, 10).await;
        let mut tx = storage.begin().await.unwrap();
        let bare = tx
            .insert_feed(NewFeedRow {
                user_id: USER,
                name: "bare",
                data_source: "qiita",
                filter_config: &empty_object(),
                delivery_config: &empty_object(),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let updated = manager
            .update_feed_with_filter_group(
                USER,
                bare.id,
                FeedPatch::default(),
                Some(FilterGroupPatch {
                    author_filters: Some(vec![AuthorFilterInput {
                        author_id: "carol".into(),
                    }]),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();

        let group = updated.filter_group.unwrap();
        assert_eq!(group.name, "bare");
        assert_eq!(group.logic_type, LogicType::Or);
        assert_eq!(updated.author_filters[0].author_id, "carol");

        let details = manager.get_feed(USER, bare.id).await.unwrap();
        assert_eq!(details.filter_groups.len(), 1);
    }
}
