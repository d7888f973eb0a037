use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::storage::entities::{Subscription, SubscriptionStatus};
use crate::storage::Tx;
use crate::subscription;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_feeds: i64,
    pub max_tags: i64,
    pub max_authors: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LimitExceeded {
    #[error("the subscription is not active")]
    SubscriptionInactive,

    #[error("the plan allows at most {max} feeds")]
    FeedCountExceeded { max: i64 },

    #[error("the plan allows at most {max} tag filters per feed, got {count}")]
    TagCountExceeded { count: i64, max: i64 },

    #[error("the plan allows at most {max} author filters per feed, got {count}")]
    AuthorCountExceeded { count: i64, max: i64 },
}

impl LimitExceeded {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SubscriptionInactive => "SUBSCRIPTION_INACTIVE",
            Self::FeedCountExceeded { .. } => "FEED_COUNT_EXCEEDED",
            Self::TagCountExceeded { .. } => "TAG_COUNT_EXCEEDED",
            Self::AuthorCountExceeded { .. } => "AUTHOR_COUNT_EXCEEDED",
        }
    }
}

/// The filter counts of one filter group of a feed being created or updated.
#[derive(Debug, Clone, Copy, Default)]
pub struct CandidateGroup {
    pub tags: usize,
    pub authors: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CandidateFeed {
    /// Set when the candidate is an update of an existing feed.
    pub feed_id: Option<i64>,
    pub groups: Vec<CandidateGroup>,
}

impl CandidateFeed {
    fn tag_count(&self) -> i64 {
        self.groups.iter().map(|group| group.tags as i64).sum()
    }

    fn author_count(&self) -> i64 {
        self.groups.iter().map(|group| group.authors as i64).sum()
    }
}

/// Checks a candidate feed against the limits, given how many other active feeds the user has.
///
/// Stops at the first violation.
pub fn evaluate(
    limits: &Limits,
    subscription_status: Option<SubscriptionStatus>,
    other_feed_count: i64,
    candidate: &CandidateFeed,
) -> Result<(), LimitExceeded> {
    if subscription_status.is_some_and(|status| status != SubscriptionStatus::Active) {
        return Err(LimitExceeded::SubscriptionInactive);
    }

    if other_feed_count + 1 > limits.max_feeds {
        return Err(LimitExceeded::FeedCountExceeded {
            max: limits.max_feeds,
        });
    }

    let count = candidate.tag_count();

    if count > limits.max_tags {
        return Err(LimitExceeded::TagCountExceeded {
            count,
            max: limits.max_tags,
        });
    }

    let count = candidate.author_count();

    if count > limits.max_authors {
        return Err(LimitExceeded::AuthorCountExceeded {
            count,
            max: limits.max_authors,
        });
    }

    Ok(())
}

/// Rejects a feed creation or update that would exceed the user's plan.
///
/// A user without a subscription is held to the Free tier; a user whose subscription exists
/// but is not active is rejected outright. The only query issued is the active feed count.
#[instrument(level = "DEBUG", skip(tx, subscription, candidate))]
pub async fn check_feed_creation_limits(
    tx: &mut Tx,
    user_id: &str,
    subscription: Option<&Subscription>,
    free_plan_id: &str,
    candidate: &CandidateFeed,
) -> Result<()> {
    let effective = subscription::project(subscription, free_plan_id);
    let other_feed_count = tx.count_active_feeds(user_id, candidate.feed_id).await?;
    debug!(
        other_feed_count,
        plan = %effective.plan_name,
        "Checking feed limits"
    );

    evaluate(
        &effective.limits,
        subscription.map(|sub| sub.status),
        other_feed_count,
        candidate,
    )?;

    Ok(())
}
