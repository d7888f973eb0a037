use serde::Serialize;
use tracing::instrument;

use crate::error::Result;
use crate::limits::Limits;
use crate::storage::entities::{Plan, Subscription, SubscriptionStatus};
use crate::storage::Storage;

pub const FREE_PLAN_NAME: &str = "Free";

/// Limits applied when the user has no paid plan.
pub const FREE_LIMITS: Limits = Limits {
    max_feeds: 1,
    max_tags: 1,
    max_authors: 1,
};

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct EffectivePlan {
    pub plan_name: String,
    pub limits: Limits,
    pub status: SubscriptionStatus,
    pub show_upgrade_button: bool,
}

impl EffectivePlan {
    fn free(status: SubscriptionStatus) -> Self {
        Self {
            plan_name: FREE_PLAN_NAME.into(),
            limits: FREE_LIMITS,
            status,
            show_upgrade_button: true,
        }
    }
}

impl From<&Plan> for Limits {
    fn from(plan: &Plan) -> Self {
        Self {
            max_feeds: plan.max_feeds,
            max_tags: plan.max_tags,
            max_authors: plan.max_authors,
        }
    }
}

/// Derives the plan a user is effectively on from their current subscription.
///
/// Anything other than an active subscription to a paid plan yields the Free tier.
pub fn project(subscription: Option<&Subscription>, free_plan_id: &str) -> EffectivePlan {
    match subscription {
        None => EffectivePlan::free(SubscriptionStatus::None),

        Some(sub) if sub.status != SubscriptionStatus::Active => EffectivePlan::free(sub.status),

        Some(sub) if sub.plan.id == free_plan_id => EffectivePlan::free(sub.status),

        Some(sub) => EffectivePlan {
            plan_name: sub.plan.name.clone(),
            limits: (&sub.plan).into(),
            status: sub.status,
            show_upgrade_button: false,
        },
    }
}

#[instrument(level = "DEBUG", skip(storage))]
pub async fn get_effective_plan(
    storage: &Storage,
    free_plan_id: &str,
    user_id: &str,
) -> Result<EffectivePlan> {
    let mut tx = storage.begin().await?;
    let subscription = tx.current_subscription(user_id).await?;
    tx.commit().await?;

    Ok(project(subscription.as_ref(), free_plan_id))
}

pub async fn list_plans(storage: &Storage) -> Result<Vec<Plan>> {
    let mut tx = storage.begin().await?;
    let plans = tx.get_plans().await?;
    tx.commit().await?;

    Ok(plans)
}
