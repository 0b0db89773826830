//! Tier lookups: price or user to [`TierInfo`].
//!
//! Pure read path over `prices`, `subscriptions`, `plan_feature_limits`,
//! `features` and `limits`. Billing sync owns those tables.

use tracing::debug;
use uuid::Uuid;

use super::Database;
use crate::error::{StoreError, StoreResult};
use crate::tier::{PlanFeatureRow, TierInfo};

impl Database {
    /// Build the tier for a billing price.
    pub async fn get_tier_info_by_price_id(&self, price_id: Uuid) -> StoreResult<TierInfo> {
        let description: String =
            sqlx::query_scalar("SELECT description FROM prices WHERE id = $1")
                .bind(price_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| StoreError::not_found("price", price_id))?;

        let rows = sqlx::query_as::<_, PlanFeatureRow>(
            "SELECT f.name AS feature_name, pfl.enabled,
                    l.name AS limit_name, pfl.limit_value
             FROM plan_feature_limits pfl
             JOIN features f ON f.id = pfl.feature_id
             LEFT JOIN limits l ON l.id = pfl.limit_id
             WHERE pfl.price_id = $1
             ORDER BY f.name",
        )
        .bind(price_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(TierInfo::from_rows(price_id, description, &rows))
    }

    /// The tier of the price described as `free`, or the built-in free plan
    /// when the store has none.
    pub async fn get_free_tier_info(&self) -> StoreResult<TierInfo> {
        let price_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM prices WHERE LOWER(description) = 'free'
             ORDER BY created_at ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        match price_id {
            Some(id) => self.get_tier_info_by_price_id(id).await,
            None => {
                debug!("no free price in store, using built-in free tier");
                Ok(TierInfo::default_free())
            }
        }
    }

    /// The tier of a user's newest active or trialing subscription, falling
    /// back to the free tier.
    pub async fn get_tier_info_by_user_id(&self, user_id: Uuid) -> StoreResult<TierInfo> {
        let price_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT price_id FROM subscriptions
             WHERE user_id = $1 AND status IN ('active', 'trialing')
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        match price_id {
            Some(id) => self.get_tier_info_by_price_id(id).await,
            None => self.get_free_tier_info().await,
        }
    }
}
