use crate::entities::subscription_entity as subs;
use crate::error::AppResult;
use crate::models::Subscription;
use crate::services::lifecycle::settlement_price;
use crate::services::price_ledger;
use chrono::{NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;

/// Moves subscription rows onto the price of the version currently in
/// effect once deferred downgrades start.
#[derive(Clone)]
pub struct SyncService {
    pool: Arc<DatabaseConnection>,
}

impl SyncService {
    pub fn new(pool: Arc<DatabaseConnection>) -> Self {
        Self { pool }
    }

    pub async fn sync_subscription_prices(&self) -> AppResult<u64> {
        self.settle_as_of(Utc::now().date_naive()).await
    }

    pub async fn settle_as_of(&self, today: NaiveDate) -> AppResult<u64> {
        let active = subs::Entity::find()
            .filter(subs::Column::EndDate.gte(today))
            .all(self.pool.as_ref())
            .await?;

        let mut corrected = 0u64;
        for subscription in active.into_iter().map(Subscription::from) {
            match self.settle_one(&subscription, today).await {
                Ok(true) => corrected += 1,
                Ok(false) => {}
                Err(e) => {
                    log::error!(
                        "Failed to settle subscription {}: {:?}",
                        subscription.id,
                        e
                    );
                }
            }
        }

        log::info!("Price settlement complete, corrected subscriptions: {corrected}");
        Ok(corrected)
    }

    async fn settle_one(&self, subscription: &Subscription, today: NaiveDate) -> AppResult<bool> {
        let settled =
            price_ledger::latest_settled_version(self.pool.as_ref(), subscription, today).await?;
        let Some(price) = settlement_price(subscription, settled.as_ref(), today) else {
            return Ok(false);
        };

        // 仅在价格未被并发修改时更新
        let res = subs::Entity::update_many()
            .col_expr(subs::Column::Price, Expr::value(price))
            .col_expr(subs::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(subs::Column::Id.eq(subscription.id))
            .filter(subs::Column::Price.eq(subscription.price))
            .exec(self.pool.as_ref())
            .await?;

        if res.rows_affected > 0 {
            log::info!(
                "Subscription {} price settled: {} -> {}",
                subscription.id,
                subscription.price,
                price
            );
        }
        Ok(res.rows_affected > 0)
    }
}
