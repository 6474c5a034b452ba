use crate::entities::subscription_entity as subs;
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::services::cost::aggregate_cost;
use crate::services::lifecycle::{LedgerOp, plan_update};
use crate::services::price_ledger;
use crate::utils::{BillingCalendar, month_end, month_start, to_storage_end};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, IsolationLevel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select,
    Set, SqlErr, TransactionTrait, Unchanged,
};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct SubscriptionService {
    pool: Arc<DatabaseConnection>,
}

/// Closed intervals where `None` is the open end.
fn periods_overlap(
    a_start: NaiveDate,
    a_end: Option<NaiveDate>,
    b_start: NaiveDate,
    b_end: Option<NaiveDate>,
) -> bool {
    let a_before_b = a_end.is_some_and(|end| end < b_start);
    let b_before_a = b_end.is_some_and(|end| end < a_start);
    !(a_before_b || b_before_a)
}

impl SubscriptionService {
    pub fn new(pool: Arc<DatabaseConnection>) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> AppResult<DatabaseTransaction> {
        Ok(self
            .pool
            .begin_with_config(Some(IsolationLevel::Serializable), None)
            .await?)
    }

    fn pair_query(user_id: Uuid, service_name: &str) -> Select<subs::Entity> {
        subs::Entity::find()
            .filter(subs::Column::UserId.eq(user_id))
            .filter(subs::Column::ServiceName.eq(service_name))
    }

    pub async fn create_subscription(&self, new: NewSubscription) -> AppResult<Subscription> {
        let today = Utc::now().date_naive();
        let start = month_start(new.start_date);
        let end = new.end_date.map(month_end);
        if end.is_some_and(|e| e < start) {
            return Err(AppError::ValidationError(
                "End date cannot be earlier than the start date".into(),
            ));
        }

        let txn = self.begin().await?;

        let existing = Self::pair_query(new.user_id, &new.service_name)
            .lock_exclusive()
            .all(&txn)
            .await?;
        for other in existing.into_iter().map(Subscription::from) {
            if start >= today && other.is_active_on(today) {
                return Err(AppError::AlreadyActive);
            }
            if periods_overlap(start, end, other.start_date, other.end_date) {
                return Err(AppError::OverlapExists);
            }
        }

        let price = new.price.amount();
        let row = subs::ActiveModel {
            user_id: Set(new.user_id),
            service_name: Set(new.service_name.clone()),
            price: Set(price),
            start_date: Set(start),
            end_date: Set(to_storage_end(end)),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => AppError::OverlapExists,
            _ => AppError::DatabaseError(e),
        })?;

        price_ledger::insert_version(&txn, row.id, price, None, start, end).await?;
        txn.commit().await?;

        log::info!(
            "Subscription {} created: user {}, service {}, {} tier at {}",
            row.id,
            new.user_id,
            new.service_name,
            new.price,
            price
        );
        Ok(Subscription::from(row))
    }

    pub async fn update_subscription(
        &self,
        user_id: Uuid,
        service_name: &str,
        request: UpdateRequest,
    ) -> AppResult<UpdateOutcome> {
        let calendar = BillingCalendar::today_utc();
        let txn = self.begin().await?;

        let subscription = Self::pair_query(user_id, service_name)
            .filter(subs::Column::EndDate.gte(calendar.today))
            .order_by_desc(subs::Column::StartDate)
            .lock_exclusive()
            .one(&txn)
            .await?
            .map(Subscription::from)
            .ok_or_else(|| AppError::NotFound("Active subscription not found".into()))?;

        let view = price_ledger::load_view(&txn, &subscription, calendar.today).await?;
        let plan = plan_update(&subscription, &view, request, &calendar)?;
        if plan.ops.is_empty() {
            return Ok(plan.outcome);
        }

        price_ledger::apply_version_ops(&txn, subscription.id, &plan.ops).await?;
        Self::apply_row_ops(&txn, subscription.id, &plan.ops).await?;
        txn.commit().await?;

        log::info!(
            "Subscription {} updated: operation {}, price changed {}, end date changed {}",
            subscription.id,
            plan.outcome
                .operation
                .map_or_else(|| "none".to_string(), |op| op.to_string()),
            plan.outcome.price_changed,
            plan.outcome.end_date_changed
        );
        Ok(plan.outcome)
    }

    async fn apply_row_ops<C: ConnectionTrait>(
        db: &C,
        subscription_id: i64,
        ops: &[LedgerOp],
    ) -> AppResult<()> {
        let mut row = subs::ActiveModel {
            id: Unchanged(subscription_id),
            ..Default::default()
        };
        let mut touched = false;
        for op in ops {
            match *op {
                LedgerOp::SetSubscriptionPrice(price) => {
                    row.price = Set(price);
                    touched = true;
                }
                LedgerOp::SetSubscriptionEnd(end) => {
                    row.end_date = Set(to_storage_end(end));
                    touched = true;
                }
                _ => {}
            }
        }
        if touched {
            row.updated_at = Set(Some(Utc::now()));
            row.update(db).await?;
        }
        Ok(())
    }

    pub async fn delete_subscription(
        &self,
        user_id: Uuid,
        service_name: &str,
        start_date: NaiveDate,
    ) -> AppResult<()> {
        let txn = self.begin().await?;

        let row = Self::pair_query(user_id, service_name)
            .filter(subs::Column::StartDate.eq(month_start(start_date)))
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Subscription not found".into()))?;

        let removed = price_ledger::delete_versions_of(&txn, row.id).await?;
        subs::Entity::delete_by_id(row.id).exec(&txn).await?;
        txn.commit().await?;

        log::info!(
            "Subscription {} deleted together with {removed} price versions",
            row.id
        );
        Ok(())
    }

    fn list_query(
        user_id: Uuid,
        service_name: Option<&str>,
        status: SubscriptionStatus,
        today: NaiveDate,
    ) -> Select<subs::Entity> {
        let mut query = subs::Entity::find().filter(subs::Column::UserId.eq(user_id));
        if let Some(name) = service_name {
            query = query.filter(subs::Column::ServiceName.eq(name));
        }
        let query = match status {
            SubscriptionStatus::Active => query
                .filter(subs::Column::EndDate.gte(today))
                .order_by_asc(subs::Column::EndDate),
            SubscriptionStatus::Archived => query
                .filter(subs::Column::EndDate.lt(today))
                .order_by_desc(subs::Column::EndDate),
        };
        query.order_by_asc(subs::Column::Id)
    }

    pub async fn get_subscriptions(
        &self,
        user_id: Uuid,
        service_name: Option<&str>,
        status: SubscriptionStatus,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<Subscription>> {
        let today = Utc::now().date_naive();
        let rows = Self::list_query(user_id, service_name, status, today)
            .offset(offset)
            .limit(limit)
            .all(self.pool.as_ref())
            .await?;
        Ok(rows.into_iter().map(Subscription::from).collect())
    }

    pub async fn count_subscriptions(
        &self,
        user_id: Uuid,
        service_name: Option<&str>,
        status: SubscriptionStatus,
    ) -> AppResult<u64> {
        let today = Utc::now().date_naive();
        Ok(Self::list_query(user_id, service_name, status, today)
            .count(self.pool.as_ref())
            .await?)
    }

    /// `from` and `to` are month-granular; they are widened to whole months.
    pub async fn calculate_total_cost(
        &self,
        user_id: Uuid,
        service_name: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AppResult<CostSummary> {
        let calendar = BillingCalendar::today_utc();
        let (from, to) = (month_start(from), month_end(to));

        let subscriptions: Vec<Subscription> = Self::pair_query(user_id, service_name)
            .all(self.pool.as_ref())
            .await?
            .into_iter()
            .map(Subscription::from)
            .collect();
        if subscriptions.is_empty() {
            return Ok(CostSummary::no_subscription());
        }

        let overlapping: Vec<&Subscription> = subscriptions
            .iter()
            .filter(|s| periods_overlap(s.start_date, s.end_date, from, Some(to)))
            .collect();
        let ids: Vec<i64> = overlapping.iter().map(|s| s.id).collect();
        let versions = price_ledger::versions_for(self.pool.as_ref(), &ids, from, to).await?;

        let rows = versions.iter().filter_map(|v| {
            overlapping
                .iter()
                .find(|s| s.id == v.subscription_id)
                .map(|s| (*s, v))
        });
        let summary = aggregate_cost(rows, from, to, &calendar);
        log::debug!(
            "Cost of {service_name} for user {user_id} between {from} and {to}: {} ({})",
            summary.total,
            summary.classification
        );
        Ok(summary)
    }
}
