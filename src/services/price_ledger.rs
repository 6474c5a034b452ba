//! Price version primitives over any sea-orm connection or transaction.
//!
//! These do no validation of their own; callers keep the version timeline
//! contiguous.

use crate::entities::subscription_price_entity as prices;
use crate::error::AppResult;
use crate::models::{PriceVersion, Subscription};
use crate::services::lifecycle::{LedgerOp, LedgerView, pending_pivot};
use crate::utils::to_storage_end;
use chrono::NaiveDate;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};

fn newest_first(query: sea_orm::Select<prices::Entity>) -> sea_orm::Select<prices::Entity> {
    query
        .order_by_desc(prices::Column::ValidFrom)
        .order_by_desc(prices::Column::Id)
}

/// Latest version starting on or before the pending pivot.
pub async fn latest_settled_version<C: ConnectionTrait>(
    db: &C,
    subscription: &Subscription,
    today: NaiveDate,
) -> AppResult<Option<PriceVersion>> {
    let row = newest_first(
        prices::Entity::find()
            .filter(prices::Column::SubscriptionId.eq(subscription.id))
            .filter(prices::Column::ValidFrom.lte(pending_pivot(subscription, today))),
    )
    .one(db)
    .await?;
    Ok(row.map(PriceVersion::from))
}

pub async fn pending_version<C: ConnectionTrait>(
    db: &C,
    subscription: &Subscription,
    today: NaiveDate,
) -> AppResult<Option<PriceVersion>> {
    let row = newest_first(
        prices::Entity::find()
            .filter(prices::Column::SubscriptionId.eq(subscription.id))
            .filter(prices::Column::ValidFrom.gt(pending_pivot(subscription, today))),
    )
    .one(db)
    .await?;
    Ok(row.map(PriceVersion::from))
}

/// Splits the ledger around the pending pivot of `today`.
pub async fn load_view<C: ConnectionTrait>(
    db: &C,
    subscription: &Subscription,
    today: NaiveDate,
) -> AppResult<LedgerView> {
    Ok(LedgerView {
        settled: latest_settled_version(db, subscription, today).await?,
        pending: pending_version(db, subscription, today).await?,
    })
}

/// Versions of the given subscriptions that touch `[from, to]`.
pub async fn versions_for<C: ConnectionTrait>(
    db: &C,
    subscription_ids: &[i64],
    from: NaiveDate,
    to: NaiveDate,
) -> AppResult<Vec<PriceVersion>> {
    if subscription_ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = prices::Entity::find()
        .filter(prices::Column::SubscriptionId.is_in(subscription_ids.iter().copied()))
        .filter(prices::Column::ValidFrom.lte(to))
        .filter(prices::Column::ValidTo.gte(from))
        .order_by_asc(prices::Column::ValidFrom)
        .all(db)
        .await?;
    Ok(rows.into_iter().map(PriceVersion::from).collect())
}

pub async fn insert_version<C: ConnectionTrait>(
    db: &C,
    subscription_id: i64,
    price: i32,
    previous_price: Option<i32>,
    valid_from: NaiveDate,
    valid_to: Option<NaiveDate>,
) -> AppResult<PriceVersion> {
    let row = prices::ActiveModel {
        subscription_id: Set(subscription_id),
        price: Set(price),
        previous_price: Set(previous_price),
        valid_from: Set(valid_from),
        valid_to: Set(to_storage_end(valid_to)),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(PriceVersion::from(row))
}

async fn set_column<C: ConnectionTrait>(
    db: &C,
    version_id: i64,
    column: prices::Column,
    value: impl Into<sea_orm::Value>,
) -> AppResult<()> {
    prices::Entity::update_many()
        .col_expr(column, Expr::value(value.into()))
        .filter(prices::Column::Id.eq(version_id))
        .exec(db)
        .await?;
    Ok(())
}

pub async fn close_version<C: ConnectionTrait>(
    db: &C,
    version_id: i64,
    valid_to: Option<NaiveDate>,
) -> AppResult<()> {
    set_column(db, version_id, prices::Column::ValidTo, to_storage_end(valid_to)).await
}

pub async fn update_version_price<C: ConnectionTrait>(
    db: &C,
    version_id: i64,
    price: i32,
) -> AppResult<()> {
    set_column(db, version_id, prices::Column::Price, price).await
}

pub async fn set_previous_price<C: ConnectionTrait>(
    db: &C,
    version_id: i64,
    previous_price: Option<i32>,
) -> AppResult<()> {
    set_column(db, version_id, prices::Column::PreviousPrice, previous_price).await
}

pub async fn set_valid_from<C: ConnectionTrait>(
    db: &C,
    version_id: i64,
    valid_from: NaiveDate,
) -> AppResult<()> {
    set_column(db, version_id, prices::Column::ValidFrom, valid_from).await
}

pub async fn delete_version<C: ConnectionTrait>(db: &C, version_id: i64) -> AppResult<()> {
    prices::Entity::delete_by_id(version_id).exec(db).await?;
    Ok(())
}

pub async fn delete_versions_of<C: ConnectionTrait>(
    db: &C,
    subscription_id: i64,
) -> AppResult<u64> {
    let res = prices::Entity::delete_many()
        .filter(prices::Column::SubscriptionId.eq(subscription_id))
        .exec(db)
        .await?;
    Ok(res.rows_affected)
}

/// Execute the version half of a plan. Subscription row ops are skipped.
pub async fn apply_version_ops<C: ConnectionTrait>(
    db: &C,
    subscription_id: i64,
    ops: &[LedgerOp],
) -> AppResult<()> {
    for op in ops {
        match *op {
            LedgerOp::SetSubscriptionPrice(_) | LedgerOp::SetSubscriptionEnd(_) => {}
            LedgerOp::SetVersionPrice { version_id, price } => {
                update_version_price(db, version_id, price).await?
            }
            LedgerOp::SetPreviousPrice {
                version_id,
                previous_price,
            } => set_previous_price(db, version_id, previous_price).await?,
            LedgerOp::SetValidFrom {
                version_id,
                valid_from,
            } => set_valid_from(db, version_id, valid_from).await?,
            LedgerOp::CloseVersion {
                version_id,
                valid_to,
            } => close_version(db, version_id, valid_to).await?,
            LedgerOp::InsertVersion {
                price,
                previous_price,
                valid_from,
                valid_to,
            } => {
                let version = insert_version(
                    db,
                    subscription_id,
                    price,
                    previous_price,
                    valid_from,
                    valid_to,
                )
                .await?;
                log::debug!(
                    "Inserted price version {} for subscription {subscription_id}",
                    version.id
                );
            }
            LedgerOp::DeleteVersion { version_id } => delete_version(db, version_id).await?,
        }
    }
    Ok(())
}
