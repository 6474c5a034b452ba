use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;

/// 价格版本
/// 说明:
/// - 同一订阅的所有版本按 valid_from 排序后按月覆盖订阅区间，无空隙无重叠
/// - previous_price 仅在延期降级创建的版本上设置，用于识别和撤销待生效的降级
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "subscription_prices")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub subscription_id: i64,
    pub price: i32,
    pub previous_price: Option<i32>,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::subscriptions::Entity",
        from = "Column::SubscriptionId",
        to = "super::subscriptions::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Subscription,
}

impl Related<super::subscriptions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscription.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
