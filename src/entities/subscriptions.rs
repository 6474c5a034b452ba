use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;

/// 订阅记录
/// - `end_date` 为开放式订阅时存储哨兵日期 2099-12-31，读取时转换为 `None`
/// - `price` 始终反映当前生效的价格版本
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "subscriptions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: Uuid,
    pub service_name: String,
    pub price: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::subscription_prices::Entity")]
    Prices,
}

impl Related<super::subscription_prices::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Prices.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
