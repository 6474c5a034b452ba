use sea_orm_migration::prelude::*;

use crate::m20250901_000001_create_subscriptions::Subscriptions;

#[derive(DeriveIden)]
enum SubscriptionPrices {
    Table,
    Id,
    SubscriptionId,
    Price,
    PreviousPrice,
    ValidFrom,
    ValidTo,
    CreatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SubscriptionPrices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SubscriptionPrices::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionPrices::SubscriptionId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionPrices::Price)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionPrices::PreviousPrice)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionPrices::ValidFrom)
                            .date()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionPrices::ValidTo)
                            .date()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionPrices::CreatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::cust("NOW()"))
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_subscription_prices_subscription")
                            .from(SubscriptionPrices::Table, SubscriptionPrices::SubscriptionId)
                            .to(Subscriptions::Table, Subscriptions::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::NoAction),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_subscription_prices_sub_valid_from")
                    .table(SubscriptionPrices::Table)
                    .col(SubscriptionPrices::SubscriptionId)
                    .col(SubscriptionPrices::ValidFrom)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(SubscriptionPrices::Table)
                    .to_owned(),
            )
            .await
    }
}
