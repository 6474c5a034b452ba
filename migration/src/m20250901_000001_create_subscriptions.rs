use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
pub(crate) enum Subscriptions {
    Table,
    Id,
    UserId,
    ServiceName,
    Price,
    StartDate,
    EndDate,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Subscriptions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Subscriptions::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Subscriptions::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(Subscriptions::ServiceName)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Subscriptions::Price).integer().not_null())
                    .col(ColumnDef::new(Subscriptions::StartDate).date().not_null())
                    // 开放式订阅使用哨兵日期
                    .col(
                        ColumnDef::new(Subscriptions::EndDate)
                            .date()
                            .not_null()
                            .default(Expr::cust("'2099-12-31'::date")),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::CreatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::cust("NOW()"))
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::cust("NOW()"))
                            .null(),
                    )
                    .check(Expr::col(Subscriptions::EndDate).gte(Expr::col(Subscriptions::StartDate)))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_subscriptions_user_service")
                    .table(Subscriptions::Table)
                    .col(Subscriptions::UserId)
                    .col(Subscriptions::ServiceName)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .unique()
                    .name("uq_subscriptions_user_service_start")
                    .table(Subscriptions::Table)
                    .col(Subscriptions::UserId)
                    .col(Subscriptions::ServiceName)
                    .col(Subscriptions::StartDate)
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
                    .table(Subscriptions::Table)
                    .to_owned(),
            )
            .await
    }
}
