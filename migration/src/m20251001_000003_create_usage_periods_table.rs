use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UsagePeriods::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UsagePeriods::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(UsagePeriods::SubscriptionId).uuid().not_null())
                    .col(ColumnDef::new(UsagePeriods::Sequence).integer().not_null())
                    .col(
                        ColumnDef::new(UsagePeriods::PeriodStart)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UsagePeriods::PeriodEnd)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UsagePeriods::UnitsAllocated)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UsagePeriods::UnitsUsed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UsagePeriods::UnitsRemaining)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UsagePeriods::PromotionalUnitsUsed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UsagePeriods::LastUpdated)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT CURRENT_TIMESTAMP"),
                    )
                    .col(
                        ColumnDef::new(UsagePeriods::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT CURRENT_TIMESTAMP"),
                    )
                    .to_owned(),
            )
            .await?;

        // 同一サブスクリプション内で期間の順序は一意
        manager
            .create_index(
                Index::create()
                    .name("idx_usage_periods_subscription_id_sequence")
                    .table(UsagePeriods::Table)
                    .col(UsagePeriods::SubscriptionId)
                    .col(UsagePeriods::Sequence)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UsagePeriods::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum UsagePeriods {
    Table,
    Id,
    SubscriptionId,
    Sequence,
    PeriodStart,
    PeriodEnd,
    UnitsAllocated,
    UnitsUsed,
    UnitsRemaining,
    PromotionalUnitsUsed,
    LastUpdated,
    CreatedAt,
}
