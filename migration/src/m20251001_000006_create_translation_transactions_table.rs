use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TranslationTransactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TranslationTransactions::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(
                        ColumnDef::new(TranslationTransactions::IdempotencyKey)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TranslationTransactions::CompanyName)
                            .string()
                            .null(),
                    )
                    .col(ColumnDef::new(TranslationTransactions::UserId).uuid().null())
                    .col(
                        ColumnDef::new(TranslationTransactions::SubscriptionId)
                            .uuid()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TranslationTransactions::UsagePeriodId)
                            .uuid()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TranslationTransactions::PaymentId)
                            .uuid()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TranslationTransactions::Units)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TranslationTransactions::PromotionalUnits)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(TranslationTransactions::SourceLanguage)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TranslationTransactions::TargetLanguage)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TranslationTransactions::Status)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TranslationTransactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT CURRENT_TIMESTAMP"),
                    )
                    .to_owned(),
            )
            .await?;

        // 消費記録は冪等キーごとに高々1件
        manager
            .create_index(
                Index::create()
                    .name("idx_translation_transactions_idempotency_key")
                    .table(TranslationTransactions::Table)
                    .col(TranslationTransactions::IdempotencyKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_translation_transactions_subscription_id")
                    .table(TranslationTransactions::Table)
                    .col(TranslationTransactions::SubscriptionId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TranslationTransactions::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum TranslationTransactions {
    Table,
    Id,
    IdempotencyKey,
    CompanyName,
    UserId,
    SubscriptionId,
    UsagePeriodId,
    PaymentId,
    Units,
    PromotionalUnits,
    SourceLanguage,
    TargetLanguage,
    Status,
    CreatedAt,
}
