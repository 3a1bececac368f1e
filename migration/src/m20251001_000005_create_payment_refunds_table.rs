use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 返金は追記のみ（更新・削除は行わない）
        manager
            .create_table(
                Table::create()
                    .table(PaymentRefunds::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PaymentRefunds::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(PaymentRefunds::PaymentId).uuid().not_null())
                    .col(ColumnDef::new(PaymentRefunds::RefundId).string().not_null())
                    .col(
                        ColumnDef::new(PaymentRefunds::Amount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentRefunds::Currency)
                            .string_len(3)
                            .not_null(),
                    )
                    .col(ColumnDef::new(PaymentRefunds::Status).string().not_null())
                    .col(
                        ColumnDef::new(PaymentRefunds::IdempotencyKey)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PaymentRefunds::Reason).text().null())
                    .col(
                        ColumnDef::new(PaymentRefunds::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT CURRENT_TIMESTAMP"),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_payment_refunds_payment_id_refund_id")
                    .table(PaymentRefunds::Table)
                    .col(PaymentRefunds::PaymentId)
                    .col(PaymentRefunds::RefundId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PaymentRefunds::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum PaymentRefunds {
    Table,
    Id,
    PaymentId,
    RefundId,
    Amount,
    Currency,
    Status,
    IdempotencyKey,
    Reason,
    CreatedAt,
}
