use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Emails::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Emails::EmailId)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .default(Expr::cust("gen_random_uuid()")),
                    )
                    .col(string_len(Emails::AddressFrom, 255))
                    .col(string_len(Emails::AddressTo, 255))
                    .col(string_len(Emails::Subject, 255))
                    .col(text(Emails::Message))
                    .col(
                        timestamp_with_time_zone(Emails::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Full-text search column, kept in sync by Postgres
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                ALTER TABLE emails ADD COLUMN IF NOT EXISTS document_with_idx tsvector
                GENERATED ALWAYS AS (
                    to_tsvector('english',
                        address_from || ' ' || address_to || ' ' || subject || ' ' || message)
                ) STORED
                "#,
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX IF NOT EXISTS idx_emails_document ON emails USING GIN (document_with_idx)",
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_emails_created_at")
                    .table(Emails::Table)
                    .col(Emails::CreatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Emails::Table).if_exists().to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Emails {
    Table,
    EmailId,
    AddressFrom,
    AddressTo,
    Subject,
    Message,
    CreatedAt,
}
