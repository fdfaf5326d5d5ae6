use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Blocks::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Blocks::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Blocks::Active)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Blocks::Notice).json_binary().not_null())
                    .col(ColumnDef::new(Blocks::PendingCodeId).uuid())
                    .col(ColumnDef::new(Blocks::CreatedBy).uuid().not_null())
                    .col(
                        ColumnDef::new(Blocks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Blocks::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // At most one active block. Partial unique index: every active row has the
        // same key (`true`), inactive rows are outside the index.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS ux_blocks_single_active \
                 ON blocks (active) WHERE active",
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Blocks::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Blocks {
    Table,
    Id,
    Active,
    Notice,
    PendingCodeId,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}
