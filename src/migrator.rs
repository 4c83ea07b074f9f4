use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_items_table::Migration),
            Box::new(m20240101_000002_create_neighbors_table::Migration),
            Box::new(m20240101_000003_create_purchases_tables::Migration),
            Box::new(m20240101_000004_create_neighbor_history_table::Migration),
            Box::new(m20240101_000005_create_edit_log_tables::Migration),
        ]
    }
}

mod m20240101_000001_create_items_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Items::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Items::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Items::ItemNo).string().not_null())
                        .col(ColumnDef::new(Items::Name).string().not_null())
                        .col(ColumnDef::new(Items::Unit).string().not_null())
                        .col(
                            ColumnDef::new(Items::GrossUnitWeight)
                                .double()
                                .not_null()
                                .default(0.0),
                        )
                        .col(ColumnDef::new(Items::Category).string().not_null())
                        .col(
                            ColumnDef::new(Items::CurrentQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Items::LastRestockQuantity).integer().null())
                        .col(
                            ColumnDef::new(Items::LastRestockDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Items::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Items::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_items_name")
                        .table(Items::Table)
                        .col(Items::Name)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Items::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Items {
        Table,
        Id,
        ItemNo,
        Name,
        Unit,
        GrossUnitWeight,
        Category,
        CurrentQuantity,
        LastRestockQuantity,
        LastRestockDate,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_neighbors_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_neighbors_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Neighbors::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Neighbors::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Neighbors::Name).string().null())
                        .col(ColumnDef::new(Neighbors::Dob).date().null())
                        .col(ColumnDef::new(Neighbors::Age).integer().not_null())
                        .col(ColumnDef::new(Neighbors::Gender).string().not_null())
                        .col(ColumnDef::new(Neighbors::Zipcode).string().not_null())
                        .col(
                            ColumnDef::new(Neighbors::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Sale flow resolves neighbors by (name, dob)
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_neighbors_name_dob")
                        .table(Neighbors::Table)
                        .col(Neighbors::Name)
                        .col(Neighbors::Dob)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Neighbors::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Neighbors {
        Table,
        Id,
        Name,
        Dob,
        Age,
        Gender,
        Zipcode,
        CreatedAt,
    }
}

mod m20240101_000003_create_purchases_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_purchases_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // neighbor_id is an opaque reference: deleting a neighbor keeps the ledger intact
            manager
                .create_table(
                    Table::create()
                        .table(Purchases::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Purchases::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Purchases::NeighborId).uuid().not_null())
                        .col(
                            ColumnDef::new(Purchases::PurchaseDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchases_purchase_date")
                        .table(Purchases::Table)
                        .col(Purchases::PurchaseDate)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchases_neighbor_id")
                        .table(Purchases::Table)
                        .col(Purchases::NeighborId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PurchaseLineItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseLineItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseLineItems::PurchaseId).uuid().not_null())
                        .col(ColumnDef::new(PurchaseLineItems::ItemId).uuid().not_null())
                        .col(ColumnDef::new(PurchaseLineItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(PurchaseLineItems::StartQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseLineItems::Position)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_purchase_line_items_purchase_id")
                                .from(PurchaseLineItems::Table, PurchaseLineItems::PurchaseId)
                                .to(Purchases::Table, Purchases::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_line_items_item_id")
                        .table(PurchaseLineItems::Table)
                        .col(PurchaseLineItems::ItemId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_line_items_purchase_id")
                        .table(PurchaseLineItems::Table)
                        .col(PurchaseLineItems::PurchaseId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PurchaseLineItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Purchases::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Purchases {
        Table,
        Id,
        NeighborId,
        PurchaseDate,
    }

    #[derive(DeriveIden)]
    enum PurchaseLineItems {
        Table,
        Id,
        PurchaseId,
        ItemId,
        Quantity,
        StartQuantity,
        Position,
    }
}

mod m20240101_000004_create_neighbor_history_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_neighbor_history_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(NeighborHistory::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(NeighborHistory::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(NeighborHistory::NeighborId).uuid().not_null())
                        .col(ColumnDef::new(NeighborHistory::PurchaseId).uuid().not_null())
                        .col(ColumnDef::new(NeighborHistory::Position).integer().not_null())
                        .col(
                            ColumnDef::new(NeighborHistory::LinkedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_neighbor_history_neighbor_id")
                                .from(NeighborHistory::Table, NeighborHistory::NeighborId)
                                .to(Neighbors::Table, Neighbors::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_neighbor_history_purchase_id")
                                .from(NeighborHistory::Table, NeighborHistory::PurchaseId)
                                .to(Purchases::Table, Purchases::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_neighbor_history_neighbor_id")
                        .table(NeighborHistory::Table)
                        .col(NeighborHistory::NeighborId)
                        .col(NeighborHistory::Position)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(NeighborHistory::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum NeighborHistory {
        Table,
        Id,
        NeighborId,
        PurchaseId,
        Position,
        LinkedAt,
    }

    #[derive(DeriveIden)]
    enum Neighbors {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Purchases {
        Table,
        Id,
    }
}

mod m20240101_000005_create_edit_log_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_edit_log_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(EditLogs::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(EditLogs::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(EditLogs::EditedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(EditLogs::Editor).string().not_null())
                        .col(
                            ColumnDef::new(EditLogs::Restock)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .to_owned(),
                )
                .await?;

            // item_id is a snapshot value, not a live reference
            manager
                .create_table(
                    Table::create()
                        .table(EditLogChanges::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(EditLogChanges::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(EditLogChanges::EditLogId).uuid().not_null())
                        .col(ColumnDef::new(EditLogChanges::ItemId).uuid().not_null())
                        .col(ColumnDef::new(EditLogChanges::PrevName).string().not_null())
                        .col(
                            ColumnDef::new(EditLogChanges::PrevQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(EditLogChanges::NewName).string().not_null())
                        .col(
                            ColumnDef::new(EditLogChanges::NewQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(EditLogChanges::Position).integer().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_edit_log_changes_edit_log_id")
                                .from(EditLogChanges::Table, EditLogChanges::EditLogId)
                                .to(EditLogs::Table, EditLogs::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_edit_log_changes_edit_log_id")
                        .table(EditLogChanges::Table)
                        .col(EditLogChanges::EditLogId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(EditLogChanges::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(EditLogs::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum EditLogs {
        Table,
        Id,
        EditedAt,
        Editor,
        Restock,
    }

    #[derive(DeriveIden)]
    enum EditLogChanges {
        Table,
        Id,
        EditLogId,
        ItemId,
        PrevName,
        PrevQuantity,
        NewName,
        NewQuantity,
        Position,
    }
}
