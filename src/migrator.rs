use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_purchase_orders_table::Migration),
            Box::new(m20250601_000002_create_manufacturing_orders_table::Migration),
            Box::new(m20250601_000003_create_spks_table::Migration),
            Box::new(m20250601_000004_create_bom_tables::Migration),
            Box::new(m20250601_000005_create_material_ledger_tables::Migration),
            Box::new(m20250601_000006_create_material_debt_tables::Migration),
            Box::new(m20250601_000007_create_wip_buffers_table::Migration),
        ]
    }
}

// Migration implementations

mod m20250601_000001_create_purchase_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250601_000001_create_purchase_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::PoNumber).string().not_null())
                        .col(ColumnDef::new(PurchaseOrders::Kind).string().not_null())
                        .col(ColumnDef::new(PurchaseOrders::Status).string().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrders::Qty)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(PurchaseOrders::Week).string().null())
                        .col(ColumnDef::new(PurchaseOrders::Destination).string().null())
                        .col(ColumnDef::new(PurchaseOrders::ConsumedByMo).uuid().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::ReceivedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::UpdatedAt)
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
                        .name("idx_purchase_orders_po_number")
                        .table(PurchaseOrders::Table)
                        .col(PurchaseOrders::PoNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_orders_kind_status")
                        .table(PurchaseOrders::Table)
                        .col(PurchaseOrders::Kind)
                        .col(PurchaseOrders::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PurchaseOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PurchaseOrders {
        Table,
        Id,
        PoNumber,
        Kind,
        Status,
        Qty,
        Week,
        Destination,
        ConsumedByMo,
        ReceivedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250601_000002_create_manufacturing_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250601_000002_create_manufacturing_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ManufacturingOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ManufacturingOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ManufacturingOrders::OrderNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ManufacturingOrders::ArticleId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ManufacturingOrders::ArticleCode)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ManufacturingOrders::TargetQty)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ManufacturingOrders::BufferPercent)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ManufacturingOrders::FinalQty)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ManufacturingOrders::Week).string().null())
                        .col(
                            ColumnDef::new(ManufacturingOrders::Destination)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ManufacturingOrders::Status)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ManufacturingOrders::PoKainId).uuid().null())
                        .col(
                            ColumnDef::new(ManufacturingOrders::PoLabelId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ManufacturingOrders::AllocationRequestedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(ManufacturingOrders::CreatedBy).uuid().null())
                        .col(ColumnDef::new(ManufacturingOrders::UpdatedBy).uuid().null())
                        .col(
                            ColumnDef::new(ManufacturingOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ManufacturingOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ManufacturingOrders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_manufacturing_orders_order_number")
                        .table(ManufacturingOrders::Table)
                        .col(ManufacturingOrders::OrderNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // One MO per PO-Label: the unique binding lives in the schema.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_manufacturing_orders_po_label_id")
                        .table(ManufacturingOrders::Table)
                        .col(ManufacturingOrders::PoLabelId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_manufacturing_orders_status")
                        .table(ManufacturingOrders::Table)
                        .col(ManufacturingOrders::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ManufacturingOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ManufacturingOrders {
        Table,
        Id,
        OrderNumber,
        ArticleId,
        ArticleCode,
        TargetQty,
        BufferPercent,
        FinalQty,
        Week,
        Destination,
        Status,
        PoKainId,
        PoLabelId,
        AllocationRequestedAt,
        CreatedBy,
        UpdatedBy,
        CreatedAt,
        UpdatedAt,
        Version,
    }
}

mod m20250601_000003_create_spks_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250601_000003_create_spks_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Spks::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Spks::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Spks::SpkNumber).string().not_null())
                        .col(ColumnDef::new(Spks::MoId).uuid().not_null())
                        .col(ColumnDef::new(Spks::Department).string().not_null())
                        .col(ColumnDef::new(Spks::ArticleId).uuid().not_null())
                        .col(ColumnDef::new(Spks::ArticleCode).string().not_null())
                        .col(ColumnDef::new(Spks::Qty).integer().not_null())
                        .col(ColumnDef::new(Spks::Status).string().not_null())
                        .col(
                            ColumnDef::new(Spks::IssuedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Spks::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Spks::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_spks_mo_id")
                                .from(Spks::Table, Spks::MoId)
                                .to(ManufacturingOrders::Table, ManufacturingOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_spks_spk_number")
                        .table(Spks::Table)
                        .col(Spks::SpkNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // Fan-out idempotency: at most one SPK per MO per department.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_spks_mo_id_department")
                        .table(Spks::Table)
                        .col(Spks::MoId)
                        .col(Spks::Department)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Spks::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Spks {
        Table,
        Id,
        SpkNumber,
        MoId,
        Department,
        ArticleId,
        ArticleCode,
        Qty,
        Status,
        IssuedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ManufacturingOrders {
        Table,
        Id,
    }
}

mod m20250601_000004_create_bom_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250601_000004_create_bom_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Boms::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Boms::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Boms::ProductId).uuid().not_null())
                        .col(ColumnDef::new(Boms::BomType).string().not_null())
                        .col(
                            ColumnDef::new(Boms::QtyOutput)
                                .decimal()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(Boms::Revision).string().not_null())
                        .col(
                            ColumnDef::new(Boms::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Boms::SupportsMultiMaterial)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Boms::CreatedBy).uuid().null())
                        .col(
                            ColumnDef::new(Boms::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Boms::UpdatedAt)
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
                        .name("idx_boms_product_id_is_active")
                        .table(Boms::Table)
                        .col(Boms::ProductId)
                        .col(Boms::IsActive)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(BomDetails::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(BomDetails::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(BomDetails::BomId).uuid().not_null())
                        .col(ColumnDef::new(BomDetails::ComponentId).uuid().not_null())
                        .col(ColumnDef::new(BomDetails::QtyNeeded).decimal().not_null())
                        .col(
                            ColumnDef::new(BomDetails::WastagePercent)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(BomDetails::Department).string().null())
                        .col(
                            ColumnDef::new(BomDetails::HasVariants)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(BomDetails::VariantSelectionMode)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomDetails::Position)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(BomDetails::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomDetails::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bom_details_bom_id")
                                .from(BomDetails::Table, BomDetails::BomId)
                                .to(Boms::Table, Boms::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bom_details_bom_id")
                        .table(BomDetails::Table)
                        .col(BomDetails::BomId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(BomVariants::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BomVariants::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(BomVariants::DetailId).uuid().not_null())
                        .col(ColumnDef::new(BomVariants::MaterialId).uuid().not_null())
                        .col(ColumnDef::new(BomVariants::VariantType).string().not_null())
                        .col(
                            ColumnDef::new(BomVariants::Sequence)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(BomVariants::QtyVariance).decimal().null())
                        .col(
                            ColumnDef::new(BomVariants::QtyVariancePercent)
                                .decimal()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(BomVariants::Weight)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(BomVariants::CostVariance).decimal().null())
                        .col(
                            ColumnDef::new(BomVariants::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(BomVariants::ApprovalStatus)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomVariants::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BomVariants::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bom_variants_detail_id")
                                .from(BomVariants::Table, BomVariants::DetailId)
                                .to(BomDetails::Table, BomDetails::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bom_variants_detail_id")
                        .table(BomVariants::Table)
                        .col(BomVariants::DetailId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BomVariants::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(BomDetails::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Boms::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Boms {
        Table,
        Id,
        ProductId,
        BomType,
        QtyOutput,
        Revision,
        IsActive,
        SupportsMultiMaterial,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum BomDetails {
        Table,
        Id,
        BomId,
        ComponentId,
        QtyNeeded,
        WastagePercent,
        Department,
        HasVariants,
        VariantSelectionMode,
        Position,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum BomVariants {
        Table,
        Id,
        DetailId,
        MaterialId,
        VariantType,
        Sequence,
        QtyVariance,
        QtyVariancePercent,
        Weight,
        CostVariance,
        IsActive,
        ApprovalStatus,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250601_000005_create_material_ledger_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250601_000005_create_material_ledger_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(MaterialBalances::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(MaterialBalances::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MaterialBalances::MaterialId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MaterialBalances::Location)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MaterialBalances::OnHand)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(MaterialBalances::Allocated)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(MaterialBalances::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MaterialBalances::UpdatedAt)
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
                        .name("idx_material_balances_material_location")
                        .table(MaterialBalances::Table)
                        .col(MaterialBalances::MaterialId)
                        .col(MaterialBalances::Location)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(MaterialAllocations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(MaterialAllocations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MaterialAllocations::MoId).uuid().not_null())
                        .col(
                            ColumnDef::new(MaterialAllocations::MaterialId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MaterialAllocations::Department)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(MaterialAllocations::Qty).decimal().not_null())
                        .col(
                            ColumnDef::new(MaterialAllocations::Status)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MaterialAllocations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MaterialAllocations::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_material_allocations_mo_id")
                                .from(MaterialAllocations::Table, MaterialAllocations::MoId)
                                .to(ManufacturingOrders::Table, ManufacturingOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_material_allocations_mo_id")
                        .table(MaterialAllocations::Table)
                        .col(MaterialAllocations::MoId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(MaterialAllocations::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(MaterialBalances::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum MaterialBalances {
        Table,
        Id,
        MaterialId,
        Location,
        OnHand,
        Allocated,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum MaterialAllocations {
        Table,
        Id,
        MoId,
        MaterialId,
        Department,
        Qty,
        Status,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ManufacturingOrders {
        Table,
        Id,
    }
}

mod m20250601_000006_create_material_debt_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250601_000006_create_material_debt_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(MaterialDebts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(MaterialDebts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MaterialDebts::SpkId).uuid().not_null())
                        .col(ColumnDef::new(MaterialDebts::MaterialId).uuid().not_null())
                        .col(ColumnDef::new(MaterialDebts::Department).string().not_null())
                        .col(ColumnDef::new(MaterialDebts::QtyOwed).decimal().not_null())
                        .col(
                            ColumnDef::new(MaterialDebts::QtySettled)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(MaterialDebts::ApprovalStatus)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MaterialDebts::DebtStatus)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MaterialDebts::DueDate).date().null())
                        .col(ColumnDef::new(MaterialDebts::Reason).string().not_null())
                        .col(
                            ColumnDef::new(MaterialDebts::AllowProductionWhilePending)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(MaterialDebts::RequiresEscalation)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(MaterialDebts::ApprovalNotes).string().null())
                        .col(
                            ColumnDef::new(MaterialDebts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MaterialDebts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MaterialDebts::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_material_debts_spk_material")
                        .table(MaterialDebts::Table)
                        .col(MaterialDebts::SpkId)
                        .col(MaterialDebts::MaterialId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_material_debts_approval_status")
                        .table(MaterialDebts::Table)
                        .col(MaterialDebts::ApprovalStatus)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(DebtSettlements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DebtSettlements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DebtSettlements::DebtId).uuid().not_null())
                        .col(
                            ColumnDef::new(DebtSettlements::SettlementDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DebtSettlements::QtyReceived)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DebtSettlements::QtySettledAfter)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DebtSettlements::Notes).string().null())
                        .col(ColumnDef::new(DebtSettlements::RecordedBy).uuid().null())
                        .col(
                            ColumnDef::new(DebtSettlements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_debt_settlements_debt_id")
                                .from(DebtSettlements::Table, DebtSettlements::DebtId)
                                .to(MaterialDebts::Table, MaterialDebts::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_debt_settlements_debt_id")
                        .table(DebtSettlements::Table)
                        .col(DebtSettlements::DebtId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DebtSettlements::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(MaterialDebts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum MaterialDebts {
        Table,
        Id,
        SpkId,
        MaterialId,
        Department,
        QtyOwed,
        QtySettled,
        ApprovalStatus,
        DebtStatus,
        DueDate,
        Reason,
        AllowProductionWhilePending,
        RequiresEscalation,
        ApprovalNotes,
        CreatedAt,
        UpdatedAt,
        Version,
    }

    #[derive(DeriveIden)]
    enum DebtSettlements {
        Table,
        Id,
        DebtId,
        SettlementDate,
        QtyReceived,
        QtySettledAfter,
        Notes,
        RecordedBy,
        CreatedAt,
    }
}

mod m20250601_000007_create_wip_buffers_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250601_000007_create_wip_buffers_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(WipBuffers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(WipBuffers::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(WipBuffers::Department).string().not_null())
                        .col(ColumnDef::new(WipBuffers::ArticleId).uuid().not_null())
                        .col(ColumnDef::new(WipBuffers::ArticleCode).string().not_null())
                        .col(ColumnDef::new(WipBuffers::SpkId).uuid().not_null())
                        .col(
                            ColumnDef::new(WipBuffers::BufferStock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(WipBuffers::CumulativeProduced)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(WipBuffers::CumulativeConsumed)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(WipBuffers::TargetQty)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(WipBuffers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WipBuffers::UpdatedAt)
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
                        .name("idx_wip_buffers_dept_article_spk")
                        .table(WipBuffers::Table)
                        .col(WipBuffers::Department)
                        .col(WipBuffers::ArticleId)
                        .col(WipBuffers::SpkId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_wip_buffers_article_code")
                        .table(WipBuffers::Table)
                        .col(WipBuffers::ArticleCode)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WipBuffers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum WipBuffers {
        Table,
        Id,
        Department,
        ArticleId,
        ArticleCode,
        SpkId,
        BufferStock,
        CumulativeProduced,
        CumulativeConsumed,
        TargetQty,
        CreatedAt,
        UpdatedAt,
    }
}
