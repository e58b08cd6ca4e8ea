use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_tenancy_tables::Migration),
            Box::new(m20240101_000002_create_catalog_tables::Migration),
            Box::new(m20240101_000003_create_stock_tables::Migration),
            Box::new(m20240101_000004_create_order_tables::Migration),
            Box::new(m20240101_000005_create_payment_tables::Migration),
            Box::new(m20240101_000006_create_procurement_tables::Migration),
        ]
    }
}

/// Columns shared by every business table.
mod envelope {
    use sea_orm_migration::prelude::*;

    #[derive(DeriveIden)]
    pub(super) enum Envelope {
        Id,
        Uuid,
        CreatedAt,
        UpdatedAt,
        DeletedAt,
        CreatedBy,
        UpdatedBy,
        DeletedBy,
    }

    pub(super) fn key_columns(table: &mut TableCreateStatement) {
        table
            .col(
                ColumnDef::new(Envelope::Id)
                    .integer()
                    .not_null()
                    .auto_increment()
                    .primary_key(),
            )
            .col(ColumnDef::new(Envelope::Uuid).uuid().not_null().unique_key());
    }

    pub(super) fn audit_columns(table: &mut TableCreateStatement) {
        table
            .col(
                ColumnDef::new(Envelope::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null(),
            )
            .col(
                ColumnDef::new(Envelope::UpdatedAt)
                    .timestamp_with_time_zone()
                    .not_null(),
            )
            .col(
                ColumnDef::new(Envelope::DeletedAt)
                    .timestamp_with_time_zone()
                    .null(),
            )
            .col(ColumnDef::new(Envelope::CreatedBy).integer().null())
            .col(ColumnDef::new(Envelope::UpdatedBy).integer().null())
            .col(ColumnDef::new(Envelope::DeletedBy).integer().null());
    }

    /// Fixed-point amount. SQLite caps decimal precision at 16 digits.
    pub(super) fn money<T: IntoIden>(name: T) -> ColumnDef {
        ColumnDef::new(name)
            .decimal_len(16, 4)
            .not_null()
            .default(0)
            .to_owned()
    }

    pub(super) fn index<T, C>(
        name: &str,
        table: T,
        cols: impl IntoIterator<Item = C>,
    ) -> IndexCreateStatement
    where
        T: IntoIden + 'static,
        C: IntoIden + 'static,
    {
        let mut index = Index::create();
        index.if_not_exists().name(name).table(table);
        for col in cols {
            index.col(col);
        }
        index.to_owned()
    }
}

mod m20240101_000001_create_tenancy_tables {
    use super::envelope::{audit_columns, index, key_columns, Envelope};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_tenancy_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let mut users = Table::create();
            users.table(Users::Table).if_not_exists();
            key_columns(&mut users);
            users
                .col(ColumnDef::new(Users::Name).string().not_null())
                .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                .col(ColumnDef::new(Users::Role).string().not_null())
                .col(ColumnDef::new(Users::OwnerId).integer().null())
                .col(
                    ColumnDef::new(Users::TrackAddOnStock)
                        .boolean()
                        .not_null()
                        .default(false),
                )
                .col(
                    ColumnDef::new(Users::EmailVerifiedAt)
                        .timestamp_with_time_zone()
                        .null(),
                );
            audit_columns(&mut users);
            manager.create_table(users).await?;

            manager
                .create_index(index("idx_users_owner_id", Users::Table, [Users::OwnerId]))
                .await?;

            let mut outlets = Table::create();
            outlets.table(Outlets::Table).if_not_exists();
            key_columns(&mut outlets);
            outlets
                .col(ColumnDef::new(Outlets::OwnerId).integer().not_null())
                .col(ColumnDef::new(Outlets::Name).string().not_null())
                .col(ColumnDef::new(Outlets::Address).string().null())
                .col(ColumnDef::new(Outlets::OutletType).string().not_null())
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_outlets_owner_id")
                        .from(Outlets::Table, Outlets::OwnerId)
                        .to(Users::Table, Envelope::Id)
                        .on_delete(ForeignKeyAction::Restrict),
                );
            audit_columns(&mut outlets);
            manager.create_table(outlets).await?;

            manager
                .create_index(index(
                    "idx_outlets_owner_id",
                    Outlets::Table,
                    [Outlets::OwnerId],
                ))
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Outlets::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(crate) enum Users {
        Table,
        Name,
        Email,
        PasswordHash,
        Role,
        OwnerId,
        TrackAddOnStock,
        EmailVerifiedAt,
    }

    #[derive(DeriveIden)]
    pub(crate) enum Outlets {
        Table,
        OwnerId,
        Name,
        Address,
        OutletType,
    }
}

mod m20240101_000002_create_catalog_tables {
    use super::envelope::{audit_columns, index, key_columns, money, Envelope};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let mut products = Table::create();
            products.table(Products::Table).if_not_exists();
            key_columns(&mut products);
            products
                .col(ColumnDef::new(Products::OwnerId).integer().not_null())
                .col(ColumnDef::new(Products::Name).string().not_null())
                .col(ColumnDef::new(Products::Sku).string().not_null())
                .col(ColumnDef::new(Products::ProductType).string().not_null())
                .col(money(Products::Price))
                .col(ColumnDef::new(Products::Unit).string().null());
            audit_columns(&mut products);
            manager.create_table(products).await?;

            manager
                .create_index(index(
                    "idx_products_owner_sku",
                    Products::Table,
                    [Products::OwnerId, Products::Sku],
                ))
                .await?;

            let mut variants = Table::create();
            variants.table(ProductVariants::Table).if_not_exists();
            key_columns(&mut variants);
            variants
                .col(ColumnDef::new(ProductVariants::OwnerId).integer().not_null())
                .col(ColumnDef::new(ProductVariants::ProductId).integer().not_null())
                .col(ColumnDef::new(ProductVariants::Name).string().not_null())
                .col(ColumnDef::new(ProductVariants::Sku).string().not_null())
                .col(money(ProductVariants::Price))
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_product_variants_product_id")
                        .from(ProductVariants::Table, ProductVariants::ProductId)
                        .to(Products::Table, Envelope::Id)
                        .on_delete(ForeignKeyAction::Cascade),
                );
            audit_columns(&mut variants);
            manager.create_table(variants).await?;

            manager
                .create_index(index(
                    "idx_product_variants_product_id",
                    ProductVariants::Table,
                    [ProductVariants::ProductId],
                ))
                .await?;

            let mut add_ons = Table::create();
            add_ons.table(ProductAddOns::Table).if_not_exists();
            key_columns(&mut add_ons);
            add_ons
                .col(ColumnDef::new(ProductAddOns::OwnerId).integer().not_null())
                .col(ColumnDef::new(ProductAddOns::ProductId).integer().not_null())
                .col(
                    ColumnDef::new(ProductAddOns::AddOnProductId)
                        .integer()
                        .not_null(),
                )
                .col(money(ProductAddOns::Price))
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_product_add_ons_product_id")
                        .from(ProductAddOns::Table, ProductAddOns::ProductId)
                        .to(Products::Table, Envelope::Id)
                        .on_delete(ForeignKeyAction::Cascade),
                )
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_product_add_ons_add_on_product_id")
                        .from(ProductAddOns::Table, ProductAddOns::AddOnProductId)
                        .to(Products::Table, Envelope::Id)
                        .on_delete(ForeignKeyAction::Cascade),
                );
            audit_columns(&mut add_ons);
            manager.create_table(add_ons).await?;

            let mut recipes = Table::create();
            recipes.table(Recipes::Table).if_not_exists();
            key_columns(&mut recipes);
            recipes
                .col(ColumnDef::new(Recipes::OwnerId).integer().not_null())
                .col(ColumnDef::new(Recipes::MainProductId).integer().not_null())
                .col(
                    ColumnDef::new(Recipes::ComponentProductId)
                        .integer()
                        .not_null(),
                )
                .col(money(Recipes::Quantity))
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_recipes_main_product_id")
                        .from(Recipes::Table, Recipes::MainProductId)
                        .to(Products::Table, Envelope::Id)
                        .on_delete(ForeignKeyAction::Cascade),
                )
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_recipes_component_product_id")
                        .from(Recipes::Table, Recipes::ComponentProductId)
                        .to(Products::Table, Envelope::Id)
                        .on_delete(ForeignKeyAction::Cascade),
                );
            audit_columns(&mut recipes);
            manager.create_table(recipes).await?;

            manager
                .create_index(
                    index(
                        "idx_recipes_main_component",
                        Recipes::Table,
                        [Recipes::MainProductId, Recipes::ComponentProductId],
                    )
                    .unique()
                    .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Recipes::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProductAddOns::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProductVariants::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(crate) enum Products {
        Table,
        OwnerId,
        Name,
        Sku,
        ProductType,
        Price,
        Unit,
    }

    #[derive(DeriveIden)]
    enum ProductVariants {
        Table,
        OwnerId,
        ProductId,
        Name,
        Sku,
        Price,
    }

    #[derive(DeriveIden)]
    enum ProductAddOns {
        Table,
        OwnerId,
        ProductId,
        AddOnProductId,
        Price,
    }

    #[derive(DeriveIden)]
    enum Recipes {
        Table,
        OwnerId,
        MainProductId,
        ComponentProductId,
        Quantity,
    }
}

mod m20240101_000003_create_stock_tables {
    use super::envelope::{audit_columns, index, key_columns, money, Envelope};
    use super::m20240101_000001_create_tenancy_tables::Outlets;
    use super::m20240101_000002_create_catalog_tables::Products;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_stock_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let mut stocks = Table::create();
            stocks.table(Stocks::Table).if_not_exists();
            key_columns(&mut stocks);
            stocks
                .col(ColumnDef::new(Stocks::OwnerId).integer().not_null())
                .col(ColumnDef::new(Stocks::OutletId).integer().not_null())
                .col(ColumnDef::new(Stocks::ProductId).integer().not_null())
                .col(money(Stocks::Quantity))
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_stocks_outlet_id")
                        .from(Stocks::Table, Stocks::OutletId)
                        .to(Outlets::Table, Envelope::Id)
                        .on_delete(ForeignKeyAction::Cascade),
                )
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_stocks_product_id")
                        .from(Stocks::Table, Stocks::ProductId)
                        .to(Products::Table, Envelope::Id)
                        .on_delete(ForeignKeyAction::Cascade),
                );
            audit_columns(&mut stocks);
            manager.create_table(stocks).await?;

            manager
                .create_index(
                    index(
                        "idx_stocks_outlet_product",
                        Stocks::Table,
                        [Stocks::OutletId, Stocks::ProductId],
                    )
                    .unique()
                    .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Envelope::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Envelope::Uuid).uuid().not_null().unique_key())
                        .col(ColumnDef::new(StockMovements::OwnerId).integer().not_null())
                        .col(ColumnDef::new(StockMovements::OutletId).integer().not_null())
                        .col(ColumnDef::new(StockMovements::ProductId).integer().not_null())
                        .col(money(StockMovements::Delta))
                        .col(money(StockMovements::QuantityAfter))
                        .col(ColumnDef::new(StockMovements::Reason).string().not_null())
                        .col(ColumnDef::new(StockMovements::Reference).string().not_null())
                        .col(ColumnDef::new(StockMovements::Note).string().null())
                        .col(
                            ColumnDef::new(Envelope::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Envelope::CreatedBy).integer().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(index(
                    "idx_stock_movements_outlet_product",
                    StockMovements::Table,
                    [StockMovements::OutletId, StockMovements::ProductId],
                ))
                .await?;

            manager
                .create_index(index(
                    "idx_stock_movements_reference",
                    StockMovements::Table,
                    [StockMovements::Reference],
                ))
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Stocks::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Stocks {
        Table,
        OwnerId,
        OutletId,
        ProductId,
        Quantity,
    }

    #[derive(DeriveIden)]
    enum StockMovements {
        Table,
        OwnerId,
        OutletId,
        ProductId,
        Delta,
        QuantityAfter,
        Reason,
        Reference,
        Note,
    }
}

mod m20240101_000004_create_order_tables {
    use super::envelope::{audit_columns, index, key_columns, money, Envelope};
    use super::m20240101_000001_create_tenancy_tables::Outlets;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let mut orders = Table::create();
            orders.table(Orders::Table).if_not_exists();
            key_columns(&mut orders);
            orders
                .col(ColumnDef::new(Orders::OwnerId).integer().not_null())
                .col(ColumnDef::new(Orders::OutletId).integer().not_null())
                .col(money(Orders::Total))
                .col(money(Orders::PaidTotal))
                .col(ColumnDef::new(Orders::Status).string().not_null())
                .col(
                    ColumnDef::new(Orders::CompletedAt)
                        .timestamp_with_time_zone()
                        .null(),
                )
                .col(
                    ColumnDef::new(Orders::CancelledAt)
                        .timestamp_with_time_zone()
                        .null(),
                )
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_orders_outlet_id")
                        .from(Orders::Table, Orders::OutletId)
                        .to(Outlets::Table, Envelope::Id)
                        .on_delete(ForeignKeyAction::Restrict),
                );
            audit_columns(&mut orders);
            manager.create_table(orders).await?;

            manager
                .create_index(index(
                    "idx_orders_owner_outlet",
                    Orders::Table,
                    [Orders::OwnerId, Orders::OutletId],
                ))
                .await?;

            manager
                .create_index(index(
                    "idx_orders_created_at",
                    Orders::Table,
                    [Envelope::CreatedAt],
                ))
                .await?;

            let mut lines = Table::create();
            lines.table(OrderLines::Table).if_not_exists();
            key_columns(&mut lines);
            lines
                .col(ColumnDef::new(OrderLines::OrderId).integer().not_null())
                .col(ColumnDef::new(OrderLines::ProductId).integer().not_null())
                .col(ColumnDef::new(OrderLines::VariantId).integer().null())
                .col(money(OrderLines::UnitPrice))
                .col(ColumnDef::new(OrderLines::Quantity).integer().not_null())
                .col(money(OrderLines::Total))
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_order_lines_order_id")
                        .from(OrderLines::Table, OrderLines::OrderId)
                        .to(Orders::Table, Envelope::Id)
                        .on_delete(ForeignKeyAction::Cascade),
                );
            audit_columns(&mut lines);
            manager.create_table(lines).await?;

            manager
                .create_index(index(
                    "idx_order_lines_order_id",
                    OrderLines::Table,
                    [OrderLines::OrderId],
                ))
                .await?;

            manager
                .create_index(index(
                    "idx_order_lines_product_id",
                    OrderLines::Table,
                    [OrderLines::ProductId],
                ))
                .await?;

            let mut add_ons = Table::create();
            add_ons.table(OrderLineAddOns::Table).if_not_exists();
            key_columns(&mut add_ons);
            add_ons
                .col(
                    ColumnDef::new(OrderLineAddOns::OrderLineId)
                        .integer()
                        .not_null(),
                )
                .col(
                    ColumnDef::new(OrderLineAddOns::ProductAddOnId)
                        .integer()
                        .not_null(),
                )
                .col(
                    ColumnDef::new(OrderLineAddOns::AddOnProductId)
                        .integer()
                        .not_null(),
                )
                .col(money(OrderLineAddOns::Price))
                .col(
                    ColumnDef::new(OrderLineAddOns::Quantity)
                        .integer()
                        .not_null(),
                )
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_order_line_add_ons_order_line_id")
                        .from(OrderLineAddOns::Table, OrderLineAddOns::OrderLineId)
                        .to(OrderLines::Table, Envelope::Id)
                        .on_delete(ForeignKeyAction::Cascade),
                );
            audit_columns(&mut add_ons);
            manager.create_table(add_ons).await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderLineAddOns::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(crate) enum Orders {
        Table,
        OwnerId,
        OutletId,
        Total,
        PaidTotal,
        Status,
        CompletedAt,
        CancelledAt,
    }

    #[derive(DeriveIden)]
    enum OrderLines {
        Table,
        OrderId,
        ProductId,
        VariantId,
        UnitPrice,
        Quantity,
        Total,
    }

    #[derive(DeriveIden)]
    enum OrderLineAddOns {
        Table,
        OrderLineId,
        ProductAddOnId,
        AddOnProductId,
        Price,
        Quantity,
    }
}

mod m20240101_000005_create_payment_tables {
    use super::envelope::{audit_columns, index, key_columns, money, Envelope};
    use super::m20240101_000004_create_order_tables::Orders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_payment_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PaymentMethods::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Envelope::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Envelope::Uuid).uuid().not_null().unique_key())
                        .col(
                            ColumnDef::new(PaymentMethods::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(PaymentMethods::Name).string().not_null())
                        .col(ColumnDef::new(PaymentMethods::Channel).string().not_null())
                        .col(ColumnDef::new(PaymentMethods::Issuer).string().not_null())
                        .col(
                            ColumnDef::new(PaymentMethods::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Envelope::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Envelope::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Envelope::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            let mut payments = Table::create();
            payments.table(OrderPayments::Table).if_not_exists();
            key_columns(&mut payments);
            payments
                .col(ColumnDef::new(OrderPayments::OwnerId).integer().not_null())
                .col(ColumnDef::new(OrderPayments::OrderId).integer().not_null())
                .col(
                    ColumnDef::new(OrderPayments::PaymentMethodId)
                        .integer()
                        .not_null(),
                )
                .col(money(OrderPayments::AmountPaid))
                .col(money(OrderPayments::ChangeAmount))
                .col(ColumnDef::new(OrderPayments::CustomerName).string().null())
                .col(ColumnDef::new(OrderPayments::CustomerPhone).string().null())
                .col(ColumnDef::new(OrderPayments::CustomerEmail).string().null())
                .col(
                    ColumnDef::new(OrderPayments::IsPaid)
                        .boolean()
                        .not_null()
                        .default(false),
                )
                .col(
                    ColumnDef::new(OrderPayments::PaidAt)
                        .timestamp_with_time_zone()
                        .null(),
                )
                .col(ColumnDef::new(OrderPayments::Status).string().not_null())
                .col(
                    ColumnDef::new(OrderPayments::ReferenceId)
                        .string()
                        .not_null()
                        .unique_key(),
                )
                .col(
                    ColumnDef::new(OrderPayments::GatewayReference)
                        .string()
                        .null(),
                )
                .col(ColumnDef::new(OrderPayments::PaymentUrl).string().null())
                .col(ColumnDef::new(OrderPayments::Extra).json().null())
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_order_payments_order_id")
                        .from(OrderPayments::Table, OrderPayments::OrderId)
                        .to(Orders::Table, Envelope::Id)
                        .on_delete(ForeignKeyAction::Restrict),
                )
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_order_payments_payment_method_id")
                        .from(OrderPayments::Table, OrderPayments::PaymentMethodId)
                        .to(PaymentMethods::Table, Envelope::Id)
                        .on_delete(ForeignKeyAction::Restrict),
                );
            audit_columns(&mut payments);
            manager.create_table(payments).await?;

            manager
                .create_index(index(
                    "idx_order_payments_order_id",
                    OrderPayments::Table,
                    [OrderPayments::OrderId],
                ))
                .await?;

            let mut activations = Table::create();
            activations.table(UserPaymentMethods::Table).if_not_exists();
            key_columns(&mut activations);
            activations
                .col(
                    ColumnDef::new(UserPaymentMethods::OwnerId)
                        .integer()
                        .not_null(),
                )
                .col(
                    ColumnDef::new(UserPaymentMethods::PaymentMethodId)
                        .integer()
                        .not_null(),
                )
                .col(
                    ColumnDef::new(UserPaymentMethods::IsActive)
                        .boolean()
                        .not_null()
                        .default(true),
                )
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_user_payment_methods_payment_method_id")
                        .from(UserPaymentMethods::Table, UserPaymentMethods::PaymentMethodId)
                        .to(PaymentMethods::Table, Envelope::Id)
                        .on_delete(ForeignKeyAction::Cascade),
                );
            audit_columns(&mut activations);
            manager.create_table(activations).await?;

            manager
                .create_index(
                    index(
                        "idx_user_payment_methods_owner_method",
                        UserPaymentMethods::Table,
                        [
                            UserPaymentMethods::OwnerId,
                            UserPaymentMethods::PaymentMethodId,
                        ],
                    )
                    .unique()
                    .to_owned(),
                )
                .await?;

            let mut accounts = Table::create();
            accounts.table(GatewayAccounts::Table).if_not_exists();
            key_columns(&mut accounts);
            accounts
                .col(ColumnDef::new(GatewayAccounts::OwnerId).integer().not_null())
                .col(ColumnDef::new(GatewayAccounts::Issuer).string().not_null())
                .col(
                    ColumnDef::new(GatewayAccounts::ExternalAccountId)
                        .string()
                        .not_null(),
                )
                .col(
                    ColumnDef::new(GatewayAccounts::VirtualAccount)
                        .string()
                        .null(),
                );
            audit_columns(&mut accounts);
            manager.create_table(accounts).await?;

            manager
                .create_index(
                    index(
                        "idx_gateway_accounts_owner_issuer",
                        GatewayAccounts::Table,
                        [GatewayAccounts::OwnerId, GatewayAccounts::Issuer],
                    )
                    .unique()
                    .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(GatewayLogs::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Envelope::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Envelope::Uuid).uuid().not_null().unique_key())
                        .col(ColumnDef::new(GatewayLogs::Issuer).string().not_null())
                        .col(ColumnDef::new(GatewayLogs::ServiceName).string().not_null())
                        .col(ColumnDef::new(GatewayLogs::Reference).string().not_null())
                        .col(money(GatewayLogs::Amount))
                        .col(ColumnDef::new(GatewayLogs::Method).string().not_null())
                        .col(ColumnDef::new(GatewayLogs::Channel).string().not_null())
                        .col(ColumnDef::new(GatewayLogs::ResponseStatus).integer().null())
                        .col(
                            ColumnDef::new(GatewayLogs::RequestAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GatewayLogs::SuccessAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(GatewayLogs::SettlementAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(index(
                    "idx_gateway_logs_reference",
                    GatewayLogs::Table,
                    [GatewayLogs::Reference],
                ))
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(GatewayLogs::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(GatewayAccounts::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(UserPaymentMethods::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderPayments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PaymentMethods::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PaymentMethods {
        Table,
        Code,
        Name,
        Channel,
        Issuer,
        IsActive,
    }

    #[derive(DeriveIden)]
    enum OrderPayments {
        Table,
        OwnerId,
        OrderId,
        PaymentMethodId,
        AmountPaid,
        ChangeAmount,
        CustomerName,
        CustomerPhone,
        CustomerEmail,
        IsPaid,
        PaidAt,
        Status,
        ReferenceId,
        GatewayReference,
        PaymentUrl,
        Extra,
    }

    #[derive(DeriveIden)]
    enum UserPaymentMethods {
        Table,
        OwnerId,
        PaymentMethodId,
        IsActive,
    }

    #[derive(DeriveIden)]
    enum GatewayAccounts {
        Table,
        OwnerId,
        Issuer,
        ExternalAccountId,
        VirtualAccount,
    }

    #[derive(DeriveIden)]
    enum GatewayLogs {
        Table,
        Issuer,
        ServiceName,
        Reference,
        Amount,
        Method,
        Channel,
        ResponseStatus,
        RequestAt,
        SuccessAt,
        SettlementAt,
    }
}

mod m20240101_000006_create_procurement_tables {
    use super::envelope::{audit_columns, index, key_columns, money, Envelope};
    use super::m20240101_000001_create_tenancy_tables::Outlets;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_procurement_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let mut suppliers = Table::create();
            suppliers.table(Suppliers::Table).if_not_exists();
            key_columns(&mut suppliers);
            suppliers
                .col(ColumnDef::new(Suppliers::OwnerId).integer().not_null())
                .col(ColumnDef::new(Suppliers::Name).string().not_null())
                .col(ColumnDef::new(Suppliers::Phone).string().null())
                .col(ColumnDef::new(Suppliers::Email).string().null())
                .col(ColumnDef::new(Suppliers::Address).string().null());
            audit_columns(&mut suppliers);
            manager.create_table(suppliers).await?;

            let mut pos = Table::create();
            pos.table(PurchaseOrders::Table).if_not_exists();
            key_columns(&mut pos);
            pos.col(ColumnDef::new(PurchaseOrders::OwnerId).integer().not_null())
                .col(ColumnDef::new(PurchaseOrders::SupplierId).integer().not_null())
                .col(ColumnDef::new(PurchaseOrders::OutletId).integer().not_null())
                .col(money(PurchaseOrders::Total))
                .col(ColumnDef::new(PurchaseOrders::Status).string().not_null())
                .col(ColumnDef::new(PurchaseOrders::Note).string().null())
                .col(
                    ColumnDef::new(PurchaseOrders::ReceivedAt)
                        .timestamp_with_time_zone()
                        .null(),
                )
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_purchase_orders_supplier_id")
                        .from(PurchaseOrders::Table, PurchaseOrders::SupplierId)
                        .to(Suppliers::Table, Envelope::Id)
                        .on_delete(ForeignKeyAction::Restrict),
                )
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_purchase_orders_outlet_id")
                        .from(PurchaseOrders::Table, PurchaseOrders::OutletId)
                        .to(Outlets::Table, Envelope::Id)
                        .on_delete(ForeignKeyAction::Restrict),
                );
            audit_columns(&mut pos);
            manager.create_table(pos).await?;

            manager
                .create_index(index(
                    "idx_purchase_orders_owner_id",
                    PurchaseOrders::Table,
                    [PurchaseOrders::OwnerId],
                ))
                .await?;

            let mut lines = Table::create();
            lines.table(PurchaseOrderLines::Table).if_not_exists();
            key_columns(&mut lines);
            lines
                .col(
                    ColumnDef::new(PurchaseOrderLines::PurchaseOrderId)
                        .integer()
                        .not_null(),
                )
                .col(
                    ColumnDef::new(PurchaseOrderLines::ProductId)
                        .integer()
                        .not_null(),
                )
                .col(money(PurchaseOrderLines::Quantity))
                .col(money(PurchaseOrderLines::UnitPrice))
                .col(money(PurchaseOrderLines::Total))
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_purchase_order_lines_purchase_order_id")
                        .from(PurchaseOrderLines::Table, PurchaseOrderLines::PurchaseOrderId)
                        .to(PurchaseOrders::Table, Envelope::Id)
                        .on_delete(ForeignKeyAction::Cascade),
                );
            audit_columns(&mut lines);
            manager.create_table(lines).await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PurchaseOrderLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PurchaseOrders::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Suppliers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Suppliers {
        Table,
        OwnerId,
        Name,
        Phone,
        Email,
        Address,
    }

    #[derive(DeriveIden)]
    enum PurchaseOrders {
        Table,
        OwnerId,
        SupplierId,
        OutletId,
        Total,
        Status,
        Note,
        ReceivedAt,
    }

    #[derive(DeriveIden)]
    enum PurchaseOrderLines {
        Table,
        PurchaseOrderId,
        ProductId,
        Quantity,
        UnitPrice,
        Total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Database;

    #[tokio::test]
    async fn migrations_apply_and_reapply_on_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("schema.db").display());
        let db = Database::connect(&url).await.unwrap();

        Migrator::up(&db, None).await.unwrap();
        let manager = SchemaManager::new(&db);
        for table in [
            "users",
            "products",
            "recipes",
            "stocks",
            "stock_movements",
            "orders",
            "order_payments",
            "purchase_orders",
        ] {
            assert!(manager.has_table(table).await.unwrap(), "missing {table}");
        }
        assert!(Migrator::get_pending_migrations(&db).await.unwrap().is_empty());

        // A second run is a no-op.
        Migrator::up(&db, None).await.unwrap();
    }
}
