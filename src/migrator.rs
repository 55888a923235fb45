use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_tenants_table::Migration),
            Box::new(m20240601_000002_create_baskets_table::Migration),
            Box::new(m20240601_000003_create_vouchers_table::Migration),
            Box::new(m20240601_000004_create_payments_table::Migration),
        ]
    }
}

mod m20240601_000001_create_tenants_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_tenants_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Tenants::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Tenants::TenantId)
                                .string()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Tenants::Name).string().not_null())
                        .col(ColumnDef::new(Tenants::Description).string().null())
                        .col(ColumnDef::new(Tenants::Gateways).json().not_null())
                        .col(ColumnDef::new(Tenants::WalletId).string().null())
                        .col(
                            ColumnDef::new(Tenants::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Tenants::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Tenants::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Tenants {
        Table,
        TenantId,
        Name,
        Description,
        Gateways,
        WalletId,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000002_create_baskets_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_baskets_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Baskets::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Baskets::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Baskets::TenantId).string().not_null())
                        .col(ColumnDef::new(Baskets::UserId).string().not_null())
                        .col(ColumnDef::new(Baskets::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Baskets::Currency).string_len(8).not_null())
                        .col(ColumnDef::new(Baskets::CallbackUrl).string().null())
                        .col(
                            ColumnDef::new(Baskets::CheckoutAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Baskets::PaymentId).uuid().null())
                        .col(ColumnDef::new(Baskets::InvoiceId).string().null())
                        .col(ColumnDef::new(Baskets::Discount).json().null())
                        .col(ColumnDef::new(Baskets::Items).json().not_null())
                        .col(ColumnDef::new(Baskets::MetaData).json().null())
                        .col(
                            ColumnDef::new(Baskets::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Baskets::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Baskets::IsDeleted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_baskets_tenant_user_status")
                        .table(Baskets::Table)
                        .col(Baskets::TenantId)
                        .col(Baskets::UserId)
                        .col(Baskets::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Baskets::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Baskets {
        Table,
        Id,
        TenantId,
        UserId,
        Status,
        Currency,
        CallbackUrl,
        CheckoutAt,
        PaymentId,
        InvoiceId,
        Discount,
        Items,
        MetaData,
        CreatedAt,
        UpdatedAt,
        IsDeleted,
    }
}

mod m20240601_000003_create_vouchers_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_vouchers_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Vouchers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Vouchers::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Vouchers::TenantId).string().not_null())
                        .col(ColumnDef::new(Vouchers::Code).string().not_null())
                        .col(ColumnDef::new(Vouchers::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Vouchers::Rate).decimal_len(19, 4).not_null())
                        .col(ColumnDef::new(Vouchers::Cap).decimal_len(19, 4).null())
                        .col(ColumnDef::new(Vouchers::Currency).string_len(8).not_null())
                        .col(
                            ColumnDef::new(Vouchers::ExpiredAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Vouchers::MaxUses).big_integer().null())
                        .col(
                            ColumnDef::new(Vouchers::Redeemed)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Vouchers::UserId).string().null())
                        .col(ColumnDef::new(Vouchers::LimitedProducts).json().null())
                        .col(ColumnDef::new(Vouchers::MetaData).json().null())
                        .col(
                            ColumnDef::new(Vouchers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Vouchers::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Vouchers::IsDeleted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_vouchers_tenant_code")
                        .table(Vouchers::Table)
                        .col(Vouchers::TenantId)
                        .col(Vouchers::Code)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Vouchers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Vouchers {
        Table,
        Id,
        TenantId,
        Code,
        Status,
        Rate,
        Cap,
        Currency,
        ExpiredAt,
        MaxUses,
        Redeemed,
        UserId,
        LimitedProducts,
        MetaData,
        CreatedAt,
        UpdatedAt,
        IsDeleted,
    }
}

mod m20240601_000004_create_payments_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_payments_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Payments::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Payments::TenantId).string().not_null())
                        .col(ColumnDef::new(Payments::UserId).string().null())
                        .col(ColumnDef::new(Payments::WalletId).string().null())
                        .col(ColumnDef::new(Payments::BasketId).uuid().null())
                        .col(ColumnDef::new(Payments::Amount).decimal_len(19, 4).not_null())
                        .col(
                            ColumnDef::new(Payments::OriginalAmount)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Payments::Currency).string_len(8).not_null())
                        .col(ColumnDef::new(Payments::Description).string().not_null())
                        .col(ColumnDef::new(Payments::CallbackUrl).string().not_null())
                        .col(ColumnDef::new(Payments::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Payments::Tries).json().not_null())
                        .col(
                            ColumnDef::new(Payments::VerifiedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Payments::FailureReason).string().null())
                        .col(
                            ColumnDef::new(Payments::DurationSecs)
                                .big_integer()
                                .not_null()
                                .default(3600),
                        )
                        .col(ColumnDef::new(Payments::AvailableGateways).json().not_null())
                        .col(
                            ColumnDef::new(Payments::AcceptWallet)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Payments::VoucherCode).string().null())
                        .col(ColumnDef::new(Payments::ProposalId).string().null())
                        .col(ColumnDef::new(Payments::MetaData).json().null())
                        .col(
                            ColumnDef::new(Payments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Payments::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Payments::IsDeleted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payments_tenant_user")
                        .table(Payments::Table)
                        .col(Payments::TenantId)
                        .col(Payments::UserId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Payments {
        Table,
        Id,
        TenantId,
        UserId,
        WalletId,
        BasketId,
        Amount,
        OriginalAmount,
        Currency,
        Description,
        CallbackUrl,
        Status,
        Tries,
        VerifiedAt,
        FailureReason,
        DurationSecs,
        AvailableGateways,
        AcceptWallet,
        VoucherCode,
        ProposalId,
        MetaData,
        CreatedAt,
        UpdatedAt,
        IsDeleted,
    }
}
