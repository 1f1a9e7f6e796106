use anyhow::Result;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::prelude::*;
use std::time::Duration;
use tracing::{error, info};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_users_table::Migration),
            Box::new(m20240301_000002_create_clients_table::Migration),
            Box::new(m20240301_000003_create_catalog_tables::Migration),
            Box::new(m20240301_000004_create_assembly_group_tables::Migration),
            Box::new(m20240301_000005_create_template_tables::Migration),
            Box::new(m20240301_000006_create_project_tables::Migration),
            Box::new(m20240301_000007_create_uploads_table::Migration),
            Box::new(m20240301_000008_create_notifications_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240301_000001_create_users_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_users_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Users::Name).string().not_null())
                        .col(
                            ColumnDef::new(Users::Email)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                        .col(ColumnDef::new(Users::Role).string_len(16).not_null())
                        .col(ColumnDef::new(Users::Phone).string().null())
                        .col(
                            ColumnDef::new(Users::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Users::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(crate) enum Users {
        Table,
        Id,
        Name,
        Email,
        PasswordHash,
        Role,
        Phone,
        Active,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_clients_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_clients_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Clients::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Clients::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Clients::Name).string().not_null())
                        .col(ColumnDef::new(Clients::Email).string().null())
                        .col(ColumnDef::new(Clients::Phone).string_len(20).null())
                        .col(ColumnDef::new(Clients::Company).string().null())
                        .col(ColumnDef::new(Clients::Address).string().null())
                        .col(ColumnDef::new(Clients::Notes).text().null())
                        .col(
                            ColumnDef::new(Clients::WhatsappOptIn)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Clients::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Clients::UpdatedAt)
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
                        .name("idx_clients_name")
                        .table(Clients::Table)
                        .col(Clients::Name)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_clients_phone")
                        .table(Clients::Table)
                        .col(Clients::Phone)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Clients::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(crate) enum Clients {
        Table,
        Id,
        Name,
        Email,
        Phone,
        Company,
        Address,
        Notes,
        WhatsappOptIn,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_catalog_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Materials::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Materials::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Materials::Name).string().not_null())
                        .col(ColumnDef::new(Materials::Sku).string().null().unique_key())
                        .col(ColumnDef::new(Materials::Unit).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Materials::UnitPrice)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Materials::Description).text().null())
                        .col(ColumnDef::new(Materials::Supplier).string().null())
                        .col(
                            ColumnDef::new(Materials::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Materials::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(AssemblyCategories::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(AssemblyCategories::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AssemblyCategories::Name)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(AssemblyCategories::Description).text().null())
                        .col(
                            ColumnDef::new(AssemblyCategories::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AssemblyCategories::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Assemblies::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Assemblies::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Assemblies::Name).string().not_null())
                        .col(ColumnDef::new(Assemblies::Description).text().null())
                        .col(ColumnDef::new(Assemblies::CategoryId).uuid().null())
                        .col(
                            ColumnDef::new(Assemblies::LaborCost)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Assemblies::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Assemblies::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_assemblies_category_id")
                                .from(Assemblies::Table, Assemblies::CategoryId)
                                .to(AssemblyCategories::Table, AssemblyCategories::Id)
                                .on_delete(ForeignKeyAction::SetNull)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(AssemblyMaterials::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(AssemblyMaterials::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(AssemblyMaterials::AssemblyId).uuid().not_null())
                        .col(ColumnDef::new(AssemblyMaterials::MaterialId).uuid().not_null())
                        .col(
                            ColumnDef::new(AssemblyMaterials::Quantity)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AssemblyMaterials::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AssemblyMaterials::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_assembly_materials_assembly_id")
                                .from(AssemblyMaterials::Table, AssemblyMaterials::AssemblyId)
                                .to(Assemblies::Table, Assemblies::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_assembly_materials_material_id")
                                .from(AssemblyMaterials::Table, AssemblyMaterials::MaterialId)
                                .to(Materials::Table, Materials::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_assembly_materials_assembly_material")
                        .table(AssemblyMaterials::Table)
                        .col(AssemblyMaterials::AssemblyId)
                        .col(AssemblyMaterials::MaterialId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_assemblies_category_id")
                        .table(Assemblies::Table)
                        .col(Assemblies::CategoryId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(AssemblyMaterials::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Assemblies::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(AssemblyCategories::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Materials::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(crate) enum Materials {
        Table,
        Id,
        Name,
        Sku,
        Unit,
        UnitPrice,
        Description,
        Supplier,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(crate) enum AssemblyCategories {
        Table,
        Id,
        Name,
        Description,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(crate) enum Assemblies {
        Table,
        Id,
        Name,
        Description,
        CategoryId,
        LaborCost,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum AssemblyMaterials {
        Table,
        Id,
        AssemblyId,
        MaterialId,
        Quantity,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000004_create_assembly_group_tables {

    use super::m20240301_000003_create_catalog_tables::{Assemblies, AssemblyCategories};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_assembly_group_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(AssemblyGroups::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(AssemblyGroups::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(AssemblyGroups::Name).string().not_null())
                        .col(ColumnDef::new(AssemblyGroups::Description).text().null())
                        .col(ColumnDef::new(AssemblyGroups::CategoryId).uuid().null())
                        .col(
                            ColumnDef::new(AssemblyGroups::Rule)
                                .string_len(16)
                                .not_null()
                                .default("optional"),
                        )
                        .col(
                            ColumnDef::new(AssemblyGroups::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AssemblyGroups::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_assembly_groups_category_id")
                                .from(AssemblyGroups::Table, AssemblyGroups::CategoryId)
                                .to(AssemblyCategories::Table, AssemblyCategories::Id)
                                .on_delete(ForeignKeyAction::SetNull)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(AssemblyGroupItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(AssemblyGroupItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(AssemblyGroupItems::GroupId).uuid().not_null())
                        .col(
                            ColumnDef::new(AssemblyGroupItems::AssemblyId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AssemblyGroupItems::IsDefault)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(AssemblyGroupItems::ConflictsWith)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AssemblyGroupItems::SortOrder)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(AssemblyGroupItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AssemblyGroupItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_assembly_group_items_group_id")
                                .from(AssemblyGroupItems::Table, AssemblyGroupItems::GroupId)
                                .to(AssemblyGroups::Table, AssemblyGroups::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_assembly_group_items_assembly_id")
                                .from(AssemblyGroupItems::Table, AssemblyGroupItems::AssemblyId)
                                .to(Assemblies::Table, Assemblies::Id)
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
                        .name("idx_assembly_group_items_group_assembly")
                        .table(AssemblyGroupItems::Table)
                        .col(AssemblyGroupItems::GroupId)
                        .col(AssemblyGroupItems::AssemblyId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(AssemblyGroupItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(AssemblyGroups::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(crate) enum AssemblyGroups {
        Table,
        Id,
        Name,
        Description,
        CategoryId,
        Rule,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum AssemblyGroupItems {
        Table,
        Id,
        GroupId,
        AssemblyId,
        IsDefault,
        ConflictsWith,
        SortOrder,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000005_create_template_tables {

    use super::m20240301_000003_create_catalog_tables::{Assemblies, AssemblyCategories};
    use super::m20240301_000004_create_assembly_group_tables::AssemblyGroups;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_template_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Templates::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Templates::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Templates::Name).string().not_null())
                        .col(ColumnDef::new(Templates::Description).text().null())
                        .col(ColumnDef::new(Templates::CategoryId).uuid().null())
                        .col(
                            ColumnDef::new(Templates::MarkupPercent)
                                .decimal_len(9, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Templates::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Templates::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_templates_category_id")
                                .from(Templates::Table, Templates::CategoryId)
                                .to(AssemblyCategories::Table, AssemblyCategories::Id)
                                .on_delete(ForeignKeyAction::SetNull)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(TemplateAssemblies::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TemplateAssemblies::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TemplateAssemblies::TemplateId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TemplateAssemblies::AssemblyId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TemplateAssemblies::Quantity)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(TemplateAssemblies::GroupId).uuid().null())
                        .col(
                            ColumnDef::new(TemplateAssemblies::SortOrder)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(TemplateAssemblies::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TemplateAssemblies::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_template_assemblies_template_id")
                                .from(TemplateAssemblies::Table, TemplateAssemblies::TemplateId)
                                .to(Templates::Table, Templates::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_template_assemblies_assembly_id")
                                .from(TemplateAssemblies::Table, TemplateAssemblies::AssemblyId)
                                .to(Assemblies::Table, Assemblies::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_template_assemblies_group_id")
                                .from(TemplateAssemblies::Table, TemplateAssemblies::GroupId)
                                .to(AssemblyGroups::Table, AssemblyGroups::Id)
                                .on_delete(ForeignKeyAction::SetNull)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(TemplateGroups::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TemplateGroups::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TemplateGroups::TemplateId).uuid().not_null())
                        .col(ColumnDef::new(TemplateGroups::GroupId).uuid().not_null())
                        .col(
                            ColumnDef::new(TemplateGroups::SortOrder)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(TemplateGroups::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_template_groups_template_id")
                                .from(TemplateGroups::Table, TemplateGroups::TemplateId)
                                .to(Templates::Table, Templates::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_template_groups_group_id")
                                .from(TemplateGroups::Table, TemplateGroups::GroupId)
                                .to(AssemblyGroups::Table, AssemblyGroups::Id)
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
                        .name("idx_template_assemblies_template_id")
                        .table(TemplateAssemblies::Table)
                        .col(TemplateAssemblies::TemplateId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_template_groups_template_group")
                        .table(TemplateGroups::Table)
                        .col(TemplateGroups::TemplateId)
                        .col(TemplateGroups::GroupId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TemplateGroups::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(TemplateAssemblies::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Templates::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(crate) enum Templates {
        Table,
        Id,
        Name,
        Description,
        CategoryId,
        MarkupPercent,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum TemplateAssemblies {
        Table,
        Id,
        TemplateId,
        AssemblyId,
        Quantity,
        GroupId,
        SortOrder,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum TemplateGroups {
        Table,
        Id,
        TemplateId,
        GroupId,
        SortOrder,
        CreatedAt,
    }
}

mod m20240301_000006_create_project_tables {

    use super::m20240301_000001_create_users_table::Users;
    use super::m20240301_000002_create_clients_table::Clients;
    use super::m20240301_000005_create_template_tables::Templates;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000006_create_project_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Projects::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Projects::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Projects::Name).string().not_null())
                        .col(ColumnDef::new(Projects::ClientId).uuid().not_null())
                        .col(ColumnDef::new(Projects::TemplateId).uuid().null())
                        .col(
                            ColumnDef::new(Projects::Status)
                                .string_len(16)
                                .not_null()
                                .default("draft"),
                        )
                        .col(
                            ColumnDef::new(Projects::Quantity)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(Projects::StartDate).date().null())
                        .col(ColumnDef::new(Projects::EndDate).date().null())
                        .col(ColumnDef::new(Projects::SiteAddress).string().null())
                        .col(ColumnDef::new(Projects::Notes).text().null())
                        .col(
                            ColumnDef::new(Projects::TotalPrice)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Projects::Currency).string_len(3).not_null())
                        .col(
                            ColumnDef::new(Projects::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Projects::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_projects_client_id")
                                .from(Projects::Table, Projects::ClientId)
                                .to(Clients::Table, Clients::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_projects_template_id")
                                .from(Projects::Table, Projects::TemplateId)
                                .to(Templates::Table, Templates::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProjectMilestones::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProjectMilestones::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProjectMilestones::ProjectId).uuid().not_null())
                        .col(ColumnDef::new(ProjectMilestones::Title).string().not_null())
                        .col(ColumnDef::new(ProjectMilestones::Description).text().null())
                        .col(ColumnDef::new(ProjectMilestones::DueDate).date().null())
                        .col(
                            ColumnDef::new(ProjectMilestones::Status)
                                .string_len(16)
                                .not_null()
                                .default("pending"),
                        )
                        .col(
                            ColumnDef::new(ProjectMilestones::SortOrder)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProjectMilestones::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ProjectMilestones::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProjectMilestones::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_project_milestones_project_id")
                                .from(ProjectMilestones::Table, ProjectMilestones::ProjectId)
                                .to(Projects::Table, Projects::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProjectTasks::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProjectTasks::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProjectTasks::ProjectId).uuid().not_null())
                        .col(ColumnDef::new(ProjectTasks::MilestoneId).uuid().not_null())
                        .col(ColumnDef::new(ProjectTasks::Title).string().not_null())
                        .col(ColumnDef::new(ProjectTasks::Description).text().null())
                        .col(ColumnDef::new(ProjectTasks::AssigneeId).uuid().null())
                        .col(ColumnDef::new(ProjectTasks::DueDate).date().null())
                        .col(
                            ColumnDef::new(ProjectTasks::Status)
                                .string_len(16)
                                .not_null()
                                .default("todo"),
                        )
                        .col(
                            ColumnDef::new(ProjectTasks::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ProjectTasks::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProjectTasks::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_project_tasks_project_id")
                                .from(ProjectTasks::Table, ProjectTasks::ProjectId)
                                .to(Projects::Table, Projects::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_project_tasks_milestone_id")
                                .from(ProjectTasks::Table, ProjectTasks::MilestoneId)
                                .to(ProjectMilestones::Table, ProjectMilestones::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_project_tasks_assignee_id")
                                .from(ProjectTasks::Table, ProjectTasks::AssigneeId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::SetNull)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_projects_client_id")
                        .table(Projects::Table)
                        .col(Projects::ClientId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_projects_status")
                        .table(Projects::Table)
                        .col(Projects::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_project_tasks_milestone_id")
                        .table(ProjectTasks::Table)
                        .col(ProjectTasks::MilestoneId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProjectTasks::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProjectMilestones::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Projects::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(crate) enum Projects {
        Table,
        Id,
        Name,
        ClientId,
        TemplateId,
        Status,
        Quantity,
        StartDate,
        EndDate,
        SiteAddress,
        Notes,
        TotalPrice,
        Currency,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ProjectMilestones {
        Table,
        Id,
        ProjectId,
        Title,
        Description,
        DueDate,
        Status,
        SortOrder,
        CompletedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ProjectTasks {
        Table,
        Id,
        ProjectId,
        MilestoneId,
        Title,
        Description,
        AssigneeId,
        DueDate,
        Status,
        CompletedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000007_create_uploads_table {

    use super::m20240301_000001_create_users_table::Users;
    use super::m20240301_000006_create_project_tables::Projects;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000007_create_uploads_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Uploads::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Uploads::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Uploads::ProjectId).uuid().null())
                        .col(ColumnDef::new(Uploads::OriginalName).string().not_null())
                        .col(
                            ColumnDef::new(Uploads::StoredName)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Uploads::ContentType).string().not_null())
                        .col(ColumnDef::new(Uploads::SizeBytes).big_integer().not_null())
                        .col(ColumnDef::new(Uploads::UploadedBy).uuid().null())
                        .col(
                            ColumnDef::new(Uploads::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_uploads_project_id")
                                .from(Uploads::Table, Uploads::ProjectId)
                                .to(Projects::Table, Projects::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_uploads_uploaded_by")
                                .from(Uploads::Table, Uploads::UploadedBy)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::SetNull)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_uploads_project_id")
                        .table(Uploads::Table)
                        .col(Uploads::ProjectId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Uploads::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Uploads {
        Table,
        Id,
        ProjectId,
        OriginalName,
        StoredName,
        ContentType,
        SizeBytes,
        UploadedBy,
        CreatedAt,
    }
}

mod m20240301_000008_create_notifications_table {

    use super::m20240301_000002_create_clients_table::Clients;
    use super::m20240301_000006_create_project_tables::Projects;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000008_create_notifications_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Notifications::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Notifications::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Notifications::ClientId).uuid().null())
                        .col(ColumnDef::new(Notifications::ProjectId).uuid().null())
                        .col(ColumnDef::new(Notifications::Recipient).string().not_null())
                        .col(ColumnDef::new(Notifications::Message).text().not_null())
                        .col(
                            ColumnDef::new(Notifications::Status)
                                .string_len(16)
                                .not_null()
                                .default("queued"),
                        )
                        .col(
                            ColumnDef::new(Notifications::ProviderMessageId)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(Notifications::Error).text().null())
                        .col(
                            ColumnDef::new(Notifications::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Notifications::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_notifications_client_id")
                                .from(Notifications::Table, Notifications::ClientId)
                                .to(Clients::Table, Clients::Id)
                                .on_delete(ForeignKeyAction::SetNull)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_notifications_project_id")
                                .from(Notifications::Table, Notifications::ProjectId)
                                .to(Projects::Table, Projects::Id)
                                .on_delete(ForeignKeyAction::SetNull)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_notifications_provider_message_id")
                        .table(Notifications::Table)
                        .col(Notifications::ProviderMessageId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Notifications::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Notifications {
        Table,
        Id,
        ClientId,
        ProjectId,
        Recipient,
        Message,
        Status,
        ProviderMessageId,
        Error,
        CreatedAt,
        UpdatedAt,
    }
}

/// Connects to `db_url` and applies every pending migration.
pub async fn run_migration(db_url: &str) -> Result<()> {
    info!("Setting up database connection for migrations");

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(5)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(true);

    let db = Database::connect(opt).await?;

    info!("Running database migrations");

    match Migrator::up(&db, None).await {
        Ok(_) => {
            info!("Migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Migration failed: {}", e);
            Err(e.into())
        }
    }
}
