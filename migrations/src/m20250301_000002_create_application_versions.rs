use sea_orm_migration::prelude::*;

use crate::m20250301_000001_create_applications::Applications;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ApplicationVersions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ApplicationVersions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ApplicationVersions::ApplicationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ApplicationVersions::Version)
                            .string_len(50)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ApplicationVersions::Description)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ApplicationVersions::Config)
                            .json()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ApplicationVersions::Dockerfile)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ApplicationVersions::Manifest)
                            .json()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ApplicationVersions::ImageUrl)
                            .string_len(500)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ApplicationVersions::Status)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ApplicationVersions::BuildLog)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ApplicationVersions::CreatedBy)
                            .uuid()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ApplicationVersions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_application_versions_application")
                            .from(ApplicationVersions::Table, ApplicationVersions::ApplicationId)
                            .to(Applications::Table, Applications::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_application_versions_app_version")
                    .table(ApplicationVersions::Table)
                    .col(ApplicationVersions::ApplicationId)
                    .col(ApplicationVersions::Version)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ApplicationVersions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum ApplicationVersions {
    Table,
    Id,
    ApplicationId,
    Version,
    Description,
    Config,
    Dockerfile,
    Manifest,
    ImageUrl,
    Status,
    BuildLog,
    CreatedBy,
    CreatedAt,
}
