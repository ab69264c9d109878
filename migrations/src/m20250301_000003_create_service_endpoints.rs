use sea_orm_migration::prelude::*;

use crate::m20250301_000002_create_application_versions::ApplicationVersions;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ServiceEndpoints::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ServiceEndpoints::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ServiceEndpoints::VersionId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceEndpoints::Name)
                            .string_len(200)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceEndpoints::Protocol)
                            .string_len(10)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceEndpoints::Host)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceEndpoints::Port)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceEndpoints::Path)
                            .string_len(500)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceEndpoints::Status)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceEndpoints::Replicas)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(ServiceEndpoints::EnvVars)
                            .json()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceEndpoints::HealthCheckPath)
                            .string_len(200)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceEndpoints::IsHealthy)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ServiceEndpoints::LastHealthCheck)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ServiceEndpoints::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceEndpoints::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_service_endpoints_version")
                            .from(ServiceEndpoints::Table, ServiceEndpoints::VersionId)
                            .to(ApplicationVersions::Table, ApplicationVersions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_service_endpoints_version_id")
                    .table(ServiceEndpoints::Table)
                    .col(ServiceEndpoints::VersionId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_service_endpoints_status")
                    .table(ServiceEndpoints::Table)
                    .col(ServiceEndpoints::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ServiceEndpoints::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum ServiceEndpoints {
    Table,
    Id,
    VersionId,
    Name,
    Protocol,
    Host,
    Port,
    Path,
    Status,
    Replicas,
    EnvVars,
    HealthCheckPath,
    IsHealthy,
    LastHealthCheck,
    CreatedAt,
    UpdatedAt,
}
