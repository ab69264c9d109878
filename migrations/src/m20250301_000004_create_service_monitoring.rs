use sea_orm_migration::prelude::*;

use crate::m20250301_000003_create_service_endpoints::ServiceEndpoints;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ServiceMonitoring::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ServiceMonitoring::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ServiceMonitoring::EndpointId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceMonitoring::CpuUsage)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceMonitoring::MemoryUsage)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceMonitoring::RequestCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ServiceMonitoring::ErrorCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ServiceMonitoring::ResponseTime)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceMonitoring::NetworkIn)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(ServiceMonitoring::NetworkOut)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(ServiceMonitoring::CustomMetrics)
                            .json()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceMonitoring::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_service_monitoring_endpoint")
                            .from(ServiceMonitoring::Table, ServiceMonitoring::EndpointId)
                            .to(ServiceEndpoints::Table, ServiceEndpoints::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Range queries are always per endpoint, newest first
        manager
            .create_index(
                Index::create()
                    .name("idx_service_monitoring_endpoint_timestamp")
                    .table(ServiceMonitoring::Table)
                    .col(ServiceMonitoring::EndpointId)
                    .col((ServiceMonitoring::Timestamp, IndexOrder::Desc))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_service_monitoring_timestamp")
                    .table(ServiceMonitoring::Table)
                    .col((ServiceMonitoring::Timestamp, IndexOrder::Desc))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ServiceMonitoring::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ServiceMonitoring {
    Table,
    Id,
    EndpointId,
    CpuUsage,
    MemoryUsage,
    RequestCount,
    ErrorCount,
    ResponseTime,
    NetworkIn,
    NetworkOut,
    CustomMetrics,
    Timestamp,
}
