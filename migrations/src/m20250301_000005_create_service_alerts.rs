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
                    .table(ServiceAlerts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ServiceAlerts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ServiceAlerts::EndpointId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceAlerts::Title)
                            .string_len(200)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceAlerts::Message)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceAlerts::Level)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceAlerts::Status)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceAlerts::RuleName)
                            .string_len(200)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceAlerts::Condition)
                            .json()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceAlerts::TriggeredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ServiceAlerts::ResolvedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ServiceAlerts::AcknowledgedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ServiceAlerts::AcknowledgedBy)
                            .uuid()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_service_alerts_endpoint")
                            .from(ServiceAlerts::Table, ServiceAlerts::EndpointId)
                            .to(ServiceEndpoints::Table, ServiceEndpoints::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_service_alerts_status_triggered")
                    .table(ServiceAlerts::Table)
                    .col(ServiceAlerts::Status)
                    .col((ServiceAlerts::TriggeredAt, IndexOrder::Desc))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_service_alerts_level_triggered")
                    .table(ServiceAlerts::Table)
                    .col(ServiceAlerts::Level)
                    .col((ServiceAlerts::TriggeredAt, IndexOrder::Desc))
                    .to_owned(),
            )
            .await?;

        // Dedup key: one open alert per (endpoint, rule). Alert creation relies
        // on this index rejecting the second insert.
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_service_alerts_open_rule
                ON service_alerts (endpoint_id, rule_name)
                WHERE status IN ('active', 'acknowledged');
                "#,
            )
            .await?;

        log::info!("Created service_alerts with open-alert dedup index");

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ServiceAlerts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ServiceAlerts {
    Table,
    Id,
    EndpointId,
    Title,
    Message,
    Level,
    Status,
    RuleName,
    Condition,
    TriggeredAt,
    ResolvedAt,
    AcknowledgedAt,
    AcknowledgedBy,
}
