pub use sea_orm_migration::prelude::*;

pub mod m20250301_000001_create_applications;
pub mod m20250301_000002_create_application_versions;
pub mod m20250301_000003_create_service_endpoints;
pub mod m20250301_000004_create_service_monitoring;
pub mod m20250301_000005_create_service_alerts;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_applications::Migration),
            Box::new(m20250301_000002_create_application_versions::Migration),
            Box::new(m20250301_000003_create_service_endpoints::Migration),
            Box::new(m20250301_000004_create_service_monitoring::Migration),
            Box::new(m20250301_000005_create_service_alerts::Migration),
        ]
    }
}
