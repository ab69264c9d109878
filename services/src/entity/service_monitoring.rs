use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "service_monitoring")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub endpoint_id: Uuid,
    #[sea_orm(column_type = "Double")]
    pub cpu_usage: f64,
    #[sea_orm(column_type = "Double")]
    pub memory_usage: f64,
    #[sea_orm(column_type = "BigInteger")]
    pub request_count: i64,
    #[sea_orm(column_type = "BigInteger")]
    pub error_count: i64,
    #[sea_orm(column_type = "Double")]
    pub response_time: f64,
    #[sea_orm(column_type = "Double")]
    pub network_in: f64,
    #[sea_orm(column_type = "Double")]
    pub network_out: f64,
    pub custom_metrics: Json,
    pub timestamp: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
