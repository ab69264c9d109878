use orbit_shared::VersionStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "application_versions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub application_id: Uuid,
    pub version: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub config: Json,
    #[sea_orm(column_type = "Text")]
    pub dockerfile: String,
    pub manifest: Json,
    pub image_url: Option<String>,
    pub status: VersionStatus,
    #[sea_orm(column_type = "Text")]
    pub build_log: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
