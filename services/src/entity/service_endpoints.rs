use orbit_shared::{EndpointStatus, Protocol};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "service_endpoints")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub version_id: Uuid,
    pub name: String,
    pub protocol: Protocol,
    pub host: String,
    pub port: i32,
    pub path: String,
    pub status: EndpointStatus,
    pub replicas: i32,
    pub env_vars: Json,
    pub health_check_path: String,
    pub is_healthy: bool,
    pub last_health_check: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// `protocol://host:port/path`
    pub fn url(&self) -> String {
        endpoint_url(self.protocol, &self.host, self.port, &self.path)
    }

    pub fn health_url(&self) -> String {
        endpoint_url(self.protocol, &self.host, self.port, &self.health_check_path)
    }
}

/// Endpoint as served over HTTP, carrying its derived addresses.
#[derive(Clone, Debug, Serialize)]
pub struct EndpointView {
    #[serde(flatten)]
    pub endpoint: Model,
    pub url: String,
    pub health_url: String,
}

impl From<Model> for EndpointView {
    fn from(endpoint: Model) -> Self {
        Self {
            url: endpoint.url(),
            health_url: endpoint.health_url(),
            endpoint,
        }
    }
}

pub fn endpoint_url(protocol: Protocol, host: &str, port: i32, path: &str) -> String {
    let path = path.trim_start_matches('/');
    format!("{}://{}:{}/{}", protocol.as_str(), host, port, path)
}
