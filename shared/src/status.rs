//! Closed status enums and the transition tables that govern them.
//!
//! Every lifecycle check in the services crate goes through the
//! `can_transition_to` / `permits` functions here, so the allowed graphs live
//! in exactly one place.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(50))")]
#[serde(rename_all = "snake_case")]
pub enum AppType {
    #[sea_orm(string_value = "web_service")]
    WebService,
    #[sea_orm(string_value = "api_service")]
    ApiService,
    #[sea_orm(string_value = "batch_job")]
    BatchJob,
    #[sea_orm(string_value = "stream_processing")]
    StreamProcessing,
    #[sea_orm(string_value = "ml_inference")]
    MlInference,
    #[sea_orm(string_value = "data_processing")]
    DataProcessing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "developing")]
    Developing,
    #[sea_orm(string_value = "testing")]
    Testing,
    #[sea_orm(string_value = "published")]
    Published,
    #[sea_orm(string_value = "archived")]
    Archived,
}

impl ApplicationStatus {
    /// Forward chain, archival from any active stage, and the
    /// testing -> developing send-back.
    pub fn can_transition_to(self, target: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        matches!(
            (self, target),
            (Draft, Developing)
                | (Developing, Testing)
                | (Testing, Published)
                | (Testing, Developing)
                | (Developing, Archived)
                | (Testing, Archived)
                | (Published, Archived)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Developing => "developing",
            Self::Testing => "testing",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    #[sea_orm(string_value = "building")]
    Building,
    #[sea_orm(string_value = "build_failed")]
    BuildFailed,
    #[sea_orm(string_value = "ready")]
    Ready,
    #[sea_orm(string_value = "deploying")]
    Deploying,
    #[sea_orm(string_value = "deployed")]
    Deployed,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "deprecated")]
    Deprecated,
}

impl VersionStatus {
    pub fn can_transition_to(self, target: VersionStatus) -> bool {
        use VersionStatus::*;
        matches!(
            (self, target),
            // (re)build
            (Building, Building)
                | (BuildFailed, Building)
                | (Ready, Building)
                // builder callback
                | (Building, Ready)
                | (Building, BuildFailed)
                // deploy and its outcome
                | (Ready, Deploying)
                | (Deploying, Deployed)
                | (Deploying, Failed)
                | (Deployed, Deprecated)
                | (Failed, Deprecated)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Building => "building",
            Self::BuildFailed => "build_failed",
            Self::Ready => "ready",
            Self::Deploying => "deploying",
            Self::Deployed => "deployed",
            Self::Failed => "failed",
            Self::Deprecated => "deprecated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    #[sea_orm(string_value = "http")]
    Http,
    #[sea_orm(string_value = "https")]
    Https,
    #[sea_orm(string_value = "grpc")]
    Grpc,
    #[sea_orm(string_value = "tcp")]
    Tcp,
    #[sea_orm(string_value = "udp")]
    Udp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Grpc => "grpc",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self::Http
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    #[sea_orm(string_value = "starting")]
    Starting,
    #[sea_orm(string_value = "running")]
    Running,
    #[sea_orm(string_value = "stopping")]
    Stopping,
    #[sea_orm(string_value = "stopped")]
    Stopped,
    #[sea_orm(string_value = "error")]
    Error,
}

impl EndpointStatus {
    /// Edges taken on observation (backend callback or health probe) rather
    /// than on an operator command. Command edges are in [`EndpointCommand`].
    pub fn can_transition_to(self, target: EndpointStatus) -> bool {
        use EndpointStatus::*;
        match (self, target) {
            (Error, Error) => false,
            (_, Error) => true,
            (Starting, Running) | (Stopping, Stopped) => true,
            _ => false,
        }
    }

    /// Probe loops only run while the runtime is expected to be up.
    pub fn is_probeable(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

/// Operator commands on an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointCommand {
    Start,
    Stop,
    Restart,
}

impl EndpointCommand {
    pub fn target(self) -> EndpointStatus {
        match self {
            Self::Start | Self::Restart => EndpointStatus::Starting,
            Self::Stop => EndpointStatus::Stopping,
        }
    }

    pub fn permits(self, from: EndpointStatus) -> bool {
        use EndpointStatus::*;
        match self {
            Self::Start => !matches!(from, Running | Starting),
            Self::Stop => !matches!(from, Stopped | Stopping),
            Self::Restart => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    #[sea_orm(string_value = "info")]
    Info,
    #[sea_orm(string_value = "warning")]
    Warning,
    #[sea_orm(string_value = "error")]
    Error,
    #[sea_orm(string_value = "critical")]
    Critical,
}

impl AlertLevel {
    pub const ALL: [AlertLevel; 4] = [Self::Info, Self::Warning, Self::Error, Self::Critical];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "acknowledged")]
    Acknowledged,
    #[sea_orm(string_value = "resolved")]
    Resolved,
    #[sea_orm(string_value = "ignored")]
    Ignored,
}

impl AlertStatus {
    pub const OPEN: [AlertStatus; 2] = [Self::Active, Self::Acknowledged];

    pub fn can_transition_to(self, target: AlertStatus) -> bool {
        use AlertStatus::*;
        matches!(
            (self, target),
            (Active, Acknowledged) | (Active, Resolved) | (Active, Ignored) | (Acknowledged, Resolved)
        )
    }

    pub fn is_open(self) -> bool {
        Self::OPEN.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
            Self::Ignored => "ignored",
        }
    }
}
