use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Build the identification name `name/v<api>` used as directory key.
pub fn identification(name: &str, api: u32) -> String {
    format!("{name}/v{api}")
}

/// Public identity of a service: its name and API version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    #[schema(example = "users")]
    pub name: String,
    #[schema(example = 1)]
    pub api: u32,
}

impl ServiceInfo {
    pub fn new(name: impl Into<String>, api: u32) -> Self {
        Self { name: name.into(), api }
    }

    pub fn identification(&self) -> String {
        identification(&self.name, self.api)
    }
}

impl fmt::Display for ServiceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/v{}", self.name, self.api)
    }
}

/// One registered instance of a service, as tracked by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RegisteredServiceEntry {
    pub id: Uuid,
    pub info: ServiceInfo,
    /// Host the instance registered from.
    pub host: String,
    pub port: u16,
    pub registered_at: u64,
}

impl RegisteredServiceEntry {
    pub fn new(info: ServiceInfo, host: impl Into<String>, port: u16, registered_at: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            info,
            host: host.into(),
            port,
            registered_at,
        }
    }

    pub fn identification(&self) -> String {
        self.info.identification()
    }

    /// Root path of the instance, probed for liveness.
    pub fn root_path(&self) -> String {
        format!("/{}/v{}/", self.info.name, self.info.api)
    }
}
