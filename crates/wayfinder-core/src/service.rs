use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::auth::SecurityRequirement;
use crate::errors::ServiceError;
use crate::instance::{ServiceInfo, identification};
use crate::protocol::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            other => Err(ServiceError::Configuration(format!("unsupported http method '{other}'"))),
        }
    }
}

impl TryFrom<String> for HttpMethod {
    type Error = ServiceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HttpMethod> for String {
    fn from(value: HttpMethod) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-disk shape of a `service.json` descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDescriptor {
    pub info: ServiceInfo,
    pub config: DescriptorConfig,
    #[serde(default)]
    pub operations: BTreeMap<String, OperationDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DescriptorConfig {
    pub location: String,
    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencyDescriptor>,
    /// Free-form settings handed to the implementation.
    #[serde(default)]
    pub settings: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencyDescriptor {
    pub api: u32,
    pub location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationDescriptor {
    pub method: HttpMethod,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityRequirement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyContext {
    pub api_version: u32,
    /// Location as declared; parsed when the dependency is wired.
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
    pub http_method: HttpMethod,
    pub path: String,
    pub security: Option<SecurityRequirement>,
}

/// Validated, immutable view of a service: identity, location, dependencies, operations.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceContext {
    pub name: String,
    pub api_version: u32,
    pub location: Location,
    pub dependencies: BTreeMap<String, DependencyContext>,
    pub operations: BTreeMap<String, OperationContext>,
    pub settings: serde_json::Value,
    descriptor: serde_json::Value,
}

impl ServiceContext {
    /// Parse and validate a descriptor document.
    pub fn from_json(raw: &str) -> Result<Self, ServiceError> {
        let descriptor: ServiceDescriptor = serde_json::from_str(raw)
            .map_err(|e| ServiceError::Configuration(format!("malformed descriptor: {e}")))?;
        Self::from_descriptor(descriptor)
    }

    pub fn from_descriptor(descriptor: ServiceDescriptor) -> Result<Self, ServiceError> {
        validate_name(&descriptor.info.name)?;
        if descriptor.info.api == 0 {
            return Err(ServiceError::Configuration(format!(
                "service '{}' must declare a positive api version",
                descriptor.info.name
            )));
        }

        let location = Location::parse(&descriptor.config.location)?;

        let mut dependencies = BTreeMap::new();
        for (name, dep) in &descriptor.config.dependencies {
            validate_name(name)?;
            if dep.api == 0 {
                return Err(ServiceError::Configuration(format!(
                    "dependency '{name}' must declare a positive api version"
                )));
            }
            dependencies.insert(
                name.clone(),
                DependencyContext { api_version: dep.api, location: dep.location.clone() },
            );
        }

        let mut operations = BTreeMap::new();
        for (name, op) in &descriptor.operations {
            if !op.path.starts_with('/') {
                return Err(ServiceError::Configuration(format!(
                    "operation '{name}' path '{}' must start with '/'",
                    op.path
                )));
            }
            operations.insert(
                name.clone(),
                OperationContext {
                    http_method: op.method,
                    path: op.path.clone(),
                    security: op.security.clone(),
                },
            );
        }

        let raw = serde_json::to_value(&descriptor)
            .map_err(|e| ServiceError::Configuration(e.to_string()))?;

        Ok(Self {
            name: descriptor.info.name,
            api_version: descriptor.info.api,
            location,
            dependencies,
            operations,
            settings: descriptor.config.settings,
            descriptor: raw,
        })
    }

    /// Context describing a remote dependency; it carries no operations.
    pub fn for_dependency(name: &str, dependency: &DependencyContext) -> Result<Self, ServiceError> {
        Ok(Self {
            name: name.to_string(),
            api_version: dependency.api_version,
            location: Location::parse(&dependency.location)?,
            dependencies: BTreeMap::new(),
            operations: BTreeMap::new(),
            settings: serde_json::Value::Null,
            descriptor: serde_json::Value::Null,
        })
    }

    pub fn info(&self) -> ServiceInfo {
        ServiceInfo::new(self.name.clone(), self.api_version)
    }

    pub fn identification(&self) -> String {
        identification(&self.name, self.api_version)
    }

    /// Path prefix under which the service is exposed, without trailing slash.
    pub fn base_path(&self) -> String {
        format!("/{}/v{}", self.name, self.api_version)
    }

    /// The descriptor as loaded, for the service root endpoint.
    pub fn descriptor(&self) -> &serde_json::Value {
        &self.descriptor
    }
}

fn validate_name(name: &str) -> Result<(), ServiceError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(ServiceError::Configuration(format!("invalid service name '{name}'")))
    }
}
