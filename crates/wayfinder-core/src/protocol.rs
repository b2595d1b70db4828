use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::instance::ServiceInfo;

/// Name and API version under which the directory itself is deployed.
pub const DIRECTORY_SERVICE_NAME: &str = "yp";
pub const DIRECTORY_SERVICE_API: u32 = 1;

/// Port assumed for a literal URL location that does not name one.
pub const DEFAULT_URL_PORT: u16 = 433;
/// Port assumed for a `directory://host` reference without a port.
pub const DEFAULT_DIRECTORY_PORT: u16 = 443;

const DIRECTORY_SCHEME: &str = "directory://";

/// Where a service (or dependency) lives, as declared in its descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// The node's default directory.
    Directory,
    /// An explicitly addressed directory.
    DirectoryAt { host: String, port: Option<u16> },
    /// A statically wired endpoint; no directory involved.
    Url { host: String, port: u16 },
}

impl Location {
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        let raw = raw.trim();
        if raw == "directory" {
            return Ok(Location::Directory);
        }

        if let Some(rest) = raw.strip_prefix(DIRECTORY_SCHEME) {
            let authority = rest.split('/').next().unwrap_or_default();
            let (host, port) = split_authority(authority)
                .ok_or_else(|| ServiceError::Configuration(format!("invalid directory location '{raw}'")))?;
            return Ok(Location::DirectoryAt { host, port });
        }

        let url = url::Url::parse(raw)
            .map_err(|e| ServiceError::Configuration(format!("invalid location '{raw}': {e}")))?;
        if url.host_str().is_none() {
            return Err(ServiceError::Configuration(format!("location '{raw}' has no host")));
        }

        // `Url::port` hides ports equal to the scheme default, so read the authority as written.
        let authority = raw
            .split_once("://")
            .map(|(_, rest)| rest.split('/').next().unwrap_or_default())
            .unwrap_or_default();
        let authority = authority.rsplit('@').next().unwrap_or(authority);
        let (host, port) = split_authority(authority)
            .ok_or_else(|| ServiceError::Configuration(format!("invalid location '{raw}'")))?;

        Ok(Location::Url { host, port: port.unwrap_or(DEFAULT_URL_PORT) })
    }

    pub fn is_directory(&self) -> bool {
        !matches!(self, Location::Url { .. })
    }
}

fn split_authority(authority: &str) -> Option<(String, Option<u16>)> {
    if authority.is_empty() {
        return None;
    }

    // Bracketed IPv6 literal.
    if let Some(rest) = authority.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = match tail.strip_prefix(':') {
            Some(p) => Some(p.parse().ok()?),
            None if tail.is_empty() => None,
            None => return None,
        };
        return Some((host.to_string(), port));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => Some((host.to_string(), Some(port.parse().ok()?))),
        Some(_) => None,
        None => Some((authority.to_string(), None)),
    }
}

/// Network address of a directory service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryAddress {
    pub host: String,
    pub port: u16,
}

impl DirectoryAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    /// Parse a node-level default directory setting: `directory://host[:port]` or a URL.
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        match Location::parse(raw)? {
            Location::DirectoryAt { host, port } => Ok(Self::new(host, port.unwrap_or(DEFAULT_DIRECTORY_PORT))),
            Location::Url { host, port } => Ok(Self::new(host, port)),
            Location::Directory => Err(ServiceError::Configuration(
                "default directory location must name a host".to_string(),
            )),
        }
    }

    /// Path prefix under which the directory's operations are mounted.
    pub fn base_path(&self) -> String {
        format!("/{}/v{}", DIRECTORY_SERVICE_NAME, DIRECTORY_SERVICE_API)
    }
}

impl fmt::Display for DirectoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "https://{}:{}{}", self.host, self.port, self.base_path())
    }
}

/// Body of `POST /register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub info: ServiceInfo,
    #[schema(example = 8443)]
    pub port: u16,
}

/// Body of a successful `GET /lookup/{name}/{api}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LookupResponse {
    #[schema(example = "10.0.0.12")]
    pub location: String,
    #[schema(example = 8443)]
    pub port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_directory_forms() {
        assert_eq!(Location::parse("directory").unwrap(), Location::Directory);
        assert_eq!(
            Location::parse("directory://yp.local:9443").unwrap(),
            Location::DirectoryAt { host: "yp.local".into(), port: Some(9443) }
        );
        assert_eq!(
            Location::parse("directory://yp.local").unwrap(),
            Location::DirectoryAt { host: "yp.local".into(), port: None }
        );
        assert!(Location::parse("directory://").is_err());
    }

    #[test]
    fn parses_urls_with_and_without_port() {
        assert_eq!(
            Location::parse("https://users.internal:8443/users/v1").unwrap(),
            Location::Url { host: "users.internal".into(), port: 8443 }
        );
        assert_eq!(
            Location::parse("https://users.internal").unwrap(),
            Location::Url { host: "users.internal".into(), port: DEFAULT_URL_PORT }
        );
        assert_eq!(
            Location::parse("https://users.internal:443").unwrap(),
            Location::Url { host: "users.internal".into(), port: 443 }
        );
        assert_eq!(
            Location::parse("https://[::1]:7000/").unwrap(),
            Location::Url { host: "::1".into(), port: 7000 }
        );
        assert!(Location::parse("not a location").is_err());
    }

    #[test]
    fn directory_address_display() {
        let addr = DirectoryAddress::parse("directory://localhost:8443").unwrap();
        assert_eq!(addr.to_string(), "https://localhost:8443/yp/v1");
        assert_eq!(DirectoryAddress::parse("directory://localhost").unwrap().port, 443);
        assert!(DirectoryAddress::parse("directory").is_err());
    }
}
