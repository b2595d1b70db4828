use async_trait::async_trait;

use crate::instance::RegisteredServiceEntry;

/// Storage behind the directory service.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Append an instance to its identification name's rotation.
    async fn register(&self, entry: RegisteredServiceEntry);

    /// Next live instance for `name/v<api>`, rotating it to the back.
    /// Instances found unreachable are dropped for good.
    async fn lookup(&self, name: &str, api: u32) -> Option<RegisteredServiceEntry>;

    /// Snapshot of every instance, in rotation order per name.
    async fn instances(&self) -> Vec<RegisteredServiceEntry>;
}
