use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use wayfinder_core::{DirectoryStore, Liveness, RegisteredServiceEntry, identification};
use wayfinder_runtime::{Endpoint, Transport, TransportRequest};

/// Checks whether a registered instance still answers on its root path.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn probe(&self, entry: &RegisteredServiceEntry) -> Liveness;
}

/// Probe that issues `GET /<name>/v<api>/` through the node transport.
pub struct TransportProbe {
    transport: Arc<dyn Transport>,
}

impl TransportProbe {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl LivenessProbe for TransportProbe {
    async fn probe(&self, entry: &RegisteredServiceEntry) -> Liveness {
        let endpoint = Endpoint::new(entry.host.clone(), entry.port);
        let request = TransportRequest::new("GET", &endpoint, entry.root_path());
        match self.transport.send(request).await {
            Ok(response) => Liveness::from_status(response.status),
            Err(e) => {
                tracing::debug!(instance = %entry.id, endpoint = %endpoint, error = %e, "liveness probe failed");
                Liveness::Unreachable
            }
        }
    }
}

type Rotation = Arc<Mutex<VecDeque<RegisteredServiceEntry>>>;

/// Directory state kept in memory: one rotation per identification name.
///
/// A lookup holds its rotation's lock for the whole probe loop, so lookups
/// for one name are serialized while different names proceed in parallel.
pub struct InMemoryDirectory {
    rotations: DashMap<String, Rotation>,
    probe: Arc<dyn LivenessProbe>,
}

impl InMemoryDirectory {
    pub fn new(probe: Arc<dyn LivenessProbe>) -> Self {
        Self {
            rotations: DashMap::new(),
            probe,
        }
    }

    fn rotation(&self, key: &str) -> Option<Rotation> {
        self.rotations.get(key).map(|r| r.value().clone())
    }
}

impl std::fmt::Debug for InMemoryDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.rotations.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("InMemoryDirectory").field("names", &names).finish()
    }
}

#[async_trait]
impl DirectoryStore for InMemoryDirectory {
    async fn register(&self, entry: RegisteredServiceEntry) {
        let key = entry.identification();
        let rotation = self.rotations.entry(key.clone()).or_default().value().clone();
        let mut rotation = rotation.lock().await;
        tracing::info!(service = %key, host = %entry.host, port = entry.port, instance = %entry.id, "instance registered");
        rotation.push_back(entry);
    }

    async fn lookup(&self, name: &str, api: u32) -> Option<RegisteredServiceEntry> {
        let key = identification(name, api);
        let rotation = self.rotation(&key)?;
        let mut rotation = rotation.lock().await;

        while let Some(entry) = rotation.pop_front() {
            if self.probe.probe(&entry).await.is_alive() {
                rotation.push_back(entry.clone());
                return Some(entry);
            }
            tracing::warn!(service = %key, host = %entry.host, port = entry.port, "instance unreachable, removed");
            wayfinder_runtime::metrics::instance_pruned();
        }
        None
    }

    async fn instances(&self) -> Vec<RegisteredServiceEntry> {
        let mut rotations: Vec<(String, Rotation)> = self
            .rotations
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        rotations.sort_by(|a, b| a.0.cmp(&b.0));

        let mut all = Vec::new();
        for (_, rotation) in rotations {
            all.extend(rotation.lock().await.iter().cloned());
        }
        all
    }
}
