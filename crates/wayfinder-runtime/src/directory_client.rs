use std::sync::Arc;
use std::time::Duration;

use wayfinder_core::protocol::DEFAULT_DIRECTORY_PORT;
use wayfinder_core::{DirectoryAddress, Location, LookupResponse, RegisterRequest, ServiceContext, ServiceError};

use crate::metrics;
use crate::transport::{Endpoint, Transport, TransportRequest};

pub const REGISTRATION_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Client half of the directory protocol: registration and lookup.
pub struct ServiceDirectoryClient {
    transport: Arc<dyn Transport>,
    default_directory: DirectoryAddress,
    retry_delay: Duration,
}

impl ServiceDirectoryClient {
    pub fn new(transport: Arc<dyn Transport>, default_directory: DirectoryAddress) -> Self {
        Self {
            transport,
            default_directory,
            retry_delay: REGISTRATION_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Directory responsible for `location`, or `None` for a literal URL.
    pub fn directory_for(&self, location: &Location) -> Option<DirectoryAddress> {
        match location {
            Location::Directory => Some(self.default_directory.clone()),
            Location::DirectoryAt { host, port } => Some(DirectoryAddress::new(
                host.clone(),
                port.unwrap_or(DEFAULT_DIRECTORY_PORT),
            )),
            Location::Url { .. } => None,
        }
    }

    /// Register `context` as listening on `port`.
    ///
    /// Retries every second until the directory answers 204; attempts are
    /// strictly sequential. Returns the number of attempts made, `0` when
    /// the service is statically located and nothing is registered.
    pub async fn register(&self, context: &ServiceContext, port: u16) -> u32 {
        let Some(directory) = self.directory_for(&context.location) else {
            tracing::debug!(service = %context.identification(), "static location, skipping registration");
            return 0;
        };

        let body = RegisterRequest { info: context.info(), port };
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            metrics::registration_attempt();
            match self.try_register(&directory, &body).await {
                Ok(()) => {
                    tracing::info!(
                        service = %context.identification(),
                        directory = %directory,
                        attempt,
                        "registered with directory"
                    );
                    return attempt;
                }
                Err(e) => {
                    tracing::warn!(
                        service = %context.identification(),
                        directory = %directory,
                        attempt,
                        error = %e,
                        "registration failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    async fn try_register(&self, directory: &DirectoryAddress, body: &RegisterRequest) -> Result<(), ServiceError> {
        let payload = serde_json::to_value(body).map_err(|e| ServiceError::Registration(e.to_string()))?;
        let request = TransportRequest::new(
            "POST",
            &Endpoint::new(directory.host.clone(), directory.port),
            format!("{}/register", directory.base_path()),
        )
        .json(payload);

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| ServiceError::Registration(e.to_string()))?;
        if response.status != 204 {
            return Err(ServiceError::Registration(format!(
                "directory answered {} {}",
                response.status, response.status_text
            )));
        }
        Ok(())
    }

    /// Resolve the endpoint of a remote service.
    pub async fn lookup(&self, context: &ServiceContext) -> Result<Endpoint, ServiceError> {
        let directory = match (&context.location, self.directory_for(&context.location)) {
            (Location::Url { host, port }, _) => return Ok(Endpoint::new(host.clone(), *port)),
            (_, Some(directory)) => directory,
            (_, None) => {
                return Err(ServiceError::Lookup(format!("no directory for {}", context.identification())));
            }
        };

        let request = TransportRequest::new(
            "GET",
            &Endpoint::new(directory.host.clone(), directory.port),
            format!("{}/lookup/{}/{}", directory.base_path(), context.name, context.api_version),
        );
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| ServiceError::Lookup(format!("{}: {e}", context.identification())))?;

        if response.status != 200 {
            metrics::lookup(false);
            return Err(ServiceError::Lookup(format!(
                "{}: directory answered {}",
                context.identification(),
                response.status
            )));
        }

        let found: LookupResponse = serde_json::from_value(response.body).map_err(|e| {
            ServiceError::Lookup(format!("{}: malformed directory answer: {e}", context.identification()))
        })?;
        metrics::lookup(true);
        tracing::debug!(service = %context.identification(), location = %found.location, port = found.port, "resolved");
        Ok(Endpoint::new(found.location, found.port))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::TransportResponse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned outcomes and records every request.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        pub(crate) outcomes: Mutex<VecDeque<Result<TransportResponse, ServiceError>>>,
        pub(crate) sent: Mutex<Vec<TransportRequest>>,
    }

    impl ScriptedTransport {
        pub(crate) fn with(outcomes: Vec<Result<TransportResponse, ServiceError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                sent: Mutex::default(),
            })
        }

        pub(crate) fn sent(&self) -> Vec<TransportRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: TransportRequest) -> Result<TransportResponse, ServiceError> {
            request.validate()?;
            self.sent.lock().unwrap().push(request);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ServiceError::Transport("connection refused".into())))
        }
    }

    fn context(location: &str) -> ServiceContext {
        ServiceContext::from_json(&format!(
            r#"{{"info": {{"name": "yp", "api": 1}}, "config": {{"location": "{location}"}}}}"#
        ))
        .unwrap()
    }

    fn client(transport: Arc<ScriptedTransport>) -> ServiceDirectoryClient {
        ServiceDirectoryClient::new(transport, DirectoryAddress::new("dir.local", 8443))
    }

    #[tokio::test(start_paused = true)]
    async fn registration_succeeds_on_attempt_after_outage() {
        let k = 3;
        let mut outcomes: Vec<_> = (0..k)
            .map(|_| Err(ServiceError::Transport("connection refused".into())))
            .collect();
        outcomes.push(Ok(TransportResponse::new(204, serde_json::Value::Null)));
        let transport = ScriptedTransport::with(outcomes);

        let started = tokio::time::Instant::now();
        let attempts = client(transport.clone()).register(&context("directory"), 8443).await;

        assert_eq!(attempts, k + 1);
        assert_eq!(started.elapsed(), REGISTRATION_RETRY_DELAY * k);
        let sent = transport.sent();
        assert_eq!(sent.len(), (k + 1) as usize);
        assert_eq!(sent[0].path, "/yp/v1/register");
        assert_eq!(sent[0].method, "POST");
        assert_eq!(sent[0].host, "dir.local");
        assert_eq!(sent[0].body, Some(json!({"info": {"name": "yp", "api": 1}, "port": 8443})));
    }

    #[tokio::test(start_paused = true)]
    async fn non_204_answers_are_retried() {
        let transport = ScriptedTransport::with(vec![
            Ok(TransportResponse::new(200, json!({}))),
            Ok(TransportResponse::new(500, json!("down"))),
            Ok(TransportResponse::new(204, serde_json::Value::Null)),
        ]);
        assert_eq!(client(transport).register(&context("directory"), 1).await, 3);
    }

    #[tokio::test]
    async fn explicit_directory_reference_overrides_default() {
        let transport = ScriptedTransport::with(vec![Ok(TransportResponse::new(204, serde_json::Value::Null))]);
        client(transport.clone())
            .register(&context("directory://other.local:9000"), 1)
            .await;
        let sent = transport.sent();
        assert_eq!((sent[0].host.as_str(), sent[0].port), ("other.local", 9000));
    }

    #[tokio::test]
    async fn static_location_is_not_registered() {
        let transport = ScriptedTransport::with(vec![]);
        let attempts = client(transport.clone())
            .register(&context("https://static.local:7000"), 7000)
            .await;
        assert_eq!(attempts, 0);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn lookup_through_directory() {
        let transport = ScriptedTransport::with(vec![Ok(TransportResponse::new(
            200,
            json!({"location": "10.0.0.5", "port": 8443}),
        ))]);
        let endpoint = client(transport.clone()).lookup(&context("directory")).await.unwrap();
        assert_eq!(endpoint, Endpoint::new("10.0.0.5", 8443));
        let sent = transport.sent();
        assert_eq!(sent[0].method, "GET");
        assert_eq!(sent[0].path, "/yp/v1/lookup/yp/1");
    }

    #[tokio::test]
    async fn lookup_failures_are_lookup_errors() {
        for outcome in [
            Ok(TransportResponse::new(404, serde_json::Value::Null)),
            Ok(TransportResponse::new(200, json!({"location": "h"}))),
            Err(ServiceError::Transport("reset".into())),
        ] {
            let transport = ScriptedTransport::with(vec![outcome]);
            let err = client(transport).lookup(&context("directory")).await.unwrap_err();
            assert_eq!(err.code(), "LOOKUP_ERROR");
        }
    }

    #[tokio::test]
    async fn static_lookup_needs_no_network() {
        let transport = ScriptedTransport::with(vec![]);
        let endpoint = client(transport.clone())
            .lookup(&context("https://static.local"))
            .await
            .unwrap();
        assert_eq!(endpoint, Endpoint::new("static.local", 433));
        assert!(transport.sent().is_empty());
    }
}
