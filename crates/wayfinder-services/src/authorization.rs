//! Built-in authorization service. Grants map a user id to the operations it
//! may call on each service; `"*"` grants every operation of that service.
//!
//! ```json
//! "settings": { "grants": { "u-1": { "users": ["create", "delete"], "orders": ["*"] } } }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Deserialize;
use wayfinder_core::auth::AuthorizeRequest;
use wayfinder_core::{ServiceContext, ServiceError};
use wayfinder_runtime::{Invocation, Operations, ServiceImplementation};

const ANY_OPERATION: &str = "*";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AuthorizationSettings {
    #[serde(default)]
    grants: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

pub struct AuthorizationService {
    grants: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl AuthorizationService {
    pub fn from_context(context: &ServiceContext) -> Result<Self, ServiceError> {
        let settings: AuthorizationSettings = if context.settings.is_null() {
            AuthorizationSettings::default()
        } else {
            serde_json::from_value(context.settings.clone())
                .map_err(|e| ServiceError::Configuration(format!("invalid authorization settings: {e}")))?
        };
        Ok(Self { grants: settings.grants })
    }

    pub fn is_allowed(&self, user_id: &str, service: &str, operation: &str) -> bool {
        self.grants
            .get(user_id)
            .and_then(|services| services.get(service))
            .is_some_and(|ops| ops.contains(operation) || ops.contains(ANY_OPERATION))
    }
}

impl ServiceImplementation for AuthorizationService {
    fn operations(self: Arc<Self>) -> Operations {
        Operations::new().with("authorize", move |mut inv: Invocation| {
            let this = self.clone();
            async move {
                let allowed = serde_json::from_value::<AuthorizeRequest>(inv.request.body().clone())
                    .is_ok_and(|req| this.is_allowed(&req.user_id, &req.service, &req.operation));
                inv.response.status(if allowed { 204 } else { 403 });
                inv.response
            }
        })
    }
}
