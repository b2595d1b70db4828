//! Built-in authentication service backed by the user list in its descriptor
//! settings:
//!
//! ```json
//! "settings": { "users": [ { "id": "u-1", "username": "alice", "password": "..." } ] }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use wayfinder_core::auth::{AuthenticateRequest, AuthenticateResponse};
use wayfinder_core::{ServiceContext, ServiceError};
use wayfinder_runtime::{Invocation, Operations, ServiceImplementation};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct UserRecord {
    id: String,
    username: String,
    password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AuthenticationSettings {
    #[serde(default)]
    users: Vec<UserRecord>,
}

pub struct AuthenticationService {
    users: HashMap<String, UserRecord>,
}

impl AuthenticationService {
    pub fn from_context(context: &ServiceContext) -> Result<Self, ServiceError> {
        let settings: AuthenticationSettings = if context.settings.is_null() {
            AuthenticationSettings::default()
        } else {
            serde_json::from_value(context.settings.clone())
                .map_err(|e| ServiceError::Configuration(format!("invalid authentication settings: {e}")))?
        };

        let mut users = HashMap::new();
        for user in settings.users {
            if users.contains_key(&user.username) {
                return Err(ServiceError::Configuration(format!("duplicate user '{}'", user.username)));
            }
            users.insert(user.username.clone(), user);
        }
        Ok(Self { users })
    }

    /// User id for matching credentials.
    pub fn verify(&self, username: &str, password: &str) -> Option<&str> {
        self.users
            .get(username)
            .filter(|user| user.password == password)
            .map(|user| user.id.as_str())
    }
}

impl ServiceImplementation for AuthenticationService {
    fn operations(self: Arc<Self>) -> Operations {
        Operations::new().with("authenticate", move |mut inv: Invocation| {
            let this = self.clone();
            async move {
                let verdict = serde_json::from_value::<AuthenticateRequest>(inv.request.body().clone())
                    .ok()
                    .and_then(|creds| this.verify(&creds.username, &creds.password).map(str::to_string));
                match verdict {
                    Some(id) => {
                        inv.response.status(201).json(json!(AuthenticateResponse { id }));
                    }
                    None => {
                        inv.response.status(401);
                    }
                }
                inv.response
            }
        })
    }
}
