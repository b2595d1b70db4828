/// Error taxonomy shared by every Wayfinder component.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("client error: {0}")]
    Client(String),

    #[error("lookup error: {0}")]
    Lookup(String),

    #[error("registration failure: {0}")]
    Registration(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("authorization denied: {0}")]
    Authorization(String),

    #[error("response error: {0}")]
    Response(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("credentials error: {0}")]
    Credentials(String),
}

impl ServiceError {
    /// Stable machine-readable code, as surfaced to remote callers.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Configuration(_) => "CONFIGURATION_ERROR",
            ServiceError::Client(_) => "CLIENT_ERROR",
            ServiceError::Lookup(_) => "LOOKUP_ERROR",
            ServiceError::Registration(_) => "REGISTRATION_FAILURE",
            ServiceError::Authentication(_) => "AUTHENTICATION_ERROR",
            ServiceError::Authorization(_) => "AUTHORIZATION_ERROR",
            ServiceError::Response(_) => "RESPONSE_ERROR",
            ServiceError::Transport(_) => "TRANSPORT_ERROR",
            ServiceError::Credentials(_) => "CREDENTIALS_ERROR",
        }
    }

    /// HTTP status used when the error crosses the HTTP boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::Authentication(_) => 401,
            ServiceError::Authorization(_) => 403,
            ServiceError::Client(_) => 400,
            _ => 500,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_statuses() {
        let err = ServiceError::Lookup("no instance".into());
        assert_eq!(err.code(), "LOOKUP_ERROR");
        assert_eq!(err.http_status(), 500);
        assert_eq!(ServiceError::Authentication("x".into()).http_status(), 401);
        assert_eq!(ServiceError::Authorization("x".into()).http_status(), 403);
        assert_eq!(err.to_string(), "lookup error: no instance");
    }
}
