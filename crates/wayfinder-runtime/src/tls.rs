use std::sync::Arc;
use std::time::SystemTime;

use rustls::server::{ClientCertVerified, ClientCertVerifier};
use rustls::{Certificate, DistinguishedName, PrivateKey, ServerConfig};
use wayfinder_core::ServiceError;

use crate::credentials::Credentials;

/// Requests a client certificate without requiring it or checking it against
/// a CA. Peers use self-signed identities, so there is nothing to anchor to.
struct AcceptAnyClientCertificate {
    subjects: Vec<DistinguishedName>,
}

impl ClientCertVerifier for AcceptAnyClientCertificate {
    fn client_auth_mandatory(&self) -> bool {
        false
    }

    fn client_auth_root_subjects(&self) -> &[DistinguishedName] {
        &self.subjects
    }

    fn verify_client_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _now: SystemTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }
}

pub fn certificate_chain(credentials: &Credentials) -> Result<Vec<Certificate>, ServiceError> {
    let certs = rustls_pemfile::certs(&mut credentials.certificate_pem().as_bytes())
        .map_err(|e| ServiceError::Credentials(format!("unreadable certificate: {e}")))?;
    if certs.is_empty() {
        return Err(ServiceError::Credentials("no certificate in credentials".to_string()));
    }
    Ok(certs.into_iter().map(Certificate).collect())
}

fn private_key(credentials: &Credentials) -> Result<PrivateKey, ServiceError> {
    let mut reader = credentials.private_key_pem().as_bytes();
    let mut keys = rustls_pemfile::pkcs8_private_keys(&mut reader)
        .map_err(|e| ServiceError::Credentials(format!("unreadable private key: {e}")))?;
    if keys.is_empty() {
        return Err(ServiceError::Credentials("no PKCS#8 private key in credentials".to_string()));
    }
    Ok(PrivateKey(keys.swap_remove(0)))
}

/// Listener TLS configuration for the node identity.
pub fn server_config(credentials: &Credentials) -> Result<Arc<ServerConfig>, ServiceError> {
    let verifier = Arc::new(AcceptAnyClientCertificate { subjects: Vec::new() });
    let mut config = ServerConfig::builder()
        .with_safe_defaults()
        .with_client_cert_verifier(verifier)
        .with_single_cert(certificate_chain(credentials)?, private_key(credentials)?)
        .map_err(|e| ServiceError::Credentials(format!("invalid server identity: {e}")))?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}
