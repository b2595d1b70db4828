//! Node identity: one self-signed key/certificate pair per process.
//!
//! Generation runs once on the blocking pool. Dependents never read the
//! credentials synchronously; they poll [`CredentialStore::current`] or await
//! [`CredentialStore::ready`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use tokio::sync::watch;
use wayfinder_core::ServiceError;
use zeroize::Zeroizing;

pub const DEFAULT_KEY_BITS: usize = 2048;
pub const CERTIFICATE_VALIDITY_DAYS: i64 = 1;

/// Private key, certificate and CA chain of the node, all PEM encoded.
pub struct Credentials {
    private_key_pem: Zeroizing<String>,
    certificate_pem: String,
    ca_pem: String,
}

impl Credentials {
    pub fn from_pem(private_key_pem: impl Into<String>, certificate_pem: impl Into<String>) -> Self {
        let certificate_pem = certificate_pem.into();
        Self {
            private_key_pem: Zeroizing::new(private_key_pem.into()),
            ca_pem: certificate_pem.clone(),
            certificate_pem,
        }
    }

    pub fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }

    pub fn certificate_pem(&self) -> &str {
        &self.certificate_pem
    }

    pub fn ca_pem(&self) -> &str {
        &self.ca_pem
    }

    /// Key followed by certificate, the layout expected for a client identity.
    pub fn identity_pem(&self) -> Zeroizing<Vec<u8>> {
        let mut pem = Zeroizing::new(Vec::with_capacity(self.private_key_pem.len() + self.certificate_pem.len() + 1));
        pem.extend_from_slice(self.private_key_pem.as_bytes());
        if !self.private_key_pem.ends_with('\n') {
            pem.push(b'\n');
        }
        pem.extend_from_slice(self.certificate_pem.as_bytes());
        pem
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("private_key_pem", &"<redacted>")
            .field("certificate_pem", &self.certificate_pem)
            .finish()
    }
}

pub type ReadyCallback = Box<dyn FnOnce(&Result<Arc<Credentials>, ServiceError>) + Send>;

/// Process-wide credential cell behind a readiness guard.
pub struct CredentialStore {
    started: AtomicBool,
    key_bits: usize,
    tx: watch::Sender<Option<Arc<Credentials>>>,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::with_key_bits(DEFAULT_KEY_BITS)
    }

    pub fn with_key_bits(key_bits: usize) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            started: AtomicBool::new(false),
            key_bits,
            tx,
        }
    }

    /// Generate the node credentials for `subject_name`.
    ///
    /// Only the first call does any work; later calls fail with
    /// [`ServiceError::Credentials`]. `on_ready` is invoked with the outcome
    /// before it is returned.
    pub async fn generate(
        &self,
        subject_name: &str,
        on_ready: Option<ReadyCallback>,
    ) -> Result<Arc<Credentials>, ServiceError> {
        self.claim()?;

        let subject = subject_name.to_string();
        let bits = self.key_bits;
        tracing::info!(subject = %subject, bits, "generating node credentials");

        let outcome = tokio::task::spawn_blocking(move || build_self_signed(&subject, bits))
            .await
            .map_err(|e| ServiceError::Credentials(format!("generation task failed: {e}")))
            .and_then(|r| r)
            .map(Arc::new);

        if let Ok(credentials) = &outcome {
            self.tx.send_replace(Some(credentials.clone()));
            tracing::info!("node credentials ready");
        }
        if let Some(callback) = on_ready {
            callback(&outcome);
        }
        outcome
    }

    /// Install externally provided credentials in place of generating them.
    pub fn install(&self, credentials: Credentials) -> Result<Arc<Credentials>, ServiceError> {
        self.claim()?;
        let credentials = Arc::new(credentials);
        self.tx.send_replace(Some(credentials.clone()));
        Ok(credentials)
    }

    fn claim(&self) -> Result<(), ServiceError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::Credentials("credentials are created once per process".to_string()));
        }
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn current(&self) -> Option<Arc<Credentials>> {
        self.tx.borrow().clone()
    }

    /// Resolve once credentials are available.
    pub async fn ready(&self) -> Result<Arc<Credentials>, ServiceError> {
        let mut rx = self.tx.subscribe();
        let guard = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ServiceError::Credentials("credential store closed".to_string()))?;
        guard
            .clone()
            .ok_or_else(|| ServiceError::Credentials("credentials unavailable".to_string()))
    }

    /// Drop the credentials at shutdown.
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }
}

fn build_self_signed(subject: &str, bits: usize) -> Result<Credentials, ServiceError> {
    let fail = |what: &str, e: &dyn fmt::Display| ServiceError::Credentials(format!("{what}: {e}"));

    let mut rng = rand::thread_rng();
    let key = RsaPrivateKey::new(&mut rng, bits).map_err(|e| fail("key generation failed", &e))?;
    let key_pem = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| fail("key encoding failed", &e))?;

    let key_pair = rcgen::KeyPair::from_pem(&key_pem).map_err(|e| fail("key import failed", &e))?;

    let mut params = rcgen::CertificateParams::new(vec![subject.to_string()]);
    params.alg = &rcgen::PKCS_RSA_SHA256;
    params.key_pair = Some(key_pair);
    let mut name = rcgen::DistinguishedName::new();
    name.push(rcgen::DnType::CommonName, subject);
    params.distinguished_name = name;
    let now = time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(CERTIFICATE_VALIDITY_DAYS);

    let certificate = rcgen::Certificate::from_params(params).map_err(|e| fail("certificate creation failed", &e))?;
    let certificate_pem = certificate
        .serialize_pem()
        .map_err(|e| fail("certificate encoding failed", &e))?;

    Ok(Credentials::from_pem(key_pem.as_str(), certificate_pem))
}
