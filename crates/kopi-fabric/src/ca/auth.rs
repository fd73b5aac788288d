//! Registrar authorization context
//!
//! Registration requests are authorized with a token derived from the
//! registrar's certificate and an ECDSA signature over the request:
//!
//! ```text
//! token   = b64(cert) "." b64(sig)
//! payload = METHOD "." b64(path) "." b64(body) "." b64(cert)
//! ```

use base64::{engine::general_purpose::STANDARD, Engine};
use kopi_core::{Identity, IdentityKind};
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use p256::pkcs8::DecodePrivateKey;

use crate::error::CaError;

/// Execution context of an enrolled identity, able to sign CA requests
#[derive(Clone)]
pub struct AuthContext {
    name: String,
    msp_id: String,
    certificate: String,
    signing_key: SigningKey,
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("name", &self.name)
            .field("msp_id", &self.msp_id)
            .field("signing_key", &"[redacted]")
            .finish()
    }
}

impl AuthContext {
    /// Build a context from a stored X.509 identity
    pub fn from_identity(identity: &Identity) -> Result<Self, CaError> {
        if identity.kind() != IdentityKind::X509 {
            return Err(CaError::Crypto(format!(
                "no provider for identity kind {}",
                identity.kind()
            )));
        }

        let signing_key = SigningKey::from_pkcs8_pem(identity.private_key()).map_err(|e| {
            CaError::Crypto(format!("identity '{}' has an unusable key: {}", identity.name(), e))
        })?;

        Ok(Self {
            name: identity.name().to_string(),
            msp_id: identity.msp_id().to_string(),
            certificate: identity.certificate().to_string(),
            signing_key,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn msp_id(&self) -> &str {
        &self.msp_id
    }

    pub fn certificate(&self) -> &str {
        &self.certificate
    }

    /// DER-encoded low-S ECDSA P-256/SHA-256 signature
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signature: Signature = self.signing_key.sign(message);
        let signature = signature.normalize_s().unwrap_or(signature);
        signature.to_der().as_bytes().to_vec()
    }

    /// Authorization token for a request to `path`
    pub fn token(&self, method: &str, path: &str, body: &[u8]) -> String {
        let cert = STANDARD.encode(self.certificate.as_bytes());
        let payload = format!(
            "{}.{}.{}.{}",
            method,
            STANDARD.encode(path.as_bytes()),
            STANDARD.encode(body),
            cert
        );
        let signature = STANDARD.encode(self.sign(payload.as_bytes()));
        format!("{}.{}", cert, signature)
    }
}
