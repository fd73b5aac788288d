//! Key generation and certificate signing requests

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, PKCS_ECDSA_P256_SHA256};

use crate::error::CaError;

/// A fresh P-256 key and the PKCS#10 request that goes with it
pub struct KeyMaterial {
    /// PKCS#8 PEM private key
    pub private_key_pem: String,
    /// PEM certificate signing request
    pub csr_pem: String,
}

impl KeyMaterial {
    /// Generate a key and a CSR whose subject CN is `common_name`
    pub fn generate(common_name: &str) -> Result<Self, CaError> {
        let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)?;

        let mut params = CertificateParams::default();
        let mut subject = DistinguishedName::new();
        subject.push(DnType::CommonName, common_name);
        params.distinguished_name = subject;

        let csr = params.serialize_request(&key_pair)?;

        Ok(Self {
            private_key_pem: key_pair.serialize_pem(),
            csr_pem: csr.pem()?,
        })
    }
}
