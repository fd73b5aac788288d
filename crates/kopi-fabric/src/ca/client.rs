//! REST client for the ledger platform's certificate authority

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use kopi_core::AuthorityEntry;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{AuthContext, CertificateAuthority, Enrollment, KeyMaterial, RegistrationRequest};
use crate::error::{CaError, ALREADY_REGISTERED_CODE};

const API_BASE: &str = "/api/v1/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Response envelope shared by every CA endpoint
#[derive(Debug, Deserialize)]
struct CaResponse<T> {
    #[serde(default)]
    success: bool,
    result: Option<T>,
    #[serde(default)]
    errors: Vec<CaMessage>,
}

#[derive(Debug, Deserialize)]
struct CaMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct EnrollResult {
    /// Base64 of the PEM certificate
    #[serde(rename = "Cert", default)]
    cert: String,
}

#[derive(Debug, Deserialize)]
struct RegisterResult {
    secret: String,
}

/// Certificate authority client
///
/// Runs in development trust mode: the descriptor's trust roots are added
/// to the TLS store but hostname verification is switched off.
pub struct FabricCaClient {
    url: String,
    ca_name: Option<String>,
    http: reqwest::Client,
}

impl FabricCaClient {
    /// Create a client for the CA at `url`
    pub fn new(
        url: impl Into<String>,
        ca_name: Option<String>,
        trusted_roots: &[String],
    ) -> Result<Self, CaError> {
        let mut builder = reqwest::Client::builder()
            .danger_accept_invalid_hostnames(true)
            .timeout(REQUEST_TIMEOUT);

        for pem in trusted_roots {
            let root = reqwest::Certificate::from_pem(pem.as_bytes())
                .map_err(|e| CaError::Config(format!("invalid trusted root: {}", e)))?;
            builder = builder.add_root_certificate(root);
        }

        let http = builder
            .build()
            .map_err(|e| CaError::Config(e.to_string()))?;

        Ok(Self {
            url: url.into().trim_end_matches('/').to_string(),
            ca_name,
            http,
        })
    }

    /// Create a client from a descriptor's certificate authority entry
    pub fn from_entry(entry: &AuthorityEntry) -> Result<Self, CaError> {
        Self::new(entry.url.clone(), entry.ca_name.clone(), &entry.trusted_roots)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn endpoint(&self, method: &str) -> (String, String) {
        let path = format!("{}{}", API_BASE, method);
        (format!("{}{}", self.url, path), path)
    }

    /// Unwrap the CA envelope, mapping CA error codes to [`CaError`]
    async fn read_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
        enrollment_id: &str,
    ) -> Result<T, CaError> {
        let status = response.status();
        let body = response.bytes().await?;

        let envelope: CaResponse<T> = serde_json::from_slice(&body).map_err(|e| {
            if status.is_success() {
                CaError::InvalidResponse(e.to_string())
            } else {
                CaError::Http(format!("status {}", status))
            }
        })?;

        if let Some(error) = envelope.errors.first() {
            if error.code == ALREADY_REGISTERED_CODE {
                return Err(CaError::AlreadyRegistered(enrollment_id.to_string()));
            }
            return Err(CaError::Rejected {
                code: error.code,
                message: error.message.clone(),
            });
        }

        match envelope.result {
            Some(result) if envelope.success => Ok(result),
            _ => Err(CaError::InvalidResponse(format!(
                "unsuccessful response without errors (status {})",
                status
            ))),
        }
    }
}

#[async_trait]
impl CertificateAuthority for FabricCaClient {
    async fn enroll(&self, enrollment_id: &str, secret: &str) -> Result<Enrollment, CaError> {
        let material = KeyMaterial::generate(enrollment_id)?;
        let (url, _) = self.endpoint("enroll");

        let mut body = json!({ "certificate_request": material.csr_pem });
        if let Some(ca_name) = &self.ca_name {
            body["caname"] = json!(ca_name);
        }

        debug!(url = %url, enrollment_id = %enrollment_id, "Enrolling identity");

        let response = self
            .http
            .post(&url)
            .basic_auth(enrollment_id, Some(secret))
            .json(&body)
            .send()
            .await?;

        let result: EnrollResult = Self::read_envelope(response, enrollment_id).await?;

        let certificate = if result.cert.is_empty() {
            warn!(enrollment_id = %enrollment_id, "CA returned no certificate");
            String::new()
        } else {
            let decoded = STANDARD
                .decode(result.cert.as_bytes())
                .map_err(|e| CaError::InvalidResponse(format!("certificate encoding: {}", e)))?;
            String::from_utf8(decoded)
                .map_err(|e| CaError::InvalidResponse(format!("certificate is not PEM: {}", e)))?
        };

        info!(enrollment_id = %enrollment_id, "Enrollment complete");

        Ok(Enrollment {
            certificate,
            private_key: material.private_key_pem,
        })
    }

    async fn register(
        &self,
        request: &RegistrationRequest,
        registrar: &AuthContext,
    ) -> Result<String, CaError> {
        let (url, path) = self.endpoint("register");

        let mut body = json!({
            "id": request.enrollment_id,
            "type": request.role,
            "affiliation": request.affiliation,
            "attrs": [],
        });
        if let Some(max) = request.max_enrollments {
            body["max_enrollments"] = json!(max);
        }
        if let Some(ca_name) = &self.ca_name {
            body["caname"] = json!(ca_name);
        }

        let body = serde_json::to_vec(&body)
            .map_err(|e| CaError::InvalidResponse(format!("request encoding: {}", e)))?;
        let token = registrar.token("POST", &path, &body);

        debug!(
            url = %url,
            enrollment_id = %request.enrollment_id,
            registrar = %registrar.name(),
            "Registering identity"
        );

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let result: RegisterResult = Self::read_envelope(response, &request.enrollment_id).await?;

        info!(enrollment_id = %request.enrollment_id, role = %request.role, "Registration complete");
        Ok(result.secret)
    }

    fn description(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_paths() {
        let client = FabricCaClient::new("https://localhost:7040/", None, &[]).unwrap();
        let (url, path) = client.endpoint("register");
        assert_eq!(url, "https://localhost:7040/api/v1/register");
        assert_eq!(path, "/api/v1/register");
    }

    #[test]
    fn test_rejects_invalid_root() {
        let result = FabricCaClient::new("https://ca", None, &["not a pem".to_string()]);
        assert!(matches!(result, Err(CaError::Config(_))));
    }

    #[test]
    fn test_envelope_parsing() {
        let envelope: CaResponse<RegisterResult> = serde_json::from_str(
            r#"{"success":false,"result":null,"errors":[{"code":74,"message":"Identity 'x' is already registered"}],"messages":[]}"#,
        )
        .unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.errors[0].code, ALREADY_REGISTERED_CODE);
    }
}
