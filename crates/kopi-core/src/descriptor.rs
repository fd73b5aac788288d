//! Connection descriptors
//!
//! A connection descriptor (the ledger platform's "connection profile") tells
//! the gateway where an organization's peers and certificate authority live.
//! The network tooling writes endpoints as plaintext `http://` URLs; every
//! one of them is rewritten to `https://` before the document is parsed, so
//! no code path ever sees an insecure endpoint.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};

const INSECURE_SCHEME: &str = "http://";
const SECURE_SCHEME: &str = "https://";

/// Rewrite every plaintext URL scheme in `raw` to its secure form
pub fn upgrade_to_secure(raw: &str) -> Cow<'_, str> {
    if raw.contains(INSECURE_SCHEME) {
        Cow::Owned(raw.replace(INSECURE_SCHEME, SECURE_SCHEME))
    } else {
        Cow::Borrowed(raw)
    }
}

/// Network topology and CA endpoints for one organization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<Value>,

    #[serde(default)]
    pub organizations: Map<String, Value>,

    #[serde(default)]
    pub peers: Map<String, Value>,

    /// Kept as raw JSON so "first entry" follows document order
    #[serde(default)]
    pub certificate_authorities: Map<String, Value>,
}

/// One certificate authority entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityEntry {
    /// Key of the entry in `certificateAuthorities`
    pub key: String,
    pub url: String,
    pub ca_name: Option<String>,
    /// PEM trust roots for the CA's TLS endpoint
    pub trusted_roots: Vec<String>,
}

/// One peer endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEntry {
    /// Key of the entry in `peers`, the peer's network hostname
    pub key: String,
    pub url: String,
    /// Inline PEM trust roots for the peer's TLS endpoint
    pub trusted_roots: Vec<String>,
    /// Trust roots given as file paths instead of inline PEM
    pub trusted_root_paths: Vec<PathBuf>,
    /// Name the peer's TLS certificate was issued for, if not the URL host
    pub host_override: Option<String>,
}

impl PeerEntry {
    pub fn is_tls(&self) -> bool {
        self.url.starts_with("grpcs://") || self.url.starts_with(SECURE_SCHEME)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPeer {
    url: String,
    #[serde(default, rename = "tlsCACerts")]
    tls_ca_certs: Option<RawTlsCerts>,
    #[serde(default)]
    grpc_options: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAuthority {
    url: String,
    #[serde(default)]
    ca_name: Option<String>,
    #[serde(default, rename = "tlsCACerts")]
    tls_ca_certs: Option<RawTlsCerts>,
}

#[derive(Deserialize)]
struct RawTlsCerts {
    #[serde(default)]
    pem: Option<PemBundle>,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PemBundle {
    One(String),
    Many(Vec<String>),
}

impl PemBundle {
    fn into_vec(self) -> Vec<String> {
        match self {
            PemBundle::One(pem) => vec![pem],
            PemBundle::Many(pems) => pems,
        }
    }
}

impl ConnectionDescriptor {
    /// Parse a descriptor, upgrading endpoints to secure transport first
    pub fn parse(raw: &str) -> Result<Self> {
        let secured = upgrade_to_secure(raw);
        serde_json::from_str(&secured).map_err(|e| CoreError::InvalidDescriptor(e.to_string()))
    }

    /// Read and parse a descriptor file
    ///
    /// Fails with [`CoreError::DescriptorMissing`] if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::DescriptorMissing(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path).map_err(|e| CoreError::DescriptorUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&raw)
    }

    /// The first certificate authority listed in the descriptor
    pub fn first_authority(&self) -> Result<AuthorityEntry> {
        let (key, value) = self
            .certificate_authorities
            .iter()
            .next()
            .ok_or(CoreError::NoCertificateAuthority)?;

        let raw: RawAuthority = serde_json::from_value(value.clone()).map_err(|e| {
            CoreError::InvalidDescriptor(format!("certificate authority '{}': {}", key, e))
        })?;

        let trusted_roots = raw
            .tls_ca_certs
            .and_then(|t| t.pem)
            .map(PemBundle::into_vec)
            .unwrap_or_default();

        Ok(AuthorityEntry {
            key: key.clone(),
            url: raw.url,
            ca_name: raw.ca_name,
            trusted_roots,
        })
    }

    /// Peers to reach the network through as a member of `msp_id`
    ///
    /// The organization's own peers come first, in the order the
    /// organization lists them; when the descriptor does not say which
    /// peers belong to `msp_id`, every peer is returned in document order.
    pub fn gateway_peers(&self, msp_id: &str) -> Result<Vec<PeerEntry>> {
        let own: Vec<&str> = self
            .organizations
            .values()
            .filter(|org| org.get("mspid").and_then(Value::as_str) == Some(msp_id))
            .filter_map(|org| org.get("peers").and_then(Value::as_array))
            .flatten()
            .filter_map(Value::as_str)
            .collect();

        let keys: Vec<&String> = if own.iter().any(|key| self.peers.contains_key(*key)) {
            self.peers.keys().filter(|key| own.contains(&key.as_str())).collect()
        } else {
            self.peers.keys().collect()
        };

        let mut peers = keys
            .into_iter()
            .map(|key| self.peer(key))
            .collect::<Result<Vec<_>>>()?;
        if !own.is_empty() {
            peers.sort_by_key(|peer| own.iter().position(|key| *key == peer.key));
        }

        if peers.is_empty() {
            return Err(CoreError::NoPeer);
        }
        Ok(peers)
    }

    fn peer(&self, key: &str) -> Result<PeerEntry> {
        let value = self
            .peers
            .get(key)
            .ok_or_else(|| CoreError::InvalidDescriptor(format!("unknown peer '{}'", key)))?;
        let raw: RawPeer = serde_json::from_value(value.clone())
            .map_err(|e| CoreError::InvalidDescriptor(format!("peer '{}': {}", key, e)))?;

        let (trusted_roots, trusted_root_paths) = match raw.tls_ca_certs {
            Some(certs) => (
                certs.pem.map(PemBundle::into_vec).unwrap_or_default(),
                certs.path.map(PathBuf::from).into_iter().collect(),
            ),
            None => (Vec::new(), Vec::new()),
        };

        let host_override = ["ssl-target-name-override", "hostnameOverride"]
            .iter()
            .find_map(|option| raw.grpc_options.get(*option).and_then(Value::as_str))
            .map(str::to_string);

        Ok(PeerEntry {
            key: key.to_string(),
            url: raw.url,
            trusted_roots,
            trusted_root_paths,
            host_override,
        })
    }
}
