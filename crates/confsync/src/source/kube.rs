//! Kubernetes ConfigMap resource clients.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::resource::ResourceClient;
use crate::error::{Result, SyncError};

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The part of a ConfigMap object we care about.
#[derive(Debug, Deserialize)]
struct ConfigMapObject {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    data: Option<BTreeMap<String, String>>,
}

impl ConfigMapObject {
    fn into_data(self, origin: &str) -> Result<BTreeMap<String, String>> {
        match self.kind.as_deref() {
            None | Some("ConfigMap") => Ok(self.data.unwrap_or_default()),
            Some(other) => Err(SyncError::Config(format!(
                "{} is a {}, expected a ConfigMap",
                origin, other
            ))),
        }
    }
}

/// Reads a ConfigMap through the Kubernetes REST API.
pub struct ConfigMapClient {
    http: reqwest::Client,
    api_server: String,
    namespace: String,
    name: String,
    token: Option<SecretString>,
}

impl ConfigMapClient {
    /// Creates a client talking to `api_server` (e.g. `https://10.0.0.1:443`).
    pub fn new(
        api_server: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_http(http, api_server, namespace, name))
    }

    /// Creates a client from the pod's service account, trusting the cluster CA.
    pub fn in_cluster(namespace: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| SyncError::Config("KUBERNETES_SERVICE_HOST is not set".to_string()))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());

        let dir = Path::new(SERVICE_ACCOUNT_DIR);
        let ca_path = dir.join("ca.crt");
        let ca = std::fs::read(&ca_path).map_err(|e| SyncError::ReadFile {
            path: ca_path,
            source: e,
        })?;
        let certificate = reqwest::Certificate::from_pem(&ca)
            .map_err(|e| SyncError::Config(format!("Invalid cluster CA: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .add_root_certificate(certificate)
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let token = read_token(&dir.join("token"))?;
        Ok(Self::with_http(http, format!("https://{}:{}", host, port), namespace, name)
            .with_token(token))
    }

    fn with_http(
        http: reqwest::Client,
        api_server: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_server: api_server.into(),
            namespace: namespace.into(),
            name: name.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    /// The REST URL of the watched ConfigMap.
    pub fn url(&self) -> String {
        format!(
            "{}/api/v1/namespaces/{}/configmaps/{}",
            self.api_server.trim_end_matches('/'),
            self.namespace,
            self.name
        )
    }

    fn connectivity(&self, message: impl Into<String>) -> SyncError {
        SyncError::SourceConnectivity {
            source_name: self.describe(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl ResourceClient for ConfigMapClient {
    fn describe(&self) -> String {
        format!("configmap/{}/{}", self.namespace, self.name)
    }

    async fn fetch(&self) -> Result<Option<BTreeMap<String, String>>> {
        let mut request = self.http.get(self.url());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.connectivity(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(self.connectivity(format!("API server returned {}", status)));
        }
        if !status.is_success() {
            return Err(SyncError::Config(format!(
                "API server rejected request for {}: {}",
                self.describe(),
                status
            )));
        }

        let object: ConfigMapObject = response
            .json()
            .await
            .map_err(|e| self.connectivity(format!("Malformed response: {}", e)))?;
        object.into_data(&self.describe()).map(Some)
    }
}

/// Reads a ConfigMap manifest from a local YAML file.
///
/// A missing file counts as a deleted resource.
pub struct ManifestClient {
    path: PathBuf,
}

impl ManifestClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ResourceClient for ManifestClient {
    fn describe(&self) -> String {
        format!("manifest:{}", self.path.display())
    }

    async fn fetch(&self) -> Result<Option<BTreeMap<String, String>>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SyncError::ReadFile {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        // A half-written manifest parses badly; try again on the next round.
        let object: ConfigMapObject =
            serde_yaml::from_str(&content).map_err(|e| SyncError::SourceConnectivity {
                source_name: self.describe(),
                message: format!("Unreadable manifest: {}", e),
            })?;
        object.into_data(&self.describe()).map(Some)
    }
}

/// Reads a bearer token file, trimming surrounding whitespace.
pub(crate) fn read_token(path: &Path) -> Result<SecretString> {
    let token = std::fs::read_to_string(path).map_err(|e| SyncError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(SecretString::from(token.trim().to_string()))
}
