//! [`ClusterMetadata`] backed by a Kubernetes-compatible API server.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use super::{ClusterMetadata, MetadataError, Node, PersistentVolume};

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Where and how to reach the API server.
#[derive(Debug, Clone, Default)]
pub struct ApiServerConfig {
    /// Base URL, e.g. `https://10.96.0.1:443`.
    pub url: String,
    /// File holding a bearer token.  Re-read on every request so rotated
    /// tokens are picked up.
    pub token_file: Option<PathBuf>,
    /// PEM bundle used to verify the server certificate.
    pub ca_file: Option<PathBuf>,
    pub insecure_skip_tls_verify: bool,
}

impl ApiServerConfig {
    /// Configuration for a process running inside the cluster, from the
    /// service environment variables and the mounted service account.
    pub fn in_cluster() -> Result<Self, MetadataError> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| MetadataError::Config("KUBERNETES_SERVICE_HOST not set".into()))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT")
            .map_err(|_| MetadataError::Config("KUBERNETES_SERVICE_PORT not set".into()))?;
        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host
        };

        let sa = Path::new(SERVICE_ACCOUNT_DIR);
        Ok(Self {
            url: format!("https://{host}:{port}"),
            token_file: Some(sa.join("token")),
            ca_file: Some(sa.join("ca.crt")),
            insecure_skip_tls_verify: false,
        })
    }
}

/// REST client for `persistentvolumes` and `nodes`.
#[derive(Debug, Clone)]
pub struct ApiServerClient {
    http: reqwest::Client,
    base: String,
    token_file: Option<PathBuf>,
}

impl ApiServerClient {
    pub fn new(config: &ApiServerConfig) -> Result<Self, MetadataError> {
        let mut builder = reqwest::Client::builder();
        if let Some(ca) = &config.ca_file {
            let pem = std::fs::read(ca)
                .map_err(|e| MetadataError::Config(format!("read {}: {e}", ca.display())))?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }
        if config.insecure_skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            http: builder.build()?,
            base: config.url.trim_end_matches('/').to_owned(),
            token_file: config.token_file.clone(),
        })
    }

    fn volume_url(&self, name: &str) -> String {
        format!("{}/api/v1/persistentvolumes/{name}", self.base)
    }

    fn node_url(&self, name: &str) -> String {
        format!("{}/api/v1/nodes/{name}", self.base)
    }

    async fn authorize(&self, req: RequestBuilder) -> Result<RequestBuilder, MetadataError> {
        let Some(path) = &self.token_file else {
            return Ok(req);
        };
        let token = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MetadataError::Config(format!("read {}: {e}", path.display())))?;
        Ok(req.bearer_auth(token.trim()))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        kind: &'static str,
        name: &str,
        req: RequestBuilder,
    ) -> Result<T, MetadataError> {
        let resp = self.authorize(req).await?.send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(MetadataError::NotFound {
                kind,
                name: name.to_owned(),
            });
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(MetadataError::Status {
                kind,
                name: name.to_owned(),
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl ClusterMetadata for ApiServerClient {
    #[instrument(skip(self))]
    async fn get_volume(&self, volume_id: &str) -> Result<PersistentVolume, MetadataError> {
        debug!("get volume record");
        let req = self.http.get(self.volume_url(volume_id));
        self.send("volume", volume_id, req).await
    }

    #[instrument(skip_all, fields(volume_id = %volume.name()))]
    async fn update_volume(
        &self,
        volume: &PersistentVolume,
    ) -> Result<PersistentVolume, MetadataError> {
        debug!("update volume record");
        let req = self.http.put(self.volume_url(volume.name())).json(volume);
        self.send("volume", volume.name(), req).await
    }

    #[instrument(skip(self))]
    async fn get_node(&self, node_name: &str) -> Result<Node, MetadataError> {
        debug!("get node record");
        let req = self.http.get(self.node_url(node_name));
        self.send("node", node_name, req).await
    }
}
