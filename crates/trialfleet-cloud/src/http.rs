//! HTTP adapter for the provisioning broker.
//!
//! The broker is a thin service in front of the provider SDKs. This module
//! provides the [`HttpCloudGateway`] that talks JSON to it:
//!
//! - `POST   /v1/{provider}/clusters` - create from a resolved plan
//! - `GET    /v1/{provider}/regions/{region}/clusters` - list
//! - `GET    /v1/{provider}/regions/{region}/clusters/{id}` - describe by id
//! - `GET    /v1/{provider}/regions/{region}/clusters?name={name}` - find by name
//! - `DELETE /v1/{provider}/regions/{region}/clusters/{id}` - destroy

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use trialfleet_core::CloudProvider;

use crate::error::{CloudError, Result};
use crate::gateway::{
    target_of, ClusterDetail, ClusterHandle, ClusterLookup, ClusterSummary, CloudGateway,
    ProviderClusterState,
};
use crate::plan::{ClusterPlan, NAME_TAG};

/// HTTP client for the provisioning broker.
#[derive(Debug, Clone)]
pub struct HttpCloudGateway {
    client: reqwest::Client,
    base_url: Url,
}

/// Cluster as the broker reports it, with the provider's raw state.
#[derive(Debug, Deserialize)]
struct RawCluster {
    id: String,
    name: String,
    state: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    endpoint: Option<String>,
}

/// Response to a create.
#[derive(Debug, Deserialize)]
struct CreateResponse {
    cluster_id: String,
    cluster_name: String,
    request_id: String,
}

/// Response to a destroy.
#[derive(Debug, Deserialize)]
struct DestroyResponse {
    request_id: String,
}

/// Error response from the broker.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl HttpCloudGateway {
    /// Create a gateway for the broker at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or the HTTP client cannot
    /// be built.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| CloudError::Config(format!("failed to create HTTP client: {e}")))?;
        Self::with_client(client, base_url)
    }

    /// Create a gateway with a custom reqwest client.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| CloudError::Config(format!("invalid broker URL {base_url:?}: {e}")))?;
        Ok(Self { client, base_url })
    }

    /// The broker base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Build a URL from percent-encoded path segments.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| CloudError::Config(format!("broker URL {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn clusters_url(&self, provider: CloudProvider, region: &str) -> Result<Url> {
        self.url(&["v1", provider.slug(), "regions", region, "clusters"])
    }

    /// Turn a response into `T`, mapping error statuses.
    async fn read<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| CloudError::InvalidResponse(e.to_string()));
        }

        if status == StatusCode::NOT_FOUND {
            return Err(CloudError::NotFound(what.to_string()));
        }

        let message = response
            .json::<ErrorResponse>()
            .await
            .map(|e| e.error)
            .unwrap_or_else(|_| format!("broker returned status {status}"));

        Err(CloudError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    fn detail(provider: CloudProvider, region: &str, raw: RawCluster) -> ClusterDetail {
        ClusterDetail {
            state: ProviderClusterState::from_provider(provider, &raw.state),
            region: raw.region.unwrap_or_else(|| region.to_string()),
            cluster_id: raw.id,
            cluster_name: raw.name,
            endpoint: raw.endpoint,
        }
    }
}

fn transport(e: &reqwest::Error) -> CloudError {
    CloudError::Transport(e.to_string())
}

#[async_trait]
impl CloudGateway for HttpCloudGateway {
    async fn create(&self, plan: &ClusterPlan) -> Result<ClusterHandle> {
        let (provider, region) = target_of(plan)?;
        let url = self.url(&["v1", provider.slug(), "clusters"])?;

        let mut body = plan.clone();
        body.tags
            .insert(NAME_TAG.to_string(), plan.cluster_name.clone());

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport(&e))?;

        let created: CreateResponse = Self::read(response, &plan.cluster_name).await?;

        tracing::info!(
            spec_id = %plan.spec_id,
            provider = %provider,
            region,
            cluster_id = %created.cluster_id,
            request_id = %created.request_id,
            "Requested cluster creation"
        );

        Ok(ClusterHandle {
            cluster_id: created.cluster_id,
            cluster_name: created.cluster_name,
            request_id: created.request_id,
        })
    }

    async fn list(&self, provider: CloudProvider, region: &str) -> Result<Vec<ClusterSummary>> {
        let url = self.clusters_url(provider, region)?;
        let response = self.client.get(url).send().await.map_err(|e| transport(&e))?;

        let raw: Vec<RawCluster> = Self::read(response, region).await?;
        Ok(raw
            .into_iter()
            .map(|c| ClusterSummary {
                state: ProviderClusterState::from_provider(provider, &c.state),
                cluster_id: c.id,
                cluster_name: c.name,
            })
            .collect())
    }

    async fn describe(
        &self,
        provider: CloudProvider,
        region: &str,
        lookup: &ClusterLookup,
    ) -> Result<ClusterDetail> {
        match lookup {
            ClusterLookup::Id(id) => {
                let url = self.url(&["v1", provider.slug(), "regions", region, "clusters", id])?;
                let response = self.client.get(url).send().await.map_err(|e| transport(&e))?;
                let raw: RawCluster = Self::read(response, id).await?;
                Ok(Self::detail(provider, region, raw))
            }
            ClusterLookup::Name(name) => match provider {
                CloudProvider::Emr => Err(CloudError::Unsupported(
                    "EMR clusters cannot be described by name".to_string(),
                )),
                CloudProvider::Hdi => {
                    let mut url = self.clusters_url(provider, region)?;
                    url.query_pairs_mut().append_pair("name", name);
                    let response =
                        self.client.get(url).send().await.map_err(|e| transport(&e))?;
                    let raw: Vec<RawCluster> = Self::read(response, name).await?;
                    raw.into_iter()
                        .find(|c| &c.name == name)
                        .map(|c| Self::detail(provider, region, c))
                        .ok_or_else(|| CloudError::NotFound(name.clone()))
                }
            },
        }
    }

    async fn destroy(
        &self,
        provider: CloudProvider,
        region: &str,
        cluster_id: &str,
    ) -> Result<String> {
        let url = self.url(&["v1", provider.slug(), "regions", region, "clusters", cluster_id])?;
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|e| transport(&e))?;

        let destroyed: DestroyResponse = Self::read(response, cluster_id).await?;
        tracing::info!(
            provider = %provider,
            region,
            cluster_id,
            request_id = %destroyed.request_id,
            "Requested cluster deletion"
        );
        Ok(destroyed.request_id)
    }
}
