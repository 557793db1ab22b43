//! HTTP client for a running cluster

use crate::cluster::server::ClusterStatus;
use crate::common::{NodeId, SubmitOperation, SubmitResult};
use crate::node::NodeStatus;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;

pub struct ClusterClient {
    base_url: String,
    http: reqwest::Client,
}

impl ClusterClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn status(&self) -> Result<ClusterStatus> {
        let resp = self.http.get(self.url("/status")).send().await?;
        decode(resp).await
    }

    pub async fn node_status(&self, id: NodeId) -> Result<NodeStatus> {
        let resp = self
            .http
            .get(self.url(&format!("/nodes/{}", id)))
            .send()
            .await?;
        decode(resp).await
    }

    /// Submit through the cluster router (`node = None`) or straight to one node.
    /// A rejected submission is returned as a `SubmitResult`, not an error.
    pub async fn submit(
        &self,
        node: Option<NodeId>,
        account_id: &str,
        delta: i64,
    ) -> Result<SubmitResult> {
        let path = match node {
            Some(id) => format!("/nodes/{}/submit", id),
            None => "/submit".to_string(),
        };
        let body = SubmitOperation {
            account_id: account_id.to_string(),
            delta,
        };

        // reqwest follows the 307 to the leader; any final body is a SubmitResult.
        let resp = self
            .http
            .post(self.url(&path))
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|_| Error::Http(format!("{}: {}", status, text)))
    }

    pub async fn crash(&self, id: NodeId) -> Result<serde_json::Value> {
        self.post_empty(&format!("/nodes/{}/crash", id)).await
    }

    pub async fn recover(&self, id: NodeId) -> Result<serde_json::Value> {
        self.post_empty(&format!("/nodes/{}/recover", id)).await
    }

    pub async fn start_election(&self, id: NodeId) -> Result<serde_json::Value> {
        self.post_empty(&format!("/nodes/{}/election", id)).await
    }

    async fn post_empty(&self, path: &str) -> Result<serde_json::Value> {
        let resp = self.http.post(self.url(path)).send().await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(Error::Http(format!("{}: {}", status, text)));
    }
    Ok(resp.json().await?)
}
