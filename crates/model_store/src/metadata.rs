//! Training metadata published alongside the models.

use async_trait::async_trait;
use common::{Error, MetadataFeed, ModelsMetadata};
use tracing::info;

use crate::{format_reqwest_error, http_client};

/// Raw URL of `models_metadata.json` on the repo's main branch.
pub fn metadata_url(repo: &str) -> String {
    format!(
        "https://raw.githubusercontent.com/{}/main/models_metadata.json",
        repo.trim().trim_matches('/')
    )
}

#[derive(Debug, Clone)]
pub struct GithubMetadataFeed {
    client: reqwest::Client,
    url: String,
}

impl GithubMetadataFeed {
    pub fn new(repo: &str) -> Result<Self, Error> {
        if repo.trim().is_empty() {
            return Err(Error::Config("metadata repository is not configured".into()));
        }
        Ok(Self {
            client: http_client()?,
            url: metadata_url(repo),
        })
    }
}

#[async_trait]
impl MetadataFeed for GithubMetadataFeed {
    async fn fetch_metadata(&self) -> Result<ModelsMetadata, Error> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::MetadataFetch(format_reqwest_error(&e)))?;

        if !resp.status().is_success() {
            return Err(Error::MetadataFetch(format!(
                "{} returned status {}",
                self.url,
                resp.status().as_u16()
            )));
        }

        let metadata: ModelsMetadata = resp
            .json()
            .await
            .map_err(|e| Error::MetadataFetch(format_reqwest_error(&e)))?;

        info!("Metadata loaded: {} models listed", metadata.models.len());
        Ok(metadata)
    }
}
