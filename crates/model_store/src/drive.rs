//! Drive v3 artifact listing and download.

use async_trait::async_trait;
use common::{ArtifactRef, Error, ModelArtifact, ModelStore};
use serde::Deserialize;
use tracing::{debug, info};

use crate::auth::ServiceAccountAuth;
use crate::{format_reqwest_error, http_client};

const DRIVE_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<ArtifactRef>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Search expression selecting live JSON files directly under `folder_id`.
pub fn listing_query(folder_id: &str) -> String {
    format!(
        "'{}' in parents and mimeType='application/json' and trashed=false",
        folder_id.replace('\'', "\\'")
    )
}

/// Model artifacts stored as JSON files in one Drive folder.
#[derive(Debug, Clone)]
pub struct DriveModelStore {
    client: reqwest::Client,
    auth: ServiceAccountAuth,
    folder_id: String,
    base_url: String,
}

impl DriveModelStore {
    pub fn new(auth: ServiceAccountAuth, folder_id: &str) -> Result<Self, Error> {
        if folder_id.trim().is_empty() {
            return Err(Error::Config("Drive folder id is not configured".into()));
        }
        Ok(Self {
            client: http_client()?,
            auth,
            folder_id: folder_id.trim().to_string(),
            base_url: DRIVE_BASE_URL.to_string(),
        })
    }
}

#[async_trait]
impl ModelStore for DriveModelStore {
    /// Handles pagination and returns every artifact, newest first.
    async fn list_artifacts(&self) -> Result<Vec<ArtifactRef>, Error> {
        let token = self.auth.access_token().await?;
        let query = listing_query(&self.folder_id);
        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self
                .client
                .get(format!("{}/files", self.base_url))
                .bearer_auth(&token)
                .query(&[
                    ("q", query.as_str()),
                    ("fields", "nextPageToken, files(id, name, modifiedTime)"),
                    ("orderBy", "modifiedTime desc"),
                    ("pageSize", "200"),
                ]);
            if let Some(ref t) = page_token {
                req = req.query(&[("pageToken", t.as_str())]);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| Error::ArtifactListing(format_reqwest_error(&e)))?;

            let status = resp.status().as_u16();
            if status == 401 || status == 403 {
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::Auth(format!("Drive rejected credentials ({status}): {body}")));
            }
            if !resp.status().is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::ArtifactListing(format!("status={status}: {body}")));
            }

            let body: FileList = resp
                .json()
                .await
                .map_err(|e| Error::ArtifactListing(format_reqwest_error(&e)))?;

            let count = body.files.len();
            all_files.extend(body.files);
            debug!("Listed {} artifacts (total: {})", count, all_files.len());

            match body.next_page_token {
                Some(t) if !t.is_empty() => page_token = Some(t),
                _ => break,
            }
        }

        info!("Found {} model artifacts in Drive", all_files.len());
        Ok(all_files)
    }

    async fn download_artifact(&self, artifact: &ArtifactRef) -> Result<ModelArtifact, Error> {
        let download_err = |reason: String| Error::ArtifactDownload {
            name: artifact.name.clone(),
            reason,
        };

        let token = self.auth.access_token().await?;
        let resp = self
            .client
            .get(format!("{}/files/{}", self.base_url, artifact.id))
            .bearer_auth(&token)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| download_err(format_reqwest_error(&e)))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(download_err(format!("status={status}: {body}")));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| download_err(format_reqwest_error(&e)))?;

        serde_json::from_slice(&bytes).map_err(|e| Error::MalformedArtifact {
            name: artifact.name.clone(),
            reason: e.to_string(),
        })
    }
}
