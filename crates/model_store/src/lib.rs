//! Remote model artifact store and training metadata feed.
//!
//! Artifacts are JSON files in a Google Drive folder, read with a
//! service-account token. Metadata comes from the training repository's
//! raw `models_metadata.json`.

pub mod auth;
pub mod drive;
pub mod metadata;

pub use auth::ServiceAccountAuth;
pub use drive::DriveModelStore;
pub use metadata::GithubMetadataFeed;

use std::error::Error as StdError;

pub(crate) fn format_reqwest_error(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !cause_msg.is_empty() && !message.contains(&cause_msg) {
            message.push_str(": ");
            message.push_str(&cause_msg);
        }
        source = cause.source();
    }

    message
}

pub(crate) fn http_client() -> Result<reqwest::Client, common::Error> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(2)
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| common::Error::Http(format_reqwest_error(&e)))
}
