//! The outbound half of the internal replication hop: an HTTP client wrapping a single
//! peer's base URL.

use crate::record::{format_timestamp, parse_timestamp, Record};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use url::Url;

pub const X_LAST_MODIFIED: &str = "x-last-modified";
pub const X_REPLICATED: &str = "x-replicated";

#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    #[error("key not found on replica")]
    NotFound,

    #[error("request to replica failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("replica returned unexpected status {0}")]
    UnexpectedStatus(StatusCode),

    #[error("replica base url is invalid: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Speaks the `/v0/entity` protocol to a single peer, on behalf of the coordinator's
/// fan-out. Every call this client makes sets `x-replicated: yes` and omits the
/// `replicas` query parameter, since the replicated hop always addresses exactly one
/// node.
pub struct ReplicaClient {
    base_url: Url,
    http: Client,
}

impl ReplicaClient {
    pub fn new(base_url: Url, http: Client) -> Self {
        Self { base_url, http }
    }

    fn entity_url(&self, key: &[u8]) -> Result<Url, ReplicaError> {
        let mut url = self.base_url.join("/v0/entity")?;
        url.query_pairs_mut()
            .append_pair("id", &String::from_utf8_lossy(key));
        Ok(url)
    }

    pub async fn get(&self, key: &[u8]) -> Result<Record, ReplicaError> {
        let url = self.entity_url(key)?;
        let response = self
            .http
            .get(url)
            .header(X_REPLICATED, "yes")
            .send()
            .await?;

        let timestamp_header = response
            .headers()
            .get(X_LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_timestamp);

        match response.status() {
            StatusCode::OK => {
                let timestamp = timestamp_header.unwrap_or_else(Utc::now);
                let body = response.bytes().await?;
                Ok(Record::present(body.to_vec(), timestamp))
            }
            StatusCode::NOT_FOUND => match timestamp_header {
                Some(timestamp) => Ok(Record::tombstone(timestamp)),
                None => Err(ReplicaError::NotFound),
            },
            other => Err(ReplicaError::UnexpectedStatus(other)),
        }
    }

    pub async fn put(&self, key: &[u8], value: &[u8], timestamp: DateTime<Utc>) -> Result<(), ReplicaError> {
        let url = self.entity_url(key)?;
        let response = self
            .http
            .put(url)
            .header(X_REPLICATED, "yes")
            .header(X_LAST_MODIFIED, format_timestamp(timestamp))
            .body(value.to_vec())
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED => Ok(()),
            other => Err(ReplicaError::UnexpectedStatus(other)),
        }
    }

    pub async fn delete(&self, key: &[u8], timestamp: DateTime<Utc>) -> Result<(), ReplicaError> {
        let url = self.entity_url(key)?;
        let response = self
            .http
            .delete(url)
            .header(X_REPLICATED, "yes")
            .header(X_LAST_MODIFIED, format_timestamp(timestamp))
            .send()
            .await?;

        match response.status() {
            StatusCode::ACCEPTED => Ok(()),
            other => Err(ReplicaError::UnexpectedStatus(other)),
        }
    }
}
