//! Parsing for the `/v0/entity` query string and the handful of headers that distinguish
//! an external client request from the internal replication hop.

use crate::http::error::ApiError;
use serde::Deserialize;

pub const X_LAST_MODIFIED: &str = "x-last-modified";
pub const X_REPLICATED: &str = "x-replicated";

#[derive(Debug, Deserialize)]
pub struct EntityQuery {
    pub id: String,
    pub replicas: Option<String>,
}

/// The resolved `ack`/`from` pair a request asks for, defaulting to `1/1`.
#[derive(Debug, Clone, Copy)]
pub struct Replicas {
    pub ack: usize,
    pub from: usize,
}

impl Replicas {
    pub const DEFAULT: Replicas = Replicas { ack: 1, from: 1 };

    /// Parse the `replicas=A/F` query value. Must match `^\d+/\d+$` with both numbers
    /// positive and `A <= F`; anything else is a validation failure.
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        let invalid = || ApiError::BadParameters(format!("malformed replicas parameter: {raw}"));

        let (ack_str, from_str) = raw.split_once('/').ok_or_else(invalid)?;
        if ack_str.is_empty()
            || from_str.is_empty()
            || !ack_str.bytes().all(|b| b.is_ascii_digit())
            || !from_str.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let ack: usize = ack_str.parse().map_err(|_| invalid())?;
        let from: usize = from_str.parse().map_err(|_| invalid())?;
        if ack == 0 || from == 0 || ack > from {
            return Err(invalid());
        }
        Ok(Replicas { ack, from })
    }
}

impl EntityQuery {
    pub fn key_bytes(&self) -> Result<Vec<u8>, ApiError> {
        if self.id.is_empty() {
            return Err(ApiError::BadParameters("id must not be empty".into()));
        }
        Ok(self.id.clone().into_bytes())
    }

    pub fn replicas(&self) -> Result<Replicas, ApiError> {
        match &self.replicas {
            Some(raw) => Replicas::parse(raw),
            None => Ok(Replicas::DEFAULT),
        }
    }
}
