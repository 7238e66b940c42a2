//! Indian postal index lookup (api.postalpincode.in).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{http_client, PostalLookup};
use crate::domain::value_objects::{Pincode, PostalPlace};
use crate::error::{Result, StorefrontError};

#[derive(Deserialize)]
struct LookupEntry {
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "PostOffice", default)]
    post_office: Option<Vec<PostOffice>>,
}

#[derive(Deserialize)]
struct PostOffice {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "District")]
    district: String,
    #[serde(rename = "State")]
    state: String,
}

pub struct PostalClient {
    http: reqwest::Client,
    base_url: String,
}

impl PostalClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self { http: http_client(timeout)?, base_url: base_url.into().trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl PostalLookup for PostalClient {
    async fn lookup(&self, pincode: &Pincode) -> Result<PostalPlace> {
        let response = self.http
            .get(format!("{}/pincode/{}", self.base_url, pincode))
            .send()
            .await
            .map_err(|e| StorefrontError::external("postal", e.to_string()))?;
        if !response.status().is_success() {
            return Err(StorefrontError::external("postal", format!("lookup failed: {}", response.status())));
        }
        let entries: Vec<LookupEntry> = response.json().await.map_err(|e| StorefrontError::external("postal", e.to_string()))?;
        let office = entries.into_iter()
            .find(|e| e.status == "Success")
            .and_then(|e| e.post_office)
            .and_then(|offices| offices.into_iter().next())
            .ok_or_else(|| StorefrontError::NotFound(format!("Pincode {}", pincode)))?;
        debug!(%pincode, district = %office.district, "pincode resolved");
        Ok(PostalPlace { post_office: office.name, district: office.district, state: office.state })
    }
}
