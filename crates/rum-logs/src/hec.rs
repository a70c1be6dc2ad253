// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Splunk HTTP Event Collector client.
//!
//! Every entry is its own request:
//!
//! ```text
//! POST <url>
//! Authorization: Splunk <token>
//! Content-Type: application/json
//!
//! {"event": "<message>", "sourcetype": "ios_app", "source": "<app name>"}
//! ```
//!
//! Only `200 OK` counts as delivered. There is no retry; callers on the
//! background path log the error and drop the entry.

use crate::config::HecConfig;
use crate::error::HecError;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error};

pub const SOURCETYPE: &str = "ios_app";

#[derive(Debug, Serialize)]
pub struct HecEvent<'a> {
    pub event: &'a str,
    pub sourcetype: &'static str,
    pub source: &'a str,
}

/// Builds the HTTP client, falling back to reqwest defaults when the
/// configured client cannot be built.
#[must_use]
pub fn get_client(config: &HecConfig) -> reqwest::Client {
    match reqwest::Client::builder().timeout(config.timeout).build() {
        Ok(client) => client,
        Err(e) => {
            error!("LOGS | Failed to build HEC client: {e}, using reqwest defaults");
            reqwest::Client::new()
        }
    }
}

#[derive(Debug, Clone)]
pub struct HecClient {
    client: reqwest::Client,
    config: Arc<HecConfig>,
}

impl HecClient {
    #[must_use]
    pub fn new(config: HecConfig) -> Self {
        let client = get_client(&config);
        Self {
            client,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &HecConfig {
        &self.config
    }

    pub fn is_usable(&self) -> bool {
        self.config.is_usable()
    }

    fn payload(&self, message: &str) -> Result<Vec<u8>, HecError> {
        let event = HecEvent {
            event: message,
            sourcetype: SOURCETYPE,
            source: &self.config.source,
        };
        serde_json::to_vec(&event).map_err(|e| HecError::Serialization(e.to_string()))
    }

    fn parse_url(&self) -> Result<Url, HecError> {
        let url = Url::parse(self.config.url.trim())
            .map_err(|e| HecError::InvalidUrl(format!("{}: {e}", self.config.url)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(HecError::InvalidUrl(format!(
                "{}: unsupported scheme {scheme}",
                self.config.url
            ))),
        }
    }

    /// Posts a single event.
    pub async fn send_event(&self, message: &str) -> Result<(), HecError> {
        if !self.is_usable() {
            return Err(HecError::ConfigurationMissing);
        }
        let url = self.parse_url()?;
        let body = self.payload(message)?;

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("Splunk {}", self.config.token.trim()))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| HecError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                debug!("LOGS | Delivered event to HEC");
                Ok(())
            }
            status => Err(HecError::Status(status.as_u16())),
        }
    }

    /// One-off connectivity check outside the buffering path.
    pub async fn send_test_log(&self) -> Result<(), HecError> {
        if !self.is_usable() {
            return Err(HecError::ConfigurationMissing);
        }
        self.parse_url()?;
        let message = format!(
            "HEC connectivity test from {} at {}",
            self.config.source,
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        );
        self.send_event(&message).await
    }
}
