// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while configuring or driving the collector
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Collector already started")]
    AlreadyStarted,

    #[error("Collector not running")]
    NotRunning,

    #[error("No tokio runtime available to drive flushes")]
    NoRuntime,

    #[error("Failed to redirect stderr: {op} failed: {source}")]
    Redirect {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn stderr reader thread: {0}")]
    ReaderSpawn(#[source] std::io::Error),
}

/// Failures reported by the HTTP Event Collector client
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HecError {
    #[error("HEC URL or token is not configured")]
    ConfigurationMissing,

    #[error("Invalid HEC URL: {0}")]
    InvalidUrl(String),

    #[error("HEC responded with status {0}")]
    Status(u16),

    #[error("Failed to reach HEC: {0}")]
    Transport(String),

    #[error("Failed to serialize HEC payload: {0}")]
    Serialization(String),
}
