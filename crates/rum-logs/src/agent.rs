// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The telemetry agent capability.
//!
//! The RUM agent itself lives outside this crate. Callers hand the collector
//! something implementing [`TelemetryAgent`]; tests and agent-less setups use
//! [`NoopAgent`].

use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

/// A custom event attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Double(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

pub type Attributes = BTreeMap<String, AttributeValue>;

/// Receives named custom events.
///
/// Calls are fire-and-forget; the agent owns export and retry.
pub trait TelemetryAgent: Send + Sync {
    fn track_custom_event(&self, name: &str, attributes: Attributes);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAgent;

impl TelemetryAgent for NoopAgent {
    fn track_custom_event(&self, _name: &str, _attributes: Attributes) {}
}

/// Emits custom events through `tracing`, for running without a RUM SDK.
///
/// Install a subscriber that writes to stdout, otherwise these events are
/// captured again by the collector.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAgent;

impl TelemetryAgent for TracingAgent {
    fn track_custom_event(&self, name: &str, attributes: Attributes) {
        let attributes = attributes
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<String>>()
            .join(" ");
        info!(target: "rum_agent", "custom event {name}: {attributes}");
    }
}
