// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # RUM log collection
//!
//! Captures everything the process writes to its standard-error stream and
//! forwards it as telemetry, either as custom events on a RUM agent or as
//! events posted to a Splunk HTTP Event Collector (HEC).
//!
//! ```text
//!   fd 2 writes
//!       │
//!       v
//!   ┌──────────────┐
//!   │ Interceptor  │ (pipe + passthrough to original stderr)
//!   └──────┬───────┘
//!          │ lines
//!          v
//!   ┌──────────────┐
//!   │  LogBuffer   │ (size threshold, timer, manual flush)
//!   └──────┬───────┘
//!          │ batches
//!          v
//!   ┌──────────────┐
//!   │  Forwarder   │ ──> TelemetryAgent::track_custom_event
//!   └──────────────┘ ──> HEC POST (one per entry)
//! ```
//!
//! - [`collector`]: the [`LogCollector`] component tying the pipeline together
//! - [`interceptor`]: the [`StreamSource`] seam and the stderr redirection
//! - [`buffer`]: the guarded buffer and its swap-on-flush policy
//! - [`forwarder`]: sink selection and delivery
//! - [`hec`]: the HTTP Event Collector client
//! - [`agent`]: the telemetry agent capability
//! - [`config`]: runtime-adjustable settings and env loading
//! - [`logger`]: diagnostic log formatting

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod agent;
pub mod buffer;
pub mod collector;
pub mod config;
pub mod entry;
pub mod error;
pub mod forwarder;
pub mod hec;
pub mod interceptor;
pub mod logger;

pub use agent::{AttributeValue, Attributes, NoopAgent, TelemetryAgent, TracingAgent};
pub use collector::LogCollector;
pub use config::{CollectorConfig, Destination, DestinationSwitch, HecConfig, LogBufferConfig};
pub use entry::BufferedLogEntry;
pub use error::{CollectorError, HecError};
pub use interceptor::{Capture, StreamSource};

#[cfg(unix)]
pub use interceptor::StderrRedirect;
