// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivers flushed batches to the active sink.
//!
//! The destination is read once per batch. `Hec` falls back to the agent when
//! the collector has no usable URL and token. HEC requests are spawned on the
//! runtime and tracked so shutdown can wait for them; callers of
//! [`Forwarder::forward`] never block on the network.

use crate::agent::{Attributes, TelemetryAgent};
use crate::config::{Destination, DestinationSwitch};
use crate::entry::BufferedLogEntry;
use crate::hec::HecClient;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

pub const LOG_EVENT_NAME: &str = "Log";
pub const LOG_SOURCE: &str = "stderr";

/// Attributes of the custom event an entry becomes on the agent sink.
#[must_use]
pub fn agent_attributes(entry: &BufferedLogEntry) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert("log.message".to_string(), entry.message.as_str().into());
    attributes.insert("log.level".to_string(), entry.level().into());
    attributes.insert("log.source".to_string(), LOG_SOURCE.into());
    attributes.insert("log.timestamp".to_string(), entry.iso8601_timestamp().into());
    attributes
}

pub struct Forwarder {
    agent: Arc<dyn TelemetryAgent>,
    hec: Option<HecClient>,
    destination: DestinationSwitch,
    runtime: Handle,
    in_flight: TaskTracker,
}

impl Forwarder {
    pub fn new(
        agent: Arc<dyn TelemetryAgent>,
        hec: Option<HecClient>,
        destination: DestinationSwitch,
        runtime: Handle,
    ) -> Self {
        Self {
            agent,
            hec,
            destination,
            runtime,
            in_flight: TaskTracker::new(),
        }
    }

    pub fn destination(&self) -> &DestinationSwitch {
        &self.destination
    }

    pub fn hec(&self) -> Option<&HecClient> {
        self.hec.as_ref()
    }

    /// The sink a batch would go to right now.
    pub fn active_sink(&self) -> Destination {
        match (self.destination.get(), &self.hec) {
            (Destination::Hec, Some(hec)) if hec.is_usable() => Destination::Hec,
            _ => Destination::Agent,
        }
    }

    pub fn forward(&self, batch: Vec<BufferedLogEntry>) {
        if batch.is_empty() {
            return;
        }
        match self.active_sink() {
            Destination::Agent => self.forward_to_agent(&batch),
            Destination::Hec => self.forward_to_hec(batch),
        }
    }

    fn forward_to_agent(&self, batch: &[BufferedLogEntry]) {
        debug!("LOGS | Forwarding {} entries to agent", batch.len());
        for entry in batch {
            self.agent
                .track_custom_event(LOG_EVENT_NAME, agent_attributes(entry));
        }
    }

    fn forward_to_hec(&self, batch: Vec<BufferedLogEntry>) {
        let Some(hec) = self.hec.as_ref() else {
            return;
        };
        debug!("LOGS | Forwarding {} entries to HEC", batch.len());
        for entry in batch {
            let hec = hec.clone();
            self.in_flight.spawn_on(
                async move {
                    if let Err(e) = hec.send_event(&entry.message).await {
                        warn!("LOGS | Dropping log entry, HEC delivery failed: {e}");
                    }
                },
                &self.runtime,
            );
        }
    }

    /// Waits until every HEC request spawned so far has finished.
    pub async fn wait_for_delivery(&self) {
        self.in_flight.close();
        self.in_flight.wait().await;
        self.in_flight.reopen();
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
