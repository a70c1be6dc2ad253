// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::CollectorError;
use std::env;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MAX_BUFFER_SIZE: usize = 50;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_HEC_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_APP_NAME: &str = "rum-demo";

/// Buffering policy shared between the reader thread, the flush timer and
/// whoever adjusts settings at runtime.
///
/// Every value is re-read on the next append or flush cycle.
#[derive(Debug)]
pub struct LogBufferConfig {
    enabled: AtomicBool,
    max_buffer_size: AtomicUsize,
    flush_interval_ms: AtomicU64,
}

impl Default for LogBufferConfig {
    fn default() -> Self {
        Self::new(true, DEFAULT_MAX_BUFFER_SIZE, DEFAULT_FLUSH_INTERVAL)
    }
}

impl LogBufferConfig {
    #[must_use]
    pub fn new(enabled: bool, max_buffer_size: usize, flush_interval: Duration) -> Self {
        let config = Self {
            enabled: AtomicBool::new(enabled),
            max_buffer_size: AtomicUsize::new(DEFAULT_MAX_BUFFER_SIZE),
            flush_interval_ms: AtomicU64::new(0),
        };
        config.set_max_buffer_size(max_buffer_size);
        config.set_flush_interval(flush_interval);
        config
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size.load(Ordering::Acquire)
    }

    /// Sizes below one are clamped to one.
    pub fn set_max_buffer_size(&self, size: usize) {
        self.max_buffer_size.store(size.max(1), Ordering::Release);
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.load(Ordering::Acquire))
    }

    /// Intervals below [`MIN_FLUSH_INTERVAL`] are clamped up to it.
    pub fn set_flush_interval(&self, interval: Duration) {
        let interval = interval.max(MIN_FLUSH_INTERVAL);
        let millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.flush_interval_ms.store(millis, Ordering::Release);
    }
}

/// Where flushed entries go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Custom events on the telemetry agent.
    Agent,
    /// Direct POSTs to the HTTP Event Collector.
    Hec,
}

impl Destination {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "agent" | "rum" => Some(Self::Agent),
            "hec" | "splunk" | "http" => Some(Self::Hec),
            _ => None,
        }
    }
}

/// Feature flag selecting the active [`Destination`].
///
/// Cloning shares the flag. The forwarder reads it once per flush cycle, so a
/// change only affects entries forwarded afterwards.
#[derive(Debug, Clone, Default)]
pub struct DestinationSwitch {
    send_to_hec: Arc<AtomicBool>,
}

impl DestinationSwitch {
    #[must_use]
    pub fn new(destination: Destination) -> Self {
        let switch = Self::default();
        switch.set(destination);
        switch
    }

    pub fn get(&self) -> Destination {
        if self.send_to_hec.load(Ordering::Acquire) {
            Destination::Hec
        } else {
            Destination::Agent
        }
    }

    pub fn set(&self, destination: Destination) {
        self.send_to_hec
            .store(destination == Destination::Hec, Ordering::Release);
    }
}

/// HTTP Event Collector settings, fixed at startup.
#[derive(Debug, Clone)]
pub struct HecConfig {
    /// Full collector URL, e.g. `https://hec.example.com:8088/services/collector/event`
    pub url: String,
    pub token: String,
    /// Application name sent as the event `source`.
    pub source: String,
    pub timeout: Duration,
}

impl Default for HecConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            source: DEFAULT_APP_NAME.to_string(),
            timeout: DEFAULT_HEC_TIMEOUT,
        }
    }
}

impl HecConfig {
    /// Both URL and token must be present for the HEC sink to be used.
    pub fn is_usable(&self) -> bool {
        !self.url.trim().is_empty() && !self.token.trim().is_empty()
    }
}

/// Everything the composition root needs to build a collector.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub buffering_enabled: bool,
    pub max_buffer_size: usize,
    pub flush_interval: Duration,
    pub destination: Destination,
    pub hec: HecConfig,
    /// Log level for the diagnostic logger (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            buffering_enabled: true,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            destination: Destination::Agent,
            hec: HecConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl CollectorConfig {
    /// Create configuration from `RUM_LOGS_*` environment variables
    pub fn from_env() -> Result<Self, CollectorError> {
        let defaults = Self::default();

        let buffering_enabled = env::var("RUM_LOGS_BUFFER_ENABLED")
            .map(|val| val.to_lowercase() != "false")
            .unwrap_or(defaults.buffering_enabled);
        let max_buffer_size = env::var("RUM_LOGS_MAX_BUFFER_SIZE")
            .ok()
            .and_then(|size| size.parse::<usize>().ok())
            .unwrap_or(defaults.max_buffer_size);
        let flush_interval = env::var("RUM_LOGS_FLUSH_INTERVAL_MS")
            .ok()
            .and_then(|ms| ms.parse::<u64>().ok())
            .map_or(defaults.flush_interval, Duration::from_millis);
        let destination = match env::var("RUM_LOGS_DESTINATION") {
            Ok(val) => Destination::parse(&val).ok_or_else(|| {
                CollectorError::InvalidConfig(format!(
                    "Invalid destination '{val}'. Must be one of: agent, hec"
                ))
            })?,
            Err(_) => defaults.destination,
        };
        let hec = HecConfig {
            url: env::var("RUM_LOGS_HEC_URL").unwrap_or_default(),
            token: env::var("RUM_LOGS_HEC_TOKEN").unwrap_or_default(),
            source: env::var("RUM_LOGS_APP_NAME")
                .ok()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or(defaults.hec.source),
            timeout: env::var("RUM_LOGS_HEC_TIMEOUT_SECS")
                .ok()
                .and_then(|secs| secs.parse::<u64>().ok())
                .map_or(defaults.hec.timeout, Duration::from_secs),
        };
        let log_level = env::var("RUM_LOGS_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or(defaults.log_level);

        let config = Self {
            buffering_enabled,
            max_buffer_size,
            flush_interval,
            destination,
            hec,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), CollectorError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(CollectorError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        if self.destination == Destination::Hec && !self.hec.is_usable() {
            tracing::warn!("LOGS | HEC destination selected without URL or token, entries will go to the agent");
        }

        Ok(())
    }

    #[must_use]
    pub fn buffer_config(&self) -> LogBufferConfig {
        LogBufferConfig::new(
            self.buffering_enabled,
            self.max_buffer_size,
            self.flush_interval,
        )
    }
}
