// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The log collector: capture, buffer, flush, forward.
//!
//! # Flush triggers
//!
//! - **Threshold**: the append that fills the buffer to `max_buffer_size`
//!   swaps it out and forwards the batch on the appending thread.
//! - **Timer**: a task on the tokio runtime flushes every `flush_interval`,
//!   re-reading the interval each cycle.
//! - **Manual**: [`LogCollector::flush`], from any thread.
//! - **Stop**: [`LogCollector::stop`] drains whatever is left.
//!
//! With buffering disabled every entry is forwarded as soon as it is
//! captured; entries buffered before the switch wait for the next trigger.
//!
//! All triggers go through the same [`LogBuffer`] swap, and forwarding
//! happens outside its lock.

use crate::agent::TelemetryAgent;
use crate::buffer::LogBuffer;
use crate::config::{CollectorConfig, DestinationSwitch, LogBufferConfig};
use crate::entry::{decode_chunk, split_lines, BufferedLogEntry};
use crate::error::{CollectorError, HecError};
use crate::forwarder::Forwarder;
use crate::hec::HecClient;
use crate::interceptor::{read_loop, StreamSource};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const READER_THREAD_NAME: &str = "rum-logs-stderr";

struct Pipeline {
    config: Arc<LogBufferConfig>,
    buffer: LogBuffer,
    forwarder: Forwarder,
}

impl Pipeline {
    fn append(&self, entry: BufferedLogEntry) {
        if !self.config.enabled() {
            self.forwarder.forward(vec![entry]);
            return;
        }
        if let Some(batch) = self.buffer.append(entry, self.config.max_buffer_size()) {
            debug!("LOGS | Buffer full, flushing {} entries", batch.len());
            self.forwarder.forward(batch);
        }
    }

    fn ingest_text(&self, text: &str) {
        for line in split_lines(text) {
            self.append(BufferedLogEntry::new(line, true));
        }
    }

    fn ingest_bytes(&self, bytes: &[u8]) {
        if let Some(text) = decode_chunk(bytes) {
            self.ingest_text(text);
        }
    }

    fn flush(&self) {
        let batch = self.buffer.take();
        if !batch.is_empty() {
            debug!("LOGS | Flushing {} buffered entries", batch.len());
            self.forwarder.forward(batch);
        }
    }
}

async fn flush_loop(pipeline: Arc<Pipeline>, cancel: CancellationToken) {
    loop {
        let period = pipeline.config.flush_interval();
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(period) => pipeline.flush(),
        }
    }
    debug!("LOGS | Flush timer stopped");
}

struct Running {
    reader: JoinHandle<()>,
    timer: CancellationToken,
}

struct State {
    source: Box<dyn StreamSource>,
    running: Option<Running>,
}

/// Captures error-stream output and forwards it to the configured sink.
///
/// Construct one per application and share it by reference or `Arc`.
/// Independent instances do not interfere, apart from the fact that only
/// one of them can own fd 2 at a time.
pub struct LogCollector {
    pipeline: Arc<Pipeline>,
    state: Mutex<State>,
    runtime: Handle,
}

impl LogCollector {
    /// Builds a collector from application configuration.
    ///
    /// Must be called from within a tokio runtime; the runtime drives the
    /// flush timer and HEC requests.
    pub fn new(
        source: Box<dyn StreamSource>,
        agent: Arc<dyn TelemetryAgent>,
        config: &CollectorConfig,
    ) -> Result<Self, CollectorError> {
        let runtime = Handle::try_current().map_err(|_| CollectorError::NoRuntime)?;
        let forwarder = Forwarder::new(
            agent,
            Some(HecClient::new(config.hec.clone())),
            DestinationSwitch::new(config.destination),
            runtime.clone(),
        );
        Ok(Self::from_parts(
            source,
            Arc::new(config.buffer_config()),
            forwarder,
            runtime,
        ))
    }

    #[must_use]
    pub fn from_parts(
        source: Box<dyn StreamSource>,
        config: Arc<LogBufferConfig>,
        forwarder: Forwarder,
        runtime: Handle,
    ) -> Self {
        Self {
            pipeline: Arc::new(Pipeline {
                config,
                buffer: LogBuffer::new(),
                forwarder,
            }),
            state: Mutex::new(State {
                source,
                running: None,
            }),
            runtime,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts capturing. Calling it while already running does nothing.
    pub fn start(&self) -> Result<(), CollectorError> {
        let mut state = self.state();
        if state.running.is_some() {
            return Ok(());
        }

        let capture = state.source.attach()?;
        let pipeline = Arc::clone(&self.pipeline);
        let reader = match thread::Builder::new()
            .name(READER_THREAD_NAME.to_string())
            .spawn(move || read_loop(capture, |chunk| pipeline.ingest_bytes(chunk)))
        {
            Ok(reader) => reader,
            Err(e) => {
                if let Err(detach_error) = state.source.detach() {
                    error!("LOGS | Failed to restore stderr: {detach_error}");
                }
                return Err(CollectorError::ReaderSpawn(e));
            }
        };

        let timer = CancellationToken::new();
        self.runtime
            .spawn(flush_loop(Arc::clone(&self.pipeline), timer.clone()));

        state.running = Some(Running { reader, timer });
        info!("LOGS | Log collector started");
        Ok(())
    }

    /// Stops capturing and drains the buffer.
    ///
    /// When this returns the original stream is restored, no further reads
    /// happen and `buffered_count()` is zero. Calling it while stopped does
    /// nothing.
    pub fn stop(&self) -> Result<(), CollectorError> {
        let mut state = self.state();
        let Some(running) = state.running.take() else {
            return Ok(());
        };

        running.timer.cancel();
        let detached = state.source.detach();
        if running.reader.join().is_err() {
            error!("LOGS | Stderr reader thread panicked");
        }
        drop(state);

        self.pipeline.flush();
        info!("LOGS | Log collector stopped");
        detached
    }

    /// Stops the collector and waits for in-flight HEC requests.
    pub async fn shutdown(&self) -> Result<(), CollectorError> {
        let stopped = self.stop();
        self.pipeline.forwarder.wait_for_delivery().await;
        stopped
    }

    pub fn is_running(&self) -> bool {
        self.state().running.is_some()
    }

    /// Forwards everything buffered so far.
    pub fn flush(&self) {
        self.pipeline.flush();
    }

    pub fn buffered_count(&self) -> usize {
        self.pipeline.buffer.len()
    }

    /// Appends one entry under the current buffering policy.
    pub fn append(&self, entry: BufferedLogEntry) {
        self.pipeline.append(entry);
    }

    /// Splits decoded output into error-level entries.
    pub fn ingest_text(&self, text: &str) {
        self.pipeline.ingest_text(text);
    }

    /// Decodes a raw chunk; invalid UTF-8 is dropped.
    pub fn ingest_bytes(&self, bytes: &[u8]) {
        self.pipeline.ingest_bytes(bytes);
    }

    pub fn config(&self) -> &Arc<LogBufferConfig> {
        &self.pipeline.config
    }

    pub fn destination(&self) -> &DestinationSwitch {
        self.pipeline.forwarder.destination()
    }

    /// Waits for HEC requests spawned so far.
    pub async fn wait_for_delivery(&self) {
        self.pipeline.forwarder.wait_for_delivery().await;
    }

    /// Sends a single test event to the HEC, bypassing the buffer.
    pub async fn send_test_log(&self) -> Result<(), HecError> {
        match self.pipeline.forwarder.hec() {
            Some(hec) => hec.send_test_log().await,
            None => Err(HecError::ConfigurationMissing),
        }
    }

    /// Runs [`Self::send_test_log`] in the background and reports the
    /// outcome to `completion`.
    pub fn send_test_log_with<F>(&self, completion: F) -> tokio::task::JoinHandle<()>
    where
        F: FnOnce(Result<(), HecError>) + Send + 'static,
    {
        let hec = self.pipeline.forwarder.hec().cloned();
        self.runtime.spawn(async move {
            let result = match hec {
                Some(hec) => hec.send_test_log().await,
                None => Err(HecError::ConfigurationMissing),
            };
            completion(result);
        })
    }
}

impl Drop for LogCollector {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("LOGS | Failed to stop log collector: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Attributes, NoopAgent};
    use crate::config::Destination;
    use crate::interceptor::Capture;
    use std::io::{self, Cursor, Read};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingAgent {
        messages: Mutex<Vec<String>>,
    }

    impl TelemetryAgent for CountingAgent {
        fn track_custom_event(&self, _name: &str, attributes: Attributes) {
            self.messages
                .lock()
                .unwrap()
                .push(attributes["log.message"].to_string());
        }
    }

    /// A source whose capture ends as soon as its bytes are read.
    struct OneShotSource(Vec<u8>);

    impl StreamSource for OneShotSource {
        fn attach(&mut self) -> Result<Capture, CollectorError> {
            Ok(Capture {
                reader: Box::new(Cursor::new(std::mem::take(&mut self.0))),
                passthrough: Box::new(io::sink()),
            })
        }

        fn detach(&mut self) -> Result<(), CollectorError> {
            Ok(())
        }
    }

    struct FailingSource;

    impl StreamSource for FailingSource {
        fn attach(&mut self) -> Result<Capture, CollectorError> {
            Err(CollectorError::Redirect {
                op: "pipe",
                source: io::Error::from_raw_os_error(libc::EMFILE),
            })
        }

        fn detach(&mut self) -> Result<(), CollectorError> {
            Ok(())
        }
    }

    /// Blocks reads until detached.
    struct ParkedReader(std::sync::mpsc::Receiver<()>);

    impl Read for ParkedReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    #[derive(Default)]
    struct ParkedSource(Option<std::sync::mpsc::Sender<()>>);

    impl StreamSource for ParkedSource {
        fn attach(&mut self) -> Result<Capture, CollectorError> {
            let (tx, rx) = std::sync::mpsc::channel();
            self.0 = Some(tx);
            Ok(Capture {
                reader: Box::new(ParkedReader(rx)),
                passthrough: Box::new(io::sink()),
            })
        }

        fn detach(&mut self) -> Result<(), CollectorError> {
            self.0.take();
            Ok(())
        }
    }

    fn collector(
        source: Box<dyn StreamSource>,
        agent: Arc<dyn TelemetryAgent>,
        config: &CollectorConfig,
    ) -> LogCollector {
        LogCollector::new(source, agent, config).unwrap()
    }

    #[test]
    fn test_new_requires_runtime() {
        let result = LogCollector::new(
            Box::new(ParkedSource::default()),
            Arc::new(NoopAgent),
            &CollectorConfig::default(),
        );
        assert!(matches!(result, Err(CollectorError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_threshold_flush_at_max_buffer_size() {
        let agent = Arc::new(CountingAgent::default());
        let collector = collector(
            Box::new(ParkedSource::default()),
            agent.clone(),
            &CollectorConfig::default(),
        );

        for i in 0..49 {
            collector.ingest_text(&format!("line {i}\n"));
        }
        assert_eq!(collector.buffered_count(), 49);
        assert!(agent.messages.lock().unwrap().is_empty());

        collector.ingest_text("line 49\n");
        assert_eq!(collector.buffered_count(), 0);

        let messages = agent.messages.lock().unwrap();
        let expected: Vec<String> = (0..50).map(|i| format!("line {i}")).collect();
        assert_eq!(*messages, expected);
    }

    #[tokio::test]
    async fn test_blank_lines_create_no_entries() {
        let collector = collector(
            Box::new(ParkedSource::default()),
            Arc::new(NoopAgent),
            &CollectorConfig::default(),
        );
        collector.ingest_bytes(b"a\n\nb\n");
        assert_eq!(collector.buffered_count(), 2);
    }

    #[tokio::test]
    async fn test_invalid_utf8_chunk_is_dropped() {
        let collector = collector(
            Box::new(ParkedSource::default()),
            Arc::new(NoopAgent),
            &CollectorConfig::default(),
        );
        collector.ingest_bytes(&[b'o', b'k', 0xc3, b'\n']);
        assert_eq!(collector.buffered_count(), 0);
    }

    #[tokio::test]
    async fn test_disabling_buffering_forwards_immediately() {
        let agent = Arc::new(CountingAgent::default());
        let collector = collector(
            Box::new(ParkedSource::default()),
            agent.clone(),
            &CollectorConfig::default(),
        );

        collector.ingest_text("kept\n");
        collector.config().set_enabled(false);
        collector.ingest_text("direct 1\ndirect 2\n");

        assert_eq!(collector.buffered_count(), 1);
        assert_eq!(
            *agent.messages.lock().unwrap(),
            vec!["direct 1".to_string(), "direct 2".to_string()]
        );

        collector.flush();
        assert_eq!(collector.buffered_count(), 0);
        assert_eq!(agent.messages.lock().unwrap().last().unwrap(), "kept");
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let collector = collector(
            Box::new(ParkedSource::default()),
            Arc::new(NoopAgent),
            &CollectorConfig::default(),
        );

        collector.start().unwrap();
        collector.start().unwrap();
        assert!(collector.is_running());

        collector.ingest_text("pending\n");
        collector.stop().unwrap();
        assert!(!collector.is_running());
        assert_eq!(collector.buffered_count(), 0);
        collector.stop().unwrap();
    }

    #[tokio::test]
    async fn test_stop_drains_captured_output() {
        let agent = Arc::new(CountingAgent::default());
        let collector = collector(
            Box::new(OneShotSource(b"one\ntwo\n".to_vec())),
            agent.clone(),
            &CollectorConfig::default(),
        );

        collector.start().unwrap();
        collector.stop().unwrap();

        assert_eq!(collector.buffered_count(), 0);
        assert_eq!(
            *agent.messages.lock().unwrap(),
            vec!["one".to_string(), "two".to_string()]
        );
    }

    #[tokio::test]
    async fn test_start_fails_fast_when_redirect_fails() {
        let collector = collector(
            Box::new(FailingSource),
            Arc::new(NoopAgent),
            &CollectorConfig::default(),
        );
        assert!(matches!(
            collector.start(),
            Err(CollectorError::Redirect { op: "pipe", .. })
        ));
        assert!(!collector.is_running());
    }

    #[tokio::test]
    async fn test_timer_flushes_periodically() {
        let agent = Arc::new(CountingAgent::default());
        let config = CollectorConfig {
            flush_interval: Duration::from_millis(100),
            ..Default::default()
        };
        let collector = collector(Box::new(ParkedSource::default()), agent.clone(), &config);

        collector.start().unwrap();
        collector.ingest_text("tick\n");
        assert_eq!(collector.buffered_count(), 1);

        tokio::time::timeout(Duration::from_secs(5), async {
            while collector.buffered_count() > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("timer flush did not happen");

        assert_eq!(*agent.messages.lock().unwrap(), vec!["tick".to_string()]);
        collector.stop().unwrap();
    }

    #[tokio::test]
    async fn test_send_test_log_without_config() {
        let collector = collector(
            Box::new(ParkedSource::default()),
            Arc::new(NoopAgent),
            &CollectorConfig {
                destination: Destination::Hec,
                ..Default::default()
            },
        );
        assert_eq!(
            collector.send_test_log().await,
            Err(HecError::ConfigurationMissing)
        );

        let (tx, rx) = tokio::sync::oneshot::channel();
        collector
            .send_test_log_with(move |result| {
                let _ = tx.send(result);
            })
            .await
            .unwrap();
        assert_eq!(rx.await.unwrap(), Err(HecError::ConfigurationMissing));
    }
}
