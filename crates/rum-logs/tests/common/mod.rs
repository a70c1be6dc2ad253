// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use rum_logs::{Attributes, Capture, CollectorError, StreamSource, TelemetryAgent};
use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

/// Records every custom event it receives.
#[derive(Default)]
pub struct RecordingAgent {
    events: Mutex<Vec<(String, Attributes)>>,
}

impl RecordingAgent {
    pub fn events(&self) -> Vec<(String, Attributes)> {
        self.events.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|(_, attributes)| attributes["log.message"].to_string())
            .collect()
    }
}

impl TelemetryAgent for RecordingAgent {
    fn track_custom_event(&self, name: &str, attributes: Attributes) {
        self.events
            .lock()
            .unwrap()
            .push((name.to_string(), attributes));
    }
}

type SharedSender = Arc<Mutex<Option<Sender<Vec<u8>>>>>;

/// In-memory stand-in for the redirected error stream.
#[derive(Default)]
pub struct ChannelSource {
    sender: SharedSender,
    echoed: Arc<Mutex<Vec<u8>>>,
}

/// Write side of a [`ChannelSource`], usable after the source was moved
/// into a collector.
#[derive(Clone)]
pub struct FakeStderr {
    sender: SharedSender,
    echoed: Arc<Mutex<Vec<u8>>>,
}

impl ChannelSource {
    pub fn new() -> (Self, FakeStderr) {
        let source = Self::default();
        let handle = FakeStderr {
            sender: Arc::clone(&source.sender),
            echoed: Arc::clone(&source.echoed),
        };
        (source, handle)
    }
}

impl FakeStderr {
    /// Returns false when nothing is attached.
    pub fn write(&self, bytes: &[u8]) -> bool {
        match self.sender.lock().unwrap().as_ref() {
            Some(tx) => tx.send(bytes.to_vec()).is_ok(),
            None => false,
        }
    }

    pub fn echoed(&self) -> Vec<u8> {
        self.echoed.lock().unwrap().clone()
    }
}

struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv() {
                Ok(bytes) => self.pending = bytes,
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

struct EchoWriter(Arc<Mutex<Vec<u8>>>);

impl Write for EchoWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl StreamSource for ChannelSource {
    fn attach(&mut self) -> Result<Capture, CollectorError> {
        let mut sender = self.sender.lock().unwrap();
        if sender.is_some() {
            return Err(CollectorError::AlreadyStarted);
        }
        let (tx, rx) = mpsc::channel();
        *sender = Some(tx);
        Ok(Capture {
            reader: Box::new(ChannelReader {
                rx,
                pending: Vec::new(),
            }),
            passthrough: Box::new(EchoWriter(Arc::clone(&self.echoed))),
        })
    }

    fn detach(&mut self) -> Result<(), CollectorError> {
        self.sender.lock().unwrap().take();
        Ok(())
    }
}
