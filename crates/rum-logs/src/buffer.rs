// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The guarded buffer behind the collector's flush policy.
//!
//! Appends and swaps share one lock. An append that brings the buffer to the
//! threshold swaps it out in the same critical section, so no caller ever sees
//! more than `max` entries, and an append racing a flush lands in exactly one
//! of the two sequences.

use crate::entry::BufferedLogEntry;
use std::mem;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct LogBuffer {
    entries: Mutex<Vec<BufferedLogEntry>>,
}

impl LogBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<BufferedLogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an entry and returns the full batch when `max` was reached.
    pub fn append(&self, entry: BufferedLogEntry, max: usize) -> Option<Vec<BufferedLogEntry>> {
        let mut entries = self.lock();
        entries.push(entry);
        if entries.len() >= max.max(1) {
            Some(mem::take(&mut *entries))
        } else {
            None
        }
    }

    /// Swaps out everything buffered so far, in capture order.
    pub fn take(&self) -> Vec<BufferedLogEntry> {
        mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
