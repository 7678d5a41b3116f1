// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Relay Contributors
//
// This file is part of Relay.
//
// Relay is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// Relay is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Relay. If not, see <https://www.gnu.org/licenses/>.

//! Chunked, asynchronous log emission.
//!
//! Records buffer in memory and drain through a pluggable sink in chunks,
//! on a deferred task coalesced like the storage flush: collecting while an
//! emission is pending schedules nothing new.

use crate::error::BrokerResult;
use crate::message::now_millis;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

/// Severity of a collected record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal operation.
    Info,
    /// Recoverable trouble.
    Warn,
    /// Failure.
    Error,
}

/// One buffered log record.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    /// Collection time, epoch millis.
    pub ts: u64,
    /// Severity.
    pub level: LogLevel,
    /// Component that produced the record.
    pub component: String,
    /// Human-readable message.
    pub message: String,
}

/// Destination for emitted chunks.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Emit one chunk of records.
    async fn emit(&self, records: &[LogRecord]) -> BrokerResult<()>;
}

/// Default sink: forwards records to `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

#[async_trait]
impl LogSink for TracingSink {
    async fn emit(&self, records: &[LogRecord]) -> BrokerResult<()> {
        for record in records {
            match record.level {
                LogLevel::Debug => {
                    tracing::debug!(component = %record.component, "{}", record.message)
                }
                LogLevel::Info => {
                    tracing::info!(component = %record.component, "{}", record.message)
                }
                LogLevel::Warn => {
                    tracing::warn!(component = %record.component, "{}", record.message)
                }
                LogLevel::Error => {
                    tracing::error!(component = %record.component, "{}", record.message)
                }
            }
        }
        Ok(())
    }
}

/// Buffers records and emits them in chunks through the sink.
pub struct LogService {
    buffer: Mutex<VecDeque<LogRecord>>,
    sink: Arc<dyn LogSink>,
    chunk_size: usize,
    flush_delay: Duration,
    scheduled: AtomicBool,
    task: StdMutex<Option<JoinHandle<()>>>,
    shutdown: AtomicBool,
}

impl LogService {
    /// Create a service draining into `sink`.
    pub fn new(sink: Arc<dyn LogSink>, chunk_size: usize, flush_delay_ms: u64) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::new()),
            sink,
            chunk_size: chunk_size.max(1),
            flush_delay: Duration::from_millis(flush_delay_ms),
            scheduled: AtomicBool::new(false),
            task: StdMutex::new(None),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Buffer a record and arm the deferred emission.
    pub async fn collect(
        self: &Arc<Self>,
        level: LogLevel,
        component: impl Into<String>,
        message: impl Into<String>,
    ) {
        {
            let mut buffer = self.buffer.lock().await;
            buffer.push_back(LogRecord {
                ts: now_millis(),
                level,
                component: component.into(),
                message: message.into(),
            });
        }
        self.schedule_emit();
    }

    fn schedule_emit(self: &Arc<Self>) {
        if self.shutdown.load(Ordering::Relaxed) {
            return;
        }
        if self.scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let service = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(service.flush_delay).await;
            service.scheduled.store(false, Ordering::SeqCst);
            service.drain().await;
            if !service.buffer.lock().await.is_empty() {
                service.schedule_emit();
            }
        });
        if let Ok(mut guard) = self.task.lock() {
            *guard = Some(handle);
        }
    }

    /// Emit everything buffered, one chunk at a time.
    pub async fn drain(&self) {
        loop {
            let chunk: Vec<LogRecord> = {
                let mut buffer = self.buffer.lock().await;
                let take = self.chunk_size.min(buffer.len());
                buffer.drain(..take).collect()
            };
            if chunk.is_empty() {
                return;
            }
            if let Err(e) = self.sink.emit(&chunk).await {
                warn!(error = %e, dropped = chunk.len(), "log sink emit failed");
                return;
            }
        }
    }

    /// Records currently buffered.
    pub async fn buffered(&self) -> usize {
        self.buffer.lock().await.len()
    }

    /// Cancel the pending emission and refuse new schedules.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Ok(mut guard) = self.task.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex as AsyncMutex;

    struct CapturingSink {
        chunks: AsyncMutex<Vec<Vec<LogRecord>>>,
    }

    #[async_trait]
    impl LogSink for CapturingSink {
        async fn emit(&self, records: &[LogRecord]) -> BrokerResult<()> {
            self.chunks.lock().await.push(records.to_vec());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_chunked_emission() {
        let sink = Arc::new(CapturingSink {
            chunks: AsyncMutex::new(Vec::new()),
        });
        let service = Arc::new(LogService::new(sink.clone(), 2, 5));

        for i in 0..5 {
            service
                .collect(LogLevel::Info, "test", format!("record {}", i))
                .await;
        }
        service.drain().await;

        let chunks = sink.chunks.lock().await;
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(chunks[0][0].message, "record 0");
    }

    #[tokio::test]
    async fn test_deferred_emission_coalesces() {
        let sink = Arc::new(CapturingSink {
            chunks: AsyncMutex::new(Vec::new()),
        });
        let service = Arc::new(LogService::new(sink.clone(), 100, 10));

        for i in 0..3 {
            service
                .collect(LogLevel::Debug, "test", format!("r{}", i))
                .await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        // All three records left the buffer in a single chunk
        assert_eq!(service.buffered().await, 0);
        let chunks = sink.chunks.lock().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 3);
    }
}
