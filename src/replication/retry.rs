//! Retry worker
//!
//! Background thread that drains a sending queue at a fixed interval. The
//! worker owns nothing but a handle to the queue; stopping it leaves queued
//! submissions in place.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::observability::{Event, Logger};

use super::sending_queue::SendingQueue;

/// Handle of a running retry thread. Dropping it stops and joins the thread.
pub struct RetryWorker {
    replicable_id: String,
    shutdown: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl RetryWorker {
    pub fn spawn<O>(queue: Arc<SendingQueue<O>>, interval: Duration) -> Self
    where
        O: Send + Sync + 'static,
    {
        let replicable_id = queue.replicable_id().to_string();
        let (shutdown, signal) = mpsc::channel::<()>();
        let thread_id = replicable_id.clone();

        let handle = thread::spawn(move || {
            let interval_ms = interval.as_millis().to_string();
            Logger::info(
                Event::RetryWorkerStarted.as_str(),
                &[("interval_ms", &interval_ms), ("replicable", &thread_id)],
            );
            loop {
                match signal.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if !queue.is_empty() {
                            queue.retry_pending();
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            Logger::info(
                Event::RetryWorkerStopped.as_str(),
                &[("remaining", &queue.len().to_string()), ("replicable", &thread_id)],
            );
        });

        Self {
            replicable_id,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn replicable_id(&self) -> &str {
        &self.replicable_id
    }

    /// Signal the thread and wait for it to finish its current pass.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.shutdown.send(());
            let _ = handle.join();
        }
    }
}

impl Drop for RetryWorker {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}
