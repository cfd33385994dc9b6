//! Background home for replica fan-out tasks abandoned once a coordinator call's ack
//! threshold has been reached.
//!
//! The coordinator never [`tokio::task::JoinHandle::abort`]s an in-flight replica call:
//! aborting mid-flight would leave that peer's connection in an undefined state. Instead
//! it hands the handle to this watcher, which awaits it to completion on its own time,
//! logging panics so nothing fails silently. This is the hook future anti-entropy /
//! read-repair work would plug into.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TaskWatcher {
    sender: mpsc::UnboundedSender<JoinHandle<()>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl TaskWatcher {
    pub fn spawn() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(Self::run(receiver));
        Self {
            sender,
            worker: tokio::sync::Mutex::new(Some(worker)),
        }
    }

    /// Hand off a task for the watcher to await. Accepts handles whether or not they've
    /// already completed; awaiting a finished handle returns immediately.
    pub fn watch(&self, handle: JoinHandle<()>) {
        if self.sender.send(handle).is_err() {
            tracing::warn!("task watcher already shut down; dropping abandoned replica task");
        }
    }

    async fn run(mut receiver: mpsc::UnboundedReceiver<JoinHandle<()>>) {
        use futures::stream::FuturesUnordered;
        use futures::StreamExt;

        let mut pending = FuturesUnordered::new();
        loop {
            tokio::select! {
                biased;

                maybe_handle = receiver.recv() => {
                    match maybe_handle {
                        Some(handle) => pending.push(handle),
                        None => break,
                    }
                }
                Some(result) = pending.next(), if !pending.is_empty() => {
                    Self::log_outcome(result);
                }
            }
        }

        // Channel closed (the watcher was shut down); drain what's left.
        while let Some(result) = pending.next().await {
            Self::log_outcome(result);
        }
    }

    fn log_outcome(result: Result<(), tokio::task::JoinError>) {
        if let Err(err) = result {
            if err.is_panic() {
                tracing::warn!(error = %err, "abandoned replica task panicked");
            }
        }
    }

    /// Stop accepting new handles and wait (with a bounded timeout) for everything
    /// already queued to finish.
    pub async fn shutdown(&self) {
        let worker = self.worker.lock().await.take();
        let Some(worker) = worker else {
            return;
        };
        // Dropping the sender lets `run`'s receiver loop observe closure and start
        // draining `pending` to completion.
        if tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, worker)
            .await
            .is_err()
        {
            tracing::warn!("task watcher shutdown timed out with tasks still outstanding");
        }
    }
}
