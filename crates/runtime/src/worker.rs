//! Single-consumer job runner for listeners that must not block dispatch.
//!
//! A listener hands its work to a [`SerialWorker`] and returns immediately.
//! Jobs run one at a time, in submission order, on tokio's blocking pool.

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct SerialWorker {
    name: &'static str,
    jobs: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SerialWorker {
    /// Spawns the worker task. Must be called from within a tokio runtime.
    pub fn spawn(name: &'static str) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        let task = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if let Err(e) = tokio::task::spawn_blocking(job).await {
                    tracing::error!(worker = name, "Job panicked: {}", e);
                }
            }
            tracing::debug!(worker = name, "Worker drained, stopping");
        });

        Self {
            name,
            jobs: Mutex::new(Some(tx)),
            task: Mutex::new(Some(task)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Queues `job` behind everything submitted before it.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let jobs = self.jobs.lock();
        let tx = jobs.as_ref().ok_or(Error::ChannelClosed)?;
        tx.send(Box::new(job)).map_err(|_| Error::ChannelClosed)
    }

    /// Stops accepting jobs and waits for queued ones to finish.
    pub async fn shutdown(&self) {
        self.jobs.lock().take();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(worker = self.name, "Worker task failed: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for SerialWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialWorker")
            .field("name", &self.name)
            .field("open", &self.jobs.lock().is_some())
            .finish()
    }
}
