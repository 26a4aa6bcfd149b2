use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use crate::models::LineageKey;

pub type LineageJob = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Per-lineage FIFO of background jobs.
///
/// Jobs for one lineage run one at a time in dispatch order, on a worker
/// task that exits once its queue drains. Lineages run independently.
#[derive(Debug, Default)]
pub struct LineageWorkers {
    queues: Mutex<HashMap<LineageKey, UnboundedSender<LineageJob>>>,
}

impl LineageWorkers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `job` behind any earlier job for the same lineage.
    pub fn dispatch(self: &Arc<Self>, key: LineageKey, job: LineageJob, runtime: &Handle) {
        let mut queues = self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let job = match queues.get(&key) {
            Some(sender) => match sender.send(job) {
                Ok(()) => return,
                // Worker already gone; start a fresh one below.
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        let (sender, receiver) = mpsc::unbounded_channel();
        // Cannot fail: the receiver is alive.
        let _ = sender.send(job);
        queues.insert(key, sender);
        drop(queues);

        tracing::debug!(project_id = %key.project_id, submitter_id = %key.submitter_id, "Starting lineage worker");
        runtime.spawn(Arc::clone(self).run(key, receiver));
    }

    async fn run(self: Arc<Self>, key: LineageKey, mut receiver: UnboundedReceiver<LineageJob>) {
        loop {
            let job = match receiver.try_recv() {
                Ok(job) => job,
                Err(TryRecvError::Disconnected) => return,
                Err(TryRecvError::Empty) => {
                    // Re-check under the map lock so a concurrent dispatch is never stranded.
                    let mut queues = self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    match receiver.try_recv() {
                        Ok(job) => job,
                        Err(_) => {
                            queues.remove(&key);
                            return;
                        }
                    }
                }
            };
            job.await;
        }
    }

    /// Lineages with a live worker.
    pub fn active(&self) -> usize {
        self.queues.lock().map(|q| q.len()).unwrap_or(0)
    }
}
