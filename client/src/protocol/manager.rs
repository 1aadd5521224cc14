use crate::protocol::value::{DpReport, DpValue};
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::sync::oneshot::Sender;
use tracing::debug;

pub(crate) struct PendingRead {
    ts: Instant,
    sender: Sender<DpValue>,
}

/// Reads waiting for the device to report a data point.
///
/// Tuya query answers carry no request id, so every pending read of an
/// index is answered by the first report that contains it.
pub(crate) struct RequestManager {
    pending: DashMap<u32, Vec<PendingRead>>,
    timeout: Duration,
}

impl RequestManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            timeout,
        }
    }

    pub fn add_read(&self, index: u32) -> oneshot::Receiver<DpValue> {
        let (tx, rx) = oneshot::channel();
        self.pending.entry(index).or_default().push(PendingRead {
            sender: tx,
            ts: Instant::now(),
        });
        rx
    }

    /// Drops reads whose caller gave up or that waited longer than the
    /// manager timeout.
    pub fn remove_stale(&self) {
        let timeout = self.timeout;
        self.pending.retain(|index, reads| {
            let before = reads.len();
            reads.retain(|read| !read.sender.is_closed() && read.ts.elapsed() <= timeout);
            if reads.len() != before {
                debug!("Removed {} stale reads of {}", before - reads.len(), index);
            }
            !reads.is_empty()
        });
    }

    /// Answers every pending read of the indices in `report`, then prunes
    /// what is stale under the other indices. Returns the number of readers
    /// that received a value.
    pub fn complete(&self, report: &DpReport) -> usize {
        let mut delivered = 0;
        for (index, value) in report.dps.iter() {
            if let Some((_, reads)) = self.pending.remove(index) {
                for read in reads {
                    if read.sender.send(value.clone()).is_ok() {
                        delivered += 1;
                    }
                }
                debug!("Completed pending reads of {index} with {value}");
            }
        }
        self.remove_stale();
        delivered
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.pending.iter().map(|entry| entry.value().len()).sum()
    }
}
