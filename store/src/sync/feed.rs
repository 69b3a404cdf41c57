use std::collections::VecDeque;
use std::future::Future;

use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{Change, ChangeApplier, SyncError, SyncReport};

/// Transport to a remote peer: hands out inbound changes and accepts
/// outbound ones.
pub trait ChangeFeed: Send + Sync {
    fn pull(&self) -> impl Future<Output = Result<Vec<Change>, SyncError>> + Send;
    fn push(&self, changes: Vec<Change>) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Records received since the last call that could not be decoded as a
    /// [`Change`]. [`run_sync_pass`] reports them as dropped.
    fn take_undecodable(&self) -> impl Future<Output = usize> + Send {
        async { 0 }
    }
}

/// In-process feed, used for local replay and tests.
#[derive(Debug, Default)]
pub struct MemoryFeed {
    inbound: Mutex<VecDeque<Change>>,
    outbound: Mutex<Vec<Change>>,
    undecodable: Mutex<usize>,
}

impl MemoryFeed {
    pub fn new(inbound: Vec<Change>) -> Self {
        Self {
            inbound: Mutex::new(inbound.into()),
            outbound: Mutex::new(Vec::new()),
            undecodable: Mutex::new(0),
        }
    }

    /// One JSON [`Change`] per line. Blank lines are skipped; lines that do
    /// not decode are logged and counted as undecodable.
    pub fn from_json_lines(raw: &str) -> Self {
        let mut changes = Vec::new();
        let mut undecodable = 0;
        for (index, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(change) => changes.push(change),
                Err(e) => {
                    warn!(line = index + 1, error = %e, "Skipping undecodable change");
                    undecodable += 1;
                }
            }
        }
        Self {
            undecodable: Mutex::new(undecodable),
            ..Self::new(changes)
        }
    }

    /// Everything pushed so far.
    pub async fn pushed(&self) -> Vec<Change> {
        self.outbound.lock().await.clone()
    }
}

impl ChangeFeed for MemoryFeed {
    async fn pull(&self) -> Result<Vec<Change>, SyncError> {
        Ok(self.inbound.lock().await.drain(..).collect())
    }

    async fn push(&self, changes: Vec<Change>) -> Result<(), SyncError> {
        self.outbound.lock().await.extend(changes);
        Ok(())
    }

    async fn take_undecodable(&self) -> usize {
        std::mem::take(&mut *self.undecodable.lock().await)
    }
}

/// Push `outbound`, then pull and apply whatever the feed has.
pub async fn run_sync_pass<F: ChangeFeed>(
    feed: &F,
    applier: &ChangeApplier,
    outbound: Vec<Change>,
) -> Result<SyncReport, SyncError> {
    let pushed = outbound.len();
    if pushed > 0 {
        feed.push(outbound).await?;
    }

    let inbound = feed.pull().await?;
    let mut report = applier.apply_batch(&inbound).await?;
    report.pushed = pushed;
    report.dropped += feed.take_undecodable().await;

    info!(
        pushed = report.pushed,
        applied = report.applied,
        deferred = report.deferred,
        ignored = report.ignored,
        dropped = report.dropped,
        "Sync pass completed"
    );
    Ok(report)
}
