//! Batch sync: idempotent maintenance of trade-sync watermark rows.

use tracing::info;

use polyscout_core::db::BatchRepository;
use polyscout_core::Result;

pub struct BatchSyncScheduler {
    batches: BatchRepository,
}

impl BatchSyncScheduler {
    pub fn new(batches: BatchRepository) -> Self {
        Self { batches }
    }

    /// Insert a batch row for every (wallet, market) with an OPEN position
    /// on an OLD active wallet that lacks one. Safe to run any time.
    pub async fn tick(&self) -> Result<u64> {
        let created = self.batches.create_missing_for_open_positions().await?;
        info!(created, "batch sync complete");
        Ok(created)
    }
}
