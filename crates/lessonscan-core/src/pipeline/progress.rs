//! Live progress of running batches.
//!
//! A batch is registered with [`ProgressTracker::begin`] and dropped with
//! [`ProgressTracker::finish`], so the tracker only ever holds batches that
//! are still running. Every change is pushed to the receiver returned by
//! [`ProgressTracker::new`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};

use super::types::{PipelineStatus, ProgressUpdate, Stage};

/// Images waiting in, running in, or done with one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProgress {
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StageProgress {
    fn is_busy(&self) -> bool {
        self.pending > 0 || self.active > 0
    }
}

/// Snapshot of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub batch_id: String,
    /// Images submitted with the batch
    pub images: usize,
    pub succeeded: usize,
    pub partial: usize,
    pub failed: usize,
    pub validate: StageProgress,
    pub preprocess: StageProgress,
    pub ocr: StageProgress,
    pub extract: StageProgress,
}

impl BatchProgress {
    fn new(batch_id: String, images: usize) -> Self {
        Self {
            batch_id,
            images,
            validate: StageProgress {
                pending: images,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Images with a terminal status
    pub fn finished(&self) -> usize {
        self.succeeded + self.partial + self.failed
    }

    pub fn is_done(&self) -> bool {
        self.finished() >= self.images
    }

    pub fn stage(&self, stage: Stage) -> &StageProgress {
        match stage {
            Stage::Validate => &self.validate,
            Stage::Preprocess => &self.preprocess,
            Stage::Ocr => &self.ocr,
            Stage::Extract => &self.extract,
        }
    }

    fn stage_mut(&mut self, stage: Stage) -> &mut StageProgress {
        match stage {
            Stage::Validate => &mut self.validate,
            Stage::Preprocess => &mut self.preprocess,
            Stage::Ocr => &mut self.ocr,
            Stage::Extract => &mut self.extract,
        }
    }

    /// Furthest stage that still has images waiting or running
    pub fn current_stage(&self) -> Option<Stage> {
        [Stage::Validate, Stage::Preprocess, Stage::Ocr, Stage::Extract]
            .into_iter()
            .rev()
            .find(|stage| self.stage(*stage).is_busy())
    }

    fn record(&mut self, update: &ProgressUpdate) {
        match update {
            ProgressUpdate::Queued { stage, .. } => self.stage_mut(*stage).pending += 1,
            ProgressUpdate::Started { stage, .. } => {
                let s = self.stage_mut(*stage);
                s.pending = s.pending.saturating_sub(1);
                s.active += 1;
            }
            ProgressUpdate::Completed { stage, .. } => {
                let s = self.stage_mut(*stage);
                s.active = s.active.saturating_sub(1);
                s.completed += 1;
            }
            ProgressUpdate::Failed { stage, .. } => {
                let s = self.stage_mut(*stage);
                s.active = s.active.saturating_sub(1);
                s.failed += 1;
            }
            ProgressUpdate::Finished { status, .. } => match status {
                PipelineStatus::Success => self.succeeded += 1,
                PipelineStatus::Partial => self.partial += 1,
                PipelineStatus::Failed => self.failed += 1,
            },
        }
    }
}

/// Shared view of running batches.
#[derive(Clone)]
pub struct ProgressTracker {
    batches: Arc<RwLock<HashMap<String, BatchProgress>>>,
    notify_tx: mpsc::Sender<BatchProgress>,
}

impl ProgressTracker {
    pub fn new() -> (Self, mpsc::Receiver<BatchProgress>) {
        let (notify_tx, notify_rx) = mpsc::channel(256);
        (
            Self {
                batches: Arc::new(RwLock::new(HashMap::new())),
                notify_tx,
            },
            notify_rx,
        )
    }

    /// Start tracking a batch of `images` images, all waiting for validation.
    pub async fn begin(&self, batch_id: &str, images: usize) {
        let progress = BatchProgress::new(batch_id.to_string(), images);
        self.notify(&progress);
        self.batches
            .write()
            .await
            .insert(batch_id.to_string(), progress);
    }

    /// Apply an update. Updates for batches not begun (or already finished) are dropped.
    pub async fn apply(&self, update: ProgressUpdate) {
        let mut batches = self.batches.write().await;
        if let Some(progress) = batches.get_mut(update.batch_id()) {
            progress.record(&update);
            self.notify(progress);
        }
    }

    /// Stop tracking a batch and return its final state.
    pub async fn finish(&self, batch_id: &str) -> Option<BatchProgress> {
        self.batches.write().await.remove(batch_id)
    }

    pub async fn get(&self, batch_id: &str) -> Option<BatchProgress> {
        self.batches.read().await.get(batch_id).cloned()
    }

    /// All batches still running
    pub async fn active(&self) -> Vec<BatchProgress> {
        self.batches.read().await.values().cloned().collect()
    }

    // Listeners that fall behind miss intermediate snapshots, never the tracker state
    fn notify(&self, progress: &BatchProgress) {
        let _ = self.notify_tx.try_send(progress.clone());
    }
}
