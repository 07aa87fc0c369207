//! Gapless playback scheduling
//!
//! Inbound speech arrives as irregular chunks. Each chunk is scheduled to
//! start exactly when the previous one ends, or immediately if the output has
//! already caught up. `next_start_time` is never behind the device clock at a
//! scheduling decision.

use std::collections::HashSet;

use tokio::sync::mpsc;

use super::{AudioOutput, SourceId};
use crate::Result;
use crate::media::PlaybackChunk;

/// Schedules decoded chunks for back-to-back playback
pub struct PlaybackScheduler {
    output: Box<dyn AudioOutput>,
    next_start_time: f64,
    active: HashSet<SourceId>,
    next_id: SourceId,
    finished_tx: mpsc::UnboundedSender<SourceId>,
    finished_rx: mpsc::UnboundedReceiver<SourceId>,
    closed: bool,
}

impl PlaybackScheduler {
    #[must_use]
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        Self {
            output,
            next_start_time: 0.0,
            active: HashSet::new(),
            next_id: 0,
            finished_tx,
            finished_rx,
            closed: false,
        }
    }

    /// Schedule a chunk after everything already queued
    ///
    /// Returns the device time at which the chunk starts.
    ///
    /// # Errors
    ///
    /// Returns error if the output device rejects the source
    pub fn schedule(&mut self, chunk: &PlaybackChunk) -> Result<f64> {
        self.reap();

        let now = self.output.current_time();
        let start_at = self.next_start_time.max(now);

        let id = self.next_id;
        self.next_id += 1;

        let finished_tx = self.finished_tx.clone();
        self.output.schedule(
            id,
            chunk,
            start_at,
            Box::new(move || {
                let _ = finished_tx.send(id);
            }),
        )?;

        self.active.insert(id);
        self.next_start_time = start_at + chunk.duration_secs;

        tracing::trace!(
            id,
            start_at,
            frames = chunk.frames(),
            duration = chunk.duration_secs,
            gap = start_at - now,
            active = self.active.len(),
            "scheduled playback chunk"
        );
        Ok(start_at)
    }

    /// Stop every active source and rewind the cursor to the device clock
    ///
    /// Returns how many sources were cancelled.
    pub fn interrupt(&mut self) -> usize {
        self.reap();

        let stopped = self.active.len();
        for id in self.active.drain() {
            self.output.stop(id);
        }
        self.next_start_time = self.output.current_time();

        tracing::debug!(stopped, cursor = self.next_start_time, "playback interrupted");
        stopped
    }

    /// Cancel playback and release the output device; idempotent
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.interrupt();
        self.output.close();
        self.closed = true;
    }

    /// Sources scheduled and not yet finished or cancelled
    pub fn active_count(&mut self) -> usize {
        self.reap();
        self.active.len()
    }

    /// Device time at which the next chunk will start, at the earliest
    #[must_use]
    pub const fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    /// Current device clock
    #[must_use]
    pub fn current_time(&self) -> f64 {
        self.output.current_time()
    }

    /// Drop sources that finished naturally
    fn reap(&mut self) {
        while let Ok(id) = self.finished_rx.try_recv() {
            self.active.remove(&id);
        }
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.close();
    }
}
