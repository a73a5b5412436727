//! Bounded-concurrency sweep scheduler

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use futures::future;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::queue::ledger::Ledger;
use crate::queue::progress::FetchProgress;
use crate::queue::track::{TrackRegistry, TrackState};
use crate::source::TrackConverter;

/// Drives pending tracks to a terminal state, at most `concurrency` at a
/// time.
///
/// Work happens in sweeps: fill the active window in FIFO order, dispatch
/// one conversion per activated track, wait for the whole sweep to settle,
/// reconcile results, report. Joining the full sweep before refilling keeps
/// peak concurrency at exactly the window size.
pub struct Scheduler {
    converter: Arc<dyn TrackConverter>,
    output_dir: PathBuf,
    ledger_path: PathBuf,
    concurrency: usize,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        converter: Arc<dyn TrackConverter>,
        output_dir: PathBuf,
        ledger_path: PathBuf,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            converter,
            output_dir,
            ledger_path,
            // A zero-wide window would never drain
            concurrency: concurrency.max(1),
            cancel,
        }
    }

    /// Run sweeps until nothing is pending, or until cancellation is
    /// observed at a fill boundary.
    ///
    /// Per-track failures are recorded on the registry and never abort the
    /// run; only ledger persistence failures propagate. Returns the number
    /// of tracks completed by this call.
    pub async fn drain(
        &self,
        registry: &mut TrackRegistry,
        ledger: &mut Ledger,
        progress: &mpsc::Sender<FetchProgress>,
    ) -> Result<usize> {
        let mut completed_here = 0;

        loop {
            // Fill: promote pending tracks into the window, FIFO. A stop
            // request takes effect here, never mid-sweep.
            let mut window = Vec::new();
            while window.len() < self.concurrency && !self.cancel.is_cancelled() {
                let Some(index) = registry.next_pending() else { break };
                registry.transition(index, TrackState::Active, None)?;
                window.push(index);
            }
            if window.is_empty() {
                break;
            }

            // Dispatch: one conversion task per activated track
            let mut handles = Vec::with_capacity(window.len());
            for &index in &window {
                let track = registry.get(index);
                info!("Downloading: {}", track.title);

                let url = track.url.clone();
                let dest = self.output_dir.join(track.file_name());
                let converter = self.converter.clone();
                let cancel = self.cancel.clone();
                handles.push(tokio::spawn(async move {
                    converter.convert(&url, &dest, &cancel).await
                }));
            }

            // Join: the sweep settles as a unit. Every dispatched task is
            // awaited; nothing is abandoned on cancellation.
            let outcomes = future::join_all(handles).await;

            // Reconcile results back into registry and ledger
            for (&index, outcome) in window.iter().zip(outcomes) {
                let outcome = outcome
                    .unwrap_or_else(|e| Err(anyhow!("conversion task panicked: {e}")));
                match outcome {
                    Ok(()) => {
                        registry.transition(index, TrackState::Completed, None)?;
                        let track = registry.get(index);
                        info!("Completed: {}", track.title);
                        ledger.insert(&track.id);
                        ledger
                            .save(&self.ledger_path)
                            .await
                            .context("Failed to persist completion ledger")?;
                        completed_here += 1;
                    }
                    Err(e) => {
                        let message = format!("{e:#}");
                        warn!("Failed: {} ({})", registry.get(index).title, message);
                        registry.transition(index, TrackState::Failed, Some(message))?;
                    }
                }
            }

            // Report one snapshot per sweep
            let _ = progress
                .send(FetchProgress::Progress {
                    completed: registry.count(TrackState::Completed),
                    active: registry.count(TrackState::Active),
                    pending: registry.count(TrackState::Pending),
                    total: registry.total(),
                })
                .await;
        }

        Ok(completed_here)
    }
}
