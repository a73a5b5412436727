//! Fetch engine orchestration

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::queue::ledger::{self, Ledger, LEDGER_FILE};
use crate::queue::progress::FetchProgress;
use crate::queue::scheduler::Scheduler;
use crate::queue::track::{TrackRegistry, TrackState};
use crate::source::{PlaylistSource, TrackConverter};

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Tuning knobs for a fetch run
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Size of the scheduler's active window
    pub concurrency: usize,
    /// Playlist entries requested per metadata page
    pub page_size: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Final counts for a fetch run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FetchSummary {
    pub total: usize,
    /// Tracks converted by this run
    pub downloaded: usize,
    /// Tracks already materialized before this run
    pub skipped: usize,
    pub failed: usize,
}

impl FetchSummary {
    /// Tracks never attempted, e.g. after a stop request
    pub fn remaining(&self) -> usize {
        self.total - self.downloaded - self.skipped - self.failed
    }
}

/// Coordinates paginated ingestion with the bounded scheduler.
///
/// Owns the registry and ledger for one run; nothing is shared between
/// engines, so concurrent runs against different playlists cannot
/// interfere.
pub struct Engine {
    source: Arc<dyn PlaylistSource>,
    scheduler: Scheduler,
    registry: TrackRegistry,
    ledger: Ledger,
    output_dir: PathBuf,
    ledger_path: PathBuf,
    page_size: u32,
    cancel: CancellationToken,
    progress: mpsc::Sender<FetchProgress>,
    downloaded: usize,
}

impl Engine {
    pub fn new(
        source: Arc<dyn PlaylistSource>,
        converter: Arc<dyn TrackConverter>,
        output_dir: PathBuf,
        options: FetchOptions,
        cancel: CancellationToken,
        progress: mpsc::Sender<FetchProgress>,
    ) -> Self {
        let ledger_path = output_dir.join(LEDGER_FILE);
        let scheduler = Scheduler::new(
            converter,
            output_dir.clone(),
            ledger_path.clone(),
            options.concurrency,
            cancel.clone(),
        );

        Self {
            source,
            scheduler,
            registry: TrackRegistry::new(),
            ledger: Ledger::default(),
            output_dir,
            ledger_path,
            // A zero page size would fetch forever without progress
            page_size: options.page_size.max(1),
            cancel,
            progress,
            downloaded: 0,
        }
    }

    /// Ingest the entire playlist up front, then drain the queue once.
    pub async fn run_bulk(&mut self) -> Result<FetchSummary> {
        let result = self.bulk_inner().await;
        self.finish(result).await
    }

    /// Alternate one metadata page with one scheduler pass, so the first
    /// downloads land before the playlist is fully enumerated.
    pub async fn run_interleaved(&mut self) -> Result<FetchSummary> {
        let result = self.interleaved_inner().await;
        self.finish(result).await
    }

    async fn bulk_inner(&mut self) -> Result<()> {
        self.prepare().await?;

        let mut title: Option<String> = None;
        let mut page = 1u32;
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let fetched = self.fetch_page(page).await?;
            if page == 1 {
                title = fetched.title.clone();
                if let Some(uploader) = &fetched.uploader {
                    debug!("Uploader: {}", uploader);
                }
            }
            if fetched.items.is_empty() {
                break;
            }
            let added = self.registry.seed(fetched.items, &self.ledger);
            debug!("Page {}: registered {} new tracks", page, added);
            if !fetched.has_more {
                break;
            }
            page += 1;
        }

        // Pick up files from runs that predate the ledger
        ledger::reconcile_with_folder(&self.output_dir, &mut self.registry).await?;

        let pending = self.registry.count(TrackState::Pending);
        info!(
            "Playlist loaded: {} tracks, {} to download",
            self.registry.total(),
            pending
        );
        let _ = self
            .progress
            .send(FetchProgress::Loaded {
                title: display_title(title),
                total: self.registry.total(),
                pending,
            })
            .await;

        self.downloaded += self
            .scheduler
            .drain(&mut self.registry, &mut self.ledger, &self.progress)
            .await?;
        Ok(())
    }

    async fn interleaved_inner(&mut self) -> Result<()> {
        self.prepare().await?;

        let mut page = 1u32;
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let fetched = self.fetch_page(page).await?;

            if page == 1 {
                if let Some(uploader) = &fetched.uploader {
                    debug!("Uploader: {}", uploader);
                }
                // Totals are an estimate at this point, for display only
                let estimated = fetched
                    .estimated_total
                    .map(|t| t as usize)
                    .unwrap_or(fetched.items.len());
                info!(
                    "Playlist loaded: about {} tracks, downloading as pages arrive",
                    estimated
                );
                let _ = self
                    .progress
                    .send(FetchProgress::Loaded {
                        title: display_title(fetched.title.clone()),
                        total: estimated,
                        pending: estimated,
                    })
                    .await;
            }

            if fetched.items.is_empty() {
                break;
            }
            let added = self.registry.seed(fetched.items, &self.ledger);
            debug!("Page {}: registered {} new tracks", page, added);

            ledger::reconcile_with_folder(&self.output_dir, &mut self.registry).await?;
            self.downloaded += self
                .scheduler
                .drain(&mut self.registry, &mut self.ledger, &self.progress)
                .await?;

            if !fetched.has_more {
                break;
            }
            page += 1;
        }
        Ok(())
    }

    async fn prepare(&mut self) -> Result<()> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| {
                format!("Failed to create output folder {}", self.output_dir.display())
            })?;
        self.ledger = Ledger::load(&self.ledger_path);
        Ok(())
    }

    async fn fetch_page(&self, page: u32) -> Result<crate::source::PlaylistPage> {
        self.source
            .fetch_page(page, self.page_size)
            .await
            .with_context(|| format!("Failed to fetch playlist page {page}"))
    }

    /// Emit the terminal event and fold the registry into a summary.
    ///
    /// Fatal errors are reported exactly once here; everything already
    /// completed stays recorded in the ledger.
    async fn finish(&mut self, result: Result<()>) -> Result<FetchSummary> {
        if let Err(e) = result {
            let _ = self
                .progress
                .send(FetchProgress::Error {
                    message: format!("{e:#}"),
                })
                .await;
            return Err(e);
        }

        let _ = self.progress.send(FetchProgress::Complete).await;

        let completed = self.registry.count(TrackState::Completed);
        Ok(FetchSummary {
            total: self.registry.total(),
            downloaded: self.downloaded,
            skipped: completed - self.downloaded,
            failed: self.registry.count(TrackState::Failed),
        })
    }
}

fn display_title(title: Option<String>) -> String {
    title.unwrap_or_else(|| "(untitled playlist)".to_string())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::source::testing::{RecordingConverter, ScriptedSource};

    fn engine_for(
        source: ScriptedSource,
        converter: Arc<RecordingConverter>,
        output: &Path,
        cancel: CancellationToken,
    ) -> (Engine, mpsc::Receiver<FetchProgress>) {
        let (tx, rx) = mpsc::channel(256);
        let engine = Engine::new(
            Arc::new(source),
            converter,
            output.to_path_buf(),
            FetchOptions {
                concurrency: 2,
                page_size: 2,
            },
            cancel,
            tx,
        );
        (engine, rx)
    }

    fn drain_events(
        engine: Engine,
        mut rx: mpsc::Receiver<FetchProgress>,
    ) -> Vec<FetchProgress> {
        drop(engine);
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_empty_playlist_completes_without_sweeps() {
        let dir = tempfile::tempdir().unwrap();
        let converter = Arc::new(RecordingConverter::new());
        let source = ScriptedSource::from_ids("Empty", &[], 2);
        let (mut engine, rx) =
            engine_for(source, converter.clone(), dir.path(), CancellationToken::new());

        let summary = engine.run_bulk().await.unwrap();
        assert_eq!(summary, FetchSummary::default());
        assert_eq!(converter.call_count(), 0);

        let events = drain_events(engine, rx);
        assert_eq!(
            events,
            vec![
                FetchProgress::Loaded {
                    title: "Empty".to_string(),
                    total: 0,
                    pending: 0,
                },
                FetchProgress::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn test_bulk_downloads_every_track() {
        let dir = tempfile::tempdir().unwrap();
        let converter = Arc::new(RecordingConverter::new());
        let source = ScriptedSource::from_ids("Mix", &["a", "b", "c", "d", "e"], 2);
        let (mut engine, rx) =
            engine_for(source, converter.clone(), dir.path(), CancellationToken::new());

        let summary = engine.run_bulk().await.unwrap();
        assert_eq!(summary.total, 5);
        assert_eq!(summary.downloaded, 5);
        assert_eq!(summary.failed, 0);
        assert!(dir.path().join("Track a.mp3").exists());

        let events = drain_events(engine, rx);
        assert!(matches!(events.first(), Some(FetchProgress::Loaded { total: 5, .. })));
        assert_eq!(events.last(), Some(&FetchProgress::Complete));
    }

    #[tokio::test]
    async fn test_second_run_downloads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ids = ["a", "b", "c", "d"];

        let first = Arc::new(RecordingConverter::new());
        let source = ScriptedSource::from_ids("Mix", &ids, 2);
        let (mut engine, _rx) =
            engine_for(source, first.clone(), dir.path(), CancellationToken::new());
        let summary1 = engine.run_bulk().await.unwrap();
        assert_eq!(summary1.downloaded, 4);

        // Fresh engine and converter, same output folder
        let second = Arc::new(RecordingConverter::new());
        let source = ScriptedSource::from_ids("Mix", &ids, 2);
        let (mut engine, _rx) =
            engine_for(source, second.clone(), dir.path(), CancellationToken::new());
        let summary2 = engine.run_bulk().await.unwrap();

        assert_eq!(second.call_count(), 0);
        assert_eq!(summary2.downloaded, 0);
        assert_eq!(summary2.skipped, 4);
        assert_eq!(
            summary1.downloaded + summary1.skipped,
            summary2.downloaded + summary2.skipped
        );
    }

    #[tokio::test]
    async fn test_interleaved_matches_bulk() {
        let ids = ["a", "b", "c", "d", "e"];

        let bulk_dir = tempfile::tempdir().unwrap();
        let (mut engine, _rx) = engine_for(
            ScriptedSource::from_ids("Mix", &ids, 2),
            Arc::new(RecordingConverter::new().failing(&["c"])),
            bulk_dir.path(),
            CancellationToken::new(),
        );
        let bulk = engine.run_bulk().await.unwrap();

        let inter_dir = tempfile::tempdir().unwrap();
        let (mut engine, _rx) = engine_for(
            ScriptedSource::from_ids("Mix", &ids, 2),
            Arc::new(RecordingConverter::new().failing(&["c"])),
            inter_dir.path(),
            CancellationToken::new(),
        );
        let interleaved = engine.run_interleaved().await.unwrap();

        assert_eq!(bulk, interleaved);

        let bulk_ledger = Ledger::load(&bulk_dir.path().join(LEDGER_FILE));
        let inter_ledger = Ledger::load(&inter_dir.path().join(LEDGER_FILE));
        assert_eq!(bulk_ledger.len(), inter_ledger.len());
        for id in ["a", "b", "d", "e"] {
            assert!(bulk_ledger.contains(id));
            assert!(inter_ledger.contains(id));
        }
    }

    #[tokio::test]
    async fn test_failed_page_fetch_is_fatal_but_keeps_completions() {
        let dir = tempfile::tempdir().unwrap();
        let converter = Arc::new(RecordingConverter::new());
        let source = ScriptedSource::from_ids("Mix", &["a", "b", "c", "d"], 2)
            .with_failing_page(2, "metadata source went away");
        let (mut engine, rx) =
            engine_for(source, converter.clone(), dir.path(), CancellationToken::new());

        let result = engine.run_interleaved().await;
        assert!(result.is_err());

        // Page one finished before the failure and stays on the ledger
        let ledger = Ledger::load(&dir.path().join(LEDGER_FILE));
        assert!(ledger.contains("a") && ledger.contains("b"));

        let events = drain_events(engine, rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, FetchProgress::Error { message } if message.contains("page 2"))));
        assert!(!events.contains(&FetchProgress::Complete));
    }

    #[tokio::test]
    async fn test_preexisting_files_are_reconciled() {
        let dir = tempfile::tempdir().unwrap();
        // A file from before the ledger existed, named the way the queue
        // names output
        std::fs::write(dir.path().join("Track b.mp3"), b"audio").unwrap();

        let converter = Arc::new(RecordingConverter::new());
        let source = ScriptedSource::from_ids("Mix", &["a", "b", "c"], 2);
        let (mut engine, _rx) =
            engine_for(source, converter.clone(), dir.path(), CancellationToken::new());

        let summary = engine.run_bulk().await.unwrap();
        assert_eq!(summary.downloaded, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(converter.call_count(), 2);
        assert!(!converter.started_ids().contains(&"b".to_string()));
    }

    #[tokio::test]
    async fn test_stop_before_start_downloads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let converter = Arc::new(RecordingConverter::new());
        let source = ScriptedSource::from_ids("Mix", &["a", "b"], 2);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (mut engine, rx) = engine_for(source, converter.clone(), dir.path(), cancel);

        let summary = engine.run_bulk().await.unwrap();
        assert_eq!(converter.call_count(), 0);
        assert_eq!(summary.downloaded, 0);

        let events = drain_events(engine, rx);
        assert_eq!(events.last(), Some(&FetchProgress::Complete));
    }
}
