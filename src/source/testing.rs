//! Scripted source and converter doubles for queue tests

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::models::{PlaylistItem, PlaylistPage};
use super::{PlaylistSource, TrackConverter};

/// Build a playlist item whose title and url derive from the id
pub fn item(id: &str) -> PlaylistItem {
    PlaylistItem {
        id: id.to_string(),
        title: format!("Track {id}"),
        url: format!("https://example.com/watch?v={id}"),
    }
}

/// Playlist source that serves pre-scripted pages.
///
/// Pages past the script are empty. A page scripted as `Err` fails the
/// fetch, standing in for a metadata-source outage.
pub struct ScriptedSource {
    pages: Vec<Result<PlaylistPage, String>>,
    pub fetches: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(pages: Vec<PlaylistPage>) -> Self {
        Self {
            pages: pages.into_iter().map(Ok).collect(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_failing_page(mut self, page: usize, message: &str) -> Self {
        self.pages[page - 1] = Err(message.to_string());
        self
    }

    /// Split ids into pages of `page_size`, wiring titles and continuation
    /// flags the way a real source would
    pub fn from_ids(title: &str, ids: &[&str], page_size: usize) -> Self {
        let mut pages = Vec::new();
        for (index, chunk) in ids.chunks(page_size.max(1)).enumerate() {
            pages.push(PlaylistPage {
                title: (index == 0).then(|| title.to_string()),
                uploader: None,
                estimated_total: (index == 0).then_some(ids.len() as u64),
                items: chunk.iter().map(|id| item(id)).collect(),
                has_more: chunk.len() == page_size,
            });
        }
        if pages.is_empty() {
            pages.push(PlaylistPage {
                title: Some(title.to_string()),
                estimated_total: Some(0),
                ..Default::default()
            });
        }
        Self::new(pages)
    }
}

#[async_trait]
impl PlaylistSource for ScriptedSource {
    async fn fetch_page(&self, page: u32, _page_size: u32) -> Result<PlaylistPage> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.pages.get(page as usize - 1) {
            Some(Ok(scripted)) => Ok(scripted.clone()),
            Some(Err(message)) => bail!("{message}"),
            None => Ok(PlaylistPage::default()),
        }
    }
}

/// Converter double that records dispatch order and concurrency.
///
/// Writes the destination file on success so folder reconciliation sees
/// the same world a real converter would leave behind.
#[derive(Default)]
pub struct RecordingConverter {
    pub started: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    fail_ids: HashSet<String>,
    delay: Duration,
}

impl RecordingConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail conversions whose url contains any of these ids
    pub fn failing(mut self, ids: &[&str]) -> Self {
        self.fail_ids = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    /// Hold each conversion open long enough to overlap with its sweep
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn started_ids(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl TrackConverter for RecordingConverter {
    async fn convert(&self, url: &str, dest: &Path, cancel: &CancellationToken) -> Result<()> {
        let id = url.rsplit("v=").next().unwrap_or(url).to_string();
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.lock().unwrap().push(id.clone());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if cancel.is_cancelled() {
            bail!("conversion cancelled");
        }
        if self.fail_ids.contains(&id) {
            bail!("scripted failure for {id}");
        }

        tokio::fs::write(dest, b"audio").await?;
        Ok(())
    }
}
