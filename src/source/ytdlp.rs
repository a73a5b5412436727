//! yt-dlp subprocess client
//!
//! Both boundary implementations ride the same executable: flat-playlist
//! JSON dumps for metadata pages, audio extraction for conversion.

use std::path::Path;
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::models::{FlatPlaylist, PlaylistItem, PlaylistPage};
use super::{PlaylistSource, TrackConverter};

/// Default executable name, resolved via PATH
const YTDLP_BIN: &str = "yt-dlp";

/// Playlist metadata source backed by `yt-dlp --flat-playlist`
pub struct YtDlpSource {
    playlist_url: String,
    program: String,
}

impl YtDlpSource {
    pub fn new(playlist_url: impl Into<String>) -> Self {
        Self {
            playlist_url: playlist_url.into(),
            program: YTDLP_BIN.to_string(),
        }
    }

    /// Override the yt-dlp executable (custom installs)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

/// 1-based inclusive item range covered by a page
fn page_range(page: u32, page_size: u32) -> (u64, u64) {
    let start = u64::from(page - 1) * u64::from(page_size) + 1;
    (start, start + u64::from(page_size) - 1)
}

#[async_trait]
impl PlaylistSource for YtDlpSource {
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<PlaylistPage> {
        let (start, end) = page_range(page, page_size);
        debug!("Fetching playlist items {}-{}", start, end);

        let output = Command::new(&self.program)
            .arg("--flat-playlist")
            .arg("--no-warnings")
            .arg("-J")
            .arg("--playlist-items")
            .arg(format!("{start}:{end}"))
            .arg(&self.playlist_url)
            .stdin(Stdio::null())
            .output()
            .await
            .context("Failed to run yt-dlp; is it installed?")?;

        if !output.status.success() {
            bail!(
                "yt-dlp exited with {}: {}",
                output.status,
                last_stderr_line(&output.stderr)
            );
        }

        let flat: FlatPlaylist = serde_json::from_slice(&output.stdout)
            .context("Failed to parse yt-dlp playlist JSON")?;

        // has_more is judged on the raw entry count; entries dropped below
        // for missing ids still occupied playlist positions.
        let fetched = flat.entries.len();

        let items: Vec<PlaylistItem> = flat
            .entries
            .into_iter()
            .filter_map(|entry| {
                let Some(id) = entry.id else {
                    warn!("Skipping playlist entry without an id");
                    return None;
                };
                let url = entry
                    .url
                    .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={id}"));
                let title = entry.title.unwrap_or_else(|| id.clone());
                Some(PlaylistItem { id, title, url })
            })
            .collect();

        debug!("Page {}: {} entries", page, fetched);

        Ok(PlaylistPage {
            title: flat.title,
            uploader: flat.uploader,
            estimated_total: flat.playlist_count,
            items,
            has_more: fetched as u32 == page_size,
        })
    }
}

/// Audio extraction backed by `yt-dlp -x --audio-format mp3`
pub struct YtDlpConverter {
    program: String,
}

impl YtDlpConverter {
    pub fn new() -> Self {
        Self {
            program: YTDLP_BIN.to_string(),
        }
    }

    /// Override the yt-dlp executable (custom installs)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl Default for YtDlpConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackConverter for YtDlpConverter {
    async fn convert(&self, url: &str, dest: &Path, cancel: &CancellationToken) -> Result<()> {
        debug!("Extracting audio: {} -> {}", url, dest.display());

        let mut child = Command::new(&self.program)
            .arg("-x")
            .arg("--audio-format")
            .arg("mp3")
            .arg("--no-playlist")
            .arg("--no-progress")
            .arg("--no-warnings")
            .arg("-o")
            .arg(dest)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to run yt-dlp; is it installed?")?;

        let mut stderr = child.stderr.take();

        let status = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };

        let status = match status {
            Some(status) => status.context("Failed to wait on yt-dlp")?,
            None => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                bail!("conversion cancelled");
            }
        };

        if !status.success() {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr.as_mut() {
                use tokio::io::AsyncReadExt;
                let _ = pipe.read_to_end(&mut buf).await;
            }
            bail!("yt-dlp exited with {}: {}", status, last_stderr_line(&buf));
        }

        Ok(())
    }
}

/// Last non-empty stderr line, for compact failure messages
fn last_stderr_line(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("(no output)")
        .to_string()
}
