//! Playlist metadata and audio conversion boundaries

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub mod models;
pub mod ytdlp;

#[cfg(test)]
pub mod testing;

pub use models::{PlaylistItem, PlaylistPage};
pub use ytdlp::{YtDlpConverter, YtDlpSource};

/// Paginated source of playlist metadata.
///
/// Fetching the same page twice must yield the same items. Pages are
/// 1-based; an empty `items` or `has_more == false` ends the playlist.
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<PlaylistPage>;
}

/// External operation that turns a source locator into a local audio file.
///
/// Potentially slow. An `Err` is an ordinary per-track outcome, never a run
/// error. Implementations should observe `cancel` and abandon the work when
/// it fires, reporting the interruption as a failure.
#[async_trait]
pub trait TrackConverter: Send + Sync {
    async fn convert(&self, url: &str, dest: &Path, cancel: &CancellationToken) -> Result<()>;
}
