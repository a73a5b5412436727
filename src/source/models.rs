//! Playlist page models and yt-dlp flat-playlist JSON shapes

use serde::Deserialize;

/// One raw playlist entry as returned by a metadata source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistItem {
    pub id: String,
    pub title: String,
    pub url: String,
}

/// One page of playlist metadata
#[derive(Debug, Clone, Default)]
pub struct PlaylistPage {
    /// Playlist display name; sources populate this on the first page only
    pub title: Option<String>,
    /// Uploader/channel display name (first page only)
    pub uploader: Option<String>,
    /// Approximate total entry count, for display only. Pagination is
    /// driven solely by `items` emptiness and `has_more`.
    pub estimated_total: Option<u64>,
    /// Entries for this page, in playlist order
    pub items: Vec<PlaylistItem>,
    /// Whether another page may follow
    pub has_more: bool,
}

/// Single-JSON document from `yt-dlp --flat-playlist -J`
#[derive(Debug, Clone, Deserialize)]
pub struct FlatPlaylist {
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub playlist_count: Option<u64>,
    #[serde(default)]
    pub entries: Vec<FlatEntry>,
}

/// One flat-playlist entry; fields are sparse for unavailable videos
#[derive(Debug, Clone, Deserialize)]
pub struct FlatEntry {
    pub id: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
}
