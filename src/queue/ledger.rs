//! Completion ledger persistence

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::queue::track::{TrackRegistry, TrackState};

/// Ledger file name, stored inside the output folder
pub const LEDGER_FILE: &str = "downloaded-tracks.json";

/// Set of track ids known to be materialized on disk from prior runs
#[derive(Debug, Default, Clone)]
pub struct Ledger {
    ids: HashSet<String>,
}

impl Ledger {
    /// Load a ledger from disk.
    ///
    /// A missing or unparsable file yields an empty ledger; startup never
    /// fails on bad ledger contents.
    pub fn load(path: &Path) -> Self {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(_) => {
                debug!("No ledger at {}", path.display());
                return Self::default();
            }
        };

        match serde_json::from_str::<Vec<String>>(&data) {
            Ok(list) => {
                let ledger = Self {
                    ids: list.into_iter().collect(),
                };
                debug!("Loaded ledger: {} tracks", ledger.len());
                ledger
            }
            Err(e) => {
                warn!("Ignoring unparsable ledger {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Persist the full set, replacing prior contents.
    ///
    /// Writes a sibling temp file and renames it over the target so a
    /// crash mid-write leaves the previous ledger intact.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let mut list: Vec<&String> = self.ids.iter().collect();
        list.sort();

        let content =
            serde_json::to_string_pretty(&list).context("Failed to serialize ledger")?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;

        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn insert(&mut self, id: &str) -> bool {
        self.ids.insert(id.to_string())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Best-effort completion detection against files already on disk.
///
/// Marks pending registry tracks `Completed` when their output file name
/// already exists in `folder`, covering downloads from before the ledger
/// existed. Advisory only: files matching no track are ignored. Returns
/// the number of tracks marked.
pub async fn reconcile_with_folder(folder: &Path, registry: &mut TrackRegistry) -> Result<usize> {
    let mut by_name: HashMap<String, usize> = HashMap::new();
    for (index, track) in registry.tracks().iter().enumerate() {
        if track.state == TrackState::Pending {
            by_name.insert(track.file_name(), index);
        }
    }

    let mut entries = tokio::fs::read_dir(folder)
        .await
        .with_context(|| format!("Failed to read output folder {}", folder.display()))?;

    let mut matched = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .context("Failed to scan output folder")?
    {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(&index) = by_name.get(name) {
            registry.transition(index, TrackState::Completed, None)?;
            matched += 1;
        }
    }

    if matched > 0 {
        debug!("Found {} tracks already on disk in {}", matched, folder.display());
    }
    Ok(matched)
}
