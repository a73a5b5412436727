//! Track lifecycle model and registry

use std::collections::HashMap;

use anyhow::{bail, Result};

use crate::queue::ledger::Ledger;
use crate::source::PlaylistItem;
use crate::utils::sanitize_title;

/// Lifecycle state of a track in the download queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// Waiting for a slot in the active window
    Pending,
    /// Conversion in flight
    Active,
    /// Materialized on disk
    Completed,
    /// Conversion failed; not retried within the run
    Failed,
}

/// One playlist entry tracked by the queue
#[derive(Debug, Clone)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub url: String,
    pub state: TrackState,
    /// Dispatch attempts; at most one per run until a retry policy exists
    pub attempts: u32,
    /// Set only while `state` is `Failed`
    pub last_error: Option<String>,
}

impl Track {
    /// Output file name for this track, falling back to the id when the
    /// title sanitizes to nothing
    pub fn file_name(&self) -> String {
        let stem = sanitize_title(&self.title);
        if stem.is_empty() {
            format!("{}.mp3", self.id)
        } else {
            format!("{stem}.mp3")
        }
    }
}

/// In-memory registry of every discovered track.
///
/// Insertion order is dispatch order; the registry is the single source of
/// truth for scheduling decisions and is only touched from the
/// coordinating task.
#[derive(Debug, Default)]
pub struct TrackRegistry {
    tracks: Vec<Track>,
    positions: HashMap<String, usize>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry from one page of playlist items.
    ///
    /// Ids already registered are skipped, so overlapping pages are safe
    /// to feed twice. Ids the ledger already knows are seeded directly as
    /// `Completed`. Returns the number of tracks added.
    pub fn seed(&mut self, items: Vec<PlaylistItem>, ledger: &Ledger) -> usize {
        let mut added = 0;
        for item in items {
            if self.positions.contains_key(&item.id) {
                continue;
            }
            let state = if ledger.contains(&item.id) {
                TrackState::Completed
            } else {
                TrackState::Pending
            };
            self.positions.insert(item.id.clone(), self.tracks.len());
            self.tracks.push(Track {
                id: item.id,
                title: item.title,
                url: item.url,
                state,
                attempts: 0,
                last_error: None,
            });
            added += 1;
        }
        added
    }

    pub fn total(&self) -> usize {
        self.tracks.len()
    }

    pub fn count(&self, state: TrackState) -> usize {
        self.tracks.iter().filter(|t| t.state == state).count()
    }

    /// Earliest-inserted pending track, if any (FIFO)
    pub fn next_pending(&self) -> Option<usize> {
        self.tracks.iter().position(|t| t.state == TrackState::Pending)
    }

    pub fn get(&self, index: usize) -> &Track {
        &self.tracks[index]
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Move a track to a new lifecycle state.
    ///
    /// `Failed` requires an error message. Re-asserting `Completed` on an
    /// already-completed track is a no-op. `Failed -> Pending` is the
    /// operator-retry transition; everything else backwards is rejected.
    pub fn transition(
        &mut self,
        index: usize,
        state: TrackState,
        error: Option<String>,
    ) -> Result<()> {
        use TrackState::*;

        let Some(track) = self.tracks.get_mut(index) else {
            bail!("no track at index {index}");
        };

        match (track.state, state) {
            (Completed, Completed) => return Ok(()),
            (Pending, Active) => track.attempts += 1,
            // Folder reconciliation completes tracks that never dispatched
            (Pending | Active, Completed) => {}
            (Active, Failed) => {}
            (Failed, Pending) => track.last_error = None,
            (from, to) => bail!(
                "illegal transition {from:?} -> {to:?} for track {}",
                track.id
            ),
        }

        if state == Failed {
            let Some(message) = error else {
                bail!("failing track {} requires an error message", track.id);
            };
            track.last_error = Some(message);
        }

        track.state = state;
        Ok(())
    }
}
