//! Download queue engine

pub mod engine;
pub mod ledger;
pub mod progress;
pub mod scheduler;
pub mod track;

pub use engine::{Engine, FetchOptions, FetchSummary};
pub use ledger::Ledger;
pub use progress::FetchProgress;
pub use track::{Track, TrackRegistry, TrackState};
