//! `recmerge-recon` — record reconciliation and survivorship engine.
//!
//! Pure engine crate: receives pre-loaded datasets, returns pairings, merged
//! records and a summary. No CLI or file IO dependencies.

pub mod config;
pub mod engine;
pub mod error;
pub mod fuzzy;
pub mod merge;
pub mod model;
pub mod reconcile;
pub mod record;
pub mod summary;

pub use config::ReconConfig;
pub use engine::run;
pub use error::ReconError;
pub use model::{PairStatus, PairingResult, ReconResult, Side};
pub use record::{Dataset, Record, Value};
