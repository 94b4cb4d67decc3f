//! Durable result and history persistence.
//!
//! Verdicts append to per-category CSV files; the per-address history
//! accumulates in a scratch JSON file until the verdict is known, then moves
//! into the matching per-category history file.

mod error;
mod history;
mod results;

pub use error::StoreError;
pub use history::{HistoryEntry, HistoryLog};
pub use results::ResultStore;
