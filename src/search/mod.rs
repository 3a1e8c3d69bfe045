//! Blog and news search.

mod api_types;
mod facade;
mod history;
mod types;

pub use facade::{SearchFacade, MAX_DISPLAY};
pub use history::{SearchHistory, SearchHistoryEntry, HISTORY_CAPACITY};
pub use types::{SearchItem, SearchKind, SearchOutcome, SearchResults};
