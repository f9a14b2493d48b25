pub mod error;
pub mod search;
pub mod file_walker;

pub use error::FinderError;
pub use search::{search_files, NameQuery};
pub use file_walker::{count_files, scan_roots, CancelToken, WalkOptions, WalkOutcome};
