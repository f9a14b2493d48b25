pub mod display;
pub mod console;

pub use display::{print_folders, print_notification, print_results, SearchSummary};
pub use console::{parse_command, Command, Console, ProgressView};
