pub mod config;
pub mod settings;
pub mod worker;
pub mod session;

pub use config::Config;
pub use settings::{Settings, SettingsStore};
pub use worker::{SearchEvent, SearchRequest, SearchWorker, WorkerOptions};
pub use session::{SearchSession, SearchState};
