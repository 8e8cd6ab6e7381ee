//! Tâches de fond du démon

pub mod ban_cleanup;
pub mod log_watcher;
pub mod scheduler;

pub use ban_cleanup::{BanCleanup, CleanupReport};
pub use log_watcher::{LogWatcher, PollReport};
pub use scheduler::{run_periodic, wait_for_shutdown, PeriodicTask, Shutdown};
