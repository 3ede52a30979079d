//! Resets a model host between test runs by unloading a fixed set of models.

pub mod config;
pub mod status;
pub mod unloader;

pub use config::{ModelTarget, UnloadConfig};
pub use status::{MemoryReporter, StatusReporter, StdoutReporter, UnloadStatus};
pub use unloader::{unload_all, unload_one};
