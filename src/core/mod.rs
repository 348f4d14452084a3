pub mod cancel;
pub mod config;
pub mod error;
pub mod keychain;
pub mod launch;
pub mod paths;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod project;
pub mod provision;
pub mod shell;
pub mod ssh;
pub mod sync;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
