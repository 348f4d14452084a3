/// Macro for prefixed status logging to stderr (only when stderr is a terminal).
///
/// Usage:
/// ```ignore
/// log_status!("ssh", "Connecting to {}", destination);
/// log_status!("scp", "Uploading {} entries", count);
/// ```
#[macro_export]
macro_rules! log_status {
    ($prefix:expr, $($arg:tt)*) => {
        if ::std::io::IsTerminal::is_terminal(&::std::io::stderr()) {
            eprintln!(concat!("[", $prefix, "] {}"), format_args!($($arg)*));
        }
    };
}

pub mod core;

// Re-export everything from core for ergonomic library use
// Users can write `sshdbg::config` instead of `sshdbg::core::config`
pub use core::*;
