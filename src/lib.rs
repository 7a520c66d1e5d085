/// Macro for prefixed status logging to stderr (only when stderr is a terminal).
///
/// Usage:
/// ```ignore
/// log_status!("login", "Waiting for authorization URL ({}s)", timeout);
/// log_status!("deploy", "Deploy attempt {}/{}", attempt, attempts);
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
pub mod utils;

// Re-export everything from core for ergonomic library use
// Users can write `bpb_wizard::pipeline` instead of `bpb_wizard::core::pipeline`
pub use core::*;
pub use utils::*;
