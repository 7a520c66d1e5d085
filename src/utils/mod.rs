//! Generic utility primitives with zero domain knowledge.
//!
//! - `command` - Process execution with deadlines and live output capture
//! - `io` - File I/O with consistent error handling
//! - `random` - Character-set string generation with positional rules
//! - `retry` - Fixed-delay retry loops
//! - `wait` - Tick-driven polling against a deadline

pub mod command;
pub mod io;
pub mod random;
pub mod retry;
pub mod wait;
