//! Generic utility primitives with zero domain knowledge.
//!
//! - `io` - File I/O with consistent error handling
//! - `process` - Shell subprocesses with combined output capture

pub mod io;
pub mod process;
