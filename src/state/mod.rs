//! Event loop module for key dispatch
//!
//! Provides the two-state loop that drives everything:
//! - Waiting: blocked on the input device, no timeout
//! - Draining: every buffered event is routed to its key's action
//!   before the loop waits again

mod machine;

pub use machine::{run_session, LoopExit};
