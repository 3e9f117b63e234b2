//! Process lifecycle: signals that end the daemon

mod shutdown;

pub use shutdown::ShutdownSignal;
